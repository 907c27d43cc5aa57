//! Ordered start/stop command pairs.

use crate::Command;

/// One start command and the stop command that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPair {
    pub start: Command,
    pub stop: Command,
}

impl CommandPair {
    #[must_use]
    pub const fn new(start: Command, stop: Command) -> Self {
        Self { start, stop }
    }
}

/// A full command sequence: start/stop pairs followed by one shutdown command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pairs: Vec<CommandPair>,
    shutdown: Command,
}

impl Sequence {
    /// Create a sequence from explicit pairs.
    #[must_use]
    pub const fn new(pairs: Vec<CommandPair>, shutdown: Command) -> Self {
        Self { pairs, shutdown }
    }

    /// Pair every start command with the same stop command.
    #[must_use]
    pub fn from_starts<I>(starts: I, stop: &Command, shutdown: Command) -> Self
    where
        I: IntoIterator<Item = Command>,
    {
        let pairs = starts
            .into_iter()
            .map(|start| CommandPair::new(start, stop.clone()))
            .collect();
        Self { pairs, shutdown }
    }

    /// The start/stop pairs, in order.
    #[must_use]
    pub fn pairs(&self) -> &[CommandPair] {
        &self.pairs
    }

    /// The final shutdown command.
    #[must_use]
    pub const fn shutdown(&self) -> &Command {
        &self.shutdown
    }

    /// Number of requests the sequence issues (two per pair plus shutdown).
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.pairs.len() * 2 + 1
    }

    /// Every command in send order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> + '_ {
        self.pairs
            .iter()
            .flat_map(|pair| [&pair.start, &pair.stop])
            .chain(std::iter::once(&self.shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(text: &str) -> Command {
        Command::parse(text).unwrap()
    }

    #[test]
    fn test_commands_in_send_order() {
        let sequence = Sequence::from_starts(
            [cmd("StartRecord A=1"), cmd("StartRecord A=2")],
            &cmd("StopRecord"),
            cmd("StopAcquisition"),
        );
        let sent: Vec<&str> = sequence.commands().map(Command::as_str).collect();
        assert_eq!(
            sent,
            vec![
                "StartRecord A=1",
                "StopRecord",
                "StartRecord A=2",
                "StopRecord",
                "StopAcquisition",
            ]
        );
        assert_eq!(sequence.request_count(), 5);
    }

    #[test]
    fn test_empty_sequence_still_shuts_down() {
        let sequence = Sequence::new(Vec::new(), cmd("StopAcquisition"));
        assert_eq!(sequence.request_count(), 1);
        assert_eq!(sequence.commands().count(), 1);
    }
}
