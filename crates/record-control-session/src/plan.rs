//! Commands understood by the recording controller's `RecordControl`
//! processor, and the default start/stop plan.

use std::path::Path;

use record_control_core::{Command, CommandBuilder, CommandError, Sequence};

/// Action path that routes a command to the `RecordControl` processor.
pub const RECORD_CONTROL: &str = "ProcessorCommunication RecordControl";

/// Builder for `StartRecord` with optional parameters.
#[must_use]
pub fn start_record() -> CommandBuilder {
    CommandBuilder::new(RECORD_CONTROL).action("StartRecord")
}

/// `StopRecord`.
///
/// # Errors
/// Never fails in practice; the action path is fixed.
pub fn stop_record() -> Result<Command, CommandError> {
    CommandBuilder::new(RECORD_CONTROL).action("StopRecord").build()
}

/// `StopAcquisition`, sent once at the end of a sequence.
///
/// # Errors
/// Never fails in practice; the action path is fixed.
pub fn stop_acquisition() -> Result<Command, CommandError> {
    CommandBuilder::new(RECORD_CONTROL)
        .action("StopAcquisition")
        .build()
}

/// Start commands of the default plan: one recording per `StartRecord`
/// option.
///
/// # Errors
/// Returns `CommandError::UnescapableValue` if `recording_dir` contains
/// whitespace, since the command format cannot carry it.
pub fn example_starts(recording_dir: &Path) -> Result<Vec<Command>, CommandError> {
    Ok(vec![
        start_record()
            .param("RecordingDirectory", recording_dir.display())
            .build()?,
        start_record().param("CreateNewDateDirectory", 1).build()?,
        start_record()
            .param("PrependText", "Session001")
            .param("AppendText", "Condition001")
            .build()?,
        start_record()
            .param("PrependText", "Session001")
            .param("AppendText", "Condition002")
            .build()?,
        start_record()
            .param("PrependText", "Session002")
            .param("AppendText", "Condition001")
            .build()?,
    ])
}

/// Default recording plan: `example_starts`, each followed by `StopRecord`,
/// then `StopAcquisition`.
///
/// # Errors
/// See `example_starts`.
pub fn example_sequence(recording_dir: &Path) -> Result<Sequence, CommandError> {
    Ok(Sequence::from_starts(
        example_starts(recording_dir)?,
        &stop_record()?,
        stop_acquisition()?,
    ))
}
