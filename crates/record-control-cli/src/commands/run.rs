//! `run`: the full start/stop sequence.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;
use record_control_session::CommandSession;

use crate::config::{ControlConfig, SequenceOverrides};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub sequence: SequenceOverrides,

    /// Write the session's event history to this file as JSON lines
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,
}

/// Connect, run the sequence and print every reply as it arrives.
///
/// Ctrl-C aborts the sequence. The connection is closed on every path.
pub async fn run(mut config: ControlConfig, args: RunArgs) -> Result<()> {
    config.apply_sequence(&args.sequence);
    let sequence = config.sequence()?;
    let endpoint = config.endpoint();

    let mut session = CommandSession::connect(&endpoint)
        .await
        .with_context(|| format!("failed to connect to {endpoint}"))?;

    let abort = session.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, aborting sequence");
            abort.abort();
        }
    });

    // Ends once the session records `Closed`, which `close` always does.
    let mut replies = session.events().reply_stream();
    let printer = tokio::spawn(async move {
        while let Some((command, reply)) = replies.next().await {
            tracing::debug!("{command} -> {reply}");
            println!("{reply}");
        }
    });

    let result = session.run_sequence(&sequence, config.pacing()).await;
    session.close().await;
    interrupt.abort();
    if let Err(e) = printer.await {
        tracing::warn!("Reply printer stopped early: {e}");
    }

    if let Some(path) = &args.event_log {
        super::write_event_log(path, &session.events())?;
    }

    let report = result?;
    tracing::info!(
        "Sequence complete: {} replies in {:.1?}",
        report.replies.len(),
        report.elapsed
    );
    Ok(())
}
