//! `send`: one command, one reply.

use anyhow::{Context, Result};
use clap::Args;
use record_control_core::Command;
use record_control_session::CommandSession;

use crate::config::ControlConfig;

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Command text, e.g. `ProcessorCommunication RecordControl StopRecord`
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

pub async fn run(config: &ControlConfig, args: SendArgs) -> Result<()> {
    let command = Command::parse(args.command.join(" ")).context("invalid command")?;
    let endpoint = config.endpoint();

    let mut session = CommandSession::connect(&endpoint)
        .await
        .with_context(|| format!("failed to connect to {endpoint}"))?;
    let result = session.execute(&command).await;
    session.close().await;

    let reply = result?;
    println!("{reply}");
    Ok(())
}
