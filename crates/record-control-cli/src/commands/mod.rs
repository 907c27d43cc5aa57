//! Subcommand implementations.

pub mod run;
pub mod send;
pub mod serve;

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use record_control_core::EventStore;

/// Write the session's numbered event history as JSON lines.
fn write_event_log(path: &Path, events: &EventStore) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in events.records() {
        serde_json::to_writer(&mut out, &record).context("failed to serialize event")?;
        out.write_all(b"\n")?;
    }
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))
}
