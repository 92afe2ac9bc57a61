//! Append-only record of completed supervisor passes.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;

/// Render one heartbeat line, newline included.
pub fn format_heartbeat(at: DateTime<Utc>, cycle: u64, changed: bool) -> String {
    format!(
        "[{}] supervisor cycle {cycle} completed (changed={changed})\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Append a heartbeat for `cycle` to `path`, creating parent directories.
pub fn append_heartbeat(path: &Path, cycle: u64, changed: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(format_heartbeat(Utc::now(), cycle, changed).as_bytes())?;
    Ok(())
}
