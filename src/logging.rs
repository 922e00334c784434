//! Log setup for the binary.
//!
//! The terminal belongs to the TUI, so records go to a file. The filter uses
//! `RUST_LOG` syntax (`warn`, `rbrowser=debug`, ...).

use std::fs::{self, OpenOptions};
use std::path::Path;

use env_logger::{Builder, Target};

use crate::error::{AppError, Result};

/// Route `log` records to `file` with the given filter.
///
/// Without a file, logging stays off.
pub fn init(filter: &str, file: Option<&Path>) -> Result<()> {
    let Some(path) = file else {
        return Ok(());
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let out = OpenOptions::new().create(true).append(true).open(path)?;

    Builder::new()
        .parse_filters(filter)
        .target(Target::Pipe(Box::new(out)))
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;
    Ok(())
}
