//! JSON report of a bench or test-all run.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::harness::HarnessError;

#[derive(Debug, Serialize)]
pub struct Report<'a, T: Serialize> {
    pub device: &'a str,
    pub workers: usize,
    pub timestamp: String,
    pub results: &'a [T],
}

impl<'a, T: Serialize> Report<'a, T> {
    pub fn new(device: &'a str, workers: usize, results: &'a [T]) -> Self {
        Self {
            device,
            workers,
            timestamp: chrono::Utc::now().to_rfc3339(),
            results,
        }
    }
}

/// Write `report` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, report: &Report<'_, T>) -> Result<(), HarnessError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, json)?;
    log::info!("results written to {}", path.display());
    Ok(())
}
