//! Rendering of harness results: tables, JSON reports and a progress spinner.

pub mod json;
pub mod progress;
pub mod table;
