//! AOI Coverage
//!
//! A crate for estimating archive imagery coverage and upcoming satellite
//! passes over an area of interest. Outputs are advisory and reference-only.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod cache;
pub mod catalog;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod geo;
pub mod passes;
pub mod propagator;
pub mod swath;
pub mod time_window;
pub mod tle;

pub use config::EngineConfig;
pub use coverage::CoverageIndicator;
pub use engine::{estimate_passes, list_archive_scenes, run_coverage_index};
pub use geo::{AreaOfInterest, BoundingBox};
pub use passes::{PassResult, PassWindow};
pub use time_window::TimeWindow;

/// Result type alias for coverage and pass estimation operations.
pub type AoiCoverageResult<T> = Result<T, AoiCoverageError>;

/// Error types for coverage and pass estimation operations.
#[derive(Error, Debug)]
pub enum AoiCoverageError {
    #[error("FetchError: {0}")]
    Fetch(String),
    #[error("ElementParseError: {0}")]
    ElementParse(String),
    #[error("NameMatchError: {0}")]
    NameMatch(String),
    #[error("ConfigError: {0}")]
    Config(String),
    #[error("InvalidInput: {0}")]
    InvalidInput(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("IOError: {0}")]
    Io(#[from] std::io::Error),
    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tri-state confidence signal shared by coverage indicators and pass results.
///
/// This is never a probability: `Ok` means "likely", `Warn` means "plausible or
/// could not be determined", `No` means "ruled out or nothing found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ok,
    Warn,
    No,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Ok => "ok",
            Level::Warn => "warn",
            Level::No => "no",
        };
        f.write_str(s)
    }
}
