//! Host run-results artifact (target/run_results.json)
//!
//! Only the per-result `status` field is read; it decides whether the
//! end-of-run snapshot refresh happens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default location of the artifact, relative to the project root
pub const RUN_RESULTS_PATH: &str = "target/run_results.json";

/// run_results.json structure (subset of fields we care about)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    #[serde(default)]
    pub results: Vec<RunResultEntry>,
}

/// One executed node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResultEntry {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub unique_id: Option<String>,
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RunResults {
    /// Parse run results from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Summarize the run; an empty result list is `Unknown`
    pub fn status(&self) -> RunStatus {
        if self.results.is_empty() {
            return RunStatus::Unknown;
        }

        let has_errors = self
            .results
            .iter()
            .any(|r| r.status.as_deref() == Some("error"));

        if has_errors {
            RunStatus::Error
        } else {
            RunStatus::Success
        }
    }

    /// Read the artifact and summarize it; any read or parse failure is `Unknown`
    pub fn status_from_file(path: &Path) -> RunStatus {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = %path.display(), "run results unavailable: {}", e);
                return RunStatus::Unknown;
            }
        };

        match Self::from_json(&contents) {
            Ok(results) => results.status(),
            Err(e) => {
                tracing::debug!(path = %path.display(), "run results unreadable: {}", e);
                RunStatus::Unknown
            }
        }
    }
}
