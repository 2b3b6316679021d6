//! DRC plugin API.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod report;

/// Inputs passed to a [`DrcTool`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DrcInput {
    /// The path to the layout artifact to check.
    pub layout_path: PathBuf,
    /// The rule deck to check against.
    pub rules_path: PathBuf,
    /// Where the tool must write its violation report.
    pub report_path: PathBuf,
    /// Where the tool's stdout/stderr is captured.
    pub log_path: PathBuf,
    /// Wall-clock bound on the invocation. The tool must be forcibly
    /// terminated when this expires.
    pub timeout: Duration,
    /// Unstructured options.
    pub opts: HashMap<ArcStr, ArcStr>,
}

/// The result of a single external-checker invocation.
///
/// A tool that runs to completion and reports violations has *completed*;
/// violations are read from the report file, not from this value. Only launch
/// failures, crashes, and timeouts are distinguished here.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The tool ran to completion and wrote the report at the given path.
    Completed(PathBuf),
    /// The tool executable is absent from the environment.
    ToolNotFound,
    /// The tool launched but exited abnormally.
    ToolCrashed {
        exit_code: Option<i32>,
        /// The tail of the captured run log.
        output: String,
    },
    /// The tool exceeded the configured timeout and was killed.
    Timeout,
}

/// The trait that DRC runner plugins must implement.
///
/// Implementations perform exactly one invocation per call; retries are the
/// caller's responsibility. Re-running with identical inputs overwrites the
/// prior report deterministically.
pub trait DrcTool {
    /// Runs the DRC tool on the provided input files.
    fn run_drc(&self, input: DrcInput) -> Result<RunOutcome>;
}
