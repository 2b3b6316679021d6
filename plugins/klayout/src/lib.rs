//! KLayout DRC runner plugin.
//!
//! Invokes KLayout in batch mode against a layout artifact and a rule deck,
//! capturing tool output to a run log and bounding the invocation with a
//! configurable timeout. Finding violations is success for this plugin; only
//! a launch failure, crash, or timeout is reported as a non-completed
//! outcome.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use derive_builder::Builder;
use picverify::error::{with_err_context, ErrorContext, ErrorSource, Result};
use picverify::verification::drc::{DrcInput, DrcTool, RunOutcome};


/// How much of the run log rides along in a crash outcome.
const LOG_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[non_exhaustive]
#[builder(pattern = "owned")]
pub struct KlayoutDrc {
    /// The KLayout executable to invoke.
    #[builder(setter(into), default = "PathBuf::from(\"klayout\")")]
    pub executable: PathBuf,
    /// Subprocess poll interval while waiting for completion.
    #[builder(default = "Duration::from_millis(100)")]
    pub poll_interval: Duration,
}

impl KlayoutDrc {
    pub fn builder() -> KlayoutDrcBuilder {
        KlayoutDrcBuilder::default()
    }
}

impl Default for KlayoutDrc {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("klayout"),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl DrcTool for KlayoutDrc {
    fn run_drc(&self, input: DrcInput) -> Result<RunOutcome> {
        if let Some(parent) = input.log_path.parent() {
            with_err_context(std::fs::create_dir_all(parent), || {
                ErrorContext::CreateDir(parent.to_path_buf())
            })?;
        }
        let stdout = with_err_context(File::create(&input.log_path), || {
            ErrorContext::CreateFile(input.log_path.clone())
        })?;
        let stderr = with_err_context(stdout.try_clone(), || {
            ErrorContext::CreateFile(input.log_path.clone())
        })?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg("-b")
            .arg("-r")
            .arg(&input.rules_path)
            .arg("-rd")
            .arg(format!("input={}", input.layout_path.display()))
            .arg("-rd")
            .arg(format!("report={}", input.report_path.display()))
            .arg("-rd")
            .arg(format!("log={}", input.log_path.display()));
        for (key, value) in input.opts.iter() {
            cmd.arg("-rd").arg(format!("{key}={value}"));
        }
        cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{:?} not found; is KLayout installed?", self.executable);
                return Ok(RunOutcome::ToolNotFound);
            }
            Err(e) => {
                return Err(picverify::error::VerifyError::new(ErrorSource::Io(e))
                    .with_context(ErrorContext::RunTool(arcstr::literal!("klayout"))))
            }
        };

        let deadline = Instant::now() + input.timeout;
        let status = loop {
            match with_err_context(child.try_wait(), || {
                ErrorContext::RunTool(arcstr::literal!("klayout"))
            })? {
                Some(status) => break status,
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(RunOutcome::Timeout);
                    }
                    std::thread::sleep(self.poll_interval);
                }
            }
        };

        if !status.success() {
            return Ok(RunOutcome::ToolCrashed {
                exit_code: status.code(),
                output: log_tail(&input.log_path),
            });
        }

        if !input.report_path.exists() {
            return Err(ErrorSource::Internal(format!(
                "DRC report not created at {:?}",
                input.report_path
            ))
            .into());
        }

        Ok(RunOutcome::Completed(input.report_path))
    }
}

/// The last [`LOG_TAIL_BYTES`] of the run log, lossily decoded.
fn log_tail(path: &std::path::Path) -> String {
    match std::fs::read(path) {
        Ok(data) => {
            let start = data.len().saturating_sub(LOG_TAIL_BYTES);
            String::from_utf8_lossy(&data[start..]).into_owned()
        }
        Err(_) => String::new(),
    }
}
