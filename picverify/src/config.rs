//! Verification run configuration.
//!
//! Configuration is loaded from a TOML file or assembled in code via the
//! builder. All paths are resolved relative to the process working directory;
//! [`VerifyConfig::validate`] checks the input paths before any subprocess is
//! spawned so that misconfiguration fails fast with the offending field named.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(pattern = "owned", setter(into))]
pub struct VerifyConfig {
    /// The layout artifact (GDS file) to verify.
    pub layout_gds: PathBuf,
    /// The DRC rule deck passed to the external checker.
    pub rules: PathBuf,
    /// An alternative rule deck selected by [`VerifyConfig::use_enhanced_rules`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option), default)]
    pub enhanced_rules: Option<PathBuf>,
    /// Where the external checker writes its violation report.
    pub report: PathBuf,
    /// Where the external checker's stdout/stderr is captured.
    pub log: PathBuf,
    /// Where the rendered verification summary is written.
    pub summary: PathBuf,
    /// When true, DRC violations fail the run; when false they are reported
    /// but do not affect the verdict.
    #[serde(default)]
    #[builder(default)]
    pub fail_on_violations: bool,
    /// Selects the enhanced rule deck and enhanced-named output paths.
    #[serde(default)]
    #[builder(default)]
    pub use_enhanced_rules: bool,
    /// Wall-clock bound on a single external checker invocation, in seconds.
    #[serde(default = "default_timeout_secs")]
    #[builder(default = "DEFAULT_TIMEOUT_SECS")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl VerifyConfig {
    pub fn builder() -> VerifyConfigBuilder {
        VerifyConfigBuilder::default()
    }

    /// Loads a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = with_err_context(std::fs::read_to_string(path), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })?;
        let config = toml::from_str(&data)?;
        Ok(config)
    }

    /// Checks that every input path this run will consume exists.
    ///
    /// Output paths are not checked; their parent directories are created on
    /// demand when the run writes them.
    pub fn validate(&self) -> Result<()> {
        if !self.layout_gds.exists() {
            return Err(ErrorSource::Config(format!(
                "layout_gds: file not found: {:?}",
                self.layout_gds
            ))
            .into());
        }
        if self.use_enhanced_rules && self.enhanced_rules.is_none() {
            return Err(ErrorSource::Config(
                "enhanced_rules: required when use_enhanced_rules is set".to_string(),
            )
            .into());
        }
        let rules = self.active_rules();
        if !rules.exists() {
            let field = if self.use_enhanced_rules {
                "enhanced_rules"
            } else {
                "rules"
            };
            return Err(ErrorSource::Config(format!("{field}: file not found: {rules:?}")).into());
        }
        Ok(())
    }

    /// The rule deck selected for this run.
    pub fn active_rules(&self) -> &Path {
        if self.use_enhanced_rules {
            self.enhanced_rules.as_deref().unwrap_or(&self.rules)
        } else {
            &self.rules
        }
    }

    /// The report path selected for this run.
    ///
    /// Enhanced runs write to a sibling path so they never clobber the
    /// baseline report.
    pub fn active_report(&self) -> PathBuf {
        if self.use_enhanced_rules {
            enhanced_variant(&self.report)
        } else {
            self.report.clone()
        }
    }

    /// The run-log path selected for this run.
    pub fn active_log(&self) -> PathBuf {
        if self.use_enhanced_rules {
            enhanced_variant(&self.log)
        } else {
            self.log.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inserts an `_enhanced` suffix before the file extension.
fn enhanced_variant(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_enhanced.{ext}"),
        None => format!("{stem}_enhanced"),
    };
    path.with_file_name(name)
}
