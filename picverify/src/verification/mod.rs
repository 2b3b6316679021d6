//! Verification orchestration.
//!
//! Composes the external DRC run with the in-memory geometry checks, applies
//! the fail-on-violations policy, renders the combined summary, and owns the
//! exit-code contract with CI callers. Policy decisions live here and nowhere
//! else; the components below surface structured values and never terminate
//! the process.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::VerifyConfig;
use crate::error::{with_err_context, ErrorContext, Result};
use crate::layout::Element;
use crate::log::{warn, Log};

pub mod drc;
pub mod geometry;

use drc::report::{parse_report, ViolationRecord};
use drc::{DrcInput, DrcTool, RunOutcome};
use geometry::{CheckKind, Finding, Severity};

/// Overall pass.
pub const EXIT_PASS: i32 = 0;
/// Operational error: tool missing when required, crash, timeout, unreadable
/// report, invalid configuration.
pub const EXIT_OPERATIONAL_ERROR: i32 = 1;
/// Verification failure: violations and/or fail-severity findings.
pub const EXIT_VERIFICATION_FAILED: i32 = 2;

/// The number of rules shown in the printed top-rule table. The full record
/// list is retained in [`VerificationResult`].
pub const SUMMARY_TOP_RULES: usize = 20;

/// How the DRC leg of the run ended.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DrcStatus {
    /// The tool ran and its report was parsed; `total` is the report's total
    /// violation count.
    Ran { total: u64 },
    /// The tool executable is absent. DRC is excluded from the pass/fail
    /// decision; a clean result is never assumed.
    Skipped,
    /// The tool crashed, timed out, or produced an unreadable report.
    Errored(String),
}

/// The merged verdict of one verification run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub drc: DrcStatus,
    /// Per-rule violation records, count-descending. Complete, not truncated.
    pub violations: Vec<ViolationRecord>,
    /// `(reported, leaf_sum)` when the report's root total disagreed with the
    /// leaf sum.
    pub total_mismatch: Option<(u64, u64)>,
    pub findings: Vec<Finding>,
    pub drc_clean: bool,
    pub geometry_clean: bool,
    pub overall_pass: bool,
    pub fail_on_violations: bool,
}

impl VerificationResult {
    fn compose(
        drc: DrcStatus,
        violations: Vec<ViolationRecord>,
        total_mismatch: Option<(u64, u64)>,
        findings: Vec<Finding>,
        fail_on_violations: bool,
    ) -> Self {
        let drc_clean = matches!(drc, DrcStatus::Ran { total: 0 });
        let geometry_clean = findings.iter().all(|f| f.severity() != Severity::Fail);
        // With the policy disabled, DRC violations are reported but do not
        // flip the verdict. A skipped or errored DRC leg never counts as
        // clean; it is excluded here and handled by the exit code.
        let drc_gates = fail_on_violations && matches!(drc, DrcStatus::Ran { .. });
        let overall_pass = geometry_clean && (!drc_gates || drc_clean);
        Self {
            drc,
            violations,
            total_mismatch,
            findings,
            drc_clean,
            geometry_clean,
            overall_pass,
            fail_on_violations,
        }
    }

    /// The process exit status for CI callers.
    ///
    /// `0` = overall pass, `2` = verification failure, `1` = operational
    /// error. When the tool is absent and the fail-on-violations policy
    /// requires a DRC verdict, the run cannot certify anything and maps to
    /// `1`; without the policy the verdict reflects geometry alone.
    pub fn exit_code(&self) -> i32 {
        match &self.drc {
            DrcStatus::Errored(_) => EXIT_OPERATIONAL_ERROR,
            DrcStatus::Skipped if self.fail_on_violations => EXIT_OPERATIONAL_ERROR,
            _ => {
                if self.overall_pass {
                    EXIT_PASS
                } else {
                    EXIT_VERIFICATION_FAILED
                }
            }
        }
    }

    /// Renders the human- and machine-readable summary.
    ///
    /// Field labels and ordering are stable: DRC status, violation total and
    /// top-rule table, per-check status lines, findings grouped by severity,
    /// final verdict line.
    pub fn render_summary(&self) -> String {
        let mut lines = Vec::new();
        lines.push("verification summary".to_string());
        lines.push("====================".to_string());

        match &self.drc {
            DrcStatus::Ran { total } => {
                lines.push(format!("drc: ran ({total} violations)"));
                if let Some((reported, leaves)) = self.total_mismatch {
                    lines.push(format!(
                        "warning: drc total cross-check: reported {reported}, leaf sum {leaves}"
                    ));
                }
                lines.push(format!("total violations: {total}"));
                if !self.violations.is_empty() {
                    lines.push("top rules:".to_string());
                    for record in self.violations.iter().take(SUMMARY_TOP_RULES) {
                        lines.push(format!("  {}: {}", record.rule, record.count));
                    }
                }
            }
            DrcStatus::Skipped => {
                lines.push("drc: skipped (tool not found)".to_string());
            }
            DrcStatus::Errored(msg) => {
                lines.push(format!("drc: error: {msg}"));
            }
        }

        lines.push("geometry checks:".to_string());
        for kind in CheckKind::ALL {
            let status = self
                .findings
                .iter()
                .filter(|f| f.check() == kind)
                .map(|f| f.severity())
                .max()
                .unwrap_or(Severity::Pass);
            lines.push(format!("  {kind}: {}", status_label(status)));
        }

        if self.findings.is_empty() {
            lines.push("geometry findings: none".to_string());
        } else {
            lines.push("geometry findings:".to_string());
            for severity in [Severity::Fail, Severity::Warning] {
                for finding in self.findings.iter().filter(|f| f.severity() == severity) {
                    lines.push(format!("  [{severity}] {finding}"));
                }
            }
        }

        lines.push(format!(
            "verdict: {}",
            if self.overall_pass { "PASS" } else { "FAIL" }
        ));
        lines.push(String::new());
        lines.join("\n")
    }
}

impl Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render_summary())
    }
}

/// Runs the full verification pipeline.
///
/// Invokes the DRC tool per `config`, parses its report, runs the geometry
/// checks, merges both into a [`VerificationResult`], and writes the summary
/// and JSON artifacts. Configuration errors fail fast before any subprocess
/// is spawned. Component failures inside the DRC leg (crash, timeout,
/// unreadable report) degrade to [`DrcStatus::Errored`] so the geometry
/// findings still reach the summary.
pub fn verify(
    layout: &dyn Element,
    tool: &dyn DrcTool,
    config: &VerifyConfig,
) -> Result<VerificationResult> {
    config.validate()?;

    let report_path = config.active_report();
    if let Some(parent) = report_path.parent() {
        with_err_context(std::fs::create_dir_all(parent), || {
            ErrorContext::CreateDir(parent.to_path_buf())
        })?;
    }

    let input = DrcInput {
        layout_path: config.layout_gds.clone(),
        rules_path: config.active_rules().to_path_buf(),
        report_path: report_path.clone(),
        log_path: config.active_log(),
        timeout: config.timeout(),
        opts: HashMap::new(),
    };

    let (drc, violations, total_mismatch) = match tool.run_drc(input)? {
        RunOutcome::Completed(path) => match parse_report(&path) {
            Ok(tree) => (
                DrcStatus::Ran { total: tree.total() },
                tree.violation_records(),
                tree.total_mismatch(),
            ),
            Err(e) => (
                DrcStatus::Errored(e.source().to_string()),
                Vec::new(),
                None,
            ),
        },
        RunOutcome::ToolNotFound => {
            warn!("DRC tool not found; skipping DRC and running geometry checks only");
            (DrcStatus::Skipped, Vec::new(), None)
        }
        RunOutcome::ToolCrashed { exit_code, output } => {
            let code = exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            (
                DrcStatus::Errored(format!("tool crashed (exit {code}): {output}")),
                Vec::new(),
                None,
            )
        }
        RunOutcome::Timeout => (
            DrcStatus::Errored(format!("tool timed out after {}s", config.timeout_secs)),
            Vec::new(),
            None,
        ),
    };

    let findings = geometry::run_all_checks(layout, true);
    for finding in findings.iter() {
        finding.log();
    }

    let result = VerificationResult::compose(
        drc,
        violations,
        total_mismatch,
        findings,
        config.fail_on_violations,
    );
    write_artifacts(&result, config)?;
    Ok(result)
}

/// Writes the plain-text summary and its JSON sibling.
fn write_artifacts(result: &VerificationResult, config: &VerifyConfig) -> Result<()> {
    write_file(&config.summary, result.render_summary().as_bytes())?;
    let json = serde_json::to_vec_pretty(result)?;
    write_file(&config.summary.with_extension("json"), &json)?;
    Ok(())
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        with_err_context(std::fs::create_dir_all(parent), || {
            ErrorContext::CreateDir(parent.to_path_buf())
        })?;
    }
    with_err_context(std::fs::write(path, data), || {
        ErrorContext::CreateFile(path.to_path_buf())
    })
}

fn status_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Pass => "PASS",
        Severity::Warning => "WARNING",
        Severity::Fail => "FAIL",
    }
}
