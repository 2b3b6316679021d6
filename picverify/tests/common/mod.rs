use std::cell::RefCell;
use std::path::Path;

use picverify::config::VerifyConfig;
use picverify::error::Result;
use picverify::layout::{Cell, Point, Port, PortPath, Rect};
use picverify::verification::drc::{DrcInput, DrcTool, RunOutcome};

/// Canned behaviors for the fake DRC tool used by the end-to-end tests.
pub enum FakeBehavior {
    /// Write the given report XML and complete.
    Report(&'static str),
    NotFound,
    Crash,
    Timeout,
}

/// A [`DrcTool`] double that records its inputs and never spawns anything.
pub struct FakeDrc {
    pub behavior: FakeBehavior,
    pub calls: RefCell<Vec<DrcInput>>,
}

impl FakeDrc {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl DrcTool for FakeDrc {
    fn run_drc(&self, input: DrcInput) -> Result<RunOutcome> {
        self.calls.borrow_mut().push(input.clone());
        match &self.behavior {
            FakeBehavior::Report(xml) => {
                std::fs::write(&input.report_path, xml)?;
                Ok(RunOutcome::Completed(input.report_path))
            }
            FakeBehavior::NotFound => Ok(RunOutcome::ToolNotFound),
            FakeBehavior::Crash => Ok(RunOutcome::ToolCrashed {
                exit_code: Some(139),
                output: "segfault in rule engine".to_string(),
            }),
            FakeBehavior::Timeout => Ok(RunOutcome::Timeout),
        }
    }
}

/// A config rooted in `dir`, with stub GDS and rule-deck files on disk so
/// validation passes.
pub fn test_config(dir: &Path) -> VerifyConfig {
    let gds = dir.join("top.gds");
    let rules = dir.join("rules.drc");
    std::fs::write(&gds, b"gds stub").unwrap();
    std::fs::write(&rules, b"# rules stub").unwrap();
    VerifyConfig::builder()
        .layout_gds(gds)
        .rules(rules)
        .report(dir.join("reports").join("drc_report.xml"))
        .log(dir.join("reports").join("drc_run.log"))
        .summary(dir.join("reports").join("verification_summary.txt"))
        .build()
        .unwrap()
}

fn waveguide(name: &str) -> Cell {
    let mut cell = Cell::new(name, Rect::new(Point::zero(), Point::new(10_000, 450)));
    cell.add_port(Port::new("o1", Point::new(0, 225), 450, 180.0));
    cell.add_port(Port::new("o2", Point::new(10_000, 225), 450, 0.0));
    cell
}

/// A two-waveguide chip with every internal port connected or promoted.
pub fn clean_top() -> Cell {
    let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
    top.add_child(waveguide("wg0"));
    top.add_child(waveguide("wg1"));
    top.connect(PortPath::new("wg0", "o2"), PortPath::new("wg1", "o1"));
    top.expose(PortPath::new("wg0", "o1"));
    top.expose(PortPath::new("wg1", "o2"));
    top
}

/// Like [`clean_top`], but `wg1/o2` is left dangling.
pub fn dangling_top() -> Cell {
    let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
    top.add_child(waveguide("wg0"));
    top.add_child(waveguide("wg1"));
    top.connect(PortPath::new("wg0", "o2"), PortPath::new("wg1", "o1"));
    top.expose(PortPath::new("wg0", "o1"));
    top
}

pub const CLEAN_REPORT: &str = r#"
<report-database>
 <categories>
  <category><name>WG.1</name><num-items>0</num-items></category>
 </categories>
 <total-items>0</total-items>
</report-database>
"#;

pub const DIRTY_REPORT: &str = r#"
<report-database>
 <categories>
  <category><name>WG.1</name><num-items>1</num-items></category>
  <category><name>WG.2</name><num-items>2</num-items></category>
 </categories>
 <total-items>3</total-items>
</report-database>
"#;
