//! Structural geometry checks, independent of any external tool.
//!
//! Verifies bounding boxes, port orientations, port widths, connectivity of
//! internal ports, and port-name uniqueness across a layout model. The
//! checker is a pure read-only traversal; it never mutates the layout and is
//! safe to run concurrently against independent layouts.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::layout::{Element, PortPath};
use crate::log::Log;

/// The canonical port orientations, in degrees.
pub const CANONICAL_ORIENTATIONS: [f64; 4] = [0.0, 90.0, 180.0, 270.0];

/// The fixed battery of geometry checks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    BoundingBoxes,
    PortOrientations,
    PortWidths,
    PortConnectivity,
    PortNames,
}

impl CheckKind {
    /// Every check in the battery, in summary order.
    pub const ALL: [CheckKind; 5] = [
        CheckKind::BoundingBoxes,
        CheckKind::PortOrientations,
        CheckKind::PortWidths,
        CheckKind::PortConnectivity,
        CheckKind::PortNames,
    ];
}

impl Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::BoundingBoxes => write!(f, "bounding boxes"),
            CheckKind::PortOrientations => write!(f, "port orientations"),
            CheckKind::PortWidths => write!(f, "port widths"),
            CheckKind::PortConnectivity => write!(f, "port connectivity"),
            CheckKind::PortNames => write!(f, "port names"),
        }
    }
}

/// Finding severity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Severity {
    Pass,
    Warning,
    Fail,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Pass => write!(f, "pass"),
            Severity::Warning => write!(f, "warning"),
            Severity::Fail => write!(f, "fail"),
        }
    }
}

/// The offending element (and, where applicable, port) of a finding.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Slash-joined path from the checked root to the element.
    pub element: ArcStr,
    pub port: Option<ArcStr>,
}

impl Location {
    pub fn element(element: impl Into<ArcStr>) -> Self {
        Self {
            element: element.into(),
            port: None,
        }
    }

    pub fn port(element: impl Into<ArcStr>, port: impl Into<ArcStr>) -> Self {
        Self {
            element: element.into(),
            port: Some(port.into()),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.port {
            Some(port) => write!(f, "element {}, port {}", self.element, port),
            None => write!(f, "element {}", self.element),
        }
    }
}

/// An enumeration of causes for a finding.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FindingCause {
    /// The element's bounding box encloses no area.
    DegenerateBbox { width: i64, height: i64 },
    /// A port orientation outside the canonical set, with no arbitrary-angle
    /// support declared.
    InvalidOrientation { degrees: f64 },
    /// A port width that disagrees with its declared cross-section. Width
    /// overrides are sometimes intentional, so this is a warning.
    WidthMismatch {
        width: i64,
        cross_section: ArcStr,
        expected: i64,
    },
    /// An internal port that is neither connected nor promoted.
    UnconnectedPort,
    /// An internal port with more than one connection.
    MultiplyConnected { count: usize },
    /// A port name reused within a single element's namespace.
    DuplicatePortName,
}

impl FindingCause {
    pub fn check(&self) -> CheckKind {
        match self {
            FindingCause::DegenerateBbox { .. } => CheckKind::BoundingBoxes,
            FindingCause::InvalidOrientation { .. } => CheckKind::PortOrientations,
            FindingCause::WidthMismatch { .. } => CheckKind::PortWidths,
            FindingCause::UnconnectedPort | FindingCause::MultiplyConnected { .. } => {
                CheckKind::PortConnectivity
            }
            FindingCause::DuplicatePortName => CheckKind::PortNames,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FindingCause::WidthMismatch { .. } => Severity::Warning,
            _ => Severity::Fail,
        }
    }
}

/// A single geometry finding. Generated fresh on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub loc: Location,
    pub cause: FindingCause,
}

impl Finding {
    pub fn new(loc: Location, cause: FindingCause) -> Self {
        Self { loc, cause }
    }

    #[inline]
    pub fn check(&self) -> CheckKind {
        self.cause.check()
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        self.cause.severity()
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            FindingCause::DegenerateBbox { width, height } => write!(
                f,
                "degenerate bounding box ({width} x {height}) at {}",
                self.loc
            ),
            FindingCause::InvalidOrientation { degrees } => {
                write!(f, "invalid port orientation {degrees}\u{b0} at {}", self.loc)
            }
            FindingCause::WidthMismatch {
                width,
                cross_section,
                expected,
            } => write!(
                f,
                "port width {width} disagrees with cross-section {cross_section} \
                 (expected {expected}) at {}",
                self.loc
            ),
            FindingCause::UnconnectedPort => {
                write!(f, "port is neither connected nor promoted: {}", self.loc)
            }
            FindingCause::MultiplyConnected { count } => {
                write!(f, "port has {count} connections (expected one): {}", self.loc)
            }
            FindingCause::DuplicatePortName => {
                write!(f, "duplicate port name: {}", self.loc)
            }
        }
    }
}

impl Log for Finding {
    fn log(&self) {
        use crate::log::{error, warn};
        match self.severity() {
            Severity::Fail => error!("{self}"),
            _ => warn!("{self}"),
        }
    }
}

/// Runs the full check battery against `layout`.
///
/// Every check runs even if earlier ones fail. The connectivity check applies
/// only when `is_top_level` is true; a sub-circuit is allowed to have ports
/// awaiting connection by its parent. When it applies, connectivity is
/// checked at every level of the hierarchy, not just among the root's direct
/// children.
pub fn run_all_checks(layout: &dyn Element, is_top_level: bool) -> Vec<Finding> {
    GeometryChecker {
        findings: Vec::new(),
    }
    .check(layout, is_top_level)
}

struct GeometryChecker {
    findings: Vec<Finding>,
}

impl GeometryChecker {
    fn check(mut self, layout: &dyn Element, is_top_level: bool) -> Vec<Finding> {
        let root_path = layout.name().to_string();
        self.check_element(layout, &root_path);
        if is_top_level {
            self.check_connectivity(layout, &root_path);
        }
        self.findings
    }

    /// Per-element checks, applied recursively.
    fn check_element(&mut self, element: &dyn Element, path: &str) {
        self.check_bbox(element, path);
        self.check_ports(element, path);
        self.check_port_names(element, path);
        for child in element.children() {
            let child_path = format!("{path}/{}", child.name());
            self.check_element(child, &child_path);
        }
    }

    fn check_bbox(&mut self, element: &dyn Element, path: &str) {
        let brect = element.brect();
        if brect.is_degenerate() {
            self.findings.push(Finding::new(
                Location::element(path),
                FindingCause::DegenerateBbox {
                    width: brect.width(),
                    height: brect.height(),
                },
            ));
        }
    }

    fn check_ports(&mut self, element: &dyn Element, path: &str) {
        let arbitrary = element.arbitrary_angles();
        for port in element.ports() {
            if !arbitrary && !is_canonical(port.orientation) {
                self.findings.push(Finding::new(
                    Location::port(path, port.name.clone()),
                    FindingCause::InvalidOrientation {
                        degrees: port.orientation,
                    },
                ));
            }
            if let Some(cross_section) = &port.cross_section {
                if port.width != cross_section.width {
                    self.findings.push(Finding::new(
                        Location::port(path, port.name.clone()),
                        FindingCause::WidthMismatch {
                            width: port.width,
                            cross_section: cross_section.name.clone(),
                            expected: cross_section.width,
                        },
                    ));
                }
            }
        }
    }

    fn check_port_names(&mut self, element: &dyn Element, path: &str) {
        let mut seen = HashSet::new();
        for port in element.ports() {
            if !seen.insert(port.name.clone()) {
                self.findings.push(Finding::new(
                    Location::port(path, port.name.clone()),
                    FindingCause::DuplicatePortName,
                ));
            }
        }
    }

    /// Every port on a child's boundary must be connected to exactly one
    /// other port or be promoted to a port of the container. Applied to
    /// every container in the hierarchy: each container's children are
    /// checked against that container's own connections and promotions. A
    /// port a child promotes joins the child's boundary and is accounted
    /// for here at the next level up.
    fn check_connectivity(&mut self, container: &dyn Element, path: &str) {
        let mut connection_counts: HashMap<PortPath, usize> = HashMap::new();
        for connection in container.connections() {
            *connection_counts.entry(connection.a).or_insert(0) += 1;
            *connection_counts.entry(connection.b).or_insert(0) += 1;
        }
        let promoted: HashSet<PortPath> = container.exposed_ports().into_iter().collect();

        for child in container.children() {
            let child_path = format!("{path}/{}", child.name());
            for name in boundary_port_names(child) {
                let key = PortPath::new(child.name(), name.clone());
                let connections = connection_counts.get(&key).copied().unwrap_or(0);
                let loc = Location::port(child_path.clone(), name);
                if connections == 0 && !promoted.contains(&key) {
                    self.findings
                        .push(Finding::new(loc, FindingCause::UnconnectedPort));
                } else if connections > 1 {
                    self.findings.push(Finding::new(
                        loc,
                        FindingCause::MultiplyConnected { count: connections },
                    ));
                }
            }
            self.check_connectivity(child, &child_path);
        }
    }
}

/// The ports visible on an element's boundary: its own ports plus the child
/// ports it promotes.
fn boundary_port_names(element: &dyn Element) -> Vec<ArcStr> {
    let mut names: Vec<ArcStr> = element.ports().into_iter().map(|p| p.name).collect();
    names.extend(element.exposed_ports().into_iter().map(|p| p.port));
    names
}

fn is_canonical(orientation: f64) -> bool {
    let normalized = orientation.rem_euclid(360.0);
    CANONICAL_ORIENTATIONS
        .iter()
        .any(|c| (normalized - c).abs() < 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Cell, CrossSection, Point, Port, PortPath, Rect};

    fn waveguide(name: &str) -> Cell {
        let mut cell = Cell::new(name, Rect::new(Point::zero(), Point::new(10_000, 450)));
        cell.add_port(Port::new("o1", Point::new(0, 225), 450, 180.0));
        cell.add_port(Port::new("o2", Point::new(10_000, 225), 450, 0.0));
        cell
    }

    fn findings_of_kind(findings: &[Finding], kind: CheckKind) -> Vec<&Finding> {
        findings.iter().filter(|f| f.check() == kind).collect()
    }

    #[test]
    fn clean_waveguide_has_no_findings() {
        let wg = waveguide("wg");
        assert!(run_all_checks(&wg, false).is_empty());
    }

    #[test]
    fn degenerate_bbox_is_a_fail() {
        let cell = Cell::new("flat", Rect::new(Point::zero(), Point::new(1_000, 0)));
        let findings = run_all_checks(&cell, false);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check(), CheckKind::BoundingBoxes);
        assert_eq!(findings[0].severity(), Severity::Fail);
        assert_eq!(findings[0].loc.element.as_str(), "flat");
    }

    #[test]
    fn descendant_bboxes_are_checked() {
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(100, 100)));
        let mut mid = Cell::new("mid", Rect::new(Point::zero(), Point::new(50, 50)));
        mid.add_child(Cell::new("empty", Rect::default()));
        top.add_child(mid);
        let findings = run_all_checks(&top, false);
        let bbox = findings_of_kind(&findings, CheckKind::BoundingBoxes);
        assert_eq!(bbox.len(), 1);
        assert_eq!(bbox[0].loc.element.as_str(), "top/mid/empty");
    }

    #[test]
    fn forty_five_degree_port_is_a_fail() {
        let mut cell = Cell::new("bend", Rect::new(Point::zero(), Point::new(1_000, 1_000)));
        cell.add_port(Port::new("o1", Point::zero(), 450, 45.0));
        let findings = run_all_checks(&cell, false);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check(), CheckKind::PortOrientations);
        assert_eq!(findings[0].severity(), Severity::Fail);
        assert_eq!(findings[0].loc.port.as_deref(), Some("o1"));
    }

    #[test]
    fn canonical_ports_produce_no_orientation_findings() {
        let mut cell = Cell::new("cross", Rect::new(Point::zero(), Point::new(1_000, 1_000)));
        for (i, angle) in [0.0, 90.0, 180.0, 270.0, 360.0, -90.0].iter().enumerate() {
            cell.add_port(Port::new(format!("o{i}"), Point::zero(), 450, *angle));
        }
        let findings = run_all_checks(&cell, false);
        assert!(findings_of_kind(&findings, CheckKind::PortOrientations).is_empty());
    }

    #[test]
    fn arbitrary_angle_declaration_permits_odd_orientations() {
        let mut cell = Cell::new("spiral", Rect::new(Point::zero(), Point::new(1_000, 1_000)));
        cell.allow_arbitrary_angles();
        cell.add_port(Port::new("o1", Point::zero(), 450, 37.5));
        assert!(run_all_checks(&cell, false).is_empty());
    }

    #[test]
    fn width_mismatch_is_a_warning() {
        let mut cell = Cell::new("taper", Rect::new(Point::zero(), Point::new(1_000, 1_000)));
        cell.add_port(
            Port::new("o1", Point::zero(), 500, 0.0)
                .with_cross_section(CrossSection::new("strip", 450)),
        );
        let findings = run_all_checks(&cell, false);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check(), CheckKind::PortWidths);
        assert_eq!(findings[0].severity(), Severity::Warning);
    }

    #[test]
    fn duplicate_port_names_are_fails() {
        let mut cell = Cell::new("mmi", Rect::new(Point::zero(), Point::new(1_000, 1_000)));
        cell.add_port(Port::new("o1", Point::zero(), 450, 0.0));
        cell.add_port(Port::new("o1", Point::new(0, 450), 450, 0.0));
        // Case-sensitive: O1 is a distinct name.
        cell.add_port(Port::new("O1", Point::new(0, 900), 450, 0.0));
        let findings = run_all_checks(&cell, false);
        let dups = findings_of_kind(&findings, CheckKind::PortNames);
        assert_eq!(dups.len(), 1);
    }

    fn fully_wired_top() -> Cell {
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
        top.add_child(waveguide("wg0"));
        top.add_child(waveguide("wg1"));
        top.connect(PortPath::new("wg0", "o2"), PortPath::new("wg1", "o1"));
        top.expose(PortPath::new("wg0", "o1"));
        top.expose(PortPath::new("wg1", "o2"));
        top
    }

    #[test]
    fn unpromoted_unconnected_port_fails_at_top_level() {
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
        top.add_child(waveguide("wg0"));
        top.add_child(waveguide("wg1"));
        top.connect(PortPath::new("wg0", "o2"), PortPath::new("wg1", "o1"));
        top.expose(PortPath::new("wg0", "o1"));
        // wg1/o2 is neither connected nor promoted.
        let findings = run_all_checks(&top, true);
        let conn = findings_of_kind(&findings, CheckKind::PortConnectivity);
        assert_eq!(conn.len(), 1);
        assert_eq!(conn[0].loc.element.as_str(), "top/wg1");
        assert_eq!(conn[0].loc.port.as_deref(), Some("o2"));
        assert_eq!(conn[0].severity(), Severity::Fail);
    }

    #[test]
    fn connectivity_is_skipped_below_top_level() {
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
        top.add_child(waveguide("wg0"));
        top.add_child(waveguide("wg1"));
        top.connect(PortPath::new("wg0", "o2"), PortPath::new("wg1", "o1"));
        top.expose(PortPath::new("wg0", "o1"));
        let findings = run_all_checks(&top, false);
        assert!(findings_of_kind(&findings, CheckKind::PortConnectivity).is_empty());
    }

    #[test]
    fn fully_wired_top_passes_connectivity() {
        let top = fully_wired_top();
        let findings = run_all_checks(&top, true);
        assert!(findings_of_kind(&findings, CheckKind::PortConnectivity).is_empty());
    }

    #[test]
    fn dangling_grandchild_port_is_detected() {
        let mut mid = Cell::new("mid", Rect::new(Point::zero(), Point::new(12_000, 1_000)));
        mid.add_child(waveguide("wg"));
        mid.expose(PortPath::new("wg", "o1"));
        // wg/o2 is neither connected nor promoted inside mid.
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
        top.add_child(mid);
        top.expose(PortPath::new("mid", "o1"));

        let findings = run_all_checks(&top, true);
        let conn = findings_of_kind(&findings, CheckKind::PortConnectivity);
        assert_eq!(conn.len(), 1);
        assert_eq!(conn[0].loc.element.as_str(), "top/mid/wg");
        assert_eq!(conn[0].loc.port.as_deref(), Some("o2"));
        assert!(matches!(conn[0].cause, FindingCause::UnconnectedPort));
    }

    fn mid_with_promoted_waveguide() -> Cell {
        let mut mid = Cell::new("mid", Rect::new(Point::zero(), Point::new(12_000, 1_000)));
        mid.add_child(waveguide("wg"));
        mid.expose(PortPath::new("wg", "o1"));
        mid.expose(PortPath::new("wg", "o2"));
        mid
    }

    #[test]
    fn promoted_ports_join_the_boundary_at_the_next_level_up() {
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
        top.add_child(mid_with_promoted_waveguide());
        top.expose(PortPath::new("mid", "o1"));
        top.expose(PortPath::new("mid", "o2"));
        assert!(run_all_checks(&top, true).is_empty());
    }

    #[test]
    fn promoted_port_left_dangling_by_the_parent_is_flagged() {
        let mut top = Cell::new("top", Rect::new(Point::zero(), Point::new(30_000, 1_000)));
        top.add_child(mid_with_promoted_waveguide());
        top.expose(PortPath::new("mid", "o1"));
        // mid's promoted o2 is never handled by top.
        let findings = run_all_checks(&top, true);
        let conn = findings_of_kind(&findings, CheckKind::PortConnectivity);
        assert_eq!(conn.len(), 1);
        assert_eq!(conn[0].loc.element.as_str(), "top/mid");
        assert_eq!(conn[0].loc.port.as_deref(), Some("o2"));
    }

    #[test]
    fn double_connection_is_flagged() {
        let mut top = fully_wired_top();
        // A second connection on wg0/o2.
        top.connect(PortPath::new("wg0", "o2"), PortPath::new("wg1", "o1"));
        let findings = run_all_checks(&top, true);
        let conn = findings_of_kind(&findings, CheckKind::PortConnectivity);
        assert_eq!(conn.len(), 2);
        assert!(conn
            .iter()
            .all(|f| matches!(f.cause, FindingCause::MultiplyConnected { count: 2 })));
    }

    #[test]
    fn checks_do_not_short_circuit() {
        // One layout with a degenerate bbox, a bad orientation, a width
        // mismatch, and a duplicate name: all four surface.
        let mut cell = Cell::new("broken", Rect::default());
        cell.add_port(Port::new("o1", Point::zero(), 450, 45.0));
        cell.add_port(
            Port::new("o1", Point::zero(), 500, 0.0)
                .with_cross_section(CrossSection::new("strip", 450)),
        );
        let findings = run_all_checks(&cell, false);
        for kind in [
            CheckKind::BoundingBoxes,
            CheckKind::PortOrientations,
            CheckKind::PortWidths,
            CheckKind::PortNames,
        ] {
            assert!(
                !findings_of_kind(&findings, kind).is_empty(),
                "expected a {kind} finding"
            );
        }
    }
}
