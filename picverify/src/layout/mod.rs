//! The layout-model contract consumed by the verification pipeline.
//!
//! The pipeline never builds layouts itself; it reads them through the
//! [`Element`] trait, which any object exposing a bounding box, named ports,
//! and child elements can implement. [`Cell`] is the concrete implementation
//! used by layout-producing collaborators and by this crate's tests.

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

/// A point in two-dimensional layout-space, in database units.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }
}

/// An axis-aligned rectangle, specified by opposite corners.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    /// The lower-left corner.
    pub p0: Point,
    /// The upper-right corner.
    pub p1: Point,
}

impl Rect {
    pub fn new(p0: Point, p1: Point) -> Self {
        Self { p0, p1 }
    }

    pub fn width(&self) -> i64 {
        self.p1.x - self.p0.x
    }

    pub fn height(&self) -> i64 {
        self.p1.y - self.p0.y
    }

    /// The smallest rectangle containing both `self` and `other`.
    pub fn union(self, other: Self) -> Self {
        Self::new(
            Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        )
    }

    /// A rectangle is degenerate if it encloses no area.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// A waveguide cross-section class, which implies a nominal port width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossSection {
    pub name: ArcStr,
    /// Nominal width in database units.
    pub width: i64,
}

impl CrossSection {
    pub fn new(name: impl Into<ArcStr>, width: i64) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// A named, positioned, oriented connection point on a layout element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: ArcStr,
    pub center: Point,
    /// Width in database units.
    pub width: i64,
    /// Orientation in degrees, counterclockwise from the positive x-axis.
    pub orientation: f64,
    /// The cross-section this port was drawn with, if declared.
    pub cross_section: Option<CrossSection>,
}

impl Port {
    pub fn new(name: impl Into<ArcStr>, center: Point, width: i64, orientation: f64) -> Self {
        Self {
            name: name.into(),
            center,
            width,
            orientation,
            cross_section: None,
        }
    }

    pub fn with_cross_section(mut self, cross_section: CrossSection) -> Self {
        self.cross_section = Some(cross_section);
        self
    }
}

/// A reference to a port on a named child instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPath {
    pub instance: ArcStr,
    pub port: ArcStr,
}

impl PortPath {
    pub fn new(instance: impl Into<ArcStr>, port: impl Into<ArcStr>) -> Self {
        Self {
            instance: instance.into(),
            port: port.into(),
        }
    }
}

/// A connection between two ports of child instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub a: PortPath,
    pub b: PortPath,
}

impl Connection {
    pub fn new(a: PortPath, b: PortPath) -> Self {
        Self { a, b }
    }
}

/// The capability set the verification pipeline requires of a layout model.
///
/// Composition, not inheritance: any object exposing a bounding box, ports,
/// and children satisfies this contract, and children satisfy it recursively.
/// Implementations are read-only from the pipeline's point of view.
pub trait Element {
    /// The element's name, unique among its siblings.
    fn name(&self) -> ArcStr;

    /// The element's bounding rectangle.
    fn brect(&self) -> Rect;

    /// The element's own ports.
    fn ports(&self) -> Vec<Port>;

    /// Child elements placed inside this element.
    fn children(&self) -> Vec<&dyn Element>;

    /// Connections between ports of child instances.
    fn connections(&self) -> Vec<Connection> {
        Vec::new()
    }

    /// Child ports promoted to ports of this element.
    fn exposed_ports(&self) -> Vec<PortPath> {
        Vec::new()
    }

    /// Whether this element's ports may use non-canonical orientations.
    fn arbitrary_angles(&self) -> bool {
        false
    }
}

/// A concrete layout element.
///
/// Layout generation is out of scope for this crate; [`Cell`] exists so that
/// collaborators (and tests) have a ready-made [`Element`] implementation to
/// hand to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    name: ArcStr,
    rect: Rect,
    ports: Vec<Port>,
    children: Vec<Cell>,
    connections: Vec<Connection>,
    exposed: Vec<PortPath>,
    arbitrary_angles: bool,
}

impl Cell {
    pub fn new(name: impl Into<ArcStr>, rect: Rect) -> Self {
        Self {
            name: name.into(),
            rect,
            ..Default::default()
        }
    }

    pub fn add_port(&mut self, port: Port) -> &mut Self {
        self.ports.push(port);
        self
    }

    pub fn add_child(&mut self, child: Cell) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Records a connection between two child ports.
    pub fn connect(&mut self, a: PortPath, b: PortPath) -> &mut Self {
        self.connections.push(Connection::new(a, b));
        self
    }

    /// Promotes a child port to a port of this cell.
    pub fn expose(&mut self, path: PortPath) -> &mut Self {
        self.exposed.push(path);
        self
    }

    pub fn allow_arbitrary_angles(&mut self) -> &mut Self {
        self.arbitrary_angles = true;
        self
    }
}

impl Element for Cell {
    fn name(&self) -> ArcStr {
        self.name.clone()
    }

    fn brect(&self) -> Rect {
        self.children
            .iter()
            .map(|c| c.brect())
            .fold(self.rect, Rect::union)
    }

    fn ports(&self) -> Vec<Port> {
        self.ports.clone()
    }

    fn children(&self) -> Vec<&dyn Element> {
        self.children.iter().map(|c| c as &dyn Element).collect()
    }

    fn connections(&self) -> Vec<Connection> {
        self.connections.clone()
    }

    fn exposed_ports(&self) -> Vec<PortPath> {
        self.exposed.clone()
    }

    fn arbitrary_angles(&self) -> bool {
        self.arbitrary_angles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brect_includes_children() {
        let mut top = Cell::new(
            "top",
            Rect::new(Point::zero(), Point::new(1_000, 1_000)),
        );
        top.add_child(Cell::new(
            "wg0",
            Rect::new(Point::new(-500, 0), Point::new(2_000, 450)),
        ));
        let brect = top.brect();
        assert_eq!(brect.p0, Point::new(-500, 0));
        assert_eq!(brect.p1, Point::new(2_000, 1_000));
    }

    #[test]
    fn degenerate_rect_detection() {
        assert!(Rect::new(Point::zero(), Point::new(0, 100)).is_degenerate());
        assert!(Rect::new(Point::zero(), Point::zero()).is_degenerate());
        assert!(!Rect::new(Point::zero(), Point::new(1, 1)).is_degenerate());
    }
}
