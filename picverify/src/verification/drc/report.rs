//! Violation-report parsing.
//!
//! The external checker writes an XML report database: a hierarchy of named
//! categories, each either containing sub-categories or carrying a leaf item
//! count, plus an optional root-level total. This module loads that file into
//! a [`ReportCategoryTree`] and derives the per-rule violation records.
//!
//! The tree abstraction is format-agnostic: anything able to produce
//! [`Category`] values (with the tri-state [`SubCategories`] probe) can feed
//! the same aggregation path the XML parser uses.

use std::path::Path;

use arcstr::ArcStr;
use itertools::Itertools;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorSource, Result, VerifyError};
use crate::log::warn;

/// The result of asking a report node for its sub-categories.
///
/// Some report formats raise an unsupported-operation condition instead of
/// returning an empty list; that case is modeled explicitly rather than
/// swallowed, and is treated as "no children" when classifying leaves.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum SubCategories {
    /// The node has sub-categories.
    Listed(Vec<Category>),
    /// The node has no sub-categories.
    #[default]
    Empty,
    /// The format could not enumerate sub-categories for this node.
    /// Conservatively treated as a leaf.
    Unsupported,
}

impl SubCategories {
    /// Normalizes an empty child list to [`SubCategories::Empty`].
    pub fn from_children(children: Vec<Category>) -> Self {
        if children.is_empty() {
            Self::Empty
        } else {
            Self::Listed(children)
        }
    }
}

/// A single category node of the violation report.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The category's local name.
    pub name: ArcStr,
    /// The dot-joined path from the report root to this category.
    pub path: ArcStr,
    /// The category's own reported item count. Authoritative only at leaves.
    pub item_count: u64,
    /// Sub-category probe result.
    pub sub: SubCategories,
}

impl Category {
    /// Sub-categories. Empty for leaves and for unsupported probes.
    pub fn children(&self) -> &[Category] {
        match &self.sub {
            SubCategories::Listed(children) => children,
            SubCategories::Empty | SubCategories::Unsupported => &[],
        }
    }

    /// A category is a leaf iff it has no sub-categories. An unsupported
    /// sub-category probe counts as "no sub-categories".
    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }
}

/// A `(rule_path, count)` pair derived from a leaf category.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub rule: ArcStr,
    pub count: u64,
}

/// An in-memory violation report. Built once by [`parse_report`]; read-only
/// thereafter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReportCategoryTree {
    categories: Vec<Category>,
    reported_total: Option<u64>,
}

impl ReportCategoryTree {
    pub fn new(categories: Vec<Category>, reported_total: Option<u64>) -> Self {
        Self {
            categories,
            reported_total,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// The sum of leaf item counts, recursively.
    pub fn leaf_total(&self) -> u64 {
        fn sum(categories: &[Category]) -> u64 {
            categories
                .iter()
                .map(|c| {
                    if c.is_leaf() {
                        c.item_count
                    } else {
                        sum(c.children())
                    }
                })
                .sum()
        }
        sum(&self.categories)
    }

    /// The total violation count: the root-reported figure when the format
    /// provides one, otherwise the leaf sum.
    pub fn total(&self) -> u64 {
        self.reported_total.unwrap_or_else(|| self.leaf_total())
    }

    /// Returns `(reported, leaf_sum)` when the root-reported total disagrees
    /// with the leaf sum. The mismatch is surfaced as a warning, not an error;
    /// neither figure is silently trusted over the other.
    pub fn total_mismatch(&self) -> Option<(u64, u64)> {
        let reported = self.reported_total?;
        let leaves = self.leaf_total();
        (reported != leaves).then_some((reported, leaves))
    }

    /// Per-rule violation records from leaves with a non-zero count, ordered
    /// by count descending, then by rule path ascending.
    pub fn violation_records(&self) -> Vec<ViolationRecord> {
        fn collect(categories: &[Category], out: &mut Vec<ViolationRecord>) {
            for category in categories {
                if !category.is_leaf() {
                    collect(category.children(), out);
                } else if category.item_count > 0 {
                    out.push(ViolationRecord {
                        rule: category.path.clone(),
                        count: category.item_count,
                    });
                }
            }
        }
        let mut records = Vec::new();
        collect(&self.categories, &mut records);
        records
            .into_iter()
            .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.rule.cmp(&b.rule)))
            .collect()
    }
}

/// Loads a violation report from disk.
///
/// Fails with [`ErrorSource::ReportNotFound`] if `path` does not exist and
/// with [`ErrorSource::ReportFormat`] if the file cannot be interpreted as a
/// report database.
pub fn parse_report(path: impl AsRef<Path>) -> Result<ReportCategoryTree> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            VerifyError::new(ErrorSource::ReportNotFound(path.to_path_buf()))
        }
        _ => VerifyError::new(ErrorSource::Io(e)),
    })?;
    let tree = parse_report_str(&data)?;
    if let Some((reported, leaves)) = tree.total_mismatch() {
        warn!(
            "report {path:?}: root total {reported} disagrees with leaf sum {leaves}; \
             using the root total"
        );
    }
    Ok(tree)
}

/// Parses a report database from its XML serialization.
pub fn parse_report_str(data: &str) -> Result<ReportCategoryTree> {
    let mut reader = Reader::from_str(data);
    reader.trim_text(true);

    let mut categories = Vec::new();
    let mut reported_total = None;
    let mut in_db = false;
    let mut done = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.name().as_ref() {
                b"report-database" => in_db = true,
                b"categories" if in_db => {
                    categories = parse_children(&mut reader, None)?;
                }
                b"total-items" if in_db => {
                    let text = read_text(&mut reader, b"total-items")?;
                    reported_total = Some(parse_count(&text, "total-items")?);
                }
                _ if in_db => {
                    // Skip elements we do not aggregate, e.g. <description>.
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
                other => {
                    return Err(format_err(format!(
                        "expected <report-database>, found <{}>",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::End(e) if e.name().as_ref() == b"report-database" => {
                done = true;
                break;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !done {
        return Err(format_err("missing <report-database> root element"));
    }

    Ok(ReportCategoryTree::new(categories, reported_total))
}

/// Parses the contents of a `<categories>` element, up to its end tag.
fn parse_children(reader: &mut Reader<&[u8]>, parent_path: Option<&str>) -> Result<Vec<Category>> {
    let mut out = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) if e.name().as_ref() == b"category" => {
                out.push(parse_category(reader, parent_path)?);
            }
            Event::End(e) if e.name().as_ref() == b"categories" => break,
            Event::Eof => return Err(format_err("unterminated <categories>")),
            _ => {}
        }
    }
    Ok(out)
}

/// Parses a single `<category>` element, up to its end tag.
fn parse_category(reader: &mut Reader<&[u8]>, parent_path: Option<&str>) -> Result<Category> {
    let mut name: Option<ArcStr> = None;
    let mut item_count = 0;
    let mut sub = SubCategories::Empty;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.name().as_ref() {
                b"name" => {
                    name = Some(ArcStr::from(read_text(reader, b"name")?));
                }
                b"num-items" => {
                    let text = read_text(reader, b"num-items")?;
                    item_count = parse_count(&text, "num-items")?;
                }
                b"categories" => {
                    let name = name
                        .as_ref()
                        .ok_or_else(|| format_err("category name must precede sub-categories"))?;
                    let path = join_path(parent_path, name);
                    sub = SubCategories::from_children(parse_children(reader, Some(&path))?);
                }
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"category" => break,
            Event::Eof => return Err(format_err("unterminated <category>")),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| format_err("category without a <name>"))?;
    let path = ArcStr::from(join_path(parent_path, &name));
    Ok(Category {
        name,
        path,
        item_count,
        sub,
    })
}

fn join_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_string(),
    }
}

fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String> {
    reader
        .read_text(quick_xml::name::QName(end))
        .map(|t| t.into_owned())
        .map_err(xml_err)
}

fn parse_count(text: &str, field: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|_| format_err(format!("invalid {field} count: {text:?}")))
}

fn xml_err(e: quick_xml::Error) -> VerifyError {
    VerifyError::new(ErrorSource::ReportFormat(e.to_string()))
}

fn format_err(msg: impl Into<String>) -> VerifyError {
    VerifyError::new(ErrorSource::ReportFormat(msg.into()))
}
