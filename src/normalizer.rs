//! Schema detection and normalization.
//!
//! Two document shapes are understood:
//!
//! * **clean**: a container of `<incidencia id="..">` elements with one named
//!   child per field;
//! * **tabular**: a spreadsheet export made of `Row`/`Cell` elements whose
//!   cells map positionally onto [`CANONICAL_FIELDS`], optionally preceded by
//!   a header row.
//!
//! Either way the output is a sequence of [`IncidentRecord`]s whose date lies
//! inside the configured [`YearRange`].

use serde::{Deserialize, Serialize};

use crate::dates::YearRange;
use crate::error::IngestError;
use crate::extract::extract_child;
use crate::record::{CANONICAL_FIELDS, FIELD_COUNT, IncidentRecord};
use crate::xml_tree::{XmlNode, parse_document};

pub const DEFAULT_CONTAINER_TAG: &str = "incidencies";
pub const DEFAULT_INCIDENT_TAG: &str = "incidencia";
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";
pub const DEFAULT_ROW_TAG: &str = "Row";
pub const DEFAULT_CELL_TAG: &str = "Cell";
/// Spreadsheet column-position attribute (1-based), matched by local name.
const CELL_INDEX_ATTRIBUTE: &str = "Index";
/// Number of extra columns a merged cell covers.
const CELL_MERGE_ATTRIBUTE: &str = "MergeAcross";
const CELL_DATA_TAG: &str = "Data";
const CELL_COMMENT_TAG: &str = "Comment";

/// Child tags of a clean-shape incident, in `CANONICAL_FIELDS` order.
pub const DEFAULT_FIELD_TAGS: [&str; FIELD_COUNT] = [
    "marca_temps",
    "nom",
    "email",
    "aula",
    "data",
    "hora",
    "equip",
    "tipus",
    "descripcio",
    "prioritat",
    "comentaris",
];

pub const DEFAULT_HEADER_KEYWORDS: [&str; 4] = ["Marca de temps", "Timestamp", "Correu", "Prioritat"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub container_tag: String,
    pub incident_tag: String,
    pub id_attribute: String,
    pub field_tags: [String; FIELD_COUNT],
    pub row_tag: String,
    pub cell_tag: String,
    /// Case-sensitive substrings; the first row with a cell containing one is the header.
    pub header_keywords: Vec<String>,
    pub years: YearRange,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            container_tag: DEFAULT_CONTAINER_TAG.to_string(),
            incident_tag: DEFAULT_INCIDENT_TAG.to_string(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            field_tags: DEFAULT_FIELD_TAGS.map(str::to_string),
            row_tag: DEFAULT_ROW_TAG.to_string(),
            cell_tag: DEFAULT_CELL_TAG.to_string(),
            header_keywords: DEFAULT_HEADER_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            years: YearRange::default(),
        }
    }
}

impl NormalizerConfig {
    pub fn with_field_tags(mut self, tags: Vec<String>) -> Result<Self, IngestError> {
        let n = tags.len();
        self.field_tags = <[String; FIELD_COUNT]>::try_from(tags)
            .map_err(|_| IngestError::Config(format!("expected {} field tags, got {}", FIELD_COUNT, n)))?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.years.min > self.years.max {
            return Err(IngestError::Config(format!("year window {}..={} is empty", self.years.min, self.years.max)));
        }
        for (what, v) in [("container tag", &self.container_tag), ("incident tag", &self.incident_tag), ("row tag", &self.row_tag), ("cell tag", &self.cell_tag)] {
            if v.trim().is_empty() { return Err(IngestError::Config(format!("{} must not be empty", what))); }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind { Clean, Tabular }

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self { ShapeKind::Clean => "clean", ShapeKind::Tabular => "tabular" })
    }
}

/// Detection result, carrying only what its own walk needs.
#[derive(Debug)]
pub enum Shape<'a> {
    Clean { incidents: Vec<&'a XmlNode> },
    Tabular { rows: Vec<&'a XmlNode> },
}

impl Shape<'_> {
    pub fn kind(&self) -> ShapeKind {
        match self { Shape::Clean { .. } => ShapeKind::Clean, Shape::Tabular { .. } => ShapeKind::Tabular }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalized {
    pub shape: ShapeKind,
    /// Candidate records seen, header row excluded.
    pub scanned: usize,
    pub records: Vec<IncidentRecord>,
}

impl Normalized {
    pub fn dropped(&self) -> usize { self.scanned - self.records.len() }
}

pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Normalizer { config }
    }

    pub fn detect<'a>(&self, root: &'a XmlNode) -> Shape<'a> {
        let incidents: Vec<&XmlNode> = root.descendants().filter(|n| n.local_name() == self.config.incident_tag).collect();
        if root.name.ends_with(&self.config.container_tag) || !incidents.is_empty() {
            return Shape::Clean { incidents };
        }
        let rows = root.descendants().filter(|n| n.local_name() == self.config.row_tag).collect();
        Shape::Tabular { rows }
    }

    pub fn normalize(&self, root: &XmlNode) -> Normalized {
        let shape = self.detect(root);
        log::info!("Detected {} shape (root <{}>)", shape.kind(), root.name);
        let out = match shape {
            Shape::Clean { incidents } => self.walk_clean(&incidents),
            Shape::Tabular { rows } => self.walk_tabular(&rows),
        };
        log::info!("Kept {} of {} incidents ({} dropped by date)", out.records.len(), out.scanned, out.dropped());
        out
    }

    pub fn normalize_str(&self, xml: &str) -> Result<Normalized, IngestError> {
        let root = parse_document(xml)?;
        Ok(self.normalize(&root))
    }

    fn walk_clean(&self, incidents: &[&XmlNode]) -> Normalized {
        let mut records = Vec::new();
        for inc in incidents {
            let id = inc.attr(&self.config.id_attribute).unwrap_or_default().to_string();
            let values = std::array::from_fn(|i| extract_child(inc, &self.config.field_tags[i]));
            self.keep(IncidentRecord::from_fields(id, values), &mut records);
        }
        Normalized { shape: ShapeKind::Clean, scanned: incidents.len(), records }
    }

    fn walk_tabular(&self, rows: &[&XmlNode]) -> Normalized {
        let mut records = Vec::new();
        let mut scanned = 0usize;
        let mut header_seen = false;
        for row in rows {
            let cells = self.cell_values(row);
            if !header_seen && self.is_header(&cells) {
                header_seen = true;
                log::debug!("Skipping header row: {}", cells.join(" | "));
                continue;
            }
            scanned += 1;
            let mut cells = cells.into_iter();
            let values = std::array::from_fn(|_| cells.next().unwrap_or_default());
            self.keep(IncidentRecord::from_fields(String::new(), values), &mut records);
        }
        Normalized { shape: ShapeKind::Tabular, scanned, records }
    }

    /// Cell texts by column position, honouring the spreadsheet `Index` and
    /// `MergeAcross` attributes.
    fn cell_values(&self, row: &XmlNode) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for cell in row.children_named(&self.config.cell_tag) {
            if let Some(idx) = numeric_attr(cell, CELL_INDEX_ATTRIBUTE) {
                if idx > FIELD_COUNT { break; }
                if idx > out.len() {
                    out.resize(idx - 1, String::new());
                } else {
                    log::debug!("Ignoring non-increasing cell index {} at column {}", idx, out.len() + 1);
                }
            }
            out.push(cell_text(cell).trim().to_string());
            let span = numeric_attr(cell, CELL_MERGE_ATTRIBUTE).unwrap_or(0).min(FIELD_COUNT);
            out.resize(out.len() + span, String::new());
        }
        out
    }

    fn is_header(&self, cells: &[String]) -> bool {
        cells.iter().any(|c| self.config.header_keywords.iter().any(|k| !k.is_empty() && c.contains(k.as_str())))
    }

    fn keep(&self, record: IncidentRecord, records: &mut Vec<IncidentRecord>) {
        if self.config.years.accepts(&record.date) {
            records.push(record);
        } else {
            log::debug!("Dropping incident '{}' ({}) with implausible date {:?}", record.id, record.name, record.date);
        }
    }
}

/// A cell's value lives in its `Data` child; notes sit beside it in `Comment`.
fn cell_text(cell: &XmlNode) -> String {
    match cell.child(CELL_DATA_TAG) {
        Some(data) => data.text_content(),
        None => cell.text_content_skipping(CELL_COMMENT_TAG),
    }
}

fn numeric_attr(node: &XmlNode, key: &str) -> Option<usize> {
    node.attr(key).and_then(|s| s.trim().parse::<usize>().ok())
}

/// Canonical field names paired with the clean-shape tag each one reads from.
pub fn field_mapping(config: &NormalizerConfig) -> Vec<(&'static str, &str)> {
    CANONICAL_FIELDS.iter().zip(config.field_tags.iter()).map(|(f, t)| (*f, t.as_str())).collect()
}
