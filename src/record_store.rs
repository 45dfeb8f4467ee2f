// 📂 Record Store - load annotator files and group votes per item
//
// Every source file is one annotator's pass over the same items. The first
// time an id is seen it becomes an Item; every row after that only adds votes.

use crate::error::{ConsensusError, Result};
use crate::labels::{Axis, UNRESOLVED};
use crate::normalizer::TextNormalizer;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Columns every annotator row must carry
pub const REQUIRED_COLUMNS: [&str; 4] = ["id", "text", "explicitness", "target"];

// ============================================================================
// ITEM
// ============================================================================

/// One tweet. Text and metadata never change after load; labels do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,

    pub text: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub source: String,

    #[serde(rename = "user.description", default)]
    pub user_description: String,

    #[serde(default)]
    pub split: String,

    #[serde(default)]
    pub explicitness: String,

    #[serde(default)]
    pub target: String,

    /// Canonical text for duplicate lookups, derived on load and never written
    #[serde(skip)]
    pub normalized_text: String,
}

impl Item {
    pub fn new(id: &str, text: &str) -> Self {
        Item {
            id: id.to_string(),
            text: text.to_string(),
            user: String::new(),
            source: String::new(),
            user_description: String::new(),
            split: String::new(),
            explicitness: String::new(),
            target: String::new(),
            normalized_text: TextNormalizer::new().normalize(text),
        }
    }

    /// Recompute the canonical text (after deserializing)
    pub fn with_normalized_text(mut self, normalizer: &TextNormalizer) -> Self {
        self.normalized_text = normalizer.normalize(&self.text);
        self
    }

    pub fn set_label(&mut self, axis: Axis, label: &str) {
        match axis {
            Axis::Explicitness => self.explicitness = label.to_string(),
            Axis::Target => self.target = label.to_string(),
        }
    }

    /// Mark both axes as needing adjudication
    pub fn mark_unresolved(&mut self) {
        self.explicitness = UNRESOLVED.to_string();
        self.target = UNRESOLVED.to_string();
    }
}

// ============================================================================
// ANNOTATION
// ============================================================================

/// One annotator's vote on one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub item_id: String,
    pub explicitness: String,
    pub target: String,
    /// Which source file the vote came from
    pub source_identity: String,
}

impl Annotation {
    pub fn vote(&self, axis: Axis) -> &str {
        match axis {
            Axis::Explicitness => &self.explicitness,
            Axis::Target => &self.target,
        }
    }
}

// ============================================================================
// RECORD STORE
// ============================================================================

pub struct RecordStore {
    /// Upper bound on votes per item
    annotator_count: usize,

    /// Field separator for every source
    delimiter: u8,

    items: IndexMap<String, Item>,
    annotations: IndexMap<String, Vec<Annotation>>,
}

impl RecordStore {
    pub fn new(annotator_count: usize) -> Self {
        RecordStore {
            annotator_count,
            delimiter: b'\t',
            items: IndexMap::new(),
            annotations: IndexMap::new(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Ingest one annotator file
    pub fn ingest(&mut self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        let name = path.display().to_string();
        let rows = self.ingest_reader(file, &name)?;
        info!(source = %name, rows, "ingested annotation source");
        Ok(rows)
    }

    /// Ingest rows from any reader. `source_name` identifies the annotator.
    ///
    /// The source is validated completely before anything is added, so a
    /// schema error leaves the store untouched.
    pub fn ingest_reader<R: Read>(&mut self, reader: R, source_name: &str) -> Result<usize> {
        let parsed = read_source_rows(reader, source_name, self.delimiter)?;

        // Vote limits are checked against the merged state before committing
        let mut pending: IndexMap<&str, usize> = IndexMap::new();
        for row in &parsed {
            let existing = self.annotations.get(row.id.as_str()).map_or(0, Vec::len);
            let count = pending.entry(row.id.as_str()).or_insert(existing);
            *count += 1;
            if *count > self.annotator_count {
                return Err(ConsensusError::TooManyVotes {
                    item_id: row.id.clone(),
                    limit: self.annotator_count,
                    source_name: source_name.to_string(),
                });
            }
        }

        let rows = parsed.len();
        for row in parsed {
            let id = row.id.clone();
            if !self.items.contains_key(&id) {
                self.items.insert(id.clone(), row.to_item());
            } else {
                debug!(item_id = %id, source = source_name, "appending vote to known item");
            }

            self.annotations.entry(id.clone()).or_default().push(Annotation {
                item_id: id,
                explicitness: row.explicitness,
                target: row.target,
                source_identity: source_name.to_string(),
            });
        }

        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Votes for an item, in ingestion order
    pub fn votes(&self, id: &str) -> &[Annotation] {
        self.annotations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Items in first-seen order
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Hand the items and their votes over to a reconciliation pass
    pub fn into_parts(self) -> (IndexMap<String, Item>, IndexMap<String, Vec<Annotation>>) {
        (self.items, self.annotations)
    }
}

// ============================================================================
// SOURCE ROWS
// ============================================================================

/// One parsed annotator row, before it is merged into a store
#[derive(Debug, Clone)]
pub(crate) struct SourceRow {
    pub line: usize,
    pub id: String,
    pub text: String,
    pub user: String,
    pub source: String,
    pub user_description: String,
    pub split: String,
    pub explicitness: String,
    pub target: String,
}

impl SourceRow {
    pub fn to_item(&self) -> Item {
        let mut item = Item::new(&self.id, &self.text);
        item.user = self.user.clone();
        item.source = self.source.clone();
        item.user_description = self.user_description.clone();
        item.split = self.split.clone();
        item
    }
}

/// Read and validate every row of one source. Metadata columns are optional;
/// id, text and both label columns must be present in the header and in
/// every row.
pub(crate) fn read_source_rows<R: Read>(
    reader: R,
    source_name: &str,
    delimiter: u8,
) -> Result<Vec<SourceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let mut required = Vec::with_capacity(REQUIRED_COLUMNS.len());
    for name in REQUIRED_COLUMNS {
        match column(name) {
            Some(idx) => required.push(idx),
            None => return Err(ConsensusError::schema(source_name, 1, name)),
        }
    }
    let optional = [
        column("user"),
        column("source"),
        column("user.description"),
        column("split"),
    ];

    let mut rows = Vec::new();
    for (row_no, record) in rdr.records().enumerate() {
        let record = record?;
        let line = row_no + 2;
        let cell = |idx: usize, name: &str| -> Result<String> {
            record
                .get(idx)
                .map(str::to_string)
                .ok_or_else(|| ConsensusError::schema(source_name, line, name))
        };
        let meta = |idx: Option<usize>| -> String {
            idx.and_then(|i| record.get(i)).unwrap_or_default().to_string()
        };

        rows.push(SourceRow {
            line,
            id: cell(required[0], REQUIRED_COLUMNS[0])?,
            text: cell(required[1], REQUIRED_COLUMNS[1])?,
            explicitness: cell(required[2], REQUIRED_COLUMNS[2])?,
            target: cell(required[3], REQUIRED_COLUMNS[3])?,
            user: meta(optional[0]),
            source: meta(optional[1]),
            user_description: meta(optional[2]),
            split: meta(optional[3]),
        });
    }
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
