// 💾 Exporter - canonical tab-separated output
//
// Columns: id, text, user, source, user.description, split, explicitness, target

use crate::error::{ConsensusError, Result};
use crate::normalizer::TextNormalizer;
use crate::record_store::Item;
use chrono::{DateTime, Local};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CANONICAL_COLUMNS: [&str; 8] = [
    "id",
    "text",
    "user",
    "source",
    "user.description",
    "split",
    "explicitness",
    "target",
];

/// `gold-<timestamp>.csv` in `dir`, e.g. gold-2024-03-01-134502123456.csv
pub fn timestamped_output(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("gold-{}.csv", now.format("%Y-%m-%d-%H%M%S%6f")))
}

/// Write items in the canonical schema. The file is created (or truncated)
/// and closed before returning.
pub fn write_items(path: &Path, items: &[Item], delimiter: u8) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_items_to(file, items, delimiter)?;
    info!(file = %path.display(), rows = items.len(), "saved items");
    Ok(())
}

pub fn write_items_to<W: Write>(writer: W, items: &[Item], delimiter: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    // Header is written explicitly so an empty export still carries the schema
    wtr.write_record(CANONICAL_COLUMNS)?;
    for item in items {
        wtr.write_record([
            &item.id,
            &item.text,
            &item.user,
            &item.source,
            &item.user_description,
            &item.split,
            &item.explicitness,
            &item.target,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a canonical file back; labels default to empty when absent
pub fn read_items(path: &Path, delimiter: u8) -> Result<Vec<Item>> {
    let file = std::fs::File::open(path)?;
    read_items_from(file, &path.display().to_string(), delimiter)
}

pub fn read_items_from<R: Read>(reader: R, source_name: &str, delimiter: u8) -> Result<Vec<Item>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for required in ["id", "text"] {
        if !headers.iter().any(|h| h.trim() == required) {
            return Err(ConsensusError::schema(source_name, 1, required));
        }
    }

    let normalizer = TextNormalizer::new();
    let mut items = Vec::new();
    for result in rdr.deserialize::<Item>() {
        let item = result?;
        items.push(item.with_normalized_text(&normalizer));
    }
    Ok(items)
}
