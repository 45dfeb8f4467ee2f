// 🧩 Multi-source merge - one row per tweet, one column pair per annotator
//
// Output columns: id, text, user, source, user.description, split,
// explicitness-annotator-1, target-annotator-1, ..., -N
//
// Rows follow first appearance in the first source. Ids that only show up in
// a later source are appended after those rows with a warning.

use crate::error::Result;
use crate::record_store::{read_source_rows, SourceRow};
use indexmap::IndexMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// Default output name for the combine command
pub const COMBINED_FILE: &str = "combined.csv";

const METADATA_COLUMNS: [&str; 6] = ["id", "text", "user", "source", "user.description", "split"];

struct MergedRow {
    first: SourceRow,
    /// (explicitness, target) per source, None where the source lacks the id
    votes: Vec<Option<(String, String)>>,
}

pub struct MultiSourceMerge {
    delimiter: u8,
    sources: Vec<String>,
    rows: IndexMap<String, MergedRow>,
    late_ids: Vec<String>,
}

impl MultiSourceMerge {
    pub fn new(delimiter: u8) -> Self {
        MultiSourceMerge {
            delimiter,
            sources: Vec::new(),
            rows: IndexMap::new(),
            late_ids: Vec::new(),
        }
    }

    pub fn add_file(&mut self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        self.add_source(file, &path.display().to_string())
    }

    /// Add the next annotator's file. Its votes land in column pair N+1.
    pub fn add_source<R: Read>(&mut self, reader: R, source_name: &str) -> Result<usize> {
        let rows = read_source_rows(reader, source_name, self.delimiter)?;
        let index = self.sources.len();
        self.sources.push(source_name.to_string());

        for row in &rows {
            if !self.rows.contains_key(&row.id) {
                if index > 0 {
                    warn!(
                        item_id = %row.id,
                        source = source_name,
                        line = row.line,
                        "id missing from first source, appending row"
                    );
                    self.late_ids.push(row.id.clone());
                }
                self.rows.insert(
                    row.id.clone(),
                    MergedRow {
                        first: row.clone(),
                        votes: Vec::new(),
                    },
                );
            }
            if let Some(merged) = self.rows.get_mut(&row.id) {
                merged.votes.resize(index + 1, None);
                if merged.votes[index].is_some() {
                    warn!(item_id = %row.id, source = source_name, "repeated id in source, last row wins");
                }
                merged.votes[index] = Some((row.explicitness.clone(), row.target.clone()));
            }
        }

        info!(source = source_name, annotator = index + 1, rows = rows.len(), "merged source");
        Ok(rows.len())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ids that were not in the first source
    pub fn late_ids(&self) -> &[String] {
        &self.late_ids
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = METADATA_COLUMNS.iter().map(|c| c.to_string()).collect();
        for n in 1..=self.sources.len() {
            columns.push(format!("explicitness-annotator-{}", n));
            columns.push(format!("target-annotator-{}", n));
        }
        columns
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_to(file)?;
        info!(file = %path.display(), rows = self.rows.len(), "saved merged file");
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);
        wtr.write_record(self.columns())?;

        for merged in self.rows.values() {
            let row = &merged.first;
            let mut record = vec![
                row.id.as_str(),
                row.text.as_str(),
                row.user.as_str(),
                row.source.as_str(),
                row.user_description.as_str(),
                row.split.as_str(),
            ];
            for n in 0..self.sources.len() {
                match merged.votes.get(n).and_then(Option::as_ref) {
                    Some((explicitness, target)) => {
                        record.push(explicitness);
                        record.push(target);
                    }
                    None => {
                        record.push("");
                        record.push("");
                    }
                }
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(rows: &[(&str, &str, &str)]) -> String {
        let mut out = "id\ttext\tuser\tsource\tuser.description\tsplit\texplicitness\ttarget\n".to_string();
        for (id, expl, targ) in rows {
            out.push_str(&format!("{}\ttweet {}\tu{}\tweb\td\ttest\t{}\t{}\n", id, id, id, expl, targ));
        }
        out
    }

    fn render(merge: &MultiSourceMerge) -> Vec<String> {
        let mut buf = Vec::new();
        merge.write_to(&mut buf).unwrap();
        String::from_utf8(buf).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_columns_per_source_in_input_order() {
        let mut merge = MultiSourceMerge::new(b'\t');
        merge.add_source(source(&[("1", "NOT", "")]).as_bytes(), "a").unwrap();
        merge.add_source(source(&[("1", "EXPLICIT", "GROUP")]).as_bytes(), "b").unwrap();

        let lines = render(&merge);
        assert_eq!(
            lines[0],
            "id\ttext\tuser\tsource\tuser.description\tsplit\texplicitness-annotator-1\ttarget-annotator-1\texplicitness-annotator-2\ttarget-annotator-2"
        );
        assert_eq!(lines[1], "1\ttweet 1\tu1\tweb\td\ttest\tNOT\t\tEXPLICIT\tGROUP");
    }

    #[test]
    fn test_rows_keyed_by_id_not_position() {
        let mut merge = MultiSourceMerge::new(b'\t');
        merge
            .add_source(source(&[("1", "NOT", ""), ("2", "IMPLICIT", "OTHER")]).as_bytes(), "a")
            .unwrap();
        merge
            .add_source(source(&[("2", "EXPLICIT", "GROUP"), ("1", "NOT", "")]).as_bytes(), "b")
            .unwrap();

        let lines = render(&merge);
        assert!(lines[1].starts_with("1\t"));
        assert!(lines[1].ends_with("NOT\t\tNOT\t"));
        assert!(lines[2].ends_with("IMPLICIT\tOTHER\tEXPLICIT\tGROUP"));
    }

    #[test]
    fn test_ids_only_in_later_source_are_appended() {
        let mut merge = MultiSourceMerge::new(b'\t');
        merge.add_source(source(&[("1", "NOT", "")]).as_bytes(), "a").unwrap();
        merge
            .add_source(source(&[("1", "NOT", ""), ("99", "EXPLICIT", "GROUP")]).as_bytes(), "b")
            .unwrap();

        assert_eq!(merge.late_ids(), &["99".to_string()]);
        assert_eq!(merge.len(), 2);
        let lines = render(&merge);
        assert_eq!(lines[2], "99\ttweet 99\tu99\tweb\td\ttest\t\t\tEXPLICIT\tGROUP");
    }

    #[test]
    fn test_missing_vote_cells_are_blank() {
        let mut merge = MultiSourceMerge::new(b'\t');
        merge
            .add_source(source(&[("1", "NOT", ""), ("2", "NOT", "")]).as_bytes(), "a")
            .unwrap();
        merge.add_source(source(&[("1", "IMPLICIT", "OTHER")]).as_bytes(), "b").unwrap();

        let lines = render(&merge);
        assert_eq!(lines[2], "2\ttweet 2\tu2\tweb\td\ttest\tNOT\t\t\t");
        assert_eq!(merge.source_count(), 2);
    }

    #[test]
    fn test_schema_error_from_any_source() {
        let mut merge = MultiSourceMerge::new(b'\t');
        merge.add_source(source(&[("1", "NOT", "")]).as_bytes(), "a").unwrap();
        let err = merge.add_source("id\ttext\n1\tx\n".as_bytes(), "b").unwrap_err();
        assert!(matches!(err, crate::error::ConsensusError::Schema { .. }));
    }
}
