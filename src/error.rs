// ⚠️ Error taxonomy for ingestion, consensus and adjudication
//
// Only the fatal and contained faults live here. Insufficient votes, split
// votes and bad keystrokes are ordinary outcomes, not errors.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Error, Debug)]
pub enum ConsensusError {
    /// A required column is absent from the header or from a data row
    #[error("schema error in {source_name} (line {line}): missing required column '{column}'")]
    Schema {
        source_name: String,
        line: usize,
        column: String,
    },

    /// More votes for one item than there are annotators
    #[error("item '{item_id}' has more than {limit} votes (extra vote from {source_name})")]
    TooManyVotes {
        item_id: String,
        limit: usize,
        source_name: String,
    },

    /// The same id twice in a file that is saved back in place
    #[error("duplicate item id '{0}'")]
    DuplicateItem(String),

    /// Thresholds that can never produce a consistent verdict
    #[error("invalid consensus configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected failure while resolving a single item interactively
    #[error("failed to resolve item '{item_id}': {message}")]
    ItemFault { item_id: String, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsensusError {
    pub fn schema(source_name: &str, line: usize, column: &str) -> Self {
        ConsensusError::Schema {
            source_name: source_name.to_string(),
            line,
            column: column.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_message_names_column() {
        let err = ConsensusError::schema("a.tsv", 3, "target");
        let msg = err.to_string();
        assert!(msg.contains("a.tsv"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("'target'"));
    }

    #[test]
    fn test_item_fault_names_item() {
        let err = ConsensusError::ItemFault {
            item_id: "7".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "failed to resolve item '7': boom");
    }
}
