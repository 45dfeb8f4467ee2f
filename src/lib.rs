// Annotation Consensus - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod labels;
pub mod normalizer;
pub mod record_store;
pub mod consensus;
pub mod history;
pub mod adjudicator;
pub mod exporter;
pub mod merge;
pub mod session;

// Re-export commonly used types
pub use error::{ConsensusError, Result};
pub use labels::{Axis, LabelPair, NOT, UNRESOLVED};
pub use normalizer::TextNormalizer;
pub use record_store::{Annotation, Item, RecordStore};
pub use consensus::{
    ConsensusConfig, ConsensusEngine, ConsensusResult, ItemConsensus,
    OutcomeKind, Resolution, StatKey, Stats,
};
pub use history::{AnnotationHistory, WritePolicy};
pub use adjudicator::{
    ConsolePrompt, Decision, DecisionOrigin, InteractiveAdjudicator, Prompt, ScriptedPrompt,
    STOP_CODE,
};
pub use exporter::{read_items, timestamped_output, write_items, CANONICAL_COLUMNS};
pub use merge::MultiSourceMerge;
pub use session::{Session, SessionOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
