// 🧠 Annotation History - label memory keyed by normalized text
//
// Near-duplicate tweets (same words, different @mentions or t.co links)
// inherit the label pair of whichever copy was settled before them.

use crate::error::Result;
use crate::exporter;
use crate::labels::LabelPair;
use crate::normalizer::TextNormalizer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePolicy {
    /// Keep the first settled pair for a text (reconciliation pass)
    FirstWriteWins,

    /// Every settled pair replaces the previous one (interactive assistant)
    LastWriteWins,
}

pub struct AnnotationHistory {
    entries: HashMap<String, LabelPair>,
    policy: WritePolicy,
    normalizer: TextNormalizer,
}

impl AnnotationHistory {
    pub fn new(policy: WritePolicy) -> Self {
        AnnotationHistory {
            entries: HashMap::new(),
            policy,
            normalizer: TextNormalizer::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored pair for the canonical form of `text`
    pub fn lookup(&self, text: &str) -> Option<&LabelPair> {
        self.entries.get(&self.normalizer.normalize(text))
    }

    /// Remember a settled pair. Returns true if the entry changed.
    pub fn record(&mut self, text: &str, pair: LabelPair) -> bool {
        let key = self.normalizer.normalize(text);
        match self.policy {
            WritePolicy::FirstWriteWins if self.entries.contains_key(&key) => false,
            _ => {
                let changed = self.entries.get(&key) != Some(&pair);
                self.entries.insert(key, pair);
                changed
            }
        }
    }

    /// Seed from a previously exported file. Returns the number of rows that
    /// carried a settled pair.
    pub fn replay(&mut self, path: &Path, delimiter: u8) -> Result<usize> {
        let items = exporter::read_items(path, delimiter)?;
        let mut seeded = 0;
        for item in &items {
            if let Some(pair) = LabelPair::settled(&item.explicitness, &item.target) {
                self.record(&item.text, pair);
                seeded += 1;
            } else {
                debug!(item_id = %item.id, "skipping unresolved row during replay");
            }
        }
        info!(file = %path.display(), seeded, entries = self.len(), "replayed history file");
        Ok(seeded)
    }
}
