// 🔁 Session - one reconciliation or annotation run
//
// Owns the items, their votes, the history cache and the statistics for a
// single run. Adjudication ends in one of three states, and every state is
// followed by the same save.

use crate::adjudicator::{Decision, InteractiveAdjudicator, Prompt};
use crate::consensus::{ConsensusEngine, Resolution, Stats};
use crate::error::{ConsensusError, Result};
use crate::exporter;
use crate::history::AnnotationHistory;
use crate::labels::{Axis, LabelPair, UNRESOLVED};
use crate::record_store::{Annotation, Item, RecordStore};
use indexmap::IndexMap;
use std::path::Path;
use tracing::{error, info, warn};

/// How an adjudication pass ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every item is settled
    Completed,
    /// The annotator asked to save and exit
    Stopped,
    /// Resolving one item failed; everything before it is kept
    Faulted(ConsensusError),
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SessionOutcome::Faulted(_))
    }
}

pub struct Session {
    items: IndexMap<String, Item>,
    votes: IndexMap<String, Vec<Annotation>>,
    history: AnnotationHistory,
    stats: Stats,
}

impl Session {
    /// Session over grouped annotator votes
    pub fn from_store(store: RecordStore, history: AnnotationHistory) -> Self {
        let (items, votes) = store.into_parts();
        Session {
            items,
            votes,
            history,
            stats: Stats::new(),
        }
    }

    /// Session over already-labelled items with no vote detail.
    ///
    /// The file is saved back in place later, so a repeated id is refused
    /// rather than silently collapsed.
    pub fn from_items(items: Vec<Item>, history: AnnotationHistory) -> Result<Self> {
        let mut map = IndexMap::with_capacity(items.len());
        for item in items {
            if map.contains_key(&item.id) {
                warn!(item_id = %item.id, "duplicate id in input");
                return Err(ConsensusError::DuplicateItem(item.id));
            }
            map.insert(item.id.clone(), item);
        }
        Ok(Session {
            items: map,
            votes: IndexMap::new(),
            history,
            stats: Stats::new(),
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn history(&self) -> &AnnotationHistory {
        &self.history
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Run the vote once for every item. Definite labels are written to the
    /// item; ambiguous and insufficient axes become the unresolved marker.
    /// Settled pairs are recorded in history.
    pub fn apply_consensus(&mut self, engine: &ConsensusEngine) -> &Stats {
        for (id, item) in self.items.iter_mut() {
            let votes = self.votes.get(id).map(Vec::as_slice).unwrap_or(&[]);
            let verdict = engine.resolve_item(votes, &mut self.stats);

            for (axis, result) in [
                (Axis::Explicitness, &verdict.explicitness),
                (Axis::Target, &verdict.target),
            ] {
                let label = match &result.resolution {
                    Resolution::Label(label) => label.as_str(),
                    Resolution::Ambiguous | Resolution::Insufficient => UNRESOLVED,
                };
                item.set_label(axis, label);
            }

            if let Some(pair) = LabelPair::settled(&item.explicitness, &item.target) {
                self.history.record(&item.text, pair);
            }
        }
        info!(
            items = self.items.len(),
            pending = self.pending_count(),
            "consensus applied"
        );
        &self.stats
    }

    /// Record every already-settled item in history, in item order
    pub fn seed_history_from_items(&mut self) -> usize {
        let mut seeded = 0;
        for item in self.items.values() {
            if let Some(pair) = LabelPair::settled(&item.explicitness, &item.target) {
                self.history.record(&item.text, pair);
                seeded += 1;
            }
        }
        seeded
    }

    /// Settled and already in stored form; a NOT row still carrying a
    /// target is not, and goes back through the adjudicator to be cleared
    pub fn is_settled(item: &Item) -> bool {
        match LabelPair::settled(&item.explicitness, &item.target) {
            Some(pair) => pair.target == item.target,
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.items.values().filter(|i| !Session::is_settled(i)).count()
    }

    /// Settle unresolved items from history only, without asking anyone
    pub fn propagate_from_history(&mut self) -> usize {
        let mut filled = 0;
        for item in self.items.values_mut() {
            if Session::is_settled(item) {
                continue;
            }
            if let Some(pair) = LabelPair::settled(&item.explicitness, &item.target) {
                item.target = pair.target;
                continue;
            }
            if let Some(pair) = self.history.lookup(&item.text).cloned() {
                item.explicitness = pair.explicitness;
                item.target = pair.target;
                filled += 1;
            }
        }
        filled
    }

    /// Walk every unresolved item through the adjudicator
    pub fn adjudicate<P: Prompt>(&mut self, adjudicator: &mut InteractiveAdjudicator<P>) -> SessionOutcome {
        let todo: Vec<String> = self
            .items
            .values()
            .filter(|i| !Session::is_settled(i))
            .map(|i| i.id.clone())
            .collect();
        let total = todo.len();
        info!(total, "starting adjudication");

        for (index, id) in todo.iter().enumerate() {
            let Some(item) = self.items.get(id) else {
                continue;
            };
            let votes = self.votes.get(id).map(Vec::as_slice).unwrap_or(&[]);

            match adjudicator.adjudicate(item, votes, &mut self.history, (index + 1, total)) {
                Ok(Decision::Resolved { pair, origin }) => {
                    if let Some(item) = self.items.get_mut(id) {
                        info!(item_id = %id, %pair, ?origin, "item settled");
                        item.explicitness = pair.explicitness;
                        item.target = pair.target;
                    }
                }
                Ok(Decision::StopRequested) => {
                    info!(settled = index, remaining = total - index, "stop requested");
                    return SessionOutcome::Stopped;
                }
                Err(err) => {
                    error!(item_id = %id, error = %err, "item fault, saving progress");
                    return SessionOutcome::Faulted(err);
                }
            }
        }

        SessionOutcome::Completed
    }

    /// Write every item, settled or not, in the canonical schema
    pub fn save(&self, path: &Path, delimiter: u8) -> Result<()> {
        let items: Vec<Item> = self.items.values().cloned().collect();
        exporter::write_items(path, &items, delimiter)
    }
}

// ============================================================================
// TESTS
// ============================================================================
