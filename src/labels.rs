// 🏷️ Label vocabularies for the two annotation axes
//
// explicitness: e → EXPLICIT, i → IMPLICIT, n → NOT
// target:       i → INDIVIDUAL, g → GROUP, o → OTHER, n → NOT (prompted as NONE)

use serde::{Deserialize, Serialize};

/// Marker written for labels that are still unresolved
pub const UNRESOLVED: &str = "?";

/// Explicitness label that suppresses the target axis
pub const NOT: &str = "NOT";

// ============================================================================
// AXIS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    Explicitness,
    Target,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Explicitness, Axis::Target];

    /// Column name in the canonical schema
    pub fn name(&self) -> &'static str {
        match self {
            Axis::Explicitness => "explicitness",
            Axis::Target => "target",
        }
    }

    /// (code, label) pairs accepted at the prompt
    pub fn vocabulary(&self) -> &'static [(char, &'static str)] {
        match self {
            Axis::Explicitness => &[('e', "EXPLICIT"), ('i', "IMPLICIT"), ('n', "NOT")],
            Axis::Target => &[('i', "INDIVIDUAL"), ('g', "GROUP"), ('o', "OTHER"), ('n', "NOT")],
        }
    }

    /// Decode a typed answer. Case-insensitive; only the first character counts.
    pub fn decode(&self, input: &str) -> Option<&'static str> {
        let code = input.chars().next()?.to_ascii_lowercase();
        self.vocabulary()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
    }

    /// Prompt text, e.g. "EXPLICITNESS: [E]XPLICIT | [I]MPLICIT | [N]OT"
    pub fn prompt(&self) -> String {
        let options: Vec<String> = self
            .vocabulary()
            .iter()
            .map(|(code, label)| {
                let upper = code.to_ascii_uppercase();
                let word = self.prompt_word(label);
                match word.strip_prefix(upper) {
                    Some(rest) => format!("[{}]{}", upper, rest),
                    None => format!("[{}] {}", upper, word),
                }
            })
            .collect();
        format!("{}: {}", self.name().to_uppercase(), options.join(" | "))
    }

    /// How a label is spelled at the prompt; a NOT target reads as NONE
    fn prompt_word(&self, label: &'static str) -> &'static str {
        match (self, label) {
            (Axis::Target, NOT) => "NONE",
            _ => label,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// True when a stored label still needs a decision
pub fn is_unresolved(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label == UNRESOLVED
}

// ============================================================================
// LABEL PAIR
// ============================================================================

/// A settled (explicitness, target) decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub explicitness: String,
    pub target: String,
}

impl LabelPair {
    /// Builds a pair, forcing target empty when explicitness is NOT
    pub fn new(explicitness: &str, target: &str) -> Self {
        let target = if explicitness == NOT { "" } else { target };
        LabelPair {
            explicitness: explicitness.to_string(),
            target: target.to_string(),
        }
    }

    /// Pair from stored labels, if both axes are settled
    pub fn settled(explicitness: &str, target: &str) -> Option<Self> {
        if is_unresolved(explicitness) {
            return None;
        }
        if explicitness != NOT && is_unresolved(target) {
            return None;
        }
        Some(LabelPair::new(explicitness, target))
    }
}

impl std::fmt::Display for LabelPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.target.is_empty() {
            write!(f, "{}", self.explicitness)
        } else {
            write!(f, "{}/{}", self.explicitness, self.target)
        }
    }
}
