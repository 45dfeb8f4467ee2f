// 🔍 Text Normalizer - canonical form for near-duplicate detection
//
// Two tweets are "the same" when they only differ in @mentions or t.co links.

use lazy_static::lazy_static;
use regex::Regex;

/// Replacement for every @mention
pub const MENTION_PLACEHOLDER: &str = "@_";

/// Replacement for every shortened link
pub const LINK_PLACEHOLDER: &str = "http://_";

lazy_static! {
    static ref MENTION_RE: Regex = Regex::new(r"@\w{1,15}\b").expect("valid mention pattern");
    static ref LINK_RE: Regex = Regex::new(r"https?://t\.co/\w+").expect("valid link pattern");
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        TextNormalizer
    }

    /// Replace mentions and short links with fixed placeholders.
    ///
    /// Links are replaced first so a mention-like fragment inside a URL path
    /// cannot split the link token.
    pub fn normalize(&self, text: &str) -> String {
        let without_links = LINK_RE.replace_all(text, LINK_PLACEHOLDER);
        MENTION_RE
            .replace_all(&without_links, MENTION_PLACEHOLDER)
            .into_owned()
    }
}
