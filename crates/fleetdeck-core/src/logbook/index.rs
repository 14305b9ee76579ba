use std::collections::{BTreeSet, HashMap};

use super::LogEntry;

/// Minimum token length kept in the index; shorter tokens are noise.
const MIN_TOKEN_LEN: usize = 3;

/// Lower-cased whitespace tokens worth indexing.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
}

/// Word -> entry-id inverted index over the log. Multi-word queries
/// intersect per-word postings, which keeps search sub-linear as the log
/// grows toward its cap instead of substring-scanning every entry.
#[derive(Debug, Default)]
pub struct SearchIndex {
    postings: HashMap<String, BTreeSet<u64>>,
}

impl SearchIndex {
    /// Rebuild from scratch over the current entries. Called once per
    /// ingestion batch, not per entry.
    pub fn rebuild<'a>(&mut self, entries: impl Iterator<Item = &'a LogEntry>) {
        self.postings.clear();
        for entry in entries {
            self.insert_text(&entry.agent, entry.id);
            self.insert_text(entry.level.as_str(), entry.id);
            self.insert_text(&entry.message, entry.id);
            if let Some(ref category) = entry.category {
                self.insert_text(category, entry.id);
            }
            for tag in &entry.tags {
                self.insert_text(tag, entry.id);
            }
        }
    }

    fn insert_text(&mut self, text: &str, id: u64) {
        for token in tokenize(text) {
            self.postings.entry(token).or_default().insert(id);
        }
    }

    pub fn postings(&self, token: &str) -> Option<&BTreeSet<u64>> {
        self.postings.get(&token.to_lowercase())
    }

    /// Entry ids matching every queried word (implicit AND). An empty or
    /// all-short-token query matches nothing.
    pub fn search(&self, query: &str) -> BTreeSet<u64> {
        let mut result: Option<BTreeSet<u64>> = None;
        let mut had_token = false;
        for token in tokenize(query) {
            had_token = true;
            let Some(posting) = self.postings.get(&token) else {
                return BTreeSet::new();
            };
            result = Some(match result {
                None => posting.clone(),
                Some(acc) => acc.intersection(posting).copied().collect(),
            });
        }
        if !had_token {
            return BTreeSet::new();
        }
        result.unwrap_or_default()
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}
