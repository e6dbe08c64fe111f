//! Per-stage extension counts used to choose a parser for external tools.

use std::collections::BTreeMap;

use crate::core::types::SourceEntry;

/// Parser requested when no TypeScript sources are present.
pub const FALLBACK_PARSER: &str = "babel";

/// Lowercase file extension -> number of entries seen with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionHistogram {
    counts: BTreeMap<String, usize>,
}

impl ExtensionHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an entry by its extension. Entries without one are ignored.
    pub fn record(&mut self, entry: &SourceEntry) {
        if let Some(ext) = entry.extension() {
            self.record_extension(&ext);
        }
    }

    pub fn record_extension(&mut self, ext: &str) {
        *self.counts.entry(ext.to_ascii_lowercase()).or_default() += 1;
    }

    pub fn count(&self, ext: &str) -> usize {
        self.counts.get(ext).copied().unwrap_or(0)
    }

    /// `tsx` wins over `ts`; anything else falls back to [`FALLBACK_PARSER`].
    pub fn parser(&self) -> &'static str {
        if self.count("tsx") > 0 {
            "tsx"
        } else if self.count("ts") > 0 {
            "ts"
        } else {
            FALLBACK_PARSER
        }
    }
}

impl FromIterator<(String, usize)> for ExtensionHistogram {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        let mut histogram = Self::new();
        for (ext, count) in iter {
            if count > 0 {
                *histogram.counts.entry(ext.to_ascii_lowercase()).or_default() += count;
            }
        }
        histogram
    }
}
