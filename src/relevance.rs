// src/relevance.rs
//! Keyword relevance gate.
//!
//! Title and content are normalized the same way as dedup keys; keywords are
//! normalized too, so `stock-split` and `stock split` are the same keyword.

use crate::ingest::normalize_for_match;

/// Static keyword set, normalized once at construction.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for k in keywords {
            let n = normalize_for_match(k.as_ref());
            if !n.is_empty() && !out.contains(&n) {
                out.push(n);
            }
        }
        Self { keywords: out }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// First keyword found in the normalized title or content.
    /// An empty title is never relevant, whatever the content says.
    pub fn matched(&self, title: &str, content: &str) -> Option<&str> {
        if title.trim().is_empty() {
            return None;
        }
        let t = normalize_for_match(title);
        let c = normalize_for_match(content);
        self.keywords
            .iter()
            .find(|kw| t.contains(kw.as_str()) || c.contains(kw.as_str()))
            .map(|kw| kw.as_str())
    }

    pub fn matches(&self, title: &str, content: &str) -> bool {
        self.matched(title, content).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> KeywordFilter {
        KeywordFilter::new(crate::config::default_keywords())
    }

    #[test]
    fn matches_title_case_insensitively() {
        assert!(filter().matches("Perusahaan X Lakukan RUPS", ""));
        assert_eq!(filter().matched("Jadwal IPO pekan ini", ""), Some("ipo"));
    }

    #[test]
    fn matches_in_content_only() {
        assert!(filter().matches(
            "Laporan emiten",
            "Perseroan berencana melakukan akuisisi anak usaha"
        ));
    }

    #[test]
    fn no_keyword_is_filtered() {
        assert!(!filter().matches("Laporan Keuangan Q3", "laba bersih naik"));
    }

    #[test]
    fn empty_title_is_never_relevant() {
        assert!(!filter().matches("", "rups tahunan"));
        assert!(!filter().matches("   ", "rups tahunan"));
    }

    #[test]
    fn hyphenated_keyword_matches_normalized_text() {
        let f = KeywordFilter::new(["stock-split"]);
        assert_eq!(f.keywords(), &["stock split".to_string()]);
        assert!(f.matches("Rencana Stock-Split BBCA", ""));
        assert!(f.matches("Rencana stock split BBCA", ""));
    }

    #[test]
    fn substring_semantics_are_plain_contains() {
        // "ipo" is a substring of "tipografi"; exact-substring matching accepts it
        assert!(KeywordFilter::new(["ipo"]).matches("tipografi", ""));
    }

    #[test]
    fn duplicate_keywords_collapse() {
        let f = KeywordFilter::new(["IPO", "ipo", " ipo ", ""]);
        assert_eq!(f.keywords().len(), 1);
    }
}
