// src/ingest/mod.rs
pub mod fetcher;
pub mod providers;
pub mod scheduler;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Normalize text for comparison: lowercase, punctuation → space, collapse whitespace, trim.
///
/// Used for both dedup hashing and keyword matching, so the two always agree on
/// what "the same title" means.
pub fn normalize_for_match(s: &str) -> String {
    static RE_PUNCT: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_punct = RE_PUNCT.get_or_init(|| Regex::new(r"[^\w\s]").expect("punct regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));

    let lower = s.to_lowercase();
    let out = re_punct.replace_all(&lower, " ");
    let out = re_ws.replace_all(&out, " ");
    out.trim().to_string()
}

/// Reduce an HTML page to a bounded plain-text sample.
pub fn extract_summary(html: &str, max_chars: usize) -> String {
    if html.is_empty() {
        return String::new();
    }

    // 1) Drop blocks whose text is never article content
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(
            r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>",
        )
        .expect("blocks regex")
    });
    let out = re_blocks.replace_all(html, " ");

    // 2) Tags become spaces so adjacent words don't fuse
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?s)</?[^>]+>").expect("tags regex"));
    let out = re_tags.replace_all(&out, " ");

    // 3) Entities decoded after tag removal, so `&lt;b&gt;` stays text
    let out = html_escape::decode_html_entities(&out);

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    let out = re_ws.replace_all(&out, " ");

    truncate_chars(out.trim(), max_chars)
}

/// First `max` characters of `s` (char-boundary safe).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punct_and_collapses_ws() {
        assert_eq!(
            normalize_for_match("  Perusahaan X: Lakukan   RUPS!! "),
            "perusahaan x lakukan rups"
        );
        assert_eq!(normalize_for_match("Stock-Split"), "stock split");
        assert_eq!(normalize_for_match("..."), "");
    }

    #[test]
    fn normalize_keeps_non_ascii_letters() {
        assert_eq!(normalize_for_match("Émission d'actions"), "émission d actions");
    }

    #[test]
    fn summary_drops_scripts_tags_and_entities() {
        let html = r#"<html><head><style>p{color:red}</style><script>var x = "<p>";</script></head>
<body><p>Emiten&nbsp;gelar <b>RUPS</b></p><!-- ad --><p>tahunan &amp; luar biasa</p></body></html>"#;
        assert_eq!(
            extract_summary(html, 1000),
            "Emiten gelar RUPS tahunan & luar biasa"
        );
    }

    #[test]
    fn summary_is_bounded_in_chars() {
        let html = "<p>ąąąąąąąąąą</p>";
        assert_eq!(extract_summary(html, 4), "ąąąą");
        assert_eq!(extract_summary("", 4), "");
    }
}
