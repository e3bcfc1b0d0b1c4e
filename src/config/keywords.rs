// src/config/keywords.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Load a keyword list from an explicit path. Supports TOML (`keywords = [...]`) or a JSON array.
pub fn load_keywords_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keywords from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("keywords");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keyword list format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlKeywords {
        keywords: Vec<String>,
    }
    let v: TomlKeywords = toml::from_str(s)?;
    Ok(clean_list(v.keywords))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop empties, and drop case-insensitive duplicates. First occurrence wins.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.to_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_dedups_and_reads_both_formats() {
        let toml = r#"keywords = [" RUPS ", "", "ipo", "IPO"]"#;
        let json = r#"["akuisisi", "  backdoor  ", ""]"#;
        assert_eq!(
            parse_toml(toml).unwrap(),
            vec!["RUPS".to_string(), "ipo".to_string()]
        );
        assert_eq!(
            parse_json(json).unwrap(),
            vec!["akuisisi".to_string(), "backdoor".to_string()]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_keywords("not a list", "txt").is_err());
    }

    #[test]
    fn loads_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("kw.json");
        fs::write(&p, r#"["stock split"]"#).unwrap();
        assert_eq!(load_keywords_from(&p).unwrap(), vec!["stock split".to_string()]);
    }
}
