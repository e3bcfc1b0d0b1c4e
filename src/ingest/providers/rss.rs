// src/ingest/providers/rss.rs
//! RSS 2.0 / Atom feed source.
//!
//! Parsing is streaming and best-effort: a malformed document yields every entry
//! completed before the first XML error, plus a warning. Only a document that
//! produced no entries at all *and* failed to parse is reported as an error.

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::{FeedError, FetchError};
use crate::ingest::types::{FeedEntry, FeedSource};

#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Date,
}

#[derive(Debug, Default)]
struct Draft {
    title: String,
    link: String,
    link_from_attr: bool,
    date: String,
}

impl Draft {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            // Atom href wins over any text content of <link>
            Field::Link if !self.link_from_attr => self.link.push_str(text),
            Field::Link => {}
            Field::Date => self.date.push_str(text),
        }
    }

    fn finish(self) -> FeedEntry {
        let date = self.date.trim();
        FeedEntry {
            title: self.title.trim().to_string(),
            link: self.link.trim().to_string(),
            published_at: if date.is_empty() {
                None
            } else {
                parse_feed_date(date)
            },
        }
    }
}

/// RFC 2822 (RSS `pubDate`) or RFC 3339 (Atom `published`/`updated`) → unix seconds.
pub fn parse_feed_date(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// `href` of an Atom `<link>`, ignoring non-alternate relations (`self`, `enclosure`, ...).
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => {
                href = Some(match attr.unescape_value() {
                    Ok(v) => v.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                })
            }
            b"rel" => rel_ok = attr.value.as_ref() == b"alternate",
            _ => {}
        }
    }
    href.filter(|_| rel_ok)
}

fn field_for(local: &[u8]) -> Option<Field> {
    match local {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Date),
        _ => None,
    }
}

/// Parse feed XML into entries, in document order.
pub fn parse_feed(xml: &str) -> ParsedFeed {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut out = ParsedFeed::default();
    let mut current: Option<Draft> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"item" | b"entry" => {
                        current = Some(Draft::default());
                        field = None;
                    }
                    name => {
                        if let Some(d) = current.as_mut() {
                            if let Some(f) = field_for(name) {
                                if f == Field::Link {
                                    if let Some(href) = atom_href(&e) {
                                        d.link = href;
                                        d.link_from_attr = true;
                                    }
                                }
                                // Only the first <link>/<title> of an entry counts
                                let already = match f {
                                    Field::Title => !d.title.is_empty(),
                                    Field::Link => !d.link.is_empty() && !d.link_from_attr,
                                    Field::Date => !d.date.is_empty(),
                                };
                                field = if already { None } else { Some(f) };
                            }
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(d) = current.as_mut() {
                    if e.local_name().as_ref() == b"link" && !d.link_from_attr {
                        if let Some(href) = atom_href(&e) {
                            d.link = href;
                            d.link_from_attr = true;
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(d), Some(f)) = (current.as_mut(), field) {
                    let text = match t.unescape() {
                        Ok(s) => s.into_owned(),
                        // HTML entities such as &nbsp; are not XML entities
                        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(&t))
                            .into_owned(),
                    };
                    d.push_text(f, &text);
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(d), Some(f)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(&t);
                    d.push_text(f, &html_escape::decode_html_entities(&raw));
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"item" | b"entry" => {
                        if let Some(d) = current.take() {
                            out.entries.push(d.finish());
                        }
                        field = None;
                    }
                    name if field_for(name).is_some() => field = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                out.warning = Some(format!(
                    "XML error near byte {}: {e}",
                    reader.buffer_position()
                ));
                break;
            }
            Ok(_) => {}
        }
    }

    out
}

/// Feed source over HTTP with its own request timeout.
#[derive(Clone)]
pub struct RssFeedSource {
    client: Client,
    timeout: Duration,
}

impl RssFeedSource {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn fetch_body(&self, url: &str) -> Result<String, FetchError> {
        let req = async {
            let rsp = self.client.get(url).send().await?;
            let status = rsp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            Ok(rsp.text().await?)
        };
        match tokio::time::timeout(self.timeout, req).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FeedError> {
        let body = self.fetch_body(url).await?;

        let t0 = std::time::Instant::now();
        let parsed = parse_feed(&body);
        histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if let Some(w) = parsed.warning {
            if parsed.entries.is_empty() {
                return Err(FeedError::Parse(w));
            }
            tracing::warn!(url, warning = %w, kept = parsed.entries.len(), "partial feed parse");
            counter!("feed_partial_parse_total").increment(1);
        }
        Ok(parsed.entries)
    }
}
