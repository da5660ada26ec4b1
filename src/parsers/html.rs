use crate::filter::resolve_link;
use crate::parsers::{ExtractError, PageMetadata, SignalExtractor};
use crate::results::{Anchor, JSON_LD_LIMIT};
use crate::utils::{collapse_whitespace, truncate_chars};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Longest anchor text kept, in characters
const ANCHOR_TEXT_LIMIT: usize = 200;

/// `scraper`-based extractor with `html2md` markdown conversion
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlSignalExtractor;

impl SignalExtractor for HtmlSignalExtractor {
    fn to_markdown(&self, html: &str) -> Result<String, ExtractError> {
        let doc = Html::parse_document(html);

        // Prefer the main content region when the page marks one
        for css in ["main", "article", "body"] {
            let sel = selector(css)?;
            if let Some(region) = doc.select(&sel).next() {
                return Ok(html2md::parse_html(&region.inner_html()).trim().to_string());
            }
        }

        Ok(html2md::parse_html(html).trim().to_string())
    }

    fn extract_metadata(&self, html: &str, url: &str) -> Result<PageMetadata, ExtractError> {
        let doc = Html::parse_document(html);

        let title = first_text(&doc, "title")?.or(first_text(&doc, "h1")?);
        let site_name = meta_content(
            &doc,
            &[r#"meta[property="og:site_name"]"#, r#"meta[name="twitter:site"]"#],
        )?;
        let meta_description = meta_content(
            &doc,
            &[
                r#"meta[name="description"]"#,
                r#"meta[property="og:description"]"#,
                r#"meta[name="twitter:description"]"#,
            ],
        )?;

        ::log::trace!("Metadata for {}: title={:?} site={:?}", url, title, site_name);

        Ok(PageMetadata {
            title,
            site_name,
            meta_description,
        })
    }

    fn extract_json_ld(
        &self,
        html: &str,
        url: &str,
    ) -> Result<Vec<Map<String, Value>>, ExtractError> {
        let doc = Html::parse_document(html);
        let sel = selector(r#"script[type="application/ld+json"]"#)?;

        let mut objects = Vec::new();
        for script in doc.select(&sel) {
            let raw: String = script.text().collect();
            let value: Value = match serde_json::from_str(raw.trim()) {
                Ok(value) => value,
                Err(e) => {
                    ::log::debug!("Skipping invalid JSON-LD block on {}: {}", url, e);
                    continue;
                }
            };
            collect_objects(value, &mut objects);
        }

        objects.truncate(JSON_LD_LIMIT);
        Ok(objects)
    }

    fn extract_anchors(
        &self,
        html: &str,
        base_url: &str,
        limit: usize,
    ) -> Result<Vec<Anchor>, ExtractError> {
        let doc = Html::parse_document(html);
        let sel = selector("a[href]")?;

        let mut seen = HashSet::new();
        let mut anchors = Vec::new();

        for element in doc.select(&sel) {
            if anchors.len() >= limit {
                break;
            }
            let Some(href) = element.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty() || href.starts_with('#') {
                continue;
            }
            let Some(absolute) = resolve_link(base_url, href) else {
                continue;
            };
            if !seen.insert(absolute.clone()) {
                continue;
            }

            let text = collapse_whitespace(&element.text().collect::<String>());
            let text = (!text.is_empty()).then(|| truncate_chars(&text, ANCHOR_TEXT_LIMIT));

            anchors.push(Anchor {
                text,
                href: absolute,
            });
        }

        ::log::debug!("HTML extractor found {} anchors on {}", anchors.len(), base_url);
        Ok(anchors)
    }
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector(format!("{}: {}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn first_text(doc: &Html, css: &str) -> Result<Option<String>, ExtractError> {
    let sel = selector(css)?;
    Ok(doc.select(&sel).find_map(element_text))
}

/// `content` of the first matching meta tag, trying selectors in order
fn meta_content(doc: &Html, selectors: &[&str]) -> Result<Option<String>, ExtractError> {
    for css in selectors {
        let sel = selector(css)?;
        let found = doc
            .select(&sel)
            .filter_map(|m| m.value().attr("content"))
            .map(collapse_whitespace)
            .find(|c| !c.is_empty());
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Objects only; arrays and `@graph` containers are flattened
fn collect_objects(value: Value, out: &mut Vec<Map<String, Value>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_objects(item, out);
            }
        }
        Value::Object(mut obj) => {
            if let Some(Value::Array(graph)) = obj.remove("@graph") {
                for item in graph {
                    collect_objects(item, out);
                }
                if obj.keys().all(|k| k == "@context") {
                    return;
                }
            }
            out.push(obj);
        }
        _ => {}
    }
}
