use crate::filter::canonical_host;
use crate::page::{LoadState, PageAutomation};
use crate::parsers::{PageMetadata, SignalExtractor};
use crate::results::{ANCHOR_LIMIT, HTML_CHAR_LIMIT, JSON_LD_LIMIT, Snapshot};
use crate::utils::{sha256_hex, truncate_chars};
use std::time::Duration;

/// Captures a revealed page as a size-bounded [`Snapshot`]
///
/// Every field is extracted independently; a failed extraction leaves that
/// field empty and the rest of the snapshot intact.
pub struct SnapshotBuilder {
    extractor: Box<dyn SignalExtractor>,
    idle_timeout: Duration,
}

impl SnapshotBuilder {
    pub fn new(extractor: Box<dyn SignalExtractor>, idle_timeout: Duration) -> Self {
        Self {
            extractor,
            idle_timeout,
        }
    }

    pub async fn build<P>(&self, page: &P, url: &str) -> Snapshot
    where
        P: PageAutomation + ?Sized,
    {
        self.capture(page, url).await.0
    }

    /// Like [`build`](Self::build), also returning the full captured HTML
    pub async fn capture<P>(&self, page: &P, url: &str) -> (Snapshot, String)
    where
        P: PageAutomation + ?Sized,
    {
        if let Err(e) = page
            .wait_for_load(LoadState::NetworkIdle, self.idle_timeout)
            .await
        {
            ::log::debug!("No network idle before snapshot of {}: {}", url, e);
        }

        let html = match page.content().await {
            Ok(html) => html,
            Err(e) => {
                ::log::warn!("Failed to read page content of {}: {}", url, e);
                String::new()
            }
        };

        let snapshot = self.from_html(&html, url);
        (snapshot, html)
    }

    /// Build a snapshot from already captured HTML
    pub fn from_html(&self, html: &str, url: &str) -> Snapshot {
        let metadata = self
            .extractor
            .extract_metadata(html, url)
            .unwrap_or_else(|e| {
                ::log::debug!("Metadata extraction failed for {}: {}", url, e);
                PageMetadata::default()
            });

        let markdown = self.extractor.to_markdown(html).unwrap_or_else(|e| {
            ::log::debug!("Markdown conversion failed for {}: {}", url, e);
            String::new()
        });

        let mut json_ld_objects = self
            .extractor
            .extract_json_ld(html, url)
            .unwrap_or_else(|e| {
                ::log::debug!("JSON-LD extraction failed for {}: {}", url, e);
                Vec::new()
            });
        json_ld_objects.truncate(JSON_LD_LIMIT);

        let mut anchors = self
            .extractor
            .extract_anchors(html, url, ANCHOR_LIMIT)
            .unwrap_or_else(|e| {
                ::log::debug!("Anchor extraction failed for {}: {}", url, e);
                Vec::new()
            });
        anchors.truncate(ANCHOR_LIMIT);

        Snapshot {
            url: url.to_string(),
            title: metadata.title,
            site_name: metadata.site_name.or_else(|| canonical_host(url)),
            meta_description: metadata.meta_description,
            markdown,
            html_truncated: truncate_chars(html, HTML_CHAR_LIMIT),
            json_ld_objects,
            anchors,
            content_hash: sha256_hex(html),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::HtmlSignalExtractor;
    use crate::testing::{FailingExtractor, FakePage};

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(Box::new(HtmlSignalExtractor), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_snapshot_of_rendered_page() {
        let page = FakePage::new();
        page.set_html(
            "https://www.example.org/",
            r#"<html><head><title>Example</title></head>
            <body><p>Hello</p><a href="/a">A</a></body></html>"#,
        );
        page.navigate_to("https://www.example.org/");

        let snapshot = builder().build(&page, "https://www.example.org/").await;

        assert_eq!(snapshot.title.as_deref(), Some("Example"));
        assert_eq!(snapshot.site_name.as_deref(), Some("example.org"));
        assert!(snapshot.markdown.contains("Hello"));
        assert_eq!(snapshot.anchors.len(), 1);
        assert!(snapshot.html_truncated.contains("<title>Example</title>"));
    }

    #[test]
    fn test_caps_are_enforced() {
        let links: String = (0..300)
            .map(|i| format!(r#"<a href="/p/{}">p{}</a>"#, i, i))
            .collect();
        let padding = "x".repeat(HTML_CHAR_LIMIT);
        let html = format!("<html><body>{}<p>{}</p></body></html>", links, padding);

        let snapshot = builder().from_html(&html, "https://example.org/");

        assert_eq!(snapshot.anchors.len(), ANCHOR_LIMIT);
        assert_eq!(snapshot.html_truncated.chars().count(), HTML_CHAR_LIMIT);
        // The hash covers the whole document, not the truncated copy
        assert_eq!(snapshot.content_hash, sha256_hex(&html));
        assert_ne!(snapshot.content_hash, sha256_hex(&snapshot.html_truncated));
    }

    #[tokio::test]
    async fn test_failed_content_read_degrades_to_empty() {
        let page = FakePage::failing();
        let snapshot = builder().build(&page, "https://example.org/x").await;

        assert_eq!(snapshot.url, "https://example.org/x");
        assert!(snapshot.html_truncated.is_empty());
        assert!(snapshot.anchors.is_empty());
        assert_eq!(snapshot.site_name.as_deref(), Some("example.org"));
    }

    #[test]
    fn test_failed_extractions_degrade_fields() {
        let builder = SnapshotBuilder::new(Box::new(FailingExtractor), Duration::ZERO);
        let snapshot = builder.from_html("<html><body>text</body></html>", "https://a.org/");

        assert_eq!(snapshot.title, None);
        assert!(snapshot.markdown.is_empty());
        assert!(snapshot.json_ld_objects.is_empty());
        assert!(snapshot.anchors.is_empty());
        assert_eq!(snapshot.html_truncated, "<html><body>text</body></html>");
    }
}
