use crate::parsers::{HtmlSignalExtractor, PageMetadata, SignalExtractor};

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html>
<head>
  <title> Green Futures  Foundation </title>
  <meta property="og:site_name" content="Green Futures">
  <meta name="twitter:site" content="@greenfutures">
  <meta property="og:description" content="Planting trees across the region.">
  <script type="application/ld+json">{"@type": "Organization", "name": "Green Futures"}</script>
  <script type="application/ld+json">[{"@type": "Project", "name": "Urban Forest"}, 7, {"@type": "Event", "name": "Tree Day"}]</script>
  <script type="application/ld+json">{ not json </script>
  <script type="application/ld+json">{"@context": "https://schema.org", "@graph": [{"@type": "WebPage"}]}</script>
</head>
<body>
  <nav><a href="/about">About   us</a></nav>
  <main>
    <h1>Our projects</h1>
    <p>We plant <strong>trees</strong>.</p>
    <a href="/projects/urban-forest#details">Urban Forest</a>
    <a href="https://greenfutures.org/projects/urban-forest">Again</a>
    <a href="#top">Top</a>
    <a href="mailto:hello@greenfutures.org">Mail</a>
    <a href="https://partner.example/"><img src="logo.png"></a>
  </main>
</body>
</html>"##;

    #[test]
    fn test_metadata_prefers_primary_sources() {
        let meta = HtmlSignalExtractor
            .extract_metadata(PAGE, "https://greenfutures.org/")
            .unwrap();

        assert_eq!(
            meta,
            PageMetadata {
                title: Some("Green Futures Foundation".to_string()),
                site_name: Some("Green Futures".to_string()),
                meta_description: Some("Planting trees across the region.".to_string()),
            }
        );
    }

    #[test]
    fn test_metadata_fallbacks() {
        let html = r#"<html><head><meta name="twitter:site" content="@gf">
            <meta name="twitter:description" content="Short"></head>
            <body><h1>Heading title</h1></body></html>"#;
        let meta = HtmlSignalExtractor
            .extract_metadata(html, "https://gf.org/")
            .unwrap();

        assert_eq!(meta.title.as_deref(), Some("Heading title"));
        assert_eq!(meta.site_name.as_deref(), Some("@gf"));
        assert_eq!(meta.meta_description.as_deref(), Some("Short"));
    }

    #[test]
    fn test_json_ld_flattens_and_skips_invalid_blocks() {
        let objects = HtmlSignalExtractor
            .extract_json_ld(PAGE, "https://greenfutures.org/")
            .unwrap();

        let types: Vec<&str> = objects
            .iter()
            .filter_map(|o| o.get("@type").and_then(|t| t.as_str()))
            .collect();
        assert_eq!(types, vec!["Organization", "Project", "Event", "WebPage"]);
    }

    #[test]
    fn test_json_ld_is_capped() {
        let items: Vec<String> = (0..80).map(|i| format!(r#"{{"n": {}}}"#, i)).collect();
        let html = format!(
            r#"<script type="application/ld+json">[{}]</script>"#,
            items.join(",")
        );
        let objects = HtmlSignalExtractor
            .extract_json_ld(&html, "https://gf.org/")
            .unwrap();
        assert_eq!(objects.len(), 50);
    }

    #[test]
    fn test_anchors_are_resolved_and_deduplicated() {
        let anchors = HtmlSignalExtractor
            .extract_anchors(PAGE, "https://greenfutures.org/", 200)
            .unwrap();

        let hrefs: Vec<&str> = anchors.iter().map(|a| a.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://greenfutures.org/about",
                "https://greenfutures.org/projects/urban-forest",
                "https://partner.example/",
            ]
        );
        assert_eq!(anchors[0].text.as_deref(), Some("About us"));
        assert_eq!(anchors[2].text, None);
    }

    #[test]
    fn test_anchor_limit() {
        let anchors = HtmlSignalExtractor
            .extract_anchors(PAGE, "https://greenfutures.org/", 1)
            .unwrap();
        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn test_markdown_uses_main_region() {
        let markdown = HtmlSignalExtractor.to_markdown(PAGE).unwrap();

        assert!(markdown.contains("Our projects"));
        assert!(markdown.contains("trees"));
        assert!(!markdown.contains("About"));
    }

    #[test]
    fn test_markdown_without_body_markup() {
        let markdown = HtmlSignalExtractor.to_markdown("plain words").unwrap();
        assert!(markdown.contains("plain words"));
    }
}
