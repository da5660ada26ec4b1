//! Per-page files kept beside a walk: the rendered HTML, its markdown and a
//! screenshot. Every file is best effort; a failed write only leaves that
//! path out of the record.

use crate::page::PageAutomation;
use crate::results::{PageArtifacts, Snapshot};
use crate::utils::sanitize_filename;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

pub struct ArtifactWriter {
    dir: PathBuf,
    capture_timeout: Duration,
}

impl ArtifactWriter {
    /// Create the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P, capture_timeout: Duration) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            capture_timeout,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the files of the `index`-th visit
    pub async fn save<P>(
        &self,
        page: &P,
        index: u64,
        snapshot: &Snapshot,
        html: &str,
    ) -> PageArtifacts
    where
        P: PageAutomation + ?Sized,
    {
        let stem = format!("{:04}-{}", index, sanitize_filename(&snapshot.url));

        let screenshot = match self.capture(page).await {
            Some(png) => self.write(&format!("{}.png", stem), &png),
            None => None,
        };

        let saved = PageArtifacts {
            url: snapshot.url.clone(),
            content_hash: snapshot.content_hash.clone(),
            html: self.write(&format!("{}.html", stem), html.as_bytes()),
            markdown: self.write(&format!("{}.md", stem), snapshot.markdown.as_bytes()),
            screenshot,
        };
        ::log::debug!("Saved artifacts for {} as {}", snapshot.url, stem);
        saved
    }

    /// Full-page capture first, then the viewport
    async fn capture<P>(&self, page: &P) -> Option<Vec<u8>>
    where
        P: PageAutomation + ?Sized,
    {
        for full_page in [true, false] {
            match timeout(self.capture_timeout, page.screenshot(full_page)).await {
                Ok(Ok(png)) => return Some(png),
                Ok(Err(e)) => ::log::debug!("Screenshot (full page: {}) failed: {}", full_page, e),
                Err(_) => ::log::debug!("Screenshot (full page: {}) timed out", full_page),
            }
        }
        None
    }

    fn write(&self, name: &str, contents: &[u8]) -> Option<PathBuf> {
        let path = self.dir.join(name);
        match fs::write(&path, contents) {
            Ok(()) => Some(path),
            Err(e) => {
                ::log::warn!("Failed to write {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use crate::utils::sha256_hex;
    use tempfile::TempDir;

    const HTML: &str = "<html><body><h1>Team</h1></body></html>";

    fn snapshot() -> Snapshot {
        Snapshot {
            url: "https://org.example/team?lang=en".to_string(),
            markdown: "# Team".to_string(),
            content_hash: sha256_hex(HTML),
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_writes_html_markdown_and_screenshot() {
        let dir = TempDir::new().unwrap();
        let writer =
            ArtifactWriter::open(dir.path().join("artifacts"), Duration::from_secs(1)).unwrap();
        let page = FakePage::new();

        let saved = writer.save(&page, 3, &snapshot(), HTML).await;

        let html = saved.html.unwrap();
        assert_eq!(
            html.file_name().unwrap().to_str().unwrap(),
            "0003-org.example_team_lang_en.html"
        );
        assert_eq!(fs::read_to_string(html).unwrap(), HTML);
        assert_eq!(fs::read_to_string(saved.markdown.unwrap()).unwrap(), "# Team");
        assert!(fs::read(saved.screenshot.unwrap()).unwrap().starts_with(b"\x89PNG"));
        assert_eq!(saved.content_hash, sha256_hex(HTML));
        assert_eq!(page.screenshots(), vec![true]);
    }

    #[tokio::test]
    async fn test_screenshot_falls_back_to_viewport() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::open(dir.path(), Duration::from_secs(1)).unwrap();
        let page = FakePage::new();
        page.fail_full_page_screenshots();

        let saved = writer.save(&page, 1, &snapshot(), HTML).await;

        assert!(saved.screenshot.is_some());
        assert_eq!(page.screenshots(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_failed_capture_and_writes_are_left_out() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::open(dir.path(), Duration::from_secs(1)).unwrap();
        fs::remove_dir_all(dir.path()).unwrap();

        let saved = writer.save(&FakePage::failing(), 1, &snapshot(), HTML).await;

        assert_eq!(saved.url, "https://org.example/team?lang=en");
        assert_eq!(saved.html, None);
        assert_eq!(saved.markdown, None);
        assert_eq!(saved.screenshot, None);
    }

    #[test]
    fn test_open_rejects_a_file_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("taken");
        fs::write(&file, "x").unwrap();
        assert!(ArtifactWriter::open(&file, Duration::from_secs(1)).is_err());
    }
}
