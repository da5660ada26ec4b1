use crate::config::Plan;
use url::Url;

/// Domain policy deciding which URLs may enter the frontier
///
/// The start host and allowlist are canonicalized once; `allowed` itself
/// holds no mutable state, so repeated calls with the same input agree.
#[derive(Debug, Clone)]
pub struct ReachabilityFilter {
    same_domain_only: bool,
    root_host: Option<String>,
    allowlist: Vec<String>,
}

impl ReachabilityFilter {
    /// Create a filter from the walk plan
    pub fn new(plan: &Plan) -> Self {
        let allowlist = plan
            .domain_allowlist
            .iter()
            .map(|entry| strip_www(&entry.trim().trim_end_matches('.').to_lowercase()).to_string())
            .filter(|entry| !entry.is_empty())
            .collect();

        Self {
            same_domain_only: plan.same_domain_only,
            root_host: canonical_host(&plan.start_url),
            allowlist,
        }
    }

    /// Determine if a URL may be queued
    pub fn allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        if !self.same_domain_only {
            return true;
        }

        let Some(host) = parsed.host_str().map(|h| strip_www(&h.to_lowercase()).to_string())
        else {
            return false;
        };

        if let Some(root) = &self.root_host {
            if same_site(&host, root) {
                return true;
            }
        }

        self.allowlist
            .iter()
            .any(|entry| host == *entry || host.ends_with(&format!(".{}", entry)))
    }
}

/// Convenience wrapper for a one-off check against a plan
pub fn allowed(url: &str, plan: &Plan) -> bool {
    ReachabilityFilter::new(plan).allowed(url)
}

/// Lower-cased host without a leading "www."
pub fn canonical_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = strip_www(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Hosts are the same site when equal or when either is a subdomain of the other
fn same_site(a: &str, b: &str) -> bool {
    a == b || a.ends_with(&format!(".{}", b)) || b.ends_with(&format!(".{}", a))
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Resolve a discovered link against the page it was found on
///
/// Drops the fragment and anything that is not http(s), so `mailto:`,
/// `javascript:` and `tel:` links never reach the frontier.
pub fn resolve_link(base: &str, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    let resolved = match Url::parse(link) {
        Ok(url) => url,
        Err(_) => Url::parse(base).ok()?.join(link).ok()?,
    };

    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    Some(normalize_url(&resolved).to_string())
}

/// Create a normalized version of the URL (e.g., removing fragments)
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}
