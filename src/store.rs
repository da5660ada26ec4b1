//! Entity store for the organizations and projects found during a walk.
//!
//! Upserts are idempotent and non-destructive: records are matched by a stable
//! key, a longer description wins over a shorter one, and fields that are
//! already set are never cleared.

use crate::reflect::{OrganizationCandidate, ProjectCandidate};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use url::Url;

const ORGANIZATIONS_FILE: &str = "organizations.json";
const PROJECTS_FILE: &str = "projects.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub organization_id: u64,
    pub name: String,
    pub website: Option<String>,
    pub contact_email: Option<String>,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    pub organization_id: u64,
    pub source_url: Option<String>,
}

pub trait Store: Send + Sync {
    fn upsert_organization(
        &self,
        candidate: &OrganizationCandidate,
    ) -> Result<OrganizationRecord, StoreError>;

    fn upsert_project(
        &self,
        organization_id: u64,
        candidate: &ProjectCandidate,
    ) -> Result<ProjectRecord, StoreError>;

    fn organizations(&self) -> Vec<OrganizationRecord>;

    fn projects(&self) -> Vec<ProjectRecord>;
}

#[derive(Debug, Default)]
struct Records {
    organizations: Vec<OrganizationRecord>,
    projects: Vec<ProjectRecord>,
}

/// In-memory store with sequential ids
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records(organizations: Vec<OrganizationRecord>, projects: Vec<ProjectRecord>) -> Self {
        Self {
            records: Mutex::new(Records {
                organizations,
                projects,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn upsert_organization(
        &self,
        candidate: &OrganizationCandidate,
    ) -> Result<OrganizationRecord, StoreError> {
        Ok(upsert_organization(&mut self.lock().organizations, candidate))
    }

    fn upsert_project(
        &self,
        organization_id: u64,
        candidate: &ProjectCandidate,
    ) -> Result<ProjectRecord, StoreError> {
        Ok(upsert_project(
            &mut self.lock().projects,
            organization_id,
            candidate,
        ))
    }

    fn organizations(&self) -> Vec<OrganizationRecord> {
        self.lock().organizations.clone()
    }

    fn projects(&self) -> Vec<ProjectRecord> {
        self.lock().projects.clone()
    }
}

/// Store persisted as `organizations.json` and `projects.json` in a directory
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    memory: MemoryStore,
}

impl JsonFileStore {
    /// Open (or create) the data directory and load existing records
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let organizations = load_list(&dir.join(ORGANIZATIONS_FILE));
        let projects = load_list(&dir.join(PROJECTS_FILE));
        ::log::info!(
            "Loaded {} organizations and {} projects from {}",
            organizations.len(),
            projects.len(),
            dir.display()
        );

        Ok(Self {
            dir,
            memory: MemoryStore::with_records(organizations, projects),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Records change only once the rewritten file is on disk
impl Store for JsonFileStore {
    fn upsert_organization(
        &self,
        candidate: &OrganizationCandidate,
    ) -> Result<OrganizationRecord, StoreError> {
        let mut records = self.memory.lock();
        let mut staged = records.organizations.clone();
        let record = upsert_organization(&mut staged, candidate);
        save_list(&self.dir.join(ORGANIZATIONS_FILE), &staged)?;
        records.organizations = staged;
        Ok(record)
    }

    fn upsert_project(
        &self,
        organization_id: u64,
        candidate: &ProjectCandidate,
    ) -> Result<ProjectRecord, StoreError> {
        let mut records = self.memory.lock();
        let mut staged = records.projects.clone();
        let record = upsert_project(&mut staged, organization_id, candidate);
        save_list(&self.dir.join(PROJECTS_FILE), &staged)?;
        records.projects = staged;
        Ok(record)
    }

    fn organizations(&self) -> Vec<OrganizationRecord> {
        self.memory.organizations()
    }

    fn projects(&self) -> Vec<ProjectRecord> {
        self.memory.projects()
    }
}

/// `scheme://host` with the host lower-cased and "www." removed
pub fn canonical_site(website: &str) -> Option<String> {
    let url = Url::parse(website.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn normalized_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Replace only with a strictly longer description
fn merge_description(existing: &mut String, incoming: Option<&str>) {
    if let Some(incoming) = incoming {
        if incoming.chars().count() > existing.chars().count() {
            *existing = incoming.to_string();
        }
    }
}

fn fill(existing: &mut Option<String>, incoming: Option<&str>) {
    if existing.as_deref().is_none_or(str::is_empty) {
        if let Some(incoming) = incoming {
            *existing = Some(incoming.to_string());
        }
    }
}

fn upsert_organization(
    organizations: &mut Vec<OrganizationRecord>,
    candidate: &OrganizationCandidate,
) -> OrganizationRecord {
    let site = candidate.website.as_deref().and_then(canonical_site);
    let name = normalized_name(&candidate.name);
    let description = non_empty(&candidate.description);
    let email = non_empty(&candidate.contact_email);

    let by_site = site.as_ref().and_then(|site| {
        organizations.iter().position(|o| {
            o.website.as_deref().and_then(canonical_site).as_ref() == Some(site)
        })
    });
    let by_name = || {
        (!name.is_empty())
            .then(|| {
                organizations
                    .iter()
                    .position(|o| normalized_name(&o.name) == name)
            })
            .flatten()
    };

    if let Some(index) = by_site.or_else(by_name) {
        let existing = &mut organizations[index];
        merge_description(&mut existing.description, description);
        fill(&mut existing.contact_email, email);
        fill(&mut existing.website, site.as_deref());
        if existing.name.trim().is_empty() {
            existing.name = candidate.name.trim().to_string();
        }
        return existing.clone();
    }

    let record = OrganizationRecord {
        organization_id: next_id(organizations.iter().map(|o| o.organization_id)),
        name: candidate.name.trim().to_string(),
        website: site.or_else(|| candidate.website.clone()),
        contact_email: email.map(str::to_string),
        description: description.unwrap_or_default().to_string(),
        created_at: now_rfc3339(),
    };
    organizations.push(record.clone());
    record
}

fn upsert_project(
    projects: &mut Vec<ProjectRecord>,
    organization_id: u64,
    candidate: &ProjectCandidate,
) -> ProjectRecord {
    let source = non_empty(&candidate.source_url);
    let name = normalized_name(&candidate.name);
    let description = non_empty(&candidate.description);

    let by_source = source.and_then(|source| {
        projects.iter().position(|p| {
            p.organization_id == organization_id && p.source_url.as_deref() == Some(source)
        })
    });
    let by_name = || {
        (!name.is_empty())
            .then(|| {
                projects.iter().position(|p| {
                    p.organization_id == organization_id && normalized_name(&p.name) == name
                })
            })
            .flatten()
    };

    if let Some(index) = by_source.or_else(by_name) {
        let existing = &mut projects[index];
        merge_description(&mut existing.description, description);
        fill(&mut existing.source_url, source);
        return existing.clone();
    }

    let record = ProjectRecord {
        project_id: next_id(projects.iter().map(|p| p.project_id)),
        name: candidate.name.trim().to_string(),
        description: description.unwrap_or_default().to_string(),
        created_at: now_rfc3339(),
        organization_id,
        source_url: source.map(str::to_string),
    };
    projects.push(record.clone());
    record
}

fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().unwrap_or(0) + 1
}

/// Missing or unreadable files start empty
fn load_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            ::log::warn!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(list) => list,
        Err(e) => {
            ::log::warn!("Ignoring malformed {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

fn save_list<T: Serialize>(path: &Path, list: &[T]) -> Result<(), StoreError> {
    ::log::debug!("Saving {} records to {}", list.len(), path.display());
    let json = serde_json::to_string_pretty(list)?;
    fs::write(path, json)?;
    Ok(())
}
