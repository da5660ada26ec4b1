//! Reflector boundary: turns page snapshots into candidate entities and next steps.
//!
//! The walk only depends on the [`Reflector`] trait. Output coming from an
//! external interpreter is rarely exactly on-schema, so [`ReflectOutput::from_value`]
//! normalizes near misses instead of rejecting them.

use crate::config::Plan;
use crate::results::Snapshot;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReflectError {
    #[error("reflector transport failed: {0}")]
    Transport(String),

    #[error("malformed reflector output: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    None,
    #[default]
    Partial,
    Sufficient,
}

impl Coverage {
    /// Map a coverage label, including common synonyms, to a known value
    pub fn normalize(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "none" | "empty" | "nothing" | "no" => Some(Coverage::None),
            "partial" | "some" | "incomplete" | "in_progress" | "in progress" => {
                Some(Coverage::Partial)
            }
            "sufficient" | "full" | "complete" | "enough" | "done" => Some(Coverage::Sufficient),
            _ => None,
        }
    }
}

/// Follow-up action suggested by the reflector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Goto { url: String },
    Scroll,
    OpenSitemap,
    OpenRobots,
    SwitchLanguage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

/// Known action tags, before payloads are attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Goto,
    Scroll,
    OpenSitemap,
    OpenRobots,
    SwitchLanguage,
}

impl ActionKind {
    /// Map a free-form action type to the closest known tag
    pub fn normalize(raw: &str) -> Option<Self> {
        let tag = raw.trim().to_lowercase().replace(['-', ' '], "_");
        if tag.is_empty() {
            return None;
        }
        if tag.contains("sitemap") {
            return Some(ActionKind::OpenSitemap);
        }
        if tag.contains("robots") {
            return Some(ActionKind::OpenRobots);
        }
        if tag.contains("lang") {
            return Some(ActionKind::SwitchLanguage);
        }
        if tag.starts_with("scroll") || tag == "infinite_scroll" || tag == "load_more" {
            return Some(ActionKind::Scroll);
        }
        match tag.as_str() {
            "goto" | "go_to" | "navigate" | "open_url" | "open" | "visit" | "follow" => {
                Some(ActionKind::Goto)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationCandidate {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCandidate {
    pub name: String,
    pub description: Option<String>,
    pub source_url: Option<String>,
}

/// Structured interpretation of a batch of snapshots
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReflectOutput {
    pub done: bool,
    pub coverage: Coverage,
    pub justification: Option<String>,
    pub organization: Option<OrganizationCandidate>,
    pub projects: Vec<ProjectCandidate>,
    pub goto_urls: Vec<String>,
    pub actions: Vec<Action>,
}

impl ReflectOutput {
    /// Degraded result used whenever reflection fails
    pub fn fallback() -> Self {
        Self {
            done: false,
            coverage: Coverage::Partial,
            justification: Some("fallback after parse error".to_string()),
            ..Self::default()
        }
    }

    /// Parse reflector text, tolerating prose or code fences around the JSON object
    pub fn parse(text: &str) -> Result<Self, ReflectError> {
        let start = text
            .find('{')
            .ok_or_else(|| ReflectError::Malformed("no JSON object found".to_string()))?;
        let end = text
            .rfind('}')
            .filter(|end| *end > start)
            .ok_or_else(|| ReflectError::Malformed("unterminated JSON object".to_string()))?;

        let value: Value = serde_json::from_str(&text[start..=end])
            .map_err(|e| ReflectError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Normalize near-schema JSON into a `ReflectOutput`
    pub fn from_value(value: &Value) -> Result<Self, ReflectError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ReflectError::Malformed("top level is not an object".to_string()))?;

        let done = field(obj, &["done", "finished"])
            .map(|v| match v {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
                _ => false,
            })
            .unwrap_or(false);

        let coverage = field(obj, &["coverage"])
            .and_then(Value::as_str)
            .and_then(Coverage::normalize)
            .unwrap_or_default();

        let organization = field(obj, &["organization", "org"])
            .and_then(Value::as_object)
            .and_then(organization_from);

        let projects = objects(field(obj, &["projects"]))
            .filter_map(project_from)
            .collect();

        let goto_urls = field(obj, &["goto_urls", "gotoUrls", "urls"])
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let actions = objects(field(obj, &["actions"]))
            .filter_map(action_from)
            .collect();

        Ok(Self {
            done,
            coverage,
            justification: text_field(obj, &["justification", "reason"]),
            organization,
            projects,
            goto_urls,
            actions,
        })
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name)).filter(|v| !v.is_null())
}

fn text_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Object entries of a list field; anything else is discarded
fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn organization_from(obj: &Map<String, Value>) -> Option<OrganizationCandidate> {
    Some(OrganizationCandidate {
        name: text_field(obj, &["name"])?,
        description: text_field(obj, &["description"]),
        website: text_field(obj, &["website", "url"]),
        contact_email: text_field(obj, &["contact_email", "email"]),
    })
}

fn project_from(obj: &Map<String, Value>) -> Option<ProjectCandidate> {
    Some(ProjectCandidate {
        name: text_field(obj, &["name", "title"])?,
        description: text_field(obj, &["description"]),
        source_url: text_field(obj, &["source_url", "url"]),
    })
}

fn action_from(obj: &Map<String, Value>) -> Option<Action> {
    let kind = field(obj, &["type", "action", "kind"])
        .and_then(Value::as_str)
        .and_then(ActionKind::normalize)?;

    Some(match kind {
        ActionKind::Goto => Action::Goto {
            url: text_field(obj, &["url", "arg"])?,
        },
        ActionKind::Scroll => Action::Scroll,
        ActionKind::OpenSitemap => Action::OpenSitemap,
        ActionKind::OpenRobots => Action::OpenRobots,
        ActionKind::SwitchLanguage => Action::SwitchLanguage {
            language: text_field(obj, &["language", "arg", "pattern"]),
        },
    })
}

/// Interprets snapshots into candidate entities and next steps
#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(&self, plan: &Plan, snapshots: &[Snapshot])
    -> Result<ReflectOutput, ReflectError>;
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").expect("email regex is valid")
});

const PROJECT_TYPES: &[&str] = &["Project", "CreativeWork", "Event"];

/// Deterministic reflector that needs no external service
///
/// Proposes every anchor as the next URL, derives the organization from page
/// metadata and collects project-like JSON-LD objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnchorReflector;

#[async_trait]
impl Reflector for AnchorReflector {
    async fn reflect(
        &self,
        plan: &Plan,
        snapshots: &[Snapshot],
    ) -> Result<ReflectOutput, ReflectError> {
        let mut output = ReflectOutput::default();

        if let Some(first) = snapshots.first() {
            output.organization = organization_hint(plan, first);
        }

        for snapshot in snapshots {
            output
                .goto_urls
                .extend(snapshot.anchors.iter().map(|a| a.href.clone()));
            output.projects.extend(
                snapshot
                    .json_ld_objects
                    .iter()
                    .filter(|obj| has_project_type(obj))
                    .filter_map(|obj| {
                        let mut candidate = project_from(obj)?;
                        if candidate.source_url.is_none() {
                            candidate.source_url = Some(snapshot.url.clone());
                        }
                        Some(candidate)
                    }),
            );
        }

        let found = output.organization.is_some()
            || !output.projects.is_empty()
            || !output.goto_urls.is_empty();
        output.coverage = if found {
            Coverage::Partial
        } else {
            Coverage::None
        };
        output.justification = Some(format!(
            "{} links, {} projects from {} snapshot(s)",
            output.goto_urls.len(),
            output.projects.len(),
            snapshots.len()
        ));

        Ok(output)
    }
}

fn organization_hint(plan: &Plan, snapshot: &Snapshot) -> Option<OrganizationCandidate> {
    let name = snapshot
        .site_name
        .clone()
        .or_else(|| snapshot.title.clone())?;

    let contact_email = EMAIL_RE
        .find(&snapshot.markdown)
        .map(|m| m.as_str().to_lowercase());

    Some(OrganizationCandidate {
        name,
        description: snapshot.meta_description.clone(),
        website: Some(plan.start_url.clone()),
        contact_email,
    })
}

fn has_project_type(obj: &Map<String, Value>) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => PROJECT_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| PROJECT_TYPES.contains(&t)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Anchor;
    use serde_json::json;

    #[test]
    fn test_coverage_synonyms() {
        assert_eq!(Coverage::normalize("FULL"), Some(Coverage::Sufficient));
        assert_eq!(Coverage::normalize(" complete "), Some(Coverage::Sufficient));
        assert_eq!(Coverage::normalize("some"), Some(Coverage::Partial));
        assert_eq!(Coverage::normalize("none"), Some(Coverage::None));
        assert_eq!(Coverage::normalize("maybe"), None);
    }

    #[test]
    fn test_action_kind_normalization() {
        assert_eq!(ActionKind::normalize("GOTO"), Some(ActionKind::Goto));
        assert_eq!(ActionKind::normalize("go-to"), Some(ActionKind::Goto));
        assert_eq!(ActionKind::normalize("scroll_down"), Some(ActionKind::Scroll));
        assert_eq!(
            ActionKind::normalize("open sitemap.xml"),
            Some(ActionKind::OpenSitemap)
        );
        assert_eq!(
            ActionKind::normalize("OPEN_ROBOTS"),
            Some(ActionKind::OpenRobots)
        );
        assert_eq!(
            ActionKind::normalize("switch-language"),
            Some(ActionKind::SwitchLanguage)
        );
        assert_eq!(ActionKind::normalize("DANCE"), None);
        assert_eq!(ActionKind::normalize(""), None);
    }

    #[test]
    fn test_from_value_normalizes_near_schema_input() {
        let value = json!({
            "done": "yes",
            "coverage": "complete",
            "justification": "found the about page",
            "organization": {"name": "Open Org", "url": "https://org.example"},
            "projects": [
                {"name": "Clean Water", "url": "https://org.example/water"},
                "not an object",
                {"description": "nameless"}
            ],
            "gotoUrls": ["https://org.example/a", 42, " "],
            "actions": [
                {"type": "scroll"},
                {"type": "goto", "url": "https://org.example/b"},
                {"type": "goto"},
                {"type": "levitate"},
                {"action": "switch_language", "arg": "uk"},
                7
            ]
        });

        let out = ReflectOutput::from_value(&value).unwrap();
        assert!(out.done);
        assert_eq!(out.coverage, Coverage::Sufficient);
        assert_eq!(out.justification.as_deref(), Some("found the about page"));

        let org = out.organization.unwrap();
        assert_eq!(org.name, "Open Org");
        assert_eq!(org.website.as_deref(), Some("https://org.example"));

        assert_eq!(out.projects.len(), 1);
        assert_eq!(
            out.projects[0].source_url.as_deref(),
            Some("https://org.example/water")
        );
        assert_eq!(out.goto_urls, vec!["https://org.example/a"]);
        assert_eq!(
            out.actions,
            vec![
                Action::Scroll,
                Action::Goto {
                    url: "https://org.example/b".to_string()
                },
                Action::SwitchLanguage {
                    language: Some("uk".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let out = ReflectOutput::from_value(&json!({})).unwrap();
        assert!(!out.done);
        assert_eq!(out.coverage, Coverage::Partial);
        assert!(out.organization.is_none());
        assert!(out.goto_urls.is_empty());
    }

    #[test]
    fn test_parse_tolerates_surrounding_text() {
        let text = "Here you go:\n```json\n{\"coverage\": \"full\", \"goto_urls\": [\"https://x.test\"]}\n```";
        let out = ReflectOutput::parse(text).unwrap();
        assert_eq!(out.coverage, Coverage::Sufficient);
        assert_eq!(out.goto_urls, vec!["https://x.test"]);

        assert!(matches!(
            ReflectOutput::parse("no json here"),
            Err(ReflectError::Malformed(_))
        ));
        assert!(matches!(
            ReflectOutput::parse("[1, 2]"),
            Err(ReflectError::Malformed(_))
        ));
    }

    #[test]
    fn test_fallback_shape() {
        let out = ReflectOutput::fallback();
        assert!(!out.done);
        assert_eq!(out.coverage, Coverage::Partial);
        assert_eq!(
            out.justification.as_deref(),
            Some("fallback after parse error")
        );
    }

    #[test]
    fn test_action_serializes_with_type_tag() {
        let value = serde_json::to_value(Action::Goto {
            url: "https://x.test".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "GOTO", "url": "https://x.test"}));
        assert_eq!(
            serde_json::to_value(Action::OpenSitemap).unwrap(),
            json!({"type": "OPEN_SITEMAP"})
        );
    }

    #[tokio::test]
    async fn test_anchor_reflector() {
        let plan = Plan::new("https://org.example");
        let mut project = Map::new();
        project.insert("@type".to_string(), json!(["Thing", "Project"]));
        project.insert("name".to_string(), json!("Library Bus"));

        let snapshot = Snapshot {
            url: "https://org.example/projects".to_string(),
            title: Some("Projects | Open Org".to_string()),
            site_name: Some("Open Org".to_string()),
            meta_description: Some("We run things".to_string()),
            markdown: "Write to Hello@Org.Example any time".to_string(),
            json_ld_objects: vec![project],
            anchors: vec![Anchor {
                text: Some("About".to_string()),
                href: "https://org.example/about".to_string(),
            }],
            ..Snapshot::default()
        };

        let out = AnchorReflector.reflect(&plan, &[snapshot]).await.unwrap();
        assert!(!out.done);
        assert_eq!(out.coverage, Coverage::Partial);
        assert_eq!(out.goto_urls, vec!["https://org.example/about"]);

        let org = out.organization.unwrap();
        assert_eq!(org.name, "Open Org");
        assert_eq!(org.contact_email.as_deref(), Some("hello@org.example"));
        assert_eq!(org.website.as_deref(), Some("https://org.example"));

        assert_eq!(out.projects.len(), 1);
        assert_eq!(out.projects[0].name, "Library Bus");
        assert_eq!(
            out.projects[0].source_url.as_deref(),
            Some("https://org.example/projects")
        );
    }

    #[tokio::test]
    async fn test_anchor_reflector_empty_page() {
        let plan = Plan::new("https://org.example");
        let out = AnchorReflector
            .reflect(&plan, &[Snapshot::default()])
            .await
            .unwrap();
        assert_eq!(out.coverage, Coverage::None);
        assert!(out.organization.is_none());
    }
}
