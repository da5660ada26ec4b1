//! Declarative phrase and selector tables used by the reveal engine.
//!
//! Phrases are plain literals tagged by language. They are compiled into one
//! case-insensitive matcher per set, so the engine never needs to know which
//! language a page is written in.

use regex::Regex;
use std::collections::HashMap;

/// Literal phrases for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangPhrases {
    pub lang: String,
    pub phrases: Vec<String>,
}

impl LangPhrases {
    pub fn new(lang: &str, phrases: &[&str]) -> Self {
        Self {
            lang: lang.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A compiled, case-insensitive set of phrases
#[derive(Debug, Clone)]
pub struct PhraseSet {
    groups: Vec<LangPhrases>,
    matcher: Regex,
}

impl PhraseSet {
    /// Matches any phrase found inside the text, on word boundaries
    pub fn contains(groups: Vec<LangPhrases>) -> Result<Self, regex::Error> {
        let body = alternation(&groups);
        let matcher = Regex::new(&format!("(?i)(?:{})", body))?;
        Ok(Self { groups, matcher })
    }

    /// Matches only when the whole (trimmed) text is one of the phrases
    pub fn exact(groups: Vec<LangPhrases>) -> Result<Self, regex::Error> {
        let body = alternation(&groups);
        let matcher = Regex::new(&format!(r"(?i)^\s*(?:{})\s*$", body))?;
        Ok(Self { groups, matcher })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    pub fn regex(&self) -> &Regex {
        &self.matcher
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.lang.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.phrases.is_empty())
    }
}

fn alternation(groups: &[LangPhrases]) -> String {
    let parts: Vec<String> = groups
        .iter()
        .flat_map(|g| g.phrases.iter())
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(phrase_pattern)
        .collect();

    if parts.is_empty() {
        // Never matches
        r"\b\B".to_string()
    } else {
        parts.join("|")
    }
}

/// Escape a literal, let inner whitespace stretch, and anchor word edges
fn phrase_pattern(phrase: &str) -> String {
    let escaped = phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");

    let starts_word = phrase.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = phrase.chars().last().is_some_and(char::is_alphanumeric);

    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

/// Every phrase set the reveal engine consults
#[derive(Debug, Clone)]
pub struct PatternTables {
    /// Cookie consent buttons
    pub cookie: PhraseSet,
    /// Close / dismiss affordances on popups
    pub close: PhraseSet,
    /// "Read more" style expanders
    pub expand: PhraseSet,
    /// Navigation tabs leading to projects and programs
    pub nav_tabs: PhraseSet,
    /// "More" controls clicked inside iframes
    pub frame_more: PhraseSet,
    /// Visible link labels per language code, for the language switcher
    pub language_labels: HashMap<String, Vec<String>>,
}

impl PatternTables {
    /// Exact-match matcher for the labels of one language code
    pub fn language_matcher(&self, code: &str) -> Option<PhraseSet> {
        let labels = self.language_labels.get(&code.to_lowercase())?;
        let phrases: Vec<&str> = labels.iter().map(String::as_str).collect();
        PhraseSet::exact(vec![LangPhrases::new(code, &phrases)]).ok()
    }
}

impl Default for PatternTables {
    fn default() -> Self {
        let cookie = vec![
            LangPhrases::new(
                "en",
                &["accept cookies", "accept all cookies", "accept all", "accept cookie", "i agree", "got it", "allow all"],
            ),
            LangPhrases::new("pl", &["akceptuj", "akceptuję", "zgadzam się", "zgadzam"]),
            LangPhrases::new("uk", &["прийняти", "погоджуюсь", "погодитися", "дозволити"]),
            LangPhrases::new("de", &["alle akzeptieren", "zustimmen"]),
            LangPhrases::new("fr", &["tout accepter", "j'accepte"]),
        ];

        let close = vec![
            LangPhrases::new("en", &["close", "dismiss", "hide", "got it", "ok", "no thanks"]),
            LangPhrases::new("pl", &["zamknij"]),
            LangPhrases::new("uk", &["закрити"]),
            LangPhrases::new("ru", &["закрыть"]),
            LangPhrases::new("de", &["schließen", "schliessen"]),
            LangPhrases::new("fr", &["fermer"]),
            LangPhrases::new("it", &["chiudi"]),
            LangPhrases::new("es", &["cerrar"]),
            LangPhrases::new("nl", &["sluiten"]),
            LangPhrases::new("*", &["×", "✕", "✖"]),
        ];

        let expand = vec![
            LangPhrases::new(
                "en",
                &["read more", "show more", "see more", "view more", "load more", "show all", "expand"],
            ),
            LangPhrases::new("pl", &["czytaj więcej", "pokaż więcej", "rozwiń", "więcej"]),
            LangPhrases::new("uk", &["читати далі", "показати ще", "більше", "детальніше"]),
            LangPhrases::new("ru", &["читать далее", "показать еще", "показать ещё"]),
            LangPhrases::new("de", &["mehr anzeigen", "weiterlesen"]),
            LangPhrases::new("fr", &["voir plus", "lire la suite"]),
            LangPhrases::new("es", &["ver más", "leer más"]),
        ];

        let nav_tabs = vec![
            LangPhrases::new(
                "en",
                &[
                    "projects",
                    "project",
                    "initiatives",
                    "programs",
                    "programmes",
                    "our work",
                    "what we do",
                    "areas of work",
                    "directions",
                ],
            ),
            LangPhrases::new("pl", &["projekty", "inicjatywy", "programy", "działania"]),
            LangPhrases::new("uk", &["наші проєкти", "наші проекти", "проєкти", "ініціативи", "програми"]),
        ];

        let frame_more = vec![
            LangPhrases::new("en", &["more", "show more", "see more"]),
            LangPhrases::new("pl", &["więcej"]),
            LangPhrases::new("uk", &["показати ще", "детальніше"]),
        ];

        let mut language_labels = HashMap::new();
        language_labels.insert(
            "uk".to_string(),
            labels(&["Українська", "Українською", "UA", "UK", "Ukrainian"]),
        );
        language_labels.insert("en".to_string(), labels(&["English", "EN", "Eng"]));
        language_labels.insert("pl".to_string(), labels(&["Polski", "PL", "Polish"]));
        language_labels.insert("de".to_string(), labels(&["Deutsch", "DE", "German"]));

        Self {
            cookie: compile(cookie),
            close: compile(close),
            expand: compile(expand),
            nav_tabs: compile(nav_tabs),
            frame_more: compile(frame_more),
            language_labels,
        }
    }
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn compile(groups: Vec<LangPhrases>) -> PhraseSet {
    // Every built-in phrase is escaped before compilation
    PhraseSet::contains(groups).expect("built-in phrase tables compile")
}

/// Close buttons of common modal and lightbox libraries
pub const CLOSE_SELECTORS: &[&str] = &[
    r#"[aria-label*="close" i]"#,
    r#"[aria-label*="dismiss" i]"#,
    r#"[aria-label*="hide" i]"#,
    r#"button[title*="close" i]"#,
    r#"button[title*="dismiss" i]"#,
    r#"[data-dismiss="modal"]"#,
    ".mfp-close",
    ".modal .close",
    ".modal-close",
    ".popup-close",
    ".pswp__button--close",
    ".fancybox-close",
    ".fancybox__button--close",
    ".swal2-close",
    ".lightbox .close",
    ".btn-close",
    ".close-button",
    ".Dialog-close",
    ".dialog__close",
    ".overlay__close",
];

/// Overlay and backdrop nodes removed when nothing could be closed
pub const OVERLAY_SELECTORS: &[&str] = &[
    ".modal-backdrop",
    ".fancybox-container",
    ".swal2-container",
    ".lightbox-container",
    ".ReactModal__Overlay",
    r#"[role="dialog"] + .backdrop"#,
    r#"[class*="overlay"]"#,
    r#"[class*="backdrop"]"#,
];

/// "Next" controls of recognized carousel widgets
pub const CAROUSEL_NEXT_SELECTORS: &[&str] = &[
    ".slick-next",
    ".swiper-button-next",
    ".owl-next",
    r#"[aria-label="Next slide"]"#,
    r#"[data-slide="next"]"#,
    ".carousel-control-next",
    ".splide__arrow--next",
];

/// Accordion and FAQ toggles opened regardless of their aria state
pub const ACCORDION_SELECTORS: &[&str] = &[
    "[data-accordion] button",
    ".accordion button",
    ".accordion__button",
    ".faq__question button",
    ".faq button",
];
