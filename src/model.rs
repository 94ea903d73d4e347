//! Library records: documents, their analyses, collections and view state.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Document lifecycle ───────────────────────────────────────────────────

/// Where a document is in its extract → analyze lifecycle.
///
/// ```text
/// New ──▶ Extracting ──▶ Analyzing ──▶ Complete
///  │          │              ▲   │
///  └──────────┼──────────────┘   │   (URL documents skip extraction)
///             └──────▶ Error ◀───┘
/// ```
///
/// `Error` and `Complete` are terminal; only a delete removes the record.
/// The wire names match the rows already stored in the cloud table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[default]
    #[serde(rename = "IDLE")]
    New,
    #[serde(rename = "EXTRACTING")]
    Extracting,
    #[serde(rename = "ANALYZING")]
    Analyzing,
    #[serde(rename = "COMPLETED")]
    Complete,
    #[serde(rename = "ERROR")]
    Error,
}

impl DocumentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (New, Extracting)
                | (New, Analyzing)
                | (Extracting, Analyzing)
                | (Analyzing, Complete)
                | (Extracting, Error)
                | (Analyzing, Error)
        )
    }

    /// True while a task is still working on the document.
    pub fn is_in_flight(self) -> bool {
        matches!(self, DocumentStatus::Extracting | DocumentStatus::Analyzing)
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentStatus::New => "new",
            DocumentStatus::Extracting => "extracting",
            DocumentStatus::Analyzing => "analyzing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// Structured summary of a paper as returned by a provider.
///
/// Every field is required: a provider response that omits one fails to
/// parse, which the adapter reports as a malformed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub title: String,
    pub authors: Vec<String>,
    pub background: String,
    pub motivation: String,
    pub research_conclusion: String,
    pub methodology_math: String,
    pub implementation_details: String,
    pub evaluation_results: String,
    pub reviewer_critique: String,
    pub one_more_thing: String,
    pub suggested_tags: Vec<String>,
}

impl Analysis {
    /// The eight narrative sections, labelled, in reading order.
    pub fn sections(&self) -> [(&'static str, &str); 8] {
        [
            ("Background", &self.background),
            ("Motivation", &self.motivation),
            ("Conclusion", &self.research_conclusion),
            ("Methodology", &self.methodology_math),
            ("Implementation", &self.implementation_details),
            ("Results", &self.evaluation_results),
            ("Critique", &self.reviewer_critique),
            ("One more thing", &self.one_more_thing),
        ]
    }

    /// Labels of narrative sections the provider left blank.
    pub fn empty_sections(&self) -> Vec<&'static str> {
        self.sections()
            .iter()
            .filter(|(_, body)| body.trim().is_empty())
            .map(|(label, _)| *label)
            .collect()
    }
}

// ── Document ─────────────────────────────────────────────────────────────

/// One uploaded or linked paper and its analysis lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub original_title: String,
    pub date_added: DateTime<Utc>,
    pub status: DocumentStatus,
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub collection_ids: Vec<String>,
    #[serde(default)]
    pub user_notes: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// Locally cached PDF bytes, stored as base64 text.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub file_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Document {
    /// A fresh record in the `New` state with a random UUID.
    pub fn new(original_title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_title: original_title.into(),
            date_added: Utc::now(),
            status: DocumentStatus::New,
            analysis: None,
            tags: Vec::new(),
            collection_ids: Vec::new(),
            user_notes: String::new(),
            is_favorite: false,
            is_read: false,
            source_url: None,
            storage_path: None,
            file_data: None,
            extracted_text: None,
            error_message: None,
        }
    }

    /// Record for a local PDF, keeping a copy of its bytes.
    pub fn from_file(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mut doc = Self::new(name);
        doc.file_data = Some(bytes);
        doc
    }

    /// Record for a paper analysed from its URL.
    pub fn from_url(url: &str) -> Self {
        let mut doc = Self::new(title_from_url(url));
        doc.tags.push("Link".to_string());
        doc.source_url = Some(url.to_string());
        doc
    }

    /// The analysed title when there is one, the upload name otherwise.
    pub fn display_title(&self) -> &str {
        self.analysis
            .as_ref()
            .map(|a| a.title.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.original_title)
    }

    /// Restore `analysis ⇒ Complete` on a record that came from outside the
    /// lifecycle (a cloud row or an imported file). A readable analysis wins
    /// over whatever status was stored with it.
    pub fn settle_status(&mut self) {
        if self.analysis.is_some() && self.status != DocumentStatus::Complete {
            self.status = DocumentStatus::Complete;
            self.error_message = None;
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn in_collection(&self, collection_id: &str) -> bool {
        self.collection_ids.iter().any(|c| c == collection_id)
    }
}

/// Guess a title from the last path segment of a URL.
fn title_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|seg| seg.replace(".pdf", ""))
        .filter(|seg| !seg.is_empty() && !seg.contains(':'))
        .unwrap_or_else(|| "Web Document".to_string())
}

// ── Collections & view state ─────────────────────────────────────────────

/// A user-defined named grouping of documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Which document subset the inbox shows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Favorites,
    Collection(String),
    Tag(String),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Favorites => doc.is_favorite,
            Filter::Collection(id) => doc.in_collection(id),
            Filter::Tag(tag) => doc.has_tag(tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Dashboard,
    Reader,
}

/// Language the provider writes the analysis in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "zh" | "chinese" => Ok(Language::Zh),
            other => Err(format!("unknown language '{other}' (expected en or zh)")),
        }
    }
}

// ── serde helpers ────────────────────────────────────────────────────────

mod base64_bytes {
    use super::{Engine, BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&BASE64.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|e| BASE64.decode(e.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_analysis() -> Analysis {
        Analysis {
            title: "Attention Is All You Need".into(),
            authors: vec!["Vaswani".into(), "Shazeer".into()],
            background: "Sequence transduction.".into(),
            motivation: "Recurrence is slow.".into(),
            research_conclusion: "Attention suffices.".into(),
            methodology_math: "$\\mathrm{softmax}(QK^T/\\sqrt{d_k})V$".into(),
            implementation_details: "8 P100 GPUs.".into(),
            evaluation_results: "28.4 BLEU.".into(),
            reviewer_critique: "Quadratic memory.".into(),
            one_more_thing: "Positional encodings.".into(),
            suggested_tags: vec!["NLP".into(), "Transformer".into()],
        }
    }

    #[test]
    fn analysis_settles_status_to_complete() {
        let mut doc = Document::new("attention.pdf");
        doc.status = DocumentStatus::Error;
        doc.error_message = Some("timeout".into());
        doc.analysis = Some(sample_analysis());
        doc.settle_status();
        assert_eq!(doc.status, DocumentStatus::Complete);
        assert!(doc.error_message.is_none());

        let mut pending = Document::new("bert.pdf");
        pending.status = DocumentStatus::Analyzing;
        pending.settle_status();
        assert_eq!(pending.status, DocumentStatus::Analyzing);
    }

    #[test]
    fn lifecycle_transitions() {
        use DocumentStatus::*;
        assert!(New.can_transition_to(Extracting));
        assert!(New.can_transition_to(Analyzing));
        assert!(Extracting.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Complete));
        assert!(Extracting.can_transition_to(Error));
        assert!(Analyzing.can_transition_to(Error));

        assert!(!New.can_transition_to(Complete));
        assert!(!New.can_transition_to(Error));
        assert!(!Error.can_transition_to(Analyzing));
        assert!(!Complete.can_transition_to(Analyzing));
        assert!(!Extracting.can_transition_to(Complete));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Complete).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::from_str::<DocumentStatus>("\"IDLE\"").unwrap(),
            DocumentStatus::New
        );
    }

    #[test]
    fn title_from_url_strips_pdf_suffix() {
        let doc = Document::from_url("https://arxiv.org/pdf/1706.03762.pdf");
        assert_eq!(doc.original_title, "1706.03762");
        assert_eq!(doc.tags, vec!["Link"]);
        assert_eq!(doc.status, DocumentStatus::New);
    }

    #[test]
    fn title_from_bare_host_falls_back() {
        assert_eq!(Document::from_url("https://").original_title, "Web Document");
    }

    #[test]
    fn file_data_round_trips_as_base64() {
        let doc = Document::from_file("a.pdf", b"%PDF-1.7".to_vec());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["fileData"], "JVBERi0xLjc=");
        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back.file_data.as_deref(), Some(&b"%PDF-1.7"[..]));
    }

    #[test]
    fn display_title_prefers_analysis() {
        let mut doc = Document::new("upload.pdf");
        assert_eq!(doc.display_title(), "upload.pdf");
        doc.analysis = Some(sample_analysis());
        assert_eq!(doc.display_title(), "Attention Is All You Need");
    }

    #[test]
    fn empty_sections_are_reported() {
        let mut a = sample_analysis();
        assert!(a.empty_sections().is_empty());
        a.reviewer_critique = "  ".into();
        assert_eq!(a.empty_sections(), vec!["Critique"]);
    }

    #[test]
    fn filter_matching() {
        let mut doc = Document::new("x.pdf");
        doc.tags.push("RL".into());
        doc.collection_ids.push("c1".into());
        assert!(Filter::All.matches(&doc));
        assert!(!Filter::Favorites.matches(&doc));
        assert!(Filter::Tag("RL".into()).matches(&doc));
        assert!(Filter::Collection("c1".into()).matches(&doc));
        assert!(!Filter::Collection("c2".into()).matches(&doc));
    }
}
