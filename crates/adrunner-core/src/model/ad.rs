//! Ad entries as exposed by a parsed document.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Top-level document produced by a [`crate::DocumentParser`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VastDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub ads: Vec<AdEntry>,
}

/// One `<Ad>` entry. An entry with neither body is malformed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Position in the pod; buffet ads have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineAd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<WrapperAd>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InlineAd {
    #[serde(default)]
    pub media_files: Vec<MediaFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_parameters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_through: Option<String>,
    /// Raw skip offset as declared (`HH:MM:SS` or a percentage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress_events: Vec<ProgressEvent>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WrapperAd {
    pub ad_tag_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_multiple_ads: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_additional_wrappers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_on_no_ad: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress_events: Vec<ProgressEvent>,
}

/// Linear `progress` tracking entry: ping `uri` once playback reaches
/// `offset` (`HH:MM:SS[.mmm]` or a percentage).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub offset: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaFile {
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_framework: Option<String>,
}

impl MediaFile {
    /// Whether this file is an interactive (VPAID) creative.
    pub fn is_interactive(&self) -> bool {
        self.api_framework
            .as_deref()
            .is_some_and(|api| api.eq_ignore_ascii_case("vpaid"))
    }
}

/// Industry icon descriptor (e.g. AdChoices).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Icon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub width: u32,
    pub height: u32,
    pub x_position: String,
    pub y_position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_through: Option<String>,
}

/// Structural classification of an ad entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdKind {
    Inline,
    Wrapper,
    Invalid,
}

/// Stable identity of an ad: SHA-256 of its canonical serialization.
///
/// The same ad fetched twice through different hops yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdId(String);

impl AdId {
    pub fn of(entry: &AdEntry) -> Self {
        let canonical = serde_json::to_vec(entry).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        AdId(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for AdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable, cheaply clonable handle to one ad entry of a parsed document.
#[derive(Debug, Clone, Serialize)]
pub struct AdReference {
    id: AdId,
    #[serde(flatten)]
    entry: Arc<AdEntry>,
}

impl PartialEq for AdReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AdReference {}

impl From<AdEntry> for AdReference {
    fn from(entry: AdEntry) -> Self {
        Self {
            id: AdId::of(&entry),
            entry: Arc::new(entry),
        }
    }
}

impl AdReference {
    pub fn id(&self) -> &AdId {
        &self.id
    }

    pub fn entry(&self) -> &AdEntry {
        &self.entry
    }

    pub fn sequence(&self) -> Option<u32> {
        self.entry.sequence
    }

    /// Pod ads carry a sequence; everything else is buffet.
    pub fn is_pod(&self) -> bool {
        self.entry.sequence.is_some()
    }

    pub fn kind(&self) -> AdKind {
        if self.entry.wrapper.is_some() {
            AdKind::Wrapper
        } else if self.entry.inline.is_some() {
            AdKind::Inline
        } else {
            AdKind::Invalid
        }
    }

    pub fn is_wrapper(&self) -> bool {
        self.kind() == AdKind::Wrapper
    }

    pub fn is_inline(&self) -> bool {
        self.kind() == AdKind::Inline
    }

    pub fn inline(&self) -> Option<&InlineAd> {
        self.entry.inline.as_ref()
    }

    pub fn wrapper(&self) -> Option<&WrapperAd> {
        self.entry.wrapper.as_ref()
    }

    pub fn ad_tag_uri(&self) -> Option<&str> {
        self.wrapper().map(|w| w.ad_tag_uri.as_str())
    }

    pub fn allow_multiple_ads(&self) -> Option<bool> {
        self.wrapper().and_then(|w| w.allow_multiple_ads)
    }

    pub fn follow_additional_wrappers(&self) -> Option<bool> {
        self.wrapper().and_then(|w| w.follow_additional_wrappers)
    }

    pub fn fallback_on_no_ad(&self) -> Option<bool> {
        self.wrapper().and_then(|w| w.fallback_on_no_ad)
    }

    pub fn icons(&self) -> &[Icon] {
        match (self.inline(), self.wrapper()) {
            (_, Some(wrapper)) => &wrapper.icons,
            (Some(inline), None) => &inline.icons,
            (None, None) => &[],
        }
    }

    pub fn click_through(&self) -> Option<&str> {
        self.inline().and_then(|i| i.click_through.as_deref())
    }

    pub fn skip_offset(&self) -> Option<&str> {
        self.inline().and_then(|i| i.skip_offset.as_deref())
    }

    /// Progress tracking declared by this ad, inline or wrapper.
    pub fn progress_events(&self) -> &[ProgressEvent] {
        match (self.inline(), self.wrapper()) {
            (_, Some(wrapper)) => &wrapper.progress_events,
            (Some(inline), None) => &inline.progress_events,
            (None, None) => &[],
        }
    }

    pub fn media_files(&self) -> &[MediaFile] {
        self.inline().map(|i| i.media_files.as_slice()).unwrap_or(&[])
    }

    /// First interactive creative file, if the ad is driven by one.
    pub fn interactive_creative(&self) -> Option<&MediaFile> {
        self.media_files().iter().find(|m| m.is_interactive())
    }
}

/// A document after parsing, with every ad wrapped in an [`AdReference`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDocument {
    pub version: Option<String>,
    pub ads: Vec<AdReference>,
}

impl From<VastDocument> for ParsedDocument {
    fn from(doc: VastDocument) -> Self {
        Self {
            version: doc.version,
            ads: doc.ads.into_iter().map(AdReference::from).collect(),
        }
    }
}

impl ParsedDocument {
    pub fn ads(&self) -> &[AdReference] {
        &self.ads
    }

    /// Pod ads ordered by sequence.
    pub fn pod_ads(&self) -> Vec<&AdReference> {
        let mut pod: Vec<_> = self.ads.iter().filter(|ad| ad.is_pod()).collect();
        pod.sort_by_key(|ad| ad.sequence());
        pod
    }

    /// First ad to serve: the lowest-sequence pod ad, otherwise the first ad.
    pub fn first_ad(&self) -> Option<&AdReference> {
        self.pod_ads()
            .first()
            .copied()
            .or_else(|| self.ads.first())
    }
}
