//! Resolution chains: one link per hop, most recent first.

use std::sync::Arc;

use serde::Serialize;

use super::ad::{AdReference, ParsedDocument, ProgressEvent};
use crate::error::{AdError, ErrorCode};

/// Outcome of one resolution hop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainLink {
    pub requested_tag: String,
    pub raw_document: Option<String>,
    pub document: Option<Arc<ParsedDocument>>,
    pub ad: Option<AdReference>,
    pub error_code: Option<ErrorCode>,
    pub error: Option<AdError>,
}

impl ChainLink {
    /// Empty link for `tag`; fields are filled in as the hop progresses.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            requested_tag: tag.into(),
            raw_document: None,
            document: None,
            ad: None,
            error_code: None,
            error: None,
        }
    }

    /// Mark the link terminal with `code`.
    pub fn fail(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.error_code = Some(code);
        self.error = Some(AdError::new(code, message));
        self
    }

    /// Mark the link terminal with an existing error descriptor.
    pub fn fail_with(mut self, code: ErrorCode, error: AdError) -> Self {
        self.error_code = Some(code);
        self.error = Some(error);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }

    /// Resolved means: no error and the ad is a playable inline ad.
    pub fn is_resolved(&self) -> bool {
        self.error_code.is_none() && self.ad.as_ref().is_some_and(|ad| ad.is_inline())
    }
}

/// Ordered sequence of links, head (index 0) is the most recent hop.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Chain(Vec<ChainLink>);

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from links already ordered most-recent first.
    pub fn from_links(links: Vec<ChainLink>) -> Self {
        Self(links)
    }

    pub fn head(&self) -> Option<&ChainLink> {
        self.0.first()
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChainLink> {
        self.0.iter()
    }

    /// Prepend a new hop.
    pub fn push_head(&mut self, link: ChainLink) {
        self.0.insert(0, link);
    }

    /// Chain without its head.
    pub fn tail(&self) -> Chain {
        Chain(self.0.iter().skip(1).cloned().collect())
    }

    /// Replace the head link, keeping the rest.
    pub fn with_head(&self, link: ChainLink) -> Chain {
        let mut links = Vec::with_capacity(self.0.len().max(1));
        links.push(link);
        links.extend(self.0.iter().skip(1).cloned());
        Chain(links)
    }

    /// The ad to play when the head is resolved.
    pub fn inline_ad(&self) -> Option<&AdReference> {
        self.head()
            .filter(|link| link.is_resolved())
            .and_then(|link| link.ad.as_ref())
    }

    /// Every ad referenced by the chain, head first.
    pub fn ads(&self) -> impl Iterator<Item = &AdReference> {
        self.0.iter().filter_map(|link| link.ad.as_ref())
    }

    /// Progress tracking declared anywhere along the chain, head first.
    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.ads()
            .flat_map(|ad| ad.progress_events().iter().cloned())
            .collect()
    }
}

impl IntoIterator for Chain {
    type Item = ChainLink;
    type IntoIter = std::vec::IntoIter<ChainLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ad::{AdEntry, InlineAd, ProgressEvent, WrapperAd};

    fn inline() -> AdReference {
        AdReference::from(AdEntry {
            inline: Some(InlineAd::default()),
            ..Default::default()
        })
    }

    fn wrapper() -> AdReference {
        AdReference::from(AdEntry {
            wrapper: Some(WrapperAd {
                ad_tag_uri: "https://next.example.com".into(),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn test_push_head_keeps_most_recent_first() {
        let mut chain = Chain::new();
        chain.push_head(ChainLink::new("a"));
        chain.push_head(ChainLink::new("b"));
        assert_eq!(chain.head().unwrap().requested_tag, "b");
        assert_eq!(chain.tail().head().unwrap().requested_tag, "a");
    }

    #[test]
    fn test_is_resolved_requires_inline_and_no_error() {
        let mut link = ChainLink::new("a");
        link.ad = Some(inline());
        assert!(link.is_resolved());

        let failed = link.clone().fail(ErrorCode::MULTIPLE_ADS_DISALLOWED, "multiple ads");
        assert!(!failed.is_resolved());
        assert!(failed.ad.is_some());

        let mut wrapped = ChainLink::new("b");
        wrapped.ad = Some(wrapper());
        assert!(!wrapped.is_resolved());
    }

    #[test]
    fn test_with_head_replaces_only_head() {
        let mut chain = Chain::new();
        chain.push_head(ChainLink::new("root"));
        chain.push_head(ChainLink::new("old-head"));
        let replaced = chain.with_head(ChainLink::new("new-head"));
        let tags: Vec<_> = replaced.iter().map(|l| l.requested_tag.as_str()).collect();
        assert_eq!(tags, vec!["new-head", "root"]);
    }

    #[test]
    fn test_progress_events_gathered_from_every_hop() {
        let progress = |offset: &str, uri: &str| ProgressEvent {
            offset: offset.into(),
            uri: uri.into(),
        };
        let mut root = ChainLink::new("root");
        root.ad = Some(AdReference::from(AdEntry {
            wrapper: Some(WrapperAd {
                ad_tag_uri: "inline".into(),
                progress_events: vec![progress("50%", "https://t.example.com/wrapper")],
                ..Default::default()
            }),
            ..Default::default()
        }));
        let mut head = ChainLink::new("inline");
        head.ad = Some(AdReference::from(AdEntry {
            inline: Some(InlineAd {
                progress_events: vec![progress("00:00:05", "https://t.example.com/inline")],
                ..Default::default()
            }),
            ..Default::default()
        }));

        let chain = Chain::from_links(vec![head, root]);
        let uris: Vec<_> = chain.progress_events().into_iter().map(|p| p.uri).collect();
        assert_eq!(
            uris,
            vec!["https://t.example.com/inline", "https://t.example.com/wrapper"]
        );
    }
}
