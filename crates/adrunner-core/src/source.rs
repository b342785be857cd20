//! Document source traits: transport and parsing.
//!
//! Transport and parsing are separate so that the resolver can tell a
//! transport failure (502) from a parse failure (100).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ParseError, TransportError};
use crate::model::VastDocument;

/// Fetches the raw document behind an ad tag.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Fetch `tag`. `timeout` is the budget left for this hop, if any; the
    /// resolver enforces it regardless of whether the loader honours it.
    async fn fetch(&self, tag: &str, timeout: Option<Duration>) -> Result<String, TransportError>;
}

/// Turns a raw document into a structured [`VastDocument`].
pub trait DocumentParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<VastDocument, ParseError>;
}

/// Parser for documents encoded as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDocumentParser;

impl DocumentParser for JsonDocumentParser {
    fn parse(&self, raw: &str) -> Result<VastDocument, ParseError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_parser_reads_wrapper_and_inline() {
        let raw = r#"{
            "version": "4.0",
            "ads": [
                {"wrapper": {"ad_tag_uri": "https://next.example.com", "allow_multiple_ads": false}},
                {"sequence": 1, "inline": {"click_through": "https://click.example.com"}}
            ]
        }"#;
        let doc = JsonDocumentParser.parse(raw).unwrap();
        assert_eq!(doc.ads.len(), 2);
        assert_eq!(
            doc.ads[0].wrapper.as_ref().unwrap().allow_multiple_ads,
            Some(false)
        );
        assert_eq!(doc.ads[1].sequence, Some(1));
    }

    #[test]
    fn test_json_parser_rejects_garbage() {
        let err = JsonDocumentParser.parse("not xml").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }
}
