//! Ad-chain resolution: follow wrapper delegation from a tag down to an
//! inline ad, recording one [`ChainLink`] per hop.
//!
//! Resolution problems never surface as `Err`; the terminal link carries the
//! numeric code instead. Only [`ChainResolver::request_next_ad`] fails, and
//! only for contract problems (empty chain, nothing left to serve).

pub mod selection;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::instrument;

use crate::error::{AdRunError, ErrorCode, Result};
use crate::metrics::METRICS;
use crate::model::{AdKind, AdReference, Chain, ChainLink, ParsedDocument};
use crate::obs;
use crate::options::ResolveOptions;
use crate::requested::RequestedAdSet;
use crate::source::{DocumentLoader, DocumentParser, JsonDocumentParser};

pub use selection::next_ad;

/// Resolves ad tags into chains using a loader and parser.
///
/// Every ad the resolver selects is marked in its [`RequestedAdSet`].
#[derive(Clone)]
pub struct ChainResolver {
    loader: Arc<dyn DocumentLoader>,
    parser: Arc<dyn DocumentParser>,
    requested: RequestedAdSet,
}

impl ChainResolver {
    /// Resolver with the JSON parser and a fresh requested-ad registry.
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            loader,
            parser: Arc::new(JsonDocumentParser),
            requested: RequestedAdSet::new(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Share an existing registry (e.g. across waterfall runs).
    pub fn with_requested(mut self, requested: RequestedAdSet) -> Self {
        self.requested = requested;
        self
    }

    pub fn requested(&self) -> &RequestedAdSet {
        &self.requested
    }

    /// Resolve `tag` on top of `prior`, returning the extended chain.
    ///
    /// The overall budget in `options` is measured from this call; each hop
    /// gets whatever is left when it begins.
    #[instrument(skip(self, options, prior), fields(prior_len = prior.len()))]
    pub async fn resolve_chain(&self, tag: &str, options: &ResolveOptions, prior: Chain) -> Chain {
        let deadline = options.timeout().map(|budget| Instant::now() + budget);
        let mut chain = prior;
        let mut next_tag = tag.to_string();

        loop {
            let link = self.resolve_hop(&next_tag, options, &chain, deadline).await;
            obs::emit_chain_hop(&link.requested_tag, chain.len(), link.error_code);

            let follow = match (&link.error_code, &link.ad) {
                (None, Some(ad)) => ad.ad_tag_uri().map(str::to_string),
                _ => None,
            };
            chain.push_head(link);

            match follow {
                Some(uri) => next_tag = uri,
                None => break,
            }
        }

        METRICS.inc_chains_resolved();
        obs::emit_chain_resolved(tag, chain.len(), chain.head().and_then(|l| l.error_code));
        chain
    }

    /// Replace the head of `chain` with the next ad to serve.
    ///
    /// The search starts in the head document and walks up towards the
    /// root. A selected wrapper is resolved onward; a selected inline ad
    /// replaces the head link with its error cleared.
    #[instrument(skip_all, fields(chain_len = chain.len()))]
    pub async fn request_next_ad(&self, chain: &Chain, options: &ResolveOptions) -> Result<Chain> {
        if chain.is_empty() {
            return Err(AdRunError::InvalidChain);
        }

        let mut current = chain.clone();
        while let Some(head) = current.head() {
            let parent = current.links().get(1).and_then(|link| link.ad.as_ref());
            let fallback = parent
                .and_then(|ad| ad.fallback_on_no_ad())
                .unwrap_or(options.fallback_on_no_ad);

            if let Some(next) = next_ad(head, options, fallback, &self.requested) {
                self.requested.mark(&next);

                let mut link = head.clone();
                link.ad = Some(next.clone());
                link.error_code = None;
                link.error = None;
                if next.kind() == AdKind::Invalid {
                    link = link.fail(
                        ErrorCode::SCHEMA_VALIDATION,
                        "ad has neither wrapper nor inline body",
                    );
                }
                let replaced = current.with_head(link);

                return match next.ad_tag_uri() {
                    Some(uri) if next.is_wrapper() => {
                        let uri = uri.to_string();
                        Ok(self.resolve_chain(&uri, options, replaced).await)
                    }
                    _ => Ok(replaced),
                };
            }

            current = current.tail();
        }

        Err(AdRunError::NoNextAd)
    }

    async fn resolve_hop(
        &self,
        tag: &str,
        options: &ResolveOptions,
        chain: &Chain,
        deadline: Option<Instant>,
    ) -> ChainLink {
        let mut link = ChainLink::new(tag);

        let limit = options.wrapper_limit();
        if chain.len() >= limit {
            return link.fail(
                ErrorCode::WRAPPER_LIMIT_REACHED,
                format!("wrapper limit of {limit} reached"),
            );
        }

        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) {
            return link.fail(ErrorCode::TIMEOUT, "no time left to request the ad tag");
        }

        let fetched = match remaining {
            Some(budget) => {
                match tokio::time::timeout(budget, self.loader.fetch(tag, Some(budget))).await {
                    Ok(fetched) => fetched,
                    Err(_) => {
                        return link.fail(
                            ErrorCode::TIMEOUT,
                            format!("ad tag request timed out after {}ms", budget.as_millis()),
                        )
                    }
                }
            }
            None => self.loader.fetch(tag, None).await,
        };

        let raw = match fetched {
            Ok(raw) => raw,
            Err(err) => return link.fail(ErrorCode::TRANSPORT, err.to_string()),
        };
        METRICS.inc_documents_fetched();

        let parsed = self.parser.parse(&raw);
        link.raw_document = Some(raw);
        let document = match parsed {
            Ok(doc) => Arc::new(ParsedDocument::from(doc)),
            Err(err) => return link.fail(ErrorCode::XML_PARSING, err.to_string()),
        };
        link.document = Some(Arc::clone(&document));

        let Some(ad) = document.first_ad().cloned() else {
            return link.fail(ErrorCode::NO_ADS, "document contains no ad");
        };
        self.requested.mark(&ad);
        link.ad = Some(ad.clone());

        validate_ad(link, &ad, &document, options, chain.head())
    }
}

/// Apply the structural and delegation rules to a freshly selected ad.
fn validate_ad(
    link: ChainLink,
    ad: &AdReference,
    document: &ParsedDocument,
    options: &ResolveOptions,
    parent: Option<&ChainLink>,
) -> ChainLink {
    if ad.kind() == AdKind::Invalid {
        return link.fail(
            ErrorCode::SCHEMA_VALIDATION,
            "ad has neither wrapper nor inline body",
        );
    }

    let parent_ad = parent.and_then(|l| l.ad.as_ref());

    let multiple_allowed =
        options.allow_multiple_ads && parent_ad.and_then(|p| p.allow_multiple_ads()) != Some(false);
    if document.ads().len() > 1 && !multiple_allowed {
        return link.fail(
            ErrorCode::MULTIPLE_ADS_DISALLOWED,
            "multiple ads returned where only one is allowed",
        );
    }

    if ad.is_wrapper() && parent_ad.and_then(|p| p.follow_additional_wrappers()) == Some(false) {
        return link.fail(
            ErrorCode::UNEXPECTED_AD_TYPE,
            "wrapper received where additional wrappers are not followed",
        );
    }

    link
}
