//! Chain resolution: error codes, wrapper depth and time budgets.

mod common;

use std::sync::Arc;
use std::time::Duration;

use adrunner_core::fakes::MemoryDocumentLoader;
use adrunner_core::{AdEntry, Chain, ChainResolver, ErrorCode, ResolveOptions, WrapperAd};

use common::{doc, media_entry, wrapper_entry};

/// `tag-0 -> tag-1 -> ... -> tag-{depth}` where the last tag is inline.
fn wrapper_ladder(depth: usize) -> MemoryDocumentLoader {
    let mut loader = MemoryDocumentLoader::new();
    for i in 0..depth {
        loader = loader.with_document(
            format!("tag-{i}"),
            doc(vec![wrapper_entry(&format!("w{i}"), &format!("tag-{}", i + 1))]),
        );
    }
    loader.with_document(format!("tag-{depth}"), doc(vec![media_entry("inline")]))
}

fn options() -> ResolveOptions {
    ResolveOptions::default()
}

#[tokio::test]
async fn test_resolves_through_wrappers_to_inline() {
    let loader = Arc::new(wrapper_ladder(3));
    let resolver = ChainResolver::new(loader.clone());
    let chain = resolver.resolve_chain("tag-0", &options(), Chain::new()).await;

    assert_eq!(chain.len(), 4);
    let head = chain.head().unwrap();
    assert_eq!(head.requested_tag, "tag-3");
    assert!(head.is_resolved());
    assert!(head.error_code.is_none());
    assert!(chain.links()[1..].iter().all(|l| l.ad.as_ref().unwrap().is_wrapper()));
    assert_eq!(loader.request_count(), 4);
    assert_eq!(resolver.requested().len(), 4);
}

#[tokio::test]
async fn test_wrapper_limit_hits_at_exact_depth() {
    for limit in 0..5 {
        let resolver = ChainResolver::new(Arc::new(wrapper_ladder(8)));
        let opts = ResolveOptions {
            wrapper_limit: Some(limit),
            ..options()
        };
        let chain = resolver.resolve_chain("tag-0", &opts, Chain::new()).await;

        assert_eq!(chain.len(), limit + 1, "limit {limit}");
        let head = chain.head().unwrap();
        assert_eq!(head.requested_tag, format!("tag-{limit}"));
        assert_eq!(head.error_code, Some(ErrorCode::WRAPPER_LIMIT_REACHED));
        assert!(head.ad.is_none());
        assert!(head.raw_document.is_none());
        assert!(head.document.is_none());
    }
}

#[tokio::test]
async fn test_single_wrapper_with_limit_one() {
    let loader = MemoryDocumentLoader::new()
        .with_document("tag-a", doc(vec![wrapper_entry("a", "tag-b")]))
        .with_document("tag-b", doc(vec![media_entry("b")]));
    let resolver = ChainResolver::new(Arc::new(loader));
    let opts = ResolveOptions {
        wrapper_limit: Some(1),
        ..options()
    };
    let chain = resolver.resolve_chain("tag-a", &opts, Chain::new()).await;

    assert_eq!(chain.len(), 2);
    let head = chain.head().unwrap();
    assert!(head.ad.is_none());
    assert_eq!(head.error_code, Some(ErrorCode(304)));
}

#[tokio::test]
async fn test_default_wrapper_limit_is_five() {
    let resolver = ChainResolver::new(Arc::new(wrapper_ladder(8)));
    let chain = resolver.resolve_chain("tag-0", &options(), Chain::new()).await;
    assert_eq!(chain.len(), 6);
    assert_eq!(chain.head().unwrap().error_code, Some(ErrorCode::WRAPPER_LIMIT_REACHED));
}

#[tokio::test]
async fn test_parse_failure_keeps_raw_document() {
    let loader = MemoryDocumentLoader::new().with_document("tag", "<VAST>not json</VAST>");
    let chain = ChainResolver::new(Arc::new(loader))
        .resolve_chain("tag", &options(), Chain::new())
        .await;

    let head = chain.head().unwrap();
    assert_eq!(head.error_code, Some(ErrorCode::XML_PARSING));
    assert_eq!(head.raw_document.as_deref(), Some("<VAST>not json</VAST>"));
    assert!(head.document.is_none());
}

#[tokio::test]
async fn test_no_ads_keeps_document() {
    let loader = MemoryDocumentLoader::new().with_document("tag", doc(vec![]));
    let chain = ChainResolver::new(Arc::new(loader))
        .resolve_chain("tag", &options(), Chain::new())
        .await;

    let head = chain.head().unwrap();
    assert_eq!(head.error_code, Some(ErrorCode::NO_ADS));
    assert!(head.document.is_some());
    assert!(head.ad.is_none());
}

#[tokio::test]
async fn test_transport_failure() {
    let chain = ChainResolver::new(Arc::new(MemoryDocumentLoader::new()))
        .resolve_chain("https://unknown.example.com", &options(), Chain::new())
        .await;
    let head = chain.head().unwrap();
    assert_eq!(head.error_code, Some(ErrorCode::TRANSPORT));
    assert!(head.error.as_ref().unwrap().message.contains("unknown.example.com"));
}

#[tokio::test]
async fn test_multiple_ads_disallowed_by_caller() {
    let loader = MemoryDocumentLoader::new()
        .with_document("tag", doc(vec![media_entry("one"), media_entry("two")]));
    let resolver = ChainResolver::new(Arc::new(loader));
    let opts = ResolveOptions {
        allow_multiple_ads: false,
        ..options()
    };
    let chain = resolver.resolve_chain("tag", &opts, Chain::new()).await;

    let head = chain.head().unwrap();
    assert_eq!(head.error_code, Some(ErrorCode::MULTIPLE_ADS_DISALLOWED));
    let ad = head.ad.as_ref().unwrap();
    assert_eq!(ad.entry().id.as_deref(), Some("one"));
    assert!(resolver.requested().contains(ad));
}

#[tokio::test]
async fn test_multiple_ads_disallowed_by_wrapper() {
    let wrapper = AdEntry {
        id: Some("strict".into()),
        wrapper: Some(WrapperAd {
            ad_tag_uri: "tag-pod".into(),
            allow_multiple_ads: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };
    let loader = MemoryDocumentLoader::new()
        .with_document("tag", doc(vec![wrapper]))
        .with_document("tag-pod", doc(vec![media_entry("one"), media_entry("two")]));
    let chain = ChainResolver::new(Arc::new(loader))
        .resolve_chain("tag", &options(), Chain::new())
        .await;

    assert_eq!(chain.len(), 2);
    assert_eq!(
        chain.head().unwrap().error_code,
        Some(ErrorCode::MULTIPLE_ADS_DISALLOWED)
    );
}

#[tokio::test]
async fn test_forbidden_rewrap() {
    let wrapper = AdEntry {
        id: Some("last-hop".into()),
        wrapper: Some(WrapperAd {
            ad_tag_uri: "tag-next".into(),
            follow_additional_wrappers: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };
    let loader = MemoryDocumentLoader::new()
        .with_document("tag", doc(vec![wrapper]))
        .with_document("tag-next", doc(vec![wrapper_entry("again", "tag-final")]))
        .with_document("tag-final", doc(vec![media_entry("final")]));
    let loader = Arc::new(loader);
    let chain = ChainResolver::new(loader.clone())
        .resolve_chain("tag", &options(), Chain::new())
        .await;

    assert_eq!(chain.len(), 2);
    let head = chain.head().unwrap();
    assert_eq!(head.error_code, Some(ErrorCode::UNEXPECTED_AD_TYPE));
    assert!(head.ad.as_ref().unwrap().is_wrapper());
    assert_eq!(loader.request_count(), 2);
}

#[tokio::test]
async fn test_error_iff_head_not_inline() {
    let cases = vec![
        doc(vec![media_entry("ok")]),
        doc(vec![AdEntry::default()]),
        doc(vec![]),
        "garbage".to_string(),
    ];
    for raw in cases {
        let loader = MemoryDocumentLoader::new().with_document("tag", raw);
        let chain = ChainResolver::new(Arc::new(loader))
            .resolve_chain("tag", &options(), Chain::new())
            .await;
        let head = chain.head().unwrap();
        let inline = head.ad.as_ref().is_some_and(|ad| ad.is_inline());
        assert_eq!(head.error_code.is_none(), inline);
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_is_recomputed_per_hop() {
    let loader = Arc::new(
        MemoryDocumentLoader::new()
            .with_document("tag-a", doc(vec![wrapper_entry("a", "tag-b")]))
            .with_document("tag-b", doc(vec![wrapper_entry("b", "tag-c")]))
            .with_document("tag-c", doc(vec![media_entry("c")]))
            .with_latency(Duration::from_millis(100)),
    );
    let opts = ResolveOptions {
        timeout_ms: Some(1000),
        ..options()
    };
    let chain = ChainResolver::new(loader.clone())
        .resolve_chain("tag-a", &opts, Chain::new())
        .await;

    assert!(chain.head().unwrap().is_resolved());
    let budgets: Vec<_> = loader.requests().into_iter().map(|(_, t)| t).collect();
    assert_eq!(
        budgets,
        vec![
            Some(Duration::from_millis(1000)),
            Some(Duration::from_millis(900)),
            Some(Duration::from_millis(800)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_hop_timeout_yields_301() {
    let loader = Arc::new(
        MemoryDocumentLoader::new()
            .with_document("tag-a", doc(vec![wrapper_entry("a", "tag-b")]))
            .with_document("tag-b", doc(vec![media_entry("b")]))
            .with_latency(Duration::from_millis(100)),
    );
    let opts = ResolveOptions {
        timeout_ms: Some(150),
        ..options()
    };
    let started = tokio::time::Instant::now();
    let chain = ChainResolver::new(loader.clone())
        .resolve_chain("tag-a", &opts, Chain::new())
        .await;

    assert_eq!(chain.len(), 2);
    let head = chain.head().unwrap();
    assert_eq!(head.requested_tag, "tag-b");
    assert_eq!(head.error_code, Some(ErrorCode::TIMEOUT));
    assert_eq!(started.elapsed(), Duration::from_millis(150));
}
