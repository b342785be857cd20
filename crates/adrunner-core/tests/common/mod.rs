//! Shared builders for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use adrunner_core::{
    AdEntry, Chain, ChainLink, Icon, InlineAd, MediaFile, ParsedDocument, PlaybackUnit,
    TrackingEventKind, UnitEvent, VastDocument, WrapperAd,
};

pub const DECLARED_CLICK: &str = "https://advertiser.example.com/landing";

pub fn vpaid_entry(id: &str) -> AdEntry {
    AdEntry {
        id: Some(id.to_string()),
        inline: Some(InlineAd {
            media_files: vec![MediaFile {
                url: format!("https://cdn.example.com/{id}.js"),
                mime_type: "application/javascript".into(),
                width: 640,
                height: 360,
                api_framework: Some("VPAID".into()),
            }],
            click_through: Some(DECLARED_CLICK.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn media_entry(id: &str) -> AdEntry {
    AdEntry {
        id: Some(id.to_string()),
        inline: Some(InlineAd {
            media_files: vec![
                MediaFile {
                    url: format!("https://cdn.example.com/{id}-small.mp4"),
                    mime_type: "video/mp4".into(),
                    width: 320,
                    height: 180,
                    api_framework: None,
                },
                MediaFile {
                    url: format!("https://cdn.example.com/{id}-large.mp4"),
                    mime_type: "video/mp4".into(),
                    width: 1280,
                    height: 720,
                    api_framework: None,
                },
            ],
            click_through: Some(DECLARED_CLICK.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn wrapper_entry(id: &str, uri: &str) -> AdEntry {
    AdEntry {
        id: Some(id.to_string()),
        wrapper: Some(WrapperAd {
            ad_tag_uri: uri.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn icon(program: &str) -> Icon {
    Icon {
        program: Some(program.to_string()),
        width: 20,
        height: 20,
        x_position: "right".into(),
        y_position: "top".into(),
        resource_url: Some(format!("https://cdn.example.com/{program}.png")),
        click_through: Some("https://icons.example.com".into()),
    }
}

pub fn with_icons(mut entry: AdEntry, icons: Vec<Icon>) -> AdEntry {
    if let Some(inline) = entry.inline.as_mut() {
        inline.icons = icons;
    }
    entry
}

/// Serialized document holding `entries`.
pub fn doc(entries: Vec<AdEntry>) -> String {
    serde_json::to_string(&VastDocument {
        version: Some("4.0".into()),
        ads: entries,
    })
    .unwrap()
}

/// Single-link chain whose head is the first ad of a document made of
/// `entry`.
pub fn chain_for(entry: AdEntry) -> Chain {
    let document = Arc::new(ParsedDocument::from(VastDocument {
        version: Some("4.0".into()),
        ads: vec![entry],
    }));
    let mut link = ChainLink::new("https://ads.example.com/tag");
    link.ad = document.first_ad().cloned();
    link.document = Some(document);
    Chain::from_links(vec![link])
}

/// Collect the tracking events a unit emits.
pub fn record_tracking(unit: &dyn PlaybackUnit) -> Arc<Mutex<Vec<TrackingEventKind>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    unit.on_event(Arc::new(move |event: &UnitEvent| {
        if let Some(tracking) = event.tracking() {
            sink.lock().unwrap().push(tracking.kind);
        }
    }));
    events
}

pub fn drain(events: &Arc<Mutex<Vec<TrackingEventKind>>>) -> Vec<TrackingEventKind> {
    std::mem::take(&mut *events.lock().unwrap())
}
