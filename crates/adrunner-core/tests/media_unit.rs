//! Plain-media unit: file selection, playback tracking and controls.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adrunner_core::fakes::{FakeContainer, FakeIconOverlayFactory, FakeMediaElement};
use adrunner_core::{
    AdEntry, AdRunError, ErrorCode, IconOverlayFactory, MediaElement, MediaEvent, MediaUnit, PlaybackState,
    PlaybackUnit, ProgressEvent, TrackingEventKind as Kind, UnitEvent, UnitOptions,
};

use common::{chain_for, drain, icon, media_entry, record_tracking, with_icons, DECLARED_CLICK};

struct Harness {
    unit: MediaUnit,
    media: Arc<FakeMediaElement>,
    container: Arc<FakeContainer>,
}

fn harness_with(media: FakeMediaElement, width: u32) -> Harness {
    harness_for(media_entry("ad"), media, width)
}

fn harness_for(entry: AdEntry, media: FakeMediaElement, width: u32) -> Harness {
    let media = Arc::new(media);
    let container = Arc::new(FakeContainer::new(width, width * 9 / 16).with_media(media.clone()));
    let unit = MediaUnit::new(
        chain_for(entry),
        container.clone(),
        media.clone(),
        None,
        UnitOptions::default(),
    );
    Harness {
        unit,
        media,
        container,
    }
}

fn mp4() -> FakeMediaElement {
    FakeMediaElement::new()
        .with_supported("video/mp4")
        .with_duration(20.0)
}

async fn started() -> Harness {
    let h = harness_with(mp4(), 640);
    h.unit.start().await.unwrap();
    h
}

fn tick(h: &Harness, current_time: f64) {
    h.media.emit(MediaEvent::TimeUpdate {
        current_time,
        duration: 20.0,
    });
}

#[tokio::test]
async fn test_start_selects_closest_file() {
    let h = harness_with(mp4(), 1024);
    h.unit.start().await.unwrap();

    assert_eq!(
        h.media.source().as_deref(),
        Some("https://cdn.example.com/ad-large.mp4")
    );
    assert_eq!(h.unit.state(), PlaybackState::Started);
    assert!(h.unit.is_started());
    assert!(!h.media.is_paused());
}

#[tokio::test]
async fn test_small_container_selects_small_file() {
    let h = harness_with(mp4(), 400);
    h.unit.start().await.unwrap();
    assert_eq!(
        h.media.source().as_deref(),
        Some("https://cdn.example.com/ad-small.mp4")
    );
}

#[tokio::test]
async fn test_no_playable_file_reports_403() {
    let h = harness_with(FakeMediaElement::new().with_supported("video/webm"), 640);
    let events = record_tracking(&h.unit);
    h.unit.start().await.unwrap();

    assert!(h.unit.is_finished());
    assert!(!h.unit.is_started());
    assert_eq!(h.unit.error_code(), Some(ErrorCode::MEDIA_FILE_NOT_SUPPORTED));
    assert_eq!(drain(&events), vec![Kind::Error]);
    assert!(h.media.source().is_none());
}

#[tokio::test]
async fn test_double_start_is_contract_error() {
    let h = started().await;
    assert_eq!(h.unit.start().await.unwrap_err(), AdRunError::AlreadyStarted);
}

#[tokio::test(start_paused = true)]
async fn test_missing_play_ack_finishes() {
    let h = harness_with(mp4().without_play_ack(), 640);
    let before = tokio::time::Instant::now();
    h.unit.start().await.unwrap();

    assert!(before.elapsed() >= Duration::from_millis(5000));
    assert!(h.unit.is_finished());
    assert!(!h.unit.is_started());
    assert!(h.media.is_paused());
    assert!(h.unit.error().is_none());
}

#[tokio::test]
async fn test_first_progress_reports_impression_and_start() {
    let h = started().await;
    let events = record_tracking(&h.unit);

    tick(&h, 0.0);
    assert!(drain(&events).is_empty());

    tick(&h, 0.3);
    tick(&h, 0.6);
    assert_eq!(
        drain(&events),
        vec![Kind::Impression, Kind::CreativeView, Kind::Start]
    );
    assert_eq!(h.unit.state(), PlaybackState::Playing);
    assert!(!h.unit.paused());
}

#[tokio::test]
async fn test_quartiles_fire_in_order_once() {
    let h = started().await;
    tick(&h, 0.5);
    let events = record_tracking(&h.unit);

    tick(&h, 5.5);
    tick(&h, 6.0);
    tick(&h, 16.0);
    tick(&h, 16.0);
    assert_eq!(
        drain(&events),
        vec![Kind::FirstQuartile, Kind::Midpoint, Kind::ThirdQuartile]
    );
    assert_eq!(h.unit.current_time(), 16.0);
    assert_eq!(h.unit.duration(), 20.0);
}

#[tokio::test]
async fn test_ended_completes_and_finishes() {
    let h = started().await;
    tick(&h, 1.0);
    let events = record_tracking(&h.unit);

    h.media.emit(MediaEvent::Ended);
    h.media.emit(MediaEvent::Ended);
    assert_eq!(drain(&events), vec![Kind::Complete]);
    assert!(h.unit.is_finished());
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = started().await;
    tick(&h, 1.0);
    let events = record_tracking(&h.unit);

    h.media.emit(MediaEvent::Pause);
    assert!(h.unit.paused());
    h.media.emit(MediaEvent::Playing);
    assert!(!h.unit.paused());
    assert_eq!(drain(&events), vec![Kind::Pause, Kind::Resume]);
}

#[tokio::test]
async fn test_mute_transitions() {
    let h = started().await;
    let events = record_tracking(&h.unit);

    h.media.emit(MediaEvent::VolumeChange {
        volume: 0.5,
        muted: false,
    });
    h.media.emit(MediaEvent::VolumeChange {
        volume: 0.5,
        muted: true,
    });
    h.media.emit(MediaEvent::VolumeChange {
        volume: 0.0,
        muted: false,
    });
    h.media.emit(MediaEvent::VolumeChange {
        volume: 0.2,
        muted: false,
    });
    assert_eq!(drain(&events), vec![Kind::Mute, Kind::Unmute]);
}

#[tokio::test]
async fn test_media_error_defaults_to_405() {
    let h = started().await;
    h.media.emit(MediaEvent::Error { code: None });
    assert_eq!(h.unit.error_code(), Some(ErrorCode::MEDIA_FILE_PROBLEM));
    assert!(h.unit.is_finished());

    let h = started().await;
    h.media.emit(MediaEvent::Error { code: Some(402) });
    assert_eq!(h.unit.error_code(), Some(ErrorCode(402)));
}

#[tokio::test]
async fn test_fullscreen_maps_to_expand_collapse() {
    let h = started().await;
    let events = record_tracking(&h.unit);
    h.media
        .emit(MediaEvent::FullscreenChange { fullscreen: true });
    h.media
        .emit(MediaEvent::FullscreenChange { fullscreen: false });
    assert_eq!(
        drain(&events),
        vec![
            Kind::PlayerExpand,
            Kind::Fullscreen,
            Kind::PlayerCollapse,
            Kind::ExitFullscreen
        ]
    );
}

#[tokio::test]
async fn test_click_pauses_and_opens_declared_url() {
    let h = started().await;
    tick(&h, 1.0);
    let events = record_tracking(&h.unit);

    h.media.emit(MediaEvent::Click);
    assert_eq!(drain(&events), vec![Kind::ClickThrough]);
    assert!(h.media.is_paused());
    assert_eq!(h.container.opened_urls(), vec![DECLARED_CLICK]);
}

#[tokio::test]
async fn test_click_while_paused_resumes_without_opening() {
    let h = started().await;
    tick(&h, 1.0);
    h.media.emit(MediaEvent::Pause);
    h.media.pause();
    let events = record_tracking(&h.unit);

    h.media.emit(MediaEvent::Click);
    assert_eq!(drain(&events), vec![Kind::ClickThrough, Kind::Resume]);
    assert!(!h.media.is_paused());
    assert!(!h.unit.paused());
    assert!(h.container.opened_urls().is_empty());
}

fn skippable_entry(skip_offset: &str) -> AdEntry {
    let mut entry = media_entry("ad");
    if let Some(inline) = entry.inline.as_mut() {
        inline.skip_offset = Some(skip_offset.to_string());
    }
    entry
}

#[tokio::test]
async fn test_skip_rejected_before_offset() {
    let h = harness_for(skippable_entry("00:00:05"), mp4(), 640);
    h.unit.start().await.unwrap();
    assert!(!h.unit.skippable());

    tick(&h, 4.5);
    assert!(!h.unit.skippable());
    assert_eq!(h.unit.skip().await.unwrap_err(), AdRunError::NotSkippable);
    assert!(!h.unit.is_finished());
}

#[tokio::test]
async fn test_skip_after_offset_emits_skip_and_finishes() {
    let h = harness_for(skippable_entry("25%"), mp4(), 640);
    h.unit.start().await.unwrap();
    tick(&h, 5.0);
    let events = record_tracking(&h.unit);

    assert!(h.unit.skippable());
    h.unit.skip().await.unwrap();
    assert_eq!(drain(&events), vec![Kind::Skip]);
    assert!(h.unit.is_finished());
    assert!(h.media.is_paused());
    assert!(h.unit.error().is_none());
    assert!(!h.unit.skippable());
    assert_eq!(h.unit.skip().await.unwrap_err(), AdRunError::AlreadyFinished);
}

#[tokio::test]
async fn test_ad_without_skip_offset_is_not_skippable() {
    let h = started().await;
    tick(&h, 19.0);
    assert!(!h.unit.skippable());
    assert_eq!(h.unit.skip().await.unwrap_err(), AdRunError::NotSkippable);
}

#[tokio::test]
async fn test_progress_offsets_fire_once_when_reached() {
    let mut entry = media_entry("ad");
    if let Some(inline) = entry.inline.as_mut() {
        inline.progress_events = vec![
            ProgressEvent {
                offset: "00:00:02".into(),
                uri: "https://track.example.com/2s".into(),
            },
            ProgressEvent {
                offset: "50%".into(),
                uri: "https://track.example.com/half".into(),
            },
            ProgressEvent {
                offset: "soon".into(),
                uri: "https://track.example.com/never".into(),
            },
        ];
    }
    let h = harness_for(entry, mp4(), 640);
    h.unit.start().await.unwrap();
    tick(&h, 0.5);

    let uris = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&uris);
    h.unit.on_event(Arc::new(move |event: &UnitEvent| {
        if let Some(tracking) = event.tracking() {
            if tracking.kind == Kind::Progress {
                let uri = tracking
                    .payload
                    .as_ref()
                    .and_then(|p| p["uri"].as_str())
                    .map(str::to_string);
                sink.lock().unwrap().push(uri);
            }
        }
    }));

    tick(&h, 1.5);
    assert!(uris.lock().unwrap().is_empty());
    tick(&h, 2.0);
    tick(&h, 3.0);
    tick(&h, 10.5);
    tick(&h, 12.0);
    assert_eq!(
        *uris.lock().unwrap(),
        vec![
            Some("https://track.example.com/2s".to_string()),
            Some("https://track.example.com/half".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_cancel_pauses_and_finishes() {
    let h = started().await;
    h.unit.cancel().await.unwrap();
    assert!(h.media.is_paused());
    assert!(h.unit.is_finished());
    assert!(h.unit.is_started());
    assert_eq!(h.unit.cancel().await.unwrap_err(), AdRunError::AlreadyFinished);
}

#[tokio::test]
async fn test_events_ignored_after_finish() {
    let h = started().await;
    h.unit.cancel().await.unwrap();
    let events = record_tracking(&h.unit);
    tick(&h, 3.0);
    h.media.emit(MediaEvent::Ended);
    assert!(drain(&events).is_empty());
}

#[tokio::test]
async fn test_icons_attached_on_start_and_removed_on_finish() {
    let media = Arc::new(mp4());
    let container = Arc::new(FakeContainer::new(640, 360).with_media(media.clone()));
    let factory = Arc::new(FakeIconOverlayFactory::new());
    let unit = MediaUnit::new(
        chain_for(with_icons(media_entry("ad"), vec![icon("AdChoices")])),
        container,
        media.clone(),
        Some(factory.clone() as Arc<dyn IconOverlayFactory>),
        UnitOptions::default(),
    );
    unit.start().await.unwrap();

    let overlay = factory.overlays().pop().unwrap();
    assert_eq!(overlay.draw_count(), 1);
    assert!(!overlay.is_removed());

    media.emit(MediaEvent::Ended);
    assert!(overlay.is_removed());
}
