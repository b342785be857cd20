//! Playback unit for plain media files played on the container's media
//! element.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::base::{clamp_time, Ack, UnitCore};
use super::icons::{IconOverlayFactory, IconSchedule};
use super::state::PlaybackState;
use super::surface::{MediaElement, MediaEvent, VideoAdContainer};
use super::{ErrorHandler, EventHandler, FinishHandler, PlaybackUnit};
use crate::error::{AdError, AdRunError, ErrorCode, Result};
use crate::metrics::METRICS;
use crate::model::{Chain, MediaFile, Offset, ProgressEvent, TrackingEventKind};
use crate::options::UnitOptions;

const QUARTILES: [(f64, TrackingEventKind); 3] = [
    (0.25, TrackingEventKind::FirstQuartile),
    (0.5, TrackingEventKind::Midpoint),
    (0.75, TrackingEventKind::ThirdQuartile),
];

/// Plays the best matching media file of an inline ad.
pub struct MediaUnit {
    inner: Arc<MediaInner>,
}

struct MediaInner {
    core: Arc<UnitCore>,
    container: Arc<dyn VideoAdContainer>,
    media: Arc<dyn MediaElement>,
    icon_factory: Option<Arc<dyn IconOverlayFactory>>,
    icons: IconSchedule,
    impression_sent: AtomicBool,
    quartiles_sent: AtomicUsize,
    muted: Mutex<Option<bool>>,
    skip_offset: Option<Offset>,
    /// Progress offsets not reached yet.
    pending_progress: Mutex<Vec<(Offset, ProgressEvent)>>,
}

impl MediaUnit {
    pub fn new(
        chain: Chain,
        container: Arc<dyn VideoAdContainer>,
        media: Arc<dyn MediaElement>,
        icon_factory: Option<Arc<dyn IconOverlayFactory>>,
        options: UnitOptions,
    ) -> Self {
        let skip_offset = chain
            .inline_ad()
            .and_then(|ad| ad.skip_offset())
            .and_then(Offset::parse);
        let pending_progress = chain
            .progress_events()
            .into_iter()
            .filter_map(|event| match Offset::parse(&event.offset) {
                Some(offset) => Some((offset, event)),
                None => {
                    debug!(event = "unit.progress_offset_invalid", offset = %event.offset);
                    None
                }
            })
            .collect();

        let inner = Arc::new(MediaInner {
            core: Arc::new(UnitCore::new(chain, options)),
            container,
            media,
            icon_factory,
            icons: IconSchedule::default(),
            impression_sent: AtomicBool::new(false),
            quartiles_sent: AtomicUsize::new(0),
            muted: Mutex::new(None),
            skip_offset,
            pending_progress: Mutex::new(pending_progress),
        });

        let weak = Arc::downgrade(&inner);
        inner.core.on_finish(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.icons.detach();
            }
        }));

        Self { inner }
    }
}

/// Supported, non-interactive file whose width is closest to `width`.
fn pick_media_file<'a>(
    files: &'a [MediaFile],
    media: &dyn MediaElement,
    width: u32,
) -> Option<&'a MediaFile> {
    files
        .iter()
        .filter(|file| !file.is_interactive() && media.can_play(&file.mime_type))
        .min_by_key(|file| file.width.abs_diff(width))
}

impl MediaInner {
    fn handle_event(&self, event: MediaEvent) {
        if self.core.is_finished() {
            return;
        }

        use TrackingEventKind as Kind;
        match event {
            MediaEvent::Playing => match self.core.state() {
                PlaybackState::Loading => {
                    self.core.transition(PlaybackState::Started);
                    self.core.acknowledge(Ack::Playing);
                }
                PlaybackState::Paused => {
                    self.core.emit(Kind::Resume);
                    self.core.transition(PlaybackState::Playing);
                }
                _ => {}
            },
            MediaEvent::Pause => {
                if matches!(
                    self.core.state(),
                    PlaybackState::Playing | PlaybackState::Started
                ) {
                    self.core.emit(Kind::Pause);
                    self.core.transition(PlaybackState::Paused);
                }
            }
            MediaEvent::TimeUpdate {
                current_time,
                duration,
            } => self.time_update(current_time, duration),
            MediaEvent::Ended => {
                self.core.emit(Kind::Complete);
                self.core.finish();
            }
            MediaEvent::VolumeChange { volume, muted } => {
                let now_muted = muted || volume <= 0.0;
                let previous = self
                    .muted
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .replace(now_muted);
                match (previous, now_muted) {
                    (Some(false), true) => self.core.emit(Kind::Mute),
                    (Some(true), false) => self.core.emit(Kind::Unmute),
                    _ => {}
                }
            }
            MediaEvent::Error { code } => {
                let code = code.map(ErrorCode).unwrap_or(ErrorCode::MEDIA_FILE_PROBLEM);
                self.core
                    .report_error(AdError::new(code, "problem displaying the media file"));
                self.core.finish();
            }
            MediaEvent::FullscreenChange { fullscreen: true } => {
                self.core.emit(Kind::PlayerExpand);
                self.core.emit(Kind::Fullscreen);
            }
            MediaEvent::FullscreenChange { fullscreen: false } => {
                self.core.emit(Kind::PlayerCollapse);
                self.core.emit(Kind::ExitFullscreen);
            }
            MediaEvent::Click => self.click(),
        }
    }

    fn time_update(&self, current_time: f64, duration: f64) {
        if current_time <= 0.0 {
            return;
        }
        if !self.impression_sent.swap(true, Ordering::SeqCst) {
            self.core.emit(TrackingEventKind::Impression);
            self.core.emit(TrackingEventKind::CreativeView);
            self.core.emit(TrackingEventKind::Start);
            self.core.transition(PlaybackState::Playing);
        }
        self.track_progress(current_time, duration);

        if !duration.is_finite() || duration <= 0.0 {
            return;
        }
        let ratio = current_time / duration;
        for (index, (threshold, kind)) in QUARTILES.iter().enumerate() {
            if ratio >= *threshold
                && self
                    .quartiles_sent
                    .compare_exchange(index, index + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                self.core.emit(*kind);
            }
        }
    }

    /// Emit `progress` once for every declared offset now reached.
    fn track_progress(&self, current_time: f64, duration: f64) {
        let reached: Vec<ProgressEvent> = {
            let mut pending = self
                .pending_progress
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let (reached, rest) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|(offset, _)| offset.reached(current_time, duration));
            *pending = rest;
            reached.into_iter().map(|(_, event)| event).collect()
        };
        for event in reached {
            self.core.emit_with(
                TrackingEventKind::Progress,
                json!({ "uri": event.uri, "offset": event.offset, "currentTime": current_time }),
            );
        }
    }

    fn skippable(&self) -> bool {
        let Some(offset) = self.skip_offset else {
            return false;
        };
        !self.core.is_finished()
            && self.impression_sent.load(Ordering::SeqCst)
            && offset.reached(
                clamp_time(self.media.current_time()),
                self.media.duration(),
            )
    }

    /// With `pause_on_ad_click`, a click on a paused ad only resumes it;
    /// otherwise it pauses a playing ad and opens the click-through.
    fn click(&self) {
        let url = self
            .core
            .chain()
            .inline_ad()
            .and_then(|ad| ad.click_through())
            .map(str::to_string);
        self.core
            .emit_with(TrackingEventKind::ClickThrough, json!({ "url": url }));

        if self.core.options().pause_on_ad_click {
            match self.core.state() {
                PlaybackState::Paused => {
                    self.media.play();
                    return;
                }
                PlaybackState::Playing => self.media.pause(),
                _ => {}
            }
        }
        if let Some(url) = url {
            self.container.open_url(&url);
        }
    }
}

#[async_trait]
impl PlaybackUnit for MediaUnit {
    fn chain(&self) -> &Chain {
        self.inner.core.chain()
    }

    fn state(&self) -> PlaybackState {
        self.inner.core.state()
    }

    /// Pick a media file, play it and wait for the playing acknowledgment.
    ///
    /// A missing playable file reports error 403 and finishes the unit; a
    /// missing acknowledgment finishes it silently. Both resolve `Ok`.
    async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let core = &inner.core;
        if !core.transition(PlaybackState::Loading) {
            return Err(if core.is_finished() {
                AdRunError::AlreadyFinished
            } else {
                AdRunError::AlreadyStarted
            });
        }

        let files = core
            .chain()
            .inline_ad()
            .map(|ad| ad.media_files().to_vec())
            .unwrap_or_default();
        let width = inner.container.size().width;
        let Some(file) = pick_media_file(&files, inner.media.as_ref(), width) else {
            core.report_error(AdError::new(
                ErrorCode::MEDIA_FILE_NOT_SUPPORTED,
                "no supported media file found",
            ));
            core.finish();
            return Ok(());
        };
        debug!(event = "unit.media_selected", url = %file.url, width = file.width);

        inner.media.set_source(&file.url);
        let weak = Arc::downgrade(inner);
        inner.media.subscribe(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        }));
        *inner.muted.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(inner.media.muted() || inner.media.volume() <= 0.0);

        let playing = core.waiter(Ack::Playing);
        inner.media.play();
        if !core.wait(playing, core.options().ack_timeout()).await {
            if !core.is_finished() {
                inner.media.pause();
                core.finish();
            }
            return Ok(());
        }

        METRICS.inc_units_started();
        if let Some(factory) = &inner.icon_factory {
            inner
                .icons
                .attach(factory, Arc::clone(&inner.container), core);
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        let core = &self.inner.core;
        if core.is_finished() {
            return Err(AdRunError::AlreadyFinished);
        }
        self.inner.media.pause();
        core.finish();
        Ok(())
    }

    fn skippable(&self) -> bool {
        self.inner.skippable()
    }

    async fn skip(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.core.is_finished() {
            return Err(AdRunError::AlreadyFinished);
        }
        if !inner.skippable() {
            return Err(AdRunError::NotSkippable);
        }
        inner.core.emit(TrackingEventKind::Skip);
        inner.media.pause();
        inner.core.finish();
        Ok(())
    }

    fn pause(&self) {
        self.inner.media.pause();
    }

    fn resume(&self) {
        self.inner.media.play();
    }

    fn set_volume(&self, volume: f64) {
        self.inner.media.set_volume(volume);
    }

    fn volume(&self) -> f64 {
        self.inner.media.volume()
    }

    fn resize(&self) {
        self.inner.icons.redraw();
    }

    fn duration(&self) -> f64 {
        clamp_time(self.inner.media.duration())
    }

    fn current_time(&self) -> f64 {
        clamp_time(self.inner.media.current_time())
    }

    fn error(&self) -> Option<AdError> {
        self.inner.core.error()
    }

    fn is_started(&self) -> bool {
        self.inner.core.is_started()
    }

    fn on_event(&self, handler: EventHandler) {
        self.inner.core.on_event(handler);
    }

    fn on_finish(&self, handler: FinishHandler) {
        self.inner.core.on_finish(handler);
    }

    fn on_error(&self, handler: ErrorHandler) {
        self.inner.core.on_error(handler);
    }
}
