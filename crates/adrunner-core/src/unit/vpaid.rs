//! Playback unit for interactive (VPAID) creatives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::base::{clamp_time, Ack, UnitCore};
use super::icons::{IconOverlayFactory, IconSchedule};
use super::state::PlaybackState;
use super::surface::{CreativeEvent, CreativeLoader, InteractiveCreative, VideoAdContainer};
use super::{ErrorHandler, EventHandler, FinishHandler, PlaybackUnit, UnitEvent};
use crate::error::{AdError, AdRunError, Result};
use crate::metrics::METRICS;
use crate::model::{Chain, TrackingEventKind};
use crate::options::UnitOptions;

/// Drives an interactive creative loaded through a [`CreativeLoader`].
pub struct VpaidUnit {
    inner: Arc<VpaidInner>,
}

struct VpaidInner {
    core: Arc<UnitCore>,
    container: Arc<dyn VideoAdContainer>,
    loader: Arc<dyn CreativeLoader>,
    icon_factory: Option<Arc<dyn IconOverlayFactory>>,
    creative: Mutex<Option<Arc<dyn InteractiveCreative>>>,
    icons: IconSchedule,
    video_started: AtomicBool,
    last_volume: Mutex<Option<f64>>,
}

impl VpaidUnit {
    pub fn new(
        chain: Chain,
        container: Arc<dyn VideoAdContainer>,
        loader: Arc<dyn CreativeLoader>,
        icon_factory: Option<Arc<dyn IconOverlayFactory>>,
        options: UnitOptions,
    ) -> Self {
        let inner = Arc::new(VpaidInner {
            core: Arc::new(UnitCore::new(chain, options)),
            container,
            loader,
            icon_factory,
            creative: Mutex::new(None),
            icons: IconSchedule::default(),
            video_started: AtomicBool::new(false),
            last_volume: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner.core.on_finish(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.icons.detach();
            }
        }));

        Self { inner }
    }

    fn creative(&self) -> Option<Arc<dyn InteractiveCreative>> {
        self.inner.creative()
    }
}

impl VpaidInner {
    fn creative(&self) -> Option<Arc<dyn InteractiveCreative>> {
        self.creative
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn subscribe(self: &Arc<Self>, creative: &Arc<dyn InteractiveCreative>) {
        let weak: Weak<VpaidInner> = Arc::downgrade(self);
        creative.subscribe(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        }));
    }

    /// Match the creative volume to the external media element, once.
    fn sync_volume(&self, creative: &Arc<dyn InteractiveCreative>) {
        let volume = match self.container.media() {
            Some(media) if media.muted() => 0.0,
            Some(media) => media.volume(),
            None => creative.ad_volume(),
        };
        if let Err(err) = creative.set_ad_volume(volume) {
            warn!(event = "unit.volume_sync_failed", error = %err);
        }
        *self.last_volume.lock().unwrap_or_else(|e| e.into_inner()) = Some(volume);
    }

    /// Ask the creative to stop, wait for its acknowledgment, then finish
    /// regardless of whether it arrived.
    async fn stop_and_finish(&self, creative: &Arc<dyn InteractiveCreative>) {
        let stopped = self.core.waiter(Ack::Stopped);
        match creative.stop_ad() {
            Ok(()) => {
                if !self.core.wait(stopped, self.core.options().ack_timeout()).await {
                    debug!(event = "unit.stop_ack_missing");
                }
            }
            Err(err) => warn!(event = "unit.stop_failed", error = %err),
        }
        self.core.finish();
    }

    fn attach_icons(self: &Arc<Self>, creative: &Arc<dyn InteractiveCreative>) {
        let Some(factory) = &self.icon_factory else {
            return;
        };
        if creative.ad_icons() != Some(true) {
            return;
        }
        self.icons
            .attach(factory, Arc::clone(&self.container), &self.core);
    }

    fn handle_event(&self, event: CreativeEvent) {
        if self.core.is_finished() {
            return;
        }

        use TrackingEventKind as Kind;
        match &event {
            CreativeEvent::AdLoaded => self.core.acknowledge(Ack::Loaded),
            CreativeEvent::AdStarted => {
                self.core.emit(Kind::CreativeView);
                self.core.transition(PlaybackState::Started);
                self.core.acknowledge(Ack::Started);
            }
            CreativeEvent::AdVideoStart => self.video_start(),
            CreativeEvent::AdImpression => {
                self.video_start();
                self.core.emit(Kind::Impression);
            }
            CreativeEvent::AdVideoFirstQuartile => self.core.emit(Kind::FirstQuartile),
            CreativeEvent::AdVideoMidpoint => self.core.emit(Kind::Midpoint),
            CreativeEvent::AdVideoThirdQuartile => self.core.emit(Kind::ThirdQuartile),
            CreativeEvent::AdVideoComplete => {
                self.core.emit(Kind::Complete);
                self.core.finish();
            }
            CreativeEvent::AdStopped => {
                self.core.acknowledge(Ack::Stopped);
                self.core.finish();
            }
            CreativeEvent::AdUserClose => {
                self.core.emit(Kind::CloseLinear);
                self.core.finish();
            }
            CreativeEvent::AdSkipped => {
                self.core.emit(Kind::Skip);
                self.core.finish();
            }
            CreativeEvent::AdPaused => {
                self.core.emit(Kind::Pause);
                self.core.transition(PlaybackState::Paused);
            }
            CreativeEvent::AdPlaying => {
                self.core.emit(Kind::Resume);
                self.core.transition(PlaybackState::Playing);
            }
            CreativeEvent::AdClickThru {
                url,
                id,
                player_handles,
            } => self.click_through(url.as_deref(), id.as_deref(), *player_handles),
            CreativeEvent::AdError { error } => {
                let error = error.clone().unwrap_or_else(AdError::vpaid_general);
                self.core.report_error(error);
            }
            CreativeEvent::AdVolumeChange => self.volume_change(),
            CreativeEvent::AdDurationChange | CreativeEvent::AdRemainingTimeChange => {
                self.core.emit_with(
                    Kind::AdProgress,
                    json!({ "duration": self.duration(), "currentTime": self.current_time() }),
                );
            }
            CreativeEvent::AdUserAcceptInvitation => self.core.emit(Kind::AcceptInvitation),
            CreativeEvent::AdUserMinimize => self.core.emit(Kind::AdCollapse),
            CreativeEvent::AdExpandedChange => {
                let expanded = self.creative().is_some_and(|c| c.ad_expanded());
                self.core.emit(if expanded {
                    Kind::PlayerExpand
                } else {
                    Kind::PlayerCollapse
                });
            }
            CreativeEvent::AdLog { message } => debug!(event = "creative.log", message = %message),
            CreativeEvent::AdLinearChange
            | CreativeEvent::AdSizeChange
            | CreativeEvent::AdSkippableStateChange => {}
        }

        self.core.emit_event(UnitEvent::Creative(event));
    }

    /// Report `start` the first time any start signal arrives.
    fn video_start(&self) {
        if self.video_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.emit(TrackingEventKind::Start);
        self.core.transition(PlaybackState::Playing);
    }

    fn click_through(&self, url: Option<&str>, id: Option<&str>, player_handles: bool) {
        self.core.emit_with(
            TrackingEventKind::ClickThrough,
            json!({ "url": url, "id": id, "playerHandles": player_handles }),
        );
        if !player_handles {
            return;
        }

        // A click on a paused ad only resumes it.
        if let Some(creative) = self.creative() {
            let state = self.core.state();
            let toggled = match state {
                PlaybackState::Paused => creative.resume_ad(),
                PlaybackState::Playing if self.core.options().pause_on_ad_click => {
                    creative.pause_ad()
                }
                _ => Ok(()),
            };
            if let Err(err) = toggled {
                warn!(event = "unit.click_toggle_failed", error = %err);
            }
            if state == PlaybackState::Paused {
                return;
            }
        }

        let declared = self
            .core
            .chain()
            .inline_ad()
            .and_then(|ad| ad.click_through())
            .map(str::to_string);
        let target = url
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or(declared);
        if let Some(target) = target {
            self.container.open_url(&target);
        }
    }

    /// Emit `mute`/`unmute` when the creative volume crosses zero.
    fn volume_change(&self) {
        self.core.emit(TrackingEventKind::VolumeChanged);
        let Some(creative) = self.creative() else {
            return;
        };
        let volume = creative.ad_volume();
        let previous = self
            .last_volume
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(volume);

        if let Some(previous) = previous {
            let was_muted = previous <= 0.0;
            let is_muted = volume <= 0.0;
            if !was_muted && is_muted {
                self.core.emit(TrackingEventKind::Mute);
            } else if was_muted && !is_muted {
                self.core.emit(TrackingEventKind::Unmute);
            }
        }
    }

    fn duration(&self) -> f64 {
        self.creative()
            .map(|c| clamp_time(c.ad_duration()))
            .unwrap_or(0.0)
    }

    fn current_time(&self) -> f64 {
        let Some(creative) = self.creative() else {
            return 0.0;
        };
        let remaining = creative.ad_remaining_time();
        if !remaining.is_finite() || remaining < 0.0 {
            return 0.0;
        }
        clamp_time(self.duration() - remaining)
    }
}

#[async_trait]
impl PlaybackUnit for VpaidUnit {
    fn chain(&self) -> &Chain {
        self.inner.core.chain()
    }

    fn state(&self) -> PlaybackState {
        self.inner.core.state()
    }

    /// Load, handshake, init and start the creative.
    ///
    /// Only loading and handshake failures reject. Init and start failures
    /// (including a missing start acknowledgment) stop the creative and
    /// finish the unit, and the call still succeeds.
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

        let creative = match inner
            .loader
            .load(core.chain(), Arc::clone(&inner.container))
            .await
        {
            Ok(creative) => creative,
            Err(err) => {
                core.finish();
                return Err(err.into());
            }
        };
        if core.is_finished() {
            return Ok(());
        }
        *inner.creative.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&creative));

        let options = core.options().clone();
        if let Err(err) = creative.handshake_version(&options.supported_vpaid_version) {
            core.report_error(err.clone());
            core.finish();
            return Err(err.into());
        }

        inner.subscribe(&creative);

        let loaded = core.waiter(Ack::Loaded);
        let init = creative.init_ad(inner.container.size(), core.chain());
        let initialised = match init {
            Ok(()) => core.wait(loaded, options.ack_timeout()).await,
            Err(err) => {
                core.report_error(err);
                false
            }
        };
        if !initialised {
            if !core.is_finished() {
                inner.stop_and_finish(&creative).await;
            }
            return Ok(());
        }

        inner.sync_volume(&creative);

        if core.is_finished() {
            return Ok(());
        }
        if inner.container.is_destroyed() {
            debug!(event = "unit.container_destroyed");
            core.finish();
            return Ok(());
        }

        let started = core.waiter(Ack::Started);
        let acknowledged = match creative.start_ad() {
            Ok(()) => core.wait(started, options.ack_timeout()).await,
            Err(err) => {
                warn!(event = "unit.start_failed", error = %err);
                false
            }
        };
        if !acknowledged || core.state() == PlaybackState::Loading {
            if !core.is_finished() {
                inner.stop_and_finish(&creative).await;
            }
            return Ok(());
        }

        METRICS.inc_units_started();
        inner.attach_icons(&creative);
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        let core = &self.inner.core;
        if core.is_finished() {
            return Err(AdRunError::AlreadyFinished);
        }
        match self.creative() {
            Some(creative) => self.inner.stop_and_finish(&creative).await,
            None => {
                core.finish();
            }
        }
        Ok(())
    }

    fn pause(&self) {
        if let Some(Err(err)) = self.creative().map(|c| c.pause_ad()) {
            warn!(event = "unit.pause_failed", error = %err);
        }
    }

    fn resume(&self) {
        if let Some(Err(err)) = self.creative().map(|c| c.resume_ad()) {
            warn!(event = "unit.resume_failed", error = %err);
        }
    }

    fn set_volume(&self, volume: f64) {
        if let Some(Err(err)) = self.creative().map(|c| c.set_ad_volume(volume)) {
            warn!(event = "unit.set_volume_failed", error = %err);
        }
    }

    fn volume(&self) -> f64 {
        self.creative().map(|c| c.ad_volume()).unwrap_or(0.0)
    }

    fn resize(&self) {
        if let Some(Err(err)) = self
            .creative()
            .map(|c| c.resize_ad(self.inner.container.size()))
        {
            warn!(event = "unit.resize_failed", error = %err);
        }
        self.inner.icons.redraw();
    }

    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
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
