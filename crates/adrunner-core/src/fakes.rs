//! In-memory collaborators for tests and offline document catalogs
//!
//! Provides `MemoryDocumentLoader`, `FakeContainer`, `FakeMediaElement`,
//! `FakeCreative`, `FakeCreativeLoader` and `FakeIconOverlayFactory`. They
//! record every call so tests can assert on the interaction, and fire
//! native events synchronously the way real creatives often do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AdError, TransportError};
use crate::model::{Chain, Icon};
use crate::source::DocumentLoader;
use crate::unit::{
    ContainerSize, CreativeEvent, CreativeHandler, CreativeLoader, IconHooks, IconOverlay,
    IconOverlayFactory, InteractiveCreative, MediaElement, MediaEvent, MediaHandler,
    VideoAdContainer,
};

// ---------------------------------------------------------------------------
// MemoryDocumentLoader
// ---------------------------------------------------------------------------

/// Serves documents from a `HashMap<tag, raw>` after a fixed latency.
#[derive(Debug, Default)]
pub struct MemoryDocumentLoader {
    documents: HashMap<String, String>,
    latency: Duration,
    requests: Mutex<Vec<(String, Option<Duration>)>>,
}

impl MemoryDocumentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON catalog mapping tags to documents.
    pub fn from_catalog(catalog: &HashMap<String, serde_json::Value>) -> Self {
        let documents = catalog
            .iter()
            .map(|(tag, doc)| (tag.clone(), doc.to_string()))
            .collect();
        Self {
            documents,
            ..Self::default()
        }
    }

    pub fn with_document(mut self, tag: impl Into<String>, raw: impl Into<String>) -> Self {
        self.documents.insert(tag.into(), raw.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every fetch so far, with the budget the resolver passed in.
    pub fn requests(&self) -> Vec<(String, Option<Duration>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentLoader for MemoryDocumentLoader {
    async fn fetch(&self, tag: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push((tag.to_string(), timeout));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.documents
            .get(tag)
            .cloned()
            .ok_or_else(|| TransportError(format!("no document for {tag}")))
    }
}

// ---------------------------------------------------------------------------
// FakeContainer
// ---------------------------------------------------------------------------

pub struct FakeContainer {
    size: ContainerSize,
    destroyed: AtomicBool,
    media: Option<Arc<FakeMediaElement>>,
    opened: Mutex<Vec<String>>,
}

impl FakeContainer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: ContainerSize::new(width, height),
            destroyed: AtomicBool::new(false),
            media: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_media(mut self, media: Arc<FakeMediaElement>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    /// URLs passed to `open_url`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl VideoAdContainer for FakeContainer {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn size(&self) -> ContainerSize {
        self.size
    }

    fn media(&self) -> Option<Arc<dyn MediaElement>> {
        self.media
            .clone()
            .map(|media| media as Arc<dyn MediaElement>)
    }

    fn open_url(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }
}

// ---------------------------------------------------------------------------
// FakeMediaElement
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MediaState {
    volume: f64,
    muted: bool,
    current_time: f64,
    duration: f64,
    source: Option<String>,
    paused: bool,
    supported: Vec<String>,
}

/// Media element whose `play()` acknowledges with a `Playing` event unless
/// told otherwise.
pub struct FakeMediaElement {
    state: Mutex<MediaState>,
    ack_play: AtomicBool,
    handlers: Mutex<Vec<MediaHandler>>,
}

impl Default for FakeMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaElement {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MediaState {
                volume: 1.0,
                muted: false,
                current_time: 0.0,
                duration: 0.0,
                source: None,
                paused: true,
                supported: Vec::new(),
            }),
            ack_play: AtomicBool::new(true),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_supported(self, mime_type: &str) -> Self {
        self.state.lock().unwrap().supported.push(mime_type.to_string());
        self
    }

    pub fn with_volume(self, volume: f64) -> Self {
        self.state.lock().unwrap().volume = volume;
        self
    }

    pub fn with_muted(self, muted: bool) -> Self {
        self.state.lock().unwrap().muted = muted;
        self
    }

    pub fn with_duration(self, duration: f64) -> Self {
        self.state.lock().unwrap().duration = duration;
        self
    }

    /// Stop acknowledging `play()`.
    pub fn without_play_ack(self) -> Self {
        self.ack_play.store(false, Ordering::SeqCst);
        self
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    /// Dispatch a native event to subscribers.
    pub fn emit(&self, event: MediaEvent) {
        if let MediaEvent::TimeUpdate { current_time, .. } = &event {
            self.state.lock().unwrap().current_time = *current_time;
        }
        let handlers = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl MediaElement for FakeMediaElement {
    fn play(&self) {
        self.state.lock().unwrap().paused = false;
        if self.ack_play.load(Ordering::SeqCst) {
            self.emit(MediaEvent::Playing);
        }
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().unwrap().volume = volume;
    }

    fn muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn can_play(&self, mime_type: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .supported
            .iter()
            .any(|m| m == mime_type)
    }

    fn set_source(&self, url: &str) {
        self.state.lock().unwrap().source = Some(url.to_string());
    }

    fn subscribe(&self, handler: MediaHandler) {
        self.handlers.lock().unwrap().push(handler);
    }
}

// ---------------------------------------------------------------------------
// FakeCreative
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CreativeConfig {
    handshake_error: Option<AdError>,
    init_error: Option<AdError>,
    start_error: Option<AdError>,
    ack_loaded: bool,
    ack_start: bool,
    ack_stop: bool,
    icons: Option<bool>,
    volume: f64,
    duration: f64,
    remaining: f64,
    expanded: bool,
}

/// Scriptable interactive creative.
///
/// By default it acknowledges `init_ad`, `start_ad` and `stop_ad` with
/// `AdLoaded`, `AdStarted` and `AdStopped`, and echoes `pause_ad` /
/// `resume_ad` as `AdPaused` / `AdPlaying`.
pub struct FakeCreative {
    config: Mutex<CreativeConfig>,
    calls: Mutex<Vec<String>>,
    volume_sets: Mutex<Vec<f64>>,
    handlers: Mutex<Vec<CreativeHandler>>,
}

impl Default for FakeCreative {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCreative {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(CreativeConfig {
                handshake_error: None,
                init_error: None,
                start_error: None,
                ack_loaded: true,
                ack_start: true,
                ack_stop: true,
                icons: None,
                volume: 1.0,
                duration: 30.0,
                remaining: 30.0,
                expanded: false,
            }),
            calls: Mutex::new(Vec::new()),
            volume_sets: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handshake_error(self, error: AdError) -> Self {
        self.config.lock().unwrap().handshake_error = Some(error);
        self
    }

    pub fn with_init_error(self, error: AdError) -> Self {
        self.config.lock().unwrap().init_error = Some(error);
        self
    }

    pub fn with_start_error(self, error: AdError) -> Self {
        self.config.lock().unwrap().start_error = Some(error);
        self
    }

    /// Never acknowledge `start_ad`.
    pub fn without_start_ack(self) -> Self {
        self.config.lock().unwrap().ack_start = false;
        self
    }

    /// Never acknowledge `stop_ad`.
    pub fn without_stop_ack(self) -> Self {
        self.config.lock().unwrap().ack_stop = false;
        self
    }

    pub fn with_icons(self, granted: Option<bool>) -> Self {
        self.config.lock().unwrap().icons = granted;
        self
    }

    pub fn set_volume_reading(&self, volume: f64) {
        self.config.lock().unwrap().volume = volume;
    }

    pub fn set_times(&self, duration: f64, remaining: f64) {
        let mut config = self.config.lock().unwrap();
        config.duration = duration;
        config.remaining = remaining;
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.config.lock().unwrap().expanded = expanded;
    }

    /// Names of the control calls received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    /// Values passed to `set_ad_volume`, in order.
    pub fn volume_sets(&self) -> Vec<f64> {
        self.volume_sets.lock().unwrap().clone()
    }

    /// Dispatch a native event to subscribers.
    pub fn emit(&self, event: CreativeEvent) {
        let handlers = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

impl InteractiveCreative for FakeCreative {
    fn handshake_version(&self, version: &str) -> Result<String, AdError> {
        self.record("handshakeVersion");
        match self.config.lock().unwrap().handshake_error.clone() {
            Some(err) => Err(err),
            None => Ok(version.to_string()),
        }
    }

    fn init_ad(&self, _size: ContainerSize, _chain: &Chain) -> Result<(), AdError> {
        self.record("initAd");
        let (error, ack) = {
            let config = self.config.lock().unwrap();
            (config.init_error.clone(), config.ack_loaded)
        };
        if let Some(err) = error {
            return Err(err);
        }
        if ack {
            self.emit(CreativeEvent::AdLoaded);
        }
        Ok(())
    }

    fn start_ad(&self) -> Result<(), AdError> {
        self.record("startAd");
        let (error, ack) = {
            let config = self.config.lock().unwrap();
            (config.start_error.clone(), config.ack_start)
        };
        if let Some(err) = error {
            return Err(err);
        }
        if ack {
            self.emit(CreativeEvent::AdStarted);
        }
        Ok(())
    }

    fn stop_ad(&self) -> Result<(), AdError> {
        self.record("stopAd");
        if self.config.lock().unwrap().ack_stop {
            self.emit(CreativeEvent::AdStopped);
        }
        Ok(())
    }

    fn pause_ad(&self) -> Result<(), AdError> {
        self.record("pauseAd");
        self.emit(CreativeEvent::AdPaused);
        Ok(())
    }

    fn resume_ad(&self) -> Result<(), AdError> {
        self.record("resumeAd");
        self.emit(CreativeEvent::AdPlaying);
        Ok(())
    }

    fn resize_ad(&self, _size: ContainerSize) -> Result<(), AdError> {
        self.record("resizeAd");
        Ok(())
    }

    fn ad_volume(&self) -> f64 {
        self.config.lock().unwrap().volume
    }

    fn set_ad_volume(&self, volume: f64) -> Result<(), AdError> {
        self.record("setAdVolume");
        self.volume_sets.lock().unwrap().push(volume);
        self.config.lock().unwrap().volume = volume;
        Ok(())
    }

    fn ad_duration(&self) -> f64 {
        self.config.lock().unwrap().duration
    }

    fn ad_remaining_time(&self) -> f64 {
        self.config.lock().unwrap().remaining
    }

    fn ad_expanded(&self) -> bool {
        self.config.lock().unwrap().expanded
    }

    fn ad_icons(&self) -> Option<bool> {
        self.config.lock().unwrap().icons
    }

    fn subscribe(&self, handler: CreativeHandler) {
        self.handlers.lock().unwrap().push(handler);
    }
}

// ---------------------------------------------------------------------------
// FakeCreativeLoader
// ---------------------------------------------------------------------------

/// Hands out the same creative after an optional latency, or fails.
pub struct FakeCreativeLoader {
    creative: Option<Arc<FakeCreative>>,
    error: Option<AdError>,
    latency: Duration,
    loads: AtomicUsize,
}

impl FakeCreativeLoader {
    pub fn new(creative: Arc<FakeCreative>) -> Self {
        Self {
            creative: Some(creative),
            error: None,
            latency: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AdError) -> Self {
        Self {
            creative: None,
            error: Some(error),
            latency: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreativeLoader for FakeCreativeLoader {
    async fn load(
        &self,
        _chain: &Chain,
        _container: Arc<dyn VideoAdContainer>,
    ) -> Result<Arc<dyn InteractiveCreative>, AdError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match (&self.creative, &self.error) {
            (Some(creative), _) => Ok(Arc::clone(creative) as Arc<dyn InteractiveCreative>),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(AdError::uncoded("no creative configured")),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeIconOverlayFactory
// ---------------------------------------------------------------------------

/// Overlay that needs `pending` more draws before its layout settles.
pub struct FakeIconOverlay {
    icons: Vec<Icon>,
    hooks: IconHooks,
    pending: AtomicUsize,
    draws: AtomicUsize,
    removed: AtomicBool,
}

impl FakeIconOverlay {
    pub fn icons(&self) -> &[Icon] {
        &self.icons
    }

    pub fn draw_count(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Simulate a viewer clicking the icon at `index`.
    pub fn click(&self, index: usize) {
        if let Some(icon) = self.icons.get(index) {
            (self.hooks.on_click)(icon);
        }
    }

    /// Simulate the icon at `index` becoming visible.
    pub fn view(&self, index: usize) {
        if let Some(icon) = self.icons.get(index) {
            (self.hooks.on_view)(icon);
        }
    }
}

impl IconOverlay for FakeIconOverlay {
    fn draw(&self) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    fn has_pending_redraws(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

/// Creates [`FakeIconOverlay`]s and keeps them for inspection.
#[derive(Default)]
pub struct FakeIconOverlayFactory {
    pending_draws: usize,
    overlays: Mutex<Vec<Arc<FakeIconOverlay>>>,
}

impl FakeIconOverlayFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays report pending redraws until they were drawn `draws` times.
    pub fn with_pending_draws(mut self, draws: usize) -> Self {
        self.pending_draws = draws;
        self
    }

    pub fn overlays(&self) -> Vec<Arc<FakeIconOverlay>> {
        self.overlays.lock().unwrap().clone()
    }
}

impl IconOverlayFactory for FakeIconOverlayFactory {
    fn add_icons(
        &self,
        icons: Vec<Icon>,
        _container: Arc<dyn VideoAdContainer>,
        hooks: IconHooks,
    ) -> Arc<dyn IconOverlay> {
        let overlay = Arc::new(FakeIconOverlay {
            icons,
            hooks,
            pending: AtomicUsize::new(self.pending_draws),
            draws: AtomicUsize::new(0),
            removed: AtomicBool::new(false),
        });
        self.overlays.lock().unwrap().push(Arc::clone(&overlay));
        overlay
    }
}
