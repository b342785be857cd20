//! Collaborator surfaces a playback unit drives: the container, its media
//! element, and interactive creatives.
//!
//! Native events are delivered through handlers registered with
//! `subscribe`. Implementations may invoke a handler synchronously from
//! inside a control call (e.g. emit `AdStarted` from within `start_ad`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AdError;
use crate::model::Chain;

/// Handler for native interactive-creative events.
pub type CreativeHandler = Arc<dyn Fn(CreativeEvent) + Send + Sync>;

/// Handler for native media element events.
pub type MediaHandler = Arc<dyn Fn(MediaEvent) + Send + Sync>;

/// Pixel geometry of the ad container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

impl ContainerSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The host surface ads are rendered into.
pub trait VideoAdContainer: Send + Sync {
    /// True once the host has torn the container down.
    fn is_destroyed(&self) -> bool;

    fn size(&self) -> ContainerSize;

    /// The external media element, if the host provides one.
    fn media(&self) -> Option<Arc<dyn MediaElement>>;

    /// Open `url` in a new browsing context.
    fn open_url(&self, url: &str);
}

/// Native media element events, carrying the values read at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaEvent {
    Playing,
    Pause,
    TimeUpdate { current_time: f64, duration: f64 },
    Ended,
    VolumeChange { volume: f64, muted: bool },
    Error { code: Option<u16> },
    FullscreenChange { fullscreen: bool },
    Click,
}

/// Plain media playback surface.
pub trait MediaElement: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn can_play(&self, mime_type: &str) -> bool;
    fn set_source(&self, url: &str);
    fn subscribe(&self, handler: MediaHandler);
}

/// Native interactive-creative (VPAID) events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CreativeEvent {
    AdLoaded,
    AdStarted,
    AdStopped,
    AdSkipped,
    AdImpression,
    AdVideoStart,
    AdVideoFirstQuartile,
    AdVideoMidpoint,
    AdVideoThirdQuartile,
    AdVideoComplete,
    AdPaused,
    AdPlaying,
    AdUserClose,
    AdUserAcceptInvitation,
    AdUserMinimize,
    AdExpandedChange,
    AdVolumeChange,
    AdDurationChange,
    AdRemainingTimeChange,
    AdClickThru {
        url: Option<String>,
        id: Option<String>,
        player_handles: bool,
    },
    AdError {
        error: Option<AdError>,
    },
    AdLog {
        message: String,
    },
    AdLinearChange,
    AdSizeChange,
    AdSkippableStateChange,
}

impl CreativeEvent {
    /// Native event name as the creative reports it.
    pub fn name(&self) -> &'static str {
        match self {
            CreativeEvent::AdLoaded => "AdLoaded",
            CreativeEvent::AdStarted => "AdStarted",
            CreativeEvent::AdStopped => "AdStopped",
            CreativeEvent::AdSkipped => "AdSkipped",
            CreativeEvent::AdImpression => "AdImpression",
            CreativeEvent::AdVideoStart => "AdVideoStart",
            CreativeEvent::AdVideoFirstQuartile => "AdVideoFirstQuartile",
            CreativeEvent::AdVideoMidpoint => "AdVideoMidpoint",
            CreativeEvent::AdVideoThirdQuartile => "AdVideoThirdQuartile",
            CreativeEvent::AdVideoComplete => "AdVideoComplete",
            CreativeEvent::AdPaused => "AdPaused",
            CreativeEvent::AdPlaying => "AdPlaying",
            CreativeEvent::AdUserClose => "AdUserClose",
            CreativeEvent::AdUserAcceptInvitation => "AdUserAcceptInvitation",
            CreativeEvent::AdUserMinimize => "AdUserMinimize",
            CreativeEvent::AdExpandedChange => "AdExpandedChange",
            CreativeEvent::AdVolumeChange => "AdVolumeChange",
            CreativeEvent::AdDurationChange => "AdDurationChange",
            CreativeEvent::AdRemainingTimeChange => "AdRemainingTimeChange",
            CreativeEvent::AdClickThru { .. } => "AdClickThru",
            CreativeEvent::AdError { .. } => "AdError",
            CreativeEvent::AdLog { .. } => "AdLog",
            CreativeEvent::AdLinearChange => "AdLinearChange",
            CreativeEvent::AdSizeChange => "AdSizeChange",
            CreativeEvent::AdSkippableStateChange => "AdSkippableStateChange",
        }
    }
}

/// Control surface of a loaded interactive creative.
///
/// Control calls return immediately; completion is acknowledged through
/// native events (`AdLoaded`, `AdStarted`, `AdStopped`).
pub trait InteractiveCreative: Send + Sync {
    /// Negotiate the creative API version. Returns the creative's version.
    fn handshake_version(&self, version: &str) -> Result<String, AdError>;
    fn init_ad(&self, size: ContainerSize, chain: &Chain) -> Result<(), AdError>;
    fn start_ad(&self) -> Result<(), AdError>;
    fn stop_ad(&self) -> Result<(), AdError>;
    fn pause_ad(&self) -> Result<(), AdError>;
    fn resume_ad(&self) -> Result<(), AdError>;
    fn resize_ad(&self, size: ContainerSize) -> Result<(), AdError>;
    fn ad_volume(&self) -> f64;
    fn set_ad_volume(&self, volume: f64) -> Result<(), AdError>;
    /// Total duration in seconds; may be negative or NaN when unknown.
    fn ad_duration(&self) -> f64;
    fn ad_remaining_time(&self) -> f64;
    fn ad_expanded(&self) -> bool;
    /// `None` when the creative does not implement the icon query.
    fn ad_icons(&self) -> Option<bool>;
    fn subscribe(&self, handler: CreativeHandler);
}

/// Loads the interactive creative referenced by a resolved chain.
#[async_trait]
pub trait CreativeLoader: Send + Sync {
    async fn load(
        &self,
        chain: &Chain,
        container: Arc<dyn VideoAdContainer>,
    ) -> Result<Arc<dyn InteractiveCreative>, AdError>;
}
