//! Playback units: drive one resolved ad and normalize its native events.
//!
//! Two variants sit behind [`PlaybackUnit`]: [`VpaidUnit`] for interactive
//! creatives and [`MediaUnit`] for plain media files. [`UnitFactory`] picks
//! the variant once, when the unit is created.

mod base;
pub mod icons;
pub mod media;
pub mod state;
pub mod surface;
pub mod vpaid;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AdError, AdRunError, ErrorCode, Result};
use crate::model::{Chain, TrackingEvent};
use crate::options::UnitOptions;

pub use icons::{collect_icons, IconCallback, IconHooks, IconOverlay, IconOverlayFactory};
pub use media::MediaUnit;
pub use state::PlaybackState;
pub use surface::{
    ContainerSize, CreativeEvent, CreativeHandler, CreativeLoader, InteractiveCreative,
    MediaElement, MediaEvent, MediaHandler, VideoAdContainer,
};
pub use vpaid::VpaidUnit;

/// Event delivered to unit listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UnitEvent {
    /// Normalized tracking event.
    Tracking(TrackingEvent),
    /// Native creative event, forwarded as received.
    Creative(CreativeEvent),
}

impl UnitEvent {
    /// The tracking event, if this is one.
    pub fn tracking(&self) -> Option<&TrackingEvent> {
        match self {
            UnitEvent::Tracking(event) => Some(event),
            UnitEvent::Creative(_) => None,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&UnitEvent) + Send + Sync>;
pub type FinishHandler = Box<dyn FnOnce() + Send>;
pub type ErrorHandler = Arc<dyn Fn(&AdError) + Send + Sync>;

/// Lifecycle of one resolved ad.
///
/// `start` may be called once; `cancel` fails once the unit is finished.
/// Handlers are typed closures, so registration cannot fail.
#[async_trait]
pub trait PlaybackUnit: Send + Sync {
    fn chain(&self) -> &Chain;
    fn state(&self) -> PlaybackState;

    async fn start(&self) -> Result<()>;
    async fn cancel(&self) -> Result<()>;

    /// Whether the declared skip offset has been reached.
    fn skippable(&self) -> bool {
        false
    }

    /// User skip: emits `skip` and finishes the unit.
    async fn skip(&self) -> Result<()> {
        Err(AdRunError::NotSkippable)
    }

    fn pause(&self);
    fn resume(&self);
    fn set_volume(&self, volume: f64);
    fn volume(&self) -> f64;
    /// Propagate a container size change.
    fn resize(&self);

    /// Seconds; never negative.
    fn duration(&self) -> f64;
    /// Seconds; never negative.
    fn current_time(&self) -> f64;

    fn error(&self) -> Option<AdError>;
    fn error_code(&self) -> Option<ErrorCode> {
        self.error().and_then(|err| err.code)
    }

    /// Whether the unit ever reached `started`, even if it later finished.
    fn is_started(&self) -> bool;
    fn is_finished(&self) -> bool {
        self.state().is_finished()
    }
    /// `true` unless currently playing.
    fn paused(&self) -> bool {
        self.state() != PlaybackState::Playing
    }

    fn on_event(&self, handler: EventHandler);
    /// Fires once when the unit reaches `finished`.
    fn on_finish(&self, handler: FinishHandler);
    fn on_error(&self, handler: ErrorHandler);
}

/// Builds playback units for resolved chains against one container.
#[derive(Clone)]
pub struct UnitFactory {
    container: Arc<dyn VideoAdContainer>,
    creative_loader: Option<Arc<dyn CreativeLoader>>,
    icon_factory: Option<Arc<dyn IconOverlayFactory>>,
}

impl UnitFactory {
    pub fn new(container: Arc<dyn VideoAdContainer>) -> Self {
        Self {
            container,
            creative_loader: None,
            icon_factory: None,
        }
    }

    pub fn with_creative_loader(mut self, loader: Arc<dyn CreativeLoader>) -> Self {
        self.creative_loader = Some(loader);
        self
    }

    pub fn with_icon_factory(mut self, factory: Arc<dyn IconOverlayFactory>) -> Self {
        self.icon_factory = Some(factory);
        self
    }

    pub fn container(&self) -> &Arc<dyn VideoAdContainer> {
        &self.container
    }

    /// Create the unit for `chain`, whose head must be a resolved inline ad.
    pub fn create(&self, chain: Chain, options: &UnitOptions) -> Result<Arc<dyn PlaybackUnit>> {
        let ad = chain.inline_ad().ok_or(AdRunError::InvalidChain)?;

        if ad.interactive_creative().is_some() {
            if !options.vpaid_enabled {
                return Err(AdError::new(
                    ErrorCode::UNEXPECTED_AD_TYPE,
                    "VPAID ads are not supported by the current player",
                )
                .into());
            }
            let loader = self.creative_loader.clone().ok_or_else(|| {
                AdError::new(
                    ErrorCode::UNEXPECTED_AD_TYPE,
                    "no creative loader available for VPAID ads",
                )
            })?;
            let unit = VpaidUnit::new(
                chain,
                Arc::clone(&self.container),
                loader,
                self.icon_factory.clone(),
                options.clone(),
            );
            return Ok(Arc::new(unit));
        }

        let media = self.container.media().ok_or_else(|| {
            AdError::new(
                ErrorCode::MEDIA_FILE_PROBLEM,
                "container has no media element",
            )
        })?;
        let unit = MediaUnit::new(
            chain,
            Arc::clone(&self.container),
            media,
            self.icon_factory.clone(),
            options.clone(),
        );
        Ok(Arc::new(unit))
    }
}
