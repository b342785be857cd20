//! adrunner core: video ad chain resolution, waterfall orchestration and
//! playback-unit lifecycle.
//!
//! - [`ChainResolver`] follows wrapper delegation from an ad tag down to an
//!   inline ad, recording one [`ChainLink`] per hop.
//! - [`PlaybackUnit`] drives one resolved ad (interactive creative or plain
//!   media) and normalizes its native events into [`TrackingEvent`]s.
//! - [`WaterfallOrchestrator`] retries resolution and playback under one
//!   shared deadline until an ad starts.
//!
//! Transport, parsing and rendering are collaborators behind traits in
//! [`source`] and [`unit::surface`]; [`fakes`] has in-memory versions.

pub mod error;
pub mod fakes;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod options;
pub mod requested;
pub mod resolver;
pub mod source;
pub mod telemetry;
pub mod unit;
pub mod waterfall;

pub use error::{AdError, AdRunError, ErrorCode, ParseError, Result, TransportError};
pub use model::{
    AdEntry, AdId, AdKind, AdReference, Chain, ChainLink, Icon, InlineAd, MediaFile, Offset,
    ParsedDocument, ProgressEvent, TrackingEvent, TrackingEventKind, VastDocument, WrapperAd,
};
pub use obs::RunSpan;
pub use options::{ResolveOptions, UnitOptions, WaterfallOptions, DEFAULT_WRAPPER_LIMIT};
pub use requested::RequestedAdSet;
pub use resolver::ChainResolver;
pub use source::{DocumentLoader, DocumentParser, JsonDocumentParser};
pub use telemetry::{init_tracing, try_init_tracing, LogFormat};
pub use unit::{
    ContainerSize, CreativeEvent, CreativeLoader, IconHooks, IconOverlay, IconOverlayFactory,
    InteractiveCreative, MediaElement, MediaEvent, MediaUnit, PlaybackState, PlaybackUnit,
    UnitEvent, UnitFactory, VideoAdContainer, VpaidUnit,
};
pub use waterfall::{
    run_waterfall, ErrorContext, WaterfallHandle, WaterfallHooks, WaterfallOrchestrator,
};

/// Crate version, kept in step with the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
