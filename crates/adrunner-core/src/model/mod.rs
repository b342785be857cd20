//! Data model: documents, ads, chains and tracking events.

pub mod ad;
pub mod chain;
pub mod events;
pub mod offset;

pub use ad::{
    AdEntry, AdId, AdKind, AdReference, Icon, InlineAd, MediaFile, ParsedDocument, ProgressEvent,
    VastDocument, WrapperAd,
};
pub use chain::{Chain, ChainLink};
pub use events::{TrackingEvent, TrackingEventKind};
pub use offset::Offset;
