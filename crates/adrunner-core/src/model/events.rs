//! Public tracking vocabulary emitted by playback units.

use serde::{Deserialize, Serialize};

/// Closed set of normalized tracking event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackingEventKind {
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    Pause,
    Resume,
    Mute,
    Unmute,
    Skip,
    Impression,
    ClickThrough,
    CreativeView,
    Error,
    PlayerExpand,
    PlayerCollapse,
    IconClick,
    IconView,
    CloseLinear,
    AcceptInvitation,
    AdCollapse,
    /// Creative-reported duration or remaining-time change.
    AdProgress,
    /// A declared progress offset was reached.
    Progress,
    Fullscreen,
    ExitFullscreen,
    VolumeChanged,
}

impl TrackingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingEventKind::Start => "start",
            TrackingEventKind::FirstQuartile => "firstQuartile",
            TrackingEventKind::Midpoint => "midpoint",
            TrackingEventKind::ThirdQuartile => "thirdQuartile",
            TrackingEventKind::Complete => "complete",
            TrackingEventKind::Pause => "pause",
            TrackingEventKind::Resume => "resume",
            TrackingEventKind::Mute => "mute",
            TrackingEventKind::Unmute => "unmute",
            TrackingEventKind::Skip => "skip",
            TrackingEventKind::Impression => "impression",
            TrackingEventKind::ClickThrough => "clickThrough",
            TrackingEventKind::CreativeView => "creativeView",
            TrackingEventKind::Error => "error",
            TrackingEventKind::PlayerExpand => "playerExpand",
            TrackingEventKind::PlayerCollapse => "playerCollapse",
            TrackingEventKind::IconClick => "iconClick",
            TrackingEventKind::IconView => "iconView",
            TrackingEventKind::CloseLinear => "closeLinear",
            TrackingEventKind::AcceptInvitation => "acceptInvitation",
            TrackingEventKind::AdCollapse => "adCollapse",
            TrackingEventKind::AdProgress => "adProgress",
            TrackingEventKind::Progress => "progress",
            TrackingEventKind::Fullscreen => "fullscreen",
            TrackingEventKind::ExitFullscreen => "exitFullscreen",
            TrackingEventKind::VolumeChanged => "volumeChanged",
        }
    }
}

impl std::fmt::Display for TrackingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub kind: TrackingEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TrackingEvent {
    pub fn new(kind: TrackingEventKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    pub fn with_payload(kind: TrackingEventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload: Some(payload),
        }
    }
}

impl From<TrackingEventKind> for TrackingEvent {
    fn from(kind: TrackingEventKind) -> Self {
        Self::new(kind)
    }
}
