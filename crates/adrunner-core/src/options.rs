//! Run configuration.
//!
//! All option structs deserialize with defaults so a run can be configured
//! from a partial JSON object.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wrapper depth used when `wrapper_limit` is not set.
pub const DEFAULT_WRAPPER_LIMIT: usize = 5;

/// Options for [`crate::ChainResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Overall budget for the resolution (milliseconds).
    pub timeout_ms: Option<u64>,
    /// Maximum number of hops before failing with 304.
    pub wrapper_limit: Option<usize>,
    /// Accept documents that return more than one ad.
    pub allow_multiple_ads: bool,
    /// Prefer buffet alternatives before advancing the pod sequence.
    pub use_ad_buffet: bool,
    /// Fall back to any unrequested ad once the pod is exhausted.
    pub fallback_on_no_ad: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            wrapper_limit: None,
            allow_multiple_ads: true,
            use_ad_buffet: false,
            fallback_on_no_ad: true,
        }
    }
}

impl ResolveOptions {
    pub fn wrapper_limit(&self) -> usize {
        self.wrapper_limit.unwrap_or(DEFAULT_WRAPPER_LIMIT)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Options for playback units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitOptions {
    /// Allow interactive (VPAID) creatives.
    pub vpaid_enabled: bool,
    /// Pause a playing ad when the player handles a click-through.
    pub pause_on_ad_click: bool,
    /// Bound for native acknowledgments (start, stop, init) in milliseconds.
    pub ack_timeout_ms: u64,
    /// Delay between icon redraws while layout work is pending.
    pub icon_redraw_interval_ms: u64,
    /// Version offered during the creative handshake.
    pub supported_vpaid_version: String,
}

impl Default for UnitOptions {
    fn default() -> Self {
        Self {
            vpaid_enabled: true,
            pause_on_ad_click: true,
            ack_timeout_ms: 5_000,
            icon_redraw_interval_ms: 500,
            supported_vpaid_version: "2.0".to_string(),
        }
    }
}

impl UnitOptions {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn icon_redraw_interval(&self) -> Duration {
        Duration::from_millis(self.icon_redraw_interval_ms)
    }
}

/// Options for [`crate::run_waterfall`]. `timeout_ms` is the shared budget
/// for the whole run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterfallOptions {
    #[serde(flatten)]
    pub resolve: ResolveOptions,
    #[serde(flatten)]
    pub unit: UnitOptions,
}
