//! VAST time offsets as used by `skipoffset` and progress tracking.

/// A point in the ad, either absolute or relative to its duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Offset {
    Seconds(f64),
    Percent(f64),
}

impl Offset {
    /// Parse `HH:MM:SS`, `HH:MM:SS.mmm` or `N%`. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(percent) = raw.strip_suffix('%') {
            let value: f64 = percent.trim().parse().ok()?;
            return (value.is_finite() && (0.0..=100.0).contains(&value))
                .then_some(Offset::Percent(value));
        }

        let mut parts = raw.split(':');
        let (hours, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let hours: u32 = hours.parse().ok()?;
        let minutes: u32 = minutes.parse().ok()?;
        let seconds: f64 = seconds.parse().ok()?;
        if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
            return None;
        }
        Some(Offset::Seconds(
            f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds,
        ))
    }

    /// Position in seconds. Percentages need a positive, finite `duration`.
    pub fn seconds(&self, duration: f64) -> Option<f64> {
        match *self {
            Offset::Seconds(seconds) => Some(seconds),
            Offset::Percent(percent) if duration.is_finite() && duration > 0.0 => {
                Some(duration * percent / 100.0)
            }
            Offset::Percent(_) => None,
        }
    }

    /// Whether `current_time` has reached this offset.
    pub fn reached(&self, current_time: f64, duration: f64) -> bool {
        self.seconds(duration)
            .is_some_and(|offset| current_time >= offset)
    }
}
