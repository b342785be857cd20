//! Playback state machine.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Started,
    Playing,
    Paused,
    Finished,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Started => "started",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Finished => "finished",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, PlaybackState::Finished)
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// `Finished` is reachable from every state and left by none.
    pub fn can_transition(self, to: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, to) {
            (Finished, _) => false,
            (_, Finished) => true,
            (Idle, Loading) => true,
            (Loading, Started) => true,
            (Started, Playing) | (Started, Paused) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackState::*;
    use super::*;

    const ALL: [PlaybackState; 6] = [Idle, Loading, Started, Playing, Paused, Finished];

    #[test]
    fn test_finished_is_terminal_and_reachable() {
        for state in ALL {
            assert!(!Finished.can_transition(state));
            if state != Finished {
                assert!(state.can_transition(Finished), "{state} -> finished");
            }
        }
    }

    #[test]
    fn test_forward_path() {
        assert!(Idle.can_transition(Loading));
        assert!(Loading.can_transition(Started));
        assert!(Started.can_transition(Playing));
        assert!(Playing.can_transition(Paused));
        assert!(Paused.can_transition(Playing));
    }

    #[test]
    fn test_no_shortcuts_or_rewinds() {
        assert!(!Idle.can_transition(Started));
        assert!(!Loading.can_transition(Playing));
        assert!(!Playing.can_transition(Started));
        assert!(!Started.can_transition(Loading));
        assert!(!Idle.can_transition(Idle));
    }
}
