/// Per-voice continuity state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceRamp {
    /// Last combined voice-start value; the reference for smoothing.
    pub constant: f32,
    /// Last audio-rate value written for this voice.
    pub ramp: f32,
    /// Scalar to use when the voice has no dynamic buffer.
    pub output: f32,
    pub active: bool,
}

impl Default for VoiceRamp {
    fn default() -> Self {
        Self {
            constant: 1.0,
            ramp: 1.0,
            output: 1.0,
            active: false,
        }
    }
}

/// Where the last rendered voice's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceData {
    /// No dynamic values: read the constant instead.
    #[default]
    None,
    /// The voice region of the buffer.
    Voice,
    /// Read-only alias of the monophonic region.
    Mono,
}

/// State of the shared monophonic ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MonoRamp {
    pub ramp: f32,
    pub moved: bool,
    pub expanded: bool,
}

impl Default for MonoRamp {
    fn default() -> Self {
        Self {
            ramp: 1.0,
            moved: false,
            expanded: false,
        }
    }
}

/// Debug-only record of whether a region was expanded after it was
/// rendered. Compiles to nothing in release builds.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExpansionChecker {
    #[cfg(debug_assertions)]
    expanded: bool,
}

impl ExpansionChecker {
    #[inline]
    pub fn rendered(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.expanded = false;
        }
    }

    #[inline]
    pub fn expanded(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.expanded = true;
        }
    }

    /// Always true in release builds.
    #[inline]
    pub fn is_expanded(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.expanded
        }
        #[cfg(not(debug_assertions))]
        {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramps_start_neutral() {
        let voice = VoiceRamp::default();
        assert_eq!(voice.constant, 1.0);
        assert_eq!(voice.ramp, 1.0);
        assert!(!voice.active);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn checker_tracks_render_then_expand() {
        let mut checker = ExpansionChecker::default();
        checker.expanded();
        assert!(checker.is_expanded());

        checker.rendered();
        assert!(!checker.is_expanded());

        checker.expanded();
        assert!(checker.is_expanded());
    }
}
