/// Position of the pipeline within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Idle,
    Cleared,
    GeometryDone,
    SsaoDone,
    ShadowDone,
    LightingDone,
    Composited,
}

/// Optional stages active for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFeatures {
    pub ssao: bool,
    pub shadows: bool,
}

impl FrameState {
    /// The only legal successor of `self` given the frame's features.
    pub fn expected_next(self, features: FrameFeatures) -> FrameState {
        match self {
            FrameState::Idle => FrameState::Cleared,
            FrameState::Cleared => FrameState::GeometryDone,
            FrameState::GeometryDone if features.ssao => FrameState::SsaoDone,
            FrameState::GeometryDone | FrameState::SsaoDone if features.shadows => {
                FrameState::ShadowDone
            }
            FrameState::GeometryDone | FrameState::SsaoDone | FrameState::ShadowDone => {
                FrameState::LightingDone
            }
            FrameState::LightingDone => FrameState::Composited,
            FrameState::Composited => FrameState::Idle,
        }
    }

    /// Stages of a complete frame after `Idle`, in order.
    pub fn sequence(features: FrameFeatures) -> Vec<FrameState> {
        let mut states = Vec::with_capacity(6);
        let mut state = FrameState::Idle.expected_next(features);
        while state != FrameState::Idle {
            states.push(state);
            state = state.expected_next(features);
        }
        states
    }
}

/// Tracks the frame state and rejects out-of-order stages.
#[derive(Debug)]
pub struct FrameStateMachine {
    state: FrameState,
    features: FrameFeatures,
}

impl Default for FrameStateMachine {
    fn default() -> Self {
        Self {
            state: FrameState::Idle,
            features: FrameFeatures::default(),
        }
    }
}

impl FrameStateMachine {
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Starts a frame. Must be called from `Idle`.
    pub fn begin(&mut self, features: FrameFeatures) {
        self.features = features;
        self.advance(FrameState::Cleared);
    }

    /// Moves to `next`. Out-of-order transitions are programming errors:
    /// they panic in debug builds and are logged in release builds.
    pub fn advance(&mut self, next: FrameState) {
        let expected = self.state.expected_next(self.features);
        debug_assert_eq!(
            next, expected,
            "illegal frame transition {:?} -> {:?}",
            self.state, next
        );
        if next != expected {
            log::error!(
                "Illegal frame transition {:?} -> {:?} (expected {:?})",
                self.state,
                next,
                expected
            );
        }
        self.state = next;
    }
}

/// Work recorded for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub individual_draws: u32,
    pub instanced_draws: u32,
    pub instances_populated: u32,
    pub shadow_draws: u32,
    pub light_volume_draws: u32,
    pub fullscreen_passes: u32,
    pub ssao_passes: u32,
    pub blur_passes: u32,
}

impl FrameStats {
    pub fn geometry_draws(&self) -> u32 {
        self.individual_draws + self.instanced_draws
    }
}
