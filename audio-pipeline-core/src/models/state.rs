use std::fmt;

/// Pipeline graph lifecycle.
///
/// State transitions:
/// ```text
/// constructed → linked → running → draining → stopped
///      │           │                              ▲
///      └───────────┴──────────────────────────────┘
/// ```
/// `Stopped` is terminal: a graph is never restarted, the next capture
/// session builds a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Constructed,
    Linked,
    Running,
    Draining,
    Stopped,
}

impl PipelineState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Draining)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether the sink buffer exists and may be read.
    pub fn has_links(&self) -> bool {
        matches!(self, Self::Linked | Self::Running | Self::Draining)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Constructed, Linked)
                | (Linked, Running)
                | (Running, Draining)
                | (Constructed | Linked | Running | Draining, Stopped)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Constructed => "constructed",
            Self::Linked => "linked",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
