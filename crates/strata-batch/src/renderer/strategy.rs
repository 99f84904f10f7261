use std::fmt;
use std::str::FromStr;

use crate::backend::Capabilities;
use crate::coords::Rect;

/// Which batching path a renderer uses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Strategy {
    /// Vertex-rate instancing over a shared quad template.
    HardwareInstanced,
    /// Baked template of `UNIFORM_BATCH_INSTANCES` quads fed by uniform arrays.
    UniformArray,
    /// Full geometry per primitive, no batching hardware required.
    Immediate,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::HardwareInstanced,
        Strategy::UniformArray,
        Strategy::Immediate,
    ];

    /// Best strategy `caps` can run.
    pub fn select(caps: &Capabilities) -> Self {
        if caps.instancing {
            Strategy::HardwareInstanced
        } else if caps.uniform_arrays {
            Strategy::UniformArray
        } else {
            Strategy::Immediate
        }
    }

    pub fn supported_by(self, caps: &Capabilities) -> bool {
        match self {
            Strategy::HardwareInstanced => caps.instancing,
            Strategy::UniformArray => caps.uniform_arrays,
            Strategy::Immediate => true,
        }
    }

    pub fn default_policy(self) -> StateChangePolicy {
        match self {
            Strategy::UniformArray => StateChangePolicy::FlushOnAnyChange,
            Strategy::HardwareInstanced | Strategy::Immediate => StateChangePolicy::FlushOnPipelineChange,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Strategy::HardwareInstanced => "instanced",
            Strategy::UniformArray => "uniform",
            Strategy::Immediate => "immediate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy `{0}` (expected instanced, uniform or immediate)")]
pub struct ParseStrategyError(String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instanced" | "hardware-instanced" => Ok(Strategy::HardwareInstanced),
            "uniform" | "uniform-array" => Ok(Strategy::UniformArray),
            "immediate" => Ok(Strategy::Immediate),
            _ => Err(ParseStrategyError(s.to_owned())),
        }
    }
}

/// When a primitive-state change must flush the open batch.
///
/// A clip change always flushes a non-empty batch: the scissor is per
/// submission on every backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StateChangePolicy {
    /// Any difference in [`PrimitiveState`] flushes.
    FlushOnAnyChange,
    /// Only clip changes flush; line width is baked into geometry.
    FlushOnPipelineChange,
}

impl StateChangePolicy {
    /// Whether moving from `current` to `next` requires a flush first.
    pub fn requires_flush(self, current: &PrimitiveState, next: &PrimitiveState) -> bool {
        if current.clip != next.clip {
            return true;
        }
        match self {
            StateChangePolicy::FlushOnAnyChange => current != next,
            StateChangePolicy::FlushOnPipelineChange => false,
        }
    }
}

/// Per-primitive render state producers can change mid-session.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PrimitiveState {
    /// Stroke width in logical pixels for line producers.
    pub line_width: f32,
    /// Logical-pixel clip; `None` disables clipping.
    pub clip: Option<Rect>,
}

impl PrimitiveState {
    #[must_use]
    pub fn with_line_width(self, line_width: f32) -> Self {
        Self { line_width, ..self }
    }

    #[must_use]
    pub fn with_clip(self, clip: Option<Rect>) -> Self {
        Self { clip, ..self }
    }
}

impl Default for PrimitiveState {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            clip: None,
        }
    }
}

/// Lifecycle phase of a renderer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BatchPhase {
    Idle,
    Begun,
    /// Inside a flush (driver calls in progress).
    Flushing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_names() {
        assert_eq!("instanced".parse(), Ok(Strategy::HardwareInstanced));
        assert_eq!(" Uniform ".parse(), Ok(Strategy::UniformArray));
        assert_eq!("immediate".parse(), Ok(Strategy::Immediate));
        assert!("gpu".parse::<Strategy>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for s in Strategy::ALL {
            assert_eq!(s.to_string().parse(), Ok(s));
        }
    }

    #[test]
    fn pipeline_policy_ignores_line_width() {
        let a = PrimitiveState::default();
        let b = a.with_line_width(3.0);
        assert!(!StateChangePolicy::FlushOnPipelineChange.requires_flush(&a, &b));
        assert!(StateChangePolicy::FlushOnAnyChange.requires_flush(&a, &b));
    }

    #[test]
    fn clip_change_flushes_under_every_policy() {
        let a = PrimitiveState::default();
        let b = a.with_clip(Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(StateChangePolicy::FlushOnPipelineChange.requires_flush(&a, &b));
        assert!(StateChangePolicy::FlushOnAnyChange.requires_flush(&a, &b));
    }

    #[test]
    fn default_policy_per_strategy() {
        assert_eq!(Strategy::UniformArray.default_policy(), StateChangePolicy::FlushOnAnyChange);
        assert_eq!(Strategy::Immediate.default_policy(), StateChangePolicy::FlushOnPipelineChange);
    }
}
