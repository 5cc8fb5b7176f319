//! Direct machine commands requested by observers outside of a job

use serde::{Deserialize, Serialize};

/// Direction of an incremental jog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JogDirection {
    /// Towards positive coordinates.
    #[serde(rename = "+", alias = "pos", alias = "positive")]
    Positive,
    /// Towards negative coordinates.
    #[serde(rename = "-", alias = "neg", alias = "negative")]
    Negative,
}

impl JogDirection {
    /// Multiplier applied to the jog distance
    pub fn sign(self) -> f64 {
        match self {
            JogDirection::Positive => 1.0,
            JogDirection::Negative => -1.0,
        }
    }
}

impl std::fmt::Display for JogDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JogDirection::Positive => write!(f, "+"),
            JogDirection::Negative => write!(f, "-"),
        }
    }
}

/// Requested laser (spindle) output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserState {
    On,
    Off,
}

impl std::fmt::Display for LaserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaserState::On => write!(f, "on"),
            LaserState::Off => write!(f, "off"),
        }
    }
}
