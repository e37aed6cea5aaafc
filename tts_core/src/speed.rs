use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::TtsError;

/// Speaking rate selectable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    VerySlow,
    Slow,
    Normal,
    Fast,
    VeryFast,
}

impl Speed {
    pub const ALL: [Speed; 5] = [
        Speed::VerySlow,
        Speed::Slow,
        Speed::Normal,
        Speed::Fast,
        Speed::VeryFast,
    ];

    /// Phoneme duration multiplier handed to the model.
    /// Values above 1.0 slow speech down.
    pub fn length_scale(self) -> f32 {
        match self {
            Speed::VerySlow => 1.5,
            Speed::Slow => 1.2,
            Speed::Normal => 1.0,
            Speed::Fast => 0.6,
            Speed::VeryFast => 0.4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Speed::VerySlow => "very_slow",
            Speed::Slow => "slow",
            Speed::Normal => "normal",
            Speed::Fast => "fast",
            Speed::VeryFast => "very_fast",
        }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed::Normal
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speed {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Speed::ALL
            .into_iter()
            .find(|speed| speed.as_str() == s)
            .ok_or_else(|| {
                TtsError::InvalidRequest(format!(
                    "Invalid speed '{}'. Must be one of: {}",
                    s,
                    Speed::ALL.map(Speed::as_str).join(", ")
                ))
            })
    }
}
