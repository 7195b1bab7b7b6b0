use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::{EffectState, Rgb};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoosterEffect {
    Grow,
    SpeedBoost { factor: f32, duration_ms: u64 },
    AdjustSpeed { factor: f32 },
}

impl BoosterEffect {
    pub fn apply(&self, effects: &EffectState) {
        match *self {
            BoosterEffect::Grow => effects.set_pending_growth(),
            BoosterEffect::SpeedBoost {
                factor,
                duration_ms,
            } => effects.boost_speed(factor, Duration::from_millis(duration_ms)),
            BoosterEffect::AdjustSpeed { factor } => effects.adjust_speed(factor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterKind {
    pub name: String,
    pub effect: BoosterEffect,
    pub sound: String,
    pub color: Rgb,
}

impl BoosterKind {
    pub fn new(
        name: impl Into<String>,
        effect: BoosterEffect,
        sound: impl Into<String>,
        color: Rgb,
    ) -> Self {
        Self {
            name: name.into(),
            effect,
            sound: sound.into(),
            color,
        }
    }

    pub fn growth() -> Self {
        Self::new("growth", BoosterEffect::Grow, "eat", Rgb::new(64, 200, 96))
    }

    pub fn speed() -> Self {
        Self::new(
            "speed",
            BoosterEffect::SpeedBoost {
                factor: 1.5,
                duration_ms: 5_000,
            },
            "boost",
            Rgb::new(240, 160, 32),
        )
    }

    pub fn default_set() -> Vec<Self> {
        vec![Self::growth(), Self::speed()]
    }
}
