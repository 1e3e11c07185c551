//! Pivot ladder levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of an alertable level.
///
/// The pivot is split into two one-shot pseudo levels so that crossing it
/// alerts at most once in each direction per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelName {
    #[serde(rename = "R3")]
    R3,
    #[serde(rename = "R2")]
    R2,
    #[serde(rename = "R1")]
    R1,
    /// Pivot reclaimed from below
    #[serde(rename = "P_UP")]
    PivotUp,
    #[serde(rename = "S1")]
    S1,
    #[serde(rename = "S2")]
    S2,
    #[serde(rename = "S3")]
    S3,
    /// Pivot lost from above
    #[serde(rename = "P_DOWN")]
    PivotDown,
}

impl LevelName {
    /// Evaluation order of the crossing detector, first match wins.
    pub const PRIORITY: [LevelName; 8] = [
        LevelName::R3,
        LevelName::R2,
        LevelName::R1,
        LevelName::PivotUp,
        LevelName::S1,
        LevelName::S2,
        LevelName::S3,
        LevelName::PivotDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelName::R3 => "R3",
            LevelName::R2 => "R2",
            LevelName::R1 => "R1",
            LevelName::PivotUp => "P_UP",
            LevelName::S1 => "S1",
            LevelName::S2 => "S2",
            LevelName::S3 => "S3",
            LevelName::PivotDown => "P_DOWN",
        }
    }

    /// Direction price must move through the level to breach it.
    pub fn direction(&self) -> BreachDirection {
        match self {
            LevelName::R3 | LevelName::R2 | LevelName::R1 | LevelName::PivotUp => {
                BreachDirection::Up
            }
            LevelName::S1 | LevelName::S2 | LevelName::S3 | LevelName::PivotDown => {
                BreachDirection::Down
            }
        }
    }

    pub fn is_pivot(&self) -> bool {
        matches!(self, LevelName::PivotUp | LevelName::PivotDown)
    }

    /// Price of this level in a ladder.
    pub fn price_in(&self, ladder: &PivotLadder) -> f64 {
        match self {
            LevelName::R3 => ladder.r3,
            LevelName::R2 => ladder.r2,
            LevelName::R1 => ladder.r1,
            LevelName::PivotUp | LevelName::PivotDown => ladder.p,
            LevelName::S1 => ladder.s1,
            LevelName::S2 => ladder.s2,
            LevelName::S3 => ladder.s3,
        }
    }

    /// Ladder levels further out in the breach direction, nearest first.
    pub fn beyond(&self) -> &'static [LevelName] {
        match self {
            LevelName::PivotUp => &[LevelName::R1, LevelName::R2, LevelName::R3],
            LevelName::R1 => &[LevelName::R2, LevelName::R3],
            LevelName::R2 => &[LevelName::R3],
            LevelName::R3 => &[],
            LevelName::PivotDown => &[LevelName::S1, LevelName::S2, LevelName::S3],
            LevelName::S1 => &[LevelName::S2, LevelName::S3],
            LevelName::S2 => &[LevelName::S3],
            LevelName::S3 => &[],
        }
    }
}

impl fmt::Display for LevelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown level name: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for LevelName {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R3" => Ok(LevelName::R3),
            "R2" => Ok(LevelName::R2),
            "R1" => Ok(LevelName::R1),
            "P_UP" => Ok(LevelName::PivotUp),
            "S1" => Ok(LevelName::S1),
            "S2" => Ok(LevelName::S2),
            "S3" => Ok(LevelName::S3),
            "P_DOWN" => Ok(LevelName::PivotDown),
            other => Err(UnknownLevel(other.to_string())),
        }
    }
}

/// Direction of a level breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreachDirection {
    Up,
    Down,
}

/// Seven-point pivot ladder derived from one closed candle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PivotLadder {
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "R1")]
    pub r1: f64,
    #[serde(rename = "R2")]
    pub r2: f64,
    #[serde(rename = "R3")]
    pub r3: f64,
    #[serde(rename = "S1")]
    pub s1: f64,
    #[serde(rename = "S2")]
    pub s2: f64,
    #[serde(rename = "S3")]
    pub s3: f64,
    /// Close time of the originating candle, identifies the session
    #[serde(default)]
    pub close_time: i64,
}

impl PivotLadder {
    /// Whether all levels are finite and R3 >= R2 >= R1 >= P >= S1 >= S2 >= S3.
    pub fn is_ordered(&self) -> bool {
        let levels = [self.r3, self.r2, self.r1, self.p, self.s1, self.s2, self.s3];
        levels.iter().all(|v| v.is_finite()) && levels.windows(2).all(|w| w[0] >= w[1])
    }
}
