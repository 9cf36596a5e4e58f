//! Dice specifications used by scaling deltas.
//!
//! A [`DiceSpec`] is a pool of identical dice (`2d6`). Rolling and modifier
//! arithmetic belong to the host; this crate only scales and records pools.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Standard polyhedral die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A pool of identical dice, e.g. `2d6`.
///
/// Deserializing rejects zero-faced dice the same way [`DiceSpec::parse`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DiceFields")]
pub struct DiceSpec {
    pub count: u32,
    pub faces: u32,
}

#[derive(Deserialize)]
struct DiceFields {
    count: u32,
    faces: u32,
}

impl TryFrom<DiceFields> for DiceSpec {
    type Error = DiceError;

    fn try_from(fields: DiceFields) -> Result<Self, Self::Error> {
        if fields.faces == 0 {
            return Err(DiceError::InvalidDieSize(fields.faces));
        }
        Ok(Self {
            count: fields.count,
            faces: fields.faces,
        })
    }
}

impl DiceSpec {
    pub fn new(count: u32, faces: u32) -> Self {
        Self { count, faces }
    }

    /// Parse `NdF` notation. A missing count means one die (`d8`).
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let d_pos = notation
            .find('d')
            .ok_or_else(|| DiceError::InvalidNotation(notation.clone()))?;
        let count_str = &notation[..d_pos];
        let faces_str = &notation[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(notation.clone()))?
        };
        let faces: u32 = faces_str
            .parse()
            .map_err(|_| DiceError::InvalidNotation(notation.clone()))?;

        if faces == 0 {
            return Err(DiceError::InvalidDieSize(faces));
        }

        Ok(Self { count, faces })
    }

    /// The standard die type, if the face count is one.
    pub fn die_type(&self) -> Option<DieType> {
        DieType::from_sides(self.faces)
    }

    /// Multiply the pool size, saturating at `u32::MAX`.
    pub fn times(&self, factor: u32) -> Self {
        Self {
            count: self.count.saturating_mul(factor),
            faces: self.faces,
        }
    }

    pub fn max_total(&self) -> u64 {
        u64::from(self.count) * u64::from(self.faces)
    }
}

impl fmt::Display for DiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.faces)
    }
}

impl FromStr for DiceSpec {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
