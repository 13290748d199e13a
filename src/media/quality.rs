//! Quality levels
//!
//! Each quality is an independent producer feed of the same camera. Qualities
//! are totally ordered; stepping past either end is a `QualityRangeError`.

use std::fmt;
use std::str::FromStr;

use crate::error::QualityRangeError;

/// Encoding tier of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Quality {
    Low = 0,
    High = 1,
}

impl Quality {
    /// All qualities, lowest first
    pub const ALL: [Quality; 2] = [Quality::Low, Quality::High];

    pub const fn lowest() -> Self {
        Quality::Low
    }

    pub const fn highest() -> Self {
        Quality::High
    }

    /// Map a wire quality index to a quality
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Quality::Low),
            1 => Some(Quality::High),
            _ => None,
        }
    }

    /// Wire quality index
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Next quality up
    pub fn next(self) -> Result<Self, QualityRangeError> {
        match self {
            Quality::Low => Ok(Quality::High),
            Quality::High => Err(QualityRangeError::AboveHighest),
        }
    }

    /// Next quality down
    pub fn prev(self) -> Result<Self, QualityRangeError> {
        match self {
            Quality::High => Ok(Quality::Low),
            Quality::Low => Err(QualityRangeError::BelowLowest),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "high" => Ok(Quality::High),
            other => Err(format!("no quality named '{}'", other)),
        }
    }
}
