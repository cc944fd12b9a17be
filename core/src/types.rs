//! Shared primitive types used across the entire game.

use serde::{Deserialize, Serialize};

/// Team identifier, assigned by the store on registration.
pub type TeamId = i64;

/// Quarter number, 1-based.
pub type QuarterId = u32;

/// Month within a quarter, 1-based.
pub type MonthId = u32;

/// Money in minor units (paise). 100 paise = 1 rupee.
pub type Paise = i64;

/// Volume in cubic metres.
pub type Volume = i64;

/// Stable customer key, e.g. "laddu".
pub type CustomerId = String;

/// A (quarter, month) position on the game calendar.
/// Ordering is chronological.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub quarter: QuarterId,
    pub month:   MonthId,
}

impl MonthKey {
    pub fn new(quarter: QuarterId, month: MonthId) -> Self {
        Self { quarter, month }
    }

    /// 1-based month count since the start of the game.
    pub fn global_index(&self, months_per_quarter: u32) -> u32 {
        (self.quarter.saturating_sub(1)) * months_per_quarter + self.month
    }

    /// Inverse of `global_index`. Returns None for index 0.
    pub fn from_global_index(index: u32, months_per_quarter: u32) -> Option<Self> {
        if index == 0 || months_per_quarter == 0 {
            return None;
        }
        let zero_based = index - 1;
        Some(Self {
            quarter: zero_based / months_per_quarter + 1,
            month:   zero_based % months_per_quarter + 1,
        })
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}-M{}", self.quarter, self.month)
    }
}

/// Integer division rounding halves away from zero.
/// All paise/volume rounding in the engine goes through here.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    assert!(denominator > 0, "denominator must be > 0");
    if numerator >= 0 {
        (numerator + denominator / 2) / denominator
    } else {
        -((-numerator + denominator / 2) / denominator)
    }
}
