//! `rentworks-pricing` — pure pricing engine.
//!
//! Turns (rate table, duration unit, duration value) into a line price. No
//! IO, no side effects, deterministic.
//!
//! A line price is `rate[unit] * duration_value`. Quantity is tracked on the
//! line for stock reservation but is **not** multiplied into the price; that
//! matches the billing behavior the rest of the system is built around.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use rentworks_core::{DomainError, DomainResult, ValueObject};

/// Billing granularity used to select a rate from an item's rate table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Day,
    Week,
    Month,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Day => "day",
            DurationUnit::Week => "week",
            DurationUnit::Month => "month",
        }
    }
}

impl FromStr for DurationUnit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(DurationUnit::Day),
            "week" => Ok(DurationUnit::Week),
            "month" => Ok(DurationUnit::Month),
            other => Err(DomainError::validation(format!(
                "unknown duration unit '{other}' (expected day, week or month)"
            ))),
        }
    }
}

impl core::fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-day/per-week/per-month rates for a rentable item.
///
/// Amounts are in the smallest currency unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub per_day: u64,
    pub per_week: u64,
    pub per_month: u64,
}

impl RateTable {
    pub fn new(per_day: u64, per_week: u64, per_month: u64) -> Self {
        Self {
            per_day,
            per_week,
            per_month,
        }
    }

    /// Select the rate for a billing granularity.
    pub fn rate_for(&self, unit: DurationUnit) -> u64 {
        match unit {
            DurationUnit::Day => self.per_day,
            DurationUnit::Week => self.per_week,
            DurationUnit::Month => self.per_month,
        }
    }
}

impl ValueObject for RateTable {}

/// Rental duration: billing unit plus a positive multiplier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalDuration {
    pub unit: DurationUnit,
    pub value: u32,
}

impl RentalDuration {
    pub fn new(unit: DurationUnit, value: u32) -> Self {
        Self { unit, value }
    }
}

impl ValueObject for RentalDuration {}

/// Price one line: `rate[unit] * duration_value`.
///
/// Fails with a validation error when the duration value is zero, and with an
/// invariant error on arithmetic overflow (rates are caller-supplied).
pub fn line_price(rates: &RateTable, duration: RentalDuration) -> DomainResult<u64> {
    if duration.value == 0 {
        return Err(DomainError::validation("duration value must be positive"));
    }

    rates
        .rate_for(duration.unit)
        .checked_mul(u64::from(duration.value))
        .ok_or_else(|| DomainError::invariant("line price overflows u64"))
}
