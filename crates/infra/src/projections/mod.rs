//! Read-model projections.
//!
//! Projections consume published envelopes and maintain disposable,
//! rebuildable read models. Delivery is at-least-once, so every projection
//! tracks a per-stream cursor and ignores replays at or below it.

pub mod carts;
pub mod catalog;
pub mod discounts;
pub mod rentals;

pub use carts::{CartReadModel, CartsProjection};
pub use catalog::{EquipmentProjection, EquipmentReadModel};
pub use discounts::{DiscountReadModel, DiscountsProjection};
pub use rentals::{RentalReadModel, RentalsProjection};

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use rentworks_core::AggregateId;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("envelope/event mismatch: {0}")]
    Mismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Outcome of a cursor check for an incoming envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    /// Duplicate or replay; safe to ignore.
    Stale,
    /// Next expected event; apply and advance.
    Fresh,
}

/// Per-stream cursors supporting idempotent, at-least-once projections.
///
/// The first event of a stream may carry any positive sequence number (to
/// allow partial replays after a rebuild); after that, strict `last + 1`
/// increments are required.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<CursorCheck, ProjectionError> {
        let cursors = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => return Ok(CursorCheck::Stale),
        };
        let last = *cursors.get(&aggregate_id).unwrap_or(&0);

        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(CursorCheck::Stale);
        }
        if last != 0 && sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }

        Ok(CursorCheck::Fresh)
    }

    pub fn advance(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(aggregate_id, sequence_number);
        }
    }

    pub fn reset(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}
