use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use rentworks_discounts::{DiscountEvent, DiscountId};
use rentworks_events::EventEnvelope;

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadStore;

/// Queryable discount read model, consumed by the daily sweep and the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountReadModel {
    pub discount_id: DiscountId,
    pub code: String,
    pub rate_percent: u8,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub max_usage: Option<u32>,
    pub usage: u32,
    pub active: bool,
}

impl DiscountReadModel {
    pub fn remaining_uses(&self) -> Option<u32> {
        self.max_usage.map(|cap| cap.saturating_sub(self.usage))
    }
}

/// Discount projection.
#[derive(Debug)]
pub struct DiscountsProjection<S>
where
    S: ReadStore<DiscountId, DiscountReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> DiscountsProjection<S>
where
    S: ReadStore<DiscountId, DiscountReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, discount_id: &DiscountId) -> Option<DiscountReadModel> {
        self.store.get(discount_id)
    }

    pub fn list(&self) -> Vec<DiscountReadModel> {
        self.store.list()
    }

    pub fn list_active(&self) -> Vec<DiscountReadModel> {
        self.store.list().into_iter().filter(|d| d.active).collect()
    }

    /// Apply a published envelope (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Stale {
            return Ok(());
        }

        let event: DiscountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let discount_id = match &event {
            DiscountEvent::DiscountCreated(e) => e.discount_id,
            DiscountEvent::DiscountDisabled(e) => e.discount_id,
            DiscountEvent::DiscountRedeemed(e) => e.discount_id,
        };
        if discount_id.0 != aggregate_id {
            return Err(ProjectionError::Mismatch(
                "event discount_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            DiscountEvent::DiscountCreated(e) => {
                self.store.upsert(
                    e.discount_id,
                    DiscountReadModel {
                        discount_id: e.discount_id,
                        code: e.code,
                        rate_percent: e.rate_percent,
                        valid_from: e.valid_from,
                        valid_to: e.valid_to,
                        max_usage: e.max_usage,
                        usage: 0,
                        active: true,
                    },
                );
            }
            DiscountEvent::DiscountDisabled(e) => {
                if let Some(mut rm) = self.store.get(&e.discount_id) {
                    rm.active = false;
                    self.store.upsert(e.discount_id, rm);
                }
            }
            DiscountEvent::DiscountRedeemed(e) => {
                if let Some(mut rm) = self.store.get(&e.discount_id) {
                    rm.usage = e.usage;
                    self.store.upsert(e.discount_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }
}
