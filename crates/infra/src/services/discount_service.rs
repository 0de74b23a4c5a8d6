use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::warn;

use rentworks_core::AggregateId;
use rentworks_discounts::{
    CreateDiscount, DisableDiscount, Discount, DiscountCommand, DiscountId, RecordRedemption,
};
use rentworks_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

use super::DISCOUNT_AGGREGATE;

/// Bounded retries for contended redemptions.
const MAX_ATTEMPTS: u32 = 5;

/// Discount administration and redemption.
pub struct DiscountService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for DiscountService<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> DiscountService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn create(
        &self,
        code: String,
        rate_percent: u8,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        max_usage: Option<u32>,
    ) -> Result<DiscountId, DispatchError> {
        let discount_id = DiscountId::new(AggregateId::new());
        self.dispatcher.dispatch::<Discount>(
            discount_id.0,
            DISCOUNT_AGGREGATE,
            DiscountCommand::CreateDiscount(CreateDiscount {
                discount_id,
                code,
                rate_percent,
                valid_from,
                valid_to,
                max_usage,
                occurred_at: Utc::now(),
            }),
            |id| Discount::empty(DiscountId::new(id)),
        )?;
        Ok(discount_id)
    }

    pub fn disable(&self, discount_id: DiscountId, reason: &str) -> Result<(), DispatchError> {
        self.dispatcher.dispatch::<Discount>(
            discount_id.0,
            DISCOUNT_AGGREGATE,
            DiscountCommand::DisableDiscount(DisableDiscount {
                discount_id,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }),
            |id| Discount::empty(DiscountId::new(id)),
        )?;
        Ok(())
    }

    /// Record one redemption against the usage cap.
    ///
    /// Redemptions contend on the same stream, so lost optimistic races are
    /// retried with fresh state; cap exhaustion is deterministic and final.
    pub fn redeem(&self, discount_id: DiscountId) -> Result<(), DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.dispatcher.dispatch::<Discount>(
                discount_id.0,
                DISCOUNT_AGGREGATE,
                DiscountCommand::RecordRedemption(RecordRedemption {
                    discount_id,
                    occurred_at: Utc::now(),
                }),
                |id| Discount::empty(DiscountId::new(id)),
            );

            match result {
                Ok(_) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(%discount_id, attempt, "redemption lost an optimistic race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
