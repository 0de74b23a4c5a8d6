use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::warn;

use rentworks_catalog::{AdjustStock, Equipment, EquipmentCommand, EquipmentId};
use rentworks_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

use super::EQUIPMENT_AGGREGATE;

/// Bounded retries for contended stock adjustments.
const MAX_ATTEMPTS: u32 = 5;

/// Stock reservation/release over the equipment streams.
///
/// Each adjustment is an optimistic append: load stock, decide, append with
/// the loaded version expected. A concurrent committer fails the append and
/// the attempt is retried with fresh state, so two racing reservations can
/// never both consume the last unit. Insufficient stock is a deterministic
/// rejection and is never retried.
pub struct ReservationCoordinator<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for ReservationCoordinator<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> ReservationCoordinator<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Reserve `quantity` units of one equipment item.
    pub fn reserve(&self, equipment_id: EquipmentId, quantity: u32) -> Result<(), DispatchError> {
        self.adjust(equipment_id, -i64::from(quantity))
    }

    /// Release `quantity` units of one equipment item.
    pub fn release(&self, equipment_id: EquipmentId, quantity: u32) -> Result<(), DispatchError> {
        self.adjust(equipment_id, i64::from(quantity))
    }

    /// Reserve every line or nothing.
    ///
    /// On a failed line, previously reserved lines are released again before
    /// the error is returned. Compensation failures are logged and leave
    /// stock under-counted until an operator corrects it with a manual
    /// stock adjustment.
    pub fn reserve_all(&self, lines: &[(EquipmentId, u32)]) -> Result<(), DispatchError> {
        let mut reserved: Vec<(EquipmentId, u32)> = Vec::with_capacity(lines.len());

        for &(equipment_id, quantity) in lines {
            if let Err(err) = self.reserve(equipment_id, quantity) {
                for &(done_id, done_qty) in reserved.iter().rev() {
                    if let Err(comp_err) = self.release(done_id, done_qty) {
                        warn!(
                            equipment_id = %done_id,
                            quantity = done_qty,
                            error = ?comp_err,
                            "failed to release stock while compensating a partial reservation"
                        );
                    }
                }
                return Err(err);
            }
            reserved.push((equipment_id, quantity));
        }

        Ok(())
    }

    /// Release every line, logging (not propagating) individual failures.
    pub fn release_all(&self, lines: &[(EquipmentId, u32)]) {
        for &(equipment_id, quantity) in lines {
            if let Err(err) = self.release(equipment_id, quantity) {
                warn!(
                    equipment_id = %equipment_id,
                    quantity,
                    error = ?err,
                    "failed to release reserved stock"
                );
            }
        }
    }

    fn adjust(&self, equipment_id: EquipmentId, delta: i64) -> Result<(), DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.dispatcher.dispatch::<Equipment>(
                equipment_id.0,
                EQUIPMENT_AGGREGATE,
                EquipmentCommand::AdjustStock(AdjustStock {
                    equipment_id,
                    delta,
                    occurred_at: Utc::now(),
                }),
                |id| Equipment::empty(EquipmentId::new(id)),
            );

            match result {
                Ok(_) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        equipment_id = %equipment_id,
                        delta,
                        attempt,
                        "stock adjustment lost an optimistic race, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}
