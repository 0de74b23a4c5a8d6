use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use rentworks_core::UserId;
use rentworks_events::EventEnvelope;
use rentworks_rentals::{RentalEvent, RentalId, RentalLine, RentalStatus};

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadStore;

/// Queryable rental read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalReadModel {
    pub rental_id: RentalId,
    pub customer: UserId,
    pub lines: Vec<RentalLine>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total: u64,
    pub deposit: u64,
    pub address: String,
    pub status: RentalStatus,
}

/// Rental lifecycle projection.
#[derive(Debug)]
pub struct RentalsProjection<S>
where
    S: ReadStore<RentalId, RentalReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> RentalsProjection<S>
where
    S: ReadStore<RentalId, RentalReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, rental_id: &RentalId) -> Option<RentalReadModel> {
        self.store.get(rental_id)
    }

    pub fn list(&self) -> Vec<RentalReadModel> {
        self.store.list()
    }

    /// All rentals belonging to one customer.
    pub fn list_for_user(&self, user: UserId) -> Vec<RentalReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|r| r.customer == user)
            .collect()
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

        let event: RentalEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let rental_id = match &event {
            RentalEvent::RentalOpened(e) => e.rental_id,
            RentalEvent::RentalConfirmed(e) => e.rental_id,
            RentalEvent::RentalCanceled(e) => e.rental_id,
            RentalEvent::RentalReturned(e) => e.rental_id,
            RentalEvent::RentalVoided(e) => e.rental_id,
        };
        if rental_id.0 != aggregate_id {
            return Err(ProjectionError::Mismatch(
                "event rental_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            RentalEvent::RentalOpened(e) => {
                self.store.upsert(
                    e.rental_id,
                    RentalReadModel {
                        rental_id: e.rental_id,
                        customer: e.customer,
                        lines: e.lines,
                        start_date: e.start_date,
                        end_date: e.end_date,
                        total: e.total,
                        deposit: e.deposit,
                        address: e.address,
                        status: RentalStatus::Pending,
                    },
                );
            }
            RentalEvent::RentalConfirmed(e) => self.set_status(e.rental_id, RentalStatus::Confirmed),
            RentalEvent::RentalCanceled(e) => self.set_status(e.rental_id, RentalStatus::Canceled),
            RentalEvent::RentalReturned(e) => self.set_status(e.rental_id, RentalStatus::Completed),
            RentalEvent::RentalVoided(e) => self.set_status(e.rental_id, RentalStatus::Voided),
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn set_status(&self, rental_id: RentalId, status: RentalStatus) {
        if let Some(mut rm) = self.store.get(&rental_id) {
            rm.status = status;
            self.store.upsert(rental_id, rm);
        }
    }
}
