use serde_json::Value as JsonValue;

use rentworks_cart::{CartEvent, CartId, CartLine};
use rentworks_core::UserId;
use rentworks_events::EventEnvelope;

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadStore;

/// Queryable cart read model: current lines and running total per user cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartReadModel {
    pub cart_id: CartId,
    pub owner: UserId,
    pub lines: Vec<CartLine>,
    pub total: u64,
}

impl CartReadModel {
    fn recompute_total(&mut self) {
        self.total = self.lines.iter().map(|l| l.price).sum();
    }
}

/// Cart projection. The total mirrors the aggregate's invariant: always the
/// sum of the current line prices.
#[derive(Debug)]
pub struct CartsProjection<S>
where
    S: ReadStore<CartId, CartReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CartsProjection<S>
where
    S: ReadStore<CartId, CartReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, cart_id: &CartId) -> Option<CartReadModel> {
        self.store.get(cart_id)
    }

    /// The cart for a user, if one has been opened.
    pub fn for_user(&self, user: UserId) -> Option<CartReadModel> {
        self.get(&CartId::for_user(user))
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

        let event: CartEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let cart_id = match &event {
            CartEvent::CartOpened(e) => e.cart_id,
            CartEvent::LineAdded(e) => e.cart_id,
            CartEvent::LineUpdated(e) => e.cart_id,
            CartEvent::LineRemoved(e) => e.cart_id,
            CartEvent::CartCheckedOut(e) => e.cart_id,
        };
        if cart_id.0 != aggregate_id {
            return Err(ProjectionError::Mismatch(
                "event cart_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            CartEvent::CartOpened(e) => {
                self.store.upsert(
                    e.cart_id,
                    CartReadModel {
                        cart_id: e.cart_id,
                        owner: e.owner,
                        lines: Vec::new(),
                        total: 0,
                    },
                );
            }
            CartEvent::LineAdded(e) => {
                if let Some(mut rm) = self.store.get(&e.cart_id) {
                    rm.lines.push(e.line);
                    rm.recompute_total();
                    self.store.upsert(e.cart_id, rm);
                }
            }
            CartEvent::LineUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.cart_id) {
                    if let Some(line) = rm.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                        line.quantity = e.quantity;
                        line.duration = e.duration;
                        line.price = e.price;
                    }
                    rm.recompute_total();
                    self.store.upsert(e.cart_id, rm);
                }
            }
            CartEvent::LineRemoved(e) => {
                if let Some(mut rm) = self.store.get(&e.cart_id) {
                    rm.lines.retain(|l| l.line_id != e.line_id);
                    rm.recompute_total();
                    self.store.upsert(e.cart_id, rm);
                }
            }
            CartEvent::CartCheckedOut(e) => {
                if let Some(mut rm) = self.store.get(&e.cart_id) {
                    rm.lines.clear();
                    rm.total = 0;
                    self.store.upsert(e.cart_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }
}
