use serde_json::Value as JsonValue;

use rentworks_catalog::{EquipmentEvent, EquipmentId};
use rentworks_events::EventEnvelope;
use rentworks_pricing::RateTable;

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadStore;

/// Queryable catalog read model: one row per equipment unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentReadModel {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: String,
    pub rates: RateTable,
    pub stock: i64,
}

/// Equipment catalog projection (name, rates, current stock).
#[derive(Debug)]
pub struct EquipmentProjection<S>
where
    S: ReadStore<EquipmentId, EquipmentReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> EquipmentProjection<S>
where
    S: ReadStore<EquipmentId, EquipmentReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, equipment_id: &EquipmentId) -> Option<EquipmentReadModel> {
        self.store.get(equipment_id)
    }

    pub fn list(&self) -> Vec<EquipmentReadModel> {
        self.store.list()
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

        let event: EquipmentEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let equipment_id = match &event {
            EquipmentEvent::EquipmentRegistered(e) => e.equipment_id,
            EquipmentEvent::RatesUpdated(e) => e.equipment_id,
            EquipmentEvent::StockAdjusted(e) => e.equipment_id,
        };
        if equipment_id.0 != aggregate_id {
            return Err(ProjectionError::Mismatch(
                "event equipment_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            EquipmentEvent::EquipmentRegistered(e) => {
                self.store.upsert(
                    e.equipment_id,
                    EquipmentReadModel {
                        equipment_id: e.equipment_id,
                        name: e.name,
                        category: e.category,
                        rates: e.rates,
                        stock: e.initial_stock,
                    },
                );
            }
            EquipmentEvent::RatesUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.equipment_id) {
                    rm.rates = e.rates;
                    self.store.upsert(e.equipment_id, rm);
                }
            }
            EquipmentEvent::StockAdjusted(e) => {
                if let Some(mut rm) = self.store.get(&e.equipment_id) {
                    rm.stock += e.delta;
                    self.store.upsert(e.equipment_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.reset();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
