use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use rentworks_catalog::{
    AdjustStock, Equipment, EquipmentCommand, EquipmentId, EquipmentPackage, PackageCommand,
    PackageId, RegisterEquipment, RegisterPackage, UpdateRates,
};
use rentworks_core::AggregateId;
use rentworks_events::{EventBus, EventEnvelope};
use rentworks_pricing::RateTable;

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

use super::{EQUIPMENT_AGGREGATE, PACKAGE_AGGREGATE};

/// Catalog administration: equipment and package registration, rate and
/// stock changes (operator paths).
pub struct CatalogService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for CatalogService<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> CatalogService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn register_equipment(
        &self,
        name: String,
        category: String,
        rates: RateTable,
        initial_stock: i64,
    ) -> Result<EquipmentId, DispatchError> {
        let equipment_id = EquipmentId::new(AggregateId::new());
        self.dispatcher.dispatch::<Equipment>(
            equipment_id.0,
            EQUIPMENT_AGGREGATE,
            EquipmentCommand::RegisterEquipment(RegisterEquipment {
                equipment_id,
                name,
                category,
                rates,
                initial_stock,
                occurred_at: Utc::now(),
            }),
            |id| Equipment::empty(EquipmentId::new(id)),
        )?;
        Ok(equipment_id)
    }

    pub fn update_rates(
        &self,
        equipment_id: EquipmentId,
        rates: RateTable,
    ) -> Result<(), DispatchError> {
        self.dispatcher.dispatch::<Equipment>(
            equipment_id.0,
            EQUIPMENT_AGGREGATE,
            EquipmentCommand::UpdateRates(UpdateRates {
                equipment_id,
                rates,
                occurred_at: Utc::now(),
            }),
            |id| Equipment::empty(EquipmentId::new(id)),
        )?;
        Ok(())
    }

    /// Manual stock correction (operator restock or shrinkage).
    pub fn adjust_stock(&self, equipment_id: EquipmentId, delta: i64) -> Result<(), DispatchError> {
        self.dispatcher.dispatch::<Equipment>(
            equipment_id.0,
            EQUIPMENT_AGGREGATE,
            EquipmentCommand::AdjustStock(AdjustStock {
                equipment_id,
                delta,
                occurred_at: Utc::now(),
            }),
            |id| Equipment::empty(EquipmentId::new(id)),
        )?;
        Ok(())
    }

    pub fn register_package(
        &self,
        name: String,
        rates: RateTable,
        equipment: Vec<EquipmentId>,
    ) -> Result<PackageId, DispatchError> {
        let package_id = PackageId::new(AggregateId::new());
        self.dispatcher.dispatch::<EquipmentPackage>(
            package_id.0,
            PACKAGE_AGGREGATE,
            PackageCommand::RegisterPackage(RegisterPackage {
                package_id,
                name,
                rates,
                equipment,
                occurred_at: Utc::now(),
            }),
            |id| EquipmentPackage::empty(PackageId::new(id)),
        )?;
        Ok(package_id)
    }
}
