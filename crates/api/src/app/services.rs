//! Infrastructure wiring: event store, bus, dispatcher, projections, and the
//! background workers that keep them fed.
//!
//! Two backends share one wiring shape: the in-memory pair for dev/test and
//! Postgres for production (`USE_PERSISTENT_STORES=true` + `DATABASE_URL`).
//! The bus and read models stay in-memory in both modes; projections rebuild
//! from the store on restart.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use rentworks_cart::Cart;
use rentworks_catalog::{EquipmentId, ItemRef, PackageId};
use rentworks_core::UserId;
use rentworks_discounts::DiscountId;
use rentworks_events::{EventBus, EventEnvelope, InMemoryEventBus};
use rentworks_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use rentworks_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use rentworks_infra::projections::{
    DiscountReadModel, DiscountsProjection, EquipmentProjection, EquipmentReadModel,
    RentalReadModel, RentalsProjection,
};
use rentworks_infra::read_model::InMemoryReadStore;
use rentworks_infra::scheduler::{DiscountScheduler, DiscountSweep, SweepConfig};
use rentworks_infra::services::{
    CART_AGGREGATE, CartService, CatalogService, DISCOUNT_AGGREGATE, DiscountService,
    EQUIPMENT_AGGREGATE, RENTAL_AGGREGATE, RentalService,
};
use rentworks_infra::workers::{ProjectionWorker, WorkerHandle};
use rentworks_notify::RecordingGateway;
use rentworks_pricing::{RateTable, RentalDuration};
use rentworks_rentals::{Rental, RentalId};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

type EquipmentRm = Arc<InMemoryReadStore<EquipmentId, EquipmentReadModel>>;
type RentalRm = Arc<InMemoryReadStore<RentalId, RentalReadModel>>;
type DiscountRm = Arc<InMemoryReadStore<DiscountId, DiscountReadModel>>;

/// One backend's full wiring: services over a dispatcher plus the read side.
pub struct ServiceSet<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    catalog: CatalogService<S, B>,
    carts: CartService<S, B>,
    rentals: RentalService<S, B, RentalRm>,
    discounts: DiscountService<S, B>,
    equipment_projection: Arc<EquipmentProjection<EquipmentRm>>,
    rentals_projection: Arc<RentalsProjection<RentalRm>>,
    discounts_projection: Arc<DiscountsProjection<DiscountRm>>,
    // Dropping these handles stops the worker threads, so they live here.
    _workers: Vec<WorkerHandle>,
}

impl<S, B> ServiceSet<S, B>
where
    S: EventStore + Send + Sync + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + Clone + Send + Sync + 'static,
{
    fn build(store: S, bus: B) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus.clone()));

        let equipment_projection: Arc<EquipmentProjection<EquipmentRm>> = Arc::new(
            EquipmentProjection::new(Arc::new(InMemoryReadStore::new())),
        );
        let rentals_projection: Arc<RentalsProjection<RentalRm>> = Arc::new(
            RentalsProjection::new(Arc::new(InMemoryReadStore::new())),
        );
        let discounts_projection: Arc<DiscountsProjection<DiscountRm>> = Arc::new(
            DiscountsProjection::new(Arc::new(InMemoryReadStore::new())),
        );

        // Until a real provider is configured the recording gateway doubles
        // as the notification and mail transport.
        let gateway = Arc::new(RecordingGateway::new());

        let projection_worker = {
            let equipment = Arc::clone(&equipment_projection);
            let rentals = Arc::clone(&rentals_projection);
            let discounts = Arc::clone(&discounts_projection);
            ProjectionWorker::spawn(
                "projections",
                bus,
                move |env: EventEnvelope<JsonValue>| match env.aggregate_type() {
                    EQUIPMENT_AGGREGATE => equipment.apply_envelope(&env),
                    RENTAL_AGGREGATE => rentals.apply_envelope(&env),
                    DISCOUNT_AGGREGATE => discounts.apply_envelope(&env),
                    // Cart reads are served strongly consistent from the
                    // stream, so cart (and package) events need no projection.
                    CART_AGGREGATE => Ok(()),
                    _ => Ok(()),
                },
            )
        };

        let scheduler = DiscountScheduler::spawn(DiscountSweep::new(
            SweepConfig::default(),
            Arc::clone(&discounts_projection),
            DiscountService::new(Arc::clone(&dispatcher)),
            gateway.clone(),
            gateway.clone(),
        ));

        Self {
            catalog: CatalogService::new(Arc::clone(&dispatcher)),
            carts: CartService::new(Arc::clone(&dispatcher)),
            rentals: RentalService::new(
                Arc::clone(&dispatcher),
                Arc::clone(&rentals_projection),
                gateway,
            ),
            discounts: DiscountService::new(dispatcher),
            equipment_projection,
            rentals_projection,
            discounts_projection,
            _workers: vec![projection_worker, scheduler],
        }
    }
}

type InMemorySet = ServiceSet<Arc<InMemoryEventStore>, Bus>;
type PersistentSet = ServiceSet<Arc<PostgresEventStore>, Bus>;

pub enum AppServices {
    InMemory(InMemorySet),
    Persistent(PersistentSet),
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        return build_persistent_services().await;
    }

    build_in_memory_services()
}

fn build_in_memory_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    AppServices::InMemory(ServiceSet::build(store, bus))
}

async fn build_persistent_services() -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("failed to connect to Postgres");

    let store = Arc::new(PostgresEventStore::new(pool));
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    AppServices::Persistent(ServiceSet::build(store, bus))
}

macro_rules! with_set {
    ($self:ident, $set:ident => $body:expr) => {
        match $self {
            AppServices::InMemory($set) => $body,
            AppServices::Persistent($set) => $body,
        }
    };
}

impl AppServices {
    // --- catalog -----------------------------------------------------------

    pub fn register_equipment(
        &self,
        name: String,
        category: String,
        rates: RateTable,
        initial_stock: i64,
    ) -> Result<EquipmentId, DispatchError> {
        with_set!(self, s => s.catalog.register_equipment(name, category, rates, initial_stock))
    }

    pub fn update_rates(
        &self,
        equipment_id: EquipmentId,
        rates: RateTable,
    ) -> Result<(), DispatchError> {
        with_set!(self, s => s.catalog.update_rates(equipment_id, rates))
    }

    pub fn adjust_stock(&self, equipment_id: EquipmentId, delta: i64) -> Result<(), DispatchError> {
        with_set!(self, s => s.catalog.adjust_stock(equipment_id, delta))
    }

    pub fn register_package(
        &self,
        name: String,
        rates: RateTable,
        equipment: Vec<EquipmentId>,
    ) -> Result<PackageId, DispatchError> {
        with_set!(self, s => s.catalog.register_package(name, rates, equipment))
    }

    pub fn equipment_get(&self, equipment_id: &EquipmentId) -> Option<EquipmentReadModel> {
        with_set!(self, s => s.equipment_projection.get(equipment_id))
    }

    pub fn equipment_list(&self) -> Vec<EquipmentReadModel> {
        with_set!(self, s => s.equipment_projection.list())
    }

    // --- cart ---------------------------------------------------------------

    pub fn cart_get(&self, caller: UserId) -> Result<Cart, DispatchError> {
        with_set!(self, s => s.carts.get_cart(caller))
    }

    pub fn cart_add_line(
        &self,
        caller: UserId,
        item: ItemRef,
        quantity: u32,
        duration: RentalDuration,
    ) -> Result<Uuid, DispatchError> {
        with_set!(self, s => s.carts.add_line(caller, item, quantity, duration))
    }

    pub fn cart_update_line(
        &self,
        caller: UserId,
        line_id: Uuid,
        quantity: u32,
        duration: RentalDuration,
    ) -> Result<(), DispatchError> {
        with_set!(self, s => s.carts.update_line(caller, line_id, quantity, duration))
    }

    pub fn cart_remove_line(&self, caller: UserId, line_id: Uuid) -> Result<(), DispatchError> {
        with_set!(self, s => s.carts.remove_line(caller, line_id))
    }

    // --- rentals ------------------------------------------------------------

    pub fn rental_checkout(
        &self,
        caller: UserId,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        deposit: u64,
        address: String,
    ) -> Result<RentalId, DispatchError> {
        with_set!(self, s => s.rentals.checkout(caller, start_date, end_date, deposit, address))
    }

    pub fn rental_confirm(&self, rental_id: RentalId) -> Result<(), DispatchError> {
        with_set!(self, s => s.rentals.confirm(rental_id))
    }

    pub fn rental_cancel(&self, rental_id: RentalId) -> Result<(), DispatchError> {
        with_set!(self, s => s.rentals.cancel(rental_id))
    }

    pub fn rental_return(&self, rental_id: RentalId) -> Result<(), DispatchError> {
        with_set!(self, s => s.rentals.return_rental(rental_id))
    }

    pub fn rentals_clear_for_user(&self, caller: UserId) -> usize {
        with_set!(self, s => s.rentals.clear_all_for_user(caller))
    }

    /// Strongly consistent rental load (ownership checks on command paths).
    pub fn rental_load(&self, rental_id: RentalId) -> Result<Rental, DispatchError> {
        with_set!(self, s => s.rentals.get_rental(rental_id))
    }

    pub fn rental_read(&self, rental_id: &RentalId) -> Option<RentalReadModel> {
        with_set!(self, s => s.rentals_projection.get(rental_id))
    }

    pub fn rentals_list_for_user(&self, caller: UserId) -> Vec<RentalReadModel> {
        with_set!(self, s => s.rentals_projection.list_for_user(caller))
    }

    // --- discounts ----------------------------------------------------------

    pub fn discount_create(
        &self,
        code: String,
        rate_percent: u8,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        max_usage: Option<u32>,
    ) -> Result<DiscountId, DispatchError> {
        with_set!(self, s => s.discounts.create(code, rate_percent, valid_from, valid_to, max_usage))
    }

    pub fn discount_disable(
        &self,
        discount_id: DiscountId,
        reason: &str,
    ) -> Result<(), DispatchError> {
        with_set!(self, s => s.discounts.disable(discount_id, reason))
    }

    pub fn discount_redeem(&self, discount_id: DiscountId) -> Result<(), DispatchError> {
        with_set!(self, s => s.discounts.redeem(discount_id))
    }

    pub fn discount_get(&self, discount_id: &DiscountId) -> Option<DiscountReadModel> {
        with_set!(self, s => s.discounts_projection.get(discount_id))
    }

    pub fn discounts_list_active(&self) -> Vec<DiscountReadModel> {
        with_set!(self, s => s.discounts_projection.list_active())
    }
}
