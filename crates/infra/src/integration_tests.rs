//! End-to-end tests over the in-memory store/bus pair.

use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value as JsonValue;

use rentworks_cart::CartId;
use rentworks_catalog::{Equipment, EquipmentId, ItemRef};
use rentworks_core::{AggregateId, ExpectedVersion, UserId};
use rentworks_discounts::DiscountId;
use rentworks_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use rentworks_notify::RecordingGateway;
use rentworks_pricing::{DurationUnit, RateTable, RentalDuration};
use rentworks_rentals::{RentalId, RentalStatus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
};
use crate::projections::{
    CartReadModel, CartsProjection, DiscountReadModel, DiscountsProjection, RentalReadModel,
    RentalsProjection,
};
use crate::read_model::InMemoryReadStore;
use crate::scheduler::{DiscountSweep, SweepConfig, SweepStats};
use crate::services::{
    CartService, CatalogService, DiscountService, RentalService, ReservationCoordinator,
};

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Store, Bus>;

struct TestEnv {
    dispatcher: Arc<Dispatcher>,
    catalog: CatalogService<Store, Bus>,
    carts: CartService<Store, Bus>,
    rentals: RentalService<Store, Bus, InMemoryReadStore<RentalId, RentalReadModel>>,
    rentals_projection: Arc<RentalsProjection<InMemoryReadStore<RentalId, RentalReadModel>>>,
    gateway: Arc<RecordingGateway>,
    subscription: Subscription<EventEnvelope<JsonValue>>,
}

impl TestEnv {
    fn new() -> Self {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

        let rentals_projection = Arc::new(RentalsProjection::new(InMemoryReadStore::new()));
        let gateway = Arc::new(RecordingGateway::new());

        Self {
            catalog: CatalogService::new(Arc::clone(&dispatcher)),
            carts: CartService::new(Arc::clone(&dispatcher)),
            rentals: RentalService::new(
                Arc::clone(&dispatcher),
                Arc::clone(&rentals_projection),
                gateway.clone(),
            ),
            dispatcher,
            rentals_projection,
            gateway,
            subscription,
        }
    }

    /// Drain published envelopes into the rentals projection.
    fn pump_rentals(&self) {
        while let Ok(envelope) = self.subscription.try_recv() {
            if envelope.aggregate_type() == "rental" {
                self.rentals_projection.apply_envelope(&envelope).unwrap();
            }
        }
    }

    fn register_equipment(&self, name: &str, stock: i64) -> EquipmentId {
        self.catalog
            .register_equipment(
                name.to_string(),
                "heavy".to_string(),
                RateTable::new(100_000, 550_000, 1_900_000),
                stock,
            )
            .unwrap()
    }

    fn equipment_stock(&self, equipment_id: EquipmentId) -> i64 {
        self.dispatcher
            .load::<Equipment>(equipment_id.0, |id| Equipment::empty(EquipmentId::new(id)))
            .unwrap()
            .stock()
    }

    fn checkout_one(&self, user: UserId, equipment_id: EquipmentId, quantity: u32) -> RentalId {
        self.carts
            .add_line(
                user,
                ItemRef::Equipment(equipment_id),
                quantity,
                RentalDuration::new(DurationUnit::Day, 3),
            )
            .unwrap();

        let now = Utc::now();
        self.rentals
            .checkout(
                user,
                now,
                now + ChronoDuration::days(3),
                50_000,
                "12 Dockside Rd".to_string(),
            )
            .unwrap()
    }
}

#[test]
fn checkout_snapshots_cart_into_pending_rental() {
    let env = TestEnv::new();
    let user = UserId::new();
    let excavator = env.register_equipment("Excavator", 5);
    let mixer = env.register_equipment("Mixer", 2);

    env.carts
        .add_line(
            user,
            ItemRef::Equipment(excavator),
            1,
            RentalDuration::new(DurationUnit::Day, 3),
        )
        .unwrap();
    env.carts
        .add_line(
            user,
            ItemRef::Equipment(mixer),
            2,
            RentalDuration::new(DurationUnit::Week, 1),
        )
        .unwrap();

    // day rate 100_000 * 3 + week rate 550_000 * 1
    let cart = env.carts.get_cart(user).unwrap();
    assert_eq!(cart.total(), 850_000);

    let now = Utc::now();
    let rental_id = env
        .rentals
        .checkout(
            user,
            now,
            now + ChronoDuration::days(3),
            100_000,
            "12 Dockside Rd".to_string(),
        )
        .unwrap();

    let rental = env.rentals.get_rental(rental_id).unwrap();
    assert_eq!(rental.status(), RentalStatus::Pending);
    assert_eq!(rental.total(), 850_000);
    assert_eq!(rental.lines().len(), 2);
    assert_eq!(rental.customer(), Some(user));

    // The cart was emptied and no stock moved yet.
    assert_eq!(env.carts.get_cart(user).unwrap().total(), 0);
    assert_eq!(env.equipment_stock(excavator), 5);
    assert_eq!(env.equipment_stock(mixer), 2);

    // Post-commit notification went out.
    assert!(!env.gateway.user_messages().is_empty());
}

#[test]
fn checkout_with_empty_cart_is_rejected() {
    let env = TestEnv::new();
    let user = UserId::new();
    let now = Utc::now();

    let err = env
        .rentals
        .checkout(user, now, now, 0, String::new())
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}

#[test]
fn confirm_reserves_stock_and_prevents_oversell() {
    let env = TestEnv::new();
    let equipment = env.register_equipment("Excavator", 2);

    let first = env.checkout_one(UserId::new(), equipment, 2);
    let second = env.checkout_one(UserId::new(), equipment, 2);

    env.rentals.confirm(first).unwrap();
    assert_eq!(env.equipment_stock(equipment), 0);

    let err = env.rentals.confirm(second).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InsufficientStock {
            requested: 2,
            available: 0,
            ..
        }
    ));

    // The loser stays pending and stock is unchanged.
    let rental = env.rentals.get_rental(second).unwrap();
    assert_eq!(rental.status(), RentalStatus::Pending);
    assert_eq!(env.equipment_stock(equipment), 0);
}

#[test]
fn failed_multi_line_confirm_releases_partial_reservations() {
    let env = TestEnv::new();
    let user = UserId::new();
    let plentiful = env.register_equipment("Excavator", 5);
    let depleted = env.register_equipment("Crane", 0);

    env.carts
        .add_line(
            user,
            ItemRef::Equipment(plentiful),
            2,
            RentalDuration::new(DurationUnit::Day, 1),
        )
        .unwrap();
    env.carts
        .add_line(
            user,
            ItemRef::Equipment(depleted),
            1,
            RentalDuration::new(DurationUnit::Day, 1),
        )
        .unwrap();

    let now = Utc::now();
    let rental_id = env
        .rentals
        .checkout(user, now, now + ChronoDuration::days(1), 0, "x".to_string())
        .unwrap();

    let err = env.rentals.confirm(rental_id).unwrap_err();
    assert!(matches!(err, DispatchError::InsufficientStock { .. }));

    // The partial reservation on the first line was compensated.
    assert_eq!(env.equipment_stock(plentiful), 5);
    assert_eq!(env.equipment_stock(depleted), 0);
    assert_eq!(
        env.rentals.get_rental(rental_id).unwrap().status(),
        RentalStatus::Pending
    );
}

#[test]
fn concurrent_reservations_never_exceed_stock() {
    let env = TestEnv::new();
    let equipment = env.register_equipment("Excavator", 3);
    let coordinator = ReservationCoordinator::new(Arc::clone(&env.dispatcher));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            thread::spawn(move || coordinator.reserve(equipment, 1).is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ok| ok)
        .count();

    assert_eq!(successes, 3);
    assert_eq!(env.equipment_stock(equipment), 0);
}

#[test]
fn return_completes_rental_and_releases_stock() {
    let env = TestEnv::new();
    let equipment = env.register_equipment("Excavator", 2);
    let rental_id = env.checkout_one(UserId::new(), equipment, 2);

    env.rentals.confirm(rental_id).unwrap();
    assert_eq!(env.equipment_stock(equipment), 0);

    env.rentals.return_rental(rental_id).unwrap();
    assert_eq!(
        env.rentals.get_rental(rental_id).unwrap().status(),
        RentalStatus::Completed
    );
    assert_eq!(env.equipment_stock(equipment), 2);

    // A completed rental cannot be returned twice.
    let err = env.rentals.return_rental(rental_id).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition(_)));
}

#[test]
fn cancel_is_only_allowed_while_pending() {
    let env = TestEnv::new();
    let equipment = env.register_equipment("Excavator", 2);

    let pending = env.checkout_one(UserId::new(), equipment, 1);
    env.rentals.cancel(pending).unwrap();
    assert_eq!(
        env.rentals.get_rental(pending).unwrap().status(),
        RentalStatus::Canceled
    );

    let confirmed = env.checkout_one(UserId::new(), equipment, 1);
    env.rentals.confirm(confirmed).unwrap();
    let err = env.rentals.cancel(confirmed).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition(_)));
}

#[test]
fn bulk_clear_voids_open_rentals_and_releases_confirmed_stock() {
    let env = TestEnv::new();
    let user = UserId::new();
    let equipment = env.register_equipment("Excavator", 3);

    let confirmed = env.checkout_one(user, equipment, 2);
    env.rentals.confirm(confirmed).unwrap();
    let pending = env.checkout_one(user, equipment, 1);

    // A stranger's rental must be untouched by this user's clear.
    let other = env.checkout_one(UserId::new(), equipment, 1);

    env.pump_rentals();
    let voided = env.rentals.clear_all_for_user(user);
    assert_eq!(voided, 2);

    assert_eq!(
        env.rentals.get_rental(confirmed).unwrap().status(),
        RentalStatus::Voided
    );
    assert_eq!(
        env.rentals.get_rental(pending).unwrap().status(),
        RentalStatus::Voided
    );
    assert_eq!(
        env.rentals.get_rental(other).unwrap().status(),
        RentalStatus::Pending
    );

    // Stock held by the confirmed rental was released.
    assert_eq!(env.equipment_stock(equipment), 3);
}

/// Store wrapper that rejects appends to one chosen stream.
struct OutageStore {
    inner: InMemoryEventStore,
    deny: Mutex<Option<AggregateId>>,
}

impl OutageStore {
    fn new() -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            deny: Mutex::new(None),
        }
    }

    fn deny_appends_to(&self, aggregate_id: AggregateId) {
        *self.deny.lock().unwrap() = Some(aggregate_id);
    }

    fn clear_outage(&self) {
        *self.deny.lock().unwrap() = None;
    }
}

impl EventStore for OutageStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if let Some(denied) = *self.deny.lock().unwrap()
            && events.first().is_some_and(|e| e.aggregate_id == denied)
        {
            return Err(EventStoreError::InvalidAppend("injected outage".to_string()));
        }
        self.inner.append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(aggregate_id)
    }
}

#[test]
fn failed_void_during_bulk_clear_keeps_stock_reserved() {
    let store = Arc::new(OutageStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&store), bus));

    let rentals_projection = Arc::new(RentalsProjection::new(InMemoryReadStore::new()));
    let catalog = CatalogService::new(Arc::clone(&dispatcher));
    let carts = CartService::new(Arc::clone(&dispatcher));
    let rentals = RentalService::new(
        Arc::clone(&dispatcher),
        Arc::clone(&rentals_projection),
        Arc::new(RecordingGateway::new()),
    );

    let stock_of = |equipment_id: EquipmentId| {
        dispatcher
            .load::<Equipment>(equipment_id.0, |id| Equipment::empty(EquipmentId::new(id)))
            .unwrap()
            .stock()
    };

    let user = UserId::new();
    let equipment = catalog
        .register_equipment(
            "Excavator".to_string(),
            "heavy".to_string(),
            RateTable::new(100_000, 550_000, 1_900_000),
            2,
        )
        .unwrap();

    carts
        .add_line(
            user,
            ItemRef::Equipment(equipment),
            2,
            RentalDuration::new(DurationUnit::Day, 3),
        )
        .unwrap();
    let now = Utc::now();
    let rental_id = rentals
        .checkout(user, now, now + ChronoDuration::days(3), 0, "x".to_string())
        .unwrap();
    rentals.confirm(rental_id).unwrap();
    assert_eq!(stock_of(equipment), 0);

    while let Ok(envelope) = subscription.try_recv() {
        if envelope.aggregate_type() == "rental" {
            rentals_projection.apply_envelope(&envelope).unwrap();
        }
    }

    // The void cannot commit; the reservation must survive untouched or a
    // later return/retry would release the same units twice.
    store.deny_appends_to(rental_id.0);
    assert_eq!(rentals.clear_all_for_user(user), 0);
    assert_eq!(stock_of(equipment), 0);
    assert_eq!(
        rentals.get_rental(rental_id).unwrap().status(),
        RentalStatus::Confirmed
    );

    // Once the stream accepts appends again, the retried clear voids the
    // rental and releases exactly one reservation's worth of stock.
    store.clear_outage();
    assert_eq!(rentals.clear_all_for_user(user), 1);
    assert_eq!(stock_of(equipment), 2);
    assert_eq!(
        rentals.get_rental(rental_id).unwrap().status(),
        RentalStatus::Voided
    );
}

#[test]
fn discount_sweep_expires_warns_and_announces() {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();
    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

    let service = DiscountService::new(Arc::clone(&dispatcher));
    let projection: Arc<DiscountsProjection<InMemoryReadStore<DiscountId, DiscountReadModel>>> =
        Arc::new(DiscountsProjection::new(InMemoryReadStore::new()));
    let gateway = Arc::new(RecordingGateway::new());

    let now = Utc::now();
    let expired = service
        .create(
            "LASTWEEK".to_string(),
            10,
            now - ChronoDuration::days(10),
            now - ChronoDuration::days(1),
            None,
        )
        .unwrap();
    let nearly_spent = service
        .create(
            "ALMOSTGONE".to_string(),
            15,
            now - ChronoDuration::days(1),
            now + ChronoDuration::days(7),
            Some(3),
        )
        .unwrap();
    service
        .create(
            "TOMORROW".to_string(),
            20,
            now + ChronoDuration::hours(2),
            now + ChronoDuration::days(7),
            None,
        )
        .unwrap();

    let pump = || {
        while let Ok(envelope) = subscription.try_recv() {
            projection.apply_envelope(&envelope).unwrap();
        }
    };
    pump();

    let sweep = DiscountSweep::new(
        SweepConfig {
            interval: std::time::Duration::from_secs(60),
            warning_threshold: 5,
            upcoming_notice: ChronoDuration::hours(24),
        },
        Arc::clone(&projection),
        service,
        gateway.clone(),
        gateway.clone(),
    );

    let stats = sweep.run_once(now);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.notices, 1);

    pump();
    assert!(!projection.get(&expired).unwrap().active);
    assert!(projection.get(&nearly_spent).unwrap().active);

    let admin_messages = gateway.admin_messages();
    assert_eq!(admin_messages.len(), 1);
    assert!(admin_messages[0].contains("ALMOSTGONE"));

    let emails = gateway.emails();
    assert_eq!(emails.len(), 1);
    assert!(emails[0].contains("TOMORROW"));

    // A second pass repeats nothing: the expired discount is gone from the
    // active set, warning and notice fired once.
    let stats = sweep.run_once(now);
    assert_eq!(stats, SweepStats::default());
}

#[test]
fn cart_projection_follows_line_edits_and_checkout() {
    let env = TestEnv::new();
    let user = UserId::new();
    let excavator = env.register_equipment("Excavator", 5);
    let mixer = env.register_equipment("Mixer", 2);

    let projection: Arc<CartsProjection<InMemoryReadStore<CartId, CartReadModel>>> =
        Arc::new(CartsProjection::new(InMemoryReadStore::new()));
    let pump = || {
        while let Ok(envelope) = env.subscription.try_recv() {
            if envelope.aggregate_type() == "cart" {
                projection.apply_envelope(&envelope).unwrap();
            }
        }
    };

    let kept = env
        .carts
        .add_line(
            user,
            ItemRef::Equipment(excavator),
            1,
            RentalDuration::new(DurationUnit::Day, 3),
        )
        .unwrap();
    let dropped = env
        .carts
        .add_line(
            user,
            ItemRef::Equipment(mixer),
            1,
            RentalDuration::new(DurationUnit::Week, 1),
        )
        .unwrap();
    pump();

    let view = projection.for_user(user).unwrap();
    assert_eq!(view.lines.len(), 2);
    assert_eq!(view.total, 850_000);

    // Repricing on update and removal both flow through to the view.
    env.carts
        .update_line(user, kept, 2, RentalDuration::new(DurationUnit::Week, 1))
        .unwrap();
    env.carts.remove_line(user, dropped).unwrap();
    pump();

    let view = projection.for_user(user).unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.total, 550_000);

    let now = Utc::now();
    env.rentals
        .checkout(
            user,
            now,
            now + ChronoDuration::days(7),
            0,
            "12 Dockside Rd".to_string(),
        )
        .unwrap();
    pump();

    let view = projection.for_user(user).unwrap();
    assert!(view.lines.is_empty());
    assert_eq!(view.total, 0);
}

#[test]
fn projection_replays_are_idempotent() {
    let env = TestEnv::new();
    let equipment = env.register_equipment("Excavator", 1);
    let rental_id = env.checkout_one(UserId::new(), equipment, 1);

    let envelopes: Vec<_> = {
        let mut all = Vec::new();
        while let Ok(envelope) = env.subscription.try_recv() {
            if envelope.aggregate_type() == "rental" {
                all.push(envelope);
            }
        }
        all
    };
    assert!(!envelopes.is_empty());

    for envelope in &envelopes {
        env.rentals_projection.apply_envelope(envelope).unwrap();
    }
    let first = env.rentals_projection.get(&rental_id).unwrap();

    // Redelivery must not change the read model.
    for envelope in &envelopes {
        env.rentals_projection.apply_envelope(envelope).unwrap();
    }
    assert_eq!(env.rentals_projection.get(&rental_id), Some(first));
}
