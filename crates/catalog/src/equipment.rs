use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use rentworks_events::Event;
use rentworks_pricing::RateTable;

/// Equipment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentId(pub AggregateId);

impl EquipmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: a single rentable equipment unit with finite stock.
///
/// `stock` mutates only through `AdjustStock`; the non-negative invariant is
/// checked in `handle` before any event is emitted, so a rejected decrement
/// leaves the stream (and therefore stock) untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    id: EquipmentId,
    name: String,
    category: String,
    rates: RateTable,
    stock: i64,
    version: u64,
    created: bool,
}

impl Equipment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: EquipmentId) -> Self {
        Self {
            id,
            name: String::new(),
            category: String::new(),
            rates: RateTable::new(0, 0, 0),
            stock: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> EquipmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn rates(&self) -> RateTable {
        self.rates
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }
}

impl AggregateRoot for Equipment {
    type Id = EquipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterEquipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEquipment {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: String,
    pub rates: RateTable,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRates {
    pub equipment_id: EquipmentId,
    pub rates: RateTable,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (negative delta reserves, positive releases).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub equipment_id: EquipmentId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentCommand {
    RegisterEquipment(RegisterEquipment),
    UpdateRates(UpdateRates),
    AdjustStock(AdjustStock),
}

/// Event: EquipmentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRegistered {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: String,
    pub rates: RateTable,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RatesUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatesUpdated {
    pub equipment_id: EquipmentId,
    pub rates: RateTable,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub equipment_id: EquipmentId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentEvent {
    EquipmentRegistered(EquipmentRegistered),
    RatesUpdated(RatesUpdated),
    StockAdjusted(StockAdjusted),
}

impl Event for EquipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EquipmentEvent::EquipmentRegistered(_) => "catalog.equipment.registered",
            EquipmentEvent::RatesUpdated(_) => "catalog.equipment.rates_updated",
            EquipmentEvent::StockAdjusted(_) => "catalog.equipment.stock_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EquipmentEvent::EquipmentRegistered(e) => e.occurred_at,
            EquipmentEvent::RatesUpdated(e) => e.occurred_at,
            EquipmentEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Equipment {
    type Command = EquipmentCommand;
    type Event = EquipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EquipmentEvent::EquipmentRegistered(e) => {
                self.id = e.equipment_id;
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.rates = e.rates;
                self.stock = e.initial_stock;
                self.created = true;
            }
            EquipmentEvent::RatesUpdated(e) => {
                self.rates = e.rates;
            }
            EquipmentEvent::StockAdjusted(e) => {
                // Committed deltas passed the overflow check in handle;
                // saturate rather than wrap on a corrupted stream.
                self.stock = self.stock.saturating_add(e.delta);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EquipmentCommand::RegisterEquipment(cmd) => self.handle_register(cmd),
            EquipmentCommand::UpdateRates(cmd) => self.handle_update_rates(cmd),
            EquipmentCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl Equipment {
    fn ensure_equipment_id(&self, equipment_id: EquipmentId) -> Result<(), DomainError> {
        if self.id != equipment_id {
            return Err(DomainError::invariant("equipment_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterEquipment) -> Result<Vec<EquipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("equipment already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }

        Ok(vec![EquipmentEvent::EquipmentRegistered(
            EquipmentRegistered {
                equipment_id: cmd.equipment_id,
                name: cmd.name.clone(),
                category: cmd.category.clone(),
                rates: cmd.rates,
                initial_stock: cmd.initial_stock,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_update_rates(&self, cmd: &UpdateRates) -> Result<Vec<EquipmentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_equipment_id(cmd.equipment_id)?;

        Ok(vec![EquipmentEvent::RatesUpdated(RatesUpdated {
            equipment_id: cmd.equipment_id,
            rates: cmd.rates,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<EquipmentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_equipment_id(cmd.equipment_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_stock = self
            .stock
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("stock adjustment overflows"))?;
        if new_stock < 0 {
            return Err(DomainError::InsufficientStock {
                equipment: *cmd.equipment_id.0.as_uuid(),
                requested: -cmd.delta,
                available: self.stock,
            });
        }

        Ok(vec![EquipmentEvent::StockAdjusted(StockAdjusted {
            equipment_id: cmd.equipment_id,
            delta: cmd.delta,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentworks_events::execute;

    fn test_equipment_id() -> EquipmentId {
        EquipmentId::new(AggregateId::new())
    }

    fn test_rates() -> RateTable {
        RateTable::new(100_000, 550_000, 1_900_000)
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(stock: i64) -> Equipment {
        let id = test_equipment_id();
        let mut eq = Equipment::empty(id);
        execute(
            &mut eq,
            &EquipmentCommand::RegisterEquipment(RegisterEquipment {
                equipment_id: id,
                name: "Excavator".to_string(),
                category: "heavy".to_string(),
                rates: test_rates(),
                initial_stock: stock,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        eq
    }

    #[test]
    fn register_sets_rates_and_stock() {
        let eq = registered(5);
        assert_eq!(eq.stock(), 5);
        assert_eq!(eq.rates(), test_rates());
        assert_eq!(eq.version(), 1);
    }

    #[test]
    fn register_rejects_negative_initial_stock() {
        let id = test_equipment_id();
        let eq = Equipment::empty(id);
        let err = eq
            .handle(&EquipmentCommand::RegisterEquipment(RegisterEquipment {
                equipment_id: id,
                name: "Excavator".to_string(),
                category: "heavy".to_string(),
                rates: test_rates(),
                initial_stock: -1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn adjust_stock_applies_delta() {
        let mut eq = registered(5);
        let id = eq.id_typed();
        execute(
            &mut eq,
            &EquipmentCommand::AdjustStock(AdjustStock {
                equipment_id: id,
                delta: -3,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(eq.stock(), 2);
    }

    #[test]
    fn over_reservation_is_rejected_and_stock_unchanged() {
        let eq = registered(2);
        let id = eq.id_typed();
        let err = eq
            .handle(&EquipmentCommand::AdjustStock(AdjustStock {
                equipment_id: id,
                delta: -3,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        match err {
            DomainError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // handle is pure; the rejected decrement left state untouched.
        assert_eq!(eq.stock(), 2);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let eq = registered(2);
        let id = eq.id_typed();
        let err = eq
            .handle(&EquipmentCommand::AdjustStock(AdjustStock {
                equipment_id: id,
                delta: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn overflowing_adjustment_is_rejected() {
        let eq = registered(1);
        let id = eq.id_typed();
        let err = eq
            .handle(&EquipmentCommand::AdjustStock(AdjustStock {
                equipment_id: id,
                delta: i64::MAX,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(eq.stock(), 1);
    }

    #[test]
    fn adjust_before_register_is_not_found() {
        let id = test_equipment_id();
        let eq = Equipment::empty(id);
        let err = eq
            .handle(&EquipmentCommand::AdjustStock(AdjustStock {
                equipment_id: id,
                delta: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: stock never goes negative under any delta sequence;
            /// rejected adjustments leave stock unchanged.
            #[test]
            fn stock_never_negative(
                initial in 0i64..100,
                deltas in proptest::collection::vec(-50i64..50, 1..20),
            ) {
                let mut eq = registered(initial);
                let id = eq.id_typed();

                for delta in deltas {
                    if delta == 0 {
                        continue;
                    }
                    let before = eq.stock();
                    let cmd = EquipmentCommand::AdjustStock(AdjustStock {
                        equipment_id: id,
                        delta,
                        occurred_at: test_time(),
                    });
                    match execute(&mut eq, &cmd) {
                        Ok(_) => prop_assert_eq!(eq.stock(), before + delta),
                        Err(_) => prop_assert_eq!(eq.stock(), before),
                    }
                    prop_assert!(eq.stock() >= 0);
                }
            }
        }
    }
}
