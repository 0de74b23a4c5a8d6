use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentworks_catalog::{EquipmentId, ItemRef};
use rentworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use rentworks_events::Event;
use rentworks_pricing::RentalDuration;

/// Rental identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(pub AggregateId);

impl RentalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RentalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Rental lifecycle status.
///
/// `Completed` is reached only through the explicit return transition, which
/// is also the stock-release path. `Voided` is the bulk-clear terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Pending,
    Confirmed,
    Canceled,
    Completed,
    Voided,
}

impl RentalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RentalStatus::Canceled | RentalStatus::Completed | RentalStatus::Voided
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Pending => "pending",
            RentalStatus::Confirmed => "confirmed",
            RentalStatus::Canceled => "canceled",
            RentalStatus::Completed => "completed",
            RentalStatus::Voided => "voided",
        }
    }
}

/// Immutable line snapshot: item, quantity, duration, price at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalLine {
    pub item: ItemRef,
    pub quantity: u32,
    pub duration: RentalDuration,
    pub price: u64,
}

/// Aggregate root: a rental order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rental {
    id: RentalId,
    customer: Option<UserId>,
    lines: Vec<RentalLine>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    total: u64,
    deposit: u64,
    address: String,
    status: RentalStatus,
    version: u64,
    created: bool,
}

impl Rental {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RentalId) -> Self {
        Self {
            id,
            customer: None,
            lines: Vec::new(),
            start_date: DateTime::<Utc>::MIN_UTC,
            end_date: DateTime::<Utc>::MIN_UTC,
            total: 0,
            deposit: 0,
            address: String::new(),
            status: RentalStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RentalId {
        self.id
    }

    pub fn customer(&self) -> Option<UserId> {
        self.customer
    }

    pub fn status(&self) -> RentalStatus {
        self.status
    }

    pub fn lines(&self) -> &[RentalLine] {
        &self.lines
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn deposit(&self) -> u64 {
        self.deposit
    }

    pub fn period(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_date, self.end_date)
    }

    /// Equipment lines with their reserved quantities.
    ///
    /// Package lines never touch stock (availability is not derived from
    /// constituents), so they are absent here.
    pub fn equipment_lines(&self) -> Vec<(EquipmentId, u32)> {
        self.lines
            .iter()
            .filter_map(|l| l.item.equipment_id().map(|id| (id, l.quantity)))
            .collect()
    }
}

impl AggregateRoot for Rental {
    type Id = RentalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRental (checkout path; lines are already priced upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRental {
    pub rental_id: RentalId,
    pub customer: UserId,
    pub lines: Vec<RentalLine>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total: u64,
    pub deposit: u64,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmRental (operator action; reservation happens upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRental {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRental (pending only; nothing was reserved yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRental {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnRental (confirmed only; the stock-release transition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRental {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidRental (bulk-clear path, owner-scoped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidRental {
    pub rental_id: RentalId,
    pub caller: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalCommand {
    OpenRental(OpenRental),
    ConfirmRental(ConfirmRental),
    CancelRental(CancelRental),
    ReturnRental(ReturnRental),
    VoidRental(VoidRental),
}

/// Event: RentalOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalOpened {
    pub rental_id: RentalId,
    pub customer: UserId,
    pub lines: Vec<RentalLine>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total: u64,
    pub deposit: u64,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalConfirmed {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalCanceled {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalReturned {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalVoided {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalEvent {
    RentalOpened(RentalOpened),
    RentalConfirmed(RentalConfirmed),
    RentalCanceled(RentalCanceled),
    RentalReturned(RentalReturned),
    RentalVoided(RentalVoided),
}

impl Event for RentalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RentalEvent::RentalOpened(_) => "rental.opened",
            RentalEvent::RentalConfirmed(_) => "rental.confirmed",
            RentalEvent::RentalCanceled(_) => "rental.canceled",
            RentalEvent::RentalReturned(_) => "rental.returned",
            RentalEvent::RentalVoided(_) => "rental.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RentalEvent::RentalOpened(e) => e.occurred_at,
            RentalEvent::RentalConfirmed(e) => e.occurred_at,
            RentalEvent::RentalCanceled(e) => e.occurred_at,
            RentalEvent::RentalReturned(e) => e.occurred_at,
            RentalEvent::RentalVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Rental {
    type Command = RentalCommand;
    type Event = RentalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RentalEvent::RentalOpened(e) => {
                self.id = e.rental_id;
                self.customer = Some(e.customer);
                self.lines = e.lines.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.total = e.total;
                self.deposit = e.deposit;
                self.address = e.address.clone();
                self.status = RentalStatus::Pending;
                self.created = true;
            }
            RentalEvent::RentalConfirmed(_) => {
                self.status = RentalStatus::Confirmed;
            }
            RentalEvent::RentalCanceled(_) => {
                self.status = RentalStatus::Canceled;
            }
            RentalEvent::RentalReturned(_) => {
                self.status = RentalStatus::Completed;
            }
            RentalEvent::RentalVoided(_) => {
                self.status = RentalStatus::Voided;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RentalCommand::OpenRental(cmd) => self.handle_open(cmd),
            RentalCommand::ConfirmRental(cmd) => self.handle_confirm(cmd),
            RentalCommand::CancelRental(cmd) => self.handle_cancel(cmd),
            RentalCommand::ReturnRental(cmd) => self.handle_return(cmd),
            RentalCommand::VoidRental(cmd) => self.handle_void(cmd),
        }
    }
}

impl Rental {
    fn ensure_status(&self, expected: RentalStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a rental in status '{}'",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenRental) -> Result<Vec<RentalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("rental already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("rental must have at least one line"));
        }
        if cmd.lines.iter().any(|l| l.quantity == 0) {
            return Err(DomainError::validation("line quantity must be positive"));
        }
        if cmd.end_date < cmd.start_date {
            return Err(DomainError::validation("end date precedes start date"));
        }

        Ok(vec![RentalEvent::RentalOpened(RentalOpened {
            rental_id: cmd.rental_id,
            customer: cmd.customer,
            lines: cmd.lines.clone(),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            total: cmd.total,
            deposit: cmd.deposit,
            address: cmd.address.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmRental) -> Result<Vec<RentalEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_status(RentalStatus::Pending, "confirm")?;

        Ok(vec![RentalEvent::RentalConfirmed(RentalConfirmed {
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelRental) -> Result<Vec<RentalEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_status(RentalStatus::Pending, "cancel")?;

        Ok(vec![RentalEvent::RentalCanceled(RentalCanceled {
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnRental) -> Result<Vec<RentalEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_status(RentalStatus::Confirmed, "return")?;

        Ok(vec![RentalEvent::RentalReturned(RentalReturned {
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidRental) -> Result<Vec<RentalEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        match self.customer {
            Some(owner) if owner == cmd.caller => {}
            _ => return Err(DomainError::NotOwner),
        }
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "cannot void a rental in status '{}'",
                self.status.as_str()
            )));
        }

        Ok(vec![RentalEvent::RentalVoided(RentalVoided {
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rentworks_events::execute;
    use rentworks_pricing::DurationUnit;

    fn test_rental_id() -> RentalId {
        RentalId::new(AggregateId::new())
    }

    fn test_user() -> UserId {
        UserId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_line(price: u64) -> RentalLine {
        RentalLine {
            item: ItemRef::Equipment(EquipmentId::new(AggregateId::new())),
            quantity: 1,
            duration: RentalDuration::new(DurationUnit::Day, 3),
            price,
        }
    }

    fn opened() -> Rental {
        let id = test_rental_id();
        let mut rental = Rental::empty(id);
        let now = test_time();
        execute(
            &mut rental,
            &RentalCommand::OpenRental(OpenRental {
                rental_id: id,
                customer: test_user(),
                lines: vec![test_line(300_000)],
                start_date: now,
                end_date: now + Duration::days(3),
                total: 300_000,
                deposit: 100_000,
                address: "12 Dockside Rd".to_string(),
                occurred_at: now,
            }),
        )
        .unwrap();
        rental
    }

    #[test]
    fn open_starts_pending_with_snapshot_lines() {
        let rental = opened();
        assert_eq!(rental.status(), RentalStatus::Pending);
        assert_eq!(rental.lines().len(), 1);
        assert_eq!(rental.total(), 300_000);
        assert_eq!(rental.deposit(), 100_000);
    }

    #[test]
    fn open_without_lines_is_rejected() {
        let id = test_rental_id();
        let rental = Rental::empty(id);
        let now = test_time();
        let err = rental
            .handle(&RentalCommand::OpenRental(OpenRental {
                rental_id: id,
                customer: test_user(),
                lines: vec![],
                start_date: now,
                end_date: now,
                total: 0,
                deposit: 0,
                address: String::new(),
                occurred_at: now,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn confirm_moves_pending_to_confirmed() {
        let mut rental = opened();
        let id = rental.id_typed();
        execute(
            &mut rental,
            &RentalCommand::ConfirmRental(ConfirmRental {
                rental_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(rental.status(), RentalStatus::Confirmed);
    }

    #[test]
    fn double_confirm_is_invalid_transition() {
        let mut rental = opened();
        let id = rental.id_typed();
        let cmd = RentalCommand::ConfirmRental(ConfirmRental {
            rental_id: id,
            occurred_at: test_time(),
        });
        execute(&mut rental, &cmd).unwrap();

        let err = rental.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn cancel_after_confirm_is_invalid_transition() {
        let mut rental = opened();
        let id = rental.id_typed();
        execute(
            &mut rental,
            &RentalCommand::ConfirmRental(ConfirmRental {
                rental_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = rental
            .handle(&RentalCommand::CancelRental(CancelRental {
                rental_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn confirm_or_cancel_on_canceled_rental_fails() {
        let mut rental = opened();
        let id = rental.id_typed();
        execute(
            &mut rental,
            &RentalCommand::CancelRental(CancelRental {
                rental_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(rental.status(), RentalStatus::Canceled);

        let err = rental
            .handle(&RentalCommand::ConfirmRental(ConfirmRental {
                rental_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));

        let err = rental
            .handle(&RentalCommand::CancelRental(CancelRental {
                rental_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn return_only_from_confirmed() {
        let mut rental = opened();
        let id = rental.id_typed();

        let err = rental
            .handle(&RentalCommand::ReturnRental(ReturnRental {
                rental_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));

        execute(
            &mut rental,
            &RentalCommand::ConfirmRental(ConfirmRental {
                rental_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut rental,
            &RentalCommand::ReturnRental(ReturnRental {
                rental_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(rental.status(), RentalStatus::Completed);
    }

    #[test]
    fn void_requires_owner_and_non_terminal_status() {
        let mut rental = opened();
        let id = rental.id_typed();
        let owner = rental.customer().unwrap();

        let err = rental
            .handle(&RentalCommand::VoidRental(VoidRental {
                rental_id: id,
                caller: test_user(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotOwner));

        execute(
            &mut rental,
            &RentalCommand::VoidRental(VoidRental {
                rental_id: id,
                caller: owner,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(rental.status(), RentalStatus::Voided);

        let err = rental
            .handle(&RentalCommand::VoidRental(VoidRental {
                rental_id: id,
                caller: owner,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn equipment_lines_skip_packages() {
        let id = test_rental_id();
        let mut rental = Rental::empty(id);
        let now = test_time();
        let eq = EquipmentId::new(AggregateId::new());
        execute(
            &mut rental,
            &RentalCommand::OpenRental(OpenRental {
                rental_id: id,
                customer: test_user(),
                lines: vec![
                    RentalLine {
                        item: ItemRef::Equipment(eq),
                        quantity: 2,
                        duration: RentalDuration::new(DurationUnit::Day, 1),
                        price: 100_000,
                    },
                    RentalLine {
                        item: ItemRef::Package(rentworks_catalog::PackageId::new(
                            AggregateId::new(),
                        )),
                        quantity: 1,
                        duration: RentalDuration::new(DurationUnit::Week, 1),
                        price: 550_000,
                    },
                ],
                start_date: now,
                end_date: now + Duration::days(7),
                total: 650_000,
                deposit: 0,
                address: "12 Dockside Rd".to_string(),
                occurred_at: now,
            }),
        )
        .unwrap();

        assert_eq!(rental.equipment_lines(), vec![(eq, 2)]);
    }
}
