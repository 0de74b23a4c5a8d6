use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rentworks_catalog::ItemRef;
use rentworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use rentworks_events::Event;
use rentworks_pricing::RentalDuration;

/// Cart identifier.
///
/// Derived deterministically from the owning user (UUIDv5), so "one cart per
/// user" holds by construction: every request from the same user targets the
/// same stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub AggregateId);

impl CartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The cart stream for a given user.
    pub fn for_user(user: UserId) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, user.as_uuid().as_bytes());
        Self(AggregateId::from_uuid(uuid))
    }
}

impl core::fmt::Display for CartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One cart line: item reference, quantity, duration, computed price.
///
/// `price` is the line price from the pricing engine; the cart total is the
/// sum of line prices (not quantity-weighted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub line_id: Uuid,
    pub item: ItemRef,
    pub quantity: u32,
    pub duration: RentalDuration,
    pub price: u64,
}

/// Aggregate root: a user's cart.
///
/// Created lazily on first add. `total` is recomputed from the current lines
/// on every applied mutation, so it can never drift from the line set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    id: CartId,
    owner: Option<UserId>,
    lines: Vec<CartLine>,
    total: u64,
    version: u64,
    created: bool,
}

impl Cart {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CartId) -> Self {
        Self {
            id,
            owner: None,
            lines: Vec::new(),
            total: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn recompute_total(&mut self) {
        self.total = self.lines.iter().map(|l| l.price).sum();
    }
}

impl AggregateRoot for Cart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddLine (opens the cart on first use).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub cart_id: CartId,
    pub caller: UserId,
    pub line_id: Uuid,
    pub item: ItemRef,
    pub quantity: u32,
    pub duration: RentalDuration,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub cart_id: CartId,
    pub caller: UserId,
    pub line_id: Uuid,
    pub quantity: u32,
    pub duration: RentalDuration,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub cart_id: CartId,
    pub caller: UserId,
    pub line_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Checkout (consumes all lines into a rental upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub cart_id: CartId,
    pub caller: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartCommand {
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    Checkout(Checkout),
}

/// Event: CartOpened (emitted with the first AddLine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartOpened {
    pub cart_id: CartId,
    pub owner: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub cart_id: CartId,
    pub line: CartLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub cart_id: CartId,
    pub line_id: Uuid,
    pub quantity: u32,
    pub duration: RentalDuration,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub cart_id: CartId,
    pub line_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CartCheckedOut (lines consumed, cart emptied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCheckedOut {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartEvent {
    CartOpened(CartOpened),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    CartCheckedOut(CartCheckedOut),
}

impl Event for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartOpened(_) => "cart.opened",
            CartEvent::LineAdded(_) => "cart.line_added",
            CartEvent::LineUpdated(_) => "cart.line_updated",
            CartEvent::LineRemoved(_) => "cart.line_removed",
            CartEvent::CartCheckedOut(_) => "cart.checked_out",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CartEvent::CartOpened(e) => e.occurred_at,
            CartEvent::LineAdded(e) => e.occurred_at,
            CartEvent::LineUpdated(e) => e.occurred_at,
            CartEvent::LineRemoved(e) => e.occurred_at,
            CartEvent::CartCheckedOut(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Cart {
    type Command = CartCommand;
    type Event = CartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CartEvent::CartOpened(e) => {
                self.id = e.cart_id;
                self.owner = Some(e.owner);
                self.lines.clear();
                self.total = 0;
                self.created = true;
            }
            CartEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
                self.recompute_total();
            }
            CartEvent::LineUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    line.quantity = e.quantity;
                    line.duration = e.duration;
                    line.price = e.price;
                }
                self.recompute_total();
            }
            CartEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_id != e.line_id);
                self.recompute_total();
            }
            CartEvent::CartCheckedOut(_) => {
                self.lines.clear();
                self.total = 0;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CartCommand::AddLine(cmd) => self.handle_add(cmd),
            CartCommand::UpdateLine(cmd) => self.handle_update(cmd),
            CartCommand::RemoveLine(cmd) => self.handle_remove(cmd),
            CartCommand::Checkout(cmd) => self.handle_checkout(cmd),
        }
    }
}

impl Cart {
    fn ensure_owner(&self, caller: UserId) -> Result<(), DomainError> {
        match self.owner {
            Some(owner) if owner == caller => Ok(()),
            Some(_) => Err(DomainError::NotOwner),
            // Not created yet; creation commands handle this case.
            None => Ok(()),
        }
    }

    fn ensure_line_exists(&self, line_id: Uuid) -> Result<(), DomainError> {
        if self.lines.iter().any(|l| l.line_id == line_id) {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    fn handle_add(&self, cmd: &AddLine) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_owner(cmd.caller)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut events = Vec::new();

        // Lazily open the cart on first add (quantity/total start at zero).
        if !self.created {
            events.push(CartEvent::CartOpened(CartOpened {
                cart_id: cmd.cart_id,
                owner: cmd.caller,
                occurred_at: cmd.occurred_at,
            }));
        }

        events.push(CartEvent::LineAdded(LineAdded {
            cart_id: cmd.cart_id,
            line: CartLine {
                line_id: cmd.line_id,
                item: cmd.item,
                quantity: cmd.quantity,
                duration: cmd.duration,
                price: cmd.price,
            },
            occurred_at: cmd.occurred_at,
        }));

        Ok(events)
    }

    fn handle_update(&self, cmd: &UpdateLine) -> Result<Vec<CartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_owner(cmd.caller)?;
        self.ensure_line_exists(cmd.line_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![CartEvent::LineUpdated(LineUpdated {
            cart_id: cmd.cart_id,
            line_id: cmd.line_id,
            quantity: cmd.quantity,
            duration: cmd.duration,
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveLine) -> Result<Vec<CartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_owner(cmd.caller)?;
        self.ensure_line_exists(cmd.line_id)?;

        Ok(vec![CartEvent::LineRemoved(LineRemoved {
            cart_id: cmd.cart_id,
            line_id: cmd.line_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_checkout(&self, cmd: &Checkout) -> Result<Vec<CartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_owner(cmd.caller)?;

        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot checkout an empty cart"));
        }

        Ok(vec![CartEvent::CartCheckedOut(CartCheckedOut {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
