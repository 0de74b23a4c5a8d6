use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use rentworks_events::Event;

/// Discount identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountId(pub AggregateId);

impl DiscountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DiscountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: a discount code.
///
/// Usage only ever increments, and only while the discount is active, inside
/// its validity window and under its cap. Disabling is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discount {
    id: DiscountId,
    code: String,
    rate_percent: u8,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    max_usage: Option<u32>,
    usage: u32,
    active: bool,
    version: u64,
    created: bool,
}

impl Discount {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DiscountId) -> Self {
        Self {
            id,
            code: String::new(),
            rate_percent: 0,
            valid_from: DateTime::<Utc>::MIN_UTC,
            valid_to: DateTime::<Utc>::MIN_UTC,
            max_usage: None,
            usage: 0,
            active: false,
            created: false,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> DiscountId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn rate_percent(&self) -> u8 {
        self.rate_percent
    }

    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.valid_from, self.valid_to)
    }

    pub fn max_usage(&self) -> Option<u32> {
        self.max_usage
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_to
    }

    /// Redemptions left under the cap; `None` means uncapped.
    pub fn remaining_uses(&self) -> Option<u32> {
        self.max_usage.map(|cap| cap.saturating_sub(self.usage))
    }
}

impl AggregateRoot for Discount {
    type Id = DiscountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateDiscount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDiscount {
    pub discount_id: DiscountId,
    pub code: String,
    pub rate_percent: u8,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub max_usage: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DisableDiscount (operator action or daily sweep).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableDiscount {
    pub discount_id: DiscountId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRedemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRedemption {
    pub discount_id: DiscountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountCommand {
    CreateDiscount(CreateDiscount),
    DisableDiscount(DisableDiscount),
    RecordRedemption(RecordRedemption),
}

/// Event: DiscountCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCreated {
    pub discount_id: DiscountId,
    pub code: String,
    pub rate_percent: u8,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub max_usage: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountDisabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountDisabled {
    pub discount_id: DiscountId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountRedeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRedeemed {
    pub discount_id: DiscountId,
    pub usage: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountEvent {
    DiscountCreated(DiscountCreated),
    DiscountDisabled(DiscountDisabled),
    DiscountRedeemed(DiscountRedeemed),
}

impl Event for DiscountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DiscountEvent::DiscountCreated(_) => "discount.created",
            DiscountEvent::DiscountDisabled(_) => "discount.disabled",
            DiscountEvent::DiscountRedeemed(_) => "discount.redeemed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DiscountEvent::DiscountCreated(e) => e.occurred_at,
            DiscountEvent::DiscountDisabled(e) => e.occurred_at,
            DiscountEvent::DiscountRedeemed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Discount {
    type Command = DiscountCommand;
    type Event = DiscountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DiscountEvent::DiscountCreated(e) => {
                self.id = e.discount_id;
                self.code = e.code.clone();
                self.rate_percent = e.rate_percent;
                self.valid_from = e.valid_from;
                self.valid_to = e.valid_to;
                self.max_usage = e.max_usage;
                self.usage = 0;
                self.active = true;
                self.created = true;
            }
            DiscountEvent::DiscountDisabled(_) => {
                self.active = false;
            }
            DiscountEvent::DiscountRedeemed(e) => {
                self.usage = e.usage;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DiscountCommand::CreateDiscount(cmd) => self.handle_create(cmd),
            DiscountCommand::DisableDiscount(cmd) => self.handle_disable(cmd),
            DiscountCommand::RecordRedemption(cmd) => self.handle_redeem(cmd),
        }
    }
}

impl Discount {
    fn handle_create(&self, cmd: &CreateDiscount) -> Result<Vec<DiscountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("discount already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if cmd.rate_percent == 0 || cmd.rate_percent > 100 {
            return Err(DomainError::validation(
                "rate must be between 1 and 100 percent",
            ));
        }
        if cmd.valid_to <= cmd.valid_from {
            return Err(DomainError::validation(
                "validity window must end after it starts",
            ));
        }
        if cmd.max_usage == Some(0) {
            return Err(DomainError::validation("usage cap must be positive"));
        }

        Ok(vec![DiscountEvent::DiscountCreated(DiscountCreated {
            discount_id: cmd.discount_id,
            code: cmd.code.clone(),
            rate_percent: cmd.rate_percent,
            valid_from: cmd.valid_from,
            valid_to: cmd.valid_to,
            max_usage: cmd.max_usage,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_disable(&self, cmd: &DisableDiscount) -> Result<Vec<DiscountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.active {
            return Err(DomainError::invalid_transition(
                "discount is already disabled",
            ));
        }

        Ok(vec![DiscountEvent::DiscountDisabled(DiscountDisabled {
            discount_id: cmd.discount_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_redeem(&self, cmd: &RecordRedemption) -> Result<Vec<DiscountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.active {
            return Err(DomainError::invalid_transition("discount is disabled"));
        }
        if cmd.occurred_at < self.valid_from || cmd.occurred_at > self.valid_to {
            return Err(DomainError::validation(
                "discount is outside its validity window",
            ));
        }
        if let Some(cap) = self.max_usage
            && self.usage >= cap
        {
            return Err(DomainError::conflict("discount usage cap reached"));
        }

        Ok(vec![DiscountEvent::DiscountRedeemed(DiscountRedeemed {
            discount_id: cmd.discount_id,
            usage: self.usage + 1,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rentworks_events::execute;

    fn test_discount_id() -> DiscountId {
        DiscountId::new(AggregateId::new())
    }

    fn created(max_usage: Option<u32>) -> Discount {
        let id = test_discount_id();
        let mut discount = Discount::empty(id);
        let now = Utc::now();
        execute(
            &mut discount,
            &DiscountCommand::CreateDiscount(CreateDiscount {
                discount_id: id,
                code: "SUMMER20".to_string(),
                rate_percent: 20,
                valid_from: now - Duration::days(1),
                valid_to: now + Duration::days(7),
                max_usage,
                occurred_at: now,
            }),
        )
        .unwrap();
        discount
    }

    #[test]
    fn create_starts_active_with_zero_usage() {
        let discount = created(Some(3));
        assert!(discount.is_active());
        assert_eq!(discount.usage(), 0);
        assert_eq!(discount.remaining_uses(), Some(3));
    }

    #[test]
    fn create_rejects_inverted_window_and_zero_rate() {
        let id = test_discount_id();
        let discount = Discount::empty(id);
        let now = Utc::now();

        let err = discount
            .handle(&DiscountCommand::CreateDiscount(CreateDiscount {
                discount_id: id,
                code: "X".to_string(),
                rate_percent: 20,
                valid_from: now,
                valid_to: now - Duration::days(1),
                max_usage: None,
                occurred_at: now,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = discount
            .handle(&DiscountCommand::CreateDiscount(CreateDiscount {
                discount_id: id,
                code: "X".to_string(),
                rate_percent: 0,
                valid_from: now,
                valid_to: now + Duration::days(1),
                max_usage: None,
                occurred_at: now,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn redemption_increments_usage() {
        let mut discount = created(Some(3));
        let id = discount.id_typed();
        execute(
            &mut discount,
            &DiscountCommand::RecordRedemption(RecordRedemption {
                discount_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(discount.usage(), 1);
        assert_eq!(discount.remaining_uses(), Some(2));
    }

    #[test]
    fn redemption_beyond_cap_is_conflict() {
        let mut discount = created(Some(1));
        let id = discount.id_typed();
        let cmd = DiscountCommand::RecordRedemption(RecordRedemption {
            discount_id: id,
            occurred_at: Utc::now(),
        });
        execute(&mut discount, &cmd).unwrap();

        let err = discount.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(discount.usage(), 1);
    }

    #[test]
    fn redemption_outside_window_is_rejected() {
        let discount = created(None);
        let id = discount.id_typed();
        let err = discount
            .handle(&DiscountCommand::RecordRedemption(RecordRedemption {
                discount_id: id,
                occurred_at: Utc::now() + Duration::days(30),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn disable_is_terminal() {
        let mut discount = created(None);
        let id = discount.id_typed();
        execute(
            &mut discount,
            &DiscountCommand::DisableDiscount(DisableDiscount {
                discount_id: id,
                reason: "expired".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!discount.is_active());

        let err = discount
            .handle(&DiscountCommand::DisableDiscount(DisableDiscount {
                discount_id: id,
                reason: "again".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));

        let err = discount
            .handle(&DiscountCommand::RecordRedemption(RecordRedemption {
                discount_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn expiry_check_uses_window_end() {
        let discount = created(None);
        let (_, valid_to) = discount.window();
        assert!(!discount.expired_at(valid_to));
        assert!(discount.expired_at(valid_to + Duration::seconds(1)));
    }
}
