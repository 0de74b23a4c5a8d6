use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use rentworks_events::Event;
use rentworks_pricing::RateTable;

use crate::EquipmentId;

/// Package identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub AggregateId);

impl PackageId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PackageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: a bundle of equipment rented as one priced unit.
///
/// A package has no stock of its own. Availability is treated as
/// always-available; no derivation from constituents is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentPackage {
    id: PackageId,
    name: String,
    rates: RateTable,
    equipment: Vec<EquipmentId>,
    version: u64,
    created: bool,
}

impl EquipmentPackage {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PackageId) -> Self {
        Self {
            id,
            name: String::new(),
            rates: RateTable::new(0, 0, 0),
            equipment: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PackageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rates(&self) -> RateTable {
        self.rates
    }

    pub fn equipment(&self) -> &[EquipmentId] {
        &self.equipment
    }
}

impl AggregateRoot for EquipmentPackage {
    type Id = PackageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterPackage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPackage {
    pub package_id: PackageId,
    pub name: String,
    pub rates: RateTable,
    pub equipment: Vec<EquipmentId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageCommand {
    RegisterPackage(RegisterPackage),
}

/// Event: PackageRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRegistered {
    pub package_id: PackageId,
    pub name: String,
    pub rates: RateTable,
    pub equipment: Vec<EquipmentId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageEvent {
    PackageRegistered(PackageRegistered),
}

impl Event for PackageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PackageEvent::PackageRegistered(_) => "catalog.package.registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PackageEvent::PackageRegistered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for EquipmentPackage {
    type Command = PackageCommand;
    type Event = PackageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PackageEvent::PackageRegistered(e) => {
                self.id = e.package_id;
                self.name = e.name.clone();
                self.rates = e.rates;
                self.equipment = e.equipment.clone();
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PackageCommand::RegisterPackage(cmd) => self.handle_register(cmd),
        }
    }
}

impl EquipmentPackage {
    fn handle_register(&self, cmd: &RegisterPackage) -> Result<Vec<PackageEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("package already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![PackageEvent::PackageRegistered(PackageRegistered {
            package_id: cmd.package_id,
            name: cmd.name.clone(),
            rates: cmd.rates,
            equipment: cmd.equipment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentworks_events::execute;

    fn test_package_id() -> PackageId {
        PackageId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn register_package_records_constituents() {
        let id = test_package_id();
        let constituents = vec![
            EquipmentId::new(AggregateId::new()),
            EquipmentId::new(AggregateId::new()),
        ];
        let mut pkg = EquipmentPackage::empty(id);

        execute(
            &mut pkg,
            &PackageCommand::RegisterPackage(RegisterPackage {
                package_id: id,
                name: "Film crew kit".to_string(),
                rates: RateTable::new(200_000, 1_100_000, 3_800_000),
                equipment: constituents.clone(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(pkg.equipment(), constituents.as_slice());
        assert_eq!(pkg.version(), 1);
    }

    #[test]
    fn register_twice_conflicts() {
        let id = test_package_id();
        let mut pkg = EquipmentPackage::empty(id);
        let cmd = PackageCommand::RegisterPackage(RegisterPackage {
            package_id: id,
            name: "Film crew kit".to_string(),
            rates: RateTable::new(200_000, 1_100_000, 3_800_000),
            equipment: vec![],
            occurred_at: test_time(),
        });

        execute(&mut pkg, &cmd).unwrap();
        let err = pkg.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn empty_name_is_rejected() {
        let id = test_package_id();
        let pkg = EquipmentPackage::empty(id);
        let err = pkg
            .handle(&PackageCommand::RegisterPackage(RegisterPackage {
                package_id: id,
                name: "  ".to_string(),
                rates: RateTable::new(0, 0, 0),
                equipment: vec![],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
