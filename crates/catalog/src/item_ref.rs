use serde::{Deserialize, Serialize};

use crate::{EquipmentId, PackageId};

/// Reference to a rentable item: exactly one of equipment or package.
///
/// Cart and rental lines carry this instead of a pair of nullable foreign
/// keys, so "mutually exclusive" holds at the type level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Equipment(EquipmentId),
    Package(PackageId),
}

impl ItemRef {
    pub fn equipment_id(&self) -> Option<EquipmentId> {
        match self {
            ItemRef::Equipment(id) => Some(*id),
            ItemRef::Package(_) => None,
        }
    }

    pub fn package_id(&self) -> Option<PackageId> {
        match self {
            ItemRef::Package(id) => Some(*id),
            ItemRef::Equipment(_) => None,
        }
    }
}
