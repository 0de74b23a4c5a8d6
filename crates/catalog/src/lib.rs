//! `rentworks-catalog` — rentable items.
//!
//! Two aggregates: individual `Equipment` units (rates + finite stock) and
//! `EquipmentPackage` bundles (rates + constituent equipment, no stock of
//! their own). Stock mutates only through `AdjustStock`, which enforces the
//! non-negative invariant.

pub mod equipment;
pub mod item_ref;
pub mod package;

pub use equipment::{
    AdjustStock, Equipment, EquipmentCommand, EquipmentEvent, EquipmentId, RegisterEquipment,
    UpdateRates,
};
pub use item_ref::ItemRef;
pub use package::{
    EquipmentPackage, PackageCommand, PackageEvent, PackageId, RegisterPackage,
};
