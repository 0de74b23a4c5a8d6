//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// value objects with the same values are equal. Rate tables and rental
/// periods are value objects, equipment and rentals are entities.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
