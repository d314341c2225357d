//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A
/// `Quantity` of 3 is interchangeable with any other `Quantity` of 3; an
/// inventory item is not interchangeable with another item of the same name.
///
/// To "modify" a value object, construct a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
