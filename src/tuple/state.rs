//! Per-field presence flags.

use std::fmt;
use std::ops::BitOr;

/// Presence state of a single tuple field.
///
/// Stored as 2 bits inside the tuple's state words. `NULL` is a modifier and
/// is only meaningful together with `AVAILABLE`; the bare `NULL` state is
/// rejected by [`PackedTuple::set_field_state`](super::PackedTuple::set_field_state).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldState(u8);

impl FieldState {
    /// The value has not been loaded.
    pub const UNAVAILABLE: Self = Self(0);
    /// The value is loaded.
    pub const AVAILABLE: Self = Self(0b01);
    /// Null modifier.
    pub const NULL: Self = Self(0b10);
    /// The value is loaded and is NULL.
    pub const AVAILABLE_NULL: Self = Self(0b11);

    pub(crate) const MASK: u64 = 0b11;

    /// Returns the raw 2-bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub(crate) const fn from_bits(bits: u64) -> Self {
        Self((bits & Self::MASK) as u8)
    }

    /// Returns true if the value has been loaded (NULL or not).
    pub const fn is_available(self) -> bool {
        self.0 & Self::AVAILABLE.0 != 0
    }

    /// Returns true if the null modifier is set.
    pub const fn is_null(self) -> bool {
        self.0 & Self::NULL.0 != 0
    }

    /// Returns true if the field holds a non-null loaded value.
    pub const fn has_value(self) -> bool {
        self.0 == Self::AVAILABLE.0
    }

    /// Returns false for the bare `NULL` state.
    pub const fn is_storable(self) -> bool {
        self.0 != Self::NULL.0
    }
}

impl BitOr for FieldState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FieldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "Unavailable",
            1 => "Available",
            2 => "Null",
            _ => "Available | Null",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        assert!(!FieldState::UNAVAILABLE.is_available());
        assert!(FieldState::AVAILABLE.has_value());
        assert!(FieldState::AVAILABLE_NULL.is_available());
        assert!(FieldState::AVAILABLE_NULL.is_null());
        assert!(!FieldState::AVAILABLE_NULL.has_value());
        assert_eq!(
            FieldState::AVAILABLE | FieldState::NULL,
            FieldState::AVAILABLE_NULL
        );
    }

    #[test]
    fn test_bare_null_not_storable() {
        assert!(!FieldState::NULL.is_storable());
        assert!(FieldState::UNAVAILABLE.is_storable());
        assert!(FieldState::AVAILABLE.is_storable());
        assert!(FieldState::AVAILABLE_NULL.is_storable());
    }

    #[test]
    fn test_from_bits_masks_upper_bits() {
        assert_eq!(FieldState::from_bits(0b1101), FieldState::AVAILABLE);
        assert_eq!(FieldState::from_bits(u64::MAX), FieldState::AVAILABLE_NULL);
    }
}
