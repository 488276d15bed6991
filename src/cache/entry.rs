//! Cache Entry Module
//!
//! Defines the immutable value stored under each key together with the
//! capacity it consumes.

use bytes::Bytes;

// == Cache Entry ==
/// A stored value and its cost.
///
/// Entries are never mutated after construction; a SET on an existing key
/// swaps the whole entry, so readers see either the old or the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored value
    value: Bytes,
    /// Capacity consumed, in cost units
    cost: u64,
}

impl Entry {
    // == Constructor ==
    /// Creates an entry whose cost is the byte length of the value.
    pub fn new(value: Bytes) -> Self {
        let cost = value.len() as u64;
        Self::with_cost(value, cost)
    }

    /// Creates an entry with an explicit cost. Costs below one are raised to
    /// one so that every entry occupies some capacity.
    pub fn with_cost(value: Bytes, cost: u64) -> Self {
        Self {
            value,
            cost: cost.max(1),
        }
    }

    /// Returns a cheap handle to the stored bytes.
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_cost_defaults_to_value_length() {
        let entry = Entry::new(Bytes::from_static(b"hello"));
        assert_eq!(entry.cost(), 5);
        assert_eq!(entry.value(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_entry_explicit_cost() {
        let entry = Entry::with_cost(Bytes::from_static(b"hello"), 100);
        assert_eq!(entry.cost(), 100);
    }

    #[test]
    fn test_empty_value_costs_one_unit() {
        let entry = Entry::new(Bytes::new());
        assert_eq!(entry.cost(), 1);
    }
}
