//! Fixed-size slot containers for repeated sub-entities.
//!
//! A source list of variable length (types, abilities) is projected into a
//! fixed number of named positions. Positions that receive nothing stay
//! `None` and are written out as nulls.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A fixed number of ordered positions filled in source order.
///
/// Capacity is set at construction and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalSlots<T> {
    slots: Box<[Option<T>]>,
    filled: usize,
}

impl<T> PositionalSlots<T> {
    /// Creates `capacity` empty positions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            filled: 0,
        }
    }

    /// Places `value` in the next free position.
    ///
    /// # Errors
    ///
    /// Returns the value back if every position is taken.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let Some(slot) = self.slots.get_mut(self.filled) else {
            return Err(value);
        };
        *slot = Some(value);
        self.filled += 1;
        Ok(())
    }

    /// Returns the value at `index`, if filled.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Returns the number of positions.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of filled positions.
    #[must_use]
    pub const fn filled(&self) -> usize {
        self.filled
    }

    /// Consumes the slots, returning every position.
    #[must_use]
    pub fn into_vec(self) -> Vec<Option<T>> {
        self.slots.into_vec()
    }
}

/// The role a repeated sub-entity plays (e.g., an ability's slot).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotRole {
    /// First regular position.
    #[strum(serialize = "primary_1")]
    #[serde(rename = "primary_1")]
    Primary1,
    /// Second regular position.
    #[strum(serialize = "primary_2")]
    #[serde(rename = "primary_2")]
    Primary2,
    /// Hidden position.
    Hidden,
}

impl SlotRole {
    /// All roles in output column order.
    pub const ALL: [Self; 3] = [Self::Primary1, Self::Primary2, Self::Hidden];

    /// Selects the role for a sub-entity.
    ///
    /// A hidden flag always wins over the slot number. Otherwise slot `1`
    /// and `2` map to the two primary roles. Anything else has no role.
    #[must_use]
    pub const fn assign(is_hidden: bool, slot: Option<i64>) -> Option<Self> {
        if is_hidden {
            return Some(Self::Hidden);
        }
        match slot {
            Some(1) => Some(Self::Primary1),
            Some(2) => Some(Self::Primary2),
            _ => None,
        }
    }
}

/// What to do with a sub-entity that has no free slot.
///
/// Covers both elements whose role cannot be determined (e.g., a
/// non-hidden ability in slot 3) and elements whose slot is already
/// taken.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotPolicy {
    /// Log a warning. Unassigned elements are dropped; a later element for
    /// an occupied role replaces the earlier one.
    #[default]
    Warn,
    /// Fail the whole record.
    Reject,
}

/// One optional value per [`SlotRole`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSlots<T> {
    /// Value in the first primary slot.
    pub primary_1: Option<T>,
    /// Value in the second primary slot.
    pub primary_2: Option<T>,
    /// Value in the hidden slot.
    pub hidden: Option<T>,
}

impl<T> RoleSlots<T> {
    /// Creates empty role slots.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            primary_1: None,
            primary_2: None,
            hidden: None,
        }
    }

    /// Stores `value` under `role`, returning the value it displaced.
    pub fn replace(&mut self, role: SlotRole, value: T) -> Option<T> {
        self.slot_mut(role).replace(value)
    }

    /// Returns the value stored under `role`.
    #[must_use]
    pub const fn get(&self, role: SlotRole) -> Option<&T> {
        match role {
            SlotRole::Primary1 => self.primary_1.as_ref(),
            SlotRole::Primary2 => self.primary_2.as_ref(),
            SlotRole::Hidden => self.hidden.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: SlotRole) -> &mut Option<T> {
        match role {
            SlotRole::Primary1 => &mut self.primary_1,
            SlotRole::Primary2 => &mut self.primary_2,
            SlotRole::Hidden => &mut self.hidden,
        }
    }
}

impl<T> Default for RoleSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_slots_pad_with_none() {
        let mut slots = PositionalSlots::new(2);
        slots.push("fire").unwrap();
        assert_eq!(slots.capacity(), 2);
        assert_eq!(slots.into_vec(), vec![Some("fire"), None]);
    }

    #[test]
    fn positional_slots_return_overflow() {
        let mut slots = PositionalSlots::new(2);
        slots.push("grass").unwrap();
        slots.push("poison").unwrap();
        assert_eq!(slots.push("bug"), Err("bug"));
        assert_eq!(slots.filled(), 2);
        assert_eq!(slots.get(1), Some(&"poison"));
    }

    #[test]
    fn hidden_flag_overrides_slot_number() {
        assert_eq!(SlotRole::assign(true, Some(1)), Some(SlotRole::Hidden));
        assert_eq!(SlotRole::assign(true, Some(3)), Some(SlotRole::Hidden));
        assert_eq!(SlotRole::assign(true, None), Some(SlotRole::Hidden));
    }

    #[test]
    fn slot_numbers_map_to_primary_roles() {
        assert_eq!(SlotRole::assign(false, Some(1)), Some(SlotRole::Primary1));
        assert_eq!(SlotRole::assign(false, Some(2)), Some(SlotRole::Primary2));
        assert_eq!(SlotRole::assign(false, Some(3)), None);
        assert_eq!(SlotRole::assign(false, None), None);
    }

    #[test]
    fn role_slots_keep_latest_occupant() {
        let mut slots = RoleSlots::new();
        assert_eq!(slots.replace(SlotRole::Hidden, "chlorophyll"), None);
        assert_eq!(slots.replace(SlotRole::Hidden, "stench"), Some("chlorophyll"));
        assert_eq!(slots.get(SlotRole::Hidden), Some(&"stench"));
        assert_eq!(slots.get(SlotRole::Primary2), None);
    }

    #[test]
    fn role_names_round_trip_through_strum() {
        assert_eq!(SlotRole::Primary1.as_ref(), "primary_1");
        assert_eq!("hidden".parse::<SlotRole>().unwrap(), SlotRole::Hidden);
    }
}
