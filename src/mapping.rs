use serde::{Deserialize, Serialize};

use crate::{config::PAD_COUNT, error::BridgeError, frame::PadStates};

/// Physical pad index -> logical slot. `None` marks a pad not yet calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<u8>>", into = "Vec<Option<u8>>")]
pub struct PadMapping([Option<u8>; PAD_COUNT]);

impl PadMapping {
    /// Fresh mapping at the start of a calibration run
    pub fn unset() -> Self {
        PadMapping([None; PAD_COUNT])
    }

    pub fn identity() -> Self {
        let mut slots = [None; PAD_COUNT];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = Some(i as u8);
        }
        PadMapping(slots)
    }

    pub fn get(&self, physical: usize) -> Option<usize> {
        self.0.get(physical).copied().flatten().map(usize::from)
    }

    pub fn is_assigned(&self, physical: usize) -> bool {
        self.get(physical).is_some()
    }

    fn slot_in_use(&self, slot: usize) -> bool {
        self.0.iter().flatten().any(|s| usize::from(*s) == slot)
    }

    /// Binds a physical pad to a slot; refuses pads or slots already taken
    pub fn assign(&mut self, physical: usize, slot: usize) -> bool {
        if physical >= PAD_COUNT || slot >= PAD_COUNT {
            return false;
        }
        if self.is_assigned(physical) || self.slot_in_use(slot) {
            return false;
        }

        self.0[physical] = Some(slot as u8);
        true
    }

    pub fn is_complete(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    /// True when every slot 0..9 appears exactly once
    pub fn is_permutation(&self) -> bool {
        let mut seen = [false; PAD_COUNT];

        for slot in &self.0 {
            match slot {
                Some(s) if usize::from(*s) < PAD_COUNT && !seen[usize::from(*s)] => {
                    seen[usize::from(*s)] = true;
                }
                _ => return false,
            }
        }

        true
    }

    /// Fills unassigned pads, in ascending physical order, with the unused slots in ascending order
    pub fn finalize(mut self) -> Self {
        let free: Vec<usize> = (0..PAD_COUNT)
            .filter(|slot| !self.slot_in_use(*slot))
            .collect();
        let mut free = free.into_iter();

        for entry in self.0.iter_mut() {
            if entry.is_none() {
                *entry = free.next().map(|slot| slot as u8);
            }
        }

        self
    }

    /// Moves every pressed pad to its slot. Incomplete mappings pass states through unchanged.
    pub fn apply(&self, states: &PadStates) -> PadStates {
        if !self.is_complete() {
            return *states;
        }

        let mut remapped = PadStates::released();
        for physical in states.pressed() {
            if let Some(slot) = self.get(physical) {
                remapped.set(slot, true);
            }
        }

        remapped
    }
}

impl Default for PadMapping {
    fn default() -> Self {
        PadMapping::identity()
    }
}

impl TryFrom<Vec<Option<u8>>> for PadMapping {
    type Error = BridgeError;

    fn try_from(slots: Vec<Option<u8>>) -> Result<Self, Self::Error> {
        let slots: [Option<u8>; PAD_COUNT] = slots.try_into().map_err(|slots: Vec<_>| {
            BridgeError::InvalidMapping(format!("expected {} entries, got {}", PAD_COUNT, slots.len()))
        })?;

        if let Some(bad) = slots.iter().flatten().find(|s| usize::from(**s) >= PAD_COUNT) {
            return Err(BridgeError::InvalidMapping(format!("slot {} out of range", bad)));
        }

        Ok(PadMapping(slots))
    }
}

impl From<PadMapping> for Vec<Option<u8>> {
    fn from(mapping: PadMapping) -> Self {
        mapping.0.to_vec()
    }
}
