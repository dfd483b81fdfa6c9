use std::ops::Index;

use crate::{config::PAD_COUNT, error::BridgeError};

/// Full snapshot of the nine pad sensors, indexed by physical position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadStates([bool; PAD_COUNT]);

impl PadStates {
    pub fn released() -> Self {
        PadStates([false; PAD_COUNT])
    }

    /// Parses a device frame such as `0,1,0,0,0,0,0,0,0`
    pub fn parse(frame: &str) -> Result<Self, BridgeError> {
        let mut states = [false; PAD_COUNT];
        let mut count = 0;

        for token in frame.trim().split(',') {
            if count >= PAD_COUNT {
                return Err(BridgeError::MalformedFrame(frame.to_string()));
            }

            states[count] = match token.trim() {
                "0" => false,
                "1" => true,
                _ => return Err(BridgeError::MalformedFrame(frame.to_string())),
            };
            count += 1;
        }

        if count != PAD_COUNT {
            return Err(BridgeError::MalformedFrame(frame.to_string()));
        }

        Ok(PadStates(states))
    }

    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, pressed: bool) {
        if let Some(state) = self.0.get_mut(index) {
            *state = pressed;
        }
    }

    /// Indices currently pressed, ascending
    pub fn pressed(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().filter(|(_, p)| **p).map(|(i, _)| i)
    }

    pub fn pressed_count(&self) -> usize {
        self.0.iter().filter(|p| **p).count()
    }

    pub fn all_released(&self) -> bool {
        self.pressed_count() == 0
    }
}

impl Index<usize> for PadStates {
    type Output = bool;

    fn index(&self, index: usize) -> &bool {
        &self.0[index]
    }
}

/// One line from the message relay: `<topic> <payload>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (topic, payload) = line.split_once(char::is_whitespace)?;

        if topic.is_empty() {
            return None;
        }

        Some(Message {
            topic: topic.to_string(),
            payload: payload.trim().to_string(),
        })
    }
}
