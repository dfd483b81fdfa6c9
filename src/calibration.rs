use crate::{config::PAD_COUNT, frame::PadStates, mapping::PadMapping};

/// Order in which pads are lit during calibration
const PAD_ORDER: [usize; PAD_COUNT] = [0, 1, 2, 3, 4, 5, 6, 7, 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    AwaitingStep(usize),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// Snapshot did not change anything
    Ignored,
    Assigned { physical: usize, slot: usize },
    /// Every step done; carries the finalized mapping
    Complete(PadMapping),
}

/// Interactive pad -> slot assignment, one lit pad at a time
#[derive(Debug, Clone)]
pub struct Calibrator {
    mapping: PadMapping,
    step: usize,
    waiting_for_release: bool,
}

impl Default for Calibrator {
    fn default() -> Self {
        Calibrator::new()
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Calibrator {
            mapping: PadMapping::unset(),
            step: 0,
            waiting_for_release: false,
        }
    }

    pub fn state(&self) -> CalibrationState {
        if self.step >= PAD_COUNT {
            CalibrationState::Complete
        } else {
            CalibrationState::AwaitingStep(self.step)
        }
    }

    pub fn mapping(&self) -> &PadMapping {
        &self.mapping
    }

    /// Pad the UI should light up for the current step
    pub fn highlight(&self) -> Option<usize> {
        match self.state() {
            CalibrationState::AwaitingStep(step) => Some(PAD_ORDER[step]),
            CalibrationState::Complete => None,
        }
    }

    pub fn instruction(&self) -> String {
        match self.highlight() {
            Some(pad) => format!("Step on the lit pad ({})", pad + 1),
            None => "All pads are configured!".to_string(),
        }
    }

    /// Raw device frame entry point; malformed frames leave the state untouched
    pub fn feed_frame(&mut self, frame: &str) -> CalibrationOutcome {
        match PadStates::parse(frame) {
            Ok(states) => self.feed(&states),
            Err(err) => {
                log::debug!("Calibration dropped frame: {}", err);
                CalibrationOutcome::Ignored
            }
        }
    }

    pub fn feed(&mut self, states: &PadStates) -> CalibrationOutcome {
        let CalibrationState::AwaitingStep(step) = self.state() else {
            return CalibrationOutcome::Ignored;
        };

        if states.all_released() {
            self.waiting_for_release = false;
            return CalibrationOutcome::Ignored;
        }

        if self.waiting_for_release || states.pressed_count() != 1 {
            return CalibrationOutcome::Ignored;
        }

        let Some(physical) = states.pressed().next() else {
            return CalibrationOutcome::Ignored;
        };

        if self.mapping.is_assigned(physical) {
            log::info!("Pad {} is already assigned", physical + 1);
            return CalibrationOutcome::Ignored;
        }

        if !self.mapping.assign(physical, step) {
            return CalibrationOutcome::Ignored;
        }

        log::info!("Assigned pad {} to slot {}", physical + 1, step);

        self.step += 1;
        self.waiting_for_release = true;

        if self.step >= PAD_COUNT {
            self.mapping = self.mapping.finalize();
            return CalibrationOutcome::Complete(self.mapping);
        }

        CalibrationOutcome::Assigned {
            physical,
            slot: step,
        }
    }

    /// Ends the run early, auto-filling whatever was never pressed
    pub fn finish(mut self) -> PadMapping {
        self.step = PAD_COUNT;
        self.mapping.finalize()
    }
}
