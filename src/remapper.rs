use crate::{
    config::PAD_COUNT,
    frame::PadStates,
    keys::{InputSource, KeyEvent, LogicalKey},
    mapping::PadMapping,
};

/// Turns full pad snapshots into press/release transitions on logical keys
#[derive(Debug, Clone)]
pub struct Remapper {
    mapping: Option<PadMapping>,
    previous: PadStates,
}

impl Remapper {
    /// `None` means identity: slots are the physical pads
    pub fn new(mapping: Option<PadMapping>) -> Self {
        Remapper {
            mapping,
            previous: PadStates::released(),
        }
    }

    pub fn previous(&self) -> &PadStates {
        &self.previous
    }

    /// Raw device frame entry point; malformed frames produce nothing and change nothing
    pub fn feed_frame(&mut self, frame: &str) -> Vec<KeyEvent> {
        match PadStates::parse(frame) {
            Ok(states) => self.feed(&states),
            Err(err) => {
                log::debug!("Dropped frame: {}", err);
                Vec::new()
            }
        }
    }

    /// Events come out in ascending slot order
    pub fn feed(&mut self, states: &PadStates) -> Vec<KeyEvent> {
        let remapped = match &self.mapping {
            Some(mapping) if mapping.is_complete() => mapping.apply(states),
            _ => *states,
        };

        let mut events = Vec::new();

        for slot in 0..PAD_COUNT {
            let now = remapped[slot];
            if now == self.previous[slot] {
                continue;
            }

            let Some(key) = LogicalKey::for_slot(slot) else {
                continue;
            };

            events.push(if now {
                KeyEvent::press(key, InputSource::Pad)
            } else {
                KeyEvent::release(key, InputSource::Pad)
            });

            self.previous.set(slot, now);
        }

        if !events.is_empty() {
            log::debug!("Remapped states {:?} -> {:?}", states, remapped);
        }

        events
    }

    /// Page lost visibility: release everything still held so nothing stays stuck
    pub fn visibility_lost(&mut self) -> Vec<KeyEvent> {
        let events: Vec<KeyEvent> = self
            .previous
            .pressed()
            .filter_map(LogicalKey::for_slot)
            .map(|key| KeyEvent::release(key, InputSource::Pad))
            .collect();

        if !events.is_empty() {
            log::info!("Force-released {} held pad(s)", events.len());
        }

        self.previous = PadStates::released();

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Transition;

    fn run(remapper: &mut Remapper, frames: &[&str]) -> Vec<(LogicalKey, Transition)> {
        frames
            .iter()
            .flat_map(|f| remapper.feed_frame(f))
            .map(|e| (e.key, e.transition))
            .collect()
    }

    #[test]
    fn held_pad_fires_once() {
        let mut remapper = Remapper::new(Some(PadMapping::identity()));

        let events = run(
            &mut remapper,
            &[
                "0,0,0,0,0,0,0,0,0",
                "1,0,0,0,0,0,0,0,0",
                "1,0,0,0,0,0,0,0,0",
                "0,0,0,0,0,0,0,0,0",
            ],
        );

        assert_eq!(
            events,
            vec![
                (LogicalKey::Q, Transition::Press),
                (LogicalKey::Q, Transition::Release)
            ]
        );
    }

    #[test]
    fn simultaneous_changes_come_out_in_slot_order() {
        let mut remapper = Remapper::new(None);

        run(&mut remapper, &["0,0,0,0,1,0,0,0,0"]);
        let events = run(&mut remapper, &["0,0,1,0,0,0,0,0,1"]);

        assert_eq!(
            events,
            vec![
                (LogicalKey::E, Transition::Press),
                (LogicalKey::S, Transition::Release),
                (LogicalKey::C, Transition::Press),
            ]
        );
    }

    #[test]
    fn identity_without_mapping() {
        let mut remapper = Remapper::new(None);

        remapper.feed_frame("0,1,0,0,0,1,0,0,0");

        assert_eq!(
            remapper.previous(),
            &PadStates::parse("0,1,0,0,0,1,0,0,0").unwrap()
        );
    }

    #[test]
    fn applies_calibrated_mapping() {
        let mut mapping = PadMapping::unset();
        mapping.assign(8, 0);
        mapping.assign(0, 8);
        let mut remapper = Remapper::new(Some(mapping.finalize()));

        let events = run(&mut remapper, &["0,0,0,0,0,0,0,0,1", "1,0,0,0,0,0,0,0,1"]);

        assert_eq!(
            events,
            vec![
                (LogicalKey::Q, Transition::Press),
                (LogicalKey::C, Transition::Press)
            ]
        );
    }

    #[test]
    fn short_frame_is_dropped() {
        let mut remapper = Remapper::new(None);
        run(&mut remapper, &["0,0,0,1,0,0,0,0,0"]);
        let before = *remapper.previous();

        let events = run(&mut remapper, &["1,1,0,0,0,0,0,0"]);

        assert!(events.is_empty());
        assert_eq!(remapper.previous(), &before);
    }

    #[test]
    fn visibility_loss_releases_held_slot() {
        let mut remapper = Remapper::new(None);
        run(&mut remapper, &["0,0,0,1,0,0,0,0,0"]);

        let events = remapper.visibility_lost();

        assert_eq!(events, vec![KeyEvent::release(LogicalKey::A, InputSource::Pad)]);
        assert!(remapper.previous().all_released());
        assert!(remapper.visibility_lost().is_empty());
    }

    #[test]
    fn press_after_visibility_loss_fires_again() {
        let mut remapper = Remapper::new(None);
        run(&mut remapper, &["0,0,0,1,0,0,0,0,0"]);
        remapper.visibility_lost();

        let events = run(&mut remapper, &["0,0,0,1,0,0,0,0,0"]);

        assert_eq!(events, vec![(LogicalKey::A, Transition::Press)]);
    }
}
