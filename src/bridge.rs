use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::{
    calibration::{CalibrationOutcome, Calibrator},
    error::BridgeError,
    frame::Message,
    mapping::PadMapping,
    remapper::Remapper,
    sink::InputSink,
    source::Input,
    store::MappingStore,
};

/// Topics the bridge reacts to; everything else on the relay is ignored
#[derive(Debug, Clone)]
pub struct Topics {
    pub pad: String,
    pub visibility: String,
}

/// Steady-state pipeline: relay messages and keyboard keys into one sink
pub struct Bridge<S: InputSink> {
    topics: Topics,
    remapper: Remapper,
    sink: S,
}

impl<S: InputSink> Bridge<S> {
    pub fn new(topics: Topics, mapping: Option<PadMapping>, sink: S) -> Self {
        Bridge {
            topics,
            remapper: Remapper::new(mapping),
            sink,
        }
    }

    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Key(event) => self.sink.dispatch(event),
            Input::Message(Message { topic, payload }) => {
                let events = if topic == self.topics.pad {
                    self.remapper.feed_frame(&payload)
                } else if topic == self.topics.visibility {
                    match payload.as_str() {
                        "hidden" => self.remapper.visibility_lost(),
                        _ => Vec::new(),
                    }
                } else {
                    log::trace!("Ignoring message on {}", topic);
                    Vec::new()
                };

                for event in events {
                    self.sink.dispatch(event);
                }
            }
        }
    }

    /// Releases whatever the pads still hold, e.g. before shutting down
    pub fn release_all(&mut self) {
        log::debug!("Releasing held pads {:?}", self.remapper.previous());

        for event in self.remapper.visibility_lost() {
            self.sink.dispatch(event);
        }
    }
}

pub async fn bridge_task<S: InputSink>(
    mut bridge: Bridge<S>,
    mut rx: Receiver<Input>,
    token: CancellationToken,
) {
    log::info!("Bridge is ready");

    loop {
        let input = tokio::select! {
            v = rx.recv() => v,
            _ = token.cancelled() => None,
        };

        match input {
            Some(input) => bridge.handle(input),
            None => break,
        }
    }

    bridge.release_all();

    log::info!("Bridge is shutting down");
}

/// Runs one calibration pass and persists the result.
/// Cancellation or a closed source ends the run early with the unpressed pads auto-filled.
pub async fn calibration_task(
    pad_topic: String,
    store: impl MappingStore,
    mut rx: Receiver<Input>,
    token: CancellationToken,
) -> Result<PadMapping, BridgeError> {
    let mut calibrator = Calibrator::new();

    log::info!("{}", calibrator.instruction());

    let mapping = loop {
        let input = tokio::select! {
            v = rx.recv() => v,
            _ = token.cancelled() => None,
        };

        let Some(input) = input else {
            log::info!("Calibration ended early, filling remaining pads");
            break calibrator.finish();
        };

        let Input::Message(message) = input else {
            continue;
        };

        if message.topic != pad_topic {
            continue;
        }

        match calibrator.feed_frame(&message.payload) {
            CalibrationOutcome::Ignored => {}
            CalibrationOutcome::Assigned { .. } => {
                log::debug!("Mapping so far: {:?}", calibrator.mapping());
                log::info!("{}", calibrator.instruction());
            }
            CalibrationOutcome::Complete(mapping) => {
                log::info!("{}", calibrator.instruction());
                break mapping;
            }
        }
    };

    log::info!("Pad mapping: {:?}", mapping);

    store.save(&mapping)?;

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{channel, unbounded_channel};

    use super::*;
    use crate::{
        keys::{InputSource, KeyEvent, LogicalKey},
        sink::{Registration, print_events_task},
        source::keyboard_reader,
        store::memory::MemoryStore,
    };

    fn topics() -> Topics {
        Topics {
            pad: "dance/mat".to_string(),
            visibility: "dance/mat/visibility".to_string(),
        }
    }

    fn message(topic: &str, payload: &str) -> Input {
        Input::Message(Message {
            topic: topic.to_string(),
            payload: payload.to_string(),
        })
    }

    #[test]
    fn pad_and_keyboard_share_one_sink() {
        let (registration, table) = Registration::table();
        let mut bridge = Bridge::new(topics(), None, registration);

        bridge.handle(message("dance/mat", "0,0,0,1,0,0,0,0,0"));
        bridge.handle(Input::Key(KeyEvent::press(LogicalKey::D, InputSource::Keyboard)));

        let held = table.lock().unwrap().held_keys();
        assert_eq!(held, vec![LogicalKey::A, LogicalKey::D]);
    }

    #[test]
    fn keyboard_tap_reaches_the_table() {
        let (tx, mut rx) = channel(8);
        keyboard_reader("a\n".as_bytes(), tx);

        let (registration, table) = Registration::table();
        let mut bridge = Bridge::new(topics(), None, registration);
        while let Ok(input) = rx.try_recv() {
            bridge.handle(input);
        }

        let mut table = table.lock().unwrap();
        assert_eq!(table.tick(), vec![LogicalKey::A]);
        assert!(table.tick().is_empty());
    }

    #[tokio::test]
    async fn printer_gets_shutdown_releases() {
        let (input_tx, input_rx) = channel(8);
        let (tx, rx) = unbounded_channel();
        let mut out = Vec::new();
        let mut bridge = Bridge::new(topics(), None, Registration::Events(tx));

        bridge.handle(message("dance/mat", "0,0,0,0,1,0,0,0,0"));

        let token = CancellationToken::new();
        token.cancel();
        let (_, printed) = tokio::join!(
            bridge_task(bridge, input_rx, token),
            print_events_task(&mut out, rx)
        );
        printed.unwrap();
        drop(input_tx);

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.contains(r#"{"key":"s","transition":"press","source":"pad"}"#));
        assert!(out.contains(r#"{"key":"s","transition":"release","source":"pad"}"#));
    }

    #[test]
    fn hidden_page_releases_pads() {
        let (tx, mut rx) = unbounded_channel();
        let mut bridge = Bridge::new(
            topics(),
            Some(PadMapping::identity()),
            Registration::Events(tx),
        );

        bridge.handle(message("dance/mat", "0,0,0,1,0,0,0,0,0"));
        bridge.handle(message("dance/mat/visibility", "visible"));
        bridge.handle(message("dance/mat/visibility", "hidden"));

        assert_eq!(rx.try_recv().unwrap(), KeyEvent::press(LogicalKey::A, InputSource::Pad));
        assert_eq!(rx.try_recv().unwrap(), KeyEvent::release(LogicalKey::A, InputSource::Pad));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn other_topics_are_ignored() {
        let (tx, mut rx) = unbounded_channel();
        let mut bridge = Bridge::new(topics(), None, Registration::Events(tx));

        bridge.handle(message("other/mat", "1,0,0,0,0,0,0,0,0"));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bridge_task_releases_on_shutdown() {
        let (input_tx, input_rx) = channel(8);
        let (tx, mut rx) = unbounded_channel();
        let bridge = Bridge::new(topics(), None, Registration::Events(tx));

        input_tx.send(message("dance/mat", "0,0,0,0,0,0,0,0,1")).await.unwrap();
        drop(input_tx);

        bridge_task(bridge, input_rx, CancellationToken::new()).await;

        assert_eq!(rx.recv().await, Some(KeyEvent::press(LogicalKey::C, InputSource::Pad)));
        assert_eq!(rx.recv().await, Some(KeyEvent::release(LogicalKey::C, InputSource::Pad)));
    }

    #[tokio::test]
    async fn calibration_saves_finalized_mapping() {
        let (tx, rx) = channel(32);
        let store = MemoryStore::default();

        for frame in [
            "0,0,0,1,0,0,0,0,0",
            "0,0,0,0,0,0,0,0,0",
            "1,1,0,0,0,0,0,0,0",
            "1,0,0,0,0,0,0,0,0",
            "0,0,0,0,0,0,0,0,0",
            "0,1,0,0,0,0,0,0,0",
        ] {
            tx.send(message("dance/mat", frame)).await.unwrap();
        }
        tx.send(Input::Key(KeyEvent::press(LogicalKey::C, InputSource::Keyboard)))
            .await
            .unwrap();
        drop(tx);

        let mapping =
            calibration_task("dance/mat".to_string(), &store, rx, CancellationToken::new())
                .await
                .unwrap();

        let expected = [1, 2, 3, 0, 4, 5, 6, 7, 8];
        for (physical, slot) in expected.into_iter().enumerate() {
            assert_eq!(mapping.get(physical), Some(slot));
        }
        assert_eq!(*store.slot.borrow(), Some(mapping));
    }

    #[tokio::test]
    async fn calibration_completes_on_ninth_pad() {
        let (tx, rx) = channel(32);
        let store = MemoryStore::default();

        for pad in 0..9 {
            let frame: Vec<&str> = (0..9).map(|i| if i == pad { "1" } else { "0" }).collect();
            tx.send(message("dance/mat", &frame.join(","))).await.unwrap();
            tx.send(message("dance/mat", "0,0,0,0,0,0,0,0,0")).await.unwrap();
        }

        let mapping =
            calibration_task("dance/mat".to_string(), &store, rx, CancellationToken::new())
                .await
                .unwrap();

        assert_eq!(mapping, PadMapping::identity());
        assert_eq!(*store.slot.borrow(), Some(PadMapping::identity()));
    }
}
