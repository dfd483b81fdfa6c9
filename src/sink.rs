use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::interval,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{KEY_MAP, PAD_COUNT},
    keys::{KeyEvent, LogicalKey, Transition},
};

/// Receiver of logical key events
pub trait InputSink {
    fn dispatch(&mut self, event: KeyEvent);
}

/// Held/not-held table polled by game loops each tick.
///
/// A press always survives until one `tick` has seen it; a release that
/// arrives earlier is applied right after that tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyTable {
    held: [bool; PAD_COUNT],
    seen: [bool; PAD_COUNT],
    pending_release: [bool; PAD_COUNT],
}

impl KeyTable {
    pub fn is_held(&self, key: LogicalKey) -> bool {
        self.held[key.slot()]
    }

    pub fn held_keys(&self) -> Vec<LogicalKey> {
        KEY_MAP.into_iter().filter(|k| self.is_held(*k)).collect()
    }

    /// One game-loop frame: the keys held for it, then late releases land
    pub fn tick(&mut self) -> Vec<LogicalKey> {
        let held = self.held_keys();

        for slot in 0..PAD_COUNT {
            if self.held[slot] {
                self.seen[slot] = true;
            }
            if self.pending_release[slot] {
                self.held[slot] = false;
                self.pending_release[slot] = false;
            }
        }

        held
    }
}

impl InputSink for KeyTable {
    fn dispatch(&mut self, event: KeyEvent) {
        let slot = event.key.slot();

        match event.transition {
            Transition::Press => {
                self.held[slot] = true;
                self.seen[slot] = false;
                self.pending_release[slot] = false;
            }
            Transition::Release if self.held[slot] && !self.seen[slot] => {
                self.pending_release[slot] = true;
            }
            Transition::Release => self.held[slot] = false,
        }
    }
}

pub type SharedKeyTable = Arc<Mutex<KeyTable>>;

/// What a screen declares it wants when it starts
#[derive(Debug, Clone)]
pub enum Registration {
    /// Direct state table, read by a ticking game loop
    Table(SharedKeyTable),
    /// Discrete events, one per transition
    Events(UnboundedSender<KeyEvent>),
}

impl Registration {
    pub fn table() -> (Self, SharedKeyTable) {
        let table = SharedKeyTable::default();
        (Registration::Table(table.clone()), table)
    }
}

impl InputSink for Registration {
    fn dispatch(&mut self, event: KeyEvent) {
        match self {
            Registration::Table(table) => match table.lock() {
                Ok(mut table) => table.dispatch(event),
                Err(poisoned) => poisoned.into_inner().dispatch(event),
            },
            Registration::Events(tx) => {
                if tx.send(event).is_err() {
                    log::debug!("Event consumer is gone, dropping {:?}", event);
                }
            }
        }
    }
}

/// Writes each event as one JSON line until the bridge drops its sender,
/// so the releases sent on shutdown still get out
pub async fn print_events_task<W: AsyncWrite + Unpin>(
    mut out: W,
    mut rx: UnboundedReceiver<KeyEvent>,
) -> Result<(), crate::error::BridgeError> {
    while let Some(event) = rx.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        out.write_all(&line).await?;
        out.flush().await?;
    }

    Ok(())
}

/// Polls the table every `tick` like a game loop and logs the held keys when they change
pub async fn watch_table_task(table: SharedKeyTable, tick: Duration, token: CancellationToken) {
    let mut ticker = interval(tick);
    let mut last = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = token.cancelled() => break,
        }

        let current = match table.lock() {
            Ok(mut table) => table.tick(),
            Err(poisoned) => poisoned.into_inner().tick(),
        };

        if current != last {
            let held: String = current.iter().map(LogicalKey::as_char).collect();
            log::info!("Held: [{}]", held);
            last = current;
        }
    }
}
