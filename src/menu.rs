use tokio::{sync::mpsc::UnboundedReceiver, time::interval};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ROSTER_POLL,
    error::BridgeError,
    keys::{KeyEvent, LogicalKey},
    roster::{Player, RosterClient},
    session::Session,
};

const ROULETTE_MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    pub link: String,
}

impl MenuEntry {
    pub fn new(label: &str, link: &str) -> Self {
        MenuEntry {
            label: label.to_string(),
            link: link.to_string(),
        }
    }

    fn is_roulette(&self) -> bool {
        self.link.contains("Roulette")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    None,
    Highlight(usize),
    Navigate(String),
    /// Navigation refused, with the message to show inline
    Blocked(String),
    RefreshRoster,
}

/// Top-level menu: `a`/`d` move, `e` confirms, `x` refreshes the roster
#[derive(Debug, Clone)]
pub struct Menu {
    entries: Vec<MenuEntry>,
    index: usize,
    players: Vec<Player>,
    roster_error: bool,
}

impl Default for Menu {
    fn default() -> Self {
        Menu::new(vec![
            MenuEntry::new("Register", "Register/register.html"),
            MenuEntry::new("Roulette", "Roulette/roulette.html"),
            MenuEntry::new("Pad setup", "ready/ready.html"),
        ])
    }
}

impl Menu {
    pub fn new(entries: Vec<MenuEntry>) -> Self {
        Menu {
            entries,
            index: 0,
            players: Vec::new(),
            roster_error: false,
        }
    }

    pub fn current(&self) -> Option<&MenuEntry> {
        self.entries.get(self.index)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Count shown next to the menu, `Error` after a failed refresh
    pub fn player_count_label(&self) -> String {
        if self.roster_error {
            "Error".to_string()
        } else {
            self.players.len().to_string()
        }
    }

    /// A failed refresh keeps the last known players
    pub fn set_roster(&mut self, roster: Result<Vec<Player>, BridgeError>) {
        match roster {
            Ok(players) => {
                self.players = players;
                self.roster_error = false;
            }
            Err(err) => {
                log::error!("{}", err);
                self.roster_error = true;
            }
        }
    }

    pub fn handle(&mut self, event: &KeyEvent) -> MenuAction {
        if !event.is_press() || self.entries.is_empty() {
            return MenuAction::None;
        }

        let len = self.entries.len();

        match event.key {
            LogicalKey::A => {
                self.index = (self.index + len - 1) % len;
                MenuAction::Highlight(self.index)
            }
            LogicalKey::D => {
                self.index = (self.index + 1) % len;
                MenuAction::Highlight(self.index)
            }
            LogicalKey::E => self.confirm(),
            LogicalKey::X => MenuAction::RefreshRoster,
            _ => MenuAction::None,
        }
    }

    fn confirm(&self) -> MenuAction {
        let Some(entry) = self.current() else {
            return MenuAction::None;
        };

        let count = self.players.len();
        if entry.is_roulette() && count < ROULETTE_MIN_PLAYERS {
            let need = ROULETTE_MIN_PLAYERS - count;
            return MenuAction::Blocked(format!(
                "At least {} players are required to play the roulette. {} more player(s) needed.",
                ROULETTE_MIN_PLAYERS, need
            ));
        }

        MenuAction::Navigate(entry.link.clone())
    }
}

async fn refresh(menu: &mut Menu, roster: &RosterClient) {
    menu.set_roster(roster.fetch_players().await);
    log::info!("Players registered: {}", menu.player_count_label());
}

/// Drives the menu from the bridge's event stream, polling the roster in the background
pub async fn menu_task(
    mut menu: Menu,
    mut rx: UnboundedReceiver<KeyEvent>,
    roster: RosterClient,
    token: CancellationToken,
) {
    let mut poll = interval(ROSTER_POLL);

    if let Some(entry) = menu.current() {
        log::info!("Menu ready, selected: {}", entry.label);
    }

    loop {
        let event = tokio::select! {
            v = rx.recv() => match v {
                Some(event) => event,
                None => break,
            },
            _ = poll.tick() => {
                refresh(&mut menu, &roster).await;
                continue;
            },
            _ = token.cancelled() => break,
        };

        match menu.handle(&event) {
            MenuAction::None => {}
            MenuAction::Highlight(index) => {
                if let Some(entry) = menu.current() {
                    log::info!("Selected [{}] {}", index, entry.label);
                }
            }
            MenuAction::Navigate(link) => {
                log::info!("Navigate to {}", link);

                if link.contains("Roulette") {
                    let session = Session::roulette(menu.players(), &mut rand::thread_rng());
                    match session {
                        Some(session) => log::info!("Navigate to {}", session.link()),
                        None => log::warn!("Roulette has no players to seat"),
                    }
                }
            }
            MenuAction::Blocked(message) => log::warn!("{}", message),
            MenuAction::RefreshRoster => refresh(&mut menu, &roster).await,
        }
    }

    log::info!("Menu is shutting down");
}
