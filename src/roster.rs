use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Registered player as listed by the registration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub music: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameDef {
    pub key: &'static str,
    pub name: &'static str,
    pub min_players: usize,
    pub max_players: usize,
}

impl GameDef {
    pub fn accepts(&self, players: usize) -> bool {
        (self.min_players..=self.max_players).contains(&players)
    }
}

pub const GAME_DEFS: [GameDef; 4] = [
    GameDef {
        key: "snake-game",
        name: "Snake Game",
        min_players: 2,
        max_players: 4,
    },
    GameDef {
        key: "tank-game",
        name: "Tank Game",
        min_players: 2,
        max_players: 2,
    },
    GameDef {
        key: "shooting-game",
        name: "Shooting Game",
        min_players: 1,
        max_players: 3,
    },
    GameDef {
        key: "basket-game",
        name: "Basket Game",
        min_players: 1,
        max_players: 4,
    },
];

pub fn game_def(key: &str) -> Option<&'static GameDef> {
    GAME_DEFS.iter().find(|def| def.key == key)
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What the registration form posts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPlayer {
    pub name: String,
    pub game: Option<String>,
    pub music: Option<String>,
    pub timestamp: String,
}

impl NewPlayer {
    /// Trims the name and stamps the registration time
    pub fn new(name: &str, game: Option<String>, music: Option<String>) -> Result<Self, BridgeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::Registration(
                "Please enter at least 1 character.".to_string(),
            ));
        }

        Ok(NewPlayer {
            name: name.to_string(),
            game,
            music,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Registered {
    message: Option<String>,
}

fn roster_error(err: reqwest::Error) -> BridgeError {
    BridgeError::Roster(err.to_string())
}

/// HTTP client for the registration service
#[derive(Debug, Clone)]
pub struct RosterClient {
    http: reqwest::Client,
    base_url: String,
}

impl RosterClient {
    pub fn new(base_url: &str) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(roster_error)?;

        Ok(RosterClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `GET /players`
    pub async fn fetch_players(&self) -> Result<Vec<Player>, BridgeError> {
        self.http
            .get(format!("{}/players", self.base_url))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(roster_error)?
            .json()
            .await
            .map_err(roster_error)
    }

    /// `POST /`, returns the service's confirmation message
    pub async fn register_player(&self, player: &NewPlayer) -> Result<String, BridgeError> {
        let response = self
            .http
            .post(format!("{}/", self.base_url))
            .json(player)
            .send()
            .await
            .map_err(roster_error)?;

        let status = response.status();
        let body = response.text().await.map_err(roster_error)?;

        if !status.is_success() {
            log::warn!("Registration of {} rejected with {}", player.name, status);
            let reason = if body.trim().is_empty() {
                "Registration failed".to_string()
            } else {
                body
            };
            return Err(BridgeError::Roster(reason));
        }

        let message = serde_json::from_str::<Registered>(&body)
            .ok()
            .and_then(|registered| registered.message)
            .unwrap_or_else(|| "Registration completed.".to_string());

        Ok(message)
    }
}

/// Games the roulette spins over: the ones players registered for, or every game if none did
pub fn roulette_candidates(players: &[Player]) -> Vec<String> {
    let mut games: Vec<String> = Vec::new();

    for game in players.iter().filter_map(|p| p.game.as_ref()) {
        if !games.contains(game) {
            games.push(game.clone());
        }
    }

    if games.is_empty() {
        games = GAME_DEFS.iter().map(|def| def.key.to_string()).collect();
    }

    games
}
