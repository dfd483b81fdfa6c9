use rand::{Rng, seq::SliceRandom};
use url::form_urlencoded;

use crate::{
    error::BridgeError,
    roster::{Player, game_def, roulette_candidates},
};

pub const READY_LINK: &str = "ready/ready.html";

const DEFAULT_MUSIC: [&str; 5] = ["classical", "jazz", "rock", "electronic", "ambient"];

/// What the roulette hands to the pad setup screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub game: Option<String>,
    pub players: Vec<String>,
    pub music: Option<String>,
}

impl Session {
    /// Spins game, players and music over the roster, `None` without players
    pub fn roulette<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Option<Session> {
        if players.is_empty() {
            return None;
        }

        let total = players.len();
        let seats = |game: &str| game_def(game).map_or(total, |def| total.min(def.max_players));
        let playable = |game: &String| game_def(game).is_none_or(|def| def.accepts(seats(game)));

        let mut games: Vec<String> = roulette_candidates(players)
            .into_iter()
            .filter(playable)
            .collect();
        if games.is_empty() {
            games = roulette_candidates(&[]).into_iter().filter(playable).collect();
        }
        let game = games.choose(rng)?.clone();

        let mut names: Vec<String> = players.iter().map(|p| p.name.clone()).collect();
        names.shuffle(rng);
        names.truncate(seats(&game));

        let mut prefs: Vec<String> = Vec::new();
        for music in players.iter().filter_map(|p| p.music.as_ref()) {
            if !prefs.contains(music) {
                prefs.push(music.clone());
            }
        }
        if prefs.is_empty() {
            prefs = DEFAULT_MUSIC.iter().map(|m| m.to_string()).collect();
        }
        let music = prefs.choose(rng).cloned();

        log::debug!("Roulette picked {} for {:?}", game, names);

        Some(Session {
            game: Some(game),
            players: names,
            music,
        })
    }

    /// Pad setup is sized by this; an empty list still means one mat
    pub fn player_count(&self) -> usize {
        self.players.len().max(1)
    }

    /// `game=..&players=a,b&music=..`
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());

        if let Some(game) = &self.game {
            query.append_pair("game", game);
        }
        query.append_pair("players", &self.players.join(","));
        if let Some(music) = &self.music {
            query.append_pair("music", music);
        }

        query.finish()
    }

    pub fn link(&self) -> String {
        format!("{}?{}", READY_LINK, self.to_query())
    }

    /// Empty values count as absent; a known game must accept the player count
    pub fn from_query(query: &str) -> Result<Session, BridgeError> {
        let mut session = Session::default();

        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.trim();
            match key.as_ref() {
                "game" if !value.is_empty() => session.game = Some(value.to_string()),
                "music" if !value.is_empty() => session.music = Some(value.to_string()),
                "players" => {
                    session.players = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }

        let def = session.game.as_deref().and_then(game_def);
        if let Some(def) = def.filter(|def| !def.accepts(session.player_count())) {
            return Err(BridgeError::Session(format!(
                "{} takes {}-{} players, got {}",
                def.name,
                def.min_players,
                def.max_players,
                session.player_count()
            )));
        }

        Ok(session)
    }
}
