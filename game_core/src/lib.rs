// game_core: MindMorph Rust/WASM engine
// Rounds, scoring, lives and the countdown live here; JS renders and forwards clicks.

mod backend;
mod error;
mod round;
mod session;
mod storage;
mod timer;
mod types;

use js_sys::Function;
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub use backend::{
    connect, ensure_user, leaderboard_params, rank_entries, save_profile, validate_username,
    AnonymousUser, Backend, LeaderboardBackend, LeaderboardEntry, NullBackend, Profile,
    RestBackend, ScoreRecord,
};
pub use error::GameError;
pub use round::{mouth_shapes, Judgement, Prompt, Round, RoundEngine};
pub use session::{SessionController, SessionEvent};
pub use storage::{HighScoreStore, LocalStorageStore, MemoryStore};
pub use timer::{JsIntervalScheduler, NoopScheduler, TickScheduler, TimerId};
pub use types::*;

/// Initialize panic hook and console logging.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
}

/// Everything the UI needs after a call, in one crossing.
#[derive(Debug, Serialize)]
struct GameUpdate<'a> {
    state: SessionSnapshot,
    round: Option<&'a Round>,
    events: Vec<SessionEvent>,
}

/// Main game interface exposed to JavaScript.
/// Every mutating call returns a JSON `GameUpdate`.
#[wasm_bindgen]
pub struct Game {
    session: SessionController,
}

#[wasm_bindgen]
impl Game {
    /// Browser game: high score in localStorage, countdown driven by JS.
    ///
    /// `start_timer(id, ms)` must call `game.tick(id)` every `ms` milliseconds
    /// until `cancel_timer(id)` is called.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: &str,
        start_timer: Function,
        cancel_timer: Function,
    ) -> Result<Game, JsValue> {
        let config = parse_config(config_json)?;
        let store = LocalStorageStore::new(config.high_score_key.clone());
        let scheduler = JsIntervalScheduler::new(start_timer, cancel_timer);

        Ok(Game {
            session: SessionController::new(&config, Box::new(store), Box::new(scheduler)),
        })
    }

    /// In-memory high score, no timer callbacks; the host calls `tick`
    /// with `active_timer()` itself.
    pub fn headless(config_json: &str) -> Result<Game, JsValue> {
        let config = parse_config(config_json)?;

        Ok(Game {
            session: SessionController::new(
                &config,
                Box::new(MemoryStore::new()),
                Box::new(NoopScheduler),
            ),
        })
    }

    /// `mode` is "classic", "emoji" or "mirror".
    pub fn start_game(&mut self, mode: &str) -> Result<String, JsValue> {
        let mode = GameMode::from_name(mode)
            .ok_or_else(|| GameError::InvalidConfig(format!("unknown game mode: {}", mode)))?;
        self.session.start_game(mode);
        self.update()
    }

    /// Submit the label of the clicked option. Unknown labels count as wrong.
    pub fn submit_answer(&mut self, label: &str) -> Result<String, JsValue> {
        self.session.submit_answer(Emotion::from_label(label));
        self.update()
    }

    pub fn tick(&mut self, timer_id: u32) -> Result<String, JsValue> {
        self.session.tick(TimerId::new(timer_id));
        self.update()
    }

    pub fn return_to_menu(&mut self) -> Result<String, JsValue> {
        self.session.return_to_menu();
        self.update()
    }

    /// Id of the running countdown, if any.
    pub fn active_timer(&self) -> Option<u32> {
        self.session.active_timer().map(|timer| timer.as_u32())
    }

    pub fn high_score(&self) -> u32 {
        self.session.high_score()
    }
}

impl Game {
    fn update(&mut self) -> Result<String, JsValue> {
        let events = self.session.take_events();
        let update = GameUpdate {
            state: self.session.snapshot(),
            round: self.session.current_round(),
            events,
        };

        serde_json::to_string(&update)
            .map_err(|e| GameError::Serialization(e.to_string()).into())
    }
}

fn parse_config(config_json: &str) -> Result<GameConfig, GameError> {
    serde_json::from_str(config_json).map_err(|e| GameError::InvalidConfig(e.to_string()))
}
