// Session state machine: Menu -> Playing -> GameOver -> Menu.
// Owns lives/score/streak and the single countdown. Every transition arms or
// cancels the timer explicitly; nothing re-runs implicitly.

use serde::Serialize;

use crate::round::{Judgement, Round, RoundEngine};
use crate::storage::HighScoreStore;
use crate::timer::{TickScheduler, TimerId};
use crate::types::*;

/// Notifications produced by the controller, drained by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    RoundStarted { round_number: u32 },
    AnswerJudged { correct: bool, points_earned: u32 },
    TimeExpired,
    GameOver { final_score: u32, new_high_score: bool },
    ReturnedToMenu,
}

/// Drives one player's sessions. Not reentrant: callers serialize
/// `submit_answer` and `tick` (the JS event loop does this for us).
pub struct SessionController {
    scoring: ScoringRule,
    cadence: Cadence,
    engine: RoundEngine,
    store: Box<dyn HighScoreStore>,
    scheduler: Box<dyn TickScheduler>,
    phase: Phase,
    mode: GameMode,
    score: u32,
    lives: u8,
    streak: u32,
    high_score: u32,
    round: Option<Round>,
    rounds_played: u32,
    active_timer: Option<TimerId>,
    last_timer: TimerId,
    events: Vec<SessionEvent>,
}

impl SessionController {
    pub fn new(
        config: &GameConfig,
        store: Box<dyn HighScoreStore>,
        scheduler: Box<dyn TickScheduler>,
    ) -> Self {
        let high_score = match store.load() {
            Ok(score) => score,
            Err(err) => {
                tracing::warn!("starting with empty high score: {}", err);
                0
            }
        };

        SessionController {
            scoring: config.scoring,
            cadence: config.cadence,
            engine: RoundEngine::new(config.seed, config.avatar_base_url.clone()),
            store,
            scheduler,
            phase: Phase::Menu,
            mode: GameMode::default(),
            score: 0,
            lives: MAX_LIVES,
            streak: 0,
            high_score,
            round: None,
            rounds_played: 0,
            active_timer: None,
            last_timer: TimerId::default(),
            events: Vec::new(),
        }
    }

    /// Begin a fresh session from any phase.
    pub fn start_game(&mut self, mode: GameMode) {
        self.disarm_timer();

        self.phase = Phase::Playing;
        self.mode = mode;
        self.score = 0;
        self.lives = MAX_LIVES;
        self.streak = 0;
        self.rounds_played = 0;

        tracing::info!(mode = mode.as_str(), "session started");
        self.next_round();
        self.arm_timer();
    }

    /// Judge the player's pick for the current round.
    ///
    /// `None` is an answer that matched no known emotion; it counts as wrong.
    /// Returns `None` when no round is in play.
    pub fn submit_answer(&mut self, selected: Option<Emotion>) -> Option<Judgement> {
        if self.phase != Phase::Playing {
            tracing::debug!(phase = ?self.phase, "answer ignored outside play");
            return None;
        }

        let judgement = self
            .round
            .as_ref()?
            .judge(selected, self.streak, self.scoring);

        self.events.push(SessionEvent::AnswerJudged {
            correct: judgement.correct,
            points_earned: judgement.points_earned,
        });

        if judgement.correct {
            self.streak = self.streak.saturating_add(1);
            self.score = self.score.saturating_add(judgement.points_earned);
            self.next_round();
        } else {
            self.lose_life();
        }

        Some(judgement)
    }

    /// Advance the countdown. Returns false for stale or out-of-phase ticks.
    pub fn tick(&mut self, timer: TimerId) -> bool {
        if self.phase != Phase::Playing || self.active_timer != Some(timer) {
            tracing::trace!(timer = timer.as_u32(), "stale tick dropped");
            return false;
        }

        let step = self.cadence.step();
        let expired = match self.round.as_mut() {
            Some(round) => {
                round.time_remaining = round.time_remaining.saturating_sub(step);
                round.time_remaining == 0
            }
            None => return false,
        };

        if expired {
            tracing::debug!(lives = self.lives, "round timed out");
            self.events.push(SessionEvent::TimeExpired);
            self.lose_life();
        }

        true
    }

    /// Leave play or the game-over screen. No-op when already on the menu.
    pub fn return_to_menu(&mut self) {
        if self.phase == Phase::Menu {
            return;
        }

        self.disarm_timer();
        self.phase = Phase::Menu;
        self.round = None;
        // Zero lives is reserved for the game-over screen.
        self.lives = MAX_LIVES;
        self.events.push(SessionEvent::ReturnedToMenu);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            mode: self.mode,
            score: self.score,
            lives: self.lives,
            streak: self.streak,
            high_score: self.high_score,
            // No clock runs on the menu or the game-over screen.
            time_remaining: match (self.phase, self.round.as_ref()) {
                (Phase::Playing, Some(round)) => round.time_remaining,
                _ => 0,
            },
            hot_streak: self.streak >= 5,
        }
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn active_timer(&self) -> Option<TimerId> {
        self.active_timer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Drain notifications accumulated since the last call.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn lose_life(&mut self) {
        self.streak = 0;
        self.lives = self.lives.saturating_sub(1);

        if self.lives == 0 {
            self.end_session();
        } else {
            self.next_round();
        }
    }

    fn next_round(&mut self) {
        self.round = Some(self.engine.start_round(self.mode));
        self.rounds_played = self.rounds_played.saturating_add(1);
        self.events.push(SessionEvent::RoundStarted {
            round_number: self.rounds_played,
        });
    }

    fn end_session(&mut self) {
        self.disarm_timer();
        self.phase = Phase::GameOver;
        self.round = None;

        let new_high_score = self.score > self.high_score;
        if new_high_score {
            self.high_score = self.score;
            if let Err(err) = self.store.save(self.score) {
                tracing::warn!(score = self.score, "high score not persisted: {}", err);
            }
        }

        tracing::info!(score = self.score, new_high_score, "session over");
        self.events.push(SessionEvent::GameOver {
            final_score: self.score,
            new_high_score,
        });
    }

    fn arm_timer(&mut self) {
        self.disarm_timer();

        let timer = self.last_timer.next();
        self.last_timer = timer;
        self.active_timer = Some(timer);
        self.scheduler.start(timer, self.cadence.interval_ms());
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.active_timer.take() {
            self.scheduler.cancel(timer);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disarm_timer();
    }
}
