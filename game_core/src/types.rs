// Strong typing over strings. Emotions, modes and phases are closed enums;
// labels only exist at the JS boundary.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Lives granted at the start of every session.
pub const MAX_LIVES: u8 = 3;

/// Countdown value of a fresh round.
pub const FULL_TIME: u8 = 100;

/// Number of answer buttons shown per round.
pub const OPTION_COUNT: usize = 4;

/// Points for a correct answer before the streak multiplier.
pub const BASE_POINTS: u32 = 10;

/// Facial expression a round can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Neutral,
    Contempt,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Neutral,
        Emotion::Contempt,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Surprised => "Surprised",
            Emotion::Fearful => "Fearful",
            Emotion::Disgusted => "Disgusted",
            Emotion::Neutral => "Neutral",
            Emotion::Contempt => "Contempt",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Emotion::Happy => "😀",
            Emotion::Sad => "😢",
            Emotion::Angry => "😠",
            Emotion::Surprised => "😮",
            Emotion::Fearful => "😨",
            Emotion::Disgusted => "🤢",
            Emotion::Neutral => "😐",
            Emotion::Contempt => "😒",
        }
    }

    /// Look up an emotion by its display label. Exact match only.
    pub fn from_label(label: &str) -> Option<Emotion> {
        Emotion::ALL.into_iter().find(|e| e.label() == label)
    }
}

impl Serialize for Emotion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Emotion", 2)?;
        state.serialize_field("label", self.label())?;
        state.serialize_field("emoji", self.emoji())?;
        state.end()
    }
}

/// How the player answers and what the prompt shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Face image, answer by label.
    #[default]
    Classic,
    /// Face image, answer by emoji.
    Emoji,
    /// Webcam placeholder: the target is shown as instruction text.
    Mirror,
}

impl GameMode {
    /// Value stored in the backend's `game_mode` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Emoji => "emoji",
            GameMode::Mirror => "mirror",
        }
    }

    /// Inverse of `as_str`.
    pub fn from_name(name: &str) -> Option<GameMode> {
        [GameMode::Classic, GameMode::Emoji, GameMode::Mirror]
            .into_iter()
            .find(|mode| mode.as_str() == name)
    }
}

/// Top-level game phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Menu,
    Playing,
    GameOver,
}

/// Streak multiplier formula applied to correct answers.
///
/// Two formulas shipped side by side in the game's history. `Linear` is the
/// canonical one; `Tiered` is kept for hosts that still want the older
/// per-screen behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringRule {
    /// `round(10 * min(3, 1 + streak / 10))`.
    #[default]
    Linear,
    /// `10 * (floor(streak / 3) + 1)`.
    Tiered,
}

impl ScoringRule {
    /// Points for a correct answer. `streak` already includes this answer.
    pub fn points(&self, streak: u32) -> u32 {
        match self {
            // 10 * (1 + s/10) == 10 + s, so the rounding is exact.
            ScoringRule::Linear => BASE_POINTS.saturating_add(streak).min(3 * BASE_POINTS),
            ScoringRule::Tiered => BASE_POINTS.saturating_mul(streak / 3 + 1),
        }
    }
}

/// Countdown granularity. Both drain a full round in roughly three seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// One unit every 30ms.
    #[default]
    Coarse,
    /// Two units every 60ms.
    Fine,
}

impl Cadence {
    pub fn interval_ms(&self) -> u32 {
        match self {
            Cadence::Coarse => 30,
            Cadence::Fine => 60,
        }
    }

    pub fn step(&self) -> u8 {
        match self {
            Cadence::Coarse => 1,
            Cadence::Fine => 2,
        }
    }
}

/// Hosted backend credentials. Absent or blank means offline play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

impl BackendConfig {
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

/// Game configuration passed from JS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub scoring: ScoringRule,
    #[serde(default)]
    pub cadence: Cadence,
    /// localStorage key holding the high score.
    #[serde(default = "default_high_score_key")]
    pub high_score_key: String,
    /// Avatar service endpoint; `seed` and `mouth` are appended as query params.
    #[serde(default = "default_avatar_base_url")]
    pub avatar_base_url: String,
    #[serde(default)]
    pub backend: Option<BackendConfig>,
    /// Fixed RNG seed for replays. Entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_high_score_key() -> String {
    "mindmorph_highscore".to_string()
}

fn default_avatar_base_url() -> String {
    "https://api.dicebear.com/7.x/avataaars/svg".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            scoring: ScoringRule::default(),
            cadence: Cadence::default(),
            high_score_key: default_high_score_key(),
            avatar_base_url: default_avatar_base_url(),
            backend: None,
            seed: None,
        }
    }
}

/// Read-only view of the session handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub mode: GameMode,
    pub score: u32,
    pub lives: u8,
    pub streak: u32,
    pub high_score: u32,
    pub time_remaining: u8,
    /// Streak of five or more.
    pub hot_streak: bool,
}
