// Round generation and answer judging.
// A round is one target expression, four options, one prompt. Judging is pure;
// the session applies the result.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::types::*;

/// Avatar seeds are drawn from `0..AVATAR_SEED_RANGE`.
const AVATAR_SEED_RANGE: u32 = 1000;

/// What the player is shown for the current round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    /// Generated face from the avatar service.
    Avatar {
        seed: u32,
        mouth: &'static str,
        url: String,
    },
    /// Mirror mode: no image, just the expression to copy.
    Instruction { text: String },
}

/// A single round. Replaced wholesale when the next round starts.
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub target: Emotion,
    /// Presentation order; unique labels, always contains `target` once.
    pub options: Vec<Emotion>,
    pub prompt: Prompt,
    pub time_remaining: u8,
}

/// Outcome of judging one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Judgement {
    pub correct: bool,
    pub points_earned: u32,
}

impl Round {
    /// Judge a selection against this round.
    ///
    /// `streak` is the streak *before* this answer; a correct answer is scored
    /// with the incremented value. `None` stands for an unrecognised answer and
    /// is always wrong.
    pub fn judge(&self, selected: Option<Emotion>, streak: u32, rule: ScoringRule) -> Judgement {
        let correct = selected == Some(self.target);
        let points_earned = if correct {
            rule.points(streak.saturating_add(1))
        } else {
            0
        };

        Judgement {
            correct,
            points_earned,
        }
    }
}

/// Mouth tokens understood by the avatar service for each emotion.
pub fn mouth_shapes(emotion: Emotion) -> &'static [&'static str] {
    match emotion {
        Emotion::Happy => &["smile", "twinkle"],
        Emotion::Sad => &["sad", "concerned"],
        Emotion::Angry => &["screamOpen", "serious"],
        Emotion::Surprised => &["open", "disbelief"],
        Emotion::Fearful => &["concerned", "screamOpen"],
        Emotion::Disgusted => &["disbelief", "vomit"],
        Emotion::Neutral => &["serious", "default"],
        Emotion::Contempt => &["grimace", "serious"],
    }
}

/// Builds rounds from an owned RNG.
pub struct RoundEngine {
    rng: StdRng,
    avatar_base_url: String,
}

impl RoundEngine {
    pub fn new(seed: Option<u64>, avatar_base_url: impl Into<String>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        RoundEngine {
            rng,
            avatar_base_url: avatar_base_url.into(),
        }
    }

    /// Pick a target, build the option set and the prompt.
    pub fn start_round(&mut self, mode: GameMode) -> Round {
        let target = Emotion::ALL[self.rng.gen_range(0..Emotion::ALL.len())];
        let options = self.build_options(target);

        let prompt = match mode {
            GameMode::Classic | GameMode::Emoji => self.avatar_prompt(target),
            GameMode::Mirror => Prompt::Instruction {
                text: format!("Try to match the expression: {}", target.label()),
            },
        };

        Round {
            target,
            options,
            prompt,
            time_remaining: FULL_TIME,
        }
    }

    fn build_options(&mut self, target: Emotion) -> Vec<Emotion> {
        let mut options: Vec<Emotion> = Emotion::ALL
            .choose_multiple(&mut self.rng, OPTION_COUNT)
            .copied()
            .collect();

        if !options.contains(&target) {
            options.pop();
            options.push(target);
        }

        options.shuffle(&mut self.rng);
        options
    }

    fn avatar_prompt(&mut self, target: Emotion) -> Prompt {
        let shapes = mouth_shapes(target);
        let mouth = shapes[self.rng.gen_range(0..shapes.len())];
        let seed = self.rng.gen_range(0..AVATAR_SEED_RANGE);

        Prompt::Avatar {
            seed,
            mouth,
            url: format!("{}?seed={}&mouth={}", self.avatar_base_url, seed, mouth),
        }
    }
}
