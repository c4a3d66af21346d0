// Typed errors with thiserror. Surface meaningful messages to JS.
// Gameplay never fails on these; they stop at the storage/backend seams.

use thiserror::Error;
use wasm_bindgen::JsValue;

/// Game error types.
#[derive(Error, Debug)]
pub enum GameError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("High score storage error: {0}")]
    Storage(String),

    #[error("Backend request failed: {0}")]
    Backend(String),

    #[error("Please enter a username")]
    InvalidUsername,
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for GameError {
    fn from(err: reqwest::Error) -> Self {
        GameError::Backend(err.to_string())
    }
}

impl From<GameError> for JsValue {
    fn from(err: GameError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}
