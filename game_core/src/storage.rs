// High score persistence behind a small trait so the session can be tested
// without a browser.

use crate::error::GameError;

/// Loads and saves the single persisted high score.
pub trait HighScoreStore {
    fn load(&self) -> Result<u32, GameError>;
    fn save(&mut self, score: u32) -> Result<(), GameError>;
}

/// In-process store. Survives across sessions of one controller.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    value: Option<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_score(score: u32) -> Self {
        MemoryStore { value: Some(score) }
    }
}

impl HighScoreStore for MemoryStore {
    fn load(&self) -> Result<u32, GameError> {
        Ok(self.value.unwrap_or(0))
    }

    fn save(&mut self, score: u32) -> Result<(), GameError> {
        self.value = Some(score);
        Ok(())
    }
}

/// Browser `localStorage` under a single key.
pub struct LocalStorageStore {
    key: String,
}

impl LocalStorageStore {
    pub fn new(key: impl Into<String>) -> Self {
        LocalStorageStore { key: key.into() }
    }

    fn storage(&self) -> Result<web_sys::Storage, GameError> {
        let window =
            web_sys::window().ok_or_else(|| GameError::Storage("no global window".to_string()))?;
        window
            .local_storage()
            .map_err(|e| GameError::Storage(format!("{:?}", e)))?
            .ok_or_else(|| GameError::Storage("localStorage unavailable".to_string()))
    }
}

impl HighScoreStore for LocalStorageStore {
    fn load(&self) -> Result<u32, GameError> {
        let raw = self
            .storage()?
            .get_item(&self.key)
            .map_err(|e| GameError::Storage(format!("{:?}", e)))?;

        Ok(raw.as_deref().map(parse_stored_score).unwrap_or(0))
    }

    fn save(&mut self, score: u32) -> Result<(), GameError> {
        self.storage()?
            .set_item(&self.key, &score.to_string())
            .map_err(|e| GameError::Storage(format!("{:?}", e)))
    }
}

/// Parse a persisted value. Garbage reads as zero rather than failing startup.
pub fn parse_stored_score(raw: &str) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(score) => score,
        Err(_) => {
            tracing::warn!(value = raw, "ignoring unreadable stored high score");
            0
        }
    }
}
