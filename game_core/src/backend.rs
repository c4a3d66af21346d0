// Hosted leaderboard and profile client.
// Optional capability: with no credentials every call is a no-op and the game
// stays fully playable offline. Failures are logged and degrade to None/empty.

use std::rc::Rc;

use async_trait::async_trait;
use js_sys::Promise;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::error::GameError;
use crate::types::{BackendConfig, GameConfig, GameMode};

/// Shown for scores whose profile is missing or has no name.
pub const ANONYMOUS_NAME: &str = "Anonymous";

const ANONYMOUS_EMAIL_DOMAIN: &str = "anonymous.com";

/// An anonymous account, freshly signed up or restored from a saved token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnonymousUser {
    pub id: String,
    /// Bearer token for row-level-security checks. The host persists it and
    /// hands it back to `ensure_user` on the next visit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Row of the `game_scores` table as returned after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: i64,
    pub user_id: String,
    pub score: u32,
    pub game_mode: String,
    pub created_at: String,
}

/// One ranked leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub id: i64,
    pub score: u32,
    pub game_mode: String,
    pub created_at: String,
    pub user_id: Option<String>,
    pub username: String,
}

/// Score row joined with its profile, as the REST API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreRow {
    pub id: i64,
    pub score: u32,
    pub game_mode: String,
    pub created_at: String,
    #[serde(default)]
    pub profiles: Option<ProfileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewScore<'a> {
    user_id: &'a str,
    score: u32,
    game_mode: &'a str,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct ProfileUpsert<'a> {
    id: &'a str,
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUp {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<UserRef>,
    /// Present instead of `user` when email confirmation is pending.
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    id: String,
}

/// Backend operations the game consumes.
#[async_trait(?Send)]
pub trait LeaderboardBackend {
    fn is_enabled(&self) -> bool;
    /// Use a previously issued access token as the bearer for later calls.
    fn restore_session(&self, access_token: &str);
    /// The account behind the current session; `None` without one.
    async fn current_user(&self) -> Option<AnonymousUser>;
    async fn create_anonymous_user(&self) -> Option<AnonymousUser>;
    async fn fetch_profile(&self, user_id: &str) -> Option<Profile>;
    async fn upsert_profile(&self, user_id: &str, username: &str) -> Option<Profile>;
    async fn insert_score(
        &self,
        user_id: &str,
        score: u32,
        mode: GameMode,
    ) -> Option<ScoreRecord>;
    /// Highest scores first, optionally restricted to one mode.
    async fn leaderboard(&self, limit: u32, mode: Option<GameMode>) -> Vec<LeaderboardEntry>;
}

/// Used when no backend is configured. Every call answers "nothing".
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait(?Send)]
impl LeaderboardBackend for NullBackend {
    fn is_enabled(&self) -> bool {
        false
    }

    fn restore_session(&self, _access_token: &str) {}

    async fn current_user(&self) -> Option<AnonymousUser> {
        None
    }

    async fn create_anonymous_user(&self) -> Option<AnonymousUser> {
        None
    }

    async fn fetch_profile(&self, _user_id: &str) -> Option<Profile> {
        None
    }

    async fn upsert_profile(&self, _user_id: &str, _username: &str) -> Option<Profile> {
        None
    }

    async fn insert_score(
        &self,
        _user_id: &str,
        _score: u32,
        _mode: GameMode,
    ) -> Option<ScoreRecord> {
        None
    }

    async fn leaderboard(&self, _limit: u32, _mode: Option<GameMode>) -> Vec<LeaderboardEntry> {
        Vec::new()
    }
}

/// PostgREST + auth endpoints of the hosted database.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: std::cell::RefCell<Option<String>>,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Self {
        RestBackend {
            client: reqwest::Client::new(),
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            anon_key: config.anon_key.trim().to_string(),
            access_token: std::cell::RefCell::new(None),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, endpoint)
    }

    fn with_bearer(
        &self,
        builder: reqwest::RequestBuilder,
        token: &str,
    ) -> reqwest::RequestBuilder {
        builder.header("apikey", self.anon_key.as_str()).bearer_auth(token)
    }

    /// Session token when signed in, anon key otherwise.
    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .access_token
            .borrow()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());
        self.with_bearer(builder, &token)
    }

    async fn try_current_user(&self) -> Result<Option<AnonymousUser>, GameError> {
        let Some(token) = self.access_token.borrow().clone() else {
            return Ok(None);
        };

        let user: UserRef = self
            .with_bearer(self.client.get(self.auth_url("user")), &token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Some(AnonymousUser {
            id: user.id,
            access_token: Some(token),
        }))
    }

    async fn try_create_anonymous_user(&self) -> Result<Option<AnonymousUser>, GameError> {
        // Sign-up never carries a stale session token.
        let response: SignUpResponse = self
            .with_bearer(self.client.post(self.auth_url("signup")), &self.anon_key)
            .json(&anonymous_credentials())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let user = parse_signup(response);
        if let Some(user) = &user {
            *self.access_token.borrow_mut() = user.access_token.clone();
        }
        Ok(user)
    }

    async fn try_fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, GameError> {
        let rows: Vec<Profile> = self
            .authorized(self.client.get(self.rest_url("profiles")))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", user_id))])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn try_upsert_profile(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<Option<Profile>, GameError> {
        let rows: Vec<Profile> = self
            .authorized(self.client.post(self.rest_url("profiles")))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[ProfileUpsert {
                id: user_id,
                username,
            }])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn try_insert_score(
        &self,
        user_id: &str,
        score: u32,
        mode: GameMode,
    ) -> Result<Option<ScoreRecord>, GameError> {
        let rows: Vec<ScoreRecord> = self
            .authorized(self.client.post(self.rest_url("game_scores")))
            .header("Prefer", "return=representation")
            .json(&NewScore {
                user_id,
                score,
                game_mode: mode.as_str(),
                created_at: chrono::Utc::now().to_rfc3339(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn try_leaderboard(
        &self,
        limit: u32,
        mode: Option<GameMode>,
    ) -> Result<Vec<LeaderboardEntry>, GameError> {
        let rows: Vec<ScoreRow> = self
            .authorized(self.client.get(self.rest_url("game_scores")))
            .query(&leaderboard_params(limit, mode))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rank_entries(rows))
    }
}

#[async_trait(?Send)]
impl LeaderboardBackend for RestBackend {
    fn is_enabled(&self) -> bool {
        true
    }

    fn restore_session(&self, access_token: &str) {
        let token = access_token.trim();
        *self.access_token.borrow_mut() = (!token.is_empty()).then(|| token.to_string());
    }

    async fn current_user(&self) -> Option<AnonymousUser> {
        self.try_current_user().await.unwrap_or_else(|err| {
            tracing::warn!("Stored session rejected: {}", err);
            // Later calls fall back to the anon key.
            self.access_token.borrow_mut().take();
            None
        })
    }

    async fn create_anonymous_user(&self) -> Option<AnonymousUser> {
        self.try_create_anonymous_user().await.unwrap_or_else(|err| {
            tracing::error!("Error creating anonymous user: {}", err);
            None
        })
    }

    async fn fetch_profile(&self, user_id: &str) -> Option<Profile> {
        self.try_fetch_profile(user_id).await.unwrap_or_else(|err| {
            tracing::error!(user_id, "Error fetching user profile: {}", err);
            None
        })
    }

    async fn upsert_profile(&self, user_id: &str, username: &str) -> Option<Profile> {
        self.try_upsert_profile(user_id, username)
            .await
            .unwrap_or_else(|err| {
                tracing::error!(user_id, "Error updating user profile: {}", err);
                None
            })
    }

    async fn insert_score(
        &self,
        user_id: &str,
        score: u32,
        mode: GameMode,
    ) -> Option<ScoreRecord> {
        self.try_insert_score(user_id, score, mode)
            .await
            .unwrap_or_else(|err| {
                tracing::error!(user_id, score, "Error saving game score: {}", err);
                None
            })
    }

    async fn leaderboard(&self, limit: u32, mode: Option<GameMode>) -> Vec<LeaderboardEntry> {
        self.try_leaderboard(limit, mode).await.unwrap_or_else(|err| {
            tracing::error!("Error fetching leaderboard: {}", err);
            Vec::new()
        })
    }
}

/// Pick the backend for a (possibly missing) configuration.
pub fn connect(config: Option<&BackendConfig>) -> Rc<dyn LeaderboardBackend> {
    match config {
        Some(config) if config.is_complete() => Rc::new(RestBackend::new(config)),
        _ => {
            tracing::warn!("Backend not configured; leaderboard and profiles are disabled");
            Rc::new(NullBackend)
        }
    }
}

/// Query string for the leaderboard request.
pub fn leaderboard_params(limit: u32, mode: Option<GameMode>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        (
            "select",
            "id,score,game_mode,created_at,profiles(id,username)".to_string(),
        ),
        ("order", "score.desc".to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(mode) = mode {
        params.push(("game_mode", format!("eq.{}", mode.as_str())));
    }
    params
}

/// Number rows from 1 and fill in missing names.
pub fn rank_entries(rows: Vec<ScoreRow>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .zip(1u32..)
        .map(|(row, rank)| {
            let (user_id, username) = match row.profiles {
                Some(profile) => (profile.id, profile.username),
                None => (None, None),
            };

            LeaderboardEntry {
                rank,
                id: row.id,
                score: row.score,
                game_mode: row.game_mode,
                created_at: row.created_at,
                user_id,
                username: username
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| ANONYMOUS_NAME.to_string()),
            }
        })
        .collect()
}

/// Trim and reject blank names before anything is sent.
pub fn validate_username(raw: &str) -> Result<&str, GameError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(GameError::InvalidUsername)
    } else {
        Ok(name)
    }
}

/// Validate, then upsert. Blank names never reach the backend.
pub async fn save_profile(
    backend: &dyn LeaderboardBackend,
    user_id: &str,
    raw_username: &str,
) -> Result<Option<Profile>, GameError> {
    let username = validate_username(raw_username)?;
    Ok(backend.upsert_profile(user_id, username).await)
}

/// Reuse the saved session when the backend still accepts it, otherwise sign
/// up a new anonymous account.
pub async fn ensure_user(
    backend: &dyn LeaderboardBackend,
    stored_token: Option<&str>,
) -> Option<AnonymousUser> {
    if let Some(token) = stored_token.filter(|token| !token.trim().is_empty()) {
        backend.restore_session(token);
        if let Some(user) = backend.current_user().await {
            tracing::info!(user_id = %user.id, "session restored");
            return Some(user);
        }
    }

    backend.create_anonymous_user().await
}

fn anonymous_credentials() -> SignUp {
    SignUp {
        email: format!("{}@{}", Uuid::new_v4(), ANONYMOUS_EMAIL_DOMAIN),
        password: Uuid::new_v4().to_string(),
    }
}

fn parse_signup(response: SignUpResponse) -> Option<AnonymousUser> {
    let id = response.user.map(|user| user.id).or(response.id)?;
    Some(AnonymousUser {
        id,
        access_token: response.access_token,
    })
}

// =============================================================================
// WASM Bindings
// =============================================================================

/// WASM-exposed backend client. Every method returns a Promise resolving to a
/// JSON string (`null` / `[]` when offline or on failure).
#[wasm_bindgen]
pub struct Backend {
    inner: Rc<dyn LeaderboardBackend>,
}

#[wasm_bindgen]
impl Backend {
    /// Build from the same JSON config the `Game` takes; only `backend` is read.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<Backend, JsValue> {
        let config: GameConfig = serde_json::from_str(config_json)
            .map_err(|e| GameError::InvalidConfig(e.to_string()))?;

        Ok(Backend {
            inner: connect(config.backend.as_ref()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    /// Adopt a token the host saved from an earlier visit.
    pub fn restore_session(&self, access_token: String) {
        self.inner.restore_session(&access_token);
    }

    pub fn current_user(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move { to_js(&inner.current_user().await) })
    }

    /// Restore `stored_token` if it is still valid, else sign up. The
    /// resolved user carries the `access_token` to persist.
    pub fn ensure_user(&self, stored_token: Option<String>) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            to_js(&ensure_user(&*inner, stored_token.as_deref()).await)
        })
    }

    pub fn create_anonymous_user(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move { to_js(&inner.create_anonymous_user().await) })
    }

    pub fn fetch_profile(&self, user_id: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move { to_js(&inner.fetch_profile(&user_id).await) })
    }

    /// Rejects with a user-facing message when the name is blank.
    pub fn save_profile(&self, user_id: String, username: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let profile = save_profile(&*inner, &user_id, &username).await?;
            to_js(&profile)
        })
    }

    pub fn submit_score(&self, user_id: String, score: u32, mode: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let mode = parse_mode(&mode)?;
            to_js(&inner.insert_score(&user_id, score, mode).await)
        })
    }

    pub fn leaderboard(&self, limit: u32, mode: Option<String>) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let mode = mode.as_deref().map(parse_mode).transpose()?;
            to_js(&inner.leaderboard(limit, mode).await)
        })
    }
}

fn parse_mode(name: &str) -> Result<GameMode, GameError> {
    GameMode::from_name(name)
        .ok_or_else(|| GameError::InvalidConfig(format!("unknown game mode: {}", name)))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(GameError::from)?;
    Ok(JsValue::from_str(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn row(id: i64, score: u32, profile: Option<(&str, Option<&str>)>) -> ScoreRow {
        ScoreRow {
            id,
            score,
            game_mode: "classic".to_string(),
            created_at: "2024-05-01T10:00:00Z".to_string(),
            profiles: profile.map(|(id, name)| ProfileRef {
                id: Some(id.to_string()),
                username: name.map(str::to_string),
            }),
        }
    }

    #[test]
    fn null_backend_answers_nothing() {
        let backend = NullBackend;
        assert!(!backend.is_enabled());
        backend.restore_session("tok");
        assert!(block_on(backend.current_user()).is_none());
        assert!(block_on(ensure_user(&backend, Some("tok"))).is_none());
        assert!(block_on(backend.create_anonymous_user()).is_none());
        assert!(block_on(backend.fetch_profile("u1")).is_none());
        assert!(block_on(backend.upsert_profile("u1", "ada")).is_none());
        assert!(block_on(backend.insert_score("u1", 42, GameMode::Classic)).is_none());
        assert!(block_on(backend.leaderboard(10, None)).is_empty());
    }

    #[test]
    fn missing_or_blank_credentials_disable_backend() {
        assert!(!connect(None).is_enabled());

        let blank = BackendConfig {
            url: String::new(),
            anon_key: "key".to_string(),
        };
        assert!(!connect(Some(&blank)).is_enabled());
    }

    #[test]
    fn complete_credentials_enable_rest_backend() {
        let config = BackendConfig {
            url: "https://demo.supabase.co/".to_string(),
            anon_key: "anon".to_string(),
        };
        let backend = RestBackend::new(&config);
        assert!(backend.is_enabled());
        assert_eq!(
            backend.rest_url("game_scores"),
            "https://demo.supabase.co/rest/v1/game_scores"
        );
        assert!(connect(Some(&config)).is_enabled());
    }

    #[test]
    fn leaderboard_params_order_by_score() {
        let params = leaderboard_params(10, None);
        assert!(params.contains(&("order", "score.desc".to_string())));
        assert!(params.contains(&("limit", "10".to_string())));
        assert!(!params.iter().any(|(key, _)| *key == "game_mode"));

        let filtered = leaderboard_params(5, Some(GameMode::Emoji));
        assert!(filtered.contains(&("game_mode", "eq.emoji".to_string())));
    }

    #[test]
    fn rows_are_ranked_and_named() {
        let entries = rank_entries(vec![
            row(7, 300, Some(("u1", Some("MoodReader")))),
            row(3, 250, None),
            row(9, 100, Some(("u2", Some("")))),
            row(4, 90, Some(("u3", None))),
        ]);

        let ranks: Vec<u32> = entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(entries[0].username, "MoodReader");
        assert_eq!(entries[0].user_id.as_deref(), Some("u1"));
        assert_eq!(entries[1].username, ANONYMOUS_NAME);
        assert_eq!(entries[1].user_id, None);
        assert_eq!(entries[2].username, ANONYMOUS_NAME);
        assert_eq!(entries[3].username, ANONYMOUS_NAME);
    }

    #[test]
    fn joined_rows_decode_from_json() {
        let json = r#"[
            {"id": 1, "score": 120, "game_mode": "classic", "created_at": "2024-05-01T10:00:00Z",
             "profiles": {"id": "u1", "username": "EmotionMaster"}},
            {"id": 2, "score": 80, "game_mode": "emoji", "created_at": "2024-05-02T10:00:00Z",
             "profiles": null}
        ]"#;

        let rows: Vec<ScoreRow> = serde_json::from_str(json).unwrap();
        let entries = rank_entries(rows);
        assert_eq!(entries[0].username, "EmotionMaster");
        assert_eq!(entries[1].username, ANONYMOUS_NAME);
        assert_eq!(entries[1].game_mode, "emoji");
    }

    #[test]
    fn blank_usernames_are_rejected() {
        assert!(matches!(validate_username("   "), Err(GameError::InvalidUsername)));
        assert!(matches!(validate_username(""), Err(GameError::InvalidUsername)));
        assert_eq!(validate_username("  ada ").unwrap(), "ada");
    }

    #[test]
    fn save_profile_validates_before_calling_backend() {
        let result = block_on(save_profile(&NullBackend, "u1", "\t"));
        assert!(matches!(result, Err(GameError::InvalidUsername)));

        let offline = block_on(save_profile(&NullBackend, "u1", "ada")).unwrap();
        assert!(offline.is_none());
    }

    #[test]
    fn anonymous_credentials_are_random() {
        let a = anonymous_credentials();
        let b = anonymous_credentials();
        assert!(a.email.ends_with("@anonymous.com"));
        assert_ne!(a.email, b.email);
        assert_eq!(a.password.len(), 36);
    }

    #[test]
    fn signup_reads_nested_or_flat_user() {
        let nested: SignUpResponse =
            serde_json::from_str(r#"{"access_token": "tok", "user": {"id": "u1"}}"#).unwrap();
        let user = parse_signup(nested).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.access_token.as_deref(), Some("tok"));

        let flat: SignUpResponse = serde_json::from_str(r#"{"id": "u2"}"#).unwrap();
        assert_eq!(parse_signup(flat).unwrap().id, "u2");

        let empty: SignUpResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_signup(empty).is_none());
    }

    #[test]
    fn access_token_is_handed_to_the_host() {
        let user = AnonymousUser {
            id: "u1".to_string(),
            access_token: Some("tok".to_string()),
        };
        assert_eq!(
            serde_json::to_string(&user).unwrap(),
            r#"{"id":"u1","access_token":"tok"}"#
        );

        let tokenless = AnonymousUser {
            access_token: None,
            ..user
        };
        assert_eq!(serde_json::to_string(&tokenless).unwrap(), r#"{"id":"u1"}"#);
    }

    #[test]
    fn unknown_mode_names_are_rejected() {
        assert_eq!(parse_mode("emoji").unwrap(), GameMode::Emoji);
        assert!(matches!(parse_mode("arcade"), Err(GameError::InvalidConfig(_))));
    }

    #[cfg(not(target_arch = "wasm32"))]
    mod http {
        use super::*;
        use serde_json::{json, Value};
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, Request, ResponseTemplate};

        const ANON_KEY: &str = "anon-key";

        fn backend_for(server: &MockServer) -> RestBackend {
            RestBackend::new(&BackendConfig {
                url: server.uri(),
                anon_key: ANON_KEY.to_string(),
            })
        }

        fn header_value<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
            request.headers.get(name).and_then(|value| value.to_str().ok())
        }

        fn body(request: &Request) -> Value {
            serde_json::from_slice(&request.body).unwrap()
        }

        async fn received(server: &MockServer) -> Vec<Request> {
            server.received_requests().await.unwrap_or_default()
        }

        async fn answer(server: &MockServer, verb: &str, route: &str, reply: ResponseTemplate) {
            Mock::given(method(verb))
                .and(path(route))
                .respond_with(reply)
                .mount(server)
                .await;
        }

        fn ok_json(value: Value) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(value)
        }

        #[tokio::test]
        async fn signup_sends_random_credentials_and_keeps_token() {
            let server = MockServer::start().await;
            answer(
                &server,
                "POST",
                "/auth/v1/signup",
                ok_json(json!({"access_token": "tok-1", "user": {"id": "u1"}})),
            )
            .await;
            answer(&server, "GET", "/rest/v1/profiles", ok_json(json!([]))).await;
            let backend = backend_for(&server);

            let user = backend.create_anonymous_user().await.unwrap();
            assert_eq!(user.id, "u1");
            assert_eq!(user.access_token.as_deref(), Some("tok-1"));
            backend.fetch_profile("u1").await;

            let requests = received(&server).await;
            let signup = &requests[0];
            assert_eq!(header_value(signup, "apikey"), Some(ANON_KEY));
            assert_eq!(
                header_value(signup, "authorization"),
                Some("Bearer anon-key")
            );
            let credentials = body(signup);
            let email = credentials["email"].as_str().unwrap();
            assert!(email.ends_with("@anonymous.com"));
            assert_eq!(email.len(), 36 + "@anonymous.com".len());
            assert_eq!(credentials["password"].as_str().unwrap().len(), 36);

            // Later calls run as the new user.
            assert_eq!(header_value(&requests[1], "apikey"), Some(ANON_KEY));
            assert_eq!(
                header_value(&requests[1], "authorization"),
                Some("Bearer tok-1")
            );
        }

        #[tokio::test]
        async fn fetch_profile_filters_by_id() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/profiles"))
                .and(query_param("select", "*"))
                .and(query_param("id", "eq.u1"))
                .respond_with(ok_json(json!([{
                    "id": "u1",
                    "username": "ada",
                    "created_at": "2024-05-01T10:00:00Z",
                    "updated_at": null
                }])))
                .expect(1)
                .mount(&server)
                .await;

            let profile = backend_for(&server).fetch_profile("u1").await.unwrap();
            assert_eq!(profile.username, "ada");
            assert_eq!(profile.created_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        }

        #[tokio::test]
        async fn upsert_merges_on_duplicate_id() {
            let server = MockServer::start().await;
            answer(
                &server,
                "POST",
                "/rest/v1/profiles",
                ok_json(json!([{"id": "u1", "username": "ada"}])),
            )
            .await;

            let profile = backend_for(&server).upsert_profile("u1", "ada").await.unwrap();
            assert_eq!(profile.id, "u1");

            let requests = received(&server).await;
            assert_eq!(
                header_value(&requests[0], "prefer"),
                Some("resolution=merge-duplicates,return=representation")
            );
            assert_eq!(body(&requests[0]), json!([{"id": "u1", "username": "ada"}]));
        }

        #[tokio::test]
        async fn insert_score_stamps_creation_time() {
            let server = MockServer::start().await;
            answer(
                &server,
                "POST",
                "/rest/v1/game_scores",
                ok_json(json!([{
                    "id": 17,
                    "user_id": "u1",
                    "score": 42,
                    "game_mode": "emoji",
                    "created_at": "2024-05-01T10:00:00Z"
                }])),
            )
            .await;

            let record = backend_for(&server)
                .insert_score("u1", 42, GameMode::Emoji)
                .await
                .unwrap();
            assert_eq!(record.id, 17);
            assert_eq!(record.score, 42);

            let requests = received(&server).await;
            assert_eq!(
                header_value(&requests[0], "prefer"),
                Some("return=representation")
            );
            let sent = body(&requests[0]);
            assert_eq!(sent["user_id"], "u1");
            assert_eq!(sent["score"], 42);
            assert_eq!(sent["game_mode"], "emoji");
            let stamp = sent["created_at"].as_str().unwrap();
            assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        }

        #[tokio::test]
        async fn leaderboard_asks_for_ranked_join() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/game_scores"))
                .and(query_param("order", "score.desc"))
                .and(query_param("limit", "2"))
                .and(query_param("game_mode", "eq.classic"))
                .and(query_param(
                    "select",
                    "id,score,game_mode,created_at,profiles(id,username)",
                ))
                .respond_with(ok_json(json!([
                    {"id": 5, "score": 90, "game_mode": "classic",
                     "created_at": "2024-05-01T10:00:00Z",
                     "profiles": {"id": "u1", "username": "ada"}},
                    {"id": 6, "score": 40, "game_mode": "classic",
                     "created_at": "2024-05-02T10:00:00Z", "profiles": null}
                ])))
                .expect(1)
                .mount(&server)
                .await;

            let entries = backend_for(&server)
                .leaderboard(2, Some(GameMode::Classic))
                .await;
            assert_eq!(entries.len(), 2);
            assert_eq!((entries[0].rank, entries[0].username.as_str()), (1, "ada"));
            assert_eq!((entries[1].rank, entries[1].username.as_str()), (2, ANONYMOUS_NAME));
        }

        #[tokio::test]
        async fn server_errors_degrade_to_nothing() {
            let server = MockServer::start().await;
            Mock::given(wiremock::matchers::any())
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;
            let backend = backend_for(&server);

            assert!(backend.create_anonymous_user().await.is_none());
            assert!(backend.fetch_profile("u1").await.is_none());
            assert!(backend.upsert_profile("u1", "ada").await.is_none());
            assert!(backend.insert_score("u1", 5, GameMode::Classic).await.is_none());
            assert!(backend.leaderboard(10, None).await.is_empty());
            backend.restore_session("tok");
            assert!(backend.current_user().await.is_none());
        }

        #[tokio::test]
        async fn malformed_bodies_degrade_to_nothing() {
            let server = MockServer::start().await;
            Mock::given(wiremock::matchers::any())
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
                .mount(&server)
                .await;
            let backend = backend_for(&server);

            assert!(backend.create_anonymous_user().await.is_none());
            assert!(backend.fetch_profile("u1").await.is_none());
            assert!(backend.upsert_profile("u1", "ada").await.is_none());
            assert!(backend.insert_score("u1", 5, GameMode::Classic).await.is_none());
            assert!(backend.leaderboard(10, None).await.is_empty());
        }

        #[tokio::test]
        async fn current_user_without_session_stays_offline() {
            let server = MockServer::start().await;
            let backend = backend_for(&server);

            assert!(backend.current_user().await.is_none());
            backend.restore_session("   ");
            assert!(backend.current_user().await.is_none());
            assert!(received(&server).await.is_empty());
        }

        #[tokio::test]
        async fn saved_session_is_reused_without_signup() {
            let server = MockServer::start().await;
            answer(&server, "GET", "/auth/v1/user", ok_json(json!({"id": "u9"}))).await;
            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;
            let backend = backend_for(&server);

            let user = ensure_user(&backend, Some("saved-tok")).await.unwrap();
            assert_eq!(user.id, "u9");
            assert_eq!(user.access_token.as_deref(), Some("saved-tok"));

            let requests = received(&server).await;
            assert_eq!(requests.len(), 1);
            assert_eq!(header_value(&requests[0], "apikey"), Some(ANON_KEY));
            assert_eq!(
                header_value(&requests[0], "authorization"),
                Some("Bearer saved-tok")
            );
        }

        #[tokio::test]
        async fn rejected_session_falls_back_to_signup() {
            let server = MockServer::start().await;
            answer(&server, "GET", "/auth/v1/user", ResponseTemplate::new(401)).await;
            answer(
                &server,
                "POST",
                "/auth/v1/signup",
                ok_json(json!({"access_token": "fresh", "user": {"id": "u2"}})),
            )
            .await;
            let backend = backend_for(&server);

            let user = ensure_user(&backend, Some("expired")).await.unwrap();
            assert_eq!(user.id, "u2");
            assert_eq!(user.access_token.as_deref(), Some("fresh"));

            let requests = received(&server).await;
            let signup = requests
                .iter()
                .find(|request| request.url.path() == "/auth/v1/signup")
                .unwrap();
            assert_eq!(
                header_value(signup, "authorization"),
                Some("Bearer anon-key")
            );
        }

        #[tokio::test]
        async fn no_saved_token_goes_straight_to_signup() {
            let server = MockServer::start().await;
            answer(
                &server,
                "POST",
                "/auth/v1/signup",
                ok_json(json!({"id": "u3"})),
            )
            .await;

            let user = ensure_user(&backend_for(&server), None).await.unwrap();
            assert_eq!(user.id, "u3");
            assert_eq!(user.access_token, None);
            assert_eq!(received(&server).await.len(), 1);
        }
    }
}
