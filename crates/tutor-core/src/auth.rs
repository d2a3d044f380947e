//! Thin client for the cookie-session auth API.
//!
//! The server owns the session: it sets an HTTP-only cookie on signup/signin
//! and clears it on signout. This side only keeps the cookie jar and mirrors
//! the server's answer into [`AuthState`] for the header.

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::navigation::base_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "beginner" => Some(ExperienceLevel::Beginner),
            "intermediate" => Some(ExperienceLevel::Intermediate),
            "advanced" => Some(ExperienceLevel::Advanced),
            _ => None,
        }
    }
}

/// Background questionnaire collected at signup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundData {
    pub software_experience: ExperienceLevel,
    pub hardware_experience: ExperienceLevel,
    #[serde(default)]
    pub programming_languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robotics_background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_goals: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub background: BackgroundData,
}

#[derive(Serialize)]
struct SigninRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    user: User,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    /// Build a client with its own cookie jar.
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The underlying client, so other API calls can reuse the session cookie.
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Current user, or `None` when the server has no session for us.
    pub async fn me(&self) -> Result<Option<User>, AuthError> {
        let url = format!("{}/auth/me", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "no active session");
            return Ok(None);
        }

        let user: User = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(Some(user))
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<User, AuthError> {
        let url = format!("{}/auth/signup", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        session_user(response, "Signup failed").await
    }

    pub async fn signin(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let url = format!("{}/auth/signin", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SigninRequest { email, password })
            .send()
            .await?;
        session_user(response, "Login failed").await
    }

    pub async fn signout(&self) -> Result<(), AuthError> {
        let url = format!("{}/auth/signout", self.base_url);
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(rejection(response, "Signout failed").await);
        }
        Ok(())
    }
}

async fn session_user(response: Response, fallback: &str) -> Result<User, AuthError> {
    if !response.status().is_success() {
        return Err(rejection(response, fallback).await);
    }

    let body: SessionResponse = response
        .json()
        .await
        .map_err(|e| AuthError::Decode(e.to_string()))?;
    Ok(body.user)
}

async fn rejection(response: Response, fallback: &str) -> AuthError {
    let status = response.status().as_u16();
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .map(|detail| match detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| fallback.to_string());

    AuthError::Rejected { status, detail }
}

/// Session state as shown in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
        }
    }
}

impl AuthState {
    /// Ask the server who we are. Any failure counts as signed out.
    pub async fn check(&mut self, client: &AuthClient) {
        self.user = match client.me().await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "auth check failed");
                None
            }
        };
        self.loading = false;
    }

    pub async fn signin(&mut self, client: &AuthClient, email: &str, password: &str) -> Result<(), AuthError> {
        self.error = None;
        match client.signin(email, password).await {
            Ok(user) => {
                self.user = Some(user);
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn signup(&mut self, client: &AuthClient, request: &SignupRequest) -> Result<(), AuthError> {
        self.error = None;
        match client.signup(request).await {
            Ok(user) => {
                self.user = Some(user);
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Sign out; the local user is only dropped once the server agreed.
    pub async fn signout(&mut self, client: &AuthClient) {
        match client.signout().await {
            Ok(()) => self.user = None,
            Err(err) => warn!(error = %err, "signout failed"),
        }
    }
}

/// What the header should show for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavbarView {
    /// Still checking the session; render nothing
    Hidden,
    SignedIn { name: String },
    SignedOut { signin_path: String, signup_path: String },
}

impl NavbarView {
    pub fn from_state(state: &AuthState, site_base_url: &str) -> Self {
        if state.loading {
            return NavbarView::Hidden;
        }
        match &state.user {
            Some(user) => NavbarView::SignedIn {
                name: user.name.clone(),
            },
            None => NavbarView::SignedOut {
                signin_path: base_path(site_base_url, "signin"),
                signup_path: base_path(site_base_url, "signup"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "42".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
        }
    }

    #[test]
    fn test_navbar_hidden_while_loading() {
        let state = AuthState::default();
        assert_eq!(NavbarView::from_state(&state, "/"), NavbarView::Hidden);
    }

    #[test]
    fn test_navbar_signed_out_links_use_base() {
        let state = AuthState {
            user: None,
            loading: false,
            error: None,
        };
        assert_eq!(
            NavbarView::from_state(&state, "/physical-ai/"),
            NavbarView::SignedOut {
                signin_path: "/physical-ai/signin".to_string(),
                signup_path: "/physical-ai/signup".to_string(),
            }
        );
    }

    #[test]
    fn test_navbar_signed_in_shows_name() {
        let state = AuthState {
            user: Some(user()),
            loading: false,
            error: None,
        };
        assert_eq!(
            NavbarView::from_state(&state, "/"),
            NavbarView::SignedIn {
                name: "Ada".to_string()
            }
        );
    }

    #[test]
    fn test_experience_level_parse() {
        assert_eq!(ExperienceLevel::from_str("Beginner"), Some(ExperienceLevel::Beginner));
        assert_eq!(ExperienceLevel::from_str("ADVANCED"), Some(ExperienceLevel::Advanced));
        assert_eq!(ExperienceLevel::from_str("expert"), None);
    }

    #[test]
    fn test_signup_body_shape() {
        let request = SignupRequest {
            email: "ada@example.com".to_string(),
            password: "correct horse".to_string(),
            name: "Ada".to_string(),
            background: BackgroundData {
                software_experience: ExperienceLevel::Advanced,
                hardware_experience: ExperienceLevel::Beginner,
                programming_languages: vec!["Rust".to_string(), "Python".to_string()],
                robotics_background: None,
                learning_goals: Some("Build a biped".to_string()),
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["background"]["software_experience"], "Advanced");
        assert_eq!(value["background"]["programming_languages"][1], "Python");
        assert!(value["background"].get("robotics_background").is_none());
        assert_eq!(value["background"]["learning_goals"], "Build a biped");
    }
}
