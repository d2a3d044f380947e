use std::time::Duration;

use thiserror::Error;

/// Failure of a single chat exchange.
///
/// Every variant renders as one line of the form `<kind>: <message>` so it can
/// be dropped straight into the conversation as an assistant message.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("HTTP error: status {0}")]
    Status(u16),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("timeout: no data received for {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ChatError {
    /// Generic fallback used when the server sends an `error` record without a message.
    pub const UNKNOWN_SERVER_ERROR: &'static str = "Unknown error";

    pub fn from_server_message(message: Option<String>) -> Self {
        let message = message
            .map(|m| single_line(&m))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| Self::UNKNOWN_SERVER_ERROR.to_string());
        ChatError::Server(message)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ChatError::Status(status.as_u16());
        }
        if err.is_body() || err.is_decode() {
            return ChatError::Stream(single_line(&err.to_string()));
        }
        ChatError::Transport(single_line(&err.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mentions_code() {
        let err = ChatError::Status(500);
        assert_eq!(err.to_string(), "HTTP error: status 500");
    }

    #[test]
    fn test_server_error_falls_back_to_generic_message() {
        let err = ChatError::from_server_message(None);
        assert_eq!(err.to_string(), "server error: Unknown error");

        let err = ChatError::from_server_message(Some("   ".to_string()));
        assert_eq!(err.to_string(), "server error: Unknown error");

        let err = ChatError::from_server_message(Some("Qdrant unavailable".to_string()));
        assert_eq!(err.to_string(), "server error: Qdrant unavailable");
    }

    #[test]
    fn test_server_traceback_renders_on_one_line() {
        let err = ChatError::from_server_message(Some("Traceback:\n  File x\nValueError".to_string()));
        assert_eq!(err.to_string(), "server error: Traceback: File x ValueError");

        let err = ChatError::from_server_message(Some("\n\t\n".to_string()));
        assert_eq!(err.to_string(), "server error: Unknown error");
    }

    #[test]
    fn test_timeout_renders_seconds() {
        let err = ChatError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "timeout: no data received for 60s");
    }

    #[test]
    fn test_single_line_collapses_newlines() {
        assert_eq!(single_line("connection\nrefused  here"), "connection refused here");
    }
}
