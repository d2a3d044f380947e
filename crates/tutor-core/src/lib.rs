pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod navigation;
pub mod selection;
pub mod session;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use auth::{AuthClient, AuthState, NavbarView, User};
pub use client::{ChatClient, ChatTransport};
pub use config::Config;
pub use error::{AuthError, ChatError};
pub use selection::{SelectionBroadcaster, SelectionSurface};
pub use session::{ChatSession, ExchangeState, ExchangeUpdate};
pub use state::{ChatMessage, ChatRequest, ChatRole, SelectionEvent, Source};
