use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tutor_core::client::spawn_exchange;
use tutor_core::selection::{ActionLayout, Gesture};
use tutor_core::{
    AuthClient, AuthState, ChatClient, ChatError, ChatSession, Config, ExchangeUpdate,
    SelectionBroadcaster, SelectionEvent,
};

use crate::document::Document;

/// Label of the selection action, also its footprint in cells
pub const ACTION_LABEL: &str = " Ask about this ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Lesson,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigninField {
    #[default]
    Email,
    Password,
}

#[derive(Debug, Clone, Default)]
pub struct SigninForm {
    pub email: String,
    pub password: String,
    pub field: SigninField,
}

impl SigninForm {
    pub fn active_mut(&mut self) -> &mut String {
        match self.field {
            SigninField::Email => &mut self.email,
            SigninField::Password => &mut self.password,
        }
    }
}

struct Exchange {
    handle: JoinHandle<()>,
    updates: mpsc::UnboundedReceiver<ExchangeUpdate>,
}

/// Action control sized in terminal cells.
pub fn action_layout() -> ActionLayout {
    ActionLayout {
        width: ACTION_LABEL.chars().count() as f64,
        height: 1.0,
        gap_x: 1.0,
        gap_y: 0.0,
        edge_margin: 1.0,
        min_top: 1.0,
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub config: Config,

    // Lesson and selection
    pub document: Document,
    pub selection: SelectionBroadcaster,
    /// A mouse drag started in the lesson pane
    pub dragging: bool,

    // Chat
    pub session: ChatSession,
    pub chat_client: Arc<ChatClient>,
    exchange: Option<Exchange>,
    pub input_cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    /// Keep the newest message in view
    pub follow_chat: bool,

    // Auth
    pub auth_client: AuthClient,
    pub auth: AuthState,
    pub signin: Option<SigninForm>,

    // Animation state
    pub animation_frame: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub input_area: Option<Rect>,
}

impl App {
    pub fn new(config: Config, document: Document) -> Result<Self> {
        let auth_client = AuthClient::new(&config.api_base_url)?;
        // Same cookie jar, so chat requests carry the session
        let chat_client = Arc::new(ChatClient::with_client(
            auth_client.http_client().clone(),
            &config.api_base_url,
        ));

        let mut session = ChatSession::new();
        session.set_current_page(document.page_id());

        let selection = SelectionBroadcaster::new(action_layout(), config.selection_guard());

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Lesson,
            config,

            document,
            selection,
            dragging: false,

            session,
            chat_client,
            exchange: None,
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_chat: true,

            auth_client,
            auth: AuthState::default(),
            signin: None,

            animation_frame: 0,

            chat_area: None,
            input_area: None,
        })
    }

    pub async fn check_auth(&mut self) {
        self.auth.check(&self.auth_client).await;
        if let Some(user) = &self.auth.user {
            info!(user = %user.email, "restored session");
        }
    }

    /// Send the input box contents, if the session accepts them.
    pub fn submit_question(&mut self) {
        let Some(request) = self.session.submit_input() else {
            return;
        };
        self.input_cursor = 0;
        self.input_mode = InputMode::Normal;
        self.follow_chat = true;

        let (handle, updates) = spawn_exchange(
            Arc::clone(&self.chat_client),
            request,
            self.config.stream_idle_timeout(),
        );
        self.exchange = Some(Exchange { handle, updates });
    }

    /// Next update from the running exchange. Pending forever when idle;
    /// `None` once the exchange task has hung up.
    pub async fn next_update(&mut self) -> Option<ExchangeUpdate> {
        match self.exchange.as_mut() {
            Some(exchange) => exchange.updates.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn apply_update(&mut self, update: ExchangeUpdate) {
        self.session.apply_update(update);
    }

    pub fn exchange_closed(&mut self) {
        self.exchange = None;
        if self.session.is_loading() {
            // Task ended without a terminal update
            self.session
                .fail(ChatError::Stream("response ended unexpectedly".to_string()));
        }
    }

    /// A selection gesture ended in the lesson pane.
    pub fn finish_selection_gesture(&mut self, gesture: Gesture) {
        self.selection
            .on_gesture(gesture, &self.document, Instant::now());
    }

    pub fn confirm_selection(&mut self) {
        if let Some(event) = self.selection.confirm(&mut self.document) {
            self.accept_selection(event);
        }
    }

    pub fn accept_selection(&mut self, event: SelectionEvent) {
        if self.session.accept_selection(&event) {
            debug!(timestamp = event.timestamp, "selection pinned from lesson");
            self.focus = FocusPane::Chat;
            self.input_mode = InputMode::Editing;
        }
    }

    pub fn toggle_chat(&mut self) {
        self.session.toggle_panel();
        if !self.session.is_open() {
            self.focus = FocusPane::Lesson;
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn open_signin(&mut self) {
        if self.auth.user.is_none() {
            self.auth.error = None;
            self.signin = Some(SigninForm::default());
        }
    }

    pub async fn submit_signin(&mut self) {
        let Some(form) = self.signin.as_ref() else {
            return;
        };
        let (email, password) = (form.email.clone(), form.password.clone());
        if self.auth.signin(&self.auth_client, &email, &password).await.is_ok() {
            self.signin = None;
        }
    }

    pub async fn signout(&mut self) {
        if self.auth.user.is_some() {
            self.auth.signout(&self.auth_client).await;
        }
    }

    pub fn scroll_chat_down(&mut self, n: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(n);
        self.follow_chat = false;
    }

    pub fn scroll_chat_up(&mut self, n: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(n);
        self.follow_chat = false;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            exchange.handle.abort();
        }
    }
}
