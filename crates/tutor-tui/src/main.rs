use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tutor_core::auth::{BackgroundData, ExperienceLevel, SignupRequest};
use tutor_core::client::stream_exchange;
use tutor_core::session::unique_sources;
use tutor_core::stream::StreamEvent;
use tutor_core::{AuthClient, AuthState, ChatClient, ChatSession, Config, ExchangeUpdate, SelectionEvent};

mod app;
mod document;
mod handler;
mod tui;
mod ui;

use app::App;
use document::Document;

#[derive(Parser)]
#[command(name = "tutor", version)]
#[command(about = "Read textbook lessons and ask the study assistant about them")]
struct Cli {
    /// Chat API base URL (overrides config and TUTOR_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a lesson in the terminal reader (default)
    Read {
        /// Lesson text or markdown file
        path: Option<PathBuf>,
    },
    /// Ask one question and stream the answer to stdout
    Ask {
        question: String,
        /// Passage to ask about
        #[arg(short, long)]
        context: Option<String>,
        /// Page the question comes from, e.g. /docs/chapter-01/lesson-01
        #[arg(short, long)]
        page: Option<String>,
        /// Wait for the whole answer instead of streaming
        #[arg(long)]
        sync: bool,
    },
    /// Check that the chat backend is up
    Health,
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TUTOR_PASSWORD")]
        password: String,
        #[arg(long)]
        name: String,
        /// beginner, intermediate or advanced
        #[arg(long, default_value = "beginner")]
        software: String,
        #[arg(long, default_value = "beginner")]
        hardware: String,
        #[arg(long, value_delimiter = ',')]
        languages: Vec<String>,
        #[arg(long)]
        robotics: Option<String>,
        #[arg(long)]
        goals: Option<String>,
    },
    /// Check credentials against the auth server
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TUTOR_PASSWORD")]
        password: String,
    },
    /// Show the session the server currently reports
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Read { path: None });
    match command {
        Commands::Read { .. } => init_file_logging()?,
        _ => init_stderr_logging(),
    }

    let mut config = Config::load_or_default();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    match command {
        Commands::Read { path } => run_reader(config, path).await,
        Commands::Ask {
            question,
            context,
            page,
            sync,
        } => {
            ask(&config, &question, context, page, sync).await
        }
        Commands::Health => {
            health(&config).await
        }
        Commands::Signup {
            email,
            password,
            name,
            software,
            hardware,
            languages,
            robotics,
            goals,
        } => {
            let background = BackgroundData {
                software_experience: parse_level(&software)?,
                hardware_experience: parse_level(&hardware)?,
                programming_languages: languages,
                robotics_background: robotics,
                learning_goals: goals,
            };
            signup(&config, SignupRequest { email, password, name, background }).await
        }
        Commands::Signin { email, password } => {
            signin(&config, &email, &password).await
        }
        Commands::Whoami => {
            whoami(&config).await
        }
    }
}

/// The terminal UI owns stderr, so the reader logs to a file.
fn init_file_logging() -> Result<()> {
    let dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("tutor");
    fs::create_dir_all(&dir)?;
    let file = File::create(dir.join("tutor.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

async fn run_reader(config: Config, path: Option<PathBuf>) -> Result<()> {
    let document = match &path {
        Some(path) => {
            let document = Document::load(path)?;
            let lesson = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            if let Err(err) = Config::remember_lesson(&lesson) {
                warn!(error = %err, "could not remember lesson");
            }
            document
        }
        None => match &config.lesson_path {
            Some(path) => Document::load(path)?,
            None => Document::welcome(),
        },
    };

    let mut app = App::new(config, document)?;
    info!(api = %app.chat_client.base_url(), "starting reader");
    app.check_auth().await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = run_loop(&mut app, &mut terminal, &mut events).await;

    app.shutdown();
    tui::restore()?;
    result
}

async fn run_loop(app: &mut App, terminal: &mut tui::Tui, events: &mut tui::EventHandler) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event).await?,
                None => break,
            },
            update = app.next_update() => match update {
                Some(update) => app.apply_update(update),
                None => app.exchange_closed(),
            },
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let client = ChatClient::new(&config.api_base_url);
    let health = client.health().await?;
    println!("{} (version {})", health.status, health.version);
    Ok(())
}

async fn signup(config: &Config, request: SignupRequest) -> Result<()> {
    let client = AuthClient::new(&config.api_base_url)?;
    let user = client.signup(&request).await?;
    println!("Signed up as {} <{}>", user.name, user.email);
    Ok(())
}

async fn signin(config: &Config, email: &str, password: &str) -> Result<()> {
    let client = AuthClient::new(&config.api_base_url)?;
    let user = client.signin(email, password).await?;
    println!("Signed in as {} <{}>", user.name, user.email);
    Ok(())
}

async fn whoami(config: &Config) -> Result<()> {
    let client = AuthClient::new(&config.api_base_url)?;
    let mut state = AuthState::default();
    state.check(&client).await;
    match state.user {
        Some(user) => println!("{} <{}>", user.name, user.email),
        None => println!("Not signed in"),
    }
    Ok(())
}

fn parse_level(value: &str) -> Result<ExperienceLevel> {
    ExperienceLevel::from_str(value)
        .ok_or_else(|| anyhow!("unknown experience level '{}' (beginner, intermediate, advanced)", value))
}

async fn ask(config: &Config, question: &str, context: Option<String>, page: Option<String>, sync: bool) -> Result<()> {
    let client = ChatClient::new(&config.api_base_url);

    let mut session = session_with_context(context, page)?;
    let request = session
        .submit(question)
        .context("question is empty")?;

    if sync {
        let reply = client.chat_sync(&request).await?;
        println!("{}", reply.content);
        print_sources(config, &reply.sources);
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    stream_exchange(&client, &request, config.stream_idle_timeout(), |update| {
        if let ExchangeUpdate::Event(StreamEvent::Content { chunk }) = &update {
            let _ = write!(stdout, "{}", chunk);
            let _ = stdout.flush();
        }
        session.apply_update(update);
        true
    })
    .await;
    println!();

    let Some(answer) = session.messages().last() else {
        return Ok(());
    };
    if answer.error {
        return Err(anyhow!("{}", answer.content));
    }
    print_sources(config, &answer.sources);
    Ok(())
}

fn session_with_context(context: Option<String>, page: Option<String>) -> Result<ChatSession> {
    let mut session = ChatSession::new();
    session.set_current_page(page);
    if let Some(text) = context {
        if !session.accept_selection(&SelectionEvent { text, timestamp: 1 }) {
            return Err(anyhow!("context must be longer than 3 characters"));
        }
    }
    Ok(session)
}

fn print_sources(config: &Config, sources: &[tutor_core::Source]) {
    let sources = unique_sources(sources);
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for source in sources {
        let url = tutor_core::navigation::resolve_source_url(&config.site_base_url, &source.url);
        println!("  • {} → {}", source.label(), url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_context_is_rejected() {
        let err = session_with_context(Some("abc".to_string()), None).unwrap_err();
        assert!(err.to_string().contains("longer than 3 characters"));
    }

    #[test]
    fn test_context_is_pinned_with_page() {
        let session = session_with_context(
            Some("inverse kinematics".to_string()),
            Some("/docs/chapter-02".to_string()),
        )
        .unwrap();
        assert_eq!(session.pinned_context(), "inverse kinematics");
    }

    #[test]
    fn test_no_context_leaves_session_empty() {
        let session = session_with_context(None, None).unwrap();
        assert_eq!(session.pinned_context(), "");
    }
}
