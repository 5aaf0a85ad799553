mod action;
mod app;
mod backend;
mod command;
mod config;
mod dispatch;
mod export;
mod medical;
mod session;
mod ui;
mod ui_state;

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use arboard::Clipboard;
use clap::Parser;
use crossterm::{
    cursor::Show,
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture, Event, EventStream,
        KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use app::{App, Request, Settlement};
use backend::{HttpBackend, MedRagApi};
use config::{Config, LogConfig};
use dispatch::Dispatcher;
use ui::draw;
use ui_state::{Focus, StatusKind};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Terminal client for the MedRag lab report assistant.
#[derive(Parser, Debug)]
#[command(name = "medrag", version, about)]
struct Cli {
    /// Config file (default: ./medrag.toml, or $MEDRAG_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// MedRag backend base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Start a new conversation whenever a report is analysed
    #[arg(long)]
    clear_on_upload: bool,

    /// Upload this report as soon as the UI starts
    #[arg(long, value_name = "PATH")]
    upload: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if self.clear_on_upload {
            config.session.clear_history_on_upload = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    init_logging(&config.log);

    let backend = HttpBackend::new(config.api.base_url.clone(), config.api.top_k);
    tracing::info!(api = %backend.base_url(), "starting medrag");
    let api: Arc<dyn MedRagApi> = Arc::new(backend);
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(api, tx);

    let mut app = App::new(config);
    if let Some(path) = &cli.upload {
        if let Some(request) = app.begin_upload(path) {
            dispatcher.dispatch(request);
        }
    }

    install_panic_hook();
    let mut terminal = setup_terminal().context("initialising terminal")?;
    let result = run_app(&mut terminal, &mut app, &dispatcher, rx).await;
    restore_terminal(&mut terminal)?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting with error");
    }
    result
}

/// Log to a file: the terminal belongs to the UI. Logging is skipped if the
/// file cannot be opened.
fn init_logging(log: &LogConfig) {
    if !log.enabled {
        return;
    }
    let file = match OpenOptions::new().create(true).append(true).open(&log.file) {
        Ok(file) => file,
        Err(_) => return,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
}

/// Leave raw mode and the alternate screen before the default hook prints,
/// so a panic does not strand the shell.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(
            io::stdout(),
            LeaveAlternateScreen,
            DisableMouseCapture,
            DisableBracketedPaste,
            Show
        );
        tracing::error!(panic = %info, "panicked");
        default_hook(info);
    }));
}

fn setup_terminal() -> io::Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Tui) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()
}

async fn run_app(
    terminal: &mut Tui,
    app: &mut App,
    dispatcher: &Dispatcher,
    mut settlements: UnboundedReceiver<Settlement>,
) -> anyhow::Result<()> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(app.config.ui.tick_rate());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !app.should_quit {
        terminal.draw(|frame| draw(frame, app))?;

        tokio::select! {
            _ = ticker.tick() => app.tick(Instant::now()),
            Some(settlement) = settlements.recv() => app.settle(settlement, Instant::now()),
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if let Some(request) = handle_event(app, event) {
                        dispatcher.dispatch(request);
                    }
                }
                Some(Err(e)) => return Err(e).context("reading terminal events"),
                None => break,
            },
        }
    }

    Ok(())
}

fn handle_event(app: &mut App, event: Event) -> Option<Request> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
        Event::Paste(text) => {
            app.ui.focus = Focus::Input;
            app.insert_text(&text);
            None
        }
        Event::Mouse(mouse) => {
            match mouse.kind {
                MouseEventKind::ScrollUp => app.scroll_up(),
                MouseEventKind::ScrollDown => app.scroll_down(),
                _ => {}
            }
            None
        }
        _ => None,
    }
}

fn handle_key(app: &mut App, key: KeyEvent) -> Option<Request> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return None;
    }

    if app.ui.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
            app.ui.show_help = false;
        }
        return None;
    }

    // The drawer is modal
    if app.selection().is_visible() {
        match key.code {
            KeyCode::Esc => app.close_evidence(),
            KeyCode::Char('c') => copy_evidence(app),
            _ => {}
        }
        return None;
    }

    match key.code {
        KeyCode::Esc => {
            if app.showing_command_popup() && app.ui.command_selection.is_some() {
                app.reset_command_selection();
            } else if !app.ui.input.is_empty() {
                app.ui.input.clear();
                app.reset_command_selection();
            } else if app.ui.focus == Focus::Evidence {
                app.ui.focus = Focus::Input;
            } else {
                app.should_quit = true;
            }
            None
        }
        KeyCode::Enter => {
            if app.ui.focus == Focus::Evidence {
                app.open_selected_chip();
                None
            } else if app.showing_command_popup() && app.ui.command_selection.is_some() {
                app.apply_command_selection();
                None
            } else {
                app.submit_input()
            }
        }
        KeyCode::Tab => {
            if app.showing_command_popup() && app.ui.command_selection.is_some() {
                app.apply_command_selection();
            } else {
                app.toggle_focus();
            }
            None
        }
        KeyCode::Up => {
            if app.ui.focus == Focus::Evidence {
                app.select_prev_chip();
            } else if app.showing_command_popup() {
                app.command_select_up();
            } else {
                app.scroll_up();
            }
            None
        }
        KeyCode::Down => {
            if app.ui.focus == Focus::Evidence {
                app.select_next_chip();
            } else if app.showing_command_popup() {
                app.command_select_down();
            } else {
                app.scroll_down();
            }
            None
        }
        KeyCode::Left if app.ui.focus == Focus::Evidence => {
            app.select_prev_chip();
            None
        }
        KeyCode::Right if app.ui.focus == Focus::Evidence => {
            app.select_next_chip();
            None
        }
        KeyCode::PageUp => {
            app.scroll_up();
            None
        }
        KeyCode::PageDown => {
            app.scroll_down();
            None
        }
        KeyCode::Backspace => {
            app.ui.focus = Focus::Input;
            app.ui.input.pop();
            app.reset_command_selection();
            None
        }
        KeyCode::Char('v') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            paste_clipboard(app);
            None
        }
        KeyCode::Char(c) => {
            // Typing always goes to the input box
            app.ui.focus = Focus::Input;
            app.ui.input.push(c);
            app.reset_command_selection();
            None
        }
        _ => None,
    }
}

fn paste_clipboard(app: &mut App) {
    match Clipboard::new().and_then(|mut clipboard| clipboard.get_text()) {
        Ok(text) => {
            app.ui.focus = Focus::Input;
            app.insert_text(&text);
        }
        Err(e) => tracing::debug!(error = %e, "clipboard paste unavailable"),
    }
}

fn copy_evidence(app: &mut App) {
    let Some(content) = app.selection().visible().map(|opened| opened.chunk.content.clone()) else {
        return;
    };
    match Clipboard::new().and_then(|mut clipboard| clipboard.set_text(content)) {
        Ok(()) => app.set_status("Evidence copied to clipboard", StatusKind::Info),
        Err(e) => {
            tracing::warn!(error = %e, "clipboard copy failed");
            app.set_status("Clipboard unavailable", StatusKind::Error);
        }
    }
}
