/// Ratatui-based TUI for copichat.
///
/// Architecture:
///   main thread:  event loop — crossterm keyboard events + mpsc UiEvent drain
///   network task: tokio::spawn per connect/send — reports back via UiEvents
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  tab bar (1 line)                              │
///   ├────────────────────────────────────────────────┤
///   │  notice banner (1 line)                        │
///   ├────────────────────────────────────────────────┤
///   │  transcript / config panel (Min(0))            │
///   ├────────────────────────────────────────────────┤
///   │  status bar (1 line)                           │
///   ├────────────────────────────────────────────────┤
///   │  composer (3 lines, fixed)                     │
///   └────────────────────────────────────────────────┘
pub mod chat;
pub mod config_view;
pub mod overlays;
pub mod render;

use std::io;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::{Mutex, mpsc};

use crate::agent::{AgentSession, CopilotClient};
use crate::auth::{EntraTokenProvider, TokenSource};
use crate::config::AgentConfig;
use crate::session::{ChatSession, Message, Role, SessionFactory, SessionStatus};
use crate::telemetry::{self, EventRecord, SessionStats};
use crate::ui::mask_value;

/// Delay before the help overlay auto-opens after an auth failure.
const HELP_AUTO_OPEN_DELAY_MS: u64 = 1000;

/// Notice lifetime in animation ticks (120ms each) — roughly four seconds.
const NOTICE_TTL_TICKS: u16 = 33;

// ── UiEvent — typed events from network tasks → TUI ──────────────────────────

#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Connect attempt succeeded; the session holds the greeting.
    Connected { duration_ms: u64 },
    /// Connect attempt failed.
    ConnectFailed {
        message: String,
        hint: Option<String>,
        auth_failure: bool,
        class: String,
        duration_ms: u64,
    },
    /// One send round trip finished; the session holds the reply.
    Delivered { duration_ms: u64 },
    SendFailed { class: String, duration_ms: u64 },
    /// Device-code sign-in instructions raised while connecting.
    SignIn { message: String },
    /// Delayed auto-open of the help overlay after an auth failure.
    ShowHelp,
    Disconnected,
}

// ── Notices ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// Transient status banner — the toast analogue.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

// ── Mode / Tab ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Connecting,
    Sending,
    FieldEdit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Chat,
    Config,
}

// ── Config fields ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    EnvironmentId,
    AgentId,
    TenantId,
    ClientId,
}

impl ConfigField {
    pub const ALL: [ConfigField; 4] = [
        ConfigField::EnvironmentId,
        ConfigField::AgentId,
        ConfigField::TenantId,
        ConfigField::ClientId,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConfigField::EnvironmentId => "Environment ID",
            ConfigField::AgentId => "Agent Schema Name",
            ConfigField::TenantId => "Tenant ID",
            ConfigField::ClientId => "Client ID",
        }
    }

    pub fn get(self, config: &AgentConfig) -> &str {
        match self {
            ConfigField::EnvironmentId => &config.environment_id,
            ConfigField::AgentId => &config.agent_id,
            ConfigField::TenantId => &config.tenant_id,
            ConfigField::ClientId => &config.client_id,
        }
    }

    pub fn set(self, config: &mut AgentConfig, value: String) {
        match self {
            ConfigField::EnvironmentId => config.environment_id = value,
            ConfigField::AgentId => config.agent_id = value,
            ConfigField::TenantId => config.tenant_id = value,
            ConfigField::ClientId => config.client_id = value,
        }
    }
}

/// Per-field reveal flags for the masked configuration values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowValues {
    pub environment_id: bool,
    pub agent_id: bool,
    pub tenant_id: bool,
    pub client_id: bool,
}

impl ShowValues {
    pub fn get(&self, field: ConfigField) -> bool {
        match field {
            ConfigField::EnvironmentId => self.environment_id,
            ConfigField::AgentId => self.agent_id,
            ConfigField::TenantId => self.tenant_id,
            ConfigField::ClientId => self.client_id,
        }
    }

    pub fn toggle(&mut self, field: ConfigField) {
        match field {
            ConfigField::EnvironmentId => self.environment_id = !self.environment_id,
            ConfigField::AgentId => self.agent_id = !self.agent_id,
            ConfigField::TenantId => self.tenant_id = !self.tenant_id,
            ConfigField::ClientId => self.client_id = !self.client_id,
        }
    }

    pub fn any(&self) -> bool {
        self.environment_id || self.agent_id || self.tenant_id || self.client_id
    }

    pub fn set_all(&mut self, on: bool) {
        *self = Self {
            environment_id: on,
            agent_id: on,
            tenant_id: on,
            client_id: on,
        };
    }
}

/// In-progress edit of one config field.
#[derive(Debug, Clone)]
pub struct FieldEdit {
    pub field: ConfigField,
    pub buffer: String,
    pub cursor: usize, // byte offset in buffer
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    /// Editable configuration; pushed into the session on connect.
    pub config: AgentConfig,
    pub show_values: ShowValues,

    // Snapshot of the session, refreshed after every UiEvent.
    pub status: SessionStatus,
    pub messages: Vec<Message>,
    pub conversation: Option<String>,

    pub input: String,
    pub cursor: usize, // byte offset in input
    pub mode: Mode,
    pub active_tab: Tab,
    pub scroll: usize, // lines scrolled up in the transcript
    pub show_timestamps: bool,
    pub notice: Option<Notice>,
    notice_ttl: u16,
    pub help_visible: bool,
    pub help_scroll: usize,
    pub config_focus: usize, // 0..=3
    pub field_edit: Option<FieldEdit>,
    /// Incremented every 120ms while connecting/sending, drives the spinner.
    pub spinner_tick: u32,
    pub stats: SessionStats,
    /// Active device-code sign-in instructions, shown while connecting.
    pub sign_in: Option<String>,

    session: Arc<Mutex<ChatSession>>,
}

impl AppState {
    pub fn new(
        config: AgentConfig,
        show_timestamps: bool,
        session: Arc<Mutex<ChatSession>>,
    ) -> Self {
        // Start on the Config tab when setup is incomplete.
        let active_tab = if config.is_complete() {
            Tab::Chat
        } else {
            Tab::Config
        };
        Self {
            config,
            show_values: ShowValues::default(),
            status: SessionStatus::Disconnected,
            messages: Vec::new(),
            conversation: None,
            input: String::new(),
            cursor: 0,
            mode: Mode::Normal,
            active_tab,
            scroll: 0,
            show_timestamps,
            notice: None,
            notice_ttl: 0,
            help_visible: false,
            help_scroll: 0,
            config_focus: 0,
            field_edit: None,
            spinner_tick: 0,
            stats: SessionStats::default(),
            sign_in: None,
            session,
        }
    }

    pub fn set_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            text: text.into(),
        });
        self.notice_ttl = NOTICE_TTL_TICKS;
    }

    /// Advance the notice timer one tick. Returns true when the display
    /// changed and a redraw is needed.
    fn tick_notice(&mut self) -> bool {
        if self.notice.is_none() {
            return false;
        }
        self.notice_ttl = self.notice_ttl.saturating_sub(1);
        if self.notice_ttl == 0 {
            self.notice = None;
            true
        } else {
            false
        }
    }

    /// Pull the authoritative transcript and status out of the session.
    async fn sync_session(&mut self) {
        let session = self.session.clone();
        let guard = session.lock().await;
        self.status = guard.status();
        self.messages = guard.messages().to_vec();
        self.conversation = guard.conversation_id().map(str::to_string);
    }

    async fn apply_event(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::Connected { duration_ms } => {
                self.sync_session().await;
                self.mode = Mode::Normal;
                self.sign_in = None;
                self.scroll = 0;
                self.active_tab = Tab::Chat;
                self.stats.record_connect(true, false);
                self.flush_record("connect", true, None, duration_ms);
                self.set_notice(NoticeKind::Success, "Connected to Copilot Studio");
            }
            UiEvent::ConnectFailed {
                message,
                hint,
                auth_failure,
                class,
                duration_ms,
            } => {
                self.sync_session().await;
                self.mode = Mode::Normal;
                self.sign_in = None;
                self.stats.record_connect(false, auth_failure);
                self.flush_record("connect", false, Some(&class), duration_ms);
                let text = match hint {
                    Some(h) => format!("{message} — {h}"),
                    None => message,
                };
                self.set_notice(NoticeKind::Error, text);
            }
            UiEvent::Delivered { duration_ms } => {
                self.sync_session().await;
                self.mode = Mode::Normal;
                self.scroll = 0;
                self.stats.record_send(true);
                self.flush_record("send", true, None, duration_ms);
            }
            UiEvent::SendFailed { class, duration_ms } => {
                self.sync_session().await;
                self.mode = Mode::Normal;
                self.stats.record_send(false);
                self.flush_record("send", false, Some(&class), duration_ms);
                self.set_notice(NoticeKind::Error, "Failed to send message");
            }
            UiEvent::SignIn { message } => {
                self.sign_in = Some(message.clone());
                self.set_notice(NoticeKind::Info, message);
            }
            UiEvent::ShowHelp => {
                self.help_visible = true;
                self.help_scroll = 0;
            }
            UiEvent::Disconnected => {
                self.sync_session().await;
                self.mode = Mode::Normal;
                self.scroll = 0;
                self.set_notice(NoticeKind::Info, "Disconnected from Copilot Studio");
            }
        }
    }

    fn flush_record(
        &self,
        operation: &str,
        success: bool,
        error_class: Option<&str>,
        duration_ms: u64,
    ) {
        telemetry::append_record(&EventRecord::new(
            operation,
            success,
            error_class,
            duration_ms,
            &mask_value(&self.config.environment_id, false),
        ));
    }
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(config: AgentConfig, show_timestamps: bool) -> Result<()> {
    let mut terminal = setup_terminal()?;

    // Panic hook — restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, config, show_timestamps).await;

    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: AgentConfig,
    show_timestamps: bool,
) -> Result<()> {
    // Channel: network tasks → TUI
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();

    // The token provider surfaces device-code prompts through the channel.
    let prompt_tx = ui_tx.clone();
    let tokens: Arc<dyn TokenSource> = Arc::new(EntraTokenProvider::new(move |prompt| {
        let _ = prompt_tx.send(UiEvent::SignIn {
            message: format!(
                "Sign in: open {} and enter code {}",
                prompt.verification_uri, prompt.user_code
            ),
        });
    }));
    let factory: SessionFactory =
        Box::new(|config| Arc::new(CopilotClient::new(config.clone())) as Arc<dyn AgentSession>);
    let session = Arc::new(Mutex::new(ChatSession::new(
        config.clone(),
        tokens,
        factory,
    )));

    let mut state = AppState::new(config, show_timestamps, session);

    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    // Splash screen
    terminal.draw(|f| render::draw_splash(f))?;
    tokio::time::sleep(tokio::time::Duration::from_millis(900)).await;
    terminal.draw(|f| render::draw(f, &state))?;

    loop {
        tokio::select! {
            // ── Animation tick ────────────────────────────────────────────────
            _ = ticker.tick() => {
                let mut redraw = state.tick_notice();
                if matches!(state.mode, Mode::Connecting | Mode::Sending) {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                    redraw = true;
                }
                if redraw {
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Drain UI events from network tasks ────────────────────────────
            Some(ev) = ui_rx.recv() => {
                state.apply_event(ev).await;
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => {
                match ev {
                    Event::Key(key) => {
                        let keep = handle_key(key, &mut state, &ui_tx);
                        if !keep { break; }
                    }
                    Event::Resize(_, _) => {}
                    _ => {}
                }
                terminal.draw(|f| render::draw(f, &state))?;
            }
        }
    }

    Ok(())
}

// ── Key handler ───────────────────────────────────────────────────────────────

fn handle_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
    // Help overlay intercepts everything while open.
    if state.help_visible {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') | KeyCode::F(1) => {
                state.help_visible = false;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                state.help_scroll = state.help_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.help_scroll = state.help_scroll.saturating_add(1);
            }
            _ => {}
        }
        return true;
    }

    // Ctrl+C / Ctrl+D — quit
    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
    {
        return false;
    }

    // F1 — help from anywhere
    if key.code == KeyCode::F(1) {
        state.help_visible = true;
        state.help_scroll = 0;
        return true;
    }

    // Field editing is modal.
    if state.mode == Mode::FieldEdit {
        handle_field_edit_key(key, state);
        return true;
    }

    match state.active_tab {
        Tab::Config => {
            handle_config_key(key, state, ui_tx);
            true
        }
        Tab::Chat => handle_chat_key(key, state, ui_tx),
    }
}

// ── Chat tab keys ─────────────────────────────────────────────────────────────

fn handle_chat_key(
    key: KeyEvent,
    state: &mut AppState,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) -> bool {
    match (key.modifiers, key.code) {
        (KeyModifiers::NONE, KeyCode::Tab) => {
            state.active_tab = Tab::Config;
        }
        (KeyModifiers::NONE, KeyCode::Char('1')) if state.input.is_empty() => {
            state.active_tab = Tab::Chat;
        }
        (KeyModifiers::NONE, KeyCode::Char('2')) if state.input.is_empty() => {
            state.active_tab = Tab::Config;
        }
        (KeyModifiers::NONE, KeyCode::Char('?')) if state.input.is_empty() => {
            state.help_visible = true;
            state.help_scroll = 0;
        }
        // Enter — submit the composer
        (KeyModifiers::NONE, KeyCode::Enter) => {
            if state.mode == Mode::Normal {
                return submit_input(state, ui_tx);
            }
        }
        // Scroll
        (KeyModifiers::NONE, KeyCode::Up) | (KeyModifiers::NONE, KeyCode::PageUp) => {
            state.scroll = state.scroll.saturating_add(3);
        }
        (KeyModifiers::NONE, KeyCode::Down) | (KeyModifiers::NONE, KeyCode::PageDown) => {
            state.scroll = state.scroll.saturating_sub(3);
        }
        // Composer editing — frozen while a connect/send is running
        (KeyModifiers::NONE, KeyCode::Backspace) => {
            if state.mode == Mode::Normal {
                input_backspace(&mut state.input, &mut state.cursor);
            }
        }
        (KeyModifiers::NONE, KeyCode::Delete) => {
            if state.mode == Mode::Normal {
                input_delete_forward(&mut state.input, &mut state.cursor);
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Backspace) | (KeyModifiers::CONTROL, KeyCode::Char('w')) => {
            if state.mode == Mode::Normal {
                input_delete_word(&mut state.input, &mut state.cursor);
            }
        }
        (KeyModifiers::NONE, KeyCode::Left) => {
            if state.mode == Mode::Normal {
                state.cursor = prev_char_boundary(&state.input, state.cursor);
            }
        }
        (KeyModifiers::NONE, KeyCode::Right) => {
            if state.mode == Mode::Normal {
                state.cursor = next_char_boundary(&state.input, state.cursor);
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Left) => {
            if state.mode == Mode::Normal {
                state.cursor = word_left(&state.input, state.cursor);
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Right) => {
            if state.mode == Mode::Normal {
                state.cursor = word_right(&state.input, state.cursor);
            }
        }
        (KeyModifiers::NONE, KeyCode::Home) | (KeyModifiers::CONTROL, KeyCode::Char('a')) => {
            if state.mode == Mode::Normal {
                state.cursor = 0;
            }
        }
        (KeyModifiers::NONE, KeyCode::End) | (KeyModifiers::CONTROL, KeyCode::Char('e')) => {
            if state.mode == Mode::Normal {
                state.cursor = state.input.len();
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
            if state.mode == Mode::Normal {
                state.input.drain(..state.cursor);
                state.cursor = 0;
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Char('k')) => {
            if state.mode == Mode::Normal {
                state.input.truncate(state.cursor);
            }
        }
        // Regular char input — insert at cursor
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
            if state.mode == Mode::Normal {
                let mut buf = [0u8; 4];
                let s = c.encode_utf8(&mut buf);
                state.input.insert_str(state.cursor, s);
                state.cursor += s.len();
            }
        }
        _ => {}
    }
    true
}

fn submit_input(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
    let input = state.input.trim().to_string();
    if input.is_empty() {
        return true;
    }
    state.input.clear();
    state.cursor = 0;

    if let Some(command) = input.strip_prefix('/') {
        return execute_command(command.trim(), state, ui_tx);
    }
    launch_send(input, state, ui_tx);
    true
}

// ── Slash commands ────────────────────────────────────────────────────────────

fn execute_command(
    command: &str,
    state: &mut AppState,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) -> bool {
    match command {
        "help" => {
            state.help_visible = true;
            state.help_scroll = 0;
        }
        "connect" => launch_connect(state, ui_tx),
        "disconnect" => launch_disconnect(state, ui_tx),
        "quit" | "q" => return false,
        _ => {
            state.set_notice(
                NoticeKind::Error,
                format!("unknown command: /{command}  (try /help)"),
            );
        }
    }
    true
}

// ── Config tab keys ───────────────────────────────────────────────────────────

fn handle_config_key(
    key: KeyEvent,
    state: &mut AppState,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) {
    match key.code {
        KeyCode::Tab | KeyCode::Char('1') => {
            state.active_tab = Tab::Chat;
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.config_focus = state.config_focus.checked_sub(1).unwrap_or(3);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.config_focus = (state.config_focus + 1) % ConfigField::ALL.len();
        }
        KeyCode::Enter => begin_field_edit(state),
        KeyCode::Char('v') => {
            state.show_values.toggle(ConfigField::ALL[state.config_focus]);
        }
        KeyCode::Char('a') => {
            let on = !state.show_values.any();
            state.show_values.set_all(on);
        }
        KeyCode::Char('c') => launch_connect(state, ui_tx),
        KeyCode::Char('x') => launch_disconnect(state, ui_tx),
        KeyCode::Char('?') => {
            state.help_visible = true;
            state.help_scroll = 0;
        }
        _ => {}
    }
}

fn begin_field_edit(state: &mut AppState) {
    if state.status != SessionStatus::Disconnected {
        state.set_notice(
            NoticeKind::Info,
            "Configuration is locked while connected — press x to disconnect",
        );
        return;
    }
    if state.mode != Mode::Normal {
        return;
    }
    let field = ConfigField::ALL[state.config_focus];
    let buffer = field.get(&state.config).to_string();
    let cursor = buffer.len();
    state.field_edit = Some(FieldEdit {
        field,
        buffer,
        cursor,
    });
    state.mode = Mode::FieldEdit;
}

fn handle_field_edit_key(key: KeyEvent, state: &mut AppState) {
    match key.code {
        KeyCode::Esc => {
            state.field_edit = None;
            state.mode = Mode::Normal;
            return;
        }
        KeyCode::Enter => {
            if let Some(edit) = state.field_edit.take() {
                edit.field.set(&mut state.config, edit.buffer);
            }
            state.mode = Mode::Normal;
            return;
        }
        _ => {}
    }

    let Some(edit) = state.field_edit.as_mut() else {
        state.mode = Mode::Normal;
        return;
    };
    match (key.modifiers, key.code) {
        (KeyModifiers::NONE, KeyCode::Backspace) => {
            input_backspace(&mut edit.buffer, &mut edit.cursor);
        }
        (KeyModifiers::CONTROL, KeyCode::Backspace) | (KeyModifiers::CONTROL, KeyCode::Char('w')) => {
            input_delete_word(&mut edit.buffer, &mut edit.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Delete) => {
            input_delete_forward(&mut edit.buffer, &mut edit.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Left) => {
            edit.cursor = prev_char_boundary(&edit.buffer, edit.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Right) => {
            edit.cursor = next_char_boundary(&edit.buffer, edit.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Home) => edit.cursor = 0,
        (KeyModifiers::NONE, KeyCode::End) => edit.cursor = edit.buffer.len(),
        (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
            edit.buffer.drain(..edit.cursor);
            edit.cursor = 0;
        }
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            edit.buffer.insert_str(edit.cursor, s);
            edit.cursor += s.len();
        }
        _ => {}
    }
}

// ── Connect / send / disconnect launchers ─────────────────────────────────────

fn launch_connect(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    if state.status != SessionStatus::Disconnected || state.mode != Mode::Normal {
        return;
    }
    // Guard before any network: all four fields present.
    if !state.config.is_complete() {
        state.set_notice(NoticeKind::Error, "Please fill in all configuration fields");
        state.stats.record_connect(false, false);
        state.flush_record("connect", false, Some("validation"), 0);
        return;
    }

    state.mode = Mode::Connecting;
    state.status = SessionStatus::Connecting;
    state.set_notice(NoticeKind::Info, "Connecting to Copilot Studio…");

    let session = state.session.clone();
    let config = state.config.clone();
    let ui_tx = ui_tx.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let mut guard = session.lock().await;
        guard.set_config(config);
        let result = guard.connect().await;
        drop(guard);
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                let _ = ui_tx.send(UiEvent::Connected { duration_ms });
            }
            Err(e) => {
                let auth_failure = e.is_auth();
                let _ = ui_tx.send(UiEvent::ConnectFailed {
                    message: format!("Connection failed: {e}"),
                    hint: e.hint().map(str::to_string),
                    auth_failure,
                    class: e.class().to_string(),
                    duration_ms,
                });
                if auth_failure {
                    // Auth failures auto-open the troubleshooting guide after
                    // a short delay.
                    tokio::spawn(async move {
                        tokio::time::sleep(tokio::time::Duration::from_millis(
                            HELP_AUTO_OPEN_DELAY_MS,
                        ))
                        .await;
                        let _ = ui_tx.send(UiEvent::ShowHelp);
                    });
                }
            }
        }
    });
}

fn launch_send(text: String, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    if state.mode != Mode::Normal {
        return;
    }
    if state.status != SessionStatus::Connected {
        state.set_notice(NoticeKind::Info, "Connect to an agent first");
        return;
    }

    // Optimistic display append; the session appends authoritatively and the
    // snapshot is replaced when the round trip finishes.
    state.messages.push(Message {
        id: format!("local-{}", state.messages.len()),
        content: text.clone(),
        role: Role::User,
        timestamp: chrono::Utc::now(),
    });
    state.scroll = 0;
    state.mode = Mode::Sending;

    let session = state.session.clone();
    let ui_tx = ui_tx.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let result = session.lock().await.send(&text).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_outcome) => {
                let _ = ui_tx.send(UiEvent::Delivered { duration_ms });
            }
            Err(e) => {
                let _ = ui_tx.send(UiEvent::SendFailed {
                    class: e.class().to_string(),
                    duration_ms,
                });
            }
        }
    });
}

fn launch_disconnect(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    if state.status != SessionStatus::Connected {
        return;
    }
    state.notice = None;
    let session = state.session.clone();
    let ui_tx = ui_tx.clone();
    tokio::spawn(async move {
        session.lock().await.disconnect();
        let _ = ui_tx.send(UiEvent::Disconnected);
    });
}

// ── Input editing helpers ─────────────────────────────────────────────────────

/// Remove the character immediately before the cursor (UTF-8 safe).
fn input_backspace(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let prev = prev_char_boundary(input, *cursor);
    input.drain(prev..*cursor);
    *cursor = prev;
}

/// Delete the character at the cursor position.
fn input_delete_forward(input: &mut String, cursor: &mut usize) {
    if *cursor >= input.len() {
        return;
    }
    let next = next_char_boundary(input, *cursor);
    input.drain(*cursor..next);
}

/// Delete the word immediately before the cursor (stops at whitespace).
fn input_delete_word(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let start = word_left(input, *cursor);
    input.drain(start..*cursor);
    *cursor = start;
}

/// Previous UTF-8 char boundary before `pos`.
fn prev_char_boundary(s: &str, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let mut p = pos - 1;
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

/// Next UTF-8 char boundary after `pos`.
fn next_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut p = pos + 1;
    while p <= s.len() && !s.is_char_boundary(p) {
        p += 1;
    }
    p.min(s.len())
}

/// Jump to the start of the previous word (skip trailing spaces, then the word).
fn word_left(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    while pos > 0 && !bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    pos
}

/// Jump past the end of the next word to the right.
fn word_right(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    let len = s.len();
    while pos < len && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    while pos < len && !bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}
