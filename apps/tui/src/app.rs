//! Application state and logic.
//!
//! Contains the app state (Model), input handling (Controller).

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use canflash_core::events::{FlashEvent, FlashObserver, LogLevel, PacketDirection};
use canflash_core::{
    CancelToken, FirmwareImage, NodeId, ProgressHandle, SessionConfig, SessionReport,
    SessionState, UploadOutcome, UploadSession, restore_bus, transport,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Maximum log entries to keep.
const MAX_LOG_ENTRIES: usize = 1000;
/// Maximum bus frames to keep in the trace.
const MAX_PACKETS: usize = 1000;
/// Session file read at startup and written with Ctrl+S.
pub const CONFIG_FILE: &str = "canflash.toml";
/// Boot attempts offered by default in the form.
const DEFAULT_ATTEMPTS: u32 = 10;

/// Editable form fields, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Interface,
    Target,
    Timeout,
    Attempts,
    Unmute,
    Firmware,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Interface,
        Field::Target,
        Field::Timeout,
        Field::Attempts,
        Field::Unmute,
        Field::Firmware,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::Interface => "Interface:",
            Field::Target => "Target:   ",
            Field::Timeout => "Timeout:  ",
            Field::Attempts => "Attempts: ",
            Field::Unmute => "Unmute:   ",
            Field::Firmware => "Firmware: ",
        }
    }

    /// Fields changed with Left/Right/Space rather than typing.
    pub fn is_choice(self) -> bool {
        matches!(self, Field::Interface | Field::Target | Field::Unmute)
    }
}

/// Application state.
pub struct App {
    /// Whether to quit the application.
    pub should_quit: bool,
    /// Current focus (which pane is active).
    pub focus: Focus,
    /// Current view/tab.
    pub current_tab: Tab,
    /// Detected CAN interfaces.
    pub interfaces: Vec<String>,
    pub interface_index: usize,
    pub target: NodeId,
    pub timeout_input: String,
    pub attempts_input: String,
    pub unmute: bool,
    pub firmware_path: String,
    /// Input field focus.
    pub input_focus: usize,
    /// Current session state.
    pub state: SessionState,
    /// Progress (0-100).
    pub progress: f64,
    /// Current operation name.
    pub operation: String,
    /// Peers silenced by the last session.
    pub bus_muted: bool,
    pub packets_lost: u64,
    /// Log entries.
    pub logs: VecDeque<LogEntry>,
    /// Log scroll position.
    pub log_scroll: usize,
    /// Is operation running?
    pub is_running: bool,
    /// Shared observer for receiving events from the upload session.
    pub observer: Arc<TuiObserver>,
    progress_handle: ProgressHandle,
    cancel: Option<CancelToken>,
    /// Background session thread handle.
    session_thread: Option<JoinHandle<Result<SessionReport>>>,
    /// Summary of the selected firmware file (cached)
    pub image_info: Option<ImageInfo>,
    /// Recent bus frames
    pub packets: VecDeque<PacketInfo>,
    /// Packet scroll position
    pub packet_scroll: usize,
}

/// Which pane is focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Config,
    Logs,
}

/// Tab/view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Main,
    Logs,
    Bus,
    Help,
}

/// Log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

/// Bus frame for display.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub direction: PacketDirection,
    pub timestamp: String,
    pub id: String,
    pub length: usize,
    pub data_preview: String,
}

/// Loaded firmware summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub bytes: usize,
    pub chunks: usize,
    pub base_address: u32,
}

/// TUI observer that collects events for display.
pub struct TuiObserver {
    events: Mutex<VecDeque<FlashEvent>>,
}

impl TuiObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(256)),
        }
    }

    pub fn drain_events(&self) -> Vec<FlashEvent> {
        match self.events.lock() {
            Ok(mut events) => events.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for TuiObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashObserver for TuiObserver {
    fn on_event(&self, event: &FlashEvent) {
        if let Ok(mut events) = self.events.lock() {
            // Bounded between ticks; the chunk loop can emit thousands of frames
            if events.len() >= 4096 {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
    }
}

impl App {
    pub fn new() -> Self {
        let config = SessionConfig {
            max_boot_attempts: DEFAULT_ATTEMPTS,
            ..SessionConfig::default()
        };
        Self::with_config(config, transport::list_interfaces())
    }

    /// Build the form from `config`, e.g. a loaded session file.
    pub fn with_config(config: SessionConfig, interfaces: Vec<String>) -> Self {
        let interface_index = config
            .interface
            .as_ref()
            .and_then(|name| interfaces.iter().position(|i| i == name))
            .unwrap_or(0);

        let mut app = Self {
            should_quit: false,
            focus: Focus::Config,
            current_tab: Tab::Main,
            interfaces,
            interface_index,
            target: config.target,
            timeout_input: config.boot_timeout_ms.to_string(),
            attempts_input: config.max_boot_attempts.to_string(),
            unmute: config.unmute_after_upload,
            firmware_path: config.firmware_path.clone().unwrap_or_default(),
            input_focus: 0,
            state: SessionState::Idle,
            progress: 0.0,
            operation: String::new(),
            bus_muted: false,
            packets_lost: 0,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            log_scroll: 0,
            is_running: false,
            observer: Arc::new(TuiObserver::new()),
            progress_handle: ProgressHandle::new(),
            cancel: None,
            session_thread: None,
            image_info: None,
            packets: VecDeque::with_capacity(MAX_PACKETS),
            packet_scroll: 0,
        };
        if app.interfaces.is_empty() {
            app.add_log(LogLevel::Warn, "No CAN interfaces found");
        }
        app.inspect_firmware();
        app
    }

    /// Load the form defaults from [`CONFIG_FILE`] when present.
    pub fn load_or_default() -> Self {
        if !Path::new(CONFIG_FILE).exists() {
            return Self::new();
        }
        match SessionConfig::load_from_file(CONFIG_FILE) {
            Ok(config) => {
                let mut app = Self::with_config(config, transport::list_interfaces());
                app.add_log(LogLevel::Info, format!("Loaded {}", CONFIG_FILE));
                app
            }
            Err(e) => {
                let mut app = Self::new();
                app.add_log(LogLevel::Warn, format!("Ignoring {}: {}", CONFIG_FILE, e));
                app
            }
        }
    }

    pub fn selected_interface(&self) -> Option<&str> {
        self.interfaces
            .get(self.interface_index)
            .map(String::as_str)
    }

    pub fn field(&self) -> Field {
        Field::ALL[self.input_focus.min(Field::ALL.len() - 1)]
    }

    /// Text shown for `field`.
    pub fn field_value(&self, field: Field) -> String {
        match field {
            Field::Interface => self
                .selected_interface()
                .map(|name| format!("< {} >", name))
                .unwrap_or_else(|| "(none)".to_string()),
            Field::Target => format!("< {} >", self.target),
            Field::Timeout => format!("{} ms", self.timeout_input),
            Field::Attempts => self.attempts_input.clone(),
            Field::Unmute => String::from(if self.unmute { "[x]" } else { "[ ]" }),
            Field::Firmware => self.firmware_path.clone(),
        }
    }

    /// Session configuration from the form fields.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let boot_timeout_ms = self
            .timeout_input
            .parse()
            .with_context(|| format!("Invalid timeout '{}'", self.timeout_input))?;
        let max_boot_attempts = self
            .attempts_input
            .parse()
            .with_context(|| format!("Invalid attempts '{}'", self.attempts_input))?;

        let config = SessionConfig {
            target: self.target,
            boot_timeout_ms,
            max_boot_attempts,
            unmute_after_upload: self.unmute,
            max_chunk_polls: None,
            interface: self.selected_interface().map(str::to_string),
            firmware_path: (!self.firmware_path.is_empty()).then(|| self.firmware_path.clone()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the firmware file and cache its summary
    pub fn inspect_firmware(&mut self) {
        let path = Path::new(&self.firmware_path);
        if self.firmware_path.is_empty() || !path.is_file() {
            self.image_info = None;
            return;
        }
        match FirmwareImage::load(path) {
            Ok(image) => {
                let info = ImageInfo {
                    bytes: image.len(),
                    chunks: image.chunk_count(),
                    base_address: image.base_address(),
                };
                if self.image_info.as_ref() != Some(&info) {
                    self.add_log(
                        LogLevel::Info,
                        format!("Firmware loaded: {} bytes", info.bytes),
                    );
                }
                self.image_info = Some(info);
            }
            Err(e) => {
                self.add_log(LogLevel::Warn, format!("Failed to load firmware: {}", e));
                self.image_info = None;
            }
        }
    }

    /// Handle keyboard input. Returns true if app should quit.
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        // Global shortcuts
        match key.code {
            KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return true;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return true;
            }
            KeyCode::Char('x') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cancel_operation();
                return false;
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.save_config();
                return false;
            }
            KeyCode::Esc => {
                if self.current_tab != Tab::Main {
                    self.current_tab = Tab::Main;
                    return false;
                }
                self.should_quit = true;
                return true;
            }
            KeyCode::F(1) => {
                self.current_tab = Tab::Help;
                return false;
            }
            KeyCode::F(2) => {
                self.current_tab = Tab::Logs;
                return false;
            }
            KeyCode::F(3) => {
                self.current_tab = Tab::Bus;
                return false;
            }
            KeyCode::F(5) => {
                self.restore_bus();
                return false;
            }
            _ => {}
        }

        // Tab-specific handling
        match self.current_tab {
            Tab::Main => self.handle_main_key(key),
            Tab::Logs => self.handle_logs_key(key),
            Tab::Bus => self.handle_bus_key(key),
            Tab::Help => {
                // Any key returns to main
                self.current_tab = Tab::Main;
            }
        }

        false
    }

    fn handle_main_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Config => Focus::Logs,
                    Focus::Logs => Focus::Config,
                };
            }
            KeyCode::Up => {
                if self.focus == Focus::Config && self.input_focus > 0 {
                    self.input_focus -= 1;
                }
            }
            KeyCode::Down => {
                if self.focus == Focus::Config && self.input_focus < Field::ALL.len() - 1 {
                    self.input_focus += 1;
                }
            }
            KeyCode::Left if self.focus == Focus::Config => self.cycle_field(false),
            KeyCode::Right if self.focus == Focus::Config => self.cycle_field(true),
            KeyCode::Enter => {
                if self.focus == Focus::Config && !self.is_running {
                    self.start_operation();
                }
            }
            KeyCode::Char(' ') if self.focus == Focus::Config && self.field().is_choice() => {
                self.cycle_field(true);
            }
            KeyCode::Char(c) => {
                if self.focus == Focus::Config {
                    self.input_char(c);
                }
            }
            KeyCode::Backspace => {
                if self.focus == Focus::Config {
                    self.delete_char();
                }
            }
            _ => {}
        }
    }

    fn handle_logs_key(&mut self, key: KeyEvent) {
        self.log_scroll = scroll(self.log_scroll, self.logs.len(), key.code);
    }

    fn handle_bus_key(&mut self, key: KeyEvent) {
        self.packet_scroll = scroll(self.packet_scroll, self.packets.len(), key.code);
    }

    fn cycle_field(&mut self, forward: bool) {
        if self.is_running {
            return;
        }
        match self.field() {
            Field::Interface => {
                let count = self.interfaces.len();
                if count > 0 {
                    self.interface_index = if forward {
                        (self.interface_index + 1) % count
                    } else {
                        (self.interface_index + count - 1) % count
                    };
                }
            }
            Field::Target => {
                self.target = if forward {
                    self.target.next()
                } else {
                    self.target.next().next()
                };
            }
            Field::Unmute => self.unmute = !self.unmute,
            _ => {}
        }
    }

    fn input_char(&mut self, c: char) {
        if self.is_running {
            return;
        }
        match self.field() {
            Field::Timeout if c.is_ascii_digit() => self.timeout_input.push(c),
            Field::Attempts if c.is_ascii_digit() => self.attempts_input.push(c),
            Field::Firmware => {
                self.firmware_path.push(c);
                // Auto-inspect when the firmware path changes
                self.inspect_firmware();
            }
            _ => {}
        }
    }

    fn delete_char(&mut self) {
        if self.is_running {
            return;
        }
        match self.field() {
            Field::Timeout => {
                self.timeout_input.pop();
            }
            Field::Attempts => {
                self.attempts_input.pop();
            }
            Field::Firmware => {
                self.firmware_path.pop();
                self.inspect_firmware();
            }
            _ => {}
        }
    }

    fn save_config(&mut self) {
        let result = self
            .session_config()
            .and_then(|config| config.save_to_file(CONFIG_FILE));
        match result {
            Ok(()) => self.add_log(LogLevel::Info, format!("Saved {}", CONFIG_FILE)),
            Err(e) => self.add_log(LogLevel::Error, format!("Save failed: {:#}", e)),
        }
    }

    fn start_operation(&mut self) {
        if self.is_running {
            return;
        }

        let config = match self.session_config() {
            Ok(config) => config,
            Err(e) => {
                self.add_log(LogLevel::Error, format!("{:#}", e));
                return;
            }
        };
        let (Some(interface), Some(firmware)) =
            (config.interface.clone(), config.firmware_path.clone())
        else {
            self.add_log(
                LogLevel::Error,
                "Select a CAN interface and enter a firmware path.",
            );
            return;
        };

        self.is_running = true;
        self.state = SessionState::Idle;
        self.progress = 0.0;
        self.packets_lost = 0;
        self.operation = "Starting...".to_string();

        self.add_log(
            LogLevel::Info,
            format!("Uploading {} to {} on {}", firmware, config.target, interface),
        );

        // Clone shared handles for the thread
        let observer = self.observer.clone();
        let progress = self.progress_handle.clone();
        let cancel = CancelToken::new();
        self.cancel = Some(cancel.clone());

        // Spawn session thread
        let handle = thread::spawn(move || -> Result<SessionReport> {
            let bus = transport::open(&interface)
                .with_context(|| format!("Failed to open {}", interface))?;
            let image = FirmwareImage::load(&firmware)?;
            let session = UploadSession::with_observer(bus.as_ref(), image, config, observer)?
                .with_progress_handle(progress)
                .with_cancel_token(cancel);
            Ok(session.run())
        });

        self.session_thread = Some(handle);
    }

    fn cancel_operation(&mut self) {
        if let Some(cancel) = &self.cancel
            && self.is_running
        {
            cancel.cancel();
            self.add_log(LogLevel::Warn, "Cancelling upload...");
        }
    }

    /// Send the unmute sequence on the selected interface.
    fn restore_bus(&mut self) {
        if self.is_running {
            self.add_log(LogLevel::Warn, "Upload in progress");
            return;
        }
        let Some(interface) = self.selected_interface().map(str::to_string) else {
            self.add_log(LogLevel::Error, "No CAN interface selected");
            return;
        };
        match transport::open(&interface) {
            Ok(bus) => {
                let sent = restore_bus(bus.as_ref(), self.observer.as_ref());
                self.record_restore(&interface, sent);
            }
            Err(e) => self.add_log(LogLevel::Error, format!("{}: {}", interface, e)),
        }
    }

    /// The bus only counts as live again once some unmute frame went out.
    fn record_restore(&mut self, interface: &str, sent: usize) {
        if sent == 0 {
            self.add_log(
                LogLevel::Error,
                format!("No unmute frame accepted by {}", interface),
            );
            return;
        }
        self.bus_muted = false;
        self.add_log(
            LogLevel::Info,
            format!("Bus restored on {} ({} frames)", interface, sent),
        );
    }

    /// Called on each tick - process observer events.
    pub fn on_tick(&mut self) {
        // Process events from observer
        let events = self.observer.drain_events();
        for event in events {
            self.process_flash_event(event);
        }

        // The handle drops back to 0 after finalize; keep the high-water mark
        if self.is_running && self.state == SessionState::Transferring {
            self.progress = self.progress.max(self.progress_handle.percent());
        }

        if self
            .session_thread
            .as_ref()
            .is_some_and(|handle| handle.is_finished())
            && let Some(handle) = self.session_thread.take()
        {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(anyhow::anyhow!("Session thread panicked")));
            self.finish_operation(result);
        }
    }

    fn finish_operation(&mut self, result: Result<SessionReport>) {
        self.is_running = false;
        self.cancel = None;
        match result {
            Ok(report) => {
                self.bus_muted = report.bus_muted;
                match report.outcome {
                    UploadOutcome::Flashed(result) => {
                        self.progress = 100.0;
                        self.add_log(
                            LogLevel::Info,
                            format!(
                                "Upload complete: {} bytes, {} packets lost",
                                result.bytes_sent, result.packets_lost
                            ),
                        );
                    }
                    UploadOutcome::BootFailed { attempts } => {
                        self.add_log(
                            LogLevel::Error,
                            format!("No boot mode after {} attempt(s)", attempts),
                        );
                    }
                    UploadOutcome::Aborted { phase, error } => {
                        self.add_log(LogLevel::Error, format!("{} failed: {}", phase, error));
                    }
                }
                if self.bus_muted {
                    self.add_log(LogLevel::Warn, "Bus left muted, F5 restores it");
                }
            }
            Err(e) => {
                self.state = SessionState::Failed;
                self.add_log(LogLevel::Error, format!("{:#}", e));
            }
        }
    }

    fn process_flash_event(&mut self, event: FlashEvent) {
        match event {
            FlashEvent::StateChanged { to, .. } => {
                self.state = to;
                if to == SessionState::Muted {
                    self.bus_muted = true;
                }
                self.operation = to.to_string();
                self.add_log(LogLevel::Info, format!("State: {}", to));
            }
            FlashEvent::BootAttempt {
                node,
                attempt,
                max_attempts,
            } => {
                self.operation = format!("Boot {} ({}/{})", node, attempt, max_attempts);
            }
            FlashEvent::BootModeEntered { node, attempt } => {
                self.add_log(
                    LogLevel::Info,
                    format!("{} in bootloader mode (attempt {})", node, attempt),
                );
            }
            FlashEvent::Progress {
                bytes_processed,
                total_bytes,
                ..
            } => {
                self.operation = format!("{}/{} bytes", bytes_processed, total_bytes);
            }
            FlashEvent::PacketLost { total_lost, .. } => {
                self.packets_lost = total_lost;
            }
            FlashEvent::Log { level, message } => {
                self.add_log(level, message);
            }
            FlashEvent::Error { message } => {
                self.add_log(LogLevel::Error, message);
            }
            FlashEvent::Complete {
                bytes_sent,
                packets_lost,
            } => {
                self.progress = 100.0;
                self.packets_lost = packets_lost;
                self.add_log(LogLevel::Info, format!("Data sent: {} bytes", bytes_sent));
            }
            FlashEvent::Packet { direction, frame } => {
                let now = chrono::Local::now();
                let packet = PacketInfo {
                    direction,
                    timestamp: now.format("%H:%M:%S.%3f").to_string(), // Milliseconds
                    id: format!("{:03X}", frame.id()),
                    length: frame.len(),
                    data_preview: frame.hex(),
                };

                if self.packets.len() >= MAX_PACKETS {
                    self.packets.pop_front();
                }
                self.packets.push_back(packet);
                // Auto-scroll
                self.packet_scroll = self.packets.len().saturating_sub(1);
            }
        }
    }

    fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        let now = chrono::Local::now();
        let entry = LogEntry {
            level,
            message: message.into(),
            timestamp: now.format("%H:%M:%S").to_string(),
        };

        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);

        // Auto-scroll to bottom
        self.log_scroll = self.logs.len().saturating_sub(1);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// New scroll position for a list of `len` rows.
fn scroll(position: usize, len: usize, key: KeyCode) -> usize {
    let last = len.saturating_sub(1);
    match key {
        KeyCode::Up | KeyCode::Char('k') => position.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => (position + 1).min(last),
        KeyCode::PageUp => position.saturating_sub(10),
        KeyCode::PageDown => (position + 10).min(last),
        KeyCode::Home => 0,
        KeyCode::End => last,
        _ => position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        App::with_config(
            SessionConfig {
                max_boot_attempts: DEFAULT_ATTEMPTS,
                ..SessionConfig::default()
            },
            vec!["can0".to_string(), "vcan0".to_string()],
        )
    }

    #[test]
    fn test_form_defaults() {
        let app = app();
        assert_eq!(app.selected_interface(), Some("can0"));
        assert_eq!(app.target, NodeId::Top);
        assert_eq!(app.timeout_input, "10000");
        assert_eq!(app.attempts_input, "10");
        assert!(!app.unmute);
    }

    #[test]
    fn test_cycle_choice_fields() {
        let mut app = app();
        app.on_key(key(KeyCode::Right));
        assert_eq!(app.selected_interface(), Some("vcan0"));
        app.on_key(key(KeyCode::Right));
        assert_eq!(app.selected_interface(), Some("can0"));

        app.on_key(key(KeyCode::Down));
        app.on_key(key(KeyCode::Left));
        assert_eq!(app.target, NodeId::Top.next().next());

        app.on_key(key(KeyCode::Down));
        app.on_key(key(KeyCode::Down));
        app.on_key(key(KeyCode::Down));
        assert_eq!(app.field(), Field::Unmute);
        app.on_key(key(KeyCode::Char(' ')));
        assert!(app.unmute);
    }

    #[test]
    fn test_numeric_fields_ignore_letters() {
        let mut app = app();
        app.input_focus = 2;
        app.on_key(key(KeyCode::Backspace));
        app.on_key(key(KeyCode::Char('a')));
        app.on_key(key(KeyCode::Char('5')));
        assert_eq!(app.timeout_input, "10005");
    }

    #[test]
    fn test_session_config_rejects_short_timeout() {
        let mut app = app();
        app.timeout_input = "999".to_string();
        assert!(app.session_config().is_err());
        app.timeout_input = "1000".to_string();
        let config = app.session_config().unwrap();
        assert_eq!(config.boot_timeout_ms, 1000);
        assert_eq!(config.max_boot_attempts, 10);
        assert_eq!(config.interface.as_deref(), Some("can0"));
    }

    #[test]
    fn test_start_requires_firmware() {
        let mut app = app();
        app.on_key(key(KeyCode::Enter));
        assert!(!app.is_running);
        assert_eq!(app.logs.back().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn test_muted_state_tracked() {
        let mut app = app();
        app.observer.on_event(&FlashEvent::StateChanged {
            from: SessionState::Idle,
            to: SessionState::Muted,
        });
        app.on_tick();
        assert_eq!(app.state, SessionState::Muted);
        assert!(app.bus_muted);
    }

    #[test]
    fn test_restore_needs_accepted_frames() {
        let mut app = app();
        app.bus_muted = true;

        app.record_restore("can0", 0);
        assert!(app.bus_muted);
        assert_eq!(app.logs.back().unwrap().level, LogLevel::Error);

        app.record_restore("can0", 12);
        assert!(!app.bus_muted);
    }

    #[test]
    fn test_scroll_bounds() {
        assert_eq!(scroll(0, 5, KeyCode::Up), 0);
        assert_eq!(scroll(3, 5, KeyCode::PageDown), 4);
        assert_eq!(scroll(3, 5, KeyCode::Home), 0);
        assert_eq!(scroll(0, 0, KeyCode::End), 0);
    }
}
