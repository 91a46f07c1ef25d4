//! TUI application state and event loop.
//!
//! The pipeline runs on the tokio runtime and writes each frame into shared
//! state through a [`TuiPresenter`]. The UI thread copies that state once per
//! loop iteration and draws from its own copy, so pausing simply stops
//! copying.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio_util::sync::CancellationToken;

use schedviz_core::{
    CollectorError, CollectorState, DashboardData, PipelineExit, Presenter, StatsSnapshot,
};

// ---------------------------------------------------------------------------
// SharedState: written by the pipeline task
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SharedState {
    data: Option<DashboardData>,
    frames: u64,
    state: Option<CollectorState>,
    stats: StatsSnapshot,
    exit: Option<PipelineExit>,
    error: Option<String>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Presenter`] half of the TUI, owned by the pipeline task.
pub struct TuiPresenter {
    shared: Arc<Mutex<SharedState>>,
}

impl TuiPresenter {
    /// Surface a pipeline error; the UI closes and the error is printed
    /// once the terminal is restored.
    pub fn fail(&self, err: &CollectorError) {
        lock(&self.shared).error = Some(err.to_string());
    }
}

impl Presenter for TuiPresenter {
    fn update(&mut self, data: DashboardData) {
        let mut s = lock(&self.shared);
        s.data = Some(data);
        s.frames += 1;
    }

    fn status(&mut self, state: CollectorState, stats: StatsSnapshot) {
        let mut s = lock(&self.shared);
        s.state = Some(state);
        s.stats = stats;
    }

    fn finish(&mut self, exit: &PipelineExit) {
        let mut s = lock(&self.shared);
        s.exit = Some(*exit);
        s.stats = exit.stats;
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    title: String,
    shared: Arc<Mutex<SharedState>>,
    cancel: CancellationToken,
    running: bool,
    paused: bool,
    log_scale: bool,
    frame: DashboardData,
    frames: u64,
    state: Option<CollectorState>,
    stats: StatsSnapshot,
    exit: Option<PipelineExit>,
    error: Option<String>,
    last_export: Option<PathBuf>,
}

impl App {
    pub fn new(title: String, cancel: CancellationToken) -> Self {
        Self {
            title,
            shared: Arc::new(Mutex::new(SharedState::default())),
            cancel,
            running: true,
            paused: false,
            log_scale: false,
            frame: DashboardData::default(),
            frames: 0,
            state: None,
            stats: StatsSnapshot::default(),
            exit: None,
            error: None,
            last_export: None,
        }
    }

    pub fn presenter(&self) -> TuiPresenter {
        TuiPresenter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Restore the terminal before the panic message is printed.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        if let Some(path) = &self.last_export {
            println!("Last snapshot exported to {}", path.display());
        }

        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            self.sync();
            if self.error.is_some() || self.cancel.is_cancelled() {
                break;
            }

            terminal.draw(|f| super::ui::draw(f, self))?;

            if event::poll(Duration::from_millis(50))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key);
            }
        }

        Ok(())
    }

    /// Copy the pipeline's latest output into the UI's own state.
    pub(super) fn sync(&mut self) {
        let mut s = lock(&self.shared);
        self.state = s.state;
        self.stats = s.stats;
        self.exit = s.exit;
        self.error = s.error.take();
        if !self.paused
            && let Some(data) = s.data.take()
        {
            self.frame = data;
            self.frames = s.frames;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit(),
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('l') => self.toggle_log_scale(),
            KeyCode::Char('p') => self.paused = !self.paused,
            KeyCode::Char('s') => self.export_snapshot(),
            _ => {}
        }
    }

    pub(super) fn toggle_log_scale(&mut self) {
        self.log_scale = !self.log_scale;
    }

    fn quit(&mut self) {
        self.running = false;
        self.cancel.cancel();
    }

    fn export_snapshot(&mut self) {
        let epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = export_path(epoch);

        match serde_json::to_string_pretty(&self.snapshot_json())
            .map_err(io::Error::from)
            .and_then(|contents| std::fs::write(&path, contents))
        {
            Ok(()) => {
                log::info!("exported dashboard to {}", path.display());
                self.last_export = Some(path);
            }
            Err(e) => log::warn!("export to {} failed: {e}", path.display()),
        }
    }

    fn snapshot_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.title,
            "state": self.state.map(|s| s.to_string()),
            "stats": self.stats,
            "exit": self.exit,
            "dashboard": self.frame,
        })
    }

    // --- Accessors for the renderer ---

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn frame(&self) -> &DashboardData {
        &self.frame
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn state(&self) -> Option<CollectorState> {
        self.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats
    }

    pub fn exit(&self) -> Option<&PipelineExit> {
        self.exit.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_log_scale(&self) -> bool {
        self.log_scale
    }

    pub fn last_export(&self) -> Option<&PathBuf> {
        self.last_export.as_ref()
    }
}

pub fn export_path(epoch: u64) -> PathBuf {
    PathBuf::from(format!("schedviz-snapshot-{epoch}.json"))
}
