use std::io::{stdout, Stdout};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
        KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};

use crate::config::{Config, PlaybackConfig};
use crate::error::{KeyfallError, Result};
use crate::keyboard::{pitch_for_key, HOLD_TIMEOUT};
use crate::logging::Logger;
use crate::piano::{draw_progress_bar, progress_fraction_at, FilledRect, KeyboardLayout, Rgb, Surface, PROGRESS_TRACK};
use crate::session::{FrameView, Session, TransportCommand};
use crate::{format_duration, set_shutdown_flag, should_shutdown};

const MAX_MESSAGES: usize = 50;
const MIN_WIDTH: u16 = 60;
const MIN_HEIGHT: u16 = 20;

/// Rasterizes virtual-pixel rectangles onto terminal cells
struct CellSurface<'a> {
    buf: &'a mut Buffer,
    area: Rect,
    scale_x: f64,
    scale_y: f64,
}

impl<'a> CellSurface<'a> {
    fn new(buf: &'a mut Buffer, area: Rect, virtual_width: f64, virtual_height: f64) -> Self {
        CellSurface {
            buf,
            area,
            scale_x: f64::from(area.width) / virtual_width.max(1.0),
            scale_y: f64::from(area.height) / virtual_height.max(1.0),
        }
    }
}

/// Cell span for `[start, start + len)`; anything visible gets at least one cell
fn cell_span(start: f64, len: f64, scale: f64, limit: u16) -> Option<(u16, u16)> {
    let limit = f64::from(limit);
    let from = (start * scale).round().clamp(0.0, limit);
    let mut to = ((start + len) * scale).round().clamp(0.0, limit);
    if to <= from && len > 0.0 && from < limit && start + len > 0.0 {
        to = from + 1.0;
    }
    if to <= from {
        return None;
    }
    Some((from as u16, (to - from) as u16))
}

impl Surface for CellSurface<'_> {
    fn fill_rect(&mut self, rect: FilledRect) {
        let Some((x, width)) = cell_span(rect.x, rect.width, self.scale_x, self.area.width) else {
            return;
        };
        let Some((y, height)) = cell_span(rect.y, rect.height, self.scale_y, self.area.height) else {
            return;
        };
        let cells = Rect::new(self.area.x + x, self.area.y + y, width, height).intersection(self.area);
        let Rgb(r, g, b) = rect.color;
        self.buf.set_style(cells, Style::default().bg(Color::Rgb(r, g, b)));
    }
}

/// Screen regions from the last draw, for mouse hit tests
#[derive(Debug, Clone, Copy, Default)]
struct Regions {
    canvas: Rect,
    progress: Rect,
    speed: Rect,
    volume: Rect,
    play: Rect,
    stop: Rect,
    hands: Rect,
    open: Rect,
}

/// Which bar a held left button is dragging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drag {
    Progress,
    Speed,
    Volume,
}

fn hit(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x && column < area.x + area.width && row >= area.y && row < area.y + area.height
}

pub struct TuiApp {
    pub should_quit: bool,
    pub log_messages: Vec<String>,
    /// Path being typed after Ctrl+O
    pub prompt: Option<String>,
    layout: KeyboardLayout,
    canvas_width: f64,
    canvas_height: f64,
    playback: PlaybackConfig,
    regions: Regions,
    drag: Option<Drag>,
    mouse_pitch: Option<u8>,
    key_releases: bool,
    last_frame: Option<Instant>,
    fps: f64,
}

impl TuiApp {
    pub fn new(config: &Config) -> Self {
        let canvas_width = f64::from(config.window.width);
        let canvas_height = f64::from(config.window.height);
        TuiApp {
            should_quit: false,
            log_messages: Vec::new(),
            prompt: None,
            layout: KeyboardLayout::new(&config.piano, canvas_width, canvas_height),
            canvas_width,
            canvas_height,
            playback: config.playback.clone(),
            regions: Regions::default(),
            drag: None,
            mouse_pitch: None,
            key_releases: false,
            last_frame: None,
            fps: 0.0,
        }
    }

    pub fn add_log(&mut self, message: String) {
        self.log_messages.push(message);
        if self.log_messages.len() > MAX_MESSAGES {
            self.log_messages.remove(0);
        }
    }

    fn note_frame(&mut self, now: Instant) {
        if let Some(last) = self.last_frame {
            let secs = now.saturating_duration_since(last).as_secs_f64();
            if secs > 0.0 {
                let instant_fps = 1.0 / secs;
                self.fps = if self.fps == 0.0 { instant_fps } else { self.fps * 0.9 + instant_fps * 0.1 };
            }
        }
        self.last_frame = Some(now);
    }

    fn command(&mut self, session: &mut Session, command: TransportCommand, now: Instant) {
        if let Err(e) = session.apply(command, now) {
            self.add_log(format!("❌ {e}"));
        }
    }

    /// Canvas cell to virtual pixel coordinates
    fn canvas_point(&self, column: u16, row: u16) -> (f64, f64) {
        let area = self.regions.canvas;
        let x = (f64::from(column - area.x) + 0.5) * self.canvas_width / f64::from(area.width.max(1));
        let y = (f64::from(row - area.y) + 0.5) * self.canvas_height / f64::from(area.height.max(1));
        (x, y)
    }

    /// Moves whichever bar is being dragged to `column`
    fn drag_to_column(&mut self, session: &mut Session, drag: Drag, column: u16, now: Instant) {
        let command = match drag {
            Drag::Progress => {
                let fraction = column_fraction(self.regions.progress, column);
                TransportCommand::Seek(fraction * session.timeline().total_duration_ms())
            }
            Drag::Speed => {
                let fraction = column_fraction(self.regions.speed, column);
                let (min, max) = (self.playback.min_speed, self.playback.max_speed);
                TransportCommand::SetSpeed(step_speed(min + fraction * (max - min), 0.0))
            }
            Drag::Volume => {
                let fraction = column_fraction(self.regions.volume, column);
                TransportCommand::SetVolume(((fraction * 100.0).round() / 100.0) as f32)
            }
        };
        self.command(session, command, now);
    }

    fn drag_area(&self, drag: Drag) -> Rect {
        match drag {
            Drag::Progress => self.regions.progress,
            Drag::Speed => self.regions.speed,
            Drag::Volume => self.regions.volume,
        }
    }
}

/// Position of `column` along a one-row bar, 0.0 at the left edge
fn column_fraction(area: Rect, column: u16) -> f64 {
    let bar = FilledRect::new(f64::from(area.x), f64::from(area.y), f64::from(area.width), 1.0, PROGRESS_TRACK);
    progress_fraction_at(&bar, f64::from(column) + 0.5)
}

fn step_speed(current: f64, delta: f64) -> f64 {
    ((current + delta) * 100.0).round() / 100.0
}

fn handle_prompt_key(key: KeyEvent, app: &mut TuiApp, session: &mut Session, now: Instant) {
    let Some(buffer) = app.prompt.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Char(c) => buffer.push(c),
        KeyCode::Backspace => {
            buffer.pop();
        }
        KeyCode::Esc => app.prompt = None,
        KeyCode::Enter => {
            let path = buffer.trim().to_string();
            app.prompt = None;
            if path.is_empty() {
                return;
            }
            app.add_log(format!("📂 Loading {path}"));
            match session.apply(TransportCommand::Load(path.into()), now) {
                Ok(()) => {
                    let snapshot = session.snapshot();
                    app.add_log(format!(
                        "✅ {} ({} notes, {})",
                        snapshot.song_name.unwrap_or_default(),
                        snapshot.note_count,
                        format_duration(snapshot.total_duration_ms)
                    ));
                }
                Err(e) => app.add_log(format!("❌ {e}")),
            }
        }
        _ => {}
    }
}

/// Returns true when the app should exit
fn handle_key_event(key: KeyEvent, app: &mut TuiApp, session: &mut Session, now: Instant) -> bool {
    if key.kind == KeyEventKind::Release {
        app.key_releases = true;
        if let KeyCode::Char(c) = key.code {
            if let Some(pitch) = pitch_for_key(c) {
                session.release_key(pitch);
            }
        }
        return false;
    }

    if app.prompt.is_some() {
        if key.kind == KeyEventKind::Press {
            handle_prompt_key(key, app, session, now);
        }
        return false;
    }

    // Held note keys repeat; everything else acts on the first press only
    if let KeyCode::Char(c) = key.code {
        if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
            if let Some(pitch) = pitch_for_key(c) {
                session.press_key(pitch, now);
                return false;
            }
        }
    }
    if key.kind != KeyEventKind::Press {
        return false;
    }

    let snapshot = session.snapshot();
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            app.add_log("🛑 Ctrl+C pressed, exiting".to_string());
            set_shutdown_flag();
            return true;
        }
        (KeyCode::Char('o'), KeyModifiers::CONTROL) => {
            app.prompt = Some(String::new());
        }
        (KeyCode::Esc, _) => {
            app.should_quit = true;
            return true;
        }
        (KeyCode::Char(' '), _) => app.command(session, TransportCommand::TogglePlay, now),
        (KeyCode::Backspace, _) => {
            app.command(session, TransportCommand::Stop, now);
            app.add_log("⏹️ Stopped".to_string());
        }
        (KeyCode::Left, _) => {
            let speed = step_speed(snapshot.speed, -app.playback.speed_step);
            app.command(session, TransportCommand::SetSpeed(speed), now);
        }
        (KeyCode::Right, _) => {
            let speed = step_speed(snapshot.speed, app.playback.speed_step);
            app.command(session, TransportCommand::SetSpeed(speed), now);
        }
        (KeyCode::Up, _) => {
            let volume = snapshot.volume + app.playback.volume_step;
            app.command(session, TransportCommand::SetVolume(volume), now);
        }
        (KeyCode::Down, _) => {
            let volume = snapshot.volume - app.playback.volume_step;
            app.command(session, TransportCommand::SetVolume(volume), now);
        }
        (KeyCode::PageUp, _) => {
            let step = app.playback.seek_step_ms;
            app.command(session, TransportCommand::SeekBy(-step), now);
        }
        (KeyCode::PageDown, _) => {
            let step = app.playback.seek_step_ms;
            app.command(session, TransportCommand::SeekBy(step), now);
        }
        (KeyCode::Tab, _) => {
            let show = !snapshot.show_hands;
            app.command(session, TransportCommand::SetHandDisplay(show), now);
            app.add_log(format!("🖐 Hand colors {}", if show { "on" } else { "off" }));
        }
        _ => {}
    }
    false
}

fn handle_mouse_event(mouse: MouseEvent, app: &mut TuiApp, session: &mut Session, now: Instant) {
    let (column, row) = (mouse.column, mouse.row);
    let regions = app.regions;
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if hit(regions.play, column, row) {
                app.command(session, TransportCommand::TogglePlay, now);
            } else if hit(regions.stop, column, row) {
                app.command(session, TransportCommand::Stop, now);
            } else if hit(regions.hands, column, row) {
                let show = !session.show_hands();
                app.command(session, TransportCommand::SetHandDisplay(show), now);
            } else if hit(regions.open, column, row) {
                app.prompt = Some(String::new());
            } else if let Some(drag) = [
                (regions.progress, Drag::Progress),
                (regions.speed, Drag::Speed),
                (regions.volume, Drag::Volume),
            ]
            .into_iter()
            .find_map(|(area, drag)| hit(area, column, row).then_some(drag))
            {
                app.drag = Some(drag);
                app.drag_to_column(session, drag, column, now);
            } else if hit(regions.canvas, column, row) {
                let (x, y) = app.canvas_point(column, row);
                if let Some(pitch) = app.layout.pitch_at(x, y) {
                    session.press_key(pitch, now);
                    app.mouse_pitch = Some(pitch);
                }
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some(drag) = app.drag {
                let area = app.drag_area(drag);
                let column = column.clamp(area.x, (area.x + area.width).saturating_sub(1));
                app.drag_to_column(session, drag, column, now);
            }
        }
        MouseEventKind::Up(MouseButton::Left) => {
            app.drag = None;
            if let Some(pitch) = app.mouse_pitch.take() {
                session.release_key(pitch);
            }
        }
        _ => {}
    }
}

fn render_canvas(f: &mut Frame, area: Rect, app: &TuiApp, session: &Session, view: &FrameView) {
    let notes = session.timeline().notes();
    let visible = view.visible.iter().filter_map(|&i| notes.get(i));
    let active = session.active_pitches();
    let mut surface = CellSurface::new(f.buffer_mut(), area, app.canvas_width, app.canvas_height);
    app.layout
        .draw(&mut surface, visible, view.position_ms, &active, session.show_hands());
}

fn render_progress(f: &mut Frame, area: Rect, session: &Session) {
    let snapshot = session.snapshot();
    let fraction = if snapshot.total_duration_ms > 0.0 {
        snapshot.current_time_ms / snapshot.total_duration_ms
    } else {
        0.0
    };
    let width = f64::from(area.width);
    let mut surface = CellSurface::new(f.buffer_mut(), area, width, 1.0);
    draw_progress_bar(&mut surface, FilledRect::new(0.0, 0.0, width, 1.0, PROGRESS_TRACK), fraction);
}

fn render_gauges(f: &mut Frame, area: Rect, app: &mut TuiApp, session: &Session) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let snapshot = session.snapshot();
    let (min, max) = (app.playback.min_speed, app.playback.max_speed);
    let speed_ratio = if max > min { (snapshot.speed - min) / (max - min) } else { 1.0 };
    let speed = Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta).bg(Color::DarkGray))
        .ratio(speed_ratio.clamp(0.0, 1.0))
        .label(format!("Speed {:.2}x", snapshot.speed));
    let volume = Gauge::default()
        .gauge_style(Style::default().fg(Color::Blue).bg(Color::DarkGray))
        .ratio(f64::from(snapshot.volume).clamp(0.0, 1.0))
        .label(format!("Volume {:.0}%", snapshot.volume * 100.0));
    f.render_widget(speed, halves[0]);
    f.render_widget(volume, halves[1]);

    app.regions.speed = halves[0];
    app.regions.volume = halves[1];
}

fn render_buttons(f: &mut Frame, area: Rect, app: &mut TuiApp, session: &Session) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(0)])
        .split(area);
    let pair = |row: Rect| {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(row)
    };
    let (top, bottom) = (pair(rows[0]), pair(rows[1]));
    let cells = [top[0], top[1], bottom[0], bottom[1]];

    let playing = session.clock().is_playing();
    let buttons = [
        (if playing { "⏸ Pause" } else { "▶ Play" }, if playing { Color::Yellow } else { Color::Green }),
        ("⏹ Stop", Color::Red),
        (if session.show_hands() { "🖐 Hands" } else { "🖐 Off" }, Color::Cyan),
        ("📂 Open", Color::White),
    ];
    for (cell, (label, color)) in cells.iter().zip(buttons) {
        let button = Paragraph::new(label)
            .alignment(Alignment::Center)
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(button, *cell);
    }

    app.regions.play = cells[0];
    app.regions.stop = cells[1];
    app.regions.hands = cells[2];
    app.regions.open = cells[3];
}

fn render_status(f: &mut Frame, area: Rect, app: &TuiApp, session: &Session) {
    let snapshot = session.snapshot();
    let song = snapshot.song_name.as_deref().unwrap_or("(no file)");
    let percent = if snapshot.total_duration_ms > 0.0 {
        (snapshot.current_time_ms / snapshot.total_duration_ms * 100.0).min(100.0)
    } else {
        0.0
    };

    let mut lines = vec![
        Line::from(format!("File: {song}")),
        Line::from(format!("Notes: {}   Audio: {}", snapshot.note_count, session.backend_name())),
        Line::from(format!(
            "Time: {}/{} ({percent:.0}%)  {:?}",
            format_duration(snapshot.current_time_ms),
            format_duration(snapshot.total_duration_ms),
            snapshot.state
        )),
        Line::from(format!(
            "Speed: {:.2}x   Volume: {:.0}%   FPS: {:.0}",
            snapshot.speed,
            snapshot.volume * 100.0,
            app.fps
        )),
    ];
    match &app.prompt {
        Some(path) => lines.push(Line::from(format!("Open: {path}_")).style(Style::default().fg(Color::Yellow))),
        None => lines.push(
            Line::from("Space play/pause  Bksp stop  ←/→ speed  ↑/↓ volume  PgUp/PgDn seek  Tab hands  ^O open  Esc quit")
                .style(Style::default().fg(Color::DarkGray)),
        ),
    }

    let status = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
    f.render_widget(status, area);
}

fn render_log_messages(f: &mut Frame, area: Rect, app: &TuiApp) {
    let visible_height = area.height.saturating_sub(2) as usize;

    let log_items: Vec<ListItem> = if app.log_messages.is_empty() {
        vec![ListItem::new("No messages yet...").style(Style::default().fg(Color::Gray))]
    } else {
        let start_idx = app.log_messages.len().saturating_sub(visible_height);
        app.log_messages
            .iter()
            .skip(start_idx)
            .map(|msg| ListItem::new(msg.as_str()).style(Style::default().fg(Color::White)))
            .collect()
    };

    let logs = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Messages ({}/{MAX_MESSAGES})", app.log_messages.len())),
    );
    f.render_widget(logs, area);
}

fn ui(f: &mut Frame, app: &mut TuiApp, session: &Session, view: &FrameView) {
    let size = f.area();
    if size.width < MIN_WIDTH || size.height < MIN_HEIGHT {
        let error_text = vec![
            Line::from("Terminal too small!"),
            Line::from(format!("Current: {}x{}", size.width, size.height)),
            Line::from(format!("Minimum required: {MIN_WIDTH}x{MIN_HEIGHT}")),
        ];
        let error_widget = Paragraph::new(error_text)
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .wrap(Wrap { trim: true });
        f.render_widget(error_widget, size);
        app.regions = Regions::default();
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(8),
        ])
        .split(size);
    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Percentage(45), Constraint::Min(20)])
        .split(rows[3]);

    app.regions.canvas = rows[0];
    app.regions.progress = rows[1];

    render_canvas(f, rows[0], app, session, view);
    render_progress(f, rows[1], session);
    render_gauges(f, rows[2], app, session);
    render_buttons(f, bottom[0], app, session);
    render_status(f, bottom[1], app, session);
    render_log_messages(f, bottom[2], app);
}

/// One iteration: advance, draw, then wait for input until the next frame is due
fn frame<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut TuiApp,
    session: &mut Session,
    frame_time: Duration,
) -> Result<()> {
    let now = Instant::now();
    app.note_frame(now);

    let view = session.tick(now);
    if view.finished {
        app.add_log("🏁 Reached the end".to_string());
    }
    if !app.key_releases {
        session.release_stale_keys(now, HOLD_TIMEOUT);
    }

    terminal.draw(|f| ui(f, app, session, &view))?;

    let mut timeout = frame_time.saturating_sub(now.elapsed());
    while event::poll(timeout)? {
        let now = Instant::now();
        match event::read()? {
            Event::Key(key) => {
                if handle_key_event(key, app, session, now) {
                    app.should_quit = true;
                    break;
                }
            }
            Event::Mouse(mouse) => handle_mouse_event(mouse, app, session, now),
            _ => {}
        }
        timeout = Duration::ZERO;
    }
    Ok(())
}

/// Reports a failed frame and waits out the rest of its time slot
fn frame_failed(app: &mut TuiApp, log: &Logger, error: &KeyfallError, started: Instant, frame_time: Duration) {
    log.error(format_args!("frame error: {error}"));
    app.add_log(format!("⚠️ {error}"));
    thread::sleep(frame_time.saturating_sub(started.elapsed()));
}

fn run_tui_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut TuiApp,
    session: &mut Session,
    fps: u32,
    log: &Logger,
) {
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    loop {
        let started = Instant::now();
        if let Err(e) = frame(terminal, app, session, frame_time) {
            frame_failed(app, log, &e, started, frame_time);
        }

        if should_shutdown() {
            log.info(format_args!("shutdown requested"));
            break;
        }
        if app.should_quit {
            break;
        }
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>, enhanced: bool) -> Result<()> {
    if enhanced {
        terminal.backend_mut().execute(PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    terminal.backend_mut().execute(DisableMouseCapture)?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Raw mode, alternate screen, mouse capture and, where supported, key
/// release reporting
fn setup_terminal() -> std::io::Result<(Terminal<CrosstermBackend<Stdout>>, bool)> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(EnableMouseCapture)?;
    let enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if enhanced {
        stdout.execute(PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES))?;
    }
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok((terminal, enhanced))
}

pub fn run_tui(session: &mut Session, config: &Config, startup_messages: Vec<String>, log: &Logger) -> Result<()> {
    let mut app = TuiApp::new(config);
    app.add_log("Starting e_keyfall...".to_string());
    for message in startup_messages {
        app.add_log(message);
    }
    if let Some(song) = session.song() {
        app.add_log(format!(
            "🎼 {} ({} notes, {})",
            song.name,
            song.timeline.len(),
            format_duration(song.timeline.total_duration_ms())
        ));
    } else {
        app.add_log("No file loaded: play with z..m / q..i or Ctrl+O to open".to_string());
    }

    let (mut terminal, enhanced) = setup_terminal().map_err(|e| KeyfallError::Terminal(e.to_string()))?;
    log.info(format_args!("terminal ready (key release events: {enhanced})"));

    run_tui_app(&mut terminal, &mut app, session, config.playback.fps, log);

    session.shutdown();
    restore_terminal(&mut terminal, enhanced)
}
