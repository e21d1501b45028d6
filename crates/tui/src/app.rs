use std::{io, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tarkov_list_core::{
    app::{AddOutcome, ListController},
    catalog::{CacheStatus, FetchError},
    models::{CatalogResponse, Item},
    pricing::{describe_offer, NO_PRICE_DATA},
    sort::SortKey,
};
use tokio::{spawn, sync::mpsc};
use tracing::{error, info};

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    buy: Color,
    sell: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            buy: Color::LightRed,
            sell: Color::LightGreen,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
    Loading { cached: bool },
    Failed(String),
    List,
}

enum AppEvent {
    Input(Event),
    Tick,
    CatalogLoaded(Result<CatalogResponse, FetchError>),
}

/// Terminal frontend over a [`ListController`].
pub struct TarkovListApp {
    controller: ListController,
    state: UiState,
    screen: Screen,
    pending_load: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    theme: Theme,
}

impl TarkovListApp {
    pub fn new(controller: ListController) -> Self {
        Self {
            controller,
            state: UiState::default(),
            screen: Screen::Loading { cached: false },
            pending_load: false,
            event_tx: None,
            theme: Theme::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);
        self.start_catalog_load();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }

            if self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn start_catalog_load(&mut self) {
        if self.pending_load {
            return;
        }
        let Some(sender) = self.event_tx.clone() else {
            self.state
                .set_status("Internal error: event channel unavailable".to_string());
            error!("event_channel_missing");
            return;
        };

        let cached = matches!(self.controller.cache_status(), CacheStatus::Fresh { .. });
        self.screen = Screen::Loading { cached };
        self.pending_load = true;
        info!(cached, "Loading catalog");
        let cache = self.controller.catalog().clone();
        spawn(async move {
            let result = cache.get_items().await;
            let _ = sender.send(AppEvent::CatalogLoaded(result)).await;
        });
    }

    fn retry_load(&mut self) {
        if let Err(err) = self.controller.clear_cache() {
            error!(?err, "Failed to clear catalog cache");
            self.state.set_status(format!("Failed to clear cache: {err}"));
        }
        self.start_catalog_load();
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.state.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => true,
            Some(AppEvent::CatalogLoaded(result)) => {
                self.pending_load = false;
                match result.map_err(anyhow::Error::from).and_then(|response| {
                    self.controller.apply_catalog(response)
                }) {
                    Ok(summary) => {
                        self.screen = Screen::List;
                        self.refresh_rows();
                        let mut status = format!(
                            "Loaded {} items, {} on your list",
                            summary.items, summary.selected
                        );
                        if summary.dropped > 0 {
                            status.push_str(&format!(
                                " ({} no longer in the catalog)",
                                summary.dropped
                            ));
                        }
                        self.state.set_status(status);
                    }
                    Err(err) => {
                        error!(?err, "Failed to load items");
                        self.screen = Screen::Failed(format!("{err:#}"));
                    }
                }
                true
            }
            None => false,
        }
    }

    fn refresh_rows(&mut self) {
        self.state.rows = self
            .controller
            .rows()
            .iter()
            .map(|row| row.item.id.clone())
            .collect();
        self.state.clamp_cursor();
    }

    fn refresh_search(&mut self) {
        self.state.results = self
            .controller
            .search(&self.state.query)
            .iter()
            .map(|hit| hit.item.id.clone())
            .collect();
        self.state.result_cursor = 0;
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        match self.screen {
            Screen::Loading { .. } => {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    self.state.should_quit = true;
                }
            }
            Screen::Failed(_) => self.handle_failed_key(key),
            Screen::List => match self.state.mode {
                Mode::Browse => self.handle_browse_key(key)?,
                Mode::Search => self.handle_search_key(key)?,
            },
        }
        Ok(())
    }

    fn handle_failed_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Enter | KeyCode::Char('r') => self.retry_load(),
            _ => {}
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') if key.modifiers.is_empty() => self.state.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.state.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(-1),
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.state.cursor = self.state.rows.len().saturating_sub(1),
            KeyCode::Char('/') | KeyCode::Char('a') => {
                self.state.mode = Mode::Search;
                self.state.query.clear();
                self.state.results.clear();
                self.state.set_status("Type to search items".to_string());
            }
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Right => self.adjust_current(1)?,
            KeyCode::Char('-') | KeyCode::Left => self.adjust_current(-1)?,
            KeyCode::Char('d') | KeyCode::Delete => self.remove_current()?,
            KeyCode::Char('s') if key.modifiers.is_empty() => self.cycle_sort()?,
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.set_status("Cache cleared, reloading".to_string());
                self.retry_load();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.close_search();
                self.state.set_status("Search cancelled".to_string());
            }
            KeyCode::Enter => self.add_highlighted()?,
            KeyCode::Down => self.state.move_result_cursor(1),
            KeyCode::Up => self.state.move_result_cursor(-1),
            KeyCode::Backspace => {
                self.state.query.pop();
                self.refresh_search();
            }
            KeyCode::Char(c) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.state.query.push(c);
                    self.refresh_search();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close_search(&mut self) {
        self.state.mode = Mode::Browse;
        self.state.query.clear();
        self.state.results.clear();
        self.state.result_cursor = 0;
    }

    fn add_highlighted(&mut self) -> Result<()> {
        let Some(id) = self.state.results.get(self.state.result_cursor).cloned() else {
            return Ok(());
        };
        let outcome = self.controller.add(&id)?;
        self.close_search();
        self.refresh_rows();
        if let Some(pos) = self.state.rows.iter().position(|row| *row == id) {
            self.state.cursor = pos;
        }
        let message = match outcome {
            AddOutcome::Added => "Item added to list".to_string(),
            AddOutcome::Incremented(_) => "Added 1 more to list".to_string(),
        };
        self.state.set_status(message);
        Ok(())
    }

    fn adjust_current(&mut self, delta: i64) -> Result<()> {
        let Some(id) = self.state.current_row().map(str::to_string) else {
            return Ok(());
        };
        let count = self.controller.update_quantity(&id, delta)?;
        self.refresh_rows();
        if let Some(pos) = self.state.rows.iter().position(|row| *row == id) {
            self.state.cursor = pos;
        }
        self.state.set_status(format!("Quantity set to {count}"));
        Ok(())
    }

    fn remove_current(&mut self) -> Result<()> {
        let Some(id) = self.state.current_row().map(str::to_string) else {
            return Ok(());
        };
        if self.controller.remove(&id)? {
            self.state.set_status("Item removed from list".to_string());
        }
        self.refresh_rows();
        Ok(())
    }

    fn cycle_sort(&mut self) -> Result<()> {
        let next = self
            .controller
            .sort_key()
            .map(SortKey::next)
            .unwrap_or(SortKey::NameAsc);
        self.controller.set_sort(next)?;
        self.refresh_rows();
        self.state.set_status(format!("Sorted by {}", next.label()));
        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        match &self.screen {
            Screen::Loading { cached } => self.draw_loading(frame, *cached),
            Screen::Failed(message) => self.draw_failed(frame, message),
            Screen::List => self.draw_list(frame),
        }
    }

    fn draw_loading(&self, frame: &mut Frame, cached: bool) {
        let text = if cached {
            "Loading cached data..."
        } else {
            "Fetching fresh data..."
        };
        let area = centered_rect(40, 3, frame.size());
        let paragraph = Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(self.theme.muted),
        )))
        .block(Block::default().borders(Borders::ALL).title("Tarkov List"))
        .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
    }

    fn draw_failed(&self, frame: &mut Frame, message: &str) {
        let area = centered_rect(60, 7, frame.size());
        let lines = vec![
            Line::from(Span::styled(
                "Failed to load items.",
                Style::default()
                    .fg(self.theme.danger)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                message.to_string(),
                Style::default().fg(self.theme.muted),
            )),
            Line::from(""),
            Line::from("Enter/r: retry   q: quit"),
        ];
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_list(&self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(size);

        self.render_header(frame, chunks[0]);
        self.render_search_box(frame, chunks[1]);
        if self.state.mode == Mode::Search && !self.state.query.trim().is_empty() {
            self.render_results(frame, chunks[2]);
        } else {
            self.render_selection(frame, chunks[2]);
        }
        self.render_status(frame, chunks[3]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let sort = self
            .controller
            .sort_key()
            .map(SortKey::label)
            .unwrap_or("Unsorted");
        let line = Line::from(vec![
            Span::styled(
                format!("Next update in {} minutes", self.controller.minutes_until_refresh()),
                Style::default().fg(self.theme.muted),
            ),
            Span::raw("   "),
            Span::styled(
                format!("Sort: {sort}"),
                Style::default().fg(self.theme.accent),
            ),
        ]);
        let paragraph =
            Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Tarkov List"));
        frame.render_widget(paragraph, area);
    }

    fn render_search_box(&self, frame: &mut Frame, area: Rect) {
        let (text, style) = match self.state.mode {
            Mode::Search => (
                format!("{}_", self.state.query),
                Style::default().fg(self.theme.primary_fg),
            ),
            Mode::Browse => (
                "Press / to search items".to_string(),
                Style::default().fg(self.theme.muted),
            ),
        };
        let paragraph = Paragraph::new(Line::from(Span::styled(text, style)))
            .block(Block::default().borders(Borders::ALL).title("Search"));
        frame.render_widget(paragraph, area);
    }

    fn render_results(&self, frame: &mut Frame, area: Rect) {
        let rates = self.controller.rates();
        let selection = self.controller.selection();
        let items: Vec<ListItem> = self
            .state
            .results
            .iter()
            .filter_map(|id| self.controller.item(id))
            .map(|item| {
                let mut title = vec![
                    Span::styled(
                        item.name.clone(),
                        Style::default().fg(self.theme.primary_fg),
                    ),
                    Span::styled(
                        format!(" {}", item.size_label()),
                        Style::default().fg(self.theme.muted),
                    ),
                ];
                if selection.contains(&item.id) {
                    title.push(Span::styled(
                        " (in list)",
                        Style::default().fg(Color::Magenta),
                    ));
                }
                ListItem::new(vec![
                    Line::from(title),
                    Line::from(Span::styled(
                        format!("  {}", rates.trader_summary(item)),
                        Style::default().fg(self.theme.muted),
                    )),
                ])
            })
            .collect();

        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(self.state.result_cursor.min(items.len() - 1)));
        }
        let title = if items.is_empty() {
            "Results (no matches)".to_string()
        } else {
            format!("Results ({})", items.len())
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg))
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_selection(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Your list");
        if self.state.rows.is_empty() {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                "Your list is empty. Press / to search for items.",
                Style::default().fg(self.theme.muted),
            )))
            .block(block)
            .alignment(Alignment::Center);
            frame.render_widget(paragraph, area);
            return;
        }

        let selection = self.controller.selection();
        let items: Vec<ListItem> = self
            .state
            .rows
            .iter()
            .filter_map(|id| {
                let item = self.controller.item(id)?;
                let count = selection.quantity(id)?;
                Some(self.selection_row(item, count))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(self.state.cursor.min(items.len().saturating_sub(1))));
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(self.theme.selection_bg))
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn selection_row(&self, item: &Item, count: u32) -> ListItem<'static> {
        let title = Line::from(vec![
            Span::styled(
                format!("x{count:<3} "),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                item.name.clone(),
                Style::default().fg(self.theme.primary_fg),
            ),
            Span::styled(
                format!(" {}", item.size_label()),
                Style::default().fg(self.theme.muted),
            ),
        ]);
        ListItem::new(vec![title, self.price_line(item)])
    }

    fn price_line(&self, item: &Item) -> Line<'static> {
        let (buy, sell) = self.controller.rates().best_offers(item);
        let mut spans = vec![Span::raw("     ")];
        let sides = [("Buy", buy, self.theme.buy), ("Sell", sell, self.theme.sell)];
        for (side, offer, color) in sides {
            let Some(offer) = offer else {
                continue;
            };
            if spans.len() > 1 {
                spans.push(Span::raw(" - "));
            }
            spans.push(Span::styled(
                format!("{side}: {}", describe_offer(offer)),
                Style::default().fg(color),
            ));
        }
        if spans.len() == 1 {
            spans.push(Span::styled(
                NO_PRICE_DATA,
                Style::default().fg(self.theme.muted),
            ));
        }
        Line::from(spans)
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let help = match self.state.mode {
            Mode::Browse => "/ search  +/- quantity  d delete  s sort  Ctrl-r refresh  q quit",
            Mode::Search => "Enter add  Up/Down select  Esc cancel",
        };
        let paragraph = Paragraph::new(Line::from(vec![
            Span::raw(self.state.status.clone()),
            Span::raw("  |  "),
            Span::styled(help, Style::default().fg(self.theme.muted)),
        ]))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    /// Selection ids in display order.
    rows: Vec<String>,
    cursor: usize,
    /// Search match ids in result order.
    results: Vec<String>,
    result_cursor: usize,
    query: String,
    status: String,
    mode: Mode,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            cursor: 0,
            results: Vec::new(),
            result_cursor: 0,
            query: String::new(),
            status: "Ready".to_string(),
            mode: Mode::Browse,
            should_quit: false,
        }
    }
}

impl UiState {
    fn move_cursor(&mut self, delta: isize) {
        self.cursor = step(self.cursor, delta, self.rows.len());
    }

    fn move_result_cursor(&mut self, delta: isize) {
        self.result_cursor = step(self.result_cursor, delta, self.results.len());
    }

    fn current_row(&self) -> Option<&str> {
        self.rows.get(self.cursor).map(String::as_str)
    }

    fn clamp_cursor(&mut self) {
        if self.rows.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.rows.len() {
            self.cursor = self.rows.len() - 1;
        }
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = current as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}
