mod app;

use std::io;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use app::{
    format_date, format_days, format_indicator, format_price, truncate, AppState, ConnectionStatus,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "tui", about = "Terminal view of scraped LEGO resale listings")]
struct Args {
    /// Five-digit LEGO set number to show
    #[arg(env = "LEGO_SET_ID", default_value = "42182")]
    product_id: String,

    /// Base URL of the scanner HTTP API
    #[arg(long, env = "API_URL", default_value = "http://localhost:8092")]
    api_url: String,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let Args { product_id, api_url: base_url } = Args::parse();

    // Scrapes can take a while; the server holds the request until the snapshot is stored.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url, product_id);
    app.refresh(&client).await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(10);
    let mut last_tick = std::time::Instant::now();
    let mut table_state = TableState::default();

    loop {
        table_state.select((!app.sales.is_empty()).then_some(app.selected));
        terminal.draw(|f| render(f, app, &mut table_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('f') | KeyCode::Char('F') => {
                            terminal.draw(|f| render(f, app, &mut table_state))?;
                            app.trigger_scrape(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('n') | KeyCode::Right => {
                            if app.next_page() {
                                app.refresh(client).await;
                            }
                        }
                        KeyCode::Char('p') | KeyCode::Left => {
                            if app.prev_page() {
                                app.refresh(client).await;
                            }
                        }
                        KeyCode::Char('s') => {
                            app.cycle_sort();
                            app.refresh(client).await;
                        }
                        KeyCode::Down | KeyCode::Char('j') => app.scroll_down(),
                        KeyCode::Up | KeyCode::Char('k') => app.scroll_up(),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, table_state, chunks[1]);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let mut spans = vec![
        Span::styled(
            " LEGO Resale Scanner  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("set {}", app.product_id),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  │  "),
        Span::styled(format!("{} sales", app.total), Style::default().fg(Color::White)),
    ];
    if let Some(msg) = &app.message {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(truncate(msg, 48), Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, table_state: &mut TableState, area: Rect) {
    // Horizontal split: sales (65%) | indicators (35%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    render_sales_table(f, app, table_state, halves[0]);
    render_indicators(f, app, halves[1]);
}

fn render_sales_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["Published", "Title", "Price", "Fav", "Views", "Seller"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .sales
        .iter()
        .map(|s| {
            Row::new(vec![
                Cell::from(format_date(s.published_at)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&s.title, 40)),
                Cell::from(format_price(&s.price)).style(Style::default().fg(Color::Green)),
                Cell::from(s.favorites_count.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(s.views_count.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(truncate(&s.seller.username, 14)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let title = format!(
        " SALES  page {}/{}  sort: {} ",
        app.page,
        app.total_pages.max(1),
        app.sort_key()
    );

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Min(12),
            Constraint::Length(11),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_indicators(f: &mut Frame, app: &AppState, area: Rect) {
    let ind = &app.report.indicators;
    let cur = app.report.currency.as_deref().unwrap_or("");
    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

    let line = |name: &'static str, text: String| {
        Line::from(vec![Span::styled(format!(" {name:<18}"), label), Span::styled(text, value)])
    };

    let lines = vec![
        line("Sales", ind.count.to_string()),
        line("Average", format_indicator(ind.count, ind.average, cur)),
        line("Percentile 5", format_indicator(ind.count, ind.p5, cur)),
        line("Percentile 25", format_indicator(ind.count, ind.p25, cur)),
        line("Median", format_indicator(ind.count, ind.p50, cur)),
        Line::raw(""),
        line("Observed span", format_days(app.report.lifetime.observed_span_days)),
        line("Oldest listing", format_days(app.report.lifetime.span_to_present_days)),
    ];

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " INDICATORS ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let line = Line::from(vec![
        Span::styled(" [q] ", key),
        Span::raw("quit  "),
        Span::styled("[r] ", key),
        Span::raw("refresh  "),
        Span::styled("[f] ", key),
        Span::raw("scrape  "),
        Span::styled("[n/p] ", key),
        Span::raw("page  "),
        Span::styled("[s] ", key),
        Span::raw("sort  "),
        Span::styled("[j k] ", key),
        Span::raw("scroll"),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
