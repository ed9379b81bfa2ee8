use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use etour_smos::etour::{Banner, RefreshmentPoint};
use etour_smos::smos::{StudentLoad, User};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;

const FAST_STEP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    RefreshmentPoints,
    Banners,
    Users,
    Monitoring,
}

impl Page {
    const ALL: [Page; 4] = [Page::RefreshmentPoints, Page::Banners, Page::Users, Page::Monitoring];

    pub fn next(&self) -> Self {
        match self {
            Page::RefreshmentPoints => Page::Banners,
            Page::Banners => Page::Users,
            Page::Users => Page::Monitoring,
            Page::Monitoring => Page::RefreshmentPoints,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::RefreshmentPoints => Page::Monitoring,
            Page::Banners => Page::RefreshmentPoints,
            Page::Users => Page::Banners,
            Page::Monitoring => Page::Users,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::RefreshmentPoints => "Refreshment Points",
            Page::Banners => "Banners",
            Page::Users => "Users",
            Page::Monitoring => "Monitoring",
        }
    }

    fn title_key(&self) -> &'static str {
        match self {
            Page::RefreshmentPoints => "points",
            Page::Banners => "banners",
            Page::Users => "users",
            Page::Monitoring => "monitoring",
        }
    }
}

/// Snapshot of the sample systems, loaded once before the UI starts
pub struct App {
    pub points: Vec<RefreshmentPoint>,
    pub banners: HashMap<String, Vec<Banner>>,
    pub users: Vec<User>,
    pub flagged: Vec<StudentLoad>,
    pub current_page: Page,
    pub show_detail: bool,
    states: HashMap<&'static str, TableState>,
}

impl App {
    pub fn new(
        points: Vec<RefreshmentPoint>,
        banners: HashMap<String, Vec<Banner>>,
        users: Vec<User>,
        flagged: Vec<StudentLoad>,
    ) -> Self {
        let mut app = Self {
            points,
            banners,
            users,
            flagged,
            current_page: Page::RefreshmentPoints,
            show_detail: false,
            states: HashMap::new(),
        };

        for page in Page::ALL {
            let mut state = TableState::default();
            if app.len_of(page) > 0 {
                state.select(Some(0));
            }
            app.states.insert(page.title_key(), state);
        }
        app
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.reset_if_empty();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.reset_if_empty();
    }

    pub fn selected_point(&self) -> Option<&RefreshmentPoint> {
        self.selected_in(Page::RefreshmentPoints)
            .and_then(|i| self.points.get(i))
    }

    /// Banners of the point selected on the first page
    pub fn point_banners(&self) -> &[Banner] {
        self.selected_point()
            .and_then(|p| self.banners.get(&p.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn selected_in(&self, page: Page) -> Option<usize> {
        self.states.get(page.title_key()).and_then(|s| s.selected())
    }

    fn len_of(&self, page: Page) -> usize {
        match page {
            Page::RefreshmentPoints => self.points.len(),
            Page::Banners => self.point_banners().len(),
            Page::Users => self.users.len(),
            Page::Monitoring => self.flagged.len(),
        }
    }

    fn len(&self) -> usize {
        self.len_of(self.current_page)
    }

    fn selected(&self) -> Option<usize> {
        self.selected_in(self.current_page)
    }

    fn select(&mut self, index: Option<usize>) {
        let key = self.current_page.title_key();
        self.states.entry(key).or_default().select(index);
    }

    /// The banner list changes with the selected point
    fn reset_if_empty(&mut self) {
        let len = self.len();
        match self.selected() {
            _ if len == 0 => self.select(None),
            Some(i) if i >= len => self.select(Some(len - 1)),
            None => self.select(Some(0)),
            _ => {}
        }
    }

    pub fn next(&mut self) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let i = match self.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let i = match self.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let i = self.selected().map(|i| (i + FAST_STEP).min(len - 1)).unwrap_or(0);
        self.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.len() == 0 {
            return;
        }
        let i = self.selected().map(|i| i.saturating_sub(FAST_STEP)).unwrap_or(0);
        self.select(Some(i));
    }

    pub fn home(&mut self) {
        if self.len() > 0 {
            self.select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let len = self.len();
        if len > 0 {
            self.select(Some(len - 1));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content = if app.show_detail {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_detail_panel(f, split[1], app);
        split[0]
    } else {
        chunks[1]
    };

    match app.current_page {
        Page::RefreshmentPoints => render_points(f, content, app),
        Page::Banners => render_banners(f, content, app),
        Page::Users => render_users(f, content, app),
        Page::Monitoring => render_monitoring(f, content, app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Points: {}", app.points.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Users: {}", app.users.len()),
        Style::default().fg(Color::Cyan),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("⚠ {}", app.flagged.len()),
        Style::default().fg(if app.flagged.is_empty() { Color::Green } else { Color::Red }),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_list<'a>(
    f: &mut Frame,
    area: Rect,
    app: &mut App,
    title: String,
    header: Row<'a>,
    rows: Vec<Row<'a>>,
    widths: &[Constraint],
) {
    let table = Table::new(rows, widths.to_vec())
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    let key = app.current_page.title_key();
    let state = app.states.entry(key).or_default();
    f.render_stateful_widget(table, area, state);
}

fn render_points(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .points
        .iter()
        .map(|p| {
            let banners = app.banners.get(&p.id).map(Vec::len).unwrap_or(0);
            Row::new(vec![
                Cell::from(truncate(&p.name, 28)),
                Cell::from(truncate(&p.city, 20)),
                Cell::from(p.phone.clone()),
                Cell::from(format!("{}", p.capacity)),
                Cell::from(format!("{}", banners)).style(Style::default().fg(Color::Green)),
                Cell::from(format!("v{}", p.meta.version)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    render_list(
        f,
        area,
        app,
        " Refreshment Points ".to_string(),
        header_row(&["Name", "City", "Phone", "Seats", "Banners", "Ver"]),
        rows,
        &[
            Constraint::Length(30),
            Constraint::Length(22),
            Constraint::Length(18),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(5),
        ],
    );
}

fn render_banners(f: &mut Frame, area: Rect, app: &mut App) {
    let title = match app.selected_point() {
        Some(point) => format!(" Banners - {} ", point.name),
        None => " Banners ".to_string(),
    };

    let rows: Vec<Row> = app
        .point_banners()
        .iter()
        .map(|b| {
            let format = b.image.format().map(|f| f.as_str()).unwrap_or("?");
            Row::new(vec![
                Cell::from(truncate(b.image.file_name(), 34)),
                Cell::from(format.to_string()),
                Cell::from(format!("{}x{}", b.image.width, b.image.height)),
                Cell::from(format!("{} KB", b.image.size_bytes / 1000)),
                Cell::from(b.uploaded_by.clone()),
            ])
        })
        .collect();

    render_list(
        f,
        area,
        app,
        title,
        header_row(&["Image", "Format", "Size", "Bytes", "Uploaded by"]),
        rows,
        &[
            Constraint::Length(36),
            Constraint::Length(8),
            Constraint::Length(11),
            Constraint::Length(10),
            Constraint::Length(20),
        ],
    );
}

fn render_users(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .users
        .iter()
        .map(|u| {
            let roles: Vec<&str> = u.roles.iter().map(|r| r.as_str()).collect();
            let roles = if roles.is_empty() { "(none)".to_string() } else { roles.join(", ") };
            Row::new(vec![
                Cell::from(u.username.clone()),
                Cell::from(truncate(&u.full_name(), 24)),
                Cell::from(truncate(&u.email, 28)),
                Cell::from(roles).style(Style::default().fg(Color::Cyan)),
            ])
        })
        .collect();

    render_list(
        f,
        area,
        app,
        " Users ".to_string(),
        header_row(&["Username", "Name", "E-mail", "Roles"]),
        rows,
        &[
            Constraint::Length(16),
            Constraint::Length(26),
            Constraint::Length(30),
            Constraint::Length(30),
        ],
    );
}

fn render_monitoring(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .flagged
        .iter()
        .map(|s| {
            Row::new(vec![
                Cell::from(s.student_id.clone()),
                Cell::from(truncate(&s.full_name, 28)),
                Cell::from(format!("{}", s.absences)).style(Style::default().fg(Color::Red)),
                Cell::from(format!("{}", s.notes)).style(Style::default().fg(Color::Yellow)),
            ])
        })
        .collect();

    render_list(
        f,
        area,
        app,
        " Monitoring - students over the thresholds ".to_string(),
        header_row(&["Student", "Name", "Absences", "Notes"]),
        rows,
        &[
            Constraint::Length(10),
            Constraint::Length(30),
            Constraint::Length(10),
            Constraint::Length(8),
        ],
    );
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.selected().map(|i| i + 1).unwrap_or(0);

    let status_spans = vec![
        Span::styled(format!(" Row: {}/{} ", selected, app.len()), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" Fast | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn field(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn section(title: &str) -> Line<'static> {
    Line::from(vec![Span::styled(
        format!("  {}", title),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    )])
}

fn detail_lines(app: &App) -> Option<Vec<Line<'static>>> {
    let index = app.selected()?;

    let lines = match app.current_page {
        Page::RefreshmentPoints => {
            let p = app.points.get(index)?;
            vec![
                field("Name", p.name.clone()),
                field("Address", p.address.clone()),
                field("City", p.city.clone()),
                field("Phone", p.phone.clone()),
                field("Seats", p.capacity.to_string()),
                Line::from(""),
                section("MENU"),
                Line::from(format!("  {}", wrap_text(&p.menu.join(", "), 35))),
                Line::from(""),
                section("PROVENANCE"),
                field("Operator", p.operator.clone()),
                field("Version", p.meta.version.to_string()),
                field("Since", p.meta.valid_from.format("%Y-%m-%d %H:%M").to_string()),
            ]
        }
        Page::Banners => {
            let b = app.point_banners().get(index)?;
            vec![
                field("File", b.image.file_name().to_string()),
                field("Path", b.image.path.clone()),
                field("Size", format!("{}x{}", b.image.width, b.image.height)),
                field("Bytes", b.image.size_bytes.to_string()),
                Line::from(""),
                section("FINGERPRINT"),
                Line::from(format!("  {}", wrap_text(&b.image.fingerprint(), 35))),
                Line::from(""),
                field("Uploaded by", b.uploaded_by.clone()),
                field("Version", b.meta.version.to_string()),
            ]
        }
        Page::Users => {
            let u = app.users.get(index)?;
            let roles: Vec<&str> = u.roles.iter().map(|r| r.as_str()).collect();
            vec![
                field("Username", u.username.clone()),
                field("Name", u.full_name()),
                field("E-mail", u.email.clone()),
                field("Cell", u.cell.clone().unwrap_or_else(|| "-".to_string())),
                field("Roles", roles.join(", ")),
                field("Version", u.meta.version.to_string()),
            ]
        }
        Page::Monitoring => {
            let s = app.flagged.get(index)?;
            vec![
                field("Student", s.student_id.clone()),
                field("Name", s.full_name.clone()),
                field("Absences", s.absences.to_string()),
                field("Notes", s.notes.to_string()),
            ]
        }
    };

    Some(lines)
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Details ");

    let mut content = match detail_lines(app) {
        Some(lines) => lines,
        None => {
            f.render_widget(Paragraph::new("Nothing selected").block(block), area);
            return;
        }
    };

    content.insert(0, Line::from(""));
    content.push(Line::from(""));
    content.push(Line::from(vec![Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )]));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn wrap_text(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() || current_line.chars().count() + word.chars().count() < width {
            if !current_line.is_empty() {
                current_line.push(' ');
            }
            current_line.push_str(word);
        } else {
            if !result.is_empty() {
                result.push_str("\n  ");
            }
            result.push_str(&current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        if !result.is_empty() {
            result.push_str("\n  ");
        }
        result.push_str(&current_line);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cycle() {
        let mut page = Page::RefreshmentPoints;
        for _ in 0..4 {
            page = page.next();
        }
        assert_eq!(page, Page::RefreshmentPoints);
        assert_eq!(Page::RefreshmentPoints.previous(), Page::Monitoring);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Caffè Gambrinus", 8), "Caffè...");
        assert_eq!(truncate("Bar Roma", 20), "Bar Roma");
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = App::new(Vec::new(), HashMap::new(), Vec::new(), Vec::new());
        app.next();
        assert_eq!(app.selected(), None);

        app.current_page = Page::Monitoring;
        app.flagged = vec![
            StudentLoad {
                student_id: "S1".to_string(),
                full_name: "A".to_string(),
                absences: 6,
                notes: 4,
            },
            StudentLoad {
                student_id: "S2".to_string(),
                full_name: "B".to_string(),
                absences: 6,
                notes: 4,
            },
        ];
        app.home();
        app.previous();
        assert_eq!(app.selected(), Some(1));
        app.next();
        assert_eq!(app.selected(), Some(0));
        app.page_down();
        assert_eq!(app.selected(), Some(1));
    }
}
