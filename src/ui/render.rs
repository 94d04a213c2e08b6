use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::app::{App, HomeFocus, LoginFocus};
use crate::router::Route;
use crate::utils::truncate;

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);

    match app.router.current() {
        Route::Home => render_home(frame, app, chunks[1]),
        Route::Root | Route::Login => render_login(frame, app, chunks[1]),
    }

    render_status_bar(frame, app, chunks[2]);
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  kbterm";
    let route_title = app.router.current().title();

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            area.width
                .saturating_sub(title.len() as u16 + route_title.len() as u16 + 4) as usize,
        )),
        Span::styled(route_title, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(title_line).block(block);
    frame.render_widget(paragraph, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let text = match &app.status_message {
        Some(message) => Line::from(Span::styled(
            format!(" {}", message),
            styles::highlight_style(),
        )),
        None => {
            let hints = match app.router.current() {
                Route::Root | Route::Login => "Tab: switch field  Enter: submit  Esc: quit",
                Route::Home => "Tab: cycle focus  Enter: search  r: reload  l: logout  q: quit",
            };
            Line::from(Span::styled(format!(" {}", hints), styles::muted_style()))
        }
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(text).block(block), area);
}

// ============================================================================
// Login view
// ============================================================================

fn render_login(frame: &mut Frame, app: &App, _area: Rect) {
    // Fixed size dialog - compact
    let height = if app.login_error.is_some() { 11 } else { 9 };
    let area = centered_rect_fixed(46, height, frame.area());

    // Clear the area
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled(
            "              k b t e r m",
            styles::title_style(),
        )),
        Line::from(""),
    ];

    let username_focused = app.login_focus == LoginFocus::Username;
    let username_style = if username_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let cursor = if username_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("      "),
        Span::styled("Username: [", styles::muted_style()),
        Span::styled(
            format!("{:<16}{}", app.login_username, cursor),
            username_style,
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let password_focused = app.login_focus == LoginFocus::Password;
    let password_style = if password_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let password_masked: String = "*".repeat(app.login_password.len().min(16));
    let cursor = if password_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("      "),
        Span::styled("Password: [", styles::muted_style()),
        Span::styled(format!("{:<16}{}", password_masked, cursor), password_style),
        Span::styled("]", styles::muted_style()),
    ]));

    let button_focused = app.login_focus == LoginFocus::Button;
    let button_style = if button_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    lines.push(Line::from(""));
    let button_label = if button_focused {
        " ▶ Login ◀ "
    } else {
        "   Login   "
    };
    lines.push(Line::from(vec![
        Span::raw("            ["),
        Span::styled(button_label, button_style),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(" {}", error),
            styles::error_style(),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// ============================================================================
// Home view
// ============================================================================

fn render_home(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(34), Constraint::Percentage(66)])
        .split(area);

    render_kb_list(frame, app, chunks[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(chunks[1]);

    render_query_box(frame, app, right[0]);
    render_results(frame, app, right[1]);
}

fn render_kb_list(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.home_focus == HomeFocus::KnowledgeBases;

    let items: Vec<ListItem> = app
        .knowledge_bases
        .iter()
        .map(|kb| {
            ListItem::new(Line::from(vec![
                Span::styled(kb.kb_name.clone(), styles::list_item_style()),
                Span::raw("  "),
                Span::styled(
                    truncate(kb.display_description(), 40),
                    styles::muted_style(),
                ),
            ]))
        })
        .collect();

    let title = format!(" Knowledge Bases ({}) ", app.knowledge_bases.len());
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(focused)),
        )
        .highlight_style(styles::selected_style());

    let mut state = ListState::default();
    if !app.knowledge_bases.is_empty() {
        state.select(Some(app.kb_selection));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_query_box(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.home_focus == HomeFocus::Query;
    let cursor = if focused { "▌" } else { "" };

    let input = Line::from(vec![Span::styled(
        format!("{}{}", app.question, cursor),
        styles::list_item_style(),
    )]);

    let paragraph = Paragraph::new(input).block(
        Block::default()
            .title(" Question ")
            .title_style(styles::muted_style())
            .borders(Borders::ALL)
            .border_style(styles::border_style(focused)),
    );

    frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.home_focus == HomeFocus::Results;
    let content_width = area.width.saturating_sub(10) as usize;

    let items: Vec<ListItem> = app
        .results
        .iter()
        .map(|hit| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>5}", hit.score_display()), styles::highlight_style()),
                Span::raw("  "),
                Span::styled(
                    truncate(&hit.content.replace('\n', " "), content_width),
                    styles::list_item_style(),
                ),
            ]))
        })
        .collect();

    let title = if app.querying {
        " Results (searching...) ".to_string()
    } else {
        format!(" Results ({}) ", app.results.len())
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(focused)),
        )
        .highlight_style(styles::selected_style());

    let mut state = ListState::default();
    if !app.results.is_empty() {
        state.select(Some(app.result_selection));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}
