use crate::state::{App, View};
use crate::theme::{self, icons};
use gmx_core::grid;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Row, Table},
    Frame,
};

pub fn render(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(size);

    frame.render_widget(header(app), layout[0]);
    match app.view {
        View::Tasks => render_tasks(frame, app, layout[1]),
        View::Grid => render_grid_strip(frame, app, layout[1]),
        View::Detail => render_detail(frame, app, layout[1]),
    }
}

fn header(app: &App) -> Paragraph<'static> {
    let line = if let Some(spinner) = app.spinner() {
        Line::from(Span::styled(spinner, theme::NOTE_STYLE))
    } else if let Some(note) = app.status_note.clone() {
        Line::from(Span::styled(note, theme::NOTE_STYLE))
    } else {
        Line::from(Span::styled(
            "ready".to_string(),
            theme::MUTED_STYLE,
        ))
    };
    Paragraph::new(Text::from(vec![line])).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled("gridmux", theme::HEADER_STYLE)),
    )
}

fn render_tasks(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .map(|task| {
            let glyph = if task.is_active() {
                icons::ACTIVE
            } else {
                icons::IDLE
            };
            let status = task.status.as_str();
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{glyph} "),
                    Style::default().fg(theme::status_color(status)),
                ),
                Span::raw(format!("{:>3}  {}", task.id, task.title)),
                Span::styled(
                    format!("  [{status}]"),
                    Style::default().fg(theme::status_color(status)),
                ),
            ]))
        })
        .collect();

    let mut list_state = ListState::default();
    if !app.tasks.is_empty() {
        list_state.select(Some(app.list_index));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("tasks (j/k move, g grid, Enter detail, r reload, q quit)"),
        )
        .highlight_style(theme::SELECTED_STYLE);
    frame.render_stateful_widget(list, area, &mut list_state);
}

/// The cockpit pane is a thin strip while the grid is up; everything else
/// on screen is real tmux panes. The strip shows where the cursor is and
/// which slots made it.
fn render_grid_strip(frame: &mut Frame, app: &App, area: Rect) {
    let Some(grid) = app.grid.as_ref() else {
        let waiting = Paragraph::new("tiling panes...")
            .block(Block::default().borders(Borders::ALL).title("grid"));
        frame.render_widget(waiting, area);
        return;
    };

    let selected = grid.selection.selected();
    let mut slot_spans: Vec<Span> = Vec::new();
    for (index, task) in grid.tasks.iter().enumerate() {
        let occupied = app.registry.get(index).is_some();
        let glyph = if Some(index) == selected {
            icons::SELECTED
        } else if occupied {
            icons::OCCUPIED
        } else {
            icons::EMPTY
        };
        let style = if occupied {
            Style::default().fg(theme::status_color(task.status.as_str()))
        } else {
            theme::MUTED_STYLE
        };
        slot_spans.push(Span::styled(format!("[{} {}]", glyph, task.id), style));
        slot_spans.push(Span::raw(" "));
    }

    let position = selected
        .map(|index| {
            let slot = grid::slot_at(index, grid.cols.max(1));
            let task = grid
                .tasks
                .get(index)
                .map(|t| t.title.as_str())
                .unwrap_or("");
            format!(
                "slot {} (r{} c{}) {}  [cockpit {}]",
                index + 1,
                slot.row,
                slot.col,
                task,
                grid.home_pane
            )
        })
        .unwrap_or_else(|| "empty grid".to_string());

    let text = Text::from(vec![
        Line::from(slot_spans),
        Line::from(Span::styled(position, theme::MUTED_STYLE)),
    ]);
    let strip = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(
        format!(
            "grid {}x{} (arrows/hjkl move, 1-9 jump, r refresh, q close)",
            grid.cols, grid.rows
        ),
    ));
    frame.render_widget(strip, area);
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = app.detail.as_ref() else {
        return;
    };
    let task = &detail.task;

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(0)])
        .split(area);

    let summary = Paragraph::new(Text::from(vec![
        Line::from(format!("title    {}", task.title)),
        Line::from(format!("status   {}", task.status)),
        Line::from(format!("session  {}", task.session)),
        Line::from(format!(
            "window   {}",
            task.window.as_deref().unwrap_or("-")
        )),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("task {}", task.id)),
    );
    frame.render_widget(summary, layout[0]);

    let rows: Vec<Row> = detail
        .panes
        .iter()
        .map(|pane| {
            Row::new(vec![
                pane.pane_id.clone(),
                pane.role.to_string(),
                pane.title.clone(),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Min(10),
        ],
    )
    .header(Row::new(vec!["pane", "role", "title"]).style(theme::HEADER_STYLE))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("panes (s shell, a agent, x break extras, q back)"),
    );
    frame.render_widget(table, layout[1]);
}
