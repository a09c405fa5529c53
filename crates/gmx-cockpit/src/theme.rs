use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const NOTE_STYLE: Style = Style::new().fg(Color::Rgb(250, 189, 47));

pub fn status_color(status: &str) -> Color {
    match status {
        "processing" => Color::Rgb(131, 165, 152),
        "queued" => Color::Rgb(250, 189, 47),
        "done" => Color::Rgb(184, 187, 38),
        "failed" => Color::Rgb(254, 128, 25),
        "cancelled" => Color::Rgb(214, 93, 14),
        _ => Color::Rgb(146, 131, 116),
    }
}

pub mod icons {
    pub const OCCUPIED: &str = "#";
    pub const EMPTY: &str = "-";
    pub const SELECTED: &str = "@";
    pub const ACTIVE: &str = ">";
    pub const IDLE: &str = ".";
}
