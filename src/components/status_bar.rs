use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

/// One-line status: selected path on the left, model state on the right,
/// or a transient message across the whole bar.
pub struct StatusBarWidget<'a> {
    path_str: &'a str,
    model_info: &'a str,
    status_message: Option<&'a str>,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(path_str: &'a str, model_info: &'a str) -> Self {
        Self {
            path_str,
            model_info,
            status_message: None,
        }
    }

    pub fn status_message(mut self, msg: &'a str) -> Self {
        self.status_message = Some(msg);
        self
    }
}

/// Summary of the model for the right side of the bar.
pub fn model_info(length: usize, in_flight: usize, sort: &str, full: bool) -> String {
    let mode = if full { "full" } else { "lazy" };
    if in_flight > 0 {
        format!(" {} rows | {} pending | sort: {} | {} ", length, in_flight, sort, mode)
    } else {
        format!(" {} rows | sort: {} | {} ", length, sort, mode)
    }
}

/// Keep the tail of `s` within `width` columns.
fn truncate_left(s: &str, width: usize) -> String {
    let count = s.chars().count();
    if count <= width {
        return s.to_string();
    }
    if width <= 3 {
        return s.chars().take(width).collect();
    }
    let tail: String = s.chars().skip(count - (width - 3)).collect();
    format!("...{}", tail)
}

impl Widget for StatusBarWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let width = area.width as usize;
        let bar = Style::default().bg(Color::DarkGray).fg(Color::White);

        if let Some(msg) = self.status_message {
            let display = format!("{:<width$}", truncate_left(msg, width), width = width);
            let line = Line::from(Span::styled(display, bar.add_modifier(Modifier::BOLD)));
            buf.set_line(area.x, area.y, &line, area.width);
            return;
        }

        let info_len = self.model_info.chars().count();
        let path_budget = width.saturating_sub(info_len + 1);
        let path_display = truncate_left(self.path_str, path_budget);
        let gap = width
            .saturating_sub(path_display.chars().count())
            .saturating_sub(info_len);

        let line = Line::from(vec![
            Span::styled(format!("{}{}", path_display, " ".repeat(gap)), bar),
            Span::styled(self.model_info, bar.fg(Color::Cyan)),
        ]);
        buf.set_line(area.x, area.y, &line, area.width);
    }
}
