use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use rbrowser::model::{BrowserModel, FlatNode, NodeKind, TreeBinding};

/// Shown for rows whose page has not arrived yet.
const PLACEHOLDER: &str = "…";

/// Renders the binding's viewport; rows not loaded yet show a placeholder.
pub struct TreeWidget<'a> {
    model: &'a BrowserModel,
    binding: &'a TreeBinding,
    selected: usize,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(model: &'a BrowserModel, binding: &'a TreeBinding, selected: usize) -> Self {
        Self {
            model,
            binding,
            selected,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    fn indicator(row: &FlatNode) -> &'static str {
        match row.kind {
            NodeKind::Folder if row.expanded => "▾ ",
            NodeKind::Folder => "▸ ",
            NodeKind::File => "  ",
        }
    }

    fn size_suffix(&self, row: &FlatNode) -> Option<String> {
        let size = self.model.node(row.node)?.attrs.fsize?;
        Some(format!("  {}", format_size(size)))
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

impl Widget for TreeWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = match &self.block {
            Some(block) => {
                let inner = block.inner(area);
                block.clone().render(area, buf);
                inner
            }
            None => area,
        };
        if inner.height == 0 || inner.width == 0 {
            return;
        }

        for (offset, (index, row)) in self
            .binding
            .rows(self.model)
            .take(inner.height as usize)
            .enumerate()
        {
            let y = inner.y + offset as u16;
            let selected = index == self.selected;

            let line = match row {
                Some(row) => {
                    let style = match row.kind {
                        NodeKind::Folder => Style::default()
                            .fg(Color::Blue)
                            .add_modifier(Modifier::BOLD),
                        NodeKind::File => Style::default(),
                    };
                    let mut spans = vec![
                        Span::raw("  ".repeat(row.level)),
                        Span::raw(Self::indicator(row)),
                        Span::styled(row.name.clone(), style),
                    ];
                    if let Some(size) = self.size_suffix(row) {
                        spans.push(Span::styled(size, Style::default().fg(Color::DarkGray)));
                    }
                    Line::from(spans)
                }
                None => Line::from(Span::styled(
                    PLACEHOLDER,
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )),
            };

            let line = if selected {
                line.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                line
            };
            buf.set_line(inner.x, y, &line, inner.width);
        }
    }
}
