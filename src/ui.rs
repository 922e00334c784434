use ratatui::{
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders},
    Frame,
};

use crate::app::App;
use crate::components::status_bar::{model_info, StatusBarWidget};
use crate::components::tree::TreeWidget;

/// Render the application UI.
pub fn render(app: &mut App, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(frame.area());

    let block = Block::default()
        .title(format!(" {} ", app.root_name))
        .borders(Borders::ALL);

    // Window the model to what fits before drawing it.
    let visible_height = block.inner(chunks[0]).height as usize;
    app.sync_view(visible_height);

    let tree = TreeWidget::new(&app.model, &app.binding, app.selected).block(block);
    frame.render_widget(tree, chunks[0]);

    let path = app.selected_path().unwrap_or_default();
    let info = model_info(
        app.model.length(),
        app.model.in_flight().len(),
        app.model.sort_order().label(),
        app.model.is_full_model(),
    );
    let mut status = StatusBarWidget::new(&path, &info);
    if let Some((msg, _)) = &app.status_message {
        status = status.status_message(msg);
    }
    frame.render_widget(status, chunks[1]);
}
