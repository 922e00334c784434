use std::time::Instant;

use log::{error, info};

use rbrowser::model::{BrowserModel, NodeKind, ReplyOutcome, TreeBinding};
use rbrowser::protocol::BrowserReply;

/// Main application state.
pub struct App {
    pub model: BrowserModel,
    pub binding: TreeBinding,
    /// Title shown above the tree.
    pub root_name: String,
    pub selected: usize,
    pub scroll_offset: usize,
    /// Rows visible in the last frame.
    pub viewport: usize,
    pub should_quit: bool,
    pub status_message: Option<(String, Instant)>,
}

impl App {
    pub fn new(model: BrowserModel, binding: TreeBinding, root_name: &str) -> Self {
        Self {
            model,
            binding,
            root_name: root_name.to_string(),
            selected: 0,
            scroll_offset: 0,
            viewport: 0,
            should_quit: false,
            status_message: None,
        }
    }

    /// Set a status message with current timestamp.
    pub fn set_status_message(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now()));
    }

    /// Clear the status message if it has been displayed for more than 3 seconds.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, ref created)) = self.status_message {
            if created.elapsed().as_secs() > 3 {
                self.status_message = None;
            }
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Fit the viewport to `visible_height` rows around the selection and
    /// rebuild the flat window. Called once per frame.
    pub fn sync_view(&mut self, visible_height: usize) {
        self.viewport = visible_height;
        self.clamp_selection();
        if visible_height == 0 {
            return;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + visible_height {
            self.scroll_offset = self.selected + 1 - visible_height;
        }
        self.binding.set_window(self.scroll_offset, visible_height);
        self.binding.refresh(&mut self.model);
        // Length may have been corrected by the walk.
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.model.length();
        if len == 0 {
            self.selected = 0;
            self.scroll_offset = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn select_next(&mut self) {
        let len = self.model.length();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.model.length().saturating_sub(1);
    }

    pub fn page_down(&mut self) {
        let step = self.viewport.max(1);
        let last = self.model.length().saturating_sub(1);
        self.selected = (self.selected + step).min(last);
    }

    pub fn page_up(&mut self) {
        let step = self.viewport.max(1);
        self.selected = self.selected.saturating_sub(step);
    }

    /// Expand or collapse the selected row.
    pub fn toggle_selected(&mut self) {
        self.model.toggle_node(self.selected);
    }

    /// Collapse the selected folder, or move to its parent row.
    pub fn collapse_selected(&mut self) {
        let Some(row) = self.model.flat_node(self.selected) else {
            return;
        };
        if row.kind == NodeKind::Folder && row.expanded {
            self.model.toggle_node(self.selected);
            return;
        }
        if row.level == 0 {
            return;
        }
        let level = row.level;
        let parent = self
            .model
            .flat_nodes()
            .range(..self.selected)
            .rev()
            .find(|(_, f)| f.level < level)
            .map(|(index, _)| *index);
        if let Some(index) = parent {
            self.selected = index;
        }
    }

    /// Step to the next server-side ordering.
    pub fn cycle_sort_order(&mut self) {
        if self.model.is_full_model() {
            self.set_status_message("Full model is resident; sort order is fixed".into());
            return;
        }
        let order = self.model.sort_order().next();
        if self.model.set_sort_order(order) {
            self.selected = 0;
            self.scroll_offset = 0;
            self.set_status_message(format!("Sort: {}", order.label()));
        }
    }

    pub fn reload(&mut self) {
        if self.model.is_full_model() {
            self.set_status_message("Full model is resident; nothing to reload".into());
            return;
        }
        self.model.reload();
        self.selected = 0;
        self.scroll_offset = 0;
        self.set_status_message("Reloading".into());
    }

    /// Decode and apply one reply from the source.
    pub fn handle_reply(&mut self, text: &str) {
        match BrowserReply::from_json(text) {
            Ok(reply) => {
                if self.model.process_response(reply) == ReplyOutcome::UnknownPath {
                    self.set_status_message("Dropped reply for a collapsed node".into());
                }
            }
            Err(e) => {
                error!("{}", e);
                // Free the node so the next window pass can ask again.
                if let Some(path) = BrowserReply::path_of(text) {
                    self.model.reject_reply(&path);
                }
                self.set_status_message(format!("Bad reply: {}", e));
            }
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        let expired = self.model.expire_requests(now);
        if !expired.is_empty() {
            info!("{} request(s) timed out", expired.len());
            self.set_status_message(format!("{} request(s) timed out", expired.len()));
        }
        self.clear_expired_status();
    }

    /// Request path of the selected row, if loaded.
    pub fn selected_path(&self) -> Option<String> {
        let id = self.model.element_by_index(self.selected)?;
        self.model.node_path(id)
    }
}
