use crate::model::node::FlatNode;
use crate::model::tree::BrowserModel;

/// Receives "data changed, re-pull the window" notifications from the model.
pub trait ViewListener {
    fn check_update(&mut self, force: bool);
}

/// Viewport handed to `build_flat_nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First visible flat index.
    pub begin: usize,
    /// First flat index past the viewport.
    pub end: usize,
    /// Prefetch margin; `None` uses the model threshold.
    pub threshold: Option<usize>,
}

impl Window {
    pub fn new(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Pass-through list binding used by a virtualized view.
///
/// Holds only the current viewport; every read goes back to the model.
#[derive(Debug, Clone)]
pub struct TreeBinding {
    begin: usize,
    end: usize,
    threshold: usize,
}

impl TreeBinding {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            begin: 0,
            end: 0,
            threshold,
        }
    }

    /// Move the viewport to `[begin, begin + len)`.
    pub fn set_window(&mut self, begin: usize, len: usize) {
        self.begin = begin;
        self.end = begin + len;
    }

    pub fn window(&self) -> Window {
        Window::new(self.begin, self.end).with_threshold(self.threshold)
    }

    /// Rebuild the flat window for the current viewport; returns the total length.
    pub fn refresh(&self, model: &mut BrowserModel) -> usize {
        model.build_flat_nodes(self.window())
    }

    pub fn length(&self, model: &BrowserModel) -> usize {
        model.length()
    }

    /// Rows of the viewport clipped to the model length. `None` marks a row
    /// whose data has not arrived yet.
    pub fn rows<'m>(
        &self,
        model: &'m BrowserModel,
    ) -> impl Iterator<Item = (usize, Option<&'m FlatNode>)> + 'm {
        let end = self.end.min(model.length());
        (self.begin.min(end)..end).map(move |i| (i, model.flat_node(i)))
    }
}
