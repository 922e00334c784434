use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use log::{debug, error, warn};

use crate::model::binding::{TreeBinding, ViewListener, Window};
use crate::model::node::{FlatNode, Node, NodeId, NodeKind};
use crate::model::request::{InFlight, NoTimeout, RequestState, RequestTimeout};
use crate::protocol::{BrowserReply, BrowserRequest, HierarchyNode, SortOrder};
use crate::source::RemoteSource;

/// Default number of entries requested per fetch and used as prefetch margin.
pub const DEFAULT_THRESHOLD: usize = 100;

const HOLDER_NAME: &str = "__Holder__";

/// How a reply was folded into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Reply slice was adjacent to the loaded slice and appended/prepended.
    Merged,
    /// Loaded slice was replaced; the flat window will be rebuilt.
    Replaced,
    /// No node matches the reply path; reply dropped.
    UnknownPath,
}

/// Fetch discovered while walking the window, submitted after the walk.
struct Fetch {
    node: NodeId,
    path: String,
    first: usize,
    number: usize,
}

/// Lazily loaded hierarchy with a flat, windowed read view.
///
/// Nodes live in an arena keyed by `NodeId`. Each node holds a contiguous
/// slice of its children starting at `first`; unloaded children still take
/// flat index space so that positions of later rows stay stable while
/// pages arrive.
pub struct BrowserModel {
    nodes: HashMap<NodeId, Node>,
    next_id: usize,
    flat: BTreeMap<usize, FlatNode>,
    length: usize,
    reset_nodes: bool,
    full_model: bool,
    threshold: usize,
    sort_order: SortOrder,
    in_flight: InFlight,
    source: Option<Box<dyn RemoteSource>>,
    listener: Option<Box<dyn ViewListener>>,
    timeout: Box<dyn RequestTimeout>,
}

impl Default for BrowserModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserModel {
    pub fn new() -> Self {
        let mut root = Node::new(HOLDER_NAME, None);
        root.expanded = true;
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, root);
        Self {
            nodes,
            next_id: 1,
            flat: BTreeMap::new(),
            length: 0,
            reset_nodes: false,
            full_model: false,
            threshold: DEFAULT_THRESHOLD,
            sort_order: SortOrder::Default,
            in_flight: InFlight::default(),
            source: None,
            listener: None,
            timeout: Box::new(NoTimeout),
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Box<dyn RequestTimeout>) -> Self {
        self.timeout = timeout;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn is_full_model(&self) -> bool {
        self.full_model
    }

    /// Total number of flat rows, as of the last scan.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Number of nodes held in the arena, the holder included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn flat_nodes(&self) -> &BTreeMap<usize, FlatNode> {
        &self.flat
    }

    pub fn flat_node(&self, index: usize) -> Option<&FlatNode> {
        self.flat.get(&index)
    }

    /// Node shown at a flat index, if that row is in the current window.
    pub fn element_by_index(&self, index: usize) -> Option<NodeId> {
        self.flat.get(&index).map(|f| f.node)
    }

    /// Resolve a `/a/b/` style path. `/` and the empty path are the holder.
    pub fn node_by_path(&self, path: &str) -> Option<NodeId> {
        let mut current = NodeId::ROOT;
        for name in path.split('/').filter(|n| !n.is_empty()) {
            let node = self.nodes.get(&current)?;
            current = node
                .childs
                .as_ref()?
                .iter()
                .copied()
                .find(|id| self.nodes.get(id).is_some_and(|c| c.name == name))?;
        }
        Some(current)
    }

    /// Request path of a node: `/` for the holder, `/a/b/` below it.
    pub fn node_path(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = id;
        loop {
            let node = self.nodes.get(&current)?;
            match node.parent {
                Some(parent) => {
                    names.push(node.name.as_str());
                    current = parent;
                }
                None => break,
            }
        }
        let mut path = String::from("/");
        for name in names.iter().rev() {
            path.push_str(name);
            path.push('/');
        }
        Some(path)
    }

    // ── Wiring ──────────────────────────────────────────────────────────────

    pub fn attach_source(&mut self, source: Box<dyn RemoteSource>) {
        self.source = Some(source);
    }

    /// Register the view and return the list binding it reads through.
    pub fn bind_tree(&mut self, path: &str, listener: Box<dyn ViewListener>) -> TreeBinding {
        debug!("binding tree view to '{}'", path);
        self.listener = Some(listener);
        TreeBinding::new(self.threshold)
    }

    /// Submit the top-level request.
    pub fn send_first_request(&mut self) -> bool {
        self.submit_request(NodeId::ROOT, "/", 0, self.threshold)
    }

    fn notify(&mut self, force: bool) {
        if let Some(listener) = self.listener.as_mut() {
            listener.check_update(force);
        }
    }

    // ── Arena ───────────────────────────────────────────────────────────────

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn remove_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.childs.into_iter().flatten() {
                self.remove_subtree(child);
            }
        }
    }

    /// Drop a node's materialized slice and free the nodes it held.
    fn discard_children(&mut self, id: NodeId) {
        let childs = self.nodes.get_mut(&id).and_then(|n| n.childs.take());
        for child in childs.into_iter().flatten() {
            self.remove_subtree(child);
        }
    }

    fn insert_hierarchy(&mut self, entry: &HierarchyNode, parent: NodeId) -> NodeId {
        let id = self.alloc(Node::from_hierarchy(entry, parent));
        if !entry.childs.is_empty() {
            let childs: Vec<NodeId> = entry
                .childs
                .iter()
                .map(|child| self.insert_hierarchy(child, id))
                .collect();
            if let Some(node) = self.nodes.get_mut(&id) {
                node.childs = Some(childs);
            }
        }
        id
    }

    // ── Modes ───────────────────────────────────────────────────────────────

    /// Switch to eager mode with the whole hierarchy resident.
    pub fn set_full_model(&mut self, top: &HierarchyNode) {
        self.discard_children(NodeId::ROOT);
        self.full_model = true;
        let top_id = self.insert_hierarchy(top, NodeId::ROOT);
        if let Some(node) = self.nodes.get_mut(&top_id) {
            node.expanded = true;
        }
        if let Some(root) = self.nodes.get_mut(&NodeId::ROOT) {
            root.nchilds = 1;
            root.first = 0;
            root.childs = Some(vec![top_id]);
        }
        self.reset_nodes = true;
        self.scan_shifts();
        self.notify(true);
    }

    /// Drop the resident hierarchy and return to lazy mode.
    pub fn clear_full_model(&mut self) {
        self.discard_children(NodeId::ROOT);
        if let Some(root) = self.nodes.get_mut(&NodeId::ROOT) {
            root.nchilds = 0;
            root.first = 0;
        }
        self.full_model = false;
        self.reset_nodes = true;
        self.scan_shifts();
    }

    // ── Requests ────────────────────────────────────────────────────────────

    /// Ask the source for children `[first, first + number)` of `id`.
    ///
    /// Returns `false` without side effects when a request for the node is
    /// already pending, in full-model mode, or with no source attached.
    pub fn submit_request(&mut self, id: NodeId, path: &str, first: usize, number: usize) -> bool {
        if self.full_model {
            return false;
        }
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.is_pending() {
            debug!("request for '{}' already pending, dropped", path);
            return false;
        }

        let request = BrowserRequest {
            path: path.to_string(),
            first,
            number,
            sort: self.sort_order,
        };
        if let Err(e) = source.submit(request) {
            warn!("{}", e);
            return false;
        }

        let now = Instant::now();
        node.request = RequestState::Pending { since: now };
        self.in_flight.insert(path, now);
        debug!("requested '{}' [{}, {})", path, first, first + number);
        true
    }

    /// Merge a reply into the tree.
    pub fn process_response(&mut self, reply: BrowserReply) -> ReplyOutcome {
        self.in_flight.complete(&reply.path);

        let Some(id) = self.node_by_path(&reply.path) else {
            error!("no node found for reply path '{}'", reply.path);
            return ReplyOutcome::UnknownPath;
        };

        let (append, prepend) = {
            let Some(node) = self.nodes.get_mut(&id) else {
                return ReplyOutcome::UnknownPath;
            };
            if !node.is_pending() {
                warn!("reply for '{}' arrived but was not requested", reply.path);
            }
            node.request = RequestState::Idle;

            match &node.childs {
                Some(_) if node.nchilds == reply.nchilds => (
                    node.loaded_end() == reply.first,
                    reply.first + reply.nodes.len() == node.first,
                ),
                _ => (false, false),
            }
        };
        let smart_merge = append || prepend;

        if !smart_merge {
            self.discard_children(id);
        }
        let new_ids: Vec<NodeId> = reply
            .nodes
            .iter()
            .map(|entry| self.alloc(Node::from_reply(entry, id)))
            .collect();

        if let Some(node) = self.nodes.get_mut(&id) {
            if append {
                node.childs.get_or_insert_with(Vec::new).extend(new_ids);
            } else if prepend {
                let old = node.childs.take().unwrap_or_default();
                let mut childs = new_ids;
                childs.extend(old);
                node.childs = Some(childs);
                node.first = reply.first;
            } else {
                node.nchilds = reply.nchilds;
                node.first = reply.first;
                node.childs = Some(new_ids);
            }
        }
        debug!(
            "reply for '{}' [{}, {}) of {} {}",
            reply.path,
            reply.first,
            reply.first + reply.nodes.len(),
            reply.nchilds,
            if smart_merge { "merged" } else { "replaced" }
        );

        self.scan_shifts();

        if !smart_merge {
            self.reset_nodes = true;
        }

        if self.in_flight.is_empty() {
            self.notify(true);
        }

        if smart_merge {
            ReplyOutcome::Merged
        } else {
            ReplyOutcome::Replaced
        }
    }

    /// Release the request for `path` after its reply could not be used.
    ///
    /// The node returns to idle so the next window pass asks again.
    pub fn reject_reply(&mut self, path: &str) -> bool {
        let was_in_flight = self.in_flight.complete(path);
        let released = match self.node_by_path(path).and_then(|id| self.nodes.get_mut(&id)) {
            Some(node) if node.is_pending() => {
                node.request = RequestState::Idle;
                true
            }
            _ => false,
        };
        warn!("reply for '{}' rejected", path);
        if was_in_flight && self.in_flight.is_empty() {
            self.notify(true);
        }
        was_in_flight || released
    }

    /// Give up on requests the timeout policy considers lost.
    ///
    /// Expired nodes return to idle so the next window pass asks again.
    pub fn expire_requests(&mut self, now: Instant) -> Vec<String> {
        let expired = self.in_flight.drain_expired(self.timeout.as_ref(), now);
        if expired.is_empty() {
            return expired;
        }
        for path in &expired {
            warn!("request for '{}' timed out", path);
            if let Some(id) = self.node_by_path(path) {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.request = RequestState::Idle;
                }
            }
        }
        if self.in_flight.is_empty() {
            self.notify(true);
        }
        expired
    }

    // ── Flat index space ────────────────────────────────────────────────────

    /// Recompute every node's `shift` and the total flat length.
    pub fn scan_shifts(&mut self) -> usize {
        let mut id = 0;
        scan_shift(&mut self.nodes, NodeId::ROOT, -1, self.full_model, &mut id);
        self.length = id;
        id
    }

    /// Build (or extend) the flat window around `window`, issuing fetches
    /// for whatever part of it is not loaded yet. Returns the total length.
    pub fn build_flat_nodes(&mut self, window: Window) -> usize {
        let threshold = window
            .threshold
            .filter(|t| *t > 0)
            .unwrap_or(self.threshold);

        if self.reset_nodes {
            self.flat.clear();
            self.reset_nodes = false;
        }

        let threshold = threshold as i64;
        let mut walk = WindowWalk {
            nodes: &self.nodes,
            flat: &mut self.flat,
            full: self.full_model,
            begin: window.begin as i64,
            end: window.end as i64,
            threshold,
            half: (threshold + 1) / 2,
            fetch_size: self.threshold,
            id: 0,
            fetches: Vec::new(),
        };
        walk.scan(-1, NodeId::ROOT, "/");
        let total = walk.id as usize;
        let fetches = walk.fetches;

        if self.length != total {
            debug!("flat length corrected {} -> {}", self.length, total);
            self.length = total;
        }

        for fetch in fetches {
            self.submit_request(fetch.node, &fetch.path, fetch.first, fetch.number);
        }

        total
    }

    // ── View actions ────────────────────────────────────────────────────────

    /// Flip the expand state of the row at `index`.
    ///
    /// Returns `false` for unknown rows and for leaves.
    pub fn toggle_node(&mut self, index: usize) -> bool {
        let Some(id) = self.element_by_index(index) else {
            return false;
        };
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };

        if node.expanded {
            node.expanded = false;
            if !self.full_model {
                self.discard_children(id);
            }
            self.reset_nodes = true;
            self.scan_shifts();
            return true;
        }

        if node.nchilds > 0 || index == 0 {
            node.expanded = true;
            if let Some(row) = self.flat.get_mut(&index) {
                row.expanded = true;
            }
            if self.full_model {
                self.reset_nodes = true;
                self.scan_shifts();
            }
            return true;
        }

        false
    }

    /// Change the server-side ordering. Accepts `""`, `"direct"` or
    /// `"reverse"`; anything else falls back to `""`.
    pub fn change_sort_order(&mut self, order: &str) -> bool {
        let order = SortOrder::parse(order).unwrap_or_else(|| {
            error!("wrong sort order '{}', using default", order);
            SortOrder::Default
        });
        self.set_sort_order(order)
    }

    /// Apply a new ordering: loaded pages under the holder are dropped and
    /// the top-level request is issued again.
    pub fn set_sort_order(&mut self, order: SortOrder) -> bool {
        if order == self.sort_order {
            return false;
        }
        self.sort_order = order;

        if !self.full_model {
            self.discard_children(NodeId::ROOT);
            // Keep nchilds so the list keeps its length until the first page lands.
            if let Some(root) = self.nodes.get_mut(&NodeId::ROOT) {
                root.first = 0;
                root.childs = Some(Vec::new());
            }
            self.reset_nodes = true;
            self.scan_shifts();
        }

        self.send_first_request();
        true
    }

    /// Forget everything loaded and start over from the top-level request.
    pub fn reload(&mut self) {
        if self.full_model {
            return;
        }
        self.discard_children(NodeId::ROOT);
        if let Some(root) = self.nodes.get_mut(&NodeId::ROOT) {
            root.nchilds = 0;
            root.first = 0;
        }
        self.reset_nodes = true;
        self.scan_shifts();
        self.send_first_request();
    }
}

fn scan_shift(nodes: &mut HashMap<NodeId, Node>, id: NodeId, lvl: i64, full: bool, counter: &mut usize) {
    if lvl >= 0 {
        *counter += 1;
    }
    let before = *counter;

    let Some(node) = nodes.get_mut(&id) else {
        return;
    };
    let (first, nchilds) = (node.first, node.nchilds);
    // Children are taken out while the subtree is walked and put back after.
    let childs = if node.expanded { node.childs.take() } else { None };

    if let Some(childs) = &childs {
        if !full {
            *counter += first;
        }
        for &child in childs {
            scan_shift(nodes, child, lvl + 1, full, counter);
        }
        if !full {
            let last = first + childs.len();
            if nchilds > last {
                *counter += nchilds - last;
            }
        }
    }

    if let Some(node) = nodes.get_mut(&id) {
        if childs.is_some() {
            node.childs = childs;
        }
        node.shift = *counter - before;
    }
}

/// State of one `build_flat_nodes` pass.
struct WindowWalk<'a> {
    nodes: &'a HashMap<NodeId, Node>,
    flat: &'a mut BTreeMap<usize, FlatNode>,
    full: bool,
    begin: i64,
    end: i64,
    threshold: i64,
    half: i64,
    fetch_size: usize,
    id: i64,
    fetches: Vec<Fetch>,
}

impl WindowWalk<'_> {
    fn in_window(&self) -> bool {
        self.id >= self.begin - self.half && self.id < self.end + self.half
    }

    fn fetch(&mut self, node: NodeId, path: &str, first: i64, number: i64) {
        self.fetches.push(Fetch {
            node,
            path: path.to_string(),
            first: first as usize,
            number: number as usize,
        });
    }

    fn scan(&mut self, lvl: i64, id: NodeId, path: &str) {
        let nodes = self.nodes;
        let Some(node) = nodes.get(&id) else {
            return;
        };

        if lvl >= 0 && self.in_window() {
            let index = self.id as usize;
            self.flat.entry(index).or_insert_with(|| FlatNode {
                index,
                name: node.name.clone(),
                level: lvl as usize,
                kind: if node.nchilds > 0 || index == 0 {
                    NodeKind::Folder
                } else {
                    NodeKind::File
                },
                is_leaf: node.nchilds == 0,
                expanded: node.expanded,
                node: id,
            });
        }

        if lvl >= 0 {
            self.id += 1;
        }

        if !node.expanded {
            return;
        }

        let Some(childs) = node.childs.as_ref() else {
            self.fetches.push(Fetch {
                node: id,
                path: path.to_string(),
                first: 0,
                number: self.fetch_size,
            });
            return;
        };

        // Whole subtree outside the window: jump over it.
        let shift = node.shift as i64;
        if self.id + shift < self.begin - self.half || self.id >= self.end + self.half {
            self.id += shift;
            return;
        }

        let first = node.first as i64;
        if first > 0 && !self.full {
            let wanted = self.begin - self.id - self.half;
            if wanted < first {
                let from = wanted.max(0);
                let number = (first - from).min(self.threshold);
                self.fetch(id, path, from, number);
            }
            self.id += first;
        }

        for &child in childs {
            let Some(child_node) = nodes.get(&child) else {
                continue;
            };
            let child_path = format!("{}{}/", path, child_node.name);
            self.scan(lvl + 1, child, &child_path);
        }

        if !self.full {
            let last = first + childs.len() as i64;
            let remains = node.nchilds as i64 - last;
            if remains > 0 {
                if self.end + self.half > self.id {
                    let mut from = last;
                    let mut number = (self.end + self.half - self.id)
                        .max(self.threshold)
                        .min(remains);
                    // Large gap: fetch the part nearest the far edge of the window.
                    if number > self.threshold {
                        from += number - self.threshold;
                        number = self.threshold;
                    }
                    self.fetch(id, path, from, number);
                }
                self.id += remains;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::model::request::FixedTimeout;
    use crate::protocol::ReplyNode;

    type Requests = mpsc::UnboundedReceiver<BrowserRequest>;

    struct CountingListener(Arc<AtomicUsize>);

    impl ViewListener for CountingListener {
        fn check_update(&mut self, _force: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn model_with_source() -> (BrowserModel, Requests) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut model = BrowserModel::new();
        model.attach_source(Box::new(tx));
        (model, rx)
    }

    fn drain(rx: &mut Requests) -> Vec<BrowserRequest> {
        let mut out = Vec::new();
        while let Ok(req) = rx.try_recv() {
            out.push(req);
        }
        out
    }

    fn leaves(range: std::ops::Range<usize>) -> Vec<ReplyNode> {
        range.map(|i| ReplyNode::leaf(format!("n{}", i))).collect()
    }

    fn reply(path: &str, nchilds: usize, first: usize, nodes: Vec<ReplyNode>) -> BrowserReply {
        BrowserReply {
            path: path.into(),
            nchilds,
            first,
            nodes,
        }
    }

    /// Issue the top-level request through a window pass and answer it.
    fn load_root(model: &mut BrowserModel, rx: &mut Requests, nchilds: usize, nodes: Vec<ReplyNode>) {
        model.build_flat_nodes(Window::new(0, 10));
        let reqs = drain(rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/");
        model.process_response(reply("/", nchilds, 0, nodes));
    }

    fn child_names(model: &BrowserModel, id: NodeId) -> Vec<String> {
        model
            .node(id)
            .and_then(|n| n.childs.as_ref())
            .map(|childs| {
                childs
                    .iter()
                    .map(|c| model.node(*c).unwrap().name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn flat_names(model: &BrowserModel) -> Vec<(usize, String)> {
        model
            .flat_nodes()
            .values()
            .map(|f| (f.index, f.name.clone()))
            .collect()
    }

    #[test]
    fn first_window_requests_top_level_once() {
        let (mut model, mut rx) = model_with_source();
        let total = model.build_flat_nodes(Window::new(0, 50));
        assert_eq!(total, 0);

        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/");
        assert_eq!(reqs[0].first, 0);
        assert!(reqs[0].number >= 50);
        assert_eq!(reqs[0].sort, SortOrder::Default);
        assert!(model.in_flight().contains("/"));
    }

    #[test]
    fn large_root_pages_in_on_demand() {
        let (mut model, mut rx) = model_with_source();
        model.build_flat_nodes(Window::new(0, 50));
        drain(&mut rx);

        let outcome = model.process_response(reply("/", 1000, 0, leaves(0..50)));
        assert_eq!(outcome, ReplyOutcome::Replaced);
        assert_eq!(model.length(), 1000);

        model.build_flat_nodes(Window::new(0, 50));
        for i in 0..50 {
            let id = model.element_by_index(i).expect("loaded row");
            assert_eq!(model.node(id).unwrap().name, format!("n{}", i));
        }
        assert!(model.element_by_index(500).is_none());

        // The pass above asked for the next page right after the loaded slice.
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].first, reqs[0].number), (50, 100));
        assert_eq!(
            model.process_response(reply("/", 1000, 50, leaves(50..150))),
            ReplyOutcome::Merged
        );

        // Scrolling far ahead requests the page nearest the far window edge.
        model.build_flat_nodes(Window::new(480, 520));
        assert!(model.element_by_index(500).is_none());
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].first, reqs[0].number), (470, 100));

        assert_eq!(
            model.process_response(reply("/", 1000, 470, leaves(470..570))),
            ReplyOutcome::Replaced
        );
        model.build_flat_nodes(Window::new(480, 520));
        let id = model.element_by_index(500).expect("row 500 loaded");
        assert_eq!(model.node(id).unwrap().name, "n500");
        assert_eq!(model.length(), 1000);
    }

    #[test]
    fn second_request_for_same_node_is_dropped() {
        let (mut model, mut rx) = model_with_source();
        assert!(model.submit_request(NodeId::ROOT, "/", 0, 100));
        assert!(!model.submit_request(NodeId::ROOT, "/", 100, 100));
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(model.in_flight().len(), 1);
        assert!(model.node(NodeId::ROOT).unwrap().is_pending());
    }

    #[test]
    fn submit_without_source_is_noop() {
        let mut model = BrowserModel::new();
        assert!(!model.submit_request(NodeId::ROOT, "/", 0, 10));
        assert_eq!(model.build_flat_nodes(Window::new(0, 10)), 0);
        assert!(model.in_flight().is_empty());
        assert!(!model.node(NodeId::ROOT).unwrap().is_pending());
    }

    #[test]
    fn closed_source_leaves_node_idle() {
        let (tx, rx) = mpsc::unbounded_channel::<BrowserRequest>();
        drop(rx);
        let mut model = BrowserModel::new();
        model.attach_source(Box::new(tx));
        assert!(!model.send_first_request());
        assert!(!model.node(NodeId::ROOT).unwrap().is_pending());
        assert!(model.in_flight().is_empty());
    }

    #[test]
    fn adjacent_reply_after_slice_is_appended() {
        let (mut model, _rx) = model_with_source();
        model.process_response(reply(
            "/",
            10,
            2,
            vec![ReplyNode::leaf("a"), ReplyNode::leaf("b")],
        ));
        let outcome = model.process_response(reply(
            "/",
            10,
            4,
            vec![ReplyNode::leaf("c"), ReplyNode::leaf("d")],
        ));
        assert_eq!(outcome, ReplyOutcome::Merged);
        assert_eq!(child_names(&model, NodeId::ROOT), vec!["a", "b", "c", "d"]);
        assert_eq!(model.node(NodeId::ROOT).unwrap().first, 2);
        assert_eq!(model.length(), 10);
    }

    #[test]
    fn adjacent_reply_before_slice_is_prepended() {
        let (mut model, _rx) = model_with_source();
        model.process_response(reply(
            "/",
            10,
            2,
            vec![ReplyNode::leaf("a"), ReplyNode::leaf("b")],
        ));
        let outcome = model.process_response(reply(
            "/",
            10,
            0,
            vec![ReplyNode::leaf("x"), ReplyNode::leaf("y")],
        ));
        assert_eq!(outcome, ReplyOutcome::Merged);
        assert_eq!(child_names(&model, NodeId::ROOT), vec!["x", "y", "a", "b"]);
        assert_eq!(model.node(NodeId::ROOT).unwrap().first, 0);
    }

    #[test]
    fn changed_child_count_replaces_slice() {
        let (mut model, _rx) = model_with_source();
        model.process_response(reply(
            "/",
            10,
            2,
            vec![ReplyNode::leaf("a"), ReplyNode::leaf("b")],
        ));
        let before = model.node_count();
        let outcome = model.process_response(reply(
            "/",
            12,
            4,
            vec![ReplyNode::leaf("c"), ReplyNode::leaf("d")],
        ));
        assert_eq!(outcome, ReplyOutcome::Replaced);
        assert_eq!(child_names(&model, NodeId::ROOT), vec!["c", "d"]);
        let root = model.node(NodeId::ROOT).unwrap();
        assert_eq!((root.first, root.nchilds), (4, 12));
        // Old children were freed from the arena.
        assert_eq!(model.node_count(), before);
        assert_eq!(model.length(), 12);
    }

    #[test]
    fn non_adjacent_reply_replaces_slice() {
        let (mut model, _rx) = model_with_source();
        model.process_response(reply("/", 10, 0, leaves(0..2)));
        let outcome = model.process_response(reply("/", 10, 6, leaves(6..8)));
        assert_eq!(outcome, ReplyOutcome::Replaced);
        assert_eq!(child_names(&model, NodeId::ROOT), vec!["n6", "n7"]);
    }

    #[test]
    fn reply_for_unknown_path_is_dropped() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 1, vec![ReplyNode::leaf("f")]);
        let count = model.node_count();
        let outcome = model.process_response(reply("/missing/", 3, 0, leaves(0..3)));
        assert_eq!(outcome, ReplyOutcome::UnknownPath);
        assert_eq!(model.node_count(), count);
        assert_eq!(model.length(), 1);
    }

    #[test]
    fn unrequested_reply_is_still_processed() {
        let (mut model, _rx) = model_with_source();
        assert!(model.in_flight().is_empty());
        let outcome = model.process_response(reply("/", 3, 0, leaves(0..3)));
        assert_eq!(outcome, ReplyOutcome::Replaced);
        assert_eq!(model.length(), 3);
    }

    #[test]
    fn build_twice_yields_same_window() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 500, leaves(0..100));

        let first_len = model.build_flat_nodes(Window::new(60, 90));
        let first = model.flat_nodes().clone();
        let second_len = model.build_flat_nodes(Window::new(60, 90));
        assert_eq!(first_len, second_len);
        assert_eq!(&first, model.flat_nodes());

        // Only the first pass may issue the tail request.
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn window_covers_half_threshold_margin() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 100, leaves(0..100));
        model.build_flat_nodes(Window::new(40, 50).with_threshold(20));
        let indices: Vec<usize> = model.flat_nodes().keys().copied().collect();
        assert_eq!(indices, (30..60).collect::<Vec<_>>());
    }

    #[test]
    fn length_does_not_depend_on_reply_order() {
        fn run(a_first: bool) -> (usize, Vec<(usize, String)>) {
            let (mut model, mut rx) = model_with_source();
            load_root(
                &mut model,
                &mut rx,
                2,
                vec![ReplyNode::folder("A", 5), ReplyNode::folder("B", 7)],
            );
            model.build_flat_nodes(Window::new(0, 50));
            assert!(model.toggle_node(0));
            assert!(model.toggle_node(1));
            model.build_flat_nodes(Window::new(0, 50));
            let paths: Vec<String> = drain(&mut rx).into_iter().map(|r| r.path).collect();
            assert_eq!(paths, vec!["/A/", "/B/"]);

            let a = reply("/A/", 5, 0, leaves(0..5));
            let b = reply("/B/", 7, 0, leaves(0..7));
            if a_first {
                model.process_response(a);
                model.process_response(b);
            } else {
                model.process_response(b);
                model.process_response(a);
            }
            model.build_flat_nodes(Window::new(0, 50));
            (model.length(), flat_names(&model))
        }

        let (len_ab, flat_ab) = run(true);
        let (len_ba, flat_ba) = run(false);
        assert_eq!(len_ab, 14);
        assert_eq!(len_ab, len_ba);
        assert_eq!(flat_ab, flat_ba);
        assert_eq!(flat_ab[1], (1, "n0".to_string()));
        assert_eq!(flat_ab[6], (6, "B".to_string()));
    }

    #[test]
    fn view_notified_once_when_requests_drain() {
        let (mut model, mut rx) = model_with_source();
        load_root(
            &mut model,
            &mut rx,
            2,
            vec![ReplyNode::folder("A", 1), ReplyNode::folder("B", 1)],
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let _binding = model.bind_tree("/", Box::new(CountingListener(calls.clone())));

        model.build_flat_nodes(Window::new(0, 10));
        model.toggle_node(0);
        model.toggle_node(1);
        model.build_flat_nodes(Window::new(0, 10));
        assert_eq!(drain(&mut rx).len(), 2);

        model.process_response(reply("/A/", 1, 0, leaves(0..1)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        model.process_response(reply("/B/", 1, 0, leaves(0..1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_model_never_requests() {
        let (mut model, mut rx) = model_with_source();
        let top = HierarchyNode::new(
            "geom",
            vec![
                HierarchyNode::new(
                    "a",
                    vec![HierarchyNode::new("a1", vec![]), HierarchyNode::new("a2", vec![])],
                ),
                HierarchyNode::new("b", vec![]),
            ],
        );
        model.set_full_model(&top);
        assert!(model.is_full_model());
        assert_eq!(model.length(), 3);

        model.build_flat_nodes(Window::new(0, 10));
        assert_eq!(
            flat_names(&model),
            vec![(0, "geom".into()), (1, "a".into()), (2, "b".into())]
        );

        assert!(model.toggle_node(1));
        assert_eq!(model.length(), top.count());
        model.build_flat_nodes(Window::new(0, 10));
        assert_eq!(model.flat_node(2).unwrap().name, "a1");
        assert_eq!(model.flat_node(4).unwrap().name, "b");

        // Collapse keeps the children resident.
        assert!(model.toggle_node(1));
        assert_eq!(model.length(), 3);
        let a = model.node_by_path("/geom/a/").unwrap();
        assert_eq!(child_names(&model, a), vec!["a1", "a2"]);

        assert!(model.toggle_node(1));
        model.build_flat_nodes(Window::new(0, 10));
        assert!(!model.send_first_request());
        assert!(drain(&mut rx).is_empty());
        assert!(model.in_flight().is_empty());
    }

    #[test]
    fn clear_full_model_returns_to_lazy_mode() {
        let (mut model, mut rx) = model_with_source();
        model.set_full_model(&HierarchyNode::new("top", vec![HierarchyNode::new("x", vec![])]));
        model.clear_full_model();
        assert!(!model.is_full_model());
        assert_eq!(model.length(), 0);
        assert_eq!(model.node_count(), 1);
        assert!(model.send_first_request());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn collapse_discards_children_and_reexpand_refetches() {
        let (mut model, mut rx) = model_with_source();
        load_root(
            &mut model,
            &mut rx,
            2,
            vec![ReplyNode::folder("dir", 3), ReplyNode::leaf("f")],
        );
        model.build_flat_nodes(Window::new(0, 10));
        assert!(model.toggle_node(0));
        model.build_flat_nodes(Window::new(0, 10));
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/dir/");

        model.process_response(reply("/dir/", 3, 0, leaves(0..3)));
        model.build_flat_nodes(Window::new(0, 10));
        assert_eq!(model.length(), 5);
        assert_eq!(model.flat_node(4).unwrap().name, "f");
        assert_eq!(model.flat_node(1).unwrap().level, 1);

        assert!(model.toggle_node(0));
        let dir = model.node_by_path("/dir/").unwrap();
        assert!(model.node(dir).unwrap().childs.is_none());
        assert_eq!(model.length(), 2);

        model.build_flat_nodes(Window::new(0, 10));
        assert!(!model.flat_node(0).unwrap().expanded);
        assert!(model.toggle_node(0));
        model.build_flat_nodes(Window::new(0, 10));
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/dir/");
    }

    #[test]
    fn toggle_leaf_or_unknown_row_is_noop() {
        let (mut model, mut rx) = model_with_source();
        load_root(
            &mut model,
            &mut rx,
            2,
            vec![ReplyNode::folder("dir", 3), ReplyNode::leaf("f")],
        );
        model.build_flat_nodes(Window::new(0, 10));
        assert!(!model.toggle_node(1));
        assert!(!model.toggle_node(99));
        let f = model.node_by_path("/f/").unwrap();
        assert!(!model.node(f).unwrap().expanded);
        assert_eq!(model.flat_node(1).unwrap().kind, NodeKind::File);
        assert_eq!(model.flat_node(0).unwrap().kind, NodeKind::Folder);
    }

    #[test]
    fn missing_prefix_is_backfilled() {
        let (mut model, mut rx) = model_with_source();
        model.process_response(reply("/", 300, 200, leaves(200..300)));
        model.build_flat_nodes(Window::new(220, 230));
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].first, reqs[0].number), (170, 30));
        assert_eq!(model.flat_node(200).unwrap().name, "n200");
        assert!(model.flat_node(199).is_none());

        let outcome = model.process_response(reply("/", 300, 170, leaves(170..200)));
        assert_eq!(outcome, ReplyOutcome::Merged);
        assert_eq!(model.node(NodeId::ROOT).unwrap().first, 170);
        model.build_flat_nodes(Window::new(220, 230));
        assert_eq!(model.flat_node(185).unwrap().name, "n185");
    }

    #[test]
    fn tail_request_leans_toward_far_edge() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 1000, leaves(0..100));
        model.build_flat_nodes(Window::new(400, 420));
        assert!(model.flat_nodes().is_empty());
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].first, reqs[0].number), (370, 100));
    }

    #[test]
    fn tail_request_is_capped_to_remaining() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 130, leaves(0..100));
        model.build_flat_nodes(Window::new(90, 100));
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].first, reqs[0].number), (100, 30));
    }

    #[test]
    fn sort_order_change_reissues_top_request() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 5, leaves(0..5));

        assert!(!model.change_sort_order(""));
        assert!(!model.change_sort_order("by-size"));
        assert!(drain(&mut rx).is_empty());

        assert!(model.change_sort_order("reverse"));
        assert_eq!(model.sort_order(), SortOrder::Reverse);
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].path.as_str(), reqs[0].first), ("/", 0));
        assert_eq!(reqs[0].sort, SortOrder::Reverse);
        assert_eq!(child_names(&model, NodeId::ROOT), Vec::<String>::new());
        assert_eq!(model.length(), 5);

        assert!(!model.change_sort_order("reverse"));
        assert!(drain(&mut rx).is_empty());

        let names: Vec<ReplyNode> = (0..5).rev().map(|i| ReplyNode::leaf(format!("n{}", i))).collect();
        assert_eq!(model.process_response(reply("/", 5, 0, names)), ReplyOutcome::Merged);
        assert_eq!(child_names(&model, NodeId::ROOT)[0], "n4");

        assert!(model.change_sort_order("sideways"));
        assert_eq!(model.sort_order(), SortOrder::Default);
        assert_eq!(drain(&mut rx)[0].sort, SortOrder::Default);
    }

    #[test]
    fn reload_starts_from_scratch() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 3, leaves(0..3));
        model.reload();
        assert_eq!(model.length(), 0);
        assert_eq!(model.node_count(), 1);
        let reqs = drain(&mut rx);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/");
        model.process_response(reply("/", 2, 0, leaves(0..2)));
        assert_eq!(model.length(), 2);
    }

    #[test]
    fn stuck_request_blocks_without_timeout() {
        let (mut model, mut rx) = model_with_source();
        assert!(model.send_first_request());
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(model.expire_requests(later).is_empty());
        assert!(!model.send_first_request());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn timeout_policy_releases_lost_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut model = BrowserModel::new().with_timeout(Box::new(FixedTimeout(Duration::from_secs(1))));
        model.attach_source(Box::new(tx));
        assert!(model.send_first_request());

        let expired = model.expire_requests(Instant::now() + Duration::from_secs(2));
        assert_eq!(expired, vec!["/".to_string()]);
        assert!(model.in_flight().is_empty());
        assert!(!model.node(NodeId::ROOT).unwrap().is_pending());

        model.build_flat_nodes(Window::new(0, 10));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn rejected_reply_releases_node_and_notifies() {
        let (mut model, mut rx) = model_with_source();
        let hits = Arc::new(AtomicUsize::new(0));
        let _binding = model.bind_tree("/", Box::new(CountingListener(hits.clone())));

        model.build_flat_nodes(Window::new(0, 10));
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(model.node(NodeId::ROOT).unwrap().is_pending());

        assert!(model.reject_reply("/"));
        assert!(model.in_flight().is_empty());
        assert!(!model.node(NodeId::ROOT).unwrap().is_pending());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        model.build_flat_nodes(Window::new(0, 10));
        let again = drain(&mut rx);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].path, "/");

        assert!(!model.reject_reply("/nowhere/"));
    }

    #[test]
    fn paths_round_trip_through_arena() {
        let (mut model, mut rx) = model_with_source();
        load_root(&mut model, &mut rx, 1, vec![ReplyNode::folder("dir", 1)]);
        model.build_flat_nodes(Window::new(0, 10));
        model.toggle_node(0);
        model.build_flat_nodes(Window::new(0, 10));
        drain(&mut rx);
        model.process_response(reply("/dir/", 1, 0, vec![ReplyNode::leaf("x")]));

        let x = model.node_by_path("/dir/x/").unwrap();
        assert_eq!(model.node_path(x).unwrap(), "/dir/x/");
        assert_eq!(model.node_path(NodeId::ROOT).unwrap(), "/");
        assert_eq!(model.node_by_path("/"), Some(NodeId::ROOT));
        assert_eq!(model.node_by_path(""), Some(NodeId::ROOT));
        assert!(model.node_by_path("/dir/y/").is_none());
    }

    #[test]
    fn binding_rows_follow_model() {
        let (mut model, mut rx) = model_with_source();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut binding = model.bind_tree("/", Box::new(CountingListener(calls.clone())));
        binding.set_window(0, 10);
        binding.refresh(&mut model);
        drain(&mut rx);

        model.process_response(reply("/", 4, 0, leaves(0..2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(binding.refresh(&mut model), 4);
        assert_eq!(binding.length(&model), 4);

        let rows: Vec<(usize, Option<String>)> = binding
            .rows(&model)
            .map(|(i, row)| (i, row.map(|r| r.name.clone())))
            .collect();
        assert_eq!(
            rows,
            vec![
                (0, Some("n0".into())),
                (1, Some("n1".into())),
                (2, None),
                (3, None),
            ]
        );
    }
}
