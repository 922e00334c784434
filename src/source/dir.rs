//! Directory-backed browser source.
//!
//! Serves range requests by listing directories under a root path, the way
//! a remote browser server pages through its object hierarchy. Runs as a
//! tokio task; listings happen on the blocking pool.

use std::cmp::Ordering;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::protocol::{BrowserReply, BrowserRequest, HierarchyNode, ReplyNode, SortOrder};

/// One directory entry as seen by the source.
#[derive(Debug, Clone)]
struct Entry {
    name: String,
    path: PathBuf,
    is_dir: bool,
    is_symlink: bool,
    size: u64,
}

impl Entry {
    fn read(path: PathBuf, name: String) -> Result<Self> {
        let metadata = fs::symlink_metadata(&path)?;
        Ok(Self {
            name,
            path,
            is_dir: metadata.is_dir(),
            is_symlink: metadata.is_symlink(),
            size: metadata.len(),
        })
    }

    /// Names that are not valid UTF-8 cannot travel in a reply or be
    /// resolved back to a path, so such entries are left out.
    fn from_dir_entry(entry: &fs::DirEntry) -> Option<Self> {
        let name = entry.file_name().into_string().ok()?;
        Self::read(entry.path(), name).ok()
    }

    fn ftype(&self) -> &'static str {
        if self.is_symlink {
            "link"
        } else if self.is_dir {
            "dir"
        } else {
            "file"
        }
    }
}

/// Lists a directory tree on behalf of the browser model.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
    show_hidden: bool,
}

impl DirSource {
    pub fn new(root: &Path, show_hidden: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            show_hidden,
        }
    }

    /// Map a request path (`/a/b/`) to a directory below the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(name) => resolved.push(name),
                Component::CurDir => {}
                _ => return Err(AppError::InvalidPath(path.to_string())),
            }
        }
        Ok(resolved)
    }

    fn visible(&self, name: &str) -> bool {
        self.show_hidden || !name.starts_with('.')
    }

    /// Visible entries of a directory, unordered. Entries with non-UTF-8
    /// names or unreadable metadata are skipped.
    fn entries<'a>(&'a self, dir: &Path) -> Result<impl Iterator<Item = Entry> + 'a> {
        Ok(fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| Entry::from_dir_entry(&e))
            .filter(move |e| self.visible(&e.name)))
    }

    /// Read and order the visible entries of a directory.
    fn list(&self, dir: &Path, order: SortOrder) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self.entries(dir)?.collect();
        entries.sort_by(|a, b| compare(a, b, order));
        Ok(entries)
    }

    /// Number of entries `list` would return for `dir`.
    fn count(&self, dir: &Path) -> usize {
        self.entries(dir).map(Iterator::count).unwrap_or(0)
    }

    /// Answer one range request.
    pub fn serve(&self, request: &BrowserRequest) -> Result<BrowserReply> {
        let dir = self.resolve(&request.path)?;
        let entries = self.list(&dir, request.sort)?;
        let nchilds = entries.len();
        let first = request.first.min(nchilds);
        let last = first.saturating_add(request.number).min(nchilds);

        let nodes = entries[first..last]
            .iter()
            .map(|entry| ReplyNode {
                name: entry.name.clone(),
                nchilds: entry.is_dir.then(|| self.count(&entry.path)),
                fsize: (!entry.is_dir).then_some(entry.size),
                ftype: Some(entry.ftype().to_string()),
            })
            .collect();

        Ok(BrowserReply {
            path: request.path.clone(),
            nchilds,
            first,
            nodes,
        })
    }

    /// Like `serve`, but an unreadable directory yields an empty reply so the
    /// requesting node does not stay pending.
    pub fn reply_for(&self, request: &BrowserRequest) -> BrowserReply {
        self.serve(request).unwrap_or_else(|e| {
            warn!("cannot list '{}': {}", request.path, e);
            BrowserReply {
                path: request.path.clone(),
                nchilds: 0,
                first: 0,
                nodes: Vec::new(),
            }
        })
    }

    /// Read the whole tree (down to `max_depth` levels) for full-model mode,
    /// children ordered by `order`.
    pub fn read_hierarchy(&self, max_depth: usize, order: SortOrder) -> Result<HierarchyNode> {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.display().to_string());
        let top = Entry::read(self.root.clone(), name)?;
        Ok(self.hierarchy_of(&top, max_depth, order))
    }

    fn hierarchy_of(&self, entry: &Entry, depth: usize, order: SortOrder) -> HierarchyNode {
        let childs = if entry.is_dir && depth > 0 {
            self.list(&entry.path, order)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|e| self.hierarchy_of(e, depth - 1, order))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        HierarchyNode {
            name: entry.name.clone(),
            expanded: false,
            childs,
            fsize: (!entry.is_dir).then_some(entry.size),
            ftype: Some(entry.ftype().to_string()),
        }
    }

    /// Start serving requests on a tokio task.
    ///
    /// Each reply is encoded as JSON and handed to `deliver`; returning
    /// `false` from `deliver` stops the task. `latency` delays every reply,
    /// which makes paging visible on fast local disks.
    pub fn spawn<F>(self, latency: Duration, mut deliver: F) -> mpsc::UnboundedSender<BrowserRequest>
    where
        F: FnMut(String) -> bool + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<BrowserRequest>();
        let source = Arc::new(self);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                debug!(
                    "serving '{}' [{}, {}) sort '{}'",
                    request.path,
                    request.first,
                    request.first + request.number,
                    request.sort
                );

                let worker = Arc::clone(&source);
                let path = request.path.clone();
                let reply = match tokio::task::spawn_blocking(move || worker.reply_for(&request)).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!("listing task for '{}' failed: {}", path, e);
                        continue;
                    }
                };

                match reply.to_json() {
                    Ok(text) => {
                        if !deliver(text) {
                            break;
                        }
                    }
                    Err(e) => error!("cannot encode reply for '{}': {}", path, e),
                }
            }
        });

        tx
    }
}

fn compare(a: &Entry, b: &Entry, order: SortOrder) -> Ordering {
    let by_name = || a.name.to_lowercase().cmp(&b.name.to_lowercase());
    match order {
        // Directories first, then name.
        SortOrder::Default => b.is_dir.cmp(&a.is_dir).then_with(by_name),
        SortOrder::Direct => by_name(),
        SortOrder::Reverse => by_name().reverse(),
    }
}
