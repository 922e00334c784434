pub mod binding;
pub mod node;
pub mod request;
pub mod tree;

pub use binding::{TreeBinding, ViewListener, Window};
pub use node::{FlatNode, Node, NodeAttrs, NodeId, NodeKind};
pub use request::{FixedTimeout, InFlight, NoTimeout, RequestState, RequestTimeout};
pub use tree::{BrowserModel, ReplyOutcome, DEFAULT_THRESHOLD};
