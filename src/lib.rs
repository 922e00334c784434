//! Lazy, windowed browser over a remote hierarchy.
//!
//! The [`model::BrowserModel`] keeps only the pages of children the view
//! has asked for and exposes them as a flat, indexable list. Pages are
//! fetched through a [`source::RemoteSource`]; [`source::dir::DirSource`]
//! serves them from a local directory tree.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod source;
