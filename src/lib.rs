//! Component catalog: a hierarchy of assets with descriptions and an audit
//! trail of every change.

pub mod api;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod search;
pub mod tree_render;

pub use db::Database;
pub use error::{CatalogError, ErrorKind, Result};
pub use hierarchy::Hierarchy;

/// The hierarchy manager over the SQLite store.
pub type Catalog = Hierarchy<Database>;
