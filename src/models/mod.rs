//! Domain models for the component catalog.
//!
//! - [`Component`]: a node in the asset tree. Holds its ordered description
//!   ids, its child ids and an optional parent id.
//! - [`Description`]: free-text annotation owned by exactly one component.
//! - [`HistoryEntry`]: append-only audit record of one mutating operation.
//!
//! Input types (`Create*Input`, `Update*Input`, [`DescriptionInput`]) are what
//! callers submit; view types ([`ComponentView`], [`ComponentTreeNode`]) are
//! what the catalog hands back.

mod component;
mod description;
mod history;

pub use component::*;
pub use description::*;
pub use history::*;
