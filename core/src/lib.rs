//! Primitives, Script, and the transaction/block data model (spec
//! components C1-C4): the parts of the workspace with no notion of a
//! peer, a tree, or a persistent store, just serializable records and
//! the pure functions that validate them.

pub mod block;
pub mod consensus;
pub mod hash;
pub mod params;
pub mod script;
pub mod ser;
pub mod target;
pub mod transaction;

pub use hash::{Hash160, Hash256, Hashed};
pub use script::Script;
pub use transaction::{Input, Output, Outpoint, Transaction};
