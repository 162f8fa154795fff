//! Structural JSON deltas.
//!
//! - [`compute`] / [`compute_with`]: minimal delta between two values
//! - [`patch`] / [`unpatch`]: apply a delta forward or backward
//! - [`Delta::reverse`]: the inverse delta
//!
//! Deltas are persisted in a jsondiffpatch-compatible encoding, see
//! [`Delta::to_value`].

mod apply;
mod engine;
mod identity;
mod model;

pub use apply::{patch, unpatch};
pub use engine::{compute, compute_with};
pub use identity::{json_eq, ElementIdentity, IdOrIndex};
pub use model::{ArrayDelta, Delta, Removal};
