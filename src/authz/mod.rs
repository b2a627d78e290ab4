//! SQL query authorization engine
//!
//! This module decides, by static analysis of a parsed `SELECT`, whether a
//! caller may execute it:
//! - `parse`: wraps the SQL parser and enforces the single-SELECT contract
//! - `descriptor`: arena-backed model of the tables visible in each scope
//!   and the obligations they still carry
//! - `walker`: recursive dispatch over the parse tree
//! - `combine`: set algebra reconciling obligations across siblings
//! - `engine`: the facade producing a [`Verdict`]

pub mod cancel;
pub mod combine;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod verdict;

mod parse;
mod walker;

pub use cancel::CancelToken;
pub use engine::Authorizer;
pub use error::{AuthzError, AuthzResult};
pub use verdict::{RejectReason, Verdict};
