//! querygate - SQL query authorization for the university chatbot
//!
//! The chatbot turns natural-language questions into SQL. Before a generated
//! `SELECT` reaches the database, this crate decides by static analysis of
//! the parse tree whether the caller (role + numeric identity) may run it:
//! every referenced table must be publicly readable or pinned to the
//! caller's identity through an authorization-column predicate.

pub mod authz;
pub mod catalog;
pub mod user;
