//! SQL parsing front end
//!
//! Thin wrapper around the sqlparser crate that enforces the authorizer's
//! input contract: exactly one top-level statement, and it must be a
//! `SELECT`. Everything DML/DDL-shaped is refused up front; the walker only
//! ever sees query trees.

use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use super::error::{AuthzError, AuthzResult};

/// Parse SQL text into a single `SELECT` query tree
pub fn parse_select(sql: &str) -> AuthzResult<Query> {
    let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)?;

    if statements.is_empty() {
        return Err(AuthzError::Syntax("empty SQL input".to_string()));
    }
    if statements.len() > 1 {
        return Err(AuthzError::Unsupported(
            "multiple statements in one request".to_string(),
        ));
    }

    match statements.remove(0) {
        Statement::Query(query) => Ok(*query),
        other => Err(AuthzError::Unsupported(format!(
            "non-SELECT statement: {}",
            statement_kind(&other)
        ))),
    }
}

fn statement_kind(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::Drop { .. } => "DROP",
        Statement::Prepare { .. } => "PREPARE",
        Statement::Execute { .. } => "EXECUTE",
        Statement::Fetch { .. } => "FETCH",
        _ => "statement",
    }
}
