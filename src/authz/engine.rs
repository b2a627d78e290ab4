//! Authorization facade
//!
//! Entry point tying the pieces together: parse the SQL, enforce the
//! single-SELECT contract, short-circuit admins, walk the tree and turn
//! the final scope into a verdict. One call per request; deterministic and
//! idempotent for identical input.

use std::sync::Arc;

use crate::catalog::SchemaCatalog;
use crate::user::{Role, UserContext};

use super::cancel::CancelToken;
use super::descriptor::ScopeMap;
use super::error::AuthzResult;
use super::parse::parse_select;
use super::verdict::{RejectReason, Verdict};
use super::walker::Walker;

/// SQL SELECT authorizer over a shared schema catalog
pub struct Authorizer {
    catalog: Arc<dyn SchemaCatalog + Send + Sync>,
}

impl Authorizer {
    /// Create an authorizer; the catalog is shared across requests
    pub fn new(catalog: Arc<dyn SchemaCatalog + Send + Sync>) -> Self {
        Self { catalog }
    }

    /// Authorize a query without external cancellation
    pub fn authorize(&self, sql: &str, user: &UserContext) -> AuthzResult<Verdict> {
        self.authorize_with(sql, user, &CancelToken::new())
    }

    /// Authorize a query, polling the token between sibling nodes
    pub fn authorize_with(
        &self,
        sql: &str,
        user: &UserContext,
        cancel: &CancelToken,
    ) -> AuthzResult<Verdict> {
        let query = parse_select(sql)?;

        let Some(role) = Role::from_name(&user.role) else {
            tracing::debug!(role = %user.role, "rejecting query for unknown role");
            return Ok(Verdict::Rejected(RejectReason::UnknownRole));
        };
        if role == Role::Admin {
            return Ok(Verdict::Authorized);
        }

        tracing::debug!(%role, user_id = user.id, "authorizing query");
        let mut walker = Walker::new(self.catalog.as_ref(), role, user.id, cancel);
        let outcome = walker.authorize_query(&query, &ScopeMap::new())?;
        let unresolved = walker.arena().unresolved_tables(&outcome.scope);

        if unresolved.is_empty() {
            Ok(Verdict::Authorized)
        } else {
            tracing::debug!(tables = ?unresolved, "query rejected");
            Ok(Verdict::Rejected(RejectReason::UnresolvedTables(unresolved)))
        }
    }
}
