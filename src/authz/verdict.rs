//! Authorization verdicts

use serde::Serialize;

/// Why a query was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "tables", rename_all = "snake_case")]
pub enum RejectReason {
    /// The caller's role name is not one of the known roles
    UnknownRole,
    /// Real names of the tables left without an identity predicate, in
    /// first-reference order
    UnresolvedTables(Vec<String>),
}

/// Outcome of a completed authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum Verdict {
    /// Every referenced table is public or pinned to the caller's identity
    Authorized,
    /// At least one table remains unauthorized
    Rejected(RejectReason),
}

impl Verdict {
    /// Whether the query may be executed
    pub fn is_authorized(&self) -> bool {
        matches!(self, Verdict::Authorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_authorized() {
        assert!(Verdict::Authorized.is_authorized());
        assert!(!Verdict::Rejected(RejectReason::UnknownRole).is_authorized());
        assert!(
            !Verdict::Rejected(RejectReason::UnresolvedTables(vec!["student".into()]))
                .is_authorized()
        );
    }

    #[test]
    fn test_serializes_for_api_responses() {
        let verdict = Verdict::Rejected(RejectReason::UnresolvedTables(vec!["student".into()]));
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("rejected"));
        assert!(json.contains("student"));
    }
}
