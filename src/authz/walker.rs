//! Recursive node authorizer
//!
//! Walks the parse tree of a `SELECT`, maintaining a scope map of table
//! descriptors per lexical level. Base tables enter the scope with an
//! obligation unless the caller may read them freely; predicates of the
//! recognized identity-equality shapes discharge obligations; Boolean, set
//! and join operators reconcile the obligation sets of their operands.
//! Constructs the walker does not recognize are deliberate no-ops: they
//! never discharge an obligation, so anything they touch stays unauthorized
//! until an understood predicate clears it.

use sqlparser::ast::{
    BinaryOperator, Expr, Join, JoinConstraint, JoinOperator, ObjectName, Query, Select,
    SelectItem, SetExpr, SetOperator, TableAlias, TableFactor, TableWithJoins, UnaryOperator,
    Value,
};

use crate::catalog::SchemaCatalog;
use crate::user::Role;

use super::cancel::CancelToken;
use super::combine::{
    clear_side, intersect_branches, intersect_sides, prune_inner_join, union_branches,
    union_sides,
};
use super::descriptor::{
    alias_parts, last_ident, rename_columns, virtual_scope, DescriptorArena, ScopeMap, TableId,
};
use super::error::{AuthzError, AuthzResult};

/// Predicate polarity, toggled by each enclosing NOT and consumed at the
/// comparison leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    fn flip(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }
}

/// Result of authorizing one node: the scope it produces and, for
/// SELECT-producing nodes, the projected target list an enclosing alias
/// uses to name exposed columns
pub(crate) struct NodeOutcome<'q> {
    pub scope: ScopeMap,
    pub targets: Option<&'q [SelectItem]>,
}

/// One authorization walk; all state lives here and dies with it
pub(crate) struct Walker<'a> {
    catalog: &'a dyn SchemaCatalog,
    role: Role,
    user_id: i64,
    cancel: &'a CancelToken,
    arena: DescriptorArena,
}

/// Column reference operand of a predicate
struct ColumnRef<'q> {
    table: Option<&'q str>,
    column: &'q str,
}

impl<'a> Walker<'a> {
    pub fn new(
        catalog: &'a dyn SchemaCatalog,
        role: Role,
        user_id: i64,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            catalog,
            role,
            user_id,
            cancel,
            arena: DescriptorArena::new(),
        }
    }

    pub fn arena(&self) -> &DescriptorArena {
        &self.arena
    }

    /// Authorize a query: CTEs first, then the set-expression body. CTE
    /// descriptors enter the combined scope ahead of the body's so that
    /// body entries shadow them on alias collision while unreferenced,
    /// unresolved CTEs still propagate their obligations.
    pub fn authorize_query<'q>(
        &mut self,
        query: &'q Query,
        outer: &ScopeMap,
    ) -> AuthzResult<NodeOutcome<'q>> {
        self.cancel.check()?;

        let mut visible = outer.clone();
        let mut combined = ScopeMap::new();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cancel.check()?;
                let inner = self.authorize_query(&cte.query, &visible)?;
                let (name, columns) = alias_parts(&cte.alias);
                let wrapper =
                    virtual_scope(&mut self.arena, &name, &columns, inner.targets, &inner.scope);
                for (alias, id) in wrapper {
                    visible.insert(alias.clone(), id);
                    combined.insert(alias, id);
                }
            }
        }

        let body = self.authorize_set_expr(&query.body, &visible)?;
        for (alias, id) in body.scope {
            combined.insert(alias, id);
        }
        Ok(NodeOutcome {
            scope: combined,
            targets: body.targets,
        })
    }

    fn authorize_set_expr<'q>(
        &mut self,
        body: &'q SetExpr,
        outer: &ScopeMap,
    ) -> AuthzResult<NodeOutcome<'q>> {
        match body {
            SetExpr::Select(select) => self.authorize_select(select, outer),
            SetExpr::Query(query) => self.authorize_query(query, outer),
            SetExpr::SetOperation {
                op: SetOperator::Except,
                left,
                ..
            } => {
                // EXCEPT can only narrow the left side; whatever the right
                // side would exclude, the verdict of the left side stands.
                self.authorize_set_expr(left, outer)
            }
            SetExpr::SetOperation {
                op, left, right, ..
            } => {
                self.cancel.check()?;
                let l = self.authorize_set_expr(left, outer)?;
                self.cancel.check()?;
                let r = self.authorize_set_expr(right, outer)?;
                let scope = match op {
                    SetOperator::Union => union_sides(&mut self.arena, l.scope, r.scope),
                    _ => intersect_sides(&mut self.arena, l.scope, r.scope),
                };
                let targets = match (l.targets, r.targets) {
                    (Some(targets), Some(_)) => Some(targets),
                    _ => None,
                };
                Ok(NodeOutcome { scope, targets })
            }
            _ => Ok(NodeOutcome {
                scope: ScopeMap::new(),
                targets: None,
            }),
        }
    }

    fn authorize_select<'q>(
        &mut self,
        select: &'q Select,
        outer: &ScopeMap,
    ) -> AuthzResult<NodeOutcome<'q>> {
        if select.into.is_some() {
            return Err(AuthzError::Unsupported("SELECT INTO".to_string()));
        }

        let mut combined = ScopeMap::new();
        for item in &select.from {
            self.cancel.check()?;
            let scope = self.authorize_from_item(item, outer)?;
            for (alias, id) in scope {
                combined.insert(alias, id);
            }
        }

        if let Some(selection) = &select.selection {
            combined = self.authorize_expr(selection, &combined, Polarity::Positive)?;
        }
        if let Some(having) = &select.having {
            combined = self.authorize_expr(having, &combined, Polarity::Positive)?;
        }

        Ok(NodeOutcome {
            scope: combined,
            targets: Some(select.projection.as_slice()),
        })
    }

    fn authorize_from_item<'q>(
        &mut self,
        item: &'q TableWithJoins,
        outer: &ScopeMap,
    ) -> AuthzResult<ScopeMap> {
        let mut combined = self.authorize_table_factor(&item.relation, outer)?;
        for join in &item.joins {
            self.cancel.check()?;
            combined = self.authorize_join(combined, join, outer)?;
        }
        Ok(combined)
    }

    fn authorize_table_factor<'q>(
        &mut self,
        factor: &'q TableFactor,
        outer: &ScopeMap,
    ) -> AuthzResult<ScopeMap> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                self.base_table(name, alias.as_ref(), outer)
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                if *lateral {
                    return Err(AuthzError::Unsupported("LATERAL subquery".to_string()));
                }
                let inner = self.authorize_query(subquery, outer)?;
                Ok(match alias {
                    Some(alias) => {
                        let (name, columns) = alias_parts(alias);
                        virtual_scope(
                            &mut self.arena,
                            &name,
                            &columns,
                            inner.targets,
                            &inner.scope,
                        )
                    }
                    None => inner.scope,
                })
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => {
                let inner = self.authorize_from_item(table_with_joins, outer)?;
                Ok(match alias {
                    Some(alias) => {
                        let (name, columns) = alias_parts(alias);
                        virtual_scope(&mut self.arena, &name, &columns, None, &inner)
                    }
                    None => inner,
                })
            }
            // Table functions, UNNEST and friends carry no relation the
            // catalog knows about
            _ => Ok(ScopeMap::new()),
        }
    }

    /// A base table reference. Names bound to a virtual descriptor in the
    /// enclosing scope (CTEs) resolve there; everything else comes from the
    /// catalog.
    fn base_table(
        &mut self,
        name: &ObjectName,
        alias: Option<&TableAlias>,
        outer: &ScopeMap,
    ) -> AuthzResult<ScopeMap> {
        let relation = last_ident(name)
            .ok_or_else(|| AuthzError::Malformed("table reference with no name".to_string()))?;
        let (alias_name, alias_columns) = match alias {
            Some(alias) => {
                let (name, columns) = alias_parts(alias);
                (Some(name), columns)
            }
            None => (None, Vec::new()),
        };

        if let Some(&existing) = outer.get(relation) {
            if !self.arena.get(existing).is_database {
                let id = self.arena.clone_table(existing);
                let exposed = alias_name.unwrap_or_else(|| relation.to_string());
                self.arena.get_mut(id).alias = exposed.clone();
                rename_columns(&mut self.arena, id, &alias_columns);
                let mut scope = ScopeMap::new();
                scope.insert(exposed, id);
                return Ok(scope);
            }
        }

        let id =
            self.arena
                .database_table(self.catalog, self.role, relation, alias_name.as_deref());
        rename_columns(&mut self.arena, id, &alias_columns);
        let mut scope = ScopeMap::new();
        scope.insert(self.arena.get(id).alias.clone(), id);
        Ok(scope)
    }

    /// Combine obligations across a join according to its type, then run
    /// its quals against the merged scope
    fn authorize_join<'q>(
        &mut self,
        left: ScopeMap,
        join: &'q Join,
        outer: &ScopeMap,
    ) -> AuthzResult<ScopeMap> {
        let right = self.authorize_table_factor(&join.relation, outer)?;

        let constraint = match &join.join_operator {
            JoinOperator::Inner(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c) => Some(c),
            _ => None,
        };

        // NATURAL and USING joins expose no predicate worth inspecting;
        // both sides keep whatever obligations they carry.
        if matches!(
            constraint,
            Some(JoinConstraint::Natural) | Some(JoinConstraint::Using(_))
        ) {
            return Ok(merge_scopes(left, right));
        }

        match &join.join_operator {
            JoinOperator::Inner(constraint) => {
                prune_inner_join(&mut self.arena, &left, &right);
                let merged = merge_scopes(left, right);
                self.join_quals(constraint, merged)
            }
            JoinOperator::LeftOuter(constraint) => {
                clear_side(&mut self.arena, &right);
                let merged = merge_scopes(left, right);
                self.join_quals(constraint, merged)
            }
            JoinOperator::RightOuter(constraint) => {
                clear_side(&mut self.arena, &left);
                let merged = merge_scopes(left, right);
                self.join_quals(constraint, merged)
            }
            JoinOperator::FullOuter(constraint) => {
                let merged = merge_scopes(left, right);
                self.join_quals(constraint, merged)
            }
            // CROSS JOIN and the exotic types: no predicate, obligations
            // stand until an outer clause clears them
            _ => Ok(merge_scopes(left, right)),
        }
    }

    fn join_quals<'q>(
        &mut self,
        constraint: &'q JoinConstraint,
        scope: ScopeMap,
    ) -> AuthzResult<ScopeMap> {
        match constraint {
            JoinConstraint::On(expr) => self.authorize_expr(expr, &scope, Polarity::Positive),
            _ => Ok(scope),
        }
    }

    /// Authorize a predicate expression against a scope and return the
    /// scope that results. Input scopes are never mutated; every clearing
    /// path works on a clone.
    fn authorize_expr<'q>(
        &mut self,
        expr: &'q Expr,
        scope: &ScopeMap,
        polarity: Polarity,
    ) -> AuthzResult<ScopeMap> {
        match expr {
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => self.boolean_branches(left, right, scope, polarity, true),
                BinaryOperator::Or => self.boolean_branches(left, right, scope, polarity, false),
                BinaryOperator::Eq | BinaryOperator::NotEq => {
                    self.comparison(left, op, right, scope, polarity)
                }
                _ => Ok(scope.clone()),
            },
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => self.authorize_expr(expr, scope, polarity.flip()),
            Expr::Nested(inner) => self.authorize_expr(inner, scope, polarity),
            Expr::InList {
                expr,
                list,
                negated,
            } => self.in_list(expr, list, *negated, scope, polarity),
            Expr::InSubquery { subquery, .. } => self.sublink(subquery, scope),
            Expr::Exists { subquery, .. } => self.sublink(subquery, scope),
            Expr::Subquery(subquery) => self.sublink(subquery, scope),
            Expr::AnyOp { right, .. } | Expr::AllOp { right, .. } => match right.as_ref() {
                Expr::Subquery(subquery) => self.sublink(subquery, scope),
                _ => Ok(scope.clone()),
            },
            _ => Ok(scope.clone()),
        }
    }

    /// AND/OR: authorize each argument against an isolated clone of the
    /// starting scope, then reconcile the branch results
    fn boolean_branches<'q>(
        &mut self,
        left: &'q Expr,
        right: &'q Expr,
        scope: &ScopeMap,
        polarity: Polarity,
        conjunctive: bool,
    ) -> AuthzResult<ScopeMap> {
        let mut branches = Vec::with_capacity(2);
        for arg in [left, right] {
            self.cancel.check()?;
            let isolated = self.arena.clone_scope(scope);
            branches.push(self.authorize_expr(arg, &isolated, polarity)?);
        }
        Ok(if conjunctive {
            intersect_branches(&mut self.arena, scope, &branches)
        } else {
            union_branches(&mut self.arena, scope, &branches)
        })
    }

    /// A sublink (EXISTS, IN, ANY, ALL, scalar subquery) contributes its
    /// subselect's scope; polarity resets to positive inside
    fn sublink<'q>(&mut self, query: &'q Query, scope: &ScopeMap) -> AuthzResult<ScopeMap> {
        let outcome = self.authorize_query(query, scope)?;
        Ok(outcome.scope)
    }

    /// `=` / `<>` comparison leaf
    fn comparison<'q>(
        &mut self,
        left: &'q Expr,
        op: &BinaryOperator,
        right: &'q Expr,
        scope: &ScopeMap,
        polarity: Polarity,
    ) -> AuthzResult<ScopeMap> {
        let clearing = matches!(
            (op, polarity),
            (BinaryOperator::Eq, Polarity::Positive) | (BinaryOperator::NotEq, Polarity::Negative)
        );
        if !clearing {
            return Ok(scope.clone());
        }

        if let Some((column, value)) = column_literal_pair(left, right) {
            let cleared = self.arena.clone_scope(scope);
            self.apply_identity(&cleared, &column, value);
            return Ok(cleared);
        }

        if let (Expr::Tuple(items), Expr::Subquery(subquery)) = (left, right) {
            return self.row_equality(items, subquery, scope);
        }

        Ok(scope.clone())
    }

    /// `col IN (literal)` with a one-element list behaves as equality; any
    /// other list length or operand shape clears nothing
    fn in_list<'q>(
        &mut self,
        expr: &'q Expr,
        list: &'q [Expr],
        negated: bool,
        scope: &ScopeMap,
        polarity: Polarity,
    ) -> AuthzResult<ScopeMap> {
        let clearing = matches!(
            (negated, polarity),
            (false, Polarity::Positive) | (true, Polarity::Negative)
        );
        if !clearing || list.len() != 1 {
            return Ok(scope.clone());
        }
        let (Some(column), Some(value)) = (column_ref(expr), integer_literal(&list[0])) else {
            return Ok(scope.clone());
        };

        let cleared = self.arena.clone_scope(scope);
        self.apply_identity(&cleared, &column, value);
        Ok(cleared)
    }

    /// Discharge obligations satisfied by `column = value` where the column
    /// resolves, through its lineage, to the authorization column of a
    /// pending table and the value is the caller's identity
    fn apply_identity(&mut self, scope: &ScopeMap, column: &ColumnRef<'_>, value: i64) {
        if value != self.user_id {
            return;
        }
        let candidates: Vec<TableId> = match column.table {
            Some(alias) => scope.get(alias).copied().into_iter().collect(),
            None => scope.values().copied().collect(),
        };
        for id in candidates {
            let Some((origin_table, origin_column)) = self.arena.resolve_column(id, column.column)
            else {
                continue;
            };
            let entries: Vec<(String, TableId)> = self
                .arena
                .get(id)
                .pending
                .iter()
                .map(|(key, &pending_id)| (key.clone(), pending_id))
                .collect();
            for (key, pending_id) in entries {
                if pending_id != origin_table {
                    continue;
                }
                let auth = self.catalog.auth_column(self.role, self.arena.name(pending_id));
                if auth == Some(origin_column.as_str()) {
                    tracing::trace!(
                        table = self.arena.name(pending_id),
                        column = %origin_column,
                        "identity predicate discharged obligation"
                    );
                    self.arena.get_mut(id).pending.shift_remove(&key);
                }
            }
        }
    }

    /// `(a.c1, a.c2) = (SELECT ...)`: when a referenced column is the
    /// authorization column of its underlying table and the subquery
    /// authorizes on its own against that table alone, the obligation is
    /// discharged
    fn row_equality<'q>(
        &mut self,
        items: &'q [Expr],
        subquery: &'q Query,
        scope: &ScopeMap,
    ) -> AuthzResult<ScopeMap> {
        let cleared = self.arena.clone_scope(scope);
        for item in items {
            let Some(column) = column_ref(item) else {
                continue;
            };
            let Some(alias) = column.table else {
                continue;
            };
            let Some(&id) = cleared.get(alias) else {
                continue;
            };
            let Some((origin_table, origin_column)) = self.arena.resolve_column(id, column.column)
            else {
                continue;
            };
            let auth = self.catalog.auth_column(self.role, self.arena.name(origin_table));
            if auth != Some(origin_column.as_str()) {
                continue;
            }

            let singleton_id = self.arena.clone_table(id);
            let mut singleton = ScopeMap::new();
            singleton.insert(alias.to_string(), singleton_id);
            let outcome = self.authorize_query(subquery, &singleton)?;
            if self.arena.scope_resolved(&outcome.scope) {
                let keys: Vec<String> = self
                    .arena
                    .get(id)
                    .pending
                    .iter()
                    .filter(|(_, &pending_id)| pending_id == origin_table)
                    .map(|(key, _)| key.clone())
                    .collect();
                let descriptor = self.arena.get_mut(id);
                for key in keys {
                    descriptor.pending.shift_remove(&key);
                }
                break;
            }
        }
        Ok(cleared)
    }
}

fn merge_scopes(mut left: ScopeMap, right: ScopeMap) -> ScopeMap {
    for (alias, id) in right {
        left.insert(alias, id);
    }
    left
}

fn column_ref(expr: &Expr) -> Option<ColumnRef<'_>> {
    match expr {
        Expr::Identifier(ident) => Some(ColumnRef {
            table: None,
            column: &ident.value,
        }),
        Expr::CompoundIdentifier(parts) if parts.len() == 2 => Some(ColumnRef {
            table: Some(&parts[0].value),
            column: &parts[1].value,
        }),
        _ => None,
    }
}

fn integer_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse().ok(),
        _ => None,
    }
}

/// Accept `col = literal` in either operand order
fn column_literal_pair<'q>(left: &'q Expr, right: &'q Expr) -> Option<(ColumnRef<'q>, i64)> {
    if let (Some(column), Some(value)) = (column_ref(left), integer_literal(right)) {
        return Some((column, value));
    }
    if let (Some(column), Some(value)) = (column_ref(right), integer_literal(left)) {
        return Some((column, value));
    }
    None
}
