//! Table descriptor model
//!
//! Every table visible in some lexical scope of the query under analysis is
//! represented by a descriptor: real database relations as well as the
//! virtual scopes produced by aliased subqueries, aliased joins and CTEs.
//! Descriptors live in a per-request arena and refer to each other through
//! integer handles, which keeps the reference graph acyclic-by-construction
//! on clone: copying a descriptor copies handles, never the graph behind
//! them.
//!
//! A descriptor's `pending` map holds the database tables behind it that
//! still lack an identity predicate. The query is authorized when every
//! descriptor in the root scope has an empty pending map.

use indexmap::IndexMap;
use sqlparser::ast::{Expr, ObjectName, SelectItem, TableAlias};

use crate::catalog::SchemaCatalog;
use crate::user::Role;

/// Handle into a [`DescriptorArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(u32);

/// Tables visible in one lexical scope, keyed by the alias the parent sees.
///
/// Insertion order is semantically significant: `*` expansion and positional
/// column-alias lists follow it, and the rejected-tables list inherits it.
pub type ScopeMap = IndexMap<String, TableId>;

/// One column exposed by a descriptor: the name it has on its source
/// descriptor, plus the handle of that source
#[derive(Debug, Clone)]
pub struct ColumnOrigin {
    /// Column name as the source descriptor exposes it
    pub column: String,
    /// Descriptor the column comes from
    pub source: TableId,
}

/// A table within some scope of the query
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    /// Real relation name, or the synthetic name of a virtual scope
    pub name: String,
    /// Identifier this table is referenced by in its parent scope
    pub alias: String,
    /// True only for real database relations
    pub is_database: bool,
    /// Exposed columns: alias in this scope -> origin
    pub columns: IndexMap<String, ColumnOrigin>,
    /// Unauthorized database tables behind this descriptor, keyed by the
    /// alias under which they were exposed
    pub pending: IndexMap<String, TableId>,
}

impl TableDescriptor {
    /// Whether every table behind this descriptor has been authorized
    pub fn is_resolved(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Per-request arena of table descriptors
#[derive(Debug, Default)]
pub struct DescriptorArena {
    tables: Vec<TableDescriptor>,
}

impl DescriptorArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a descriptor, returning its handle
    pub fn alloc(&mut self, table: TableDescriptor) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(table);
        id
    }

    /// Borrow a descriptor
    pub fn get(&self, id: TableId) -> &TableDescriptor {
        &self.tables[id.0 as usize]
    }

    /// Mutably borrow a descriptor
    pub fn get_mut(&mut self, id: TableId) -> &mut TableDescriptor {
        &mut self.tables[id.0 as usize]
    }

    /// Real relation name behind a handle
    pub fn name(&self, id: TableId) -> &str {
        &self.get(id).name
    }

    /// Copy one descriptor. Column and pending entries keep their handles,
    /// so the clone shares its sources with the original while resolving
    /// obligations on it stays invisible to the original.
    pub fn clone_table(&mut self, id: TableId) -> TableId {
        let copy = self.get(id).clone();
        self.alloc(copy)
    }

    /// Clone every descriptor of a scope, preserving aliases and order
    pub fn clone_scope(&mut self, scope: &ScopeMap) -> ScopeMap {
        let entries: Vec<(String, TableId)> =
            scope.iter().map(|(alias, &id)| (alias.clone(), id)).collect();
        entries
            .into_iter()
            .map(|(alias, id)| (alias, self.clone_table(id)))
            .collect()
    }

    /// Build a descriptor for a database relation.
    ///
    /// Columns come from the catalog; the table starts with itself as its
    /// only pending entry unless the role may read it freely. A
    /// role-specific authorization column wins over publicness: a table the
    /// catalog pins to the caller's identity needs a predicate even when it
    /// is in the public set for everyone else.
    pub fn database_table(
        &mut self,
        catalog: &dyn SchemaCatalog,
        role: Role,
        name: &str,
        alias: Option<&str>,
    ) -> TableId {
        let alias = alias.unwrap_or(name).to_string();
        let id = self.alloc(TableDescriptor {
            name: name.to_string(),
            alias: alias.clone(),
            is_database: true,
            columns: IndexMap::new(),
            pending: IndexMap::new(),
        });

        let columns: IndexMap<String, ColumnOrigin> = catalog
            .columns(name)
            .into_iter()
            .map(|col| {
                (
                    col.clone(),
                    ColumnOrigin {
                        column: col,
                        source: id,
                    },
                )
            })
            .collect();
        self.get_mut(id).columns = columns;

        let restricted = catalog.auth_column(role, name).is_some() || !catalog.is_public(name);
        if restricted {
            self.get_mut(id).pending.insert(alias, id);
        }
        id
    }

    /// Follow a column through virtual wrappers down to the database table
    /// that owns it. Returns the owning descriptor and the column's name
    /// there, or `None` when the alias is unknown in this descriptor.
    pub fn resolve_column(&self, id: TableId, column: &str) -> Option<(TableId, String)> {
        let origin = self.get(id).columns.get(column)?;
        if self.get(origin.source).is_database {
            Some((origin.source, origin.column.clone()))
        } else {
            self.resolve_column(origin.source, &origin.column)
        }
    }

    /// Whether every descriptor of a scope is resolved
    pub fn scope_resolved(&self, scope: &ScopeMap) -> bool {
        scope.values().all(|&id| self.get(id).is_resolved())
    }

    /// Real names of the tables still pending across a scope, deduplicated,
    /// in first-reference order
    pub fn unresolved_tables(&self, scope: &ScopeMap) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for &id in scope.values() {
            for &pending_id in self.get(id).pending.values() {
                let name = self.name(pending_id);
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

/// Wrap an inner scope in a single virtual descriptor.
///
/// Used for aliased subqueries, aliased joins and CTE definitions. The
/// wrapper's columns are drawn from the target list when one is available
/// (aliased joins have none and expose everything), renamed positionally by
/// `alias_columns` with graceful truncation. Every column keeps a handle to
/// its original source descriptor so predicates against the wrapper still
/// identify the underlying relation. The wrapper inherits the union of the
/// inner descriptors' pending maps.
pub fn virtual_scope(
    arena: &mut DescriptorArena,
    alias: &str,
    alias_columns: &[String],
    targets: Option<&[SelectItem]>,
    inner: &ScopeMap,
) -> ScopeMap {
    let mut wrapper = TableDescriptor {
        name: alias.to_string(),
        alias: alias.to_string(),
        is_database: false,
        columns: IndexMap::new(),
        pending: IndexMap::new(),
    };
    let mut renames = AliasPositions::new(alias_columns);

    match targets {
        Some(items) => {
            for item in items {
                match item {
                    SelectItem::Wildcard(_) => {
                        for &source in inner.values() {
                            append_all_columns(arena, &mut wrapper, source, &mut renames);
                        }
                    }
                    SelectItem::QualifiedWildcard(name, _) => {
                        if let Some(&source) = last_ident(name).and_then(|n| inner.get(n)) {
                            append_all_columns(arena, &mut wrapper, source, &mut renames);
                        }
                    }
                    SelectItem::UnnamedExpr(expr) => {
                        append_column_expr(arena, &mut wrapper, expr, None, inner, &mut renames);
                    }
                    SelectItem::ExprWithAlias { expr, alias } => {
                        append_column_expr(
                            arena,
                            &mut wrapper,
                            expr,
                            Some(alias.value.as_str()),
                            inner,
                            &mut renames,
                        );
                    }
                }
            }
        }
        None => {
            for &source in inner.values() {
                append_all_columns(arena, &mut wrapper, source, &mut renames);
            }
        }
    }

    for &id in inner.values() {
        let inherited: Vec<(String, TableId)> = arena
            .get(id)
            .pending
            .iter()
            .map(|(k, &v)| (k.clone(), v))
            .collect();
        for (key, value) in inherited {
            wrapper.pending.insert(key, value);
        }
    }

    let mut scope = ScopeMap::new();
    scope.insert(alias.to_string(), arena.alloc(wrapper));
    scope
}

/// Positional column-alias list consumer
struct AliasPositions<'a> {
    aliases: &'a [String],
    next: usize,
}

impl<'a> AliasPositions<'a> {
    fn new(aliases: &'a [String]) -> Self {
        Self { aliases, next: 0 }
    }

    /// Take the next positional alias, if one is left and non-empty
    fn take(&mut self) -> Option<&'a str> {
        let alias = self.aliases.get(self.next)?;
        self.next += 1;
        if alias.is_empty() {
            None
        } else {
            Some(alias)
        }
    }
}

fn append_all_columns(
    arena: &DescriptorArena,
    wrapper: &mut TableDescriptor,
    source: TableId,
    renames: &mut AliasPositions<'_>,
) {
    let columns: Vec<String> = arena.get(source).columns.keys().cloned().collect();
    for column in columns {
        let alias = renames.take().unwrap_or(&column).to_string();
        wrapper
            .columns
            .insert(alias, ColumnOrigin { column, source });
    }
}

/// Append one target-list entry when it is a column reference; anything
/// else carries no table identity and is skipped without consuming an
/// alias position.
fn append_column_expr(
    arena: &DescriptorArena,
    wrapper: &mut TableDescriptor,
    expr: &Expr,
    explicit_alias: Option<&str>,
    inner: &ScopeMap,
    renames: &mut AliasPositions<'_>,
) {
    let (source, column) = match expr {
        Expr::CompoundIdentifier(parts) if parts.len() == 2 => {
            match inner.get(parts[0].value.as_str()) {
                Some(&id) if arena.get(id).columns.contains_key(parts[1].value.as_str()) => {
                    (id, parts[1].value.clone())
                }
                _ => return,
            }
        }
        Expr::Identifier(ident) => {
            let Some(&id) = inner
                .values()
                .find(|&&id| arena.get(id).columns.contains_key(ident.value.as_str()))
            else {
                return;
            };
            (id, ident.value.clone())
        }
        _ => return,
    };

    let alias = renames
        .take()
        .map(str::to_string)
        .or_else(|| explicit_alias.map(str::to_string))
        .unwrap_or_else(|| column.clone());
    wrapper
        .columns
        .insert(alias, ColumnOrigin { column, source });
}

/// Rename a descriptor's exposed columns positionally, as in
/// `table AS t (a, b)`. Surplus columns keep their names; surplus aliases
/// are ignored.
pub fn rename_columns(arena: &mut DescriptorArena, id: TableId, aliases: &[String]) {
    if aliases.is_empty() {
        return;
    }
    let old = std::mem::take(&mut arena.get_mut(id).columns);
    let mut renamed = IndexMap::new();
    for (position, (key, origin)) in old.into_iter().enumerate() {
        let name = aliases
            .get(position)
            .filter(|alias| !alias.is_empty())
            .cloned()
            .unwrap_or(key);
        renamed.insert(name, origin);
    }
    arena.get_mut(id).columns = renamed;
}

/// Last identifier of a possibly schema-qualified name
pub fn last_ident(name: &ObjectName) -> Option<&str> {
    name.0.last().map(|ident| ident.value.as_str())
}

/// Alias name and column list of a `TableAlias` node
pub fn alias_parts(alias: &TableAlias) -> (String, Vec<String>) {
    (
        alias.name.value.clone(),
        alias.columns.iter().map(|c| c.value.clone()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UniversityCatalog;
    use sqlparser::ast::Ident;

    fn arena_with_student() -> (DescriptorArena, UniversityCatalog, TableId) {
        let catalog = UniversityCatalog::new();
        let mut arena = DescriptorArena::new();
        let id = arena.database_table(&catalog, Role::Student, "student", Some("s"));
        (arena, catalog, id)
    }

    #[test]
    fn test_private_table_born_pending() {
        let (arena, _, id) = arena_with_student();
        let desc = arena.get(id);
        assert!(desc.is_database);
        assert_eq!(desc.alias, "s");
        assert!(!desc.is_resolved());
        assert_eq!(desc.pending.get("s"), Some(&id));
    }

    #[test]
    fn test_public_table_born_resolved() {
        let catalog = UniversityCatalog::new();
        let mut arena = DescriptorArena::new();
        let id = arena.database_table(&catalog, Role::Student, "course", None);
        assert!(arena.get(id).is_resolved());
        assert_eq!(arena.get(id).alias, "course");
    }

    #[test]
    fn test_auth_column_overrides_public_set() {
        // course_class is public, but professors are pinned to their own
        // classes by the authorization map.
        let catalog = UniversityCatalog::new();
        let mut arena = DescriptorArena::new();
        let for_student = arena.database_table(&catalog, Role::Student, "course_class", None);
        let for_professor = arena.database_table(&catalog, Role::Professor, "course_class", None);
        assert!(arena.get(for_student).is_resolved());
        assert!(!arena.get(for_professor).is_resolved());
    }

    #[test]
    fn test_clone_isolates_pending_state() {
        let (mut arena, _, id) = arena_with_student();
        let mut scope = ScopeMap::new();
        scope.insert("s".to_string(), id);

        let cloned = arena.clone_scope(&scope);
        let clone_id = *cloned.get("s").unwrap();
        arena.get_mut(clone_id).pending.clear();

        assert!(arena.get(clone_id).is_resolved());
        assert!(!arena.get(id).is_resolved());
    }

    #[test]
    fn test_resolve_column_on_database_table() {
        let (arena, _, id) = arena_with_student();
        let (owner, column) = arena.resolve_column(id, "id").unwrap();
        assert_eq!(owner, id);
        assert_eq!(column, "id");
        assert!(arena.resolve_column(id, "no_such_column").is_none());
    }

    #[test]
    fn test_virtual_scope_star_keeps_order_and_lineage() {
        let (mut arena, _, id) = arena_with_student();
        let mut inner = ScopeMap::new();
        inner.insert("s".to_string(), id);

        let scope = virtual_scope(&mut arena, "v", &[], None, &inner);
        let wrapper = *scope.get("v").unwrap();

        let aliases: Vec<&String> = arena.get(wrapper).columns.keys().collect();
        assert_eq!(aliases, ["id", "name", "email", "administrative_class_id"]);

        // Lineage passes through the wrapper to the base table
        let (owner, column) = arena.resolve_column(wrapper, "email").unwrap();
        assert_eq!(owner, id);
        assert_eq!(column, "email");

        // Wrapper inherits the pending entry
        assert!(!arena.get(wrapper).is_resolved());
    }

    #[test]
    fn test_virtual_scope_positional_aliases_truncate() {
        let (mut arena, _, id) = arena_with_student();
        let mut inner = ScopeMap::new();
        inner.insert("s".to_string(), id);

        let names = vec!["a".to_string(), "b".to_string()];
        let scope = virtual_scope(&mut arena, "v", &names, None, &inner);
        let wrapper = *scope.get("v").unwrap();

        let aliases: Vec<&String> = arena.get(wrapper).columns.keys().collect();
        assert_eq!(aliases, ["a", "b", "email", "administrative_class_id"]);

        let (_, column) = arena.resolve_column(wrapper, "a").unwrap();
        assert_eq!(column, "id");
    }

    #[test]
    fn test_virtual_scope_single_column_target() {
        let (mut arena, _, id) = arena_with_student();
        let mut inner = ScopeMap::new();
        inner.insert("s".to_string(), id);

        // SELECT s.id AS sid FROM ... wrapped under alias v
        let targets = vec![SelectItem::ExprWithAlias {
            expr: Expr::CompoundIdentifier(vec![Ident::new("s"), Ident::new("id")]),
            alias: Ident::new("sid"),
        }];
        let scope = virtual_scope(&mut arena, "v", &[], Some(&targets), &inner);
        let wrapper = *scope.get("v").unwrap();

        assert_eq!(arena.get(wrapper).columns.len(), 1);
        let (owner, column) = arena.resolve_column(wrapper, "sid").unwrap();
        assert_eq!(owner, id);
        assert_eq!(column, "id");
    }

    #[test]
    fn test_unresolved_tables_order_and_dedup() {
        let catalog = UniversityCatalog::new();
        let mut arena = DescriptorArena::new();
        let professor = arena.database_table(&catalog, Role::Student, "professor", Some("p"));
        let s1 = arena.database_table(&catalog, Role::Student, "student", Some("a"));
        let s2 = arena.database_table(&catalog, Role::Student, "student", Some("b"));

        let mut scope = ScopeMap::new();
        scope.insert("p".to_string(), professor);
        scope.insert("a".to_string(), s1);
        scope.insert("b".to_string(), s2);

        assert_eq!(arena.unresolved_tables(&scope), ["professor", "student"]);
    }
}
