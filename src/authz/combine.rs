//! Obligation set algebra
//!
//! Sibling branches of a query each produce a scope whose descriptors carry
//! the tables still awaiting an identity predicate. These combinators
//! reconcile those sets: disjunctive composition (OR, UNION) keeps an
//! obligation unless every branch cleared it, conjunctive composition
//! (AND, INTERSECT, inner joins) drops an obligation as soon as one branch
//! cleared it. A branch whose scope no longer contains an alias counts as
//! having cleared everything under that alias.

use std::collections::HashSet;

use super::descriptor::{DescriptorArena, ScopeMap, TableId};

/// Combine AND branches: a pending entry survives only if it survives in
/// every branch
pub fn intersect_branches(
    arena: &mut DescriptorArena,
    base: &ScopeMap,
    branches: &[ScopeMap],
) -> ScopeMap {
    combine_branches(arena, base, branches, |retained_in| {
        retained_in == branches.len()
    })
}

/// Combine OR branches: a pending entry survives if any branch still
/// carries it
pub fn union_branches(
    arena: &mut DescriptorArena,
    base: &ScopeMap,
    branches: &[ScopeMap],
) -> ScopeMap {
    combine_branches(arena, base, branches, |retained_in| retained_in > 0)
}

fn combine_branches(
    arena: &mut DescriptorArena,
    base: &ScopeMap,
    branches: &[ScopeMap],
    survives: impl Fn(usize) -> bool,
) -> ScopeMap {
    let result = arena.clone_scope(base);
    for (alias, &id) in &result {
        let keys: Vec<String> = arena.get(id).pending.keys().cloned().collect();
        let mut dropped: Vec<String> = Vec::new();
        for key in keys {
            let retained_in = branches
                .iter()
                .filter(|branch| {
                    branch
                        .get(alias)
                        .is_some_and(|&bid| arena.get(bid).pending.contains_key(&key))
                })
                .count();
            if !survives(retained_in) {
                dropped.push(key);
            }
        }
        for key in dropped {
            arena.get_mut(id).pending.shift_remove(&key);
        }
    }
    result
}

/// Merge the two sides of a UNION: the scope is the union of both sides
/// and, per alias, pending sets combine by union (both sides must clear an
/// obligation for it to vanish)
pub fn union_sides(arena: &mut DescriptorArena, left: ScopeMap, right: ScopeMap) -> ScopeMap {
    let mut result = left;
    for (alias, rid) in right {
        match result.get(&alias).copied() {
            Some(lid) => {
                let extra: Vec<(String, TableId)> = arena
                    .get(rid)
                    .pending
                    .iter()
                    .filter(|(key, _)| !arena.get(lid).pending.contains_key(key.as_str()))
                    .map(|(key, &id)| (key.clone(), id))
                    .collect();
                arena.get_mut(lid).pending.extend(extra);
            }
            None => {
                result.insert(alias, rid);
            }
        }
    }
    result
}

/// Merge the two sides of an INTERSECT: pending sets combine by
/// intersection, so clearing on either side is enough, and an alias absent
/// from one side counts as cleared there
pub fn intersect_sides(arena: &mut DescriptorArena, left: ScopeMap, right: ScopeMap) -> ScopeMap {
    let mut result = left;
    let entries: Vec<(String, TableId)> =
        result.iter().map(|(alias, &id)| (alias.clone(), id)).collect();
    for (alias, lid) in entries {
        let rid = right.get(&alias).copied();
        let dropped: Vec<String> = arena
            .get(lid)
            .pending
            .keys()
            .filter(|key| match rid {
                Some(rid) => !arena.get(rid).pending.contains_key(key.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        for key in dropped {
            arena.get_mut(lid).pending.shift_remove(&key);
        }
    }
    for (alias, rid) in right {
        if !result.contains_key(&alias) {
            arena.get_mut(rid).pending.clear();
            result.insert(alias, rid);
        }
    }
    result
}

/// Pre-clear obligations across an inner join, before its quals run.
///
/// An inner join composes conjunctively: per descriptor, a pending entry
/// survives only while the opposite side's total pending set still names
/// the same relation, so a filter applied to either occurrence of a table
/// clears the other.
pub fn prune_inner_join(arena: &mut DescriptorArena, left: &ScopeMap, right: &ScopeMap) {
    let left_names = pending_names(arena, left);
    let right_names = pending_names(arena, right);
    retain_named(arena, left, &right_names);
    retain_named(arena, right, &left_names);
}

/// Drop every obligation on each descriptor of a scope (outer-join side
/// whose rows cannot leak)
pub fn clear_side(arena: &mut DescriptorArena, scope: &ScopeMap) {
    for &id in scope.values() {
        arena.get_mut(id).pending.clear();
    }
}

fn pending_names(arena: &DescriptorArena, scope: &ScopeMap) -> HashSet<String> {
    scope
        .values()
        .flat_map(|&id| arena.get(id).pending.values())
        .map(|&pending_id| arena.name(pending_id).to_string())
        .collect()
}

fn retain_named(arena: &mut DescriptorArena, scope: &ScopeMap, keep: &HashSet<String>) {
    for &id in scope.values() {
        let dropped: Vec<String> = arena
            .get(id)
            .pending
            .iter()
            .filter(|(_, &pending_id)| !keep.contains(arena.name(pending_id)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in dropped {
            arena.get_mut(id).pending.shift_remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UniversityCatalog;
    use crate::user::Role;

    fn scope_of(arena: &mut DescriptorArena, tables: &[(&str, &str)]) -> ScopeMap {
        let catalog = UniversityCatalog::new();
        let mut scope = ScopeMap::new();
        for (name, alias) in tables {
            let id = arena.database_table(&catalog, Role::Student, name, Some(alias));
            scope.insert(alias.to_string(), id);
        }
        scope
    }

    fn clear(arena: &mut DescriptorArena, scope: &ScopeMap, alias: &str) {
        let id = *scope.get(alias).unwrap();
        arena.get_mut(id).pending.clear();
    }

    fn resolved(arena: &DescriptorArena, scope: &ScopeMap, alias: &str) -> bool {
        arena.get(*scope.get(alias).unwrap()).is_resolved()
    }

    #[test]
    fn test_intersect_branches_any_branch_clears() {
        let mut arena = DescriptorArena::new();
        let base = scope_of(&mut arena, &[("student", "s")]);

        let cleared = arena.clone_scope(&base);
        clear(&mut arena, &cleared, "s");
        let untouched = arena.clone_scope(&base);

        let combined = intersect_branches(&mut arena, &base, &[cleared, untouched]);
        assert!(resolved(&arena, &combined, "s"));
        // The base scope is untouched by branch combination
        assert!(!resolved(&arena, &base, "s"));
    }

    #[test]
    fn test_union_branches_every_branch_must_clear() {
        let mut arena = DescriptorArena::new();
        let base = scope_of(&mut arena, &[("student", "s")]);

        let cleared = arena.clone_scope(&base);
        clear(&mut arena, &cleared, "s");
        let untouched = arena.clone_scope(&base);

        let combined = union_branches(&mut arena, &base, &[cleared.clone(), untouched]);
        assert!(!resolved(&arena, &combined, "s"));

        let both = arena.clone_scope(&base);
        clear(&mut arena, &both, "s");
        let combined = union_branches(&mut arena, &base, &[cleared, both]);
        assert!(resolved(&arena, &combined, "s"));
    }

    #[test]
    fn test_branch_missing_alias_counts_as_cleared() {
        // A branch that replaced the scope entirely (a sublink result) no
        // longer carries the alias and counts as having cleared it there.
        let mut arena = DescriptorArena::new();
        let base = scope_of(&mut arena, &[("student", "s")]);
        let kept = arena.clone_scope(&base);
        let replaced = ScopeMap::new();

        let conjunctive =
            intersect_branches(&mut arena, &base, &[kept.clone(), replaced.clone()]);
        assert!(resolved(&arena, &conjunctive, "s"));

        let disjunctive = union_branches(&mut arena, &base, &[kept, replaced]);
        assert!(!resolved(&arena, &disjunctive, "s"));
    }

    #[test]
    fn test_union_sides_keeps_one_sided_obligations() {
        let mut arena = DescriptorArena::new();
        let left = scope_of(&mut arena, &[("student", "student")]);
        let right = scope_of(&mut arena, &[("course", "course")]);

        let merged = union_sides(&mut arena, left, right);
        assert!(!resolved(&arena, &merged, "student"));
        assert!(resolved(&arena, &merged, "course"));
    }

    #[test]
    fn test_union_sides_same_alias_needs_both_cleared() {
        let mut arena = DescriptorArena::new();
        let left = scope_of(&mut arena, &[("student", "student")]);
        let right = scope_of(&mut arena, &[("student", "student")]);
        clear(&mut arena, &right, "student");

        let merged = union_sides(&mut arena, left, right);
        assert!(!resolved(&arena, &merged, "student"));
    }

    #[test]
    fn test_intersect_sides_either_side_clears() {
        let mut arena = DescriptorArena::new();
        let left = scope_of(&mut arena, &[("student", "student")]);
        let right = scope_of(&mut arena, &[("student", "student")]);
        clear(&mut arena, &right, "student");

        let merged = intersect_sides(&mut arena, left, right);
        assert!(resolved(&arena, &merged, "student"));
    }

    #[test]
    fn test_intersect_sides_one_sided_alias_is_cleared() {
        let mut arena = DescriptorArena::new();
        let left = scope_of(&mut arena, &[("course", "course")]);
        let right = scope_of(&mut arena, &[("student", "student")]);

        let merged = intersect_sides(&mut arena, left, right);
        assert!(resolved(&arena, &merged, "course"));
        assert!(resolved(&arena, &merged, "student"));
    }

    #[test]
    fn test_prune_inner_join_drops_unmatched_relations() {
        let mut arena = DescriptorArena::new();
        let left = scope_of(&mut arena, &[("course", "c")]);
        let right = scope_of(&mut arena, &[("student", "s")]);

        prune_inner_join(&mut arena, &left, &right);
        assert!(resolved(&arena, &right, "s"));
    }

    #[test]
    fn test_prune_inner_join_keeps_shared_relations() {
        let mut arena = DescriptorArena::new();
        let left = scope_of(&mut arena, &[("student", "a")]);
        let right = scope_of(&mut arena, &[("student", "b")]);

        prune_inner_join(&mut arena, &left, &right);
        assert!(!resolved(&arena, &left, "a"));
        assert!(!resolved(&arena, &right, "b"));
    }
}
