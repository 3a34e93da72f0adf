#![forbid(unsafe_code)]

//! Selection and expansion tracking.
//!
//! Both are plain [`IdSet`]s keyed by row id, so they survive filtering,
//! sorting, and pagination untouched. Membership is absence-means-false.
//! Every mutation here is a pure function returning a new set.
//!
//! Queries scoped to a row population ("all selected on this page", "some
//! selected among the filtered rows") intersect the set with that population
//! instead of looking at the raw set, so rows hidden by a filter stay selected
//! without affecting the answer.

use std::collections::HashSet;

use tabula_core::IdSet;

/// Row population targeted by select-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectAllScope {
    /// Every row matching the current filters, across all pages.
    Filtered,
    /// Rows on the current page only.
    Page,
}

/// Flip one id.
#[must_use]
pub fn toggle(set: &IdSet, id: &str) -> IdSet {
    let mut next = set.clone();
    if !next.remove(id) {
        next.insert(id);
    }
    next
}

/// Set one id explicitly.
#[must_use]
pub fn set_selected(set: &IdSet, id: &str, value: bool) -> IdSet {
    let mut next = set.clone();
    if value {
        next.insert(id);
    } else {
        next.remove(id);
    }
    next
}

/// Single-selection variant: selecting an id deselects every other id.
#[must_use]
pub fn set_selected_single(set: &IdSet, id: &str, value: bool) -> IdSet {
    if value {
        std::iter::once(id).collect()
    } else {
        set_selected(set, id, false)
    }
}

/// Add or remove every id of a population.
#[must_use]
pub fn toggle_all<'a>(set: &IdSet, ids: impl IntoIterator<Item = &'a str>, value: bool) -> IdSet {
    let mut next = set.clone();
    for id in ids {
        if value {
            next.insert(id);
        } else {
            next.remove(id);
        }
    }
    next
}

#[must_use]
pub fn is_selected(set: &IdSet, id: &str) -> bool {
    set.contains(id)
}

/// Every id of a non-empty population is in the set.
#[must_use]
pub fn is_all_selected<'a>(set: &IdSet, ids: impl IntoIterator<Item = &'a str>) -> bool {
    let mut any = false;
    for id in ids {
        any = true;
        if !set.contains(id) {
            return false;
        }
    }
    any
}

/// At least one id of the population is in the set.
#[must_use]
pub fn is_some_selected<'a>(set: &IdSet, ids: impl IntoIterator<Item = &'a str>) -> bool {
    ids.into_iter().any(|id| set.contains(id))
}

/// Number of ids of the population in the set.
#[must_use]
pub fn selected_count<'a>(set: &IdSet, ids: impl IntoIterator<Item = &'a str>) -> usize {
    ids.into_iter().filter(|id| set.contains(id)).count()
}

/// Drop ids that are no longer in the universe. Returns the pruned set and
/// the number of ids removed.
#[must_use]
pub fn prune<'a>(set: &IdSet, universe: impl IntoIterator<Item = &'a str>) -> (IdSet, usize) {
    let universe: HashSet<&str> = universe.into_iter().collect();
    let mut next = set.clone();
    next.retain(|id| universe.contains(id));
    let removed = set.len() - next.len();
    (next, removed)
}

/// Expand every listed group.
#[must_use]
pub fn expand_all<'a>(set: &IdSet, group_ids: impl IntoIterator<Item = &'a str>) -> IdSet {
    toggle_all(set, group_ids, true)
}

/// Collapse everything.
#[must_use]
pub fn collapse_all() -> IdSet {
    IdSet::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> IdSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn toggle_and_set_are_pure() {
        let empty = IdSet::new();
        let one = toggle(&empty, "a");
        assert!(empty.is_empty());
        assert!(is_selected(&one, "a"));
        assert!(!is_selected(&toggle(&one, "a"), "a"));
        assert_eq!(set_selected(&one, "a", true), one);
        assert!(set_selected(&one, "a", false).is_empty());
    }

    #[test]
    fn single_selection_replaces() {
        let s = set(&["a", "b"]);
        assert_eq!(set_selected_single(&s, "c", true), set(&["c"]));
        assert_eq!(set_selected_single(&s, "a", false), set(&["b"]));
    }

    #[test]
    fn scoped_queries_intersect_with_population() {
        let s = set(&["1", "2", "9"]);
        assert!(is_all_selected(&s, ["1", "2"]));
        assert!(!is_all_selected(&s, ["1", "3"]));
        assert!(!is_all_selected(&s, std::iter::empty()));
        assert!(is_some_selected(&s, ["3", "2"]));
        assert!(!is_some_selected(&s, ["3", "4"]));
        assert_eq!(selected_count(&s, ["1", "3", "9"]), 2);
    }

    #[test]
    fn toggle_all_only_touches_the_population() {
        let s = set(&["x"]);
        let all = toggle_all(&s, ["1", "2"], true);
        assert_eq!(all, set(&["1", "2", "x"]));
        assert_eq!(toggle_all(&all, ["1", "2"], false), set(&["x"]));
    }

    #[test]
    fn prune_drops_stale_ids_only() {
        let (pruned, removed) = prune(&set(&["1", "2", "gone"]), ["1", "2", "3"]);
        assert_eq!(pruned, set(&["1", "2"]));
        assert_eq!(removed, 1);
    }

    #[test]
    fn expansion_helpers() {
        let e = expand_all(&IdSet::new(), ["g:a", "g:b"]);
        assert_eq!(e.len(), 2);
        assert!(collapse_all().is_empty());
    }
}
