//! Structured predicate filtering.
//!
//! Each predicate is a pure conjunctive test on its own field, so the
//! order they are applied in never changes the result. Matched records
//! keep their relative order. Inverted ranges match nothing rather than
//! erroring.

use crate::{
    search::search,
    transaction::{FilterOptions, Transaction},
};

pub fn filter(records: &[Transaction], options: &FilterOptions) -> Vec<Transaction> {
    records
        .iter()
        .filter(|t| matches(t, options))
        .cloned()
        .collect()
}

/// True when `t` satisfies every active predicate in `options`.
/// The embedded search term is not consulted here; see [`apply_filters`].
pub fn matches(t: &Transaction, options: &FilterOptions) -> bool {
    if let Some(kind) = options.txn_type {
        if t.txn_type != kind {
            return false;
        }
    }
    if let Some(category) = options.category_constraint() {
        if t.category != category {
            return false;
        }
    }
    if let Some(status) = options.status {
        if t.status != status {
            return false;
        }
    }
    if let Some(range) = &options.date_range {
        if t.timestamp < range.start || t.timestamp > range.end {
            return false;
        }
    }
    if let Some(range) = &options.amount_range {
        if t.amount < range.min || t.amount > range.max {
            return false;
        }
    }
    true
}

/// Narrow by `search_term` first, then by the structured predicates.
pub fn apply_filters(
    records: &[Transaction],
    options: &FilterOptions,
    search_term: &str,
) -> Vec<Transaction> {
    if search_term.trim().is_empty() {
        return filter(records, options);
    }
    filter(&search(records, search_term), options)
}
