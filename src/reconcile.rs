//! Pure decision logic: which products to (re)publish, retract or autopost.
//!
//! Every function here takes a catalog snapshot and returns product ids; none
//! of them touch the store or the channel.

use crate::model::CatalogEntry;

/// Which product attribute a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Category,
    Name,
}

/// A case-insensitive substring test against one field.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub field: Field,
    pub needle: &'static str,
}

/// Products matching any of `matchers` get `class`. Lower classes post first.
#[derive(Debug, Clone, Copy)]
pub struct PriorityRule {
    pub label: &'static str,
    pub class: u8,
    pub matchers: &'static [Matcher],
}

pub const FALLBACK_CLASS: u8 = 99;

const fn category(needle: &'static str) -> Matcher {
    Matcher {
        field: Field::Category,
        needle,
    }
}

const fn name(needle: &'static str) -> Matcher {
    Matcher {
        field: Field::Name,
        needle,
    }
}

/// Evaluated top to bottom; the first rule that matches wins.
pub const PRIORITY_RULES: &[PriorityRule] = &[
    PriorityRule {
        label: "backpacks",
        class: 1,
        matchers: &[category("каталог/рюкзаки"), name("рюкзак")],
    },
    PriorityRule {
        label: "shoulder bags",
        class: 2,
        matchers: &[category("каталог/плечевые сумки"), name("сумка")],
    },
    PriorityRule {
        label: "luggage",
        class: 3,
        matchers: &[
            category("каталог/багаж"),
            name("чемодан"),
            category("ручная кладь"),
        ],
    },
];

/// Priority class of a product under `rules`.
pub fn priority_class(rules: &[PriorityRule], name: Option<&str>, category: Option<&str>) -> u8 {
    let name = name.unwrap_or_default().to_lowercase();
    let category = category.unwrap_or_default().to_lowercase();
    rules
        .iter()
        .find(|rule| {
            rule.matchers.iter().any(|m| {
                let haystack = match m.field {
                    Field::Category => &category,
                    Field::Name => &name,
                };
                haystack.contains(m.needle)
            })
        })
        .map(|rule| rule.class)
        .unwrap_or(FALLBACK_CLASS)
}

/// Visible, flagged for republish, and in stock.
pub fn is_update_eligible(entry: &CatalogEntry) -> bool {
    entry.visible && entry.needs_update && entry.stock.is_some_and(|s| s > 0)
}

/// Visible, depleted or unknown stock, and still posted.
pub fn is_retraction_eligible(entry: &CatalogEntry) -> bool {
    entry.visible && entry.stock.map_or(true, |s| s == 0) && entry.is_posted()
}

/// Visible, enough stock, and never posted (or fully retracted).
pub fn is_autopost_eligible(entry: &CatalogEntry, min_stock: i64) -> bool {
    entry.visible && entry.stock.is_some_and(|s| s >= min_stock) && !entry.is_posted()
}

/// Products to (re)publish, in snapshot order.
pub fn update_set(snapshot: &[CatalogEntry]) -> Vec<i64> {
    snapshot
        .iter()
        .filter(|e| is_update_eligible(e))
        .map(|e| e.id)
        .collect()
}

/// Products whose posts must be removed.
pub fn retraction_set(snapshot: &[CatalogEntry]) -> Vec<i64> {
    snapshot
        .iter()
        .filter(|e| is_retraction_eligible(e))
        .map(|e| e.id)
        .collect()
}

/// Up to `batch_size` never-posted products ordered by [`PRIORITY_RULES`].
/// Ties keep snapshot order.
pub fn autopost_candidates(snapshot: &[CatalogEntry], min_stock: i64, batch_size: usize) -> Vec<i64> {
    autopost_candidates_with(PRIORITY_RULES, snapshot, min_stock, batch_size)
}

pub fn autopost_candidates_with(
    rules: &[PriorityRule],
    snapshot: &[CatalogEntry],
    min_stock: i64,
    batch_size: usize,
) -> Vec<i64> {
    let mut ranked: Vec<(u8, i64)> = snapshot
        .iter()
        .filter(|e| is_autopost_eligible(e, min_stock))
        .map(|e| {
            (
                priority_class(rules, e.name.as_deref(), e.category.as_deref()),
                e.id,
            )
        })
        .collect();
    // stable: equal classes stay in read order
    ranked.sort_by_key(|(class, _)| *class);
    ranked.into_iter().take(batch_size).map(|(_, id)| id).collect()
}
