//! Left-join of enrichment results onto base rows.
//!
//! Every base row survives a merge. Rows without a matching enrichment are
//! handed `None` so the caller can reset their enrichment columns. Because
//! `attach` replaces rather than accumulates, merging the same batch twice
//! leaves the rows exactly as a single merge did.

use std::collections::HashMap;
use std::hash::Hash;

/// Legal-form suffixes removed before comparing company names.
const LEGAL_SUFFIXES: &[&str] = &[
    " DESIGNATED ACTIVITY COMPANY",
    " LIMITED",
    " LTD",
    " DAC",
    " PLC",
    " INC",
];

/// Join key for company names from different sources.
///
/// Uppercases, collapses whitespace and strips trailing legal-form tokens.
/// Total: every input maps to exactly one key.
pub fn normalize_name(name: &str) -> String {
    let mut key = name
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    while let Some(suffix) = LEGAL_SUFFIXES.iter().find(|s| key.ends_with(**s)) {
        key.truncate(key.len() - suffix.len());
    }
    key
}

/// Index `items` by key. On duplicate keys the first item wins.
pub fn index_by<K, T, F>(items: &[T], key: F) -> HashMap<K, &T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        index.entry(key(item)).or_insert(item);
    }
    index
}

/// Left-join `enrichment` onto `base`.
///
/// `attach` runs once per base row with the matching enrichment, or `None`.
/// Returns the number of matched rows.
pub fn left_join<B, E, K, FB, FE, A>(
    base: &mut [B],
    enrichment: &[E],
    base_key: FB,
    enrich_key: FE,
    mut attach: A,
) -> usize
where
    K: Eq + Hash,
    FB: Fn(&B) -> K,
    FE: Fn(&E) -> K,
    A: FnMut(&mut B, Option<&E>),
{
    let index = index_by(enrichment, enrich_key);
    let mut matched = 0;
    for row in base.iter_mut() {
        let hit = index.get(&base_key(row)).copied();
        if hit.is_some() {
            matched += 1;
        }
        attach(row, hit);
    }
    matched
}

/// Group `items` by key, keeping groups in first-seen order and items in
/// input order within each group.
pub fn group_by_key<K, T, F>(items: Vec<T>, key: F) -> Vec<(K, Vec<T>)>
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for item in items {
        let k = key(&item);
        match slots.get(&k) {
            Some(&slot) => groups[slot].1.push(item),
            None => {
                slots.insert(k.clone(), groups.len());
                groups.push((k, vec![item]));
            }
        }
    }
    groups
}
