//! Stable 32-bit identities derived from entity names.
//!
//! IDs are FNV-1a over the UTF-8 bytes of the normalized name (trimmed,
//! lower-cased). Persisted data depends on this exact function; changing
//! the hash family or the normalization silently forks the ID space.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use crate::types::{StableId, SENTINEL_ID};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Upper bound on perturbation attempts. Exhausting it would need ~2^32
/// occupied slots, so reaching it indicates a broken `taken` predicate.
const MAX_ATTEMPTS: u32 = 1 << 20;

pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Pure, deterministic ID for a name.
pub fn stable_id(name: &str) -> StableId {
    fnv1a(normalize(name).as_bytes())
}

/// Key used for chunk identities: `<source path>#<chunk index>`.
pub fn chunk_key(source_path: &str, chunk_index: u32) -> String {
    format!("{source_path}#{chunk_index}")
}

fn variant(normalized: &str, attempt: u32) -> StableId {
    fnv1a(format!("{normalized}#{attempt}").as_bytes())
}

fn first_free(normalized: &str, is_taken: impl Fn(StableId) -> bool) -> StableId {
    let base = fnv1a(normalized.as_bytes());
    if base != SENTINEL_ID && !is_taken(base) {
        return base;
    }
    let mut attempt = 1;
    loop {
        let candidate = variant(normalized, attempt);
        if candidate != SENTINEL_ID && !is_taken(candidate) {
            return candidate;
        }
        if attempt >= MAX_ATTEMPTS {
            warn!(name = %normalized, attempts = MAX_ATTEMPTS, id = candidate, "no free stable id; last candidate may collide");
            return candidate;
        }
        attempt += 1;
    }
}

/// Collision-avoiding ID against a set of IDs already owned by *other* names.
///
/// Every member of `taken` is treated as belonging to a different name; use
/// [`IdAllocator`] when the set may contain this name's own ID.
pub fn stable_id_avoiding(name: &str, taken: &HashSet<StableId>) -> StableId {
    let normalized = normalize(name);
    let id = first_free(&normalized, |id| taken.contains(&id));
    if id != fnv1a(normalized.as_bytes()) {
        warn!(name = %normalized, assigned = id, "stable id collision resolved by perturbation");
    }
    id
}

/// A resolved collision, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCollision {
    pub name: String,
    pub existing: String,
    pub base: StableId,
    pub assigned: StableId,
}

impl From<&IdCollision> for crate::Error {
    fn from(c: &IdCollision) -> Self {
        crate::Error::IdCollision {
            name: c.name.clone(),
            existing: c.existing.clone(),
            base: c.base,
            assigned: c.assigned,
        }
    }
}

/// Assigns IDs to names while remembering which name owns which ID.
///
/// Assignment order is part of the contract: [`IdAllocator::assign_all`]
/// sorts normalized names lexicographically so a rebuild reproduces the
/// same IDs for the same vocabulary.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    owners: HashMap<StableId, String>,
    by_name: HashMap<String, StableId>,
    collisions: Vec<IdCollision>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing `(id, name)` ownership, e.g. from a persisted table.
    pub fn with_existing<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = (StableId, S)>,
        S: AsRef<str>,
    {
        let mut alloc = Self::new();
        for (id, name) in existing {
            let normalized = normalize(name.as_ref());
            alloc.by_name.insert(normalized.clone(), id);
            alloc.owners.insert(id, normalized);
        }
        alloc
    }

    pub fn assign(&mut self, name: &str) -> StableId {
        let normalized = normalize(name);
        if let Some(id) = self.by_name.get(&normalized) {
            return *id;
        }
        let base = fnv1a(normalized.as_bytes());
        let id = first_free(&normalized, |id| self.owners.contains_key(&id));
        if id != base {
            let existing = self.owners.get(&base).cloned().unwrap_or_default();
            let collision = IdCollision {
                name: normalized.clone(),
                existing,
                base,
                assigned: id,
            };
            warn!(
                name = %collision.name,
                existing = %collision.existing,
                base = collision.base,
                assigned = collision.assigned,
                "stable id collision"
            );
            self.collisions.push(collision);
        }
        self.owners.insert(id, normalized.clone());
        self.by_name.insert(normalized, id);
        id
    }

    /// Assign a batch in lexicographic order of normalized names.
    pub fn assign_all<'a, I>(&mut self, names: I) -> HashMap<String, StableId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ordered: BTreeSet<String> = names.into_iter().map(normalize).collect();
        ordered
            .into_iter()
            .map(|n| {
                let id = self.assign(&n);
                (n, id)
            })
            .collect()
    }

    pub fn owner(&self, id: StableId) -> Option<&str> {
        self.owners.get(&id).map(String::as_str)
    }

    pub fn collisions(&self) -> &[IdCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_search_stops_at_the_attempt_bound() {
        let id = first_free("observer", |_| true);
        assert_eq!(id, variant("observer", MAX_ATTEMPTS));
    }

    #[test]
    fn fnv1a_reference_vectors() {
        // Published FNV-1a 32-bit test vectors.
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn normalization_folds_case_and_whitespace() {
        assert_eq!(stable_id("  Clean Code "), stable_id("clean code"));
        assert_ne!(stable_id("clean code"), stable_id("clean  code"));
    }

    #[test]
    fn deterministic_across_calls() {
        for name in ["dependency injection", "Öffentlichkeit", "", "a#1"] {
            assert_eq!(stable_id(name), stable_id(name));
        }
    }

    #[test]
    fn avoiding_returns_base_when_free() {
        let taken = HashSet::from([1, 2, 3]);
        assert_eq!(stable_id_avoiding("observer", &taken), stable_id("observer"));
    }

    #[test]
    fn avoiding_perturbs_on_foreign_owner() {
        let x = stable_id("Clean Architecture");
        let taken = HashSet::from([x]);
        let first = stable_id_avoiding("Clean Architecture", &taken);
        let second = stable_id_avoiding("Clean Architecture", &taken);
        assert_ne!(first, x);
        assert_eq!(first, second);
        assert_eq!(first, variant("clean architecture", 1));
    }

    #[test]
    fn allocator_resolves_collision_against_different_name() {
        let x = stable_id("Clean Architecture");
        let mut alloc = IdAllocator::with_existing([(x, "Clean Code")]);
        let id = alloc.assign("Clean Architecture");
        assert_ne!(id, x);
        assert_eq!(alloc.assign("clean architecture"), id);
        assert_eq!(alloc.collisions().len(), 1);
        assert_eq!(alloc.collisions()[0].existing, "clean code");
        assert_eq!(alloc.owner(id), Some("clean architecture"));
    }

    #[test]
    fn allocator_keeps_own_id_without_collision() {
        let x = stable_id("observer pattern");
        let mut alloc = IdAllocator::with_existing([(x, "Observer Pattern")]);
        assert_eq!(alloc.assign("observer pattern"), x);
        assert!(alloc.collisions().is_empty());
    }

    #[test]
    fn assign_all_is_order_independent() {
        let names = ["zeta", "alpha", "Mid", "alpha "];
        let mut a = IdAllocator::new();
        let mut b = IdAllocator::new();
        let ids_a = a.assign_all(names.iter().copied());
        let ids_b = b.assign_all(names.iter().rev().copied());
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a.len(), 3);
    }

    #[test]
    fn sentinel_is_never_assigned() {
        let taken = HashSet::new();
        for i in 0..1000 {
            assert_ne!(stable_id_avoiding(&format!("term {i}"), &taken), SENTINEL_ID);
        }
    }
}
