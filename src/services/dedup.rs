// src/services/dedup.rs

//! Snapshot of known problem identities.

use std::collections::{HashMap, HashSet};

use crate::models::{Problem, ProblemKey, ProblemListing};

/// `source -> (id -> Problem)` view of the repository, rebuilt once per sweep.
#[derive(Debug, Default, Clone)]
pub struct DedupCache {
    by_source: HashMap<String, HashMap<String, Problem>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from a full repository scan.
    pub fn from_problems(problems: impl IntoIterator<Item = Problem>) -> Self {
        let mut cache = Self::new();
        cache.rebuild(problems);
        cache
    }

    /// Discard the current view and index `problems` from scratch.
    pub fn rebuild(&mut self, problems: impl IntoIterator<Item = Problem>) {
        self.by_source.clear();
        for problem in problems {
            self.by_source
                .entry(problem.source.clone())
                .or_default()
                .insert(problem.id.clone(), problem);
        }
    }

    pub fn contains(&self, source: &str, id: &str) -> bool {
        self.by_source
            .get(source)
            .is_some_and(|problems| problems.contains_key(id))
    }

    pub fn get(&self, source: &str, id: &str) -> Option<&Problem> {
        self.by_source.get(source).and_then(|problems| problems.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cached problem, in no particular order.
    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.by_source.values().flat_map(HashMap::values)
    }

    /// Keep only listings whose identity is unknown, also collapsing
    /// duplicates within the listings themselves (first one wins).
    pub fn filter_new(&self, listings: impl IntoIterator<Item = ProblemListing>) -> Vec<Problem> {
        let mut seen: HashSet<ProblemKey> = HashSet::new();
        listings
            .into_iter()
            .filter(|listing| !self.contains(&listing.source, &listing.id))
            .filter(|listing| seen.insert(listing.key()))
            .map(Problem::from)
            .collect()
    }
}
