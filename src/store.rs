use std::collections::HashSet;

use crate::models::PlaceCandidate;

/// Insertion-ordered set of candidates, deduplicated by place id
#[derive(Debug, Default)]
pub struct RecordStore {
    seen: HashSet<String>,
    candidates: Vec<PlaceCandidate>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `candidate` unless its id was already accepted.
    ///
    /// Returns `true` when the candidate was new.
    pub fn add(&mut self, candidate: PlaceCandidate) -> bool {
        if self.seen.contains(&candidate.id) {
            return false;
        }
        self.seen.insert(candidate.id.clone());
        self.candidates.push(candidate);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn all(&self) -> &[PlaceCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn into_vec(self) -> Vec<PlaceCandidate> {
        self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_occurrence_in_insertion_order() {
        let mut store = RecordStore::new();

        assert!(store.add(PlaceCandidate::sample("a")));
        assert!(!store.add(PlaceCandidate::sample("a")));
        assert!(store.add(PlaceCandidate::sample("b")));

        let ids: Vec<&str> = store.all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn size_matches_distinct_ids() {
        let ids = ["x", "y", "x", "z", "y", "y", "w", "x"];
        let mut store = RecordStore::new();

        for id in ids {
            let was_seen = store.contains(id);
            assert_eq!(store.add(PlaceCandidate::sample(id)), !was_seen);
        }

        let distinct: HashSet<&str> = ids.into_iter().collect();
        assert_eq!(store.len(), distinct.len());
    }

    #[test]
    fn duplicate_keeps_original_record() {
        let mut store = RecordStore::new();
        let mut first = PlaceCandidate::sample("a");
        first.city = "Львів".to_string();
        store.add(first);
        store.add(PlaceCandidate::sample("a"));

        assert_eq!(store.all()[0].city, "Львів");
    }
}
