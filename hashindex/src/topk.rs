//! Bounded list of the k smallest-key candidates seen so far.
//!
//! The query layer offers every `(key, id)` visited during a leaf scan to a
//! [`MinKList`]. Once the list is full, [`MinKList::max_key`] is the current
//! search radius and only strictly smaller keys change the list.
//!
//! # Invariants
//!
//! - `len() <= k()`
//! - entries are sorted ascending by key

use crate::candidate::Candidate;

/// Key returned for slots that are not populated ("no bound yet").
pub const NO_KEY: f32 = f32::MAX;

/// Id returned for slots that are not populated.
pub const NO_ID: i32 = i32::MIN;

/// Keeps the `k` smallest keys and their ids, sorted ascending.
#[derive(Debug, Clone)]
pub struct MinKList {
    k: usize,
    list: Vec<Candidate>,
}

impl MinKList {
    /// Create an empty list that holds at most `k` entries.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    #[must_use]
    pub fn new(k: usize) -> Self {
        assert!(k > 0, "top-k list capacity must be positive");
        Self {
            k,
            list: Vec::with_capacity(k),
        }
    }

    /// Offer a candidate to the list.
    ///
    /// Returns the list's maximum key after the insertion, or [`NO_KEY`] if
    /// the list is not full yet. Inserting a key `>=` the current maximum of
    /// a full list leaves the list unchanged. NaN keys cannot be ordered and
    /// are ignored.
    pub fn insert(&mut self, key: f32, id: i32) -> f32 {
        if key.is_nan() {
            return self.max_key();
        }

        if self.is_full() {
            if key >= self.max_key() {
                return self.max_key();
            }
            self.list.pop();
        }

        // Upper bound: equal keys keep their arrival order.
        let pos = self.list.partition_point(|c| c.key <= key);
        self.list.insert(pos, Candidate::new(key, id));

        self.max_key()
    }

    /// Clear the list for reuse without releasing its storage.
    pub fn reset(&mut self) {
        self.list.clear();
    }

    /// Smallest key, or [`NO_KEY`] if empty.
    #[must_use]
    pub fn min_key(&self) -> f32 {
        self.list.first().map_or(NO_KEY, |c| c.key)
    }

    /// Largest key once the list is full, [`NO_KEY`] before that.
    #[must_use]
    pub fn max_key(&self) -> f32 {
        if self.is_full() {
            self.list.last().map_or(NO_KEY, |c| c.key)
        } else {
            NO_KEY
        }
    }

    /// Key of the `i`-th smallest entry, or [`NO_KEY`] past the end.
    #[must_use]
    pub fn ith_key(&self, i: usize) -> f32 {
        self.list.get(i).map_or(NO_KEY, |c| c.key)
    }

    /// Id of the `i`-th smallest entry, or [`NO_ID`] past the end.
    #[must_use]
    pub fn ith_id(&self, i: usize) -> i32 {
        self.list.get(i).map_or(NO_ID, |c| c.id)
    }

    /// Number of entries held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// Whether `k` entries are held.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.list.len() >= self.k
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.list.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Candidate] {
        &self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_example_sequence() {
        // ids stand in for "a".."e"
        let mut list = MinKList::new(3);

        assert!((list.insert(5.0, 0) - NO_KEY).abs() < f32::EPSILON);
        assert!((list.insert(2.0, 1) - NO_KEY).abs() < f32::EPSILON);
        assert!((list.insert(8.0, 2) - 8.0).abs() < f32::EPSILON);
        assert!((list.max_key() - 8.0).abs() < f32::EPSILON);
        assert!((list.insert(1.0, 3) - 5.0).abs() < f32::EPSILON);
        assert!((list.max_key() - 5.0).abs() < f32::EPSILON);
        assert!((list.insert(9.0, 4) - 5.0).abs() < f32::EPSILON);

        let entries: Vec<(f32, i32)> = list.iter().map(|c| (c.key, c.id)).collect();
        assert_eq!(entries, vec![(1.0, 3), (2.0, 1), (5.0, 0)]);
    }

    #[test]
    fn test_full_list_ignores_larger_or_equal_keys() {
        let mut list = MinKList::new(2);
        list.insert(1.0, 10);
        list.insert(2.0, 20);
        let before = list.as_slice().to_vec();

        list.insert(2.0, 99);
        list.insert(7.5, 98);
        list.insert(7.5, 98);

        assert_eq!(list.as_slice(), before.as_slice());
    }

    #[test]
    fn test_nan_keys_are_ignored() {
        let mut list = MinKList::new(3);
        list.insert(f32::NAN, 7);
        assert!(list.is_empty());

        list.insert(4.0, 1);
        list.insert(1.0, 2);
        list.insert(2.0, 3);
        let before = list.as_slice().to_vec();

        assert!((list.insert(f32::NAN, 8) - 4.0).abs() < f32::EPSILON);
        assert_eq!(list.as_slice(), before.as_slice());
        assert!(list.iter().all(|c| !c.key.is_nan()));
    }

    #[test]
    fn test_sentinels_for_unpopulated_slots() {
        let mut list = MinKList::new(4);
        assert!(list.is_empty());
        assert!((list.min_key() - NO_KEY).abs() < f32::EPSILON);
        assert!((list.max_key() - NO_KEY).abs() < f32::EPSILON);
        assert_eq!(list.ith_id(0), NO_ID);

        list.insert(0.5, 1);
        assert!((list.min_key() - 0.5).abs() < f32::EPSILON);
        assert!((list.ith_key(0) - 0.5).abs() < f32::EPSILON);
        assert_eq!(list.ith_id(0), 1);
        assert!((list.ith_key(1) - NO_KEY).abs() < f32::EPSILON);
        assert_eq!(list.ith_id(3), NO_ID);
        assert_eq!(list.ith_id(100), NO_ID);
    }

    #[test]
    fn test_reset_reuses_list() {
        let mut list = MinKList::new(2);
        list.insert(3.0, 1);
        list.insert(4.0, 2);
        assert!(list.is_full());

        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.k(), 2);

        list.insert(9.0, 3);
        assert_eq!(list.len(), 1);
        assert_eq!(list.ith_id(0), 3);
    }

    #[test]
    fn test_keeps_k_smallest_of_random_stream() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut list = MinKList::new(16);
        let mut seen = Vec::new();

        for id in 0..1000 {
            let key: f32 = rng.random_range(-100.0..100.0);
            seen.push(key);
            list.insert(key, id);
        }

        seen.sort_by(f32::total_cmp);
        let kept: Vec<f32> = list.iter().map(|c| c.key).collect();
        assert_eq!(kept, seen[..16].to_vec());
        assert!(kept.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_fewer_inserts_than_k() {
        let mut list = MinKList::new(10);
        for (id, key) in [3.0f32, 1.0, 2.0].into_iter().enumerate() {
            list.insert(key, i32::try_from(id).expect("small id"));
        }
        let keys: Vec<f32> = list.iter().map(|c| c.key).collect();
        assert_eq!(keys, vec![1.0, 2.0, 3.0]);
        assert!(!list.is_full());
    }
}
