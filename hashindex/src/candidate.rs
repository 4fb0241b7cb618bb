//! The `(key, id)` record shared by the tree and the top-k list.

use std::cmp::Ordering;

/// A key (hash projection or distance) paired with an object id.
///
/// Ordering is by key only; records with equal keys have no defined order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub key: f32,
    pub id: i32,
}

impl Candidate {
    #[must_use]
    pub const fn new(key: f32, id: i32) -> Self {
        Self { key, id }
    }

    /// Compare two records by key, ascending.
    #[must_use]
    pub fn cmp_by_key(&self, other: &Self) -> Ordering {
        self.key.total_cmp(&other.key)
    }
}

/// Sort records ascending by key, as `BTree::bulk_load` expects its input.
pub fn sort_ascending(records: &mut [Candidate]) {
    records.sort_unstable_by(Candidate::cmp_by_key);
}

/// Sort records descending by key.
pub fn sort_descending(records: &mut [Candidate]) {
    records.sort_unstable_by(|a, b| b.cmp_by_key(a));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_directions() {
        let mut records = vec![
            Candidate::new(0.5, 1),
            Candidate::new(-2.0, 2),
            Candidate::new(3.25, 3),
            Candidate::new(0.0, 4),
        ];

        sort_ascending(&mut records);
        let ids: Vec<i32> = records.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);

        sort_descending(&mut records);
        let ids: Vec<i32> = records.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 4, 2]);
    }
}
