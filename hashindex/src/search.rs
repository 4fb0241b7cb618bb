//! Nearest-key lookup on top of the leaf chain.

use crate::btree::{BTree, BTreeError, ScanDirection};
use crate::topk::MinKList;

/// Collect the `k` entries whose keys are closest to `query`.
///
/// Scans outward from `query` in both directions. The returned list is keyed
/// by `|key - query|`; once the list is full, a direction stops as soon as
/// its next distance can no longer enter it.
///
/// # Panics
/// Panics if `k` is 0.
pub fn nearest_keys(tree: &mut BTree, query: f32, k: usize) -> Result<MinKList, BTreeError> {
    let mut list = MinKList::new(k);

    for direction in [ScanDirection::Descending, ScanDirection::Ascending] {
        let mut cursor = tree.scan_from(query, direction)?;
        let mut visited = 0usize;

        while let Some(entry) = cursor.next_entry()? {
            let distance = (entry.key - query).abs();
            if list.is_full() && distance >= list.max_key() {
                break;
            }
            list.insert(distance, entry.id);
            visited += 1;
        }

        tracing::trace!(?direction, visited, "scan finished");
    }

    Ok(list)
}
