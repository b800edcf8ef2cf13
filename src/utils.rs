//! Internal helper functions and types

/// Ensures that the given vector has capacity for at least `total` entries in total
pub(crate) fn reserve_total<T>(vec: &mut Vec<T>, total: usize) {
    if total > vec.len() {
        vec.reserve(total - vec.len());
    }
}
