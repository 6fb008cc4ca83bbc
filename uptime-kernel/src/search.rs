//! Lookup over sequences sorted by a string key.

use std::cmp::Ordering;

/// Binary search for the item whose key equals `key` in a slice sorted
/// ascending by `key_of`. Empty input and keys outside the slice's range are
/// plain misses.
pub fn find_sorted_by_key<'a, T, F>(items: &'a [T], key: &str, key_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    items
        .binary_search_by(|item| key_of(item).cmp(key))
        .ok()
        .map(|idx| &items[idx])
}

/// True when `items` is sorted ascending by `key_of` (the precondition above).
pub fn is_sorted_by_key<T, F>(items: &[T], key_of: F) -> bool
where
    F: Fn(&T) -> &str,
{
    items
        .windows(2)
        .all(|pair| key_of(&pair[0]).cmp(key_of(&pair[1])) != Ordering::Greater)
}
