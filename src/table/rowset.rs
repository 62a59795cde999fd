//! Set algebra on row number lists.
//!
//! Inputs are ascending sequences; every operation is a single merge pass
//! and yields an ascending sequence without duplicates.

use std::cmp::Ordering;

/// True if the rows are strictly ascending.
pub fn is_ascending(rows: &[u64]) -> bool {
    rows.windows(2).all(|w| w[0] < w[1])
}

/// Sorted copy without duplicates.
pub fn sorted(rows: &[u64]) -> Vec<u64> {
    let mut out = rows.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Rows in both inputs.
pub fn and_rows(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Rows in either input.
pub fn or_rows(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Rows of `a` not in `b`.
pub fn sub_rows(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() {
        if j >= b.len() || a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else if a[i] > b[j] {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }
    out
}

/// Rows in exactly one input.
pub fn xor_rows(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Rows `0..total` not in `a`.
pub fn not_rows(a: &[u64], total: u64) -> Vec<u64> {
    let mut out = Vec::with_capacity((total as usize).saturating_sub(a.len()));
    let mut next = a.iter().peekable();
    for row in 0..total {
        while next.peek().map_or(false, |&&r| r < row) {
            next.next();
        }
        if next.peek() == Some(&&row) {
            next.next();
        } else {
            out.push(row);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_operations() {
        let a = [1, 3, 5, 7];
        let b = [3, 4, 5];
        assert_eq!(and_rows(&a, &b), vec![3, 5]);
        assert_eq!(or_rows(&a, &b), vec![1, 3, 4, 5, 7]);
        assert_eq!(sub_rows(&a, &b), vec![1, 7]);
        assert_eq!(xor_rows(&a, &b), vec![1, 4, 7]);
        assert_eq!(not_rows(&a, 9), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_sorted_dedups() {
        assert_eq!(sorted(&[4, 0, 4, 2]), vec![0, 2, 4]);
        assert!(is_ascending(&[0, 2, 4]));
        assert!(!is_ascending(&[0, 2, 2]));
    }

    fn row_set() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::btree_set(0u64..64, 0..32).prop_map(|s| s.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_and_or_laws(a in row_set(), b in row_set()) {
            prop_assert_eq!(and_rows(&a, &b), and_rows(&b, &a));
            prop_assert_eq!(or_rows(&a, &b), or_rows(&b, &a));
            prop_assert_eq!(and_rows(&a, &a), a.clone());
            prop_assert_eq!(or_rows(&a, &and_rows(&a, &b)), a.clone());
        }

        #[test]
        fn prop_xor_is_union_minus_intersection(a in row_set(), b in row_set()) {
            let expected = sub_rows(&or_rows(&a, &b), &and_rows(&a, &b));
            prop_assert_eq!(xor_rows(&a, &b), expected);
        }

        #[test]
        fn prop_not_is_complement(a in row_set()) {
            let all: Vec<u64> = (0..64).collect();
            let not = not_rows(&a, 64);
            prop_assert_eq!(sub_rows(&all, &a), not.clone());
            prop_assert!(and_rows(&a, &not).is_empty());
            prop_assert_eq!(or_rows(&a, &not), all);
        }

        #[test]
        fn prop_results_ascending(a in row_set(), b in row_set()) {
            prop_assert!(is_ascending(&or_rows(&a, &b)));
            prop_assert!(is_ascending(&xor_rows(&a, &b)));
            prop_assert!(is_ascending(&sub_rows(&a, &b)));
        }
    }
}
