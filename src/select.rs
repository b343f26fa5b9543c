//! Order statistics on timestamp samples.
//!
//! Sampling cleanup needs one percentile of a few thousand timestamps per
//! sweep. A full sort is wasted work for that, so [`select`] finds a single
//! rank in expected linear time.

use core::cmp::Ordering;

#[inline]
fn median_of_three(a: u64, b: u64, c: u64) -> u64 {
    if a < b {
        if b < c {
            b
        } else if a < c {
            c
        } else {
            a
        }
    } else if a < c {
        a
    } else if b < c {
        c
    } else {
        b
    }
}

/// Returns the value that would sit at index `k` if `values` were sorted
/// ascending.
///
/// `values` is reordered in place. Each round partitions the active range
/// three ways around a median-of-three pivot, so runs of equal timestamps do
/// not degrade it.
///
/// # Panics
///
/// Panics if `k >= values.len()`.
///
/// # Examples
///
/// ```
/// use offheap_map::select::select;
///
/// let mut samples = [50, 10, 40, 20, 30];
/// assert_eq!(select(&mut samples, 0), 10);
/// assert_eq!(select(&mut samples, 3), 40);
/// ```
pub fn select(values: &mut [u64], k: usize) -> u64 {
    assert!(k < values.len(), "rank {} out of bounds for {} values", k, values.len());

    let mut lo = 0;
    let mut hi = values.len();
    loop {
        if hi - lo == 1 {
            return values[lo];
        }

        let pivot = median_of_three(values[lo], values[lo + (hi - lo) / 2], values[hi - 1]);

        // [lo, lt) < pivot, [lt, gt) == pivot, [gt, hi) > pivot
        let mut lt = lo;
        let mut i = lo;
        let mut gt = hi;
        while i < gt {
            match values[i].cmp(&pivot) {
                Ordering::Less => {
                    values.swap(lt, i);
                    lt += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    gt -= 1;
                    values.swap(i, gt);
                }
                Ordering::Equal => i += 1,
            }
        }

        if k < lt {
            hi = lt;
        } else if k >= gt {
            lo = gt;
        } else {
            return pivot;
        }
    }
}
