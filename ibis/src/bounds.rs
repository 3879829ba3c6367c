//! Bin-boundary selection: turn a pass over a column's values into a
//! strictly increasing `bounds` array. Equi-width takes min/max and
//! divides evenly; equi-depth sorts once and cuts at rank quantiles,
//! nudging each cut past a run of equal values so no bin splits one.

/// Equal-width boundaries over `[min, max]`, `nobs` bins.
pub fn equi_width(min: f64, max: f64, nobs: usize) -> Vec<f64> {
    if nobs <= 1 || !(max > min) {
        return Vec::new();
    }
    let step = (max - min) / nobs as f64;
    (1..nobs).map(|i| min + step * i as f64).collect()
}

/// Equal-depth boundaries: each bin holds roughly `values.len() / nobs`
/// rows. `values` need not be sorted; a sorted copy is taken internally.
/// Ties at a candidate boundary value are broken by keeping every row
/// with that value in the lower bin — i.e. the boundary is placed just
/// above the last occurrence of the value at the target rank, matching
/// the source's "never split a run of equal values across a bin".
pub fn equi_depth(values: &[f64], nobs: usize) -> Vec<f64> {
    if nobs <= 1 || values.is_empty() {
        return Vec::new();
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-NaN column values"));
    let n = sorted.len();
    let mut bounds = Vec::with_capacity(nobs - 1);
    let mut start = 0usize;
    for i in 1..nobs {
        let mut cut = (n * i) / nobs;
        cut = cut.max(start);
        while cut > 0 && cut < n && sorted[cut - 1] == sorted[cut] {
            cut += 1;
        }
        if cut >= n {
            break;
        }
        let boundary = sorted[cut];
        if bounds.last().copied() != Some(boundary) {
            bounds.push(boundary);
        }
        start = cut;
    }
    bounds
}

/// Snap each boundary outward to the nearest integer ≥ itself, then
/// dedupe, when the column's declared type is integral. Keeps every bin
/// from splitting an integer value between itself and its neighbor.
pub fn snap_integral(mut bounds: Vec<f64>) -> Vec<f64> {
    for b in bounds.iter_mut() {
        *b = b.ceil();
    }
    bounds.dedup();
    bounds
}

/// Whether the endpoint bins hold enough rows to trigger a boundary
/// recompute on append.
pub fn endpoints_overloaded(first_bin_rows: u64, last_bin_rows: u64, nrows: u64, nobs: usize) -> bool {
    if nobs == 0 {
        return false;
    }
    let target = nrows / nobs as u64;
    first_bin_rows > target || last_bin_rows > target
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn equi_width_basic() {
        let b = equi_width(0.0, 100.0, 32);
        assert_eq!(b.len(), 31);
        assert!((b[0] - 100.0 / 32.0).abs() < 1e-9);
    }

    #[test]
    fn equi_depth_balances_counts() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let bounds = equi_depth(&values, 10);
        assert!(!bounds.is_empty());
        assert!(bounds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn equi_depth_never_splits_a_run_of_equal_values() {
        let mut values = vec![1.0; 50];
        values.extend(vec![2.0; 50]);
        let bounds = equi_depth(&values, 2);
        // The only sensible split point is between the two runs.
        assert_eq!(bounds, vec![2.0]);
    }

    #[test]
    fn integral_snap_dedupes() {
        let snapped = snap_integral(vec![1.2, 1.8, 2.0, 3.9]);
        assert_eq!(snapped, vec![2.0, 4.0]);
    }
}
