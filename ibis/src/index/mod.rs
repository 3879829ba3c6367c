//! The index variant family: one payload struct per encoding, all
//! sharing `IndexCore` (bin boundaries, per-bin min/max) and dispatched
//! through the `IndexOps` trait.
//!
//! Bin convention: `nobs` is the *total* number of bins, including the
//! open-ended top bin; `bounds` holds the `nobs - 1` finite boundaries
//! between them, so bin `i` for `i < nobs - 1` is `[bounds[i-1],
//! bounds[i])` (`bounds[-1] = -inf`) and bin `nobs - 1` is
//! `[bounds[nobs-2], +inf)`.

pub mod bin;
pub mod egale;
pub mod fade;
pub mod mesa;
pub mod range;
pub mod sbiad;
pub mod slice;
pub mod twolevel;

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    column::{Op, Partition, Predicate},
};

/// Candidate/hit bin interval from `locate`:
/// `[hit0, hit1)` are certain hits, `[cand0, cand1)` are possible hits,
/// with `cand0 <= hit0 <= hit1 <= cand1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Locate {
    pub cand0: usize,
    pub hit0: usize,
    pub hit1: usize,
    pub cand1: usize,
}

/// Per-bin boundary/min/max bookkeeping shared by every index variant.
#[derive(Clone, Debug, Default)]
pub struct IndexCore {
    pub nrows: u64,
    /// `nobs - 1` strictly increasing boundaries.
    pub bounds: Vec<f64>,
    pub minval: Vec<f64>,
    pub maxval: Vec<f64>,
}

impl IndexCore {
    pub fn nobs(&self) -> usize {
        self.minval.len()
    }

    /// Which bin a value falls in, under this module's bin convention.
    pub fn bin_of(&self, v: f64) -> usize {
        self.bounds.partition_point(|&b| b <= v)
    }

    /// Locate the candidate/hit interval for the half-open range
    /// `[lo, hi)`. A linear scan over `minval`/`maxval`: the bins'
    /// monotonicity would let this binary-search, but `nobs` is never
    /// large enough for the difference to matter.
    pub fn locate(&self, lo: f64, hi: f64) -> Locate {
        let nobs = self.nobs();
        let mut hit0 = nobs;
        let mut hit1 = 0usize;
        let mut cand0 = nobs;
        let mut cand1 = 0usize;
        for i in 0..nobs {
            let overlaps = self.maxval[i] >= lo && self.minval[i] < hi;
            if overlaps {
                cand0 = cand0.min(i);
                cand1 = cand1.max(i + 1);
                let contained = self.minval[i] >= lo && self.maxval[i] < hi;
                if contained {
                    hit0 = hit0.min(i);
                    hit1 = hit1.max(i + 1);
                }
            }
        }
        if cand1 == 0 {
            // No candidates at all: collapse to an empty interval at 0.
            return Locate { cand0: 0, hit0: 0, hit1: 0, cand1: 0 };
        }
        if hit1 < hit0 {
            // Candidates exist but none are certain hits.
            hit0 = cand0;
            hit1 = cand0;
        }
        Locate { cand0, hit0, hit1, cand1 }
    }
}

/// Normalize a predicate's operators to a half-open `[lo, hi)` range:
/// `col = v` becomes `v <= col < v'` where `v'` is the next
/// representable value above `v`.
pub fn eq2range(predicate: &Predicate) -> (f64, f64) {
    let lo = match predicate.lop {
        Op::Undef => f64::NEG_INFINITY,
        Op::Gt => next_up(predicate.lbound),
        Op::Ge | Op::Eq => predicate.lbound,
        Op::Lt | Op::Le => f64::NEG_INFINITY,
    };
    let hi = match predicate.rop {
        Op::Undef => f64::INFINITY,
        Op::Lt => predicate.rbound,
        Op::Le | Op::Eq => next_up(predicate.rbound),
        Op::Gt | Op::Ge => f64::INFINITY,
    };
    if predicate.lop == Op::Eq {
        return (predicate.lbound, next_up(predicate.lbound));
    }
    (lo, hi)
}

fn next_up(v: f64) -> f64 {
    if v.is_infinite() || v.is_nan() {
        return v;
    }
    let bits = v.to_bits();
    let next_bits = if v >= 0.0 { bits + 1 } else { bits - 1 };
    f64::from_bits(next_bits)
}

/// A partition that errors if `rescan` is ever invoked. Used for the
/// digit sub-indexes inside a multi-component encoding: digit boundaries
/// sit on exact half-integers, so `locate` is always fully decisive and
/// rescan should never be reached.
pub struct NoRescanPartition {
    pub nrows: u64,
}

impl Partition for NoRescanPartition {
    fn nrows(&self) -> u64 {
        self.nrows
    }
    fn rescan(&self, _predicate: &Predicate, _mask: &Bitvector) -> Result<Bitvector> {
        Err(ibis_base::err(
            "digit sub-index rescan invoked; digit boundaries should always be decisive",
        ))
    }
}

/// Boundaries that place each non-negative integer `0..n` in its own
/// bin: the half-integer points between them. Used to build a digit
/// sub-index (whose "column" is an integer digit value, not the
/// original float column).
pub(crate) fn half_integer_bounds(n: usize) -> Vec<f64> {
    (1..n).map(|i| i as f64 - 0.5).collect()
}

/// Decompose a contiguous overall-bin range `[bin_lo, bin_hi)` across a
/// two-digit mixed-radix split (`bin = hi_digit * radix + lo_digit`)
/// into at most three terms: a partial first row, any fully-covered
/// middle rows unioned directly from the high-digit index, and a
/// partial last row — the standard multicomponent range-query reduction
/// that lets these variants avoid an O(nobs) bin union.
pub fn decompose_digit_range(
    hi: &impl IndexOps,
    lo: &impl IndexOps,
    radix: u64,
    bin_lo: usize,
    bin_hi: usize,
) -> Result<Bitvector> {
    let nrows = hi.nrows();
    if bin_hi <= bin_lo {
        return Ok(Bitvector::zeros(nrows));
    }
    let last = bin_hi - 1;
    let hi0 = bin_lo as u64 / radix;
    let lo0 = bin_lo as u64 % radix;
    let hi1 = last as u64 / radix;
    let lo1 = last as u64 % radix;
    let no_rescan = NoRescanPartition { nrows };

    if hi0 == hi1 {
        let row = hi.bin_mask(hi0 as usize)?;
        if lo0 == 0 && lo1 == radix - 1 {
            return Ok(row);
        }
        let predicate = Predicate {
            lop: Op::Ge,
            lbound: lo0 as f64,
            rop: Op::Le,
            rbound: lo1 as f64,
        };
        let lo_mask = lo.evaluate(&predicate, &no_rescan)?;
        return Ok(row.and(&lo_mask));
    }

    let mut mask = Bitvector::zeros(nrows);
    for h in hi0 + 1..hi1 {
        mask.or_assign(&hi.bin_mask(h as usize)?);
    }

    let left_row = hi.bin_mask(hi0 as usize)?;
    let left_lo = lo.evaluate(&Predicate::single(Op::Ge, lo0 as f64), &no_rescan)?;
    mask.or_assign(&left_row.and(&left_lo));

    let right_row = hi.bin_mask(hi1 as usize)?;
    let right_lo = lo.evaluate(&Predicate::single(Op::Le, lo1 as f64), &no_rescan)?;
    mask.or_assign(&right_row.and(&right_lo));

    Ok(mask)
}

/// Shared dispatch surface over every index variant.
/// `serialize`/`deserialize`/`append` are inherent methods on each
/// payload struct instead of trait methods here: they're generic over
/// `crate::ioutil::{Reader, Writer}`, and a generic method can't appear
/// in an object-safe trait, which this one needs to be so the evaluator
/// can run uniformly over `&dyn IndexOps`.
pub trait IndexOps {
    fn core(&self) -> &IndexCore;

    fn nrows(&self) -> u64 {
        self.core().nrows
    }

    fn nobs(&self) -> usize {
        self.core().nobs()
    }

    fn locate(&self, lo: f64, hi: f64) -> Locate {
        self.core().locate(lo, hi)
    }

    /// The membership mask for bin `i` alone (an equality bin), however
    /// the variant actually encodes it internally.
    fn bin_mask(&self, i: usize) -> Result<Bitvector>;

    /// `(lower, upper)` without invoking rescan: `lower` unions the
    /// certain-hit bins, `upper` additionally unions the boundary
    /// candidate bins just outside the hit interval.
    fn estimate(&self, lo: f64, hi: f64) -> Result<(Bitvector, Bitvector)> {
        let loc = self.locate(lo, hi);
        let mut lower = Bitvector::zeros(self.nrows());
        for i in loc.hit0..loc.hit1 {
            lower.or_assign(&self.bin_mask(i)?);
        }
        let mut upper = lower.clone();
        if loc.cand0 < loc.hit0 {
            upper.or_assign(&self.bin_mask(loc.cand0)?);
        }
        if loc.hit1 < loc.cand1 {
            upper.or_assign(&self.bin_mask(loc.hit1)?);
        }
        Ok((lower, upper))
    }

    /// The undecidable fraction heuristic: for the candidate
    /// bin just below the hit interval, how much of it the query
    /// actually claims.
    fn undecidable_fraction(&self, lo: f64) -> f64 {
        let loc = self.locate(lo, f64::INFINITY);
        if loc.cand0 >= self.nobs() {
            return 0.0;
        }
        let core = self.core();
        let span = core.maxval[loc.cand0] - core.minval[loc.cand0];
        if span <= 0.0 {
            0.0
        } else {
            ((core.maxval[loc.cand0] - lo) / span).clamp(0.0, 1.0)
        }
    }

    /// Full evaluation: compose `lower`/`upper`, and if any candidate
    /// bins remain undecided, invoke `rescan` on the boundary mask and
    /// union the result in.
    fn evaluate(&self, predicate: &Predicate, partition: &dyn Partition) -> Result<Bitvector> {
        let (lo, hi) = eq2range(predicate);
        let loc = self.locate(lo, hi);
        let (mut lower, upper) = self.estimate(lo, hi)?;
        if loc.cand0 < loc.hit0 || loc.cand1 > loc.hit1 {
            let boundary = upper.minus(&lower);
            let delta = partition.rescan(predicate, &boundary)?;
            lower.or_assign(&delta);
        }
        Ok(lower)
    }
}

/// Synchronization wrapper around a built index: evaluation takes
/// the reader lock and bumps `use_count` for its duration; a rebuild
/// takes the writer lock and spins until `use_count` drains to zero
/// before replacing the index in place.
pub struct IndexHandle<T> {
    inner: std::sync::RwLock<T>,
    use_count: std::sync::atomic::AtomicUsize,
}

impl<T: IndexOps> IndexHandle<T> {
    pub fn new(index: T) -> Self {
        IndexHandle {
            inner: std::sync::RwLock::new(index),
            use_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn use_count(&self) -> usize {
        self.use_count.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn evaluate(&self, predicate: &Predicate, partition: &dyn Partition) -> Result<Bitvector> {
        self.use_count.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let guard = self.inner.read().expect("index lock poisoned");
        let result = guard.evaluate(predicate, partition);
        self.use_count.fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
        result
    }

    /// Replace the index under the writer lock, blocking new readers and
    /// spinning until in-flight ones drain. Rebuilds are rare and offline
    /// relative to query evaluation, so a spin rather than a condvar is
    /// good enough here.
    pub fn rebuild(&self, f: impl FnOnce(&T) -> T) {
        let mut guard = self.inner.write().expect("index lock poisoned");
        while self.use_count() > 0 {
            std::thread::yield_now();
        }
        *guard = f(&guard);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn handle_evaluates_and_rebuilds() {
        use crate::column::{InMemoryPartition, Op};
        use crate::index::bin::BinIndex;
        let values: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let bounds = crate::bounds::equi_width(0.0, 200.0, 20);
        let handle = IndexHandle::new(BinIndex::build(&values, bounds.clone()));
        let part = InMemoryPartition::new(&values);
        let got = handle.evaluate(&Predicate::single(Op::Ge, 100.0), &part).unwrap();
        assert_eq!(got.cnt(), 100);
        assert_eq!(handle.use_count(), 0);

        let more: Vec<f64> = (0..400).map(|i| i as f64).collect();
        handle.rebuild(|_old| BinIndex::build(&more, bounds));
        let part2 = InMemoryPartition::new(&more);
        let got2 = handle.evaluate(&Predicate::single(Op::Ge, 100.0), &part2).unwrap();
        assert_eq!(got2.cnt(), 300);
    }

    fn core_for(bounds: &[f64]) -> IndexCore {
        let nobs = bounds.len() + 1;
        let mut minval = Vec::with_capacity(nobs);
        let mut maxval = Vec::with_capacity(nobs);
        let mut lo = f64::NEG_INFINITY;
        for &b in bounds {
            minval.push(lo);
            maxval.push(b - 1.0);
            lo = b;
        }
        minval.push(lo);
        maxval.push(1e18);
        IndexCore {
            nrows: 0,
            bounds: bounds.to_vec(),
            minval,
            maxval,
        }
    }

    #[test]
    fn eq2range_of_eq_is_tight() {
        let p = Predicate::single(Op::Eq, 5.0);
        let (lo, hi) = eq2range(&p);
        assert_eq!(lo, 5.0);
        assert!(hi > 5.0);
    }

    #[test]
    fn locate_basic_overlap() {
        let core = core_for(&[10.0, 20.0, 30.0]);
        let loc = core.locate(12.0, 28.0);
        assert!(loc.cand0 <= loc.hit0);
        assert!(loc.hit1 <= loc.cand1);
    }
}
