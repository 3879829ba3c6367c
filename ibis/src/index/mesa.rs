//! Interval index ("mesa"): instead of one bitvector per bin, store
//! overlapping sliding windows of `h = ceil(nobs/2)` consecutive bins.
//! Any single bin is then the *difference* of two adjacent stored
//! windows, trading `nobs` stored bitvectors for roughly `nobs/2` at the
//! cost of one extra `minus` per `bin_mask` call.
//!
//! Derivation: windows are disjoint-bin unions, so
//! `window(i).minus(window(i+1)) == bin(i)` whenever `window(i+1)` is
//! `window(i)` shifted forward by one bin (drops `bin(i)`, gains
//! `bin(i+h)`, and those two are disjoint from each other). The
//! symmetric identity from the high end covers bins near the top. When
//! `nobs` is odd exactly one bin index falls in neither case; it's
//! recovered by subtracting every other (resolvable) bin in its window
//! from that window.

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    fileformat::{self, CommonCounts, IndexTypeTag, LazyBitvectors},
    index::{IndexCore, IndexOps},
    ioutil::{Reader, Writer},
};

pub struct MesaIndex {
    pub core: IndexCore,
    h: usize,
    /// `windows[j]` = union of bins `[j, j+h)`, for `j` in `0..=nobs-h`.
    windows: LazyBitvectors,
}

fn half_width(nobs: usize) -> usize {
    nobs.div_ceil(2)
}

impl MesaIndex {
    pub fn build(values: &[f64], bounds: Vec<f64>) -> Self {
        let nobs = bounds.len() + 1;
        let nrows = values.len() as u64;
        let mut minval = vec![f64::INFINITY; nobs];
        let mut maxval = vec![f64::NEG_INFINITY; nobs];
        let mut eq: Vec<Bitvector> = (0..nobs).map(|_| Bitvector::zeros(nrows)).collect();
        for (row, &v) in values.iter().enumerate() {
            let b = bounds.partition_point(|&bound| bound <= v);
            eq[b].set_bit(row as u64, true);
            minval[b] = minval[b].min(v);
            maxval[b] = maxval[b].max(v);
        }
        let h = half_width(nobs);
        let nwindows = nobs - h + 1;
        let mut windows = Vec::with_capacity(nwindows);
        for j in 0..nwindows {
            let mut w = Bitvector::zeros(nrows);
            for eqb in &eq[j..j + h] {
                w.or_assign(eqb);
            }
            windows.push(w);
        }
        MesaIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            h,
            windows: LazyBitvectors::from_built(windows),
        }
    }

    fn window(&self, j: usize) -> Bitvector {
        self.windows.get_resident(j)
    }

    /// The gap bin index left uncovered by the two sliding-window
    /// identities when `nobs` is odd, or `None` when `nobs` is even.
    fn gap_bin(&self) -> Option<usize> {
        let nobs = self.core.nobs();
        let g = nobs - self.h;
        if g == self.h - 1 && nobs % 2 == 1 {
            Some(g)
        } else {
            None
        }
    }

    fn resolve_direct(&self, i: usize) -> Option<Bitvector> {
        let nobs = self.core.nobs();
        if i + 1 <= nobs - self.h {
            return Some(self.window(i).minus(&self.window(i + 1)));
        }
        if i >= self.h {
            return Some(self.window(i - self.h + 1).minus(&self.window(i - self.h)));
        }
        None
    }

    pub fn serialize<W: Writer>(&self, w: &mut W) -> Result<()> {
        fileformat::write_header(w, IndexTypeTag::Mesa, 4)?;
        let nobs = self.core.nobs();
        CommonCounts {
            nrows: self.core.nrows as u32,
            nobs: nobs as u32,
            nbits: 0,
            card: 0,
        }
        .write(w)?;
        w.write_f64_slice(&self.core.bounds)?;
        w.write_f64_slice(&self.core.maxval)?;
        w.write_f64_slice(&self.core.minval)?;

        let nwindows = self.windows.len();
        let mut bodies: Vec<Vec<u8>> = Vec::with_capacity(nwindows);
        for j in 0..nwindows {
            let mut bw = crate::ioutil::MemWriter::new();
            self.window(j).serialize(&mut bw)?;
            let mut r = bw.try_into_reader()?;
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut r, &mut buf)?;
            bodies.push(buf);
        }
        let mut offsets = Vec::with_capacity(nwindows + 1);
        let mut pos = 0i32;
        offsets.push(pos);
        for buf in &bodies {
            pos += buf.len() as i32;
            offsets.push(pos);
        }
        w.write_i32_slice(&offsets)?;
        for buf in &bodies {
            w.write_all(buf)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Reader>(r: &mut R) -> Result<Self> {
        let (tag, _word_size) = fileformat::read_header(r)?;
        if tag != IndexTypeTag::Mesa {
            return Err(ibis_base::err("not a mesa index file"));
        }
        let counts = CommonCounts::read(r)?;
        let nobs = counts.nobs as usize;
        let bounds = r.read_f64_vec(nobs.saturating_sub(1))?;
        let maxval = r.read_f64_vec(nobs)?;
        let minval = r.read_f64_vec(nobs)?;
        let h = half_width(nobs);
        let nwindows = nobs - h + 1;
        let offsets = r.read_i32_vec(nwindows + 1)?;
        let bodies_start = r.pos()?;
        let lazy = LazyBitvectors::new(offsets, counts.nrows as u64)?;
        let mut resident = Vec::with_capacity(nwindows);
        for j in 0..nwindows {
            resident.push(lazy.activate(j, r, bodies_start)?);
        }
        Ok(MesaIndex {
            core: IndexCore {
                nrows: counts.nrows as u64,
                bounds,
                minval,
                maxval,
            },
            h,
            windows: LazyBitvectors::from_built(resident),
        })
    }
}

impl IndexOps for MesaIndex {
    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn bin_mask(&self, i: usize) -> Result<Bitvector> {
        if let Some(mask) = self.resolve_direct(i) {
            return Ok(mask);
        }
        let g = self
            .gap_bin()
            .filter(|&gap| gap == i)
            .ok_or_else(|| ibis_base::err("bin index out of range for this mesa index"))?;
        let mut others = Bitvector::zeros(self.core.nrows);
        for j in g + 1..g + self.h {
            let m = self
                .resolve_direct(j)
                .expect("every non-gap bin in the window resolves directly");
            others.or_assign(&m);
        }
        Ok(self.window(g).minus(&others))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        column::{InMemoryPartition, Op, Predicate},
        ioutil::MemWriter,
    };
    use test_log::test;

    fn build_for(nobs: usize, n: usize) -> (MesaIndex, Vec<f64>) {
        let values: Vec<f64> = (0..n).map(|i| (i % 997) as f64).collect();
        let bounds = crate::bounds::equi_width(0.0, 997.0, nobs);
        (MesaIndex::build(&values, bounds), values)
    }

    #[test]
    fn disjoint_cover_even_nobs() {
        let (idx, values) = build_for(20, 500);
        let mut union = Bitvector::zeros(values.len() as u64);
        for i in 0..idx.core.nobs() {
            let m = idx.bin_mask(i).unwrap();
            assert_eq!(union.count(&m), 0, "bin {i} overlaps prior bins");
            union.or_assign(&m);
        }
        assert_eq!(union.cnt(), values.len() as u64);
    }

    #[test]
    fn disjoint_cover_odd_nobs_exercises_gap_bin() {
        let (idx, values) = build_for(21, 500);
        assert!(idx.gap_bin().is_some());
        let mut union = Bitvector::zeros(values.len() as u64);
        for i in 0..idx.core.nobs() {
            let m = idx.bin_mask(i).unwrap();
            assert_eq!(union.count(&m), 0, "bin {i} overlaps prior bins");
            union.or_assign(&m);
        }
        assert_eq!(union.cnt(), values.len() as u64);
    }

    #[test]
    fn evaluate_matches_rescan() {
        let (idx, values) = build_for(21, 500);
        let part = InMemoryPartition::new(&values);
        let predicate = Predicate {
            lop: Op::Ge,
            lbound: 100.0,
            rop: Op::Lt,
            rbound: 400.0,
        };
        let from_index = idx.evaluate(&predicate, &part).unwrap();
        let mask = Bitvector::ones(values.len() as u64);
        let from_rescan = part.rescan(&predicate, &mask).unwrap();
        assert_eq!(from_index, from_rescan);
    }

    #[test]
    fn round_trip_file_format() {
        let (idx, _values) = build_for(21, 300);
        let mut w = MemWriter::new();
        idx.serialize(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let back = MesaIndex::deserialize(&mut r).unwrap();
        for i in 0..idx.core.nobs() {
            assert_eq!(back.bin_mask(i).unwrap().cnt(), idx.bin_mask(i).unwrap().cnt());
        }
    }
}
