//! Range-encoded index: `rel[i]` holds the rows in bins `0..=i`
//! (a running union), so a range query needs at most one stored
//! bitvector plus one complement rather than a union over many equality
//! bins. Grounded on the same lazy-activation/offset-table shape as
//! `crate::index::bin`.

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    fileformat::{self, CommonCounts, IndexTypeTag, LazyBitvectors},
    index::{IndexCore, IndexOps},
    ioutil::{Reader, Writer},
};

pub struct RangeIndex {
    pub core: IndexCore,
    /// `rel[i]` = rows with value in bin `0..=i`. `rel[nobs-1]` is all-ones.
    rel: LazyBitvectors,
}

impl RangeIndex {
    pub fn build(values: &[f64], bounds: Vec<f64>) -> Self {
        let nobs = bounds.len() + 1;
        let nrows = values.len() as u64;
        let mut minval = vec![f64::INFINITY; nobs];
        let mut maxval = vec![f64::NEG_INFINITY; nobs];
        let mut equality: Vec<Bitvector> = (0..nobs).map(|_| Bitvector::zeros(nrows)).collect();
        for (row, &v) in values.iter().enumerate() {
            let b = bounds.partition_point(|&bound| bound <= v);
            equality[b].set_bit(row as u64, true);
            minval[b] = minval[b].min(v);
            maxval[b] = maxval[b].max(v);
        }
        let mut rel = Vec::with_capacity(nobs);
        let mut running = Bitvector::zeros(nrows);
        for eq in &equality {
            running.or_assign(eq);
            rel.push(running.clone());
        }
        RangeIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            rel: LazyBitvectors::from_built(rel),
        }
    }

    pub fn serialize<W: Writer>(&self, w: &mut W) -> Result<()> {
        fileformat::write_header(w, IndexTypeTag::Range, 4)?;
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

        let mut bodies: Vec<Vec<u8>> = Vec::with_capacity(nobs);
        for i in 0..nobs {
            let mut bw = crate::ioutil::MemWriter::new();
            self.rel.get_resident(i).serialize(&mut bw)?;
            let mut r = bw.try_into_reader()?;
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut r, &mut buf)?;
            bodies.push(buf);
        }
        let mut offsets = Vec::with_capacity(nobs + 1);
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
        if tag != IndexTypeTag::Range {
            return Err(ibis_base::err("not a range index file"));
        }
        let counts = CommonCounts::read(r)?;
        let nobs = counts.nobs as usize;
        let bounds = r.read_f64_vec(nobs.saturating_sub(1))?;
        let maxval = r.read_f64_vec(nobs)?;
        let minval = r.read_f64_vec(nobs)?;
        let offsets = r.read_i32_vec(nobs + 1)?;
        let bodies_start = r.pos()?;
        let lazy = LazyBitvectors::new(offsets, counts.nrows as u64)?;
        let mut resident = Vec::with_capacity(nobs);
        for i in 0..nobs {
            resident.push(lazy.activate(i, r, bodies_start)?);
        }
        Ok(RangeIndex {
            core: IndexCore {
                nrows: counts.nrows as u64,
                bounds,
                minval,
                maxval,
            },
            rel: LazyBitvectors::from_built(resident),
        })
    }
}

impl IndexOps for RangeIndex {
    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn bin_mask(&self, i: usize) -> Result<Bitvector> {
        let rel_i = self.rel.get_resident(i);
        if i == 0 {
            Ok(rel_i)
        } else {
            Ok(rel_i.minus(&self.rel.get_resident(i - 1)))
        }
    }

    /// Overridden to exploit the cumulative encoding directly: a range
    /// query `[lo, hi)` covering bins `lo_bin..hi_bin` reduces to
    /// `rel[hi_bin-1] & !rel[lo_bin-1]` rather than unioning every bin in
    /// between.
    fn estimate(&self, lo: f64, hi: f64) -> Result<(Bitvector, Bitvector)> {
        let loc = self.locate(lo, hi);
        let nobs = self.nobs();
        let hit_upper = if loc.hit1 == 0 {
            Bitvector::zeros(self.nrows())
        } else if loc.hit1 >= nobs {
            Bitvector::ones(self.nrows())
        } else {
            self.rel.get_resident(loc.hit1 - 1)
        };
        let hit_lower_exclude = if loc.hit0 == 0 {
            Bitvector::zeros(self.nrows())
        } else {
            self.rel.get_resident(loc.hit0 - 1)
        };
        let lower = hit_upper.minus(&hit_lower_exclude);
        let mut upper = lower.clone();
        if loc.cand0 < loc.hit0 {
            upper.or_assign(&self.bin_mask(loc.cand0)?);
        }
        if loc.hit1 < loc.cand1 {
            upper.or_assign(&self.bin_mask(loc.hit1)?);
        }
        Ok((lower, upper))
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

    fn sample_index() -> (RangeIndex, Vec<f64>) {
        let values: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let bounds = crate::bounds::equi_width(0.0, 200.0, 20);
        (RangeIndex::build(&values, bounds), values)
    }

    #[test]
    fn bin_masks_partition_rows() {
        let (idx, values) = sample_index();
        let mut union = Bitvector::zeros(values.len() as u64);
        for i in 0..idx.core.nobs() {
            let m = idx.bin_mask(i).unwrap();
            assert_eq!(union.count(&m), 0);
            union.or_assign(&m);
        }
        assert_eq!(union.cnt(), values.len() as u64);
    }

    #[test]
    fn estimate_matches_bin_union() {
        let (idx, _values) = sample_index();
        let loc = idx.locate(15.0, 97.0);
        let mut by_union = Bitvector::zeros(idx.nrows());
        for i in loc.hit0..loc.hit1 {
            by_union.or_assign(&idx.bin_mask(i).unwrap());
        }
        let (lower, _upper) = idx.estimate(15.0, 97.0).unwrap();
        assert_eq!(lower, by_union);
    }

    #[test]
    fn evaluate_matches_rescan() {
        let (idx, values) = sample_index();
        let part = InMemoryPartition::new(&values);
        let predicate = Predicate {
            lop: Op::Ge,
            lbound: 23.5,
            rop: Op::Lt,
            rbound: 101.25,
        };
        let from_index = idx.evaluate(&predicate, &part).unwrap();
        let mask = Bitvector::ones(values.len() as u64);
        let from_rescan = part.rescan(&predicate, &mask).unwrap();
        assert_eq!(from_index, from_rescan);
    }

    #[test]
    fn round_trip_file_format() {
        let (idx, _values) = sample_index();
        let mut w = MemWriter::new();
        idx.serialize(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let back = RangeIndex::deserialize(&mut r).unwrap();
        for i in 0..idx.core.nobs() {
            assert_eq!(back.bin_mask(i).unwrap().cnt(), idx.bin_mask(i).unwrap().cnt());
        }
    }
}
