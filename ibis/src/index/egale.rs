//! Multi-component equality index ("egale"): the overall bin
//! number is split into a high and low digit in a mixed-radix scheme,
//! and each digit gets its own equality-bin sub-index
//! (`crate::index::bin::BinIndex`). A range query decomposes into at
//! most three terms via `decompose_digit_range` instead of unioning
//! every one of the (potentially many) overall bins directly.

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    index::{bin::BinIndex, decompose_digit_range, half_integer_bounds, IndexCore, IndexOps},
    ioutil::{Reader, Writer},
};

pub struct EgaleIndex {
    pub core: IndexCore,
    radix: u64,
    hi: BinIndex,
    lo: BinIndex,
}

fn digit_values(bins: &[usize], radix: u64) -> (Vec<f64>, Vec<f64>) {
    let hi = bins.iter().map(|&b| (b as u64 / radix) as f64).collect();
    let lo = bins.iter().map(|&b| (b as u64 % radix) as f64).collect();
    (hi, lo)
}

/// A radix that keeps both digit sub-indexes roughly equally sized.
pub fn default_radix(nobs: usize) -> u64 {
    ((nobs as f64).sqrt().ceil() as u64).max(1)
}

impl EgaleIndex {
    pub fn build(values: &[f64], bounds: Vec<f64>) -> Self {
        let nobs = bounds.len() + 1;
        let nrows = values.len() as u64;
        let radix = default_radix(nobs);
        let nhi = nobs.div_ceil(radix as usize);

        let mut minval = vec![f64::INFINITY; nobs];
        let mut maxval = vec![f64::NEG_INFINITY; nobs];
        let mut bins = Vec::with_capacity(values.len());
        for &v in values {
            let b = bounds.partition_point(|&bound| bound <= v);
            bins.push(b);
            minval[b] = minval[b].min(v);
            maxval[b] = maxval[b].max(v);
        }
        let (hi_vals, lo_vals) = digit_values(&bins, radix);

        let hi = BinIndex::build(&hi_vals, half_integer_bounds(nhi));
        let lo = BinIndex::build(&lo_vals, half_integer_bounds(radix as usize));

        EgaleIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            radix,
            hi,
            lo,
        }
    }

    pub fn serialize<W: Writer>(&self, w: &mut W) -> Result<()> {
        crate::fileformat::write_header(w, crate::fileformat::IndexTypeTag::Egale, 4)?;
        w.write_u32(self.radix as u32)?;
        let nobs = self.core.nobs();
        w.write_u32(nobs as u32)?;
        w.write_f64_slice(&self.core.bounds)?;
        w.write_f64_slice(&self.core.maxval)?;
        w.write_f64_slice(&self.core.minval)?;
        self.hi.serialize(w)?;
        self.lo.serialize(w)?;
        Ok(())
    }

    pub fn deserialize<R: Reader>(r: &mut R) -> Result<Self> {
        let (tag, _word_size) = crate::fileformat::read_header(r)?;
        if tag != crate::fileformat::IndexTypeTag::Egale {
            return Err(ibis_base::err("not an egale index file"));
        }
        let radix = r.read_u32()? as u64;
        let nobs = r.read_u32()? as usize;
        let bounds = r.read_f64_vec(nobs.saturating_sub(1))?;
        let maxval = r.read_f64_vec(nobs)?;
        let minval = r.read_f64_vec(nobs)?;
        let hi = BinIndex::deserialize(r)?;
        let lo = BinIndex::deserialize(r)?;
        let nrows = hi.core.nrows;
        Ok(EgaleIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            radix,
            hi,
            lo,
        })
    }
}

impl IndexOps for EgaleIndex {
    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn bin_mask(&self, i: usize) -> Result<Bitvector> {
        let h = self.hi.bin_mask(i / self.radix as usize)?;
        let l = self.lo.bin_mask(i % self.radix as usize)?;
        Ok(h.and(&l))
    }

    fn estimate(&self, lo_bound: f64, hi_bound: f64) -> Result<(Bitvector, Bitvector)> {
        let loc = self.locate(lo_bound, hi_bound);
        let lower = decompose_digit_range(&self.hi, &self.lo, self.radix, loc.hit0, loc.hit1)?;
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

    fn sample() -> (EgaleIndex, Vec<f64>) {
        let values: Vec<f64> = (0..2000).map(|i| (i % 997) as f64).collect();
        let bounds = crate::bounds::equi_width(0.0, 997.0, 97);
        (EgaleIndex::build(&values, bounds), values)
    }

    #[test]
    fn bin_masks_partition_rows() {
        let (idx, values) = sample();
        let mut union = Bitvector::zeros(values.len() as u64);
        for i in 0..idx.core.nobs() {
            let m = idx.bin_mask(i).unwrap();
            assert_eq!(union.count(&m), 0);
            union.or_assign(&m);
        }
        assert_eq!(union.cnt(), values.len() as u64);
    }

    #[test]
    fn evaluate_matches_rescan() {
        let (idx, values) = sample();
        let part = InMemoryPartition::new(&values);
        let predicate = Predicate {
            lop: Op::Ge,
            lbound: 123.0,
            rop: Op::Lt,
            rbound: 845.0,
        };
        let from_index = idx.evaluate(&predicate, &part).unwrap();
        let mask = Bitvector::ones(values.len() as u64);
        let from_rescan = part.rescan(&predicate, &mask).unwrap();
        assert_eq!(from_index, from_rescan);
    }

    #[test]
    fn round_trip_file_format() {
        let (idx, _values) = sample();
        let mut w = MemWriter::new();
        idx.serialize(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let back = EgaleIndex::deserialize(&mut r).unwrap();
        for i in 0..idx.core.nobs() {
            assert_eq!(back.bin_mask(i).unwrap().cnt(), idx.bin_mask(i).unwrap().cnt());
        }
    }
}
