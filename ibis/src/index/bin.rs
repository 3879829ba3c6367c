//! Equality-on-bins index: one bitvector per bin, stored
//! directly. The baseline variant every other encoding either composes
//! from or reduces to.

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    fileformat::{self, CommonCounts, IndexTypeTag, LazyBitvectors},
    index::{IndexCore, IndexOps},
    ioutil::{Reader, Writer},
};

pub struct BinIndex {
    pub core: IndexCore,
    bits: LazyBitvectors,
}

impl BinIndex {
    /// Build directly from a column's values and chosen boundaries, one
    /// bin bitvector at a time.
    pub fn build(values: &[f64], bounds: Vec<f64>) -> Self {
        let nobs = bounds.len() + 1;
        let nrows = values.len() as u64;
        let mut bitmaps: Vec<Bitvector> = (0..nobs).map(|_| Bitvector::zeros(nrows)).collect();
        let mut minval = vec![f64::INFINITY; nobs];
        let mut maxval = vec![f64::NEG_INFINITY; nobs];
        for (row, &v) in values.iter().enumerate() {
            let b = bounds.partition_point(|&bound| bound <= v);
            bitmaps[b].set_bit(row as u64, true);
            minval[b] = minval[b].min(v);
            maxval[b] = maxval[b].max(v);
        }
        BinIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            bits: LazyBitvectors::from_built(bitmaps),
        }
    }

    pub fn serialize<W: Writer>(&self, w: &mut W) -> Result<()> {
        fileformat::write_header(w, IndexTypeTag::Bin, 4)?;
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
            self.bits.get_resident(i).serialize(&mut bw)?;
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

    /// Eagerly activates every bin's bitvector: a true lazy-on-disk
    /// backend would keep the reader around and activate bins one at a
    /// time on first `bin_mask` call, but `IndexOps::bin_mask` takes no
    /// reader (it must stay object-safe), so load time is where the
    /// offset table actually gets consumed.
    pub fn deserialize<R: Reader>(r: &mut R) -> Result<Self> {
        let (tag, _word_size) = fileformat::read_header(r)?;
        if tag != IndexTypeTag::Bin {
            return Err(ibis_base::err("not a bin index file"));
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
        Ok(BinIndex {
            core: IndexCore {
                nrows: counts.nrows as u64,
                bounds,
                minval,
                maxval,
            },
            bits: LazyBitvectors::from_built(resident),
        })
    }
}

impl IndexOps for BinIndex {
    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn bin_mask(&self, i: usize) -> Result<Bitvector> {
        Ok(self.bits.get_resident(i))
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

    fn sample_index() -> (BinIndex, Vec<f64>) {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let bounds = crate::bounds::equi_width(0.0, 100.0, 32);
        (BinIndex::build(&values, bounds), values)
    }

    #[test]
    fn disjoint_cover() {
        let (idx, values) = sample_index();
        let mut union = Bitvector::zeros(values.len() as u64);
        for i in 0..idx.core.nobs() {
            let m = idx.bin_mask(i).unwrap();
            assert_eq!(union.count(&m), 0, "bins must be disjoint");
            union.or_assign(&m);
        }
        assert_eq!(union.cnt(), values.len() as u64);
    }

    #[test]
    fn evaluate_matches_rescan() {
        let (idx, values) = sample_index();
        let part = InMemoryPartition::new(&values);
        let predicate = Predicate {
            lop: Op::Ge,
            lbound: 3.5,
            rop: Op::Lt,
            rbound: 17.25,
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
        let back = BinIndex::deserialize(&mut r).unwrap();
        assert_eq!(back.core.nobs(), idx.core.nobs());
        for i in 0..idx.core.nobs() {
            assert_eq!(back.bin_mask(i).unwrap().cnt(), idx.bin_mask(i).unwrap().cnt());
        }
    }
}
