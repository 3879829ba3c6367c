//! The index file framing shared by every index kind: the `#IBIS`
//! header, and lazy, offset-table-driven bitvector activation.
//!
//! The format is a forward offset table (header, fixed arrays, offsets,
//! then the concatenated bitvectors), so activating bitvector `i` means
//! seeking straight to `offsets[i]`, never seeking to the end of the
//! file first.

use std::{io::Write, sync::Mutex};

use ibis_base::{err, Result};

use crate::{
    bitvector::Bitvector,
    ioutil::{Reader, Writer},
};

pub const MAGIC: &[u8; 5] = b"#IBIS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexTypeTag {
    Bin = 0,
    Range = 1,
    Ambit = 2,
    Pale = 3,
    Fuge = 4,
    Egale = 5,
    Mesa = 6,
    Fade = 7,
    Sbiad = 8,
    Slice = 9,
}

impl IndexTypeTag {
    pub fn from_u8(b: u8) -> Result<Self> {
        Ok(match b {
            0 => IndexTypeTag::Bin,
            1 => IndexTypeTag::Range,
            2 => IndexTypeTag::Ambit,
            3 => IndexTypeTag::Pale,
            4 => IndexTypeTag::Fuge,
            5 => IndexTypeTag::Egale,
            6 => IndexTypeTag::Mesa,
            7 => IndexTypeTag::Fade,
            8 => IndexTypeTag::Sbiad,
            9 => IndexTypeTag::Slice,
            other => return Err(err(format!("unrecognized index type tag {other}"))),
        })
    }
}

/// Write the shared 8-byte header: `#IBIS` + type tag + word size + a
/// reserved zero byte.
pub fn write_header<W: Writer>(w: &mut W, tag: IndexTypeTag, word_size: u8) -> Result<()> {
    w.write_all(MAGIC)?;
    w.write_u8(tag as u8)?;
    w.write_u8(word_size)?;
    w.write_u8(0)?;
    Ok(())
}

pub fn read_header<R: Reader>(r: &mut R) -> Result<(IndexTypeTag, u8)> {
    let magic = r.read_bytes(5)?;
    if magic != MAGIC {
        return Err(err("bad index file magic"));
    }
    let tag = IndexTypeTag::from_u8(r.read_u8()?)?;
    let word_size = r.read_u8()?;
    r.read_u8()?; // reserved
    Ok((tag, word_size))
}

/// The shared `nrows`/`nobs`/`nbits`/`card` header fields, padded to an
/// 8-byte boundary before the `f64` arrays that follow.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommonCounts {
    pub nrows: u32,
    pub nobs: u32,
    pub nbits: u32,
    pub card: u32,
}

impl CommonCounts {
    pub fn write<W: Writer>(&self, w: &mut W) -> Result<()> {
        w.write_u32(self.nrows)?;
        w.write_u32(self.nobs)?;
        w.write_u32(self.nbits)?;
        w.write_u32(self.card)?;
        w.pad_to_8()?;
        Ok(())
    }

    pub fn read<R: Reader>(r: &mut R) -> Result<Self> {
        let nrows = r.read_u32()?;
        let nobs = r.read_u32()?;
        let nbits = r.read_u32()?;
        let card = r.read_u32()?;
        // Header (8 bytes) + 4 u32 fields (16 bytes) = 24, already
        // 8-byte aligned, so `pad_to_8` on the write side never emits
        // anything at this point; nothing to skip here.
        Ok(CommonCounts { nrows, nobs, nbits, card })
    }
}

/// Validate that `offsets` is non-decreasing.
pub fn check_offsets_monotonic(offsets: &[i32]) -> Result<()> {
    if offsets.windows(2).any(|w| w[1] < w[0]) {
        return Err(err("inconsistent offsets: offsets[i+1] < offsets[i]"));
    }
    Ok(())
}

/// Lazily-activated bitvector storage for one index's `bits` array: a
/// fixed offset table plus a per-slot cache filled in under a mutex.
pub struct LazyBitvectors {
    offsets: Vec<i32>,
    /// Length to report for an absent (not-serialized) bitvector.
    absent_len: u64,
    slots: Mutex<Vec<Option<Bitvector>>>,
}

impl LazyBitvectors {
    pub fn new(offsets: Vec<i32>, absent_len: u64) -> Result<Self> {
        check_offsets_monotonic(&offsets)?;
        let n = offsets.len().saturating_sub(1);
        Ok(LazyBitvectors {
            offsets,
            absent_len,
            slots: Mutex::new(vec![None; n]),
        })
    }

    /// All bitvectors already materialized (e.g. freshly built in
    /// memory, nothing to lazily load).
    pub fn from_built(bits: Vec<Bitvector>) -> Self {
        let n = bits.len();
        LazyBitvectors {
            offsets: vec![0; n + 1],
            absent_len: 0,
            slots: Mutex::new(bits.into_iter().map(Some).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize and return bitvector `i`, reading from `reader` at
    /// `bodies_start + offsets[i]` on first access.
    pub fn activate<R: Reader>(&self, i: usize, reader: &mut R, bodies_start: i64) -> Result<Bitvector> {
        let mut slots = self.slots.lock().expect("activation mutex poisoned");
        if let Some(bv) = &slots[i] {
            return Ok(bv.clone());
        }
        let bv = if self.offsets[i + 1] > self.offsets[i] {
            reader.seek_to(bodies_start + self.offsets[i] as i64)?;
            Bitvector::deserialize(reader)?
        } else {
            Bitvector::zeros(self.absent_len)
        };
        slots[i] = Some(bv.clone());
        Ok(bv)
    }

    /// Already-resident bitvector `i` (for freshly-built in-memory
    /// indexes where nothing needs activating).
    pub fn get_resident(&self, i: usize) -> Bitvector {
        self.slots.lock().expect("activation mutex poisoned")[i]
            .clone()
            .expect("get_resident called on a lazily-backed, unactivated slot")
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ioutil::{MemReader, MemWriter};
    use std::io::Write;
    use test_log::test;

    #[test]
    fn header_round_trips() {
        let mut w = MemWriter::new();
        write_header(&mut w, IndexTypeTag::Range, 4).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let (tag, ws) = read_header(&mut r).unwrap();
        assert_eq!(tag, IndexTypeTag::Range);
        assert_eq!(ws, 4);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut w = MemWriter::new();
        w.write_all(b"NOPE!").unwrap();
        w.write_u8(0).unwrap();
        w.write_u8(4).unwrap();
        w.write_u8(0).unwrap();
        let mut r = w.try_into_reader().unwrap();
        assert!(read_header(&mut r).is_err());
    }

    #[test]
    fn lazy_activation_caches_and_handles_absence() {
        let mut w = MemWriter::new();
        let mut bv = Bitvector::zeros(100);
        bv.set_bit(5, true);
        let start = w.pos().unwrap();
        bv.serialize(&mut w).unwrap();
        let mut r: MemReader = w.try_into_reader().unwrap();

        let lazy = LazyBitvectors::new(vec![0, (w_len(&bv) as i32), (w_len(&bv) as i32)], 100).unwrap();
        let a = lazy.activate(0, &mut r, start).unwrap();
        assert!(a.get_bit(5));
        let b = lazy.activate(1, &mut r, start).unwrap();
        assert_eq!(b.cnt(), 0);
        assert_eq!(b.len(), 100);
    }

    fn w_len(bv: &Bitvector) -> usize {
        let mut w = MemWriter::new();
        bv.serialize(&mut w).unwrap();
        w.pos().unwrap() as usize
    }
}
