//! Two-level hierarchical index family: `ambit`, `pale`, and `fuge`
//! share one structure — a coarse equality index over groups of
//! consecutive bins, plus a fine equality index over a bin's position
//! within its group, combined exactly like the digit split in
//! `crate::index::egale` — but differ in how many bins a coarse group
//! spans, and in `evaluate`'s query planner, which picks among five
//! strategies by estimated selectivity rather than always decomposing
//! through both levels.
//!
//! The three variants are distinguished only by their target group
//! width (how eagerly they promote a fine-grained run of bins into one
//! coarse group) and their on-disk type tag; see DESIGN.md for why that
//! width was chosen for each.

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    fileformat::IndexTypeTag,
    index::{bin::BinIndex, decompose_digit_range, half_integer_bounds, IndexCore, IndexOps},
    ioutil::{Reader, Writer},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoLevelKind {
    Ambit,
    Pale,
    Fuge,
}

impl TwoLevelKind {
    /// Target number of fine bins per coarse group. Ambit groups
    /// tightly (fine-grained coarse index, cheap rescans), fuge groups
    /// loosely (coarse index stays small even for very high-cardinality
    /// columns), pale sits in between.
    fn target_group_width(self) -> usize {
        match self {
            TwoLevelKind::Ambit => 4,
            TwoLevelKind::Pale => 16,
            TwoLevelKind::Fuge => 64,
        }
    }

    fn tag(self) -> IndexTypeTag {
        match self {
            TwoLevelKind::Ambit => IndexTypeTag::Ambit,
            TwoLevelKind::Pale => IndexTypeTag::Pale,
            TwoLevelKind::Fuge => IndexTypeTag::Fuge,
        }
    }

    fn from_tag(tag: IndexTypeTag) -> Option<Self> {
        Some(match tag {
            IndexTypeTag::Ambit => TwoLevelKind::Ambit,
            IndexTypeTag::Pale => TwoLevelKind::Pale,
            IndexTypeTag::Fuge => TwoLevelKind::Fuge,
            _ => return None,
        })
    }
}

pub struct TwoLevelIndex {
    pub core: IndexCore,
    kind: TwoLevelKind,
    group_width: u64,
    coarse: BinIndex,
    fine: BinIndex,
}

impl TwoLevelIndex {
    pub fn build(kind: TwoLevelKind, values: &[f64], bounds: Vec<f64>) -> Self {
        let nobs = bounds.len() + 1;
        let nrows = values.len() as u64;
        let group_width = (kind.target_group_width() as u64).max(1);
        let ngroups = nobs.div_ceil(group_width as usize);

        let mut minval = vec![f64::INFINITY; nobs];
        let mut maxval = vec![f64::NEG_INFINITY; nobs];
        let mut coarse_vals = Vec::with_capacity(values.len());
        let mut fine_vals = Vec::with_capacity(values.len());
        for &v in values {
            let b = bounds.partition_point(|&bound| bound <= v);
            minval[b] = minval[b].min(v);
            maxval[b] = maxval[b].max(v);
            coarse_vals.push((b as u64 / group_width) as f64);
            fine_vals.push((b as u64 % group_width) as f64);
        }

        let coarse = BinIndex::build(&coarse_vals, half_integer_bounds(ngroups));
        let fine = BinIndex::build(&fine_vals, half_integer_bounds(group_width as usize));

        TwoLevelIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            kind,
            group_width,
            coarse,
            fine,
        }
    }

    pub fn serialize<W: Writer>(&self, w: &mut W) -> Result<()> {
        crate::fileformat::write_header(w, self.kind.tag(), 4)?;
        w.write_u32(self.group_width as u32)?;
        let nobs = self.core.nobs();
        w.write_u32(nobs as u32)?;
        w.write_f64_slice(&self.core.bounds)?;
        w.write_f64_slice(&self.core.maxval)?;
        w.write_f64_slice(&self.core.minval)?;
        self.coarse.serialize(w)?;
        self.fine.serialize(w)?;
        Ok(())
    }

    pub fn deserialize<R: Reader>(r: &mut R) -> Result<Self> {
        let (tag, _word_size) = crate::fileformat::read_header(r)?;
        let kind = TwoLevelKind::from_tag(tag).ok_or_else(|| ibis_base::err("not a two-level index file"))?;
        let group_width = r.read_u32()? as u64;
        let nobs = r.read_u32()? as usize;
        let bounds = r.read_f64_vec(nobs.saturating_sub(1))?;
        let maxval = r.read_f64_vec(nobs)?;
        let minval = r.read_f64_vec(nobs)?;
        let coarse = BinIndex::deserialize(r)?;
        let fine = BinIndex::deserialize(r)?;
        let nrows = coarse.core.nrows;
        Ok(TwoLevelIndex {
            core: IndexCore {
                nrows,
                bounds,
                minval,
                maxval,
            },
            kind,
            group_width,
            coarse,
            fine,
        })
    }

    pub fn kind(&self) -> TwoLevelKind {
        self.kind
    }
}

impl IndexOps for TwoLevelIndex {
    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn bin_mask(&self, i: usize) -> Result<Bitvector> {
        let c = self.coarse.bin_mask(i / self.group_width as usize)?;
        let f = self.fine.bin_mask(i % self.group_width as usize)?;
        Ok(c.and(&f))
    }

    /// Picks among five query plans by estimated selectivity, logging
    /// which one fired:
    /// 1. empty candidate interval — zero result, no bitvector work;
    /// 2. full candidate interval (spans every bin) — all rows, no
    ///    bitvector work;
    /// 3. a single fine bin — one `bin_mask` call, no decomposition;
    /// 4. a narrow candidate interval within one coarse group — compose
    ///    via the fine index alone, skipping the coarse level;
    /// 5. the general case — the two-level digit decomposition.
    fn estimate(&self, lo_bound: f64, hi_bound: f64) -> Result<(Bitvector, Bitvector)> {
        let loc = self.locate(lo_bound, hi_bound);
        let nobs = self.nobs();

        if loc.cand1 <= loc.cand0 {
            tracing::debug!(target: "ibis", plan = "empty", "two-level query plan");
            let z = Bitvector::zeros(self.nrows());
            return Ok((z.clone(), z));
        }
        if loc.hit0 == 0 && loc.hit1 == nobs {
            tracing::debug!(target: "ibis", plan = "full", "two-level query plan");
            let o = Bitvector::ones(self.nrows());
            return Ok((o.clone(), o));
        }
        if loc.hit1 == loc.hit0 + 1 {
            tracing::debug!(target: "ibis", plan = "single-bin", "two-level query plan");
            let lower = self.bin_mask(loc.hit0)?;
            let mut upper = lower.clone();
            if loc.cand0 < loc.hit0 {
                upper.or_assign(&self.bin_mask(loc.cand0)?);
            }
            if loc.hit1 < loc.cand1 {
                upper.or_assign(&self.bin_mask(loc.hit1)?);
            }
            return Ok((lower, upper));
        }
        let gw = self.group_width as usize;
        if loc.hit0 / gw == (loc.hit1 - 1) / gw {
            tracing::debug!(target: "ibis", plan = "within-group", "two-level query plan");
            let group = loc.hit0 / gw;
            let c = self.coarse.bin_mask(group)?;
            let predicate = crate::column::Predicate {
                lop: crate::column::Op::Ge,
                lbound: (loc.hit0 % gw) as f64,
                rop: crate::column::Op::Le,
                rbound: ((loc.hit1 - 1) % gw) as f64,
            };
            let no_rescan = crate::index::NoRescanPartition { nrows: self.nrows() };
            let f = self.fine.evaluate(&predicate, &no_rescan)?;
            let lower = c.and(&f);
            let mut upper = lower.clone();
            if loc.cand0 < loc.hit0 {
                upper.or_assign(&self.bin_mask(loc.cand0)?);
            }
            if loc.hit1 < loc.cand1 {
                upper.or_assign(&self.bin_mask(loc.hit1)?);
            }
            return Ok((lower, upper));
        }

        tracing::debug!(target: "ibis", plan = "general", "two-level query plan");
        let lower = decompose_digit_range(&self.coarse, &self.fine, self.group_width, loc.hit0, loc.hit1)?;
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
