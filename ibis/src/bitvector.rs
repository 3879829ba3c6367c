//! Word-aligned hybrid compressed bitvector.
//!
//! Each 32-bit word is either a literal (top bit 0, the low 31 bits are
//! one group of row bits) or a fill (top bit 1, next bit the fill value,
//! low 30 bits a run length of 31-bit groups). Within a group, row `r`
//! (0-based, first appended first) lives at bit position `30 - r`,
//! MSB-first.
//!
//! The uncompressed tail too short to know whether it'll become a fill
//! or a literal is held separately as `active`, exactly as the source
//! does, and only folded into `words` once it reaches a full group
//! (`append_active`) or when the bitvector is finalized for use.

use std::{cell::Cell, fmt};

use crate::storage::Storage;
use ibis_base::{err, Result};

pub const GROUP_BITS: u32 = 31;
const ALLONES: u32 = (1u32 << GROUP_BITS) - 1;
const FILLBIT: u32 = 1 << 30;
const HEADER0: u32 = 2 << 30;
const HEADER1: u32 = 3 << 30;
const MAXCNT: u32 = (1 << 30) - 1;

// A word's top two bits: `0x` literal, `10` zero-fill, `11` one-fill.
// `HEADER0` is `2 << 30`, i.e. bit 31 alone, so testing against it tests
// exactly the fill flag regardless of the literal's other bits.
fn is_fill(w: u32) -> bool {
    w & HEADER0 != 0
}

fn fill_bit(w: u32) -> bool {
    w & FILLBIT != 0
}

fn fill_count(w: u32) -> u32 {
    w & MAXCNT
}

fn make_fill(bit: bool, count: u32) -> u32 {
    let header = if bit { HEADER1 } else { HEADER0 };
    header | (count & MAXCNT)
}

/// Number of 31-bit row groups a word represents: its fill run length, or
/// 1 for a literal.
fn group_count(w: u32) -> u32 {
    if is_fill(w) {
        fill_count(w)
    } else {
        1
    }
}

fn literal_get_bit(w: u32, r: u32) -> bool {
    debug_assert!(r < GROUP_BITS);
    (w >> (GROUP_BITS - 1 - r)) & 1 != 0
}

fn literal_set_bit(w: u32, r: u32, val: bool) -> u32 {
    debug_assert!(r < GROUP_BITS);
    let mask = 1u32 << (GROUP_BITS - 1 - r);
    if val {
        (w | mask) & ALLONES
    } else {
        w & !mask & ALLONES
    }
}

/// Push `w` onto a word sequence, merging it into an adjacent fill or
/// all-0/all-1 literal pair where possible, so the representation stays
/// canonical as it's built incrementally.
fn push_word_merging(words: &mut Vec<u32>, w: u32) {
    let w = if is_fill(w) && fill_count(w) == 1 {
        if fill_bit(w) {
            ALLONES
        } else {
            0
        }
    } else {
        w
    };
    let w_is_constant_literal = !is_fill(w) && (w == 0 || w == ALLONES);
    if let Some(&last) = words.last() {
        if is_fill(last) && is_fill(w) && fill_bit(last) == fill_bit(w) {
            let merged = fill_count(last) as u64 + fill_count(w) as u64;
            if merged <= MAXCNT as u64 {
                *words.last_mut().unwrap() = make_fill(fill_bit(w), merged as u32);
            } else {
                *words.last_mut().unwrap() = make_fill(fill_bit(w), MAXCNT);
                words.push(make_fill(fill_bit(w), (merged - MAXCNT as u64) as u32));
            }
            return;
        }
        if is_fill(last) && w_is_constant_literal && fill_bit(last) == (w == ALLONES) {
            if fill_count(last) < MAXCNT {
                *words.last_mut().unwrap() = make_fill(fill_bit(last), fill_count(last) + 1);
                return;
            }
        }
        if !is_fill(last) && (last == 0 || last == ALLONES) && w_is_constant_literal && last == w {
            *words.last_mut().unwrap() = make_fill(w == ALLONES, 2);
            return;
        }
    }
    words.push(w);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ActiveWord {
    val: u32,
    nbits: u8,
}

/// A word-aligned hybrid compressed bitvector.
///
/// `words` holds whole 31-bit row groups, each either a literal or a
/// fill run; `active` holds the partial group (fewer than 31 rows) still
/// accumulating at the tail. Population count is cached lazily and
/// invalidated by any mutation that could change it.
#[derive(Clone)]
pub struct Bitvector {
    words: Storage<u32>,
    active: ActiveWord,
    nset: Cell<Option<u64>>,
}

impl Bitvector {
    pub fn new() -> Self {
        Bitvector {
            words: Storage::empty(),
            active: ActiveWord::default(),
            nset: Cell::new(Some(0)),
        }
    }

    /// A bitvector of `n` rows, all zero.
    pub fn zeros(n: u64) -> Self {
        let mut bv = Bitvector::new();
        bv.append_fill(false, n);
        bv
    }

    /// A bitvector of `n` rows, all one.
    pub fn ones(n: u64) -> Self {
        let mut bv = Bitvector::new();
        bv.append_fill(true, n);
        bv
    }

    fn bump_nset(&self, delta: i64) {
        if let Some(c) = self.nset.get() {
            self.nset.set(Some((c as i64 + delta) as u64));
        }
    }

    fn invalidate_nset(&self) {
        self.nset.set(None);
    }

    /// Number of rows represented.
    pub fn len(&self) -> u64 {
        let words = self.words.as_cow();
        let groups: u64 = words.iter().map(|&w| group_count(w) as u64).sum();
        groups * GROUP_BITS as u64 + self.active.nbits as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of words in the compressed representation (excludes the
    /// active tail), for diagnostics and tests.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of set bits.
    pub fn cnt(&self) -> u64 {
        if let Some(c) = self.nset.get() {
            return c;
        }
        let words = self.words.as_cow();
        let mut total = 0u64;
        for &w in words.iter() {
            if is_fill(w) {
                if fill_bit(w) {
                    total += fill_count(w) as u64 * GROUP_BITS as u64;
                }
            } else {
                total += w.count_ones() as u64;
            }
        }
        for r in 0..self.active.nbits as u32 {
            if literal_get_bit(self.active.val << (GROUP_BITS - self.active.nbits as u32), r) {
                total += 1;
            }
        }
        self.nset.set(Some(total));
        total
    }

    pub fn get_bit(&self, i: u64) -> bool {
        let words = self.words.as_cow();
        let mut pos = 0u64;
        for &w in words.iter() {
            let group_bits = group_count(w) as u64 * GROUP_BITS as u64;
            if i < pos + group_bits {
                return if is_fill(w) {
                    fill_bit(w)
                } else {
                    literal_get_bit(w, (i - pos) as u32)
                };
            }
            pos += group_bits;
        }
        let rem = i - pos;
        if rem < self.active.nbits as u64 {
            let posn = self.active.nbits as u32 - rem as u32 - 1;
            (self.active.val >> posn) & 1 != 0
        } else {
            false
        }
    }

    /// Set row `i`, growing the bitvector with zero rows first if `i` is
    /// beyond the current length.
    pub fn set_bit(&mut self, i: u64, val: bool) {
        let len = self.len();
        if i >= len {
            self.append_fill(false, i - len);
            self.append_bit(val);
            return;
        }
        let active_start = len - self.active.nbits as u64;
        if i >= active_start {
            let r = (i - active_start) as u32;
            let was = (self.active.val >> (self.active.nbits as u32 - r - 1)) & 1 != 0;
            if was != val {
                let mask = 1u32 << (self.active.nbits as u32 - r - 1);
                self.active.val ^= mask;
                self.bump_nset(if val { 1 } else { -1 });
            }
            return;
        }

        let words = self.words.ensure_unique();
        let mut pos = 0u64;
        for idx in 0..words.len() {
            let w = words[idx];
            let group_bits = group_count(w) as u64 * GROUP_BITS as u64;
            if i >= pos + group_bits {
                pos += group_bits;
                continue;
            }
            let local = (i - pos) as u32;
            if !is_fill(w) {
                let was = literal_get_bit(w, local);
                if was != val {
                    words[idx] = literal_set_bit(w, local, val);
                    self.bump_nset(if val { 1 } else { -1 });
                }
                return;
            }
            let bit = fill_bit(w);
            if bit == val {
                return;
            }
            // Split the fill into [leading fill][one modified literal][trailing fill].
            let count = fill_count(w);
            let group_idx = local / GROUP_BITS;
            let row_in_group = local % GROUP_BITS;
            let lit = literal_set_bit(if bit { ALLONES } else { 0 }, row_in_group, val);
            let mut replacement = Vec::with_capacity(3);
            if group_idx > 0 {
                replacement.push(if group_idx == 1 {
                    if bit {
                        ALLONES
                    } else {
                        0
                    }
                } else {
                    make_fill(bit, group_idx)
                });
            }
            replacement.push(lit);
            let trailing = count - group_idx - 1;
            if trailing > 0 {
                replacement.push(if trailing == 1 {
                    if bit {
                        ALLONES
                    } else {
                        0
                    }
                } else {
                    make_fill(bit, trailing)
                });
            }
            words.splice(idx..idx + 1, replacement);
            self.bump_nset(if val { 1 } else { -1 });
            return;
        }
        unreachable!("index within compressed range but not found in any word");
    }

    pub fn append_bit(&mut self, b: bool) {
        self.active.val = ((self.active.val << 1) | (b as u32)) & ALLONES;
        self.active.nbits += 1;
        if b {
            self.bump_nset(1);
        }
        if self.active.nbits as u32 == GROUP_BITS {
            self.append_active();
        }
    }

    /// Flush a full active buffer (`active.nbits == 31`) into `words` as
    /// a literal, merging it into an adjacent fill if it's constant.
    pub fn append_active(&mut self) {
        debug_assert_eq!(self.active.nbits as u32, GROUP_BITS);
        let w = self.active.val & ALLONES;
        push_word_merging(self.words.ensure_unique(), w);
        self.active = ActiveWord::default();
    }

    /// Append `n` copies of `b`.
    pub fn append_fill(&mut self, b: bool, mut n: u64) {
        if n == 0 {
            return;
        }
        if self.active.nbits > 0 {
            let room = GROUP_BITS as u64 - self.active.nbits as u64;
            let take = room.min(n);
            for _ in 0..take {
                self.append_bit(b);
            }
            n -= take;
            if n == 0 {
                return;
            }
        }
        debug_assert_eq!(self.active.nbits, 0);
        let mut whole_groups = n / GROUP_BITS as u64;
        let rem = n % GROUP_BITS as u64;
        while whole_groups > 0 {
            let chunk = whole_groups.min(MAXCNT as u64);
            self.append_counter(b, chunk as u32);
            whole_groups -= chunk;
        }
        for _ in 0..rem {
            self.append_bit(b);
        }
    }

    /// Append `count` whole 31-bit groups of bit `b`. `self.active` must
    /// be empty.
    pub fn append_counter(&mut self, b: bool, count: u32) {
        debug_assert_eq!(self.active.nbits, 0);
        if count == 0 {
            return;
        }
        let w = if count == 1 {
            if b {
                ALLONES
            } else {
                0
            }
        } else {
            make_fill(b, count)
        };
        push_word_merging(self.words.ensure_unique(), w);
        if b {
            self.bump_nset(count as i64 * GROUP_BITS as i64);
        }
    }

    /// Append a raw WAH code word (literal or fill), as if its rows had
    /// been appended one at a time.
    pub fn append_word(&mut self, w: u32) {
        if is_fill(w) {
            self.append_fill(fill_bit(w), fill_count(w) as u64 * GROUP_BITS as u64);
        } else {
            for r in 0..GROUP_BITS {
                self.append_bit(literal_get_bit(w, r));
            }
        }
    }

    /// Concatenate `other`'s rows onto the end of `self`.
    pub fn append(&mut self, other: &Bitvector) {
        for &w in other.words.as_cow().iter() {
            self.append_word(w);
        }
        for r in 0..other.active.nbits as u32 {
            let posn = other.active.nbits as u32 - r - 1;
            self.append_bit((other.active.val >> posn) & 1 != 0);
        }
    }

    /// Invert every bit in place.
    pub fn flip(&mut self) {
        let total_len = self.len();
        let words = self.words.ensure_unique();
        for w in words.iter_mut() {
            if is_fill(*w) {
                *w ^= FILLBIT;
            } else {
                *w = (*w ^ ALLONES) & ALLONES;
            }
        }
        let mask = (1u32 << self.active.nbits) - 1;
        self.active.val ^= mask;
        if let Some(c) = self.nset.get() {
            self.nset.set(Some(total_len - c));
        }
    }

    /// Canonicalize the word sequence: merge adjacent same-value fills,
    /// absorb 1-run fills into literals. Doesn't change the bits
    /// represented.
    pub fn compress(&mut self) {
        let old = std::mem::take(self.words.ensure_unique());
        let mut rebuilt = Vec::with_capacity(old.len());
        for w in old {
            push_word_merging(&mut rebuilt, w);
        }
        *self.words.ensure_unique() = rebuilt;
    }

    /// Expand every fill into literal words. Useful for auditing, not
    /// for routine use — the point of WAH is to avoid exactly this.
    pub fn decompress(&self) -> Result<Bitvector> {
        let words = self.words.as_cow();
        let total_groups: u64 = words.iter().map(|&w| group_count(w) as u64).sum();
        let mut expanded: Vec<u32> = Vec::new();
        expanded
            .try_reserve(total_groups as usize)
            .map_err(|_| err("out of memory decompressing bitvector"))?;
        for &w in words.iter() {
            if is_fill(w) {
                let lit = if fill_bit(w) { ALLONES } else { 0 };
                for _ in 0..fill_count(w) {
                    expanded.push(lit);
                }
            } else {
                expanded.push(w);
            }
        }
        Ok(Bitvector {
            words: Storage::from_vec(expanded),
            active: self.active,
            nset: Cell::new(self.nset.get()),
        })
    }

    /// Population count of `self & other`, without materializing the
    /// intersection.
    pub fn count(&self, other: &Bitvector) -> u64 {
        let aw = self.words.as_cow();
        let bw = other.words.as_cow();
        let mut total = binary_op_count(&aw, &bw);
        total += combine_active(self.active, other.active, |x, y| x & y).val.count_ones() as u64;
        total
    }

    pub fn and(&self, other: &Bitvector) -> Bitvector {
        self.combine(other, |x, y| x & y, |x, y| x && y)
    }

    pub fn or(&self, other: &Bitvector) -> Bitvector {
        self.combine(other, |x, y| x | y, |x, y| x || y)
    }

    pub fn xor(&self, other: &Bitvector) -> Bitvector {
        self.combine(other, |x, y| x ^ y, |x, y| x ^ y)
    }

    /// `self` with every row also set in `other` cleared (`self &! other`).
    pub fn minus(&self, other: &Bitvector) -> Bitvector {
        self.combine(other, |x, y| x & !y, |x, y| x && !y)
    }

    fn combine(
        &self,
        other: &Bitvector,
        op: impl Fn(u32, u32) -> u32,
        fill_op: impl Fn(bool, bool) -> bool,
    ) -> Bitvector {
        let aw = self.words.as_cow();
        let bw = other.words.as_cow();
        let words = binary_op_words(&aw, &bw, &op, &fill_op);
        let active = combine_active(self.active, other.active, |x, y| op(x as u32, y as u32) as u64);
        Bitvector {
            words: Storage::from_vec(words),
            active,
            nset: Cell::new(None),
        }
    }

    pub fn and_assign(&mut self, other: &Bitvector) {
        *self = self.and(other);
    }

    pub fn or_assign(&mut self, other: &Bitvector) {
        *self = self.or(other);
    }

    pub fn xor_assign(&mut self, other: &Bitvector) {
        *self = self.xor(other);
    }

    /// Number of set bits in `[0, i)`.
    pub fn rank(&self, i: u64) -> u64 {
        let words = self.words.as_cow();
        let mut total = 0u64;
        let mut pos = 0u64;
        for &w in words.iter() {
            let group_bits = group_count(w) as u64 * GROUP_BITS as u64;
            if pos + group_bits <= i {
                if is_fill(w) {
                    if fill_bit(w) {
                        total += group_bits;
                    }
                } else {
                    total += w.count_ones() as u64;
                }
                pos += group_bits;
                continue;
            }
            let rem = i - pos;
            if is_fill(w) {
                if fill_bit(w) {
                    total += rem;
                }
            } else {
                for r in 0..rem as u32 {
                    if literal_get_bit(w, r) {
                        total += 1;
                    }
                }
            }
            return total;
        }
        let rem = (i - pos).min(self.active.nbits as u64) as u32;
        for r in 0..rem {
            let posn = self.active.nbits as u32 - r - 1;
            if (self.active.val >> posn) & 1 != 0 {
                total += 1;
            }
        }
        total
    }

    /// Position of the `k`-th set bit (0-indexed), if one exists.
    pub fn select(&self, k: u64) -> Option<u64> {
        self.iter_set().nth(k as usize)
    }

    /// Ascending iterator over the positions of set bits.
    pub fn iter_set(&self) -> SetBitIter {
        SetBitIter::new(self.words.to_vec(), self.active, self.len() - self.active.nbits as u64)
    }

    pub fn serialize<W: crate::ioutil::Writer>(&self, w: &mut W) -> Result<()> {
        let words = self.words.to_vec();
        w.write_u32(words.len() as u32)?;
        w.write_u32_slice(&words)?;
        w.write_u32(self.active.val)?;
        w.write_u8(self.active.nbits)?;
        Ok(())
    }

    pub fn deserialize<R: crate::ioutil::Reader>(r: &mut R) -> Result<Bitvector> {
        let n = r.read_u32()? as usize;
        let words = r.read_u32_vec(n)?;
        let active_val = r.read_u32()?;
        let active_nbits = r.read_u8()?;
        Ok(Bitvector {
            words: Storage::from_vec(words),
            active: ActiveWord {
                val: active_val,
                nbits: active_nbits,
            },
            nset: Cell::new(None),
        })
    }
}

impl Default for Bitvector {
    fn default() -> Self {
        Bitvector::new()
    }
}

impl PartialEq for Bitvector {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut a = self.clone();
        a.compress();
        let mut b = other.clone();
        b.compress();
        a.words.to_vec() == b.words.to_vec() && a.active == b.active
    }
}

impl fmt::Debug for Bitvector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bitvector {{ len: {}, words: {}, active_nbits: {} }}",
            self.len(),
            self.words.len(),
            self.active.nbits
        )
    }
}

impl fmt::Display for Bitvector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &w in self.words.as_cow().iter() {
            if is_fill(w) {
                write!(f, "[{}x{}]", if fill_bit(w) { '1' } else { '0' }, fill_count(w))?;
            } else {
                write!(f, "{:031b}", w)?;
            }
        }
        if self.active.nbits > 0 {
            write!(f, "+{:0width$b}", self.active.val, width = self.active.nbits as usize)?;
        }
        Ok(())
    }
}

/// Walks the groups of a word sequence in lockstep with another,
/// transparently padding the shorter one with implicit zero-fill past
/// its end.
struct Cursor<'a> {
    words: &'a [u32],
    idx: usize,
    rem: u32,
}

impl<'a> Cursor<'a> {
    fn new(words: &'a [u32]) -> Self {
        let mut c = Cursor { words, idx: 0, rem: 0 };
        c.load();
        c
    }

    fn load(&mut self) {
        if self.idx < self.words.len() {
            let w = self.words[self.idx];
            self.rem = group_count(w);
        }
    }

    fn done(&self) -> bool {
        self.idx >= self.words.len()
    }

    fn is_fill(&self) -> bool {
        self.done() || is_fill(self.words[self.idx])
    }

    fn literal(&self) -> u32 {
        self.words[self.idx]
    }

    fn fill_bit(&self) -> bool {
        !self.done() && fill_bit(self.words[self.idx])
    }

    fn advance(&mut self, groups: u32) {
        if self.done() {
            return;
        }
        self.rem -= groups;
        if self.rem == 0 {
            self.idx += 1;
            self.load();
        }
    }
}

fn binary_op_words(
    a: &[u32],
    b: &[u32],
    op: &impl Fn(u32, u32) -> u32,
    fill_op: &impl Fn(bool, bool) -> bool,
) -> Vec<u32> {
    let mut ca = Cursor::new(a);
    let mut cb = Cursor::new(b);
    let mut out = Vec::new();
    loop {
        if ca.done() && cb.done() {
            break;
        }
        let af = ca.is_fill();
        let bf = cb.is_fill();
        if !af && !bf {
            let lit = op(ca.literal(), cb.literal()) & ALLONES;
            push_word_merging(&mut out, lit);
            ca.advance(1);
            cb.advance(1);
        } else if af && bf {
            let take = match (ca.done(), cb.done()) {
                (true, true) => break,
                (true, false) => cb.rem,
                (false, true) => ca.rem,
                (false, false) => ca.rem.min(cb.rem),
            };
            let bit = fill_op(ca.fill_bit(), cb.fill_bit());
            if take == 1 {
                out.push(if bit { ALLONES } else { 0 });
            } else {
                push_word_merging(&mut out, make_fill(bit, take));
            }
            ca.advance(take);
            cb.advance(take);
        } else {
            let (lit, fbit) = if !af {
                (ca.literal(), cb.fill_bit())
            } else {
                (cb.literal(), ca.fill_bit())
            };
            let fill_word = if fbit { ALLONES } else { 0 };
            let combined = if !af {
                op(lit, fill_word)
            } else {
                op(fill_word, lit)
            } & ALLONES;
            push_word_merging(&mut out, combined);
            ca.advance(1);
            cb.advance(1);
        }
    }
    out
}

fn binary_op_count(a: &[u32], b: &[u32]) -> u64 {
    let mut ca = Cursor::new(a);
    let mut cb = Cursor::new(b);
    let mut total = 0u64;
    loop {
        if ca.done() && cb.done() {
            break;
        }
        let af = ca.is_fill();
        let bf = cb.is_fill();
        if !af && !bf {
            total += (ca.literal() & cb.literal()).count_ones() as u64;
            ca.advance(1);
            cb.advance(1);
        } else if af && bf {
            let take = match (ca.done(), cb.done()) {
                (true, true) => break,
                (true, false) => cb.rem,
                (false, true) => ca.rem,
                (false, false) => ca.rem.min(cb.rem),
            };
            if ca.fill_bit() && cb.fill_bit() {
                total += take as u64 * GROUP_BITS as u64;
            }
            ca.advance(take);
            cb.advance(take);
        } else {
            let (lit, fbit) = if !af {
                (ca.literal(), cb.fill_bit())
            } else {
                (cb.literal(), ca.fill_bit())
            };
            if fbit {
                total += lit.count_ones() as u64;
            }
            ca.advance(1);
            cb.advance(1);
        }
    }
    total
}

fn combine_active(a: ActiveWord, b: ActiveWord, op: impl Fn(u64, u64) -> u64) -> ActiveWord {
    let target = a.nbits.max(b.nbits) as u32;
    let av = (a.val as u64) << (target - a.nbits as u32);
    let bv = (b.val as u64) << (target - b.nbits as u32);
    let combined = op(av, bv);
    let mask: u64 = if target == 0 { 0 } else { (1u64 << target) - 1 };
    ActiveWord {
        val: (combined & mask) as u32,
        nbits: target as u8,
    }
}

/// Lazy ascending iterator over set-bit positions.
pub struct SetBitIter {
    words: Vec<u32>,
    widx: usize,
    bit_base: u64,
    row_cursor: u32,
    pending_run: Option<(u64, u64)>,
    active: ActiveWord,
    active_base: u64,
    active_row: u32,
    in_active: bool,
}

impl SetBitIter {
    fn new(words: Vec<u32>, active: ActiveWord, active_base: u64) -> Self {
        SetBitIter {
            words,
            widx: 0,
            bit_base: 0,
            row_cursor: 0,
            pending_run: None,
            active,
            active_base,
            active_row: 0,
            in_active: false,
        }
    }
}

impl Iterator for SetBitIter {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some((pos, end)) = self.pending_run {
                if pos < end {
                    self.pending_run = Some((pos + 1, end));
                    return Some(pos);
                }
                self.pending_run = None;
            }
            if self.widx >= self.words.len() {
                if !self.in_active {
                    self.in_active = true;
                }
                if self.active_row >= self.active.nbits as u32 {
                    return None;
                }
                let posn = self.active.nbits as u32 - self.active_row - 1;
                let bit = (self.active.val >> posn) & 1 != 0;
                let pos = self.active_base + self.active_row as u64;
                self.active_row += 1;
                if bit {
                    return Some(pos);
                }
                continue;
            }
            let w = self.words[self.widx];
            if is_fill(w) {
                let gc = fill_count(w) as u64;
                let group_bits = gc * GROUP_BITS as u64;
                if fill_bit(w) {
                    let start = self.bit_base;
                    let end = start + group_bits;
                    self.bit_base = end;
                    self.widx += 1;
                    self.row_cursor = 0;
                    self.pending_run = Some((start, end));
                    continue;
                }
                self.bit_base += group_bits;
                self.widx += 1;
                self.row_cursor = 0;
                continue;
            }
            if self.row_cursor >= GROUP_BITS {
                self.row_cursor = 0;
                self.bit_base += GROUP_BITS as u64;
                self.widx += 1;
                continue;
            }
            let r = self.row_cursor;
            self.row_cursor += 1;
            if literal_get_bit(w, r) {
                return Some(self.bit_base + r as u64);
            }
        }
    }
}

#[cfg(test)]
mod test;
