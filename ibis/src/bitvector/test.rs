use super::*;
use test_log::test;

#[test]
fn round_trip_empty() {
    let bv = Bitvector::new();
    let mut w = crate::ioutil::MemWriter::new();
    bv.serialize(&mut w).unwrap();
    let mut r = w.try_into_reader().unwrap();
    let back = Bitvector::deserialize(&mut r).unwrap();
    assert_eq!(bv, back);
}

#[test]
fn round_trip_mixed() {
    let mut bv = Bitvector::new();
    bv.append_fill(true, 1000);
    bv.append_bit(false);
    bv.append_bit(true);
    bv.append_fill(false, 5000);
    bv.append_bit(true);
    let mut w = crate::ioutil::MemWriter::new();
    bv.serialize(&mut w).unwrap();
    let mut r = w.try_into_reader().unwrap();
    let back = Bitvector::deserialize(&mut r).unwrap();
    assert_eq!(bv, back);
    assert_eq!(bv.cnt(), back.cnt());
}

#[test]
fn compression_invariance() {
    let mut a = Bitvector::new();
    a.append_fill(true, 1000);
    a.append_fill(true, 2000);
    a.append_bit(false);
    let before = a.decompress().unwrap();
    let mut compressed = a.clone();
    compressed.compress();
    let after = compressed.decompress().unwrap();
    assert_eq!(before.cnt(), after.cnt());
    assert_eq!(before.len(), after.len());
    for i in 0..before.len().min(4000) {
        assert_eq!(before.get_bit(i), after.get_bit(i));
    }
}

fn sample(seed: u64, n: u64) -> Bitvector {
    let mut bv = Bitvector::new();
    let mut x = seed.wrapping_mul(2654435761).wrapping_add(1);
    for _ in 0..n {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        bv.append_bit((x >> 33) & 1 != 0);
    }
    bv
}

#[test]
fn boolean_algebra_laws() {
    let a = sample(1, 500);
    let b = sample(2, 500);
    let c = sample(3, 500);

    assert_eq!(a.and(&b), b.and(&a));
    assert_eq!(a.or(&b), b.or(&a));
    assert_eq!(a.xor(&b), b.xor(&a));

    assert_eq!(a.and(&b).and(&c), a.and(&b.and(&c)));
    assert_eq!(a.or(&b).or(&c), a.or(&b.or(&c)));
    assert_eq!(a.xor(&b).xor(&c), a.xor(&b.xor(&c)));

    let mut not_a = a.clone();
    not_a.flip();
    assert_eq!(a.minus(&b), a.and(&b.clone().tap_flip()));

    let zero = Bitvector::zeros(a.len());
    assert_eq!(a.and(&not_a), zero);
    let full = Bitvector::ones(a.len());
    assert_eq!(a.or(&not_a), full);

    // De Morgan
    let mut and_flipped = a.and(&b);
    and_flipped.flip();
    let mut or_of_flips = a.clone();
    or_of_flips.flip();
    let mut b_flipped = b.clone();
    b_flipped.flip();
    assert_eq!(and_flipped, or_of_flips.or(&b_flipped));
}

trait TapFlip {
    fn tap_flip(self) -> Self;
}
impl TapFlip for Bitvector {
    fn tap_flip(mut self) -> Self {
        self.flip();
        self
    }
}

#[test]
fn random_set_bit_updates_popcount_by_at_most_one() {
    let mut bv = sample(7, 300);
    let before = bv.cnt();
    let was = bv.get_bit(150);
    bv.set_bit(150, true);
    assert!(bv.get_bit(150));
    let after = bv.cnt();
    assert_eq!(after, before + if was { 0 } else { 1 });
}

#[test]
fn count_matches_and_popcount() {
    let a = sample(11, 2000);
    let b = sample(12, 2000);
    assert_eq!(a.count(&b), a.and(&b).cnt());
}

#[test]
fn flip_idempotent() {
    let mut a = sample(5, 777);
    let orig = a.clone();
    a.flip();
    a.flip();
    assert_eq!(a, orig);
}

#[test]
fn scenario_a_single_one_fill() {
    let bv = Bitvector::ones(1_000_000);
    assert_eq!(bv.cnt(), 1_000_000);
    assert_eq!(bv.word_count(), 1);
}

#[test]
fn scenario_b_alternating_bits() {
    let mut bv = Bitvector::new();
    for i in 0..1_000_000u64 {
        bv.append_bit(i % 2 == 1);
    }
    assert_eq!(bv.cnt(), 500_000);
    let words = bv.word_count();
    assert!(words > 1000, "alternating bits should compress to all-literal words, got {words}");
}

#[test]
fn scenario_c_and_of_sparse_vectors() {
    let mut a = Bitvector::zeros(20_000_000);
    a.set_bit(10, true);
    a.set_bit(10_000, true);
    a.set_bit(10_000_000, true);
    let mut b = Bitvector::zeros(20_000_000);
    b.set_bit(10_000, true);
    b.set_bit(20_000, true);

    let c = a.and(&b);
    assert_eq!(c.cnt(), 1);
    assert_eq!(c.select(0), Some(10_000));
    assert!(c.word_count() * 4 < 64);
}

#[test]
fn iter_set_matches_get_bit() {
    let bv = sample(21, 400);
    let positions: Vec<u64> = bv.iter_set().collect();
    for i in 0..400 {
        assert_eq!(bv.get_bit(i), positions.contains(&i));
    }
}

#[test]
fn rank_select_consistent() {
    let bv = sample(22, 400);
    let mut running = 0u64;
    for i in 0..400 {
        assert_eq!(bv.rank(i), running);
        if bv.get_bit(i) {
            running += 1;
        }
    }
    for k in 0..running {
        let pos = bv.select(k).unwrap();
        assert!(bv.get_bit(pos));
    }
}
