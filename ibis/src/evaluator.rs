//! Entry point for the shared range-evaluation protocol.
//!
//! The protocol itself — normalize a predicate to a half-open range,
//! `locate` its candidate/hit bins, compose bitvectors, invoke
//! `rescan` for the undecided boundary — is implemented once as the
//! default methods on `index::IndexOps`, so every variant gets it for
//! free and only has to supply `bin_mask`. This module is the dispatch
//! surface callers actually go through: it takes any `&dyn IndexOps`
//! rather than requiring callers to know which variant they hold.

use ibis_base::Result;

use crate::{
    bitvector::Bitvector,
    column::{Partition, Predicate},
    index::IndexOps,
};

/// Evaluate `predicate` against `index`, over `partition` for any
/// boundary rescans it needs.
pub fn evaluate(index: &dyn IndexOps, predicate: &Predicate, partition: &dyn Partition) -> Result<Bitvector> {
    index.evaluate(predicate, partition)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        column::{InMemoryPartition, Op},
        index::bin::BinIndex,
    };
    use test_log::test;

    #[test]
    fn dispatches_through_dyn_index_ops() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let bounds = crate::bounds::equi_width(0.0, 100.0, 10);
        let idx = BinIndex::build(&values, bounds);
        let part = InMemoryPartition::new(&values);
        let predicate = Predicate::single(Op::Ge, 40.0);
        let result = evaluate(&idx, &predicate, &part).unwrap();
        assert_eq!(result.cnt(), 60);
    }
}
