//! Greedy selection of loci: taxon-coverage tiers and the total alignment length budget.

use std::{
    cmp::{min, max},
    path::PathBuf,
};
use crate::Error;

/// Aligned locus that may be included into the supermatrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocusCandidate {
    pub id: String,
    /// Number of taxa with at least one called base.
    pub n_taxa: usize,
    /// Number of alignment columns.
    pub len: u64,
    pub path: PathBuf,
}

impl LocusCandidate {
    pub fn new(id: impl Into<String>, n_taxa: usize, len: u64, path: PathBuf) -> Self {
        Self { id: id.into(), n_taxa, len, path }
    }
}

/// Selected locus and its columns `[start, end]` in the supermatrix (0-based, inclusive).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub locus: LocusCandidate,
    pub start: u64,
    pub end: u64,
}

/// Ordered selected loci with contiguous column ranges.
#[derive(Clone, Debug, Default)]
pub struct PartitionPlan {
    parts: Vec<Partition>,
}

impl PartitionPlan {
    pub fn parts(&self) -> &[Partition] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Total number of columns.
    pub fn total_len(&self) -> u64 {
        self.parts.last().map(|part| part.end + 1).unwrap_or(0)
    }

    fn push(&mut self, locus: LocusCandidate) {
        let start = self.total_len();
        let end = start + locus.len - 1;
        self.parts.push(Partition { locus, start, end });
    }
}

/// Smallest taxon count for a locus to be selected.
pub const MIN_TAXA: usize = 2;

/// Selects loci in tiers of decreasing taxon count, from `n_taxa` down to 2,
/// preserving the input order within a tier (input is ordered by locus variability).
/// Loci present in more than `n_taxa` taxa belong to the top tier.
///
/// Loci are appended until the total length exceeds `budget`; the locus that crosses the budget is included.
pub fn select(candidates: &[LocusCandidate], n_taxa: usize, budget: u64) -> crate::Result<PartitionPlan> {
    if let Some(empty) = candidates.iter().find(|locus| locus.len == 0) {
        return Err(Error::EmptyLocusAlignment(empty.path.clone()));
    }
    let top = max(n_taxa, MIN_TAXA);
    let mut plan = PartitionPlan::default();
    for tier in (MIN_TAXA..=top).rev() {
        for locus in candidates.iter().filter(|locus| min(locus.n_taxa, top) == tier) {
            plan.push(locus.clone());
            if plan.total_len() > budget {
                log::debug!("    Target length {} reached at locus {} (tier {})", budget, locus.id, tier);
                return Ok(plan);
            }
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, n_taxa: usize, len: u64) -> LocusCandidate {
        LocusCandidate::new(id, n_taxa, len, PathBuf::from(format!("{}.fa", id)))
    }

    fn ids(plan: &PartitionPlan) -> Vec<&str> {
        plan.parts().iter().map(|part| part.locus.id.as_str()).collect()
    }

    #[test]
    fn budget_overshoot() {
        let loci = [cand("1", 5, 200), cand("2", 5, 150), cand("3", 4, 900)];
        let plan = select(&loci, 5, 300).unwrap();
        assert_eq!(ids(&plan), vec!["1", "2"]);
        assert_eq!((plan.parts()[0].start, plan.parts()[0].end), (0, 199));
        assert_eq!((plan.parts()[1].start, plan.parts()[1].end), (200, 349));
    }

    #[test]
    fn tiers_before_input_order() {
        let loci = [cand("a", 3, 10), cand("b", 4, 10), cand("c", 2, 10), cand("d", 4, 10), cand("e", 3, 10)];
        let plan = select(&loci, 4, 1000).unwrap();
        assert_eq!(ids(&plan), vec!["b", "d", "a", "e", "c"]);
        let plan = select(&loci, 4, 25).unwrap();
        assert_eq!(ids(&plan), vec!["b", "d", "a"]);
    }

    #[test]
    fn all_selected_under_budget() {
        let loci = [cand("a", 2, 100), cand("b", 1, 100), cand("c", 3, 100), cand("d", 0, 100)];
        let plan = select(&loci, 3, 10_000).unwrap();
        assert_eq!(ids(&plan), vec!["c", "a"]);
        assert_eq!(plan.total_len(), 200);
        // Exactly reaching the budget does not stop the selection.
        let plan = select(&loci, 3, 100).unwrap();
        assert_eq!(ids(&plan), vec!["c", "a"]);
    }

    #[test]
    fn contiguous_offsets() {
        let loci: Vec<_> = (0..20).map(|i| cand(&i.to_string(), 2 + i % 4, 1 + 7 * i as u64)).collect();
        let plan = select(&loci, 5, 600).unwrap();
        let mut expected_start = 0;
        for part in plan.parts() {
            assert_eq!(part.start, expected_start);
            assert_eq!(part.end - part.start + 1, part.locus.len);
            expected_start = part.end + 1;
        }
        assert!(plan.total_len() > 600);
        let last_len = plan.parts().last().unwrap().locus.len;
        assert!(plan.total_len() - last_len <= 600);
    }

    #[test]
    fn more_taxa_than_expected() {
        let loci = [cand("a", 3, 10), cand("b", 7, 10), cand("c", 2, 10)];
        let plan = select(&loci, 3, 1000).unwrap();
        assert_eq!(ids(&plan), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_alignment() {
        let loci = [cand("a", 3, 10), cand("b", 3, 0)];
        match select(&loci, 3, 1000) {
            Err(Error::EmptyLocusAlignment(path)) => assert_eq!(path, PathBuf::from("b.fa")),
            other => panic!("Unexpected result {:?}", other),
        }
        assert!(select(&[], 3, 1000).unwrap().is_empty());
    }
}
