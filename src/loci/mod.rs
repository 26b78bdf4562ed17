//! Per-locus alignments: gathering alleles across taxa, loading ranked candidates,
//! and writing the concatenated supermatrix with its partitions.

pub mod select;

use std::{
    io::{BufRead, Write},
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    path::{Path, PathBuf},
};
use crate::{
    Error,
    err::{add_path, error},
    ext,
    seq::{self, NamedSeq, fastx},
};
pub use select::{LocusCandidate, PartitionPlan, select};

/// Gap symbol, used for taxa without a locus.
const GAP: u8 = b'-';

/// Per-locus FASTA file within the unaligned or aligned loci directory.
pub fn locus_fasta(dir: &Path, locus: &str) -> PathBuf {
    dir.join(format!("{}.fa", locus))
}

/// Loads alleles of each taxon (one FASTA record per locus) and writes one FASTA file per locus
/// into `out_dir`, where records are named after taxa.
/// Only loci with alleles in at least two taxa are written. Returns identifiers of the written loci.
pub fn gather_loci(taxa_alleles: &[(&str, PathBuf)], out_dir: &Path) -> crate::Result<Vec<String>> {
    let mut loci: BTreeMap<String, Vec<NamedSeq>> = BTreeMap::new();
    for (taxon, path) in taxa_alleles.iter() {
        let mut seen = HashSet::new();
        fastx::for_each_record(path, |record| {
            let locus = record.id();
            if locus.contains('/') {
                return Err(error!(InvalidData, "Locus name {} in {} cannot be used as a file name",
                    locus, ext::fmt::path(path)));
            }
            if !seen.insert(locus.to_owned()) {
                return Err(error!(InvalidData, "Locus {} appears twice in {}", locus, ext::fmt::path(path)));
            }
            if seq::has_bases(record.seq()) {
                loci.entry(locus.to_owned()).or_default().push(NamedSeq::new((*taxon).to_owned(), record.seq().to_vec()));
            }
            Ok(())
        })?;
    }

    ext::sys::mkdir(out_dir)?;
    let mut written = Vec::new();
    for (locus, alleles) in loci.into_iter() {
        if alleles.len() < select::MIN_TAXA {
            continue;
        }
        let path = locus_fasta(out_dir, &locus);
        let mut f = ext::sys::create_file(&path)?;
        for allele in alleles.iter() {
            seq::write_fasta(&mut f, allele.name(), None, allele.seq()).map_err(add_path!(path))?;
        }
        f.flush().map_err(add_path!(path))?;
        written.push(locus);
    }
    log::debug!("    Gathered {} loci present in at least {} taxa", written.len(), select::MIN_TAXA);
    Ok(written)
}

/// Loads locus identifiers from the ranking file (first column), most variable loci first.
pub fn load_ranking(path: &Path) -> crate::Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    for line in ext::sys::open(path)?.lines() {
        let line = line.map_err(add_path!(path))?;
        let Some(id) = line.split_whitespace().next() else { continue };
        if id.starts_with('#') {
            continue;
        }
        if !seen.insert(id.to_owned()) {
            return Err(error!(InvalidData, "Locus {} appears twice in the ranking {}", id, ext::fmt::path(path)));
        }
        ids.push(id.to_owned());
    }
    Ok(ids)
}

/// Loads aligned locus and checks that all rows have the same length.
fn load_locus(path: &Path) -> crate::Result<Vec<NamedSeq>> {
    let rows = fastx::read_all(path)?;
    if let Some(first) = rows.first() {
        if let Some(row) = rows.iter().find(|row| row.seq().len() != first.seq().len()) {
            return Err(error!(InvalidData, "Aligned sequences {} and {} in {} have different lengths ({} and {})",
                first.name(), row.name(), ext::fmt::path(path), first.seq().len(), row.seq().len()));
        }
    }
    Ok(rows)
}

impl LocusCandidate {
    /// Loads candidate from the aligned locus file.
    pub fn load(id: &str, path: PathBuf) -> crate::Result<Self> {
        let rows = load_locus(&path)?;
        let n_taxa = rows.iter().filter(|row| seq::has_bases(row.seq())).count();
        let len = rows.first().map(|row| row.seq().len() as u64).unwrap_or(0);
        Ok(Self::new(id, n_taxa, len, path))
    }
}

/// Loads candidates in the ranking order. Aligned files, absent from the ranking, are ignored.
pub fn load_candidates(ranking: &[String], aligned_dir: &Path) -> crate::Result<Vec<LocusCandidate>> {
    ranking.iter().map(|id| {
        let path = locus_fasta(aligned_dir, id);
        if !path.exists() {
            return Err(error!(InvalidData, "Ranked locus {} has no alignment {}", id, ext::fmt::path(&path)));
        }
        LocusCandidate::load(id, path)
    }).collect()
}

/// Writes partitions in the RAxML format (1-based, inclusive): `DNA, <locus> = <start>-<end>`.
pub fn write_partitions<W: Write>(plan: &PartitionPlan, mut f: W) -> std::io::Result<()> {
    for part in plan.parts() {
        writeln!(f, "DNA, {} = {}-{}", part.locus.id, part.start + 1, part.end + 1)?;
    }
    Ok(())
}

/// Concatenated alignment of the selected loci.
pub struct Supermatrix {
    taxa: Vec<String>,
    rows: Vec<Vec<u8>>,
}

impl Supermatrix {
    /// Loads selected loci and concatenates them. Taxa are sorted by name; absent loci are filled with gaps.
    pub fn build(plan: &PartitionPlan) -> crate::Result<Self> {
        let loci = plan.parts().iter()
            .map(|part| load_locus(&part.locus.path))
            .collect::<crate::Result<Vec<_>>>()?;
        let taxa: Vec<String> = loci.iter().flatten().map(|row| row.name().to_owned())
            .collect::<BTreeSet<_>>().into_iter().collect();
        let taxon_ixs: HashMap<&str, usize> = taxa.iter().enumerate().map(|(i, name)| (name.as_str(), i)).collect();

        let total = plan.total_len() as usize;
        let mut rows = vec![Vec::with_capacity(total); taxa.len()];
        for (part, locus) in plan.parts().iter().zip(loci.into_iter()) {
            let len = part.locus.len as usize;
            for row in locus.into_iter() {
                if row.seq().len() != len {
                    return Err(error!(InvalidData, "Locus {} changed since it was ranked ({} columns instead of {})",
                        ext::fmt::path(&part.locus.path), row.seq().len(), len));
                }
                // Duplicated taxon names within a locus: the first record is used.
                let seq_row = &mut rows[taxon_ixs[row.name()]];
                if seq_row.len() == part.start as usize {
                    seq_row.extend_from_slice(row.seq());
                }
            }
            for seq_row in rows.iter_mut() {
                seq_row.resize(part.end as usize + 1, GAP);
            }
        }
        Ok(Self { taxa, rows })
    }

    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    pub fn write_fasta<W: Write>(&self, mut f: W) -> std::io::Result<()> {
        for (name, row) in self.taxa.iter().zip(&self.rows) {
            seq::write_fasta(&mut f, name, None, row)?;
        }
        Ok(())
    }

    /// Writes relaxed PHYLIP (names are separated from sequences by whitespace).
    pub fn write_phylip<W: Write>(&self, mut f: W) -> std::io::Result<()> {
        let n_cols = self.rows.first().map(Vec::len).unwrap_or(0);
        writeln!(f, "{} {}", self.taxa.len(), n_cols)?;
        let width = self.taxa.iter().map(String::len).max().unwrap_or(0);
        for (name, row) in self.taxa.iter().zip(&self.rows) {
            write!(f, "{:width$}  ", name)?;
            f.write_all(row)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Selects loci and writes partitions, supermatrix FASTA and PHYLIP files.
/// `n_taxa`: number of taxa in the run; if zero, the maximal number of taxa across loci is used.
pub fn select_and_write(
    ranking_path: &Path,
    aligned_dir: &Path,
    n_taxa: usize,
    budget: u64,
    out_partitions: &Path,
    out_fasta: &Path,
    out_phylip: &Path,
) -> crate::Result<PartitionPlan> {
    let ranking = load_ranking(ranking_path)?;
    let candidates = load_candidates(&ranking, aligned_dir)?;
    let n_taxa = if n_taxa > 0 { n_taxa } else { candidates.iter().map(|locus| locus.n_taxa).max().unwrap_or(0) };
    let plan = select(&candidates, n_taxa, budget)?;
    if plan.is_empty() {
        return Err(Error::InvalidData(format!("None of {} ranked loci are present in at least {} taxa",
            candidates.len(), select::MIN_TAXA)));
    }
    log::info!("    Selected {} out of {} loci, {} columns in total", plan.len(), candidates.len(), plan.total_len());

    let mut f = ext::sys::create_file(out_partitions)?;
    write_partitions(&plan, &mut f).and_then(|_| f.flush()).map_err(add_path!(out_partitions))?;
    let supermatrix = Supermatrix::build(&plan)?;
    let mut f = ext::sys::create_file(out_fasta)?;
    supermatrix.write_fasta(&mut f).and_then(|_| f.flush()).map_err(add_path!(out_fasta))?;
    let mut f = ext::sys::create_file(out_phylip)?;
    supermatrix.write_phylip(&mut f).and_then(|_| f.flush()).map_err(add_path!(out_phylip))?;
    log::debug!("    Supermatrix: {} taxa", supermatrix.n_taxa());
    Ok(plan)
}
