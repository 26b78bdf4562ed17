//! Paths to all artifacts within the output directory.

use std::path::{Path, PathBuf};
use crate::{
    config::RunConfig,
    err::error,
    samples::{self, Taxon, ReadGroup},
};

/// Assembled contigs are stored in `<assembler>/CONTIGS`.
pub const CONTIGS: &'static str = "contigs.fa";
/// Bowtie2 index of the contigs is stored with prefix `<assembler>/BT2_DIR/contigs`.
pub const BT2_DIR: &'static str = "bt2_index";

/// Pileup of the taxon is stored in `<taxon>/<taxon>.PILEUP_EXT`.
const PILEUP_EXT: &'static str = "pileups";
/// Fixed sites of the taxon are stored in `<taxon>/<taxon>.SITES_EXT`.
const SITES_EXT: &'static str = "sites.tsv";

/// Combined site alignment and its locations.
pub const ALIGNMENT: &'static str = "alignment.nex";
pub const ALIGNMENT_LOCS: &'static str = "alignment_locs.txt";

/// Everything related to the loci extension is stored in `LOCI_DIR`.
pub const LOCI_DIR: &'static str = "loci";
/// Contigs that carry informative sites: `loci/CONSERVED`.
const CONSERVED: &'static str = "conserved_contigs.fa";
/// Per-locus unaligned and aligned FASTA files: `loci/UNALIGNED_DIR/<locus>.fa`, `loci/ALIGNED_DIR/<locus>.fa`.
const UNALIGNED_DIR: &'static str = "unaligned";
const ALIGNED_DIR: &'static str = "aligned";
/// Output of the external locus ranker: one locus identifier per line, most variable first.
const RANKING: &'static str = "locus_ranking.txt";
const PARTITIONS: &'static str = "newpartitions.txt";
const SUPERMATRIX_FASTA: &'static str = "supermatrix.fa";
const SUPERMATRIX_PHYLIP: &'static str = "supermatrix.phy";

/// Parameters of the run are stored in `out_dir/PARAMS`.
pub const PARAMS: &'static str = "sisrs_params.json";
/// File, created on the successful completion.
pub const SUCCESS: &'static str = "success";

/// Artifacts, shared by all taxa.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shared {
    /// Assembler output directory.
    AssemblyDir,
    Contigs,
    /// Prefix of the bowtie2 index.
    ContigsIndex,
    Alignment,
    AlignmentLocs,
    /// Site alignment after the missing-data filter.
    FilteredAlignment,
    FilteredLocs,
    BiallelicAlignment,
    LociDir,
    ConservedContigs,
    ConservedIndex,
    UnalignedLoci,
    AlignedLoci,
    LocusRanking,
    Partitions,
    SupermatrixFasta,
    SupermatrixPhylip,
    Params,
    Success,
}

/// Artifacts of a single taxon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaxonArtifact {
    /// Directory with subsampled reads.
    SubsampleDir,
    /// Directory with all other taxon artifacts.
    Dir,
    Pileup,
    FixedSites,
    MergedLociAlignment,
    LociPileup,
    Alleles,
}

/// Artifacts of a single read group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupArtifact {
    /// Reads, aligned to the contigs, sorted.
    Alignment,
    /// Reads, aligned to the conserved contigs, sorted.
    LociAlignment,
}

/// Maps artifacts to their paths. Does not touch the filesystem.
#[derive(Clone, Copy)]
pub struct ArtifactPaths<'a> {
    config: &'a RunConfig,
}

impl<'a> ArtifactPaths<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub fn out_dir(&self) -> &Path {
        &self.config.out_dir
    }

    pub fn shared(&self, artifact: Shared) -> PathBuf {
        let out = &self.config.out_dir;
        let asm_dir = || out.join(self.config.assembler.to_str());
        let loci_dir = || out.join(LOCI_DIR);
        let m = self.config.missing;
        match artifact {
            Shared::AssemblyDir => asm_dir(),
            Shared::Contigs => asm_dir().join(CONTIGS),
            Shared::ContigsIndex => asm_dir().join(BT2_DIR).join("contigs"),
            Shared::Alignment => out.join(ALIGNMENT),
            Shared::AlignmentLocs => out.join(ALIGNMENT_LOCS),
            Shared::FilteredAlignment => out.join(format!("alignment_m{}.nex", m)),
            Shared::FilteredLocs => out.join(format!("alignment_m{}_locs.txt", m)),
            Shared::BiallelicAlignment => out.join(format!("alignment_bi_m{}.nex", m)),
            Shared::LociDir => loci_dir(),
            Shared::ConservedContigs => loci_dir().join(CONSERVED),
            Shared::ConservedIndex => loci_dir().join(BT2_DIR).join("conserved_contigs"),
            Shared::UnalignedLoci => loci_dir().join(UNALIGNED_DIR),
            Shared::AlignedLoci => loci_dir().join(ALIGNED_DIR),
            Shared::LocusRanking => loci_dir().join(RANKING),
            Shared::Partitions => loci_dir().join(PARTITIONS),
            Shared::SupermatrixFasta => loci_dir().join(SUPERMATRIX_FASTA),
            Shared::SupermatrixPhylip => loci_dir().join(SUPERMATRIX_PHYLIP),
            Shared::Params => out.join(PARAMS),
            Shared::Success => out.join(SUCCESS),
        }
    }

    pub fn taxon(&self, taxon: &Taxon, artifact: TaxonArtifact) -> PathBuf {
        let name = taxon.name();
        let dir = self.config.out_dir.join(name);
        match artifact {
            TaxonArtifact::SubsampleDir => self.config.out_dir.join(samples::SUBSAMPLES_DIR).join(name),
            TaxonArtifact::Dir => dir,
            TaxonArtifact::Pileup => dir.join(format!("{}.{}", name, PILEUP_EXT)),
            TaxonArtifact::FixedSites => dir.join(format!("{}.{}", name, SITES_EXT)),
            TaxonArtifact::MergedLociAlignment => dir.join(format!("{}.loci_merged.bam", name)),
            TaxonArtifact::LociPileup => dir.join(format!("{}.loci.{}", name, PILEUP_EXT)),
            TaxonArtifact::Alleles => dir.join(format!("{}.alleles.fa", name)),
        }
    }

    pub fn group(&self, taxon: &Taxon, group: &ReadGroup, artifact: GroupArtifact) -> PathBuf {
        let dir = self.taxon(taxon, TaxonArtifact::Dir);
        match artifact {
            GroupArtifact::Alignment => dir.join(format!("{}.bam", group.basename())),
            GroupArtifact::LociAlignment => dir.join(format!("{}.loci.bam", group.basename())),
        }
    }

    /// Subsampled reads of the read group: two files for paired reads, one file otherwise.
    pub fn subsampled_reads(&self, taxon: &Taxon, group: &ReadGroup) -> Vec<PathBuf> {
        let dir = self.taxon(taxon, TaxonArtifact::SubsampleDir);
        let prefix = format!("{}{}", group.basename(), samples::SUBSAMPLED_MARKER);
        if group.is_paired() {
            vec![dir.join(format!("{}_R1.fastq", prefix)), dir.join(format!("{}_R2.fastq", prefix))]
        } else {
            vec![dir.join(format!("{}.fastq", prefix))]
        }
    }

    /// Subsampled reads of all taxa, in the inventory order.
    pub fn all_subsampled_reads<'t>(&self, taxa: impl IntoIterator<Item = &'t Taxon>) -> Vec<PathBuf> {
        taxa.into_iter()
            .flat_map(|taxon| taxon.groups().iter().flat_map(move |group| self.subsampled_reads(taxon, group)))
            .collect()
    }
}

/// Taxon artifacts are stored in `out_dir/<taxon>`, so taxon names must not clash with shared directories.
pub fn check_taxon_names<'t>(taxa: impl IntoIterator<Item = &'t Taxon>) -> crate::Result<()> {
    const RESERVED: [&'static str; 6] = [samples::SUBSAMPLES_DIR, LOCI_DIR, "velvet", "minia", "abyss", BT2_DIR];
    for taxon in taxa {
        if RESERVED.contains(&taxon.name()) {
            return Err(error!(InvalidData, "Taxon name {} is reserved for pipeline outputs, please rename directory {}",
                taxon.name(), crate::ext::fmt::path(taxon.dir())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Error,
        config::{Args, RunConfig},
    };

    fn config(out_dir: &str, n_taxa: usize) -> RunConfig {
        let args = Args { output: Some(PathBuf::from(out_dir)), ..Args::default() };
        RunConfig::resolve(args, n_taxa, false).unwrap()
    }

    #[test]
    fn layout() {
        let cfg = config("/out", 5);
        let paths = ArtifactPaths::new(&cfg);
        let taxon = Taxon::for_tests("Homo", PathBuf::from("/reads/Homo"), &["lib1"]);
        let group = &taxon.groups()[0];

        assert_eq!(paths.shared(Shared::Contigs), Path::new("/out/velvet/contigs.fa"));
        assert_eq!(paths.shared(Shared::FilteredAlignment), Path::new("/out/alignment_m3.nex"));
        assert_eq!(paths.shared(Shared::BiallelicAlignment), Path::new("/out/alignment_bi_m3.nex"));
        assert_eq!(paths.shared(Shared::Partitions), Path::new("/out/loci/newpartitions.txt"));
        assert_eq!(paths.taxon(&taxon, TaxonArtifact::Pileup), Path::new("/out/Homo/Homo.pileups"));
        assert_eq!(paths.taxon(&taxon, TaxonArtifact::FixedSites), Path::new("/out/Homo/Homo.sites.tsv"));
        assert_eq!(paths.group(&taxon, group, GroupArtifact::Alignment), Path::new("/out/Homo/lib1.bam"));
        assert_eq!(paths.subsampled_reads(&taxon, group),
            vec![PathBuf::from("/out/subsamples/Homo/lib1_subsampled.fastq")]);
    }

    #[test]
    fn reserved_names() {
        let ok = Taxon::for_tests("Pan", PathBuf::from("/reads/Pan"), &["x"]);
        let bad = Taxon::for_tests("loci", PathBuf::from("/reads/loci"), &["x"]);
        assert!(check_taxon_names([&ok]).is_ok());
        assert!(matches!(check_taxon_names([&ok, &bad]), Err(Error::InvalidData(_))));
    }
}
