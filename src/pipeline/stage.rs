//! Ordered pipeline stages, their preconditions and the artifacts each stage owns.

use std::{
    fmt,
    path::{Path, PathBuf},
};
use crate::{
    Error,
    ext,
};
use super::{
    Context,
    tools::Tools,
    paths::{Shared, TaxonArtifact, GroupArtifact},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Subsample,
    BuildContigs,
    AlignContigs,
    MapContigs,
    IdentifyFixedSites,
    OutputAlignment,
    CopyReferenceContigs,
    AlignToConservedContigs,
    MergeAlignments,
    CallAlleles,
    BuildGeneAlignments,
    SelectLoci,
}

/// All stages in the execution order.
pub const STAGES: [Stage; 12] = [
    Stage::Subsample,
    Stage::BuildContigs,
    Stage::AlignContigs,
    Stage::MapContigs,
    Stage::IdentifyFixedSites,
    Stage::OutputAlignment,
    Stage::CopyReferenceContigs,
    Stage::AlignToConservedContigs,
    Stage::MergeAlignments,
    Stage::CallAlleles,
    Stage::BuildGeneAlignments,
    Stage::SelectLoci,
];

/// Name of the pipeline that runs the sites sequence.
pub const SITES_PIPELINE: &'static str = "sites";
/// Name of the pipeline that runs the sites sequence followed by the loci extension.
pub const LOCI_PIPELINE: &'static str = "loci";

/// Why a stage cannot start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unmet {
    NoTaxa,
    Missing(Vec<PathBuf>),
}

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const SHOW: usize = 3;
        match self {
            Self::NoTaxa => f.write_str("no taxa with read files"),
            Self::Missing(paths) => {
                write!(f, "{} required input{} missing or empty: {}", paths.len(),
                    if paths.len() == 1 { " is" } else { "s are" },
                    ext::fmt::paths(&paths[..paths.len().min(SHOW)]))?;
                if paths.len() > SHOW {
                    write!(f, " and {} more", paths.len() - SHOW)?;
                }
                Ok(())
            }
        }
    }
}

/// Returns Ok if all paths are present, otherwise lists absent ones.
pub(super) fn require_all(paths: impl IntoIterator<Item = PathBuf>) -> Result<(), Unmet> {
    let missing: Vec<PathBuf> = paths.into_iter().filter(|p| !ext::sys::is_present(p)).collect();
    if missing.is_empty() { Ok(()) } else { Err(Unmet::Missing(missing)) }
}

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Subsample => "subsample",
            Self::BuildContigs => "build_contigs",
            Self::AlignContigs => "align_contigs",
            Self::MapContigs => "map_contigs",
            Self::IdentifyFixedSites => "identify_fixed_sites",
            Self::OutputAlignment => "output_alignment",
            Self::CopyReferenceContigs => "copy_reference_contigs",
            Self::AlignToConservedContigs => "align_to_conserved_contigs",
            Self::MergeAlignments => "merge_alignments",
            Self::CallAlleles => "call_alleles",
            Self::BuildGeneAlignments => "build_gene_alignments",
            Self::SelectLoci => "select_loci",
        }
    }

    /// Short description, used in the help message.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Subsample => "Subsample reads of every taxon to 10x of the genome size in total.",
            Self::BuildContigs => "Assemble subsampled reads of all taxa into contigs.",
            Self::AlignContigs => "Align subsampled reads of every taxon to the contigs.",
            Self::MapContigs => "Pile up aligned reads of every taxon.",
            Self::IdentifyFixedSites => "Call sites fixed within every taxon.",
            Self::OutputAlignment => "Combine fixed sites of all taxa into a site alignment.",
            Self::CopyReferenceContigs => "Extract contigs that carry informative sites.",
            Self::AlignToConservedContigs => "Align subsampled reads to the conserved contigs.",
            Self::MergeAlignments => "Merge alignments of every taxon.",
            Self::CallAlleles => "Call alleles of every taxon on the conserved contigs.",
            Self::BuildGeneAlignments => "Align every locus across taxa and rank loci by variability.",
            Self::SelectLoci => "Select loci and write the supermatrix with partitions.",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        STAGES.iter().copied().find(|stage| stage.name() == name)
    }

    /// Index of the stage in the execution order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Does the stage belong to the loci extension?
    pub fn is_loci(self) -> bool {
        self >= Self::CopyReferenceContigs
    }

    /// Does the stage process reads of individual taxa?
    pub fn requires_reads(self) -> bool {
        !matches!(self, Self::CopyReferenceContigs | Self::SelectLoci)
    }

    /// External executables that the stage invokes.
    pub fn executables(self, tools: &Tools) -> Vec<(&'static str, &Path)> {
        match self {
            Self::Subsample => vec![("reformat.sh", tools.reformat.as_path())],
            // Assembler executables are always checked.
            Self::BuildContigs => Vec::new(),
            Self::AlignContigs | Self::AlignToConservedContigs => vec![
                ("bowtie2", tools.bowtie2.as_path()),
                ("bowtie2-build", tools.bowtie2_build.as_path()),
                ("samtools", tools.samtools.as_path()),
            ],
            Self::MapContigs | Self::MergeAlignments => vec![("samtools", tools.samtools.as_path())],
            Self::IdentifyFixedSites => vec![("site caller", tools.site_caller.as_path())],
            Self::CallAlleles =>
                vec![("samtools", tools.samtools.as_path()), ("allele caller", tools.allele_caller.as_path())],
            Self::BuildGeneAlignments => vec![("mafft", tools.mafft.as_path()), ("locus ranker", tools.ranker.as_path())],
            Self::OutputAlignment | Self::CopyReferenceContigs | Self::SelectLoci => Vec::new(),
        }
    }

    /// Checks that all inputs of the stage are present.
    pub fn precondition(self, ctx: &Context) -> Result<(), Unmet> {
        let paths = ctx.paths();
        let taxa = ctx.inventory.taxa();
        if self.requires_reads() && taxa.is_empty() {
            return Err(Unmet::NoTaxa);
        }
        match self {
            Self::Subsample => require_all(taxa.iter()
                .flat_map(|taxon| taxon.groups().iter().flat_map(|group| group.files()))
                .map(Path::to_path_buf)),
            Self::BuildContigs => require_all(paths.all_subsampled_reads(taxa)),
            Self::AlignContigs => require_all(std::iter::once(paths.shared(Shared::Contigs))
                .chain(paths.all_subsampled_reads(taxa))),
            Self::MapContigs => require_all(std::iter::once(paths.shared(Shared::Contigs))
                .chain(taxa.iter().flat_map(|taxon| taxon.groups().iter()
                    .map(move |group| paths.group(taxon, group, GroupArtifact::Alignment))))),
            Self::IdentifyFixedSites => require_all(taxa.iter()
                .map(|taxon| paths.taxon(taxon, TaxonArtifact::Pileup))),
            Self::OutputAlignment => require_all(taxa.iter()
                .map(|taxon| paths.taxon(taxon, TaxonArtifact::FixedSites))),
            Self::CopyReferenceContigs => {
                let source = match &ctx.config.reference {
                    Some(reference) => reference.clone(),
                    None => paths.shared(Shared::Contigs),
                };
                require_all([paths.shared(Shared::Alignment), paths.shared(Shared::AlignmentLocs), source])
            }
            Self::AlignToConservedContigs => require_all(std::iter::once(paths.shared(Shared::ConservedContigs))
                .chain(paths.all_subsampled_reads(taxa))),
            Self::MergeAlignments => require_all(taxa.iter().flat_map(|taxon| taxon.groups().iter()
                .map(move |group| paths.group(taxon, group, GroupArtifact::LociAlignment)))),
            Self::CallAlleles => require_all(std::iter::once(paths.shared(Shared::ConservedContigs))
                .chain(taxa.iter().map(|taxon| paths.taxon(taxon, TaxonArtifact::MergedLociAlignment)))),
            Self::BuildGeneAlignments => require_all(taxa.iter()
                .map(|taxon| paths.taxon(taxon, TaxonArtifact::Alleles))),
            Self::SelectLoci => require_all([paths.shared(Shared::LocusRanking), paths.shared(Shared::AlignedLoci)]),
        }
    }

    /// Artifacts, owned by the stage. They are removed before the stage runs.
    pub fn outputs(self, ctx: &Context) -> Vec<PathBuf> {
        let paths = ctx.paths();
        let taxa = ctx.inventory.taxa();
        let per_taxon = |artifact: TaxonArtifact| taxa.iter().map(|taxon| paths.taxon(taxon, artifact)).collect::<Vec<_>>();
        let per_group = |artifact: GroupArtifact| taxa.iter()
            .flat_map(|taxon| taxon.groups().iter().map(move |group| paths.group(taxon, group, artifact)))
            .collect::<Vec<_>>();
        let with_fai = |path: PathBuf| {
            let mut fai = path.clone().into_os_string();
            fai.push(".fai");
            [path, PathBuf::from(fai)]
        };
        match self {
            Self::Subsample => per_taxon(TaxonArtifact::SubsampleDir),
            Self::BuildContigs => vec![paths.shared(Shared::AssemblyDir)],
            Self::AlignContigs => {
                let mut outputs = per_group(GroupArtifact::Alignment);
                outputs.extend(paths.shared(Shared::ContigsIndex).parent().map(Path::to_path_buf));
                outputs
            }
            Self::MapContigs => {
                let mut outputs = per_taxon(TaxonArtifact::Pileup);
                outputs.extend(with_fai(paths.shared(Shared::Contigs)).into_iter().skip(1));
                outputs
            }
            Self::IdentifyFixedSites => per_taxon(TaxonArtifact::FixedSites),
            Self::OutputAlignment => vec![paths.shared(Shared::Alignment), paths.shared(Shared::AlignmentLocs)],
            Self::CopyReferenceContigs => with_fai(paths.shared(Shared::ConservedContigs)).to_vec(),
            Self::AlignToConservedContigs => {
                let mut outputs = per_group(GroupArtifact::LociAlignment);
                outputs.extend(paths.shared(Shared::ConservedIndex).parent().map(Path::to_path_buf));
                outputs
            }
            Self::MergeAlignments => per_taxon(TaxonArtifact::MergedLociAlignment),
            Self::CallAlleles => {
                let mut outputs = per_taxon(TaxonArtifact::LociPileup);
                outputs.extend(per_taxon(TaxonArtifact::Alleles));
                outputs
            }
            Self::BuildGeneAlignments => vec![paths.shared(Shared::UnalignedLoci),
                paths.shared(Shared::AlignedLoci), paths.shared(Shared::LocusRanking)],
            Self::SelectLoci => vec![paths.shared(Shared::Partitions),
                paths.shared(Shared::SupermatrixFasta), paths.shared(Shared::SupermatrixPhylip)],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves the command into the stages that need to be executed.
/// - `sites`: whole sites sequence,
/// - `loci`: sites sequence followed by the loci extension,
/// - a stage of the sites sequence: up to `output_alignment`, or up to `select_loci` if `with_loci`,
/// - a stage of the loci extension: up to `select_loci`.
pub fn resolve_range(command: &str, with_loci: bool) -> crate::Result<&'static [Stage]> {
    let last = STAGES.len() - 1;
    let last_sites = Stage::OutputAlignment.index();
    let (start, end) = match command {
        SITES_PIPELINE => (0, if with_loci { last } else { last_sites }),
        LOCI_PIPELINE => (0, last),
        _ => {
            let stage = Stage::from_name(command).ok_or_else(|| Error::UnknownStage(command.to_owned()))?;
            (stage.index(), if with_loci || stage.is_loci() { last } else { last_sites })
        }
    };
    Ok(&STAGES[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_names() {
        for (i, stage) in STAGES.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::from_name(stage.name()), Some(*stage));
        }
        assert_eq!(Stage::from_name("Subsample"), None);
    }

    #[test]
    fn ranges() {
        let names = |cmd: &str, loci: bool| resolve_range(cmd, loci).unwrap()
            .iter().map(|s| s.name()).collect::<Vec<_>>();
        assert_eq!(names("sites", false).len(), 6);
        assert_eq!(names("loci", false).len(), 12);
        assert_eq!(names("sites", true).len(), 12);
        assert_eq!(names("identify_fixed_sites", false), vec!["identify_fixed_sites", "output_alignment"]);
        assert_eq!(names("output_alignment", true).len(), 7);
        assert_eq!(names("merge_alignments", false),
            vec!["merge_alignments", "call_alleles", "build_gene_alignments", "select_loci"]);
        assert_eq!(names("select_loci", false), vec!["select_loci"]);
        assert!(matches!(resolve_range("assemble", false), Err(Error::UnknownStage(s)) if s == "assemble"));
    }

    #[test]
    fn unmet_display() {
        let unmet = Unmet::Missing((0..5).map(|i| PathBuf::from(format!("f{}", i))).collect());
        assert_eq!(unmet.to_string(), "5 required inputs are missing or empty: f0, f1, f2 and 2 more");
        assert_eq!(Unmet::Missing(vec![PathBuf::from("a")]).to_string(), "1 required input is missing or empty: a");
    }
}
