//! Stage actions: invocation of external collaborators and the native glue between them.

use std::{
    fs,
    io::Write,
    cmp::max,
    collections::BTreeSet,
    path::{Path, PathBuf},
    process::Command,
};
use crate::{
    err::{add_path, error},
    ext,
    algo::pool::{self, Unit},
    samples::{Taxon, Reads},
    seq::{self, fastx},
    sites::{self, SiteAlignment},
    loci,
};
use super::{
    Actions, Context, Stage,
    paths::{Shared, TaxonArtifact, GroupArtifact, ArtifactPaths},
};

/// Production actions: external tools are executed for every stage.
pub struct ToolActions;

impl Actions for ToolActions {
    fn run(&self, stage: Stage, ctx: &Context) -> crate::Result<()> {
        match stage {
            Stage::Subsample => subsample(ctx),
            Stage::BuildContigs => build_contigs(ctx),
            Stage::AlignContigs => {
                let contigs = ctx.paths().shared(Shared::Contigs);
                let index = ctx.paths().shared(Shared::ContigsIndex);
                align_reads(stage, ctx, &contigs, &index, GroupArtifact::Alignment)
            }
            Stage::MapContigs => map_contigs(ctx),
            Stage::IdentifyFixedSites => identify_fixed_sites(ctx),
            Stage::OutputAlignment => output_alignment(ctx),
            Stage::CopyReferenceContigs => copy_reference_contigs(ctx),
            Stage::AlignToConservedContigs => {
                let contigs = ctx.paths().shared(Shared::ConservedContigs);
                let index = ctx.paths().shared(Shared::ConservedIndex);
                align_reads(stage, ctx, &contigs, &index, GroupArtifact::LociAlignment)
            }
            Stage::MergeAlignments => merge_alignments(ctx),
            Stage::CallAlleles => call_alleles(ctx),
            Stage::BuildGeneAlignments => build_gene_alignments(ctx),
            Stage::SelectLoci => select_loci(ctx),
        }
    }
}

/// Number of threads for each external process, when `n_units` units are executed in parallel.
fn unit_threads(processors: usize, n_units: usize) -> usize {
    max(1, processors / n_units.clamp(1, max(processors, 1)))
}

/// Executes `f` for every taxon over the worker pool.
fn for_each_taxon<'a, F>(ctx: &Context<'a>, f: F) -> crate::Result<()>
where F: Fn(&'a Taxon) -> crate::Result<()> + Sync,
{
    let units = ctx.inventory.taxa().iter().map(|taxon| Unit::new(taxon.name(), taxon)).collect();
    pool::run_units(units, ctx.config.processors, f)
}

fn subsample(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::Subsample.name();
    const COVERAGE: u64 = 10;
    let genome_size = ctx.config.genome_size
        .ok_or_else(|| error!(Config, "Genome size is required for subsampling (see -g/--genome-size)"))?;
    let paths = ctx.paths();
    let n_taxa = ctx.inventory.len() as u64;
    let tools = &ctx.config.tools;
    for_each_taxon(ctx, |taxon| {
        let dir = paths.taxon(taxon, TaxonArtifact::SubsampleDir);
        ext::sys::mkdir(&dir)?;
        let target = genome_size * COVERAGE / n_taxa / taxon.n_files() as u64;
        log::debug!("    Subsampling {} to {} bases per read file", taxon.name(), target);
        for group in taxon.groups() {
            let out = paths.subsampled_reads(taxon, group);
            let mut cmd = Command::new(&tools.reformat);
            match group.reads() {
                Reads::Paired(r1, r2) => {
                    cmd.arg(arg_path("in=", r1)).arg(arg_path("in2=", r2))
                        .arg(arg_path("out=", &out[0])).arg(arg_path("out2=", &out[1]));
                }
                Reads::Single(r) => {
                    cmd.arg(arg_path("in=", r)).arg(arg_path("out=", &out[0]));
                }
            }
            cmd.arg(format!("samplebasestarget={}", target)).arg("overwrite=t");
            ext::sys::run_command(STAGE, &mut cmd)?;
        }
        Ok(())
    })
}

/// Formats `key=path` argument.
fn arg_path(key: &str, path: &Path) -> std::ffi::OsString {
    let mut s = std::ffi::OsString::from(key);
    s.push(path);
    s
}

fn build_contigs(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::BuildContigs.name();
    let paths = ctx.paths();
    let config = ctx.config;
    let out_dir = paths.shared(Shared::AssemblyDir);
    ext::sys::mkdir(&out_dir)?;
    let reads = paths.all_subsampled_reads(ctx.inventory.taxa());
    log::info!("    Assembling {} read files with {}", reads.len(), config.assembler);
    for mut cmd in config.assembler.commands(&config.tools, config.kmer, config.processors, &reads, &out_dir) {
        ext::sys::run_command(STAGE, &mut cmd)?;
    }
    let raw = config.assembler.raw_contigs(&out_dir);
    let contigs = paths.shared(Shared::Contigs);
    if raw != contigs {
        fs::rename(&raw, &contigs).map_err(add_path!(raw, contigs))?;
    }
    if !ext::sys::is_present(&contigs) {
        return Err(error!(InvalidData, "Assembler produced no contigs ({} is empty)", ext::fmt::path(&contigs)));
    }
    Ok(())
}

/// Builds bowtie2 index for `contigs`, and aligns subsampled reads of every read group to it.
fn align_reads(
    stage: Stage,
    ctx: &Context,
    contigs: &Path,
    index: &Path,
    artifact: GroupArtifact,
) -> crate::Result<()> {
    let stage_name = stage.name();
    let paths = ctx.paths();
    let tools = &ctx.config.tools;
    let processors = ctx.config.processors;
    if let Some(index_dir) = index.parent() {
        ext::sys::mkdir(index_dir)?;
    }
    let mut cmd = Command::new(&tools.bowtie2_build);
    cmd.arg("--threads").arg(processors.to_string()).arg(contigs).arg(index);
    ext::sys::run_command(stage_name, &mut cmd)?;

    let threads = unit_threads(processors, ctx.inventory.len()).to_string();
    for_each_taxon(ctx, |taxon| {
        ext::sys::mkdir(paths.taxon(taxon, TaxonArtifact::Dir))?;
        for group in taxon.groups() {
            let reads = paths.subsampled_reads(taxon, group);
            let mut bowtie = Command::new(&tools.bowtie2);
            bowtie.arg("-p").arg(&threads).arg("--no-unal").arg("-x").arg(index);
            if let [r1, r2] = &reads[..] {
                bowtie.arg("-1").arg(r1).arg("-2").arg(r2);
            } else {
                bowtie.arg("-U").args(&reads);
            }
            let mut sort = Command::new(&tools.samtools);
            sort.arg("sort").arg("-@").arg(&threads)
                .arg("-o").arg(paths.group(taxon, group, artifact)).arg("-");
            ext::sys::run_pipe(stage_name, &mut bowtie, &mut sort)?;
        }
        Ok(())
    })
}

/// Creates FASTA index next to the file.
fn faidx(stage: &'static str, ctx: &Context, fasta: &Path) -> crate::Result<()> {
    let mut cmd = Command::new(&ctx.config.tools.samtools);
    cmd.arg("faidx").arg(fasta);
    ext::sys::run_command(stage, &mut cmd)
}

fn map_contigs(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::MapContigs.name();
    let paths = ctx.paths();
    let samtools = &ctx.config.tools.samtools;
    let contigs = paths.shared(Shared::Contigs);
    faidx(STAGE, ctx, &contigs)?;
    for_each_taxon(ctx, |taxon| {
        let bams: Vec<PathBuf> = taxon.groups().iter()
            .map(|group| paths.group(taxon, group, GroupArtifact::Alignment)).collect();
        let mut mpileup = Command::new(samtools);
        mpileup.arg("mpileup").arg("-f").arg(&contigs).arg("-o").arg(paths.taxon(taxon, TaxonArtifact::Pileup));
        if bams.len() == 1 {
            mpileup.arg(&bams[0]);
            ext::sys::run_command(STAGE, &mut mpileup)
        } else {
            // Several read groups are piled up together.
            let mut merge = Command::new(samtools);
            merge.arg("merge").arg("-u").arg("-").args(&bams);
            mpileup.arg("-");
            ext::sys::run_pipe(STAGE, &mut merge, &mut mpileup)
        }
    })
}

fn identify_fixed_sites(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::IdentifyFixedSites.name();
    let paths = ctx.paths();
    let config = ctx.config;
    for_each_taxon(ctx, |taxon| {
        let mut cmd = Command::new(&config.tools.site_caller);
        cmd.arg(paths.taxon(taxon, TaxonArtifact::Pileup))
            .arg(config.min_read.to_string())
            .arg(config.threshold.to_string())
            .arg(paths.taxon(taxon, TaxonArtifact::FixedSites));
        ext::sys::run_command(STAGE, &mut cmd)
    })
}

fn output_alignment(ctx: &Context) -> crate::Result<()> {
    let paths = ctx.paths();
    let taxa_calls = ctx.inventory.taxa().iter()
        .map(|taxon| sites::load_calls(&paths.taxon(taxon, TaxonArtifact::FixedSites))
            .map(|calls| (taxon.name().to_owned(), calls)))
        .collect::<crate::Result<Vec<_>>>()?;
    let alignment = SiteAlignment::aggregate(taxa_calls);
    if alignment.n_sites() == 0 {
        log::warn!("    No informative sites found");
    } else {
        log::info!("    {} informative sites across {} taxa", alignment.n_sites(), alignment.taxa().len());
    }
    alignment.save(&paths.shared(Shared::Alignment), Some(&paths.shared(Shared::AlignmentLocs)))
}

/// Loads the site alignment and applies the missing-data filter.
fn load_filtered(paths: &ArtifactPaths, max_missing: usize) -> crate::Result<(SiteAlignment, SiteAlignment)> {
    let alignment = SiteAlignment::load(&paths.shared(Shared::Alignment), &paths.shared(Shared::AlignmentLocs))?;
    let filtered = alignment.filter_missing(max_missing);
    Ok((alignment, filtered))
}

fn copy_reference_contigs(ctx: &Context) -> crate::Result<()> {
    let paths = ctx.paths();
    let out = paths.shared(Shared::ConservedContigs);
    ext::sys::mkdir(paths.shared(Shared::LociDir))?;
    let mut f = ext::sys::create_file(&out)?;

    let source;
    let keep: Option<BTreeSet<String>> = match &ctx.config.reference {
        Some(reference) => {
            log::info!("    Using reference contigs {}", ext::fmt::path(reference));
            source = reference.clone();
            None
        }
        None => {
            source = paths.shared(Shared::Contigs);
            let (alignment, filtered) = load_filtered(&paths, ctx.config.missing)?;
            let contigs: BTreeSet<String> = filtered.contigs().into_iter().map(str::to_owned).collect();
            log::info!("    {} / {} sites pass the missing-data filter (at most {} missing), located on {} contigs",
                filtered.n_sites(), alignment.n_sites(), ctx.config.missing, contigs.len());
            Some(contigs)
        }
    };
    let mut written = 0;
    fastx::for_each_record(&source, |record| {
        if keep.as_ref().map(|contigs| contigs.contains(record.id())).unwrap_or(true) {
            seq::write_fasta(&mut f, record.id(), None, record.seq()).map_err(add_path!(out))?;
            written += 1;
        }
        Ok(())
    })?;
    f.flush().map_err(add_path!(out))?;
    if written == 0 {
        return Err(error!(InvalidData, "No contigs written to {}", ext::fmt::path(&out)));
    }
    log::debug!("    Wrote {} conserved contigs", written);
    Ok(())
}

fn merge_alignments(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::MergeAlignments.name();
    let paths = ctx.paths();
    let samtools = &ctx.config.tools.samtools;
    let threads = unit_threads(ctx.config.processors, ctx.inventory.len()).to_string();
    for_each_taxon(ctx, |taxon| {
        let mut cmd = Command::new(samtools);
        cmd.arg("merge").arg("-f").arg("-@").arg(&threads)
            .arg(paths.taxon(taxon, TaxonArtifact::MergedLociAlignment))
            .args(taxon.groups().iter().map(|group| paths.group(taxon, group, GroupArtifact::LociAlignment)));
        ext::sys::run_command(STAGE, &mut cmd)
    })
}

fn call_alleles(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::CallAlleles.name();
    let paths = ctx.paths();
    let config = ctx.config;
    let contigs = paths.shared(Shared::ConservedContigs);
    faidx(STAGE, ctx, &contigs)?;
    for_each_taxon(ctx, |taxon| {
        let pileup = paths.taxon(taxon, TaxonArtifact::LociPileup);
        let mut mpileup = Command::new(&config.tools.samtools);
        mpileup.arg("mpileup").arg("-f").arg(&contigs).arg("-o").arg(&pileup)
            .arg(paths.taxon(taxon, TaxonArtifact::MergedLociAlignment));
        ext::sys::run_command(STAGE, &mut mpileup)?;

        let mut caller = Command::new(&config.tools.allele_caller);
        caller.arg(&pileup)
            .arg(config.min_read.to_string())
            .arg(config.threshold.to_string())
            .arg(paths.taxon(taxon, TaxonArtifact::Alleles));
        ext::sys::run_command(STAGE, &mut caller)
    })
}

fn build_gene_alignments(ctx: &Context) -> crate::Result<()> {
    const STAGE: &'static str = Stage::BuildGeneAlignments.name();
    let paths = ctx.paths();
    let tools = &ctx.config.tools;
    let unaligned_dir = paths.shared(Shared::UnalignedLoci);
    let aligned_dir = paths.shared(Shared::AlignedLoci);

    let taxa_alleles: Vec<(&str, PathBuf)> = ctx.inventory.taxa().iter()
        .map(|taxon| (taxon.name(), paths.taxon(taxon, TaxonArtifact::Alleles))).collect();
    let loci = loci::gather_loci(&taxa_alleles, &unaligned_dir)?;
    if loci.is_empty() {
        return Err(error!(InvalidData, "No loci have alleles in at least two taxa"));
    }
    log::info!("    Aligning {} loci", loci.len());
    ext::sys::mkdir(&aligned_dir)?;
    let units = loci.iter().map(|locus| Unit::new(locus.clone(), locus.as_str())).collect();
    pool::run_units(units, ctx.config.processors, |locus| {
        let mut mafft = Command::new(&tools.mafft);
        mafft.args(&["--auto", "--quiet", "--thread", "1"])
            .arg(loci::locus_fasta(&unaligned_dir, locus));
        ext::sys::run_to_file(STAGE, &mut mafft, &loci::locus_fasta(&aligned_dir, locus))
    })?;

    let mut ranker = Command::new(&tools.ranker);
    ranker.arg(&aligned_dir).arg(paths.shared(Shared::LocusRanking));
    ext::sys::run_command(STAGE, &mut ranker)
}

fn select_loci(ctx: &Context) -> crate::Result<()> {
    let paths = ctx.paths();
    loci::select_and_write(
        &paths.shared(Shared::LocusRanking),
        &paths.shared(Shared::AlignedLoci),
        ctx.inventory.len(),
        ctx.config.loci_length,
        &paths.shared(Shared::Partitions),
        &paths.shared(Shared::SupermatrixFasta),
        &paths.shared(Shared::SupermatrixPhylip),
    ).map(|_| ())
}

/// Applies the missing-data filter to the site alignment, and writes the filtered and the biallelic alignments.
/// Executed after the last stage of every run.
pub fn filter_missing(ctx: &Context) -> crate::Result<()> {
    let paths = ctx.paths();
    let m = ctx.config.missing;
    let (alignment, filtered) = load_filtered(&paths, m)?;
    filtered.save(&paths.shared(Shared::FilteredAlignment), Some(&paths.shared(Shared::FilteredLocs)))?;
    let biallelic = filtered.biallelic();
    biallelic.save(&paths.shared(Shared::BiallelicAlignment), None)?;
    log::info!("    {} / {} sites with at most {} missing taxa ({} biallelic)",
        filtered.n_sites(), alignment.n_sites(), m, biallelic.n_sites());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Args, RunConfig},
        samples::Inventory,
    };

    #[test]
    fn threads_per_unit() {
        assert_eq!(unit_threads(8, 2), 4);
        assert_eq!(unit_threads(8, 20), 1);
        assert_eq!(unit_threads(1, 3), 1);
        assert_eq!(unit_threads(6, 0), 6);
    }

    #[test]
    fn conserved_contigs() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args { output: Some(dir.path().to_owned()), missing: Some(0), ..Args::default() };
        let config = RunConfig::resolve(args, 2, false).unwrap();
        let inventory = Inventory::from_taxa(dir.path().to_owned(), Vec::new());
        let ctx = Context::new(&config, &inventory);
        let paths = ctx.paths();

        let alignment = SiteAlignment::aggregate(vec![
            ("A".to_owned(), [(sites::Site::new("c1", 5), b'A'), (sites::Site::new("c3", 1), b'G')]
                .into_iter().collect()),
            ("B".to_owned(), [(sites::Site::new("c1", 5), b'C'), (sites::Site::new("c3", 1), b'T')]
                .into_iter().collect()),
        ]);
        alignment.save(&paths.shared(Shared::Alignment), Some(&paths.shared(Shared::AlignmentLocs))).unwrap();
        ext::sys::mkdir(paths.shared(Shared::AssemblyDir)).unwrap();
        fs::write(paths.shared(Shared::Contigs), ">c1\nACGTACGT\n>c2\nAAAA\n>c3\nCCCC\n").unwrap();

        copy_reference_contigs(&ctx).unwrap();
        let conserved = fastx::read_all(&paths.shared(Shared::ConservedContigs)).unwrap();
        assert_eq!(conserved.iter().map(|s| s.name()).collect::<Vec<_>>(), vec!["c1", "c3"]);

        filter_missing(&ctx).unwrap();
        assert!(paths.shared(Shared::FilteredAlignment).ends_with("alignment_m0.nex"));
        let filtered = SiteAlignment::load(&paths.shared(Shared::FilteredAlignment),
            &paths.shared(Shared::FilteredLocs)).unwrap();
        assert_eq!(filtered.n_sites(), 2);
        assert!(ext::sys::is_present(&paths.shared(Shared::BiallelicAlignment)));
    }
}
