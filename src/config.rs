//! Run configuration: command-line arguments, their defaults, and the resolved immutable configuration.

use std::{
    env, fs,
    path::{Path, PathBuf},
};
use crate::{
    err::{validate_param, add_path},
    ext,
    pipeline::tools::{Tools, AssemblerKind},
};

/// Explicitly provided arguments and their defaults.
/// Values that are derived when absent are stored as `Option`.
#[derive(Clone, Debug)]
pub struct Args {
    pub genome_size: Option<u64>,
    pub processors: u16,
    pub kmer: u16,
    pub reads_dir: PathBuf,
    pub output: Option<PathBuf>,
    pub min_read: u32,
    pub threshold: f64,
    pub missing: Option<usize>,
    /// Assembler name, checked during resolution.
    pub assembler: String,
    pub loci_length: u64,
    pub reference: Option<PathBuf>,
    /// Extend sites pipeline with the loci stages.
    pub with_loci: bool,
    pub debug: bool,
    pub tools: Tools,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            genome_size: None,
            processors: 1,
            kmer: 21,
            reads_dir: PathBuf::from("."),
            output: None,
            min_read: 3,
            threshold: 1.0,
            missing: None,
            assembler: AssemblerKind::Velvet.to_str().to_owned(),
            loci_length: 500_000,
            reference: None,
            with_loci: false,
            debug: false,
            tools: Tools::default(),
        }
    }
}

/// Resolved parameters of the run. Constructed once, read-only afterwards.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub genome_size: Option<u64>,
    pub kmer: u16,
    pub processors: usize,
    pub min_read: u32,
    pub threshold: f64,
    /// Maximal number of taxa that may lack data at a site.
    pub missing: usize,
    pub assembler: AssemblerKind,
    /// Target total length of the concatenated loci.
    pub loci_length: u64,
    pub reads_dir: PathBuf,
    /// Main working directory, all artifacts are stored here.
    pub out_dir: PathBuf,
    pub reference: Option<PathBuf>,
    pub debug: bool,
    pub tools: Tools,
    pub n_taxa: usize,
}

/// Default missing-data allowance: a site must be present in at least two taxa.
pub fn default_missing(n_taxa: usize) -> usize {
    n_taxa.saturating_sub(2)
}

fn absolute(path: &Path) -> crate::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_owned())
    } else {
        let cwd = env::current_dir().map_err(add_path!(!))?;
        Ok(cwd.join(path))
    }
}

impl RunConfig {
    /// Merges arguments with derived quantities.
    /// `needs_genome_size`: genome size is mandatory (subsampling is part of the run).
    ///
    /// Assembler name is checked first, before anything else.
    pub fn resolve(args: Args, n_taxa: usize, needs_genome_size: bool) -> crate::Result<Self> {
        let assembler: AssemblerKind = args.assembler.parse()?;

        validate_param!(!needs_genome_size || args.genome_size.is_some(),
            "Genome size is required for subsampling (see -g/--genome-size)");
        validate_param!(args.genome_size.map(|g| g > 0).unwrap_or(true), "Genome size must be positive");
        validate_param!(args.kmer % 2 == 1 && 11 <= args.kmer && args.kmer <= 127,
            "k-mer size ({}) must be odd and within [11, 127]", args.kmer);
        validate_param!(0.0 < args.threshold && args.threshold <= 1.0,
            "Consensus threshold ({}) must be within (0, 1]", args.threshold);
        validate_param!(args.min_read > 0, "Minimal read depth must be positive");
        validate_param!(args.loci_length > 0, "Target loci length must be positive");

        let missing = match args.missing {
            Some(m) => {
                if m > default_missing(n_taxa) {
                    log::warn!("Missing data allowance ({}) is too large for {} taxa: \
                        sites present in a single taxon are not informative", m, n_taxa);
                }
                m
            }
            None => default_missing(n_taxa),
        };

        let reads_dir = absolute(&args.reads_dir)?;
        let out_dir = match &args.output {
            Some(dir) => absolute(dir)?,
            None => reads_dir.clone(),
        };
        let reference = args.reference.as_deref().map(absolute).transpose()?;
        Ok(Self {
            genome_size: args.genome_size,
            kmer: args.kmer,
            processors: usize::from(args.processors.max(1)),
            min_read: args.min_read,
            threshold: args.threshold,
            missing,
            assembler,
            loci_length: args.loci_length,
            reads_dir, out_dir, reference,
            debug: args.debug,
            tools: args.tools,
            n_taxa,
        })
    }

    /// Parameters that define the contents of the artifacts.
    fn to_json(&self) -> json::JsonValue {
        json::object!{
            genome_size: self.genome_size,
            kmer: self.kmer,
            min_read: self.min_read,
            threshold: self.threshold,
            missing: self.missing,
            assembler: self.assembler.to_str(),
            loci_length: self.loci_length,
            reference: self.reference.as_ref().map(|p| p.to_string_lossy().into_owned()),
            n_taxa: self.n_taxa,
        }
    }

    /// Compares parameters with the ones, stored by the previous run, and warns about differences.
    /// Returns the names of the changed parameters.
    pub fn compare_with_saved(&self, path: &Path) -> Vec<String> {
        let old = match fs::read_to_string(path).map(|s| json::parse(&s)) {
            Ok(Ok(old)) => old,
            _ => {
                log::warn!("Cannot load parameters of the previous run from {}", ext::fmt::path(path));
                return Vec::new();
            }
        };
        let new = self.to_json();
        let mut changed = Vec::new();
        for (key, new_val) in new.entries() {
            let old_val = &old[key];
            if old_val != new_val {
                log::warn!("Parameter {} has changed since the previous run ({} -> {}), \
                    consider rerunning earlier stages", key, old_val, new_val);
                changed.push(key.to_owned());
            }
        }
        changed
    }

    /// Saves parameters to a JSON file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let mut file = ext::sys::create_file(path)?;
        self.to_json().write_pretty(&mut file, 4).map_err(add_path!(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn missing_default() {
        let cfg = RunConfig::resolve(Args::default(), 5, false).unwrap();
        assert_eq!(cfg.missing, 3);
        let cfg = RunConfig::resolve(Args::default(), 1, false).unwrap();
        assert_eq!(cfg.missing, 0);
        for n in 2..20 {
            assert_eq!(RunConfig::resolve(Args::default(), n, false).unwrap().missing, n - 2);
        }
    }

    #[test]
    fn missing_explicit() {
        let args = Args { missing: Some(1), ..Args::default() };
        assert_eq!(RunConfig::resolve(args, 5, false).unwrap().missing, 1);
        let args = Args { missing: Some(0), ..Args::default() };
        assert_eq!(RunConfig::resolve(args, 10, false).unwrap().missing, 0);
    }

    #[test]
    fn unsupported_assembler_first() {
        // Genome size is also missing, but assembler is checked first.
        let args = Args { assembler: "bwa".to_owned(), ..Args::default() };
        assert!(matches!(RunConfig::resolve(args, 5, true), Err(Error::UnsupportedAssembler(_))));
    }

    #[test]
    fn invalid_params() {
        assert!(matches!(RunConfig::resolve(Args::default(), 5, true), Err(Error::Config(_))));
        let args = Args { kmer: 20, ..Args::default() };
        assert!(matches!(RunConfig::resolve(args, 5, false), Err(Error::Config(_))));
        let args = Args { threshold: 0.0, ..Args::default() };
        assert!(matches!(RunConfig::resolve(args, 5, false), Err(Error::Config(_))));
    }

    #[test]
    fn threshold_and_length_independent() {
        let args = Args { threshold: 0.8, loci_length: 1000, genome_size: Some(100), ..Args::default() };
        let cfg = RunConfig::resolve(args, 3, true).unwrap();
        assert_eq!(cfg.threshold, 0.8);
        assert_eq!(cfg.loci_length, 1000);
        assert!(cfg.out_dir.is_absolute());
        assert_eq!(cfg.out_dir, cfg.reads_dir);
    }

    #[test]
    fn saved_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let cfg = RunConfig::resolve(Args::default(), 4, false).unwrap();
        cfg.save(&path).unwrap();
        assert!(cfg.compare_with_saved(&path).is_empty());
        let args = Args { kmer: 31, ..Args::default() };
        let cfg2 = RunConfig::resolve(args, 4, false).unwrap();
        assert_eq!(cfg2.compare_with_saved(&path), vec!["kmer".to_string()]);
    }
}
