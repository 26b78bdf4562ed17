//! Checks that all external executables are available before any stage runs.

use std::path::{Path, PathBuf};
use colored::Colorize;
use crate::{
    Error,
    config::RunConfig,
    ext,
};
use super::Stage;

/// Executables that need to be available for the given stages: `(tool_name, path)`, without repeats.
/// Assembler, aligner and pileup executables are always required.
pub fn required_tools<'a>(config: &'a RunConfig, stages: &[Stage]) -> Vec<(&'static str, &'a Path)> {
    let tools = &config.tools;
    let mut required = config.assembler.executables(tools);
    required.push(("bowtie2", tools.bowtie2.as_path()));
    required.push(("bowtie2-build", tools.bowtie2_build.as_path()));
    required.push(("samtools", tools.samtools.as_path()));
    for stage in stages {
        for (name, path) in stage.executables(tools) {
            if !required.iter().any(|(_, p)| *p == path) {
                required.push((name, path));
            }
        }
    }
    required
}

/// Finds all required executables, returns their full paths.
/// All missing executables are reported, after which the first of them is returned as an error.
pub fn check(config: &RunConfig, stages: &[Stage]) -> crate::Result<Vec<PathBuf>> {
    check_with(config, stages, |path| ext::sys::find_exe(path))
}

fn check_with<F>(config: &RunConfig, stages: &[Stage], find: F) -> crate::Result<Vec<PathBuf>>
where F: Fn(&Path) -> Option<PathBuf>,
{
    let mut found = Vec::new();
    let mut first_missing = None;
    for (name, path) in required_tools(config, stages) {
        match find(path) {
            Some(full) => {
                log::trace!("    {:14} {}", name, ext::fmt::path(&full));
                found.push(full);
            }
            None => {
                log::error!("Cannot find {} ({})", name.bold(), ext::fmt::path(path));
                if first_missing.is_none() {
                    first_missing = Some(Error::MissingDependency(name, path.to_owned()));
                }
            }
        }
    }
    match first_missing {
        Some(e) => Err(e),
        None => Ok(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Args, RunConfig},
        pipeline::stage::resolve_range,
    };

    fn config(assembler: &str) -> RunConfig {
        let args = Args { assembler: assembler.to_owned(), ..Args::default() };
        RunConfig::resolve(args, 3, false).unwrap()
    }

    fn names(config: &RunConfig, command: &str) -> Vec<&'static str> {
        required_tools(config, resolve_range(command, false).unwrap()).into_iter().map(|(name, _)| name).collect()
    }

    #[test]
    fn tools_per_range() {
        let cfg = config("velvet");
        assert_eq!(names(&cfg, "output_alignment"), vec!["velveth", "velvetg", "bowtie2", "bowtie2-build", "samtools"]);
        assert_eq!(names(&cfg, "identify_fixed_sites"),
            vec!["velveth", "velvetg", "bowtie2", "bowtie2-build", "samtools", "site caller"]);
        let cfg = config("minia");
        let loci = names(&cfg, "loci");
        assert_eq!(&loci[..5], &["minia", "bowtie2", "bowtie2-build", "samtools", "reformat.sh"]);
        assert!(loci.contains(&"allele caller") && loci.contains(&"mafft") && loci.contains(&"locus ranker"));
        assert_eq!(loci.iter().filter(|&&name| name == "samtools").count(), 1);
    }

    #[test]
    fn missing_tool() {
        let cfg = config("abyss");
        let stages = resolve_range("sites", false).unwrap();
        let res = check_with(&cfg, stages, |p| if p == Path::new("bowtie2-build") || p == Path::new("abyss-pe") {
            None
        } else {
            Some(Path::new("/usr/bin").join(p))
        });
        match res {
            Err(Error::MissingDependency(name, path)) => {
                assert_eq!(name, "abyss-pe");
                assert_eq!(path, PathBuf::from("abyss-pe"));
            }
            other => panic!("Unexpected result {:?}", other),
        }
        let found = check_with(&cfg, stages, |p| Some(Path::new("/opt").join(p))).unwrap();
        assert_eq!(found.len(), 6);
    }
}
