//! Command-line interface: `sisrs <command> [arguments]`.

use colored::{Colorize, ColoredString};
use const_format::str_repeat;
use crate::{
    Error,
    algo::parse_int,
    config::{Args, RunConfig},
    samples::Inventory,
    pipeline::{
        Context, Coordinator, ToolActions, Stage,
        preflight, paths,
        stage::{self, STAGES, SITES_PIPELINE, LOCI_PIPELINE},
        tools::AssemblerKind,
    },
};

const PROGRAM: &'static str = env!("CARGO_PKG_NAME");

/// Print tool version and authors.
fn print_version() {
    println!("{} {}", PROGRAM.underline(), format!("v{}", env!("CARGO_PKG_VERSION")).green());
    let authors: Vec<_> = env!("CARGO_PKG_AUTHORS").split(':').collect();
    if let Some((last, first)) = authors.split_last() {
        if first.is_empty() {
            println!("Created by {}", last.bright_blue());
        } else {
            println!("Created by {} and {}",
                first.iter().map(|a| a.bright_blue().to_string()).collect::<Vec<_>>().join(", "),
                last.bright_blue());
        }
    }
}

/// Formats default value.
fn fmt_def(val: impl std::fmt::Display) -> ColoredString {
    val.to_string().cyan()
}

fn flag() -> ColoredString {
    "    ".yellow()
}

fn print_help() {
    const KEY: usize = 20;
    const VAL: usize = 5;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    let defaults = Args::default();
    print_version();
    println!("\n{}", "Site-identification pipeline for comparative genomics.".yellow());
    println!("\n{} {} command [arguments]", "Usage:".bold(), PROGRAM);

    println!("\n{}", "[ Pipelines ]".bold());
    println!("    {:<26}  Run all stages from {} to {}.", SITES_PIPELINE.red(),
        Stage::Subsample.name().underline(), Stage::OutputAlignment.name().underline());
    println!("    {:<26}  Run all stages from {} to {}.", LOCI_PIPELINE.red(),
        Stage::Subsample.name().underline(), Stage::SelectLoci.name().underline());

    println!("\n{}", "[ Individual stages ]".bold());
    println!("    Resume pipeline from the stage. Stages up to {} continue until {} ({} with {}).",
        Stage::OutputAlignment.name().underline(), Stage::OutputAlignment.name().underline(),
        Stage::SelectLoci.name().underline(), "--loci".green());
    for stage in STAGES {
        println!("    {:<26}  {}", stage.name().red(), stage.description());
    }

    println!("\n{}", "Input/output arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Directory with read files, one subdirectory per taxon [{}].",
        "-f, --reads".green(), "DIR".yellow(), fmt_def(defaults.reads_dir.display()));
    println!("    {:KEY$} {:VAL$}  Output directory [same as {}].",
        "-o, --output".green(), "DIR".yellow(), "-f".green());
    println!("    {:KEY$} {:VAL$}  Use these contigs instead of the assembled contigs\n\
        {EMPTY}  during the loci stages.",
        "-r, --reference".green(), "FILE".yellow());

    println!("\n{}", "Pipeline parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Approximate genome size, for example 3G or 250M.\n\
        {EMPTY}  Required for the {} stage.",
        "-g, --genome-size".green(), "INT".yellow(), Stage::Subsample.name().underline());
    println!("    {:KEY$} {:VAL$}  Assembler: velvet, minia or abyss [{}].",
        "-a, --assembler".green(), "STR".yellow(), fmt_def(&defaults.assembler));
    println!("    {:KEY$} {:VAL$}  k-mer size for the assembly [{}].",
        "-k, --kmer".green(), "INT".yellow(), fmt_def(defaults.kmer));
    println!("    {:KEY$} {:VAL$}  Minimal read depth to call a site [{}].",
        "-n, --min-read".green(), "INT".yellow(), fmt_def(defaults.min_read));
    println!("    {:KEY$} {:VAL$}  Fraction of reads that must agree on a base [{}].",
        "-t, --threshold".green(), "FLOAT".yellow(), fmt_def(defaults.threshold));
    println!("    {:KEY$} {:VAL$}  Allow at most {} taxa without data at a site\n\
        {EMPTY}  [number of taxa - 2].",
        "-m, --missing".green(), "INT".yellow(), "INT".yellow());
    println!("    {:KEY$} {:VAL$}  Target total length of the selected loci [{}].",
        "-l, --loci-length".green(), "INT".yellow(), fmt_def(defaults.loci_length));
    println!("    {:KEY$} {:VAL$}  Continue with the loci stages after {}.",
        "    --loci".green(), flag(), Stage::OutputAlignment.name().underline());

    println!("\n{}", "Execution parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Number of processors [{}].",
        "-p, --processors".green(), "INT".yellow(), fmt_def(defaults.processors));
    println!("    {:KEY$} {:VAL$}  Show debug messages and executed commands.",
        "    --debug".green(), flag());
    let tools = &defaults.tools;
    for (key, exe) in [
        ("    --reformat", &tools.reformat),
        ("    --velveth", &tools.velveth),
        ("    --velvetg", &tools.velvetg),
        ("    --minia", &tools.minia),
        ("    --abyss", &tools.abyss),
        ("    --bowtie2", &tools.bowtie2),
        ("    --bowtie2-build", &tools.bowtie2_build),
        ("    --samtools", &tools.samtools),
        ("    --site-caller", &tools.site_caller),
        ("    --allele-caller", &tools.allele_caller),
        ("    --mafft", &tools.mafft),
        ("    --ranker", &tools.ranker),
    ] {
        println!("    {:KEY$} {:VAL$}  Executable [{}].", key.green(), "EXE".yellow(), fmt_def(exe.display()));
    }

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show this help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('f') | Long("reads") => args.reads_dir = parser.value()?.parse()?,
            Short('o') | Long("output") => args.output = Some(parser.value()?.parse()?),
            Short('r') | Long("reference") => args.reference = Some(parser.value()?.parse()?),

            Short('g') | Long("genome-size") | Long("genome") =>
                args.genome_size = Some(parser.value()?.parse_with(parse_int)?),
            Short('a') | Long("assembler") => args.assembler = parser.value()?.parse()?,
            Short('k') | Long("kmer") => args.kmer = parser.value()?.parse()?,
            Short('n') | Long("min-read") | Long("min-reads") => args.min_read = parser.value()?.parse()?,
            Short('t') | Long("threshold") => args.threshold = parser.value()?.parse()?,
            Short('m') | Long("missing") => args.missing = Some(parser.value()?.parse()?),
            Short('l') | Long("loci-length") | Long("length") =>
                args.loci_length = parser.value()?.parse_with(parse_int)?,
            Long("loci") => args.with_loci = true,

            Short('p') | Long("processors") | Long("threads") => args.processors = parser.value()?.parse()?,
            Long("debug") => args.debug = true,

            Long("reformat") => args.tools.reformat = parser.value()?.parse()?,
            Long("velveth") => args.tools.velveth = parser.value()?.parse()?,
            Long("velvetg") => args.tools.velvetg = parser.value()?.parse()?,
            Long("minia") => args.tools.minia = parser.value()?.parse()?,
            Long("abyss") | Long("abyss-pe") => args.tools.abyss = parser.value()?.parse()?,
            Long("bowtie2") => args.tools.bowtie2 = parser.value()?.parse()?,
            Long("bowtie2-build") => args.tools.bowtie2_build = parser.value()?.parse()?,
            Long("samtools") => args.tools.samtools = parser.value()?.parse()?,
            Long("site-caller") => args.tools.site_caller = parser.value()?.parse()?,
            Long("allele-caller") => args.tools.allele_caller = parser.value()?.parse()?,
            Long("mafft") => args.tools.mafft = parser.value()?.parse()?,
            Long("ranker") => args.tools.ranker = parser.value()?.parse()?,

            Short('V') | Long("version") => {
                print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

/// Runs the pipeline or a part of it.
fn run_pipeline(command: &str, argv: &[String]) -> Result<(), Error> {
    let args = parse_args(argv)?;
    if !args.debug {
        log::set_max_level(log::LevelFilter::Info);
    }
    let stages = stage::resolve_range(command, args.with_loci)?;
    // Assembler is checked before anything touches the filesystem.
    let _: AssemblerKind = args.assembler.parse()?;
    log::info!("Running {} ({} stage{}: {} .. {})", command.bold(), stages.len(),
        if stages.len() == 1 { "" } else { "s" }, stages[0], stages[stages.len() - 1]);

    let inventory = Inventory::discover(&args.reads_dir)?;
    inventory.describe();
    paths::check_taxon_names(inventory.taxa())?;

    let needs_genome_size = stages.contains(&Stage::Subsample);
    let config = RunConfig::resolve(args, inventory.len(), needs_genome_size)?;
    if stages.iter().any(|stage| stage.requires_reads()) {
        inventory.require_samples()?;
    }
    log::debug!("Output directory: {}, missing data allowance: {}",
        crate::ext::fmt::path(&config.out_dir), config.missing);
    preflight::check(&config, stages)?;

    let ctx = Context::new(&config, &inventory);
    Coordinator::new(ctx, &ToolActions).run(stages)
}

pub fn run(argv: &[String]) -> Result<(), Error> {
    if argv.len() <= 1 {
        print_help();
        return Ok(());
    }
    match &argv[1] as &str {
        "help" | "h" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-V" => print_version(),
        cmd => run_pipeline(cmd, &argv[2..])?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(s: &[&str]) -> Args {
        let argv: Vec<String> = s.iter().map(|x| x.to_string()).collect();
        parse_args(&argv).unwrap()
    }

    #[test]
    fn flags() {
        let a = args(&["-g", "3G", "-p", "8", "-t", "0.9", "-l", "200K", "-m", "2", "-a", "minia", "--loci",
            "--samtools", "/opt/samtools", "-f", "reads"]);
        assert_eq!(a.genome_size, Some(3_000_000_000));
        assert_eq!(a.processors, 8);
        assert_eq!(a.threshold, 0.9);
        assert_eq!(a.loci_length, 200_000);
        assert_eq!(a.missing, Some(2));
        assert_eq!(a.assembler, "minia");
        assert!(a.with_loci && !a.debug);
        assert_eq!(a.tools.samtools, PathBuf::from("/opt/samtools"));
        assert_eq!(a.reads_dir, PathBuf::from("reads"));

        let a = args(&[]);
        assert_eq!(a.kmer, 21);
        assert_eq!(a.missing, None);
    }

    #[test]
    fn bad_flags() {
        let argv: Vec<String> = ["-g", "lots"].iter().map(|x| x.to_string()).collect();
        assert!(parse_args(&argv).is_err());
        let argv: Vec<String> = ["--unknown"].iter().map(|x| x.to_string()).collect();
        assert!(parse_args(&argv).is_err());
    }

    #[test]
    fn help_without_arguments() {
        assert!(run(&["sisrs".to_owned()]).is_ok());
        assert!(run(&["sisrs".to_owned(), "help".to_owned()]).is_ok());
    }

    #[test]
    fn unsupported_assembler_before_anything() {
        let dir = tempfile::tempdir().unwrap();
        let reads = dir.path().join("does-not-exist").to_string_lossy().into_owned();
        let argv: Vec<String> = ["-a", "bwa", "-f", &reads].iter().map(|x| x.to_string()).collect();
        assert!(matches!(run_pipeline("sites", &argv), Err(Error::UnsupportedAssembler(s)) if s == "bwa"));
        assert!(matches!(run_pipeline("assemble", &argv), Err(Error::UnknownStage(_))));
    }
}
