//! External collaborators: executables and invocation templates.

use std::{
    fmt,
    str::FromStr,
    path::{Path, PathBuf},
    process::Command,
};
use crate::Error;

/// Executables of all external collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tools {
    pub reformat: PathBuf,
    pub velveth: PathBuf,
    pub velvetg: PathBuf,
    pub minia: PathBuf,
    pub abyss: PathBuf,
    pub bowtie2: PathBuf,
    pub bowtie2_build: PathBuf,
    pub samtools: PathBuf,
    pub site_caller: PathBuf,
    pub allele_caller: PathBuf,
    pub mafft: PathBuf,
    pub ranker: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            reformat: PathBuf::from("reformat.sh"),
            velveth: PathBuf::from("velveth"),
            velvetg: PathBuf::from("velvetg"),
            minia: PathBuf::from("minia"),
            abyss: PathBuf::from("abyss-pe"),
            bowtie2: PathBuf::from("bowtie2"),
            bowtie2_build: PathBuf::from("bowtie2-build"),
            samtools: PathBuf::from("samtools"),
            site_caller: PathBuf::from("sisrs-site-caller"),
            allele_caller: PathBuf::from("sisrs-allele-caller"),
            mafft: PathBuf::from("mafft"),
            ranker: PathBuf::from("sisrs-rank-loci"),
        }
    }
}

/// Supported genome assemblers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblerKind {
    Velvet,
    Minia,
    Abyss,
}

impl AssemblerKind {
    pub const fn to_str(self) -> &'static str {
        match self {
            Self::Velvet => "velvet",
            Self::Minia => "minia",
            Self::Abyss => "abyss",
        }
    }

    /// Executables, needed to run the assembler: `(tool_name, path)`.
    pub fn executables(self, tools: &Tools) -> Vec<(&'static str, &Path)> {
        match self {
            Self::Velvet => vec![("velveth", tools.velveth.as_path()), ("velvetg", tools.velvetg.as_path())],
            Self::Minia => vec![("minia", tools.minia.as_path())],
            Self::Abyss => vec![("abyss-pe", tools.abyss.as_path())],
        }
    }

    /// Commands that assemble `reads` into contigs within `out_dir`, executed one after another.
    /// All paths must be absolute, as ABySS is executed within the output directory.
    pub fn commands(self, tools: &Tools, kmer: u16, threads: usize, reads: &[PathBuf], out_dir: &Path) -> Vec<Command> {
        match self {
            Self::Velvet => {
                let mut hash = Command::new(&tools.velveth);
                hash.arg(out_dir).arg(kmer.to_string()).args(&["-fastq", "-short"]).args(reads)
                    .env("OMP_NUM_THREADS", threads.to_string());
                let mut graph = Command::new(&tools.velvetg);
                graph.arg(out_dir).args(&[
                    "-exp_cov", "auto",    // Estimate expected coverage,
                    "-cov_cutoff", "auto", // and remove low-coverage nodes.
                    ])
                    .env("OMP_NUM_THREADS", threads.to_string());
                vec![hash, graph]
            }
            Self::Minia => {
                let joined = reads.iter().map(|p| p.to_string_lossy()).collect::<Vec<_>>().join(",");
                let mut cmd = Command::new(&tools.minia);
                cmd.arg("-in").arg(joined)
                    .arg("-kmer-size").arg(kmer.to_string())
                    .args(&["-abundance-min", "2"])
                    .arg("-nb-cores").arg(threads.to_string())
                    .arg("-out").arg(out_dir.join("minia"));
                vec![cmd]
            }
            Self::Abyss => {
                let joined = reads.iter().map(|p| p.to_string_lossy()).collect::<Vec<_>>().join(" ");
                let mut cmd = Command::new(&tools.abyss);
                cmd.arg("-C").arg(out_dir)
                    .arg("name=abyss")
                    .arg(format!("k={}", kmer))
                    .arg(format!("j={}", threads))
                    .arg(format!("se={}", joined))
                    .arg("contigs");
                vec![cmd]
            }
        }
    }

    /// Contigs file, produced by the assembler within `out_dir`.
    pub fn raw_contigs(self, out_dir: &Path) -> PathBuf {
        out_dir.join(match self {
            Self::Velvet => "contigs.fa",
            Self::Minia => "minia.contigs.fa",
            Self::Abyss => "abyss-contigs.fa",
        })
    }
}

impl FromStr for AssemblerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase() as &str {
            "velvet" => Ok(Self::Velvet),
            "minia" => Ok(Self::Minia),
            "abyss" => Ok(Self::Abyss),
            _ => Err(Error::UnsupportedAssembler(s.to_owned())),
        }
    }
}

impl fmt::Display for AssemblerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assembler() {
        assert_eq!("velvet".parse::<AssemblerKind>().unwrap(), AssemblerKind::Velvet);
        assert_eq!("Minia".parse::<AssemblerKind>().unwrap(), AssemblerKind::Minia);
        assert_eq!("abyss".parse::<AssemblerKind>().unwrap(), AssemblerKind::Abyss);
        match "bwa".parse::<AssemblerKind>() {
            Err(Error::UnsupportedAssembler(s)) => assert_eq!(s, "bwa"),
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn velvet_template() {
        let tools = Tools::default();
        let reads = vec![PathBuf::from("/out/subsamples/A/x_subsampled.fastq")];
        let cmds = AssemblerKind::Velvet.commands(&tools, 21, 4, &reads, Path::new("/out/velvet"));
        assert_eq!(cmds.len(), 2);
        let args: Vec<_> = cmds[0].get_args().map(|s| s.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["/out/velvet", "21", "-fastq", "-short", "/out/subsamples/A/x_subsampled.fastq"]);
        assert_eq!(cmds[1].get_program(), "velvetg");
        assert_eq!(AssemblerKind::Velvet.raw_contigs(Path::new("/out/velvet")), PathBuf::from("/out/velvet/contigs.fa"));
    }

    #[test]
    fn abyss_template() {
        let tools = Tools::default();
        let reads = vec![PathBuf::from("/a.fastq"), PathBuf::from("/b.fastq")];
        let cmds = AssemblerKind::Abyss.commands(&tools, 31, 2, &reads, Path::new("/out/abyss"));
        let args: Vec<_> = cmds[0].get_args().map(|s| s.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"se=/a.fastq /b.fastq".to_string()));
        assert!(args.contains(&"k=31".to_string()));
    }
}
