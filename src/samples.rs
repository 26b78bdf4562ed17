//! Discovery of taxa and their read files.

use std::{
    fs,
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};
use regex::Regex;
use crate::{
    Error,
    err::{add_path, error},
    ext,
};

/// Files under this directory, as well as files with `SUBSAMPLED_MARKER` in their names, are derived files.
pub const SUBSAMPLES_DIR: &'static str = "subsamples";
pub const SUBSAMPLED_MARKER: &'static str = "_subsampled";

/// Extensions of read files, longest first.
const READ_EXTENSIONS: [&'static str; 4] = [".fastq.gz", ".fq.gz", ".fastq", ".fq"];

lazy_static::lazy_static!{
    /// Read-pair marker: `<prefix><sep>R<1|2><suffix>`, where suffix starts with a separator,
    /// for example `sample_R1.fastq.gz` or `sample_R2_001.fq`. The last marker in the name is used.
    static ref PAIR_MARKER: Regex = Regex::new(r"^(.*)([._-])R([12])([._-].*)$").unwrap();
}

/// Strips read extension from the file name, if present.
fn strip_read_ext(name: &str) -> Option<&str> {
    READ_EXTENSIONS.iter().find_map(|ext| name.strip_suffix(ext))
}

/// Read files of one sequencing library: either a pair of files, or a single file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reads {
    Paired(PathBuf, PathBuf),
    Single(PathBuf),
}

/// Read files together with the basename, used to name all files derived from them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadGroup {
    reads: Reads,
    basename: String,
}

impl ReadGroup {
    pub fn reads(&self) -> &Reads {
        &self.reads
    }

    /// File name without read-pair marker and without read extension.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn is_paired(&self) -> bool {
        matches!(self.reads, Reads::Paired(..))
    }

    /// One or two read files.
    pub fn files(&self) -> Vec<&Path> {
        match &self.reads {
            Reads::Paired(r1, r2) => vec![r1, r2],
            Reads::Single(r) => vec![r],
        }
    }
}

/// One sample group, identified by its directory.
#[derive(Clone, Debug)]
pub struct Taxon {
    name: String,
    dir: PathBuf,
    groups: Vec<ReadGroup>,
}

impl Taxon {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All read groups: paired groups first, then unpaired, each sorted by file name.
    pub fn groups(&self) -> &[ReadGroup] {
        &self.groups
    }

    /// Iterates over paired read files.
    pub fn paired(&self) -> impl Iterator<Item = (&Path, &Path)> + '_ {
        self.groups.iter().filter_map(|group| match &group.reads {
            Reads::Paired(r1, r2) => Some((r1.as_path(), r2.as_path())),
            Reads::Single(_) => None,
        })
    }

    /// Iterates over unpaired read files.
    pub fn unpaired(&self) -> impl Iterator<Item = &Path> + '_ {
        self.groups.iter().filter_map(|group| match &group.reads {
            Reads::Single(r) => Some(r.as_path()),
            Reads::Paired(..) => None,
        })
    }

    /// Total number of read files.
    pub fn n_files(&self) -> usize {
        self.groups.iter().map(|group| if group.is_paired() { 2 } else { 1 }).sum()
    }

    /// Creates taxon from a list of read file names within one directory.
    /// Fails if two read groups share a basename, as their derived files would collide.
    fn from_files(name: String, dir: PathBuf, mut filenames: Vec<String>) -> crate::Result<Self> {
        filenames.sort();
        let present: HashSet<&str> = filenames.iter().map(String::as_str).collect();
        let mut used = HashSet::new();
        let mut paired = Vec::new();
        let mut unpaired = Vec::new();
        for filename in filenames.iter() {
            if used.contains(filename.as_str()) {
                continue;
            }
            if let Some(caps) = PAIR_MARKER.captures(filename) {
                let (prefix, sep, mate, suffix) = (&caps[1], &caps[2], &caps[3], &caps[4]);
                let mate_name = format!("{}{}R{}{}", prefix, sep, if mate == "1" { "2" } else { "1" }, suffix);
                if mate == "1" && present.contains(mate_name.as_str()) {
                    used.insert(mate_name.clone());
                    let basename = format!("{}{}", prefix, strip_read_ext(suffix).unwrap_or(suffix));
                    paired.push(ReadGroup {
                        reads: Reads::Paired(dir.join(filename), dir.join(&mate_name)),
                        basename,
                    });
                    continue;
                } else if mate == "2" && present.contains(mate_name.as_str()) {
                    // Will be processed together with R1.
                    continue;
                }
                log::warn!("Read file {} has no mate ({}), treating it as unpaired",
                    ext::fmt::path(&dir.join(filename)), mate_name);
            }
            let basename = strip_read_ext(filename).unwrap_or(filename).to_owned();
            unpaired.push(ReadGroup { reads: Reads::Single(dir.join(filename)), basename });
        }
        paired.extend(unpaired);
        let mut basenames = HashSet::new();
        for group in paired.iter() {
            if !basenames.insert(group.basename.as_str()) {
                return Err(error!(InvalidData, "Taxon {} has several read groups with the same basename {} ({})",
                    name, group.basename, ext::fmt::paths(&group.files())));
            }
        }
        Ok(Self { name, dir, groups: paired })
    }
}

/// Returns true if the file is an input read file (not a derived one).
/// Only directories below `root` are checked for `SUBSAMPLES_DIR`.
fn is_input_reads(root: &Path, path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else { return false };
    let rel_path = path.strip_prefix(root).unwrap_or(path);
    strip_read_ext(name).is_some()
        && !name.contains(SUBSAMPLED_MARKER)
        && !rel_path.components().any(|comp| comp.as_os_str() == SUBSAMPLES_DIR)
}

/// Returns taxon name: the last component of the directory.
fn taxon_name(dir: &Path) -> crate::Result<String> {
    let full;
    let name = match dir.file_name() {
        Some(name) => name,
        None => {
            full = fs::canonicalize(dir).map_err(add_path!(dir))?;
            full.file_name().ok_or_else(|| error!(InvalidData,
                "Cannot infer taxon name from directory {}", ext::fmt::path(dir)))?
        }
    };
    name.to_str().map(str::to_owned)
        .ok_or_else(|| error!(InvalidData, "Taxon directory name {:?} is not valid UTF-8", name))
}

/// All taxa, found in the reads directory.
#[derive(Clone, Debug)]
pub struct Inventory {
    root: PathBuf,
    taxa: Vec<Taxon>,
}

impl Inventory {
    /// Recursively searches for read files in the `root` directory.
    /// Each directory with at least one read file produces a taxon.
    pub fn discover(root: &Path) -> crate::Result<Self> {
        let root_str = root.to_str()
            .ok_or_else(|| error!(InvalidData, "Reads directory {:?} is not valid UTF-8", root))?;
        let pattern = format!("{}/**/*", glob::Pattern::escape(root_str.trim_end_matches('/')));
        let entries = glob::glob(&pattern)
            .map_err(|e| error!(InvalidData, "Cannot search for read files in {}: {}", ext::fmt::path(root), e))?;

        let mut dirs: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_owned();
                Error::Io(e.into_error(), vec![path])
            })?;
            if !path.is_file() || !is_input_reads(root, &path) {
                continue;
            }
            let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|s| s.to_str())) else {
                continue;
            };
            dirs.entry(dir.to_owned()).or_default().push(name.to_owned());
        }

        let mut taxa: Vec<Taxon> = Vec::with_capacity(dirs.len());
        let mut names = HashSet::new();
        for (dir, filenames) in dirs.into_iter() {
            let name = taxon_name(&dir)?;
            if !names.insert(name.clone()) {
                return Err(error!(InvalidData, "Two taxon directories have the same name {} (see {})",
                    name, ext::fmt::path(&dir)));
            }
            taxa.push(Taxon::from_files(name, dir, filenames)?);
        }
        Ok(Self {
            root: root.to_owned(),
            taxa,
        })
    }

    /// Creates inventory from already known taxa.
    #[cfg(test)]
    pub fn from_taxa(root: PathBuf, taxa: Vec<Taxon>) -> Self {
        Self { root, taxa }
    }

    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    /// Returns error if there are no taxa.
    pub fn require_samples(&self) -> crate::Result<()> {
        if self.taxa.is_empty() {
            Err(Error::NoSamplesFound(self.root.clone()))
        } else {
            Ok(())
        }
    }

    /// Logs discovered taxa.
    pub fn describe(&self) {
        log::info!("Found {} taxa in {}", self.taxa.len(), ext::fmt::path(&self.root));
        for taxon in self.taxa.iter() {
            log::debug!("    {:20}  {} paired, {} unpaired read files", taxon.name,
                2 * taxon.paired().count(), taxon.unpaired().count());
        }
    }
}

#[cfg(test)]
impl Taxon {
    /// Creates a taxon with one single-end read group per basename.
    pub fn for_tests(name: &str, dir: PathBuf, basenames: &[&str]) -> Self {
        let groups = basenames.iter().map(|b| ReadGroup {
            reads: Reads::Single(dir.join(format!("{}.fastq", b))),
            basename: b.to_string(),
        }).collect();
        Self { name: name.to_owned(), dir, groups }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"@r\nACGT\n+\nIIII\n").unwrap();
    }

    #[test]
    fn discover_taxa() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("TaxonA/libA_R1.fastq.gz"));
        touch(&root.join("TaxonA/libA_R2.fastq.gz"));
        touch(&root.join("TaxonA/single.fq"));
        touch(&root.join("TaxonA/notes.txt"));
        touch(&root.join("group/TaxonB/x_R1_001.fastq"));
        touch(&root.join("group/TaxonB/x_R2_001.fastq"));
        touch(&root.join("TaxonC/orphan_R1.fastq"));
        touch(&root.join("subsamples/TaxonA/libA_subsampled_R1.fastq"));
        touch(&root.join("TaxonA/libA_subsampled_R1.fastq"));
        fs::create_dir_all(root.join("empty")).unwrap();

        let inventory = Inventory::discover(root).unwrap();
        let names: Vec<_> = inventory.taxa().iter().map(Taxon::name).collect();
        assert_eq!(names, vec!["TaxonA", "TaxonC", "TaxonB"]);

        let a = &inventory.taxa()[0];
        assert_eq!(a.paired().count(), 1);
        assert_eq!(a.unpaired().count(), 1);
        assert_eq!(a.n_files(), 3);
        let basenames: Vec<_> = a.groups().iter().map(ReadGroup::basename).collect();
        assert_eq!(basenames, vec!["libA", "single"]);

        let c = &inventory.taxa()[1];
        assert_eq!(c.unpaired().count(), 1);
        assert_eq!(c.groups()[0].basename(), "orphan_R1");

        let b = &inventory.taxa()[2];
        let (r1, r2) = b.paired().next().unwrap();
        assert!(r1.ends_with("x_R1_001.fastq") && r2.ends_with("x_R2_001.fastq"));
        assert_eq!(b.groups()[0].basename(), "x_001");
    }

    #[test]
    fn no_samples() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("readme.txt"));
        let inventory = Inventory::discover(dir.path()).unwrap();
        assert!(inventory.is_empty());
        assert!(matches!(inventory.require_samples(), Err(Error::NoSamplesFound(_))));
    }

    #[test]
    fn duplicate_taxon_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/Taxon/r.fastq"));
        touch(&dir.path().join("b/Taxon/r.fastq"));
        assert!(matches!(Inventory::discover(dir.path()), Err(Error::InvalidData(_))));
    }

    #[test]
    fn same_basename_in_taxon() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("T/lib_R1.fastq"));
        touch(&dir.path().join("T/lib_R2.fastq"));
        touch(&dir.path().join("T/lib.fastq"));
        match Inventory::discover(dir.path()) {
            Err(Error::InvalidData(msg)) => assert!(msg.contains("lib")),
            other => panic!("Unexpected result {:?}", other),
        }
        // Same basename in different taxa is fine.
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("A/lib.fastq"));
        touch(&dir.path().join("B/lib.fastq"));
        assert_eq!(Inventory::discover(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn root_under_subsamples() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(SUBSAMPLES_DIR).join("reads");
        touch(&root.join("TaxonA/r.fastq"));
        touch(&root.join(SUBSAMPLES_DIR).join("TaxonA/r.fastq"));
        let inventory = Inventory::discover(&root).unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.taxa()[0].groups().len(), 1);
        assert_eq!(inventory.taxa()[0].dir(), root.join("TaxonA"));
    }
}
