//! Combining per-taxon fixed-site calls into the site alignment, and the missing-data filter.

use std::{
    fmt,
    io::{BufRead, Write},
    collections::{BTreeMap, BTreeSet},
    path::Path,
};
use crate::{
    err::{add_path, error},
    ext,
    seq::is_base,
};

/// Missing base in the alignment.
pub const MISSING: u8 = b'N';

/// Location of a site on the contigs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Site {
    pub contig: String,
    pub pos: u64,
}

impl Site {
    pub fn new(contig: impl Into<String>, pos: u64) -> Self {
        Self { contig: contig.into(), pos }
    }

    /// Parses `contig/position`.
    fn parse(s: &str) -> Option<Self> {
        let (contig, pos) = s.rsplit_once('/')?;
        if contig.is_empty() {
            return None;
        }
        Some(Self::new(contig, pos.parse().ok()?))
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.contig, self.pos)
    }
}

/// Fixed-site calls of one taxon.
pub type SiteCalls = BTreeMap<Site, u8>;

/// Loads fixed-site calls: one `contig<TAB>position<TAB>base` line per site.
/// Empty lines and lines starting with `#` are skipped; bases other than ACGT are skipped as missing.
pub fn load_calls(path: &Path) -> crate::Result<SiteCalls> {
    let mut calls = SiteCalls::new();
    let reader = ext::sys::open(path)?;
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(add_path!(path))?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = || error!(InvalidData, "Cannot parse line {} in {}: {:?}, expected contig, position and base",
            i + 1, ext::fmt::path(path), line);
        let mut split = line.split('\t');
        let (Some(contig), Some(pos), Some(base), None) = (split.next(), split.next(), split.next(), split.next())
            else { return Err(invalid()) };
        let pos: u64 = pos.parse().map_err(|_| invalid())?;
        let base = match base.as_bytes() {
            &[nt] if is_base(nt) => nt.to_ascii_uppercase(),
            &[_] => continue,
            _ => return Err(invalid()),
        };
        if let Some(old) = calls.insert(Site::new(contig, pos), base) {
            if old != base {
                return Err(error!(InvalidData, "Conflicting calls {} and {} at {}/{} in {}",
                    old as char, base as char, contig, pos, ext::fmt::path(path)));
            }
        }
    }
    Ok(calls)
}

/// Alignment of single-nucleotide sites across taxa.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteAlignment {
    taxa: Vec<String>,
    rows: Vec<Vec<u8>>,
    sites: Vec<Site>,
}

impl SiteAlignment {
    /// Combines calls of all taxa. Sites are sorted by contig and position.
    /// A site is kept if at least two taxa have a call and there are at least two distinct bases.
    pub fn aggregate(taxa_calls: Vec<(String, SiteCalls)>) -> Self {
        let all_sites: BTreeSet<&Site> = taxa_calls.iter().flat_map(|(_, calls)| calls.keys()).collect();
        let mut sites = Vec::new();
        let mut rows = vec![Vec::new(); taxa_calls.len()];
        let mut column = Vec::with_capacity(taxa_calls.len());
        for site in all_sites.into_iter() {
            column.clear();
            column.extend(taxa_calls.iter().map(|(_, calls)| calls.get(site).copied().unwrap_or(MISSING)));
            if count_present(&column) >= 2 && count_bases(&column) >= 2 {
                for (row, &nt) in rows.iter_mut().zip(&column) {
                    row.push(nt);
                }
                sites.push(site.clone());
            }
        }
        let taxa = taxa_calls.into_iter().map(|(name, _)| name).collect();
        Self { taxa, rows, sites }
    }

    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    fn column(&self, j: usize) -> Vec<u8> {
        self.rows.iter().map(|row| row[j]).collect()
    }

    /// Number of taxa without a call at the site.
    pub fn missing_at(&self, j: usize) -> usize {
        self.rows.len() - count_present(&self.column(j))
    }

    /// Keeps columns that satisfy the predicate.
    fn select_columns(&self, keep: impl Fn(usize) -> bool) -> Self {
        let kept: Vec<usize> = (0..self.n_sites()).filter(|&j| keep(j)).collect();
        Self {
            taxa: self.taxa.clone(),
            rows: self.rows.iter().map(|row| kept.iter().map(|&j| row[j]).collect()).collect(),
            sites: kept.iter().map(|&j| self.sites[j].clone()).collect(),
        }
    }

    /// Keeps sites where at most `max_missing` taxa have no call.
    pub fn filter_missing(&self, max_missing: usize) -> Self {
        self.select_columns(|j| self.missing_at(j) <= max_missing)
    }

    /// Keeps sites with exactly two distinct bases.
    pub fn biallelic(&self) -> Self {
        self.select_columns(|j| count_bases(&self.column(j)) == 2)
    }

    /// Contigs that carry at least one site.
    pub fn contigs(&self) -> BTreeSet<&str> {
        self.sites.iter().map(|site| site.contig.as_str()).collect()
    }

    /// Writes alignment in the NEXUS format.
    pub fn write_nexus<W: Write>(&self, mut f: W) -> std::io::Result<()> {
        writeln!(f, "#NEXUS")?;
        writeln!(f, "BEGIN DATA;")?;
        writeln!(f, "    DIMENSIONS NTAX={} NCHAR={};", self.taxa.len(), self.n_sites())?;
        writeln!(f, "    FORMAT DATATYPE=DNA MISSING={} GAP=-;", MISSING as char)?;
        writeln!(f, "MATRIX")?;
        let width = self.taxa.iter().map(|name| nexus_name(name).len()).max().unwrap_or(0);
        for (name, row) in self.taxa.iter().zip(&self.rows) {
            write!(f, "    {:width$}  ", nexus_name(name))?;
            f.write_all(row)?;
            writeln!(f)?;
        }
        writeln!(f, ";")?;
        writeln!(f, "END;")
    }

    /// Writes site locations, one `contig/position` per line.
    pub fn write_locs<W: Write>(&self, mut f: W) -> std::io::Result<()> {
        for site in self.sites.iter() {
            writeln!(f, "{}", site)?;
        }
        Ok(())
    }

    /// Saves alignment and its locations.
    pub fn save(&self, nexus_path: &Path, locs_path: Option<&Path>) -> crate::Result<()> {
        let mut f = ext::sys::create_file(nexus_path)?;
        self.write_nexus(&mut f).and_then(|_| f.flush()).map_err(add_path!(nexus_path))?;
        if let Some(locs_path) = locs_path {
            let mut f = ext::sys::create_file(locs_path)?;
            self.write_locs(&mut f).and_then(|_| f.flush()).map_err(add_path!(locs_path))?;
        }
        Ok(())
    }

    /// Loads alignment from a NEXUS file together with its locations.
    pub fn load(nexus_path: &Path, locs_path: &Path) -> crate::Result<Self> {
        let (taxa, rows) = read_nexus_matrix(nexus_path)?;
        let mut sites = Vec::new();
        for (i, line) in ext::sys::open(locs_path)?.lines().enumerate() {
            let line = line.map_err(add_path!(locs_path))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            sites.push(Site::parse(line).ok_or_else(|| error!(InvalidData,
                "Cannot parse site location {:?} (line {} in {})", line, i + 1, ext::fmt::path(locs_path)))?);
        }
        if let Some(row) = rows.iter().find(|row| row.len() != sites.len()) {
            return Err(error!(InvalidData, "Alignment {} has {} columns, but there are {} locations in {}",
                ext::fmt::path(nexus_path), row.len(), sites.len(), ext::fmt::path(locs_path)));
        }
        Ok(Self { taxa, rows, sites })
    }
}

/// Number of called bases in the column.
fn count_present(column: &[u8]) -> usize {
    column.iter().filter(|&&nt| nt != MISSING).count()
}

/// Number of distinct called bases in the column.
fn count_bases(column: &[u8]) -> usize {
    let mut seen = [false; 4];
    for &nt in column {
        match nt {
            b'A' => seen[0] = true,
            b'C' => seen[1] = true,
            b'G' => seen[2] = true,
            b'T' => seen[3] = true,
            _ => {}
        }
    }
    seen.iter().filter(|&&x| x).count()
}

fn nexus_name(name: &str) -> String {
    if name.contains(char::is_whitespace) { format!("'{}'", name) } else { name.to_owned() }
}

/// Reads taxa names and rows from the MATRIX block.
fn read_nexus_matrix(path: &Path) -> crate::Result<(Vec<String>, Vec<Vec<u8>>)> {
    let mut taxa = Vec::new();
    let mut rows = Vec::new();
    let mut in_matrix = false;
    for line in ext::sys::open(path)?.lines() {
        let line = line.map_err(add_path!(path))?;
        let line = line.trim();
        if !in_matrix {
            in_matrix = line.eq_ignore_ascii_case("MATRIX");
            continue;
        }
        if line.starts_with(';') {
            return Ok((taxa, rows));
        }
        if line.is_empty() {
            continue;
        }
        let (name, seq) = if let Some(rest) = line.strip_prefix('\'') {
            rest.split_once('\'')
        } else {
            line.split_once(char::is_whitespace)
        }.ok_or_else(|| error!(InvalidData, "Cannot parse alignment row {:?} in {}", line, ext::fmt::path(path)))?;
        taxa.push(name.to_owned());
        rows.push(seq.trim().as_bytes().to_vec());
    }
    Err(error!(InvalidData, "Alignment {} has no complete MATRIX block", ext::fmt::path(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn calls(entries: &[(&str, u64, u8)]) -> SiteCalls {
        entries.iter().map(|&(c, p, b)| (Site::new(c, p), b)).collect()
    }

    fn example() -> SiteAlignment {
        SiteAlignment::aggregate(vec![
            ("A".to_owned(), calls(&[("c1", 10, b'A'), ("c1", 5, b'C'), ("c2", 1, b'G'), ("c1", 7, b'T')])),
            ("B".to_owned(), calls(&[("c1", 10, b'G'), ("c1", 5, b'C'), ("c2", 1, b'T')])),
            ("C".to_owned(), calls(&[("c1", 10, b'T'), ("c2", 1, b'T'), ("c3", 3, b'A')])),
        ])
    }

    #[test]
    fn aggregate_sites() {
        let aln = example();
        // c1/5: single base, c1/7 and c3/3: single taxon.
        assert_eq!(aln.sites(), &[Site::new("c1", 10), Site::new("c2", 1)]);
        assert_eq!(aln.rows, vec![b"AG".to_vec(), b"GT".to_vec(), b"TT".to_vec()]);
        assert_eq!(aln.biallelic().sites(), &[Site::new("c2", 1)]);
        assert_eq!(aln.contigs().into_iter().collect::<Vec<_>>(), vec!["c1", "c2"]);
    }

    #[test]
    fn positions_sorted_numerically() {
        let aln = SiteAlignment::aggregate(vec![
            ("A".to_owned(), calls(&[("c", 100, b'A'), ("c", 20, b'A')])),
            ("B".to_owned(), calls(&[("c", 100, b'C'), ("c", 20, b'G')])),
        ]);
        assert_eq!(aln.sites(), &[Site::new("c", 20), Site::new("c", 100)]);
    }

    #[test]
    fn missing_filter() {
        let aln = SiteAlignment::aggregate(vec![
            ("A".to_owned(), calls(&[("c", 1, b'A'), ("c", 2, b'A'), ("c", 3, b'A')])),
            ("B".to_owned(), calls(&[("c", 1, b'C'), ("c", 2, b'C'), ("c", 3, b'C')])),
            ("C".to_owned(), calls(&[("c", 1, b'C'), ("c", 2, b'G')])),
            ("D".to_owned(), calls(&[("c", 1, b'C')])),
        ]);
        assert_eq!(aln.n_sites(), 3);
        assert_eq!(aln.filter_missing(0).sites(), &[Site::new("c", 1)]);
        assert_eq!(aln.filter_missing(1).n_sites(), 2);
        assert_eq!(aln.filter_missing(2).n_sites(), 3);
        // Site 2 has three distinct bases.
        assert_eq!(aln.filter_missing(1).biallelic().sites(), &[Site::new("c", 1)]);
    }

    #[test]
    fn parse_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sites.tsv");
        fs::write(&path, "# contig\tpos\tbase\nc1\t5\ta\nc1\t6\tN\n\nc2\t1\tG\n").unwrap();
        let loaded = load_calls(&path).unwrap();
        assert_eq!(loaded, calls(&[("c1", 5, b'A'), ("c2", 1, b'G')]));

        fs::write(&path, "c1\tfive\tA\n").unwrap();
        assert!(matches!(load_calls(&path), Err(crate::Error::InvalidData(_))));
        fs::write(&path, "c1\t5\tA\nc1\t5\tC\n").unwrap();
        assert!(matches!(load_calls(&path), Err(crate::Error::InvalidData(_))));
    }

    #[test]
    fn nexus_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let nex = dir.path().join("alignment.nex");
        let locs = dir.path().join("alignment_locs.txt");
        let aln = example();
        aln.save(&nex, Some(&locs)).unwrap();
        let text = fs::read_to_string(&nex).unwrap();
        assert!(text.starts_with("#NEXUS\n"));
        assert!(text.contains("DIMENSIONS NTAX=3 NCHAR=2;"));
        assert!(text.contains("FORMAT DATATYPE=DNA MISSING=N GAP=-;"));
        assert_eq!(fs::read_to_string(&locs).unwrap(), "c1/10\nc2/1\n");
        assert_eq!(SiteAlignment::load(&nex, &locs).unwrap(), aln);

        fs::write(&locs, "c1/10\n").unwrap();
        assert!(SiteAlignment::load(&nex, &locs).is_err());
    }
}
