//! Reading and writing FASTA files.

use std::{
    io,
    cmp::min,
    path::Path,
};
use bio::io::fasta;
use crate::{
    err::{add_path, error},
    ext,
    seq::NamedSeq,
};

/// Write a single sequence to the FASTA file.
/// Use this function instead of `bio::fasta::Writer` as the latter
/// writes the sequence into a single line, without splitting.
pub fn write_fasta<W: io::Write>(mut writer: W, name: &str, desc: Option<&str>, seq: &[u8]) -> io::Result<()> {
    write!(writer, ">{}", name)?;
    if let Some(desc) = desc {
        write!(writer, " {}", desc)?;
    }
    writer.write_all(b"\n")?;

    const WIDTH: usize = 120;
    let n = seq.len();
    for i in (0..n).step_by(WIDTH) {
        writer.write_all(&seq[i..min(i + WIDTH, n)])?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Iterates over all records of a FASTA file (optionally gzip compressed),
/// calling `f` on each record. Stops at the first error.
pub fn for_each_record<F>(filename: &Path, mut f: F) -> crate::Result<()>
where F: FnMut(&fasta::Record) -> crate::Result<()>,
{
    let reader = fasta::Reader::from_bufread(ext::sys::open(filename)?);
    for record in reader.records() {
        let record = record.map_err(add_path!(filename))?;
        record.check().map_err(|e| error!(InvalidData, "Invalid FASTA record {} in {}: {}",
            record.id(), ext::fmt::path(filename), e))?;
        f(&record)?;
    }
    Ok(())
}

/// Loads all records from a FASTA file.
pub fn read_all(filename: &Path) -> crate::Result<Vec<NamedSeq>> {
    let mut seqs = Vec::new();
    for_each_record(filename, |record| {
        seqs.push(NamedSeq::new(record.id().to_owned(), record.seq().to_vec()));
        Ok(())
    })?;
    Ok(seqs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqs.fa");
        let long: Vec<u8> = b"ACGT".iter().copied().cycle().take(250).collect();
        let mut buf = Vec::new();
        write_fasta(&mut buf, "contig1", Some("len=250"), &long).unwrap();
        write_fasta(&mut buf, "contig2", None, b"--AC").unwrap();
        // 250 bases are split into lines of 120, 120 and 10.
        assert_eq!(String::from_utf8_lossy(&buf).lines().count(), 6);
        fs::write(&path, &buf).unwrap();

        let seqs = read_all(&path).unwrap();
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].name(), "contig1");
        assert_eq!(seqs[0].seq(), &long[..]);
        assert_eq!(seqs[1].seq(), b"--AC");
    }
}
