pub mod fastx;

pub use fastx::write_fasta;

/// Named nucleotide sequence (contig, allele sequence or one row of an alignment).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedSeq {
    name: String,
    seq: Vec<u8>,
}

impl NamedSeq {
    /// Constructs new named sequence.
    pub fn new(name: String, seq: Vec<u8>) -> Self {
        Self { name, seq }
    }

    /// Returns reference to the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns reference to the sequence.
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }
}

/// Is this a called nucleotide (not gap, not N, not an ambiguity code)?
#[inline]
pub fn is_base(nt: u8) -> bool {
    matches!(nt, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't')
}

/// Does the sequence contain at least one called nucleotide?
pub fn has_bases(seq: &[u8]) -> bool {
    seq.iter().copied().any(is_base)
}
