//! LC-3 object files.
//!
//! The binary format is a plain block stream with no file header, footer,
//! magic number or checksum:
//!
//! ```text
//! repeat until EOF:
//!     address    u16, big-endian
//!     word_count u16, big-endian
//!     word_count x u16, big-endian   one memory cell each
//! ```
//!
//! Blocks may appear in any order, may be non-contiguous and may overlap;
//! they are applied to memory as plain sequential writes, so on overlap
//! the later block wins.

use crate::cpu::Memory;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// One address-tagged run of words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Destination address of the first word.
    pub origin: u16,
    /// The words, one memory cell each.
    pub words: Vec<u16>,
}

/// A parsed object file: ordered blocks plus an optional symbol table.
///
/// The symbol table is produced by an assembler front end and consumed
/// only for diagnostics; executing code never needs it, and object files
/// with an empty table are the normal case here.
#[derive(Debug, Clone, Default)]
pub struct ObjectFile {
    /// Blocks in stream order.
    pub blocks: Vec<Block>,
    /// Symbol name to address, if known.
    pub symbols: BTreeMap<String, u16>,
}

impl ObjectFile {
    /// Create an empty object file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an object file from a byte stream.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ObjError> {
        let mut obj = Self::new();
        while let Some(block) = read_block(reader)? {
            obj.blocks.push(block);
        }
        Ok(obj)
    }

    /// Parse an object file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ObjError> {
        let mut file = std::fs::File::open(path.as_ref())?;
        Self::read(&mut file)
    }

    /// Serialize back to the binary block format.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), ObjError> {
        for block in &self.blocks {
            writer.write_all(&block.origin.to_be_bytes())?;
            writer.write_all(&(block.words.len() as u16).to_be_bytes())?;
            for &word in &block.words {
                writer.write_all(&word.to_be_bytes())?;
            }
        }
        Ok(())
    }

    /// Write to disk in the binary block format.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ObjError> {
        let mut file = std::fs::File::create(path.as_ref())?;
        self.write(&mut file)
    }

    /// Copy every block into memory, in stream order (last write wins).
    pub fn apply(&self, mem: &mut Memory) {
        for block in &self.blocks {
            mem.write_block(block.origin, &block.words);
        }
    }

    /// The first block's origin, conventionally the entry point.
    pub fn entry(&self) -> Option<u16> {
        self.blocks.first().map(|block| block.origin)
    }

    /// Total number of words across all blocks.
    pub fn word_count(&self) -> usize {
        self.blocks.iter().map(|block| block.words.len()).sum()
    }

    /// Check if there are no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Stream an object file straight into memory.
///
/// Each block is written as soon as it has been read in full, so a
/// truncated stream leaves every earlier block applied (no rollback) and
/// the torn block unapplied. Returns the first block's origin, if any.
pub fn load_into<R: Read>(reader: &mut R, mem: &mut Memory) -> Result<Option<u16>, ObjError> {
    let mut entry = None;
    while let Some(block) = read_block(reader)? {
        if entry.is_none() {
            entry = Some(block.origin);
        }
        mem.write_block(block.origin, &block.words);
    }
    Ok(entry)
}

/// Load an object file from disk straight into memory.
pub fn load_file<P: AsRef<Path>>(path: P, mem: &mut Memory) -> Result<Option<u16>, ObjError> {
    let mut file = std::fs::File::open(path.as_ref())?;
    load_into(&mut file, mem)
}

/// Read one block, or `None` on a clean end of stream.
fn read_block<R: Read>(reader: &mut R) -> Result<Option<Block>, ObjError> {
    let mut header = [0u8; 4];

    // EOF is legal only on a block boundary; a torn header is an error
    let mut got = reader.read(&mut header)?;
    if got == 0 {
        return Ok(None);
    }
    while got < header.len() {
        let n = reader.read(&mut header[got..])?;
        if n == 0 {
            return Err(ObjError::TruncatedHeader { bytes: got });
        }
        got += n;
    }

    let origin = u16::from_be_bytes([header[0], header[1]]);
    let count = u16::from_be_bytes([header[2], header[3]]) as usize;

    let mut words = Vec::with_capacity(count);
    let mut buf = [0u8; 2];
    for read_so_far in 0..count {
        if let Err(err) = reader.read_exact(&mut buf) {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                return Err(ObjError::TruncatedBlock {
                    origin,
                    expected: count,
                    found: read_so_far,
                });
            }
            return Err(err.into());
        }
        words.push(u16::from_be_bytes(buf));
    }

    Ok(Some(Block { origin, words }))
}

/// Errors that can occur while reading or writing object files.
#[derive(Debug, Error)]
pub enum ObjError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended inside a 4-byte block header.
    #[error("truncated block header: got {bytes} of 4 bytes")]
    TruncatedHeader {
        /// Header bytes actually present.
        bytes: usize,
    },

    /// A block header announced more words than the stream contains.
    #[error("truncated block at 0x{origin:04X}: header declares {expected} words, found {found}")]
    TruncatedBlock {
        /// Destination address from the block header.
        origin: u16,
        /// Word count from the block header.
        expected: usize,
        /// Full words actually present.
        found: usize,
    },
}
