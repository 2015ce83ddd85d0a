//! Block file layout: a sequence of `{header}{payload}` records.
//!
//! The fixed header carries the element count, encoding tag, and payload byte
//! length, so any block can be reached by skipping payloads without decoding
//! them. The reader builds a block index once at open time; payloads are read
//! on demand, one block at a time.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use quarry_core::error::{Error, Result};
use quarry_core::value::Value;

use crate::block::{encode, BlockInfo, EncodingKind};

const MAGIC: [u8; 4] = *b"QRYB";
const HEADER_LEN: u64 = 4 + 8 + 1 + 8;

/// One block's bytes and header, as loaded from storage. Owned by whoever
/// loaded it (usually held behind an `Arc` handed out by the cache).
#[derive(Debug)]
pub struct LoadedBlock {
    pub info: BlockInfo,
    pub bytes: Vec<u8>,
}

/// Appends encoded blocks to a column file.
pub struct BlockFileWriter {
    out: BufWriter<File>,
    blocks_written: usize,
    rows_written: u64,
}

impl BlockFileWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            blocks_written: 0,
            rows_written: 0,
        })
    }

    /// Encode `values` as one block and append it.
    pub fn write_block(&mut self, values: &[Value]) -> Result<BlockInfo> {
        let mut info = BlockInfo::default();
        let payload = encode(values, &mut info);

        self.out.write_all(&MAGIC)?;
        self.out.write_all(&info.element_count.to_le_bytes())?;
        self.out.write_all(&[info.encoding as u8])?;
        self.out.write_all(&info.byte_length.to_le_bytes())?;
        self.out.write_all(&payload)?;

        self.blocks_written += 1;
        self.rows_written += info.element_count;
        Ok(info)
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    info: BlockInfo,
    payload_offset: u64,
    /// Absolute row index of this block's first element within the file.
    first_row: u64,
}

/// Random-access reader over a block file. Holds only the header index;
/// payloads are loaded per block via `load_block`.
#[derive(Debug)]
pub struct BlockFileReader {
    path: PathBuf,
    entries: Vec<BlockEntry>,
    total_rows: u64,
}

impl BlockFileReader {
    /// Scan the headers (skipping payloads) and build the block index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut entries = Vec::new();
        let mut offset = 0u64;
        let mut first_row = 0u64;
        let mut header = [0u8; HEADER_LEN as usize];

        while offset < file_len {
            if offset + HEADER_LEN > file_len {
                return Err(Error::Decode(format!(
                    "truncated block header at offset {offset} in {}",
                    path.display()
                )));
            }
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut header)?;

            if header[0..4] != MAGIC {
                return Err(Error::Decode(format!(
                    "bad block magic at offset {offset} in {}",
                    path.display()
                )));
            }
            let element_count = u64::from_le_bytes(header[4..12].try_into().unwrap());
            let encoding = EncodingKind::from_u8(header[12])?;
            let byte_length = u64::from_le_bytes(header[13..21].try_into().unwrap());

            let payload_offset = offset + HEADER_LEN;
            if payload_offset + byte_length > file_len {
                return Err(Error::Decode(format!(
                    "truncated block payload at offset {payload_offset} in {}",
                    path.display()
                )));
            }

            entries.push(BlockEntry {
                info: BlockInfo {
                    element_count,
                    encoding,
                    byte_length,
                },
                payload_offset,
                first_row,
            });
            first_row += element_count;
            offset = payload_offset + byte_length;
        }

        Ok(Self {
            path,
            entries,
            total_rows: first_row,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_blocks(&self) -> usize {
        self.entries.len()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn info(&self, block: usize) -> Option<&BlockInfo> {
        self.entries.get(block).map(|e| &e.info)
    }

    /// Absolute row index of the block's first element.
    pub fn first_row(&self, block: usize) -> Option<u64> {
        self.entries.get(block).map(|e| e.first_row)
    }

    /// Index of the block containing absolute row `row`.
    pub fn block_containing(&self, row: u64) -> Option<usize> {
        if row >= self.total_rows {
            return None;
        }
        let idx = self.entries.partition_point(|e| e.first_row <= row);
        Some(idx - 1)
    }

    /// Read one block's payload from disk.
    pub fn load_block(&self, block: usize) -> Result<LoadedBlock> {
        let entry = self.entries.get(block).ok_or_else(|| {
            Error::Decode(format!(
                "block {block} out of range in {}",
                self.path.display()
            ))
        })?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.payload_offset))?;
        let mut bytes = vec![0u8; entry.info.byte_length as usize];
        file.read_exact(&mut bytes)?;
        tracing::trace!(
            file = %self.path.display(),
            block,
            rows = entry.info.element_count,
            "loaded block payload"
        );
        Ok(LoadedBlock {
            info: entry.info,
            bytes,
        })
    }
}
