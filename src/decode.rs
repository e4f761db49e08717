// This file is part of the egtb library.
// Copyright (C) 2017-2025 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Block decompression of compressed tables.
//!
//! A compressed table is split into blocks of a fixed uncompressed size,
//! each of which can be decoded on its own. The cache asks a
//! [`BlockDecoder`] for one block at a time.
//!
//! The built-in `emd` container has the layout (all integers little
//! endian):
//!
//! | offset | content                                          |
//! |--------|--------------------------------------------------|
//! | 0      | magic `EMD1`                                     |
//! | 4      | `u32` block size                                 |
//! | 8      | `u64` uncompressed length                        |
//! | 16     | `u32` number of blocks `n`                       |
//! | 20     | `n + 1` `u64` file offsets of the blocks         |
//! | ...    | per block: `u32` CRC-32, then a raw deflate stream |

use std::io::{self, Read as _, Write};

use byteorder::{ByteOrder as _, WriteBytesExt as _, LE};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression, Crc};

use crate::{
    errors::{ProbeError, ProbeResult},
    filesystem::{RandomAccessFile, ReadHint},
};

const MAGIC: [u8; 4] = *b"EMD1";

const HEADER_LEN: u64 = 20;

/// Upper bound for one stored block: checksum, plus deflate output for
/// incompressible input (stored blocks of at most 65535 bytes with a 5 byte
/// header each).
fn max_stored_len(block_size: u32) -> u64 {
    let block_size = u64::from(block_size);
    4 + block_size + 5 * (block_size / 65535 + 1) + 16
}

/// Decodes blocks of a compressed table.
pub trait BlockDecoder: Send + Sync {
    /// Length of the decoded table in bytes.
    fn uncompressed_len(&self) -> u64;

    /// Uncompressed size of every block but the last.
    fn block_size(&self) -> usize;

    /// Decodes block number `block` of `file` into the front of `out`,
    /// returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Errors on I/O failure, truncated or malformed data, or checksum
    /// mismatch.
    fn decode(&self, file: &dyn RandomAccessFile, block: u64, out: &mut [u8]) -> ProbeResult<usize>;
}

/// Decoder for the `emd` container.
#[derive(Debug)]
pub struct EmdDecoder {
    block_size: u32,
    uncompressed_len: u64,
    offsets: Vec<u64>,
}

impl EmdDecoder {
    /// Reads the header and block offsets of a file that is `file_len` bytes
    /// long.
    ///
    /// # Errors
    ///
    /// Errors if the header is unreadable or inconsistent, or if a block
    /// lies outside the file.
    pub fn open(file: &dyn RandomAccessFile, file_len: u64) -> ProbeResult<EmdDecoder> {
        let mut header = [0; HEADER_LEN as usize];
        file.read_exact_at(ReadHint::Header, 0, &mut header)?;

        let mut magic = [0; 4];
        magic.copy_from_slice(&header[..4]);
        if magic != MAGIC {
            return Err(ProbeError::Magic { magic });
        }

        let block_size = LE::read_u32(&header[4..]);
        let uncompressed_len = LE::read_u64(&header[8..]);
        let blocks = LE::read_u32(&header[16..]);
        ensure!(block_size > 0);
        ensure!(u64::from(blocks) == uncompressed_len.div_ceil(u64::from(block_size)));

        let table_len = (u64::from(blocks) + 1) * 8;
        ensure!(HEADER_LEN + table_len <= file_len);

        let mut raw = vec![0; table_len as usize];
        file.read_exact_at(ReadHint::OffsetTable, HEADER_LEN, &mut raw)?;
        let offsets: Vec<u64> = raw.chunks_exact(8).map(LE::read_u64).collect();

        ensure!(offsets[0] == HEADER_LEN + table_len);
        ensure!(offsets[offsets.len() - 1] <= file_len);
        let max_len = max_stored_len(block_size);
        for pair in offsets.windows(2) {
            // Every block holds at least its checksum.
            ensure!(pair[0] + 4 <= pair[1]);
            ensure!(pair[1] - pair[0] <= max_len);
        }

        Ok(EmdDecoder {
            block_size,
            uncompressed_len,
            offsets,
        })
    }

    pub fn blocks(&self) -> u64 {
        self.offsets.len() as u64 - 1
    }
}

impl BlockDecoder for EmdDecoder {
    fn uncompressed_len(&self) -> u64 {
        self.uncompressed_len
    }

    fn block_size(&self) -> usize {
        self.block_size as usize
    }

    fn decode(&self, file: &dyn RandomAccessFile, block: u64, out: &mut [u8]) -> ProbeResult<usize> {
        ensure!(block < self.blocks());
        let start = self.offsets[block as usize];
        let end = self.offsets[block as usize + 1];
        ensure!(start + 4 <= end && end - start <= max_stored_len(self.block_size));

        let mut compressed = vec![0; (end - start) as usize];
        file.read_exact_at(ReadHint::Block, start, &mut compressed)?;
        let expected_crc = LE::read_u32(&compressed[..4]);

        let first = block * u64::from(self.block_size);
        let len = u64::from(self.block_size).min(self.uncompressed_len - first) as usize;
        let out = u!(out.get_mut(..len));
        DeflateDecoder::new(&compressed[4..])
            .read_exact(out)
            .map_err(|error| match error.kind() {
                io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                    ProbeError::CorruptedTable {
                        backtrace: std::backtrace::Backtrace::capture(),
                    }
                }
                _ => ProbeError::Read { error },
            })?;

        let mut crc = Crc::new();
        crc.update(out);
        if crc.sum() != expected_crc {
            return Err(ProbeError::Checksum { block });
        }
        Ok(len)
    }
}

/// Writes `data` as an `emd` container with the given block size.
///
/// # Errors
///
/// Propagates errors of `writer`.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn write_emd<W: Write>(data: &[u8], block_size: u32, mut writer: W) -> io::Result<()> {
    assert!(block_size > 0, "block size must be positive");

    let mut blocks = Vec::new();
    for chunk in data.chunks(block_size as usize) {
        let mut crc = Crc::new();
        crc.update(chunk);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(chunk)?;
        blocks.push((crc.sum(), encoder.finish()?));
    }
    let count = u32::try_from(blocks.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many blocks"))?;

    writer.write_all(&MAGIC)?;
    writer.write_u32::<LE>(block_size)?;
    writer.write_u64::<LE>(data.len() as u64)?;
    writer.write_u32::<LE>(count)?;

    let mut offset = HEADER_LEN + (blocks.len() as u64 + 1) * 8;
    writer.write_u64::<LE>(offset)?;
    for (_, compressed) in &blocks {
        offset += 4 + compressed.len() as u64;
        writer.write_u64::<LE>(offset)?;
    }

    for (crc, compressed) in &blocks {
        writer.write_u32::<LE>(*crc)?;
        writer.write_all(compressed)?;
    }
    Ok(())
}
