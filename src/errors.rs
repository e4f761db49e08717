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

use std::{backtrace::Backtrace, error::Error, fmt, io, path::PathBuf};

pub type InitResult<T> = Result<T, InitError>;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Error when registering tables. Tables that do not match their
/// expected size indicate a broken installation.
#[derive(Debug)]
pub enum InitError {
    /// I/O error while inspecting a table file.
    Read {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        error: io::Error,
    },
    /// Table file does not have the size of its composition.
    SizeMismatch {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        expected: u64,
        #[allow(missing_docs)]
        actual: u64,
    },
    /// Compressed table with an unreadable header.
    Corrupted {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        error: ProbeError,
    },
    /// Compressed table with a block size other than the cache chunk size.
    BlockSize {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        block_size: u32,
        #[allow(missing_docs)]
        chunk_size: usize,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Read { path, error } => {
                write!(f, "failed to read {}: {error}", path.display())
            }
            InitError::SizeMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "table {} has {actual} bytes, expected {expected}",
                path.display()
            ),
            InitError::Corrupted { path, error } => {
                write!(f, "corrupted table header in {}: {error}", path.display())
            }
            InitError::BlockSize {
                path,
                block_size,
                chunk_size,
            } => write!(
                f,
                "table {} uses blocks of {block_size} bytes, but chunks are {chunk_size} bytes",
                path.display()
            ),
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InitError::Read { error, .. } => Some(error),
            InitError::Corrupted { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Error when reading from a table.
#[derive(Debug)]
pub enum ProbeError {
    /// I/O error.
    Read {
        #[allow(missing_docs)]
        error: io::Error,
    },
    /// Compressed table file has unexpected magic header bytes.
    Magic {
        #[allow(missing_docs)]
        magic: [u8; 4],
    },
    /// Corrupted table.
    CorruptedTable {
        #[allow(missing_docs)]
        backtrace: Backtrace,
    },
    /// Decoded block does not match its checksum.
    Checksum {
        #[allow(missing_docs)]
        block: u64,
    },
    /// The table file was closed after an earlier error.
    Unavailable,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Read { error } => write!(f, "i/o error reading table file: {error}"),
            ProbeError::Magic { magic } => write!(f, "invalid magic header bytes: {magic:x?}"),
            ProbeError::CorruptedTable { backtrace } => write!(f, "corrupted table: {backtrace}"),
            ProbeError::Checksum { block } => write!(f, "checksum mismatch in block {block}"),
            ProbeError::Unavailable => f.write_str("table unavailable after earlier error"),
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeError::Read { error } => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(error: io::Error) -> ProbeError {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => ProbeError::CorruptedTable {
                backtrace: Backtrace::capture(),
            },
            _ => ProbeError::Read { error },
        }
    }
}

/// Return a `CorruptedTable` error.
macro_rules! throw {
    () => {
        return Err(crate::errors::ProbeError::CorruptedTable {
            backtrace: ::std::backtrace::Backtrace::capture(),
        })
    };
}

/// Unwrap an `Option` or return a `CorruptedTable` error.
macro_rules! u {
    ($e:expr) => {
        match $e {
            Some(ok) => ok,
            None => throw!(),
        }
    };
}

/// Ensure that a condition holds. Otherwise return a `CorruptedTable` error.
macro_rules! ensure {
    ($cond:expr) => {
        if !$cond {
            throw!();
        }
    };
}
