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

use std::{
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::{
    color::Color,
    composition::Composition,
    decode::{BlockDecoder, EmdDecoder},
    errors::{InitError, InitResult, ProbeError, ProbeResult},
    filesystem::{Filesystem, RandomAccessFile, ReadHint},
    outcome::Outcome,
};

/// Extension of tables with the given side to move.
pub fn extension(side: Color) -> &'static str {
    side.fold(".nbw", ".nbb")
}

/// Extension appended to compressed tables.
pub const COMPRESSED_EXTENSION: &str = ".emd";

/// File names to try for a table, in order of preference: plain,
/// compressed, and compressed with a name truncated to 8.3 form.
///
/// # Examples
///
/// ```
/// use egtb::{table_file_names, Color};
///
/// let names = table_file_names(&"kqkr".parse()?, Color::White);
/// assert_eq!(names, ["kqkr.nbw", "kqkr.nbw.emd", "kqkrnbw.emd"]);
///
/// let names = table_file_names(&"krpkp".parse()?, Color::Black);
/// assert_eq!(names[2], "krpkpnbb.emd");
/// # Ok::<_, egtb::ParseCompositionError>(())
/// ```
pub fn table_file_names(composition: &Composition, side: Color) -> [String; 3] {
    let name = composition.to_string();
    let ext = extension(side);
    let mut short: String = name.chars().chain(ext[1..].chars()).take(8).collect();
    short.push_str(COMPRESSED_EXTENSION);
    [
        format!("{name}{ext}"),
        format!("{name}{ext}{COMPRESSED_EXTENSION}"),
        short,
    ]
}

/// A whole table held in memory.
pub(crate) enum Resident {
    Heap(Box<[u8]>),
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
}

impl Resident {
    fn bytes(&self) -> &[u8] {
        match self {
            Resident::Heap(bytes) => bytes,
            #[cfg(feature = "mmap")]
            Resident::Mapped(mmap) => mmap,
        }
    }
}

struct FileState {
    /// Cleared after an I/O error. The table then stays unavailable.
    path: Option<PathBuf>,
    handle: Option<Box<dyn RandomAccessFile>>,
}

/// One table file: a composition with one side to move.
pub(crate) struct TableFile {
    size: u64,
    wide: bool,
    available: AtomicBool,
    decoder: Option<Box<dyn BlockDecoder>>,
    state: Mutex<FileState>,
    resident: RwLock<Option<Resident>>,
}

impl fmt::Debug for TableFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableFile")
            .field("size", &self.size)
            .field("wide", &self.wide)
            .field("compressed", &self.decoder.is_some())
            .finish_non_exhaustive()
    }
}

impl TableFile {
    /// Inspects a table file with `size` entries. Entries are single bytes
    /// or, if the file is twice as long, 16 bit scores.
    pub fn open(
        filesystem: &dyn Filesystem,
        path: PathBuf,
        size: u64,
        chunk_size: usize,
    ) -> InitResult<TableFile> {
        let compressed = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(COMPRESSED_EXTENSION));

        let (actual, decoder, handle) = if compressed {
            let handle = filesystem.open(&path).map_err(|error| InitError::Read {
                path: path.clone(),
                error,
            })?;
            let file_len = filesystem
                .regular_file_size(&path)
                .map_err(|error| InitError::Read {
                    path: path.clone(),
                    error,
                })?;
            let decoder = EmdDecoder::open(&*handle, file_len).map_err(|error| InitError::Corrupted {
                path: path.clone(),
                error,
            })?;
            if decoder.block_size() != chunk_size {
                return Err(InitError::BlockSize {
                    path,
                    block_size: decoder.block_size() as u32,
                    chunk_size,
                });
            }
            let decoder: Box<dyn BlockDecoder> = Box::new(decoder);
            (decoder.uncompressed_len(), Some(decoder), Some(handle))
        } else {
            let actual = filesystem
                .regular_file_size(&path)
                .map_err(|error| InitError::Read {
                    path: path.clone(),
                    error,
                })?;
            (actual, None, None)
        };

        let wide = if actual == size {
            false
        } else if actual == 2 * size {
            true
        } else {
            return Err(InitError::SizeMismatch {
                path,
                expected: size,
                actual,
            });
        };

        Ok(TableFile {
            size,
            wide,
            available: AtomicBool::new(true),
            decoder,
            state: Mutex::new(FileState {
                path: Some(path),
                handle,
            }),
            resident: RwLock::new(None),
        })
    }

    /// Number of entries.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_wide(&self) -> bool {
        self.wide
    }

    pub fn is_compressed(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn entry_len(&self) -> u64 {
        if self.wide {
            2
        } else {
            1
        }
    }

    /// Length of the decoded table in bytes.
    pub fn byte_len(&self) -> u64 {
        self.size * self.entry_len()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Decodes the entry bytes at the front of `bytes`.
    pub fn decode_entry(&self, bytes: [u8; 2]) -> Outcome {
        if self.wide {
            Outcome::from_score16(i16::from_le_bytes(bytes))
        } else {
            Outcome::from_byte(bytes[0] as i8)
        }
    }

    /// Reads an entry from the in-memory copy, if there is one.
    pub fn probe_resident(&self, index: u64) -> Option<Outcome> {
        let resident = self.resident.read();
        let bytes = resident.as_ref()?.bytes();
        let start = (index * self.entry_len()) as usize;
        let mut entry = [0; 2];
        let len = self.entry_len() as usize;
        entry[..len].copy_from_slice(bytes.get(start..start + len)?);
        Some(self.decode_entry(entry))
    }

    fn with_handle<T, F>(&self, filesystem: &dyn Filesystem, f: F) -> ProbeResult<T>
    where
        F: FnOnce(&dyn RandomAccessFile) -> ProbeResult<T>,
    {
        let mut state = self.state.lock();
        let FileState { path, handle } = &mut *state;
        let Some(path) = path else {
            return Err(ProbeError::Unavailable);
        };
        let handle = match handle {
            Some(handle) => handle,
            None => handle.insert(filesystem.open(path)?),
        };
        f(&**handle)
    }

    /// Reads chunk `chunk` of the decoded table into `buf`, returning the
    /// number of bytes read.
    pub fn read_chunk(
        &self,
        filesystem: &dyn Filesystem,
        chunk: u64,
        chunk_size: usize,
        buf: &mut [u8],
    ) -> ProbeResult<usize> {
        self.with_handle(filesystem, |handle| match self.decoder {
            Some(ref decoder) => decoder.decode(handle, chunk, buf),
            None => {
                let start = chunk * chunk_size as u64;
                ensure!(start < self.byte_len());
                let len = (chunk_size as u64).min(self.byte_len() - start) as usize;
                handle.read_exact_at(ReadHint::Chunk, start, &mut buf[..len])?;
                Ok(len)
            }
        })
    }

    /// Reads the whole decoded table into memory.
    pub fn load(&self, filesystem: &dyn Filesystem) -> ProbeResult<()> {
        let mut bytes = vec![0; self.byte_len() as usize].into_boxed_slice();
        self.with_handle(filesystem, |handle| match self.decoder {
            Some(ref decoder) => {
                let block_size = decoder.block_size();
                let mut scratch = vec![0; block_size];
                for (block, out) in bytes.chunks_mut(block_size).enumerate() {
                    let n = decoder.decode(handle, block as u64, &mut scratch)?;
                    ensure!(n == out.len());
                    out.copy_from_slice(&scratch[..n]);
                }
                Ok(())
            }
            None => Ok(handle.read_exact_at(ReadHint::Table, 0, &mut bytes)?),
        })?;
        *self.resident.write() = Some(Resident::Heap(bytes));
        Ok(())
    }

    /// Memory maps an uncompressed table.
    #[cfg(feature = "mmap")]
    pub fn map(&self) -> ProbeResult<()> {
        if self.is_compressed() {
            return Err(ProbeError::Read {
                error: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "compressed tables can not be mapped",
                ),
            });
        }
        let path = self.state.lock().path.clone().ok_or(ProbeError::Unavailable)?;
        // SAFETY: Table files are never modified while in use.
        let mmap = unsafe { crate::filesystem::map_file(&path)? };
        ensure!(mmap.len() as u64 == self.byte_len());
        *self.resident.write() = Some(Resident::Mapped(mmap));
        Ok(())
    }

    /// Drops the in-memory copy. Returns whether there was one.
    pub fn unload(&self) -> bool {
        self.resident.write().take().is_some()
    }

    pub fn is_resident(&self) -> bool {
        self.resident.read().is_some()
    }

    /// Closes the file handle. It is reopened on the next read.
    pub fn close(&self) {
        self.state.lock().handle = None;
    }

    /// Forgets the file after an error. Probes fail fast from now on.
    pub fn mark_unavailable(&self, error: &ProbeError) {
        let mut state = self.state.lock();
        if let Some(path) = state.path.take() {
            warn!(path = %path.display(), %error, "table unavailable");
        }
        state.handle = None;
        self.available.store(false, Ordering::Relaxed);
    }
}
