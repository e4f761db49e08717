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
    cmp::Ordering,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrayvec::ArrayVec;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::{
    cache::{BlockCache, CacheConfig, CacheStats, ChunkKey},
    color::{ByColor, Color},
    composition::{Composition, COUNT_VECTOR_LEN, MAX_NON_KINGS},
    enumerate::Enumerator,
    errors::{InitResult, ProbeError, ProbeResult},
    filesystem::{DefaultFilesystem, Filesystem},
    index::IndexCalculator,
    outcome::Outcome,
    position::Position,
    registry::CompositionRegistry,
    role::{Piece, Role},
    square::Square,
    table::{table_file_names, TableFile},
};

struct Entry {
    composition: Composition,
    calculators: ByColor<OnceCell<IndexCalculator>>,
    files: ByColor<Option<TableFile>>,
}

impl Entry {
    fn sides(&self) -> &'static [Color] {
        if self.composition.is_symmetric() {
            &[Color::White]
        } else {
            &Color::ALL
        }
    }
}

/// Builds a [`Tablebase`] with custom cache dimensions or filesystem.
///
/// # Examples
///
/// ```
/// use egtb::Tablebase;
///
/// let tablebase = Tablebase::builder()
///     .cache_capacity(1024 * 1024)
///     .chunk_size(4096)
///     .build();
///
/// assert_eq!(tablebase.cache_config().chunk_size, 4096);
/// ```
pub struct TablebaseBuilder {
    cache: CacheConfig,
    filesystem: Option<Arc<dyn Filesystem>>,
}

impl fmt::Debug for TablebaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TablebaseBuilder")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl TablebaseBuilder {
    /// Total bytes of cache buffers. `0` disables the cache.
    #[must_use]
    pub fn cache_capacity(mut self, bytes: usize) -> TablebaseBuilder {
        self.cache.capacity = bytes;
        self
    }

    /// Bytes per cache chunk, rounded up to a positive even number so that
    /// 16 bit entries never straddle two chunks.
    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> TablebaseBuilder {
        self.cache.chunk_size = bytes.max(2).next_multiple_of(2);
        self
    }

    /// Buckets per table and side.
    #[must_use]
    pub fn buckets(mut self, buckets: usize) -> TablebaseBuilder {
        self.cache.buckets = buckets.max(1);
        self
    }

    /// Reads tables from a custom filesystem.
    #[must_use]
    pub fn filesystem(mut self, filesystem: Arc<dyn Filesystem>) -> TablebaseBuilder {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn build(self) -> Tablebase {
        let enumerator = Enumerator::new();
        let entries: Vec<Entry> = Composition::all(MAX_NON_KINGS)
            .into_iter()
            .map(|composition| Entry {
                composition,
                calculators: ByColor::new_with(|_| OnceCell::new()),
                files: ByColor::new_with(|_| None),
            })
            .collect();
        let by_composition = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.composition, i as u16 + 1))
            .collect();
        let cache = BlockCache::new(self.cache, entries.len() + 1);

        Tablebase {
            filesystem: self.filesystem.unwrap_or_else(|| Arc::new(DefaultFilesystem)),
            enumerator,
            registry: CompositionRegistry::new(),
            entries,
            by_composition,
            cache,
            max_pieces: 0,
        }
    }
}

/// Raw description of one side for [`Tablebase::probe_raw()`].
#[derive(Debug, Copy, Clone)]
pub struct RawSide<'a> {
    /// King square, `0..64` with a1 = 0.
    pub king: u8,
    /// Piece counts ordered pawn, knight, bishop, rook, queen.
    pub counts: [u8; 5],
    /// Piece squares, grouped in the order of `counts`.
    pub squares: &'a [u8],
}

/// A collection of tables.
///
/// All tables known by name are enumerated on construction.
/// [`Tablebase::initialize_tables()`] then looks for the files, and probing
/// is possible from any number of threads.
pub struct Tablebase {
    filesystem: Arc<dyn Filesystem>,
    enumerator: Enumerator,
    registry: CompositionRegistry,
    entries: Vec<Entry>,
    by_composition: FxHashMap<Composition, u16>,
    cache: BlockCache,
    max_pieces: usize,
}

impl fmt::Debug for Tablebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tablebase")
            .field("cache", &self.cache)
            .field("max_pieces", &self.max_pieces)
            .finish_non_exhaustive()
    }
}

impl Default for Tablebase {
    fn default() -> Tablebase {
        Tablebase::new()
    }
}

impl Tablebase {
    /// Creates an empty collection with the default cache.
    pub fn new() -> Tablebase {
        Tablebase::builder().build()
    }

    pub fn builder() -> TablebaseBuilder {
        TablebaseBuilder {
            cache: CacheConfig::default(),
            filesystem: None,
        }
    }

    /// Creates an empty collection reading from a custom filesystem.
    pub fn with_filesystem(filesystem: Arc<dyn Filesystem>) -> Tablebase {
        Tablebase::builder().filesystem(filesystem).build()
    }

    /// Looks for table files in the given directories and registers them.
    ///
    /// Directories are searched in order, and the first one containing a
    /// table wins. Missing or unreadable directories are skipped.
    ///
    /// Returns the largest number of pieces (kings included) of all
    /// registered tables, or `0` if there are none.
    ///
    /// # Errors
    ///
    /// Errors if a table file has the wrong size or a corrupted header.
    pub fn initialize_tables<I, P>(&mut self, paths: I) -> InitResult<usize>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for dir in paths {
            let dir = dir.as_ref();
            let listing: FxHashMap<String, PathBuf> = match self.filesystem.read_dir(dir) {
                Ok(listing) => listing
                    .into_iter()
                    .filter_map(|path| {
                        let name = path.file_name()?.to_str()?.to_owned();
                        Some((name, path))
                    })
                    .collect(),
                Err(error) => {
                    warn!(dir = %dir.display(), %error, "skipping table directory");
                    continue;
                }
            };

            for i in 0..self.entries.len() {
                for &side in self.entries[i].sides() {
                    if self.entries[i].files.get(side).is_some() {
                        continue;
                    }
                    let composition = self.entries[i].composition;
                    let Some(path) = table_file_names(&composition, side)
                        .iter()
                        .find_map(|name| listing.get(name))
                    else {
                        continue;
                    };

                    let size = self.calculator_at(i, side).size();
                    let file = TableFile::open(&*self.filesystem, path.clone(), size, self.cache.chunk_size())?;
                    debug!(
                        path = %path.display(),
                        %composition,
                        %side,
                        size,
                        wide = file.is_wide(),
                        compressed = file.is_compressed(),
                        "registered table"
                    );
                    *self.entries[i].files.get_mut(side) = Some(file);
                    self.registry.register(composition, i as i32 + 1);
                    self.max_pieces = self.max_pieces.max(composition.count() + 2);
                }
            }
        }
        Ok(self.max_pieces)
    }

    /// Largest number of pieces (kings included) of all registered tables.
    pub fn max_pieces(&self) -> usize {
        self.max_pieces
    }

    /// Table id of a normalized composition. Ids are stable and independent
    /// of which tables are installed.
    pub fn table_id(&self, composition: &Composition) -> Option<u16> {
        self.by_composition.get(composition).copied()
    }

    /// The composition with the given table id.
    pub fn composition(&self, id: u16) -> Option<Composition> {
        self.entry(id).map(|entry| entry.composition)
    }

    /// Signed table id for the material of the given count vector: positive
    /// for a registered table, negative for a registered table with colors
    /// swapped, `0` if there is none.
    pub fn lookup(&self, counts: &[u8]) -> i32 {
        self.registry.lookup(counts)
    }

    pub fn registry(&self) -> &CompositionRegistry {
        &self.registry
    }

    /// Checks whether a table file is registered for the given table and
    /// side to move.
    pub fn has_table(&self, id: u16, side: Color) -> bool {
        self.file(id, side).is_some()
    }

    /// Number of entries of the table, whether or not it is installed.
    pub fn table_size(&self, id: u16, side: Color) -> Option<u64> {
        self.calculator(id, side).map(IndexCalculator::size)
    }

    /// The index calculator of a table, built on first use.
    pub fn calculator(&self, id: u16, side: Color) -> Option<&IndexCalculator> {
        let i = usize::from(id).checked_sub(1)?;
        (i < self.entries.len()).then(|| self.calculator_at(i, side))
    }

    fn calculator_at(&self, i: usize, side: Color) -> &IndexCalculator {
        let entry = &self.entries[i];
        entry
            .calculators
            .get(side)
            .get_or_init(|| IndexCalculator::new(entry.composition, side, &self.enumerator))
    }

    fn entry(&self, id: u16) -> Option<&Entry> {
        self.entries.get(usize::from(id).checked_sub(1)?)
    }

    fn file(&self, id: u16, side: Color) -> Option<&TableFile> {
        self.entry(id)?.files.get(side).as_ref()
    }

    /// Looks up the outcome with the given table id, side to move and index.
    ///
    /// Returns [`Outcome::Broken`] if the table is not installed, the index
    /// is out of range, or the table could not be read. Read errors make
    /// the table unavailable for all later probes.
    pub fn probe_outcome(&self, id: u16, side: Color, index: u64) -> Outcome {
        let Some(file) = self.file(id, side) else {
            return Outcome::Broken;
        };
        if index >= file.size() || !file.is_available() {
            return Outcome::Broken;
        }
        if let Some(outcome) = file.probe_resident(index) {
            return outcome;
        }

        match self.read_entry(file, id, side, index) {
            Ok(bytes) => file.decode_entry(bytes),
            Err(error) => {
                file.mark_unavailable(&error);
                Outcome::Broken
            }
        }
    }

    fn read_entry(&self, file: &TableFile, id: u16, side: Color, index: u64) -> ProbeResult<[u8; 2]> {
        let chunk_size = self.cache.chunk_size();
        let offset = index * file.entry_len();
        let key = ChunkKey {
            table: id,
            side,
            chunk: offset / chunk_size as u64,
        };
        let within = (offset % chunk_size as u64) as usize;
        let fill = |buf: &mut [u8]| file.read_chunk(&*self.filesystem, key.chunk, chunk_size, buf);
        if file.is_wide() {
            self.cache.read::<2, _>(key, within, fill)
        } else {
            let [byte] = self.cache.read::<1, _>(key, within, fill)?;
            Ok([byte, 0])
        }
    }

    /// Looks up the outcome of a position, from the point of view of the
    /// side to move.
    ///
    /// # Examples
    ///
    /// ```
    /// use egtb::{Outcome, Position, Tablebase};
    ///
    /// let tablebase = Tablebase::new();
    /// let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse()?;
    ///
    /// // No tables installed.
    /// assert_eq!(tablebase.probe(&pos), Outcome::Broken);
    /// # Ok::<_, egtb::PositionError>(())
    /// ```
    pub fn probe(&self, pos: &Position) -> Outcome {
        let composition = pos.composition();
        let id = self.registry.lookup(&composition.count_vector());
        let turn = pos.turn();

        let (id, side, inverted) = match id.cmp(&0) {
            Ordering::Equal => return Outcome::Broken,
            Ordering::Greater if composition.is_symmetric() && turn == Color::Black => {
                (id, Color::White, true)
            }
            Ordering::Greater => (id, turn, false),
            Ordering::Less => (-id, !turn, true),
        };
        let Ok(id) = u16::try_from(id) else {
            return Outcome::Broken;
        };
        if !self.has_table(id, side) {
            return Outcome::Broken;
        }
        let Some(calculator) = self.calculator(id, side) else {
            return Outcome::Broken;
        };

        let index = if inverted {
            calculator.index_inverted(pos)
        } else {
            calculator.index(pos)
        };
        match index {
            Some(index) => self.probe_outcome(id, side, index),
            None => Outcome::Broken,
        }
    }

    /// Looks up the outcome of a position given as raw square numbers.
    ///
    /// # Examples
    ///
    /// ```
    /// use egtb::{Color, Outcome, RawSide, Tablebase};
    ///
    /// let tablebase = Tablebase::new();
    /// let white = RawSide { king: 4, counts: [0, 0, 0, 1, 0], squares: &[0] };
    /// let black = RawSide { king: 60, counts: [0; 5], squares: &[] };
    /// assert_eq!(tablebase.probe_raw(Color::White, white, black, None), Outcome::Broken);
    /// ```
    pub fn probe_raw(&self, turn: Color, white: RawSide<'_>, black: RawSide<'_>, ep_square: Option<u8>) -> Outcome {
        let mut counts = [0; COUNT_VECTOR_LEN];
        counts[..5].copy_from_slice(&white.counts);
        counts[5..].copy_from_slice(&black.counts);
        if self.registry.lookup(&counts) == 0 {
            return Outcome::Broken;
        }
        match raw_position(turn, ByColor { white, black }, ep_square) {
            Some(pos) => self.probe(&pos),
            None => Outcome::Broken,
        }
    }

    /// Reads a whole table into memory. Later probes of this table bypass
    /// the cache.
    ///
    /// # Errors
    ///
    /// Errors if the table is not registered or can not be read.
    pub fn load_table_to_memory(&self, id: u16, side: Color) -> ProbeResult<()> {
        let file = self.file(id, side).ok_or(ProbeError::Unavailable)?;
        file.load(&*self.filesystem)?;
        debug!(id, %side, bytes = file.byte_len(), "loaded table to memory");
        Ok(())
    }

    /// Memory maps an uncompressed table. Later probes of this table bypass
    /// the cache.
    ///
    /// # Errors
    ///
    /// Errors if the table is not registered, compressed, or can not be
    /// mapped.
    #[cfg(feature = "mmap")]
    pub fn map_table(&self, id: u16, side: Color) -> ProbeResult<()> {
        let file = self.file(id, side).ok_or(ProbeError::Unavailable)?;
        file.map()?;
        debug!(id, %side, "mapped table");
        Ok(())
    }

    /// Drops the in-memory copy of a table. Returns whether there was one.
    pub fn unload_table(&self, id: u16, side: Color) -> bool {
        self.file(id, side).is_some_and(TableFile::unload)
    }

    pub fn is_table_in_memory(&self, id: u16, side: Color) -> bool {
        self.file(id, side).is_some_and(TableFile::is_resident)
    }

    /// Replaces the cache with one of `bytes` capacity. All cached chunks
    /// are dropped and all file handles closed.
    pub fn set_cache_capacity(&mut self, bytes: usize) {
        let config = CacheConfig {
            capacity: bytes,
            ..self.cache.config()
        };
        self.rebuild_cache(config);
    }

    /// Drops all cached chunks and closes all file handles.
    pub fn clear_cache(&mut self) {
        self.rebuild_cache(self.cache.config());
    }

    fn rebuild_cache(&mut self, config: CacheConfig) {
        self.cache = BlockCache::new(config, self.entries.len() + 1);
        for entry in &self.entries {
            for file in entry.files.iter().flatten() {
                file.close();
            }
        }
        debug!(capacity = config.capacity, slots = config.slots(), "rebuilt chunk cache");
    }

    pub fn cache_config(&self) -> CacheConfig {
        self.cache.config()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn raw_position(turn: Color, sides: ByColor<RawSide<'_>>, ep_square: Option<u8>) -> Option<Position> {
    let mut pieces: ArrayVec<(Piece, Square), MAX_NON_KINGS> = ArrayVec::new();
    for color in Color::ALL {
        let side = sides.get(color);
        if side.counts.iter().map(|&c| usize::from(c)).sum::<usize>() != side.squares.len() {
            return None;
        }
        let mut squares = side.squares.iter();
        for (role, &count) in Role::ALL.into_iter().zip(side.counts.iter()) {
            for _ in 0..count {
                let sq = Square::try_new(*squares.next()?)?;
                pieces.try_push((role.of(color), sq)).ok()?;
            }
        }
    }
    let kings = ByColor {
        white: Square::try_new(sides.white.king)?,
        black: Square::try_new(sides.black.king)?,
    };
    let ep_square = match ep_square {
        Some(sq) => Some(Square::try_new(sq)?),
        None => None,
    };
    Position::new(turn, kings, &pieces, ep_square).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_sync() {
        fn assert_send<T: Send>(_: &T) {}
        fn assert_sync<T: Sync>(_: &T) {}

        let tablebase = Tablebase::new();
        assert_send(&tablebase);
        assert_sync(&tablebase);
    }

    #[test]
    fn test_table_ids() {
        let tablebase = Tablebase::new();
        let kpk: Composition = "kpk".parse().expect("composition");
        assert_eq!(tablebase.table_id(&kpk), Some(1));
        assert_eq!(tablebase.composition(1), Some(kpk));
        assert_eq!(tablebase.composition(0), None);
        assert_eq!(tablebase.composition(146), None);
        assert_eq!(tablebase.table_id(&"kkp".parse().expect("composition")), None);
        assert_eq!(tablebase.table_size(1, Color::White), Some(81664));
        assert_eq!(tablebase.table_size(1, Color::Black), Some(84012));
    }

    #[test]
    fn test_builder_normalizes_chunk_size() {
        let tablebase = Tablebase::builder().chunk_size(7).buckets(0).build();
        assert_eq!(tablebase.cache_config().chunk_size, 8);
        assert_eq!(tablebase.cache_config().buckets, 1);
        assert_eq!(Tablebase::builder().chunk_size(0).build().cache_config().chunk_size, 2);
    }

    #[test]
    fn test_raw_position() {
        let sides = ByColor {
            white: RawSide {
                king: 4,
                counts: [1, 0, 0, 1, 0],
                squares: &[12, 0],
            },
            black: RawSide {
                king: 60,
                counts: [0; 5],
                squares: &[],
            },
        };
        let pos = raw_position(Color::White, sides, None).expect("valid");
        assert_eq!(pos.to_string(), "4k3/8/8/8/8/8/4P3/R3K3 w - -");

        let short = ByColor {
            white: RawSide {
                squares: &[12],
                ..sides.white
            },
            ..sides
        };
        assert!(raw_position(Color::White, short, None).is_none());

        let off_board = ByColor {
            white: RawSide {
                king: 64,
                ..sides.white
            },
            ..sides
        };
        assert!(raw_position(Color::White, off_board, None).is_none());
    }

    #[test]
    fn test_set_cache_capacity() {
        let mut tablebase = Tablebase::new();
        tablebase.set_cache_capacity(0);
        assert_eq!(tablebase.cache_stats().bytes_allocated, 0);
        tablebase.set_cache_capacity(1 << 20);
        assert_eq!(tablebase.cache_config().capacity, 1 << 20);
        assert!(tablebase.cache_stats().bytes_allocated > 0);
        tablebase.clear_cache();
        assert_eq!(tablebase.cache_stats().hits, 0);
    }
}
