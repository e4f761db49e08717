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

//! Index positions and probe distance-to-mate endgame tablebases with up
//! to three pieces besides the kings.
//!
//! Every table holds one signed byte (or, in wide tables, one 16 bit score)
//! per position of a piece composition with a given side to move. Positions
//! are mapped to dense indexes by an [`IndexCalculator`], which folds
//! symmetric positions onto each other and skips positions that can not
//! occur. Table chunks are read through a [`BlockCache`] shared by all
//! probing threads.
//!
//! # Example
//!
//! ```no_run
//! use egtb::{Outcome, Position, Tablebase};
//!
//! let mut tablebase = Tablebase::new();
//! let max_pieces = tablebase.initialize_tables(["/srv/egtb"])?;
//! assert!(max_pieces <= 5);
//!
//! let pos: Position = "8/8/8/8/8/2k5/8/KR6 w - -".parse()?;
//! match tablebase.probe(&pos) {
//!     Outcome::Win { moves } => println!("mate in {moves}"),
//!     outcome => println!("{outcome}"),
//! }
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! Indexing alone does not need any files:
//!
//! ```
//! use egtb::{Color, Enumerator, IndexCalculator, Position};
//!
//! let enumerator = Enumerator::new();
//! let krk = IndexCalculator::new("krk".parse()?, Color::White, &enumerator);
//!
//! let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse()?;
//! let index = krk.index(&pos).expect("indexable");
//! assert!(index < krk.size());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! # Feature flags
//!
//! * `mmap`: Enables [`Tablebase::map_table()`] to memory map
//!   uncompressed tables.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_debug_implementations)]
#![cfg_attr(docs_rs, feature(doc_auto_cfg))]

#[macro_use]
mod errors;

pub mod attacks;
mod bitboard;
mod cache;
mod color;
mod composition;
mod decode;
mod enumerate;
pub mod filesystem;
mod index;
mod outcome;
mod position;
mod registry;
mod role;
mod square;
pub mod symmetry;
mod table;
mod tablebase;

pub use crate::{
    bitboard::Bitboard,
    cache::{BlockCache, CacheConfig, CacheStats, ChunkKey, DECODE_HEADROOM},
    color::{ByColor, Color},
    composition::{Composition, CompositionSide, ParseCompositionError, COUNT_VECTOR_LEN, MAX_NON_KINGS},
    decode::{write_emd, BlockDecoder, EmdDecoder},
    enumerate::{Enumerator, KingPairs, LegalityTable, PAWNFUL_KING_PAIRS, PAWNLESS_KING_PAIRS},
    errors::{InitError, InitResult, ProbeError, ProbeResult},
    index::{EpConfig, IndexCalculator, Slot, EP_CONFIGS, INF},
    outcome::{Outcome, BROKEN_BYTE, MAX_BYTE_MOVES},
    position::{Position, PositionError},
    registry::{CompositionRegistry, TableId, MAX_COUNT},
    role::{ByRole, Piece, Role},
    square::{ParseSquareError, Square},
    table::{extension, table_file_names, COMPRESSED_EXTENSION},
    tablebase::{RawSide, Tablebase, TablebaseBuilder},
};
