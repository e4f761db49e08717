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

//! Board symmetries used to reduce positions to a canonical representative.
//!
//! Positions with pawns have a single non-trivial symmetry (mirroring the
//! files). Pawnless positions have eight: any combination of mirroring files,
//! mirroring ranks and mirroring at the a1-h8 diagonal. The canonical frame
//! is chosen by the king of the side to move, which ends up on files a-d, or
//! for pawnless positions in the a1-d1-d4 triangle.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::square::Square;

bitflags! {
    /// A composite reflection of the board.
    ///
    /// The component reflections are applied in a fixed order: files first,
    /// then ranks, then the diagonal.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct Mask: u8 {
        /// Mirror files (a to h).
        const FLIP_FILE = 1;
        /// Mirror ranks (1 to 8).
        const FLIP_RANK = 2;
        /// Mirror at the a1-h8 diagonal.
        const FLIP_DIAGONAL = 4;
    }
}

impl Mask {
    /// Applies the reflection to a square.
    #[inline]
    pub const fn apply(self, mut sq: Square) -> Square {
        if self.contains(Mask::FLIP_FILE) {
            sq = reflect_file(sq);
        }
        if self.contains(Mask::FLIP_RANK) {
            sq = reflect_rank(sq);
        }
        if self.contains(Mask::FLIP_DIAGONAL) {
            sq = reflect_diagonal(sq);
        }
        sq
    }

    /// All symmetries that preserve the kind of material: 2 with pawns,
    /// 8 without.
    pub fn symmetries(has_pawns: bool) -> impl Iterator<Item = Mask> {
        let n = if has_pawns { 2 } else { 8 };
        (0..n).map(Mask::from_bits_truncate)
    }
}

#[inline]
pub const fn reflect_file(sq: Square) -> Square {
    sq.flip_horizontal()
}

#[inline]
pub const fn reflect_rank(sq: Square) -> Square {
    sq.flip_vertical()
}

#[inline]
pub const fn reflect_diagonal(sq: Square) -> Square {
    sq.flip_diagonal()
}

/// Chooses the reflection that moves `king` into the canonical region.
///
/// With `invert`, the board is additionally seen from the other side: ranks
/// are mirrored first (the caller also swaps the colors of all pieces).
///
/// For pawnless material the result may still leave the other king above
/// the diagonal if `king` ends up on it. Use [`canonical_masks()`] to
/// resolve that.
///
/// # Examples
///
/// ```
/// use egtb::{symmetry::{canonical_mask, Mask}, Square};
///
/// assert_eq!(canonical_mask(Square::E1, true, false), Mask::FLIP_FILE);
/// assert_eq!(canonical_mask(Square::B1, true, true), Mask::FLIP_RANK);
///
/// let mask = canonical_mask(Square::G7, false, false);
/// assert_eq!(mask.apply(Square::G7), Square::B2);
/// ```
pub const fn canonical_mask(king: Square, has_pawns: bool, invert: bool) -> Mask {
    let mut mask = if invert {
        Mask::FLIP_RANK
    } else {
        Mask::empty()
    };

    let sq = mask.apply(king);
    if sq.file() > 3 {
        mask = mask.union(Mask::FLIP_FILE);
    }
    if has_pawns {
        return mask;
    }

    if sq.rank() > 3 {
        mask = mask.symmetric_difference(Mask::FLIP_RANK);
    }
    if mask.apply(king).is_above_diagonal() {
        mask = mask.union(Mask::FLIP_DIAGONAL);
    }
    mask
}

/// All reflections that produce a canonical frame for the king pair.
///
/// Usually there is exactly one. If both kings of a pawnless position end up
/// on the diagonal, mirroring at the diagonal keeps both in place, so there
/// are two candidate frames and the caller has to pick one consistently.
pub fn canonical_masks(
    king: Square,
    other: Square,
    has_pawns: bool,
    invert: bool,
) -> ArrayVec<Mask, 2> {
    let mask = canonical_mask(king, has_pawns, invert);
    let mut masks = ArrayVec::new();
    if has_pawns || !mask.apply(king).is_on_diagonal() {
        masks.push(mask);
        return masks;
    }

    let other = mask.apply(other);
    if other.is_above_diagonal() {
        masks.push(mask | Mask::FLIP_DIAGONAL);
    } else {
        masks.push(mask);
        if other.is_on_diagonal() {
            masks.push(mask | Mask::FLIP_DIAGONAL);
        }
    }
    masks
}
