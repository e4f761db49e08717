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

//! Precomputed placement tables.
//!
//! A [`LegalityTable`] says where a piece may stand given the square of the
//! king of the side not to move. [`KingPairs`] enumerates the canonical
//! placements of both kings. Both are built once by [`Enumerator::new()`] and
//! shared read-only by all index calculators.

use std::{fmt, sync::Arc};

use crate::{
    attacks,
    bitboard::Bitboard,
    color::Color,
    role::{Piece, Role},
    square::Square,
};

/// Number of canonical king pairs with pawns on the board.
pub const PAWNFUL_KING_PAIRS: usize = 1806;

/// Number of canonical king pairs without pawns.
pub const PAWNLESS_KING_PAIRS: usize = 462;

/// Legal squares for one kind of piece, for every square of the king of the
/// side not to move.
pub struct LegalityTable {
    piece: Piece,
    restricted: bool,
    masks: [Bitboard; 64],
}

impl LegalityTable {
    /// Builds the table for `piece`.
    ///
    /// All squares except the king's are legal, except that pawns never
    /// stand on the first or eighth rank. If `restricted` (the piece belongs
    /// to the side to move), squares from which the piece would capture the
    /// king are illegal too.
    pub fn build(piece: Piece, restricted: bool) -> LegalityTable {
        let base = match piece.role {
            Role::Pawn => Bitboard::PAWN_SQUARES,
            _ => Bitboard::FULL,
        };

        let mut masks = [Bitboard::EMPTY; 64];
        for king in (0..64).map(Square::new) {
            let mut mask = base.without(king);
            if restricted {
                mask &= !attacks::contact_squares(piece, king);
            }
            masks[usize::from(king)] = mask;
        }

        LegalityTable {
            piece,
            restricted,
            masks,
        }
    }

    pub fn piece(&self) -> Piece {
        self.piece
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Legal squares with the king on `king`.
    #[inline]
    pub fn mask(&self, king: Square) -> Bitboard {
        self.masks[usize::from(king)]
    }
}

impl fmt::Debug for LegalityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegalityTable")
            .field("piece", &self.piece)
            .field("restricted", &self.restricted)
            .finish_non_exhaustive()
    }
}

/// Canonical placements of the two kings.
///
/// The anchor is the king of the side to move. Pairs are ordered by anchor
/// square, then by the square of the other king.
pub struct KingPairs {
    has_pawns: bool,
    pairs: Vec<(Square, Square)>,
    index: Box<[[u16; 64]; 64]>,
}

impl KingPairs {
    const NONE: u16 = u16::MAX;

    pub fn build(has_pawns: bool) -> KingPairs {
        let mut pairs = Vec::new();
        let mut index = Box::new([[KingPairs::NONE; 64]; 64]);

        for anchor in (0..64).map(Square::new) {
            if anchor.file() > 3 || (!has_pawns && anchor.rank() > anchor.file()) {
                continue;
            }
            for other in (0..64).map(Square::new) {
                if anchor.distance(other) <= 1 {
                    continue;
                }
                if !has_pawns && anchor.is_on_diagonal() && other.is_above_diagonal() {
                    continue;
                }
                // Bounded by 1806.
                index[usize::from(anchor)][usize::from(other)] = pairs.len() as u16;
                pairs.push((anchor, other));
            }
        }

        KingPairs {
            has_pawns,
            pairs,
            index,
        }
    }

    pub fn has_pawns(&self) -> bool {
        self.has_pawns
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Position of a canonical pair in the enumeration.
    #[inline]
    pub fn index(&self, anchor: Square, other: Square) -> Option<usize> {
        match self.index[usize::from(anchor)][usize::from(other)] {
            KingPairs::NONE => None,
            i => Some(usize::from(i)),
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<(Square, Square)> {
        self.pairs.get(i).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Square, Square)> + '_ {
        self.pairs.iter().copied()
    }
}

impl fmt::Debug for KingPairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KingPairs")
            .field("has_pawns", &self.has_pawns)
            .field("len", &self.pairs.len())
            .finish()
    }
}

/// Running totals of `count(pair)` over the king pair enumeration.
///
/// Entry `i` is the number of positions sorted before pair `i`. There is one
/// extra trailing entry holding the grand total.
pub fn cumulative<F>(pairs: &KingPairs, mut count: F) -> Vec<u64>
where
    F: FnMut(Square, Square) -> u64,
{
    let mut result = Vec::with_capacity(pairs.len() + 1);
    let mut total = 0;
    for (anchor, other) in pairs.iter() {
        result.push(total);
        total += count(anchor, other);
    }
    result.push(total);
    result
}

/// Owner of all shared enumeration tables.
#[derive(Debug, Clone)]
pub struct Enumerator {
    legality: Arc<[LegalityTable]>,
    pawnful: Arc<KingPairs>,
    pawnless: Arc<KingPairs>,
}

impl Default for Enumerator {
    fn default() -> Enumerator {
        Enumerator::new()
    }
}

impl Enumerator {
    pub fn new() -> Enumerator {
        let mut legality = Vec::with_capacity(20);
        for color in Color::ALL {
            for role in Role::ALL {
                for restricted in [false, true] {
                    legality.push(LegalityTable::build(role.of(color), restricted));
                }
            }
        }

        Enumerator {
            legality: legality.into(),
            pawnful: Arc::new(KingPairs::build(true)),
            pawnless: Arc::new(KingPairs::build(false)),
        }
    }

    /// Legality table for `piece`, restricted if it belongs to the side to
    /// move.
    pub fn legality(&self, piece: Piece, restricted: bool) -> &LegalityTable {
        let i = (piece.color.index() * Role::ALL.len() + piece.role as usize) * 2
            + usize::from(restricted);
        &self.legality[i]
    }

    pub fn king_pairs(&self, has_pawns: bool) -> &Arc<KingPairs> {
        if has_pawns {
            &self.pawnful
        } else {
            &self.pawnless
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_king_pair_counts() {
        assert_eq!(KingPairs::build(true).len(), PAWNFUL_KING_PAIRS);
        assert_eq!(KingPairs::build(false).len(), PAWNLESS_KING_PAIRS);
    }

    #[test]
    fn test_king_pair_order() {
        let pairs = KingPairs::build(false);
        assert_eq!(pairs.get(0), Some((Square::A1, Square::C1)));
        assert_eq!(pairs.index(Square::A1, Square::C1), Some(0));
        assert_eq!(pairs.index(Square::A1, Square::B2), None);
        assert_eq!(pairs.index(Square::E1, Square::A8), None);
        assert_eq!(pairs.index(Square::B2, Square::A8), None);
        let mut previous = None;
        for pair in pairs.iter() {
            assert!(previous < Some(pair));
            previous = Some(pair);
        }
    }

    #[test]
    fn test_legality_table() {
        let table = LegalityTable::build(Role::Pawn.of(Color::White), false);
        assert_eq!(table.mask(Square::E8).count(), 48);
        assert_eq!(table.mask(Square::E4).count(), 47);
        assert_eq!(table.mask(Square::E4).first(), Some(Square::A2));
        assert!(!table.mask(Square::E4).contains(Square::E4));
        assert!(!table.mask(Square::E4).contains(Square::A1));

        let table = LegalityTable::build(Role::Pawn.of(Color::White), true);
        assert_eq!(table.mask(Square::E8).count(), 46);
        assert!(!table.mask(Square::E8).contains(Square::D7));

        let table = LegalityTable::build(Role::Knight.of(Color::Black), true);
        assert_eq!(table.mask(Square::A1).count(), 61);
        assert!(!table.mask(Square::A1).contains(Square::B3));
        assert!(table.mask(Square::A1).contains(Square::B2));
    }

    #[test]
    fn test_cumulative() {
        let pairs = KingPairs::build(true);
        let cum = cumulative(&pairs, |_, _| 2);
        assert_eq!(cum.len(), PAWNFUL_KING_PAIRS + 1);
        assert_eq!(cum[0], 0);
        assert_eq!(cum[1], 2);
        assert_eq!(cum[PAWNFUL_KING_PAIRS], 2 * PAWNFUL_KING_PAIRS as u64);
    }

    #[test]
    fn test_enumerator_lookup() {
        let enumerator = Enumerator::new();
        for color in Color::ALL {
            for role in Role::ALL {
                for restricted in [false, true] {
                    let table = enumerator.legality(role.of(color), restricted);
                    assert_eq!(table.piece(), role.of(color));
                    assert_eq!(table.is_restricted(), restricted);
                }
            }
        }
    }
}
