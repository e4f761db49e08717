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

//! Attack tables for contact checks, initialized at compile time.
//!
//! Only single steps are needed: a piece of the side to move may never stand
//! on a square from which it attacks the opposing king, and for the purpose
//! of enumeration the rest of the board is empty, so only adjacent squares
//! (and knight jumps) are ruled out.

use crate::{
    bitboard::Bitboard,
    color::Color,
    role::{Piece, Role},
    square::Square,
};

const KING_DELTAS: [i32; 8] = [9, 8, 7, 1, -9, -8, -7, -1];
const KNIGHT_DELTAS: [i32; 8] = [17, 15, 10, 6, -17, -15, -10, -6];
const ORTHOGONAL_DELTAS: [i32; 4] = [8, 1, -8, -1];
const DIAGONAL_DELTAS: [i32; 4] = [9, 7, -9, -7];
const WHITE_PAWN_DELTAS: [i32; 2] = [7, 9];
const BLACK_PAWN_DELTAS: [i32; 2] = [-7, -9];

const fn step_attacks(square: i32, deltas: &[i32]) -> u64 {
    let mut attack = 0;

    let mut i = 0;
    while i < deltas.len() {
        let sq = square + deltas[i];
        let file_diff = (sq & 0x7) - (square & 0x7);
        if -2 <= file_diff && file_diff <= 2 && 0 <= sq && sq < 64 {
            attack |= 1 << sq;
        }
        i += 1;
    }

    attack
}

const fn init_step_attacks(deltas: &[i32]) -> [u64; 64] {
    let mut table = [0; 64];
    let mut sq = 0;
    while sq < 64 {
        table[sq] = step_attacks(sq as i32, deltas);
        sq += 1;
    }
    table
}

static KING_ATTACKS: [u64; 64] = init_step_attacks(&KING_DELTAS);
static KNIGHT_ATTACKS: [u64; 64] = init_step_attacks(&KNIGHT_DELTAS);
static ORTHOGONAL_NEIGHBOURS: [u64; 64] = init_step_attacks(&ORTHOGONAL_DELTAS);
static DIAGONAL_NEIGHBOURS: [u64; 64] = init_step_attacks(&DIAGONAL_DELTAS);
static WHITE_PAWN_ATTACKS: [u64; 64] = init_step_attacks(&WHITE_PAWN_DELTAS);
static BLACK_PAWN_ATTACKS: [u64; 64] = init_step_attacks(&BLACK_PAWN_DELTAS);

/// Squares adjacent to `sq`.
#[inline]
pub fn king_attacks(sq: Square) -> Bitboard {
    Bitboard(KING_ATTACKS[usize::from(sq)])
}

#[inline]
pub fn knight_attacks(sq: Square) -> Bitboard {
    Bitboard(KNIGHT_ATTACKS[usize::from(sq)])
}

/// Squares attacked by a pawn of the given color standing on `sq`.
#[inline]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    Bitboard(match color {
        Color::White => WHITE_PAWN_ATTACKS[usize::from(sq)],
        Color::Black => BLACK_PAWN_ATTACKS[usize::from(sq)],
    })
}

/// Squares from which a piece of the given kind would give check to a king
/// on `king` without any line of attack needing to be open.
///
/// # Examples
///
/// ```
/// use egtb::{attacks, Color, Role, Square};
///
/// // A white pawn checks a king on e8 from d7 or f7.
/// let contact = attacks::contact_squares(Role::Pawn.of(Color::White), Square::E8);
/// assert!(contact.contains(Square::D7));
/// assert!(contact.contains(Square::F7));
/// assert_eq!(contact.count(), 2);
/// ```
pub fn contact_squares(piece: Piece, king: Square) -> Bitboard {
    let sq = usize::from(king);
    Bitboard(match piece.role {
        // Pawns of `color` attacking `king` stand where a pawn of the
        // opposite color on `king` would attack.
        Role::Pawn => return pawn_attacks(!piece.color, king),
        Role::Knight => KNIGHT_ATTACKS[sq],
        Role::Bishop => DIAGONAL_NEIGHBOURS[sq],
        Role::Rook => ORTHOGONAL_NEIGHBOURS[sq],
        Role::Queen => KING_ATTACKS[sq],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_king_attacks() {
        assert_eq!(king_attacks(Square::A1).count(), 3);
        assert_eq!(king_attacks(Square::E4).count(), 8);
        assert!(!king_attacks(Square::H4).contains(Square::A5));
    }

    #[test]
    fn test_knight_attacks() {
        assert_eq!(knight_attacks(Square::A1).count(), 2);
        assert_eq!(knight_attacks(Square::D4).count(), 8);
        assert!(!knight_attacks(Square::G1).contains(Square::A2));
    }

    #[test]
    fn test_pawn_attacks() {
        assert_eq!(
            pawn_attacks(Color::White, Square::A2).into_iter().collect::<Vec<_>>(),
            [Square::B3]
        );
        assert_eq!(
            pawn_attacks(Color::Black, Square::E5).into_iter().collect::<Vec<_>>(),
            [Square::D4, Square::F4]
        );
    }

    #[test]
    fn test_contact_squares() {
        let king = Square::E4;
        assert_eq!(contact_squares(Role::Rook.of(Color::Black), king).count(), 4);
        assert_eq!(contact_squares(Role::Bishop.of(Color::Black), king).count(), 4);
        assert_eq!(contact_squares(Role::Queen.of(Color::White), king), king_attacks(king));
        assert_eq!(
            contact_squares(Role::Pawn.of(Color::Black), king),
            Bitboard::EMPTY.with(Square::D5).with(Square::F5)
        );
    }
}
