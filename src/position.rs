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

use std::{error::Error, fmt, fmt::Write as _, str::FromStr};

use arrayvec::ArrayVec;

use crate::{
    attacks,
    bitboard::Bitboard,
    color::{ByColor, Color},
    composition::{Composition, MAX_NON_KINGS},
    role::{Piece, Role},
    square::Square,
    symmetry::Mask,
};

/// Reasons for a [`Position`] to be rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PositionError {
    /// More than [`MAX_NON_KINGS`] pieces besides the kings.
    TooManyPieces,
    /// Two pieces on the same square.
    Overlap {
        #[allow(missing_docs)]
        square: Square,
    },
    /// Kings on the same or neighbouring squares.
    AdjacentKings,
    /// Pawns on the first or eighth rank.
    PawnsOnBackrank,
    /// The en passant square does not follow a double pawn push.
    InvalidEpSquare,
    /// The side to move can capture the opposing king with a piece standing
    /// next to it (or a knight jump away).
    OppositeCheck,
    /// Malformed FEN.
    InvalidFen,
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::TooManyPieces => write!(f, "more than {MAX_NON_KINGS} pieces besides the kings"),
            PositionError::Overlap { square } => write!(f, "more than one piece on {square}"),
            PositionError::AdjacentKings => f.write_str("kings are adjacent"),
            PositionError::PawnsOnBackrank => f.write_str("pawns on backrank"),
            PositionError::InvalidEpSquare => f.write_str("invalid en passant square"),
            PositionError::OppositeCheck => f.write_str("opponent in contact check"),
            PositionError::InvalidFen => f.write_str("invalid fen"),
        }
    }
}

impl Error for PositionError {}

/// A position with at most [`MAX_NON_KINGS`] pieces besides the kings.
///
/// Only positions that can appear in a table are accepted: kings apart,
/// pieces on distinct squares, no pawns on the backranks, and no piece of
/// the side to move touching the opposing king.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Position {
    turn: Color,
    kings: ByColor<Square>,
    pieces: ArrayVec<(Piece, Square), MAX_NON_KINGS>,
    ep_square: Option<Square>,
}

impl Position {
    /// Validates and constructs a position.
    ///
    /// # Errors
    ///
    /// See [`PositionError`].
    pub fn new(
        turn: Color,
        kings: ByColor<Square>,
        pieces: &[(Piece, Square)],
        ep_square: Option<Square>,
    ) -> Result<Position, PositionError> {
        let pieces = ArrayVec::try_from(pieces).map_err(|_| PositionError::TooManyPieces)?;
        Position {
            turn,
            kings,
            pieces,
            ep_square,
        }
        .ensure_valid()
    }

    fn ensure_valid(mut self) -> Result<Position, PositionError> {
        self.pieces.sort_unstable_by_key(|&(_, sq)| sq);

        let mut occupied = Bitboard::EMPTY;
        for sq in self.kings.iter().copied().chain(self.pieces.iter().map(|&(_, sq)| sq)) {
            if occupied.contains(sq) {
                return Err(PositionError::Overlap { square: sq });
            }
            occupied.add(sq);
        }

        if self.kings.white.distance(self.kings.black) <= 1 {
            return Err(PositionError::AdjacentKings);
        }

        if self
            .pieces
            .iter()
            .any(|&(piece, sq)| piece.role == Role::Pawn && !Bitboard::PAWN_SQUARES.contains(sq))
        {
            return Err(PositionError::PawnsOnBackrank);
        }

        if let Some(ep_square) = self.ep_square {
            if ep_square.rank() != self.turn.fold(5, 2) {
                return Err(PositionError::InvalidEpSquare);
            }

            // The last move must have been a double pawn push. Check for the
            // presence of that pawn, and that it passed over empty squares.
            let forward = self.turn.fold(8, -8);
            let pushed = ep_square.offset(-forward);
            let origin = ep_square.offset(forward);
            let (Some(pushed), Some(origin)) = (pushed, origin) else {
                return Err(PositionError::InvalidEpSquare);
            };
            if !self.has_piece(Role::Pawn.of(!self.turn), pushed)
                || occupied.contains(ep_square)
                || occupied.contains(origin)
            {
                return Err(PositionError::InvalidEpSquare);
            }
        }

        let their_king = self.king(!self.turn);
        if self.pieces.iter().any(|&(piece, sq)| {
            piece.color == self.turn && attacks::contact_squares(piece, their_king).contains(sq)
        }) {
            return Err(PositionError::OppositeCheck);
        }

        Ok(self)
    }

    #[inline]
    pub fn turn(&self) -> Color {
        self.turn
    }

    #[inline]
    pub fn king(&self, color: Color) -> Square {
        *self.kings.get(color)
    }

    #[inline]
    pub fn kings(&self) -> ByColor<Square> {
        self.kings
    }

    /// Pieces besides the kings, ordered by square.
    #[inline]
    pub fn pieces(&self) -> &[(Piece, Square)] {
        &self.pieces
    }

    #[inline]
    pub fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    /// Squares occupied by `piece`.
    pub fn squares(&self, piece: Piece) -> impl Iterator<Item = Square> + '_ {
        self.pieces
            .iter()
            .filter(move |&&(p, _)| p == piece)
            .map(|&(_, sq)| sq)
    }

    fn has_piece(&self, piece: Piece, sq: Square) -> bool {
        self.squares(piece).any(|s| s == sq)
    }

    pub fn occupied(&self) -> Bitboard {
        self.kings
            .iter()
            .copied()
            .chain(self.pieces.iter().map(|&(_, sq)| sq))
            .collect()
    }

    pub fn composition(&self) -> Composition {
        let mut composition = Composition::default();
        for &(piece, _) in &self.pieces {
            *composition.get_mut(piece.color, piece.role) += 1;
        }
        composition
    }

    /// Applies a board reflection to every square. Reflections preserve
    /// legality as long as ranks are only mirrored for pawnless positions.
    #[must_use]
    pub fn transformed(&self, mask: Mask) -> Position {
        let mut pieces: ArrayVec<_, MAX_NON_KINGS> = self
            .pieces
            .iter()
            .map(|&(piece, sq)| (piece, mask.apply(sq)))
            .collect();
        pieces.sort_unstable_by_key(|&(_, sq)| sq);
        Position {
            turn: self.turn,
            kings: self.kings.map(|sq| mask.apply(sq)),
            pieces,
            ep_square: self.ep_square.map(|sq| mask.apply(sq)),
        }
    }

    /// Swaps the colors of all pieces and the side to move, keeping the
    /// squares. The result is only meaningful after also mirroring ranks.
    #[must_use]
    pub(crate) fn color_swapped(&self) -> Position {
        Position {
            turn: !self.turn,
            kings: self.kings.into_swapped(),
            pieces: self
                .pieces
                .iter()
                .map(|&(piece, sq)| (piece.role.of(!piece.color), sq))
                .collect(),
            ep_square: self.ep_square,
        }
    }

    /// The same position seen from the other side: colors swapped, ranks
    /// mirrored, and the other side to move.
    #[must_use]
    pub fn inverted(&self) -> Position {
        self.color_swapped().transformed(Mask::FLIP_RANK)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Position").field(&self.to_string()).finish()
    }
}

/// Formats the position as FEN, without castling rights and move counters.
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let sq = Square::from_coords(file, rank);
                let ch = if sq == self.kings.white {
                    Some('K')
                } else if sq == self.kings.black {
                    Some('k')
                } else {
                    self.pieces
                        .iter()
                        .find(|&&(_, s)| s == sq)
                        .map(|&(piece, _)| piece.char())
                };
                match ch {
                    Some(ch) => {
                        if empty > 0 {
                            write!(f, "{empty}")?;
                            empty = 0;
                        }
                        f.write_char(ch)?;
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                write!(f, "{empty}")?;
            }
            if rank > 0 {
                f.write_char('/')?;
            }
        }
        write!(f, " {} - ", self.turn.char())?;
        match self.ep_square {
            Some(sq) => write!(f, "{sq}"),
            None => f.write_char('-'),
        }
    }
}

impl FromStr for Position {
    type Err = PositionError;

    /// Parses the board, turn and en passant fields of a FEN. Castling
    /// rights and move counters are ignored.
    fn from_str(fen: &str) -> Result<Position, PositionError> {
        let mut fields = fen.split_ascii_whitespace();
        let board = fields.next().ok_or(PositionError::InvalidFen)?;
        let turn = match fields.next() {
            Some(turn) => {
                let mut chars = turn.chars();
                match (chars.next().and_then(Color::from_char), chars.next()) {
                    (Some(color), None) => color,
                    _ => return Err(PositionError::InvalidFen),
                }
            }
            None => Color::White,
        };
        let _castling = fields.next();
        let ep_square = match fields.next() {
            None | Some("-") => None,
            Some(sq) => Some(sq.parse().map_err(|_| PositionError::InvalidFen)?),
        };

        let mut kings = ByColor::<Option<Square>>::default();
        let mut pieces = ArrayVec::<(Piece, Square), MAX_NON_KINGS>::new();
        let mut rows = 0;
        for (i, row) in board.split('/').enumerate() {
            if i >= 8 {
                return Err(PositionError::InvalidFen);
            }
            rows += 1;
            let rank = 7 - i as u8;
            let mut file = 0;
            for ch in row.chars() {
                if let Some(skip) = ch.to_digit(10) {
                    file += skip as u8;
                    continue;
                }
                if file >= 8 {
                    return Err(PositionError::InvalidFen);
                }
                let sq = Square::from_coords(file, rank);
                let color = Color::from_white(ch.is_ascii_uppercase());
                if ch.eq_ignore_ascii_case(&'k') {
                    if kings.get_mut(color).replace(sq).is_some() {
                        return Err(PositionError::InvalidFen);
                    }
                } else {
                    let role = Role::from_char(ch).ok_or(PositionError::InvalidFen)?;
                    pieces
                        .try_push((role.of(color), sq))
                        .map_err(|_| PositionError::TooManyPieces)?;
                }
                file += 1;
            }
            if file != 8 {
                return Err(PositionError::InvalidFen);
            }
        }
        if rows != 8 {
            return Err(PositionError::InvalidFen);
        }

        let (Some(white), Some(black)) = (kings.white, kings.black) else {
            return Err(PositionError::InvalidFen);
        };
        Position::new(turn, ByColor { white, black }, &pieces, ep_square)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kings(white: Square, black: Square) -> ByColor<Square> {
        ByColor { white, black }
    }

    #[test]
    fn test_validation() {
        let rook = Role::Rook.of(Color::White);
        assert!(Position::new(Color::White, kings(Square::E1, Square::E8), &[(rook, Square::A1)], None).is_ok());
        assert_eq!(
            Position::new(Color::White, kings(Square::E1, Square::E2), &[], None),
            Err(PositionError::AdjacentKings)
        );
        assert_eq!(
            Position::new(Color::White, kings(Square::E1, Square::E8), &[(rook, Square::E1)], None),
            Err(PositionError::Overlap { square: Square::E1 })
        );
        assert_eq!(
            Position::new(Color::White, kings(Square::E1, Square::E8), &[(rook, Square::E7)], None),
            Err(PositionError::OppositeCheck)
        );
        // The same rook next to the king is fine if black is to move.
        assert!(Position::new(Color::Black, kings(Square::E1, Square::E8), &[(rook, Square::E7)], None).is_ok());
        assert_eq!(
            Position::new(
                Color::White,
                kings(Square::E1, Square::E8),
                &[(Role::Pawn.of(Color::Black), Square::A1)],
                None
            ),
            Err(PositionError::PawnsOnBackrank)
        );
        assert_eq!(
            Position::new(Color::White, kings(Square::E1, Square::E8), &[(rook, Square::A1); 4], None),
            Err(PositionError::TooManyPieces)
        );
    }

    #[test]
    fn test_ep_validation() {
        let pos: Result<Position, _> = "4k3/8/8/3pP3/8/8/8/4K3 w - d6".parse();
        assert!(pos.is_ok());
        let pos: Result<Position, _> = "4k3/8/8/3pP3/8/8/8/4K3 w - e6".parse();
        assert_eq!(pos, Err(PositionError::InvalidEpSquare));
        let pos: Result<Position, _> = "4k3/8/8/3pP3/8/8/8/4K3 b - d6".parse();
        assert_eq!(pos, Err(PositionError::InvalidEpSquare));
        let pos: Result<Position, _> = "4k3/3n4/8/3pP3/8/8/8/4K3 w - d6".parse();
        assert_eq!(pos, Err(PositionError::InvalidEpSquare));
    }

    #[test]
    fn test_fen_round_trip() {
        for fen in [
            "4k3/8/8/8/8/8/8/R3K3 w - -",
            "8/8/8/8/3pP3/8/8/k1K5 b - e3",
            "8/1q6/8/8/8/8/2N5/k1K5 b - -",
        ] {
            let pos: Position = fen.parse().expect("valid fen");
            assert_eq!(pos.to_string(), fen);
        }
        assert_eq!("8/8/8/8/8/8/8/8 w - -".parse::<Position>(), Err(PositionError::InvalidFen));
        assert_eq!("4k3/8/8/8/8/8/8/4K3 x - -".parse::<Position>(), Err(PositionError::InvalidFen));
    }

    #[test]
    fn test_inverted() {
        let pos: Position = "4k3/8/8/8/8/8/1P6/4K3 w - -".parse().expect("valid fen");
        let inverted = pos.inverted();
        assert_eq!(inverted.to_string(), "4k3/1p6/8/8/8/8/8/4K3 b - -");
        assert_eq!(inverted.inverted(), pos);
        assert_eq!(inverted.composition().to_string(), "kkp");
    }
}
