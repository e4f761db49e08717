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

use std::{error::Error, fmt, str::FromStr};

/// A square index `0..64`, with a1 = 0, b1 = 1, ..., h8 = 63.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Square(u8);

impl Square {
    /// Gets the square with the given index.
    ///
    /// # Panics
    ///
    /// Panics if the index is not in the range `0..=63`.
    #[inline]
    #[track_caller]
    pub const fn new(index: u8) -> Square {
        assert!(index < 64);
        Square(index)
    }

    #[inline]
    pub const fn try_new(index: u8) -> Option<Square> {
        if index < 64 {
            Some(Square(index))
        } else {
            None
        }
    }

    /// Square from file and rank, both `0..8`.
    #[inline]
    #[track_caller]
    pub const fn from_coords(file: u8, rank: u8) -> Square {
        assert!(file < 8 && rank < 8);
        Square(file | (rank << 3))
    }

    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn file(self) -> u8 {
        self.0 & 7
    }

    #[inline]
    pub const fn rank(self) -> u8 {
        self.0 >> 3
    }

    /// Mirrors the square at the vertical axis between the d and e files
    /// (a1 to h1).
    ///
    /// # Examples
    ///
    /// ```
    /// use egtb::Square;
    ///
    /// assert_eq!(Square::B1.flip_horizontal(), Square::G1);
    /// ```
    #[inline]
    #[must_use]
    pub const fn flip_horizontal(self) -> Square {
        Square(self.0 ^ 0x07)
    }

    /// Mirrors the square at the horizontal axis between the fourth and
    /// fifth rank (a1 to a8).
    #[inline]
    #[must_use]
    pub const fn flip_vertical(self) -> Square {
        Square(self.0 ^ 0x38)
    }

    /// Mirrors the square at the a1-h8 diagonal.
    ///
    /// # Examples
    ///
    /// ```
    /// use egtb::Square;
    ///
    /// assert_eq!(Square::A3.flip_diagonal(), Square::C1);
    /// assert_eq!(Square::D4.flip_diagonal(), Square::D4);
    /// ```
    #[inline]
    #[must_use]
    pub const fn flip_diagonal(self) -> Square {
        Square(((self.0 & 7) << 3) | (self.0 >> 3))
    }

    /// Tests if the square is on the a1-h8 diagonal.
    #[inline]
    pub const fn is_on_diagonal(self) -> bool {
        self.file() == self.rank()
    }

    /// Tests if the square is strictly above the a1-h8 diagonal.
    #[inline]
    pub const fn is_above_diagonal(self) -> bool {
        self.rank() > self.file()
    }

    /// Offsets the square by `delta`, if the result is still on the board.
    #[inline]
    pub const fn offset(self, delta: i32) -> Option<Square> {
        let index = self.0 as i32 + delta;
        if 0 <= index && index < 64 {
            Some(Square(index as u8))
        } else {
            None
        }
    }

    /// Chebyshev (king move) distance.
    pub const fn distance(self, other: Square) -> u8 {
        let df = self.file().abs_diff(other.file());
        let dr = self.rank().abs_diff(other.rank());
        if df > dr {
            df
        } else {
            dr
        }
    }
}

macro_rules! square_consts {
    ($($name:ident = $index:expr,)*) => {
        #[allow(missing_docs)]
        impl Square {
            $(pub const $name: Square = Square($index);)*
        }
    }
}

#[rustfmt::skip]
square_consts! {
    A1 = 0, B1 = 1, C1 = 2, D1 = 3, E1 = 4, F1 = 5, G1 = 6, H1 = 7,
    A2 = 8, B2 = 9, C2 = 10, D2 = 11, E2 = 12, F2 = 13, G2 = 14, H2 = 15,
    A3 = 16, B3 = 17, C3 = 18, D3 = 19, E3 = 20, F3 = 21, G3 = 22, H3 = 23,
    A4 = 24, B4 = 25, C4 = 26, D4 = 27, E4 = 28, F4 = 29, G4 = 30, H4 = 31,
    A5 = 32, B5 = 33, C5 = 34, D5 = 35, E5 = 36, F5 = 37, G5 = 38, H5 = 39,
    A6 = 40, B6 = 41, C6 = 42, D6 = 43, E6 = 44, F6 = 45, G6 = 46, H6 = 47,
    A7 = 48, B7 = 49, C7 = 50, D7 = 51, E7 = 52, F7 = 53, G7 = 54, H7 = 55,
    A8 = 56, B8 = 57, C8 = 58, D8 = 59, E8 = 60, F8 = 61, G8 = 62, H8 = 63,
}

impl From<Square> for u8 {
    #[inline]
    fn from(sq: Square) -> u8 {
        sq.0
    }
}

impl From<Square> for usize {
    #[inline]
    fn from(sq: Square) -> usize {
        usize::from(sq.0)
    }
}

impl TryFrom<u8> for Square {
    type Error = ParseSquareError;

    fn try_from(index: u8) -> Result<Square, ParseSquareError> {
        Square::try_new(index).ok_or(ParseSquareError)
    }
}

/// Error when parsing an invalid square name.
#[derive(Clone, Debug)]
pub struct ParseSquareError;

impl fmt::Display for ParseSquareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid square name")
    }
}

impl Error for ParseSquareError {}

impl FromStr for Square {
    type Err = ParseSquareError;

    fn from_str(s: &str) -> Result<Square, ParseSquareError> {
        match *s.as_bytes() {
            [file @ b'a'..=b'h', rank @ b'1'..=b'8'] => {
                Ok(Square::from_coords(file - b'a', rank - b'1'))
            }
            _ => Err(ParseSquareError),
        }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            char::from(b'a' + self.file()),
            char::from(b'1' + self.rank())
        )
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string().to_uppercase())
    }
}
