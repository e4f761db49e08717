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

use std::fmt;

/// Stored byte for positions that are illegal or whose table is unavailable.
pub const BROKEN_BYTE: i8 = 127;

/// Largest mate distance that fits the byte encoding.
pub const MAX_BYTE_MOVES: u16 = 126;

/// Score of a win or loss in the 16 bit scale is offset from this.
const MATE_SCORE: i16 = i16::MAX;

/// Value of a position from the point of view of the side to move.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Outcome {
    Draw,
    /// The side to move mates in `moves`.
    Win {
        #[allow(missing_docs)]
        moves: u16,
    },
    /// The side to move is mated in `moves`. Zero means checkmated.
    Loss {
        #[allow(missing_docs)]
        moves: u16,
    },
    /// Illegal position, or no information available.
    Broken,
}

impl Outcome {
    /// Decodes a stored byte: `0` draw, `1..=126` mate in n, `127` broken,
    /// `-1` checkmated and `-(n + 1)` mated in n.
    pub const fn from_byte(v: i8) -> Outcome {
        match v {
            0 => Outcome::Draw,
            BROKEN_BYTE => Outcome::Broken,
            1.. => Outcome::Win { moves: v as u16 },
            _ => Outcome::Loss {
                moves: (-(v as i16) - 1) as u16,
            },
        }
    }

    /// Encodes as a stored byte, or `None` if the distance is too long.
    pub const fn to_byte(self) -> Option<i8> {
        Some(match self {
            Outcome::Draw => 0,
            Outcome::Broken => BROKEN_BYTE,
            Outcome::Win { moves } if 1 <= moves && moves <= MAX_BYTE_MOVES => moves as i8,
            Outcome::Loss { moves } if moves <= MAX_BYTE_MOVES + 1 => -(moves as i16) as i8 - 1,
            _ => return None,
        })
    }

    /// Value on the 16 bit scale: wins count down from `32767`, losses count
    /// up from `-32767` (checkmated). Broken outcomes map to `i16::MAX`,
    /// which no win can reach.
    pub const fn score16(self) -> i16 {
        match self {
            Outcome::Draw => 0,
            Outcome::Broken => i16::MAX,
            Outcome::Win { moves } => MATE_SCORE - moves as i16,
            Outcome::Loss { moves } => -MATE_SCORE + moves as i16,
        }
    }

    /// Decodes an entry of a wide table.
    pub const fn from_score16(score: i16) -> Outcome {
        match score {
            0 => Outcome::Draw,
            i16::MAX | i16::MIN => Outcome::Broken,
            1.. => Outcome::Win {
                moves: (MATE_SCORE - score) as u16,
            },
            _ => Outcome::Loss {
                moves: (score + MATE_SCORE) as u16,
            },
        }
    }

    pub const fn is_broken(self) -> bool {
        matches!(self, Outcome::Broken)
    }

    /// Mate distance for decisive outcomes.
    pub const fn moves(self) -> Option<u16> {
        match self {
            Outcome::Win { moves } | Outcome::Loss { moves } => Some(moves),
            Outcome::Draw | Outcome::Broken => None,
        }
    }
}

impl From<i8> for Outcome {
    fn from(v: i8) -> Outcome {
        Outcome::from_byte(v)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Outcome::Draw => f.write_str("draw"),
            Outcome::Win { moves } => write!(f, "mate in {moves}"),
            Outcome::Loss { moves: 0 } => f.write_str("checkmated"),
            Outcome::Loss { moves } => write!(f, "mated in {moves}"),
            Outcome::Broken => f.write_str("broken"),
        }
    }
}
