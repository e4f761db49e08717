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

use std::array;

use crate::color::Color;

/// Non-king piece types: `Pawn`, `Knight`, `Bishop`, `Rook`, `Queen`.
///
/// Kings are implicit. Every position has exactly one per side.
#[allow(missing_docs)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Role {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
}

impl Role {
    /// Gets the piece type from its English letter.
    ///
    /// # Examples
    ///
    /// ```
    /// use egtb::Role;
    ///
    /// assert_eq!(Role::from_char('n'), Some(Role::Knight));
    /// assert_eq!(Role::from_char('Q'), Some(Role::Queen));
    ///
    /// assert_eq!(Role::from_char('k'), None);
    /// ```
    pub const fn from_char(ch: char) -> Option<Role> {
        match ch {
            'P' | 'p' => Some(Role::Pawn),
            'N' | 'n' => Some(Role::Knight),
            'B' | 'b' => Some(Role::Bishop),
            'R' | 'r' => Some(Role::Rook),
            'Q' | 'q' => Some(Role::Queen),
            _ => None,
        }
    }

    /// Gets a [`Piece`] of the given color.
    #[inline]
    pub const fn of(self, color: Color) -> Piece {
        Piece { color, role: self }
    }

    /// Gets the lowercase English letter for the piece type, as used in
    /// table names.
    pub const fn char(self) -> char {
        match self {
            Role::Pawn => 'p',
            Role::Knight => 'n',
            Role::Bishop => 'b',
            Role::Rook => 'r',
            Role::Queen => 'q',
        }
    }

    /// `Pawn`, `Knight`, `Bishop`, `Rook` and `Queen`, in this order.
    pub const ALL: [Role; 5] = [
        Role::Pawn,
        Role::Knight,
        Role::Bishop,
        Role::Rook,
        Role::Queen,
    ];

    /// Strongest first. Order of piece groups within a side and of letters
    /// in table names.
    pub const DESCENDING: [Role; 5] = [
        Role::Queen,
        Role::Rook,
        Role::Bishop,
        Role::Knight,
        Role::Pawn,
    ];
}

/// A piece with [`Color`] and [`Role`].
#[allow(missing_docs)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Piece {
    pub color: Color,
    pub role: Role,
}

impl Piece {
    pub const fn char(self) -> char {
        let ch = self.role.char();
        if self.color.is_white() {
            ch.to_ascii_uppercase()
        } else {
            ch
        }
    }
}

/// Container with values for each non-king [`Role`].
#[derive(Copy, Clone, Default, Eq, PartialEq, Debug, Hash)]
pub struct ByRole<T> {
    pub pawn: T,
    pub knight: T,
    pub bishop: T,
    pub rook: T,
    pub queen: T,
}

impl<T> ByRole<T> {
    #[inline]
    pub const fn get(&self, role: Role) -> &T {
        match role {
            Role::Pawn => &self.pawn,
            Role::Knight => &self.knight,
            Role::Bishop => &self.bishop,
            Role::Rook => &self.rook,
            Role::Queen => &self.queen,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Pawn => &mut self.pawn,
            Role::Knight => &mut self.knight,
            Role::Bishop => &mut self.bishop,
            Role::Rook => &mut self.rook,
            Role::Queen => &mut self.queen,
        }
    }

    #[inline]
    pub fn map<U, F>(self, mut f: F) -> ByRole<U>
    where
        F: FnMut(T) -> U,
    {
        ByRole {
            pawn: f(self.pawn),
            knight: f(self.knight),
            bishop: f(self.bishop),
            rook: f(self.rook),
            queen: f(self.queen),
        }
    }
}

impl<T: Copy> ByRole<T> {
    /// Values from the strongest to the weakest role.
    pub fn descending(&self) -> array::IntoIter<(Role, T), 5> {
        Role::DESCENDING.map(|role| (role, *self.get(role))).into_iter()
    }
}

impl<T> IntoIterator for ByRole<T> {
    type Item = T;
    type IntoIter = array::IntoIter<T, 5>;

    fn into_iter(self) -> Self::IntoIter {
        [self.pawn, self.knight, self.bishop, self.rook, self.queen].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order() {
        assert!(Role::Pawn < Role::Knight);
        assert!(Role::Rook < Role::Queen);
        assert_eq!(Role::ALL.map(Role::char), ['p', 'n', 'b', 'r', 'q']);
    }

    #[test]
    fn test_piece_char() {
        assert_eq!(Role::Rook.of(Color::White).char(), 'R');
        assert_eq!(Role::Pawn.of(Color::Black).char(), 'p');
    }

    #[test]
    fn test_descending() {
        let counts = ByRole {
            pawn: 1,
            knight: 0,
            bishop: 0,
            rook: 2,
            queen: 0,
        };
        let nonzero: Vec<_> = counts.descending().filter(|&(_, n)| n > 0).collect();
        assert_eq!(nonzero, [(Role::Rook, 2), (Role::Pawn, 1)]);
    }
}
