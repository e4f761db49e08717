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

use std::{cmp::Ordering, error::Error, fmt, str::FromStr};

use crate::{
    color::{ByColor, Color},
    role::{ByRole, Role},
};

/// Maximum number of non-king pieces on the board.
pub const MAX_NON_KINGS: usize = 3;

/// Length of a count vector: one count per non-king role and side.
pub const COUNT_VECTOR_LEN: usize = 10;

/// Non-king material of one side.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct CompositionSide {
    pub by_role: ByRole<u8>,
}

impl CompositionSide {
    pub fn count(&self) -> usize {
        self.by_role.into_iter().map(usize::from).sum()
    }

    pub fn has_pawns(&self) -> bool {
        self.by_role.pawn > 0
    }

    fn from_str_part(s: &str) -> Result<CompositionSide, ParseCompositionError> {
        let mut side = CompositionSide::default();
        for ch in s.chars() {
            let role = Role::from_char(ch).ok_or(ParseCompositionError)?;
            *side.by_role.get_mut(role) += 1;
        }
        Ok(side)
    }
}

impl Ord for CompositionSide {
    fn cmp(&self, other: &CompositionSide) -> Ordering {
        self.count()
            .cmp(&other.count())
            .then_with(|| self.by_role.queen.cmp(&other.by_role.queen))
            .then_with(|| self.by_role.rook.cmp(&other.by_role.rook))
            .then_with(|| self.by_role.bishop.cmp(&other.by_role.bishop))
            .then_with(|| self.by_role.knight.cmp(&other.by_role.knight))
            .then_with(|| self.by_role.pawn.cmp(&other.by_role.pawn))
    }
}

impl PartialOrd for CompositionSide {
    fn partial_cmp(&self, other: &CompositionSide) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CompositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("k")?;
        for (role, count) in self.by_role.descending() {
            for _ in 0..count {
                write!(f, "{}", role.char())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CompositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// A piece composition like `kqkr`: the non-king pieces of both sides.
///
/// # Examples
///
/// ```
/// use egtb::Composition;
///
/// let composition: Composition = "krpkp".parse()?;
/// assert_eq!(composition.count(), 3);
/// assert!(composition.has_pawns());
/// assert_eq!(composition.to_string(), "krpkp");
/// # Ok::<_, egtb::ParseCompositionError>(())
/// ```
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct Composition {
    pub by_color: ByColor<CompositionSide>,
}

impl Composition {
    /// Number of non-king pieces.
    pub fn count(&self) -> usize {
        self.by_color.iter().map(|side| side.count()).sum()
    }

    pub fn has_pawns(&self) -> bool {
        self.by_color.iter().any(|side| side.has_pawns())
    }

    /// Both sides have pawns, so that en passant captures are possible.
    pub fn has_pawns_on_both_sides(&self) -> bool {
        self.by_color.iter().all(|side| side.has_pawns())
    }

    pub fn is_symmetric(&self) -> bool {
        self.by_color.is_symmetric()
    }

    /// Swaps the material of the two sides.
    #[must_use]
    pub fn into_swapped(self) -> Composition {
        Composition {
            by_color: self.by_color.into_swapped(),
        }
    }

    /// Swaps the sides if necessary, so that white has the stronger side.
    #[must_use]
    pub fn into_normalized(self) -> Composition {
        if self.by_color.white < self.by_color.black {
            self.into_swapped()
        } else {
            self
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.by_color.white >= self.by_color.black
    }

    pub fn get(&self, color: Color, role: Role) -> u8 {
        *self.by_color.get(color).by_role.get(role)
    }

    pub fn get_mut(&mut self, color: Color, role: Role) -> &mut u8 {
        self.by_color.get_mut(color).by_role.get_mut(role)
    }

    /// Count vector ordered white pawn, knight, bishop, rook, queen, then
    /// the same for black.
    pub fn count_vector(&self) -> [u8; COUNT_VECTOR_LEN] {
        let mut counts = [0; COUNT_VECTOR_LEN];
        for (i, count) in self
            .by_color
            .into_iter()
            .flat_map(|side| side.by_role)
            .enumerate()
        {
            counts[i] = count;
        }
        counts
    }

    pub fn from_count_vector(counts: [u8; COUNT_VECTOR_LEN]) -> Composition {
        let mut composition = Composition::default();
        for (i, color) in Color::ALL.into_iter().enumerate() {
            for (j, role) in Role::ALL.into_iter().enumerate() {
                *composition.get_mut(color, role) = counts[i * Role::ALL.len() + j];
            }
        }
        composition
    }

    /// All normalized compositions with `1..=max_non_kings` pieces besides
    /// the kings, in ascending order of strength.
    pub fn all(max_non_kings: usize) -> Vec<Composition> {
        let mut result = Vec::new();
        let mut current = Vec::new();
        for total in 1..=max_non_kings {
            collect_multisets(total, 0, &mut current, &mut result);
        }
        result.sort_by(|a, b| {
            a.count()
                .cmp(&b.count())
                .then_with(|| a.by_color.white.cmp(&b.by_color.white))
                .then_with(|| a.by_color.black.cmp(&b.by_color.black))
        });
        result
    }
}

/// Distributes `left` pieces over the ten (color, role) slots starting at
/// slot `from`, keeping only normalized results.
fn collect_multisets(left: usize, from: usize, current: &mut Vec<usize>, out: &mut Vec<Composition>) {
    if left == 0 {
        let mut counts = [0; COUNT_VECTOR_LEN];
        for &slot in current.iter() {
            counts[slot] += 1;
        }
        let composition = Composition::from_count_vector(counts);
        if composition.is_normalized() {
            out.push(composition);
        }
        return;
    }
    for slot in from..COUNT_VECTOR_LEN {
        current.push(slot);
        collect_multisets(left - 1, slot, current, out);
        current.pop();
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.by_color.white, self.by_color.black)
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// Error when parsing an invalid composition name.
#[derive(Clone, Debug)]
pub struct ParseCompositionError;

impl fmt::Display for ParseCompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid composition name")
    }
}

impl Error for ParseCompositionError {}

impl FromStr for Composition {
    type Err = ParseCompositionError;

    fn from_str(s: &str) -> Result<Composition, ParseCompositionError> {
        let s = s.to_ascii_lowercase();
        let rest = s.strip_prefix('k').ok_or(ParseCompositionError)?;
        let (white, black) = rest.split_once('k').ok_or(ParseCompositionError)?;
        Ok(Composition {
            by_color: ByColor {
                white: CompositionSide::from_str_part(white)?,
                black: CompositionSide::from_str_part(black)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let composition: Composition = "KRPKN".parse().expect("valid");
        assert_eq!(composition.get(Color::White, Role::Rook), 1);
        assert_eq!(composition.get(Color::White, Role::Pawn), 1);
        assert_eq!(composition.get(Color::Black, Role::Knight), 1);
        assert_eq!(composition.to_string(), "krpkn");

        assert_eq!("kpkq".parse::<Composition>().expect("valid").to_string(), "kpkq");
        assert!("krk".parse::<Composition>().is_ok());
        assert!("kk".parse::<Composition>().is_ok());
        assert!("rkk".parse::<Composition>().is_err());
        assert!("kxk".parse::<Composition>().is_err());
        assert!("kr".parse::<Composition>().is_err());
    }

    #[test]
    fn test_normalize() {
        let composition: Composition = "kpkq".parse().expect("valid");
        assert!(!composition.is_normalized());
        assert_eq!(composition.into_normalized().to_string(), "kqkp");

        let composition: Composition = "knkb".parse().expect("valid");
        assert_eq!(composition.into_normalized().to_string(), "kbkn");

        let composition: Composition = "knnkr".parse().expect("valid");
        assert_eq!(composition.into_normalized().to_string(), "knnkr");
    }

    #[test]
    fn test_count_vector() {
        let composition: Composition = "kqkrp".parse().expect("valid");
        let counts = composition.count_vector();
        assert_eq!(counts, [0, 0, 0, 0, 1, 1, 0, 0, 1, 0]);
        assert_eq!(Composition::from_count_vector(counts), composition);
    }

    #[test]
    fn test_all() {
        let all = Composition::all(MAX_NON_KINGS);
        assert_eq!(all.len(), 145);
        assert_eq!(Composition::all(1).len(), 5);
        assert_eq!(Composition::all(2).len(), 5 + 30);
        assert_eq!(all[0].to_string(), "kpk");
        assert_eq!(all[4].to_string(), "kqk");
        assert!(all.iter().all(|c| c.is_normalized()));
        assert!(all.iter().any(|c| c.to_string() == "kbkb"));
        assert!(!all.iter().any(|c| c.to_string() == "kqqkq"));
    }
}
