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

//! Dense indexes of positions within a composition.
//!
//! Positions are ordered by canonical king pair first. Within a king pair
//! the non-king pieces are split into groups of identical pieces (white
//! before black, queens before rooks before bishops before knights before
//! pawns), and the placement of all groups is ranked lexicographically.
//! Every group has its own set of legal squares, so the number of ways to
//! complete a partial placement is counted over the Venn atoms of the
//! remaining groups' masks.
//!
//! Positions with a capturable en passant pawn follow in a separate range
//! after all ordinary positions.
//!
//! Without pawns, a position with both kings on the a1-h8 diagonal has two
//! canonical frames, and only the smaller of its two indexes is used. The
//! last king pair of the enumeration is such a pair, so the ordinary range
//! ends after the last placement of that pair which is used.

use std::{cmp::Ordering, fmt, ops::Range, sync::Arc};

use arrayvec::ArrayVec;

use crate::{
    attacks,
    bitboard::Bitboard,
    color::{ByColor, Color},
    composition::{Composition, MAX_NON_KINGS},
    enumerate::{cumulative, Enumerator, KingPairs},
    position::Position,
    role::{Piece, Role},
    square::Square,
    symmetry::{canonical_masks, Mask},
};

/// Index returned by [`IndexCalculator::index_unchecked()`] for positions
/// outside the enumeration.
pub const INF: u64 = u64::MAX;

/// Number of en passant configurations per king pair: 7 pairs of adjacent
/// files, times 2 for the side the capturing pawn stands on.
pub const EP_CONFIGS: usize = 14;

const MAX_ATOMS: usize = 1 << MAX_NON_KINGS;

type Squares = ArrayVec<Square, MAX_NON_KINGS>;

type Placement = ArrayVec<Squares, MAX_NON_KINGS>;

const fn binomial(mut n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    if k > n - k {
        return binomial(n, n - k);
    }
    let mut r = 1;
    let mut d = 1;
    while d <= k {
        r = r * n / d;
        n -= 1;
        d += 1;
    }
    r
}

/// A group of identical pieces.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Slot {
    pub piece: Piece,
    pub count: u8,
}

/// A slot resolved for a specific king pair.
#[derive(Copy, Clone)]
struct Group {
    mask: Bitboard,
    count: u8,
}

type Groups = ArrayVec<Group, MAX_NON_KINGS>;

/// Squares of `within` that are inside exactly the groups whose bit is set
/// in `sig`.
fn atom(groups: &[Group], sig: usize, within: Bitboard) -> Bitboard {
    groups
        .iter()
        .enumerate()
        .fold(within, |bb, (i, group)| {
            if sig >> i & 1 != 0 {
                bb & group.mask
            } else {
                bb & !group.mask
            }
        })
}

fn atom_counts(groups: &[Group], occupied: Bitboard) -> [u64; MAX_ATOMS] {
    let mut atoms = [0; MAX_ATOMS];
    for (sig, atom_count) in atoms.iter_mut().enumerate().take(1 << groups.len()).skip(1) {
        *atom_count = u64::from(atom(groups, sig, !occupied).count());
    }
    atoms
}

/// Calls `f` with every way to take `total` items from bins with the given
/// capacities.
fn for_each_split<F>(total: u8, caps: &[u64], f: &mut F)
where
    F: FnMut(&[u8]),
{
    fn recurse<F>(left: u8, caps: &[u64], take: &mut ArrayVec<u8, MAX_ATOMS>, f: &mut F)
    where
        F: FnMut(&[u8]),
    {
        match caps.split_first() {
            None => {
                if left == 0 {
                    f(take.as_slice());
                }
            }
            Some((&cap, rest)) => {
                let max = u64::from(left).min(cap) as u8;
                for t in 0..=max {
                    take.push(t);
                    recurse(left - t, rest, take, f);
                    take.pop();
                }
            }
        }
    }

    recurse(total, caps, &mut ArrayVec::new(), f);
}

/// Number of ways to place groups of `counts` pieces, given the number of
/// free squares in each Venn atom of their masks.
fn count_atoms(counts: &[u8], atoms: &[u64; MAX_ATOMS]) -> u64 {
    let Some((&first, rest)) = counts.split_first() else {
        return 1;
    };

    // Atoms inside the first mask have odd signatures. Bin i is atom 2i+1.
    let k = counts.len();
    let bins = 1 << (k - 1);
    let mut caps = [0; MAX_ATOMS / 2];
    for (i, cap) in caps[..bins].iter_mut().enumerate() {
        *cap = atoms[2 * i + 1];
    }

    let mut total = 0;
    for_each_split(first, &caps[..bins], &mut |take: &[u8]| {
        let weight: u64 = caps[..bins]
            .iter()
            .zip(take)
            .map(|(&cap, &t)| binomial(cap, u64::from(t)))
            .product();
        if weight == 0 {
            return;
        }
        // Drop the first group from every signature.
        let mut remaining = [0; MAX_ATOMS];
        for sig in 2..1 << k {
            let taken = if sig & 1 != 0 {
                u64::from(take[sig >> 1])
            } else {
                0
            };
            remaining[sig >> 1] += atoms[sig] - taken;
        }
        total += weight * count_atoms(rest, &remaining);
    });
    total
}

fn count_placements(groups: &[Group], occupied: Bitboard) -> u64 {
    let counts: ArrayVec<u8, MAX_NON_KINGS> = groups.iter().map(|g| g.count).collect();
    count_atoms(&counts, &atom_counts(groups, occupied))
}

/// Number of placements where the current group puts `j` pieces on
/// `prefix`, and all `later` groups are completed arbitrarily.
fn block_sum(prefix: Bitboard, j: u8, occupied: Bitboard, later: &[Group]) -> u64 {
    let free = prefix & !occupied;
    if later.is_empty() {
        return binomial(u64::from(free.count()), u64::from(j));
    }

    let n = 1 << later.len();
    let mut caps = [0; MAX_ATOMS];
    for (sig, cap) in caps[..n].iter_mut().enumerate() {
        *cap = u64::from(atom(later, sig, free).count());
    }
    let atoms = atom_counts(later, occupied);
    let counts: ArrayVec<u8, MAX_NON_KINGS> = later.iter().map(|g| g.count).collect();

    let mut total = 0;
    for_each_split(j, &caps[..n], &mut |take: &[u8]| {
        let weight: u64 = caps[..n]
            .iter()
            .zip(take)
            .map(|(&cap, &t)| binomial(cap, u64::from(t)))
            .product();
        if weight == 0 {
            return;
        }
        let mut remaining = [0; MAX_ATOMS];
        for sig in 1..n {
            remaining[sig] = atoms[sig] - u64::from(take[sig]);
        }
        total += weight * count_atoms(&counts, &remaining);
    });
    total
}

/// Lexicographic rank of a placement. Squares of each group must be sorted
/// in ascending order.
///
/// The placement may cover only the first few groups. The result is then
/// the rank of its first completion.
fn rank_groups(groups: &[Group], placement: &[Squares], mut occupied: Bitboard) -> Option<u64> {
    let mut index = 0;
    for (g, (group, squares)) in groups.iter().zip(placement).enumerate() {
        let available = group.mask & !occupied;
        if squares.iter().any(|&sq| !available.contains(sq)) {
            return None;
        }
        let later = &groups[g + 1..];
        let mut chosen = Bitboard::EMPTY;
        for (j, &sq) in squares.iter().enumerate().rev() {
            index += block_sum(
                available & Bitboard::below(sq),
                j as u8 + 1,
                occupied | chosen,
                later,
            );
            chosen.add(sq);
        }
        occupied |= chosen;
    }
    Some(index)
}

fn unrank_groups(groups: &[Group], mut index: u64, mut occupied: Bitboard) -> Option<Placement> {
    let mut placement = Placement::new();
    for (g, group) in groups.iter().enumerate() {
        let available = group.mask & !occupied;
        let later = &groups[g + 1..];
        let mut chosen = Bitboard::EMPTY;
        let mut limit = Bitboard::FULL;
        for j in (1..=group.count).rev() {
            // Largest square whose block of smaller placements still fits.
            let mut best = None;
            for sq in available & limit {
                let sum = block_sum(available & Bitboard::below(sq), j, occupied | chosen, later);
                if sum > index {
                    break;
                }
                best = Some((sq, sum));
            }
            let (sq, sum) = best?;
            index -= sum;
            chosen.add(sq);
            limit = Bitboard::below(sq);
        }
        occupied |= chosen;
        placement.push(chosen.into_iter().collect());
    }
    (index == 0).then_some(placement)
}

/// Compares two sets of squares of one group in ranking order. Both must be
/// sorted in ascending order.
fn cmp_colex(a: &[Square], b: &[Square]) -> Ordering {
    a.iter().rev().cmp(b.iter().rev())
}

fn mirrored(squares: &[Square]) -> Squares {
    let mut mirrored: Squares = squares.iter().map(|&sq| Mask::FLIP_DIAGONAL.apply(sq)).collect();
    mirrored.sort_unstable();
    mirrored
}

/// Squares involved in an en passant configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EpConfig {
    /// Pawn of the side to move that can capture.
    pub capturer: Square,
    /// Pawn that just made a double push.
    pub captured: Square,
    /// The en passant square.
    pub passed: Square,
    /// Where the captured pawn started.
    pub origin: Square,
    /// If the capturer is on the higher file, the square on the other side
    /// of the captured pawn must not hold a second capturer.
    pub beside: Option<Square>,
}

impl EpConfig {
    /// Decodes configuration number `config` (`0..EP_CONFIGS`):
    /// `2 * lower_file + 1` if the capturer is on the lower of the two
    /// files, `2 * lower_file` otherwise.
    pub fn new(turn: Color, config: usize) -> EpConfig {
        let lower_file = (config / 2) as u8;
        let from_lower_file = config % 2 == 1;
        let (capturer_file, captured_file) = if from_lower_file {
            (lower_file, lower_file + 1)
        } else {
            (lower_file + 1, lower_file)
        };
        let rank = turn.fold(4, 3);
        EpConfig {
            capturer: Square::from_coords(capturer_file, rank),
            captured: Square::from_coords(captured_file, rank),
            passed: Square::from_coords(captured_file, turn.fold(5, 2)),
            origin: Square::from_coords(captured_file, turn.fold(6, 1)),
            beside: (!from_lower_file && captured_file > 0)
                .then(|| Square::from_coords(captured_file - 1, rank)),
        }
    }

    pub fn occupied(&self) -> Bitboard {
        Bitboard::from_square(self.capturer)
            .with(self.captured)
            .with(self.passed)
            .with(self.origin)
    }
}

#[derive(Clone)]
struct EnPassant {
    slots: ArrayVec<Slot, MAX_NON_KINGS>,
    counts: Vec<[u64; EP_CONFIGS]>,
    cumulative: Vec<u64>,
}

/// Maps positions of one composition and side to move to dense indexes.
///
/// # Examples
///
/// ```
/// use egtb::{Color, Composition, Enumerator, IndexCalculator, Position};
///
/// let enumerator = Enumerator::new();
/// let krk: Composition = "krk".parse()?;
/// let calc = IndexCalculator::new(krk, Color::White, &enumerator);
///
/// let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse()?;
/// let index = calc.index(&pos).expect("indexable");
/// assert!(index < calc.size());
/// assert_eq!(calc.index(&pos.transformed(egtb::symmetry::Mask::FLIP_FILE)), Some(index));
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct IndexCalculator {
    composition: Composition,
    turn: Color,
    slots: ArrayVec<Slot, MAX_NON_KINGS>,
    enumerator: Enumerator,
    /// Resolved groups for every king pair.
    pair_groups: Vec<Groups>,
    cumulative: Vec<u64>,
    ordinary: u64,
    ep: Option<EnPassant>,
}

impl IndexCalculator {
    /// Builds the offset tables for `composition` with `turn` to move.
    pub fn new(composition: Composition, turn: Color, enumerator: &Enumerator) -> IndexCalculator {
        let mut slots = ArrayVec::new();
        for color in Color::ALL {
            for (role, count) in composition.by_color.get(color).by_role.descending() {
                if count > 0 {
                    slots.push(Slot {
                        piece: role.of(color),
                        count,
                    });
                }
            }
        }

        let mut calc = IndexCalculator {
            composition,
            turn,
            slots,
            enumerator: enumerator.clone(),
            pair_groups: Vec::new(),
            cumulative: Vec::new(),
            ordinary: 0,
            ep: None,
        };

        let pairs = Arc::clone(calc.king_pairs());
        calc.pair_groups = pairs
            .iter()
            .map(|(anchor, other)| calc.groups(&calc.slots, anchor, other, None))
            .collect();
        let offsets = {
            let mut i = 0;
            cumulative(&pairs, |_, _| {
                let count = count_placements(&calc.pair_groups[i], Bitboard::EMPTY);
                i += 1;
                count
            })
        };
        calc.cumulative = offsets;
        calc.ordinary = calc.used_len();

        if composition.has_pawns_on_both_sides() {
            let rest: ArrayVec<Slot, MAX_NON_KINGS> = calc
                .slots
                .iter()
                .map(|&slot| Slot {
                    count: slot.count - u8::from(slot.piece.role == Role::Pawn),
                    ..slot
                })
                .filter(|slot| slot.count > 0)
                .collect();
            let counts: Vec<[u64; EP_CONFIGS]> = pairs
                .iter()
                .map(|(anchor, other)| calc.ep_counts(&rest, anchor, other))
                .collect();
            let ep_cumulative = {
                let mut i = 0;
                cumulative(&pairs, |_, _| {
                    let total = counts[i].iter().sum();
                    i += 1;
                    total
                })
            };
            calc.ep = Some(EnPassant {
                slots: rest,
                counts,
                cumulative: ep_cumulative,
            });
        }

        calc
    }

    #[inline]
    pub fn composition(&self) -> Composition {
        self.composition
    }

    #[inline]
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Groups of identical pieces in ranking order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    fn king_pairs(&self) -> &Arc<KingPairs> {
        self.enumerator.king_pairs(self.composition.has_pawns())
    }

    /// Number of positions without an en passant capture.
    pub fn ordinary_len(&self) -> u64 {
        self.ordinary
    }

    /// End of the ordinary range, leaving out trailing placements of the
    /// last king pair that rank higher than their diagonal mirror image.
    fn used_len(&self) -> u64 {
        let total = self.cumulative.last().copied().unwrap_or(0);
        let Some(last) = self.pair_groups.len().checked_sub(1) else {
            return total;
        };
        let Some((anchor, other)) = self.king_pairs().get(last) else {
            return total;
        };
        if self.composition.has_pawns() || !anchor.is_on_diagonal() || !other.is_on_diagonal() {
            return total;
        }

        // Groups are symmetric for this pair. Walk down from the end,
        // skipping every block that shares a prefix ranked above its
        // mirror image, until reaching a placement that is used.
        let groups = &self.pair_groups[last];
        let start = self.cumulative[last];
        let mut end = total;
        while end > start {
            let Some(placement) = unrank_groups(groups, end - 1 - start, Bitboard::EMPTY) else {
                break;
            };
            let Some((g, ordering)) = placement
                .iter()
                .enumerate()
                .map(|(g, squares)| (g, cmp_colex(squares, &mirrored(squares))))
                .find(|&(_, ordering)| ordering != Ordering::Equal)
            else {
                break;
            };
            if ordering == Ordering::Less {
                break;
            }
            match rank_groups(groups, &placement[..=g], Bitboard::EMPTY) {
                Some(prefix) => end = start + prefix,
                None => break,
            }
        }
        end
    }

    /// Index range of positions with an en passant capture. Empty unless
    /// both sides have pawns.
    pub fn ep_range(&self) -> Range<u64> {
        let ordinary = self.ordinary_len();
        let ep = self
            .ep
            .as_ref()
            .and_then(|ep| ep.cumulative.last().copied())
            .unwrap_or(0);
        ordinary..ordinary + ep
    }

    /// Number of entries in the table.
    pub fn size(&self) -> u64 {
        self.ep_range().end
    }

    fn groups(&self, slots: &[Slot], anchor: Square, other: Square, beside: Option<Square>) -> Groups {
        slots
            .iter()
            .map(|slot| {
                let restricted = slot.piece.color == self.turn;
                let mut mask = self
                    .enumerator
                    .legality(slot.piece, restricted)
                    .mask(other)
                    .without(anchor);
                if let Some(beside) = beside {
                    if restricted && slot.piece.role == Role::Pawn {
                        mask = mask.without(beside);
                    }
                }
                Group {
                    mask,
                    count: slot.count,
                }
            })
            .collect()
    }

    fn ep_counts(&self, rest: &[Slot], anchor: Square, other: Square) -> [u64; EP_CONFIGS] {
        let mut counts = [0; EP_CONFIGS];
        let contact = attacks::contact_squares(Role::Pawn.of(self.turn), other);
        for (config, count) in counts.iter_mut().enumerate() {
            let ep = EpConfig::new(self.turn, config);
            let occupied = ep.occupied();
            if occupied.contains(anchor) || occupied.contains(other) || contact.contains(ep.capturer) {
                continue;
            }
            *count = count_placements(&self.groups(rest, anchor, other, ep.beside), occupied);
        }
        counts
    }

    /// Computes the index of `pos`, or `None` if the position is not of this
    /// composition and side to move, or otherwise outside the enumeration.
    pub fn index(&self, pos: &Position) -> Option<u64> {
        self.index_view(pos, false)
    }

    /// Like [`IndexCalculator::index()`], but for a position of the mirrored
    /// composition with the other side to move. The position is seen from
    /// the other side before indexing.
    pub fn index_inverted(&self, pos: &Position) -> Option<u64> {
        self.index_view(&pos.color_swapped(), true)
    }

    /// Hot path variant of [`IndexCalculator::index()`] returning [`INF`]
    /// instead of `None`.
    #[inline]
    pub fn index_unchecked(&self, pos: &Position) -> u64 {
        self.index(pos).unwrap_or(INF)
    }

    fn index_view(&self, view: &Position, invert: bool) -> Option<u64> {
        if view.turn() != self.turn || view.composition() != self.composition {
            return None;
        }

        let anchor = view.king(self.turn);
        let other = view.king(!self.turn);
        let mut best: Option<u64> = None;
        for mask in canonical_masks(anchor, other, self.composition.has_pawns(), invert) {
            let index = self.index_frame(view, mask)?;
            best = Some(best.map_or(index, |best| best.min(index)));
        }
        best
    }

    fn index_frame(&self, view: &Position, mask: Mask) -> Option<u64> {
        let anchor = mask.apply(view.king(self.turn));
        let other = mask.apply(view.king(!self.turn));
        let pair = self.king_pairs().index(anchor, other)?;

        if let (Some(ep_square), Some(ep)) = (view.ep_square(), &self.ep) {
            if let Some(index) = self.index_ep(view, mask, pair, mask.apply(ep_square), ep) {
                return Some(index);
            }
        }

        let placement = placement(view, mask, &self.slots, Bitboard::EMPTY)?;
        Some(self.cumulative[pair] + rank_groups(&self.pair_groups[pair], &placement, Bitboard::EMPTY)?)
    }

    /// Index in the en passant range, or `None` if the en passant square is
    /// irrelevant (no pawn can capture).
    fn index_ep(
        &self,
        view: &Position,
        mask: Mask,
        pair: usize,
        ep_square: Square,
        ep: &EnPassant,
    ) -> Option<u64> {
        let captured = ep_square.offset(self.turn.fold(-8, 8))?;
        let capturer = view
            .squares(Role::Pawn.of(self.turn))
            .map(|sq| mask.apply(sq))
            .filter(|sq| sq.rank() == captured.rank() && sq.file().abs_diff(captured.file()) == 1)
            .min()?;

        let from_lower_file = capturer.file() < captured.file();
        let config = 2 * usize::from(capturer.file().min(captured.file())) + usize::from(from_lower_file);
        let counts = &ep.counts[pair];
        if counts[config] == 0 {
            return None;
        }

        let squares = EpConfig::new(self.turn, config);
        debug_assert_eq!((squares.capturer, squares.captured), (capturer, captured));

        let skip = Bitboard::from_square(capturer).with(captured);
        let placement = placement(view, mask, &ep.slots, skip)?;
        let anchor = mask.apply(view.king(self.turn));
        let other = mask.apply(view.king(!self.turn));
        let groups = self.groups(&ep.slots, anchor, other, squares.beside);

        let offset = self.ordinary_len() + ep.cumulative[pair] + counts[..config].iter().sum::<u64>();
        Some(offset + rank_groups(&groups, &placement, squares.occupied())?)
    }

    /// Reconstructs the canonical position with the given index.
    pub fn unindex(&self, index: u64) -> Option<Position> {
        let pairs = self.king_pairs();
        let ordinary = self.ordinary_len();

        let (anchor, other, pieces, ep_square) = if index < ordinary {
            let pair = self.cumulative.partition_point(|&c| c <= index) - 1;
            let (anchor, other) = pairs.get(pair)?;
            let placement = unrank_groups(self.pair_groups.get(pair)?, index - self.cumulative[pair], Bitboard::EMPTY)?;
            (anchor, other, pieces(&self.slots, &placement), None)
        } else {
            let ep = self.ep.as_ref()?;
            let mut rest = index - ordinary;
            if rest >= *ep.cumulative.last()? {
                return None;
            }
            let pair = ep.cumulative.partition_point(|&c| c <= rest) - 1;
            rest -= ep.cumulative[pair];

            let mut config = None;
            for (i, &count) in ep.counts[pair].iter().enumerate() {
                if rest < count {
                    config = Some(i);
                    break;
                }
                rest -= count;
            }
            let squares = EpConfig::new(self.turn, config?);

            let (anchor, other) = pairs.get(pair)?;
            let groups = self.groups(&ep.slots, anchor, other, squares.beside);
            let placement = unrank_groups(&groups, rest, squares.occupied())?;
            let mut pieces = pieces(&ep.slots, &placement);
            pieces.push((Role::Pawn.of(self.turn), squares.capturer));
            pieces.push((Role::Pawn.of(!self.turn), squares.captured));
            (anchor, other, pieces, Some(squares.passed))
        };

        let kings = ByColor::new_with(|color| if color == self.turn { anchor } else { other });
        Position::new(self.turn, kings, &pieces, ep_square).ok()
    }
}

impl fmt::Debug for IndexCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCalculator")
            .field("composition", &self.composition)
            .field("turn", &self.turn)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

/// Sorted squares of each slot after applying `mask`, leaving out `skip`.
fn placement(view: &Position, mask: Mask, slots: &[Slot], skip: Bitboard) -> Option<Placement> {
    slots
        .iter()
        .map(|slot| {
            let mut squares: Squares = view
                .squares(slot.piece)
                .map(|sq| mask.apply(sq))
                .filter(|&sq| !skip.contains(sq))
                .collect();
            squares.sort_unstable();
            (squares.len() == usize::from(slot.count)).then_some(squares)
        })
        .collect()
}

fn pieces(slots: &[Slot], placement: &[Squares]) -> ArrayVec<(Piece, Square), MAX_NON_KINGS> {
    slots
        .iter()
        .zip(placement)
        .flat_map(|(slot, squares)| squares.iter().map(move |&sq| (slot.piece, sq)))
        .collect()
}
