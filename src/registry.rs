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

//! Lookup of table ids by count vector.

use std::num::NonZeroI32;

use crate::composition::{Composition, COUNT_VECTOR_LEN, MAX_NON_KINGS};

/// Largest count per dimension the tree can hold.
pub const MAX_COUNT: u8 = MAX_NON_KINGS as u8;

/// Signed table id. Negative ids refer to the table of the mirrored
/// composition, to be probed with colors swapped.
pub type TableId = NonZeroI32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Link {
    Empty,
    Node(u32),
    Leaf(TableId),
}

#[derive(Clone, Debug)]
struct Node {
    max: u8,
    children: [Link; MAX_COUNT as usize + 1],
}

impl Node {
    const fn new() -> Node {
        Node {
            max: 0,
            children: [Link::Empty; MAX_COUNT as usize + 1],
        }
    }
}

/// A tree with one level per entry of the count vector.
///
/// Each node records the largest count registered below it, so lookups of
/// material that was never registered stop at the first count that is too
/// large.
///
/// # Examples
///
/// ```
/// use egtb::{Composition, CompositionRegistry};
///
/// let mut registry = CompositionRegistry::new();
/// let kqkr: Composition = "kqkr".parse()?;
/// assert!(registry.register(kqkr, 3));
///
/// assert_eq!(registry.lookup(&kqkr.count_vector()), 3);
/// assert_eq!(registry.lookup(&kqkr.into_swapped().count_vector()), -3);
/// assert_eq!(registry.lookup(&"kqkq".parse::<Composition>()?.count_vector()), 0);
/// # Ok::<_, egtb::ParseCompositionError>(())
/// ```
#[derive(Clone, Debug)]
pub struct CompositionRegistry {
    nodes: Vec<Node>,
}

impl Default for CompositionRegistry {
    fn default() -> CompositionRegistry {
        CompositionRegistry::new()
    }
}

impl CompositionRegistry {
    pub fn new() -> CompositionRegistry {
        CompositionRegistry {
            nodes: vec![Node::new()],
        }
    }

    /// Signed table id of the composition with the given counts (white
    /// pawn, knight, bishop, rook, queen, then black), or 0 if there is none.
    pub fn lookup(&self, counts: &[u8]) -> i32 {
        let mut node = &self.nodes[0];
        for (level, &count) in counts.iter().enumerate() {
            if count > node.max {
                return 0;
            }
            match node.children[usize::from(count)] {
                Link::Node(next) if level + 1 < COUNT_VECTOR_LEN => {
                    node = &self.nodes[next as usize];
                }
                Link::Leaf(id) if level + 1 == COUNT_VECTOR_LEN && counts.len() == COUNT_VECTOR_LEN => {
                    return id.get();
                }
                _ => return 0,
            }
        }
        0
    }

    /// Registers `composition` under `id`, and unless it is symmetric, the
    /// mirrored composition under `-id`.
    ///
    /// Returns `false` without registering anything if a count exceeds
    /// [`MAX_COUNT`] or `id` is zero.
    pub fn register(&mut self, composition: Composition, id: i32) -> bool {
        let Some(id) = NonZeroI32::new(id) else {
            return false;
        };
        let forward = composition.count_vector();
        if forward.iter().any(|&count| count > MAX_COUNT) {
            return false;
        }

        self.insert(&forward, id);
        if !composition.is_symmetric() {
            self.insert(&composition.into_swapped().count_vector(), -id);
        }
        true
    }

    fn insert(&mut self, counts: &[u8; COUNT_VECTOR_LEN], id: TableId) {
        let mut node = 0;
        for (level, &count) in counts.iter().enumerate() {
            let slot = usize::from(count);
            self.nodes[node].max = self.nodes[node].max.max(count);
            if level + 1 == COUNT_VECTOR_LEN {
                self.nodes[node].children[slot] = Link::Leaf(id);
                return;
            }
            node = match self.nodes[node].children[slot] {
                Link::Node(next) => next as usize,
                _ => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::new());
                    self.nodes[node].children[slot] = Link::Node(next as u32);
                    next
                }
            };
        }
    }

    /// Number of tree nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|node| node.children.iter().all(|&link| link == Link::Empty))
    }
}
