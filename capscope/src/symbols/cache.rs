//! Symbol cache: an augmented interval tree keyed by address
//!
//! Nodes live in an arena and refer to each other by index. The tree is an
//! AVL tree ordered by each interval's low bound, and every node also
//! carries `max`, the greatest high bound anywhere in its subtree. That
//! value is recomputed bottom-up after every insert and rotation, which
//! lets a point query reject the whole tree in O(1) and prune subtrees
//! on the way down.

use super::symbol::Symbol;

type NodeId = usize;

struct Node {
    /// Inclusive interval bounds
    low: u64,
    high: u64,
    /// Largest `high` in this subtree
    max: u64,
    height: u8,
    left: Option<NodeId>,
    right: Option<NodeId>,
    symbol: Symbol,
}

/// Address-range → symbol map with point lookup
#[derive(Default)]
pub struct SymbolCache {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl SymbolCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert `symbol` covering `[begin, end)`
    ///
    /// Returns false, discarding the symbol, when its range is empty or
    /// touches address zero, or when a symbol with the same start address
    /// is already cached. The first insertion for a start address wins.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        let (begin, end) = (symbol.begin(), symbol.end());
        if begin == 0 || end == 0 || end <= begin {
            return false;
        }

        if self.find_start(begin).is_some() {
            return false;
        }

        let high = end - 1;
        self.nodes.push(Node {
            low: begin,
            high,
            max: high,
            height: 1,
            left: None,
            right: None,
            symbol,
        });
        let id = self.nodes.len() - 1;
        self.root = Some(self.insert_at(self.root, id));
        true
    }

    /// Find the symbol whose range contains `address`
    #[must_use]
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        if address == 0 {
            return None;
        }

        let mut current = self.root?;
        if self.nodes[current].max < address {
            return None;
        }

        loop {
            let node = &self.nodes[current];
            if node.low <= address && address <= node.high {
                return Some(&node.symbol);
            }

            // A left subtree whose max reaches the address is the only place
            // a match can still be: everything to the right starts later.
            current = match node.left {
                Some(left) if self.nodes[left].max >= address => left,
                _ if node.low > address => return None,
                _ => match node.right {
                    Some(right) if self.nodes[right].max >= address => right,
                    _ => return None,
                },
            };
        }
    }

    /// Iterate symbols in address order
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        let mut stack = Vec::new();
        let mut current = self.root;
        std::iter::from_fn(move || {
            while let Some(id) = current {
                stack.push(id);
                current = self.nodes[id].left;
            }
            let id = stack.pop()?;
            current = self.nodes[id].right;
            Some(&self.nodes[id].symbol)
        })
    }

    fn find_start(&self, low: u64) -> Option<NodeId> {
        let mut current = self.root;
        while let Some(id) = current {
            let node = &self.nodes[id];
            current = match low.cmp(&node.low) {
                std::cmp::Ordering::Equal => return Some(id),
                std::cmp::Ordering::Less => node.left,
                std::cmp::Ordering::Greater => node.right,
            };
        }
        None
    }

    /// Link the already-allocated node `new` below `at`, returning the new subtree root
    fn insert_at(&mut self, at: Option<NodeId>, new: NodeId) -> NodeId {
        let Some(id) = at else {
            return new;
        };

        if self.nodes[new].low < self.nodes[id].low {
            let child = self.insert_at(self.nodes[id].left, new);
            self.nodes[id].left = Some(child);
        } else {
            let child = self.insert_at(self.nodes[id].right, new);
            self.nodes[id].right = Some(child);
        }

        self.rebalance(id)
    }

    fn height(&self, id: Option<NodeId>) -> i32 {
        id.map_or(0, |id| i32::from(self.nodes[id].height))
    }

    fn subtree_max(&self, id: Option<NodeId>) -> u64 {
        id.map_or(0, |id| self.nodes[id].max)
    }

    /// Recompute height and the augmented max from the children
    fn update(&mut self, id: NodeId) {
        let (left, right) = (self.nodes[id].left, self.nodes[id].right);
        let height = 1 + self.height(left).max(self.height(right));
        let max = self.nodes[id].high.max(self.subtree_max(left)).max(self.subtree_max(right));
        let node = &mut self.nodes[id];
        node.height = u8::try_from(height).unwrap_or(u8::MAX);
        node.max = max;
    }

    fn balance_factor(&self, id: NodeId) -> i32 {
        self.height(self.nodes[id].left) - self.height(self.nodes[id].right)
    }

    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.update(id);
        let balance = self.balance_factor(id);

        if balance > 1 {
            if let Some(left) = self.nodes[id].left {
                if self.balance_factor(left) < 0 {
                    self.nodes[id].left = Some(self.rotate_left(left));
                }
            }
            return self.rotate_right(id);
        }

        if balance < -1 {
            if let Some(right) = self.nodes[id].right {
                if self.balance_factor(right) > 0 {
                    self.nodes[id].right = Some(self.rotate_right(right));
                }
            }
            return self.rotate_left(id);
        }

        id
    }

    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let Some(pivot) = self.nodes[id].left else {
            return id;
        };
        self.nodes[id].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let Some(pivot) = self.nodes[id].right else {
            return id;
        };
        self.nodes[id].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    #[cfg(test)]
    fn check_invariants(&self, id: Option<NodeId>) -> (i32, u64) {
        let Some(id) = id else { return (0, 0) };
        let node = &self.nodes[id];
        let (lh, lmax) = self.check_invariants(node.left);
        let (rh, rmax) = self.check_invariants(node.right);
        assert!((lh - rh).abs() <= 1, "unbalanced at 0x{:x}", node.low);
        assert_eq!(node.max, node.high.max(lmax).max(rmax), "stale max at 0x{:x}", node.low);
        if let Some(left) = node.left {
            assert!(self.nodes[left].low < node.low);
        }
        if let Some(right) = node.right {
            assert!(self.nodes[right].low > node.low);
        }
        (1 + lh.max(rh), node.max)
    }
}
