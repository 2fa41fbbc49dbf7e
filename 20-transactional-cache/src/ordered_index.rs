//! Height-balanced (AVL) binary search tree used by both store indexes.
//!
//! The store only needs point operations, so the tree exposes lookup, insert,
//! in-place replacement and removal. There is deliberately no iteration API.
//!
//! Every mutating path walks back from the touched node toward the root,
//! refreshing heights and rotating wherever a node's balance factor leaves
//! `{-1, 0, 1}`. That keeps the height at `O(log n)` and so every operation
//! at `O(log n)`.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::mem;

type Link<K, V> = Option<Box<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: u32,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, value: V) -> Self {
        Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        }
    }

    fn update_height(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    /// Left height minus right height.
    fn balance_factor(&self) -> i64 {
        i64::from(height(&self.left)) - i64::from(height(&self.right))
    }
}

fn height<K, V>(link: &Link<K, V>) -> u32 {
    link.as_ref().map_or(0, |node| node.height)
}

/// Ordered map from `K` to `V` backed by an AVL tree.
///
/// Keys are unique. [`insert`](Self::insert) refuses to overwrite an existing
/// entry; callers that want to change a payload use
/// [`replace`](Self::replace), which hands the previous payload back by value.
pub struct OrderedIndex<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Default for OrderedIndex<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K: Ord, V> OrderedIndex<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree; 0 when empty.
    pub fn height(&self) -> u32 {
        height(&self.root)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cursor = self.root.as_deref();
        while let Some(node) = cursor {
            cursor = match key.cmp(node.key.borrow()) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cursor = self.root.as_deref_mut();
        while let Some(node) = cursor {
            cursor = match key.cmp(node.key.borrow()) {
                Ordering::Less => node.left.as_deref_mut(),
                Ordering::Greater => node.right.as_deref_mut(),
                Ordering::Equal => return Some(&mut node.value),
            };
        }
        None
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Adds a new entry and rebalances.
    ///
    /// Returns `false` without touching the tree when `key` is already
    /// present; the existing payload is kept and the new one dropped.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let inserted = insert_into(&mut self.root, key, value);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Overwrites the payload stored under `key`, returning the old payload.
    ///
    /// The node keeps its position in the tree, so no rebalancing happens.
    /// Returns `None` (and stores nothing) if `key` is absent.
    pub fn replace<Q>(&mut self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get_mut(key).map(|slot| mem::replace(slot, value))
    }

    /// Deletes `key` and rebalances, returning its payload if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let removed = remove_from(&mut self.root, key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }
}

fn insert_into<K: Ord, V>(link: &mut Link<K, V>, key: K, value: V) -> bool {
    let inserted = match link {
        None => {
            *link = Some(Box::new(Node::leaf(key, value)));
            return true;
        }
        Some(node) => match key.cmp(&node.key) {
            Ordering::Less => insert_into(&mut node.left, key, value),
            Ordering::Greater => insert_into(&mut node.right, key, value),
            Ordering::Equal => false,
        },
    };
    if inserted {
        rebalance(link);
    }
    inserted
}

fn remove_from<K, V, Q>(link: &mut Link<K, V>, key: &Q) -> Option<V>
where
    K: Ord + Borrow<Q>,
    Q: Ord + ?Sized,
{
    let node = link.as_mut()?;
    let removed = match key.cmp(node.key.borrow()) {
        Ordering::Less => remove_from(&mut node.left, key),
        Ordering::Greater => remove_from(&mut node.right, key),
        Ordering::Equal => {
            let mut target = link.take()?;
            *link = match (target.left.take(), target.right.take()) {
                (None, None) => None,
                (Some(child), None) | (None, Some(child)) => Some(child),
                (Some(left), Some(right)) => {
                    // In-order successor takes the removed node's place.
                    let (mut successor, rest) = take_min(right);
                    successor.left = Some(left);
                    successor.right = rest;
                    Some(successor)
                }
            };
            Some(target.value)
        }
    };
    if removed.is_some() {
        rebalance(link);
    }
    removed
}

/// Detaches the leftmost node of `node`'s subtree.
///
/// Returns the detached node (children cleared) and the rebalanced remainder.
fn take_min<K, V>(mut node: Box<Node<K, V>>) -> (Box<Node<K, V>>, Link<K, V>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (node, rest)
        }
        Some(left) => {
            let (min, rest) = take_min(left);
            node.left = rest;
            let mut link = Some(node);
            rebalance(&mut link);
            (min, link)
        }
    }
}

fn rebalance<K, V>(link: &mut Link<K, V>) {
    let Some(mut node) = link.take() else {
        return;
    };
    node.update_height();
    let balance = node.balance_factor();
    let node = if balance > 1 {
        // Left-right case becomes left-left after rotating the child.
        if node.left.as_ref().map_or(0, |left| left.balance_factor()) < 0 {
            node.left = node.left.take().map(rotate_left);
        }
        rotate_right(node)
    } else if balance < -1 {
        if node.right.as_ref().map_or(0, |right| right.balance_factor()) > 0 {
            node.right = node.right.take().map(rotate_right);
        }
        rotate_left(node)
    } else {
        node
    };
    *link = Some(node);
}

fn rotate_right<K, V>(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update_height();
    pivot.right = Some(node);
    pivot.update_height();
    pivot
}

fn rotate_left<K, V>(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update_height();
    pivot.left = Some(node);
    pivot.update_height();
    pivot
}
