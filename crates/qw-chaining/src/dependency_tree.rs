use std::fmt;

/// What a [`DependencyTree`] needs to know about its elements.
pub trait DependencyElement: Clone + PartialEq {
    /// Whether `self` can only happen after `other`.
    fn depends_on(&self, other: &Self) -> bool;

    /// Whether `self` brings something none of `others` does, such as a
    /// fact none of them adds.
    ///
    /// An element that is not distinct from the children of a node is not
    /// attached to it again. There is no default: equality alone would let
    /// two elements with the same effects sit under one node.
    fn is_distinct_from(&self, others: &[&Self]) -> bool;

    /// Whether `self` should come before its sibling `other`.
    fn precedes(&self, _other: &Self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct TreeNode<E> {
    element: E,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A multi-root tree where each node's children are the elements it depends
/// on.
///
/// Leaves are the elements with no pending dependency: the ones that can
/// happen next. Nodes live in an arena and refer to each other by index; an
/// element that several nodes depend on is stored once under each of them.
/// Slots of removed nodes are reused by later pushes.
#[derive(Debug, Clone)]
pub struct DependencyTree<E> {
    nodes: Vec<TreeNode<E>>,
    roots: Vec<usize>,
    free: Vec<usize>,
}

impl<E> Default for DependencyTree<E> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<E: DependencyElement> DependencyTree<E> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tree has no node.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// The root elements.
    pub fn roots(&self) -> impl Iterator<Item = &E> {
        self.roots.iter().map(|&idx| &self.nodes[idx].element)
    }

    /// Add `value` under every node that depends on it.
    ///
    /// When the tree is empty, or when nothing depends on `value` and
    /// `allow_multi_root` is set, `value` becomes a new root. Returns
    /// whether the tree changed.
    pub fn push(&mut self, value: E, allow_multi_root: bool) -> bool {
        if self.roots.is_empty() {
            self.add_root(value);
            return true;
        }

        let mut added = false;
        for root in self.roots.clone() {
            added |= self.push_under(root, &value);
        }

        if !added && allow_multi_root && !self.roots().any(|root| root == &value) {
            self.add_root(value);
            return true;
        }
        added
    }

    fn push_under(&mut self, at: usize, value: &E) -> bool {
        let mut added = false;
        for child in self.nodes[at].children.clone() {
            added |= self.push_under(child, value);
        }

        if self.nodes[at].element.depends_on(value) && !self.already_added(at, value) {
            let idx = self.alloc(value.clone(), Some(at));
            self.insert_child(at, idx);
            return true;
        }
        added
    }

    fn already_added(&self, at: usize, value: &E) -> bool {
        let children: Vec<&E> = self.nodes[at]
            .children
            .iter()
            .map(|&c| &self.nodes[c].element)
            .collect();
        children.contains(&value) || !value.is_distinct_from(&children)
    }

    fn insert_child(&mut self, at: usize, idx: usize) {
        let element = &self.nodes[idx].element;
        let position = self.nodes[at]
            .children
            .iter()
            .position(|&c| element.precedes(&self.nodes[c].element));
        let children = &mut self.nodes[at].children;
        match position {
            Some(position) => children.insert(position, idx),
            None => children.push(idx),
        }
    }

    fn alloc(&mut self, element: E, parent: Option<usize>) -> usize {
        let node = TreeNode {
            element,
            parent,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn add_root(&mut self, element: E) {
        let idx = self.alloc(element, None);
        self.roots.push(idx);
    }

    /// Remove every leaf holding `value`.
    ///
    /// Parents left without children become leaves and the removed slots
    /// are freed. Returns `false`, leaving the tree untouched, when `value`
    /// is not a leaf.
    pub fn remove(&mut self, value: &E) -> bool {
        let leaves: Vec<usize> = self
            .postorder()
            .into_iter()
            .filter(|&idx| self.nodes[idx].children.is_empty() && &self.nodes[idx].element == value)
            .collect();
        if leaves.is_empty() {
            return false;
        }

        for &idx in &leaves {
            match self.nodes[idx].parent {
                Some(parent) => self.nodes[parent].children.retain(|&c| c != idx),
                None => self.roots.retain(|&r| r != idx),
            }
        }
        if self.roots.is_empty() {
            self.nodes.clear();
            self.free.clear();
        } else {
            self.free.extend(leaves);
        }
        true
    }

    /// Node indices in post-order, children before their parent.
    fn postorder(&self) -> Vec<usize> {
        fn visit<E>(nodes: &[TreeNode<E>], idx: usize, out: &mut Vec<usize>) {
            for &child in &nodes[idx].children {
                visit(nodes, child, out);
            }
            out.push(idx);
        }

        let mut out = Vec::new();
        for &root in &self.roots {
            visit(&self.nodes, root, &mut out);
        }
        out
    }

    /// Every element in post-order. Elements stored under several parents
    /// appear once per occurrence.
    pub fn values(&self) -> Vec<&E> {
        self.iter().collect()
    }

    /// Iterate over the elements in post-order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.postorder().into_iter().map(|idx| &self.nodes[idx].element)
    }

    /// Distinct leaf elements, in post-order of first occurrence.
    pub fn leaves(&self) -> Vec<&E> {
        let mut leaves: Vec<&E> = Vec::new();
        for idx in self.postorder() {
            let node = &self.nodes[idx];
            if node.children.is_empty() && !leaves.contains(&&node.element) {
                leaves.push(&node.element);
            }
        }
        leaves
    }

    /// Whether `value` is one of the leaves.
    pub fn is_leaf(&self, value: &E) -> bool {
        self.leaves().contains(&value)
    }

    /// A copy holding only the nodes still attached to the tree.
    pub fn copy(&self) -> Self {
        let mut tree = Self::new();
        tree.graft(self);
        tree
    }

    /// Add the roots of `other`, with their subtrees, as roots of this tree.
    pub fn graft(&mut self, other: &Self) {
        for &root in &other.roots {
            let idx = self.graft_node(other, root, None);
            self.roots.push(idx);
        }
    }

    fn graft_node(&mut self, other: &Self, at: usize, parent: Option<usize>) -> usize {
        let idx = self.alloc(other.nodes[at].element.clone(), parent);
        for &child in &other.nodes[at].children {
            let child_idx = self.graft_node(other, child, Some(idx));
            self.nodes[idx].children.push(child_idx);
        }
        idx
    }
}

impl<E: DependencyElement + fmt::Display> fmt::Display for DependencyTree<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node<E: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            nodes: &[TreeNode<E>],
            idx: usize,
            indent: usize,
        ) -> fmt::Result {
            writeln!(f, "{:indent$}{}", "", nodes[idx].element, indent = indent)?;
            for &child in &nodes[idx].children {
                write_node(f, nodes, child, indent + 2)?;
            }
            Ok(())
        }

        for &root in &self.roots {
            write_node(f, &self.nodes, root, 0)?;
        }
        Ok(())
    }
}
