//! Generic tree traversal over [`Node`]s.
//!
//! [`Walk`] is a lazy depth-first, pre-order iterator driven by an explicit
//! work stack: a parent is yielded before its children, and children come in
//! [`Node::children`] order. Nothing is visited until the consumer asks for
//! it, so dropping the iterator early simply stops the traversal.

use super::Node;

/// Lazy pre-order iterator over a subtree.
pub struct Walk<'a> {
    stack: Vec<(&'a Node, usize)>,
}

impl<'a> Walk<'a> {
    /// Starts a traversal at `root`.
    pub fn new(root: &'a Node) -> Self {
        Self {
            stack: vec![(root, 0)],
        }
    }

    /// Yields each node together with its depth (root is depth 0).
    pub fn with_depth(self) -> WalkWithDepth<'a> {
        WalkWithDepth { inner: self }
    }

    fn next_entry(&mut self) -> Option<(&'a Node, usize)> {
        let (node, depth) = self.stack.pop()?;
        // Reverse so the first child is popped next
        for child in node.children().into_iter().rev() {
            self.stack.push((child, depth + 1));
        }
        Some((node, depth))
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|(node, _)| node)
    }
}

/// A [`Walk`] that also reports depth.
pub struct WalkWithDepth<'a> {
    inner: Walk<'a>,
}

impl<'a> Iterator for WalkWithDepth<'a> {
    type Item = (&'a Node, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_entry()
    }
}

/// Compares two trees by shape and leaf data, ignoring source positions.
pub fn structurally_equal(a: &Node, b: &Node) -> bool {
    let mut left = a.walk().with_depth();
    let mut right = b.walk().with_depth();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some((x, dx)), Some((y, dy))) => {
                if dx != dy
                    || x.kind() != y.kind()
                    || x.payload() != y.payload()
                    || x.children().len() != y.children().len()
                {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Returns the chain of nodes from `root` down to the first node (in
/// pre-order) matching `predicate`.
pub fn path_to<'a, F>(root: &'a Node, mut predicate: F) -> Option<Vec<&'a Node>>
where
    F: FnMut(&Node) -> bool,
{
    let mut path: Vec<&'a Node> = Vec::new();
    for (node, depth) in root.walk().with_depth() {
        path.truncate(depth);
        path.push(node);
        if predicate(node) {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Position};

    fn leaf(n: i64, line: u32) -> Node {
        Node::new(Expr::Integer(n), Position::new(line, 1))
    }

    fn tree(line: u32) -> Node {
        // [1, [2, 3], 4]
        Node::new(
            Expr::Array(vec![
                leaf(1, line),
                Node::new(Expr::Array(vec![leaf(2, line), leaf(3, line)]), Position::new(line, 4)),
                leaf(4, line),
            ]),
            Position::new(line, 1),
        )
    }

    #[test]
    fn test_pre_order() {
        let root = tree(1);
        let seen: Vec<String> = root
            .walk()
            .map(|n| match &n.expr {
                Expr::Integer(i) => i.to_string(),
                _ => n.kind().to_string(),
            })
            .collect();
        assert_eq!(seen, vec!["array", "1", "array", "2", "3", "4"]);
    }

    #[test]
    fn test_early_stop() {
        let root = tree(1);
        let mut walk = root.walk();
        assert_eq!(walk.next().map(|n| n.kind()), Some("array"));
        assert_eq!(walk.next().map(|n| n.kind()), Some("integer"));
        drop(walk);
    }

    #[test]
    fn test_structural_equality_ignores_positions() {
        assert!(structurally_equal(&tree(1), &tree(7)));
        assert!(!structurally_equal(&tree(1), &leaf(1, 1)));

        let other = Node::new(
            Expr::Array(vec![leaf(1, 1), leaf(2, 1), leaf(3, 1), leaf(4, 1)]),
            Position::new(1, 1),
        );
        assert!(!structurally_equal(&tree(1), &other));
    }

    #[test]
    fn test_path_to() {
        let root = tree(1);
        let path = path_to(&root, |n| n.expr == Expr::Integer(3)).unwrap();
        let kinds: Vec<_> = path.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["array", "array", "integer"]);
        assert!(path_to(&root, |n| n.expr == Expr::Integer(9)).is_none());
    }
}
