//! Spatial indexing for the Barnes-Hut repulsion algorithm.

pub mod morton;
pub mod quadtree;

pub use quadtree::{tree_size_for_depth, QuadTree, QuadTreeNode};
