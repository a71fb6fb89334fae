//! Stable node/edge identifiers.
//!
//! `NodeIndex`/`EdgeIndex` are `slotmap` keys: recycling a slot bumps
//! slotmap's internal generation, so a stale index simply fails to resolve
//! rather than aliasing a different node — generation-advanced recycling
//! comes for free from the key type.

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeIndex;
    pub struct EdgeIndex;
}

/// Opaque user-supplied node identifier. Unique; the mapping to `NodeIndex`
/// is bijective at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Text(Box<str>),
    Int(u64),
}

impl From<&str> for NodeKey {
    fn from(s: &str) -> Self {
        NodeKey::Text(s.into())
    }
}

impl From<String> for NodeKey {
    fn from(s: String) -> Self {
        NodeKey::Text(s.into_boxed_str())
    }
}

impl From<u64> for NodeKey {
    fn from(v: u64) -> Self {
        NodeKey::Int(v)
    }
}
