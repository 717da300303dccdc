//! The "Height Optimized Trie" secondary index (spec §2/§4.7/§4.8): a
//! sorted leaf page plus a compound interior (indirect) node with three
//! density-graded variants.

pub mod indirect;
pub mod leaf;

pub use indirect::HotIndirectNode;
pub use leaf::HotLeafPage;
