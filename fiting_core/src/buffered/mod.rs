//! The updatable index: segments carry bounded insertion buffers, and a
//! buffer overflow re-segments just the overflowing piece.

mod segment;
mod tree;

pub use segment::{BufferedSegment, DataItem, MergedIter};
pub use tree::{BufferedFitingTree, Iter};
