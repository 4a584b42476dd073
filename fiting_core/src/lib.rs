//! Learned, bounded-error index over sorted keys, after the FITing-Tree
//! design: a shrinking-cone piecewise-linear segmentation compresses the
//! key-to-position mapping into a minimal run of linear pieces with a hard
//! vertical error bound, and per-segment insertion buffers make the index
//! updatable without giving up that bound.
//!
//! [`FitingTree`] indexes immutable sorted data and answers
//! [`approx_pos`](FitingTree::approx_pos) queries: a window of at most
//! `2 * EPSILON + 1` positions guaranteed to contain the key if it is
//! present. [`BufferedFitingTree`] adds point `insert`/`erase`/`find` on
//! top by reserving part of the error budget for a bounded per-segment
//! buffer.
//!
//! The index is not internally synchronized; wrap it in a lock for
//! concurrent use. Iterators borrow the tree, so the borrow checker rules
//! out iteration overlapping a mutation.

pub mod buffered;
pub mod directory;
pub mod search;
pub mod segmentation;

mod error;
mod key;
mod segment;
mod tree;

pub use buffered::{BufferedFitingTree, BufferedSegment, DataItem};
pub use directory::{Directory, SortedDirectory};
pub use error::{IndexError, Result};
pub use key::{Key, Pos, Value, WideSigned};
pub use segment::{ApproxPos, Segment};
pub use tree::FitingTree;
