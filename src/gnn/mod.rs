//! Heterogeneous message-passing model over the playlist–track graph.
//!
//! The forward and backward passes are written out by hand for this fixed
//! two-layer architecture, so no autodiff runtime is needed.

pub mod model;
pub mod optim;
pub mod sage;

pub use model::{EmbeddingSnapshot, ForwardCache, HeteroLayer, HeteroSage, ShapeError};
pub use optim::Adam;
pub use sage::{Linear, SageConv};
