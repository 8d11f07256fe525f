//! Neighborhood descriptions.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Kernel`] | Shape of a filter neighborhood, independent of dimensionality |
//! | [`PixelTable`] | A neighborhood in `n` dimensions as runs along a processing dimension |
//! | [`PixelTableOffsets`] | A pixel table bound to the strides of one image |
//! | [`NeighborList`] | Direct neighbors of a pixel with their distances |

pub mod kernel;
pub mod neighbor_list;
pub mod pixel_table;

pub use kernel::{Kernel, KernelShape};
pub use neighbor_list::{Metric, Neighbor, NeighborList};
pub use pixel_table::{NeighborhoodShape, PixelRun, PixelRunOffset, PixelTable, PixelTableOffsets};
