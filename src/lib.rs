//! ImageStag Framework Core
//!
//! The execution layer of an N-dimensional image processing library: generic
//! frameworks that drive a small line filter over whole images, with boundary
//! extension, neighborhood enumeration and multi-threaded line-parallel
//! execution handled for the filter.
//!
//! ## Image Model
//! An [`Image`] is a view over a shared, reference-counted sample block:
//! - **Sizes and strides**: any dimensionality, strides in samples, may be zero (broadcast) or negative (mirrored)
//! - **Tensor**: per-pixel channels with their own stride and a [`Tensor`] shape
//! - **Data type**: one of the [`DataType`] set, from `bin` to `dcomplex`
//!
//! Cloning an image copies the view, never the samples. Reshaping a view
//! (permute, flatten, window) leaves every other view untouched.
//!
//! ## Modules
//! - [`image`]: image views, data types, tensors and the coordinate odometer
//! - [`buffer`]: type-converting line copies and fills
//! - [`boundary`]: boundary conditions, line expansion and image extension
//! - [`neighborhood`]: kernels, pixel tables and neighbor lists
//! - [`framework`]: the scan, separable, full and projection frameworks
//!
//! ## Example
//! ```
//! use imagestag_framework::boundary::{extend_image, BoundaryCondition, ExtendImageOptions};
//! use imagestag_framework::image::{DataType, Image};
//!
//! let mut image = Image::new(&[4, 4], 1, DataType::UInt8).unwrap();
//! image.fill(7u8).unwrap();
//! let extended = extend_image(&image, &[2], &[BoundaryCondition::Periodic], ExtendImageOptions::NONE).unwrap();
//! assert_eq!(extended.sizes(), &[8, 8]);
//! ```

pub mod boundary;
pub mod buffer;
pub mod config;
pub mod error;
pub mod framework;
pub mod image;
pub mod neighborhood;

pub use boundary::BoundaryCondition;
pub use error::{Error, ErrorKind, Result};
pub use image::{DataType, Image, Tensor, TensorShape};
pub use neighborhood::{Kernel, PixelTable};
