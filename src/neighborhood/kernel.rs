//! Filter kernels: the shape of a neighborhood, independent of dimensionality.
//!
//! A [`Kernel`] is either an analytic shape with one diameter per dimension
//! or a custom image. Binary images give a flat kernel; real-valued images
//! give a weighted one where every finite sample, zero included, belongs to
//! the neighborhood. Line kernels run corner to corner through their bounding
//! box; a `left line` moves the origin to the first pixel of the line.
//! The kernel only becomes concrete once the dimensionality of the image it
//! is applied to is known, through [`Kernel::pixel_table`].

use std::str::FromStr;

use crate::error::{array_use_parameter_or, Error, Result};
use crate::image::{DataType, Image};

use super::pixel_table::{NeighborhoodShape, PixelTable};

/// Shape of a [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelShape {
    Rectangular,
    Elliptic,
    Diamond,
    Line,
    LeftLine,
    Custom,
}

impl FromStr for KernelShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "left line" {
            return Ok(KernelShape::LeftLine);
        }
        Ok(match s.parse::<NeighborhoodShape>()? {
            NeighborhoodShape::Rectangular => KernelShape::Rectangular,
            NeighborhoodShape::Elliptic => KernelShape::Elliptic,
            NeighborhoodShape::Diamond => KernelShape::Diamond,
            NeighborhoodShape::Line => KernelShape::Line,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Kernel {
    shape: KernelShape,
    params: Vec<f64>,
    image: Option<Image>,
    shift: Vec<isize>,
    mirror: bool,
}

impl Default for Kernel {
    /// An elliptic kernel with a diameter of 7 pixels.
    fn default() -> Self {
        Kernel {
            shape: KernelShape::Elliptic,
            params: vec![7.0],
            image: None,
            shift: Vec::new(),
            mirror: false,
        }
    }
}

impl Kernel {
    /// An analytic kernel. `params` holds one diameter per dimension or one for all.
    pub fn new(shape: &str, params: &[f64]) -> Result<Self> {
        Ok(Kernel {
            shape: shape.parse()?,
            params: params.to_vec(),
            ..Kernel::default()
        })
    }

    /// A custom kernel from a scalar, real-valued image.
    pub fn from_image(image: &Image) -> Result<Self> {
        image.check_forged()?;
        if !image.is_scalar() {
            return Err(Error::precondition("kernel image must be scalar"));
        }
        if image.data_type().is_complex() {
            return Err(Error::precondition("kernel image must be real-valued"));
        }
        Ok(Kernel {
            shape: KernelShape::Custom,
            params: Vec::new(),
            image: Some(image.clone()),
            ..Kernel::default()
        })
    }

    /// Moves the kernel origin by `shift` pixels.
    pub fn set_shift(&mut self, shift: &[isize]) {
        self.shift = shift.to_vec();
    }

    /// Toggles point mirroring of the kernel.
    pub fn mirror(&mut self) {
        self.mirror = !self.mirror;
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror
    }

    pub fn shape(&self) -> KernelShape {
        self.shape
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn shift(&self) -> &[isize] {
        &self.shift
    }

    pub fn is_custom(&self) -> bool {
        self.shape == KernelShape::Custom
    }

    pub fn is_line(&self) -> bool {
        matches!(self.shape, KernelShape::Line | KernelShape::LeftLine)
    }

    /// True for custom kernels built from a non-binary image.
    pub fn has_weights(&self) -> bool {
        matches!(&self.image, Some(image) if image.data_type() != DataType::Bin)
    }

    fn custom_image(&self, n_dims: usize) -> Result<Image> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| Error::precondition("custom kernel has no image"))?;
        if image.dimensionality() > n_dims {
            return Err(Error::DimensionalityMismatch(image.dimensionality(), n_dims));
        }
        let mut image = image.clone();
        image.expand_dimensionality(n_dims);
        Ok(image)
    }

    fn check_dimensionality(n_dims: usize) -> Result<()> {
        if n_dims == 0 {
            return Err(Error::parameter("kernels need at least one dimension"));
        }
        Ok(())
    }

    fn broadcast_params(&self, n_dims: usize) -> Result<Vec<f64>> {
        let mut params = self.params.clone();
        array_use_parameter_or(&mut params, n_dims, 1.0)?;
        Ok(params)
    }

    fn broadcast_shift(&self, n_dims: usize) -> Result<Vec<isize>> {
        let mut shift = self.shift.clone();
        array_use_parameter_or(&mut shift, n_dims, 0)?;
        Ok(shift)
    }

    /// Bounding box of the kernel in `n_dims` dimensions.
    pub fn sizes(&self, n_dims: usize) -> Result<Vec<usize>> {
        Kernel::check_dimensionality(n_dims)?;
        if self.is_custom() {
            return Ok(self.custom_image(n_dims)?.sizes().to_vec());
        }
        let params = self.broadcast_params(n_dims)?;
        Ok(params
            .iter()
            .map(|&p| {
                if self.is_line() {
                    (p.abs().round() as usize).max(1)
                } else if p <= 1.0 {
                    1
                } else if self.shape == KernelShape::Rectangular {
                    p as usize
                } else {
                    (p as usize / 2) * 2 + 1
                }
            })
            .collect())
    }

    /// Border needed on each side of an image to apply the kernel: half the size plus the shift.
    ///
    /// A left line reaches up to `size - 1` pixels to one side of its origin.
    pub fn boundary(&self, n_dims: usize) -> Result<Vec<usize>> {
        let sizes = self.sizes(n_dims)?;
        let shift = self.broadcast_shift(n_dims)?;
        let left = self.shape == KernelShape::LeftLine;
        Ok(sizes
            .iter()
            .zip(&shift)
            .map(|(&s, &sh)| if left { s - 1 } else { s / 2 } + sh.unsigned_abs())
            .collect())
    }

    /// The pixel table of this kernel in `n_dims` dimensions, with runs along `proc_dim`.
    pub fn pixel_table(&self, n_dims: usize, proc_dim: usize) -> Result<PixelTable> {
        Kernel::check_dimensionality(n_dims)?;
        let mut table = match self.shape {
            KernelShape::Custom => {
                let image = self.custom_image(n_dims)?;
                if image.data_type() == DataType::Bin {
                    PixelTable::from_mask(&image, None, proc_dim)?
                } else {
                    let mut table = PixelTable::from_predicate(image.sizes(), None, proc_dim, |coords| {
                        let v = image.read_sample::<f64>(image.offset_of(coords));
                        Ok(v.is_finite())
                    })?;
                    table.add_weights(&image)?;
                    table
                }
            }
            analytic => {
                let shape = match analytic {
                    KernelShape::Rectangular => NeighborhoodShape::Rectangular,
                    KernelShape::Diamond => NeighborhoodShape::Diamond,
                    KernelShape::Line | KernelShape::LeftLine => NeighborhoodShape::Line,
                    _ => NeighborhoodShape::Elliptic,
                };
                let mut table = PixelTable::from_shape(shape, &self.broadcast_params(n_dims)?, proc_dim)?;
                if analytic == KernelShape::LeftLine {
                    if let Some(first) = table.runs().first().map(|r| r.coordinates.clone()) {
                        table.shift_origin(&first)?;
                    }
                }
                table
            }
        };
        if !self.shift.is_empty() {
            table.shift_origin(&self.broadcast_shift(n_dims)?)?;
        }
        if self.mirror {
            table.mirror();
        }
        Ok(table)
    }

    pub fn number_of_pixels(&self, n_dims: usize) -> Result<usize> {
        Ok(self.pixel_table(n_dims, 0)?.number_of_pixels())
    }
}
