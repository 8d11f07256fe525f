//! Image-level boundary extension.
//!
//! [`extend_image`] pads an image by a border on each side,
//! [`extend_image_to_size`] pads it to given sizes, and [`extend_region`]
//! synthesizes everything outside a window of an existing image.
//! Dimensions are processed one at a time, and each pass covers the region
//! the previous passes already filled, so corners are built from extended
//! edges.
//! [`read_pixel_with_boundary_condition`] evaluates the same rules for one
//! pixel without allocating an image.

use std::ops::Range;

use num_complex::Complex64;

use crate::config::option_set;
use crate::error::{array_use_parameter, Error, Result};
use crate::image::{crop_window, to_isize, CropLocation, DataType, Image, Odometer, Tensor};

use super::{boundary_array_use_parameter, expand_buffer, BoundaryCondition};

option_set! {
    /// Options for [`extend_image`] and [`extend_image_to_size`].
    ExtendImageOptions {
        /// Return a view of the input's footprint instead of the padded image.
        MASKED = 0,
        /// Store symmetric, triangular and diagonal tensors as full matrices.
        EXPAND_TENSOR = 1,
    }
}

impl ExtendImageOptions {
    /// Parses `"masked"` and `"expand tensor"`.
    pub fn from_strings<S: AsRef<str>>(options: &[S]) -> Result<Self> {
        let mut out = ExtendImageOptions::NONE;
        for option in options {
            out |= match option.as_ref() {
                "masked" => ExtendImageOptions::MASKED,
                "expand tensor" => ExtendImageOptions::EXPAND_TENSOR,
                other => return Err(Error::parameter(format!("unknown extend option \"{other}\""))),
            };
        }
        Ok(out)
    }
}

/// Pads `input` by `border_sizes[d]` pixels on both sides of each dimension.
///
/// # Arguments
/// * `border_sizes` - One value per dimension, or a single value for all
/// * `bc` - Boundary conditions; empty means symmetric mirror everywhere
///
/// # Returns
/// A new image. With [`ExtendImageOptions::MASKED`] it is a view with the
/// input's sizes whose storage holds the border around it.
pub fn extend_image(
    input: &Image,
    border_sizes: &[usize],
    bc: &[BoundaryCondition],
    options: ExtendImageOptions,
) -> Result<Image> {
    input.check_forged()?;
    if border_sizes.is_empty() {
        return Err(Error::ArrayEmpty);
    }
    let n_dims = input.dimensionality();
    let mut border = border_sizes.to_vec();
    array_use_parameter(&mut border, n_dims)?;
    let sizes: Vec<usize> = input.sizes().iter().zip(&border).map(|(&s, &b)| s + 2 * b).collect();
    let window: Vec<Range<usize>> = input
        .sizes()
        .iter()
        .zip(&border)
        .map(|(&s, &b)| b..b + s)
        .collect();
    extend_into_window(input, &sizes, window, bc, options)
}

/// Pads `input` to `sizes`, placing it where `location` puts a window of its size.
pub fn extend_image_to_size(
    input: &Image,
    sizes: &[usize],
    location: CropLocation,
    bc: &[BoundaryCondition],
    options: ExtendImageOptions,
) -> Result<Image> {
    input.check_forged()?;
    if sizes.len() != input.dimensionality() {
        return Err(Error::ArrayWrongLength {
            expected: input.dimensionality(),
            actual: sizes.len(),
        });
    }
    let window = crop_window(sizes, input.sizes(), location)?;
    extend_into_window(input, sizes, window, bc, options)
}

fn extend_into_window(
    input: &Image,
    sizes: &[usize],
    window: Vec<Range<usize>>,
    bc: &[BoundaryCondition],
    options: ExtendImageOptions,
) -> Result<Image> {
    let mut bc = bc.to_vec();
    boundary_array_use_parameter(&mut bc, input.dimensionality())?;

    let expand = options.contains(ExtendImageOptions::EXPAND_TENSOR) && !input.tensor().has_normal_order();
    let tensor: Tensor = if expand { input.tensor().dense() } else { input.tensor() };

    let mut out = Image::new(sizes, tensor.elements(), input.data_type())?;
    out.reshape_tensor(tensor)?;
    out.set_pixel_size(input.pixel_size().to_vec());
    if !expand {
        out.set_color_space(input.color_space());
    }

    let mut center = out.window(&window)?;
    if expand {
        log::debug!("extend_image: expanding {:?} tensor to {} elements", input.tensor().shape(), tensor.elements());
        center.copy_from_with_look_up_table(input, &input.tensor().look_up_table())?;
    } else {
        center.copy_from(input)?;
    }

    extend_region(&mut out, &window, &bc)?;

    if options.contains(ExtendImageOptions::MASKED) {
        return out.window(&window);
    }
    Ok(out)
}

/// Fills all pixels of `image` outside `ranges` from the pixels inside, according to `bc`.
pub fn extend_region(image: &mut Image, ranges: &[Range<usize>], bc: &[BoundaryCondition]) -> Result<()> {
    image.check_forged()?;
    let n_dims = image.dimensionality();
    if ranges.len() != n_dims {
        return Err(Error::ArrayWrongLength {
            expected: n_dims,
            actual: ranges.len(),
        });
    }
    let mut bc = bc.to_vec();
    boundary_array_use_parameter(&mut bc, n_dims)?;

    let mut ranges = ranges.to_vec();
    let tensor_elements = image.tensor_elements();
    for dim in 0..n_dims {
        let size = image.sizes()[dim];
        if ranges[dim].end > size {
            return Err(Error::IndexOutOfRange(format!(
                "range {:?} along dimension {dim} (size {size})",
                ranges[dim]
            )));
        }
        let left = ranges[dim].start;
        let right = size - ranges[dim].end;
        if left > 0 || right > 0 {
            let region = image.window(&ranges)?;
            let length = region.sizes()[dim];
            for position in Odometer::lines(region.sizes(), dim) {
                let offset = region.offset_of(&to_isize(&position));
                // SAFETY: the margins lie inside `image`, which `region` is a window of.
                unsafe {
                    expand_buffer(region.raw_line(offset, dim), length, tensor_elements, left, right, bc[dim])?;
                }
            }
        }
        ranges[dim] = 0..size;
    }
    Ok(())
}

/// A tensor-valued pixel in the flex type of an image: `dfloat` for real data, `dcomplex` for complex data.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixel {
    data_type: DataType,
    tensor: Tensor,
    values: Vec<Complex64>,
}

impl Pixel {
    fn constant(data_type: DataType, tensor: Tensor, value: f64) -> Self {
        Pixel {
            data_type: data_type.flex(),
            tensor,
            values: vec![Complex64::new(value, 0.0); tensor.elements()],
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn tensor(&self) -> Tensor {
        self.tensor
    }

    pub fn tensor_elements(&self) -> usize {
        self.values.len()
    }

    /// Real parts of the tensor elements.
    pub fn as_f64(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.re).collect()
    }

    pub fn as_complex(&self) -> &[Complex64] {
        &self.values
    }
}

/// Reads the pixel at `coords`, which may lie outside the image, applying `bc` per dimension.
///
/// Constant conditions return as soon as one coordinate is out of range:
/// zero, `+inf` or `-inf`. If any out-of-range coordinate uses an asymmetric
/// condition, the value is negated once at the end.
pub fn read_pixel_with_boundary_condition(
    image: &Image,
    coords: &[isize],
    bc: &[BoundaryCondition],
) -> Result<Pixel> {
    image.check_forged()?;
    let n_dims = image.dimensionality();
    if coords.len() != n_dims {
        return Err(Error::ArrayWrongLength {
            expected: n_dims,
            actual: coords.len(),
        });
    }
    let mut bc = bc.to_vec();
    boundary_array_use_parameter(&mut bc, n_dims)?;

    let mut invert = false;
    let mut position = Vec::with_capacity(n_dims);
    for (d, &c) in coords.iter().enumerate() {
        let size = image.sizes()[d] as isize;
        if (0..size).contains(&c) {
            position.push(c as usize);
            continue;
        }
        let constant = match bc[d] {
            BoundaryCondition::AddZeros => Some(0.0),
            BoundaryCondition::AddMaxValue => Some(f64::INFINITY),
            BoundaryCondition::AddMinValue => Some(f64::NEG_INFINITY),
            BoundaryCondition::AlreadyExpanded => {
                return Err(Error::Unimplemented(
                    "reading outside an already expanded image".to_string(),
                ))
            }
            _ => None,
        };
        if let Some(value) = constant {
            return Ok(Pixel::constant(image.data_type(), image.tensor(), value));
        }
        let mapped = super::map_index(c, image.sizes()[d], bc[d])?.unwrap_or(0);
        invert |= bc[d].is_asymmetric();
        position.push(mapped as usize);
    }

    let values = (0..image.tensor_elements())
        .map(|t| {
            let v = image.sample_complex(&position, t)?;
            Ok(if invert { -v } else { v })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Pixel {
        data_type: image.data_type().flex(),
        tensor: image.tensor(),
        values,
    })
}
