//! Boundary conditions and boundary extension.
//!
//! A boundary condition says how to invent a sample at a coordinate outside
//! `[0, size)`. One condition is given per dimension; a single condition is
//! broadcast to all dimensions and an empty list means the default
//! (symmetric mirror).
//!
//! ## Conditions
//!
//! | Name | Aliases | Sample at out-of-range index `k` |
//! |------|---------|----------------------------------|
//! | `"symmetric"` | `"mirror"`, `"default"`, `""` | `k` reflected modulo `2 * size` |
//! | `"asymmetric mirror"` | `"asym mirror"` | as symmetric, sign flipped |
//! | `"periodic"` | | `k` modulo `size` |
//! | `"asymmetric periodic"` | `"asym periodic"` | as periodic, sign flipped |
//! | `"add zeros"` | | 0 |
//! | `"add max value"` | `"add max"` | largest value of the sample type |
//! | `"add min value"` | `"add min"` | smallest value of the sample type |
//! | `"zero order"` | | nearest edge sample |
//! | `"first order"`, `"second order"`, `"third order"` | | not implemented |
//! | `"already expanded"` | | the caller already filled the margin |

pub mod extend;

use std::ptr;
use std::str::FromStr;

use crate::buffer::RawLine;
use crate::error::{array_use_parameter_or, Error, Result};
use crate::image::datatype::dispatch_data_type;
use crate::image::Sample;

pub use extend::{
    extend_image, extend_image_to_size, extend_region, read_pixel_with_boundary_condition,
    ExtendImageOptions, Pixel,
};

/// How samples outside an image are synthesized along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundaryCondition {
    #[default]
    SymmetricMirror,
    AsymmetricMirror,
    Periodic,
    AsymmetricPeriodic,
    AddZeros,
    AddMaxValue,
    AddMinValue,
    ZeroOrderExtrapolate,
    FirstOrderExtrapolate,
    SecondOrderExtrapolate,
    ThirdOrderExtrapolate,
    /// The margin already holds valid data.
    AlreadyExpanded,
}

impl BoundaryCondition {
    /// Whether values are copied with a sign flip.
    pub fn is_asymmetric(self) -> bool {
        matches!(
            self,
            BoundaryCondition::AsymmetricMirror | BoundaryCondition::AsymmetricPeriodic
        )
    }

    fn unimplemented(self) -> Error {
        Error::Unimplemented(format!("boundary condition {self:?}"))
    }
}

impl FromStr for BoundaryCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use BoundaryCondition::*;
        Ok(match s {
            "" | "default" | "symmetric" | "mirror" => SymmetricMirror,
            "asymmetric mirror" | "asym mirror" => AsymmetricMirror,
            "periodic" => Periodic,
            "asymmetric periodic" | "asym periodic" => AsymmetricPeriodic,
            "add zeros" => AddZeros,
            "add max value" | "add max" => AddMaxValue,
            "add min value" | "add min" => AddMinValue,
            "zero order" => ZeroOrderExtrapolate,
            "first order" => FirstOrderExtrapolate,
            "second order" => SecondOrderExtrapolate,
            "third order" => ThirdOrderExtrapolate,
            "already expanded" => AlreadyExpanded,
            _ => {
                return Err(Error::parameter(format!(
                    "boundary condition not recognized: \"{s}\""
                )))
            }
        })
    }
}

/// Parses a list of boundary condition names.
pub fn string_array_to_boundary_condition_array<S: AsRef<str>>(names: &[S]) -> Result<Vec<BoundaryCondition>> {
    names.iter().map(|s| s.as_ref().parse()).collect()
}

/// Broadcasts a boundary condition list to `n_dims` entries. Empty means the default.
pub fn boundary_array_use_parameter(bc: &mut Vec<BoundaryCondition>, n_dims: usize) -> Result<()> {
    array_use_parameter_or(bc, n_dims, BoundaryCondition::default())
}

/// Maps an index outside `[0, size)` to the index whose value it takes, for
/// the index-mapping conditions. Returns `None` for constant-fill conditions.
pub fn map_index(index: isize, size: usize, bc: BoundaryCondition) -> Result<Option<isize>> {
    let n = size as isize;
    if (0..n).contains(&index) {
        return Ok(Some(index));
    }
    match bc {
        BoundaryCondition::SymmetricMirror | BoundaryCondition::AsymmetricMirror => {
            let m = index.rem_euclid(2 * n);
            Ok(Some(if m >= n { 2 * n - m - 1 } else { m }))
        }
        BoundaryCondition::Periodic | BoundaryCondition::AsymmetricPeriodic => Ok(Some(index.rem_euclid(n))),
        BoundaryCondition::ZeroOrderExtrapolate => Ok(Some(index.clamp(0, n - 1))),
        BoundaryCondition::AddZeros | BoundaryCondition::AddMaxValue | BoundaryCondition::AddMinValue => Ok(None),
        other => Err(other.unimplemented()),
    }
}

unsafe fn expand_typed<T: Sample>(
    line: RawLine,
    pixels: usize,
    tensor_elements: usize,
    left: usize,
    right: usize,
    bc: BoundaryCondition,
) {
    let base = line.ptr as *mut T;
    let constant = match bc {
        BoundaryCondition::AddZeros => Some(T::default()),
        BoundaryCondition::AddMaxValue => Some(T::highest()),
        BoundaryCondition::AddMinValue => Some(T::lowest()),
        _ => None,
    };
    let invert = bc.is_asymmetric();
    let margin = (1..=left as isize)
        .map(|k| -k)
        .chain((0..right as isize).map(|k| pixels as isize + k));
    for target in margin {
        for t in 0..tensor_elements as isize {
            let element = base.wrapping_offset(t * line.tensor_stride);
            let value = match constant {
                Some(v) => v,
                None => {
                    // Validated by the caller: only index-mapping conditions reach here.
                    let source = match map_index(target, pixels, bc) {
                        Ok(Some(s)) => s,
                        _ => return,
                    };
                    let v: T = ptr::read(element.wrapping_offset(source * line.stride));
                    if invert {
                        v.saturated_inv()
                    } else {
                        v
                    }
                }
            };
            ptr::write(element.wrapping_offset(target * line.stride), value);
        }
    }
}

/// Fills the margins of a 1D buffer according to `bc`.
///
/// `line` points at the first of `pixels` valid pixels. The `left` pixels
/// before it and the `right` pixels after the last valid pixel are written.
/// Complex samples are treated as pairs of independent real components.
///
/// # Safety
///
/// All `left + pixels + right` pixels (times `tensor_elements`) addressed by
/// `line` must be valid for reads and writes.
pub unsafe fn expand_buffer(
    line: RawLine,
    pixels: usize,
    tensor_elements: usize,
    left: usize,
    right: usize,
    bc: BoundaryCondition,
) -> Result<()> {
    match bc {
        BoundaryCondition::AlreadyExpanded => return Ok(()),
        BoundaryCondition::FirstOrderExtrapolate
        | BoundaryCondition::SecondOrderExtrapolate
        | BoundaryCondition::ThirdOrderExtrapolate => return Err(bc.unimplemented()),
        _ => {}
    }
    if (left == 0 && right == 0) || pixels == 0 {
        return Ok(());
    }
    dispatch_data_type!(line.data_type, T => expand_typed::<T>(line, pixels, tensor_elements, left, right, bc));
    Ok(())
}
