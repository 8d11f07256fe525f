//! The full framework: neighborhood filters driven by a pixel table.
//!
//! [`full`] pads the input by the kernel's boundary (converting it to the
//! input buffer type on the way), binds the kernel's pixel table to the
//! padded image, and calls a [`FullLineFilter`] once per image line. The
//! filter reads the neighborhood of pixel `p` at
//! `p * stride + offset` for every offset in the table; all of those samples
//! lie inside the padded storage.
//!
//! | Input situation | Input buffer |
//! |-----------------|--------------|
//! | Buffer type, no border, normal tensor | The input itself |
//! | Border > 0 or tensor expansion | Padded copy from [`extend_image`] |
//! | Only the type differs | Converted copy |
//! | All boundary conditions `AlreadyExpanded` | The input itself, reading the caller's margin |

use crate::boundary::{extend_image, BoundaryCondition, ExtendImageOptions};
use crate::buffer::{copy_buffer, LineBuffer};
use crate::config::option_set;
use crate::error::{Error, Result};
use crate::image::{to_isize, DataBlock, DataType, Image, Odometer, Tensor};
use crate::neighborhood::{Kernel, PixelTableOffsets};

use super::{image_line, optimal_processing_dim_for_kernel, run_threads, scratch_line, split_evenly, thread_count};

option_set! {
    /// Options for [`full`].
    FullOptions {
        /// Call the line filter from one thread only.
        NO_MULTI_THREADING = 0,
        /// The tensor becomes an extra spatial dimension; the output keeps the input tensor.
        AS_SCALAR_IMAGE = 1,
        /// The input buffer holds each tensor as a full column-major matrix.
        EXPAND_TENSOR_IN_BUFFER = 2,
        /// The input storage already holds a valid margin around the view.
        BORDER_ALREADY_EXPANDED = 3,
    }
}

/// What a [`FullLineFilter`] gets for each line.
#[derive(Debug)]
pub struct FullLineFilterParameters<'a> {
    /// Points at the first pixel of the line in the padded input.
    pub in_buffer: &'a LineBuffer,
    pub out_buffer: &'a LineBuffer,
    pub buffer_length: usize,
    pub dimension: usize,
    pub position: &'a [usize],
    /// Neighborhood offsets in the input buffer, relative to the current pixel.
    pub pixel_table: &'a PixelTableOffsets,
    pub thread: usize,
}

/// A neighborhood operation driven by [`full`].
pub trait FullLineFilter: Sync {
    fn filter(&self, params: &FullLineFilterParameters<'_>) -> Result<()>;

    /// Called once before processing starts, with the thread count and the offsets every call will see.
    fn set_number_of_threads(&mut self, _threads: usize, _pixel_table: &PixelTableOffsets) -> Result<()> {
        Ok(())
    }

    /// Estimated cost of one line: multiply-adds, walking the runs, and reading the weights.
    fn get_number_of_operations(
        &self,
        line_length: usize,
        n_tensor_elements: usize,
        n_kernel_pixels: usize,
        n_runs: usize,
    ) -> usize {
        line_length * n_tensor_elements * n_kernel_pixels
            + line_length * (2 * n_kernel_pixels + n_runs)
            + line_length * n_kernel_pixels
    }
}

/// Applies `line_filter` to every pixel neighborhood of `input` defined by `kernel`.
///
/// # Arguments
/// * `in_buffer_type` - Sample type of the padded input the filter reads
/// * `out_buffer_type` - Sample type the filter writes; cast to `out_image_type` if different
/// * `n_tensor_elements` - Tensor elements of the output, unless [`FullOptions::AS_SCALAR_IMAGE`]
/// * `bc` - Boundary conditions for the padding, per dimension or one for all
///
/// # Errors
/// Mixing `AlreadyExpanded` with other boundary conditions is a parameter
/// error. An already expanded input that needs a type change or tensor
/// expansion is not supported.
#[allow(clippy::too_many_arguments)]
pub fn full(
    input: &Image,
    out: &mut Image,
    in_buffer_type: DataType,
    out_buffer_type: DataType,
    out_image_type: DataType,
    n_tensor_elements: usize,
    bc: &[BoundaryCondition],
    kernel: &Kernel,
    line_filter: &mut dyn FullLineFilter,
    options: FullOptions,
) -> Result<()> {
    input.check_forged()?;
    let n_dims = input.dimensionality();
    let sizes = input.sizes().to_vec();
    let kernel_sizes = kernel.sizes(n_dims)?;

    let pixel_size = input.pixel_size().to_vec();
    let color_space = input.color_space().to_string();

    let mut out_tensor = Tensor::vector(n_tensor_elements);
    let mut expand_tensor = false;
    let mut as_scalar_image = false;
    if options.contains(FullOptions::AS_SCALAR_IMAGE) {
        out_tensor = input.tensor();
        as_scalar_image = !input.is_scalar();
    } else {
        expand_tensor =
            options.contains(FullOptions::EXPAND_TENSOR_IN_BUFFER) && !input.tensor().has_normal_order();
    }

    let boundary = kernel.boundary(n_dims)?;
    let type_change = input.data_type() != in_buffer_type;
    let expand_boundary = boundary.iter().any(|&b| b > 0);
    let mut already_expanded = options.contains(FullOptions::BORDER_ALREADY_EXPANDED);
    if !bc.is_empty() {
        let expanded = bc.iter().filter(|&&c| c == BoundaryCondition::AlreadyExpanded).count();
        if expanded == bc.len() {
            already_expanded = true;
        } else if expanded > 0 {
            return Err(Error::parameter(
                "\"already expanded\" boundary condition cannot be combined with other boundary conditions",
            ));
        }
    }
    // Without a border nothing is read outside the image.
    already_expanded &= expand_boundary;
    if already_expanded && (type_change || expand_tensor) {
        return Err(Error::Unimplemented(
            "input border was already expanded, but its type or tensor needs converting".into(),
        ));
    }
    let adjust_input = !already_expanded && (type_change || expand_tensor || expand_boundary);

    if out.is_forged() && out.aliases(input) {
        out.strip();
    }
    out.reforge(&sizes, out_tensor.elements(), out_image_type)?;
    out.reshape_tensor(out_tensor)?;
    out.set_pixel_size(pixel_size);
    if !color_space.is_empty() {
        out.set_color_space(color_space);
    }
    let mut output = out.clone();

    let mut buffer = if adjust_input {
        let source = if type_change { input.convert(in_buffer_type)? } else { input.clone() };
        if expand_tensor || expand_boundary {
            let mut extend_options = ExtendImageOptions::MASKED;
            if expand_tensor {
                extend_options |= ExtendImageOptions::EXPAND_TENSOR;
            }
            let border = if expand_boundary { boundary.clone() } else { vec![0] };
            extend_image(&source, &border, bc, extend_options)?
        } else {
            source
        }
    } else {
        input.clone()
    };

    let processing_dim = optimal_processing_dim_for_kernel(&buffer, &kernel_sizes)?;
    let pixel_table = kernel.pixel_table(n_dims, processing_dim)?.offsets(&buffer)?;

    // The tensor goes last, so `processing_dim` keeps its meaning.
    let mut line_sizes = sizes;
    if as_scalar_image {
        buffer.tensor_to_spatial();
        output.tensor_to_spatial();
        line_sizes = buffer.sizes().to_vec();
    }
    let use_out_buffer = output.data_type() != out_buffer_type;

    let line_length = line_sizes[processing_dim];
    let n_lines = line_sizes.iter().product::<usize>() / line_length;
    let threads = thread_count(!options.contains(FullOptions::NO_MULTI_THREADING), n_lines, || {
        n_lines
            * line_filter.get_number_of_operations(
                line_length,
                buffer.tensor_elements(),
                pixel_table.number_of_pixels(),
                pixel_table.runs().len(),
            )
    });
    let (per_thread, n_threads) = split_evenly(n_lines, threads);
    log::debug!(
        "full: processing dimension {processing_dim}, {} kernel pixels in {} runs, input copied: {adjust_input}, \
         output buffer: {use_out_buffer}, {n_threads} thread(s)",
        pixel_table.number_of_pixels(),
        pixel_table.runs().len(),
    );

    line_filter.set_number_of_threads(n_threads, &pixel_table)?;
    let filter: &dyn FullLineFilter = line_filter;

    let work = |thread: usize| -> Result<()> {
        let mut in_buffer = image_line(&buffer, 0, processing_dim, line_length);
        let (_scratch, mut out_buffer): (Option<DataBlock>, LineBuffer) = if use_out_buffer {
            let (block, line) = scratch_line(out_buffer_type, output.tensor_elements(), line_length, 0)?;
            (Some(block), line)
        } else {
            (None, image_line(&output, 0, processing_dim, line_length))
        };

        for position in Odometer::lines(&line_sizes, processing_dim).window(thread * per_thread, per_thread) {
            let coords = to_isize(&position);
            in_buffer.set_origin(buffer.raw_line(buffer.offset_of(&coords), processing_dim));
            let out_line = output.raw_line(output.offset_of(&coords), processing_dim);
            if !use_out_buffer {
                out_buffer.set_origin(out_line);
            }
            filter.filter(&FullLineFilterParameters {
                in_buffer: &in_buffer,
                out_buffer: &out_buffer,
                buffer_length: line_length,
                dimension: processing_dim,
                position: &position,
                pixel_table: &pixel_table,
                thread,
            })?;
            if use_out_buffer {
                // SAFETY: the output line lies in the output view; threads own disjoint lines.
                unsafe { copy_buffer(out_buffer.raw(), out_line, line_length, output.tensor_elements(), None) };
            }
        }
        Ok(())
    };
    run_threads(n_threads, work)
}
