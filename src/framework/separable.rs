//! The separable framework: a 1D line operation applied along each dimension in turn.
//!
//! [`separable`] runs one pass per processed dimension. The first pass reads
//! the input, the last pass writes the output, and passes in between read
//! and write either the output itself or an intermediate image in the buffer
//! type. Dimensions that shrink the image go first so intermediate data stays
//! small. [`one_dimensional_line_filter`] is the same machinery for a single
//! pass with separate input and output buffer types.
//!
//! ## Buffers per pass
//!
//! | Buffer | Used when |
//! |--------|-----------|
//! | Input | Type differs, tensor is expanded, border > 0, or `USE_INPUT_BUFFER` |
//! | Output | Type differs, `USE_OUTPUT_BORDER` with border > 0, or `USE_OUTPUT_BUFFER` |
//! | Input (in place) | Neither above, input and output lines coincide, and no `CAN_WORK_IN_PLACE` |

use crate::boundary::{boundary_array_use_parameter, expand_buffer, BoundaryCondition};
use crate::buffer::{copy_buffer, LineBuffer, RawLine};
use crate::config::option_set;
use crate::error::{array_use_parameter, Error, Result};
use crate::image::{to_isize, DataBlock, DataType, Image, Odometer, Tensor};

use super::{image_line, run_threads, scratch_line, split_evenly, thread_count};

option_set! {
    /// Options for [`separable`] and [`one_dimensional_line_filter`].
    SeparableOptions {
        /// Call the line filter from one thread only.
        NO_MULTI_THREADING = 0,
        /// The tensor becomes an extra, unprocessed spatial dimension.
        AS_SCALAR_IMAGE = 1,
        /// Input buffers hold each tensor as a full column-major matrix.
        EXPAND_TENSOR_IN_BUFFER = 2,
        /// The output buffer has the same border as the input buffer.
        USE_OUTPUT_BORDER = 3,
        /// Keep the output sizes; processed dimensions may change length.
        DONT_RESIZE_OUTPUT = 4,
        /// Always copy input lines into a buffer.
        USE_INPUT_BUFFER = 5,
        /// Always write output lines to a buffer.
        USE_OUTPUT_BUFFER = 6,
        /// The filter may read and write the same memory.
        CAN_WORK_IN_PLACE = 7,
        /// With a complex buffer type and a real output, keep only the real part.
        USE_REAL_COMPONENT_OF_OUTPUT = 8,
    }
}

/// What a [`SeparableLineFilter`] gets for each line.
#[derive(Debug)]
pub struct SeparableLineFilterParameters<'a> {
    /// The input line. Its border pixels are filled according to the boundary condition.
    pub in_buffer: &'a LineBuffer,
    pub out_buffer: &'a LineBuffer,
    /// Dimension processed in this pass.
    pub dimension: usize,
    /// Index of this pass, counting from 0.
    pub pass: usize,
    pub n_passes: usize,
    /// Coordinates of the first pixel of the line. The entry for `dimension` is 0.
    pub position: &'a [usize],
    pub tensor_to_spatial: bool,
    pub thread: usize,
}

/// A 1D operation driven by [`separable`].
pub trait SeparableLineFilter: Sync {
    fn filter(&self, params: &SeparableLineFilterParameters<'_>) -> Result<()>;

    /// Called once before processing starts, with the number of threads that will call `filter`.
    fn set_number_of_threads(&mut self, _threads: usize) -> Result<()> {
        Ok(())
    }

    /// Estimated cost of one line. The default fits a convolution with a `2 * border + 1` kernel.
    fn get_number_of_operations(
        &self,
        line_length: usize,
        n_tensor_elements: usize,
        border: usize,
        _processing_dim: usize,
    ) -> usize {
        line_length * n_tensor_elements * 2 * (2 * border + 1)
    }
}

/// One pass over all lines of `input` along `dim`, writing to `output`.
struct Pass<'a> {
    input: Image,
    output: Image,
    dim: usize,
    index: usize,
    count: usize,
    border: usize,
    bc: BoundaryCondition,
    in_buffer_type: DataType,
    out_buffer_type: DataType,
    look_up_table: Option<&'a [isize]>,
}

impl Pass<'_> {
    fn run(
        &self,
        filter: &dyn SeparableLineFilter,
        n_threads: usize,
        options: SeparableOptions,
        tensor_to_spatial: bool,
    ) -> Result<()> {
        let (input, output, dim) = (&self.input, &self.output, self.dim);
        let in_length = input.sizes()[dim];
        let out_length = output.sizes()[dim];
        let out_border = if options.contains(SeparableOptions::USE_OUTPUT_BORDER) {
            self.border
        } else {
            0
        };

        let mut in_use_buffer = input.data_type() != self.in_buffer_type
            || self.look_up_table.is_some()
            || self.border > 0
            || options.contains(SeparableOptions::USE_INPUT_BUFFER);
        let out_use_buffer = output.data_type() != self.out_buffer_type
            || out_border > 0
            || options.contains(SeparableOptions::USE_OUTPUT_BUFFER);
        if !in_use_buffer && !out_use_buffer && input.sample_ptr(0) == output.sample_ptr(0) {
            in_use_buffer = !options.contains(SeparableOptions::CAN_WORK_IN_PLACE);
        }
        let real_component = out_use_buffer
            && self.out_buffer_type.is_complex()
            && !output.data_type().is_complex()
            && options.contains(SeparableOptions::USE_REAL_COMPONENT_OF_OUTPUT);

        let n_lines = output.number_of_pixels() / out_length;
        let (per_thread, used_threads) = split_evenly(n_lines, n_threads);
        log::trace!(
            "separable pass {} of {}: dimension {dim}, {in_length} -> {out_length} pixels, border {}, \
             input buffer: {in_use_buffer}, output buffer: {out_use_buffer}, {used_threads} thread(s)",
            self.index + 1,
            self.count,
            self.border,
        );

        let work = |thread: usize| -> Result<()> {
            let mut scratch: Vec<DataBlock> = Vec::new();
            let mut in_buffer = if in_use_buffer {
                let tensor_length = self.look_up_table.map_or(input.tensor_elements(), <[isize]>::len);
                let (block, buffer) = scratch_line(self.in_buffer_type, tensor_length, in_length, self.border)?;
                scratch.push(block);
                buffer
            } else {
                image_line(input, 0, dim, in_length)
            };
            let mut out_buffer = if out_use_buffer {
                let (block, buffer) =
                    scratch_line(self.out_buffer_type, output.tensor_elements(), out_length, out_border)?;
                scratch.push(block);
                buffer
            } else {
                image_line(output, 0, dim, out_length)
            };

            for position in Odometer::lines(output.sizes(), dim).window(thread * per_thread, per_thread) {
                let coords = to_isize(&position);
                let in_line = input.raw_line(input.offset_of(&coords), dim);
                let out_line = output.raw_line(output.offset_of(&coords), dim);
                if in_use_buffer {
                    // SAFETY: the image line is inside the input view and the scratch line
                    // holds `in_length` pixels plus `border` on either side.
                    unsafe {
                        copy_buffer(in_line, in_buffer.raw(), in_length, input.tensor_elements(), self.look_up_table);
                        expand_buffer(
                            in_buffer.raw(),
                            in_length,
                            in_buffer.tensor_length,
                            self.border,
                            self.border,
                            self.bc,
                        )?;
                    }
                } else {
                    in_buffer.set_origin(in_line);
                }
                if !out_use_buffer {
                    out_buffer.set_origin(out_line);
                }

                filter.filter(&SeparableLineFilterParameters {
                    in_buffer: &in_buffer,
                    out_buffer: &out_buffer,
                    dimension: dim,
                    pass: self.index,
                    n_passes: self.count,
                    position: &position,
                    tensor_to_spatial,
                    thread,
                })?;

                if out_use_buffer {
                    let source = if real_component {
                        RawLine::new(
                            out_buffer.ptr,
                            self.out_buffer_type.real(),
                            out_buffer.stride * 2,
                            out_buffer.tensor_stride * 2,
                        )
                    } else {
                        out_buffer.raw()
                    };
                    // SAFETY: each thread writes only the output lines in its window.
                    unsafe { copy_buffer(source, out_line, out_length, output.tensor_elements(), None) };
                }
            }
            Ok(())
        };
        run_threads(used_threads, work)
    }
}

/// Input header and output setup shared by both entry points.
struct Prepared {
    input: Image,
    output: Image,
    out_sizes: Vec<usize>,
    look_up_table: Option<Vec<isize>>,
    tensor_to_spatial: bool,
}

/// Validates sizes, reforges `out`, and returns working headers for input and output.
///
/// `processed(d)` tells whether dimension `d` may change size.
fn prepare(
    input: &Image,
    out: &mut Image,
    out_image_type: DataType,
    options: SeparableOptions,
    processed: impl Fn(usize) -> bool,
) -> Result<Prepared> {
    let n_dims = input.dimensionality();
    let mut working = input.clone();
    let pixel_size = input.pixel_size().to_vec();
    let mut color_space = input.color_space().to_string();
    if out.is_forged() && out.aliases(input) {
        out.strip();
    }

    let out_sizes = if options.contains(SeparableOptions::DONT_RESIZE_OUTPUT) {
        let out_sizes = out.sizes().to_vec();
        if out_sizes.len() != n_dims {
            return Err(Error::DimensionalityMismatch(out_sizes.len(), n_dims));
        }
        if (0..n_dims).any(|d| !processed(d) && input.sizes()[d] != out_sizes[d]) {
            return Err(Error::parameter(
                "output size must match input size for dimensions not being processed",
            ));
        }
        out_sizes
    } else {
        input.sizes().to_vec()
    };

    let mut out_tensor = input.tensor();
    let mut look_up_table = None;
    let mut tensor_to_spatial = false;
    if options.contains(SeparableOptions::AS_SCALAR_IMAGE) {
        if !input.is_scalar() {
            working.tensor_to_spatial();
            tensor_to_spatial = true;
        }
    } else if options.contains(SeparableOptions::EXPAND_TENSOR_IN_BUFFER) && !input.tensor().has_normal_order() {
        look_up_table = Some(input.tensor().look_up_table());
        out_tensor = Tensor::matrix(input.tensor().rows(), input.tensor().columns());
        color_space.clear();
    }

    out.reforge(&out_sizes, out_tensor.elements(), out_image_type)?;
    out.reshape_tensor(out_tensor)?;
    out.set_pixel_size(pixel_size);
    if !color_space.is_empty() {
        out.set_color_space(color_space);
    }

    let mut output = out.clone();
    if tensor_to_spatial {
        output.tensor_to_spatial();
    }
    Ok(Prepared {
        input: working,
        out_sizes: output.sizes().to_vec(),
        output,
        look_up_table,
        tensor_to_spatial,
    })
}

/// Applies `line_filter` along each dimension marked in `process`.
///
/// # Arguments
/// * `process` - Dimensions to filter along; empty means all
/// * `border` - Margin added to input lines, per dimension or one for all
/// * `bc` - Boundary condition that fills the margin, per dimension or one for all
/// * `buffer_type` - Sample type of all line buffers and of intermediate images
///
/// When no dimension is processed the input is copied to `out`.
#[allow(clippy::too_many_arguments)]
pub fn separable(
    input: &Image,
    out: &mut Image,
    buffer_type: DataType,
    out_image_type: DataType,
    process: &[bool],
    border: &[usize],
    bc: &[BoundaryCondition],
    line_filter: &mut dyn SeparableLineFilter,
    options: SeparableOptions,
) -> Result<()> {
    input.check_forged()?;
    let n_dims = input.dimensionality();
    if n_dims == 0 {
        *out = input.copy()?;
        return Ok(());
    }
    let mut process = if process.is_empty() {
        vec![true; n_dims]
    } else if process.len() != n_dims {
        return Err(Error::ArrayWrongLength {
            expected: n_dims,
            actual: process.len(),
        });
    } else {
        process.to_vec()
    };
    let mut border = if border.is_empty() { vec![0] } else { border.to_vec() };
    array_use_parameter(&mut border, n_dims)?;
    let mut bc = bc.to_vec();
    if border.iter().any(|&b| b > 0) {
        boundary_array_use_parameter(&mut bc, n_dims)?;
    } else {
        bc = vec![BoundaryCondition::default(); n_dims];
    }

    let mut in_sizes = input.sizes().to_vec();
    let Prepared {
        input: working,
        output,
        out_sizes,
        look_up_table,
        tensor_to_spatial,
    } = prepare(input, out, out_image_type, options, |d| process[d])?;

    for d in 0..n_dims {
        if in_sizes[d] == 1 && out_sizes[d] == 1 {
            process[d] = false;
        }
    }
    if tensor_to_spatial {
        in_sizes = working.sizes().to_vec();
        process.push(false);
        border.push(0);
        bc.push(BoundaryCondition::default());
    }

    // Smallest stride first; with resizing, dimensions that shrink the image go first.
    let mut order: Vec<usize> = (0..process.len()).filter(|&d| process[d]).collect();
    if order.is_empty() {
        log::debug!("separable: no dimension to process, copying input");
        let mut output = output;
        return match &look_up_table {
            Some(table) => output.copy_from_with_look_up_table(&working, table),
            None => output.copy_from(&working),
        };
    }
    order.sort_by_key(|&d| working.strides()[d].unsigned_abs());
    if options.contains(SeparableOptions::DONT_RESIZE_OUTPUT) {
        let grow = |d: usize| out_sizes[d] as f64 / in_sizes[d] as f64;
        order.sort_by(|&a, &b| grow(a).total_cmp(&grow(b)));
    }

    // Passes other than the last write to `output` if it has the buffer type and never has to
    // hold a dimension before it shrinks; otherwise they use an intermediate image.
    let mut use_intermediate = output.data_type() != buffer_type;
    let mut interm_sizes = out_sizes.clone();
    for &d in order.iter().skip(1) {
        if in_sizes[d] > out_sizes[d] {
            interm_sizes[d] = in_sizes[d];
            use_intermediate = true;
        }
    }
    let intermediate = if use_intermediate && order.len() > 1 {
        Some(Image::new(&interm_sizes, output.tensor_elements(), buffer_type)?)
    } else {
        None
    };

    let allow_threads = !options.contains(SeparableOptions::NO_MULTI_THREADING);
    let mut max_lines = 0;
    let mut sizes = in_sizes.clone();
    let mut operations = 0;
    for &d in &order {
        sizes[d] = out_sizes[d];
        let n_lines = sizes.iter().product::<usize>() / sizes[d];
        max_lines = max_lines.max(n_lines);
        if n_lines > 1 {
            operations +=
                n_lines * line_filter.get_number_of_operations(sizes[d], working.tensor_elements(), border[d], d);
        }
    }
    let n_threads = thread_count(allow_threads, max_lines, || operations);
    log::debug!(
        "separable: order {order:?}, intermediate: {}, {n_threads} thread(s)",
        intermediate.is_some()
    );

    line_filter.set_number_of_threads(n_threads)?;
    let filter: &dyn SeparableLineFilter = line_filter;

    let n_passes = order.len();
    let mut previous = working;
    for (index, &dim) in order.iter().enumerate() {
        let mut sizes = previous.sizes().to_vec();
        sizes[dim] = out_sizes[dim];
        let mut target = match &intermediate {
            Some(intermediate) if index + 1 < n_passes => intermediate.clone(),
            _ => output.clone(),
        };
        target.shift_origin_unsafe(0, &sizes);
        let pass = Pass {
            input: previous,
            output: target,
            dim,
            index,
            count: n_passes,
            border: border[dim],
            bc: bc[dim],
            in_buffer_type: buffer_type,
            out_buffer_type: buffer_type,
            // only the first pass reads the compact tensor
            look_up_table: if index == 0 { look_up_table.as_deref() } else { None },
        };
        pass.run(filter, n_threads, options, tensor_to_spatial)?;
        previous = pass.output;
    }
    Ok(())
}

/// Applies `line_filter` along `processing_dim` only, with separate input and output buffer types.
#[allow(clippy::too_many_arguments)]
pub fn one_dimensional_line_filter(
    input: &Image,
    out: &mut Image,
    in_buffer_type: DataType,
    out_buffer_type: DataType,
    out_image_type: DataType,
    processing_dim: usize,
    border: usize,
    bc: BoundaryCondition,
    line_filter: &mut dyn SeparableLineFilter,
    options: SeparableOptions,
) -> Result<()> {
    input.check_forged()?;
    if processing_dim >= input.dimensionality() {
        return Err(Error::parameter(format!(
            "processing dimension {processing_dim} out of range"
        )));
    }
    let in_length = input.sizes()[processing_dim];
    let Prepared {
        input: working,
        output,
        out_sizes,
        look_up_table,
        tensor_to_spatial,
    } = prepare(input, out, out_image_type, options, |d| d == processing_dim)?;
    let out_length = out_sizes[processing_dim];
    if in_length == 1 && out_length == 1 {
        return Err(Error::precondition("filtering dimension must have a size larger than 1"));
    }

    let n_lines = working.number_of_pixels() / in_length;
    let n_threads = thread_count(!options.contains(SeparableOptions::NO_MULTI_THREADING), n_lines, || {
        if n_lines > 1 {
            n_lines
                * line_filter.get_number_of_operations(
                    out_length,
                    working.tensor_elements(),
                    border,
                    processing_dim,
                )
        } else {
            0
        }
    });
    let (_, n_threads) = split_evenly(n_lines, n_threads);
    line_filter.set_number_of_threads(n_threads)?;

    Pass {
        input: working,
        output,
        dim: processing_dim,
        index: 0,
        count: 1,
        border,
        bc,
        in_buffer_type,
        out_buffer_type,
        look_up_table: look_up_table.as_deref(),
    }
    .run(&*line_filter, n_threads, options, tensor_to_spatial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array, IxDyn};
    use num_complex::Complex64;
    use std::sync::Mutex;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn image_f32(values: ndarray::ArrayD<f32>) -> Image {
        Image::from_array(values.view()).unwrap()
    }

    /// Three-tap sum `in[-1] + in[0] + in[1]`, tensor element by element.
    struct BoxSum;

    impl SeparableLineFilter for BoxSum {
        fn filter(&self, params: &SeparableLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer.typed::<f64>()?;
            let output = params.out_buffer.typed::<f64>()?;
            for p in 0..output.length() as isize {
                for t in 0..output.tensor_length() {
                    output.set(p, t, input.get(p - 1, t) + input.get(p, t) + input.get(p + 1, t));
                }
            }
            Ok(())
        }
    }

    /// Copies the input line, recording which dimensions were visited in which order.
    #[derive(Default)]
    struct Recorder {
        passes: Mutex<Vec<(usize, usize)>>,
    }

    impl SeparableLineFilter for Recorder {
        fn filter(&self, params: &SeparableLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer.typed::<f64>()?;
            let output = params.out_buffer.typed::<f64>()?;
            for p in 0..output.length() as isize {
                for t in 0..output.tensor_length() {
                    output.set(p, t, input.get(p, t));
                }
            }
            let mut passes = self.passes.lock().unwrap();
            if !passes.contains(&(params.pass, params.dimension)) {
                passes.push((params.pass, params.dimension));
            }
            Ok(())
        }
    }

    /// Takes every other pixel, halving the line.
    struct Subsample;

    impl SeparableLineFilter for Subsample {
        fn filter(&self, params: &SeparableLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer.typed::<f64>()?;
            let output = params.out_buffer.typed::<f64>()?;
            for p in 0..output.length() as isize {
                output.set(p, 0, input.get(2 * p, 0));
            }
            Ok(())
        }
    }

    #[test]
    fn test_box_sum_with_mirror_boundary() {
        init();
        let input = image_f32(arr1(&[1.0f32, 2.0, 3.0, 4.0]).into_dyn());
        let mut out = Image::default();
        separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SFloat,
            &[],
            &[1],
            &[BoundaryCondition::SymmetricMirror],
            &mut BoxSum,
            SeparableOptions::NONE,
        )
        .unwrap();
        // mirrored edges: [1] 1 2 3 4 [4]
        assert_eq!(out.to_array::<f32>().unwrap(), arr1(&[4.0f32, 6.0, 9.0, 11.0]).into_dyn());
    }

    #[test]
    fn test_two_dimensional_box_sum_is_separable() {
        let input = image_f32(Array::from_elem(IxDyn(&[5, 4]), 1.0f32));
        let mut out = Image::default();
        separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::DFloat,
            &[],
            &[1],
            &[BoundaryCondition::AddZeros],
            &mut BoxSum,
            SeparableOptions::NONE,
        )
        .unwrap();
        // corners see 2x2 ones, edges 2x3, the interior 3x3
        assert_eq!(out.sample_f64(&[0, 0], 0).unwrap(), 4.0);
        assert_eq!(out.sample_f64(&[2, 0], 0).unwrap(), 6.0);
        assert_eq!(out.sample_f64(&[2, 2], 0).unwrap(), 9.0);
        assert_eq!(out.data_type(), DataType::DFloat);
    }

    #[test]
    fn test_processing_order_follows_strides() {
        let mut input = image_f32(Array::from_elem(IxDyn(&[6, 7]), 2.0f32));
        input.permute_dimensions(&[1, 0]).unwrap();
        let mut out = Image::default();
        let mut recorder = Recorder::default();
        separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SFloat,
            &[],
            &[0],
            &[],
            &mut recorder,
            SeparableOptions::NO_MULTI_THREADING,
        )
        .unwrap();
        // after the permutation, dimension 1 has the unit stride
        assert_eq!(*recorder.passes.lock().unwrap(), vec![(0, 1), (1, 0)]);
        assert_eq!(out.to_array::<f32>().unwrap(), input.to_array::<f32>().unwrap());
    }

    #[test]
    fn test_unprocessed_dimensions_and_identity_copy() {
        let input = image_f32(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn());
        let mut out = Image::default();
        let mut recorder = Recorder::default();
        separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SFloat,
            &[false, false],
            &[],
            &[],
            &mut recorder,
            SeparableOptions::NONE,
        )
        .unwrap();
        assert!(recorder.passes.lock().unwrap().is_empty());
        assert_eq!(out.to_array::<f32>().unwrap(), input.to_array::<f32>().unwrap());

        let result = separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SFloat,
            &[true],
            &[],
            &[],
            &mut recorder,
            SeparableOptions::NONE,
        );
        assert_eq!(result, Err(Error::ArrayWrongLength { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_dont_resize_output_shrinks_first() {
        let values: Vec<f32> = (0..48).map(|v| v as f32).collect();
        let input = image_f32(Array::from_shape_vec(IxDyn(&[8, 6]), values).unwrap());
        let mut out = Image::new(&[4, 6], 1, DataType::SFloat).unwrap();
        separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SFloat,
            &[true, false],
            &[],
            &[],
            &mut Subsample,
            SeparableOptions::DONT_RESIZE_OUTPUT,
        )
        .unwrap();
        assert_eq!(out.sizes(), &[4, 6]);
        for x in 0..4 {
            for y in 0..6 {
                assert_eq!(out.sample_f64(&[x, y], 0).unwrap(), input.sample_f64(&[2 * x, y], 0).unwrap());
            }
        }

        let mut wrong = Image::new(&[4, 5], 1, DataType::SFloat).unwrap();
        let result = separable(
            &input,
            &mut wrong,
            DataType::DFloat,
            DataType::SFloat,
            &[true, false],
            &[],
            &[],
            &mut Subsample,
            SeparableOptions::DONT_RESIZE_OUTPUT,
        );
        assert!(matches!(result, Err(Error::Parameter(_))));
    }

    #[test]
    fn test_as_scalar_image_leaves_tensor_dimension_alone() {
        // two pixels along x, three tensor elements each
        let a = arr2(&[[1.0f32, 10.0, 100.0], [2.0, 20.0, 200.0]]).into_dyn();
        let input = Image::from_tensor_array(a.view()).unwrap();
        let mut out = Image::default();
        let mut recorder = Recorder::default();
        separable(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SFloat,
            &[],
            &[],
            &[],
            &mut recorder,
            SeparableOptions::AS_SCALAR_IMAGE,
        )
        .unwrap();
        assert_eq!(*recorder.passes.lock().unwrap(), vec![(0, 0)]);
        assert_eq!(out.tensor_elements(), 3);
        assert_eq!(out.to_array::<f32>().unwrap(), a);
    }

    #[test]
    fn test_in_place_output_is_decoupled() {
        let input = image_f32(arr1(&[1.0f32, 2.0, 3.0, 4.0]).into_dyn());
        let mut out = input.clone();
        separable(
            &input,
            &mut out,
            DataType::SFloat,
            DataType::SFloat,
            &[],
            &[1],
            &[BoundaryCondition::AddZeros],
            &mut BoxSumF32,
            SeparableOptions::NONE,
        )
        .unwrap();
        assert!(!out.shares_data(&input));
        assert_eq!(out.to_array::<f32>().unwrap(), arr1(&[3.0f32, 6.0, 9.0, 7.0]).into_dyn());
        assert_eq!(input.to_array::<f32>().unwrap(), arr1(&[1.0f32, 2.0, 3.0, 4.0]).into_dyn());
    }

    struct BoxSumF32;

    impl SeparableLineFilter for BoxSumF32 {
        fn filter(&self, params: &SeparableLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer.typed::<f32>()?;
            let output = params.out_buffer.typed::<f32>()?;
            for p in 0..output.length() as isize {
                output.set(p, 0, input.get(p - 1, 0) + input.get(p, 0) + input.get(p + 1, 0));
            }
            Ok(())
        }
    }

    #[test]
    fn test_one_dimensional_filter_with_real_component() {
        struct ToComplex;
        impl SeparableLineFilter for ToComplex {
            fn filter(&self, params: &SeparableLineFilterParameters<'_>) -> Result<()> {
                let input = params.in_buffer.typed::<f64>()?;
                let output = params.out_buffer.typed::<Complex64>()?;
                for p in 0..output.length() as isize {
                    output.set(p, 0, Complex64::new(input.get(p, 0), -5.0));
                }
                Ok(())
            }
        }
        let input = image_f32(arr2(&[[1.0f32, -2.0], [3.0, -4.0]]).into_dyn());
        let mut out = Image::default();
        one_dimensional_line_filter(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::DComplex,
            DataType::SFloat,
            1,
            0,
            BoundaryCondition::default(),
            &mut ToComplex,
            SeparableOptions::USE_REAL_COMPONENT_OF_OUTPUT,
        )
        .unwrap();
        assert_eq!(out.to_array::<f32>().unwrap(), arr2(&[[1.0f32, -2.0], [3.0, -4.0]]).into_dyn());

        let flat = image_f32(Array::from_elem(IxDyn(&[1, 5]), 1.0f32));
        let result = one_dimensional_line_filter(
            &flat,
            &mut out,
            DataType::DFloat,
            DataType::DFloat,
            DataType::SFloat,
            0,
            0,
            BoundaryCondition::default(),
            &mut Recorder::default(),
            SeparableOptions::NONE,
        );
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert!(matches!(
            one_dimensional_line_filter(
                &flat,
                &mut out,
                DataType::DFloat,
                DataType::DFloat,
                DataType::SFloat,
                2,
                0,
                BoundaryCondition::default(),
                &mut Recorder::default(),
                SeparableOptions::NONE,
            ),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn test_threading_is_deterministic() {
        let values: Vec<f32> = (0..300 * 250).map(|v| (v % 97) as f32).collect();
        let input = image_f32(Array::from_shape_vec(IxDyn(&[300, 250]), values).unwrap());
        let run = |options| {
            let mut out = Image::default();
            separable(
                &input,
                &mut out,
                DataType::DFloat,
                DataType::SFloat,
                &[],
                &[1],
                &[BoundaryCondition::Periodic],
                &mut BoxSum,
                options,
            )
            .unwrap();
            out.to_array::<f32>().unwrap()
        };
        assert_eq!(run(SeparableOptions::NO_MULTI_THREADING), run(SeparableOptions::NONE));
    }
}
