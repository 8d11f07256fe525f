//! The scan framework: pixel-wise processing of any number of images.
//!
//! [`scan`] singleton-expands its inputs to a common size, (re)allocates the
//! outputs to that size, and calls a [`ScanLineFilter`] once per image line.
//! When every image can be walked with a single stride in the same order, the
//! images are flattened and the "line" is the whole image, cut into sections
//! per thread and, when buffers are used, into sections of at most
//! [`MAX_BUFFER_SIZE`] pixels.
//!
//! ## Buffers
//!
//! | Situation | Buffer |
//! |-----------|--------|
//! | Image type equals buffer type | Line points straight into the image |
//! | Image type differs | Samples cast into a scratch line, and back for outputs |
//! | Input stride 0 along the line | Scratch holds one pixel, buffer stride is 0 |
//! | `EXPAND_TENSOR_IN_BUFFER`, non-standard tensor | Input tensor expanded to a full matrix |
//! | `NOT_IN_PLACE`, output aliases an unbuffered input | Output gets a scratch line |

use crate::buffer::{copy_buffer, LineBuffer};
use crate::config::{option_set, MAX_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::image::{to_isize, DataBlock, DataType, Image, Odometer, Tensor};

use super::{
    image_line, optimal_processing_dim, run_threads, scratch_line, scratch_pixel, singleton_expanded_size,
    singleton_expanded_tensor_elements, split_evenly, thread_count,
};

option_set! {
    /// Options for [`scan`].
    ScanOptions {
        /// Call the line filter from one thread only.
        NO_MULTI_THREADING = 0,
        /// The line filter reads `position`, so images are never flattened to 1D.
        NEED_COORDINATES = 1,
        /// The tensor becomes an extra spatial dimension and the line filter only sees scalar pixels.
        TENSOR_AS_SPATIAL_DIM = 2,
        /// Input buffers hold each tensor as a full column-major matrix.
        EXPAND_TENSOR_IN_BUFFER = 3,
        /// All inputs must have the same sizes.
        NO_SINGLETON_EXPANSION = 4,
        /// Writing to an output buffer never changes an input buffer.
        NOT_IN_PLACE = 5,
    }
}

/// What a [`ScanLineFilter`] gets for each line.
///
/// With `tensor_to_spatial` set, the last dimension of `position` is the
/// tensor dimension.
#[derive(Debug)]
pub struct ScanLineFilterParameters<'a> {
    /// One buffer per input image.
    pub in_buffer: &'a [LineBuffer],
    /// One buffer per output image. The filter must write every pixel.
    pub out_buffer: &'a [LineBuffer],
    /// Number of pixels in every buffer.
    pub buffer_length: usize,
    /// Dimension the line runs along.
    pub dimension: usize,
    /// Coordinates of the first pixel of the line.
    pub position: &'a [usize],
    pub tensor_to_spatial: bool,
    /// Index of the calling thread, below the count given to `set_number_of_threads`.
    pub thread: usize,
}

/// A pixel-wise operation driven by [`scan`].
pub trait ScanLineFilter: Sync {
    /// Processes one line.
    fn filter(&self, params: &ScanLineFilterParameters<'_>) -> Result<()>;

    /// Called once before processing starts, with the number of threads that will call `filter`.
    fn set_number_of_threads(&mut self, _threads: usize) -> Result<()> {
        Ok(())
    }

    /// Estimated cost per pixel, used to decide whether threads are worth starting.
    fn get_number_of_operations(&self, n_input: usize, n_output: usize, n_tensor_elements: usize) -> usize {
        n_input.max(n_output) * n_tensor_elements
    }
}

fn check_length(actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ArrayWrongLength { expected, actual })
    }
}

/// Color space of the first color input with `n_tensor_elements` tensor elements.
fn output_color_space(inputs: &[Image], n_tensor_elements: usize) -> String {
    inputs
        .iter()
        .find(|image| image.is_color() && image.tensor_elements() == n_tensor_elements)
        .map(|image| image.color_space().to_string())
        .unwrap_or_default()
}

/// True if all images walk their pixels with one stride, in the same order.
fn can_flatten(images: &[Image]) -> bool {
    images.iter().all(Image::has_simple_stride)
        && images.iter().skip(1).all(|image| image.same_dimension_order(&images[0]))
}

/// Runs `line_filter` over every line of the singleton-expanded inputs and the outputs.
///
/// # Arguments
/// * `inputs` - Forged input images. May be empty.
/// * `outputs` - Output images. Reforged to the expanded input size, with
///   `n_tensor_elements[i]` tensor elements and type `out_image_types[i]`. An
///   output that shares data with an input gets new storage. With no inputs,
///   the first output's sizes drive the scan.
/// * `in_buffer_types`, `out_buffer_types` - Sample type the filter sees for each image
/// * `n_tensor_elements` - Ignored with [`ScanOptions::TENSOR_AS_SPATIAL_DIM`]
///
/// Outputs get the pixel size of the first input that has one, and the color
/// space of the first color input with a matching number of tensor elements.
#[allow(clippy::too_many_arguments)]
pub fn scan(
    inputs: &[Image],
    outputs: &mut [Image],
    in_buffer_types: &[DataType],
    out_buffer_types: &[DataType],
    out_image_types: &[DataType],
    n_tensor_elements: &[usize],
    line_filter: &mut dyn ScanLineFilter,
    options: ScanOptions,
) -> Result<()> {
    let n_in = inputs.len();
    let n_out = outputs.len();
    if n_in == 0 && n_out == 0 {
        return Ok(());
    }
    check_length(in_buffer_types.len(), n_in)?;
    check_length(out_buffer_types.len(), n_out)?;
    check_length(out_image_types.len(), n_out)?;
    let as_spatial = options.contains(ScanOptions::TENSOR_AS_SPATIAL_DIM);
    if !as_spatial {
        check_length(n_tensor_elements.len(), n_out)?;
    }

    // Quick copies: from here on the caller's input headers are never touched.
    let mut pixel_size = Vec::new();
    let mut input = Vec::with_capacity(n_in);
    for image in inputs {
        image.check_forged()?;
        if pixel_size.is_empty() && !image.pixel_size().is_empty() {
            pixel_size = image.pixel_size().to_vec();
        }
        input.push(image.clone());
    }
    let tensor_to_spatial = as_spatial && input.iter().any(|image| !image.is_scalar());

    // Singleton expansion
    let mut sizes: Vec<usize>;
    let mut tensor_size = 1;
    let mut out_tensor = Tensor::scalar();
    match input.as_mut_slice() {
        [] => {
            sizes = outputs[0].sizes().to_vec();
            tensor_size = outputs[0].tensor_elements();
        }
        [single] => {
            sizes = single.sizes().to_vec();
            tensor_size = single.tensor_elements();
            out_tensor = single.tensor();
        }
        many if options.contains(ScanOptions::NO_SINGLETON_EXPANSION) => {
            sizes = many[0].sizes().to_vec();
            for image in many.iter() {
                if image.sizes() != sizes.as_slice() {
                    return Err(Error::SizesDontMatch(image.sizes().to_vec(), sizes));
                }
                if out_tensor.is_scalar() {
                    out_tensor = image.tensor();
                }
            }
        }
        many => {
            sizes = singleton_expanded_size(many)?;
            if tensor_to_spatial {
                tensor_size = singleton_expanded_tensor_elements(many)?;
            }
            for image in many.iter_mut() {
                if image.sizes() != sizes.as_slice() {
                    image.expand_singleton_dimensions(&sizes)?;
                }
                if out_tensor.is_scalar() {
                    out_tensor = image.tensor();
                }
                if tensor_to_spatial && image.tensor_elements() != tensor_size {
                    image.expand_singleton_tensor(tensor_size)?;
                }
            }
        }
    }

    let color_spaces: Vec<String> = if n_in == 0 {
        Vec::new()
    } else if as_spatial {
        vec![output_color_space(inputs, tensor_size)]
    } else {
        n_tensor_elements
            .iter()
            .map(|&n| output_color_space(inputs, n))
            .collect()
    };

    // Outputs
    for (ii, out) in outputs.iter_mut().enumerate() {
        let n_tensor = if as_spatial { tensor_size } else { n_tensor_elements[ii] };
        if out.is_forged() && out.is_overlapping_view(&input) {
            out.strip();
        }
        out.reforge(&sizes, n_tensor, out_image_types[ii])?;
    }
    let mut output: Vec<Image> = outputs.to_vec();

    if tensor_to_spatial {
        log::debug!("scan: tensor of {tensor_size} elements treated as a spatial dimension");
        input.iter_mut().for_each(Image::tensor_to_spatial);
        output.iter_mut().for_each(Image::tensor_to_spatial);
        sizes.push(tensor_size);
    }

    // Can all images be walked as one long line?
    let mut scan_1d = sizes.len() <= 1;
    if !scan_1d && !options.contains(ScanOptions::NEED_COORDINATES) {
        scan_1d = can_flatten(&input) && can_flatten(&output);
        if scan_1d && n_in > 0 && n_out > 0 {
            scan_1d = input[0].same_dimension_order(&output[0]);
        }
    }
    if scan_1d && sizes.len() != 1 {
        for image in input.iter_mut().chain(output.iter_mut()) {
            image.flatten()?;
        }
        sizes = vec![sizes.iter().product()];
    }

    // Buffers
    let mut in_use_buffer: Vec<bool> = input
        .iter()
        .zip(in_buffer_types)
        .map(|(image, &buffer_type)| image.data_type() != buffer_type)
        .collect();
    let mut look_up_tables: Vec<Option<Vec<isize>>> = vec![None; n_in];
    if options.contains(ScanOptions::EXPAND_TENSOR_IN_BUFFER) && !as_spatial {
        for (ii, image) in input.iter().enumerate() {
            if !image.tensor().has_normal_order() {
                in_use_buffer[ii] = true;
                look_up_tables[ii] = Some(image.tensor().look_up_table());
            }
        }
    }
    let out_use_buffer: Vec<bool> = output
        .iter()
        .zip(out_buffer_types)
        .map(|(out, &buffer_type)| {
            out.data_type() != buffer_type
                || (options.contains(ScanOptions::NOT_IN_PLACE)
                    && input
                        .iter()
                        .zip(&in_use_buffer)
                        .any(|(image, &buffered)| !buffered && image.aliases(out)))
        })
        .collect();
    let need_buffers = in_use_buffer.iter().chain(&out_use_buffer).any(|&b| b);

    // Work split
    let reference = input.first().or(output.first()).ok_or(Error::ArrayEmpty)?;
    let tensor_elements = reference.tensor_elements();
    let allow_threads = !options.contains(ScanOptions::NO_MULTI_THREADING);
    let processing_dim;
    let line_length;
    let buffer_size;
    let per_thread;
    let n_threads;
    if scan_1d {
        processing_dim = 0;
        let total = sizes[0];
        let threads = thread_count(allow_threads, total, || {
            total * line_filter.get_number_of_operations(n_in, n_out, tensor_elements)
        });
        (line_length, n_threads) = split_evenly(total, threads);
        per_thread = line_length;
        buffer_size = if need_buffers && line_length > MAX_BUFFER_SIZE {
            let sections = line_length.div_ceil(MAX_BUFFER_SIZE);
            line_length.div_ceil(sections)
        } else {
            line_length
        };
    } else {
        processing_dim = optimal_processing_dim(reference)?;
        line_length = sizes[processing_dim];
        buffer_size = line_length;
        let n_lines = sizes.iter().product::<usize>() / line_length;
        let threads = thread_count(allow_threads, n_lines, || {
            n_lines * line_length * line_filter.get_number_of_operations(n_in, n_out, tensor_elements)
        });
        (per_thread, n_threads) = split_evenly(n_lines, threads);
    }
    log::debug!(
        "scan: {n_in} in, {n_out} out, sizes {sizes:?}, processing dimension {processing_dim}, \
         1D: {scan_1d}, buffers: {need_buffers}, {n_threads} thread(s)"
    );

    line_filter.set_number_of_threads(n_threads)?;
    let filter: &dyn ScanLineFilter = line_filter;

    let work = |thread: usize| -> Result<()> {
        // Per-thread scratch storage; the line buffers point into these blocks.
        let mut scratch: Vec<DataBlock> = Vec::new();
        let mut in_buffers: Vec<LineBuffer> = Vec::with_capacity(n_in);
        for (ii, image) in input.iter().enumerate() {
            if in_use_buffer[ii] {
                let tensor_length = look_up_tables[ii].as_ref().map_or(image.tensor_elements(), Vec::len);
                let (block, buffer) = if image.strides()[processing_dim] == 0 {
                    scratch_pixel(in_buffer_types[ii], tensor_length, buffer_size)?
                } else {
                    scratch_line(in_buffer_types[ii], tensor_length, buffer_size, 0)?
                };
                scratch.push(block);
                in_buffers.push(buffer);
            } else {
                in_buffers.push(image_line(image, 0, processing_dim, buffer_size));
            }
        }
        let mut out_buffers: Vec<LineBuffer> = Vec::with_capacity(n_out);
        for (ii, image) in output.iter().enumerate() {
            if out_use_buffer[ii] {
                let (block, buffer) = scratch_line(out_buffer_types[ii], image.tensor_elements(), buffer_size, 0)?;
                scratch.push(block);
                out_buffers.push(buffer);
            } else {
                out_buffers.push(image_line(image, 0, processing_dim, buffer_size));
            }
        }

        let sections: Box<dyn Iterator<Item = (Vec<usize>, usize)>> = if scan_1d {
            let start = thread * per_thread;
            let end = (start + per_thread).min(sizes[0]);
            Box::new(
                (start..end)
                    .step_by(buffer_size.max(1))
                    .map(move |first| (vec![first], buffer_size.min(end - first))),
            )
        } else {
            Box::new(
                Odometer::lines(&sizes, processing_dim)
                    .window(thread * per_thread, per_thread)
                    .map(move |position| (position, line_length)),
            )
        };

        for (position, length) in sections {
            let coords = to_isize(&position);
            for (ii, image) in input.iter().enumerate() {
                let line = image.raw_line(image.offset_of(&coords), processing_dim);
                let buffer = &mut in_buffers[ii];
                buffer.length = length;
                if in_use_buffer[ii] {
                    // One pixel suffices for a broadcast line.
                    let pixels = if buffer.stride == 0 { 1 } else { length };
                    // SAFETY: the source line lies in the image view, the scratch line holds `pixels` pixels.
                    unsafe {
                        copy_buffer(
                            line,
                            buffer.raw(),
                            pixels,
                            image.tensor_elements(),
                            look_up_tables[ii].as_deref(),
                        )
                    };
                } else {
                    buffer.set_origin(line);
                }
            }
            for (ii, image) in output.iter().enumerate() {
                let buffer = &mut out_buffers[ii];
                buffer.length = length;
                if !out_use_buffer[ii] {
                    buffer.set_origin(image.raw_line(image.offset_of(&coords), processing_dim));
                }
            }

            filter.filter(&ScanLineFilterParameters {
                in_buffer: &in_buffers,
                out_buffer: &out_buffers,
                buffer_length: length,
                dimension: processing_dim,
                position: &position,
                tensor_to_spatial,
                thread,
            })?;

            for (ii, image) in output.iter().enumerate() {
                if out_use_buffer[ii] {
                    let line = image.raw_line(image.offset_of(&coords), processing_dim);
                    // SAFETY: as above; each thread writes only its own lines.
                    unsafe { copy_buffer(out_buffers[ii].raw(), line, length, image.tensor_elements(), None) };
                }
            }
        }
        Ok(())
    };
    run_threads(n_threads, work)?;

    for (ii, out) in outputs.iter_mut().enumerate() {
        if tensor_to_spatial && !out_tensor.is_scalar() && out.tensor_elements() == out_tensor.elements() {
            out.reshape_tensor(out_tensor)?;
        }
        out.set_pixel_size(pixel_size.clone());
        if let Some(color_space) = color_spaces.get(if color_spaces.len() == 1 { 0 } else { ii }) {
            out.set_color_space(color_space.clone());
        }
    }
    Ok(())
}

/// Scans an output image only, for generators that fill an image.
pub fn scan_single_output(
    out: &mut Image,
    buffer_type: DataType,
    line_filter: &mut dyn ScanLineFilter,
    options: ScanOptions,
) -> Result<()> {
    let out_image_type = out.data_type();
    let n_tensor_elements = out.tensor_elements();
    scan(
        &[],
        std::slice::from_mut(out),
        &[],
        &[buffer_type],
        &[out_image_type],
        &[n_tensor_elements],
        line_filter,
        options,
    )
}

/// Scans one input image, for reductions. A mask, if given, becomes a second, binary input.
pub fn scan_single_input(
    input: &Image,
    mask: Option<&Image>,
    buffer_type: DataType,
    line_filter: &mut dyn ScanLineFilter,
    options: ScanOptions,
) -> Result<()> {
    let mut inputs = vec![input.clone()];
    let mut buffer_types = vec![buffer_type];
    if let Some(mask) = mask {
        mask.check_is_mask(input.sizes(), true)?;
        let mut mask = mask.clone();
        mask.expand_singleton_dimensions(input.sizes())?;
        buffer_types.push(mask.data_type());
        inputs.push(mask);
    }
    scan(&inputs, &mut [], &buffer_types, &[], &[], &[], line_filter, options)
}

/// One input, one output, the same buffer type for both.
#[allow(clippy::too_many_arguments)]
pub fn scan_monadic(
    input: &Image,
    out: &mut Image,
    buffer_type: DataType,
    out_image_type: DataType,
    n_tensor_elements: usize,
    line_filter: &mut dyn ScanLineFilter,
    options: ScanOptions,
) -> Result<()> {
    scan(
        std::slice::from_ref(input),
        std::slice::from_mut(out),
        &[buffer_type],
        &[buffer_type],
        &[out_image_type],
        &[n_tensor_elements],
        line_filter,
        options,
    )
}

/// Two inputs, one output.
///
/// If either input is scalar or both have the same tensor shape, tensors are
/// scanned as a spatial dimension. If they only agree in rows and columns,
/// the input tensors are expanded to full matrices in the buffers.
#[allow(clippy::too_many_arguments)]
pub fn scan_dyadic(
    in1: &Image,
    in2: &Image,
    out: &mut Image,
    in_buffer_type: DataType,
    out_buffer_type: DataType,
    out_image_type: DataType,
    line_filter: &mut dyn ScanLineFilter,
    mut options: ScanOptions,
) -> Result<()> {
    let (t1, t2) = (in1.tensor(), in2.tensor());
    let out_tensor = if t1.is_scalar() {
        options |= ScanOptions::TENSOR_AS_SPATIAL_DIM;
        t2
    } else if t2.is_scalar() || t1 == t2 {
        options |= ScanOptions::TENSOR_AS_SPATIAL_DIM;
        t1
    } else if t1.rows() == t2.rows() && t1.columns() == t2.columns() {
        options |= ScanOptions::EXPAND_TENSOR_IN_BUFFER;
        Tensor::matrix(t1.rows(), t1.columns())
    } else {
        return Err(Error::precondition("number of tensor elements doesn't match"));
    };
    scan(
        &[in1.clone(), in2.clone()],
        std::slice::from_mut(out),
        &[in_buffer_type, in_buffer_type],
        &[out_buffer_type],
        &[out_image_type],
        &[out_tensor.elements()],
        line_filter,
        options,
    )?;
    out.reshape_tensor(out_tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array, IxDyn};
    use std::sync::Mutex;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ramp(sizes: &[usize]) -> Image {
        let n: usize = sizes.iter().product();
        let array = Array::from_shape_vec(IxDyn(sizes), (0..n).map(|v| v as f32).collect()).unwrap();
        Image::from_array(array.view()).unwrap()
    }

    /// Copies the first input to the first output, sample by sample.
    struct Identity;

    impl ScanLineFilter for Identity {
        fn filter(&self, params: &ScanLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer[0].typed::<f64>()?;
            let output = params.out_buffer[0].typed::<f64>()?;
            for p in 0..params.buffer_length as isize {
                for t in 0..output.tensor_length() {
                    output.set(p, t, input.get(p, t));
                }
            }
            Ok(())
        }
    }

    /// Sums all inputs into the output, element by element.
    struct Add;

    impl ScanLineFilter for Add {
        fn filter(&self, params: &ScanLineFilterParameters<'_>) -> Result<()> {
            let output = params.out_buffer[0].typed::<f64>()?;
            let inputs: Vec<_> = params
                .in_buffer
                .iter()
                .map(|b| b.typed::<f64>())
                .collect::<Result<_>>()?;
            for p in 0..params.buffer_length as isize {
                let sum = inputs.iter().map(|line| line.get(p, 0)).sum();
                output.set(p, 0, sum);
            }
            Ok(())
        }
    }

    /// Sums the input per thread.
    #[derive(Default)]
    struct Total {
        per_thread: Vec<Mutex<f64>>,
    }

    impl ScanLineFilter for Total {
        fn filter(&self, params: &ScanLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer[0].typed::<f64>()?;
            let mask = params.in_buffer.get(1).map(|b| b.typed::<crate::image::Bin>()).transpose()?;
            let mut sum = 0.0;
            for p in 0..params.buffer_length as isize {
                if mask.as_ref().map_or(true, |m| m.get(p, 0).is_set()) {
                    sum += input.get(p, 0);
                }
            }
            *self.per_thread[params.thread].lock().unwrap() += sum;
            Ok(())
        }

        fn set_number_of_threads(&mut self, threads: usize) -> Result<()> {
            self.per_thread = (0..threads).map(|_| Mutex::new(0.0)).collect();
            Ok(())
        }
    }

    impl Total {
        fn value(&self) -> f64 {
            self.per_thread.iter().map(|m| *m.lock().unwrap()).sum()
        }
    }

    #[test]
    fn test_identity_with_type_conversion() {
        init();
        let input = ramp(&[6, 5, 4]);
        let mut out = Image::default();
        scan_monadic(&input, &mut out, DataType::DFloat, DataType::UInt16, 1, &mut Identity, ScanOptions::NONE)
            .unwrap();
        assert_eq!(out.sizes(), &[6, 5, 4]);
        assert_eq!(out.data_type(), DataType::UInt16);
        assert_eq!(out.to_array::<f32>().unwrap(), input.to_array::<f32>().unwrap());
    }

    #[test]
    fn test_identity_through_permuted_and_windowed_views() {
        let base = ramp(&[7, 9]);
        let mut input = base.window(&[1..6, 2..9]).unwrap();
        input.permute_dimensions(&[1, 0]).unwrap();
        let mut out = Image::default();
        scan_monadic(&input, &mut out, DataType::DFloat, DataType::SFloat, 1, &mut Identity, ScanOptions::NONE)
            .unwrap();
        assert_eq!(out.sizes(), &[7, 5]);
        assert_eq!(out.to_array::<f32>().unwrap(), input.to_array::<f32>().unwrap());
    }

    #[test]
    fn test_singleton_broadcast() {
        let column = ramp(&[5, 1]);
        let ones = Image::from_array(Array::from_elem(IxDyn(&[5, 7]), 1.0f32).view()).unwrap();
        let mut out = Image::default();
        scan(
            &[column.clone(), ones],
            std::slice::from_mut(&mut out),
            &[DataType::DFloat, DataType::DFloat],
            &[DataType::DFloat],
            &[DataType::SFloat],
            &[1],
            &mut Add,
            ScanOptions::NONE,
        )
        .unwrap();
        assert_eq!(out.sizes(), &[5, 7]);
        for x in 0..5 {
            for y in 0..7 {
                assert_eq!(out.sample_f64(&[x, y], 0).unwrap(), x as f64 + 1.0);
            }
        }
    }

    #[test]
    fn test_no_singleton_expansion_rejects_different_sizes() {
        let a = ramp(&[5, 1]);
        let b = ramp(&[5, 7]);
        let mut out = Image::default();
        let result = scan(
            &[a, b],
            std::slice::from_mut(&mut out),
            &[DataType::DFloat, DataType::DFloat],
            &[DataType::DFloat],
            &[DataType::SFloat],
            &[1],
            &mut Add,
            ScanOptions::NO_SINGLETON_EXPANSION,
        );
        assert!(matches!(result, Err(Error::SizesDontMatch(..))));
    }

    #[test]
    fn test_array_lengths_are_checked() {
        let a = ramp(&[3]);
        let mut out = Image::default();
        let result = scan(
            &[a],
            std::slice::from_mut(&mut out),
            &[],
            &[DataType::DFloat],
            &[DataType::SFloat],
            &[1],
            &mut Identity,
            ScanOptions::NONE,
        );
        assert_eq!(result, Err(Error::ArrayWrongLength { expected: 1, actual: 0 }));
        // nothing in, nothing out
        assert!(scan(&[], &mut [], &[], &[], &[], &[], &mut Identity, ScanOptions::NONE).is_ok());
        let unforged = Image::header(&[3], 1, DataType::UInt8);
        assert_eq!(
            scan_single_input(&unforged, None, DataType::DFloat, &mut Total::default(), ScanOptions::NONE),
            Err(Error::ImageNotForged)
        );
    }

    #[test]
    fn test_tensor_as_spatial_dim_keeps_tensor_shape_and_color() {
        let a = Array::from_shape_vec(IxDyn(&[4, 3, 3]), (0..36).map(|v| v as u8).collect()).unwrap();
        let mut input = Image::from_tensor_array(a.view()).unwrap();
        input.set_color_space("RGB");
        input.set_pixel_size(vec![0.5, 0.5]);
        let mut out = Image::default();
        scan_monadic(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::UInt8,
            1,
            &mut Identity,
            ScanOptions::TENSOR_AS_SPATIAL_DIM,
        )
        .unwrap();
        assert_eq!(out.tensor_elements(), 3);
        assert_eq!(out.color_space(), "RGB");
        assert_eq!(out.pixel_size(), &[0.5, 0.5]);
        assert_eq!(out.to_array::<u8>().unwrap(), a);
    }

    #[test]
    fn test_expand_tensor_in_buffer() {
        // a diagonal 2x2 tensor with two stored elements
        let mut input = Image::new(&[3], 2, DataType::SInt16).unwrap();
        input.reshape_tensor(Tensor::with_shape(crate::image::TensorShape::DiagonalMatrix, 2, 2).unwrap()).unwrap();
        input.set_sample(&[1], 0, 5i16).unwrap();
        input.set_sample(&[1], 1, 7i16).unwrap();
        let mut out = Image::default();
        scan_monadic(
            &input,
            &mut out,
            DataType::DFloat,
            DataType::SInt16,
            4,
            &mut Identity,
            ScanOptions::EXPAND_TENSOR_IN_BUFFER,
        )
        .unwrap();
        assert_eq!(out.tensor_elements(), 4);
        let dense: Vec<f64> = (0..4).map(|t| out.sample_f64(&[1], t).unwrap()).collect();
        assert_eq!(dense, vec![5.0, 0.0, 0.0, 7.0]);
    }

    /// Adds one to every sample, in buffers of type `T`.
    struct PlusOne<T>(std::marker::PhantomData<T>);

    impl<T: crate::image::Sample> PlusOne<T> {
        fn new() -> Self {
            PlusOne(std::marker::PhantomData)
        }
    }

    impl<T: crate::image::Sample> ScanLineFilter for PlusOne<T> {
        fn filter(&self, params: &ScanLineFilterParameters<'_>) -> Result<()> {
            let input = params.in_buffer[0].typed::<T>()?;
            let output = params.out_buffer[0].typed::<T>()?;
            for p in 0..params.buffer_length as isize {
                output.set(p, 0, T::from_f64(input.get(p, 0).to_f64() + 1.0));
            }
            Ok(())
        }
    }

    #[test]
    fn test_identical_output_view_is_processed_in_place() {
        let expected = ramp(&[4, 4]).to_array::<f32>().unwrap() + 1.0;
        for options in [ScanOptions::NONE, ScanOptions::NOT_IN_PLACE] {
            let input = ramp(&[4, 4]);
            let mut out = input.clone();
            scan_monadic(&input, &mut out, DataType::DFloat, DataType::SFloat, 1, &mut PlusOne::<f64>::new(), options)
                .unwrap();
            assert!(out.is_identical_view(&input));
            assert_eq!(input.to_array::<f32>().unwrap(), expected);

            // unbuffered input, the output is staged through its own buffer
            let input = ramp(&[4, 4]);
            let mut out = input.clone();
            scan_monadic(&input, &mut out, DataType::SFloat, DataType::SFloat, 1, &mut PlusOne::<f32>::new(), options)
                .unwrap();
            assert!(out.is_identical_view(&input));
            assert_eq!(input.to_array::<f32>().unwrap(), expected);
        }
    }

    #[test]
    fn test_overlapping_output_view_gets_new_storage() {
        let input = ramp(&[4, 4]);
        let before = input.to_array::<f32>().unwrap();
        let mut out = input.clone();
        out.permute_dimensions(&[1, 0]).unwrap();
        scan_monadic(&input, &mut out, DataType::DFloat, DataType::SFloat, 1, &mut PlusOne::<f64>::new(), ScanOptions::NONE)
            .unwrap();
        assert!(!out.shares_data(&input));
        assert_eq!(input.to_array::<f32>().unwrap(), before);
        assert_eq!(out.to_array::<f32>().unwrap(), before + 1.0);
    }

    #[test]
    fn test_reduction_with_mask_and_coordinates() {
        let input = ramp(&[10, 10]);
        let mut total = Total::default();
        scan_single_input(&input, None, DataType::DFloat, &mut total, ScanOptions::NEED_COORDINATES).unwrap();
        assert_eq!(total.value(), (0..100).sum::<usize>() as f64);

        let mut mask = Image::new(&[10, 1], 1, DataType::Bin).unwrap();
        mask.set_sample(&[3, 0], 0, crate::image::Bin::TRUE).unwrap();
        let mut masked = Total::default();
        scan_single_input(&input, Some(&mask), DataType::DFloat, &mut masked, ScanOptions::NONE).unwrap();
        // ndarray order: the value at (x, y) is 10 * x + y
        assert_eq!(masked.value(), (0..10).map(|y| (30 + y) as f64).sum::<f64>());
    }

    #[test]
    fn test_single_output_generator() {
        struct Fill;
        impl ScanLineFilter for Fill {
            fn filter(&self, params: &ScanLineFilterParameters<'_>) -> Result<()> {
                let out = params.out_buffer[0].typed::<f64>()?;
                for p in 0..params.buffer_length as isize {
                    out.set(p, 0, 2.5);
                }
                Ok(())
            }
        }
        let mut out = Image::new(&[3, 2], 1, DataType::SFloat).unwrap();
        scan_single_output(&mut out, DataType::DFloat, &mut Fill, ScanOptions::NONE).unwrap();
        assert_eq!(out.to_array::<f32>().unwrap(), Array::from_elem(IxDyn(&[3, 2]), 2.5f32));
    }

    #[test]
    fn test_dyadic_scalar_and_vector() {
        let vector = Image::from_tensor_array(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn().view()).unwrap();
        let scalar = Image::from_array(ndarray::arr1(&[10.0f32, 20.0]).into_dyn().view()).unwrap();
        let mut out = Image::default();
        scan_dyadic(
            &vector,
            &scalar,
            &mut out,
            DataType::DFloat,
            DataType::DFloat,
            DataType::SFloat,
            &mut Add,
            ScanOptions::NONE,
        )
        .unwrap();
        assert_eq!(out.tensor_elements(), 2);
        assert_eq!(
            out.to_array::<f32>().unwrap(),
            arr2(&[[11.0f32, 12.0], [23.0, 24.0]]).into_dyn()
        );
    }

    #[test]
    fn test_threading_is_deterministic() {
        let input = ramp(&[300, 400]);
        let mut single = Image::default();
        scan_monadic(
            &input,
            &mut single,
            DataType::DFloat,
            DataType::SFloat,
            1,
            &mut Identity,
            ScanOptions::NO_MULTI_THREADING,
        )
        .unwrap();
        let mut multi = Image::default();
        scan_monadic(&input, &mut multi, DataType::DFloat, DataType::SFloat, 1, &mut Identity, ScanOptions::NONE)
            .unwrap();
        assert_eq!(single.to_array::<f32>().unwrap(), multi.to_array::<f32>().unwrap());

        let mut a = Total::default();
        scan_single_input(&input, None, DataType::DFloat, &mut a, ScanOptions::NO_MULTI_THREADING).unwrap();
        let mut b = Total::default();
        scan_single_input(&input, None, DataType::DFloat, &mut b, ScanOptions::NONE).unwrap();
        assert_eq!(a.value(), b.value());
    }
}
