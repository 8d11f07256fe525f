//! The projection framework: reductions that collapse dimensions to size 1.
//!
//! [`projection`] calls a [`ProjectionFunction`] once per output sample. The
//! function receives a scalar view over the pixels that project onto that
//! sample, with as few dimensions as the memory layout allows, and the
//! matching view of the mask if one was given.
//!
//! | `process[d]` | Output size along `d` | View size along `d` |
//! |--------------|-----------------------|---------------------|
//! | `true` | 1 | input size |
//! | `false` | input size | 1 |
//!
//! Size-1 dimensions always count as processed. Tensor elements are reduced
//! independently, as an extra unprocessed dimension.

use num_complex::Complex64;

use crate::buffer::{fill_buffer, RawLine};
use crate::config::option_set;
use crate::error::{Error, Result};
use crate::image::datatype::dispatch_data_type;
use crate::image::{clamp_cast, to_isize, DataType, Image, Odometer, Sample};

use super::{run_threads, split_evenly, thread_count};

option_set! {
    /// Options for [`projection`].
    ProjectionOptions {
        /// Call the projection function from one thread only.
        NO_MULTI_THREADING = 0,
    }
}

/// The single output value of one projection call.
///
/// Values are cast to the requested output type when set, so a
/// `uint8` projection that sets `300.0` stores `255`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSample {
    data_type: DataType,
    value: Complex64,
}

impl OutputSample {
    pub fn new(data_type: DataType) -> Self {
        OutputSample {
            data_type,
            value: Complex64::new(0.0, 0.0),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Stores `value`, cast to this sample's data type.
    pub fn set<V: Sample>(&mut self, value: V) {
        self.value = dispatch_data_type!(self.data_type, T => clamp_cast::<V, T>(value).to_complex());
    }

    pub fn value(&self) -> Complex64 {
        self.value
    }

    /// The stored value as a real number. Complex values give their real part.
    pub fn as_f64(&self) -> f64 {
        self.value.re
    }

    /// Writes the value to one sample of `image` at `offset`.
    fn write_to(&self, image: &Image, offset: isize) {
        let target = RawLine::new(image.sample_ptr(offset), image.data_type(), 0, 0);
        // SAFETY: `offset` addresses a sample of the output view, owned by the calling thread.
        unsafe {
            if self.data_type.is_complex() {
                fill_buffer(target, 1, 1, self.value);
            } else {
                fill_buffer(target, 1, 1, self.value.re);
            }
        }
    }
}

/// A reduction driven by [`projection`].
pub trait ProjectionFunction: Sync {
    /// Reduces the scalar view `input`, restricted to `mask` if given, into `out`.
    fn project(&self, input: &Image, mask: Option<&Image>, out: &mut OutputSample, thread: usize) -> Result<()>;

    /// Called once before processing starts, with the number of threads that will call `project`.
    fn set_number_of_threads(&mut self, _threads: usize) -> Result<()> {
        Ok(())
    }

    /// Estimated cost of reducing `n_pixels` pixels.
    fn get_number_of_operations(&self, n_pixels: usize) -> usize {
        n_pixels
    }
}

/// Collapses the dimensions marked in `process` by calling `function` for every output sample.
///
/// # Arguments
/// * `mask` - Optional binary mask, singleton-expanded to the input sizes
/// * `out_image_type` - Data type of `out` and of the values `function` produces
/// * `process` - Dimensions to collapse; empty means all
pub fn projection(
    input: &Image,
    mask: Option<&Image>,
    out: &mut Image,
    out_image_type: DataType,
    process: &[bool],
    function: &mut dyn ProjectionFunction,
    options: ProjectionOptions,
) -> Result<()> {
    input.check_forged()?;
    let in_sizes = input.sizes().to_vec();
    let n_dims = in_sizes.len();
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

    let mut working = input.clone();
    let out_tensor = input.tensor();
    let n_tensor = out_tensor.elements();

    let mut mask = match mask {
        Some(m) => {
            m.check_is_mask(&in_sizes, true)?;
            let mut m = m.clone();
            m.expand_singleton_dimensions(&in_sizes)?;
            if n_tensor > 1 {
                m.expand_singleton_tensor(n_tensor)?;
            }
            Some(m)
        }
        None => None,
    };

    let mut out_sizes = in_sizes.clone();
    let mut view_sizes = in_sizes.clone();
    for d in 0..n_dims {
        if in_sizes[d] == 1 {
            process[d] = true;
        }
        if process[d] {
            out_sizes[d] = 1;
        } else {
            view_sizes[d] = 1;
        }
    }

    if out.is_forged() && (out.aliases(input) || mask.as_ref().is_some_and(|m| out.aliases(m))) {
        out.strip();
    }
    out.reforge(&out_sizes, n_tensor, out_image_type)?;
    out.reshape_tensor(out_tensor)?;
    out.set_pixel_size(input.pixel_size().to_vec());
    out.set_color_space(input.color_space());
    let mut output = out.clone();

    if n_tensor > 1 {
        working.tensor_to_spatial();
        if let Some(m) = mask.as_mut() {
            m.tensor_to_spatial();
        }
        output.tensor_to_spatial();
        process.push(false);
        view_sizes.push(1);
        out_sizes = output.sizes().to_vec();
    }

    // Scalar views over the pixels of one output sample, at the first output sample.
    let mut view = working.clone();
    view.shift_origin_unsafe(0, &view_sizes);
    let mut mask_view = mask.as_ref().map(|m| {
        let mut v = m.clone();
        v.shift_origin_unsafe(0, &view_sizes);
        v
    });
    match mask_view.as_mut() {
        Some(m) if m.strides() == view.strides() => {
            view.flatten_as_much_as_possible();
            m.flatten_as_much_as_possible();
        }
        Some(m) => {
            view.squeeze();
            m.squeeze();
        }
        None => view.flatten_as_much_as_possible(),
    }

    // Loop over the output dimensions that have more than one pixel.
    let looped: Vec<usize> = (0..out_sizes.len()).filter(|&d| out_sizes[d] > 1).collect();
    let loop_sizes: Vec<usize> = looped.iter().map(|&d| out_sizes[d]).collect();
    let in_strides: Vec<isize> = looped.iter().map(|&d| working.strides()[d]).collect();
    let mask_strides: Vec<isize> = match &mask {
        Some(m) => looped.iter().map(|&d| m.strides()[d]).collect(),
        None => Vec::new(),
    };
    let out_strides: Vec<isize> = looped.iter().map(|&d| output.strides()[d]).collect();

    let n_loop: usize = loop_sizes.iter().product();
    let n_view_pixels = view.number_of_pixels();
    let threads = thread_count(!options.contains(ProjectionOptions::NO_MULTI_THREADING), n_loop, || {
        n_loop * function.get_number_of_operations(n_view_pixels)
    });
    let (per_thread, n_threads) = split_evenly(n_loop, threads);
    log::debug!(
        "projection: {n_loop} output sample(s) of {n_view_pixels} pixel(s) each, masked: {}, {n_threads} thread(s)",
        mask.is_some()
    );

    function.set_number_of_threads(n_threads)?;
    let function: &dyn ProjectionFunction = function;

    let offset = |position: &[isize], strides: &[isize]| -> isize {
        position.iter().zip(strides).map(|(&p, &s)| p * s).sum()
    };
    let work = |thread: usize| -> Result<()> {
        let mut local_view = view.clone();
        let mut local_mask = mask_view.clone();
        let view_sizes = view.sizes().to_vec();
        let mask_sizes = mask_view.as_ref().map(|m| m.sizes().to_vec()).unwrap_or_default();
        let mut previous_in = 0;
        let mut previous_mask = 0;
        for position in Odometer::new(&loop_sizes).window(thread * per_thread, per_thread) {
            let position = to_isize(&position);
            let in_offset = offset(&position, &in_strides);
            local_view.shift_origin_unsafe(in_offset - previous_in, &view_sizes);
            previous_in = in_offset;
            if let Some(m) = local_mask.as_mut() {
                let mask_offset = offset(&position, &mask_strides);
                m.shift_origin_unsafe(mask_offset - previous_mask, &mask_sizes);
                previous_mask = mask_offset;
            }

            let mut sample = OutputSample::new(out_image_type);
            function.project(&local_view, local_mask.as_ref(), &mut sample, thread)?;
            sample.write_to(&output, offset(&position, &out_strides));
        }
        Ok(())
    };
    run_threads(n_threads, work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Bin;
    use ndarray::{arr1, arr2, Array, IxDyn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ramp(sizes: &[usize]) -> Image {
        let n: usize = sizes.iter().product();
        let array = Array::from_shape_vec(IxDyn(sizes), (0..n).map(|v| v as f32).collect()).unwrap();
        Image::from_array(array.view()).unwrap()
    }

    /// Sum over the view, skipping pixels where the mask is false.
    #[derive(Default)]
    struct Sum {
        calls: AtomicUsize,
    }

    impl ProjectionFunction for Sum {
        fn project(&self, input: &Image, mask: Option<&Image>, out: &mut OutputSample, _thread: usize) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut sum = 0.0;
            for position in Odometer::new(input.sizes()) {
                let selected = match mask {
                    Some(m) => m.sample_f64(&position, 0)? != 0.0,
                    None => true,
                };
                if selected {
                    sum += input.sample_f64(&position, 0)?;
                }
            }
            out.set(sum);
            Ok(())
        }
    }

    #[test]
    fn test_sum_over_all_dimensions() {
        init();
        let input = ramp(&[4, 3, 2]);
        let mut out = Image::default();
        let mut sum = Sum::default();
        projection(&input, None, &mut out, DataType::DFloat, &[], &mut sum, ProjectionOptions::NONE).unwrap();
        assert_eq!(out.sizes(), &[1, 1, 1]);
        assert_eq!(out.sample_f64(&[0, 0, 0], 0).unwrap(), (0..24).sum::<usize>() as f64);
        assert_eq!(sum.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_sum_along_one_dimension() {
        // ndarray order: the value at (x, y) is 3 * x + y
        let input = ramp(&[4, 3]);
        let mut out = Image::default();
        projection(
            &input,
            None,
            &mut out,
            DataType::SInt32,
            &[false, true],
            &mut Sum::default(),
            ProjectionOptions::NONE,
        )
        .unwrap();
        assert_eq!(out.sizes(), &[4, 1]);
        assert_eq!(out.data_type(), DataType::SInt32);
        assert_eq!(
            out.to_array::<i32>().unwrap(),
            arr2(&[[3], [12], [21], [30]]).into_dyn()
        );
    }

    #[test]
    fn test_masked_sum_with_broadcast_mask() {
        let input = ramp(&[4, 3]);
        let mut mask = Image::new(&[1, 3], 1, DataType::Bin).unwrap();
        mask.set_sample(&[0, 2], 0, Bin::TRUE).unwrap();
        let mut out = Image::default();
        projection(
            &input,
            Some(&mask),
            &mut out,
            DataType::DFloat,
            &[true, false],
            &mut Sum::default(),
            ProjectionOptions::NONE,
        )
        .unwrap();
        // only y = 2 is selected: 2 + 5 + 8 + 11
        assert_eq!(out.to_array::<f64>().unwrap(), arr2(&[[0.0, 0.0, 26.0]]).into_dyn());

        let wrong = Image::new(&[2, 3], 1, DataType::Bin).unwrap();
        let result = projection(
            &input,
            Some(&wrong),
            &mut out,
            DataType::DFloat,
            &[],
            &mut Sum::default(),
            ProjectionOptions::NONE,
        );
        assert!(matches!(result, Err(Error::SizesDontMatch(..))));
        let not_binary = Image::new(&[4, 3], 1, DataType::UInt8).unwrap();
        assert!(projection(
            &input,
            Some(&not_binary),
            &mut out,
            DataType::DFloat,
            &[],
            &mut Sum::default(),
            ProjectionOptions::NONE,
        )
        .is_err());
    }

    #[test]
    fn test_tensor_elements_are_reduced_independently() {
        let a = arr2(&[[1.0f32, 10.0], [2.0, 20.0], [3.0, 30.0]]).into_dyn();
        let mut input = Image::from_tensor_array(a.view()).unwrap();
        input.set_color_space("custom");
        let mut out = Image::default();
        let mut sum = Sum::default();
        projection(&input, None, &mut out, DataType::SFloat, &[], &mut sum, ProjectionOptions::NONE).unwrap();
        assert_eq!(out.tensor_elements(), 2);
        assert_eq!(out.color_space(), "custom");
        assert_eq!(out.to_array::<f32>().unwrap(), arr2(&[[6.0f32, 60.0]]).into_dyn());
        assert_eq!(sum.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_singleton_dimensions_are_always_processed() {
        let input = ramp(&[5, 1]);
        let mut out = Image::default();
        let mut sum = Sum::default();
        projection(
            &input,
            None,
            &mut out,
            DataType::DFloat,
            &[false, false],
            &mut sum,
            ProjectionOptions::NONE,
        )
        .unwrap();
        assert_eq!(out.sizes(), &[5, 1]);
        assert_eq!(sum.calls.load(Ordering::Relaxed), 5);
        assert_eq!(out.to_array::<f64>().unwrap(), arr2(&[[0.0], [1.0], [2.0], [3.0], [4.0]]).into_dyn());
        assert_eq!(
            projection(&input, None, &mut out, DataType::DFloat, &[true], &mut sum, ProjectionOptions::NONE),
            Err(Error::ArrayWrongLength { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn test_output_sample_casts_to_its_type() {
        let mut sample = OutputSample::new(DataType::UInt8);
        sample.set(300.0f64);
        assert_eq!(sample.as_f64(), 255.0);
        sample.set(-3i32);
        assert_eq!(sample.as_f64(), 0.0);
        let mut signed = OutputSample::new(DataType::SInt16);
        signed.set(-7.9f64);
        assert_eq!(signed.as_f64(), -7.0);

        // a negative result survives the write into a signed image
        struct Negative;
        impl ProjectionFunction for Negative {
            fn project(&self, _: &Image, _: Option<&Image>, out: &mut OutputSample, _: usize) -> Result<()> {
                out.set(-4.0f64);
                Ok(())
            }
        }
        let input = ramp(&[3]);
        let mut out = Image::default();
        projection(&input, None, &mut out, DataType::SInt8, &[], &mut Negative, ProjectionOptions::NONE).unwrap();
        assert_eq!(out.to_array::<i8>().unwrap(), arr1(&[-4i8]).into_dyn());
    }

    #[test]
    fn test_threading_is_deterministic() {
        let input = ramp(&[50, 400, 8]);
        let run = |options| {
            let mut out = Image::default();
            projection(&input, None, &mut out, DataType::DFloat, &[true, false, false], &mut Sum::default(), options)
                .unwrap();
            out.to_array::<f64>().unwrap()
        };
        assert_eq!(run(ProjectionOptions::NO_MULTI_THREADING), run(ProjectionOptions::NONE));
    }
}
