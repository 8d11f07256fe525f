//! Frameworks that drive a line filter over whole images.
//!
//! A framework handles everything that is not the actual computation:
//! singleton expansion, output allocation, type-converting buffers, boundary
//! extension, the choice of processing dimension and the split over threads.
//! The computation itself is a small trait object that sees one line at a
//! time.
//!
//! ## Frameworks
//!
//! | Function | Line filter trait | Typical use |
//! |----------|-------------------|-------------|
//! | [`scan()`] | [`ScanLineFilter`] | Pixel-wise arithmetic over any number of inputs and outputs |
//! | [`separable()`] | [`SeparableLineFilter`] | 1D filters applied along each dimension in turn |
//! | [`one_dimensional_line_filter()`] | [`SeparableLineFilter`] | One pass of a separable filter along one dimension |
//! | [`full()`] | [`FullLineFilter`] | Sliding neighborhood described by a [`Kernel`](crate::neighborhood::Kernel) |
//! | [`projection()`] | [`ProjectionFunction`] | Reductions that collapse dimensions to size 1 |
//!
//! ## Threading
//!
//! Each call forks at most once. The work (image lines, or output pixels for
//! a projection) is cut into contiguous blocks, one per thread, and handed to
//! the rayon pool. A call stays on the calling thread when the filter's cost
//! estimate is below [`THREADING_THRESHOLD`](crate::config::THREADING_THRESHOLD)
//! operations. Line filters are shared between threads and get the index of
//! the thread that calls them.

pub mod full;
pub mod projection;
pub mod scan;
pub mod separable;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;

use crate::buffer::LineBuffer;
use crate::config::{number_of_threads, SMALL_IMAGE, THREADING_THRESHOLD};
use crate::error::{Error, Result};
use crate::image::{DataBlock, DataType, Image};

pub use full::{full, FullLineFilter, FullLineFilterParameters, FullOptions};
pub use projection::{projection, OutputSample, ProjectionFunction, ProjectionOptions};
pub use scan::{
    scan, scan_dyadic, scan_monadic, scan_single_input, scan_single_output, ScanLineFilter, ScanLineFilterParameters,
    ScanOptions,
};
pub use separable::{
    one_dimensional_line_filter, separable, SeparableLineFilter, SeparableLineFilterParameters, SeparableOptions,
};

// ============================================================================
// Shape negotiation
// ============================================================================

/// Joins `other` into `sizes` by singleton expansion.
fn join_singleton_sizes(sizes: &mut Vec<usize>, other: &[usize]) -> Result<()> {
    if sizes.len() < other.len() {
        sizes.resize(other.len(), 1);
    }
    for (size, &o) in sizes.iter_mut().zip(other) {
        if *size == o {
            continue;
        }
        if *size == 1 {
            *size = o;
        } else if o != 1 {
            return Err(Error::SizesDontMatch(sizes.clone(), other.to_vec()));
        }
    }
    Ok(())
}

/// The sizes all `images` can be singleton-expanded to.
///
/// Each dimension takes the size of the images where it is not 1. Images
/// with fewer dimensions are treated as having trailing singletons.
pub fn singleton_expanded_size(images: &[Image]) -> Result<Vec<usize>> {
    let (first, rest) = images.split_first().ok_or(Error::ArrayEmpty)?;
    let mut sizes = first.sizes().to_vec();
    for image in rest {
        join_singleton_sizes(&mut sizes, image.sizes())?;
    }
    Ok(sizes)
}

/// The number of tensor elements all `images` can be singleton-expanded to.
pub fn singleton_expanded_tensor_elements(images: &[Image]) -> Result<usize> {
    let (first, rest) = images.split_first().ok_or(Error::ArrayEmpty)?;
    let mut elements = first.tensor_elements();
    for image in rest {
        let other = image.tensor_elements();
        if other == elements {
            continue;
        }
        if elements == 1 {
            elements = other;
        } else if other != 1 {
            return Err(Error::SizesDontMatch(vec![elements], vec![other]));
        }
    }
    Ok(elements)
}

// ============================================================================
// Processing dimension
// ============================================================================

fn optimal_dim(sizes: &[usize], strides: &[isize]) -> usize {
    let mut best = 0;
    for ii in 1..strides.len().min(sizes.len()) {
        if strides[ii] != 0 && strides[ii].abs() < strides[best].abs() {
            if sizes[ii] > SMALL_IMAGE || sizes[ii] > sizes[best] {
                best = ii;
            }
        } else if sizes[best] <= SMALL_IMAGE && sizes[ii] > sizes[best] {
            best = ii;
        }
    }
    best
}

/// The best dimension to walk lines along: the one with the smallest stride,
/// unless it is short (at most [`SMALL_IMAGE`] pixels) and a longer one exists.
pub fn optimal_processing_dim(image: &Image) -> Result<usize> {
    image.check_forged()?;
    Ok(optimal_dim(image.sizes(), image.strides()))
}

/// As [`optimal_processing_dim`], but never picks a dimension where the kernel has size 1.
pub fn optimal_processing_dim_for_kernel(image: &Image, kernel_sizes: &[usize]) -> Result<usize> {
    image.check_forged()?;
    if kernel_sizes.len() != image.dimensionality() {
        return Err(Error::ArrayWrongLength {
            expected: image.dimensionality(),
            actual: kernel_sizes.len(),
        });
    }
    let sizes: Vec<usize> = image
        .sizes()
        .iter()
        .zip(kernel_sizes)
        .map(|(&s, &k)| if k == 1 { 1 } else { s })
        .collect();
    Ok(optimal_dim(&sizes, image.strides()))
}

// ============================================================================
// Threading
// ============================================================================

/// Number of threads to fork for `n_items` independent work items.
///
/// `operations` is only evaluated when more than one thread is available.
pub(crate) fn thread_count(allow_threads: bool, n_items: usize, operations: impl FnOnce() -> usize) -> usize {
    if !allow_threads {
        return 1;
    }
    let max = number_of_threads().min(n_items);
    if max <= 1 {
        return 1;
    }
    let ops = operations();
    if ops < THREADING_THRESHOLD {
        log::debug!("{ops} operations is below the threading threshold, using one thread");
        return 1;
    }
    max
}

/// Items per thread, and the number of threads that actually receive work.
pub(crate) fn split_evenly(n_items: usize, n_threads: usize) -> (usize, usize) {
    let per_thread = n_items.div_ceil(n_threads.max(1)).max(1);
    (per_thread, n_items.div_ceil(per_thread).clamp(1, n_threads.max(1)))
}

/// Runs `work(thread)` for every thread index in `0..n_threads`.
///
/// With more than one thread the calls run on the rayon pool. The first
/// error stops threads that have not started yet and is returned once all
/// have finished.
pub(crate) fn run_threads<F>(n_threads: usize, work: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Sync + Send,
{
    if n_threads <= 1 {
        return work(0);
    }
    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<Error>> = Mutex::new(None);
    (0..n_threads).into_par_iter().for_each(|thread| {
        if abort.load(Ordering::Acquire) {
            return;
        }
        if let Err(error) = work(thread) {
            abort.store(true, Ordering::Release);
            let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error);
            }
        }
    });
    match first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

// ============================================================================
// Line buffers
// ============================================================================

/// A descriptor for the line of `image` that starts at `offset` and runs along `dim`.
pub(crate) fn image_line(image: &Image, offset: isize, dim: usize, length: usize) -> LineBuffer {
    LineBuffer::new(
        image.raw_line(offset, dim),
        image.tensor_elements(),
        length,
        0,
        image.storage_bounds(),
    )
}

/// A contiguous scratch line of `length` pixels plus `border` pixels on either side.
///
/// The block must outlive the descriptor.
pub(crate) fn scratch_line(
    data_type: DataType,
    tensor_length: usize,
    length: usize,
    border: usize,
) -> Result<(DataBlock, LineBuffer)> {
    let samples = (length + 2 * border) * tensor_length;
    let block = DataBlock::new(samples * data_type.size_of())?;
    let buffer = LineBuffer::in_scratch(
        &block,
        data_type,
        tensor_length as isize,
        1,
        tensor_length,
        length,
        border,
    );
    Ok((block, buffer))
}

/// A scratch buffer holding a single pixel that reads as a line of `length` copies (stride 0).
pub(crate) fn scratch_pixel(data_type: DataType, tensor_length: usize, length: usize) -> Result<(DataBlock, LineBuffer)> {
    let block = DataBlock::new(tensor_length * data_type.size_of())?;
    let buffer = LineBuffer::in_scratch(&block, data_type, 0, 1, tensor_length, length, 0);
    Ok((block, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_singleton_expanded_size() {
        let a = Image::header(&[5, 1], 1, DataType::UInt8);
        let b = Image::header(&[5, 7], 1, DataType::UInt8);
        let c = Image::header(&[1], 1, DataType::UInt8);
        assert_eq!(singleton_expanded_size(&[a.clone(), b.clone(), c]).unwrap(), vec![5, 7]);
        let d = Image::header(&[4, 7], 1, DataType::UInt8);
        assert!(matches!(singleton_expanded_size(&[a, d]), Err(Error::SizesDontMatch(..))));
        assert_eq!(singleton_expanded_size(&[]), Err(Error::ArrayEmpty));
    }

    #[test]
    fn test_singleton_expanded_tensor_elements() {
        let a = Image::header(&[2], 1, DataType::UInt8);
        let b = Image::header(&[2], 3, DataType::UInt8);
        let c = Image::header(&[2], 2, DataType::UInt8);
        assert_eq!(singleton_expanded_tensor_elements(&[a, b.clone()]).unwrap(), 3);
        assert!(singleton_expanded_tensor_elements(&[b, c]).is_err());
    }

    #[test]
    fn test_optimal_processing_dim_prefers_small_stride() {
        let img = Image::new(&[100, 50], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim(&img).unwrap(), 0);
        let mut transposed = img.clone();
        transposed.permute_dimensions(&[1, 0]).unwrap();
        assert_eq!(optimal_processing_dim(&transposed).unwrap(), 1);
    }

    #[test]
    fn test_optimal_processing_dim_avoids_short_lines() {
        // dimension 0 has the smallest stride but only 10 pixels
        let img = Image::new(&[10, 200], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim(&img).unwrap(), 1);
        let img = Image::new(&[64, 200], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim(&img).unwrap(), 0);
        // a kernel of size 1 along dimension 1 rules it out
        let img = Image::new(&[10, 200], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim_for_kernel(&img, &[3, 1]).unwrap(), 0);
        assert!(optimal_processing_dim_for_kernel(&img, &[3]).is_err());
    }

    #[test]
    fn test_split_evenly() {
        assert_eq!(split_evenly(10, 4), (3, 4));
        assert_eq!(split_evenly(9, 4), (3, 3));
        assert_eq!(split_evenly(2, 8), (1, 2));
        assert_eq!(split_evenly(0, 3), (1, 1));
    }

    #[test]
    fn test_run_threads_visits_every_thread_once() {
        let count = AtomicUsize::new(0);
        run_threads(4, |_| {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_run_threads_returns_an_error() {
        let result = run_threads(6, |thread| {
            if thread % 2 == 1 {
                Err(Error::Parameter(format!("thread {thread}")))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::Parameter(_))));
        assert_eq!(run_threads(1, |_| Err(Error::ArrayEmpty)), Err(Error::ArrayEmpty));
    }

    #[test]
    fn test_thread_count_respects_threshold() {
        assert_eq!(thread_count(false, 1000, || usize::MAX), 1);
        assert_eq!(thread_count(true, 1000, || THREADING_THRESHOLD - 1), 1);
        assert_eq!(thread_count(true, 1, || usize::MAX), 1);
        let n = thread_count(true, 1000, || THREADING_THRESHOLD);
        assert_eq!(n, number_of_threads().min(1000));
    }
}
