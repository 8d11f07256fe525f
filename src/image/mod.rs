//! Strided N-dimensional image views.
//!
//! An [`Image`] is a lightweight descriptor (sizes, strides, tensor shape,
//! sample type, origin offset) over a reference-counted [`DataBlock`]. Cloning
//! an image is a "quick copy": the clone shares the samples but gets its own
//! descriptor, so permuting, flattening or windowing it never affects the
//! original view.
//!
//! ## Layout
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `sizes[d]` | Number of pixels along dimension `d` |
//! | `strides[d]` | Distance in samples between neighbors along `d`; 0 for broadcast, negative for mirrored |
//! | `tensor_stride` | Distance in samples between tensor elements of one pixel |
//! | `origin` | Sample index of pixel `(0, .., 0)` inside the block |
//!
//! Freshly forged images store the tensor elements of a pixel contiguously and
//! have dimension 0 varying fastest.

pub mod datatype;
pub mod odometer;
pub mod storage;
pub mod tensor;

use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, Dimension, IxDyn};
use num_complex::Complex64;

use crate::buffer::{copy_buffer, fill_buffer, RawLine};
use crate::error::{Error, Result};
use datatype::dispatch_data_type;

pub use datatype::{clamp_cast, Bin, DataType, Sample};
pub use odometer::Odometer;
pub use storage::DataBlock;
pub use tensor::{Tensor, TensorShape};

/// Where a window of a given size is placed inside a larger image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropLocation {
    /// Keeps the pixel at `size / 2` at the same relative position.
    #[default]
    Center,
    /// Keeps the pixel at `(size - 1) / 2` at the same relative position.
    MirrorCenter,
    TopLeft,
    BottomRight,
}

impl FromStr for CropLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "center" => Ok(CropLocation::Center),
            "mirror center" => Ok(CropLocation::MirrorCenter),
            "top left" => Ok(CropLocation::TopLeft),
            "bottom right" => Ok(CropLocation::BottomRight),
            _ => Err(Error::parameter(format!("unknown crop location \"{s}\""))),
        }
    }
}

/// The window of size `window_sizes` that a crop at `location` selects from an image of size `image_sizes`.
pub fn crop_window(
    image_sizes: &[usize],
    window_sizes: &[usize],
    location: CropLocation,
) -> Result<Vec<Range<usize>>> {
    if image_sizes.len() != window_sizes.len() {
        return Err(Error::ArrayWrongLength {
            expected: image_sizes.len(),
            actual: window_sizes.len(),
        });
    }
    image_sizes
        .iter()
        .zip(window_sizes)
        .map(|(&image, &window)| {
            if window > image {
                return Err(Error::precondition(format!(
                    "window size {window} exceeds image size {image}"
                )));
            }
            let start = match location {
                CropLocation::Center => image / 2 - window / 2,
                CropLocation::MirrorCenter => (image - 1) / 2 - window.saturating_sub(1) / 2,
                CropLocation::TopLeft => 0,
                CropLocation::BottomRight => image - window,
            };
            Ok(start..start + window)
        })
        .collect()
}

/// A view over N-dimensional, tensor-valued sample data.
#[derive(Debug, Clone)]
pub struct Image {
    data_type: DataType,
    sizes: Vec<usize>,
    strides: Vec<isize>,
    tensor: Tensor,
    tensor_stride: isize,
    origin: isize,
    data: Option<Arc<DataBlock>>,
    pixel_size: Vec<f64>,
    color_space: String,
}

impl Default for Image {
    fn default() -> Self {
        Image {
            data_type: DataType::SFloat,
            sizes: Vec::new(),
            strides: Vec::new(),
            tensor: Tensor::scalar(),
            tensor_stride: 1,
            origin: 0,
            data: None,
            pixel_size: Vec::new(),
            color_space: String::new(),
        }
    }
}

fn normal_strides(sizes: &[usize], tensor_elements: usize) -> Vec<isize> {
    let mut strides = Vec::with_capacity(sizes.len());
    let mut s = tensor_elements as isize;
    for &size in sizes {
        strides.push(s);
        s *= size as isize;
    }
    strides
}

impl Image {
    /// A forged image with default strides, all samples zero.
    pub fn new(sizes: &[usize], tensor_elements: usize, data_type: DataType) -> Result<Self> {
        let mut image = Image::header(sizes, tensor_elements, data_type);
        image.forge()?;
        Ok(image)
    }

    /// An unforged image carrying only a header.
    pub fn header(sizes: &[usize], tensor_elements: usize, data_type: DataType) -> Self {
        Image {
            data_type,
            sizes: sizes.to_vec(),
            strides: Vec::new(),
            tensor: Tensor::vector(tensor_elements),
            ..Image::default()
        }
    }

    /// Copies an ndarray into a new scalar image. Array axis `d` becomes image dimension `d`.
    pub fn from_array<T: Sample>(array: ArrayViewD<'_, T>) -> Result<Self> {
        let image = Image::new(array.shape(), 1, T::DATA_TYPE)?;
        for (index, &value) in array.indexed_iter() {
            let offset = image.offset_of(&to_isize(index.slice()));
            // SAFETY: `offset_of` of an in-range coordinate addresses a sample of the block.
            unsafe { std::ptr::write(image.sample_ptr(offset) as *mut T, value) };
        }
        Ok(image)
    }

    /// Copies an ndarray into a new image whose last array axis is the tensor.
    pub fn from_tensor_array<T: Sample>(array: ArrayViewD<'_, T>) -> Result<Self> {
        let shape = array.shape();
        let (&tensor_elements, spatial) = shape
            .split_last()
            .ok_or_else(|| Error::precondition("array needs a tensor axis"))?;
        let image = Image::new(spatial, tensor_elements, T::DATA_TYPE)?;
        for (index, &value) in array.indexed_iter() {
            let index = index.slice();
            let (&t, coords) = index.split_last().unwrap_or((&0, &[]));
            let offset = image.offset_of(&to_isize(coords)) + t as isize * image.tensor_stride;
            // SAFETY: coordinates come from an array of the image's shape.
            unsafe { std::ptr::write(image.sample_ptr(offset) as *mut T, value) };
        }
        Ok(image)
    }

    /// Copies the samples into an ndarray, casting to `T`.
    ///
    /// The array has one axis per image dimension, plus a trailing tensor axis
    /// for non-scalar images.
    pub fn to_array<T: Sample>(&self) -> Result<ArrayD<T>> {
        self.check_forged()?;
        let mut shape = self.sizes.clone();
        let scalar = self.is_scalar();
        if !scalar {
            shape.push(self.tensor_elements());
        }
        let mut out = ArrayD::<T>::default(IxDyn(&shape));
        for (index, value) in out.indexed_iter_mut() {
            let index = index.slice();
            let (coords, t) = if scalar {
                (index, 0)
            } else {
                let (&t, coords) = index.split_last().unwrap_or((&0, &[]));
                (coords, t)
            };
            let offset = self.offset_of(&to_isize(coords)) + t as isize * self.tensor_stride;
            *value = self.read_sample::<T>(offset);
        }
        Ok(out)
    }

    // ========================================================================
    // Header
    // ========================================================================

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn size(&self, dim: usize) -> Result<usize> {
        self.sizes.get(dim).copied().ok_or_else(|| dimension_out_of_range(dim))
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn stride(&self, dim: usize) -> Result<isize> {
        self.strides.get(dim).copied().ok_or_else(|| dimension_out_of_range(dim))
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    pub fn tensor(&self) -> Tensor {
        self.tensor
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor.elements()
    }

    pub fn tensor_stride(&self) -> isize {
        self.tensor_stride
    }

    pub fn is_scalar(&self) -> bool {
        self.tensor.is_scalar()
    }

    pub fn number_of_pixels(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn number_of_samples(&self) -> usize {
        self.number_of_pixels() * self.tensor_elements()
    }

    /// Physical size of a pixel along each dimension. Empty when undefined.
    pub fn pixel_size(&self) -> &[f64] {
        &self.pixel_size
    }

    pub fn set_pixel_size(&mut self, pixel_size: Vec<f64>) {
        self.pixel_size = pixel_size;
    }

    pub fn color_space(&self) -> &str {
        &self.color_space
    }

    pub fn set_color_space(&mut self, color_space: impl Into<String>) {
        self.color_space = color_space.into();
    }

    pub fn is_color(&self) -> bool {
        !self.color_space.is_empty()
    }

    /// Changes the tensor shape. The number of elements must not change.
    pub fn reshape_tensor(&mut self, tensor: Tensor) -> Result<()> {
        if tensor.elements() != self.tensor.elements() {
            return Err(Error::precondition("cannot reshape tensor to requested form"));
        }
        self.tensor = tensor;
        Ok(())
    }

    // ========================================================================
    // Storage
    // ========================================================================

    pub fn is_forged(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn check_forged(&self) -> Result<()> {
        if self.is_forged() {
            Ok(())
        } else {
            Err(Error::ImageNotForged)
        }
    }

    /// Allocates storage for the current header. Does nothing if already forged.
    pub fn forge(&mut self) -> Result<()> {
        if self.is_forged() {
            return Ok(());
        }
        if self.sizes.iter().any(|&s| s == 0) {
            return Err(Error::precondition("image sizes must be non-zero"));
        }
        let tensor_elements = self.tensor_elements();
        let samples = self.number_of_pixels() * tensor_elements;
        let bytes = samples
            .checked_mul(self.data_type.size_of())
            .ok_or(Error::Allocation { bytes: usize::MAX })?;
        self.data = Some(Arc::new(DataBlock::new(bytes)?));
        self.strides = normal_strides(&self.sizes, tensor_elements);
        self.tensor_stride = 1;
        self.origin = 0;
        Ok(())
    }

    /// Makes the image forged with the given properties, reallocating only if they differ.
    pub fn reforge(&mut self, sizes: &[usize], tensor_elements: usize, data_type: DataType) -> Result<()> {
        if self.is_forged()
            && self.sizes == sizes
            && self.tensor_elements() == tensor_elements
            && self.data_type == data_type
        {
            return Ok(());
        }
        self.strip();
        self.sizes = sizes.to_vec();
        self.tensor = Tensor::vector(tensor_elements);
        self.data_type = data_type;
        self.forge()
    }

    /// Detaches the storage. The header stays.
    pub fn strip(&mut self) {
        self.data = None;
    }

    /// Start and end of the block this view lives in, or null pointers if unforged.
    pub(crate) fn storage_bounds(&self) -> (*const u8, *const u8) {
        match &self.data {
            Some(block) => (block.as_ptr() as *const u8, block.end_ptr() as *const u8),
            None => (std::ptr::null(), std::ptr::null()),
        }
    }

    /// Pointer to the sample at `offset` samples from the origin.
    pub(crate) fn sample_ptr(&self, offset: isize) -> *mut u8 {
        match &self.data {
            Some(block) => block
                .as_ptr()
                .wrapping_offset((self.origin + offset) * self.data_type.size_of() as isize),
            None => std::ptr::null_mut(),
        }
    }

    /// A raw line descriptor starting at `offset`, walking along `dim`.
    pub(crate) fn raw_line(&self, offset: isize, dim: usize) -> RawLine {
        let stride = self.strides.get(dim).copied().unwrap_or(0);
        RawLine::new(self.sample_ptr(offset), self.data_type, stride, self.tensor_stride)
    }

    /// Lowest and highest sample offsets (relative to the origin) addressed by this view.
    fn extent(&self) -> (isize, isize) {
        let mut lo = 0isize;
        let mut hi = 0isize;
        let mut add = |size: usize, stride: isize| {
            let span = (size as isize - 1) * stride;
            if span < 0 {
                lo += span;
            } else {
                hi += span;
            }
        };
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            add(size, stride);
        }
        add(self.tensor_elements(), self.tensor_stride);
        (lo, hi)
    }

    /// True if both views share storage and their sample ranges overlap.
    pub fn aliases(&self, other: &Image) -> bool {
        match (&self.data, &other.data) {
            (Some(a), Some(b)) if Arc::ptr_eq(a, b) => {
                let (alo, ahi) = self.extent();
                let (blo, bhi) = other.extent();
                let a0 = self.origin + alo;
                let a1 = self.origin + ahi;
                let b0 = other.origin + blo;
                let b1 = other.origin + bhi;
                a0 <= b1 && b0 <= a1
            }
            _ => false,
        }
    }

    /// True if both views use the same storage block.
    pub fn shares_data(&self, other: &Image) -> bool {
        matches!((&self.data, &other.data), (Some(a), Some(b)) if Arc::ptr_eq(a, b))
    }

    /// True if both views address exactly the same samples in the same way.
    pub fn is_identical_view(&self, other: &Image) -> bool {
        self.shares_data(other)
            && self.origin == other.origin
            && self.data_type == other.data_type
            && self.sizes == other.sizes
            && self.strides == other.strides
            && self.tensor_elements() == other.tensor_elements()
            && self.tensor_stride == other.tensor_stride
    }

    /// True if this view aliases any of `others` without being identical to it.
    pub fn is_overlapping_view(&self, others: &[Image]) -> bool {
        others.iter().any(|o| self.aliases(o) && !self.is_identical_view(o))
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// Sample offset of a (possibly out-of-range) coordinate. No checks.
    pub(crate) fn offset_of(&self, coords: &[isize]) -> isize {
        coords.iter().zip(&self.strides).map(|(&c, &s)| c * s).sum()
    }

    /// Sample offset of a pixel, relative to the origin.
    pub fn offset(&self, coords: &[usize]) -> Result<isize> {
        self.check_forged()?;
        if coords.len() != self.sizes.len() {
            return Err(Error::ArrayWrongLength {
                expected: self.sizes.len(),
                actual: coords.len(),
            });
        }
        if let Some(d) = (0..coords.len()).find(|&d| coords[d] >= self.sizes[d]) {
            return Err(Error::IndexOutOfRange(format!(
                "coordinate {} along dimension {d} (size {})",
                coords[d], self.sizes[d]
            )));
        }
        Ok(self.offset_of(&to_isize(coords)))
    }

    pub(crate) fn read_sample<T: Sample>(&self, offset: isize) -> T {
        let p = self.sample_ptr(offset);
        dispatch_read(p, self.data_type)
    }

    /// Tensor element `element` of the pixel at `coords`, as a real number.
    pub fn sample_f64(&self, coords: &[usize], element: usize) -> Result<f64> {
        let offset = self.element_offset(coords, element)?;
        Ok(self.read_sample::<f64>(offset))
    }

    /// Tensor element `element` of the pixel at `coords`, as a complex number.
    pub fn sample_complex(&self, coords: &[usize], element: usize) -> Result<Complex64> {
        let offset = self.element_offset(coords, element)?;
        Ok(self.read_sample::<Complex64>(offset))
    }

    /// Writes one sample, cast to the image's data type.
    pub fn set_sample<V: Sample>(&mut self, coords: &[usize], element: usize, value: V) -> Result<()> {
        let offset = self.element_offset(coords, element)?;
        // SAFETY: offset is checked to address a sample of this view.
        unsafe { fill_buffer(self.raw_line(offset, 0), 1, 1, value) };
        Ok(())
    }

    fn element_offset(&self, coords: &[usize], element: usize) -> Result<isize> {
        let offset = self.offset(coords)?;
        if element >= self.tensor_elements() {
            return Err(Error::IndexOutOfRange(format!("tensor element {element}")));
        }
        Ok(offset + element as isize * self.tensor_stride)
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// A view over a rectangular sub-region.
    pub fn window(&self, ranges: &[Range<usize>]) -> Result<Image> {
        if ranges.len() != self.sizes.len() {
            return Err(Error::ArrayWrongLength {
                expected: self.sizes.len(),
                actual: ranges.len(),
            });
        }
        let mut out = self.clone();
        for (d, range) in ranges.iter().enumerate() {
            if range.start >= range.end || range.end > self.sizes[d] {
                return Err(Error::IndexOutOfRange(format!(
                    "range {range:?} along dimension {d} (size {})",
                    self.sizes[d]
                )));
            }
            out.origin += range.start as isize * self.strides[d];
            out.sizes[d] = range.end - range.start;
        }
        Ok(out)
    }

    /// Moves the origin by `offset` samples and sets new sizes, without checks.
    pub(crate) fn shift_origin_unsafe(&mut self, offset: isize, sizes: &[usize]) {
        self.origin += offset;
        self.sizes = sizes.to_vec();
    }

    /// Reorders dimensions: new dimension `i` is old dimension `order[i]`.
    pub fn permute_dimensions(&mut self, order: &[usize]) -> Result<()> {
        let n = self.sizes.len();
        let mut seen = vec![false; n];
        if order.len() != n || order.iter().any(|&d| d >= n || std::mem::replace(&mut seen[d], true)) {
            return Err(Error::parameter("dimension order must be a permutation"));
        }
        self.sizes = order.iter().map(|&d| self.sizes[d]).collect();
        self.strides = order.iter().map(|&d| self.strides[d]).collect();
        if self.pixel_size.len() == n {
            self.pixel_size = order.iter().map(|&d| self.pixel_size[d]).collect();
        }
        Ok(())
    }

    /// Removes all dimensions of size 1.
    pub fn squeeze(&mut self) {
        let keep: Vec<usize> = (0..self.sizes.len()).filter(|&d| self.sizes[d] > 1).collect();
        self.sizes = keep.iter().map(|&d| self.sizes[d]).collect();
        self.strides = keep.iter().map(|&d| self.strides[d]).collect();
        self.pixel_size.clear();
    }

    /// Inserts a dimension of size 1 before `dim`.
    pub fn add_singleton(&mut self, dim: usize) -> Result<()> {
        if dim > self.sizes.len() {
            return Err(dimension_out_of_range(dim));
        }
        self.sizes.insert(dim, 1);
        self.strides.insert(dim, 0);
        Ok(())
    }

    /// Appends dimensions of size 1 until the image has `n_dims` dimensions.
    pub fn expand_dimensionality(&mut self, n_dims: usize) {
        while self.sizes.len() < n_dims {
            self.sizes.push(1);
            self.strides.push(0);
        }
    }

    /// Broadcasts a size-1 dimension to `size` pixels with a zero stride.
    pub fn expand_singleton_dimension(&mut self, dim: usize, size: usize) -> Result<()> {
        if self.size(dim)? != 1 {
            return Err(Error::precondition(format!(
                "dimension {dim} is not a singleton"
            )));
        }
        self.sizes[dim] = size;
        self.strides[dim] = 0;
        Ok(())
    }

    /// Broadcasts singleton dimensions so that the image has sizes `target`.
    pub fn expand_singleton_dimensions(&mut self, target: &[usize]) -> Result<()> {
        if self.sizes.len() > target.len() {
            return Err(Error::DimensionalityMismatch(self.sizes.len(), target.len()));
        }
        self.expand_dimensionality(target.len());
        for (d, &size) in target.iter().enumerate() {
            if self.sizes[d] == size {
                continue;
            }
            if self.sizes[d] != 1 {
                return Err(Error::SizesDontMatch(self.sizes.clone(), target.to_vec()));
            }
            self.expand_singleton_dimension(d, size)?;
        }
        Ok(())
    }

    /// Fails unless this is a forged, scalar, binary image of size `sizes`,
    /// or one that can be singleton-expanded to it when `allow_singleton_expansion` is set.
    pub fn check_is_mask(&self, sizes: &[usize], allow_singleton_expansion: bool) -> Result<()> {
        self.check_forged()?;
        if !self.is_scalar() {
            return Err(Error::precondition("mask image must be scalar"));
        }
        if self.data_type != DataType::Bin {
            return Err(Error::precondition("mask image must be binary"));
        }
        if self.sizes == sizes {
            return Ok(());
        }
        let broadcastable = allow_singleton_expansion
            && self.sizes.len() <= sizes.len()
            && (0..sizes.len()).all(|d| {
                let s = self.sizes.get(d).copied().unwrap_or(1);
                s == sizes[d] || s == 1
            });
        if broadcastable {
            Ok(())
        } else {
            Err(Error::SizesDontMatch(self.sizes.clone(), sizes.to_vec()))
        }
    }

    /// Broadcasts a scalar image to `n` tensor elements with a zero tensor stride.
    pub fn expand_singleton_tensor(&mut self, n: usize) -> Result<()> {
        if !self.is_scalar() {
            return Err(Error::precondition("image is not scalar"));
        }
        self.tensor = Tensor::vector(n);
        self.tensor_stride = 0;
        Ok(())
    }

    /// Turns the tensor into a new last spatial dimension.
    pub fn tensor_to_spatial(&mut self) {
        self.sizes.push(self.tensor_elements());
        self.strides.push(self.tensor_stride);
        self.tensor = Tensor::scalar();
        self.tensor_stride = 1;
    }

    /// If all pixels can be visited with a single stride, returns that stride
    /// and the offset of the pixel with the lowest address.
    pub fn simple_stride(&self) -> Option<(isize, isize)> {
        let mut dims: Vec<(usize, isize)> = self
            .sizes
            .iter()
            .zip(&self.strides)
            .filter(|&(&size, _)| size > 1)
            .map(|(&size, &stride)| (size, stride))
            .collect();
        if dims.is_empty() {
            return Some((1, 0));
        }
        dims.sort_by_key(|&(_, stride)| stride.unsigned_abs());
        let mut expected = dims[0].1.abs();
        if expected == 0 {
            return None;
        }
        let stride = expected;
        let mut start = 0isize;
        for &(size, s) in &dims {
            if s.abs() != expected {
                return None;
            }
            if s < 0 {
                start += (size as isize - 1) * s;
            }
            expected *= size as isize;
        }
        Some((stride, start))
    }

    pub fn has_simple_stride(&self) -> bool {
        self.simple_stride().is_some()
    }

    /// True if both images walk their dimensions in the same memory order.
    pub fn same_dimension_order(&self, other: &Image) -> bool {
        if self.sizes.len() != other.sizes.len() {
            return false;
        }
        let order = |img: &Image| {
            let mut dims: Vec<usize> = (0..img.sizes.len()).filter(|&d| img.sizes[d] > 1).collect();
            dims.sort_by_key(|&d| img.strides[d].unsigned_abs());
            dims.into_iter()
                .map(|d| (d, img.strides[d] < 0))
                .collect::<Vec<_>>()
        };
        order(self) == order(other)
    }

    /// Converts to a 1D image over all pixels.
    ///
    /// With a simple stride this only changes the view; pixels are then
    /// visited in memory order. Otherwise the samples are first copied into a
    /// fresh contiguous block.
    pub fn flatten(&mut self) -> Result<()> {
        self.check_forged()?;
        let n = self.number_of_pixels();
        match self.simple_stride() {
            Some((stride, start)) => {
                self.origin += start;
                self.sizes = vec![n];
                self.strides = vec![stride];
            }
            None => {
                let copy = self.copy()?;
                *self = copy;
                self.sizes = vec![n];
                self.strides = vec![self.tensor_elements() as isize];
            }
        }
        self.pixel_size.clear();
        Ok(())
    }

    /// Makes all strides positive and sorts dimensions by increasing stride, dropping singletons.
    pub fn standardize_strides(&mut self) {
        for d in 0..self.sizes.len() {
            if self.strides[d] < 0 {
                self.origin += (self.sizes[d] as isize - 1) * self.strides[d];
                self.strides[d] = -self.strides[d];
            }
        }
        self.squeeze();
        let mut order: Vec<usize> = (0..self.sizes.len()).collect();
        order.sort_by_key(|&d| self.strides[d]);
        self.sizes = order.iter().map(|&d| self.sizes[d]).collect();
        self.strides = order.iter().map(|&d| self.strides[d]).collect();
    }

    /// Standardizes strides, then merges dimensions that are contiguous in memory.
    pub fn flatten_as_much_as_possible(&mut self) {
        self.standardize_strides();
        let mut sizes: Vec<usize> = Vec::with_capacity(self.sizes.len());
        let mut strides: Vec<isize> = Vec::with_capacity(self.sizes.len());
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            if let (Some(last_size), Some(&last_stride)) = (sizes.last_mut(), strides.last()) {
                if last_stride * *last_size as isize == stride {
                    *last_size *= size;
                    continue;
                }
            }
            sizes.push(size);
            strides.push(stride);
        }
        if sizes.is_empty() {
            sizes.push(1);
            strides.push(0);
        }
        self.sizes = sizes;
        self.strides = strides;
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// A deep copy in a fresh contiguous block.
    pub fn copy(&self) -> Result<Image> {
        self.convert(self.data_type)
    }

    /// A deep copy with samples cast to `data_type`.
    pub fn convert(&self, data_type: DataType) -> Result<Image> {
        self.check_forged()?;
        let mut out = Image::new(&self.sizes, self.tensor_elements(), data_type)?;
        out.tensor = self.tensor;
        out.pixel_size = self.pixel_size.clone();
        out.color_space = self.color_space.clone();
        out.copy_from(self)?;
        Ok(out)
    }

    /// Copies (and casts) the samples of `src` into this image. Sizes and tensor elements must match.
    pub fn copy_from(&mut self, src: &Image) -> Result<()> {
        self.check_forged()?;
        src.check_forged()?;
        if self.sizes != src.sizes {
            return Err(Error::SizesDontMatch(src.sizes.clone(), self.sizes.clone()));
        }
        if self.tensor_elements() != src.tensor_elements() {
            return Err(Error::precondition("number of tensor elements doesn't match"));
        }
        self.copy_lines(src, None)
    }

    /// Copies `src` into this image, expanding each pixel's tensor through a look-up table.
    ///
    /// Element `t` of every destination pixel receives source element
    /// `look_up_table[t]`, or zero where the table holds `-1`.
    pub fn copy_from_with_look_up_table(&mut self, src: &Image, look_up_table: &[isize]) -> Result<()> {
        self.check_forged()?;
        src.check_forged()?;
        if self.sizes != src.sizes {
            return Err(Error::SizesDontMatch(src.sizes.clone(), self.sizes.clone()));
        }
        if self.tensor_elements() != look_up_table.len()
            || look_up_table.iter().any(|&i| i >= src.tensor_elements() as isize)
        {
            return Err(Error::precondition("tensor look-up table doesn't fit the images"));
        }
        self.copy_lines(src, Some(look_up_table))
    }

    fn copy_lines(&mut self, src: &Image, look_up_table: Option<&[isize]>) -> Result<()> {
        let src = if self.aliases(src) { src.copy()? } else { src.clone() };
        let dim = usize::from(self.sizes.len() > 1 && self.sizes[0] == 1);
        let length = self.sizes.get(dim).copied().unwrap_or(1);
        for position in Odometer::lines(&self.sizes, dim) {
            let coords = to_isize(&position);
            // SAFETY: both lines are in range of their views.
            unsafe {
                copy_buffer(
                    src.raw_line(src.offset_of(&coords), dim),
                    self.raw_line(self.offset_of(&coords), dim),
                    length,
                    self.tensor_elements(),
                    look_up_table,
                );
            }
        }
        Ok(())
    }

    /// Sets every sample to `value`, cast to the image's data type.
    pub fn fill<V: Sample>(&mut self, value: V) -> Result<()> {
        self.check_forged()?;
        let dim = 0;
        let length = self.sizes.first().copied().unwrap_or(1);
        for position in Odometer::lines(&self.sizes, dim) {
            let offset = self.offset_of(&to_isize(&position));
            // SAFETY: the line is in range of this view.
            unsafe { fill_buffer(self.raw_line(offset, dim), length, self.tensor_elements(), value) };
        }
        Ok(())
    }
}

fn dispatch_read<T: Sample>(p: *const u8, data_type: DataType) -> T {
    // SAFETY: callers pass pointers to samples of `data_type` inside a live block.
    dispatch_data_type!(data_type, S => clamp_cast::<S, T>(unsafe { std::ptr::read(p as *const S) }))
}

fn dimension_out_of_range(dim: usize) -> Error {
    Error::IndexOutOfRange(format!("dimension {dim}"))
}

pub(crate) fn to_isize(coords: &[usize]) -> Vec<isize> {
    coords.iter().map(|&c| c as isize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array};

    fn ramp(sizes: &[usize]) -> Image {
        let n: usize = sizes.iter().product();
        let array = Array::from_shape_vec(IxDyn(sizes), (0..n).map(|v| v as f32).collect()).unwrap();
        Image::from_array(array.view()).unwrap()
    }

    #[test]
    fn test_new_image_has_normal_strides() {
        let img = Image::new(&[4, 3, 2], 3, DataType::UInt16).unwrap();
        assert_eq!(img.strides(), &[3, 12, 36]);
        assert_eq!(img.tensor_stride(), 1);
        assert_eq!(img.number_of_samples(), 72);
        assert_eq!(img.simple_stride(), Some((3, 0)));
    }

    #[test]
    fn test_array_round_trip() {
        let a = arr2(&[[1u8, 2, 3], [4, 5, 6]]).into_dyn();
        let img = Image::from_array(a.view()).unwrap();
        assert_eq!(img.sizes(), &[2, 3]);
        assert_eq!(img.sample_f64(&[1, 2], 0).unwrap(), 6.0);
        assert_eq!(img.to_array::<u8>().unwrap(), a);
    }

    #[test]
    fn test_tensor_array_round_trip() {
        let a = Array::from_shape_vec(IxDyn(&[2, 2, 3]), (0..12).map(|v| v as i16).collect()).unwrap();
        let img = Image::from_tensor_array(a.view()).unwrap();
        assert_eq!(img.sizes(), &[2, 2]);
        assert_eq!(img.tensor_elements(), 3);
        assert_eq!(img.sample_f64(&[1, 0], 2).unwrap(), 8.0);
        assert_eq!(img.to_array::<i16>().unwrap(), a);
    }

    #[test]
    fn test_window_and_alias() {
        let img = ramp(&[5, 4]);
        let win = img.window(&[1..3, 2..4]).unwrap();
        assert_eq!(win.sizes(), &[2, 2]);
        assert_eq!(win.sample_f64(&[0, 0], 0).unwrap(), 6.0);
        assert!(win.aliases(&img));
        let other = img.window(&[4..5, 0..1]).unwrap();
        assert!(!win.aliases(&other));
        assert!(win.shares_data(&other));
        assert!(img.window(&[0..6, 0..4]).is_err());
    }

    #[test]
    fn test_quick_copy_is_independent_descriptor() {
        let img = ramp(&[3, 2]);
        let mut view = img.clone();
        view.permute_dimensions(&[1, 0]).unwrap();
        assert_eq!(img.sizes(), &[3, 2]);
        assert_eq!(view.sizes(), &[2, 3]);
        assert_eq!(view.sample_f64(&[1, 2], 0).unwrap(), img.sample_f64(&[2, 1], 0).unwrap());
        let mut stripped = img.clone();
        stripped.strip();
        assert!(img.is_forged());
        assert!(!stripped.is_forged());
    }

    #[test]
    fn test_singleton_expansion() {
        let mut img = ramp(&[5, 1]);
        img.expand_singleton_dimensions(&[5, 7]).unwrap();
        assert_eq!(img.strides()[1], 0);
        assert_eq!(img.sample_f64(&[3, 6], 0).unwrap(), 3.0);
        assert!(!img.has_simple_stride());
        let mut bad = ramp(&[5, 2]);
        assert_eq!(
            bad.expand_singleton_dimensions(&[5, 7]),
            Err(Error::SizesDontMatch(vec![5, 2], vec![5, 7]))
        );
    }

    #[test]
    fn test_check_is_mask() {
        let mask = Image::new(&[5, 1], 1, DataType::Bin).unwrap();
        assert!(mask.check_is_mask(&[5, 1], false).is_ok());
        assert!(mask.check_is_mask(&[5, 7], true).is_ok());
        assert!(mask.check_is_mask(&[5, 7], false).is_err());
        assert!(mask.check_is_mask(&[4, 7], true).is_err());
        let not_binary = Image::new(&[5, 1], 1, DataType::UInt8).unwrap();
        assert!(not_binary.check_is_mask(&[5, 1], false).is_err());
        let vector = Image::new(&[5, 1], 2, DataType::Bin).unwrap();
        assert!(vector.check_is_mask(&[5, 1], false).is_err());
    }

    #[test]
    fn test_flatten_with_mirrored_stride() {
        let img = ramp(&[3, 2]);
        let mut mirrored = img.clone();
        mirrored.strides[1] = -3;
        mirrored.origin = 3;
        // array element [i, j] holds 2 * i + j and is stored at offset i + 3 * j
        assert_eq!(mirrored.sample_f64(&[0, 0], 0).unwrap(), 1.0);
        assert_eq!(mirrored.sample_f64(&[2, 1], 0).unwrap(), 4.0);
        assert!(!mirrored.same_dimension_order(&img));
        mirrored.flatten().unwrap();
        assert_eq!(mirrored.sizes(), &[6]);
        let values: Vec<f64> = (0..6).map(|i| mirrored.sample_f64(&[i], 0).unwrap()).collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_identical_view_is_not_overlapping() {
        let img = ramp(&[4, 3]);
        let same = img.clone();
        assert!(same.is_identical_view(&img));
        assert!(!same.is_overlapping_view(std::slice::from_ref(&img)));

        let shifted = img.window(&[1..4, 0..3]).unwrap();
        assert!(shifted.aliases(&img));
        assert!(!shifted.is_identical_view(&img));
        assert!(shifted.is_overlapping_view(std::slice::from_ref(&img)));

        let mut permuted = img.clone();
        permuted.permute_dimensions(&[1, 0]).unwrap();
        assert!(permuted.is_overlapping_view(std::slice::from_ref(&img)));
        assert!(!img.copy().unwrap().is_overlapping_view(std::slice::from_ref(&img)));
    }

    #[test]
    fn test_dimension_accessors_check_range() {
        let mut img = ramp(&[4, 1]);
        assert_eq!(img.size(0), Ok(4));
        assert_eq!(img.stride(1), Ok(4));
        assert_eq!(img.size(2), Err(Error::IndexOutOfRange("dimension 2".to_string())));
        assert!(matches!(img.stride(5), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(img.expand_singleton_dimension(3, 6), Err(Error::IndexOutOfRange(_))));
        img.expand_singleton_dimension(1, 6).unwrap();
        assert_eq!(img.sizes(), &[4, 6]);
    }

    #[test]
    fn test_flatten_as_much_as_possible_merges_contiguous_dims() {
        let img = ramp(&[4, 3, 2]);
        let mut view = img.window(&[0..4, 0..3, 1..2]).unwrap();
        view.flatten_as_much_as_possible();
        assert_eq!(view.sizes(), &[12]);
        let mut sub = img.window(&[0..2, 0..3, 0..2]).unwrap();
        sub.flatten_as_much_as_possible();
        assert_eq!(sub.sizes(), &[2, 6]);
        assert_eq!(sub.strides(), &[1, 4]);
    }

    #[test]
    fn test_convert_and_fill() {
        let img = ramp(&[2, 2]);
        let converted = img.convert(DataType::UInt8).unwrap();
        assert_eq!(converted.data_type(), DataType::UInt8);
        assert_eq!(converted.sample_f64(&[1, 1], 0).unwrap(), 3.0);
        // quick copies share samples
        let mut filled = converted.clone();
        filled.fill(-5i32).unwrap();
        assert_eq!(converted.sample_f64(&[0, 1], 0).unwrap(), 0.0);
    }

    #[test]
    fn test_tensor_to_spatial() {
        let mut img = Image::new(&[4, 5], 3, DataType::SFloat).unwrap();
        img.tensor_to_spatial();
        assert_eq!(img.sizes(), &[4, 5, 3]);
        assert_eq!(img.strides(), &[3, 12, 1]);
        assert!(img.is_scalar());
        assert!(img.has_simple_stride());
    }

    #[test]
    fn test_crop_window_locations() {
        assert_eq!(crop_window(&[8], &[4], CropLocation::Center).unwrap(), vec![2..6]);
        assert_eq!(crop_window(&[7], &[4], CropLocation::Center).unwrap(), vec![1..5]);
        assert_eq!(crop_window(&[7], &[4], CropLocation::MirrorCenter).unwrap(), vec![2..6]);
        assert_eq!(crop_window(&[7], &[4], CropLocation::BottomRight).unwrap(), vec![3..7]);
        assert_eq!("top left".parse::<CropLocation>().unwrap(), CropLocation::TopLeft);
        assert!(crop_window(&[3], &[4], CropLocation::TopLeft).is_err());
    }

    #[test]
    fn test_unforged_image_is_rejected() {
        let img = Image::header(&[3, 3], 1, DataType::UInt8);
        assert_eq!(img.offset(&[0, 0]), Err(Error::ImageNotForged));
        assert!(img.to_array::<u8>().is_err());
    }
}
