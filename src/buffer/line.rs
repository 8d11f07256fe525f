//! Line buffer descriptors handed to line filters.
//!
//! A [`LineBuffer`] either points straight into image memory or into a
//! per-thread scratch buffer; the filter can't tell the difference. Sample
//! access goes through [`Line`], which checks the sample type once and every
//! address against the storage the buffer lives in.

use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr;

use crate::error::{Error, Result};
use crate::image::{DataBlock, DataType, Sample};

use super::RawLine;

/// A strided 1D buffer of pixels, each with `tensor_length` samples.
#[derive(Debug, Clone, Copy)]
pub struct LineBuffer {
    pub(crate) ptr: *mut u8,
    pub(crate) data_type: DataType,
    pub(crate) stride: isize,
    pub(crate) tensor_stride: isize,
    pub(crate) tensor_length: usize,
    pub(crate) length: usize,
    pub(crate) border: usize,
    pub(crate) lo: *const u8,
    pub(crate) hi: *const u8,
}

impl LineBuffer {
    pub(crate) fn new(
        raw: RawLine,
        tensor_length: usize,
        length: usize,
        border: usize,
        storage: (*const u8, *const u8),
    ) -> Self {
        LineBuffer {
            ptr: raw.ptr,
            data_type: raw.data_type,
            stride: raw.stride,
            tensor_stride: raw.tensor_stride,
            tensor_length,
            length,
            border,
            lo: storage.0,
            hi: storage.1,
        }
    }

    /// A descriptor over a scratch block, with pixel 0 placed after `border` pixels of margin.
    pub(crate) fn in_scratch(
        block: &DataBlock,
        data_type: DataType,
        stride: isize,
        tensor_stride: isize,
        tensor_length: usize,
        length: usize,
        border: usize,
    ) -> Self {
        let origin = block
            .as_ptr()
            .wrapping_add(border * stride.unsigned_abs() * data_type.size_of());
        LineBuffer::new(
            RawLine::new(origin, data_type, stride, tensor_stride),
            tensor_length,
            length,
            border,
            (block.as_ptr(), block.end_ptr()),
        )
    }

    pub(crate) fn raw(&self) -> RawLine {
        RawLine::new(self.ptr, self.data_type, self.stride, self.tensor_stride)
    }

    pub(crate) fn set_origin(&mut self, raw: RawLine) {
        self.ptr = raw.ptr;
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Distance between consecutive pixels, in samples.
    pub fn stride(&self) -> isize {
        self.stride
    }

    /// Distance between consecutive tensor elements of a pixel, in samples.
    pub fn tensor_stride(&self) -> isize {
        self.tensor_stride
    }

    pub fn tensor_length(&self) -> usize {
        self.tensor_length
    }

    /// Number of pixels in the line, not counting the border.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of valid pixels on either side of the line.
    pub fn border(&self) -> usize {
        self.border
    }

    /// Typed access to the samples. Fails if `T` is not the buffer's sample type.
    pub fn typed<T: Sample>(&self) -> Result<Line<'_, T>> {
        if T::DATA_TYPE != self.data_type {
            return Err(Error::precondition(format!(
                "line buffer holds {} samples, not {}",
                self.data_type,
                T::DATA_TYPE
            )));
        }
        Ok(Line {
            ptr: self.ptr as *mut T,
            stride: self.stride,
            tensor_stride: self.tensor_stride,
            tensor_length: self.tensor_length,
            length: self.length,
            lo: self.lo,
            hi: self.hi,
            _marker: PhantomData,
        })
    }
}

/// Typed, bounds-checked view of a [`LineBuffer`].
#[derive(Debug)]
pub struct Line<'a, T: Sample> {
    ptr: *mut T,
    stride: isize,
    tensor_stride: isize,
    tensor_length: usize,
    length: usize,
    lo: *const u8,
    hi: *const u8,
    _marker: PhantomData<&'a T>,
}

impl<T: Sample> Line<'_, T> {
    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn tensor_stride(&self) -> isize {
        self.tensor_stride
    }

    pub fn tensor_length(&self) -> usize {
        self.tensor_length
    }

    pub fn length(&self) -> usize {
        self.length
    }

    fn address(&self, offset: isize) -> *mut T {
        let p = self.ptr.wrapping_offset(offset);
        let start = p as usize;
        assert!(
            start >= self.lo as usize && start + size_of::<T>() <= self.hi as usize,
            "line buffer access at offset {offset} is outside its storage"
        );
        p
    }

    /// Sample at a raw offset (in samples) from the line origin.
    pub fn read(&self, offset: isize) -> T {
        // SAFETY: `address` checked the sample lies inside the storage.
        unsafe { ptr::read(self.address(offset)) }
    }

    /// Writes a sample at a raw offset (in samples) from the line origin.
    pub fn write(&self, offset: isize, value: T) {
        // SAFETY: as in `read`; each thread owns the lines it writes.
        unsafe { ptr::write(self.address(offset), value) }
    }

    /// Tensor element `element` of pixel `pixel`. Negative pixels reach into the border.
    pub fn get(&self, pixel: isize, element: usize) -> T {
        self.read(pixel * self.stride + element as isize * self.tensor_stride)
    }

    pub fn set(&self, pixel: isize, element: usize, value: T) {
        self.write(pixel * self.stride + element as isize * self.tensor_stride, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access_with_border() {
        let block = DataBlock::new(8 * 4).unwrap();
        let buffer = LineBuffer::in_scratch(&block, DataType::SFloat, 1, 1, 1, 6, 1);
        let line = buffer.typed::<f32>().unwrap();
        line.set(-1, 0, 2.0);
        line.set(6, 0, 3.0);
        assert_eq!(line.get(-1, 0), 2.0);
        assert_eq!(line.read(6), 3.0);
        assert!(buffer.typed::<f64>().is_err());
    }

    #[test]
    #[should_panic]
    fn test_out_of_storage_access_panics() {
        let block = DataBlock::new(4 * 4).unwrap();
        let buffer = LineBuffer::in_scratch(&block, DataType::UInt32, 1, 1, 1, 4, 0);
        let line = buffer.typed::<u32>().unwrap();
        line.get(4, 0);
    }
}
