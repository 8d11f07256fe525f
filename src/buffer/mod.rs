//! Buffer cast and fill primitives.
//!
//! These are the only functions that turn a runtime [`DataType`] into concrete
//! sample types for bulk copies. Everything above them (boundary extension,
//! the frameworks) works on type-erased [`RawLine`] descriptors.
//!
//! ## Operations
//!
//! | Function | Effect |
//! |----------|--------|
//! | [`copy_buffer`] | Strided, type-converting copy of `pixels` pixels, optional tensor look-up table |
//! | [`fill_buffer`] | Strided constant fill of `pixels` pixels |

pub mod line;

use std::ptr;

use crate::image::datatype::dispatch_data_type;
use crate::image::{clamp_cast, DataType, Sample};

pub use line::{Line, LineBuffer};

/// A type-erased strided 1D buffer: base pointer, sample type and strides in samples.
#[derive(Debug, Clone, Copy)]
pub struct RawLine {
    pub ptr: *mut u8,
    pub data_type: DataType,
    pub stride: isize,
    pub tensor_stride: isize,
}

impl RawLine {
    pub fn new(ptr: *mut u8, data_type: DataType, stride: isize, tensor_stride: isize) -> Self {
        RawLine {
            ptr,
            data_type,
            stride,
            tensor_stride,
        }
    }

    /// The same line moved by `offset` samples.
    pub fn offset(self, offset: isize) -> Self {
        RawLine {
            ptr: self
                .ptr
                .wrapping_offset(offset * self.data_type.size_of() as isize),
            ..self
        }
    }
}

unsafe fn copy_typed<S: Sample, D: Sample>(
    src: RawLine,
    dst: RawLine,
    pixels: usize,
    tensor_elements: usize,
    look_up_table: Option<&[isize]>,
) {
    let src_ptr = src.ptr as *const S;
    let dst_ptr = dst.ptr as *mut D;
    for p in 0..pixels as isize {
        let s = src_ptr.wrapping_offset(p * src.stride);
        let d = dst_ptr.wrapping_offset(p * dst.stride);
        match look_up_table {
            None => {
                for t in 0..tensor_elements as isize {
                    let v: S = ptr::read(s.wrapping_offset(t * src.tensor_stride));
                    ptr::write(d.wrapping_offset(t * dst.tensor_stride), clamp_cast(v));
                }
            }
            Some(lut) => {
                for (t, &index) in lut.iter().enumerate() {
                    let v = if index < 0 {
                        D::default()
                    } else {
                        clamp_cast(ptr::read(s.wrapping_offset(index * src.tensor_stride)))
                    };
                    ptr::write(d.wrapping_offset(t as isize * dst.tensor_stride), v);
                }
            }
        }
    }
}

/// Copies `pixels` pixels from `src` to `dst`, converting sample types.
///
/// With a look-up table, `dst` receives `look_up_table.len()` tensor elements
/// per pixel: element `t` is copied from source element `look_up_table[t]`, or
/// set to zero where the table holds `-1`. Without one, `tensor_elements`
/// elements are copied as they are. A source stride of 0 repeats one pixel.
///
/// # Safety
///
/// Every addressed sample of `src` must be readable and every addressed
/// sample of `dst` writable, with the alignment of their data types.
pub unsafe fn copy_buffer(
    src: RawLine,
    dst: RawLine,
    pixels: usize,
    tensor_elements: usize,
    look_up_table: Option<&[isize]>,
) {
    dispatch_data_type!(src.data_type, S => {
        dispatch_data_type!(dst.data_type, D => {
            copy_typed::<S, D>(src, dst, pixels, tensor_elements, look_up_table)
        })
    })
}

unsafe fn fill_typed<V: Sample, D: Sample>(dst: RawLine, pixels: usize, tensor_elements: usize, value: V) {
    let v: D = clamp_cast(value);
    let dst_ptr = dst.ptr as *mut D;
    for p in 0..pixels as isize {
        let d = dst_ptr.wrapping_offset(p * dst.stride);
        for t in 0..tensor_elements as isize {
            ptr::write(d.wrapping_offset(t * dst.tensor_stride), v);
        }
    }
}

/// Writes `value`, cast to the buffer's type, to every sample of `pixels` pixels.
///
/// # Safety
///
/// Every addressed sample of `dst` must be writable.
pub unsafe fn fill_buffer<V: Sample>(dst: RawLine, pixels: usize, tensor_elements: usize, value: V) {
    dispatch_data_type!(dst.data_type, D => fill_typed::<V, D>(dst, pixels, tensor_elements, value))
}
