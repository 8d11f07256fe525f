//! Run-length encoded neighborhoods.
//!
//! A [`PixelTable`] lists the pixels of a structuring element as runs along
//! one processing dimension. Each run stores the coordinates of its first
//! pixel relative to the neighborhood center and a length. Runs are ordered
//! by their transverse coordinates, dimension 0 varying fastest.
//!
//! | Shape | Membership of offset `c` (half-extents `h`) |
//! |-------|---------------------------------------------|
//! | `rectangular` | `-size/2 <= c < size - size/2` |
//! | `elliptic` | `sum (c_i / h_i)^2 <= 1` |
//! | `diamond` | `sum |c_i| / h_i <= 1` |
//! | `line` | one pixel per step along the longest extent, corner to corner through the center |

use std::collections::HashSet;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::image::{to_isize, Bin, DataType, Image, Odometer};

/// Analytic neighborhood shapes a [`PixelTable`] can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborhoodShape {
    Rectangular,
    Elliptic,
    Diamond,
    /// A digital line spanning its bounding box. A negative extent runs the
    /// line from high to low coordinates along that dimension.
    Line,
}

impl FromStr for NeighborhoodShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rectangular" => Ok(NeighborhoodShape::Rectangular),
            "elliptic" => Ok(NeighborhoodShape::Elliptic),
            "diamond" => Ok(NeighborhoodShape::Diamond),
            "line" => Ok(NeighborhoodShape::Line),
            _ => Err(Error::parameter(format!("neighborhood shape not recognized: \"{s}\""))),
        }
    }
}

/// `length` pixels starting at `coordinates`, extending along the processing dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelRun {
    pub coordinates: Vec<isize>,
    pub length: usize,
}

/// A neighborhood as a list of runs along the processing dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTable {
    runs: Vec<PixelRun>,
    weights: Vec<f64>,
    sizes: Vec<usize>,
    origin: Vec<isize>,
    n_pixels: usize,
    proc_dim: usize,
}

fn check_proc_dim(proc_dim: usize, n_dims: usize) -> Result<()> {
    if n_dims == 0 {
        return Err(Error::parameter("a pixel table needs at least one dimension"));
    }
    if proc_dim >= n_dims {
        return Err(Error::parameter(format!(
            "processing dimension {proc_dim} out of range for {n_dims} dimensions"
        )));
    }
    Ok(())
}

impl PixelTable {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Builds the table for an analytic shape.
    ///
    /// # Arguments
    /// * `shape` - Shape of the neighborhood
    /// * `extents` - Diameter along each dimension. Values below 1 become 1.
    /// * `proc_dim` - Dimension along which runs go
    ///
    /// Elliptic and diamond neighborhoods get an odd bounding box so the
    /// center is a pixel: `sizes[d] = 2 * floor(extents[d] / 2) + 1`.
    pub fn from_shape(shape: NeighborhoodShape, extents: &[f64], proc_dim: usize) -> Result<Self> {
        let n_dims = extents.len();
        check_proc_dim(proc_dim, n_dims)?;
        if extents.iter().any(|e| !e.is_finite()) {
            return Err(Error::parameter("neighborhood extents must be finite"));
        }
        if shape == NeighborhoodShape::Line {
            return PixelTable::line(extents, proc_dim);
        }
        let extents: Vec<f64> = extents.iter().map(|&e| e.max(1.0)).collect();

        if shape == NeighborhoodShape::Rectangular {
            let sizes: Vec<usize> = extents.iter().map(|&e| e.floor() as usize).collect();
            let origin: Vec<isize> = sizes.iter().map(|&s| -((s / 2) as isize)).collect();
            let mut table = PixelTable::empty(sizes.clone(), origin.clone(), proc_dim);
            for position in Odometer::lines(&sizes, proc_dim) {
                let coordinates = position.iter().zip(&origin).map(|(&p, &o)| p as isize + o).collect();
                table.push_run(coordinates, sizes[proc_dim]);
            }
            return Ok(table);
        }

        let radius: Vec<usize> = extents.iter().map(|&e| (e / 2.0).floor() as usize).collect();
        let half: Vec<f64> = extents.iter().map(|&e| e / 2.0).collect();
        let sizes: Vec<usize> = radius.iter().map(|&r| 2 * r + 1).collect();
        let origin: Vec<isize> = radius.iter().map(|&r| -(r as isize)).collect();
        let term = |c: isize, d: usize| match shape {
            NeighborhoodShape::Elliptic => (c as f64 / half[d]).powi(2),
            _ => c.unsigned_abs() as f64 / half[d],
        };

        let mut table = PixelTable::empty(sizes.clone(), origin.clone(), proc_dim);
        for position in Odometer::lines(&sizes, proc_dim) {
            let mut coordinates: Vec<isize> = position.iter().zip(&origin).map(|(&p, &o)| p as isize + o).collect();
            let distance: f64 = (0..n_dims)
                .filter(|&d| d != proc_dim)
                .map(|d| term(coordinates[d], d))
                .sum();
            if distance > 1.0 {
                continue;
            }
            let mut k = 0usize;
            while k < radius[proc_dim] && distance + term(k as isize + 1, proc_dim) <= 1.0 {
                k += 1;
            }
            coordinates[proc_dim] = -(k as isize);
            table.push_run(coordinates, 2 * k + 1);
        }
        Ok(table)
    }

    /// Builds the table from a binary mask image.
    ///
    /// `center` gives the mask coordinates of the neighborhood center and
    /// defaults to `size / 2` along each dimension.
    pub fn from_mask(mask: &Image, center: Option<&[usize]>, proc_dim: usize) -> Result<Self> {
        mask.check_forged()?;
        if !mask.is_scalar() || mask.data_type() != DataType::Bin {
            return Err(Error::precondition("mask image must be scalar and binary"));
        }
        let sizes = mask.sizes().to_vec();
        PixelTable::from_predicate(&sizes, center, proc_dim, |coords| {
            Ok(mask.read_sample::<Bin>(mask.offset_of(coords)).is_set())
        })
    }

    /// Builds the table from a membership test evaluated over a box of `sizes`.
    /// Builds a digital line through the center of a box of `round(|extent|)`
    /// pixels per dimension. The line takes one pixel per step along the
    /// longest dimension, so it holds exactly `max(sizes)` pixels.
    fn line(extents: &[f64], proc_dim: usize) -> Result<Self> {
        let sizes: Vec<usize> = extents.iter().map(|e| (e.abs().round() as usize).max(1)).collect();
        let steps = sizes.iter().copied().max().unwrap_or(1);
        let mut points: HashSet<Vec<isize>> = HashSet::with_capacity(steps);
        for k in 0..steps {
            let point = sizes
                .iter()
                .zip(extents)
                .map(|(&s, &e)| {
                    let c = if steps == 1 {
                        0
                    } else {
                        (k as f64 * (s - 1) as f64 / (steps - 1) as f64).round() as isize
                    };
                    if e < 0.0 {
                        s as isize - 1 - c
                    } else {
                        c
                    }
                })
                .collect();
            points.insert(point);
        }
        PixelTable::from_predicate(&sizes, None, proc_dim, |c| Ok(points.contains(c)))
    }

    pub(crate) fn from_predicate<F>(sizes: &[usize], center: Option<&[usize]>, proc_dim: usize, member: F) -> Result<Self>
    where
        F: Fn(&[isize]) -> Result<bool>,
    {
        check_proc_dim(proc_dim, sizes.len())?;
        let origin: Vec<isize> = match center {
            Some(center) => {
                if center.len() != sizes.len() {
                    return Err(Error::ArrayWrongLength {
                        expected: sizes.len(),
                        actual: center.len(),
                    });
                }
                center.iter().map(|&c| -(c as isize)).collect()
            }
            None => sizes.iter().map(|&s| -((s / 2) as isize)).collect(),
        };
        let mut table = PixelTable::empty(sizes.to_vec(), origin.clone(), proc_dim);
        let length = sizes[proc_dim];
        for position in Odometer::lines(sizes, proc_dim) {
            let mut coords = to_isize(&position);
            let mut start: Option<usize> = None;
            for k in 0..=length {
                let set = k < length && {
                    coords[proc_dim] = k as isize;
                    member(&coords)?
                };
                match (set, start) {
                    (true, None) => start = Some(k),
                    (false, Some(s)) => {
                        let mut run: Vec<isize> = coords.iter().zip(&origin).map(|(&c, &o)| c + o).collect();
                        run[proc_dim] = s as isize + origin[proc_dim];
                        table.push_run(run, k - s);
                        start = None;
                    }
                    _ => {}
                }
            }
        }
        Ok(table)
    }

    fn empty(sizes: Vec<usize>, origin: Vec<isize>, proc_dim: usize) -> Self {
        PixelTable {
            runs: Vec::new(),
            weights: Vec::new(),
            sizes,
            origin,
            n_pixels: 0,
            proc_dim,
        }
    }

    fn push_run(&mut self, coordinates: Vec<isize>, length: usize) {
        self.n_pixels += length;
        self.runs.push(PixelRun { coordinates, length });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn runs(&self) -> &[PixelRun] {
        &self.runs
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    /// Bounding box of the neighborhood.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Coordinates of the bounding box corner relative to the center.
    pub fn origin(&self) -> &[isize] {
        &self.origin
    }

    pub fn number_of_pixels(&self) -> usize {
        self.n_pixels
    }

    pub fn processing_dimension(&self) -> usize {
        self.proc_dim
    }

    pub fn has_weights(&self) -> bool {
        !self.weights.is_empty()
    }

    /// One weight per pixel, in run order. Empty if the table has no weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Coordinates of every pixel, in run order.
    pub fn pixel_coordinates(&self) -> impl Iterator<Item = Vec<isize>> + '_ {
        let p = self.proc_dim;
        self.runs.iter().flat_map(move |run| {
            (0..run.length as isize).map(move |k| {
                let mut c = run.coordinates.clone();
                c[p] += k;
                c
            })
        })
    }

    // ========================================================================
    // Modification
    // ========================================================================

    /// Moves the neighborhood by `shift`: every run and the origin are translated by `-shift`.
    pub fn shift_origin(&mut self, shift: &[isize]) -> Result<()> {
        if shift.len() != self.sizes.len() {
            return Err(Error::ArrayWrongLength {
                expected: self.sizes.len(),
                actual: shift.len(),
            });
        }
        for (o, s) in self.origin.iter_mut().zip(shift) {
            *o -= s;
        }
        for run in &mut self.runs {
            for (c, s) in run.coordinates.iter_mut().zip(shift) {
                *c -= s;
            }
        }
        Ok(())
    }

    /// Point-mirrors the neighborhood through its center.
    pub fn mirror(&mut self) {
        let p = self.proc_dim;
        for run in &mut self.runs {
            let last = run.coordinates[p] + run.length as isize - 1;
            for c in run.coordinates.iter_mut() {
                *c = -*c;
            }
            run.coordinates[p] = -last;
        }
        self.runs.reverse();
        self.weights.reverse();
        for (o, &s) in self.origin.iter_mut().zip(&self.sizes) {
            *o = -(*o + s as isize - 1);
        }
    }

    /// Takes one weight per pixel from an image with the table's sizes.
    pub fn add_weights(&mut self, image: &Image) -> Result<()> {
        image.check_forged()?;
        if !image.is_scalar() || image.data_type().is_complex() {
            return Err(Error::precondition("weights image must be scalar and real"));
        }
        if image.sizes() != self.sizes.as_slice() {
            return Err(Error::SizesDontMatch(image.sizes().to_vec(), self.sizes.clone()));
        }
        let origin = self.origin.clone();
        self.weights = self
            .pixel_coordinates()
            .map(|c| {
                let index: Vec<isize> = c.iter().zip(&origin).map(|(&c, &o)| c - o).collect();
                image.read_sample::<f64>(image.offset_of(&index))
            })
            .collect();
        Ok(())
    }

    /// Uses the Euclidean distance of each pixel to the center as its weight.
    pub fn add_distance_to_origin_as_weights(&mut self) {
        self.weights = self
            .pixel_coordinates()
            .map(|c| c.iter().map(|&v| (v * v) as f64).sum::<f64>().sqrt())
            .collect();
    }

    /// Renders the table into an image of its bounding box.
    ///
    /// Without weights the image is binary. With weights it is `dfloat`,
    /// holding each pixel's weight and zero outside the neighborhood.
    pub fn as_image(&self) -> Result<Image> {
        let weighted = self.has_weights();
        let data_type = if weighted { DataType::DFloat } else { DataType::Bin };
        let mut out = Image::new(&self.sizes, 1, data_type)?;
        for (i, c) in self.pixel_coordinates().enumerate() {
            let index: Vec<usize> = c.iter().zip(&self.origin).map(|(&c, &o)| (c - o) as usize).collect();
            if weighted {
                out.set_sample(&index, 0, self.weights[i])?;
            } else {
                out.set_sample(&index, 0, Bin::TRUE)?;
            }
        }
        Ok(out)
    }

    /// Binds the table to an image's strides.
    pub fn offsets(&self, image: &Image) -> Result<PixelTableOffsets> {
        self.offsets_for_strides(image.strides())
    }

    /// Binds the table to the given strides, in samples.
    pub fn offsets_for_strides(&self, strides: &[isize]) -> Result<PixelTableOffsets> {
        if strides.len() != self.sizes.len() {
            return Err(Error::ArrayWrongLength {
                expected: self.sizes.len(),
                actual: strides.len(),
            });
        }
        let runs = self
            .runs
            .iter()
            .map(|run| PixelRunOffset {
                offset: run.coordinates.iter().zip(strides).map(|(&c, &s)| c * s).sum(),
                length: run.length,
            })
            .collect();
        Ok(PixelTableOffsets {
            runs,
            weights: self.weights.clone(),
            stride: strides[self.proc_dim],
            n_pixels: self.n_pixels,
            proc_dim: self.proc_dim,
        })
    }
}

/// A run translated to a sample offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRunOffset {
    pub offset: isize,
    pub length: usize,
}

/// A [`PixelTable`] bound to the strides of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTableOffsets {
    runs: Vec<PixelRunOffset>,
    weights: Vec<f64>,
    stride: isize,
    n_pixels: usize,
    proc_dim: usize,
}

impl PixelTableOffsets {
    pub fn runs(&self) -> &[PixelRunOffset] {
        &self.runs
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn has_weights(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Stride of the image along the processing dimension.
    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn number_of_pixels(&self) -> usize {
        self.n_pixels
    }

    pub fn processing_dimension(&self) -> usize {
        self.proc_dim
    }

    /// Offset of every pixel, in run order.
    pub fn iter(&self) -> impl Iterator<Item = isize> + '_ {
        let stride = self.stride;
        self.runs
            .iter()
            .flat_map(move |run| (0..run.length as isize).map(move |k| run.offset + k * stride))
    }
}
