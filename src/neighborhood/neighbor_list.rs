//! Lists of neighbor offsets with their distances.
//!
//! Used by algorithms that visit the direct neighbors of a pixel, such as
//! propagation and distance transforms. Neighbors are stored in scan order,
//! dimension 0 varying fastest.

use crate::error::{Error, Result};
use crate::image::{DataType, Image, Odometer};

/// How to build a [`NeighborList`].
#[derive(Debug, Clone)]
pub enum Metric {
    /// All offsets in the 3x3x.. cube with at most this many non-zero
    /// coordinates. `0` means the full cube.
    Connected(usize),
    /// Chamfer neighborhood reaching this many pixels along each axis, with
    /// distances optimized for distance transforms. Must be at least 1.
    Chamfer(usize),
    /// Offsets and distances read from an odd-sized image.
    Image(Image),
}

impl Metric {
    /// Named metrics: "connected" and "chamfer" (both use `param`), "city", "chess",
    /// "4-connected", "8-connected", "6-connected", "18-connected", "26-connected".
    pub fn from_name(name: &str, param: usize) -> Result<Self> {
        if name == "chamfer" {
            return Ok(Metric::Chamfer(param));
        }
        Ok(Metric::Connected(match name {
            "connected" => param,
            "city" | "4-connected" | "6-connected" => 1,
            "chess" => 0,
            "8-connected" | "18-connected" => 2,
            "26-connected" => 3,
            _ => return Err(Error::parameter(format!("metric not recognized: \"{name}\""))),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub coordinates: Vec<isize>,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborList {
    neighbors: Vec<Neighbor>,
    n_dims: usize,
}

/// Pads or crops `pixel_size` to `n_dims` entries. A short array repeats its last value; an empty one is all 1.
fn fix_up_pixel_size(pixel_size: &[f64], n_dims: usize) -> Vec<f64> {
    let fill = pixel_size.last().copied().unwrap_or(1.0);
    (0..n_dims).map(|d| pixel_size.get(d).copied().unwrap_or(fill)).collect()
}

impl NeighborList {
    pub fn new(metric: &Metric, n_dims: usize, pixel_size: &[f64]) -> Result<Self> {
        match metric {
            Metric::Connected(connectivity) => NeighborList::connectivity(n_dims, *connectivity, pixel_size),
            Metric::Chamfer(max_distance) => NeighborList::chamfer(n_dims, *max_distance, pixel_size),
            Metric::Image(image) => NeighborList::from_metric_image(n_dims, image),
        }
    }

    /// All offsets in `{-1, 0, 1}^n_dims` with between 1 and `connectivity` non-zero coordinates.
    ///
    /// The distance of each neighbor is the Euclidean length of the offset in
    /// physical units, using `pixel_size`.
    pub fn connectivity(n_dims: usize, connectivity: usize, pixel_size: &[f64]) -> Result<Self> {
        if n_dims == 0 {
            return Err(Error::parameter("neighbor lists need at least one dimension"));
        }
        if connectivity > n_dims {
            return Err(Error::parameter(format!(
                "connectivity {connectivity} exceeds dimensionality {n_dims}"
            )));
        }
        let connectivity = if connectivity == 0 { n_dims } else { connectivity };
        let squared: Vec<f64> = fix_up_pixel_size(pixel_size, n_dims).iter().map(|p| p * p).collect();
        let neighbors = Odometer::new(&vec![3; n_dims])
            .filter_map(|position| {
                let coordinates: Vec<isize> = position.iter().map(|&p| p as isize - 1).collect();
                let non_zero: Vec<usize> = (0..n_dims).filter(|&d| coordinates[d] != 0).collect();
                if non_zero.is_empty() || non_zero.len() > connectivity {
                    return None;
                }
                let distance = non_zero.iter().map(|&d| squared[d]).sum::<f64>().sqrt();
                Some(Neighbor { coordinates, distance })
            })
            .collect();
        Ok(NeighborList { neighbors, n_dims })
    }

    /// Chamfer neighbors: all offsets in `[-max_distance, max_distance]^n_dims`
    /// with at least one coordinate equal to +1 or -1.
    ///
    /// For 2D and 3D with `max_distance` 1 or 2, distances are the physical
    /// Euclidean lengths scaled by the optimal chamfer weights for that
    /// offset class. Otherwise they are the plain Euclidean lengths. In 1D
    /// only the two direct neighbors are listed.
    pub fn chamfer(n_dims: usize, max_distance: usize, pixel_size: &[f64]) -> Result<Self> {
        if n_dims == 0 {
            return Err(Error::parameter("neighbor lists need at least one dimension"));
        }
        if max_distance == 0 {
            return Err(Error::parameter("chamfer distance must be at least 1"));
        }
        let pixel_size = fix_up_pixel_size(pixel_size, n_dims);
        if n_dims == 1 {
            let neighbors = [-1, 1]
                .into_iter()
                .map(|c| Neighbor {
                    coordinates: vec![c],
                    distance: pixel_size[0],
                })
                .collect();
            return Ok(NeighborList { neighbors, n_dims });
        }
        let weights = chamfer_weights(n_dims, max_distance);
        let lim = max_distance as isize;
        let neighbors = Odometer::new(&vec![2 * max_distance + 1; n_dims])
            .filter_map(|position| {
                let coordinates: Vec<isize> = position.iter().map(|&p| p as isize - lim).collect();
                if !coordinates.iter().any(|c| c.abs() == 1) {
                    return None;
                }
                let length = coordinates
                    .iter()
                    .zip(&pixel_size)
                    .map(|(&c, &p)| (c as f64 * p).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let factor = match weights {
                    Some(table) => {
                        let squared: isize = coordinates.iter().map(|c| c * c).sum();
                        table
                            .iter()
                            .find(|(k, _)| *k == squared)
                            .map_or(1.0, |&(k, w)| w / (k as f64).sqrt())
                    }
                    None => 1.0,
                };
                Some(Neighbor {
                    coordinates,
                    distance: length * factor,
                })
            })
            .collect();
        Ok(NeighborList { neighbors, n_dims })
    }

    /// Every positive sample of `metric` is a neighbor at its offset from the image center.
    pub fn from_metric_image(n_dims: usize, metric: &Image) -> Result<Self> {
        if n_dims == 0 {
            return Err(Error::parameter("neighbor lists need at least one dimension"));
        }
        metric.check_forged()?;
        if !metric.is_scalar() || metric.data_type().is_complex() {
            return Err(Error::precondition("metric image must be scalar and real"));
        }
        if metric.dimensionality() > n_dims {
            return Err(Error::DimensionalityMismatch(metric.dimensionality(), n_dims));
        }
        let mut metric = metric.clone();
        metric.expand_dimensionality(n_dims);
        if metric.sizes().iter().any(|s| s % 2 == 0) {
            return Err(Error::parameter("Metric image must be odd in size"));
        }
        let metric = metric.convert(DataType::DFloat)?;
        let center: Vec<isize> = metric.sizes().iter().map(|&s| (s / 2) as isize).collect();
        let mut neighbors = Vec::new();
        for position in Odometer::new(metric.sizes()) {
            let distance = metric.sample_f64(&position, 0)?;
            if distance > 0.0 {
                let coordinates: Vec<isize> = position.iter().zip(&center).map(|(&p, &c)| p as isize - c).collect();
                if coordinates.iter().all(|&c| c == 0) {
                    return Err(Error::parameter("Metric image must have a distance of 0 in the middle"));
                }
                neighbors.push(Neighbor { coordinates, distance });
            }
        }
        Ok(NeighborList { neighbors, n_dims })
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn dimensionality(&self) -> usize {
        self.n_dims
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.neighbors.iter()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.neighbors.iter().map(|n| n.distance).collect()
    }

    /// Sample offsets of the neighbors in an image with the given strides.
    pub fn compute_offsets(&self, strides: &[isize]) -> Result<Vec<isize>> {
        if strides.len() != self.n_dims {
            return Err(Error::ArrayWrongLength {
                expected: self.n_dims,
                actual: strides.len(),
            });
        }
        Ok(self
            .neighbors
            .iter()
            .map(|n| n.coordinates.iter().zip(strides).map(|(&c, &s)| c * s).sum())
            .collect())
    }

    /// Largest absolute offset along each dimension.
    pub fn border(&self) -> Vec<usize> {
        let mut border = vec![0; self.n_dims];
        for n in &self.neighbors {
            for (b, &c) in border.iter_mut().zip(&n.coordinates) {
                *b = (*b).max(c.unsigned_abs());
            }
        }
        border
    }

    /// Neighbors visited before the current pixel in a forward scan along `proc_dim`.
    pub fn select_backward(&self, proc_dim: usize) -> NeighborList {
        self.select(proc_dim, true)
    }

    /// Neighbors visited after the current pixel in a forward scan along `proc_dim`.
    pub fn select_forward(&self, proc_dim: usize) -> NeighborList {
        self.select(proc_dim, false)
    }

    fn select(&self, proc_dim: usize, processed: bool) -> NeighborList {
        let proc_dim = if proc_dim >= self.n_dims { 0 } else { proc_dim };
        NeighborList {
            neighbors: self
                .neighbors
                .iter()
                .filter(|n| is_processed(&n.coordinates, proc_dim) == processed)
                .cloned()
                .collect(),
            n_dims: self.n_dims,
        }
    }
}

const CHAMFER_2D_1: &[(isize, f64)] = &[(1, 0.9481), (2, 1.3408)];
const CHAMFER_2D_2: &[(isize, f64)] = &[(1, 0.9801), (2, 1.4060), (5, 2.2044)];
const CHAMFER_3D_1: &[(isize, f64)] = &[(1, 0.8939539326), (2, 1.340863402), (3, 1.587920248)];
const CHAMFER_3D_2: &[(isize, f64)] = &[(1, 0.9556), (2, 1.3956), (3, 1.7257), (5, 2.1830), (6, 2.3885), (9, 2.9540)];

/// Optimal chamfer distances for unit pixels, keyed by the squared length of the offset.
fn chamfer_weights(n_dims: usize, max_distance: usize) -> Option<&'static [(isize, f64)]> {
    match (n_dims, max_distance) {
        (2, 1) => Some(CHAMFER_2D_1),
        (2, 2) => Some(CHAMFER_2D_2),
        (3, 1) => Some(CHAMFER_3D_1),
        (3, 2) => Some(CHAMFER_3D_2),
        _ => None,
    }
}

/// Whether a scan that walks lines along `proc_dim` has already visited the pixel at `coords`.
fn is_processed(coords: &[isize], proc_dim: usize) -> bool {
    for d in (0..coords.len()).rev() {
        if d == proc_dim {
            continue;
        }
        if coords[d] > 0 {
            return false;
        }
        if coords[d] < 0 {
            return true;
        }
    }
    coords[proc_dim] < 0
}

impl<'a> IntoIterator for &'a NeighborList {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_connected_2d_with_anisotropic_pixels() {
        let (x, y) = (1.2, 1.6);
        let diag = f64::hypot(x, y);
        let list = NeighborList::new(&Metric::from_name("connected", 2).unwrap(), 2, &[x, y]).unwrap();
        assert_eq!(list.len(), 8);
        let expected = [diag, y, diag, x, x, diag, y, diag];
        for (got, want) in list.distances().iter().zip(expected) {
            assert!(approx(*got, want));
        }
        let offsets = list.compute_offsets(&[1, 10]).unwrap();
        assert_eq!(offsets, vec![-11, -10, -9, -1, 1, 9, 10, 11]);
        assert_eq!(list.border(), vec![1, 1]);
        assert!(list.compute_offsets(&[1]).is_err());
    }

    #[test]
    fn test_connectivity_counts() {
        assert_eq!(NeighborList::connectivity(2, 1, &[]).unwrap().len(), 4);
        assert_eq!(NeighborList::connectivity(3, 1, &[]).unwrap().len(), 6);
        assert_eq!(NeighborList::connectivity(3, 2, &[]).unwrap().len(), 18);
        assert_eq!(NeighborList::connectivity(3, 0, &[]).unwrap().len(), 26);
        assert!(NeighborList::connectivity(2, 3, &[]).is_err());
        // a short pixel size array repeats its last value
        let list = NeighborList::connectivity(3, 1, &[2.0]).unwrap();
        assert!(list.distances().iter().all(|&d| approx(d, 2.0)));
    }

    #[test]
    fn test_backward_and_forward_split_the_list() {
        let list = NeighborList::connectivity(2, 0, &[]).unwrap();
        let back = list.select_backward(0);
        let fwd = list.select_forward(0);
        assert_eq!(back.len() + fwd.len(), list.len());
        assert_eq!(back.len(), 4);
        // backward along dim 0: the row above and the left neighbor
        let coords: Vec<Vec<isize>> = back.iter().map(|n| n.coordinates.clone()).collect();
        assert_eq!(coords, vec![vec![-1, -1], vec![0, -1], vec![1, -1], vec![-1, 0]]);
        let along_1: Vec<Vec<isize>> = list.select_backward(1).iter().map(|n| n.coordinates.clone()).collect();
        assert!(along_1.contains(&vec![-1, 1]));
        assert!(along_1.contains(&vec![0, -1]));
        assert!(!along_1.contains(&vec![1, -1]));
    }

    #[test]
    fn test_metric_image() {
        let mut metric = Image::new(&[3, 3], 1, DataType::UInt8).unwrap();
        metric.set_sample(&[0, 1], 0, 5u8).unwrap();
        metric.set_sample(&[2, 2], 0, 7u8).unwrap();
        let list = NeighborList::new(&Metric::Image(metric.clone()), 2, &[]).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().next().unwrap().coordinates, vec![-1, 0]);
        assert_eq!(list.distances(), vec![5.0, 7.0]);

        metric.set_sample(&[1, 1], 0, 1u8).unwrap();
        let err = NeighborList::from_metric_image(2, &metric).unwrap_err();
        assert_eq!(err, Error::parameter("Metric image must have a distance of 0 in the middle"));
        let even = Image::new(&[4, 3], 1, DataType::UInt8).unwrap();
        assert!(NeighborList::from_metric_image(2, &even).is_err());
        assert!(NeighborList::from_metric_image(1, &even).is_err());
    }

    #[test]
    fn test_metric_names() {
        assert!(matches!(Metric::from_name("chess", 7).unwrap(), Metric::Connected(0)));
        assert!(matches!(Metric::from_name("4-connected", 0).unwrap(), Metric::Connected(1)));
        assert!(matches!(Metric::from_name("chamfer", 2).unwrap(), Metric::Chamfer(2)));
        assert!(Metric::from_name("hexagonal", 1).is_err());
    }

    #[test]
    fn test_chamfer_1d_lists_direct_neighbors() {
        let list = NeighborList::new(&Metric::Chamfer(3), 1, &[0.5]).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.distances(), vec![0.5, 0.5]);
        assert!(NeighborList::chamfer(2, 0, &[]).is_err());
        assert!(NeighborList::chamfer(0, 1, &[]).is_err());
    }

    #[test]
    fn test_chamfer_2d_uses_optimized_weights() {
        let list = NeighborList::chamfer(2, 1, &[]).unwrap();
        assert_eq!(list.len(), 8);
        let expected = [1.3408, 0.9481, 1.3408, 0.9481, 0.9481, 1.3408, 0.9481, 1.3408];
        for (got, want) in list.distances().iter().zip(expected) {
            assert!(approx(*got, want));
        }

        let (x, y) = (1.0, 2.0);
        let list = NeighborList::chamfer(2, 2, &[x, y]).unwrap();
        assert_eq!(list.len(), 16);
        assert_eq!(list.border(), vec![2, 2]);
        let first = list.iter().next().unwrap();
        assert_eq!(first.coordinates, vec![-1, -2]);
        assert!(approx(first.distance, f64::hypot(x, 2.0 * y) * 2.2044 / 5f64.sqrt()));
        let up = list.iter().find(|n| n.coordinates == vec![0, -1]).unwrap();
        assert!(approx(up.distance, y * 0.9801));
        assert!(list.iter().all(|n| n.coordinates != vec![0, 2]));
    }

    #[test]
    fn test_chamfer_3d_counts_and_weights() {
        let near = NeighborList::chamfer(3, 1, &[]).unwrap();
        assert_eq!(near.len(), 26);
        let corner = near.iter().next().unwrap();
        assert_eq!(corner.coordinates, vec![-1, -1, -1]);
        assert!(approx(corner.distance, 1.587920248));

        let far = NeighborList::chamfer(3, 2, &[]).unwrap();
        assert_eq!(far.len(), 98);
        let knight = far.iter().find(|n| n.coordinates == vec![1, 2, 2]).unwrap();
        assert!(approx(knight.distance, 2.9540));
        assert!(far.iter().all(|n| n.coordinates != vec![2, 0, 2]));
    }

    #[test]
    fn test_chamfer_beyond_tabulated_sizes_uses_euclidean_lengths() {
        let list = NeighborList::chamfer(2, 3, &[2.0]).unwrap();
        // 7x7 offsets minus the 25 built only from {-3, -2, 0, 2, 3}
        assert_eq!(list.len(), 49 - 25);
        let far = list.iter().find(|n| n.coordinates == vec![3, 1]).unwrap();
        assert!(approx(far.distance, 2.0 * 10f64.sqrt()));
        assert_eq!(list.border(), vec![3, 3]);

        let list = NeighborList::chamfer(4, 1, &[]).unwrap();
        assert_eq!(list.len(), 80);
        assert!(approx(list.distances()[0], 2.0));
    }
}
