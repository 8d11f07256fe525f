//! Tensor shape of a pixel: how many samples a pixel has and how they map to a matrix.

use crate::error::{Error, Result};

/// Storage layout of the per-pixel tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorShape {
    ColVector,
    RowVector,
    ColMajorMatrix,
    RowMajorMatrix,
    DiagonalMatrix,
    /// Diagonal first, then the upper triangle column by column (xx yy zz xy xz yz).
    SymmetricMatrix,
    UpperTriangular,
    LowerTriangular,
}

/// Shape of the tensor stored at each pixel. A scalar image has a 1-element column vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tensor {
    shape: TensorShape,
    elements: usize,
    rows: usize,
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor::scalar()
    }
}

fn n_upper_diagonal_elements(rows: usize) -> usize {
    rows * (rows + 1) / 2
}

impl Tensor {
    pub fn scalar() -> Self {
        Tensor {
            shape: TensorShape::ColVector,
            elements: 1,
            rows: 1,
        }
    }

    pub fn vector(n: usize) -> Self {
        Tensor {
            shape: TensorShape::ColVector,
            elements: n.max(1),
            rows: n.max(1),
        }
    }

    /// A column-major matrix, or a column vector if `cols == 1`.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        if cols == 1 {
            return Tensor::vector(rows);
        }
        Tensor {
            shape: TensorShape::ColMajorMatrix,
            elements: rows * cols,
            rows,
        }
    }

    /// Builds a tensor with the given storage shape.
    pub fn with_shape(shape: TensorShape, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::parameter("tensor dimensions must be positive"));
        }
        let square = |what: &str| {
            if rows != cols {
                Err(Error::parameter(format!("a {what} matrix must be square")))
            } else {
                Ok(())
            }
        };
        let (elements, stored_rows) = match shape {
            TensorShape::ColVector => {
                if cols != 1 {
                    return Err(Error::parameter("a column vector can have only one column"));
                }
                (rows, rows)
            }
            TensorShape::RowVector => {
                if rows != 1 {
                    return Err(Error::parameter("a row vector can have only one row"));
                }
                (cols, 1)
            }
            TensorShape::ColMajorMatrix | TensorShape::RowMajorMatrix => (rows * cols, rows),
            TensorShape::DiagonalMatrix => {
                square("diagonal")?;
                (rows, rows)
            }
            TensorShape::SymmetricMatrix => {
                square("symmetric")?;
                (n_upper_diagonal_elements(rows), rows)
            }
            TensorShape::UpperTriangular | TensorShape::LowerTriangular => {
                square("triangular")?;
                (n_upper_diagonal_elements(rows), rows)
            }
        };
        Ok(Tensor {
            shape,
            elements,
            rows: stored_rows,
        })
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        match self.shape {
            TensorShape::ColVector => 1,
            TensorShape::RowVector => self.elements,
            TensorShape::ColMajorMatrix | TensorShape::RowMajorMatrix => self.elements / self.rows,
            _ => self.rows,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.elements == 1
    }

    /// True for shapes stored in plain column-major order: vectors and non-transposed matrices.
    pub fn has_normal_order(&self) -> bool {
        matches!(
            self.shape,
            TensorShape::ColVector | TensorShape::RowVector | TensorShape::ColMajorMatrix
        )
    }

    /// Maps each dense matrix position to a stored element.
    ///
    /// Element `(m, n)` of a tensor with `M` rows is found at index `n * M + m`
    /// of the returned table. A value of `-1` means the element is not stored
    /// and is implicitly zero.
    pub fn look_up_table(&self) -> Vec<isize> {
        let m_rows = self.rows;
        let n_cols = self.columns();
        let mut lut = vec![-1isize; m_rows * n_cols];
        let mut index = 0isize;
        match self.shape {
            TensorShape::ColVector | TensorShape::RowVector | TensorShape::ColMajorMatrix => {
                for entry in lut.iter_mut() {
                    *entry = index;
                    index += 1;
                }
            }
            TensorShape::RowMajorMatrix => {
                for m in 0..m_rows {
                    for n in 0..n_cols {
                        lut[n * m_rows + m] = index;
                        index += 1;
                    }
                }
            }
            TensorShape::DiagonalMatrix => {
                for m in 0..m_rows {
                    lut[m * m_rows + m] = index;
                    index += 1;
                }
            }
            TensorShape::SymmetricMatrix => {
                for m in 0..m_rows {
                    lut[m * m_rows + m] = index;
                    index += 1;
                }
                for n in 1..n_cols {
                    for m in 0..n {
                        lut[n * m_rows + m] = index;
                        lut[m * m_rows + n] = index;
                        index += 1;
                    }
                }
            }
            TensorShape::UpperTriangular => {
                for m in 0..m_rows {
                    lut[m * m_rows + m] = index;
                    index += 1;
                }
                for n in 1..n_cols {
                    for m in 0..n {
                        lut[n * m_rows + m] = index;
                        index += 1;
                    }
                }
            }
            TensorShape::LowerTriangular => {
                for m in 0..m_rows {
                    lut[m * m_rows + m] = index;
                    index += 1;
                }
                for n in 1..n_cols {
                    for m in 0..n {
                        lut[m * m_rows + n] = index;
                        index += 1;
                    }
                }
            }
        }
        lut
    }

    /// The dense column-major tensor with the same rows and columns.
    pub fn dense(&self) -> Tensor {
        Tensor::matrix(self.rows, self.columns())
    }
}
