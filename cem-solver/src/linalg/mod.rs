//! Linear operators and sparse matrices
//!
//! The time integrator and the discretization only talk to each other through
//! the capability traits in this module:
//!
//! - [`LinearOperator`]: anything that can compute `y = A·x` and `y = Aᵗ·x`.
//! - [`Invertible`]: operators that can hand out an (approximate) inverse,
//!   which is itself a [`LinearOperator`] borrowing the original.
//! - [`SparseStorage`]: explicitly stored sparse matrices with row access.
//!
//! Concrete implementations are [`DiagonalMatrix`] and [`CsrMatrix`]. Vectors
//! are [`nalgebra::DVector`]s. Passing vectors of the wrong length is a
//! programming error and panics, the same way nalgebra does.

mod cg;
mod csr;
mod diagonal;

use std::borrow::Cow;

use nalgebra::DVector;

pub use self::{
    cg::{
        ConjugateGradient,
        SolverParameters,
    },
    csr::CsrMatrix,
    diagonal::{
        DiagonalInverse,
        DiagonalMatrix,
    },
};

/// A linear map from a vector space of dimension [`ncols`][Self::ncols] into
/// one of dimension [`nrows`][Self::nrows].
///
/// Implementations must not modify the input vector and must only write to
/// the output vector.
pub trait LinearOperator {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// `y = A·x`
    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>);

    /// `y = Aᵗ·x`
    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>);

    /// `y += alpha·A·x`
    ///
    /// The default implementation computes the product into a temporary and
    /// accumulates it afterwards. Implementations that can do this without
    /// allocating should override it, but must produce the same result up to
    /// rounding.
    fn apply_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        let mut product = DVector::zeros(self.nrows());
        self.apply(x, &mut product);
        y.axpy(alpha, &product, 1.0);
    }

    /// `y += alpha·Aᵗ·x`
    fn apply_transpose_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        let mut product = DVector::zeros(self.ncols());
        self.apply_transpose(x, &mut product);
        y.axpy(alpha, &product, 1.0);
    }

    fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }
}

impl<T> LinearOperator for &T
where
    T: LinearOperator + ?Sized,
{
    fn nrows(&self) -> usize {
        T::nrows(*self)
    }

    fn ncols(&self) -> usize {
        T::ncols(*self)
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        T::apply(*self, x, y);
    }

    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        T::apply_transpose(*self, x, y);
    }

    fn apply_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        T::apply_add(*self, x, y, alpha);
    }

    fn apply_transpose_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        T::apply_transpose_add(*self, x, y, alpha);
    }
}

/// Operators that provide an inverse.
///
/// The inverse is a view bound to the lifetime of the operator it was created
/// from, not an independent copy. Depending on the implementation applying it
/// yields the exact solution or an approximation (e.g. an iterative solve).
pub trait Invertible: LinearOperator {
    type Inverse<'a>: LinearOperator
    where
        Self: 'a;

    fn inverse(&self) -> Self::Inverse<'_>;
}

/// Explicitly stored sparse matrices.
pub trait SparseStorage: LinearOperator {
    /// Number of stored entries.
    fn num_nonzeros(&self) -> usize;

    /// Column indices and values of a row.
    ///
    /// Depending on the storage format this is either borrowed from the matrix
    /// or an owned copy. See [`SparseRow::is_view`].
    fn row(&self, row: usize) -> SparseRow<'_>;

    /// Must be called after all insertions and before the matrix is applied.
    fn finalize(&mut self);

    /// Places a 1 on the diagonal of all rows whose l1-norm is below
    /// `threshold`.
    ///
    /// Only valid for square matrices, and the diagonal entry must be part of
    /// the sparsity pattern.
    fn eliminate_zero_rows(&mut self, threshold: f64) -> Result<(), SparseError>;
}

#[derive(Clone, Debug)]
pub struct SparseRow<'a> {
    pub columns: Cow<'a, [usize]>,
    pub values: Cow<'a, [f64]>,
}

impl SparseRow<'_> {
    pub fn is_view(&self) -> bool {
        matches!(
            (&self.columns, &self.values),
            (Cow::Borrowed(_), Cow::Borrowed(_))
        )
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.columns
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    pub fn l1_norm(&self) -> f64 {
        self.values.iter().map(|value| value.abs()).sum()
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum SparseError {
    #[error("Row {row} is (almost) zero, but has no diagonal entry in the sparsity pattern")]
    MissingDiagonal { row: usize },

    #[error("Operation requires a square matrix, but matrix is {nrows}x{ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("Entry ({row}, {column}) is out of bounds for a {nrows}x{ncols} matrix")]
    OutOfBounds {
        row: usize,
        column: usize,
        nrows: usize,
        ncols: usize,
    },
}

/// `alpha·A` without copying `A`.
#[derive(Clone, Copy, Debug)]
pub struct Scaled<A> {
    pub operator: A,
    pub alpha: f64,
}

impl<A> Scaled<A> {
    pub fn new(operator: A, alpha: f64) -> Self {
        Self { operator, alpha }
    }
}

impl<A> LinearOperator for Scaled<A>
where
    A: LinearOperator,
{
    fn nrows(&self) -> usize {
        self.operator.nrows()
    }

    fn ncols(&self) -> usize {
        self.operator.ncols()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.fill(0.0);
        self.operator.apply_add(x, y, self.alpha);
    }

    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.fill(0.0);
        self.operator.apply_transpose_add(x, y, self.alpha);
    }

    fn apply_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        self.operator.apply_add(x, y, alpha * self.alpha);
    }

    fn apply_transpose_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        self.operator.apply_transpose_add(x, y, alpha * self.alpha);
    }
}

pub(crate) fn assert_dimensions(
    operator: &(impl LinearOperator + ?Sized),
    x: &DVector<f64>,
    y: &DVector<f64>,
    transpose: bool,
) {
    let (n_in, n_out) = if transpose {
        (operator.nrows(), operator.ncols())
    }
    else {
        (operator.ncols(), operator.nrows())
    };
    assert_eq!(x.len(), n_in, "input vector has wrong dimension");
    assert_eq!(y.len(), n_out, "output vector has wrong dimension");
}
