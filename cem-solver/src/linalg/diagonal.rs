use nalgebra::DVector;

use crate::linalg::{
    Invertible,
    LinearOperator,
    assert_dimensions,
};

/// A diagonal matrix, e.g. a lumped mass matrix.
#[derive(Clone, Debug)]
pub struct DiagonalMatrix {
    diagonal: DVector<f64>,
}

impl DiagonalMatrix {
    pub fn new(diagonal: DVector<f64>) -> Self {
        Self { diagonal }
    }

    pub fn from_fn(n: usize, mut f: impl FnMut(usize) -> f64) -> Self {
        Self::new(DVector::from_fn(n, |i, _| f(i)))
    }

    pub fn diagonal(&self) -> &DVector<f64> {
        &self.diagonal
    }

    /// `xᵗ·D·x`
    pub fn quadratic_form(&self, x: &DVector<f64>) -> f64 {
        assert_eq!(x.len(), self.diagonal.len());
        self.diagonal
            .iter()
            .zip(x.iter())
            .map(|(d, x)| d * x * x)
            .sum()
    }
}

impl LinearOperator for DiagonalMatrix {
    fn nrows(&self) -> usize {
        self.diagonal.len()
    }

    fn ncols(&self) -> usize {
        self.diagonal.len()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        assert_dimensions(self, x, y, false);
        y.copy_from(x);
        y.component_mul_assign(&self.diagonal);
    }

    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        self.apply(x, y);
    }

    fn apply_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        assert_dimensions(self, x, y, false);
        y.zip_zip_apply(x, &self.diagonal, |y, x, d| *y += alpha * d * x);
    }

    fn apply_transpose_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        self.apply_add(x, y, alpha);
    }
}

impl Invertible for DiagonalMatrix {
    type Inverse<'a> = DiagonalInverse<'a>;

    fn inverse(&self) -> DiagonalInverse<'_> {
        DiagonalInverse { matrix: self }
    }
}

/// Exact inverse of a [`DiagonalMatrix`].
///
/// Zero diagonal entries are not checked and result in infinities.
#[derive(Clone, Copy, Debug)]
pub struct DiagonalInverse<'a> {
    matrix: &'a DiagonalMatrix,
}

impl LinearOperator for DiagonalInverse<'_> {
    fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        assert_dimensions(self, x, y, false);
        y.copy_from(x);
        y.component_div_assign(&self.matrix.diagonal);
    }

    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        self.apply(x, y);
    }

    fn apply_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        assert_dimensions(self, x, y, false);
        y.zip_zip_apply(x, &self.matrix.diagonal, |y, x, d| *y += alpha * x / d);
    }

    fn apply_transpose_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        self.apply_add(x, y, alpha);
    }
}
