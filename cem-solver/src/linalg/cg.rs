use nalgebra::DVector;

use crate::linalg::{
    LinearOperator,
    assert_dimensions,
};

#[derive(Clone, Copy, Debug)]
pub struct SolverParameters {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-12,
            absolute_tolerance: 0.0,
            max_iterations: 1000,
        }
    }
}

/// Approximate inverse of a symmetric positive definite operator.
///
/// Applying this solves `A·y = x` with Jacobi-preconditioned conjugate
/// gradients, starting from `y = 0`. Since `A` is symmetric, the transpose is
/// the same solve.
#[derive(derive_more::Debug)]
pub struct ConjugateGradient<'a, A> {
    #[debug(skip)]
    operator: &'a A,
    inverse_diagonal: DVector<f64>,
    parameters: SolverParameters,
}

impl<'a, A> ConjugateGradient<'a, A>
where
    A: LinearOperator,
{
    pub fn new(operator: &'a A, diagonal: DVector<f64>, parameters: SolverParameters) -> Self {
        assert!(operator.is_square(), "conjugate gradient needs a square operator");

        let inverse_diagonal = diagonal.map(|d| if d != 0.0 { 1.0 / d } else { 1.0 });

        Self {
            operator,
            inverse_diagonal,
            parameters,
        }
    }

    /// Runs the solve and returns the number of iterations used, or `None` if
    /// it did not converge.
    pub fn solve(&self, b: &DVector<f64>, x: &mut DVector<f64>) -> Option<usize> {
        x.fill(0.0);

        let mut r = b.clone();
        let mut z = r.component_mul(&self.inverse_diagonal);
        let mut p = z.clone();
        let mut q = DVector::zeros(b.len());
        let mut rz = r.dot(&z);

        let tolerance = (self.parameters.relative_tolerance * b.norm())
            .max(self.parameters.absolute_tolerance);

        if r.norm() <= tolerance {
            return Some(0);
        }

        for iteration in 1..=self.parameters.max_iterations {
            self.operator.apply(&p, &mut q);

            let pq = p.dot(&q);
            if pq <= 0.0 {
                tracing::warn!(iteration, "operator is not positive definite");
                return None;
            }
            let alpha = rz / pq;

            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &q, 1.0);

            if r.norm() <= tolerance {
                return Some(iteration);
            }

            z = r.component_mul(&self.inverse_diagonal);
            let rz_next = r.dot(&z);
            let beta = rz_next / rz;
            rz = rz_next;

            p.axpy(1.0, &z, beta);
        }

        None
    }
}

impl<A> LinearOperator for ConjugateGradient<'_, A>
where
    A: LinearOperator,
{
    fn nrows(&self) -> usize {
        self.operator.ncols()
    }

    fn ncols(&self) -> usize {
        self.operator.nrows()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        assert_dimensions(self, x, y, false);

        if self.solve(x, y).is_none() {
            tracing::warn!(
                max_iterations = self.parameters.max_iterations,
                "conjugate gradient did not converge"
            );
        }
    }

    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        self.apply(x, y);
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::linalg::{
        CsrMatrix,
        LinearOperator,
        SolverParameters,
    };

    #[test]
    fn it_respects_iteration_limit() {
        let n = 32;
        let matrix = CsrMatrix::from_triplets(
            n,
            n,
            (0..n).flat_map(|i| {
                [(i, i, 2.0), (i, (i + 1) % n, -1.0), ((i + 1) % n, i, -1.0)]
                    .into_iter()
                    .chain(std::iter::once((i, i, 0.01)))
            }),
        )
        .unwrap();

        let b = DVector::from_fn(n, |i, _| if i == 0 { 1.0 } else { 0.0 });
        let mut x = DVector::zeros(n);

        let truncated = matrix.inverse_with(SolverParameters {
            max_iterations: 2,
            ..Default::default()
        });
        assert_eq!(truncated.solve(&b, &mut x), None);

        let full = matrix.inverse_with(SolverParameters::default());
        let iterations = full.solve(&b, &mut x).unwrap();
        assert!(iterations > 2);

        let mut residual = DVector::zeros(n);
        matrix.apply(&x, &mut residual);
        assert!((residual - b).norm() < 1e-9);
    }

    #[test]
    fn zero_right_hand_side() {
        let matrix = CsrMatrix::from_triplets(2, 2, [(0, 0, 1.0), (1, 1, 3.0)]).unwrap();
        let mut x = DVector::from_element(2, 7.0);
        let iterations = matrix
            .inverse_with(SolverParameters::default())
            .solve(&DVector::zeros(2), &mut x);
        assert_eq!(iterations, Some(0));
        assert_eq!(x, DVector::zeros(2));
    }
}
