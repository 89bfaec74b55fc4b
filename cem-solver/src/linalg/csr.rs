use std::borrow::Cow;

use nalgebra::DVector;

use crate::linalg::{
    Invertible,
    LinearOperator,
    SparseError,
    SparseRow,
    SparseStorage,
    assert_dimensions,
    cg::{
        ConjugateGradient,
        SolverParameters,
    },
};

/// Sparse matrix in compressed sparse row format.
///
/// Entries are inserted with [`add`][Self::add] and only become part of the
/// matrix once [`finalize`][SparseStorage::finalize] is called. Duplicate
/// entries are summed. Explicitly inserted zeros stay in the sparsity pattern.
///
/// Applying a matrix that has pending insertions panics.
#[derive(Clone, Debug)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
    pending: Vec<(usize, usize, f64)>,
    finalized: bool,
}

impl CsrMatrix {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            row_offsets: vec![0; nrows + 1],
            columns: vec![],
            values: vec![],
            pending: vec![],
            finalized: false,
        }
    }

    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self, SparseError> {
        let mut matrix = Self::new(nrows, ncols);
        for (row, column, value) in triplets {
            matrix.add(row, column, value)?;
        }
        matrix.finalize();
        Ok(matrix)
    }

    /// Adds `value` to the entry at `(row, column)`.
    pub fn add(&mut self, row: usize, column: usize, value: f64) -> Result<(), SparseError> {
        if row >= self.nrows || column >= self.ncols {
            return Err(SparseError::OutOfBounds {
                row,
                column,
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }

        self.pending.push((row, column, value));
        self.finalized = false;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Stored value at `(row, column)`, or `None` if the entry is not part of
    /// the sparsity pattern.
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        self.assert_finalized();
        if row >= self.nrows || column >= self.ncols {
            return None;
        }
        self.entry_position(row, column)
            .map(|position| self.values[position])
    }

    pub fn diagonal(&self) -> DVector<f64> {
        self.assert_finalized();
        DVector::from_fn(self.nrows.min(self.ncols), |row, _| {
            self.diagonal_position(row)
                .map_or(0.0, |position| self.values[position])
        })
    }

    /// Inverse computed with a conjugate gradient solve using the given
    /// parameters.
    ///
    /// The matrix must be symmetric positive definite.
    pub fn inverse_with(&self, parameters: SolverParameters) -> ConjugateGradient<'_, Self> {
        ConjugateGradient::new(self, self.diagonal(), parameters)
    }

    fn assert_finalized(&self) {
        assert!(
            self.finalized,
            "sparse matrix must be finalized before it is used"
        );
    }

    fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.row_offsets[row]..self.row_offsets[row + 1]
    }

    fn entry_position(&self, row: usize, column: usize) -> Option<usize> {
        let range = self.row_range(row);
        let offset = range.start;
        self.columns[range]
            .binary_search(&column)
            .ok()
            .map(|index| offset + index)
    }

    fn diagonal_position(&self, row: usize) -> Option<usize> {
        self.entry_position(row, row)
    }

    fn row_dot(&self, row: usize, x: &DVector<f64>) -> f64 {
        self.row_range(row)
            .map(|position| self.values[position] * x[self.columns[position]])
            .sum()
    }

    fn for_each_row(&self, y: &mut DVector<f64>, f: impl Fn(usize, &mut f64) + Send + Sync) {
        #[cfg(feature = "rayon")]
        {
            use rayon::iter::{
                IndexedParallelIterator,
                IntoParallelRefMutIterator,
                ParallelIterator,
            };

            y.as_mut_slice()
                .par_iter_mut()
                .enumerate()
                .for_each(|(row, y)| f(row, y));
        }

        #[cfg(not(feature = "rayon"))]
        {
            y.iter_mut().enumerate().for_each(|(row, y)| f(row, y));
        }
    }
}

impl LinearOperator for CsrMatrix {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        self.assert_finalized();
        assert_dimensions(self, x, y, false);
        self.for_each_row(y, |row, y| *y = self.row_dot(row, x));
    }

    fn apply_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        self.assert_finalized();
        assert_dimensions(self, x, y, false);
        self.for_each_row(y, |row, y| *y += alpha * self.row_dot(row, x));
    }

    fn apply_transpose(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.fill(0.0);
        self.apply_transpose_add(x, y, 1.0);
    }

    fn apply_transpose_add(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64) {
        self.assert_finalized();
        assert_dimensions(self, x, y, true);

        // scatter, so this stays serial
        for row in 0..self.nrows {
            let x_row = alpha * x[row];
            if x_row == 0.0 {
                continue;
            }
            for position in self.row_range(row) {
                y[self.columns[position]] += self.values[position] * x_row;
            }
        }
    }
}

impl SparseStorage for CsrMatrix {
    fn num_nonzeros(&self) -> usize {
        self.values.len()
    }

    fn row(&self, row: usize) -> SparseRow<'_> {
        let range = self.row_range(row);
        SparseRow {
            columns: Cow::Borrowed(&self.columns[range.clone()]),
            values: Cow::Borrowed(&self.values[range]),
        }
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }

        let mut rows: Vec<Vec<(usize, f64)>> = vec![vec![]; self.nrows];
        for row in 0..self.nrows {
            for position in self.row_range(row) {
                rows[row].push((self.columns[position], self.values[position]));
            }
        }
        for (row, column, value) in self.pending.drain(..) {
            rows[row].push((column, value));
        }

        self.row_offsets.clear();
        self.columns.clear();
        self.values.clear();
        self.row_offsets.push(0);

        for row in &mut rows {
            row.sort_by_key(|(column, _)| *column);

            let mut last_column = None;
            for &(column, value) in row.iter() {
                if last_column == Some(column) {
                    if let Some(last) = self.values.last_mut() {
                        *last += value;
                    }
                }
                else {
                    self.columns.push(column);
                    self.values.push(value);
                    last_column = Some(column);
                }
            }

            self.row_offsets.push(self.columns.len());
        }

        self.finalized = true;
    }

    fn eliminate_zero_rows(&mut self, threshold: f64) -> Result<(), SparseError> {
        self.assert_finalized();

        if !self.is_square() {
            return Err(SparseError::NotSquare {
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }

        let mut diagonals = vec![];
        for row in 0..self.nrows {
            if self.row(row).l1_norm() < threshold {
                let position = self
                    .diagonal_position(row)
                    .ok_or(SparseError::MissingDiagonal { row })?;
                diagonals.push(position);
            }
        }

        for position in diagonals {
            self.values[position] = 1.0;
        }

        Ok(())
    }
}

impl Invertible for CsrMatrix {
    type Inverse<'a> = ConjugateGradient<'a, Self>;

    fn inverse(&self) -> Self::Inverse<'_> {
        self.inverse_with(SolverParameters::default())
    }
}
