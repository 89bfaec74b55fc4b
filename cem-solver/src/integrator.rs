//! Symplectic time integration of the coupled `(B, E)` field pair
//!
//! A step of order `n` is a composition of drift-kick stages:
//!
//! ```text
//! for (a, b) in coefficients:
//!     E += b·dt·F(B, t)
//!     B += a·dt·P·E
//!     t += a·dt
//! ```
//!
//! where `P` is the coupling operator (the negative discrete curl) and `F`
//! computes the rate of the electric field from the magnetic field, including
//! sources.

use std::fmt::Debug;

use arrayvec::ArrayVec;
use nalgebra::DVector;

use crate::{
    linalg::LinearOperator,
    source::SourceError,
};

pub const MAX_ORDER: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum IntegratorError {
    #[error("Unsupported integration order: {order} (supported: 1 to {MAX_ORDER})")]
    UnsupportedOrder { order: usize },

    #[error("Integrator was not initialized")]
    NotInitialized,

    #[error("Integrator was already initialized")]
    AlreadyInitialized,

    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Source evaluation failed")]
    Source(#[from] SourceError),
}

/// The field equations as seen by the integrator.
///
/// `B` lives in a space of dimension [`magnetic_dofs`][Self::magnetic_dofs]
/// and `E` in one of dimension [`electric_dofs`][Self::electric_dofs].
pub trait FieldSystem {
    fn electric_dofs(&self) -> usize;

    fn magnetic_dofs(&self) -> usize;

    /// Computes `dE/dt` from `B` at `time`, overwriting `de`.
    fn electric_rate(
        &self,
        b: &DVector<f64>,
        time: f64,
        de: &mut DVector<f64>,
    ) -> Result<(), SourceError>;

    /// `B += step·dB`
    fn advance_magnetic(&self, b: &mut DVector<f64>, db: &DVector<f64>, step: f64) {
        b.axpy(step, db, 1.0);
    }

    /// `E += step·dE`
    fn advance_electric(&self, e: &mut DVector<f64>, de: &DVector<f64>, step: f64) {
        e.axpy(step, de, 1.0);
    }

    /// Called once at the end of every full step, e.g. to update derived
    /// fields.
    fn synchronize(&self, _b: &DVector<f64>, _e: &DVector<f64>, _time: f64) {}
}

impl<T> FieldSystem for &T
where
    T: FieldSystem + ?Sized,
{
    fn electric_dofs(&self) -> usize {
        T::electric_dofs(*self)
    }

    fn magnetic_dofs(&self) -> usize {
        T::magnetic_dofs(*self)
    }

    fn electric_rate(
        &self,
        b: &DVector<f64>,
        time: f64,
        de: &mut DVector<f64>,
    ) -> Result<(), SourceError> {
        T::electric_rate(*self, b, time, de)
    }

    fn advance_magnetic(&self, b: &mut DVector<f64>, db: &DVector<f64>, step: f64) {
        T::advance_magnetic(*self, b, db, step);
    }

    fn advance_electric(&self, e: &mut DVector<f64>, de: &DVector<f64>, step: f64) {
        T::advance_electric(*self, e, de, step);
    }

    fn synchronize(&self, b: &DVector<f64>, e: &DVector<f64>, time: f64) {
        T::synchronize(*self, b, e, time);
    }
}

/// Stage weights of a symplectic composition.
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientTable {
    /// Weights for advancing `B`
    pub drift: ArrayVec<f64, MAX_ORDER>,

    /// Weights for advancing `E`
    pub kick: ArrayVec<f64, MAX_ORDER>,
}

impl CoefficientTable {
    pub fn for_order(order: usize) -> Result<Self, IntegratorError> {
        let (drift, kick): (&[f64], &[f64]) = match order {
            1 => (&[1.0], &[1.0]),
            2 => (&[0.5, 0.5], &[0.0, 1.0]),
            3 => {
                (
                    &[2.0 / 3.0, -2.0 / 3.0, 1.0],
                    &[7.0 / 24.0, 0.75, -1.0 / 24.0],
                )
            }
            4 => {
                let cbrt2 = 2.0f64.cbrt();
                let a0 = (2.0 + cbrt2 + 1.0 / cbrt2) / 6.0;
                let a1 = (1.0 - cbrt2 - 1.0 / cbrt2) / 6.0;
                let b1 = 1.0 / (2.0 - cbrt2);
                let b2 = 1.0 / (1.0 - cbrt2 * cbrt2);
                return Ok(Self {
                    drift: [a0, a1, a1, a0].into(),
                    kick: [0.0, b1, b2, b1].into(),
                });
            }
            _ => return Err(IntegratorError::UnsupportedOrder { order }),
        };

        Ok(Self {
            drift: drift.iter().copied().collect(),
            kick: kick.iter().copied().collect(),
        })
    }

    pub fn num_stages(&self) -> usize {
        self.drift.len()
    }

    pub fn stages(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.drift.iter().copied().zip(self.kick.iter().copied())
    }
}

/// Symplectic integrator for a coupled field pair.
///
/// The coupling operator and the field system are borrowed for the lifetime
/// of the integrator. [`init`][Self::init] must be called before the first
/// [`step`][Self::step].
#[derive(derive_more::Debug)]
pub struct SymplecticIntegrator<'a, C, S> {
    order: usize,
    coefficients: CoefficientTable,

    #[debug(skip)]
    bound: Option<Bound<'a, C, S>>,

    db: DVector<f64>,
    de: DVector<f64>,
}

struct Bound<'a, C, S> {
    coupling: &'a C,
    system: &'a S,
}

// derive would require `C: Copy` and `S: Copy`
impl<C, S> Clone for Bound<'_, C, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, S> Copy for Bound<'_, C, S> {}

impl<'a, C, S> SymplecticIntegrator<'a, C, S>
where
    C: LinearOperator,
    S: FieldSystem,
{
    pub fn new(order: usize) -> Result<Self, IntegratorError> {
        let coefficients = CoefficientTable::for_order(order)?;
        Ok(Self {
            order,
            coefficients,
            bound: None,
            db: DVector::zeros(0),
            de: DVector::zeros(0),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    pub fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    /// Binds the coupling operator `P: E -> dB` and the field system.
    pub fn init(&mut self, coupling: &'a C, system: &'a S) -> Result<(), IntegratorError> {
        if self.bound.is_some() {
            return Err(IntegratorError::AlreadyInitialized);
        }

        check_dimension(
            "coupling operator rows",
            system.magnetic_dofs(),
            coupling.nrows(),
        )?;
        check_dimension(
            "coupling operator columns",
            system.electric_dofs(),
            coupling.ncols(),
        )?;

        self.db = DVector::zeros(system.magnetic_dofs());
        self.de = DVector::zeros(system.electric_dofs());
        self.bound = Some(Bound { coupling, system });

        tracing::debug!(
            order = self.order,
            stages = self.coefficients.num_stages(),
            electric_dofs = system.electric_dofs(),
            magnetic_dofs = system.magnetic_dofs(),
            "symplectic integrator initialized"
        );

        Ok(())
    }

    /// Advances `b` and `e` by `dt` and sets `t` to `t + dt`.
    pub fn step(
        &mut self,
        b: &mut DVector<f64>,
        e: &mut DVector<f64>,
        t: &mut f64,
        dt: f64,
    ) -> Result<(), IntegratorError> {
        let Bound { coupling, system } = self.bound.ok_or(IntegratorError::NotInitialized)?;

        check_dimension("magnetic field", system.magnetic_dofs(), b.len())?;
        check_dimension("electric field", system.electric_dofs(), e.len())?;

        let start_time = *t;
        let mut local_time = start_time;

        for (drift, kick) in self.coefficients.stages() {
            if kick != 0.0 {
                system.electric_rate(b, local_time, &mut self.de)?;
                system.advance_electric(e, &self.de, kick * dt);
            }

            coupling.apply(e, &mut self.db);
            system.advance_magnetic(b, &self.db, drift * dt);

            local_time += drift * dt;
        }

        // the stage times only add up to dt up to rounding
        *t = start_time + dt;
        system.synchronize(b, e, *t);

        Ok(())
    }
}

fn check_dimension(what: &'static str, expected: usize, got: usize) -> Result<(), IntegratorError> {
    if expected == got {
        Ok(())
    }
    else {
        Err(IntegratorError::DimensionMismatch {
            what,
            expected,
            got,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;
    use parking_lot::Mutex;

    use crate::{
        integrator::{
            CoefficientTable,
            FieldSystem,
            IntegratorError,
            MAX_ORDER,
            SymplecticIntegrator,
        },
        linalg::DiagonalMatrix,
        source::SourceError,
    };

    /// `dB/dt = -E`, `dE/dt = B`
    #[derive(Debug, Default)]
    struct Oscillator {
        rate_times: Mutex<Vec<f64>>,
        synchronized: Mutex<Option<f64>>,
    }

    impl FieldSystem for Oscillator {
        fn electric_dofs(&self) -> usize {
            1
        }

        fn magnetic_dofs(&self) -> usize {
            1
        }

        fn electric_rate(
            &self,
            b: &DVector<f64>,
            time: f64,
            de: &mut DVector<f64>,
        ) -> Result<(), SourceError> {
            self.rate_times.lock().push(time);
            de.copy_from(b);
            Ok(())
        }

        fn synchronize(&self, _b: &DVector<f64>, _e: &DVector<f64>, time: f64) {
            *self.synchronized.lock() = Some(time);
        }
    }

    fn negative_identity() -> DiagonalMatrix {
        DiagonalMatrix::from_fn(1, |_| -1.0)
    }

    #[test]
    fn coefficients_are_consistent() {
        for order in 1..=MAX_ORDER {
            let table = CoefficientTable::for_order(order).unwrap();
            assert_eq!(table.num_stages(), order);
            let drift: f64 = table.drift.iter().sum();
            let kick: f64 = table.kick.iter().sum();
            assert!((drift - 1.0).abs() < 1e-12, "order {order}: drift sum {drift}");
            assert!((kick - 1.0).abs() < 1e-12, "order {order}: kick sum {kick}");
        }
    }

    #[test]
    fn fourth_order_coefficients() {
        let table = CoefficientTable::for_order(4).unwrap();
        let expected_drift = [
            0.6756035959798288,
            -0.17560359597982883,
            -0.17560359597982883,
            0.6756035959798288,
        ];
        let expected_kick = [0.0, 1.3512071919596578, -1.7024143839193153, 1.3512071919596578];
        for (a, b) in table.drift.iter().zip(expected_drift) {
            assert!((a - b).abs() < 1e-14);
        }
        for (a, b) in table.kick.iter().zip(expected_kick) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn unsupported_orders() {
        assert!(matches!(
            CoefficientTable::for_order(0),
            Err(IntegratorError::UnsupportedOrder { order: 0 })
        ));
        assert!(matches!(
            SymplecticIntegrator::<DiagonalMatrix, Oscillator>::new(5),
            Err(IntegratorError::UnsupportedOrder { order: 5 })
        ));
    }

    #[test]
    fn step_before_init_fails() {
        let mut integrator = SymplecticIntegrator::<DiagonalMatrix, Oscillator>::new(2).unwrap();
        let mut b = DVector::zeros(1);
        let mut e = DVector::zeros(1);
        let mut t = 0.0;
        assert!(matches!(
            integrator.step(&mut b, &mut e, &mut t, 0.1),
            Err(IntegratorError::NotInitialized)
        ));
        assert_eq!(t, 0.0);
    }

    #[test]
    fn init_twice_fails() {
        let coupling = negative_identity();
        let system = Oscillator::default();
        let mut integrator = SymplecticIntegrator::new(1).unwrap();
        integrator.init(&coupling, &system).unwrap();
        assert!(matches!(
            integrator.init(&coupling, &system),
            Err(IntegratorError::AlreadyInitialized)
        ));
    }

    #[test]
    fn init_checks_dimensions() {
        let coupling = DiagonalMatrix::from_fn(2, |_| -1.0);
        let system = Oscillator::default();
        let mut integrator = SymplecticIntegrator::new(1).unwrap();
        assert!(matches!(
            integrator.init(&coupling, &system),
            Err(IntegratorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn zero_state_stays_zero() {
        let coupling = negative_identity();
        let system = Oscillator::default();

        for order in 1..=MAX_ORDER {
            let mut integrator = SymplecticIntegrator::new(order).unwrap();
            integrator.init(&coupling, &system).unwrap();

            let mut b = DVector::zeros(1);
            let mut e = DVector::zeros(1);
            let mut t = 1.0;
            integrator.step(&mut b, &mut e, &mut t, 0.1).unwrap();

            assert_eq!(b, DVector::zeros(1));
            assert_eq!(e, DVector::zeros(1));
            assert_eq!(t, 1.0 + 0.1);
            assert_eq!(*system.synchronized.lock(), Some(1.0 + 0.1));
        }
    }

    #[test]
    fn sources_see_stage_times() {
        let coupling = negative_identity();
        let system = Oscillator::default();
        let mut integrator = SymplecticIntegrator::new(2).unwrap();
        integrator.init(&coupling, &system).unwrap();

        let mut b = DVector::from_element(1, 1.0);
        let mut e = DVector::zeros(1);
        let mut t = 0.0;
        integrator.step(&mut b, &mut e, &mut t, 0.5).unwrap();

        // the first kick weight is zero, the second kick happens after half a drift
        assert_eq!(*system.rate_times.lock(), vec![0.25]);
    }

    fn integration_error(order: usize, num_steps: usize) -> f64 {
        let coupling = negative_identity();
        let system = Oscillator::default();
        let mut integrator = SymplecticIntegrator::new(order).unwrap();
        integrator.init(&coupling, &system).unwrap();

        let mut b = DVector::from_element(1, 1.0);
        let mut e = DVector::zeros(1);
        let mut t = 0.0;
        let dt = 1.0 / num_steps as f64;
        for _ in 0..num_steps {
            integrator.step(&mut b, &mut e, &mut t, dt).unwrap();
        }

        // exact solution: B = cos(t), E = sin(t)
        ((b[0] - t.cos()).powi(2) + (e[0] - t.sin()).powi(2)).sqrt()
    }

    #[test]
    fn convergence_order() {
        for order in 1..=MAX_ORDER {
            let coarse = integration_error(order, 10);
            let fine = integration_error(order, 20);
            let expected_ratio = 2.0f64.powi(order as i32);
            let ratio = coarse / fine;
            assert!(
                ratio > 0.7 * expected_ratio,
                "order {order}: error ratio {ratio}, expected about {expected_ratio}"
            );
        }
    }
}
