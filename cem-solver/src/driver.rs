//! The time stepping loop
//!
//! [`run`] ties everything together: it asks the discretization for its
//! stability bound, quantizes the time step, binds a
//! [`SymplecticIntegrator`] and steps the fields, reporting the energy after
//! every step.

use nalgebra::DVector;

use crate::{
    integrator::{
        FieldSystem,
        IntegratorError,
        SymplecticIntegrator,
    },
    linalg::LinearOperator,
    time_step::{
        BudgetPolicy,
        TimeStep,
        TimeStepError,
    },
    util::format_size,
};

/// A spatial discretization of the field equations that can be driven by
/// [`run`].
pub trait Discretization: FieldSystem {
    type Coupling: LinearOperator;

    /// The coupling operator `P` with `dB/dt = P·E`.
    fn coupling(&self) -> &Self::Coupling;

    /// Largest stable time step of the explicit update.
    fn maximum_time_step(&self) -> f64;

    fn energy(&self, b: &DVector<f64>, e: &DVector<f64>) -> f64;

    /// Initial `(B, E)`.
    fn initial_fields(&self) -> (DVector<f64>, DVector<f64>);

    /// Estimated memory used by the discretization in bytes.
    fn memory_required(&self) -> usize {
        0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Invalid safety factor: {safety_factor} (must be in (0, 1])")]
    InvalidSafetyFactor { safety_factor: f64 },

    #[error("Time step error")]
    TimeStep(#[from] TimeStepError),

    #[error("Integrator error")]
    Integrator(#[from] IntegratorError),
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunConfig {
    /// Simulated time in seconds
    pub duration: f64,

    pub temporal_order: usize,

    /// Step budget
    pub max_steps: Option<u64>,

    pub budget_policy: BudgetPolicy,

    /// Fraction of the stability bound used as maximum time step.
    pub safety_factor: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration: 40e-9,
            temporal_order: 1,
            max_steps: None,
            budget_policy: BudgetPolicy::default(),
            safety_factor: 0.7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub step: u64,
    pub time: f64,
    pub energy: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub num_steps: u64,
    pub dt: f64,
    pub final_time: f64,
    pub initial_energy: f64,
    pub final_energy: f64,
}

pub fn run<D>(
    discretization: &D,
    config: &RunConfig,
    mut observer: impl FnMut(&StepReport),
) -> Result<RunSummary, DriverError>
where
    D: Discretization,
{
    if !(config.safety_factor > 0.0 && config.safety_factor <= 1.0) {
        return Err(DriverError::InvalidSafetyFactor {
            safety_factor: config.safety_factor,
        });
    }

    let max_time_step = discretization.maximum_time_step() * config.safety_factor;
    let mut time_step = TimeStep::quantize(config.duration, max_time_step)?;
    if let Some(budget) = config.max_steps {
        time_step = time_step.with_budget(budget, config.budget_policy, max_time_step)?;
    }

    tracing::info!(
        num_steps = time_step.num_steps,
        dt = time_step.dt,
        max_time_step,
        "time stepping"
    );
    tracing::debug!(
        electric_dofs = discretization.electric_dofs(),
        magnetic_dofs = discretization.magnetic_dofs(),
        memory_required = %format_size(discretization.memory_required()),
        "discretization"
    );

    let mut integrator = SymplecticIntegrator::new(config.temporal_order)?;
    integrator.init(discretization.coupling(), discretization)?;

    let (mut b, mut e) = discretization.initial_fields();
    let mut time = 0.0;
    discretization.synchronize(&b, &e, time);

    let initial_energy = discretization.energy(&b, &e);
    let mut energy = initial_energy;
    tracing::info!(step = 0, time, energy, "initial state");

    for step in 1..=time_step.num_steps {
        integrator.step(&mut b, &mut e, &mut time, time_step.dt)?;
        energy = discretization.energy(&b, &e);

        tracing::info!(step, time, energy, "step");
        observer(&StepReport { step, time, energy });
    }

    Ok(RunSummary {
        num_steps: time_step.num_steps,
        dt: time_step.dt,
        final_time: time,
        initial_energy,
        final_energy: energy,
    })
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::{
        driver::{
            Discretization,
            DriverError,
            RunConfig,
            run,
        },
        integrator::{
            FieldSystem,
            IntegratorError,
        },
        linalg::DiagonalMatrix,
        source::SourceError,
        time_step::{
            BudgetPolicy,
            TimeStepError,
        },
    };

    /// Uncoupled oscillators `dB/dt = -ω·E`, `dE/dt = ω·B`.
    #[derive(Debug)]
    struct Oscillators {
        coupling: DiagonalMatrix,
        frequencies: DVector<f64>,
        failing_source: bool,
    }

    impl Oscillators {
        fn new(frequencies: &[f64]) -> Self {
            let frequencies = DVector::from_column_slice(frequencies);
            Self {
                coupling: DiagonalMatrix::new(-&frequencies),
                frequencies,
                failing_source: false,
            }
        }
    }

    impl FieldSystem for Oscillators {
        fn electric_dofs(&self) -> usize {
            self.frequencies.len()
        }

        fn magnetic_dofs(&self) -> usize {
            self.frequencies.len()
        }

        fn electric_rate(
            &self,
            b: &DVector<f64>,
            _time: f64,
            de: &mut DVector<f64>,
        ) -> Result<(), SourceError> {
            if self.failing_source {
                return Err(SourceError::RequiresThreeDimensions { dimension: 2 });
            }
            de.copy_from(&b.component_mul(&self.frequencies));
            Ok(())
        }
    }

    impl Discretization for Oscillators {
        type Coupling = DiagonalMatrix;

        fn coupling(&self) -> &DiagonalMatrix {
            &self.coupling
        }

        fn maximum_time_step(&self) -> f64 {
            2.0 / self.frequencies.max()
        }

        fn energy(&self, b: &DVector<f64>, e: &DVector<f64>) -> f64 {
            0.5 * (b.norm_squared() + e.norm_squared())
        }

        fn initial_fields(&self) -> (DVector<f64>, DVector<f64>) {
            (
                DVector::from_element(self.frequencies.len(), 1.0),
                DVector::zeros(self.frequencies.len()),
            )
        }
    }

    #[test]
    fn runs_quantized_number_of_steps() {
        let system = Oscillators::new(&[1.0, 2.0, 3.0]);
        let config = RunConfig {
            duration: 10.0,
            temporal_order: 2,
            safety_factor: 0.5,
            ..Default::default()
        };

        let mut reports = vec![];
        let summary = run(&system, &config, |report| reports.push(*report)).unwrap();

        // dt_max = 0.5 * 2 / 3, so 10 / dt_max = 30 steps, rounded to 50
        assert_eq!(summary.num_steps, 50);
        assert_eq!(summary.dt, 0.2);
        assert!((summary.final_time - 10.0).abs() < 1e-12);
        assert_eq!(reports.len(), 50);
        assert_eq!(reports[0].step, 1);
        assert_eq!(reports[49].energy, summary.final_energy);

        assert_eq!(summary.initial_energy, 1.5);
        for report in &reports {
            assert!((report.energy - 1.5).abs() < 0.2 * 1.5);
        }
    }

    #[test]
    fn budget_policy_is_applied() {
        let system = Oscillators::new(&[1.0]);
        let config = RunConfig {
            duration: 100.0,
            temporal_order: 1,
            max_steps: Some(10),
            budget_policy: BudgetPolicy::ShortenDuration,
            safety_factor: 1.0,
        };

        let summary = run(&system, &config, |_| {}).unwrap();
        assert_eq!(summary.num_steps, 10);
        assert!(summary.dt <= 2.0);
        assert!(summary.final_time < 100.0);

        let config = RunConfig {
            budget_policy: BudgetPolicy::Fail,
            ..config
        };
        assert!(matches!(
            run(&system, &config, |_| {}),
            Err(DriverError::TimeStep(TimeStepError::BudgetExceeded { .. }))
        ));
    }

    #[test]
    fn rejects_invalid_safety_factor() {
        let system = Oscillators::new(&[1.0]);
        for safety_factor in [0.0, 1.5, f64::NAN] {
            let config = RunConfig {
                safety_factor,
                ..Default::default()
            };
            assert!(matches!(
                run(&system, &config, |_| {}),
                Err(DriverError::InvalidSafetyFactor { .. })
            ));
        }
    }

    #[test]
    fn source_errors_abort_the_run() {
        let system = Oscillators {
            failing_source: true,
            ..Oscillators::new(&[1.0])
        };
        let mut num_reports = 0;
        let result = run(&system, &RunConfig::default(), |_| num_reports += 1);

        assert!(matches!(
            result,
            Err(DriverError::Integrator(IntegratorError::Source(
                SourceError::RequiresThreeDimensions { dimension: 2 }
            )))
        ));
        assert_eq!(num_reports, 0);
    }
}
