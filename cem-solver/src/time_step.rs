//! Quantization of the time step
//!
//! Given a simulation duration `T` and a stability bound `dt_max` this picks a
//! "round" number of steps `N` (a power of ten, or `5^i` times a power of ten)
//! such that `dt = T / N <= dt_max`.

/// Largest power of five used for candidate step counts.
const MAX_FIVE_EXPONENT: i32 = 5;

#[derive(Clone, Debug, thiserror::Error)]
pub enum TimeStepError {
    #[error("Invalid simulation duration: {duration}")]
    InvalidDuration { duration: f64 },

    #[error("Invalid maximum time step: {max_time_step}")]
    InvalidMaxTimeStep { max_time_step: f64 },

    #[error("Too many time steps: duration / max_time_step = {ratio}")]
    TooManySteps { ratio: f64 },

    #[error("Computed number of time steps ({num_steps}) exceeds the budget of {budget} steps")]
    BudgetExceeded { num_steps: u64, budget: u64 },

    #[error("Step budget must be at least 1")]
    ZeroBudget,
}

/// What to do when the quantized number of steps exceeds the step budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum BudgetPolicy {
    /// Use `budget` steps to cover the whole duration. This increases the
    /// time step, possibly beyond the stability bound.
    #[default]
    Truncate,

    /// Refuse to run.
    Fail,

    /// Keep the stable time step and only simulate `budget` steps.
    ShortenDuration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeStep {
    pub num_steps: u64,
    pub dt: f64,

    /// Simulated time after `num_steps` steps
    pub duration: f64,
}

impl TimeStep {
    pub fn quantize(duration: f64, max_time_step: f64) -> Result<Self, TimeStepError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TimeStepError::InvalidDuration { duration });
        }
        if !max_time_step.is_finite() || max_time_step <= 0.0 {
            return Err(TimeStepError::InvalidMaxTimeStep { max_time_step });
        }

        let ratio = duration / max_time_step;
        if !ratio.is_finite() || ratio >= u64::MAX as f64 {
            return Err(TimeStepError::TooManySteps { ratio });
        }

        let num_steps = (0..=MAX_FIVE_EXPONENT)
            .map(|i| smallest_round_count(duration, max_time_step, 5f64.powi(i)))
            .fold(f64::INFINITY, f64::min);

        if num_steps >= u64::MAX as f64 {
            return Err(TimeStepError::TooManySteps { ratio });
        }
        let num_steps = num_steps as u64;

        let time_step = Self {
            num_steps,
            dt: duration / num_steps as f64,
            duration,
        };

        tracing::debug!(
            duration,
            max_time_step,
            num_steps,
            dt = time_step.dt,
            "quantized time step"
        );

        Ok(time_step)
    }

    /// Limits the number of steps to `budget`.
    pub fn with_budget(
        self,
        budget: u64,
        policy: BudgetPolicy,
        max_time_step: f64,
    ) -> Result<Self, TimeStepError> {
        if budget == 0 {
            return Err(TimeStepError::ZeroBudget);
        }
        if self.num_steps <= budget {
            return Ok(self);
        }

        match policy {
            BudgetPolicy::Truncate => {
                let dt = self.duration / budget as f64;
                tracing::warn!(
                    num_steps = self.num_steps,
                    budget,
                    dt,
                    "computed number of time steps is too large, truncating"
                );
                if dt > max_time_step {
                    tracing::warn!(
                        dt,
                        max_time_step,
                        "truncated time step exceeds the stability bound"
                    );
                }
                Ok(Self {
                    num_steps: budget,
                    dt,
                    duration: self.duration,
                })
            }
            BudgetPolicy::Fail => {
                Err(TimeStepError::BudgetExceeded {
                    num_steps: self.num_steps,
                    budget,
                })
            }
            BudgetPolicy::ShortenDuration => {
                let duration = self.dt * budget as f64;
                tracing::warn!(
                    num_steps = self.num_steps,
                    budget,
                    requested_duration = self.duration,
                    duration,
                    "computed number of time steps is too large, shortening simulation"
                );
                Ok(Self {
                    num_steps: budget,
                    dt: self.dt,
                    duration,
                })
            }
        }
    }
}

/// Smallest `base * 10^a` with `a >= 0` such that
/// `duration / (base * 10^a) <= max_time_step`.
///
/// `duration / max_time_step` must be finite.
fn smallest_round_count(duration: f64, max_time_step: f64, base: f64) -> f64 {
    let is_stable = |exponent: i32| duration / (base * 10f64.powi(exponent)) <= max_time_step;

    let ratio = duration / max_time_step / base;
    let mut exponent = if ratio > 1.0 {
        ratio.log10().ceil() as i32
    }
    else {
        0
    };

    // log10 is not exact at powers of ten
    while exponent > 0 && is_stable(exponent - 1) {
        exponent -= 1;
    }
    while !is_stable(exponent) {
        exponent += 1;
    }

    base * 10f64.powi(exponent)
}

#[cfg(test)]
mod tests {
    use std::{
        fmt::Debug,
        sync::Arc,
    };

    use parking_lot::Mutex;
    use tracing::{
        Event,
        Level,
        Subscriber,
        field::{
            Field,
            Visit,
        },
    };
    use tracing_subscriber::{
        Layer,
        layer::{
            Context,
            SubscriberExt,
        },
    };

    use crate::time_step::{
        BudgetPolicy,
        TimeStep,
        TimeStepError,
    };

    /// Collects the messages of all warnings.
    #[derive(Clone, Default)]
    struct WarningRecorder {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl<S: Subscriber> Layer<S> for WarningRecorder {
        fn on_event(&self, event: &Event<'_>, _context: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                let mut message = Message::default();
                event.record(&mut message);
                self.messages.lock().push(message.0);
            }
        }
    }

    #[derive(Default)]
    struct Message(String);

    impl Visit for Message {
        fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    fn warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let recorder = WarningRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let output = tracing::subscriber::with_default(subscriber, f);
        let messages = recorder.messages.lock().clone();
        (output, messages)
    }

    const DURATION: f64 = 40e-9;

    #[test]
    fn quantizes_to_round_step_count() {
        let time_step = TimeStep::quantize(DURATION, 4.1e-13).unwrap();
        assert_eq!(time_step.num_steps, 100000);
        assert!((time_step.dt - 4.0e-13).abs() < 1e-25);
        assert_eq!(time_step.duration, DURATION);
    }

    #[test]
    fn representative_stability_bounds() {
        for (max_time_step, expected) in [
            (1e-9, 50),
            (3e-10, 250),
            (1e-8, 5),
            (2e-12, 25000),
            (1.0, 1),
        ] {
            let time_step = TimeStep::quantize(DURATION, max_time_step).unwrap();
            assert_eq!(
                time_step.num_steps, expected,
                "max_time_step = {max_time_step}"
            );
        }
    }

    #[test]
    fn minimal_among_candidates() {
        let mut max_time_step = 1.234e-14;
        while max_time_step < 1e-7 {
            let time_step = TimeStep::quantize(DURATION, max_time_step).unwrap();
            assert!(time_step.dt <= max_time_step);

            let brute_force = (0..=5)
                .flat_map(|i| (0..=12).map(move |a| 5u64.pow(i) * 10u64.pow(a)))
                .filter(|n| DURATION / *n as f64 <= max_time_step)
                .min()
                .unwrap();
            assert_eq!(
                time_step.num_steps, brute_force,
                "max_time_step = {max_time_step}"
            );

            max_time_step *= 1.37;
        }
    }

    #[test]
    fn exact_powers_of_ten() {
        for max_time_step in [4e-10, 4e-11, 4e-12] {
            let time_step = TimeStep::quantize(DURATION, max_time_step).unwrap();
            assert!(time_step.dt <= max_time_step);
            let exact = (DURATION / max_time_step).round() as u64;
            assert!(time_step.num_steps == exact || time_step.num_steps == exact / 4 * 5);
        }
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(matches!(
            TimeStep::quantize(0.0, 1e-12),
            Err(TimeStepError::InvalidDuration { .. })
        ));
        assert!(matches!(
            TimeStep::quantize(f64::NAN, 1e-12),
            Err(TimeStepError::InvalidDuration { .. })
        ));
        assert!(matches!(
            TimeStep::quantize(1.0, -1e-12),
            Err(TimeStepError::InvalidMaxTimeStep { .. })
        ));
        assert!(matches!(
            TimeStep::quantize(1.0, f64::INFINITY),
            Err(TimeStepError::InvalidMaxTimeStep { .. })
        ));
        assert!(matches!(
            TimeStep::quantize(1e300, 1e-300),
            Err(TimeStepError::TooManySteps { .. })
        ));
    }

    #[test]
    fn budget_within_limits_is_noop() {
        let time_step = TimeStep::quantize(DURATION, 1e-9).unwrap();
        assert_eq!(
            time_step.with_budget(50, BudgetPolicy::Fail, 1e-9).unwrap(),
            time_step
        );
    }

    #[test]
    fn budget_policies() {
        let max_time_step = 4.1e-13;
        let time_step = TimeStep::quantize(DURATION, max_time_step).unwrap();

        let truncated = time_step
            .with_budget(100, BudgetPolicy::Truncate, max_time_step)
            .unwrap();
        assert_eq!(truncated.num_steps, 100);
        assert_eq!(truncated.duration, DURATION);
        assert!((truncated.dt - 4e-10).abs() < 1e-22);

        let shortened = time_step
            .with_budget(100, BudgetPolicy::ShortenDuration, max_time_step)
            .unwrap();
        assert_eq!(shortened.num_steps, 100);
        assert_eq!(shortened.dt, time_step.dt);
        assert!((shortened.duration - 4e-11).abs() < 1e-23);

        assert!(matches!(
            time_step.with_budget(100, BudgetPolicy::Fail, max_time_step),
            Err(TimeStepError::BudgetExceeded {
                num_steps: 100000,
                budget: 100
            })
        ));

        assert!(matches!(
            time_step.with_budget(0, BudgetPolicy::Truncate, max_time_step),
            Err(TimeStepError::ZeroBudget)
        ));
    }

    #[test]
    fn budget_truncation_is_not_silent() {
        let max_time_step = 4.1e-13;
        let time_step = TimeStep::quantize(DURATION, max_time_step).unwrap();

        // 4e-10 is beyond the stability bound
        let (truncated, messages) =
            warnings(|| time_step.with_budget(100, BudgetPolicy::Truncate, max_time_step));
        assert_eq!(truncated.unwrap().num_steps, 100);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("truncating"));
        assert!(messages[1].contains("exceeds the stability bound"));

        // still stable after truncation
        let (_, messages) =
            warnings(|| time_step.with_budget(100, BudgetPolicy::Truncate, 1e-9));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("truncating"));

        let (_, messages) =
            warnings(|| time_step.with_budget(100, BudgetPolicy::ShortenDuration, max_time_step));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("shortening"));

        let (_, messages) =
            warnings(|| time_step.with_budget(100_000, BudgetPolicy::Truncate, max_time_step));
        assert!(messages.is_empty());
    }
}
