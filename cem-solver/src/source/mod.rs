//! Analytic current sources
//!
//! Sources are closed-form functions of position and time, configured once
//! from flat parameter vectors and evaluated by the discretization whenever it
//! needs the current density for the electric field update. An empty parameter
//! vector means the source is disabled.
//!
//! Points are passed as slices so that the generators work in 1 to 3
//! dimensions. Internally everything is padded to 3D.

mod boundary;
mod current_ring;
mod voltaic_pile;

use std::{
    f64::consts::TAU,
    fmt::Debug,
};

use nalgebra::{
    Point3,
    Vector3,
};

pub use self::{
    boundary::BoundaryDrive,
    current_ring::CurrentRing,
    voltaic_pile::VoltaicPile,
};

/// Maximum number of spatial dimensions a source can be configured for.
pub const MAX_DIMENSION: usize = 3;

#[derive(Clone, Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid parameters for {kind}: expected {expected} values with d in 1..=3, got {got}")]
    InvalidParameters {
        kind: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("{kind} is {expected}-dimensional, but got a {got}-dimensional vector")]
    DimensionMismatch {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Current ring requires 3D space, but got {dimension}D")]
    RequiresThreeDimensions { dimension: usize },
}

/// A vector valued source density `f(x, t)`.
pub trait VectorSource: Debug + Send + Sync {
    /// Evaluates the source at `point` and `time`, overwriting `out`.
    ///
    /// `out` must have the same dimension as `point`.
    fn evaluate(&self, point: &[f64], time: f64, out: &mut [f64]) -> Result<(), SourceError>;

    fn evaluate_at(&self, point: &Point3<f64>, time: f64) -> Result<Vector3<f64>, SourceError> {
        let mut out = Vector3::zeros();
        self.evaluate(point.coords.as_slice(), time, out.as_mut_slice())?;
        Ok(out)
    }
}

/// Temporal modulation of a source.
pub trait TimeProfile: Debug + Send + Sync + 'static {
    fn evaluate(&self, time: f64) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sinusoid {
    pub frequency: f64,
}

impl TimeProfile for Sinusoid {
    fn evaluate(&self, time: f64) -> f64 {
        (TAU * self.frequency * time).sin()
    }
}

/// The current density driving the electric field.
///
/// Combines an optional [`VoltaicPile`] and an optional [`CurrentRing`]. If
/// both are configured they are evaluated into separate buffers and summed,
/// since each generator overwrites its whole output.
#[derive(Clone, Debug, Default)]
pub struct CurrentSource {
    pub voltaic_pile: Option<VoltaicPile>,
    pub current_ring: Option<CurrentRing>,
}

impl CurrentSource {
    /// Empty parameter vectors disable the respective generator.
    pub fn from_params(voltaic_pile: &[f64], current_ring: &[f64]) -> Result<Self, SourceError> {
        Ok(Self {
            voltaic_pile: (!voltaic_pile.is_empty())
                .then(|| VoltaicPile::from_params(voltaic_pile))
                .transpose()?,
            current_ring: (!current_ring.is_empty())
                .then(|| CurrentRing::from_params(current_ring))
                .transpose()?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.voltaic_pile.is_some() || self.current_ring.is_some()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = usize> + '_ {
        self.voltaic_pile
            .iter()
            .map(VoltaicPile::dimension)
            .chain(self.current_ring.iter().map(|_| 3))
    }
}

impl VectorSource for CurrentSource {
    fn evaluate(&self, point: &[f64], time: f64, out: &mut [f64]) -> Result<(), SourceError> {
        match (&self.voltaic_pile, &self.current_ring) {
            (Some(voltaic_pile), None) => voltaic_pile.evaluate(point, time, out),
            (None, Some(current_ring)) => current_ring.evaluate(point, time, out),
            (Some(voltaic_pile), Some(current_ring)) => {
                let mut ring_buffer = [0.0; MAX_DIMENSION];
                let n = out.len().min(MAX_DIMENSION);
                current_ring.evaluate(point, time, &mut ring_buffer[..n])?;
                voltaic_pile.evaluate(point, time, out)?;
                for (out, ring) in out.iter_mut().zip(&ring_buffer[..n]) {
                    *out += ring;
                }
                Ok(())
            }
            (None, None) => {
                out.fill(0.0);
                Ok(())
            }
        }
    }
}

/// Infers the spatial dimension `d` from a parameter vector with
/// `per_dimension * d + extra` entries.
pub(crate) fn infer_dimension(
    kind: &'static str,
    params: &[f64],
    per_dimension: usize,
    extra: usize,
    expected: &'static str,
) -> Result<usize, SourceError> {
    let error = || {
        SourceError::InvalidParameters {
            kind,
            expected,
            got: params.len(),
        }
    };

    let coordinates = params.len().checked_sub(extra).ok_or_else(error)?;
    if coordinates % per_dimension != 0 {
        return Err(error());
    }

    let dimension = coordinates / per_dimension;
    if (1..=MAX_DIMENSION).contains(&dimension) {
        Ok(dimension)
    }
    else {
        Err(error())
    }
}

/// Pads a point with zeros to 3D.
pub(crate) fn pad_point(coordinates: &[f64]) -> Point3<f64> {
    Point3::from(Vector3::from_fn(|i, _| {
        coordinates.get(i).copied().unwrap_or_default()
    }))
}

pub(crate) fn check_dimension(
    kind: &'static str,
    expected: usize,
    point: &[f64],
    out: &[f64],
) -> Result<(), SourceError> {
    for got in [point.len(), out.len()] {
        if got != expected {
            return Err(SourceError::DimensionMismatch {
                kind,
                expected,
                got,
            });
        }
    }
    Ok(())
}

/// Axial projection and perpendicular offset of a point relative to a
/// cylinder axis.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AxialCoordinates {
    /// `(x - start)·axis`, i.e. the projection scaled by the axis length.
    pub projection: f64,

    /// Component of `x - start` perpendicular to the axis.
    pub perpendicular: Vector3<f64>,
}

impl AxialCoordinates {
    pub fn new(start: &Point3<f64>, axis: &Vector3<f64>, point: &Point3<f64>) -> Self {
        let offset = point - start;
        let projection = offset.dot(axis);
        let perpendicular = offset - axis * (projection / axis.norm_squared());
        Self {
            projection,
            perpendicular,
        }
    }

    /// Whether the projection lies between the axis end points (inclusive).
    pub fn is_between_end_points(&self, axis: &Vector3<f64>) -> bool {
        self.projection >= 0.0 && self.projection <= axis.norm_squared()
    }

    pub fn distance_from_axis(&self) -> f64 {
        self.perpendicular.norm()
    }
}

#[cfg(test)]
mod tests {
    use crate::source::{
        CurrentRing,
        CurrentSource,
        SourceError,
        VectorSource,
        VoltaicPile,
        infer_dimension,
    };

    #[test]
    fn dimension_inference() {
        assert_eq!(infer_dimension("test", &[0.0; 9], 2, 3, "2d + 3").unwrap(), 3);
        assert_eq!(infer_dimension("test", &[0.0; 5], 2, 3, "2d + 3").unwrap(), 1);
        assert!(infer_dimension("test", &[0.0; 6], 2, 3, "2d + 3").is_err());
        assert!(infer_dimension("test", &[0.0; 3], 2, 3, "2d + 3").is_err());
        assert!(infer_dimension("test", &[0.0; 2], 2, 3, "2d + 3").is_err());
        assert!(infer_dimension("test", &[0.0; 11], 2, 3, "2d + 3").is_err());
    }

    #[test]
    fn disabled_source_is_zero() {
        let source = CurrentSource::from_params(&[], &[]).unwrap();
        assert!(!source.is_active());

        let mut out = [1.0; 3];
        source.evaluate(&[0.0, 0.0, 0.0], 1.0, &mut out).unwrap();
        assert_eq!(out, [0.0; 3]);
    }

    fn pile_params() -> Vec<f64> {
        // along z from 0 to 1, radius 0.5, magnitude 2, 1 GHz
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.5, 2.0, 1e9]
    }

    fn ring_params() -> Vec<f64> {
        // along z from 5 to 6 (far away from the pile), radii 0.5 and 1, 3 A, 1 GHz
        vec![0.0, 0.0, 5.0, 0.0, 0.0, 6.0, 0.5, 1.0, 3.0, 1e9]
    }

    #[test]
    fn composite_delegates_to_single_generator() {
        let time = 0.25e-9;
        let point = [0.1, 0.0, 0.5];

        let source = CurrentSource::from_params(&pile_params(), &[]).unwrap();
        let pile = VoltaicPile::from_params(&pile_params()).unwrap();

        let mut expected = [0.0; 3];
        pile.evaluate(&point, time, &mut expected).unwrap();
        let mut out = [0.0; 3];
        source.evaluate(&point, time, &mut out).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn composite_does_not_clobber_contributions() {
        let time = 0.25e-9;
        let source = CurrentSource::from_params(&pile_params(), &ring_params()).unwrap();
        let pile = VoltaicPile::from_params(&pile_params()).unwrap();
        let ring = CurrentRing::from_params(&ring_params()).unwrap();

        // only affected by the pile
        let point = [0.1, 0.0, 0.5];
        let mut expected = [0.0; 3];
        pile.evaluate(&point, time, &mut expected).unwrap();
        assert!(expected[2] > 0.0);
        let mut out = [0.0; 3];
        source.evaluate(&point, time, &mut out).unwrap();
        assert_eq!(out, expected);

        // only affected by the ring
        let point = [0.75, 0.0, 5.5];
        ring.evaluate(&point, time, &mut expected).unwrap();
        assert!(expected[1] != 0.0);
        source.evaluate(&point, time, &mut out).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn composite_with_ring_rejects_2d_points() {
        let source = CurrentSource::from_params(&[], &ring_params()).unwrap();
        let mut out = [0.0; 2];
        assert!(matches!(
            source.evaluate(&[0.0, 0.0], 0.0, &mut out),
            Err(SourceError::RequiresThreeDimensions { dimension: 2 })
        ));
    }
}
