use std::f64::consts::TAU;

use nalgebra::{
    Point3,
    Vector3,
};

use crate::material::PhysicalConstants;

/// Prescribed rate of change of the electric field on driven boundary
/// surfaces.
///
/// Both variants describe a z-polarized wave travelling in +x direction, i.e.
/// they are functions of the retarded time `t - x/c`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum BoundaryDrive {
    /// `dE_z/dt = 2πf·cos(2πf·(t - x/c))`
    ContinuousWave { frequency: f64 },

    /// Sinusoid under a gaussian envelope, centered at `x = c·t`.
    GaussianModulated { frequency: f64 },
}

impl BoundaryDrive {
    pub fn frequency(&self) -> f64 {
        match self {
            Self::ContinuousWave { frequency } | Self::GaussianModulated { frequency } => {
                *frequency
            }
        }
    }

    /// Rate of the z component at the retarded time `t - x/c`.
    pub fn rate(&self, retarded_time: f64) -> f64 {
        let omega = TAU * self.frequency();
        let phase = omega * retarded_time;

        match self {
            Self::ContinuousWave { .. } => omega * phase.cos(),
            Self::GaussianModulated { .. } => {
                omega * (-0.25 * phase.powi(2)).exp() * (phase.cos() + 0.25 * phase * phase.sin())
            }
        }
    }

    pub fn electric_field_rate(
        &self,
        point: &Point3<f64>,
        time: f64,
        physical_constants: &PhysicalConstants,
    ) -> Vector3<f64> {
        let retarded_time = time - point.x / physical_constants.speed_of_light();
        Vector3::z() * self.rate(retarded_time)
    }
}
