use std::fmt::Debug;

use nalgebra::DVector;

use crate::source::{
    SourceError,
    infer_dimension,
};

#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalConstants {
    pub vacuum_permittivity: f64,
    pub vacuum_permeability: f64,
}

impl Debug for PhysicalConstants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalConstants")
            .field("vacuum_permittivity", &self.vacuum_permittivity)
            .field("vacuum_permeability", &self.vacuum_permeability)
            .field("speed_of_light", &self.speed_of_light())
            .finish()
    }
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self::SI
    }
}

impl PhysicalConstants {
    pub const SI: Self = Self {
        vacuum_permittivity: 8.8541878188e-12,
        vacuum_permeability: 1.25663706127e-6,
    };

    pub const REDUCED: Self = Self {
        vacuum_permittivity: 1.0,
        vacuum_permeability: 1.0,
    };

    pub fn speed_of_light(&self) -> f64 {
        (self.vacuum_permittivity * self.vacuum_permeability).powf(-0.5)
    }

    pub fn frequency_to_wavelength(&self, frequency: f64) -> f64 {
        self.speed_of_light() / frequency
    }
}

/// Relative material constants at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    /// mu_r
    pub relative_permeability: f64,

    /// epsilon_r
    pub relative_permittivity: f64,
}

impl Material {
    pub const VACUUM: Self = Self {
        relative_permeability: 1.0,
        relative_permittivity: 1.0,
    };

    pub fn permittivity(&self, physical_constants: &PhysicalConstants) -> f64 {
        self.relative_permittivity * physical_constants.vacuum_permittivity
    }

    pub fn permeability(&self, physical_constants: &PhysicalConstants) -> f64 {
        self.relative_permeability * physical_constants.vacuum_permeability
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::VACUUM
    }
}

/// Spatial distribution of materials that a discretization samples when it
/// builds its material-weighted operators.
pub trait MaterialDistribution {
    fn material(&self, point: &[f64]) -> Material;

    /// Spatial dimension the distribution is restricted to, if any.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

impl<F> MaterialDistribution for F
where
    F: Fn(&[f64]) -> Material,
{
    fn material(&self, point: &[f64]) -> Material {
        self(point)
    }
}

/// A sphere with constant permittivity embedded in vacuum.
///
/// Parameters: `[center.., radius, relative_permittivity]`
#[derive(Clone, Debug)]
pub struct DielectricSphere {
    pub center: DVector<f64>,
    pub radius: f64,
    pub relative_permittivity: f64,
}

impl DielectricSphere {
    pub fn from_params(params: &[f64]) -> Result<Self, SourceError> {
        let dimension = infer_dimension("dielectric sphere", params, 1, 2, "d + 2")?;
        Ok(Self {
            center: DVector::from_column_slice(&params[..dimension]),
            radius: params[dimension],
            relative_permittivity: params[dimension + 1],
        })
    }

    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    pub fn relative_permittivity_at(&self, point: &[f64]) -> f64 {
        if distance(&self.center, point) <= self.radius {
            self.relative_permittivity
        }
        else {
            1.0
        }
    }

    /// Permittivity in absolute units.
    pub fn permittivity(&self, point: &[f64], physical_constants: &PhysicalConstants) -> f64 {
        self.relative_permittivity_at(point) * physical_constants.vacuum_permittivity
    }
}

/// A spherical shell with constant permeability embedded in vacuum.
///
/// Parameters: `[center.., inner_radius, outer_radius, relative_permeability]`
#[derive(Clone, Debug)]
pub struct MagneticShell {
    pub center: DVector<f64>,
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub relative_permeability: f64,
}

impl MagneticShell {
    pub fn from_params(params: &[f64]) -> Result<Self, SourceError> {
        let dimension = infer_dimension("magnetic shell", params, 1, 3, "d + 3")?;
        Ok(Self {
            center: DVector::from_column_slice(&params[..dimension]),
            inner_radius: params[dimension],
            outer_radius: params[dimension + 1],
            relative_permeability: params[dimension + 2],
        })
    }

    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    pub fn relative_permeability_at(&self, point: &[f64]) -> f64 {
        let r = distance(&self.center, point);
        if r >= self.inner_radius && r <= self.outer_radius {
            self.relative_permeability
        }
        else {
            1.0
        }
    }

    /// Permeability in absolute units.
    pub fn permeability(&self, point: &[f64], physical_constants: &PhysicalConstants) -> f64 {
        self.relative_permeability_at(point) * physical_constants.vacuum_permeability
    }

    pub fn inverse_permeability(
        &self,
        point: &[f64],
        physical_constants: &PhysicalConstants,
    ) -> f64 {
        1.0 / self.permeability(point, physical_constants)
    }
}

/// Vacuum with an optional dielectric sphere and magnetic shell.
#[derive(Clone, Debug, Default)]
pub struct MaterialModel {
    pub dielectric_sphere: Option<DielectricSphere>,
    pub magnetic_shell: Option<MagneticShell>,
}

impl MaterialModel {
    /// Empty parameter vectors disable the respective feature.
    pub fn from_params(
        dielectric_sphere: &[f64],
        magnetic_shell: &[f64],
    ) -> Result<Self, SourceError> {
        let model = Self {
            dielectric_sphere: (!dielectric_sphere.is_empty())
                .then(|| DielectricSphere::from_params(dielectric_sphere))
                .transpose()?,
            magnetic_shell: (!magnetic_shell.is_empty())
                .then(|| MagneticShell::from_params(magnetic_shell))
                .transpose()?,
        };

        if let (Some(sphere), Some(shell)) = (&model.dielectric_sphere, &model.magnetic_shell) {
            if sphere.dimension() != shell.dimension() {
                return Err(SourceError::DimensionMismatch {
                    kind: "magnetic shell",
                    expected: sphere.dimension(),
                    got: shell.dimension(),
                });
            }
        }

        Ok(model)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = usize> + '_ {
        self.dielectric_sphere
            .iter()
            .map(DielectricSphere::dimension)
            .chain(self.magnetic_shell.iter().map(MagneticShell::dimension))
    }
}

impl MaterialDistribution for MaterialModel {
    fn material(&self, point: &[f64]) -> Material {
        Material {
            relative_permeability: self
                .magnetic_shell
                .as_ref()
                .map_or(1.0, |shell| shell.relative_permeability_at(point)),
            relative_permittivity: self
                .dielectric_sphere
                .as_ref()
                .map_or(1.0, |sphere| sphere.relative_permittivity_at(point)),
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.dimensions().next()
    }
}

fn distance(center: &DVector<f64>, point: &[f64]) -> f64 {
    assert_eq!(
        center.len(),
        point.len(),
        "point has wrong dimension for material function"
    );
    center
        .iter()
        .zip(point)
        .map(|(c, x)| (x - c).powi(2))
        .sum::<f64>()
        .sqrt()
}
