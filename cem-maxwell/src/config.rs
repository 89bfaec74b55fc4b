use std::path::Path;

use cem_solver::{
    driver::RunConfig,
    material::{
        MaterialModel,
        PhysicalConstants,
    },
    source::{
        BoundaryDrive,
        CurrentSource,
        SourceError,
    },
    time_step::BudgetPolicy,
    yee::{
        BoundarySurface,
        YeeConfig,
    },
};
use color_eyre::eyre::{
    Context,
    Error,
};
use nalgebra::{
    Point3,
    Vector3,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub domain: DomainConfig,

    #[serde(default)]
    pub materials: MaterialsConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub boundary: BoundaryConfig,
}

impl AppConfig {
    /// Reads a configuration file. Files ending in `.json` are parsed as
    /// JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, Error> {
        tracing::info!(path = %path.display(), "Reading config file");
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        let config = if path.extension().is_some_and(|extension| extension == "json") {
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        else {
            toml::from_str(&text)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        };

        Ok(config)
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            duration: self.simulation.duration_ns * 1e-9,
            temporal_order: self.simulation.temporal_order,
            max_steps: self.simulation.max_steps,
            budget_policy: self.simulation.budget_policy,
            safety_factor: self.simulation.safety_factor,
        }
    }

    pub fn yee_config(&self) -> YeeConfig {
        YeeConfig {
            cells: self.domain.cells,
            extent: self.domain.extent,
            origin: self.domain.origin,
            physical_constants: self.domain.physical_constants,
            driven_surfaces: self.boundary.driven_surfaces.clone(),
            boundary_drive: self.boundary.drive,
            power_iterations: self.domain.power_iterations,
        }
    }

    pub fn material_model(&self) -> Result<MaterialModel, SourceError> {
        MaterialModel::from_params(
            &self.materials.dielectric_sphere,
            &self.materials.magnetic_shell,
        )
    }

    pub fn current_source(&self) -> Result<CurrentSource, SourceError> {
        CurrentSource::from_params(&self.sources.voltaic_pile, &self.sources.current_ring)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_duration_ns")]
    pub duration_ns: f64,

    #[serde(default = "default_temporal_order")]
    pub temporal_order: usize,

    #[serde(default)]
    pub max_steps: Option<u64>,

    #[serde(default)]
    pub budget_policy: BudgetPolicy,

    /// Fraction of the stability bound used as maximum time step
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_ns: default_duration_ns(),
            temporal_order: default_temporal_order(),
            max_steps: None,
            budget_policy: Default::default(),
            safety_factor: default_safety_factor(),
        }
    }
}

fn default_duration_ns() -> f64 {
    40.0
}

fn default_temporal_order() -> usize {
    1
}

fn default_safety_factor() -> f64 {
    0.7
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_cells")]
    pub cells: Vector3<usize>,

    /// Size of the box in meters
    #[serde(default = "default_extent")]
    pub extent: Vector3<f64>,

    #[serde(default = "Point3::origin")]
    pub origin: Point3<f64>,

    #[serde(default)]
    pub physical_constants: PhysicalConstants,

    #[serde(default = "default_power_iterations")]
    pub power_iterations: usize,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            cells: default_cells(),
            extent: default_extent(),
            origin: Point3::origin(),
            physical_constants: Default::default(),
            power_iterations: default_power_iterations(),
        }
    }
}

fn default_cells() -> Vector3<usize> {
    Vector3::repeat(16)
}

fn default_extent() -> Vector3<f64> {
    Vector3::repeat(1.0)
}

fn default_power_iterations() -> usize {
    200
}

/// Flat parameter vectors. Empty vectors disable the feature.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MaterialsConfig {
    /// `[center.., radius, relative_permittivity]`
    #[serde(default)]
    pub dielectric_sphere: Vec<f64>,

    /// `[center.., inner_radius, outer_radius, relative_permeability]`
    #[serde(default)]
    pub magnetic_shell: Vec<f64>,
}

/// Flat parameter vectors. Empty vectors disable the source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// `[axis_start.., axis_end.., radius, magnitude, frequency]`
    #[serde(default)]
    pub voltaic_pile: Vec<f64>,

    /// `[axis_start(3), axis_end(3), inner_radius, outer_radius, current,
    /// frequency]`
    #[serde(default)]
    pub current_ring: Vec<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoundaryConfig {
    #[serde(default)]
    pub driven_surfaces: Vec<BoundarySurface>,

    #[serde(default)]
    pub drive: Option<BoundaryDrive>,
}
