use cem_solver::{
    driver::{
        self,
        Discretization,
    },
    integrator::FieldSystem,
    util::format_size,
    yee::YeeSystem,
};
use color_eyre::eyre::{
    Context,
    Error,
};

use crate::{
    args::RunArgs,
    config::AppConfig,
};

/// Below this the discrete dispersion error of the lattice gets large.
const MIN_CELLS_PER_WAVELENGTH: f64 = 10.0;

pub fn run(args: RunArgs) -> Result<(), Error> {
    let mut config = args
        .config
        .as_deref()
        .map(AppConfig::load)
        .transpose()?
        .unwrap_or_default();

    if let Some(duration_ns) = args.duration_ns {
        config.simulation.duration_ns = duration_ns;
    }
    if let Some(order) = args.order {
        config.simulation.temporal_order = order;
    }
    if let Some(max_steps) = args.max_steps {
        config.simulation.max_steps = Some(max_steps);
    }
    if let Some(budget_policy) = args.budget_policy {
        config.simulation.budget_policy = budget_policy;
    }
    tracing::debug!(?config);

    let materials = config
        .material_model()
        .context("Invalid material parameters")?;
    let current_source = config
        .current_source()
        .context("Invalid source parameters")?;

    let system = YeeSystem::new(&config.yee_config(), &materials, current_source)
        .context("Could not set up discretization")?;
    tracing::info!(
        electric_dofs = system.electric_dofs(),
        magnetic_dofs = system.magnetic_dofs(),
        memory = %format_size(system.memory_required()),
        max_time_step = system.maximum_time_step(),
        "discretization ready"
    );

    if let Some(drive) = &config.boundary.drive {
        let wavelength = config
            .domain
            .physical_constants
            .frequency_to_wavelength(drive.frequency());
        let cells_per_wavelength = wavelength / system.lattice().spacing().max();
        tracing::info!(wavelength, cells_per_wavelength, "boundary drive");
        if cells_per_wavelength < MIN_CELLS_PER_WAVELENGTH {
            tracing::warn!(
                cells_per_wavelength,
                "lattice is too coarse for the drive frequency"
            );
        }
    }

    let summary = driver::run(&system, &config.run_config(), |report| {
        println!(
            "step {:>8}  t = {:.6e} s  energy = {:.6e}",
            report.step, report.time, report.energy
        );
    })?;

    println!(
        "{} steps, dt = {:.6e} s, final time = {:.6e} s, energy {:.6e} -> {:.6e}",
        summary.num_steps,
        summary.dt,
        summary.final_time,
        summary.initial_energy,
        summary.final_energy
    );

    Ok(())
}
