use std::path::PathBuf;

use cem_solver::time_step::BudgetPolicy;

#[derive(Clone, Debug, clap::Parser)]
pub struct RunArgs {
    /// TOML or JSON configuration file
    pub config: Option<PathBuf>,

    /// Simulated time in nanoseconds
    #[clap(long)]
    pub duration_ns: Option<f64>,

    /// Temporal order of the integrator (1 to 4)
    #[clap(short, long)]
    pub order: Option<usize>,

    /// Maximum number of time steps
    #[clap(short = 'n', long)]
    pub max_steps: Option<u64>,

    #[clap(long, value_parser = parse_budget_policy)]
    pub budget_policy: Option<BudgetPolicy>,
}

fn parse_budget_policy(s: &str) -> Result<BudgetPolicy, String> {
    match s {
        "truncate" => Ok(BudgetPolicy::Truncate),
        "fail" => Ok(BudgetPolicy::Fail),
        "shorten-duration" | "shorten_duration" => Ok(BudgetPolicy::ShortenDuration),
        _ => Err(format!("invalid budget policy: {s}")),
    }
}
