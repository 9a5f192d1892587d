// apogee_sim/src/main.rs

use std::path::Path;

use anyhow::{Context, Result};
use apogee_sim::cli::{Cli, Command};
use apogee_sim::prelude::*;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Command::Simulate {
            config,
            output,
            seed,
        } => simulate(&config, &output, seed),
        Command::Estimate {
            config,
            input,
            tuned,
            output,
        } => estimate(&config, &input, tuned.as_deref(), output.as_deref()),
        Command::Tune { config, output } => tune(&config, &output),
    }
}

fn load_config(path: &Path) -> Result<ApogeeConfig> {
    let config = ApogeeConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

fn simulate(config_path: &Path, output: &Path, seed: Option<u64>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut rng = SimulationRng::new(seed.or(config.simulation.seed));

    let wind = config.wind.build(&mut rng.0)?;
    let generator = FlightDataGenerator::new(config.dynamics()?, config.simulation.generator_settings(), wind)?;
    let data = generator.generate()?;

    write_flight_csv(output, &data, config.real_log.time_unit)
        .with_context(|| format!("writing {}", output.display()))?;
    if let Some((apogee, at)) = data.apogee() {
        info!(samples = data.len(), apogee, at, output = %output.display(), "wrote synthetic flight");
    }
    Ok(())
}

fn estimate(config_path: &Path, input: &Path, tuned: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut rng = SimulationRng::new(config.simulation.seed);

    let mut loader = RealLogLoader::new(input, config.real_log.options());
    if let Some(wind) = &config.real_log.wind {
        loader = loader.with_wind(wind.build(&mut rng.0)?, config.rocket.build()?);
    }
    let data = loader
        .load()
        .with_context(|| format!("loading flight log {}", input.display()))?;

    let tuned = tuned
        .map(|path| {
            TunedCovariances::load(path).with_context(|| format!("loading tuned covariances {}", path.display()))
        })
        .transpose()?;
    let setup = config.filter.setup(tuned.as_ref())?;
    let dynamics = config.dynamics()?;
    let mut filter = setup.build(&data, &dynamics)?;

    let summary = FilterRunner::new(setup.variant).run(
        filter.as_mut(),
        &data,
        &config.sensors.replay_suite()?,
        &mut rng.0,
    )?;

    if let Some(report) = &summary.report {
        info!(
            steps = report.steps,
            mean_nis = report.mean_nis,
            mean_nees = ?report.mean_nees,
            "consistency"
        );
    }
    if let Some(peak) = summary
        .estimates
        .iter()
        .max_by(|a, b| a.state[2].total_cmp(&b.state[2]))
    {
        info!(altitude = peak.state[2], time = peak.time, "estimated apogee");
    }

    if let Some(output) = output {
        write_estimates_csv(output, &summary.estimates)
            .with_context(|| format!("writing {}", output.display()))?;
        info!(rows = summary.estimates.len(), output = %output.display(), "wrote estimates");
    }
    Ok(())
}

fn tune(config_path: &Path, output: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let space = config.tuning.space(config.filter.variant);
    let logs = config
        .tuning
        .dataset_dir
        .as_deref()
        .map(discover_logs)
        .unwrap_or_default();

    let objective = Objective::new(
        space.clone(),
        config.tuning.objective_settings(&config),
        config.dynamics()?,
        logs,
    )?;
    let result = optimize(&space, &config.tuning.optimizer_settings(), |params| {
        objective.evaluate(params)
    })?;

    let tuned = space.decode(&result.best_params)?;
    tuned
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        best = result.best_value,
        failed = result.history.iter().filter(|e| e.failed).count(),
        output = %output.display(),
        "wrote tuned covariances"
    );
    Ok(())
}
