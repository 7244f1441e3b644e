mod sample;

use std::io::Write;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use bouncing_ball_xz::BouncingBallXZ;
use bouncing_ball_xz::config::BallConfig;
use component_model_core::driver::run_experiment;
use component_model_core::model::ComponentModel;
use component_model_core::registry::VariableTable;
use component_model_core::variable::Causality;

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries one JSON object per communication point.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = BallConfig::load();
    let experiment = config.experiment;

    let mut host = VariableTable::new();
    let mut model = match BouncingBallXZ::with_config(config, &mut host) {
        Ok(model) => model,
        Err(e) => {
            tracing::error!(%e, "invalid model configuration");
            return ExitCode::FAILURE;
        },
    };

    let meta = model.metadata();
    tracing::info!(
        name = %meta.name,
        version = %meta.version,
        guid = %meta.guid,
        "Component model runner starting"
    );

    for (vr, spec) in host.iter() {
        tracing::debug!(
            vr,
            name = %spec.name,
            causality = ?spec.causality,
            variability = ?spec.variability,
            "declared variable"
        );
    }

    let outputs: Vec<String> = host
        .names_with(Causality::Output)
        .into_iter()
        .map(str::to_string)
        .collect();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut write_error = None;
    let result = run_experiment(&mut model, &experiment, |time, m| {
        if write_error.is_some() {
            return;
        }
        let row = sample::sample(time, m, &outputs);
        if let Err(e) = writeln!(out, "{row}") {
            write_error = Some(e);
        }
    });

    if let Some(e) = write_error {
        tracing::error!(%e, "failed to write results");
        return ExitCode::FAILURE;
    }
    match result {
        Ok(summary) => {
            tracing::info!(
                steps = summary.steps,
                end_time = summary.end_time,
                bounces = model.state().bounces,
                "run complete"
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(%e, "run aborted");
            ExitCode::FAILURE
        },
    }
}
