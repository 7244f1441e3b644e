use crate::error::ModelError;
use crate::experiment::DefaultExperiment;
use crate::model::ComponentModel;

/// Outcome of a completed fixed-step run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub start_time: f64,
    pub end_time: f64,
}

/// Drive `model` through `experiment` with fixed communication steps.
///
/// `observe` is called once after initialization and once after every
/// successful step, with the communication point the model has reached.
/// A rejected step aborts the run.
pub fn run_experiment<F>(
    model: &mut dyn ComponentModel,
    experiment: &DefaultExperiment,
    mut observe: F,
) -> Result<RunSummary, ModelError>
where
    F: FnMut(f64, &dyn ComponentModel),
{
    experiment.validate()?;

    model.setup_experiment(experiment.start_time);
    if !model.enter_initialization_mode() || !model.exit_initialization_mode() {
        return Err(ModelError::NotInitialized);
    }
    observe(experiment.start_time, &*model);

    let steps = experiment.step_count();
    tracing::debug!(
        steps,
        step_size = experiment.step_size,
        stop_time = experiment.stop_time,
        "starting run"
    );

    let mut time = experiment.start_time;
    for k in 0..steps {
        let next = experiment.time_at(k + 1);
        if !model.do_step(time, next - time) {
            tracing::warn!(time, "step rejected, aborting run");
            return Err(ModelError::StepFailed { time });
        }
        time = next;
        observe(time, &*model);
    }

    Ok(RunSummary {
        steps,
        start_time: experiment.start_time,
        end_time: time,
    })
}
