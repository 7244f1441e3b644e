pub mod driver;
pub mod error;
pub mod experiment;
pub mod model;
pub mod registry;
pub mod variable;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::model::{ComponentModel, ModelPhase};
    use crate::variable::Value;

    /// Set up, initialize and enter step mode at `start_time`.
    pub fn initialize(model: &mut dyn ComponentModel, start_time: f64) {
        model.setup_experiment(start_time);
        assert!(
            model.enter_initialization_mode(),
            "enter_initialization_mode must succeed with default start values"
        );
        assert!(model.exit_initialization_mode());
    }

    /// Run `n` steps of `step_size` from `start_time`, returning the time reached.
    /// Panics on the first rejected step.
    pub fn run_steps(
        model: &mut dyn ComponentModel,
        start_time: f64,
        step_size: f64,
        n: usize,
    ) -> f64 {
        let mut time = start_time;
        for k in 0..n {
            let next = start_time + (k + 1) as f64 * step_size;
            assert!(
                model.do_step(time, next - time),
                "step {k} at t={time} was rejected"
            );
            time = next;
        }
        time
    }

    /// Read a scalar variable, panicking on any error.
    pub fn real(model: &dyn ComponentModel, name: &str) -> f64 {
        match model.get(name) {
            Ok(Value::Real(r)) => r,
            other => panic!("expected Real for `{name}`, got {other:?}"),
        }
    }

    /// Read a two-component vector variable, panicking on any error.
    pub fn vec2(model: &dyn ComponentModel, name: &str) -> [f64; 2] {
        match model.get(name) {
            Ok(Value::Vector(v)) if v.len() == 2 => [v[0], v[1]],
            other => panic!("expected Vector[2] for `{name}`, got {other:?}"),
        }
    }

    // ================================================================
    // Model Trait Contract Tests
    // ================================================================
    // Every ComponentModel implementation must pass these. Model crates
    // call them from their own #[cfg(test)] modules with a fresh instance.

    /// do_step() before initialization must be rejected.
    pub fn contract_step_requires_initialization(model: &mut dyn ComponentModel) {
        assert_eq!(model.phase(), ModelPhase::Instantiated);
        assert!(
            !model.do_step(0.0, 0.1),
            "do_step must fail before enter_initialization_mode"
        );
    }

    /// A non-positive step size must be rejected and leave the state untouched.
    pub fn contract_zero_step_rejected(model: &mut dyn ComponentModel) {
        initialize(model, 0.0);
        let before = model.serialize_state().expect("snapshot must encode");
        assert!(!model.do_step(0.0, 0.0), "step_size = 0 must fail");
        assert!(!model.do_step(0.0, -0.1), "negative step_size must fail");
        let after = model.serialize_state().expect("snapshot must encode");
        assert_eq!(before, after, "rejected step must not change state");
    }

    /// A successful step must change the serialized state.
    pub fn contract_step_advances_state(model: &mut dyn ComponentModel) {
        initialize(model, 0.0);
        let before = model.serialize_state().expect("snapshot must encode");
        assert!(model.do_step(0.0, 0.1));
        let after = model.serialize_state().expect("snapshot must encode");
        assert_ne!(before, after, "do_step must advance the state");
    }

    /// serialize_state → apply_state restores the exact state, so the next
    /// step from the snapshot reproduces the same result.
    pub fn contract_state_roundtrip_preserves(model: &mut dyn ComponentModel) {
        initialize(model, 0.0);
        run_steps(model, 0.0, 0.1, 3);
        let snapshot = model.serialize_state().expect("snapshot must encode");

        assert!(model.do_step(0.3, 0.1));
        let first = model.serialize_state().expect("snapshot must encode");

        model.apply_state(&snapshot).expect("snapshot must decode");
        assert!(model.do_step(0.3, 0.1));
        let second = model.serialize_state().expect("snapshot must encode");

        assert_eq!(first, second, "replaying a step from a snapshot must be deterministic");
    }

    /// Every registered name must be readable after initialization.
    pub fn contract_variables_readable(model: &mut dyn ComponentModel, names: &[&str]) {
        initialize(model, 0.0);
        for name in names {
            assert!(model.get(name).is_ok(), "variable `{name}` must be readable");
        }
        assert!(model.get("no_such_variable").is_err());
    }
}
