use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gravitational acceleration (m/s^2, acting in -z).
pub const GRAVITY: f64 = 9.81;
/// Default speed below which a grounded ball is considered stopped.
pub const V_MIN: f64 = 1e-15;
/// Upper bound on ground contacts resolved within a single call to [`advance`].
pub const MAX_BOUNCES_PER_STEP: u32 = 16;
/// Largest drag impulse `drag·|v|·dt` applied in one flight segment.
const MAX_DRAG_IMPULSE: f64 = 0.01;
/// Shortest flight segment, as a fraction of the step.
const MIN_SEGMENT_FRACTION: f64 = 1.0 / 1024.0;

/// A vector in the vertical x/z plane. `z` is height above ground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub z: f64,
}

impl Vec2 {
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub const ZERO: Self = Self::new(0.0, 0.0);

    pub fn length(self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.z * self.z
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.z]
    }
}

impl From<[f64; 2]> for Vec2 {
    fn from([x, z]: [f64; 2]) -> Self {
        Self { x, z }
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, s: f64) -> Vec2 {
        Vec2::new(self.x * s, self.z * s)
    }
}

/// Physical parameters, fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallParams {
    /// Launch velocity (m/s).
    pub v0: Vec2,
    /// Fraction of vertical speed kept on each bounce, in (0, 1].
    pub bounce_factor: f64,
    /// Drag coefficient (1/m): deceleration is `drag * |v|^2`.
    pub drag: f64,
    /// Speed below which a ball on the ground is held at rest.
    pub v_min: f64,
    /// Gravitational acceleration (m/s^2), acting in -z.
    pub gravity: f64,
}

impl Default for BallParams {
    fn default() -> Self {
        Self {
            v0: Vec2::new(1.0, 1.0),
            bounce_factor: 0.95,
            drag: 0.0,
            v_min: V_MIN,
            gravity: GRAVITY,
        }
    }
}

impl BallParams {
    pub fn validate(&self) -> Result<(), StepError> {
        if !self.v0.is_finite() {
            return Err(StepError::InvalidParams("v0 must be finite"));
        }
        if !(self.bounce_factor > 0.0 && self.bounce_factor <= 1.0) {
            return Err(StepError::InvalidParams("bounce_factor must be in (0, 1]"));
        }
        if !(self.drag >= 0.0 && self.drag.is_finite()) {
            return Err(StepError::InvalidParams("drag must be finite and >= 0"));
        }
        if !(self.v_min > 0.0 && self.v_min.is_finite()) {
            return Err(StepError::InvalidParams("v_min must be finite and > 0"));
        }
        if !(self.gravity > 0.0 && self.gravity.is_finite()) {
            return Err(StepError::InvalidParams("gravity must be finite and > 0"));
        }
        Ok(())
    }
}

/// Logical motion state of the ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallPhase {
    /// Above ground, or on the ground with vertical speed.
    Airborne,
    /// On the ground with no vertical speed, still moving horizontally. Reached
    /// when launched flat along the ground or after a bounce sequence settles.
    Rolling,
    /// On the ground and stopped. Terminal unless the host writes a new velocity.
    Resting,
}

/// Mutable state advanced by [`advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: Vec2,
    pub v: Vec2,
    /// Kinetic plus potential energy per unit mass (J/kg).
    pub energy: f64,
    /// Time between the two most recent ground contacts (s).
    pub period: f64,
    /// Time of the most recent ground contact, if any.
    pub last_contact: Option<f64>,
    pub bounces: u32,
}

impl BallState {
    /// State at the start of a run: position `x`, velocity `v0`.
    ///
    /// A ball starting on the ground counts `start_time` as a contact, so its
    /// first bounce reports the duration of the first arc.
    pub fn launch(x: Vec2, params: &BallParams, start_time: f64) -> Self {
        let mut state = Self {
            x,
            v: params.v0,
            energy: 0.0,
            period: 0.0,
            last_contact: (x.z <= 0.0).then_some(start_time),
            bounces: 0,
        };
        if state.phase(params) == BallPhase::Resting {
            state.x.z = 0.0;
            state.v = Vec2::ZERO;
        }
        state.energy = state.total_energy(params.gravity);
        state
    }

    pub fn phase(&self, params: &BallParams) -> BallPhase {
        if self.x.z > 0.0 {
            BallPhase::Airborne
        } else if self.v.length() < params.v_min {
            BallPhase::Resting
        } else if self.v.z == 0.0 {
            BallPhase::Rolling
        } else {
            BallPhase::Airborne
        }
    }

    pub fn total_energy(&self, gravity: f64) -> f64 {
        0.5 * self.v.length_squared() + gravity * self.x.z
    }

    /// Height of the top of the current free-flight arc (no drag).
    pub fn apex(&self, gravity: f64) -> f64 {
        self.x.z + self.v.z * self.v.z / (2.0 * gravity)
    }

    /// Check the state invariants: finite values, height and energy >= 0.
    pub fn validate(&self) -> Result<(), StepError> {
        if !self.x.is_finite() || !self.v.is_finite() {
            return Err(StepError::InvalidState("position and velocity must be finite"));
        }
        if self.x.z < 0.0 {
            return Err(StepError::InvalidState("ball is below ground"));
        }
        if !(self.energy >= 0.0 && self.energy.is_finite()) {
            return Err(StepError::InvalidState("energy must be finite and >= 0"));
        }
        if !self.period.is_finite() || self.last_contact.is_some_and(|t| !t.is_finite()) {
            return Err(StepError::InvalidState("contact timing must be finite"));
        }
        Ok(())
    }
}

/// A ground contact detected during a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceEvent {
    /// Simulation time of the contact.
    pub time: f64,
    /// Vertical velocity just before contact (<= 0).
    pub impact_velocity: f64,
    /// Vertical velocity just after contact, `-bounce_factor * impact_velocity`.
    pub rebound_velocity: f64,
    /// Period reported after this contact.
    pub period: f64,
    /// The rebounds following this contact would exceed the contact budget of
    /// the step, so the sequence was resolved to its limit: the ball stays on
    /// the ground with no vertical speed.
    pub settled: bool,
}

/// Result of one successful call to [`advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: BallState,
    pub bounces: Vec<BounceEvent>,
    /// Whether the ball entered the resting state during this step.
    pub came_to_rest: bool,
}

/// Failures reported by [`advance`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("step size must be finite and > 0, got {0}")]
    NonPositiveStep(f64),
    #[error("current time must be finite, got {0}")]
    InvalidTime(f64),
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),
    #[error("invalid state on entry: {0}")]
    InvalidState(&'static str),
    #[error("more than {limit} ground contacts within one step")]
    TooManyBounces { limit: u32 },
    #[error("step produced a non-finite state")]
    Diverged,
}

/// Advance the ball by `step_size` starting at `current_time`.
///
/// The step is flown in segments. Each segment first applies the drag
/// impulse `v / (1 + drag·|v|·dt)`, which shrinks the speed and never
/// reverses it, then follows the exact ballistic arc under gravity. Segments
/// are cut short so that `drag·|v|·dt` stays below `MAX_DRAG_IMPULSE`.
///
/// A segment that would carry the ball below ground is split at the crossing
/// time; the vertical velocity is reflected and scaled by `bounce_factor` and
/// the remainder of the step is flown from the contact point. At most
/// [`MAX_BOUNCES_PER_STEP`] contacts are resolved per call. With
/// `bounce_factor < 1` a contact whose rebounds would run past that budget
/// settles the ball on the ground; with `bounce_factor == 1` running past it
/// is an error.
///
/// The input state is never modified; on error nothing is returned.
pub fn advance(
    state: &BallState,
    params: &BallParams,
    current_time: f64,
    step_size: f64,
) -> Result<StepOutcome, StepError> {
    if !(step_size > 0.0 && step_size.is_finite()) {
        return Err(StepError::NonPositiveStep(step_size));
    }
    if !current_time.is_finite() {
        return Err(StepError::InvalidTime(current_time));
    }
    params.validate()?;
    state.validate()?;

    let was_resting = state.phase(params) == BallPhase::Resting;
    let mut next = *state;
    let mut bounces: Vec<BounceEvent> = Vec::new();
    let mut elapsed = 0.0;

    loop {
        let remaining = step_size - elapsed;
        if remaining <= 0.0 {
            break;
        }
        match next.phase(params) {
            BallPhase::Resting => break,
            BallPhase::Rolling => {
                roll(&mut next, remaining, params);
                break;
            },
            BallPhase::Airborne => {},
        }

        let dt = flight_segment(next.v, params, step_size, remaining);
        let v = next.v * drag_factor(next.v, params.drag, dt);
        let (x1, v1) = fly(next.x, v, dt, params.gravity);
        // The arc is concave, so both ends above ground means no contact.
        if x1.z >= 0.0 {
            next.x = x1;
            next.v = v1;
            if dt >= remaining {
                break;
            }
            elapsed += dt;
            continue;
        }

        if bounces.len() as u32 >= MAX_BOUNCES_PER_STEP {
            return Err(StepError::TooManyBounces {
                limit: MAX_BOUNCES_PER_STEP,
            });
        }

        let tau = ground_crossing(next.x.z, v.z, -params.gravity, dt, x1.z);
        let (xc, vc) = fly(next.x, v, tau, params.gravity);
        let time = current_time + elapsed + tau;
        let impact = vc.z.min(0.0);
        let rebound = -params.bounce_factor * impact;
        let budget = MAX_BOUNCES_PER_STEP - bounces.len() as u32 - 1;
        let settled = params.bounce_factor < 1.0
            && (budget == 0
                || rebounds_land_within(rebound, params, budget + 1, remaining - tau));

        if let Some(previous) = next.last_contact {
            next.period = time - previous;
        }
        next.last_contact = Some(time);
        next.bounces += 1;
        next.x = Vec2::new(xc.x, 0.0);
        next.v = Vec2::new(vc.x, if settled { 0.0 } else { rebound });

        tracing::debug!(
            time,
            impact,
            rebound,
            settled,
            period = next.period,
            "ground contact"
        );
        bounces.push(BounceEvent {
            time,
            impact_velocity: impact,
            rebound_velocity: rebound,
            period: next.period,
            settled,
        });
        elapsed += tau;
    }

    if next.x.z <= 0.0 && next.v.length() < params.v_min {
        next.x.z = 0.0;
        next.v = Vec2::ZERO;
    }
    next.energy = next.total_energy(params.gravity);
    if !(next.x.is_finite() && next.v.is_finite() && next.energy.is_finite()) {
        return Err(StepError::Diverged);
    }

    let came_to_rest = !was_resting && next.phase(params) == BallPhase::Resting;
    if came_to_rest {
        tracing::info!(
            time = current_time + step_size,
            x = next.x.x,
            bounces = next.bounces,
            "ball came to rest"
        );
    }

    Ok(StepOutcome {
        state: next,
        bounces,
        came_to_rest,
    })
}

/// Length of the next flight segment: the rest of the step, shortened while
/// drag is strong, but never below `MIN_SEGMENT_FRACTION` of the step.
fn flight_segment(v: Vec2, params: &BallParams, step_size: f64, remaining: f64) -> f64 {
    let rate = params.drag * v.length();
    if rate == 0.0 {
        return remaining;
    }
    (MAX_DRAG_IMPULSE / rate)
        .max(step_size * MIN_SEGMENT_FRACTION)
        .min(remaining)
}

/// Fraction of the speed kept after `dt` of quadratic drag alone:
/// `dv/dt = -drag·|v|·v` keeps the direction and gives `|v|/(1 + drag·|v|·t)`.
fn drag_factor(v: Vec2, drag: f64, dt: f64) -> f64 {
    1.0 / (1.0 + drag * v.length() * dt)
}

/// Ballistic arc under gravity alone.
fn fly(x: Vec2, v: Vec2, dt: f64, gravity: f64) -> (Vec2, Vec2) {
    let x1 = Vec2::new(x.x + v.x * dt, x.z + v.z * dt - 0.5 * gravity * dt * dt);
    (x1, Vec2::new(v.x, v.z - gravity * dt))
}

/// Whether `count` further contacts after a rebound of `rebound` would all
/// land within `window`. Drag-free flight times form the series `f, f·e,
/// f·e², ...` with `f = 2·rebound/g` and `e = bounce_factor < 1`.
fn rebounds_land_within(rebound: f64, params: &BallParams, count: u32, window: f64) -> bool {
    let e = params.bounce_factor;
    let first = 2.0 * rebound / params.gravity;
    let total = first * (1.0 - e.powi(count as i32)) / (1.0 - e);
    total <= window
}

/// Horizontal motion along the ground, slowed by drag only.
fn roll(state: &mut BallState, dt: f64, params: &BallParams) {
    state.x.z = 0.0;
    state.v.z = 0.0;
    let vx = state.v.x;
    let k = params.drag * vx.abs();
    if k == 0.0 {
        state.x.x += vx * dt;
        return;
    }
    state.x.x += vx.signum() * (k * dt).ln_1p() / params.drag;
    state.v.x = vx / (1.0 + k * dt);
}

/// Earliest time in `[0, dt]` at which `z + vz·t + ½·az·t²` reaches the
/// ground while descending. Falls back to linear interpolation between the
/// endpoint heights if the quadratic yields no usable root.
fn ground_crossing(z: f64, vz: f64, az: f64, dt: f64, z_end: f64) -> f64 {
    let (a, b, c) = (0.5 * az, vz, z);
    let mut earliest: Option<f64> = None;
    let mut consider = |t: f64| {
        // A root at t = 0 only counts when already moving down, otherwise it
        // is the contact the ball just left.
        if t.is_finite() && t >= 0.0 && t <= dt * (1.0 + 1e-9) && (t > 0.0 || vz < 0.0) {
            earliest = Some(earliest.map_or(t, |e: f64| e.min(t)));
        }
    };

    if a.abs() < f64::EPSILON {
        if b != 0.0 {
            consider(-c / b);
        }
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let q = -0.5 * (b + b.signum() * disc.sqrt());
            if q != 0.0 {
                consider(q / a);
                consider(c / q);
            }
        }
    }

    match earliest {
        Some(t) => t.min(dt),
        None if z - z_end > 0.0 => (dt * z / (z - z_end)).clamp(0.0, dt),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn params(v0: Vec2, bounce_factor: f64, drag: f64) -> BallParams {
        BallParams {
            v0,
            bounce_factor,
            drag,
            ..Default::default()
        }
    }

    /// Run `n` steps, collecting every intermediate state and bounce.
    fn simulate(
        p: &BallParams,
        start: Vec2,
        step_size: f64,
        n: usize,
    ) -> (Vec<BallState>, Vec<BounceEvent>) {
        let mut state = BallState::launch(start, p, 0.0);
        let mut states = vec![state];
        let mut bounces = Vec::new();
        for k in 0..n {
            let out = advance(&state, p, k as f64 * step_size, step_size).unwrap();
            bounces.extend(out.bounces);
            state = out.state;
            states.push(state);
        }
        (states, bounces)
    }

    #[test]
    fn free_flight_is_exact_without_drag() {
        let p = params(Vec2::new(1.0, 5.0), 0.95, 0.0);
        let state = BallState::launch(Vec2::new(0.0, 2.0), &p, 0.0);
        let out = advance(&state, &p, 0.0, 0.1).unwrap();

        assert!(out.bounces.is_empty());
        assert_relative_eq!(out.state.x.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(out.state.x.z, 2.0 + 0.5 - 0.5 * GRAVITY * 0.01, epsilon = 1e-12);
        assert_relative_eq!(out.state.v.z, 5.0 - GRAVITY * 0.1, epsilon = 1e-12);
        assert_relative_eq!(out.state.energy, state.energy, epsilon = 1e-9);
    }

    #[test]
    fn bounce_splits_the_step_at_the_crossing() {
        // Falling from 0.05 m at 1 m/s: contact after ~0.0434 s.
        let p = params(Vec2::new(0.0, -1.0), 0.8, 0.0);
        let state = BallState::launch(Vec2::new(0.0, 0.05), &p, 0.0);
        let out = advance(&state, &p, 0.0, 0.1).unwrap();

        assert_eq!(out.bounces.len(), 1);
        let bounce = out.bounces[0];
        let expected_t = (-1.0 + (1.0 + 2.0 * GRAVITY * 0.05_f64).sqrt()) / GRAVITY;
        assert_relative_eq!(bounce.time, expected_t, epsilon = 1e-12);
        assert_relative_eq!(bounce.impact_velocity, -1.0 - GRAVITY * expected_t, epsilon = 1e-12);
        assert_relative_eq!(
            bounce.rebound_velocity,
            -0.8 * bounce.impact_velocity,
            epsilon = 1e-12
        );

        // The remainder of the step is flown with the reflected velocity.
        let rest = 0.1 - expected_t;
        assert_relative_eq!(
            out.state.x.z,
            bounce.rebound_velocity * rest - 0.5 * GRAVITY * rest * rest,
            epsilon = 1e-12
        );
        assert!(out.state.x.z > 0.0);
        assert_eq!(out.state.bounces, 1);
    }

    #[test]
    fn large_step_does_not_tunnel() {
        let p = params(Vec2::new(0.0, 0.0), 0.5, 0.0);
        let state = BallState::launch(Vec2::new(0.0, 1.0), &p, 0.0);
        // A single 1 s step would end far below ground without sub-stepping.
        let out = advance(&state, &p, 0.0, 1.0).unwrap();
        assert!(out.state.x.z >= 0.0);
        assert!(!out.bounces.is_empty());
        assert!(out.bounces.len() as u32 <= MAX_BOUNCES_PER_STEP);
    }

    #[test]
    fn elastic_ball_exceeding_contact_budget_fails() {
        // Flights of 2·0.1/g ≈ 0.02 s: a 1 s step would need about 49 contacts.
        let p = params(Vec2::new(0.0, 0.1), 1.0, 0.0);
        let state = BallState::launch(Vec2::ZERO, &p, 0.0);
        let copy = state;
        assert_eq!(
            advance(&state, &p, 0.0, 1.0),
            Err(StepError::TooManyBounces {
                limit: MAX_BOUNCES_PER_STEP
            })
        );
        assert_eq!(state, copy);
        // The same ball is fine at a step that holds fewer contacts.
        let out = advance(&state, &p, 0.0, 0.1).unwrap();
        assert!(out.bounces.len() as u32 <= MAX_BOUNCES_PER_STEP);
    }

    #[test]
    fn converging_bounces_settle_instead_of_failing() {
        // With any restitution loss the same step settles rather than fails.
        let p = params(Vec2::new(0.0, 0.1), 0.999, 0.0);
        let state = BallState::launch(Vec2::ZERO, &p, 0.0);
        let out = advance(&state, &p, 0.0, 1.0).unwrap();
        let last = out.bounces.last().unwrap();
        assert!(last.settled);
        assert_relative_eq!(
            last.rebound_velocity,
            -0.999 * last.impact_velocity,
            epsilon = 1e-12
        );
        assert!(out.came_to_rest);
        assert_eq!(out.state.phase(&p), BallPhase::Resting);
    }

    #[test]
    fn first_bounce_period_is_first_arc() {
        let p = params(Vec2::new(1.0, 5.0), 0.95, 0.0);
        let (_, bounces) = simulate(&p, Vec2::ZERO, 0.01, 200);
        let flight = 2.0 * 5.0 / GRAVITY;
        assert_relative_eq!(bounces[0].time, flight, epsilon = 1e-9);
        assert_relative_eq!(bounces[0].period, flight, epsilon = 1e-9);
        let second = 0.95 * flight;
        assert_relative_eq!(bounces[1].period, second, epsilon = 1e-9);
    }

    #[test]
    fn period_unset_until_second_contact_when_dropped() {
        let p = params(Vec2::ZERO, 0.9, 0.0);
        let (states, bounces) = simulate(&p, Vec2::new(0.0, 1.0), 0.01, 60);
        assert_eq!(bounces.len(), 1);
        assert_eq!(states.last().unwrap().period, 0.0);
        assert!(states.last().unwrap().last_contact.is_some());
    }

    #[test]
    fn bounce_law_holds_for_every_contact() {
        let p = params(Vec2::new(0.5, 3.0), 0.7, 0.0);
        let (_, bounces) = simulate(&p, Vec2::ZERO, 0.05, 100);
        assert!(bounces.len() > 2);
        for b in &bounces {
            assert_relative_eq!(
                b.rebound_velocity,
                -0.7 * b.impact_velocity,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn bounce_law_is_independent_of_step_size() {
        let p = params(Vec2::ZERO, 0.9, 0.0);
        let impact = -(2.0 * GRAVITY * 0.013_f64).sqrt();
        // Contact after about 0.0515 s.
        for (step_size, n) in [(0.01, 6), (0.1, 1), (1.0, 1)] {
            let (_, bounces) = simulate(&p, Vec2::new(0.0, 0.013), step_size, n);
            let first = bounces[0];
            assert_relative_eq!(first.impact_velocity, impact, epsilon = 1e-9);
            assert_relative_eq!(first.rebound_velocity, -0.9 * impact, epsilon = 1e-9);
            for b in &bounces {
                assert_relative_eq!(
                    b.rebound_velocity,
                    -0.9 * b.impact_velocity,
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn settles_only_when_bounces_converge_inside_the_step() {
        // Dropped from 0.013 m: all rebounds together last about 0.93 s.
        let p = params(Vec2::ZERO, 0.9, 0.0);
        let state = BallState::launch(Vec2::new(0.0, 0.013), &p, 0.0);

        let out = advance(&state, &p, 0.0, 1.0).unwrap();
        assert!(out.bounces.iter().any(|b| b.settled));
        assert!(out.came_to_rest);
        assert_eq!(out.state.v, Vec2::ZERO);

        let out = advance(&state, &p, 0.0, 0.1).unwrap();
        assert_eq!(out.bounces.len(), 1);
        assert!(!out.bounces[0].settled);
        assert!(out.state.v.z > 0.0 || out.state.x.z > 0.0);
    }

    #[test]
    fn elastic_ball_keeps_its_apex() {
        let p = params(Vec2::new(1.0, 5.0), 1.0, 0.0);
        let mut state = BallState::launch(Vec2::ZERO, &p, 0.0);
        let apex0 = state.apex(GRAVITY);
        let mut seen = 0;
        for k in 0..1000 {
            let out = advance(&state, &p, k as f64 * 0.01, 0.01).unwrap();
            state = out.state;
            if !out.bounces.is_empty() {
                seen += 1;
                assert_relative_eq!(state.apex(GRAVITY), apex0, max_relative = 1e-9);
            }
        }
        assert!(seen >= 9, "expected about ten bounces, saw {seen}");
    }

    #[test]
    fn bouncing_ball_scenario() {
        let p = BallParams {
            v0: Vec2::new(1.0, 5.0),
            bounce_factor: 0.95,
            drag: 0.0,
            v_min: 1e-15,
            gravity: GRAVITY,
        };
        let (states, bounces) = simulate(&p, Vec2::ZERO, 0.01, 1000);
        assert!(bounces.len() > 1);

        // Peak height of each arc, split at bounce events.
        let mut peaks = Vec::new();
        let mut arc_max: f64 = 0.0;
        let mut count = 0;
        for pair in states.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            assert!(cur.x.z >= 0.0);
            assert!(cur.x.x > prev.x.x, "x must increase monotonically");
            if cur.bounces > count {
                peaks.push(arc_max);
                arc_max = cur.x.z;
                count = cur.bounces;
            } else {
                arc_max = arc_max.max(cur.x.z);
            }
        }
        assert!(peaks.len() > 1);
        for w in peaks.windows(2) {
            assert!(w[1] < w[0], "peaks must decrease: {peaks:?}");
        }
    }

    #[test]
    fn drop_from_rest_stays_resting() {
        let p = params(Vec2::ZERO, 0.95, 0.0);
        let (states, bounces) = simulate(&p, Vec2::ZERO, 0.01, 100);
        assert!(bounces.is_empty());
        for s in &states {
            assert_eq!(s.phase(&p), BallPhase::Resting);
            assert_eq!(s.energy, 0.0);
            assert_eq!(s.period, 0.0);
            assert_eq!(s.v, Vec2::ZERO);
        }
    }

    #[test]
    fn zero_step_fails_and_leaves_state() {
        let p = BallParams::default();
        let state = BallState::launch(Vec2::ZERO, &p, 0.0);
        let copy = state;
        assert_eq!(
            advance(&state, &p, 0.0, 0.0),
            Err(StepError::NonPositiveStep(0.0))
        );
        assert!(matches!(
            advance(&state, &p, 0.0, f64::NAN),
            Err(StepError::NonPositiveStep(_))
        ));
        assert_eq!(state, copy);
    }

    #[test]
    fn state_below_ground_rejected() {
        let p = BallParams::default();
        let mut state = BallState::launch(Vec2::ZERO, &p, 0.0);
        state.x.z = -0.1;
        assert!(matches!(
            advance(&state, &p, 0.0, 0.1),
            Err(StepError::InvalidState(_))
        ));
    }

    #[test]
    fn invalid_params_rejected() {
        let p = params(Vec2::ZERO, 1.5, 0.0);
        let state = BallState::launch(Vec2::ZERO, &p, 0.0);
        assert!(matches!(
            advance(&state, &p, 0.0, 0.1),
            Err(StepError::InvalidParams(_))
        ));
    }

    #[test]
    fn converging_bounces_leave_ball_rolling() {
        let p = params(Vec2::new(2.0, 0.0), 0.5, 0.0);
        let (states, bounces) = simulate(&p, Vec2::new(0.0, 0.5), 0.05, 200);
        assert_eq!(bounces.iter().filter(|b| b.settled).count(), 1);
        let last = states.last().unwrap();
        assert_eq!(last.phase(&p), BallPhase::Rolling);
        assert_eq!(last.x.z, 0.0);
        assert_relative_eq!(last.v.x, 2.0);
        assert_relative_eq!(last.energy, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn drag_brings_rolling_ball_to_rest() {
        let p = BallParams {
            v0: Vec2::new(3.0, 0.0),
            drag: 0.5,
            v_min: 1e-2,
            ..Default::default()
        };
        let mut state = BallState::launch(Vec2::ZERO, &p, 0.0);
        let mut rested = false;
        for k in 0..200_000 {
            let out = advance(&state, &p, k as f64 * 0.01, 0.01).unwrap();
            state = out.state;
            if out.came_to_rest {
                rested = true;
                break;
            }
        }
        assert!(rested, "v = {:?}", state.v);
        assert_eq!(state.v, Vec2::ZERO);
        assert_eq!(state.energy, 0.0);
    }

    #[test]
    fn rolling_with_drag_matches_closed_form() {
        let p = BallParams {
            v0: Vec2::new(-4.0, 0.0),
            drag: 0.5,
            ..Default::default()
        };
        let (states, _) = simulate(&p, Vec2::ZERO, 0.5, 4);
        let last = states.last().unwrap();
        // vx(t) = v0 / (1 + drag·|v0|·t), x(t) = -ln(1 + drag·|v0|·t) / drag
        assert_relative_eq!(last.v.x, -4.0 / 5.0, epsilon = 1e-12);
        assert_relative_eq!(last.x.x, -(5.0_f64).ln() / 0.5, epsilon = 1e-12);
        assert_eq!(last.x.z, 0.0);
    }

    #[test]
    fn strong_drag_stays_stable_at_coarse_steps() {
        // drag·|v|·step = 5 on the first step.
        let p = params(Vec2::new(50.0, 5.0), 0.95, 1.0);
        let mut state = BallState::launch(Vec2::ZERO, &p, 0.0);
        let e0 = state.energy;
        for k in 0..100 {
            let out = advance(&state, &p, k as f64 * 0.1, 0.1).unwrap();
            assert!(
                out.state.energy <= state.energy + 1e-9 * state.energy.max(1.0),
                "step {k}: energy rose from {} to {}",
                state.energy,
                out.state.energy
            );
            assert!(out.state.x.x >= state.x.x, "step {k}: drag reversed the ball");
            assert!(out.state.v.x >= 0.0 && out.state.v.x <= state.v.x);
            state = out.state;
        }
        assert!(state.energy < 0.1 * e0, "energy {e0} -> {}", state.energy);
    }

    #[test]
    fn drag_removes_energy() {
        let p = params(Vec2::new(4.0, 6.0), 1.0, 0.1);
        let (states, _) = simulate(&p, Vec2::ZERO, 0.01, 300);
        let e0 = states[0].energy;
        let e_end = states.last().unwrap().energy;
        assert!(e_end < 0.9 * e0, "energy {e0} -> {e_end}");
    }

    #[test]
    fn zero_velocity_drag_is_finite() {
        let p = params(Vec2::ZERO, 0.9, 1.0);
        let state = BallState::launch(Vec2::new(0.0, 3.0), &p, 0.0);
        let out = advance(&state, &p, 0.0, 0.01).unwrap();
        assert!(out.state.v.is_finite());
        assert!(out.state.v.z < 0.0);
    }

    #[test]
    fn downward_ball_on_ground_bounces_immediately() {
        let p = params(Vec2::new(0.0, -2.0), 0.5, 0.0);
        let state = BallState::launch(Vec2::ZERO, &p, 3.0);
        let out = advance(&state, &p, 3.0, 0.01).unwrap();
        assert_eq!(out.bounces.len(), 1);
        assert_relative_eq!(out.bounces[0].time, 3.0);
        assert_relative_eq!(out.bounces[0].rebound_velocity, 1.0);
    }

    #[test]
    fn crossing_root_ignores_departure_contact() {
        // Just left the ground at 2 m/s: the next contact is 2·vz/g later.
        let t = ground_crossing(0.0, 2.0, -GRAVITY, 1.0, -1.0);
        assert_relative_eq!(t, 4.0 / GRAVITY, epsilon = 1e-12);
    }

    // ================================================================
    // Property-based tests (proptest)
    // ================================================================

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_below_ground(
                vx in -50.0f64..50.0,
                vz in -50.0f64..50.0,
                z0 in 0.0f64..5.0,
                bounce_factor in 0.05f64..1.0,
                drag in 0.0f64..=5.0,
                step_size in 0.001f64..=1.0,
            ) {
                let p = params(Vec2::new(vx, vz), bounce_factor, drag);
                let mut state = BallState::launch(Vec2::new(0.0, z0), &p, 0.0);
                for k in 0..100 {
                    let out = advance(&state, &p, k as f64 * step_size, step_size);
                    prop_assert!(out.is_ok(), "step {} failed: {:?}", k, out);
                    state = out.unwrap().state;
                    prop_assert!(state.x.z >= 0.0, "z = {}", state.x.z);
                    prop_assert!(state.energy >= 0.0 && state.energy.is_finite());
                }
            }

            #[test]
            fn energy_never_increases_without_drag(
                vx in -3.0f64..3.0,
                vz in -3.0f64..8.0,
                z0 in 0.0f64..3.0,
                bounce_factor in 0.1f64..1.0,
                step_size in 0.001f64..0.1,
            ) {
                let p = params(Vec2::new(vx, vz), bounce_factor, 0.0);
                let mut state = BallState::launch(Vec2::new(0.0, z0), &p, 0.0);
                for k in 0..300 {
                    let out = advance(&state, &p, k as f64 * step_size, step_size).unwrap();
                    let before = state.energy;
                    state = out.state;
                    prop_assert!(
                        state.energy <= before + 1e-9 * before.max(1.0),
                        "energy rose from {} to {}", before, state.energy
                    );
                    if out.bounces.is_empty() && before > 0.0 {
                        prop_assert!((state.energy - before).abs() <= 1e-9 * before.max(1.0));
                    }
                }
            }

            #[test]
            fn energy_never_increases_with_drag(
                vx in -50.0f64..50.0,
                vz in -50.0f64..50.0,
                z0 in 0.0f64..5.0,
                bounce_factor in 0.05f64..1.0,
                drag in 0.01f64..=5.0,
                step_size in 0.001f64..=1.0,
            ) {
                let p = params(Vec2::new(vx, vz), bounce_factor, drag);
                let mut state = BallState::launch(Vec2::new(0.0, z0), &p, 0.0);
                for k in 0..100 {
                    let out = advance(&state, &p, k as f64 * step_size, step_size);
                    prop_assert!(out.is_ok(), "step {} failed: {:?}", k, out);
                    let before = state.energy;
                    state = out.unwrap().state;
                    prop_assert!(
                        state.energy <= before + 1e-9 * before.max(1.0),
                        "energy rose from {} to {}", before, state.energy
                    );
                }
            }
        }
    }
}
