// src/temperature/controller.rs
use super::constants::ControllerConstants;

/// Number of samples in the derivative window.
pub const HISTORY_LEN: usize = 5;
/// Errors inside this band reset the integral instead of accumulating it.
pub const DEAD_ZONE_C: f64 = 0.5;
/// Bound on the accumulated integral term.
pub const INTEGRAL_LIMIT: f64 = 1000.0;

/// Working state of the heater PID filter.
///
/// Only [`TemperatureController`] mutates this; everyone else gets a shared
/// reference through [`TemperatureController::state`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub error: f64,
    pub prev_error: f64,
    pub input: f64,
    pub target: f64,
    pub integral: f64,
    pub derivative: f64,
    pub output: f64,
    /// Interval used by the most recent evaluation, in seconds.
    pub dt: f64,
    history: [f64; HISTORY_LEN],
    cursor: usize,
}

impl ControllerState {
    /// Fresh state with the whole history primed with `initial_reading`.
    pub fn new(initial_reading: f64) -> Self {
        Self {
            error: 0.0,
            prev_error: 0.0,
            input: initial_reading,
            target: 0.0,
            integral: 0.0,
            derivative: 0.0,
            output: 0.0,
            dt: 0.0,
            history: [initial_reading; HISTORY_LEN],
            cursor: 0,
        }
    }

    /// Samples ordered oldest to newest.
    pub fn history(&self) -> [f64; HISTORY_LEN] {
        let mut ordered = [0.0; HISTORY_LEN];
        for (i, slot) in ordered.iter_mut().enumerate() {
            *slot = self.history[(self.cursor + i) % HISTORY_LEN];
        }
        ordered
    }

    /// Store `sample` and return the one it displaces, which was taken
    /// `HISTORY_LEN` evaluations ago.
    fn push_sample(&mut self, sample: f64) -> f64 {
        let oldest = self.history[self.cursor];
        self.history[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % HISTORY_LEN;
        oldest
    }
}

/// Thresholded PID controller driving a binary heater.
#[derive(Debug, Clone)]
pub struct TemperatureController {
    constants: ControllerConstants,
    state: ControllerState,
}

impl TemperatureController {
    pub fn new(constants: ControllerConstants, initial_reading: f64) -> Self {
        Self {
            constants,
            state: ControllerState::new(initial_reading),
        }
    }

    pub fn constants(&self) -> &ControllerConstants {
        &self.constants
    }

    pub fn set_constants(&mut self, constants: ControllerConstants) {
        tracing::info!(
            "Controller constants: Kp={:.3}, Ki={:.3}, Kd={:.3}, threshold={:.3}",
            constants.kp,
            constants.ki,
            constants.kd,
            constants.threshold
        );
        self.constants = constants;
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Set target temperature
    pub fn set_target(&mut self, target: f64) {
        if target != self.state.target {
            tracing::debug!("Setting target temperature: {:.1}°C", target);
        }
        self.state.target = target;
    }

    /// Update temperature reading
    pub fn update_temperature(&mut self, temperature: f64) {
        self.state.input = temperature;
    }

    /// Discard accumulated state and prime the history with `reading`.
    pub fn reset(&mut self, reading: f64) {
        let target = self.state.target;
        self.state = ControllerState::new(reading);
        self.state.target = target;
    }

    /// Run one PID step over the current input and target and return
    /// whether the heater should be on.
    ///
    /// `dt` is the time since the previous evaluation in seconds. A
    /// non-positive or non-finite `dt` leaves the state untouched and keeps
    /// the heater off.
    pub fn evaluate(&mut self, dt: f64) -> bool {
        if !(dt > 0.0) || !dt.is_finite() {
            tracing::warn!("Skipping PID evaluation with invalid dt={}", dt);
            return false;
        }
        let state = &mut self.state;
        let c = &self.constants;

        let window_start = state.push_sample(state.input);
        state.dt = dt;
        state.error = state.target - state.input;

        if state.error.abs() <= DEAD_ZONE_C {
            state.integral = 0.0;
        } else {
            state.integral += state.error * dt;
        }
        state.integral = state.integral.clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);

        state.derivative = (state.input - window_start) / (dt * HISTORY_LEN as f64);

        state.output = c.kp * state.error + c.ki * state.integral + c.kd * state.derivative;
        state.prev_error = state.error;

        let heater_on = state.output > c.threshold;
        tracing::debug!(
            input = state.input,
            target = state.target,
            error = state.error,
            integral = state.integral,
            derivative = state.derivative,
            output = state.output,
            heater_on,
            "PID evaluation"
        );
        heater_on
    }

    /// Individual P, I and D contributions of the last evaluation.
    pub fn terms(&self) -> (f64, f64, f64) {
        (
            self.constants.kp * self.state.error,
            self.constants.ki * self.state.integral,
            self.constants.kd * self.state.derivative,
        )
    }

    /// Get current status
    pub fn status(&self) -> TemperatureStatus {
        TemperatureStatus {
            current: self.state.input,
            target: self.state.target,
            error: self.state.target - self.state.input,
            output: self.state.output,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureStatus {
    pub current: f64,
    pub target: f64,
    pub error: f64,
    pub output: f64,
}
