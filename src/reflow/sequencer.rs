//! # Reflow Sequencer
//!
//! Tracks which phase of a [`ReflowProfile`] the oven is in and derives the
//! controller setpoint from it.
//!
//! A run moves through `Preheat → Soak → Reflow → HoldComplete`. Preheat and
//! soak end on elapsed time alone. Reflow additionally waits for the oven to
//! actually reach the reflow temperature: the first tick at or above it
//! latches a hold deadline, and the run completes once the clock passes that
//! deadline.
//!
//! A reading below the sensor floor (or no reading at all) reports
//! [`Phase::SensorFault`] with the heater disabled. The run itself is kept,
//! so the phase logic resumes on the first good reading.

use thiserror::Error;

use super::profile::ReflowProfile;

/// Readings below this are treated as a missing sensor.
pub const DEFAULT_SENSOR_FLOOR_C: f64 = 5.0;

#[derive(Debug, Error, PartialEq)]
pub enum SequencerError {
    #[error("A reflow run is already in progress ({0:?})")]
    AlreadyRunning(Phase),
    #[error("Profile rejected: {0}")]
    InvalidProfile(String),
}

/// Externally visible phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Preheat,
    Soak,
    Reflow,
    HoldComplete,
    Aborted,
    SensorFault,
}

impl Phase {
    /// Whether a new run may be started from this phase.
    pub fn accepts_start(self) -> bool {
        matches!(self, Phase::Idle | Phase::Aborted | Phase::HoldComplete)
    }
}

/// Active part of a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    Preheat,
    Soak,
    /// `hold_deadline` is latched the first time the reflow temperature is reached.
    Reflow { hold_deadline: Option<f64> },
}

/// Inputs to one stage transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageInput {
    pub now: f64,
    pub elapsed: f64,
    pub temperature: f64,
}

/// Result of one stage transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Stay(Stage),
    Next(Stage),
    Complete,
}

impl Stage {
    pub fn phase(self) -> Phase {
        match self {
            Stage::Preheat => Phase::Preheat,
            Stage::Soak => Phase::Soak,
            Stage::Reflow { .. } => Phase::Reflow,
        }
    }

    pub fn setpoint(self, profile: &ReflowProfile) -> f64 {
        match self {
            Stage::Preheat => profile.preheat_temp_c as f64,
            Stage::Soak => profile.soak_temp_c as f64,
            Stage::Reflow { .. } => profile.reflow_temp_c as f64,
        }
    }

    /// Single transition step from this stage.
    pub fn next(self, profile: &ReflowProfile, input: StageInput) -> Transition {
        match self {
            Stage::Preheat => {
                if input.elapsed > profile.preheat_time_s as f64 {
                    Transition::Next(Stage::Soak)
                } else {
                    Transition::Stay(self)
                }
            }
            Stage::Soak => {
                if input.elapsed > profile.ramp_duration_s() as f64 {
                    Transition::Next(Stage::Reflow { hold_deadline: None })
                } else {
                    Transition::Stay(self)
                }
            }
            Stage::Reflow { hold_deadline: None } => {
                if input.temperature >= profile.reflow_temp_c as f64 {
                    Transition::Next(Stage::Reflow {
                        hold_deadline: Some(input.now + profile.reflow_hold_time_s as f64),
                    })
                } else {
                    Transition::Stay(self)
                }
            }
            Stage::Reflow { hold_deadline: Some(deadline) } => {
                if input.now > deadline {
                    Transition::Complete
                } else {
                    Transition::Stay(self)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Run {
    profile: ReflowProfile,
    started_at: f64,
    stage: Stage,
    fault_since: Option<f64>,
    /// Clock value seen by the latest `advance`.
    last_now: f64,
}

impl Run {
    /// Move every timestamp of the run back by `shift` seconds so elapsed
    /// time and any remaining hold survive a clock that jumped backwards.
    fn rebase(&mut self, shift: f64) {
        self.started_at -= shift;
        if let Stage::Reflow { hold_deadline: Some(deadline) } = &mut self.stage {
            *deadline -= shift;
        }
        if let Some(since) = &mut self.fault_since {
            *since -= shift;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SequencerState {
    Idle,
    Running(Run),
    HoldComplete,
    Aborted,
}

/// What the sequencer wants from the heater and fan for this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerOutput {
    pub phase: Phase,
    pub setpoint: f64,
    pub heater_enabled: bool,
    pub fan_enabled: bool,
}

impl SequencerOutput {
    fn safe(phase: Phase) -> Self {
        Self {
            phase,
            setpoint: 0.0,
            heater_enabled: false,
            fan_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReflowSequencer {
    state: SequencerState,
    sensor_floor_c: f64,
}

impl Default for ReflowSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR_FLOOR_C)
    }
}

impl ReflowSequencer {
    pub fn new(sensor_floor_c: f64) -> Self {
        Self {
            state: SequencerState::Idle,
            sensor_floor_c,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            SequencerState::Idle => Phase::Idle,
            SequencerState::Running(run) if run.fault_since.is_some() => Phase::SensorFault,
            SequencerState::Running(run) => run.stage.phase(),
            SequencerState::HoldComplete => Phase::HoldComplete,
            SequencerState::Aborted => Phase::Aborted,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SequencerState::Running(_))
    }

    /// Seconds since the run started, never negative.
    pub fn elapsed(&self, now: f64) -> Option<f64> {
        match &self.state {
            SequencerState::Running(run) => Some((now - run.started_at).max(0.0)),
            _ => None,
        }
    }

    pub fn hold_deadline(&self) -> Option<f64> {
        match &self.state {
            SequencerState::Running(Run {
                stage: Stage::Reflow { hold_deadline },
                ..
            }) => *hold_deadline,
            _ => None,
        }
    }

    /// How long the current sensor fault has lasted.
    pub fn fault_duration(&self, now: f64) -> Option<f64> {
        match &self.state {
            SequencerState::Running(Run {
                fault_since: Some(since),
                ..
            }) => Some((now - since).max(0.0)),
            _ => None,
        }
    }

    /// Begin a run of `profile` with `now` as the phase reference.
    pub fn start(&mut self, profile: ReflowProfile, now: f64) -> Result<(), SequencerError> {
        let phase = self.phase();
        if !phase.accepts_start() {
            return Err(SequencerError::AlreadyRunning(phase));
        }
        profile
            .validate()
            .map_err(|e| SequencerError::InvalidProfile(e.to_string()))?;
        tracing::info!(
            "Starting reflow: preheat {}°C/{}s, soak {}°C/{}s, reflow {}°C hold {}s",
            profile.preheat_temp_c,
            profile.preheat_time_s,
            profile.soak_temp_c,
            profile.soak_time_s,
            profile.reflow_temp_c,
            profile.reflow_hold_time_s
        );
        self.state = SequencerState::Running(Run {
            profile,
            started_at: now,
            stage: Stage::Preheat,
            fault_since: None,
            last_now: now,
        });
        Ok(())
    }

    /// Advance the run to `now` given the latest reading (`None` when the
    /// sensor could not be read).
    pub fn advance(&mut self, now: f64, reading: Option<f64>) -> SequencerOutput {
        let floor = self.sensor_floor_c;
        let run = match &mut self.state {
            SequencerState::Running(run) => run,
            SequencerState::Idle => return SequencerOutput::safe(Phase::Idle),
            SequencerState::HoldComplete => return SequencerOutput::safe(Phase::HoldComplete),
            SequencerState::Aborted => return SequencerOutput::safe(Phase::Aborted),
        };
        if now < run.last_now {
            let shift = run.last_now - now;
            tracing::warn!("Clock went backwards by {:.3}s; rebasing reflow run", shift);
            run.rebase(shift);
        }
        run.last_now = now;

        let temperature = match reading {
            Some(t) if t.is_finite() && t >= floor => t,
            _ => {
                if run.fault_since.is_none() {
                    tracing::warn!("No plausible temperature reading ({:?}); heater disabled", reading);
                    run.fault_since = Some(now);
                }
                return SequencerOutput::safe(Phase::SensorFault);
            }
        };
        if let Some(since) = run.fault_since.take() {
            tracing::info!("Temperature readings resumed after {:.1}s", (now - since).max(0.0));
        }

        let input = StageInput {
            now,
            elapsed: (now - run.started_at).max(0.0),
            temperature,
        };
        loop {
            match run.stage.next(&run.profile, input) {
                Transition::Stay(_) => break,
                Transition::Next(stage) => {
                    if let Stage::Reflow { hold_deadline: Some(deadline) } = stage {
                        tracing::info!(
                            "Reflow temperature reached at {:.1}°C; holding until t={:.1}",
                            temperature,
                            deadline
                        );
                    } else {
                        tracing::info!("Reflow phase {:?} -> {:?}", run.stage.phase(), stage.phase());
                    }
                    run.stage = stage;
                }
                Transition::Complete => {
                    tracing::info!("Reflow hold complete after {:.1}s", input.elapsed);
                    self.state = SequencerState::HoldComplete;
                    return SequencerOutput::safe(Phase::HoldComplete);
                }
            }
        }

        SequencerOutput {
            phase: run.stage.phase(),
            setpoint: run.stage.setpoint(&run.profile),
            heater_enabled: true,
            fan_enabled: run.profile.fan_on,
        }
    }

    /// Stop immediately and return to `Idle`, discarding any hold latch.
    pub fn cancel(&mut self) -> SequencerOutput {
        if self.is_running() {
            tracing::info!("Reflow cancelled during {:?}", self.phase());
        }
        self.state = SequencerState::Idle;
        SequencerOutput::safe(Phase::Idle)
    }

    /// Stop a run because it can no longer proceed safely.
    pub fn abort(&mut self, reason: &str) -> SequencerOutput {
        tracing::error!("Reflow aborted during {:?}: {}", self.phase(), reason);
        self.state = SequencerState::Aborted;
        SequencerOutput::safe(Phase::Aborted)
    }

    /// Leave a terminal phase for `Idle`. Does nothing while a run is active.
    pub fn acknowledge(&mut self) {
        if matches!(self.state, SequencerState::HoldComplete | SequencerState::Aborted) {
            self.state = SequencerState::Idle;
        }
    }
}
