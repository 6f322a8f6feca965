//! # Control Orchestrator
//!
//! One polling loop for the whole oven. Each [`ControlOrchestrator::tick`]
//! reads the clock and the thermocouple, lets the active mode pick a
//! setpoint, runs the PID filter when enough time has passed since its last
//! evaluation, and drives the heater and fan relays.
//!
//! Modes:
//! - `Standby`: setpoint 0, everything off.
//! - `Profile`: the [`ReflowSequencer`] supplies setpoint and fan.
//! - `HeatToTarget`: a manual setpoint in 10°C steps and a manual fan.
//!
//! The heater decision is held between evaluations and forced off whenever
//! the mode is not running or the reading is implausible.

use std::io::Write;

use crate::config::Config;
use crate::hardware::{FilteredSensor, OvenOutputs, TemperatureSensor, TimeInterface};
use crate::reflow::profile::{MAX_TEMP_C, MIN_TEMP_C, ReflowProfile};
use crate::reflow::sequencer::{Phase, ReflowSequencer, SequencerError};
use crate::temperature::constants::ControllerConstants;
use crate::temperature::controller::TemperatureController;
use crate::temperature::trace::TraceWriter;

/// Step applied to the manual setpoint per adjustment.
pub const MANUAL_TARGET_STEP_C: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Standby,
    Profile,
    HeatToTarget { target: f64, fan_on: bool },
}

/// Condition shown to the operator after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvenStatus {
    Standby,
    Reflow(Phase),
    HeatToTarget,
    SensorFault,
    /// A profile just finished; the oven is back in standby.
    Complete,
    /// A profile was aborted; the oven is back in standby.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub now: f64,
    pub temperature: Option<f64>,
    pub status: OvenStatus,
    pub setpoint: f64,
    pub heater_on: bool,
    pub fan_on: bool,
    /// Whether the PID filter ran this tick.
    pub evaluated: bool,
}

pub struct ControlOrchestrator<S, C, O> {
    sensor: FilteredSensor<S>,
    clock: C,
    outputs: O,
    controller: TemperatureController,
    sequencer: ReflowSequencer,
    mode: Mode,
    heater_on: bool,
    last_evaluation: Option<f64>,
    primed: bool,
    min_interval: f64,
    sensor_floor_c: f64,
    fault_timeout: Option<f64>,
    trace: Option<TraceWriter<Box<dyn Write>>>,
}

impl<S, C, O> ControlOrchestrator<S, C, O>
where
    S: TemperatureSensor,
    C: TimeInterface,
    O: OvenOutputs,
{
    /// Build the orchestrator and prime the controller history with the
    /// first available reading.
    pub fn new(sensor: S, clock: C, outputs: O, constants: ControllerConstants, config: &Config) -> Self {
        let mut sensor = FilteredSensor::new(sensor, &config.sensor);
        let floor = config.control.sensor_floor_c;
        let initial = sensor
            .read(clock.now_seconds())
            .ok()
            .filter(|t| *t >= floor);
        if initial.is_none() {
            tracing::warn!("No temperature reading at startup; controller history primed on first reading");
        }
        Self {
            sensor,
            clock,
            outputs,
            controller: TemperatureController::new(constants, initial.unwrap_or(0.0)),
            sequencer: ReflowSequencer::new(floor),
            mode: Mode::Standby,
            heater_on: false,
            last_evaluation: None,
            primed: initial.is_some(),
            min_interval: config.control.min_interval().as_secs_f64(),
            sensor_floor_c: floor,
            fault_timeout: config.control.sensor_fault_timeout_s,
            trace: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.mode, Mode::Standby)
    }

    pub fn controller(&self) -> &TemperatureController {
        &self.controller
    }

    pub fn sequencer(&self) -> &ReflowSequencer {
        &self.sequencer
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn set_constants(&mut self, constants: ControllerConstants) {
        self.controller.set_constants(constants);
    }

    /// Record every PID evaluation as CSV into `writer`.
    pub fn enable_trace(&mut self, writer: Box<dyn Write>) {
        self.trace = Some(TraceWriter::new(writer));
    }

    pub fn start_profile(&mut self, profile: ReflowProfile) -> Result<(), SequencerError> {
        if let Mode::HeatToTarget { .. } = self.mode {
            self.stop();
        }
        self.sequencer.acknowledge();
        let now = self.clock.now_seconds();
        self.sequencer.start(profile, now)?;
        self.mode = Mode::Profile;
        self.last_evaluation = Some(now);
        Ok(())
    }

    /// Hold the oven at `target` (clamped to the profile temperature range).
    pub fn start_heat_to_target(&mut self, target: f64) -> Result<(), SequencerError> {
        if self.sequencer.is_running() {
            return Err(SequencerError::AlreadyRunning(self.sequencer.phase()));
        }
        let target = clamp_manual_target(target);
        tracing::info!("Heating to {:.0}°C", target);
        self.mode = Mode::HeatToTarget { target, fan_on: false };
        self.last_evaluation = Some(self.clock.now_seconds());
        Ok(())
    }

    /// Move the manual setpoint by `steps` increments of
    /// [`MANUAL_TARGET_STEP_C`].
    pub fn adjust_manual_target(&mut self, steps: i32) {
        if let Mode::HeatToTarget { target, .. } = &mut self.mode {
            *target = clamp_manual_target(*target + steps as f64 * MANUAL_TARGET_STEP_C);
        }
    }

    pub fn set_manual_fan(&mut self, on: bool) {
        if let Mode::HeatToTarget { fan_on, .. } = &mut self.mode {
            *fan_on = on;
        }
    }

    /// Cancel whatever is running and switch everything off right away.
    pub fn stop(&mut self) {
        if self.sequencer.is_running() {
            self.sequencer.cancel();
        }
        self.enter_standby();
        self.drive(false, false);
    }

    fn enter_standby(&mut self) {
        self.mode = Mode::Standby;
        self.last_evaluation = None;
        self.controller.set_target(0.0);
    }

    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now_seconds();
        let reading = self.sensor.read(now).ok();
        let floor = self.sensor_floor_c;
        let plausible = reading.filter(|t| t.is_finite() && *t >= floor);

        if let Some(t) = plausible {
            if !self.primed {
                self.controller.reset(t);
                self.primed = true;
            }
            self.controller.update_temperature(t);
        }

        let (status, setpoint, run, fan) = match self.mode {
            Mode::Standby => (OvenStatus::Standby, 0.0, false, false),
            Mode::Profile => self.profile_step(now, reading),
            Mode::HeatToTarget { target, fan_on } => match plausible {
                Some(_) => (OvenStatus::HeatToTarget, target, true, fan_on),
                None => (OvenStatus::SensorFault, 0.0, false, false),
            },
        };
        self.controller.set_target(setpoint);

        let mut evaluated = false;
        match (run, plausible) {
            (true, Some(_)) => match self.last_evaluation {
                Some(last) if now < last => {
                    tracing::warn!("Clock went backwards ({:.3} -> {:.3}); restarting evaluation timebase", last, now);
                    self.last_evaluation = Some(now);
                }
                Some(last) if now - last >= self.min_interval => {
                    self.heater_on = self.controller.evaluate(now - last);
                    self.last_evaluation = Some(now);
                    evaluated = true;
                    self.record_trace(now);
                }
                Some(_) => {}
                None => self.last_evaluation = Some(now),
            },
            _ => {
                // The next evaluation anchors afresh instead of spanning the outage.
                self.heater_on = false;
                self.last_evaluation = None;
            }
        }

        let heater = self.heater_on;
        self.drive(heater, fan);
        TickReport {
            now,
            temperature: plausible,
            status,
            setpoint,
            heater_on: heater,
            fan_on: fan,
            evaluated,
        }
    }

    fn profile_step(&mut self, now: f64, reading: Option<f64>) -> (OvenStatus, f64, bool, bool) {
        let mut out = self.sequencer.advance(now, reading);
        if out.phase == Phase::SensorFault {
            if let (Some(timeout), Some(lasted)) = (self.fault_timeout, self.sequencer.fault_duration(now)) {
                if lasted >= timeout {
                    out = self.sequencer.abort("sensor fault timeout");
                }
            }
        }
        let status = match out.phase {
            Phase::HoldComplete => {
                self.sequencer.acknowledge();
                self.enter_standby();
                OvenStatus::Complete
            }
            Phase::Aborted => {
                self.sequencer.acknowledge();
                self.enter_standby();
                OvenStatus::Aborted
            }
            Phase::Idle => {
                self.enter_standby();
                OvenStatus::Standby
            }
            Phase::SensorFault => OvenStatus::SensorFault,
            phase => OvenStatus::Reflow(phase),
        };
        (
            status,
            out.setpoint,
            out.heater_enabled,
            out.fan_enabled && out.heater_enabled,
        )
    }

    fn drive(&mut self, heater: bool, fan: bool) {
        self.heater_on = heater;
        if let Err(e) = self.outputs.set_heater(heater) {
            tracing::error!("Failed to switch heater: {}", e);
        }
        if let Err(e) = self.outputs.set_fan(fan) {
            tracing::error!("Failed to switch fan: {}", e);
        }
    }

    fn record_trace(&mut self, now: f64) {
        if let Some(trace) = &mut self.trace {
            if let Err(e) = trace.record(now, &self.controller) {
                tracing::error!("Disabling controller trace: {}", e);
                self.trace = None;
            }
        }
    }
}

fn clamp_manual_target(target: f64) -> f64 {
    target.clamp(MIN_TEMP_C as f64, MAX_TEMP_C as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{OutputError, SensorError, SimulatedClock};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Probe {
        temperature: Rc<RefCell<Option<f64>>>,
        heater: Rc<RefCell<bool>>,
        fan: Rc<RefCell<bool>>,
    }

    impl TemperatureSensor for Probe {
        fn read_temperature(&mut self) -> Result<f64, SensorError> {
            self.temperature
                .borrow()
                .ok_or_else(|| SensorError::ReadFailure("unplugged".to_string()))
        }
    }

    impl OvenOutputs for Probe {
        fn set_heater(&mut self, on: bool) -> Result<(), OutputError> {
            *self.heater.borrow_mut() = on;
            Ok(())
        }

        fn set_fan(&mut self, on: bool) -> Result<(), OutputError> {
            *self.fan.borrow_mut() = on;
            Ok(())
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.sensor.min_read_interval_ms = 0;
        config
    }

    fn setup(initial: Option<f64>) -> (ControlOrchestrator<Probe, SimulatedClock, Probe>, Probe, SimulatedClock) {
        let probe = Probe::default();
        *probe.temperature.borrow_mut() = initial;
        let clock = SimulatedClock::new(0.0);
        let oven = ControlOrchestrator::new(
            probe.clone(),
            clock.clone(),
            probe.clone(),
            ControllerConstants::default(),
            &config(),
        );
        (oven, probe, clock)
    }

    #[test]
    fn test_standby_keeps_everything_off() {
        let (mut oven, probe, clock) = setup(Some(25.0));
        for _ in 0..4 {
            clock.advance(1.0);
            let report = oven.tick();
            assert_eq!(report.status, OvenStatus::Standby);
            assert_eq!(report.setpoint, 0.0);
            assert!(!report.heater_on);
        }
        assert!(!*probe.heater.borrow());
        assert!(!oven.is_running());
    }

    #[test]
    fn test_evaluation_respects_min_interval() {
        let (mut oven, probe, clock) = setup(Some(25.0));
        oven.start_profile(ReflowProfile::default()).unwrap();
        clock.advance(0.2);
        let report = oven.tick();
        assert!(!report.evaluated);
        assert!(!report.heater_on);
        clock.advance(0.3);
        let report = oven.tick();
        assert!(report.evaluated);
        assert!(report.heater_on);
        assert!(*probe.heater.borrow());
        assert!(*probe.fan.borrow());
        assert_eq!(oven.controller().state().dt, 0.5);
        clock.advance(0.1);
        let report = oven.tick();
        assert!(!report.evaluated);
        assert!(report.heater_on, "decision is held between evaluations");
    }

    #[test]
    fn test_sensor_fault_forces_safe_output() {
        let (mut oven, probe, clock) = setup(Some(25.0));
        oven.start_profile(ReflowProfile::default()).unwrap();
        clock.advance(1.0);
        assert!(oven.tick().heater_on);
        *probe.temperature.borrow_mut() = Some(3.0);
        clock.advance(1.0);
        let report = oven.tick();
        assert_eq!(report.status, OvenStatus::SensorFault);
        assert_eq!(report.setpoint, 0.0);
        assert!(!report.heater_on);
        assert!(!report.fan_on);
        assert!(!*probe.heater.borrow());
        *probe.temperature.borrow_mut() = Some(40.0);
        clock.advance(1.0);
        let report = oven.tick();
        assert_eq!(report.status, OvenStatus::Reflow(Phase::Preheat));
        assert!(!report.evaluated);
        clock.advance(0.5);
        let report = oven.tick();
        assert!(report.evaluated);
        assert!(report.heater_on);
    }

    #[test]
    fn test_evaluation_after_outage_uses_normal_interval() {
        let probe = Probe::default();
        *probe.temperature.borrow_mut() = Some(100.0);
        let clock = SimulatedClock::new(0.0);
        let mut oven = ControlOrchestrator::new(
            probe.clone(),
            clock.clone(),
            probe.clone(),
            ControllerConstants::new(1.0, 1.0, 0.0, 0.1),
            &config(),
        );
        oven.start_heat_to_target(150.0).unwrap();
        clock.advance(0.5);
        assert!(oven.tick().evaluated);
        let integral = oven.controller().state().integral;
        assert_eq!(integral, 25.0);

        *probe.temperature.borrow_mut() = None;
        for _ in 0..60 {
            clock.advance(0.5);
            assert_eq!(oven.tick().status, OvenStatus::SensorFault);
        }

        *probe.temperature.borrow_mut() = Some(100.0);
        clock.advance(0.5);
        assert!(!oven.tick().evaluated);
        clock.advance(0.5);
        assert!(oven.tick().evaluated);
        assert_eq!(oven.controller().state().dt, 0.5);
        assert_eq!(oven.controller().state().integral, 50.0);
    }

    #[test]
    fn test_sensor_fault_timeout_aborts_run() {
        let probe = Probe::default();
        *probe.temperature.borrow_mut() = Some(25.0);
        let clock = SimulatedClock::new(0.0);
        let mut config = config();
        config.control.sensor_fault_timeout_s = Some(5.0);
        let mut oven = ControlOrchestrator::new(
            probe.clone(),
            clock.clone(),
            probe.clone(),
            ControllerConstants::default(),
            &config,
        );
        oven.start_profile(ReflowProfile::default()).unwrap();
        *probe.temperature.borrow_mut() = None;
        clock.advance(1.0);
        assert_eq!(oven.tick().status, OvenStatus::SensorFault);
        clock.advance(5.0);
        assert_eq!(oven.tick().status, OvenStatus::Aborted);
        assert_eq!(oven.mode(), Mode::Standby);
        assert_eq!(oven.sequencer().phase(), Phase::Idle);
    }

    #[test]
    fn test_stop_switches_off_immediately() {
        let (mut oven, probe, clock) = setup(Some(25.0));
        oven.start_profile(ReflowProfile::default()).unwrap();
        clock.advance(1.0);
        oven.tick();
        assert!(*probe.heater.borrow());
        oven.stop();
        assert!(!*probe.heater.borrow());
        assert!(!*probe.fan.borrow());
        assert_eq!(oven.sequencer().phase(), Phase::Idle);
        assert_eq!(oven.controller().state().target, 0.0);
    }

    #[test]
    fn test_clock_reset_never_yields_negative_dt() {
        let (mut oven, _probe, clock) = setup(Some(25.0));
        oven.start_heat_to_target(150.0).unwrap();
        clock.set(10.0);
        assert!(oven.tick().evaluated);
        clock.set(2.0);
        let report = oven.tick();
        assert!(!report.evaluated);
        clock.set(2.5);
        assert!(oven.tick().evaluated);
        assert_eq!(oven.controller().state().dt, 0.5);
    }

    #[test]
    fn test_manual_target_is_clamped() {
        let (mut oven, probe, clock) = setup(Some(25.0));
        oven.start_heat_to_target(10.0).unwrap();
        assert_eq!(oven.mode(), Mode::HeatToTarget { target: 80.0, fan_on: false });
        oven.adjust_manual_target(30);
        assert_eq!(oven.mode(), Mode::HeatToTarget { target: 300.0, fan_on: false });
        oven.adjust_manual_target(-1);
        oven.set_manual_fan(true);
        clock.advance(1.0);
        let report = oven.tick();
        assert_eq!(report.setpoint, 290.0);
        assert!(report.fan_on);
        assert!(*probe.fan.borrow());
    }

    #[test]
    fn test_heat_rejected_during_profile() {
        let (mut oven, _probe, _clock) = setup(Some(25.0));
        oven.start_profile(ReflowProfile::default()).unwrap();
        assert!(oven.start_heat_to_target(150.0).is_err());
    }

    #[test]
    fn test_history_primed_on_first_reading() {
        let (mut oven, probe, clock) = setup(None);
        assert_eq!(oven.controller().state().history(), [0.0; 5]);
        *probe.temperature.borrow_mut() = Some(30.0);
        clock.advance(1.0);
        oven.tick();
        assert_eq!(oven.controller().state().history(), [30.0; 5]);
    }
}
