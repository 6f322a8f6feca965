// End-to-end runs of the control loop against the simulated oven

use krusty_reflow::config::{Config, SimulationConfig};
use krusty_reflow::hardware::{OvenHandle, SimulatedClock, Simulation};
use krusty_reflow::orchestrator::{ControlOrchestrator, Mode, OvenStatus};
use krusty_reflow::reflow::{Phase, ReflowProfile};
use krusty_reflow::temperature::ControllerConstants;
use std::io::Write;
use std::sync::{Arc, Mutex};

type Oven = ControlOrchestrator<OvenHandle, SimulatedClock, OvenHandle>;

fn quiet_config() -> Config {
    Config {
        simulation: SimulationConfig {
            noise_c: 0.0,
            seed: Some(42),
            ..SimulationConfig::default()
        },
        ..Config::default()
    }
}

fn build(config: &Config) -> (Simulation, Oven) {
    let sim = Simulation::new(&config.simulation);
    let oven = ControlOrchestrator::new(
        sim.oven.clone(),
        sim.clock.clone(),
        sim.oven.clone(),
        ControllerConstants::default(),
        config,
    );
    (sim, oven)
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_default_profile_runs_to_completion() {
    let config = quiet_config();
    let (sim, mut oven) = build(&config);
    let trace = SharedBuffer::default();
    oven.enable_trace(Box::new(trace.clone()));
    oven.start_profile(ReflowProfile::default()).unwrap();

    let mut phases = vec![];
    let mut peak: f64 = 0.0;
    let mut fan_seen = false;
    loop {
        sim.advance(0.1);
        let report = oven.tick();
        peak = peak.max(sim.temperature());
        fan_seen |= report.fan_on;
        match report.status {
            OvenStatus::Reflow(phase) => {
                if phases.last() != Some(&phase) {
                    phases.push(phase);
                }
            }
            OvenStatus::Complete => break,
            other => panic!("unexpected status {:?} at t={}", other, report.now),
        }
        assert!(report.now < 2000.0, "run did not finish");
    }

    assert_eq!(phases, vec![Phase::Preheat, Phase::Soak, Phase::Reflow]);
    assert!(peak >= 225.0);
    assert!(fan_seen);
    assert_eq!(oven.mode(), Mode::Standby);
    assert!(!sim.oven.with(|o| o.heater_on));
    assert!(!sim.oven.with(|o| o.fan_on));

    let csv = String::from_utf8(trace.0.lock().unwrap().clone()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("time,dt,input,target,error,p,i,d,output,threshold")
    );
    assert!(lines.count() > 100);
}

#[test]
fn test_unplugged_thermocouple_switches_heater_off() {
    let config = quiet_config();
    let (sim, mut oven) = build(&config);
    oven.start_profile(ReflowProfile::default()).unwrap();
    for _ in 0..50 {
        sim.advance(0.1);
        oven.tick();
    }
    assert!(sim.oven.with(|o| o.heater_on));

    sim.oven.with(|o| o.sensor_connected = false);
    for _ in 0..10 {
        sim.advance(0.1);
        let report = oven.tick();
        if report.status == OvenStatus::SensorFault {
            assert!(!report.heater_on);
        }
    }
    assert!(!sim.oven.with(|o| o.heater_on));
    assert_eq!(oven.sequencer().phase(), Phase::SensorFault);

    sim.oven.with(|o| o.sensor_connected = true);
    let mut resumed = false;
    for _ in 0..20 {
        sim.advance(0.1);
        if oven.tick().status == OvenStatus::Reflow(Phase::Preheat) {
            resumed = true;
        }
    }
    assert!(resumed);
}

#[test]
fn test_heat_to_target_holds_near_setpoint() {
    let config = quiet_config();
    let (sim, mut oven) = build(&config);
    oven.start_heat_to_target(150.0).unwrap();
    for _ in 0..6000 {
        sim.advance(0.1);
        oven.tick();
    }
    let temp = sim.temperature();
    assert!(temp > 100.0 && temp < 250.0, "temperature {}", temp);
    oven.stop();
    assert!(!sim.oven.with(|o| o.heater_on));
    assert_eq!(oven.mode(), Mode::Standby);
}
