// src/main.rs - reflow-host: drive the oven controller from the command line
use std::error::Error;
use std::fs::File;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Instrument;
use uuid::Uuid;

use krusty_reflow::config::{Config, load_config};
use krusty_reflow::hardware::{OvenHandle, SimulatedClock, Simulation};
use krusty_reflow::orchestrator::{ControlOrchestrator, OvenStatus, TickReport};
use krusty_reflow::reflow::{ProfileEditor, ProfileField, ProfileLibrary, ReflowProfile};
use krusty_reflow::storage::store::{load_constants_or_default, load_profiles_or_default};
use krusty_reflow::storage::{FileStorage, NonVolatileStore};
use krusty_reflow::temperature::{ConstantsTuner, ControllerConstants, TuningItem};

type BoxError = Box<dyn Error + Send + Sync + 'static>;
type Oven = ControlOrchestrator<OvenHandle, SimulatedClock, OvenHandle>;

#[derive(Parser, Debug)]
#[command(name = "reflow-host", about = "Reflow oven controller host")]
struct Cli {
    /// Configuration file; built-in defaults are used when it does not exist
    #[arg(short, long, default_value = "oven.toml")]
    config: String,
    /// Log every controller evaluation
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a stored profile to completion
    Run {
        /// Profile slot (0-9)
        #[arg(short, long, default_value_t = 0)]
        profile: usize,
        #[command(flatten)]
        pacing: Pacing,
    },
    /// Hold the oven at a fixed temperature
    Heat {
        #[arg(short, long)]
        target: f64,
        /// How long to hold, in seconds
        #[arg(short, long, default_value_t = 300.0)]
        duration: f64,
        #[arg(long)]
        fan: bool,
        #[command(flatten)]
        pacing: Pacing,
    },
    /// List stored profiles
    Profiles,
    /// Show or tune the controller constants
    Constants {
        #[command(subcommand)]
        action: Option<ConstantsAction>,
    },
    /// Adjust one field of a stored profile
    EditProfile {
        #[arg(short, long)]
        slot: usize,
        #[arg(short, long, value_enum)]
        field: Option<FieldArg>,
        /// Number of unit steps; negative values decrease the field
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        steps: i32,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConstantsAction {
    Show,
    /// Nudge one constant by a number of tuning steps
    Tune {
        #[arg(value_enum)]
        item: ItemArg,
        #[arg(allow_hyphen_values = true)]
        steps: i32,
        /// Grow (positive) or shrink (negative) the tuning step first
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        step_changes: i32,
    },
}

#[derive(clap::Args, Debug)]
struct Pacing {
    /// Simulated time per control tick, in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Simulated seconds per wall-clock second
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Write every controller evaluation to a CSV file
    #[arg(long)]
    trace: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ItemArg {
    Kp,
    Ki,
    Kd,
    Threshold,
}

impl From<ItemArg> for TuningItem {
    fn from(item: ItemArg) -> Self {
        match item {
            ItemArg::Kp => TuningItem::Kp,
            ItemArg::Ki => TuningItem::Ki,
            ItemArg::Kd => TuningItem::Kd,
            ItemArg::Threshold => TuningItem::Threshold,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FieldArg {
    PreheatTemp,
    PreheatTime,
    SoakTemp,
    SoakTime,
    ReflowTemp,
    HoldTime,
    Fan,
}

impl From<FieldArg> for ProfileField {
    fn from(field: FieldArg) -> Self {
        match field {
            FieldArg::PreheatTemp => ProfileField::PreheatTemp,
            FieldArg::PreheatTime => ProfileField::PreheatTime,
            FieldArg::SoakTemp => ProfileField::SoakTemp,
            FieldArg::SoakTime => ProfileField::SoakTime,
            FieldArg::ReflowTemp => ProfileField::ReflowTemp,
            FieldArg::HoldTime => ProfileField::HoldTime,
            FieldArg::Fan => ProfileField::FanOn,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = if std::path::Path::new(&cli.config).exists() {
        tracing::info!("Loading configuration from: {}", cli.config);
        load_config(&cli.config)?
    } else {
        tracing::info!("No configuration at '{}', using defaults", cli.config);
        Config::default()
    };

    let storage = FileStorage::open(&config.storage.path, config.storage.capacity)?;
    let mut store = NonVolatileStore::new(
        storage,
        config.storage.constants_address,
        config.storage.profiles_address,
    );
    let constants_address = store.constants_address();
    let constants =
        load_constants_or_default(&mut store, constants_address, config.defaults.constants);
    let mut library = load_profiles_or_default(&mut store, config.defaults.profile);

    match cli.command {
        Command::Run { profile, pacing } => {
            let slot = library
                .get(profile)
                .ok_or_else(|| format!("No profile in slot {}", profile))?;
            let span = tracing::info_span!("run", id = %Uuid::new_v4(), profile = %slot.name);
            run_profile(&config, constants, slot.profile, &pacing)
                .instrument(span)
                .await?;
        }
        Command::Heat {
            target,
            duration,
            fan,
            pacing,
        } => {
            let span = tracing::info_span!("heat", id = %Uuid::new_v4());
            heat_to_target(&config, constants, target, fan, duration, &pacing)
                .instrument(span)
                .await?;
        }
        Command::Profiles => print_profiles(&library),
        Command::Constants { action } => match action {
            None | Some(ConstantsAction::Show) => print_constants(&constants),
            Some(ConstantsAction::Tune {
                item,
                steps,
                step_changes,
            }) => {
                let mut tuner = ConstantsTuner::new(constants);
                tuner.select(TuningItem::Step);
                repeat(&mut tuner, step_changes, ConstantsTuner::increment, ConstantsTuner::decrement);
                tuner.select(item.into());
                repeat(&mut tuner, steps, ConstantsTuner::increment, ConstantsTuner::decrement);
                let saved = tuner.save(&mut store, constants_address)?;
                print_constants(&saved);
            }
        },
        Command::EditProfile {
            slot,
            field,
            steps,
            name,
        } => {
            let mut editor = ProfileEditor::open(&library, slot)?;
            if let Some(field) = field {
                editor.select(field.into());
                repeat(&mut editor, steps, ProfileEditor::increment, ProfileEditor::decrement);
            }
            if let Some(name) = name {
                editor.rename(name);
            }
            editor.save(&mut library, &mut store)?;
            print_profiles(&library);
        }
    }
    Ok(())
}

/// Apply `up` `count` times, or `down` `-count` times when negative.
fn repeat<T>(target: &mut T, count: i32, up: fn(&mut T), down: fn(&mut T)) {
    let step = if count > 0 { up } else { down };
    for _ in 0..count.unsigned_abs() {
        step(target);
    }
}

async fn run_profile(
    config: &Config,
    constants: ControllerConstants,
    profile: ReflowProfile,
    pacing: &Pacing,
) -> Result<(), BoxError> {
    let (sim, mut oven) = simulated_oven(config, constants, pacing)?;
    oven.start_profile(profile)?;
    drive(&sim, &mut oven, pacing, None).await
}

async fn heat_to_target(
    config: &Config,
    constants: ControllerConstants,
    target: f64,
    fan: bool,
    duration: f64,
    pacing: &Pacing,
) -> Result<(), BoxError> {
    let (sim, mut oven) = simulated_oven(config, constants, pacing)?;
    oven.start_heat_to_target(target)?;
    oven.set_manual_fan(fan);
    drive(&sim, &mut oven, pacing, Some(duration)).await
}

fn simulated_oven(
    config: &Config,
    constants: ControllerConstants,
    pacing: &Pacing,
) -> Result<(Simulation, Oven), BoxError> {
    if pacing.tick_ms == 0 || !(pacing.speed > 0.0) {
        return Err("tick-ms and speed must be positive".into());
    }
    let sim = Simulation::new(&config.simulation);
    let mut oven = ControlOrchestrator::new(
        sim.oven.clone(),
        sim.clock.clone(),
        sim.oven.clone(),
        constants,
        config,
    );
    if let Some(path) = &pacing.trace {
        tracing::info!("Writing controller trace to {}", path);
        oven.enable_trace(Box::new(File::create(path)?));
    }
    Ok((sim, oven))
}

/// Tick the simulated oven until the run ends, `limit` seconds pass or
/// Ctrl-C is pressed.
async fn drive(
    sim: &Simulation,
    oven: &mut Oven,
    pacing: &Pacing,
    limit: Option<f64>,
) -> Result<(), BoxError> {
    let dt = pacing.tick_ms as f64 / 1000.0;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(dt / pacing.speed));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_logged = f64::NEG_INFINITY;
    let mut last_status = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                tracing::warn!("Interrupted; switching the oven off");
                oven.stop();
                return Ok(());
            }
        }
        sim.advance(dt);
        let report = oven.tick();
        if report.now - last_logged >= 5.0 || last_status != Some(report.status) {
            log_report(&report);
            last_logged = report.now;
            last_status = Some(report.status);
        }
        match report.status {
            OvenStatus::Complete => {
                tracing::info!("Reflow complete");
                return Ok(());
            }
            OvenStatus::Aborted => return Err("Reflow aborted".into()),
            _ => {}
        }
        if limit.is_some_and(|limit| report.now >= limit) {
            tracing::info!("Hold time elapsed at {:.1}°C", sim.temperature());
            oven.stop();
            return Ok(());
        }
    }
}

fn log_report(report: &TickReport) {
    tracing::info!(
        "t={:>6.1}s {:?} temp={} setpoint={:.0}°C heater={} fan={}",
        report.now,
        report.status,
        report
            .temperature
            .map(|t| format!("{:.1}°C", t))
            .unwrap_or_else(|| "--".to_string()),
        report.setpoint,
        if report.heater_on { "on" } else { "off" },
        if report.fan_on { "on" } else { "off" }
    );
}

fn print_profiles(library: &ProfileLibrary) {
    for (index, slot) in library.slots().iter().enumerate() {
        let p = &slot.profile;
        println!(
            "{}: {:<16} preheat {}°C/{}s  soak {}°C/{}s  reflow {}°C hold {}s  fan {}  total {}s",
            index,
            slot.name,
            p.preheat_temp_c,
            p.preheat_time_s,
            p.soak_temp_c,
            p.soak_time_s,
            p.reflow_temp_c,
            p.reflow_hold_time_s,
            if p.fan_on { "on" } else { "off" },
            p.total_runtime_s()
        );
    }
}

fn print_constants(constants: &ControllerConstants) {
    println!(
        "Kp={:.3} Ki={:.3} Kd={:.3} threshold={:.3}",
        constants.kp, constants.ki, constants.kd, constants.threshold
    );
}
