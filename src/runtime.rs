// 50 Hz control loop with command watchdog.
//
// Each cycle: drain pending chassis commands (keep latest), run the watchdog
// (stale command = stop the robot), convert the chassis speeds to per-module
// states, apply them, publish telemetry. A failing module is logged and the
// remaining modules still complete their cycle.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::{
    module_configurations, module_locations, CMD_TIMEOUT, DRIVE_IDS, ENCODER_IDS, LOOP_HZ,
    MAX_SPEED_MPS, STEER_IDS, TOPIC_CMD_CHASSIS, TOPIC_HEALTH, TOPIC_TELEMETRY,
};
use crate::drive::kinematics::{SwerveKinematics, MODULE_COUNT};
use crate::drive::module::{DriveRequestType, SteerRequestType, SwerveModule};
use crate::drive::state::{ChassisSpeeds, ModuleState};
use crate::messages::{ChassisCommand, DrivetrainTelemetry, RuntimeHealth};
use crate::motor::controller::MotorController;
use crate::motor::encoder::AbsoluteEncoder;
use crate::motor::sim::{SimAbsoluteEncoder, SimController};
use crate::motor::sts::{shared_bus, StsAbsoluteEncoder, StsBus, StsController};

/// Four modules plus their shared kinematics.
pub struct Drivetrain<D, S, E> {
    kinematics: SwerveKinematics,
    modules: [SwerveModule<D, S, E>; MODULE_COUNT],
    // Last good state per module, retained when a telemetry read fails
    last_states: [ModuleState; MODULE_COUNT],
}

impl<D, S, E> Drivetrain<D, S, E>
where
    D: MotorController,
    S: MotorController,
    E: AbsoluteEncoder,
{
    pub fn new(modules: [SwerveModule<D, S, E>; MODULE_COUNT]) -> Self {
        let locations = std::array::from_fn(|i| modules[i].config().location_m);
        Self {
            kinematics: SwerveKinematics::new(locations),
            modules,
            last_states: [ModuleState::default(); MODULE_COUNT],
        }
    }

    /// Apply one chassis-speed command to all modules.
    ///
    /// One module failing must not keep the others from completing the
    /// cycle; errors are logged and the next cycle re-issues fresh requests.
    pub fn drive(&mut self, speeds: ChassisSpeeds) {
        let mut states = self.kinematics.to_module_states(speeds);
        SwerveKinematics::desaturate(&mut states, MAX_SPEED_MPS);

        for (i, (module, state)) in self.modules.iter_mut().zip(states).enumerate() {
            if let Err(e) = module.apply(
                state,
                DriveRequestType::Voltage,
                SteerRequestType::Position,
            ) {
                warn!(module = i, error = %e, "apply failed, continuing");
            }
        }
    }

    /// Measured module states; a failed read repeats the last good sample.
    pub fn measured_states(&mut self) -> [ModuleState; MODULE_COUNT] {
        for (i, module) in self.modules.iter_mut().enumerate() {
            match module.get_state() {
                Ok(state) => self.last_states[i] = state,
                Err(e) => warn!(module = i, error = %e, "state read failed, keeping last"),
            }
        }
        self.last_states
    }

    pub fn chassis_speeds_from(&self, states: &[ModuleState; MODULE_COUNT]) -> ChassisSpeeds {
        self.kinematics.to_chassis_speeds(states)
    }
}

pub struct Runtime {
    latest_cmd: Option<ChassisCommand>,
    cmd_received_at: Instant,
    pub health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    fn on_command(&mut self, cmd: ChassisCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Chassis speeds for this cycle, with watchdog applied.
    fn compute_speeds(&mut self) -> ChassisSpeeds {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            if self.health != RuntimeHealth::CmdStale {
                warn!("command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            ChassisSpeeds::default()
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            ChassisSpeeds::from(cmd)
        } else {
            self.health = RuntimeHealth::CmdStale;
            ChassisSpeeds::default()
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Build a drivetrain over the serial servo bus and run the control loop.
pub async fn run(port: &str) -> Result<(), BoxError> {
    info!("Opening servo bus on {}", port);
    let bus = shared_bus(StsBus::open(port)?);

    let configs = module_configurations();
    let mut modules = Vec::with_capacity(MODULE_COUNT);
    for (i, config) in configs.into_iter().enumerate() {
        let mut module = SwerveModule::new(config);
        module.setup(
            StsController::new(bus.clone(), DRIVE_IDS[i]),
            StsController::new(bus.clone(), STEER_IDS[i]),
            StsAbsoluteEncoder::new(bus.clone(), ENCODER_IDS[i]),
        )?;
        modules.push(module);
    }
    let modules: [_; MODULE_COUNT] = modules
        .try_into()
        .map_err(|_| "module count mismatch")?;

    run_loop(Drivetrain::new(modules)).await
}

/// Run the control loop on simulated hardware. No serial bus required.
pub async fn run_sim() -> Result<(), BoxError> {
    info!("Running with simulated modules");

    let configs = module_configurations();
    let mut modules = Vec::with_capacity(MODULE_COUNT);
    for config in configs {
        let mut module = SwerveModule::new(config);
        module.setup(
            SimController::new(StsController::default_conversion()),
            SimController::new(StsController::default_conversion()),
            SimAbsoluteEncoder::new(),
        )?;
        modules.push(module);
    }
    let modules: [_; MODULE_COUNT] = modules
        .try_into()
        .map_err(|_| "module count mismatch")?;

    run_loop(Drivetrain::new(modules)).await
}

async fn run_loop<D, S, E>(mut drivetrain: Drivetrain<D, S, E>) -> Result<(), BoxError>
where
    D: MotorController,
    S: MotorController,
    E: AbsoluteEncoder,
{
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let subscriber = session.declare_subscriber(TOPIC_CMD_CHASSIS).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {} modules at {}, {}Hz loop, {}ms watchdog",
        MODULE_COUNT,
        module_locations()
            .map(|(x, y)| format!("({:.2},{:.2})", x, y))
            .join(" "),
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_CHASSIS);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ChassisCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => error!("failed to parse command: {}", e),
            }
        }

        // 2. Watchdog + kinematics + per-module dispatch
        let speeds = runtime.compute_speeds();
        drivetrain.drive(speeds);

        // 3. Publish telemetry and health
        let states = drivetrain.measured_states();
        let telemetry = DrivetrainTelemetry {
            modules: states,
            measured: drivetrain.chassis_speeds_from(&states),
            health: runtime.health,
        };
        pub_telemetry.put(serde_json::to_string(&telemetry)?).await?;
        pub_health.put(serde_json::to_string(&runtime.health)?).await?;
    }
}
