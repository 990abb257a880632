// Keyboard teleop for the swerve drivetrain.
//
// WASD translates, Q/E rotates, 1-3 pick a speed preset, Space stops,
// Esc quits. A held key only arrives as press/repeat events in raw mode,
// so the last direction decays to zero once the key events stop coming;
// the runtime's own watchdog would catch a dead teleop anyway, this just
// makes releasing a key feel immediate.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_runtime::config::{MAX_SPEED_MPS, TOPIC_CMD_CHASSIS};
use swerve_runtime::messages::ChassisCommand;

const PUBLISH_PERIOD: Duration = Duration::from_millis(20);
const KEY_DECAY: Duration = Duration::from_millis(150);

/// Speed presets as fractions of the drivetrain's attainable speed.
const PRESETS: [(f64, &str); 3] = [(0.15, "slow"), (0.4, "cruise"), (0.8, "fast")];
const MAX_OMEGA_RAD_PER_S: f64 = 3.0;

/// Unit-scale chassis direction for a movement key: (vx, vy, omega).
fn key_direction(code: KeyCode) -> Option<(f64, f64, f64)> {
    match code {
        KeyCode::Char('w') => Some((1.0, 0.0, 0.0)),
        KeyCode::Char('s') => Some((-1.0, 0.0, 0.0)),
        KeyCode::Char('a') => Some((0.0, 1.0, 0.0)),
        KeyCode::Char('d') => Some((0.0, -1.0, 0.0)),
        KeyCode::Char('q') => Some((0.0, 0.0, 1.0)),
        KeyCode::Char('e') => Some((0.0, 0.0, -1.0)),
        _ => None,
    }
}

struct Teleop {
    direction: (f64, f64, f64),
    preset: usize,
    last_key: Instant,
}

impl Teleop {
    fn new() -> Self {
        Self {
            direction: (0.0, 0.0, 0.0),
            preset: 0,
            last_key: Instant::now(),
        }
    }

    /// Returns false when the session should end.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Esc => return false,
            KeyCode::Char(' ') => {
                self.direction = (0.0, 0.0, 0.0);
                info!("stop");
            }
            KeyCode::Char(c @ '1'..='3') => {
                self.preset = c as usize - '1' as usize;
                info!("preset: {}", PRESETS[self.preset].1);
            }
            code => {
                if let Some(direction) = key_direction(code) {
                    self.direction = direction;
                    self.last_key = Instant::now();
                }
            }
        }
        true
    }

    /// Command for this publish cycle, with key decay applied.
    fn command(&mut self) -> ChassisCommand {
        if self.last_key.elapsed() > KEY_DECAY {
            self.direction = (0.0, 0.0, 0.0);
        }
        let (vx, vy, omega) = self.direction;
        let (fraction, _) = PRESETS[self.preset];
        ChassisCommand {
            vx_mps: vx * fraction * MAX_SPEED_MPS,
            vy_mps: vy * fraction * MAX_SPEED_MPS,
            omega_rad_per_s: omega * fraction * MAX_OMEGA_RAD_PER_S,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_CHASSIS).await?;

    info!("WASD=translate, Q/E=rotate, 1-3=preset, Space=stop, Esc=quit");
    info!("preset: {}", PRESETS[0].1);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::new();

    loop {
        // Drain every pending key event, then publish once
        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
                    continue;
                }
                if !teleop.handle_key(code) {
                    // Leave the runtime with a clean zero command
                    let stop = ChassisCommand {
                        vx_mps: 0.0,
                        vy_mps: 0.0,
                        omega_rad_per_s: 0.0,
                    };
                    publisher.put(serde_json::to_string(&stop)?).await?;
                    return Ok(());
                }
            }
        }

        let cmd = teleop.command();
        publisher.put(serde_json::to_string(&cmd)?).await?;
        tokio::time::sleep(PUBLISH_PERIOD).await;
    }
}
