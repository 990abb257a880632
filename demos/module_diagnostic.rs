// Module diagnostic: READ-ONLY check of every servo on the bus
//
// This tool does NOT write anything to the servos - it's completely safe.
// Run it before powering the drivetrain loop for the first time.
//
// Usage: cargo run --example module_diagnostic -- [port]
// Example: cargo run --example module_diagnostic -- /dev/ttyUSB0

use std::io::{self, Write};

use swerve_runtime::config::{DEFAULT_MOTOR_PORT, DRIVE_IDS, ENCODER_IDS, STEER_IDS};
use swerve_runtime::motor::sts::{Register, StsBus};

const MODULE_NAMES: [&str; 4] = ["Front-Left", "Front-Right", "Back-Left", "Back-Right"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_MOTOR_PORT.to_string());

    println!("=== Swerve Module Diagnostic (READ-ONLY) ===");
    println!();
    println!("Serial port: {}", port);
    println!("Drive IDs:   {:?}", DRIVE_IDS);
    println!("Steer IDs:   {:?}", STEER_IDS);
    println!("Encoder IDs: {:?}", ENCODER_IDS);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match StsBus::open(&port) {
        Ok(bus) => {
            println!("  ok");
            bus
        }
        Err(e) => {
            println!("  FAILED: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Check the user has permission on the device node");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging servos...");
    let mut all_found = true;
    for (i, name) in MODULE_NAMES.iter().enumerate() {
        for (role, id) in [
            ("drive", DRIVE_IDS[i]),
            ("steer", STEER_IDS[i]),
            ("encoder", ENCODER_IDS[i]),
        ] {
            print!("  {} {} (ID {}): ", name, role, id);
            io::stdout().flush()?;
            match bus.ping(id) {
                Ok(true) => println!("responding"),
                Ok(false) => {
                    println!("NO RESPONSE");
                    all_found = false;
                }
                Err(e) => {
                    println!("ERROR: {}", e);
                    all_found = false;
                }
            }
        }
    }
    println!();

    if !all_found {
        println!("WARNING: not all servos responded.");
        println!("  - Check bus power");
        println!("  - Verify IDs match the configuration");
        println!("  - Check wiring connections");
        println!();
        print!("Continue reading available servos? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
        println!();
    }

    println!("Step 3: Reading registers...");
    println!();

    for (i, name) in MODULE_NAMES.iter().enumerate() {
        println!("  === Module {} ===", name);
        for (role, id) in [("drive", DRIVE_IDS[i]), ("steer", STEER_IDS[i])] {
            println!("    -- {} (ID {}) --", role, id);
            dump_servo(&mut bus, id);
        }

        // Absolute encoder: position is the only register that matters
        let id = ENCODER_IDS[i];
        match bus.read(id, Register::PresentPosition) {
            Ok(pos) => {
                let degrees = pos as f64 * 360.0 / 4096.0;
                println!("    encoder (ID {}): {} counts ({:.1} deg)", id, pos, degrees);
            }
            Err(e) => println!("    encoder (ID {}): ERROR - {}", id, e),
        }
        println!();
    }

    println!("Diagnostic complete.");
    println!();
    println!("If every servo responded and shows reasonable values:");
    println!("  1. Velocity should read 0 while the wheels are stationary");
    println!("  2. Encoder positions should change when you turn a wheel by hand");
    println!("  3. The runtime will configure operating modes itself on startup");

    Ok(())
}

fn dump_servo(bus: &mut StsBus, id: u8) {
    match bus.read(id, Register::OperatingMode) {
        Ok(mode) => {
            let mode_str = match mode {
                0 => "Position",
                1 => "Velocity",
                2 => "PWM",
                3 => "Step",
                _ => "Unknown",
            };
            println!("    Operating Mode:   {} ({})", mode, mode_str);
        }
        Err(e) => println!("    Operating Mode:   ERROR - {}", e),
    }

    match bus.read(id, Register::TorqueEnable) {
        Ok(val) => {
            let status = if val == 1 { "ENABLED" } else { "disabled" };
            println!("    Torque Enable:    {} ({})", val, status);
        }
        Err(e) => println!("    Torque Enable:    ERROR - {}", e),
    }

    match bus.read(id, Register::PresentVelocity) {
        Ok(vel) => println!("    Present Velocity: {} (raw)", vel),
        Err(e) => println!("    Present Velocity: ERROR - {}", e),
    }

    match bus.read(id, Register::PresentPosition) {
        Ok(pos) => {
            let degrees = pos as f64 * 360.0 / 4096.0;
            println!("    Present Position: {} ({:.1} deg)", pos, degrees);
        }
        Err(e) => println!("    Present Position: ERROR - {}", e),
    }

    match bus.read(id, Register::PresentVoltage) {
        Ok(v) => println!("    Supply Voltage:   {:.1} V", v as f64 / 10.0),
        Err(e) => println!("    Supply Voltage:   ERROR - {}", e),
    }
}
