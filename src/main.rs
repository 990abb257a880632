use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_runtime::config::DEFAULT_MOTOR_PORT;

#[derive(Parser)]
#[command(about = "Swerve drivetrain control runtime")]
struct Args {
    /// Serial port of the servo bus
    #[arg(long, default_value = DEFAULT_MOTOR_PORT)]
    port: String,

    /// Run against simulated modules instead of the servo bus
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let result = if args.sim {
        swerve_runtime::runtime::run_sim().await
    } else {
        swerve_runtime::runtime::run(&args.port).await
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
