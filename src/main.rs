//! Thin CLI entry point: load configuration, configure the profile
//! registry, run one sandbox, print the result as JSON. This is the
//! "thin top-level `run()` convenience" — composition, not a second
//! subsystem; the engineering lives in the library.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use epicbox::{Configuration, CreateOptions, SandboxFile};
use tracing::info;

#[derive(Parser)]
#[command(name = "epicbox")]
#[command(about = "Runs untrusted code inside ephemeral containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "epicbox.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Registered profile name to run against
    profile: String,

    /// Command to run; falls back to the profile's default command,
    /// then the literal "true"
    command: Option<String>,

    /// Bytes to send on stdin
    #[arg(long)]
    stdin: Option<String>,

    /// Wall-clock limit override, in seconds
    #[arg(long)]
    realtime: Option<i64>,

    /// CPU-time limit override, in seconds
    #[arg(long)]
    cputime: Option<i64>,

    /// Memory limit override, in megabytes
    #[arg(long)]
    memory: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("epicbox={}", log_level).into()),
        )
        .init();

    info!("Starting epicbox v{}", env!("CARGO_PKG_VERSION"));

    let configuration = Configuration::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    epicbox::configure(
        configuration.profiles(),
        configuration.engine_url.clone(),
        configuration.container_prefix.clone(),
    );

    let limits = epicbox::LimitsOverride {
        cputime: cli.cputime,
        realtime: cli.realtime,
        memory: cli.memory,
        processes: None,
        file_size: None,
    };

    let options = CreateOptions {
        command: cli.command,
        files: Vec::<SandboxFile>::new(),
        limits,
        workdir: None,
    };

    let stdin = cli.stdin.map(|s| s.into_bytes());
    let result = epicbox::run(&cli.profile, options, stdin).await?;

    println!("{}", serde_json::to_string_pretty(&to_json(&result))?);
    Ok(())
}

fn to_json(result: &epicbox::SandboxRunResult) -> serde_json::Value {
    serde_json::json!({
        "exit_code": result.exit_code,
        "stdout": String::from_utf8_lossy(&result.stdout),
        "stderr": String::from_utf8_lossy(&result.stderr),
        "duration_s": result.duration_s,
        "timeout": result.timeout,
        "oom_killed": result.oom_killed,
    })
}
