//! statbox - validate and run model-generated statistics programs
//!
//! ## Commands
//!
//! - `validate`: Statically check a program against the sandbox policy
//! - `run`: Validate and execute a program, printing the result as JSON
//! - `policy`: Print the effective sandbox policy as TOML

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use statbox_core::{CodeExecutor, SandboxConfig, SandboxPolicy};

#[derive(Parser)]
#[command(name = "statbox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sandboxed execution of model-generated statistics programs", long_about = None)]
struct Cli {
    /// Sandbox policy file (TOML); the built-in standard policy if omitted
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a program without running it
    Validate {
        /// Program file, or `-` for stdin
        file: PathBuf,
    },

    /// Validate and execute a program
    Run {
        /// Program file, or `-` for stdin
        file: PathBuf,

        /// Wall-clock timeout in seconds (default: $STATBOX_CODE_TIMEOUT_SECS or 30)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Python interpreter for the worker (default: $STATBOX_PYTHON or python3)
        #[arg(long)]
        python: Option<String>,

        /// Let the worker see user site-packages and PYTHON* variables
        #[arg(long)]
        no_isolation: bool,
    },

    /// Print the effective policy
    Policy,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    statbox_core::init_tracing(cli.json, level);

    let policy = load_policy(cli.policy.as_deref())?;

    match cli.command {
        Commands::Validate { file } => cmd_validate(policy, &file),
        Commands::Run {
            file,
            timeout,
            python,
            no_isolation,
        } => {
            let mut config = SandboxConfig::from_env().context("Invalid sandbox environment")?;
            if let Some(timeout) = timeout {
                config.timeout_secs = timeout;
            }
            if let Some(python) = python {
                config.python = python;
            }
            if no_isolation {
                config.isolated = false;
            }
            cmd_run(policy, config, &file).await
        }
        Commands::Policy => cmd_policy(&policy),
    }
}

fn load_policy(path: Option<&Path>) -> Result<Arc<SandboxPolicy>> {
    let policy = match path {
        Some(path) => SandboxPolicy::load(path)
            .with_context(|| format!("Failed to load policy {}", path.display()))?,
        None => SandboxPolicy::standard(),
    };
    Ok(Arc::new(policy))
}

fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read program from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn cmd_validate(policy: Arc<SandboxPolicy>, file: &Path) -> Result<ExitCode> {
    let source = read_source(file)?;
    let executor = CodeExecutor::new(SandboxConfig::default(), policy)
        .context("Invalid sandbox configuration")?;

    let outcome = executor.validate(&source);
    if outcome.is_valid() {
        println!("✓ {}: no violations", file.display());
        return Ok(ExitCode::SUCCESS);
    }

    for message in outcome.messages() {
        println!("✗ {message}");
    }
    debug!(diagnostics = outcome.len(), "validation failed");
    Ok(ExitCode::FAILURE)
}

async fn cmd_run(policy: Arc<SandboxPolicy>, config: SandboxConfig, file: &Path) -> Result<ExitCode> {
    let source = read_source(file)?;
    let executor = CodeExecutor::new(config, policy).context("Invalid sandbox configuration")?;

    let result = executor.execute(&source).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_policy(policy: &SandboxPolicy) -> Result<ExitCode> {
    let rendered = policy.to_toml_string().context("Failed to render policy")?;
    print!("{rendered}");
    Ok(ExitCode::SUCCESS)
}
