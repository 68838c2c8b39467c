//! KubeSentinel CLI - simulated cluster monitor with AI-assisted remediation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentinel::config::DEFAULT_CONFIG_FILE;
use sentinel::monitor::{
    ApprovalPolicy, EventEmitter, Monitor, OperatorCommand, OutputFormat, COMMAND_HELP,
};
use sentinel::{AnalysisClient, AnalysisHandler, LogRecord, SentinelConfig, ToolCall};

/// KubeSentinel - detect simulated cluster incidents and walk AI diagnoses
/// through human approval.
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Simulated Kubernetes incident monitor with AI-assisted remediation")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "SENTINEL_LOG_JSON")]
    log_json: bool,

    /// Preferences file
    #[arg(long, global = true, env = "SENTINEL_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override the preferences file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Analysis backend base URL
    #[arg(long, env = "SENTINEL_BACKEND_URL")]
    backend_url: Option<String>,

    /// Model requested from the backend
    #[arg(long, env = "SENTINEL_MODEL")]
    model: Option<String>,

    /// Log records snapshotted into each incident
    #[arg(long)]
    context_window: Option<usize>,

    /// Generator tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Chance per tick that a critical scenario starts (0.0-1.0)
    #[arg(long)]
    critical_probability: Option<f64>,

    /// Simulated remediation time in milliseconds
    #[arg(long)]
    remediation_delay_ms: Option<u64>,

    /// Analysis timeout in seconds (0 disables)
    #[arg(long, env = "SENTINEL_ANALYSIS_TIMEOUT")]
    analysis_timeout: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut SentinelConfig) {
        if let Some(url) = self.backend_url {
            config.backend_url = url;
        }
        if self.model.is_some() {
            config.model = self.model;
        }
        if let Some(window) = self.context_window {
            config.context_window = window;
        }
        if let Some(tick) = self.tick_ms {
            config.tick_interval_ms = tick;
        }
        if let Some(p) = self.critical_probability {
            config.critical_probability = p;
        }
        if let Some(delay) = self.remediation_delay_ms {
            config.remediation_delay_ms = delay;
        }
        if let Some(timeout) = self.analysis_timeout {
            config.analysis_timeout_secs = timeout;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// How proposals are decided
        #[arg(long, value_enum, default_value_t = ApprovalPolicy::Manual, env = "SENTINEL_POLICY")]
        policy: ApprovalPolicy,

        /// Event output format on stdout
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also append JSON events to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Stop after this many log records
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Do not read operator commands from stdin
        #[arg(long)]
        no_input: bool,
    },

    /// Check the analysis backend
    Health {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Analyze a JSON array of log records
    Analyze {
        /// File holding the records
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Use the one-shot endpoint instead of the event stream
        #[arg(long)]
        no_stream: bool,
    },

    /// Ask the backend to execute a remediation tool
    Execute {
        /// Tool name
        tool: String,

        /// Tool parameters as key=value (values parsed as JSON when possible)
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the effective configuration, optionally persisting overrides
    Config {
        #[command(flatten)]
        overrides: Overrides,

        /// Write the result back to the preferences file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run {
            overrides,
            policy,
            format,
            output,
            max_ticks,
            no_input,
        } => {
            let config = load_config(&cli.config, overrides)?;
            run_monitor(config, policy, format, output, max_ticks, no_input).await
        }
        Commands::Health { overrides } => {
            let config = load_config(&cli.config, overrides)?;
            check_health(&config).await
        }
        Commands::Analyze {
            file,
            overrides,
            no_stream,
        } => {
            let config = load_config(&cli.config, overrides)?;
            analyze_file(&config, &file, no_stream).await
        }
        Commands::Execute {
            tool,
            params,
            overrides,
        } => {
            let config = load_config(&cli.config, overrides)?;
            execute_tool(&config, &tool, &params).await
        }
        Commands::Config { overrides, save } => {
            let config = load_config(&cli.config, overrides)?;
            if save {
                config
                    .save(&cli.config)
                    .with_context(|| format!("Failed to write {}", cli.config.display()))?;
                info!(path = %cli.config.display(), "Configuration saved");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sentinel=debug,info")
        } else {
            EnvFilter::new("sentinel=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: &Path, overrides: Overrides) -> Result<SentinelConfig> {
    let mut config = SentinelConfig::load(Some(path))
        .with_context(|| format!("Failed to load {}", path.display()))?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn client(config: &SentinelConfig) -> Result<AnalysisClient> {
    Ok(AnalysisClient::new(&config.backend_url)
        .context("Failed to create analysis client")?
        .with_model(config.model.clone())
        .with_fallback_tool(&config.fallback_tool))
}

async fn run_monitor(
    config: SentinelConfig,
    policy: ApprovalPolicy,
    format: OutputFormat,
    output: Option<PathBuf>,
    max_ticks: Option<u64>,
    no_input: bool,
) -> Result<()> {
    let analyzer = client(&config)?;
    match analyzer.health().await {
        Ok(health) if health.backend_connected => {
            info!(model = %health.model, "Analysis backend healthy");
        }
        Ok(health) => warn!(status = %health.status, "Analysis backend cannot reach its model"),
        Err(e) => warn!(error = %e, "Analysis backend unreachable; proposals will use the fallback"),
    }

    let emitter = EventEmitter::new(format, output);
    let mut monitor = Monitor::new(config, Arc::new(analyzer), emitter)?
        .with_policy(policy)
        .with_max_ticks(max_ticks);

    let (tx, rx) = mpsc::unbounded_channel();
    if no_input {
        drop(tx);
    } else {
        if policy == ApprovalPolicy::Manual {
            eprintln!("{}", COMMAND_HELP.dimmed());
        }
        tokio::spawn(read_commands(tx));
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let summary = monitor.run(rx, shutdown).await?;
    info!(
        ticks = summary.ticks,
        status = %summary.status,
        resolved = summary.counts.resolved,
        ignored = summary.counts.ignored,
        awaiting = summary.counts.analyzed,
        "Run finished"
    );
    Ok(())
}

async fn read_commands(tx: mpsc::UnboundedSender<OperatorCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<OperatorCommand>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "{COMMAND_HELP}"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read operator input");
                break;
            }
        }
    }
}

async fn check_health(config: &SentinelConfig) -> Result<()> {
    let health = client(config)?
        .health()
        .await
        .with_context(|| format!("Backend {} unreachable", config.backend_url))?;

    let status = if health.backend_connected {
        health.status.as_str().green().bold()
    } else {
        health.status.as_str().yellow().bold()
    };
    println!("backend: {}", config.backend_url);
    println!("status:  {status}");
    println!("model:   {}", health.model);
    if !health.backend_connected {
        bail!("backend is degraded: model server not reachable");
    }
    Ok(())
}

/// Prints fragments as they arrive.
#[derive(Default)]
struct PrintHandler {
    result: Option<ToolCall>,
    error: Option<String>,
}

impl AnalysisHandler for PrintHandler {
    fn on_reasoning(&mut self, text: &str) {
        eprint!("{}", text.dimmed());
    }

    fn on_content(&mut self, text: &str) {
        eprint!("{text}");
        let _ = std::io::stderr().flush();
    }

    fn on_result(&mut self, proposal: ToolCall) {
        self.result = Some(proposal);
    }

    fn on_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }
}

async fn analyze_file(config: &SentinelConfig, file: &Path, no_stream: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let logs: Vec<LogRecord> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of log records", file.display()))?;
    if logs.is_empty() {
        bail!("no log records in {}", file.display());
    }
    let client = client(config)?;

    if no_stream {
        let response = client.analyze(&logs).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut handler = PrintHandler::default();
    client.analyze_stream(&logs, &mut handler).await;
    eprintln!();

    if let Some(error) = handler.error {
        bail!("analysis failed: {error}");
    }
    match handler.result {
        Some(proposal) => {
            println!("{}", serde_json::to_string_pretty(&proposal)?);
            Ok(())
        }
        None => bail!("analysis ended without a proposal"),
    }
}

fn parse_params(params: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            bail!("parameter '{param}' is not key=value");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

async fn execute_tool(config: &SentinelConfig, tool: &str, params: &[String]) -> Result<()> {
    let parameters = parse_params(params)?;
    let response = client(config)?.execute(tool, parameters).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
