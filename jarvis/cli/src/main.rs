use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jarvis_decision::DecisionAction;
use jarvis_learning::LearningInsights;
use jarvis_memory::MemoryStatistics;
use jarvis_model::JarvisConfig;
use jarvis_orchestrator::{Interpretation, JarvisRuntime, Scheduler};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "jarvis=info";

#[derive(Parser, Debug)]
#[command(name = "jarvis", version, about = "Operator console for the Jarvis decision core")]
struct Cli {
    /// Diagnostic output format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Human, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interprets one command and prints the decided action.
    Interpret {
        /// Free-text operator command.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Prints the full interpretation as JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Reads commands from stdin until `:quit`.
    Console {
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Prints the effective configuration as TOML.
    Config {
        /// Ignores `--config` and environment overrides.
        #[arg(long)]
        default: bool,
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RuntimeArgs {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory for per-component JSON-lines logs.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl RuntimeArgs {
    fn bootstrap(&self) -> Result<JarvisRuntime> {
        let config = load_config(self.config.as_ref())?;
        let mut builder = JarvisRuntime::builder(config);
        if let Some(dir) = &self.log_dir {
            builder = builder.log_dir(dir);
        }
        builder.build().context("bootstrapping runtime")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    match cli.command {
        Commands::Interpret {
            text,
            json,
            runtime,
        } => interpret(&runtime.bootstrap()?, &text.join(" "), json),
        Commands::Console { runtime } => console(runtime.bootstrap()?).await,
        Commands::Config { default, config } => {
            let config = if default {
                JarvisConfig::default()
            } else {
                load_config(config.as_ref())?
            };
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr);
    match format {
        LogFormat::Human => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<JarvisConfig> {
    let config = match path {
        Some(path) => JarvisConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => JarvisConfig::default(),
    };
    config.with_env_overrides()
}

fn interpret(runtime: &JarvisRuntime, text: &str, as_json: bool) -> Result<()> {
    let interpretation = run_once(runtime, text);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&interpretation)?);
    } else {
        println!("{}", render_action(&interpretation.action));
    }
    Ok(())
}

fn run_once(runtime: &JarvisRuntime, text: &str) -> Interpretation {
    let interpretation = runtime.interpret_detailed(text);
    runtime.learn_from_interaction(
        &interpretation.command,
        &interpretation.analysis,
        &interpretation.action,
    );
    interpretation
}

async fn console(runtime: JarvisRuntime) -> Result<()> {
    let runtime = Arc::new(runtime);
    let scheduler = Scheduler::spawn(Arc::clone(&runtime));
    tracing::info!("background scheduler started");
    println!("Jarvis console ready. Commands: :insights, :stats, :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("jarvis> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":insights" => println!("{}", render_insights(&runtime.insights())),
            ":stats" => println!("{}", render_stats(&runtime.memory_statistics())),
            text => println!("{}", render_action(&run_once(&runtime, text).action)),
        }
    }
    scheduler.shutdown().await;
    tracing::info!("background scheduler stopped");
    Ok(())
}

fn render_action(action: &DecisionAction) -> String {
    let mut out = format!(
        "{} [{}] {}\n  confidence: {:.2}",
        action.action_type, action.priority, action.description, action.confidence
    );
    if let Some(strategy) = action.strategy {
        out.push_str(&format!("\n  strategy: {strategy}"));
    }
    if let Some(estimate) = &action.estimated_time {
        out.push_str(&format!("\n  estimated: {estimate}"));
    }
    if !action.test_types.is_empty() {
        let types: Vec<&str> = action.test_types.iter().map(|tt| tt.as_str()).collect();
        out.push_str(&format!("\n  test types: {}", types.join(", ")));
    }
    out.push_str(&format!("\n  id: {}", action.id));
    out
}

fn render_insights(insights: &LearningInsights) -> String {
    if insights.insights.is_empty() {
        return format!("No insights yet (cycle {}).", insights.cycle);
    }
    let mut out = format!(
        "Insights (cycle {}, {}):",
        insights.cycle,
        insights.generated_at.to_rfc3339()
    );
    for line in &insights.insights {
        out.push_str("\n  - ");
        out.push_str(line);
    }
    out
}

fn render_stats(stats: &MemoryStatistics) -> String {
    let mut out = format!(
        "active tests: {}\nrecent failures: {}\ntest results: {} (success rate {:.1}%)\nlearning records: {}\npatterns: {}",
        stats.active_tests,
        stats.recent_failures,
        stats.test_results,
        stats.test_success_rate * 100.0,
        stats.learning_records,
        stats.patterns,
    );
    for (bucket, count) in &stats.buckets {
        out.push_str(&format!("\n  {}: {count}", bucket.as_str()));
    }
    out
}
