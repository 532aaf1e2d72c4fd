//! Argument definitions

use arp_core::{AlertId, ChangeType, EmergencyId, ExperimentId, Outcome, PredictionId, Severity};
use arp_emergency::EmergencyStatus;
use arp_monitor::MonitorType;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "arp",
    version,
    about = "Autonomous Reliability Pipeline: risk prediction, monitoring, strategy selection and emergency escalation"
)]
pub struct Cli {
    /// Directory holding the pipeline state
    #[arg(long, env = "ARP_STATE_DIR", default_value = ".arp", global = true)]
    pub state_dir: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Failure risk of proposed changes
    Prediction {
        #[command(subcommand)]
        command: PredictionCommand,
    },
    /// Health signals and alerts
    Monitor {
        #[command(subcommand)]
        command: MonitorCommand,
    },
    /// Strategy outcomes and selection
    Strategy {
        #[command(subcommand)]
        command: StrategyCommand,
    },
    /// Mutated variants and A/B experiments
    Evolution {
        #[command(subcommand)]
        command: EvolutionCommand,
    },
    /// Classification, escalation and safe-mode
    Emergency {
        #[command(subcommand)]
        command: EmergencyCommand,
    },
    /// Run an operation through the full coordinator
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
    /// Learnings and error patterns
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommand,
    },
    /// State directory maintenance
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum PredictionCommand {
    Analyze {
        target: String,
        change_type: ChangeType,
    },
    Update {
        id: PredictionId,
        outcome: Outcome,
    },
    Show {
        id: PredictionId,
    },
    /// Share of resolved predictions that were right
    Accuracy {
        /// Print the full breakdown instead
        #[arg(long)]
        report: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum MonitorCommand {
    /// Re-baseline every monitor at its current value
    Init,
    /// One evaluation pass
    Run,
    /// Evaluate every interval until interrupted
    Watch,
    Status,
    Alerts,
    Resolve {
        alert_id: AlertId,
    },
    /// Feed an observation
    Record {
        monitor_type: MonitorType,
        target: String,
        value: f64,
    },
}

#[derive(Debug, Subcommand)]
pub enum StrategyCommand {
    Record(OutcomeArgs),
    Adapt {
        id: String,
        description: String,
        impact: String,
    },
    Performance {
        id: String,
    },
    Best {
        context: String,
    },
    List,
    Recommend {
        context: String,
    },
    Compare {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct OutcomeArgs {
    pub id: String,
    pub context: String,
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub success: bool,
    /// Seconds
    pub time: f64,
}

#[derive(Debug, Subcommand)]
pub enum EvolutionCommand {
    Variant {
        id: String,
    },
    CreateTest {
        id: String,
        context: String,
        sample_size: Option<u32>,
    },
    Record {
        experiment_id: ExperimentId,
        /// base or variant
        bucket: String,
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        success: bool,
        /// Seconds
        time: f64,
    },
    Status {
        experiment_id: ExperimentId,
    },
    List,
    History,
}

#[derive(Debug, Subcommand)]
pub enum EmergencyCommand {
    Classify {
        message: String,
        /// Ask the inference backend first
        #[arg(long)]
        assisted: bool,
    },
    Declare {
        description: String,
        severity: Severity,
        /// JSON object attached to the emergency
        context: Option<String>,
    },
    Handle {
        id: EmergencyId,
        /// Keep driving the ladder until resolved or in safe-mode
        #[arg(long)]
        wait: bool,
    },
    Resolve {
        id: EmergencyId,
        text: String,
    },
    List {
        #[arg(long)]
        status: Option<EmergencyStatus>,
        #[arg(long)]
        severity: Option<Severity>,
    },
    /// Show safe-mode; only the last escalation level turns it on
    SafeMode,
    DisableSafeMode,
}

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    /// Run `command` as the operation; exit status 0 is success
    Run {
        operation: String,
        target: String,
        context: String,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    History {
        #[arg(long)]
        target: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum KnowledgeCommand {
    Query {
        context: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    AddPattern {
        pattern: String,
        severity: Severity,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    Patterns,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Remove leases and sessions older than the lock timeout
    Prune,
}
