//! Clap derive structures for the `hublink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hublink -- live view and control of a home-automation hub
#[derive(Debug, Parser)]
#[command(
    name = "hublink",
    version,
    about = "Inspect and control home-automation hub entities from the command line",
    long_about = "Connects to the hub's realtime WebSocket API, mirrors entity state\n\
        locally, and sends commands with optimistic feedback.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HUBLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub base URL (overrides profile)
    #[arg(long, short = 'u', env = "HUBLINK_URL", global = true)]
    pub url: Option<String>,

    /// Long-lived access token (HUBLINK_TOKEN is also honoured)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "HUBLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUBLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "HUBLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List entities, optionally filtered by domain or area
    #[command(alias = "ls")]
    Entities(EntitiesArgs),

    /// Show one entity with its attributes
    Entity {
        /// Entity id (e.g. light.kitchen)
        entity_id: String,
    },

    /// List areas with their entity counts
    Areas,

    /// List registered devices
    Devices,

    /// Flip an entity between its two states
    #[command(alias = "t")]
    Toggle(ToggleArgs),

    /// Call a service on an entity
    Call(CallArgs),

    /// Media player transport control
    Media(MediaArgs),

    /// Show the hub's service catalogue
    Services {
        /// Only this domain
        #[arg(long, short = 'd')]
        domain: Option<String>,
    },

    /// Stream live state changes and command notices until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Entity commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    /// Only entities of this domain (e.g. light, media_player)
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Only entities in this area id
    #[arg(long, short = 'a')]
    pub area: Option<String>,
}

#[derive(Debug, Args)]
pub struct ToggleArgs {
    /// Entity id (e.g. light.kitchen)
    pub entity_id: String,

    /// Wait for the hub to confirm the new state
    #[arg(long, short = 'w')]
    pub wait: bool,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Entity id the service targets
    pub entity_id: String,

    /// Service name within the entity's domain (e.g. turn_on)
    pub service: String,

    /// Extra service data as a JSON object
    #[arg(long)]
    pub data: Option<String>,

    /// State the entity should reach; shown immediately and confirmed
    /// against the hub when the domain supports it
    #[arg(long)]
    pub expect: Option<String>,

    /// Wait for confirmation of --expect
    #[arg(long, short = 'w', requires = "expect")]
    pub wait: bool,
}

#[derive(Debug, Args)]
pub struct MediaArgs {
    /// media_player entity id
    pub entity_id: String,

    #[arg(value_enum)]
    pub action: MediaActionArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaActionArg {
    Play,
    Pause,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only changes for this domain
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Stop after this many state changes
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Hub base URL
        #[arg(long)]
        url: String,

        /// Environment variable holding the token
        #[arg(long)]
        token_env: Option<String>,

        /// Prompt for the token and keep it in the config file instead of
        /// the system keyring
        #[arg(long)]
        plaintext: bool,

        /// Skip the token prompt
        #[arg(long)]
        no_token: bool,
    },

    /// Display current configuration with secrets masked
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
