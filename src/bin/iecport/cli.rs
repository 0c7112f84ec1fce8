//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use iecport::CachePolicy;

/// iecport - build IEC 61131-3 structured text programs for Arduino boards
#[derive(Parser)]
#[command(name = "iecport")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (echoes the build log)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Installation root containing bin/, src/ and examples/
    #[arg(long, global = true, env = "IECPORT_ROOT")]
    pub root: Option<PathBuf>,

    /// Board catalog (defaults to <root>/src/hals.json)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transpile, compile and optionally upload a program
    Build(BuildArgs),

    /// List boards in the catalog
    Boards(BoardsArgs),

    /// Inspect or update a board core
    Core(CoreArgs),

    /// Inspect or update the required libraries
    Lib(LibArgs),

    /// Check the installation
    Doctor(DoctorArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format for build progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MessageFormat {
    #[default]
    Human,
    Json,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Board name from the catalog
    #[arg(short, long)]
    pub board: String,

    /// Structured text program
    #[arg(short, long, value_name = "FILE")]
    pub program: PathBuf,

    /// Line for defines.h (repeatable)
    #[arg(short = 'D', long = "define", value_name = "LINE")]
    pub defines: Vec<String>,

    /// Sketch header copied to ext/arduino_sketch.h
    #[arg(long, value_name = "FILE")]
    pub sketch: Option<PathBuf>,

    /// Upload to this serial port after compiling
    #[arg(long)]
    pub port: Option<String>,

    /// Cache policy
    #[arg(long, value_enum)]
    pub policy: Option<CachePolicy>,

    /// Kill tool commands after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip the delays between phases
    #[arg(long)]
    pub no_settle: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,
}

#[derive(Args)]
pub struct BoardsArgs {
    /// Print the catalog as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CoreArgs {
    #[command(subcommand)]
    pub command: CoreCommand,
}

#[derive(Subcommand)]
pub enum CoreCommand {
    /// Show whether a core is installed and current
    Status(CoreTarget),

    /// Bring a core up to date
    Upgrade(CoreTarget),

    /// Remove and install a core
    Reinstall(CoreTarget),
}

#[derive(Args)]
pub struct CoreTarget {
    /// Core id (vendor:arch), or a board name from the catalog
    pub core: String,
}

#[derive(Args)]
pub struct LibArgs {
    #[command(subcommand)]
    pub command: LibCommand,
}

#[derive(Subcommand)]
pub enum LibCommand {
    /// Show whether library updates are available
    Status,

    /// Install missing required libraries
    Install,

    /// Upgrade all installed libraries
    Upgrade,

    /// Uninstall and reinstall installed and required libraries
    Clean,
}

#[derive(Args)]
pub struct DoctorArgs {}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
