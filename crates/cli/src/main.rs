// catalink CLI - reconcile catalog tables against Wikidata

mod exit_codes;
mod inspect;
mod lookup;
mod recon;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exit_codes::{EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "catalink")]
#[command(about = "Reconcile person, institution and space catalogs against Wikidata")]
#[command(version)]
struct Cli {
    /// More log output (debug)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a local table against the catalog and the knowledge base
    #[command(after_help = "\
Examples:
  catalink run --kind person --input local.csv --catalog catalog.csv -o out.csv
  catalink run --kind space --input sites.csv --catalog spaces.csv --offline
  catalink run --kind institution -i new.csv -c inst.csv -o out.csv --json > report.json")]
    Run {
        /// Record kind of both tables
        #[arg(long, short = 'k')]
        kind: Kind,

        /// Local table to reconcile
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Authoritative catalog table
        #[arg(long, short = 'c')]
        catalog: PathBuf,

        /// Write the reconciled table here (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Config file (default: ./catalink.toml, then the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Name stamped into last_modified_by
        #[arg(long)]
        editor: Option<String>,

        /// Date stamped into last_modified, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Skip the knowledge base; only catalog checks and ID allocation
        #[arg(long)]
        offline: bool,
    },

    /// Check a table for duplicate or conflicting IDs (no network)
    #[command(after_help = "\
Examples:
  catalink check --kind person catalog.csv
  catalink check --kind space spaces.csv --json")]
    Check {
        #[arg(long, short = 'k')]
        kind: Kind,

        /// Table to check
        file: PathBuf,

        /// Print violations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Match one place by name and coordinate
    #[command(after_help = "\
Examples:
  catalink locate --name 故宫 --lat 39.916 --lon 116.397 --language zh")]
    Locate {
        #[arg(long)]
        name: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Per-axis tolerance in degrees
        #[arg(long, default_value_t = catalink_recon::geo::EXPLORATORY_TOLERANCE)]
        tolerance: f64,

        /// Search language (default: first configured language)
        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the full names a person would be searched under
    #[command(after_help = "\
Examples:
  catalink names --family 鲁 --given 迅 --language zh
  catalink names --family Monet --given Claude --language en")]
    Names {
        #[arg(long)]
        family: Option<String>,

        #[arg(long)]
        given: Option<String>,

        #[arg(long, short = 'l')]
        language: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Kind {
    Person,
    Institution,
    Space,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "catalink=debug"
    } else if quiet {
        "catalink=warn"
    } else {
        "catalink=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run { kind, input, catalog, output, config, editor, date, json, offline } => {
            recon::cmd_run(recon::RunArgs {
                kind,
                input,
                catalog,
                output,
                config,
                editor,
                date,
                json,
                offline,
            })
        }
        Commands::Check { kind, file, json } => recon::cmd_check(kind, file, json),
        Commands::Locate { name, lat, lon, tolerance, language, config } => {
            inspect::cmd_locate(inspect::LocateArgs { name, lat, lon, tolerance, language, config })
        }
        Commands::Names { family, given, language } => inspect::cmd_names(family, given, language),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
