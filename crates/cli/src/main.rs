//! githeight CLI - Command-line tool for deterministic version numbers
//! derived from Git history height

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser, ValueEnum};
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;

use githeight::{get_version_or_default, CloudBuildHints, GitHeightError, VersionRequest};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

shadow_rs::shadow!(build);
const CLI_VERSION: &str = env!("GITHEIGHT_CALCULATED_VERSION");

/// githeight - Deterministic version numbers from Git history height
#[derive(Parser, Debug, Clone)]
#[command(name = "githeight")]
#[command(about = "Calculate version numbers from a version.json descriptor and Git history")]
#[command(version = CLI_VERSION)]
struct Args {
    /// Project directory to analyze (defaults to current directory)
    #[arg(default_value = ".")]
    project_directory: PathBuf,

    /// Committish to compute the version for (defaults to HEAD)
    #[arg(short = 'c', long = "commit")]
    committish: Option<String>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "text")]
    format: OutputFormat,

    /// Force the public-release state instead of matching publicReleaseRefSpec
    #[arg(long = "public-release", action = ArgAction::SetTrue)]
    public_release: bool,

    /// Override the descriptor's versionHeightOffset
    #[arg(long = "version-height-offset", allow_hyphen_values = true)]
    version_height_offset: Option<i32>,

    /// Branch being built (normalised to refs/heads/...), as a CI hint
    #[arg(long = "building-branch", env = "GITHEIGHT_BUILDING_BRANCH")]
    building_branch: Option<String>,

    /// Tag being built (normalised to refs/tags/...), as a CI hint
    #[arg(long = "building-tag", env = "GITHEIGHT_BUILDING_TAG")]
    building_tag: Option<String>,

    /// Verbosity level (quiet, normal, verbose, debug, trace)
    #[arg(short = 'v', long = "verbosity", value_parser = parse_verbosity, env = "GITHEIGHT_VERBOSITY")]
    verbosity: Option<Verbosity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Verbosity levels for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
    Trace,
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quiet" => Ok(Verbosity::Quiet),
            "normal" => Ok(Verbosity::Normal),
            "verbose" | "info" => Ok(Verbosity::Verbose),
            "debug" => Ok(Verbosity::Debug),
            "trace" => Ok(Verbosity::Trace),
            _ => Err(format!("Invalid verbosity level: {}", s)),
        }
    }
}

fn parse_verbosity(s: &str) -> Result<Verbosity, String> {
    s.parse::<Verbosity>()
}

fn main() {
    let long_ver: &'static str = Box::leak(long_version().into_boxed_str());

    let mut cmd = Args::command();
    cmd = cmd.version(CLI_VERSION).long_version(long_ver);
    let args = Args::from_arg_matches(&cmd.get_matches()).unwrap_or_else(|e| e.exit());

    // Set up logging based on verbosity level
    let verbosity = args.verbosity.clone().unwrap_or(Verbosity::Normal);
    let tracing_level = match verbosity {
        Verbosity::Quiet => tracing::Level::ERROR,
        Verbosity::Normal => tracing::Level::WARN,
        Verbosity::Verbose => tracing::Level::INFO,
        Verbosity::Debug => tracing::Level::DEBUG,
        Verbosity::Trace => tracing::Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let hints = CloudBuildHints {
        building_branch: args.building_branch.clone(),
        building_tag: args.building_tag.clone(),
        ..Default::default()
    };
    let request = VersionRequest {
        committish: args.committish.clone(),
        public_release: args.public_release.then_some(true),
        version_height_offset: args.version_height_offset,
        cloud_build: Some(&hints),
    };

    debug!("Using request: {:?}", request);

    let code = match get_version_or_default(&args.project_directory, &request) {
        Ok(oracle) => {
            info!("Calculated version: {}", oracle);

            match args.format {
                OutputFormat::Text => println!("{}", oracle.sem_ver2),
                OutputFormat::Json => match serde_json::to_string_pretty(&oracle) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        error!("Failed to serialize oracle: {}", e);
                        exit(2);
                    }
                },
            }

            if oracle.version_height > 0 {
                debug!("Version height: {}", oracle.version_height);
            }
            if !oracle.version_file_found {
                debug!("No version.json found; reporting the default version");
            }

            0 // Success exit code
        }
        Err(e) => {
            match e {
                GitHeightError::MalformedDescriptor { reference, reason } => {
                    error!("Malformed version descriptor at {}: {}", reference, reason);
                }
                GitHeightError::HeightOverflow { height, position } => {
                    error!(
                        "Version height {} does not fit in the {} component",
                        height, position
                    );
                }
                _ => {
                    error!("Version calculation failed: {}", e);
                }
            }
            2 // Error exit code
        }
    };

    exit(code);
}

fn long_version() -> String {
    format!(
        "{version}\ncommit: {commit} ({date})\nbuild: {build}\nrustc: {rustc}",
        version = CLI_VERSION,
        commit = build::SHORT_COMMIT,
        date = build::COMMIT_DATE,
        build = build::BUILD_TIME,
        rustc = build::RUST_VERSION,
    )
}
