//! lh-config CLI
//!
//! Entry point for the `lh-config` command-line tool.

use clap::{Parser, Subcommand};
use lh_config::{Config, ConfigError, ResolveOptions, Resolver};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "LH_CONFIG_LOG";

#[derive(Parser)]
#[command(name = "lh-config")]
#[command(about = "Resolve layered audit configurations", version)]
struct Cli {
    /// Log resolution steps at debug level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ResolveArgs {
    /// Config document (.json or .toml) or preset name
    target: String,

    /// Settings overrides as a JSON object
    #[arg(long)]
    flags: Option<String>,

    /// Directory of unit manifests (repeatable)
    #[arg(long = "plugin-dir")]
    plugin_dirs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a config and print it as JSON
    Resolve {
        #[command(flatten)]
        args: ResolveArgs,

        /// Print a human-readable summary instead of JSON
        #[arg(long)]
        human: bool,
    },

    /// List built-in presets
    Presets {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the fingerprint of a resolved config
    Fingerprint {
        #[command(flatten)]
        args: ResolveArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Resolve { args, human } => {
            run_resolve(args, human);
        }
        Commands::Presets { json } => {
            run_presets(json);
        }
        Commands::Fingerprint { args } => {
            run_fingerprint(args);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_resolve(args: ResolveArgs, human: bool) {
    let config = resolve_or_exit(args);

    if human {
        println!("{}", config.to_human());
        return;
    }
    match config.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_presets(json_output: bool) {
    let resolver = match Resolver::new(ResolveOptions::default()) {
        Ok(resolver) => resolver,
        Err(e) => exit_with(e),
    };
    let names: Vec<&str> = resolver.presets().names().collect();

    if json_output {
        match serde_json::to_string_pretty(&names) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("Built-in presets ({} total):\n", names.len());
        for name in names {
            println!("  {}", name);
        }
    }
}

fn run_fingerprint(args: ResolveArgs) {
    let config = resolve_or_exit(args);

    match config.fingerprint() {
        Ok(fingerprint) => println!("{}", fingerprint),
        Err(e) => exit_with(e),
    }
}

fn resolve_or_exit(args: ResolveArgs) -> Config {
    let flags = match args.flags.as_deref().map(serde_json::from_str::<serde_json::Value>) {
        None => None,
        Some(Ok(flags)) => Some(flags),
        Some(Err(e)) => {
            eprintln!("Error parsing --flags: {}", e);
            process::exit(1);
        }
    };

    let options = ResolveOptions {
        flags,
        plugin_dirs: args.plugin_dirs,
        ..ResolveOptions::default()
    };
    let resolver = match Resolver::new(options) {
        Ok(resolver) => resolver,
        Err(e) => exit_with(e),
    };

    let result = if resolver.presets().contains(&args.target) {
        resolver.resolve_preset(&args.target)
    } else {
        resolver.resolve_file(&PathBuf::from(&args.target))
    };
    match result {
        Ok(config) => config,
        Err(e) => exit_with(e),
    }
}

fn exit_with(error: ConfigError) -> ! {
    eprintln!("Error ({} stage): {}", error.stage(), error);
    process::exit(1);
}
