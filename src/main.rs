use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smali_inject::config::Config;
use smali_inject::error::Error;
use smali_inject::inject::{InjectionReport, Injector};
use smali_inject::locate::{EntryPoint, locate};
use smali_inject::pipeline::{inject_entry, patch_file, search_tree};
use smali_inject::report::{format_json, format_summary};

#[derive(Parser)]
#[command(
    name = "smali-inject",
    about = "Make an app's entry class load a native library when constructed",
    version,
    after_help = "Workflow: disassemble the APK, run `smali-inject inject`, reassemble and sign."
)]
struct Cli {
    /// Log every step (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TreeArgs {
    /// Root of the decoded tree holding the smali partition directories.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Partition directory to search, in priority order (repeatable).
    /// Replaces the configured list.
    #[arg(long = "search-dir", value_name = "DIR")]
    search_dirs: Vec<String>,
}

#[derive(Args)]
struct InjectArgs {
    /// Native library to load, e.g. libfrida-gadget.so or frida-gadget.
    #[arg(long)]
    library: Option<String>,

    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the smali document defining CLASS without modifying anything.
    Locate {
        /// Fully-qualified entry class, e.g. com.example.MainActivity.
        class: String,

        #[command(flatten)]
        tree: TreeArgs,

        /// TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Inject into a single known smali document.
    Patch {
        /// Path to the .smali document.
        file: PathBuf,

        #[command(flatten)]
        inject: InjectArgs,
    },
    /// Locate CLASS under the decoded tree and inject into it, falling back
    /// to alternative targets if it can't be patched.
    Inject {
        /// Fully-qualified entry class, e.g. com.example.MainActivity.
        class: String,

        #[command(flatten)]
        tree: TreeArgs,

        #[command(flatten)]
        inject: InjectArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Locate {
            class,
            tree,
            config,
        } => cmd_locate(class, tree, config),
        Commands::Patch { file, inject } => cmd_patch(file, inject),
        Commands::Inject {
            class,
            tree,
            inject,
        } => cmd_inject(class, tree, inject),
    }
}

/// Load the config file and apply command-line overrides.
fn resolve_config(
    path: Option<&PathBuf>,
    library: Option<String>,
    search_dirs: Vec<String>,
) -> Result<Config, Error> {
    let mut config = Config::load_or_default(path)?;
    if let Some(library) = library {
        config.library = library;
    }
    if !search_dirs.is_empty() {
        config.search_dirs = search_dirs;
    }
    Ok(config)
}

fn cmd_locate(class: String, tree: TreeArgs, config: Option<PathBuf>) -> Result<(), Error> {
    let config = resolve_config(config.as_ref(), None, tree.search_dirs)?;
    let search = search_tree(&tree.root, &config);
    let path = locate(&search, &EntryPoint::new(class))?;
    anstream::println!("{}", path.display());
    Ok(())
}

fn cmd_patch(file: PathBuf, inject: InjectArgs) -> Result<(), Error> {
    let config = resolve_config(inject.config.as_ref(), inject.library, Vec::new())?;
    let injector = Injector::new().with_window(config.end_method_window);
    let report = patch_file(&file, &config.library, &injector)?;
    print_report(&report, inject.json)
}

fn cmd_inject(class: String, tree: TreeArgs, inject: InjectArgs) -> Result<(), Error> {
    let config = resolve_config(inject.config.as_ref(), inject.library, tree.search_dirs)?;
    if !tree.root.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("decoded tree does not exist: {}", tree.root.display()),
        )));
    }
    let report = inject_entry(&tree.root, &class, &config)?;
    print_report(&report, inject.json)
}

fn print_report(report: &InjectionReport, json: bool) -> Result<(), Error> {
    if json {
        anstream::print!("{}", format_json(report)?);
    } else {
        anstream::print!("{}", format_summary(report));
    }
    Ok(())
}
