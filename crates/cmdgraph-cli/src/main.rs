//! Command-line interface for cmdgraph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdgraph_core::command::{CommandGraph, Dispatcher, SharedDispatcher, TaggedMethodBuilder};
use cmdgraph_core::config::{RegistrarConfig, RuntimeKind, defaults, json_logging};
use cmdgraph_core::extension::{
    BLOCKED_MODULES, CodePath, EntryInspection, ExtensionRegistrar, RegistrationReport,
};

/// cmdgraph - Load plugin commands into a dispatch tree.
#[derive(Parser, Debug)]
#[command(name = "cmdgraph")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Register every archive of a plugin directory and print the command tree.
    Scan {
        /// Plugin directory to walk.
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Module runtime (manifest or native).
        #[arg(short, long)]
        runtime: Option<RuntimeKind>,
        /// Print the registration report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the module entries of one archive.
    Inspect {
        /// Path to the archive.
        #[arg(required = true)]
        archive: PathBuf,
        /// Module runtime (manifest or native).
        #[arg(short, long)]
        runtime: Option<RuntimeKind>,
        /// Print the entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the names of modules that are never loaded.
    Blocklist,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Scan {
            dir,
            config,
            runtime,
            json,
        } => {
            let config = load_config(config.as_deref(), dir, runtime)?;
            run_scan(&config, json)
        }
        Command::Inspect {
            archive,
            runtime,
            json,
        } => {
            let config = load_config(None, None, runtime)?;
            run_inspect(&config, &archive, json)
        }
        Command::Blocklist => {
            for name in BLOCKED_MODULES {
                println!("{name}");
            }
            Ok(())
        }
    }
}

/// Log to stderr so that `--json` output stays parseable.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "cmdgraph=debug,cmdgraph_core=debug"
    } else {
        defaults::LOG_FILTER
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(default_filter)
            .add_directive(tracing::Level::WARN.into())
    });

    if json_logging() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(
    path: Option<&Path>,
    dir: Option<PathBuf>,
    runtime: Option<RuntimeKind>,
) -> Result<RegistrarConfig> {
    let mut config = match path {
        Some(path) => RegistrarConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RegistrarConfig::from_env()?,
    };
    if let Some(dir) = dir {
        config = config.with_plugin_dir(dir);
    }
    if let Some(runtime) = runtime {
        config = config.with_runtime(runtime);
    }
    Ok(config)
}

fn run_scan(config: &RegistrarConfig, json: bool) -> Result<()> {
    let graph = Arc::new(CommandGraph::new().with_builder(TaggedMethodBuilder::new()));
    let root = graph.commands();
    let registrar = ExtensionRegistrar::from_config(config, Arc::new(CodePath::new()));
    let report = registrar.scan(&config.plugin_dir, &root);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !report.root_exists {
        println!(
            "Plugin directory {} does not exist",
            config.plugin_dir.display()
        );
        return Ok(());
    }

    print_tree(&root.dispatcher(), 0);
    print_summary(&report);
    Ok(())
}

fn print_tree(dispatcher: &SharedDispatcher, depth: usize) {
    let dispatcher = dispatcher.read();
    for mapping in dispatcher.commands() {
        let description = mapping.callable().description().description;
        let aliases = mapping.aliases().join("|");
        match description {
            Some(text) => println!("{:indent$}{aliases}  {text}", "", indent = depth * 2),
            None => println!("{:indent$}{aliases}", "", indent = depth * 2),
        }
        if let Some(children) = mapping.callable().as_dispatcher() {
            print_tree(&children, depth + 1);
        }
    }
}

fn print_summary(report: &RegistrationReport) {
    println!();
    println!(
        "Registered {} module(s) from {} archive(s) in {} director(ies)",
        report.registered.len(),
        report.archives_found,
        report.directories_visited
    );
    for skipped in &report.skipped {
        println!(
            "  skipped {} in {}: {:?}",
            if skipped.entry.is_empty() {
                "<archive>"
            } else {
                skipped.entry.as_str()
            },
            skipped.archive.display(),
            skipped.reason
        );
    }
    if let Some(reason) = &report.aborted {
        println!("Registration stopped early: {reason}");
    }
}

fn run_inspect(config: &RegistrarConfig, archive: &Path, json: bool) -> Result<()> {
    let registrar = ExtensionRegistrar::from_config(config, Arc::new(CodePath::new()));
    let entries = registrar
        .inspect(archive)
        .with_context(|| format!("Failed to inspect {}", archive.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Archive: {}", archive.display());
    if entries.is_empty() {
        println!("No module entries for the {:?} runtime", config.runtime);
    }
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &EntryInspection) {
    let status = match (entry.resolved, entry.has_commands) {
        (true, true) => "commands",
        (true, false) => "no commands",
        (false, _) => "not loadable",
    };
    println!("{}  [{}]", entry.module, status);
    for aliases in &entry.commands {
        println!("  {}", aliases.join("|"));
    }
    if let Some(error) = &entry.error {
        println!("  error: {error}");
    }
}
