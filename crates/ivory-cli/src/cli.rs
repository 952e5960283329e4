//! CLI argument definitions for Ivory.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ivory_ops::ops_report::ReportFormat;

#[derive(Parser, Debug)]
#[command(
    name = "ivory",
    version,
    about = "Transitive dependency resolution for module repositories",
    long_about = "Ivory resolves a module's dependency graph across filesystem and Maven \
                  repositories, settles version conflicts and downloads the retained artifacts."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to ivory.toml in the current directory or a parent)
    #[arg(long, global = true, env = "IVORY_SETTINGS")]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a module and download its artifacts
    Resolve {
        /// Module file (defaults to module.toml)
        #[arg(short, long)]
        module: Option<PathBuf>,
        /// Configurations to resolve (defaults to every public one)
        #[arg(short, long = "conf")]
        confs: Vec<String>,
        /// Resolve only, skip artifact downloads
        #[arg(long)]
        no_download: bool,
        /// Write XML reports into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Print the dependency tree
    Tree {
        /// Module file (defaults to module.toml)
        #[arg(short, long)]
        module: Option<PathBuf>,
        /// Configuration to show
        #[arg(short, long)]
        conf: Option<String>,
        /// Show evicted revisions
        #[arg(long)]
        evicted: bool,
        /// Show what depends on a module (org#name or name)
        #[arg(long)]
        invert: Option<String>,
        /// Show settled version conflicts
        #[arg(long)]
        conflicts: bool,
    },

    /// Write a resolve report
    Report {
        /// Module file (defaults to module.toml)
        #[arg(short, long)]
        module: Option<PathBuf>,
        /// Configurations to report (defaults to every public one)
        #[arg(short, long = "conf")]
        confs: Vec<String>,
        /// Output format: xml, json
        #[arg(long, default_value = "xml")]
        format: ReportFormat,
        /// Output directory (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List organisations, modules or revisions known to a resolver
    List {
        #[command(subcommand)]
        what: ListAction,
        /// Resolver to ask (defaults to the default resolver)
        #[arg(long, global = true)]
        resolver: Option<String>,
    },

    /// Show the effective settings
    Settings,
}

#[derive(Subcommand, Debug)]
pub enum ListAction {
    /// List organisations
    Orgs,
    /// List the modules of an organisation
    Modules { organisation: String },
    /// List the revisions of a module
    Revisions { organisation: String, module: String },
}

pub fn parse() -> Cli {
    Cli::parse()
}
