//! CLI argument parsing for tracebench

use clap::Parser;
use std::path::PathBuf;

/// TraceBench - controller-driven tracer load generator
#[derive(Parser, Debug)]
#[command(
    name = "tb",
    author,
    version,
    about = "Runs tracer benchmark experiments handed out by a controller",
    long_about = None
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Override controller base URL
    #[arg(long, value_name = "URL")]
    pub controller_url: Option<String>,

    /// Override collector base URL
    #[arg(long, value_name = "URL")]
    pub collector_url: Option<String>,
}
