use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "regcache")]
#[command(about = "Read-through cache for package registry tarballs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "REGCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the cache server
    Serve(ServeArgs),

    /// Inspect or seed the local artifact store
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Default)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Directory artifacts are served from
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Upstream registry base URL
    #[arg(long)]
    pub origin: Option<String>,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Read a cached artifact without contacting the origin
    Get {
        /// Package name (e.g. left-pad or @types/node)
        package: String,

        /// File name (e.g. left-pad-1.0.0.tgz)
        file: String,

        /// Write the content here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Copy a local file into the cache
    Put {
        package: String,

        file: String,

        /// Local file to copy
        source: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the default config file location
    Path,
}
