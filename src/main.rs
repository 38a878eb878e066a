use anyhow::Result;
use clap::Parser;
use ipkg_index::bundle::BundleTarget;
use ipkg_index::config::ScanConfig;
use ipkg_index::runtime::RealRuntime;
use ipkg_index::worker::DEFAULT_WORKERS;
use std::path::PathBuf;
use std::sync::Arc;

/// ipkg-index - index and condense opkg package repositories
///
/// Scans directories of `.ipk` archives and produces the `Packages` index
/// files package managers consume.
///
/// Examples:
///   ipkg-index --cache /var/cache/ipk scan /srv/packages
///   ipkg-index dump /srv/packages --json
///   ipkg-index condense stable testing --output bundle.zip --arch-subdirs
#[derive(Parser, Debug)]
#[command(author, version = env!("IPKG_INDEX_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Number of archives extracted at the same time
    #[arg(
        long,
        short = 'w',
        env = "IPKG_INDEX_WORKERS",
        default_value_t = DEFAULT_WORKERS,
        global = true
    )]
    workers: usize,

    /// Compute MD5 digests of scanned packages (default)
    #[arg(long, global = true, overrides_with = "no_md5")]
    md5: bool,

    /// Do not compute MD5 digests
    #[arg(long, global = true, overrides_with = "md5")]
    no_md5: bool,

    /// Compute SHA1 digests of scanned packages
    #[arg(long, global = true)]
    sha1: bool,

    /// Directory holding cached control files and published indexes
    #[arg(long, env = "IPKG_INDEX_CACHE", value_name = "DIR", global = true)]
    cache: Option<PathBuf>,
}

impl Cli {
    fn scan_config(&self) -> ScanConfig {
        let md5 = self.md5 || !self.no_md5;
        ScanConfig::new(self.workers, md5, self.sha1, self.cache.clone())
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Build and publish Packages, Packages.gz and Packages.stamps for every
    /// directory below a root
    Scan(ScanArgs),

    /// Print the package index of every directory below a root
    Dump(DumpArgs),

    /// Keep only the newest version of every package and bundle the result
    Condense(CondenseArgs),
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Directory containing the packages
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct DumpArgs {
    /// Directory containing the packages
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Print the package fields as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct CondenseArgs {
    /// Directories to collect packages from
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Bundle to write: *.zip, *.tar, *.tar.gz, *.tgz, or '-' to list names
    #[arg(long, short = 'o', value_name = "TARGET", default_value = "-")]
    pub output: BundleTarget,

    /// Place packages below a directory named after their architecture
    #[arg(long)]
    pub arch_subdirs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = cli.scan_config();
    let runtime = Arc::new(RealRuntime);
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Scan(args) => ipkg_index::commands::scan(runtime, &args.root, &config).await?,
        Commands::Dump(args) => {
            ipkg_index::commands::dump(runtime, &args.root, &config, args.json, &mut stdout).await?
        }
        Commands::Condense(args) => {
            ipkg_index::commands::condense(
                runtime,
                &args.roots,
                &args.output,
                args.arch_subdirs,
                &config,
                &mut stdout,
            )
            .await?
        }
    }
    Ok(())
}
