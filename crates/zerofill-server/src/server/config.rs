use anyhow::{anyhow, bail};
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;
use zerofill::{DEFAULT_FILE_PREFIX, GIB, GeneratorConfig};

const MIB: usize = 1024 * 1024;

/// Runtime configuration for the `zerofill-server` binary.
///
/// Every flag can also be supplied through the environment (and therefore a
/// `.env` file). Defaults are suitable for a single-host deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "zerofill-server",
    version,
    about = "An HTTP service that streams the generation of zero-filled files"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,

    /// Directory that receives generated files and is served under
    /// `/all-files`. Created on startup if missing.
    ///
    /// Environment variable: `OUTPUT_DIR`
    #[arg(long, env = "OUTPUT_DIR", default_value = "public")]
    pub output_dir: PathBuf,

    /// Leading component of generated file names. Restricted to
    /// `[A-Za-z0-9_-]`.
    ///
    /// Environment variable: `FILE_PREFIX`
    #[arg(long, env = "FILE_PREFIX", default_value_t = String::from(DEFAULT_FILE_PREFIX))]
    pub file_prefix: String,

    /// Size of the shared zero chunk in MiB.
    ///
    /// This is the only buffer a job ever writes from, so it bounds the
    /// service's memory footprint regardless of the sizes requested. It also
    /// bounds cancellation latency to a single write.
    ///
    /// Environment variable: `CHUNK_SIZE_MIB`
    #[arg(long, env = "CHUNK_SIZE_MIB", default_value_t = 100)]
    pub chunk_size_mib: usize,

    /// Seconds between `in-progress` updates. `0` disables them.
    ///
    /// Environment variable: `PROGRESS_INTERVAL_SECS`
    #[arg(long, env = "PROGRESS_INTERVAL_SECS", default_value_t = 5)]
    pub progress_interval_secs: u64,

    /// Largest accepted request, in GiB.
    ///
    /// Environment variable: `MAX_SIZE_GIB`
    #[arg(long, env = "MAX_SIZE_GIB", default_value_t = 1024)]
    pub max_size_gib: u64,

    /// Capacity of the event buffer between a job and its response stream.
    ///
    /// Progress updates that do not fit are dropped rather than queued, so a
    /// slow reader never holds up the write loop.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight jobs before aborting them on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,

    /// `fsync` each file before reporting it done.
    ///
    /// Environment variable: `SYNC_DATA`
    #[arg(long, env = "SYNC_DATA", default_value_t = false)]
    pub sync_data: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub generator: GeneratorConfig,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.chunk_size_mib == 0 {
            bail!("CHUNK_SIZE_MIB must be greater than 0");
        }

        if args.max_size_gib == 0 {
            bail!("MAX_SIZE_GIB must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        let chunk_size = args
            .chunk_size_mib
            .checked_mul(MIB)
            .ok_or_else(|| anyhow!("Overflow in chunk size computation"))?;

        let max_total_bytes = args
            .max_size_gib
            .checked_mul(GIB)
            .ok_or_else(|| anyhow!("MAX_SIZE_GIB ({}) is too large", args.max_size_gib))?;

        let mut generator = GeneratorConfig::new(args.output_dir);
        generator.file_prefix = args.file_prefix;
        generator.chunk_size = chunk_size;
        generator.progress_interval = Duration::from_secs(args.progress_interval_secs);
        generator.max_total_bytes = max_total_bytes;
        generator.sync_data = args.sync_data;

        Ok(Self {
            server_addr: args.server_addr,
            generator,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
