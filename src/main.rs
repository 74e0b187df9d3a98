use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use wirecall::commands::{self, Config, Settings, Verb, parse_key_value};
use wirecall::http::HttpError;

/// wirecall - envelope-aware HTTP client
///
/// Calls a backend that wraps every JSON body in {code, msg, data}, prints
/// the data on success and a readable error otherwise.
///
/// If the WIRECALL_TOKEN environment variable is set, it is sent as a bearer token.
///
/// Examples:
///   wirecall --base-url https://api.example.com get /orders page=2
///   wirecall post /orders --data '{"sku": "A-1"}'
///   wirecall upload /files report.pdf notes.txt --field folder=inbox
#[derive(Parser, Debug)]
#[command(author, version = env!("WIRECALL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Prefix for relative request paths (also via WIRECALL_BASE_URL)
    #[arg(long, env = "WIRECALL_BASE_URL", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Bearer token sent with every request (also via WIRECALL_TOKEN)
    #[arg(
        long,
        env = "WIRECALL_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        global = true
    )]
    token: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    timeout: Option<u64>,

    /// Retries for transient failures (408, 500, 502, 503, 504)
    #[arg(long, value_name = "N", global = true)]
    retries: Option<usize>,

    /// Suppress notifications and progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request
    Get(QueryArgs),

    /// Send a POST request
    Post(BodyArgs),

    /// Send a PUT request
    Put(BodyArgs),

    /// Send a PATCH request
    Patch(BodyArgs),

    /// Send a DELETE request
    Delete(QueryArgs),

    /// Download a file
    Download(DownloadArgs),

    /// Upload one or more files as multipart form data
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Path relative to the base URL, or an absolute URL
    url: String,

    /// Query parameters
    #[arg(value_name = "KEY=VALUE", value_parser = parse_key_value)]
    params: Vec<(String, String)>,
}

#[derive(clap::Args, Debug)]
struct BodyArgs {
    /// Path relative to the base URL, or an absolute URL
    url: String,

    /// JSON request body
    #[arg(long, short = 'd', value_name = "JSON")]
    data: Option<String>,
}

#[derive(clap::Args, Debug)]
struct DownloadArgs {
    /// Path relative to the base URL, or an absolute URL
    url: String,

    /// Query parameters
    #[arg(value_name = "KEY=VALUE", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// File name to save as (default: from the response)
    #[arg(long, short = 'o', value_name = "NAME")]
    output: Option<String>,

    /// Directory to save into (default: the user's download directory)
    #[arg(long, env = "WIRECALL_DOWNLOAD_DIR", value_name = "DIR")]
    dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct UploadArgs {
    /// Path relative to the base URL, or an absolute URL
    url: String,

    /// Files to upload
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Extra form fields
    #[arg(long = "field", short = 'f', value_name = "KEY=VALUE", value_parser = parse_key_value)]
    fields: Vec<(String, String)>,
}

impl Cli {
    fn settings(&self) -> Settings {
        let download_dir = match &self.command {
            Commands::Download(args) => args.dir.clone(),
            _ => None,
        };
        Settings {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            timeout_ms: self.timeout,
            retries: self.retries,
            download_dir,
            quiet: self.quiet,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let quiet = cli.quiet;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if !already_announced(&err, quiet) {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}

/// Unauthorized failures are announced by the session guard as they happen.
fn already_announced(err: &anyhow::Error, quiet: bool) -> bool {
    !quiet
        && err
            .downcast_ref::<HttpError>()
            .is_some_and(HttpError::is_unauthorized)
}

async fn run(cli: Cli) -> Result<()> {
    let runtime = wirecall::runtime::RealRuntime;
    let config = Config::new(runtime, cli.settings())?;

    match cli.command {
        Commands::Get(args) => {
            commands::request(&config, Verb::Get, &args.url, &args.params, None).await?
        }
        Commands::Delete(args) => {
            commands::request(&config, Verb::Delete, &args.url, &args.params, None).await?
        }
        Commands::Post(args) => {
            commands::request(&config, Verb::Post, &args.url, &[], args.data.as_deref()).await?
        }
        Commands::Put(args) => {
            commands::request(&config, Verb::Put, &args.url, &[], args.data.as_deref()).await?
        }
        Commands::Patch(args) => {
            commands::request(&config, Verb::Patch, &args.url, &[], args.data.as_deref()).await?
        }
        Commands::Download(args) => {
            commands::download(&config, &args.url, &args.params, args.output).await?
        }
        Commands::Upload(args) => {
            commands::upload(&config, &args.url, &args.files, &args.fields).await?
        }
    }
    Ok(())
}
