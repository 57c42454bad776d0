//! psa-checker - find the least privileged Pod Security level for your workloads.
//!
//! This is the main entry point that:
//! - Parses flags and initializes structured logging on stderr
//! - Loads kubeconfig when checking live resources
//! - Wires Ctrl+C, SIGTERM and `--timeout` into a cancellation token
//! - Runs the checker and prints one line per object on stdout

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use psa_checker::checker::inspect::DEFAULT_INSPECT_TYPE;
use psa_checker::checker::{ClusterInspector, DEFAULT_CONCURRENCY, InspectOptions, InspectResults};
use psa_checker::output::{self, OutputFormat};
use psa_checker::{CheckResults, Checker, CheckerOptions, Error, KindRegistry};

/// Log directives used when RUST_LOG is not set
const DEFAULT_LOG_FILTER: &str = "psa_checker=warn,kube=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "psa-checker",
    version,
    about = "Get the least privileged Pod Security level for your workloads to keep running successfully"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Resources to check in the cluster: TYPE, TYPE NAME... or TYPE/NAME...
    resources: Vec<String>,

    /// Manifest file or directory to check; "-" reads stdin
    #[arg(short = 'f', long = "filename")]
    filenames: Vec<String>,

    /// Walk directories given with --filename recursively
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Namespace to read resources from, or to default manifests into
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Default empty namespaces in files to the --namespace value
    #[arg(long)]
    default_namespaces: bool,

    /// Path to the kubeconfig file
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Namespace to exempt from evaluation (repeatable)
    #[arg(long = "exempt-namespace", global = true)]
    exempt_namespaces: Vec<String>,

    /// RuntimeClass to exempt from evaluation (repeatable)
    #[arg(long = "exempt-runtime-class", global = true)]
    exempt_runtime_classes: Vec<String>,

    /// Give up after this long, e.g. 30s, 2m or 1m30s
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Number of objects evaluated at once
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Show per-level verdicts and reasons
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Log format for diagnostics on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report the strictest level each namespace could enforce without rejecting what it runs
    ClusterInspect {
        /// Resource type to evaluate in every namespace (repeatable)
        #[arg(long = "type", value_name = "TYPE", default_value = DEFAULT_INSPECT_TYPE)]
        resource_types: Vec<String>,
    },
}

/// What a run produced
enum Report {
    Objects(CheckResults),
    Namespaces(InspectResults),
}

impl Cli {
    fn inspect_options(&self, resource_types: &[String]) -> psa_checker::Result<InspectOptions> {
        if !self.filenames.is_empty() || !self.resources.is_empty() || self.default_namespaces {
            return Err(Error::Setup(vec![
                "cluster-inspect does not take --filename, --default-namespaces or resource arguments"
                    .to_string(),
            ]));
        }
        Ok(InspectOptions {
            namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            resource_types: resource_types.to_vec(),
            exempt_namespaces: self.exempt_namespaces.clone(),
            exempt_runtime_classes: self.exempt_runtime_classes.clone(),
            concurrency: self.concurrency,
        })
    }

    fn checker_options(&self) -> CheckerOptions {
        CheckerOptions {
            filenames: self.filenames.clone(),
            recursive: self.recursive,
            resource_args: self.resources.clone(),
            namespace: self.namespace.clone(),
            default_namespaces: self.default_namespaces,
            exempt_namespaces: self.exempt_namespaces.clone(),
            exempt_runtime_classes: self.exempt_runtime_classes.clone(),
            concurrency: self.concurrency,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Build a client from kubeconfig, honouring --kubeconfig and --context
async fn kube_client(cli: &Cli) -> psa_checker::Result<Client> {
    let options = KubeConfigOptions {
        context: cli.context.clone(),
        ..Default::default()
    };
    let config = match &cli.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &options).await?
        }
        None => Config::from_kubeconfig(&options).await?,
    };
    debug!(cluster = %config.cluster_url, namespace = %config.default_namespace, "Loaded kubeconfig");
    Ok(Client::try_from(config)?)
}

async fn run(cli: &Cli, cancel: &CancellationToken) -> psa_checker::Result<Report> {
    if let Some(Command::ClusterInspect { resource_types }) = &cli.command {
        let options = cli.inspect_options(resource_types)?;
        let inspector = ClusterInspector::new(options, kube_client(cli).await?)?;
        return Ok(Report::Namespaces(inspector.run(cancel).await?));
    }

    let options = cli.checker_options();

    // Local checks never contact a cluster
    let client = if options.is_local() {
        None
    } else {
        Some(kube_client(cli).await?)
    };

    let checker = Checker::new(options, client, KindRegistry::with_defaults())?;
    Ok(Report::Objects(checker.run(cancel).await?))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            warn!("Received shutdown signal, cancelling");
            cancel.cancel();
        });
    }
    if let Some(timeout) = cli.timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(timeout = %humantime::format_duration(timeout), "Timed out, cancelling");
            cancel.cancel();
        });
    }

    let written = match run(&cli, &cancel).await {
        Ok(Report::Objects(results)) => {
            output::write(&mut std::io::stdout().lock(), &results, cli.output, cli.verbose)
        }
        Ok(Report::Namespaces(results)) => output::write_namespaces(
            &mut std::io::stdout().lock(),
            &results,
            cli.output,
            cli.verbose,
        ),
        Err(e) => Err(e),
    };

    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn report(err: &Error) -> ExitCode {
    error!(error = %err, "Check failed");
    eprintln!("Error: {err}");
    if err.is_cancelled() {
        ExitCode::from(130)
    } else {
        ExitCode::FAILURE
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// If a handler cannot be installed that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
