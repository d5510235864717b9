use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gatus_ingress_operator::controller::{
    notice_channel, pump_ingress_events, DryRunRelease, Helm, IngressSource, ReleaseMechanism,
    Reconciler,
};
use gatus_ingress_operator::settings::{self, ReleaseTarget, Settings};
use gatus_ingress_operator::Error;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Helm chart reference
    #[arg(long, env = "GATUS_CHART", default_value = settings::DEFAULT_CHART)]
    chart: String,

    /// URL of the chart repository
    #[arg(long, env = "GATUS_CHART_REPOSITORY", default_value = settings::DEFAULT_CHART_REPOSITORY)]
    chart_repository: String,

    /// Chart version to deploy
    #[arg(long, env = "GATUS_CHART_VERSION", default_value = settings::DEFAULT_CHART_VERSION)]
    chart_version: String,

    /// Namespace of the Gatus release
    #[arg(long, env = "GATUS_HELM_NAMESPACE", default_value = settings::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the Gatus release
    #[arg(long, env = "GATUS_HELM_RELEASE", default_value = settings::DEFAULT_RELEASE)]
    release: String,

    /// Extra chart values (YAML or JSON); config.endpoints and config.storage are ignored
    #[arg(long = "values", env = "GATUS_HELM_VALUES")]
    values: Option<String>,

    /// Path of the Gatus sqlite database
    #[arg(long, env = "GATUS_DB_FILE", default_value = settings::DEFAULT_DB_FILE)]
    db_file: PathBuf,

    /// File holding the last deployed configuration
    #[arg(long, env = "GATUS_TEMP_FILE", default_value = settings::DEFAULT_SNAPSHOT_FILE)]
    snapshot_file: PathBuf,

    /// Delay before re-checking after changes arrive during a deploy
    #[arg(long, env = "GATUS_DEBOUNCE_SECONDS", default_value_t = settings::DEFAULT_DEBOUNCE_SECONDS)]
    debounce_seconds: f64,

    /// Helm executable
    #[arg(long, env = "HELM_BINARY", default_value = "helm")]
    helm_binary: String,

    /// Log rendered values instead of running helm
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl RunArgs {
    fn into_settings(self) -> Result<Settings, Error> {
        let target = ReleaseTarget {
            chart: self.chart,
            chart_repository: self.chart_repository,
            chart_version: self.chart_version,
            namespace: self.namespace,
            release: self.release,
            helm_binary: self.helm_binary,
        };
        Settings::new(
            target,
            self.values,
            self.db_file,
            self.snapshot_file,
            self.debounce_seconds,
            self.dry_run,
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Gatus Ingress Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!(
        "Starting Gatus Ingress Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = args.into_settings()?;
    info!(
        "Managing release {}/{} from chart {} {}",
        settings.target.namespace,
        settings.target.release,
        settings.target.chart,
        settings.target.chart_version
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let ingresses: Api<Ingress> = Api::all(client);
    let source = IngressSource::new(ingresses.clone());

    let result = if settings.dry_run {
        run_reconciler(&settings, ingresses, source, DryRunRelease).await
    } else {
        let helm = Helm::new(settings.target.clone());
        run_reconciler(&settings, ingresses, source, helm).await
    };

    if let Err(e) = &result {
        error!("Operator stopped: {}", e);
    }
    result
}

async fn run_reconciler<R: ReleaseMechanism>(
    settings: &Settings,
    ingresses: Api<Ingress>,
    source: IngressSource,
    release: R,
) -> Result<(), Error> {
    let mut reconciler = Reconciler::new(settings, source, release);

    if let Err(e) = reconciler.start().await {
        error!("Failed to set up Helm repository: {}", e);
        return Err(e);
    }

    let (tx, rx) = notice_channel();
    let pump = tokio::spawn(pump_ingress_events(ingresses, tx));

    // An in-flight helm invocation is not interrupted; it finishes or dies with the process.
    let result = tokio::select! {
        result = reconciler.run(rx) => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping");
            Ok(())
        }
    };

    pump.abort();
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
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
