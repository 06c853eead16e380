use std::sync::Arc;

use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use async_trait::async_trait;
use clap::{crate_authors, crate_description, crate_version, Parser};
use futures::StreamExt;
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::Api;
use kube::runtime::{watcher, Controller};
use kube::Config;
use prometheus_client::registry::Registry;

use yuptime_crd::{
    ApiKey, LocalUser, MaintenanceWindow, Monitor, MonitorSet, NotificationPolicy,
    NotificationProvider, Silence, StatusPage, YuptimeSettings,
};
use yuptime_k8s_util::client::new_client_with_metrics;
use yuptime_operator::context::OperatorContext;
use yuptime_operator::delivery::run_worker;
use yuptime_operator::error::Error;
use yuptime_operator::metrics::Metrics;
use yuptime_operator::probe::{ProbeExecutor, ProbeResult};
use yuptime_operator::reconcile::{maintenance_window, monitor, notification, settings, silence};
use yuptime_operator::retention;
use yuptime_operator::scheduler::driver::Driver;
use yuptime_operator::scheduler::lease::LeaseGuard;
use yuptime_operator::sink::HttpDeliverySink;
use yuptime_operator::store::memory::MemoryStore;
use yuptime_operator::store::sqlite::SqliteStore;
use yuptime_operator::store::{MonitorState, Store};
use yuptime_operator::telemetry;

#[get("/metrics")]
async fn metrics(c: Data<Arc<OperatorContext>>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(c.metrics_text())
}

#[get("/healthz")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[derive(Parser, Debug)]
#[command(
    name = "yuptime-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    port: u32,

    /// Namespace the scheduler lease lives in when running in production mode.
    #[arg(long, env = "KUBE_NAMESPACE")]
    kube_namespace: Option<String>,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`.
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// `sqlite://path/to/file.db`, or omitted for the in-memory store.
    #[arg(long, env = "STORE_URL")]
    store_url: Option<String>,

    /// "production" enables the scheduler lease; anything else runs lease-less.
    #[arg(long, default_value = "development", env = "NODE_ENV")]
    node_env: String,
}

/// No probe transport is implemented by this operator; every check reports
/// `down`/`NOT_IMPLEMENTED` until a real executor is wired in.
struct UnimplementedProbeExecutor;

#[async_trait]
impl ProbeExecutor for UnimplementedProbeExecutor {
    async fn execute(&self, _monitor: &Monitor, _timeout_sec: u32) -> ProbeResult {
        ProbeResult {
            state: MonitorState::Down,
            latency_ms: 0.0,
            reason: "NOT_IMPLEMENTED".to_string(),
            message: "no probe transport is configured for this operator build".to_string(),
        }
    }
}

macro_rules! spawn_controller {
    ($client:expr, $ctx:expr, $kind:ty, $reconcile:path, $error_policy:path) => {{
        let api: Api<$kind> = Api::all($client.clone());
        let ctx = $ctx.clone();
        tokio::spawn(async move {
            Controller::new(api, watcher::Config::default().any_semantic())
                .shutdown_on_signal()
                .run($reconcile, $error_policy, ctx)
                .filter_map(|r| async move { r.ok() })
                .for_each(|_| futures::future::ready(()))
                .await;
        })
    }};
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(&args.log_filter, args.log_format, args.tracing_url.as_deref(), args.sample_ratio)
        .await?;

    let mut registry = Registry::with_prefix("yuptime");
    let config = Config::infer().await?;
    let client = new_client_with_metrics(config, &mut registry).await?;

    let store: Arc<dyn Store> = match &args.store_url {
        Some(url) => {
            let store = SqliteStore::connect(url)
                .await
                .map_err(|e| Error::ConfigFatal(e.to_string()))?;
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let metrics = Arc::new(Metrics::new(registry));
    let ctx = OperatorContext::new(client.clone(), store.clone(), metrics.clone());

    let lease = if args.node_env == "production" {
        let lease_namespace = args.kube_namespace.clone().unwrap_or_else(|| "default".to_string());
        let lease_api: Api<Lease> = Api::namespaced(client.clone(), &lease_namespace);
        let identity = format!("{}-{}", hostname(), std::process::id());
        Some(LeaseGuard::new(lease_api, "yuptime-scheduler", identity, 30))
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let driver = Driver::new(ctx.clone(), Arc::new(UnimplementedProbeExecutor), lease);
    let driver_handle = tokio::spawn(driver.run(shutdown_rx.clone()));

    let sink = Arc::new(HttpDeliverySink::default());
    let worker_handle = tokio::spawn(run_worker(store.clone(), sink, metrics.clone(), shutdown_rx.clone()));
    let retention_handle = tokio::spawn(retention::run_worker(ctx.clone(), shutdown_rx.clone()));

    let monitor_ctrl = spawn_controller!(client, ctx, Monitor, monitor::reconcile, monitor::error_policy);
    let silence_ctrl = spawn_controller!(client, ctx, Silence, silence::reconcile, silence::error_policy);
    let window_ctrl = spawn_controller!(
        client,
        ctx,
        MaintenanceWindow,
        maintenance_window::reconcile,
        maintenance_window::error_policy
    );
    let policy_ctrl = spawn_controller!(
        client,
        ctx,
        NotificationPolicy,
        notification::reconcile_policy,
        notification::error_policy_policy
    );
    let provider_ctrl = spawn_controller!(
        client,
        ctx,
        NotificationProvider,
        notification::reconcile_provider,
        notification::error_policy_provider
    );
    let settings_ctrl = spawn_controller!(
        client,
        ctx,
        YuptimeSettings,
        settings::reconcile_settings,
        settings::error_policy_settings
    );
    let monitor_set_ctrl = spawn_controller!(
        client,
        ctx,
        MonitorSet,
        settings::reconcile_monitor_set,
        settings::error_policy_monitor_set
    );
    let status_page_ctrl = spawn_controller!(
        client,
        ctx,
        StatusPage,
        settings::reconcile_status_page,
        settings::error_policy_status_page
    );
    let local_user_ctrl = spawn_controller!(
        client,
        ctx,
        LocalUser,
        settings::reconcile_local_user,
        settings::error_policy_local_user
    );
    let api_key_ctrl = spawn_controller!(client, ctx, ApiKey, settings::reconcile_api_key, settings::error_policy_api_key);

    let http_ctx = ctx.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(http_ctx.clone()))
            .wrap(middleware::Logger::default().exclude("/healthz"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    let server_handle = server.run();
    let shutdown_on_ctrlc = async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    };

    tokio::select! {
        _ = shutdown_on_ctrlc => {}
        res = server_handle => { res?; }
    }

    let _ = tokio::join!(
        driver_handle,
        worker_handle,
        retention_handle,
        monitor_ctrl,
        silence_ctrl,
        window_ctrl,
        policy_ctrl,
        provider_ctrl,
        settings_ctrl,
        monitor_set_ctrl,
        status_page_ctrl,
        local_user_ctrl,
        api_key_ctrl,
    );

    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "yuptime-operator".to_string())
}
