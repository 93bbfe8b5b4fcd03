use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rotator::db::postgres::PgDatabase;
use rotator::models::RotationEvent;
use rotator::vault::secrets_manager::SecretsManagerClient;
use rotator::{config, Rotator};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Rotate {
            secret_id,
            token,
            step,
        }) => {
            let rotator = build_rotator(&cfg)?;
            run_once(&rotator, RotationEvent::new(&secret_id, &token, &step)).await
        }
        Some(cli::Commands::Invoke { event }) => {
            let rotator = build_rotator(&cfg)?;
            let event = read_event(event)?;
            run_once(&rotator, event).await
        }
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(&cfg, port).await
        }
        None => run_server(&cfg, cfg.port).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// Logs go to stdout as text, or JSON lines when ROTATOR_LOG_FORMAT=json.
/// Spans are exported over OTLP when OTEL_EXPORTER_OTLP_ENDPOINT is set.
fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "pg-rotator"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json = std::env::var("ROTATOR_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rotator=info,tower_http=info".into()),
        ))
        .with(json_layer)
        .with(text_layer)
        .with(telemetry_layer)
        .init();
    Ok(())
}

fn build_rotator(cfg: &config::Config) -> anyhow::Result<Rotator> {
    let store = SecretsManagerClient::from_config(cfg)?;
    let db = PgDatabase::new(
        cfg.db_port,
        Duration::from_secs(cfg.db_connect_timeout_secs),
        cfg.ssl_mode()?,
    );
    Ok(Rotator::new(
        Arc::new(store),
        Arc::new(db),
        cfg.rotation_settings(),
    ))
}

fn read_event(path: Option<std::path::PathBuf>) -> anyhow::Result<RotationEvent> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading event file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading event from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("invalid rotation event")
}

async fn run_once(rotator: &Rotator, event: RotationEvent) -> anyhow::Result<()> {
    let outcome = rotator.rotate(&event).await?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

async fn run_server(cfg: &config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Initializing secret store client...");
    let service = Arc::new(build_rotator(cfg)?);

    let app = rotator::api::router(service)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("rotator listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows the scheduler's logs to be correlated with ours.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "request",
        request_id = %req_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut resp = next.run(req).instrument(span).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}
