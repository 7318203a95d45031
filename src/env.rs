use chain_notifier_push::{DynPusher, FcmConfig, FcmPusher, LogPusher};
use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{Resource, trace as sdktrace};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::chain::ChainEnv;
use crate::error::ConfigError;
use crate::ingest::IngestConfig;
use crate::scanner::ScannerConfig;
use crate::scheduler::SchedulerConfig;

const HYPERDX_ENDPOINT: &str = "https://in-otel.hyperdx.io/v1/traces";

#[derive(clap::ValueEnum, Debug, Clone)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct Env {
    #[clap(long = "db", env)]
    pub database_url: String,
    #[clap(long, env, default_value = "debug")]
    pub log_level: LogLevel,
    #[clap(flatten)]
    pub chain: ChainEnv,
    #[clap(flatten)]
    pub fcm: FcmConfig,
    /// Subscribers read per page while matching a block
    #[clap(long, env, default_value = "100000")]
    pub subscriber_page_size: u64,
    /// Skipped finalized blocks processed after a finality jump
    #[clap(long, env, default_value = "16")]
    pub max_catch_up_blocks: u64,
    /// Seconds between notification scheduler ticks
    #[clap(long, env, default_value = "60")]
    pub notification_interval: u64,
    #[clap(long, env, default_value = "10")]
    pub notification_initial_delay: u64,
    /// Minimum notification age in seconds before it is pushed
    #[clap(long, env, default_value = "30")]
    pub notification_grace_period: u64,
    #[clap(long, env, default_value = "15")]
    pub price_window_minutes: i64,
    #[clap(long, env, default_value = "8080")]
    pub server_port: u16,
    #[clap(long, env, default_value = "false")]
    pub dry_run: bool,
    /// HyperDX API key for telemetry export (optional)
    #[clap(long, env)]
    pub hyperdx_api_key: Option<String>,
    /// Service name for HyperDX identification
    #[clap(long, env, default_value = "chain-notifier")]
    pub hyperdx_service_name: String,
}

impl Env {
    pub async fn get_sqlite_pool(&self) -> Result<SqlitePool, sqlx::Error> {
        SqlitePool::connect(&self.database_url).await
    }

    pub const fn ingest_config(&self) -> IngestConfig {
        IngestConfig::from_minutes(self.price_window_minutes)
    }

    pub const fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            page_size: self.subscriber_page_size,
            max_catch_up: self.max_catch_up_blocks,
            ingest: self.ingest_config(),
        }
    }

    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.notification_interval),
            initial_delay: Duration::from_secs(self.notification_initial_delay),
            grace_period: Duration::from_secs(self.notification_grace_period),
        }
    }

    pub fn get_pusher(&self) -> Result<DynPusher, ConfigError> {
        if self.dry_run {
            return Ok(Arc::new(LogPusher::new()));
        }

        Ok(Arc::new(FcmPusher::try_from_config(&self.fcm)?))
    }
}

pub fn setup_tracing(env: &Env) {
    let level: Level = (&env.log_level).into();
    let default_filter = format!("chain_notifier={level},chain_notifier_push={level}");

    if let Some(ref api_key) = env.hyperdx_api_key {
        setup_tracing_with_hyperdx(default_filter, api_key, env.hyperdx_service_name.clone());
    } else {
        init_console_tracing(default_filter);
        tracing::warn!("No HYPERDX_API_KEY configured - running with console logging only");
    }
}

fn env_filter(default_filter: String) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into())
}

fn init_console_tracing(default_filter: String) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .compact()
        .init();
}

fn setup_tracing_with_hyperdx(default_filter: String, api_key: &str, service_name: String) {
    let resource = Resource::builder()
        .with_attributes(vec![
            KeyValue::new("service.name", service_name.clone()),
            KeyValue::new("deployment.environment", "production"),
        ])
        .build();

    let mut headers = std::collections::HashMap::new();
    headers.insert("authorization".to_string(), format!("Bearer {api_key}"));

    let key_prefix: String = api_key.chars().take(4).collect();
    println!("Setting up HyperDX OTLP exporter:");
    println!("  Endpoint: {HYPERDX_ENDPOINT}");
    println!("  Service: {service_name}");
    println!("  API Key: {key_prefix}...");

    let otlp_exporter = match SpanExporter::builder()
        .with_http()
        .with_endpoint(HYPERDX_ENDPOINT)
        .with_headers(headers)
        .with_http_client(reqwest::Client::new())
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("Failed to create OTLP exporter: {e}, falling back to console logging");
            init_console_tracing(default_filter);
            return;
        }
    };

    let tracer_provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer("chain-notifier");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let fmt_layer = tracing_subscriber::fmt::layer().compact();

    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    println!("Tracing initialized with console and HyperDX layers");
}
