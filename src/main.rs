//! Subscription Guardian server and operator CLI.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_guardian::adapters::http;
use subscription_guardian::application::handlers::billing::SyncPlanCommand;
use subscription_guardian::application::{BillingServices, SyncRun};
use subscription_guardian::bootstrap;
use subscription_guardian::config::AppConfig;
use subscription_guardian::domain::foundation::Timestamp;
use subscription_guardian::domain::subscription::BillingError;
use subscription_guardian::ports::{EventQuery, WebhookEventType};

/// Keeps user premium state consistent with Stripe
#[derive(Parser, Debug)]
#[command(name = "subscription-guardian")]
#[command(version)]
#[command(about = "Stripe subscription reconciliation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the periodic sync (default)
    Serve,

    /// Run one reconciliation cycle and print the report
    SyncOnce,

    /// Upsert a plan's Stripe product and price and record the ids
    SyncPlan {
        /// Plan id in the plan store
        plan_id: String,
    },

    /// Feed recent Stripe events through webhook processing
    ReplayEvents {
        /// How far back to look
        #[arg(long, default_value_t = 24)]
        since_hours: u32,

        /// Maximum number of events to fetch
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Validate the environment and exit non-zero on problems
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::SyncOnce => sync_once(&config).await,
        Command::SyncPlan { plan_id } => sync_plan(&config, plan_id).await,
        Command::ReplayEvents { since_hours, limit } => {
            replay_events(&config, since_hours, limit).await
        }
        Command::CheckConfig => return check_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "Command failed");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `LOG_LEVEL`, then the default filter. Production
/// logs are JSON lines.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_filter()));

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn serve(config: AppConfig) -> Result<(), BillingError> {
    let addr = config
        .server
        .socket_addr()
        .map_err(|e| BillingError::initialization(e.to_string()))?;
    let state = bootstrap::app_state(&config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_task = match state.services() {
        Ok(services) if config.sync.enabled => {
            let engine = services.sync().clone();
            Some(tokio::spawn(engine.run_periodic(shutdown_rx)))
        }
        Ok(_) => {
            tracing::info!("Periodic sync disabled");
            None
        }
        Err(_) => None,
    };

    let app = http::router(state, &config.server);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| BillingError::initialization(format!("bind {}: {}", addr, e)))?;
    tracing::info!(
        %addr,
        environment = config.server.environment.as_str(),
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BillingError::upstream(format!("server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = sync_task {
        let _ = task.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received");
}

async fn sync_once(config: &AppConfig) -> Result<(), BillingError> {
    let services = bootstrap::build_services(config)?;
    match services.sync().run_once().await? {
        SyncRun::Completed(report) => print_json(&report),
        SyncRun::AlreadyRunning => tracing::warn!("Sync already running"),
    }
    Ok(())
}

async fn sync_plan(config: &AppConfig, plan_id: String) -> Result<(), BillingError> {
    let services = bootstrap::build_services(config)?;
    let result = services
        .sync_plan_handler()
        .handle(SyncPlanCommand { plan_id })
        .await?;
    print_json(&serde_json::json!({
        "id": result.id,
        "name": result.name,
        "stripe_product_id": result.stripe_product_id,
        "stripe_price_id": result.stripe_price_id,
        "created": result.created,
    }));
    Ok(())
}

/// Events come from the authenticated API, so they skip signature checks.
/// Stripe lists newest first; they are replayed oldest first.
async fn replay_events(config: &AppConfig, since_hours: u32, limit: u32) -> Result<(), BillingError> {
    let services: BillingServices = bootstrap::build_services(config)?;
    let since = Timestamp::now().plus_secs(-(i64::from(since_hours) * 3600));
    let query = EventQuery {
        types: WebhookEventType::HANDLED.iter().map(|t| t.to_string()).collect(),
        created_after: Some(since),
        limit,
    };

    let mut events = services.ports().payments.list_events(query).await?;
    events.reverse();
    tracing::info!(count = events.len(), since = %since.to_rfc3339(), "Replaying events");

    let handler = services.webhook_handler();
    let mut failed = 0u32;
    for event in &events {
        match handler.dispatch(event).await {
            Ok(outcome) => {
                tracing::debug!(event_id = %event.id, event_type = event.event_type.as_str(), ?outcome, "Replayed")
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(event_id = %event.id, error = %e, "Replay failed");
            }
        }
    }

    print_json(&serde_json::json!({
        "replayed": events.len(),
        "failed": failed,
    }));
    Ok(())
}

fn check_config(config: &AppConfig) -> ExitCode {
    let missing = config.missing_required();
    for name in &missing {
        eprintln!("missing: {}", name);
    }
    match config.validate() {
        Ok(()) if missing.is_empty() => {
            println!("configuration ok ({})", config.server.environment.as_str());
            ExitCode::SUCCESS
        }
        Ok(()) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("invalid: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to render output"),
    }
}
