//! Notification service: durable queues in, email (and live relay) out.

use crate::config::{BrokerConfig, Config, RelayConfig, ServicesConfig, SmtpSettings};
use crate::lifecycle::shutdown_signal;
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use helpdesk_relay_core::{DurableQueue, EventKind, MailTransport, QueueError, RelayBus};
use helpdesk_relay_notify::{
    ConsoleMailTransport, HttpRecipientDirectory, NotificationDispatcher, NotificationHandler,
    SmtpConfig, SmtpMailTransport,
};
use helpdesk_relay_redis::RedisRelayBus;
use helpdesk_relay_redpanda::RedpandaQueue;
use helpdesk_relay_runtime::{BrokerContext, BrokerState, EventConsumer};
use helpdesk_relay_web::handlers::health::health_check;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Run the notification service until a shutdown signal.
///
/// # Errors
///
/// Returns an error if the broker never becomes ready, a required SMTP server fails
/// verification, or the HTTP listener cannot be bound.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let broker = connect_broker(&config.broker);
    let transport = mail_transport(&config.smtp).await?;

    let mut dispatcher = NotificationDispatcher::new(transport);
    if let Some(directory) = recipient_directory(&config)? {
        dispatcher = dispatcher.with_directory(directory);
    }

    let mut handler = NotificationHandler::new(dispatcher);
    if let Some(bus) = relay_bus(&config.relay).await {
        handler = handler.with_relay(bus, config.relay.channel.clone());
    }
    let handler = Arc::new(handler);

    let listener = tokio::net::TcpListener::bind(config.server.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address()))?;
    info!(address = %config.server.bind_address(), "Health endpoint listening");

    let consumer = EventConsumer::builder()
        .broker(broker.clone())
        .ready_timeout(config.broker.ready_timeout)
        .route_with_fallback(
            config.broker.ticket_queue.clone(),
            EventKind::TicketCreated,
            handler.clone(),
        )
        .route_with_fallback(config.broker.chat_queue.clone(), EventKind::ChatMessage, handler)
        .build()?
        .start()
        .await
        .context("Event consumer failed to start")?;

    info!(
        ticket_queue = %config.broker.ticket_queue,
        chat_queue = %config.broker.chat_queue,
        workers = consumer.worker_count(),
        "Notification service started"
    );

    axum::serve(listener, health_router(broker))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping event consumer...");
    consumer.shutdown(config.server.shutdown_timeout).await?;
    info!("Graceful shutdown complete");
    Ok(())
}

/// Connect to the broker in the background with the configured retry policy.
///
/// Each attempt builds a client and probes the cluster, since building alone
/// never touches the network.
#[must_use]
pub fn connect_broker(config: &BrokerConfig) -> BrokerContext {
    let settings = config.clone();
    BrokerContext::connect(config.retry_policy(), move || {
        let settings = settings.clone();
        async move {
            let queue = RedpandaQueue::builder()
                .brokers(settings.brokers)
                .consumer_group(settings.consumer_group)
                .dead_letter_suffix(settings.dead_letter_suffix)
                .build()?;
            queue.probe().await?;
            Ok::<_, QueueError>(Arc::new(queue) as Arc<dyn DurableQueue>)
        }
    })
}

/// SMTP transport when a host is configured, console transport otherwise.
///
/// # Errors
///
/// Returns an error if the SMTP settings are invalid, or if verification fails
/// while `SMTP_REQUIRED` is set.
pub async fn mail_transport(settings: &SmtpSettings) -> anyhow::Result<Arc<dyn MailTransport>> {
    let Some(host) = &settings.host else {
        warn!("SMTP_HOST unset, emails are printed to the console");
        return Ok(Arc::new(ConsoleMailTransport::new()));
    };

    let mut smtp = SmtpConfig::new(host.clone(), settings.port, settings.from.clone())
        .with_timeout(settings.timeout);
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        smtp = smtp.with_credentials(username.clone(), password.expose());
    }
    let transport = SmtpMailTransport::new(smtp)?;

    match transport.verify().await {
        Ok(()) => {}
        Err(e) if settings.required => {
            return Err(e).context("SMTP verification failed and SMTP_REQUIRED is set");
        }
        Err(e) => warn!(error = %e, "SMTP verification failed, will retry on first send"),
    }
    Ok(Arc::new(transport))
}

fn recipient_directory(
    config: &Config,
) -> anyhow::Result<Option<Arc<HttpRecipientDirectory>>> {
    let ServicesConfig {
        users_service_url,
        service_name,
    } = &config.services;
    let Some(base_url) = users_service_url else {
        return Ok(None);
    };
    let Some(token) = &config.identity.service_token else {
        warn!("USERS_SERVICE_URL set without SERVICE_TOKEN, recipient lookup disabled");
        return Ok(None);
    };

    let directory = HttpRecipientDirectory::new(base_url.clone(), service_name.clone(), token.expose())?;
    info!(base_url = %base_url, "Recipient lookup enabled");
    Ok(Some(Arc::new(directory)))
}

async fn relay_bus(config: &RelayConfig) -> Option<Arc<dyn RelayBus>> {
    let url = config.redis_url.as_deref()?;
    match RedisRelayBus::new(url).await {
        Ok(bus) => Some(Arc::new(bus)),
        Err(e) => {
            warn!(error = %e, "Relay unavailable, live notifications disabled");
            None
        }
    }
}

/// `/health` (liveness) and `/health/ready` (broker connection state).
pub fn health_router(broker: BrokerContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(broker_readiness))
        .with_state(broker)
}

#[allow(clippy::unused_async)]
async fn broker_readiness(State(broker): State<BrokerContext>) -> (StatusCode, Json<Value>) {
    match broker.state() {
        BrokerState::Ready(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        BrokerState::Connecting { attempt } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "connecting", "attempt": attempt })),
        ),
        BrokerState::Failed { attempts, reason } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "failed", "attempts": attempts, "reason": reason })),
        ),
    }
}
