//! # Helpdesk Relay Testing
//!
//! In-memory doubles for the collaborator seams of the relay:
//!
//! - [`InMemoryQueue`]: durable queue with settlement inspection
//! - [`InMemoryRelayBus`]: best-effort pub/sub relay
//! - [`RecordingMailTransport`]: captures outbound email
//! - [`StaticDirectory`]: fixed user id to address map
//!
//! ## Example
//!
//! ```ignore
//! use helpdesk_relay_testing::{InMemoryQueue, RecordingMailTransport};
//!
//! #[tokio::test]
//! async fn test_chat_message_is_mailed() {
//!     let queue = Arc::new(InMemoryQueue::new());
//!     let mail = RecordingMailTransport::new();
//!     // wire the consumer, publish, then:
//!     queue.wait_for_settlements("chat-events", 1, Duration::from_secs(1)).await;
//!     assert_eq!(mail.sent().len(), 1);
//! }
//! ```

pub mod directory;
pub mod mail;
pub mod queue;
pub mod relay;

pub use directory::StaticDirectory;
pub use mail::RecordingMailTransport;
pub use queue::{InMemoryQueue, Settlement};
pub use relay::InMemoryRelayBus;

/// Install a test tracing subscriber once. Respects `RUST_LOG`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
