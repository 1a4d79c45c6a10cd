//! # Observability & Tracing
//!
//! [`setup_tracing`] installs the process-wide subscriber: a compact
//! `tracing_subscriber::fmt` layer filtered by `RUST_LOG`.
//!
//! Module paths are hidden (`with_target(false)`). Log lines carry the
//! identifiers that matter as structured fields instead: `order_id`, `key`,
//! `event_id`.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Lifecycle, status changes and publish failures
//! RUST_LOG=info cargo run
//!
//! # Full request payloads and every routed message
//! RUST_LOG=debug cargo run
//!
//! # Only the outbox relay
//! RUST_LOG=order_service::outbox=debug cargo run
//! ```
//!
//! ## Debug Payloads
//!
//! Entry points log their whole input once, at debug level:
//!
//! ```rust,ignore
//! debug!(?request, "insert_order called");
//! ```
//!
//! With `RUST_LOG=info` a payment approval reads:
//!
//! ```text
//! INFO Payment approved order_id=5f0c...
//! INFO update_order_status: Order status updated order_id=5f0c... from=received to=paid event_id=1
//! ```
//!
//! A publish failure leaves the event in the outbox and shows up as:
//!
//! ```text
//! WARN drain: Publish failed, event stays pending event_id=1 key=inventory-discount attempts=1 error=...
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
