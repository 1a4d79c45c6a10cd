#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Order Service
//!
//! > **Order records, their payment lifecycle, and the events that keep
//! > inventory in sync.**
//!
//! The service accepts new orders over RPC, lists them back, and listens on a
//! message bus for payment approvals. When an order is paid it tells the
//! inventory service which products to adjust.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Transactional Outbox
//!
//! A status change and the event it produces are written in **one**
//! transaction: the new status on the order row, the event in the outbox
//! table. Publishing happens after commit. This gives:
//! - **No lost events**: a crash or broker outage between commit and publish
//!   leaves the event pending, and the relay retries it.
//! - **No phantom events**: a rolled-back status change never publishes.
//! - **Per-order ordering**: events of one order are published in the order
//!   they committed, and a drain stops at the first failure. Events of
//!   different orders may interleave.
//!
//! The price is at-least-once delivery. Consumers must tolerate duplicates.
//!
//! ### Ports at the Edges
//!
//! Storage ([`store::OrderStore`]) and the bus ([`relay::Producer`],
//! [`relay::Consumer`]) are traits. Everything in between is generic over
//! them, so tests run against in-memory implementations and mocks while
//! production plugs in PostgreSQL and a real broker.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Type-Safe Error Handling
//! Each component defines its own error type (`StoreError`, `OrderError`,
//! `RelayError`, `DispatchError`, `SystemError`) with `thiserror`. `From`
//! conversions carry store failures up into controller errors.
//!
//! ### 2. Explicit Status Lifecycle
//! [`OrderStatus`](model::OrderStatus) is a closed enum with an explicit
//! transition table. Illegal moves are rejected; repeating the current status
//! is a no-op, so a redelivered approval neither re-advances nor re-publishes.
//!
//! ### 3. Concurrency Model
//! RPC calls run concurrently on the Tokio runtime. Two background tasks run
//! alongside them: the consumer dispatcher and the outbox relay. Both share
//! one `CancellationToken` and are joined on shutdown.
//!
//! ### 4. Observability
//! `tracing` everywhere with structured fields. See [`lifecycle::tracing`].
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Data ([`model`])
//! Orders, items, id newtypes, the status lifecycle and bus payloads.
//!
//! ### 2. The Storage ([`store`], [`outbox`])
//! - **Role**: Atomic persistence of orders and items; the outbox and its relay.
//! - **Key items**: [`OrderStore`](store::OrderStore), [`InMemoryOrderStore`](store::InMemoryOrderStore),
//!   [`OutboxRelay`](outbox::OutboxRelay).
//!
//! ### 3. The Rules ([`controller`], [`rpc`])
//! - **Role**: Validation, id generation, the status state machine, wire formatting.
//! - **Key items**: [`OrderController`](controller::OrderController), [`OrderRpc`](rpc::OrderRpc).
//!
//! ### 4. The Bus ([`relay`], [`dispatcher`])
//! - **Role**: Publish/consume contract and the loop routing inbound messages by key.
//! - **Key items**: [`ConsumerDispatcher`](dispatcher::ConsumerDispatcher),
//!   [`KakaoApproveHandler`](dispatcher::KakaoApproveHandler), [`MockProducer`](relay::mock::MockProducer).
//!
//! ### 5. The Orchestrator ([`lifecycle`])
//! - **Role**: Configuration, wiring, startup and graceful shutdown.
//! - **Key items**: [`ServiceConfig`](lifecycle::ServiceConfig), [`OrderSystem`](lifecycle::OrderSystem).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo on in-memory adapters
//! RUST_LOG=info cargo run
//!
//! # Run it against PostgreSQL
//! ORDER_DATABASE_URL=postgres://localhost/orders cargo run --features postgres
//!
//! # Run the tests
//! cargo test
//! ```

pub mod controller;
pub mod dispatcher;
pub mod lifecycle;
pub mod model;
pub mod outbox;
pub mod relay;
pub mod rpc;
pub mod store;
