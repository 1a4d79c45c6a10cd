use crate::controller::OrderController;
use crate::dispatcher::{ConsumerDispatcher, KakaoApproveHandler};
use crate::lifecycle::{ServiceConfig, SystemError};
use crate::outbox::OutboxRelay;
use crate::relay::{Consumer, Producer};
use crate::store::OrderStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The runtime orchestrator for the order service.
///
/// `OrderSystem` is responsible for:
/// - **Dependency Wiring**: building the controller on top of the store and
///   the outbox relay, and registering the inbound message handlers
/// - **Lifecycle Management**: running the consumer dispatcher and the
///   background outbox relay, and stopping both on shutdown
///
/// # Example
///
/// ```ignore
/// let config = ServiceConfig::from_env();
/// let system = OrderSystem::start(&config, InMemoryOrderStore::new(), producer, consumer);
///
/// let created = system.controller().insert_order(request).await?;
///
/// system.shutdown().await?;
/// ```
pub struct OrderSystem<S: OrderStore, P: Producer> {
    controller: Arc<OrderController<S, P>>,
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_timeout: Duration,
}

impl<S: OrderStore, P: Producer> OrderSystem<S, P> {
    /// Wires the components together and spawns the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<C: Consumer>(config: &ServiceConfig, store: S, producer: P, consumer: C) -> Self {
        let store = Arc::new(store);
        let outbox = Arc::new(OutboxRelay::new(store.clone(), producer, config.outbox_batch_size));
        let controller = Arc::new(OrderController::new(
            store,
            outbox.clone(),
            config.item_options_policy,
        ));

        let cancel = CancellationToken::new();

        let dispatcher = ConsumerDispatcher::new(consumer, cancel.child_token())
            .with_error_pause(config.consume_error_pause)
            .register(Arc::new(KakaoApproveHandler::new(controller.clone())));
        let dispatcher_handle = tokio::spawn(async move {
            dispatcher.run().await;
        });

        let relay_handle =
            tokio::spawn(outbox.run(cancel.child_token(), config.outbox_poll_interval));

        info!(
            options_policy = %config.item_options_policy,
            batch_size = config.outbox_batch_size,
            "Order system started"
        );

        Self {
            controller,
            cancel,
            handles: vec![("dispatcher", dispatcher_handle), ("outbox-relay", relay_handle)],
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn controller(&self) -> Arc<OrderController<S, P>> {
        self.controller.clone()
    }

    /// Gracefully shuts down the background tasks.
    ///
    /// Cancels the shared token, waits up to the configured timeout for each
    /// task, then makes one last attempt to flush the outbox.
    pub async fn shutdown(self) -> Result<(), SystemError> {
        info!("Shutting down system...");
        self.cancel.cancel();

        for (task, handle) in self.handles {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => debug!(task, "Task stopped"),
                Ok(Err(e)) => {
                    error!(task, error = %e, "Task failed");
                    return Err(SystemError::TaskFailed {
                        task,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    error!(task, timeout = ?self.shutdown_timeout, "Task did not stop in time");
                    return Err(SystemError::ShutdownTimeout(task));
                }
            }
        }

        if let Err(e) = self.controller.outbox().drain().await {
            warn!(error = %e, "Final outbox drain failed");
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
