//! Handlers for inbound message keys.

use crate::controller::OrderController;
use crate::dispatcher::{DispatchError, MessageHandler};
use crate::model::{OrderId, OrderStatus, KAKAO_APPROVE_KEY};
use crate::relay::{Message, Producer};
use crate::store::OrderStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Marks an order `paid` once the payment service approves it.
///
/// The message value is the order id as plain text.
pub struct KakaoApproveHandler<S: OrderStore, P: Producer> {
    controller: Arc<OrderController<S, P>>,
}

impl<S: OrderStore, P: Producer> KakaoApproveHandler<S, P> {
    pub fn new(controller: Arc<OrderController<S, P>>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl<S: OrderStore, P: Producer> MessageHandler for KakaoApproveHandler<S, P> {
    fn key(&self) -> &'static str {
        KAKAO_APPROVE_KEY
    }

    async fn handle(&self, message: &Message) -> Result<(), DispatchError> {
        let text = message
            .value_str()
            .map_err(|e| DispatchError::Decode(format!("order id is not UTF-8: {e}")))?
            .trim();
        let order_id: OrderId = text
            .parse()
            .map_err(|e| DispatchError::Decode(format!("order id {text:?} is not a UUID: {e}")))?;

        info!(%order_id, "Payment approved");
        self.controller.update_order_status(order_id, OrderStatus::Paid).await?;
        Ok(())
    }
}
