//! Conversions between wire text and stored values.

use crate::controller::OrderError;
use crate::model::{Order, OrderItem};
use crate::rpc::{OrderItemView, OrderView};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

pub(crate) fn parse_id<T>(field: &'static str, raw: &str) -> Result<T, OrderError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.trim()
        .parse()
        .map_err(|e| OrderError::Validation(format!("{field} {raw:?} is not a valid UUID: {e}")))
}

/// Empty or unparseable text means "no timestamp".
pub(crate) fn parse_optional_time(field: &'static str, raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            debug!(field, raw, error = %e, "Treating unparseable timestamp as absent");
            None
        }
    }
}

pub(crate) fn parse_optional_text(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Parses product options. Empty text and JSON `null` mean "no options";
/// anything else must be a JSON object.
pub(crate) fn parse_product_options(raw: &str) -> Result<Option<Value>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(None),
        Ok(value @ Value::Object(_)) => Ok(Some(value)),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

pub(crate) fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn order_view(order: Order) -> OrderView {
    OrderView {
        id: order.id.to_string(),
        user_id: order.user_id.to_string(),
        order_number: order.order_number,
        status: order.status.to_string(),
        total_price: order.total_price,
        quantity: order.quantity,
        payment_method: order.payment_method,
        shipping_fee: order.shipping_fee,
        shipping_address: order.shipping_address,
        ordered_at: format_time(&order.ordered_at),
        paid_at: order.paid_at.as_ref().map(format_time).unwrap_or_default(),
        memo: order.memo.unwrap_or_default(),
        items: order.items.into_iter().map(item_view).collect(),
    }
}

fn item_view(item: OrderItem) -> OrderItemView {
    OrderItemView {
        id: item.id.to_string(),
        order_id: item.order_id.to_string(),
        product_id: item.product_id.to_string(),
        product_name: item.product_name,
        product_price: item.product_price,
        quantity: item.quantity,
        product_options: item
            .product_options
            .map(|options| options.to_string())
            .unwrap_or_default(),
    }
}
