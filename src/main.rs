use anyhow::Context;
use order_service::lifecycle::{setup_tracing, OrderSystem, ServiceConfig};
use order_service::model::{InventoryDiscount, KAKAO_APPROVE_KEY};
use order_service::relay::{self, Consumer, Producer};
use order_service::rpc::{GetAllOrdersRequest, InsertOrderRequest, OrderItemInput};
use order_service::store::{InMemoryOrderStore, OrderStore};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();

    let config = ServiceConfig::from_env();
    info!(?config, "Starting order service");

    run(config).await
}

#[cfg(feature = "postgres")]
async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    match config.database_url.clone() {
        Some(url) => {
            let store =
                order_service::store::PostgresOrderStore::connect(&url, &config.postgres).await?;
            store.install_schema().await?;
            run_demo(config, store).await
        }
        None => run_demo(config, InMemoryOrderStore::new()).await,
    }
}

#[cfg(not(feature = "postgres"))]
async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    if config.database_url.is_some() {
        warn!(
            "ORDER_DATABASE_URL is set but this build has no postgres support, \
             using the in-memory store"
        );
    }
    run_demo(config, InMemoryOrderStore::new()).await
}

async fn run_demo<S: OrderStore>(config: ServiceConfig, store: S) -> anyhow::Result<()> {
    // payment service -> order service, order service -> inventory service
    let (payments, inbound) = relay::memory::topic(config.bus_capacity);
    let (outbound, mut inventory) = relay::memory::topic(config.bus_capacity);

    let system = OrderSystem::start(&config, store, outbound, inbound);
    let controller = system.controller();

    let created = controller
        .insert_order(demo_request())
        .instrument(info_span!("order_creation"))
        .await?;
    info!(order_id = %created.id, "Order created");

    payments
        .publish(KAKAO_APPROVE_KEY, created.id.as_bytes())
        .await
        .context("publishing payment approval")?;

    let cancel = CancellationToken::new();
    let message = tokio::time::timeout(Duration::from_secs(5), inventory.consume(&cancel))
        .await
        .context("waiting for the inventory event")??;
    let discount = InventoryDiscount::from_json(&message.value)?;
    info!(
        key = %message.key,
        order_id = %discount.order_id,
        products = discount.product_ids.len(),
        "Inventory event received"
    );

    let listing = controller.get_all_orders(GetAllOrdersRequest::default()).await?;
    for order in &listing.orders {
        info!(
            order_id = %order.id,
            status = %order.status,
            paid_at = %order.paid_at,
            items = order.items.len(),
            "Order"
        );
    }

    if let Err(e) = system.shutdown().await {
        warn!(error = %e, "Shutdown was not clean");
        return Err(e.into());
    }

    info!("Application completed successfully");
    Ok(())
}

fn demo_request() -> InsertOrderRequest {
    InsertOrderRequest {
        user_id: "11111111-1111-1111-1111-111111111111".to_string(),
        order_number: "ORD-1".to_string(),
        total_price: 33_000,
        quantity: 3,
        payment_method: "kakaopay".to_string(),
        shipping_fee: 3_000,
        shipping_address: "12 Teheran-ro, Gangnam-gu, Seoul".to_string(),
        memo: "Leave at the door".to_string(),
        items: vec![
            OrderItemInput {
                product_id: "22222222-2222-2222-2222-222222222222".to_string(),
                product_name: "Ceramic mug".to_string(),
                product_price: 10_000,
                quantity: 2,
                product_options: r#"{"color":"white"}"#.to_string(),
            },
            OrderItemInput {
                product_id: "33333333-3333-3333-3333-333333333333".to_string(),
                product_name: "Drip kettle".to_string(),
                product_price: 10_000,
                quantity: 1,
                product_options: String::new(),
            },
        ],
        ..Default::default()
    }
}
