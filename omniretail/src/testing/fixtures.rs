//! Canned records and registries for tests.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::{Context, ORDER_ID_KEY, PRODUCT_NAME_KEY};
use crate::providers::{Provider, ProviderRegistry, ProviderResult};

/// An order record as the order provider returns it.
#[must_use]
pub fn order_record(order_id: i64, product_name: &str) -> Value {
    json!({
        "order_id": order_id,
        "product_name": product_name,
        "status": "shipped",
        "order_date": "2024-01-15",
    })
}

/// A shipment record as the shipment provider returns it.
#[must_use]
pub fn shipment_record(order_id: i64, status: &str) -> Value {
    json!({
        "order_id": order_id,
        "tracking_number": format!("TRK{order_id:06}"),
        "current_status": status,
        "estimated_arrival": "2024-01-20",
    })
}

/// A successful order lookup that reports its identifier as a delta.
#[must_use]
pub fn resolved_order(order_id: i64, product_name: &str) -> ProviderResult {
    ProviderResult::success(vec![order_record(order_id, product_name)]).with_context_delta(
        Context::new()
            .with(ORDER_ID_KEY, order_id)
            .with(PRODUCT_NAME_KEY, product_name),
    )
}

/// Builds a registry from a list of providers.
#[must_use]
pub fn registry_of(providers: Vec<Arc<dyn Provider>>) -> ProviderRegistry {
    providers
        .into_iter()
        .fold(ProviderRegistry::new(), ProviderRegistry::with_provider)
}

