//! Action modules shipped with the node binary.

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::time::Duration;

use super::registry::ActionRegistry;

pub fn register_builtin_actions(registry: &ActionRegistry) {
    registry.register("echo", |payload| async move { Ok(payload) });
    registry.register("sum", |payload| async move { sum(&payload) });
    registry.register("sleep", |payload| async move {
        let millis = payload.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    });
}

/// Adds up an array of numbers. Integers stay integers.
pub fn sum(payload: &Value) -> Result<Value> {
    let items = payload
        .as_array()
        .ok_or_else(|| anyhow!("sum expects an array of numbers"))?;

    if items.iter().all(Value::is_i64) {
        let total: i64 = items.iter().filter_map(Value::as_i64).sum();
        return Ok(json!(total));
    }

    let mut total = 0.0;
    for item in items {
        total += item
            .as_f64()
            .ok_or_else(|| anyhow!("sum expects numbers, got {}", item))?;
    }
    Ok(json!(total))
}
