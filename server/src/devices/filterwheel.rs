//! Simulated filter wheel: `filterwheel.status` and `filterwheel.set`

use super::{param, require_device, require_i64};
use lithium_dispatch::{CommandContext, CommandDispatcher, DispatchError};
use lithium_shared::CommandResponse;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

pub const DEVICE_ID: &str = "filterwheel-sim";

#[derive(Debug, Clone)]
pub struct FilterWheelSettings {
    /// Filter name per slot
    pub filters: Vec<String>,
    /// Time to rotate by one slot
    pub slot_delay: Duration,
}

impl Default for FilterWheelSettings {
    fn default() -> Self {
        Self {
            filters: ["L", "R", "G", "B", "Ha", "OIII", "SII"]
                .into_iter()
                .map(String::from)
                .collect(),
            slot_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug)]
pub struct FilterWheel {
    settings: FilterWheelSettings,
    slot: usize,
    previous: usize,
    moving: bool,
}

pub type SharedFilterWheel = Arc<RwLock<FilterWheel>>;

impl FilterWheel {
    pub fn shared(settings: FilterWheelSettings) -> SharedFilterWheel {
        Arc::new(RwLock::new(Self {
            settings,
            slot: 0,
            previous: 0,
            moving: false,
        }))
    }

    fn filter_name(&self, slot: usize) -> &str {
        self.settings.filters.get(slot).map_or("", String::as_str)
    }

    fn status(&self) -> Value {
        json!({
            "deviceId": DEVICE_ID,
            "slot": self.slot,
            "filter": self.filter_name(self.slot),
            "filters": self.settings.filters,
            "moving": self.moving,
        })
    }
}

pub fn register(
    dispatcher: &CommandDispatcher,
    wheel: SharedFilterWheel,
) -> Result<(), DispatchError> {
    let status = wheel.clone();
    dispatcher.register("filterwheel.status", move |payload: Value, _ctx: CommandContext| {
        let wheel = status.clone();
        async move {
            param!(require_device(&payload, DEVICE_ID, "filterwheel"));
            let status = wheel.read().await.status();
            anyhow::Ok(CommandResponse::success(status))
        }
    })?;

    let forward = wheel.clone();
    let inverse = wheel;
    dispatcher.register_with_undo(
        "filterwheel.set",
        move |payload: Value, ctx: CommandContext| {
            let wheel = forward.clone();
            async move {
                param!(require_device(&payload, DEVICE_ID, "filterwheel"));
                let slot = param!(require_i64(&payload, "slot"));
                select_slot(&wheel, slot, &ctx).await
            }
        },
        move |payload: Value, ctx: CommandContext| {
            let wheel = inverse.clone();
            async move {
                param!(require_device(&payload, DEVICE_ID, "filterwheel"));
                let slot = match payload.get("slot").and_then(Value::as_i64) {
                    Some(slot) => slot,
                    None => wheel.read().await.previous as i64,
                };
                select_slot(&wheel, slot, &ctx).await
            }
        },
    )?;

    info!("Filter wheel {} registered", DEVICE_ID);
    Ok(())
}

async fn select_slot(
    wheel: &SharedFilterWheel,
    slot: i64,
    ctx: &CommandContext,
) -> anyhow::Result<Value> {
    let (slot, rotation) = {
        let mut w = wheel.write().await;
        let count = w.settings.filters.len();
        let slot = match usize::try_from(slot) {
            Ok(slot) if slot < count => slot,
            _ => {
                return Ok(CommandResponse::invalid_parameter(
                    "slot",
                    &format!("must be between 0 and {}", count.saturating_sub(1)),
                ))
            }
        };
        if w.moving {
            return Ok(CommandResponse::device_busy(DEVICE_ID, Some("set")));
        }

        w.moving = true;
        w.previous = w.slot;
        let distance = slot.abs_diff(w.slot) as u32;
        (slot, w.settings.slot_delay * distance)
    };

    let interrupted = tokio::select! {
        _ = tokio::time::sleep(rotation) => false,
        _ = ctx.cancelled() => true,
    };

    let mut w = wheel.write().await;
    w.moving = false;
    if interrupted {
        anyhow::bail!("rotation to slot {} interrupted", slot);
    }

    w.slot = slot;
    info!("Filter wheel at slot {} ({})", slot, w.filter_name(slot));
    Ok(CommandResponse::success(json!({
        "slot": slot,
        "filter": w.filter_name(slot),
        "previous": w.previous,
    })))
}
