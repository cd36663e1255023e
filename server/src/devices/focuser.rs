//! Simulated focuser: `focuser.status` and `focuser.move`

use super::{param, require_device, require_i64};
use lithium_dispatch::{CommandContext, CommandDispatcher, DispatchError};
use lithium_shared::CommandResponse;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEVICE_ID: &str = "focuser-sim";

#[derive(Debug, Clone)]
pub struct FocuserSettings {
    /// Highest absolute position, in steps
    pub max_position: i64,
    /// Steps covered per tick of simulated travel
    pub step_size: i64,
    pub step_delay: Duration,
}

impl Default for FocuserSettings {
    fn default() -> Self {
        Self {
            max_position: 50_000,
            step_size: 500,
            step_delay: Duration::from_millis(10),
        }
    }
}

#[derive(Debug)]
pub struct Focuser {
    settings: FocuserSettings,
    position: i64,
    /// Position before the last move, restored by undo
    previous: i64,
    moving: bool,
}

pub type SharedFocuser = Arc<RwLock<Focuser>>;

impl Focuser {
    pub fn shared(settings: FocuserSettings) -> SharedFocuser {
        Arc::new(RwLock::new(Self {
            settings,
            position: 0,
            previous: 0,
            moving: false,
        }))
    }

    fn status(&self) -> Value {
        json!({
            "deviceId": DEVICE_ID,
            "position": self.position,
            "maxPosition": self.settings.max_position,
            "moving": self.moving,
        })
    }
}

pub fn register(dispatcher: &CommandDispatcher, focuser: SharedFocuser) -> Result<(), DispatchError> {
    let status = focuser.clone();
    dispatcher.register("focuser.status", move |payload: Value, _ctx: CommandContext| {
        let focuser = status.clone();
        async move {
            param!(require_device(&payload, DEVICE_ID, "focuser"));
            let status = focuser.read().await.status();
            anyhow::Ok(CommandResponse::success(status))
        }
    })?;

    let forward = focuser.clone();
    let inverse = focuser;
    dispatcher.register_with_undo(
        "focuser.move",
        move |payload: Value, ctx: CommandContext| {
            let focuser = forward.clone();
            async move {
                param!(require_device(&payload, DEVICE_ID, "focuser"));
                let target = param!(require_i64(&payload, "position"));
                move_to(&focuser, target, &ctx).await
            }
        },
        move |payload: Value, ctx: CommandContext| {
            let focuser = inverse.clone();
            async move {
                param!(require_device(&payload, DEVICE_ID, "focuser"));
                // An explicit position wins over the remembered one
                let target = match payload.get("position").and_then(Value::as_i64) {
                    Some(position) => position,
                    None => focuser.read().await.previous,
                };
                move_to(&focuser, target, &ctx).await
            }
        },
    )?;

    info!("Focuser {} registered", DEVICE_ID);
    Ok(())
}

async fn move_to(
    focuser: &SharedFocuser,
    target: i64,
    ctx: &CommandContext,
) -> anyhow::Result<Value> {
    {
        let mut f = focuser.write().await;
        let max = f.settings.max_position;
        if !(0..=max).contains(&target) {
            return Ok(CommandResponse::invalid_parameter(
                "position",
                &format!("must be between 0 and {}", max),
            ));
        }
        if f.moving {
            return Ok(CommandResponse::device_busy(DEVICE_ID, Some("move")));
        }
        f.moving = true;
        f.previous = f.position;
    }

    let travelled = travel(focuser, target, ctx).await;

    let mut f = focuser.write().await;
    f.moving = false;
    match travelled {
        Ok(()) => {
            info!("Focuser moved {} -> {}", f.previous, f.position);
            Ok(CommandResponse::success(json!({
                "position": f.position,
                "previous": f.previous,
            })))
        }
        Err(e) => {
            warn!("Focuser stopped at {}: {}", f.position, e);
            Err(e)
        }
    }
}

/// Step towards `target` until it is reached or the move is cancelled
async fn travel(focuser: &SharedFocuser, target: i64, ctx: &CommandContext) -> anyhow::Result<()> {
    loop {
        if ctx.is_cancelled() {
            anyhow::bail!("move to {} interrupted", target);
        }

        let delay = {
            let mut f = focuser.write().await;
            let delta = target - f.position;
            if delta == 0 {
                return Ok(());
            }
            let step = f.settings.step_size;
            f.position += delta.clamp(-step, step);
            f.settings.step_delay
        };
        tokio::time::sleep(delay).await;
    }
}
