//! Simulated equatorial mount: `mount.status`, `mount.slew` and `mount.park`

use super::{param, require_device, require_f64};
use lithium_dispatch::{CommandContext, CommandDispatcher, DispatchError};
use lithium_shared::CommandResponse;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEVICE_ID: &str = "mount-sim";

/// Declination of the park position (celestial pole)
const PARK_DEC: f64 = 90.0;

#[derive(Debug, Clone)]
pub struct MountSettings {
    /// Ticks a slew is simulated in, regardless of distance
    pub slew_steps: u32,
    pub step_delay: Duration,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            slew_steps: 20,
            step_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
pub struct Mount {
    settings: MountSettings,
    /// Right ascension in hours
    ra: f64,
    /// Declination in degrees
    dec: f64,
    parked: bool,
    slewing: bool,
    tracking: bool,
}

pub type SharedMount = Arc<RwLock<Mount>>;

impl Mount {
    /// A parked mount
    pub fn shared(settings: MountSettings) -> SharedMount {
        Arc::new(RwLock::new(Self {
            settings,
            ra: 0.0,
            dec: PARK_DEC,
            parked: true,
            slewing: false,
            tracking: false,
        }))
    }

    fn status(&self) -> Value {
        json!({
            "deviceId": DEVICE_ID,
            "ra": self.ra,
            "dec": self.dec,
            "parked": self.parked,
            "slewing": self.slewing,
            "tracking": self.tracking,
        })
    }
}

pub fn register(dispatcher: &CommandDispatcher, mount: SharedMount) -> Result<(), DispatchError> {
    let status = mount.clone();
    dispatcher.register("mount.status", move |payload: Value, _ctx: CommandContext| {
        let mount = status.clone();
        async move {
            param!(require_device(&payload, DEVICE_ID, "mount"));
            let status = mount.read().await.status();
            anyhow::Ok(CommandResponse::success(status))
        }
    })?;

    let slew_mount = mount.clone();
    dispatcher.register("mount.slew", move |payload: Value, ctx: CommandContext| {
        let mount = slew_mount.clone();
        async move {
            param!(require_device(&payload, DEVICE_ID, "mount"));
            let ra = param!(require_f64(&payload, "ra"));
            let dec = param!(require_f64(&payload, "dec"));
            slew(&mount, ra, dec, &ctx).await
        }
    })?;

    dispatcher.register("mount.park", move |payload: Value, _ctx: CommandContext| {
        let mount = mount.clone();
        async move {
            param!(require_device(&payload, DEVICE_ID, "mount"));
            let park = match payload.get("park") {
                None => true,
                Some(value) => param!(value.as_bool().ok_or_else(|| {
                    CommandResponse::invalid_parameter("park", "expected a boolean")
                })),
            };
            set_parked(&mount, park).await
        }
    })?;

    info!("Mount {} registered", DEVICE_ID);
    Ok(())
}

async fn slew(mount: &SharedMount, ra: f64, dec: f64, ctx: &CommandContext) -> anyhow::Result<Value> {
    if !(0.0..24.0).contains(&ra) {
        return Ok(CommandResponse::invalid_parameter("ra", "must be within [0, 24) hours"));
    }
    if !(-90.0..=90.0).contains(&dec) {
        return Ok(CommandResponse::invalid_parameter("dec", "must be within [-90, 90] degrees"));
    }

    let (start_ra, start_dec, steps, delay) = {
        let mut m = mount.write().await;
        if m.parked {
            return Ok(CommandResponse::operation_failed("mount.slew", "mount is parked"));
        }
        if m.slewing {
            return Ok(CommandResponse::device_busy(DEVICE_ID, Some("slew")));
        }
        m.slewing = true;
        m.tracking = false;
        (m.ra, m.dec, m.settings.slew_steps.max(1), m.settings.step_delay)
    };

    info!("Slewing to RA {:.4}h Dec {:.4}°", ra, dec);
    for step in 1..=steps {
        if ctx.is_cancelled() {
            let mut m = mount.write().await;
            m.slewing = false;
            warn!("Slew aborted at RA {:.4}h Dec {:.4}°", m.ra, m.dec);
            anyhow::bail!("slew to RA {} Dec {} aborted", ra, dec);
        }

        tokio::time::sleep(delay).await;

        let fraction = f64::from(step) / f64::from(steps);
        let mut m = mount.write().await;
        m.ra = start_ra + (ra - start_ra) * fraction;
        m.dec = start_dec + (dec - start_dec) * fraction;
    }

    let mut m = mount.write().await;
    m.ra = ra;
    m.dec = dec;
    m.slewing = false;
    m.tracking = true;
    Ok(CommandResponse::success(json!({ "ra": m.ra, "dec": m.dec })))
}

async fn set_parked(mount: &SharedMount, park: bool) -> anyhow::Result<Value> {
    let mut m = mount.write().await;
    if m.slewing {
        return Ok(CommandResponse::device_busy(DEVICE_ID, Some("slew")));
    }

    m.parked = park;
    if park {
        m.ra = 0.0;
        m.dec = PARK_DEC;
        m.tracking = false;
    }
    info!("Mount {}", if park { "parked" } else { "unparked" });
    Ok(CommandResponse::success(json!({ "parked": m.parked })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::testing::{dispatcher, error_code};
    use lithium_dispatch::CommandStatus;

    fn fast() -> MountSettings {
        MountSettings {
            slew_steps: 4,
            step_delay: Duration::from_millis(1),
        }
    }

    async fn unpark(d: &CommandDispatcher) {
        d.dispatch("mount.park", json!({ "deviceId": DEVICE_ID, "park": false }), 0)
            .unwrap()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slew_requires_unpark() {
        let d = dispatcher();
        register(&d, Mount::shared(fast())).unwrap();
        let target = json!({ "deviceId": DEVICE_ID, "ra": 5.5, "dec": -5.4 });

        let reply = d.dispatch("mount.slew", target.clone(), 0).unwrap().await.unwrap();
        assert_eq!(error_code(&reply), Some("operation_failed"));

        unpark(&d).await;
        let reply = d.dispatch("mount.slew", target, 0).unwrap().await.unwrap();
        assert_eq!(reply["data"]["ra"], 5.5);
        assert_eq!(reply["data"]["dec"], -5.4);

        let status = d
            .dispatch("mount.status", json!({ "deviceId": DEVICE_ID }), 0)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(status["data"]["tracking"], true);
        assert_eq!(status["data"]["parked"], false);
    }

    #[tokio::test]
    async fn test_invalid_coordinates() {
        let d = dispatcher();
        register(&d, Mount::shared(fast())).unwrap();

        for (ra, dec) in [(json!(24.0), json!(0.0)), (json!(1.0), json!(91.0)), (json!("x"), json!(0))] {
            let reply = d
                .dispatch("mount.slew", json!({ "deviceId": DEVICE_ID, "ra": ra, "dec": dec }), 0)
                .unwrap()
                .await
                .unwrap();
            assert_eq!(error_code(&reply), Some("invalid_parameter"));
        }

        let reply = d
            .dispatch("mount.park", json!({ "deviceId": DEVICE_ID, "park": "yes" }), 0)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(error_code(&reply), Some("invalid_parameter"));
    }

    #[tokio::test]
    async fn test_cancelled_slew_stops_mount() {
        let d = dispatcher();
        let mount = Mount::shared(MountSettings {
            slew_steps: 50,
            step_delay: Duration::from_millis(10),
        });
        register(&d, mount.clone()).unwrap();
        unpark(&d).await;

        let handle = d
            .dispatch("mount.slew", json!({ "deviceId": DEVICE_ID, "ra": 12.0, "dec": 0.0 }), 0)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(d.cancel_command("mount.slew"));

        assert_eq!(handle.await, Err(DispatchError::Cancelled("mount.slew".into())));
        assert_eq!(d.get_command_status("mount.slew"), CommandStatus::Cancelled);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let m = mount.read().await;
        assert!(!m.slewing);
        assert!(m.ra > 0.0 && m.ra < 12.0);
    }

    #[tokio::test]
    async fn test_park_returns_to_pole() {
        let d = dispatcher();
        let mount = Mount::shared(fast());
        register(&d, mount.clone()).unwrap();
        unpark(&d).await;

        d.dispatch("mount.slew", json!({ "deviceId": DEVICE_ID, "ra": 3.0, "dec": 20.0 }), 0)
            .unwrap()
            .await
            .unwrap();
        let reply = d
            .dispatch("mount.park", json!({ "deviceId": DEVICE_ID }), 0)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(reply["data"]["parked"], true);

        let m = mount.read().await;
        assert_eq!(m.dec, PARK_DEC);
        assert!(!m.tracking);
    }
}
