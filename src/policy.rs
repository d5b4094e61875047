//! Per-slave current allocation.
//!
//! Computes the next cap to advertise to one slave from the global cap, the
//! wiring limit and the slave's history. Carries the anti-flap guards (60 s
//! on/off holds, 10 s reduction throttle) and the 21.00 A spike that works
//! around a slave firmware bug: raising the cap without first holding
//! >= 21.00 A for >= 10 s makes the car droop to about 5.2 A.

use crate::clock::Timestamp;
use crate::constants::*;
use crate::registry::SlaveRegistry;
use crate::types::TwcId;
use log::{error, warn};
use std::time::Duration;

fn age(now: Timestamp, since: Option<Timestamp>) -> Duration {
    since.map_or(Duration::MAX, |t| now.since(t))
}

/// Compute and commit the next cap for `id`, returning the value to
/// advertise. The caller must have folded the slave's latest heartbeat into
/// its record first. `global_cap_ca` is clamped down to the wiring limit in
/// place when the power source overshoots it.
pub fn allocate(
    registry: &mut SlaveRegistry,
    id: TwcId,
    global_cap_ca: &mut i32,
    wiring_cap_a: i32,
    now: Timestamp,
) -> i32 {
    let wiring_ca = wiring_cap_a * 100;
    if *global_cap_ca > wiring_ca {
        warn!(
            "Global cap {} cA exceeds wiring limit {} cA, clamping",
            *global_cap_ca, wiring_ca
        );
        *global_cap_ca = wiring_ca;
    }

    let count = registry.len().max(1) as i32;
    let others = registry.sum_req_max_excluding(id);
    let Some(rec) = registry.get_mut(id) else {
        error!("Allocation requested for unknown slave {}", id);
        return 0;
    };

    let prev = rec.req_max_ca.unwrap_or(0);
    let actual = rec.actual_ca.unwrap_or(-1);
    let req_age = age(now, rec.req_max_changed_at);
    let draw_age = age(now, rec.actual_changed_at);

    let fair = *global_cap_ca / count;
    let mut desired;
    if fair < MIN_CHARGE_CA {
        // Not enough for a real charge; tell the car to stop, unless the cap
        // or draw moved recently or the car has not woken up yet. Cycling
        // the contactor on every cloud wears it out.
        desired = 0;
        if prev != 0
            && (req_age < ANTI_FLAP_HOLD || draw_age < ANTI_FLAP_HOLD || actual < LOW_DRAW_CA)
        {
            desired = prev;
        }
    } else {
        // Whole amps only above the threshold.
        desired = fair / 100 * 100;
        if prev == 0 && req_age < ANTI_FLAP_HOLD {
            // Recently told to stop; keep it off for the full hold.
            desired = 0;
        } else if desired < SPIKE_CA
            && (desired > prev || (prev - actual > DROOP_GAP_CA && draw_age > REDUCTION_HOLD))
        {
            desired = SPIKE_CA;
        } else if desired < prev && req_age < REDUCTION_HOLD {
            // Reductions no more often than every REDUCTION_HOLD; this also
            // keeps the spike up long enough to take effect.
            desired = prev;
        }
    }

    if desired != prev {
        if others + desired.max(0) > wiring_ca {
            error!(
                "Refusing cap {} cA for slave {}: fleet total {} cA would exceed wiring limit {} cA",
                desired,
                id,
                others + desired.max(0),
                wiring_ca
            );
            desired = prev;
        } else {
            rec.req_max_ca = Some(desired);
            rec.req_max_changed_at = Some(now);
        }
    }
    desired
}
