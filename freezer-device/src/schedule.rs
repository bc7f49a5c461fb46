use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::remote::Connection;
use crate::sampler::Sampler;
use crate::telemetry::publish;
use crate::util::interrupt::Interrupt;

/// Publish a reading every `interval` until interrupted.
///
/// The first reading is sent one interval after start. Ticks that are
/// missed because a send took too long are delayed rather than sent in a
/// burst. A failed send is logged and the loop moves on to the next tick.
///
/// The interrupt is authoritative: no reading is published once it has been
/// triggered, even when a tick had already fired. A send that is in progress
/// when the interrupt fires is allowed to finish.
///
/// Returns the number of readings that were published.
#[instrument(name = "telemetry", skip_all, fields(interval = ?interval))]
pub async fn run_telemetry<C>(
    connection: Arc<C>,
    sampler: Sampler,
    interval: Duration,
    interrupt: Interrupt,
) -> u64
where
    C: Connection + ?Sized,
{
    // an interval too long to represent never ticks
    let start = Instant::now()
        .checked_add(interval)
        .unwrap_or_else(far_future);
    let mut ticker = time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("started");
    let mut published: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = interrupt.wait() => break,
            _ = ticker.tick() => {}
        }

        let reading = sampler.sample();

        // the stop request may have raced with the tick
        if interrupt.is_triggered() {
            break;
        }

        match publish(connection.as_ref(), &reading).await {
            Ok(()) => published += 1,
            Err(e) => warn!("{e}"),
        }
    }
    debug!(published, "stopped");

    published
}

fn far_future() -> Instant {
    // roughly 30 years
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
