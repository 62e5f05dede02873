//! Link-conversion retry loop.
//!
//! The upstream host scans an upload before a mirror link becomes valid,
//! and bigger files take longer, so both the attempt count and the
//! per-attempt delay scale with the archive's size, under hard caps on
//! attempts and total wait. A terminal converter error or an exhausted
//! budget returns `None`: the caller keeps the raw upload link and the
//! item still counts as a publish success.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use packhaul_core::batch::ConvertRetrySettings;
use packhaul_core::ports::{ConvertPoll, LinkConverterPort};

use crate::progress::ProgressEstimator;

const GIB: u64 = 1024 * 1024 * 1024;

/// Attempts allowed for a file of this size.
pub(crate) fn attempts_for_size(settings: &ConvertRetrySettings, file_size_bytes: u64) -> u32 {
    let gib = u32::try_from(file_size_bytes / GIB).unwrap_or(u32::MAX);
    settings
        .base_attempts
        .saturating_add(settings.attempts_per_gib.saturating_mul(gib))
        .min(settings.max_attempts)
        .max(1)
}

/// Per-attempt delay for a file of this size.
pub(crate) fn delay_for_size(settings: &ConvertRetrySettings, file_size_bytes: u64) -> Duration {
    let gib = u32::try_from(file_size_bytes / GIB).unwrap_or(u32::MAX);
    settings
        .delay_per_gib
        .checked_mul(gib)
        .and_then(|scaled| settings.base_delay.checked_add(scaled))
        .unwrap_or(settings.max_delay)
        .min(settings.max_delay)
}

/// Try to convert `link` into a mirror link, polling until it is ready or
/// the size-scaled budget runs out. Cancellation is checked before every
/// attempt and on every wait tick.
pub(crate) async fn run(
    converter: &dyn LinkConverterPort,
    estimator: &ProgressEstimator,
    item: &str,
    link: &str,
    file_size_bytes: u64,
    settings: &ConvertRetrySettings,
    cancel: &CancellationToken,
) -> Option<String> {
    let attempts = attempts_for_size(settings, file_size_bytes);
    let delay = delay_for_size(settings, file_size_bytes);
    let mut total_waited = Duration::ZERO;

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            tracing::info!(item = %item, "Link conversion cancelled");
            return None;
        }

        match converter.convert(link, file_size_bytes, cancel).await {
            Ok(ConvertPoll::Ready(converted)) => {
                tracing::info!(item = %item, attempt, "Link converted");
                return Some(converted);
            }
            Ok(ConvertPoll::Pending) => {
                if attempt == attempts {
                    break;
                }
                if total_waited >= settings.max_total_wait {
                    tracing::info!(
                        item = %item,
                        waited_secs = total_waited.as_secs(),
                        "Link conversion wait budget exhausted"
                    );
                    return None;
                }
                if wait_with_countdown(estimator, item, delay, &mut total_waited, cancel)
                    .await
                    .is_err()
                {
                    return None;
                }
            }
            Err(e) => {
                // Terminal: the caller falls back to the raw link.
                tracing::warn!(item = %item, error = %e, "Link conversion failed");
                return None;
            }
        }
    }

    tracing::info!(item = %item, attempts, "Link not ready after all attempts");
    None
}

/// Sleep `delay` in one-second ticks, reporting a countdown through the
/// status stream and re-checking cancellation on every tick.
async fn wait_with_countdown(
    estimator: &ProgressEstimator,
    item: &str,
    delay: Duration,
    total_waited: &mut Duration,
    cancel: &CancellationToken,
) -> Result<(), ()> {
    let mut remaining = delay;
    while remaining > Duration::ZERO {
        estimator.converting(
            item,
            format!("Mirror link not ready, retrying in {}s", remaining.as_secs()),
        );
        let tick = remaining.min(Duration::from_secs(1));
        tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(()),
            () = tokio::time::sleep(tick) => {}
        }
        remaining -= tick;
        *total_waited += tick;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_scale_with_size_under_cap() {
        let settings = ConvertRetrySettings::default();
        let small = attempts_for_size(&settings, 100 * 1024 * 1024);
        let large = attempts_for_size(&settings, 5 * GIB);
        assert_eq!(small, settings.base_attempts);
        assert_eq!(large, settings.base_attempts + 5 * settings.attempts_per_gib);

        let huge = attempts_for_size(&settings, 500 * GIB);
        assert_eq!(huge, settings.max_attempts);
    }

    #[test]
    fn delay_scales_with_size_under_cap() {
        let settings = ConvertRetrySettings::default();
        let small = delay_for_size(&settings, 0);
        assert_eq!(small, settings.base_delay);

        let two_gib = delay_for_size(&settings, 2 * GIB);
        assert_eq!(two_gib, settings.base_delay + settings.delay_per_gib * 2);

        let huge = delay_for_size(&settings, 500 * GIB);
        assert_eq!(huge, settings.max_delay);
    }

    #[test]
    fn attempts_never_below_one() {
        let settings = ConvertRetrySettings {
            base_attempts: 0,
            attempts_per_gib: 0,
            ..ConvertRetrySettings::default()
        };
        assert_eq!(attempts_for_size(&settings, 0), 1);
    }
}
