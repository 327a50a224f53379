use std::time::Duration;

use anyhow::Result;
use chrono::Datelike;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::http::DriveClient;
use crate::mirror::mirror_trees;
use crate::refresh::refresh_catalog;

/// Cycle cadence.
const REPEAT_INTERVAL: Duration = Duration::from_secs(4 * 3600);
/// Back-off after a failed cycle.
const FAIL_SLEEP: Duration = Duration::from_secs(1800);

/// Perpetual mirroring loop. The only place unknown errors are swallowed:
/// anything escaping a cycle is logged and answered with the back-off sleep.
pub async fn run_service(cfg: &Config) -> Result<()> {
    cfg.require_synchronize()?;

    // Long operations are deferred past the first iteration by pretending
    // they ran today.
    let mut refreshed_week = current_week();
    let mut hashes_checked_day = current_day();
    let mut compacted_day = current_day() - 1;

    loop {
        let outcome = run_cycle(
            cfg,
            &mut refreshed_week,
            &mut hashes_checked_day,
            &mut compacted_day,
        )
        .await;

        match outcome {
            Ok(()) => tokio::time::sleep(REPEAT_INTERVAL).await,
            Err(err) => {
                crate::logging::error(format!("cycle failed: {err:#}"));
                tokio::time::sleep(FAIL_SLEEP).await;
            }
        }
    }
}

async fn run_cycle(
    cfg: &Config,
    refreshed_week: &mut i64,
    hashes_checked_day: &mut i64,
    compacted_day: &mut i64,
) -> Result<()> {
    // A fresh client every cycle forces the token refresh; the probe
    // surfaces connectivity problems before any mutation.
    let client = DriveClient::new(&cfg.client_id, &cfg.client_secret, &cfg.token_path())?;
    let mut catalog = Catalog::open(&cfg.catalog_path())?;
    client.get_drives().await?;

    let today = current_day();
    let this_week = current_week();

    if *compacted_day != today {
        catalog.compact()?;
        *compacted_day = today;
    }

    if *refreshed_week != this_week {
        refresh_catalog(cfg, &client, &mut catalog).await?;
        *refreshed_week = this_week;
    }

    let check_hashes = hash_check_due(today, *hashes_checked_day, cfg.hash_check_days);
    let stats = mirror_trees(cfg, &client, &mut catalog, check_hashes).await?;
    if check_hashes {
        *hashes_checked_day = today;
    }
    catalog.commit()?;

    crate::logging::info(format!(
        "cycle complete: {} nodes, {} remote mutations, check_hashes={check_hashes}",
        stats.nodes, stats.remote_mutations
    ));
    Ok(())
}

fn hash_check_due(today: i64, last_checked: i64, every_days: i64) -> bool {
    let elapsed = today - last_checked;
    // Day-of-year wraps at new year.
    elapsed > every_days || elapsed < 0
}

/// Sunday-based week number, so weekly work starts on Sundays.
fn current_week() -> i64 {
    chrono::Local::now()
        .format("%U")
        .to_string()
        .parse()
        .unwrap_or(0)
}

fn current_day() -> i64 {
    chrono::Local::now().ordinal() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_check_waits_for_the_configured_gap() {
        assert!(!hash_check_due(10, 10, 3));
        assert!(!hash_check_due(13, 10, 3));
        assert!(hash_check_due(14, 10, 3));
    }

    #[test]
    fn hash_check_handles_year_wrap() {
        assert!(hash_check_due(2, 364, 3));
    }

    #[test]
    fn calendar_helpers_stay_in_range() {
        let week = current_week();
        assert!((0..=53).contains(&week));
        let day = current_day();
        assert!((1..=366).contains(&day));
    }
}
