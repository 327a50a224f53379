use std::collections::VecDeque;

use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::http::{DriveClient, ThrottleError};

/// Commit cadence while ingesting the remote tree.
const COMMIT_EVERY: usize = 1000;

/// Full re-sync of the catalog from the remote.
///
/// Two-phase existence marking keeps interruptions safe: an aborted refresh
/// leaves the catalog incomplete but never falsely deletes live entries,
/// because the sweep only runs after the walk completes.
pub async fn refresh_catalog(
    cfg: &Config,
    client: &DriveClient,
    catalog: &mut Catalog,
) -> Result<()> {
    crate::logging::info("starting catalog refresh");
    catalog.mark_all_not_existing()?;

    let mut to_get: VecDeque<String> = VecDeque::new();
    for (remote_key, local_dir) in &cfg.synchronize {
        let key = remote_key.trim_matches('/');
        let Some(mut item) = client.get_by_path(key).await? else {
            anyhow::bail!("sync root {key} not found remotely");
        };
        item.local_path = Some(local_dir.clone());
        // Roots keep the configured remote path as their catalog name so
        // lookups and child upload targets work for nested keys too.
        item.name = key.to_string();
        if item.is_folder {
            to_get.push_back(item.remote_id.clone());
        }
        catalog.upsert(item);
    }
    catalog.commit().context("commit sync roots")?;

    let mut counter = 0usize;
    while let Some(parent_id) = to_get.front().cloned() {
        let children = match client.list_children(&parent_id).await {
            Ok(children) => children,
            Err(err) => match err.downcast_ref::<ThrottleError>() {
                Some(throttle) => {
                    crate::logging::info(format!("refresh {throttle}"));
                    throttle.sleep().await;
                    // Same parent again; nothing was consumed.
                    continue;
                }
                None => return Err(err),
            },
        };
        to_get.pop_front();

        for mut child in children {
            child.parent_id = Some(parent_id.clone());
            if child.is_folder {
                to_get.push_back(child.remote_id.clone());
            }
            catalog.upsert(child);

            counter += 1;
            if counter % COMMIT_EVERY == 0 {
                catalog.commit().context("refresh checkpoint")?;
            }
        }
    }

    let swept = catalog.sweep_not_existing()?;
    catalog.commit().context("commit refresh")?;
    catalog.compact()?;
    crate::logging::info(format!(
        "catalog refresh complete ({} items, {swept} swept)",
        catalog.len()
    ));
    Ok(())
}
