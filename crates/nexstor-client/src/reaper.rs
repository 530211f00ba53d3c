//! Destroying datasets that are held by dependent clones
//!
//! A filesystem or volume with a live clone of one of its snapshots refuses
//! deletion with `EEXIST`. Promoting the clone of the most recent snapshot
//! moves the snapshot chain to the clone and frees the original. Each
//! attempt is a fresh sequence of independent calls; nothing is rolled back.

use crate::error::{Error, Result};
use async_trait::async_trait;
use nexstor_common::Snapshot;
use tracing::{info, warn};

/// Promotion rounds tried after the first blocked destroy
pub const MAX_PROMOTION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyParams {
    /// Destroy the resource's snapshots along with it
    pub destroy_snapshots: bool,
    /// On `EEXIST`, promote the clone of the most recent snapshot and retry
    pub promote_most_recent_clone_if_exists: bool,
}

/// Operations the reaper needs from one kind of dataset
#[async_trait]
pub trait DependentResource: Send + Sync {
    /// Human-readable kind used in error messages
    fn kind(&self) -> &'static str;

    async fn destroy_once(&self, path: &str, destroy_snapshots: bool) -> Result<()>;

    /// Snapshots of `path` and its descendants; clones and txg may be missing
    async fn list_snapshots(&self, path: &str) -> Result<Vec<Snapshot>>;

    /// Full snapshot record including clones and creation txg
    async fn get_snapshot(&self, snapshot_path: &str) -> Result<Snapshot>;

    async fn promote(&self, clone_path: &str) -> Result<()>;
}

/// Destroy `path`, promoting blocking clones if asked to
///
/// Errors other than `EEXIST` from the first destroy are returned as is. After
/// [`MAX_PROMOTION_ATTEMPTS`] rounds the last error is returned, wrapped with
/// the resource path unless it is a classified appliance error.
#[tracing::instrument(skip(resource), fields(kind = resource.kind()))]
pub async fn destroy_with_promotion<R>(
    resource: &R,
    path: &str,
    params: DestroyParams,
) -> Result<()>
where
    R: DependentResource + ?Sized,
{
    let err = match resource.destroy_once(path, params.destroy_snapshots).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if !params.promote_most_recent_clone_if_exists || !err.is_already_exists() {
        return Err(err);
    }

    let mut last_err = err;
    for attempt in 1..=MAX_PROMOTION_ATTEMPTS {
        let snapshots = match resource.list_snapshots(path).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                last_err = Error::context(format!("failed to get snapshot list of '{path}'"), e);
                break;
            }
        };

        let candidate = match most_recent_clone(resource, &snapshots).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(attempt, error = %e, "snapshot changed while scanning, retrying");
                last_err = e;
                continue;
            }
        };

        if let Some(clone) = candidate {
            info!(attempt, %clone, "promoting clone");
            if let Err(e) = resource.promote(&clone).await {
                warn!(attempt, %clone, error = %e, "promotion failed");
                last_err = Error::context(format!("failed to promote clone '{clone}'"), e);
                continue;
            }
        }

        match resource.destroy_once(path, params.destroy_snapshots).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_already_exists() => last_err = e,
            Err(e) => {
                last_err = e;
                break;
            }
        }
    }

    if last_err.is_appliance_error() {
        return Err(last_err);
    }
    Err(Error::context(
        format!("failed to delete {} '{path}'", resource.kind()),
        last_err,
    ))
}

/// First clone of the snapshot with the greatest creation txg that has clones
///
/// Equal txgs keep the snapshot seen first. Txgs are assigned monotonically,
/// so a tie is not expected in practice.
async fn most_recent_clone<R>(resource: &R, snapshots: &[Snapshot]) -> Result<Option<String>>
where
    R: DependentResource + ?Sized,
{
    let mut best: Option<(u64, String)> = None;
    for listed in snapshots {
        let context = || format!("failed to get '{}' snapshot's info", listed.path);
        let detail = resource
            .get_snapshot(&listed.path)
            .await
            .map_err(|e| Error::context(context(), e))?;
        let txg = detail
            .creation_txg()
            .map_err(|e| Error::context(context(), e.into()))?;
        let Some(first_clone) = detail.clones.first() else {
            continue;
        };
        if best.as_ref().is_none_or(|(max, _)| txg > *max) {
            best = Some((txg, first_clone.clone()));
        }
    }
    Ok(best.map(|(_, clone)| clone))
}
