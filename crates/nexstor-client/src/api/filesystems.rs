//! Filesystems

use super::{check_path, not_found, require};
use crate::client::Client;
use crate::ensure::{ensure_created, ensure_destroyed};
use crate::error::Result;
use crate::pagination::{
    SliceSource, Window, get_all, get_all_with_starting_token, validate_slice_args,
};
use crate::reaper::{DependentResource, DestroyParams, destroy_with_promotion};
use crate::transport::{build_uri, escape_segment};
use async_trait::async_trait;
use nexstor_common::{AclRuleSet, Filesystem, Snapshot};
use reqwest::Method;
use serde::Serialize;
use serde_json::json;

const FILESYSTEM_FIELDS: &str =
    "path,mountPoint,bytesAvailable,bytesUsed,sharedOverNfs,sharedOverSmb";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFilesystemParams {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_quota_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFilesystemParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_quota_size: Option<u64>,
}

/// Filesystem operations as seen by the walker and the reaper
#[derive(Debug, Clone, Copy)]
pub struct FilesystemOps<'a>(pub &'a Client);

#[async_trait]
impl SliceSource for FilesystemOps<'_> {
    type Record = Filesystem;

    // offset 0 is the parent filesystem itself
    const FIRST_OFFSET: usize = 1;

    async fn fetch_slice(
        &self,
        parent: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Filesystem>> {
        self.0.filesystems_slice(parent, limit, offset).await
    }
}

#[async_trait]
impl DependentResource for FilesystemOps<'_> {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    async fn destroy_once(&self, path: &str, destroy_snapshots: bool) -> Result<()> {
        let uri = build_uri(
            &format!("storage/filesystems/{}", escape_segment(path)),
            &[
                ("force", "true".to_string()),
                ("snapshots", destroy_snapshots.to_string()),
            ],
        );
        self.0.send_request(Method::DELETE, &uri, None).await?;
        Ok(())
    }

    async fn list_snapshots(&self, path: &str) -> Result<Vec<Snapshot>> {
        self.0.snapshots(path, true).await
    }

    async fn get_snapshot(&self, snapshot_path: &str) -> Result<Snapshot> {
        self.0.get_snapshot(snapshot_path).await
    }

    async fn promote(&self, clone_path: &str) -> Result<()> {
        self.0.promote_filesystem(clone_path).await
    }
}

impl Client {
    /// Filesystem by path; an empty result is a not-found error
    pub async fn get_filesystem(&self, path: &str) -> Result<Filesystem> {
        check_path(path)?;
        let uri = build_uri(
            "storage/filesystems",
            &[
                ("path", path.to_string()),
                ("fields", FILESYSTEM_FIELDS.to_string()),
            ],
        );
        self.get_list::<Filesystem>(&uri)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Filesystem '{path}' not found")))
    }

    pub async fn filesystem_available_capacity(&self, path: &str) -> Result<u64> {
        Ok(self.get_filesystem(path).await?.bytes_available)
    }

    /// Up to `limit` child filesystems of `parent` starting at `offset`
    ///
    /// The parent is listed first by the appliance and is filtered out; at
    /// offset 0 one extra record is requested to make up for it.
    pub async fn filesystems_slice(
        &self,
        parent: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Filesystem>> {
        validate_slice_args("filesystems_slice", limit)?;
        check_path(parent)?;

        let request_limit = if offset == 0 { limit + 1 } else { limit };
        let uri = build_uri(
            "storage/filesystems",
            &[
                ("parent", parent.to_string()),
                ("limit", request_limit.to_string()),
                ("offset", offset.to_string()),
                ("fields", FILESYSTEM_FIELDS.to_string()),
            ],
        );
        let mut filesystems = self.get_list::<Filesystem>(&uri).await?;
        filesystems.retain(|fs| fs.path != parent);
        filesystems.truncate(limit);
        Ok(filesystems)
    }

    /// All child filesystems of `parent`
    pub async fn filesystems(&self, parent: &str) -> Result<Vec<Filesystem>> {
        get_all(&FilesystemOps(self), parent).await
    }

    /// Child filesystems of `parent` after `starting_token`, at most `limit` (0 = all)
    pub async fn filesystems_with_starting_token(
        &self,
        parent: &str,
        starting_token: &str,
        limit: usize,
    ) -> Result<Window<Filesystem>> {
        get_all_with_starting_token(&FilesystemOps(self), parent, starting_token, limit).await
    }

    pub async fn create_filesystem(&self, params: &CreateFilesystemParams) -> Result<()> {
        check_path(&params.path)?;
        self.send_request(Method::POST, "storage/filesystems", Some(json!(params)))
            .await?;
        Ok(())
    }

    /// Create unless it exists; returns whether it was created now
    pub async fn ensure_filesystem_created(
        &self,
        params: &CreateFilesystemParams,
    ) -> Result<bool> {
        ensure_created(self.create_filesystem(params).await)
    }

    pub async fn update_filesystem(
        &self,
        path: &str,
        params: &UpdateFilesystemParams,
    ) -> Result<()> {
        check_path(path)?;
        let uri = format!("storage/filesystems/{}", escape_segment(path));
        self.send_request(Method::PUT, &uri, Some(json!(params)))
            .await?;
        Ok(())
    }

    /// Destroy without touching clones; a clone-held filesystem fails with `EEXIST`
    pub async fn destroy_filesystem(&self, path: &str, destroy_snapshots: bool) -> Result<()> {
        self.destroy_filesystem_with_params(
            path,
            DestroyParams {
                destroy_snapshots,
                promote_most_recent_clone_if_exists: false,
            },
        )
        .await
    }

    /// Destroy, promoting the most recent clone if one holds the filesystem
    pub async fn destroy_filesystem_with_clones(
        &self,
        path: &str,
        destroy_snapshots: bool,
    ) -> Result<()> {
        self.destroy_filesystem_with_params(
            path,
            DestroyParams {
                destroy_snapshots,
                promote_most_recent_clone_if_exists: true,
            },
        )
        .await
    }

    pub async fn destroy_filesystem_with_params(
        &self,
        path: &str,
        params: DestroyParams,
    ) -> Result<()> {
        check_path(path)?;
        destroy_with_promotion(&FilesystemOps(self), path, params).await
    }

    /// Destroy with snapshots and clone promotion; an absent filesystem is fine
    ///
    /// Returns whether the filesystem existed.
    pub async fn ensure_filesystem_destroyed(&self, path: &str) -> Result<bool> {
        ensure_destroyed(
            self.destroy_filesystem_with_params(
                path,
                DestroyParams {
                    destroy_snapshots: true,
                    promote_most_recent_clone_if_exists: true,
                },
            )
            .await,
        )
    }

    pub async fn promote_filesystem(&self, path: &str) -> Result<()> {
        check_path(path)?;
        let uri = format!("storage/filesystems/{}/promote", escape_segment(path));
        self.send_request(Method::POST, &uri, None).await?;
        Ok(())
    }

    /// Grant `everyone@` read or full access, inherited by files and directories
    pub async fn set_filesystem_acl(&self, path: &str, rule_set: AclRuleSet) -> Result<()> {
        require("filesystem path", path)?;
        let uri = format!("storage/filesystems/{}/acl", escape_segment(path));
        let body = json!({
            "type": "allow",
            "principal": "everyone@",
            "flags": ["file_inherit", "dir_inherit"],
            "permissions": [rule_set.permission()],
        });
        self.send_request(Method::POST, &uri, Some(body)).await?;
        Ok(())
    }
}
