//! Block volumes

use super::{check_path, not_found};
use crate::client::Client;
use crate::error::Result;
use crate::pagination::{
    SliceSource, Window, get_all, get_all_with_starting_token, validate_slice_args,
};
use crate::reaper::{DependentResource, DestroyParams, destroy_with_promotion};
use crate::transport::{build_uri, escape_segment};
use async_trait::async_trait;
use nexstor_common::{Snapshot, Volume, VolumeGroup};
use reqwest::Method;
use serde::Serialize;
use serde_json::json;

const VOLUME_FIELDS: &str = "path,bytesAvailable,bytesUsed,volumeSize";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeParams {
    pub path: String,
    pub volume_size: u64,
    pub sparse_volume: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVolumeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<u64>,
}

/// Volume operations as seen by the walker and the reaper
#[derive(Debug, Clone, Copy)]
pub struct VolumeOps<'a>(pub &'a Client);

#[async_trait]
impl SliceSource for VolumeOps<'_> {
    type Record = Volume;

    async fn fetch_slice(&self, parent: &str, limit: usize, offset: usize) -> Result<Vec<Volume>> {
        self.0.volumes_slice(parent, limit, offset).await
    }
}

#[async_trait]
impl DependentResource for VolumeOps<'_> {
    fn kind(&self) -> &'static str {
        "volume"
    }

    async fn destroy_once(&self, path: &str, destroy_snapshots: bool) -> Result<()> {
        let uri = build_uri(
            &format!("storage/volumes/{}", escape_segment(path)),
            &[("snapshots", destroy_snapshots.to_string())],
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
        self.0.promote_volume(clone_path).await
    }
}

impl Client {
    pub async fn get_volume(&self, path: &str) -> Result<Volume> {
        check_path(path)?;
        let uri = build_uri(
            "storage/volumes",
            &[
                ("path", path.to_string()),
                ("fields", VOLUME_FIELDS.to_string()),
            ],
        );
        self.get_list::<Volume>(&uri)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Volume '{path}' not found")))
    }

    pub async fn get_volume_group(&self, path: &str) -> Result<VolumeGroup> {
        check_path(path)?;
        let uri = build_uri(
            "storage/volumeGroups",
            &[
                ("path", path.to_string()),
                ("fields", "path,bytesAvailable,bytesUsed".to_string()),
            ],
        );
        self.get_list::<VolumeGroup>(&uri)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Volume group '{path}' not found")))
    }

    pub async fn volumes_slice(
        &self,
        parent: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Volume>> {
        validate_slice_args("volumes_slice", limit)?;
        check_path(parent)?;
        let uri = build_uri(
            "storage/volumes",
            &[
                ("parent", parent.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("fields", VOLUME_FIELDS.to_string()),
            ],
        );
        self.get_list(&uri).await
    }

    /// All volumes in volume group `parent`
    pub async fn volumes(&self, parent: &str) -> Result<Vec<Volume>> {
        get_all(&VolumeOps(self), parent).await
    }

    pub async fn volumes_with_starting_token(
        &self,
        parent: &str,
        starting_token: &str,
        limit: usize,
    ) -> Result<Window<Volume>> {
        get_all_with_starting_token(&VolumeOps(self), parent, starting_token, limit).await
    }

    pub async fn create_volume(&self, params: &CreateVolumeParams) -> Result<()> {
        check_path(&params.path)?;
        self.send_request(Method::POST, "storage/volumes", Some(json!(params)))
            .await?;
        Ok(())
    }

    pub async fn update_volume(&self, path: &str, params: &UpdateVolumeParams) -> Result<()> {
        check_path(path)?;
        let uri = format!("storage/volumes/{}", escape_segment(path));
        self.send_request(Method::PUT, &uri, Some(json!(params)))
            .await?;
        Ok(())
    }

    pub async fn destroy_volume(&self, path: &str, destroy_snapshots: bool) -> Result<()> {
        self.destroy_volume_with_params(
            path,
            DestroyParams {
                destroy_snapshots,
                promote_most_recent_clone_if_exists: false,
            },
        )
        .await
    }

    pub async fn destroy_volume_with_params(
        &self,
        path: &str,
        params: DestroyParams,
    ) -> Result<()> {
        check_path(path)?;
        destroy_with_promotion(&VolumeOps(self), path, params).await
    }

    pub async fn promote_volume(&self, path: &str) -> Result<()> {
        check_path(path)?;
        let uri = format!("storage/volumes/{}/promote", escape_segment(path));
        self.send_request(Method::POST, &uri, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::scripted_client;

    #[tokio::test]
    async fn test_volumes_walk_from_offset_zero() {
        let (client, transport) = scripted_client();
        transport.reply(200, r#"{"data":[{"path":"pool/vg/v1","volumeSize":1024}]}"#);

        let volumes = client.volumes("pool/vg").await.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].volume_size, 1024);
        assert_eq!(
            transport.paths()[0],
            "storage/volumes?fields=path%2CbytesAvailable%2CbytesUsed%2CvolumeSize&limit=99&offset=0&parent=pool%2Fvg"
        );
    }

    #[tokio::test]
    async fn test_volume_window() {
        let (client, transport) = scripted_client();
        transport.reply(
            200,
            r#"{"data":[{"path":"pool/vg/a"},{"path":"pool/vg/b"},{"path":"pool/vg/c"}]}"#,
        );

        let window = client
            .volumes_with_starting_token("pool/vg", "pool/vg/a", 1)
            .await
            .unwrap();
        assert_eq!(window.items.len(), 1);
        assert_eq!(window.items[0].path, "pool/vg/b");
        assert_eq!(window.next_token, "pool/vg/b");
    }

    #[tokio::test]
    async fn test_destroy_volume_query_has_no_force() {
        let (client, transport) = scripted_client();
        transport.reply(200, "");

        client.destroy_volume("pool/vg/v1", true).await.unwrap();
        assert_eq!(
            transport.paths(),
            vec!["storage/volumes/pool%2Fvg%2Fv1?snapshots=true"]
        );
    }

    #[tokio::test]
    async fn test_volume_reaper_promotes_volume_clone() {
        let (client, transport) = scripted_client();
        transport.reply(500, r#"{"code":"EEXIST","message":"has clones"}"#);
        transport.reply(200, r#"{"data":[{"path":"pool/vg/v1@s"}]}"#);
        transport.reply(200, r#"{"clones":["pool/vg/v2"],"creationTxg":"7"}"#);
        transport.reply(200, "");
        transport.reply(200, "");

        client
            .destroy_volume_with_params(
                "pool/vg/v1",
                DestroyParams {
                    destroy_snapshots: true,
                    promote_most_recent_clone_if_exists: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            transport.paths()[3],
            "storage/volumes/pool%2Fvg%2Fv2/promote"
        );
    }

    #[tokio::test]
    async fn test_get_volume_group_not_found() {
        let (client, transport) = scripted_client();
        transport.reply(200, r#"{"data":[]}"#);
        let err = client.get_volume_group("pool/vg").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
