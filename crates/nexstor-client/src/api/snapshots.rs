//! Snapshots and clones

use super::check_path;
use crate::client::Client;
use crate::ensure::ensure_destroyed;
use crate::error::{Error, Result};
use crate::transport::{build_uri, escape_segment};
use nexstor_common::Snapshot;
use reqwest::Method;
use serde::Serialize;
use serde_json::json;

const SNAPSHOT_LIST_FIELDS: &str = "path,name,parent,creationTime";
const SNAPSHOT_DETAIL_FIELDS: &str = "path,name,parent,creationTime,clones,creationTxg";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSnapshotParams {
    pub target_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_quota_size: Option<u64>,
}

fn check_snapshot_path(path: &str) -> Result<()> {
    if !check_path(path)?.is_snapshot() {
        return Err(Error::invalid_argument(format!(
            "'{path}' is not a snapshot path (expected <dataset>@<name>)"
        )));
    }
    Ok(())
}

impl Client {
    /// Snapshot `path` (`<dataset>@<name>`)
    pub async fn create_snapshot(&self, path: &str) -> Result<()> {
        check_snapshot_path(path)?;
        let body = json!({ "path": path });
        self.send_request(Method::POST, "storage/snapshots", Some(body))
            .await?;
        Ok(())
    }

    /// Full snapshot record including clones and creation txg
    pub async fn get_snapshot(&self, path: &str) -> Result<Snapshot> {
        check_snapshot_path(path)?;
        let uri = build_uri(
            &format!("storage/snapshots/{}", escape_segment(path)),
            &[("fields", SNAPSHOT_DETAIL_FIELDS.to_string())],
        );
        self.send_request_with_struct(Method::GET, &uri, None).await
    }

    /// Snapshots of `parent`, and of its descendants if `recursive`
    ///
    /// List records carry no clones or creation txg.
    pub async fn snapshots(&self, parent: &str, recursive: bool) -> Result<Vec<Snapshot>> {
        check_path(parent)?;
        let uri = build_uri(
            "storage/snapshots",
            &[
                ("parent", parent.to_string()),
                ("fields", SNAPSHOT_LIST_FIELDS.to_string()),
                ("recursive", recursive.to_string()),
            ],
        );
        self.get_list(&uri).await
    }

    pub async fn destroy_snapshot(&self, path: &str) -> Result<()> {
        check_snapshot_path(path)?;
        let uri = format!("storage/snapshots/{}", escape_segment(path));
        self.send_request(Method::DELETE, &uri, None).await?;
        Ok(())
    }

    /// Destroy unless already gone; returns whether it existed
    pub async fn ensure_snapshot_destroyed(&self, path: &str) -> Result<bool> {
        ensure_destroyed(self.destroy_snapshot(path).await)
    }

    /// Create a filesystem or volume from a snapshot
    pub async fn clone_snapshot(&self, path: &str, params: &CloneSnapshotParams) -> Result<()> {
        check_snapshot_path(path)?;
        check_path(&params.target_path)?;
        let uri = format!("storage/snapshots/{}/clone", escape_segment(path));
        self.send_request(Method::POST, &uri, Some(json!(params)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::scripted_client;

    #[tokio::test]
    async fn test_snapshot_paths_are_validated() {
        let (client, transport) = scripted_client();
        let err = client.create_snapshot("pool/fs").await.unwrap_err();
        assert!(err.is_validation());
        assert!(client.get_snapshot("").await.unwrap_err().is_validation());
        assert!(transport.paths().is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_list_query() {
        let (client, transport) = scripted_client();
        transport.reply(
            200,
            r#"{"data":[{"path":"pool/fs@a","name":"a","parent":"pool/fs"}]}"#,
        );

        let list = client.snapshots("pool/fs", false).await.unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].clones.is_empty());
        assert_eq!(
            transport.paths()[0],
            "storage/snapshots?fields=path%2Cname%2Cparent%2CcreationTime&parent=pool%2Ffs&recursive=false"
        );
    }

    #[tokio::test]
    async fn test_ensure_snapshot_destroyed() {
        let (client, transport) = scripted_client();
        transport.reply(200, "");
        transport.reply(404, r#"{"code":"ENOENT","message":"gone"}"#);

        let first = client.ensure_snapshot_destroyed("pool/fs@a").await;
        let second = client.ensure_snapshot_destroyed("pool/fs@a").await;
        assert!(first.unwrap());
        assert!(!second.unwrap());
    }

    #[tokio::test]
    async fn test_clone_snapshot_body() {
        let (client, transport) = scripted_client();
        transport.reply(201, "");

        client
            .clone_snapshot(
                "pool/fs@a",
                &CloneSnapshotParams {
                    target_path: "pool/fs-clone".to_string(),
                    referenced_quota_size: None,
                },
            )
            .await
            .unwrap();
        let request = transport.requests.lock()[0].clone();
        assert_eq!(request.path, "storage/snapshots/pool%2Ffs%40a/clone");
        assert_eq!(request.body, Some(json!({"targetPath": "pool/fs-clone"})));
    }
}
