//! NFS and SMB shares

use super::require;
use crate::client::Client;
use crate::error::Result;
use crate::transport::{build_uri, escape_segment};
use nexstor_common::NfsRule;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default)]
pub struct CreateNfsShareParams {
    pub filesystem: String,
    pub read_write_list: Vec<NfsRule>,
    pub read_only_list: Vec<NfsRule>,
}

impl CreateNfsShareParams {
    /// Host lists with defaults filled in
    ///
    /// With no rules at all every host gets read-write access. A list left
    /// empty next to a non-empty one grants nothing (`none`).
    #[must_use]
    pub fn effective_lists(&self) -> (Vec<NfsRule>, Vec<NfsRule>) {
        match (self.read_write_list.is_empty(), self.read_only_list.is_empty()) {
            (true, true) => (vec![NfsRule::fqdn("*")], vec![NfsRule::fqdn("none")]),
            (true, false) => (vec![NfsRule::fqdn("none")], self.read_only_list.clone()),
            (false, true) => (self.read_write_list.clone(), vec![NfsRule::fqdn("none")]),
            (false, false) => (self.read_write_list.clone(), self.read_only_list.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSmbShareParams {
    pub filesystem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SmbShare {
    share_name: String,
}

impl Client {
    /// Export a filesystem over NFS with root squashing disabled
    pub async fn create_nfs_share(&self, params: &CreateNfsShareParams) -> Result<()> {
        require("filesystem", &params.filesystem)?;
        let (read_write, read_only) = params.effective_lists();
        let body = json!({
            "filesystem": params.filesystem,
            "anon": "root",
            "securityContexts": [{
                "securityModes": ["sys"],
                "readWriteList": read_write,
                "readOnlyList": read_only,
            }],
        });
        self.send_request(Method::POST, "nas/nfs", Some(body)).await?;
        Ok(())
    }

    pub async fn delete_nfs_share(&self, filesystem: &str) -> Result<()> {
        require("filesystem path", filesystem)?;
        let uri = format!("nas/nfs/{}", escape_segment(filesystem));
        self.send_request(Method::DELETE, &uri, None).await?;
        Ok(())
    }

    pub async fn create_smb_share(&self, params: &CreateSmbShareParams) -> Result<()> {
        require("filesystem", &params.filesystem)?;
        self.send_request(Method::POST, "nas/smb", Some(json!(params)))
            .await?;
        Ok(())
    }

    /// Share name of the filesystem's SMB share
    pub async fn smb_share_name(&self, filesystem: &str) -> Result<String> {
        require("filesystem path", filesystem)?;
        let uri = build_uri(
            &format!("nas/smb/{}", escape_segment(filesystem)),
            &[("fields", "shareName,shareState".to_string())],
        );
        let share: SmbShare = self.send_request_with_struct(Method::GET, &uri, None).await?;
        Ok(share.share_name)
    }

    pub async fn delete_smb_share(&self, filesystem: &str) -> Result<()> {
        require("filesystem path", filesystem)?;
        let uri = format!("nas/smb/{}", escape_segment(filesystem));
        self.send_request(Method::DELETE, &uri, None).await?;
        Ok(())
    }
}
