//! SAN mapping objects: LUN mappings, host and target groups, iSCSI

use super::{check_path, not_found, require};
use crate::client::Client;
use crate::ensure::ensure_created;
use crate::error::{Error, Result};
use crate::pagination::{SliceSource, get_all, validate_slice_args};
use crate::transport::{build_uri, escape_segment};
use async_trait::async_trait;
use nexstor_common::{
    HostGroup, IscsiTarget, LogicalUnit, LunMapping, Portal, RemoteInitiator, TargetGroup,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use tracing::info;

const LUN_MAPPING_FIELDS: &str = "id,volume,targetGroup,hostGroup,lun";
const ISCSI_TARGET_FIELDS: &str = "name,state,authentication,alias,chapSecretSet,chapUser,portals";
const REMOTE_INITIATORS: &str = "v1.2.6/san/iscsi/remoteInitiators";

/// Optional filters for [`Client::lun_mappings`]
#[derive(Debug, Clone, Default)]
pub struct LunMappingFilter {
    pub target_group: Option<String>,
    pub volume: Option<String>,
    pub host_group: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLunMappingParams {
    pub host_group: String,
    pub volume: String,
    pub target_group: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateIscsiTargetParams {
    pub name: String,
    pub portals: Vec<Portal>,
}

#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapCredentials {
    pub chap_user: String,
    pub chap_secret: String,
}

impl fmt::Debug for ChapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapCredentials")
            .field("chap_user", &self.chap_user)
            .finish_non_exhaustive()
    }
}

/// Cluster-wide LUN mappings, walked without a parent
#[derive(Debug, Clone, Copy)]
pub struct LunMappingOps<'a>(pub &'a Client);

#[async_trait]
impl SliceSource for LunMappingOps<'_> {
    type Record = LunMapping;

    async fn fetch_slice(
        &self,
        _parent: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LunMapping>> {
        self.0.lun_mappings_slice(limit, offset).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogicalUnitOps<'a>(pub &'a Client);

#[async_trait]
impl SliceSource for LogicalUnitOps<'_> {
    type Record = LogicalUnit;

    async fn fetch_slice(
        &self,
        _parent: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogicalUnit>> {
        self.0.logical_units_slice(limit, offset).await
    }
}

impl Client {
    pub async fn lun_mappings(&self, filter: &LunMappingFilter) -> Result<Vec<LunMapping>> {
        let uri = build_uri(
            "san/lunMappings",
            &[
                ("fields", LUN_MAPPING_FIELDS.to_string()),
                ("targetGroup", filter.target_group.clone().unwrap_or_default()),
                ("volume", filter.volume.clone().unwrap_or_default()),
                ("hostGroup", filter.host_group.clone().unwrap_or_default()),
            ],
        );
        self.get_list(&uri).await
    }

    pub async fn lun_mappings_slice(&self, limit: usize, offset: usize) -> Result<Vec<LunMapping>> {
        validate_slice_args("lun_mappings_slice", limit)?;
        let uri = build_uri(
            "san/lunMappings",
            &[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("fields", LUN_MAPPING_FIELDS.to_string()),
            ],
        );
        self.get_list(&uri).await
    }

    pub async fn all_lun_mappings(&self) -> Result<Vec<LunMapping>> {
        get_all(&LunMappingOps(self), "").await
    }

    /// Mapping of one volume; none is a not-found error
    pub async fn lun_mapping(&self, volume: &str) -> Result<LunMapping> {
        check_path(volume)?;
        let filter = LunMappingFilter {
            volume: Some(volume.to_string()),
            ..Default::default()
        };
        self.lun_mappings(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("LUN mapping of '{volume}' not found")))
    }

    /// Map a volume; an existing mapping counts as success
    pub async fn create_lun_mapping(&self, params: &CreateLunMappingParams) -> Result<bool> {
        if params.host_group.is_empty()
            || params.volume.is_empty()
            || params.target_group.is_empty()
        {
            return Err(Error::invalid_argument(format!(
                "host group, volume and target group are required, got: {params:?}"
            )));
        }
        ensure_created(
            self.send_request(Method::POST, "san/lunMappings", Some(json!(params)))
                .await
                .map(drop),
        )
    }

    pub async fn destroy_lun_mapping(&self, id: &str) -> Result<()> {
        require("LUN mapping id", id)?;
        let uri = format!("san/lunMappings/{}", escape_segment(id));
        self.send_request(Method::DELETE, &uri, None).await?;
        Ok(())
    }

    /// Create a host group; an existing one counts as success
    pub async fn create_host_group(&self, group: &HostGroup) -> Result<bool> {
        if group.name.is_empty() || group.members.is_empty() {
            return Err(Error::invalid_argument(format!(
                "host group name and members must not be empty, got: {group:?}"
            )));
        }
        ensure_created(
            self.send_request(Method::POST, "san/hostgroups", Some(json!(group)))
                .await
                .map(drop),
        )
    }

    pub async fn host_groups(&self) -> Result<Vec<HostGroup>> {
        self.get_list("san/hostgroups").await
    }

    pub async fn update_host_group(&self, name: &str, members: &[String]) -> Result<()> {
        require("host group name", name)?;
        let uri = format!("storage/hostgroups/{}", escape_segment(name));
        self.send_request(Method::PUT, &uri, Some(json!({ "members": members })))
            .await?;
        Ok(())
    }

    pub async fn target_groups(&self) -> Result<Vec<TargetGroup>> {
        self.get_list("san/targetgroups").await
    }

    pub async fn target_group(&self, name: &str) -> Result<TargetGroup> {
        require("target group name", name)?;
        let uri = build_uri(
            &format!("san/targetgroups/{}", escape_segment(name)),
            &[("fields", "name,members".to_string())],
        );
        self.send_request_with_struct(Method::GET, &uri, None).await
    }

    /// Create a target group, or replace its members if it exists
    pub async fn create_or_update_target_group(&self, group: &TargetGroup) -> Result<()> {
        if group.name.is_empty() || group.members.is_empty() {
            return Err(Error::invalid_argument(format!(
                "target group name and members must not be empty, got: {group:?}"
            )));
        }
        let created = ensure_created(
            self.send_request(Method::POST, "san/targetgroups", Some(json!(group)))
                .await
                .map(drop),
        )?;
        if !created {
            info!(name = %group.name, "target group exists, updating members");
            let uri = format!("san/targetgroups/{}", escape_segment(&group.name));
            self.send_request(Method::PUT, &uri, Some(json!({ "members": group.members })))
                .await?;
        }
        Ok(())
    }

    /// iSCSI targets, optionally filtered by name
    pub async fn iscsi_targets(&self, name: Option<&str>) -> Result<Vec<IscsiTarget>> {
        let uri = build_uri(
            "san/iscsi/targets",
            &[
                ("name", name.unwrap_or_default().to_string()),
                ("fields", ISCSI_TARGET_FIELDS.to_string()),
            ],
        );
        self.get_list(&uri).await
    }

    pub async fn iscsi_target(&self, name: &str) -> Result<IscsiTarget> {
        require("iSCSI target name", name)?;
        self.iscsi_targets(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("iSCSI target '{name}' not found")))
    }

    /// Create an iSCSI target; an existing one counts as success
    pub async fn create_iscsi_target(&self, params: &CreateIscsiTargetParams) -> Result<bool> {
        require("iSCSI target name", &params.name)?;
        ensure_created(
            self.send_request(Method::POST, "san/iscsi/targets", Some(json!(params)))
                .await
                .map(drop),
        )
    }

    /// Set the target's authentication method (`none` or `chap`)
    pub async fn update_iscsi_target(&self, name: &str, authentication: &str) -> Result<()> {
        require("iSCSI target name", name)?;
        let uri = format!("san/iscsi/targets/{}", escape_segment(name));
        self.send_request(
            Method::PUT,
            &uri,
            Some(json!({ "authentication": authentication })),
        )
        .await?;
        Ok(())
    }

    pub async fn create_remote_initiator(&self, name: &str, chap: &ChapCredentials) -> Result<()> {
        require("remote initiator name", name)?;
        require("CHAP secret", &chap.chap_secret)?;
        let body = json!({
            "name": name,
            "chapUser": chap.chap_user,
            "chapSecret": chap.chap_secret,
        });
        self.send_request(Method::POST, REMOTE_INITIATORS, Some(body))
            .await?;
        Ok(())
    }

    pub async fn update_remote_initiator(&self, name: &str, chap: &ChapCredentials) -> Result<()> {
        require("remote initiator name", name)?;
        let uri = format!("{REMOTE_INITIATORS}/{}", escape_segment(name));
        self.send_request(Method::PUT, &uri, Some(json!(chap)))
            .await?;
        Ok(())
    }

    pub async fn remote_initiator(&self, name: &str) -> Result<RemoteInitiator> {
        require("remote initiator name", name)?;
        let uri = format!("{REMOTE_INITIATORS}/{}", escape_segment(name));
        self.send_request_with_struct(Method::GET, &uri, None).await
    }

    pub async fn logical_units_slice(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogicalUnit>> {
        validate_slice_args("logical_units_slice", limit)?;
        let uri = build_uri(
            "san/logicalUnits",
            &[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        );
        self.get_list(&uri).await
    }

    pub async fn logical_units(&self) -> Result<Vec<LogicalUnit>> {
        get_all(&LogicalUnitOps(self), "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::scripted_client;

    #[tokio::test]
    async fn test_lun_mappings_filter_query() {
        let (client, transport) = scripted_client();
        transport.reply(200, r#"{"data":[{"id":"m1","volume":"pool/v","lun":3}]}"#);

        let filter = LunMappingFilter {
            volume: Some("pool/v".to_string()),
            ..Default::default()
        };
        let mappings = client.lun_mappings(&filter).await.unwrap();
        assert_eq!(mappings[0].lun, 3);
        assert_eq!(
            transport.paths()[0],
            "san/lunMappings?fields=id%2Cvolume%2CtargetGroup%2ChostGroup%2Clun&volume=pool%2Fv"
        );
    }

    #[tokio::test]
    async fn test_all_lun_mappings_pages() {
        let (client, transport) = scripted_client();
        let page: Vec<_> = (0..99).map(|i| json!({"id": format!("m{i}")})).collect();
        transport.reply(200, &json!({ "data": page }).to_string());
        transport.reply(200, r#"{"data":[]}"#);

        let all = client.all_lun_mappings().await.unwrap();
        assert_eq!(all.len(), 99);
        assert!(transport.paths()[1].contains("offset=99"));
    }

    #[tokio::test]
    async fn test_lun_mapping_missing() {
        let (client, transport) = scripted_client();
        transport.reply(200, r#"{"data":[]}"#);
        let err = client.lun_mapping("pool/v").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_lun_mapping_is_idempotent() {
        let (client, transport) = scripted_client();
        transport.reply(409, r#"{"code":"EEXIST","message":"mapping exists"}"#);

        let created = client
            .create_lun_mapping(&CreateLunMappingParams {
                host_group: "all".to_string(),
                volume: "pool/v".to_string(),
                target_group: "tg1".to_string(),
            })
            .await
            .unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn test_create_lun_mapping_validates() {
        let (client, transport) = scripted_client();
        let err = client
            .create_lun_mapping(&CreateLunMappingParams::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(transport.paths().is_empty());
    }

    #[tokio::test]
    async fn test_target_group_update_on_exists() {
        let (client, transport) = scripted_client();
        transport.reply(409, r#"{"code":"EEXIST","message":"exists"}"#);
        transport.reply(200, "");

        client
            .create_or_update_target_group(&TargetGroup {
                name: "tg1".to_string(),
                members: vec!["iqn.2005-07.com.example:t1".to_string()],
            })
            .await
            .unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[1].method, Method::PUT);
        assert_eq!(requests[1].path, "san/targetgroups/tg1");
        assert_eq!(
            requests[1].body,
            Some(json!({"members": ["iqn.2005-07.com.example:t1"]}))
        );
    }

    #[tokio::test]
    async fn test_create_host_group_propagates_other_errors() {
        let (client, transport) = scripted_client();
        transport.reply(400, r#"{"code":"EINVAL","message":"bad member"}"#);

        let err = client
            .create_host_group(&HostGroup {
                name: "hg".to_string(),
                members: vec!["iqn.x".to_string()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.appliance().unwrap().code, "EINVAL");
    }

    #[tokio::test]
    async fn test_remote_initiator_requires_secret() {
        let (client, _transport) = scripted_client();
        let err = client
            .create_remote_initiator("iqn.host", &ChapCredentials::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let chap = ChapCredentials {
            chap_user: "u".into(),
            chap_secret: "s3cret".into(),
        };
        assert!(!format!("{chap:?}").contains("s3cret"));
    }

    #[tokio::test]
    async fn test_iscsi_target_not_found() {
        let (client, transport) = scripted_client();
        transport.reply(200, r#"{"data":[]}"#);
        let err = client.iscsi_target("iqn.t").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(transport.paths()[0].ends_with("&name=iqn.t"));
    }
}
