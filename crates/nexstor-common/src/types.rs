//! Resource records served by the appliance management API
//!
//! Field names follow the appliance's camelCase JSON. Every field is
//! defaulted so that requests with a reduced `fields` list still decode.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slash-delimited identifier of a filesystem, volume or snapshot
///
/// `pool/dataset/fs` names a dataset, `pool/dataset/fs@snap` names a snapshot.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Create a new resource path
    pub fn new(path: impl Into<String>) -> Result<Self, ResourcePathError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    /// Create without validation (paths echoed back by the appliance)
    #[must_use]
    pub fn new_unchecked(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dataset part of the path (everything before `@`)
    #[must_use]
    pub fn dataset(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(ds, _)| ds)
    }

    /// Snapshot name, if this path names a snapshot
    #[must_use]
    pub fn snapshot_name(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, snap)| snap)
    }

    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        self.0.contains('@')
    }

    /// Containing dataset; `None` for a top-level pool
    ///
    /// The parent of a snapshot is the dataset it was taken of.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if let Some((ds, _)) = self.0.split_once('@') {
            return Some(Self(ds.to_string()));
        }
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Last path component (the snapshot name for snapshots)
    #[must_use]
    pub fn name(&self) -> &str {
        if let Some(snap) = self.snapshot_name() {
            return snap;
        }
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, n)| n)
    }

    /// Child dataset path
    pub fn join(&self, child: &str) -> Result<Self, ResourcePathError> {
        if self.is_snapshot() {
            return Err(ResourcePathError::SnapshotHasNoChildren);
        }
        Self::new(format!("{}/{child}", self.0))
    }

    /// Path of snapshot `name` of this dataset
    pub fn snapshot(&self, name: &str) -> Result<Self, ResourcePathError> {
        if self.is_snapshot() {
            return Err(ResourcePathError::SnapshotHasNoChildren);
        }
        Self::new(format!("{}@{name}", self.0))
    }

    fn validate(path: &str) -> Result<(), ResourcePathError> {
        if path.is_empty() {
            return Err(ResourcePathError::Empty);
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(ResourcePathError::StraySeparator);
        }
        let (dataset, snapshot) = match path.split_once('@') {
            Some((ds, snap)) => (ds, Some(snap)),
            None => (path, None),
        };
        if dataset.split('/').any(str::is_empty) {
            return Err(ResourcePathError::EmptySegment);
        }
        if let Some(snap) = snapshot {
            if snap.is_empty() {
                return Err(ResourcePathError::EmptySnapshotName);
            }
            if let Some(c) = snap.chars().find(|c| matches!(c, '@' | '/')) {
                return Err(ResourcePathError::InvalidChar(c));
            }
        }
        if let Some(c) = path.chars().find(|c| c.is_control() || c.is_whitespace()) {
            return Err(ResourcePathError::InvalidChar(c));
        }
        Ok(())
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourcePath({:?})", self.0)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = ResourcePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

impl std::str::FromStr for ResourcePath {
    type Err = ResourcePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur when creating a resource path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourcePathError {
    #[error("resource path must not be empty")]
    Empty,
    #[error("resource path must not start or end with '/'")]
    StraySeparator,
    #[error("resource path contains an empty segment")]
    EmptySegment,
    #[error("snapshot name must not be empty")]
    EmptySnapshotName,
    #[error("snapshots cannot have child resources")]
    SnapshotHasNoChildren,
    #[error("resource path contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Record with a stable key the collection walker can resume from
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filesystem {
    pub path: String,
    pub mount_point: String,
    pub shared_over_nfs: bool,
    pub shared_over_smb: bool,
    pub bytes_available: u64,
    pub bytes_used: u64,
}

impl Filesystem {
    /// Share name used when an SMB share is created without an explicit one
    ///
    /// `pool/fs/a` becomes `pool_fs_a`.
    #[must_use]
    pub fn default_smb_share_name(&self) -> String {
        self.path.trim_start_matches('/').replace('/', "_")
    }

    /// Quota that keeps a clone of this filesystem at the same size
    #[must_use]
    pub const fn referenced_quota_size(&self) -> u64 {
        self.bytes_available.saturating_add(self.bytes_used)
    }
}

impl Keyed for Filesystem {
    fn key(&self) -> &str {
        &self.path
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volume {
    pub path: String,
    pub bytes_available: u64,
    pub bytes_used: u64,
    pub volume_size: u64,
}

impl Keyed for Volume {
    fn key(&self) -> &str {
        &self.path
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeGroup {
    pub path: String,
    pub bytes_available: u64,
    pub bytes_used: u64,
}

/// Snapshot of a filesystem or volume
///
/// The list endpoint omits `clones` and `creation_txg`; only the detail
/// endpoint fills them in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub path: String,
    pub name: String,
    pub parent: String,
    pub clones: Vec<String>,
    pub creation_txg: String,
    pub creation_time: String,
}

impl Snapshot {
    /// Creation transaction number, served as a decimal string
    pub fn creation_txg(&self) -> Result<u64, InvalidTxg> {
        self.creation_txg
            .trim()
            .parse()
            .map_err(|_| InvalidTxg {
                snapshot: self.path.clone(),
                value: self.creation_txg.clone(),
            })
    }

    #[must_use]
    pub fn has_clones(&self) -> bool {
        !self.clones.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("snapshot '{snapshot}' has a malformed creation txg: {value:?}")]
pub struct InvalidTxg {
    pub snapshot: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LunMapping {
    pub id: String,
    pub volume: String,
    pub target_group: String,
    pub host_group: String,
    pub lun: u32,
}

impl Keyed for LunMapping {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogicalUnit {
    pub guid: String,
    pub alias: String,
    pub volume: String,
    pub vol_size: u64,
    pub block_size: u32,
    pub write_protect: bool,
    pub writeback_cache_disabled: bool,
    pub state: String,
    pub access_state: String,
    pub mapping_count: u32,
    pub exposed_over_iscsi: bool,
    #[serde(rename = "exposedOverFC")]
    pub exposed_over_fc: bool,
    pub href: String,
}

impl Keyed for LogicalUnit {
    fn key(&self) -> &str {
        &self.guid
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pool {
    pub pool_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct License {
    pub valid: bool,
    pub expires: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RsfCluster {
    pub cluster_name: String,
    pub services: Vec<Service>,
    pub health: String,
}

impl RsfCluster {
    /// Node currently running the service for `pool`, if any
    #[must_use]
    pub fn running_node(&self, pool: &str) -> Option<&str> {
        self.services
            .iter()
            .filter(|s| s.name == pool)
            .flat_map(|s| s.status.iter())
            .find(|st| st.status == "running")
            .map(|st| st.node.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub name: String,
    pub status: Vec<ServiceStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStatus {
    pub node: String,
    pub status: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostGroup {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetGroup {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IscsiTarget {
    pub name: String,
    pub state: String,
    pub authentication: String,
    pub alias: String,
    pub chap_secret_set: bool,
    pub chap_user: String,
    pub portals: Vec<Portal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Portal {
    pub address: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteInitiator {
    pub name: String,
    pub chap_user: String,
    pub chap_secret_set: bool,
}

/// Entry of an NFS export's host list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsRule {
    pub etype: String,
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<u8>,
}

impl NfsRule {
    /// Rule matching a host by name (`*` matches every host)
    #[must_use]
    pub fn fqdn(entity: impl Into<String>) -> Self {
        Self {
            etype: "fqdn".to_string(),
            entity: entity.into(),
            mask: None,
        }
    }

    /// Rule matching a network, e.g. `10.3.0.0/16`
    #[must_use]
    pub fn network(address: impl Into<String>, mask: u8) -> Self {
        Self {
            etype: "network".to_string(),
            entity: address.into(),
            mask: Some(mask),
        }
    }
}

/// Permission set granted to `everyone@` on a filesystem
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclRuleSet {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl AclRuleSet {
    #[must_use]
    pub const fn permission(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_set",
            Self::ReadWrite => "full_set",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_path_valid() {
        assert!(ResourcePath::new("pool").is_ok());
        assert!(ResourcePath::new("pool/ds/fs").is_ok());
        assert!(ResourcePath::new("pool/ds/fs@snap-1").is_ok());
    }

    #[test]
    fn test_resource_path_invalid() {
        assert_eq!(ResourcePath::new(""), Err(ResourcePathError::Empty));
        assert_eq!(
            ResourcePath::new("/pool/fs"),
            Err(ResourcePathError::StraySeparator)
        );
        assert_eq!(
            ResourcePath::new("pool//fs"),
            Err(ResourcePathError::EmptySegment)
        );
        assert_eq!(
            ResourcePath::new("pool/fs@"),
            Err(ResourcePathError::EmptySnapshotName)
        );
        assert!(ResourcePath::new("pool/fs@a@b").is_err());
        assert!(ResourcePath::new("pool/my fs").is_err());
    }

    #[test]
    fn test_resource_path_navigation() {
        let fs = ResourcePath::new("pool/ds/fs").unwrap();
        assert_eq!(fs.parent().unwrap().as_str(), "pool/ds");
        assert_eq!(fs.name(), "fs");
        assert!(ResourcePath::new("pool").unwrap().parent().is_none());

        let snap = fs.snapshot("daily").unwrap();
        assert_eq!(snap.as_str(), "pool/ds/fs@daily");
        assert!(snap.is_snapshot());
        assert_eq!(snap.name(), "daily");
        assert_eq!(snap.dataset(), "pool/ds/fs");
        assert_eq!(snap.parent(), Some(fs.clone()));
        assert!(snap.join("x").is_err());

        assert_eq!(fs.join("child").unwrap().as_str(), "pool/ds/fs/child");
    }

    #[test]
    fn test_resource_path_serde() {
        let path: ResourcePath = serde_json::from_str("\"pool/fs\"").unwrap();
        assert_eq!(path.to_string(), "pool/fs");
        assert!(serde_json::from_str::<ResourcePath>("\"\"").is_err());
    }

    #[test]
    fn test_filesystem_helpers() {
        let fs = Filesystem {
            path: "pool/nfs/share".to_string(),
            bytes_available: 700,
            bytes_used: 300,
            ..Default::default()
        };
        assert_eq!(fs.default_smb_share_name(), "pool_nfs_share");
        assert_eq!(fs.referenced_quota_size(), 1000);
    }

    #[test]
    fn test_snapshot_decode_and_txg() {
        let snap: Snapshot = serde_json::from_str(
            r#"{"path":"p/fs@s1","name":"s1","parent":"p/fs","clones":["p/c1"],"creationTxg":"1234","unknown":1}"#,
        )
        .unwrap();
        assert_eq!(snap.creation_txg().unwrap(), 1234);
        assert!(snap.has_clones());

        let bad = Snapshot {
            path: "p/fs@s2".to_string(),
            creation_txg: "12a".to_string(),
            ..Default::default()
        };
        let err = bad.creation_txg().unwrap_err();
        assert_eq!(err.snapshot, "p/fs@s2");
        assert!(Snapshot::default().creation_txg().is_err());
    }

    #[test]
    fn test_rsf_running_node() {
        let cluster: RsfCluster = serde_json::from_str(
            r#"{"clusterName":"c","services":[{"name":"pool1","status":[{"node":"n1","status":"stopped"},{"node":"n2","status":"running"}]}]}"#,
        )
        .unwrap();
        assert_eq!(cluster.running_node("pool1"), Some("n2"));
        assert_eq!(cluster.running_node("pool2"), None);
    }

    #[test]
    fn test_logical_unit_fc_field() {
        let lu: LogicalUnit =
            serde_json::from_str(r#"{"guid":"600144f0","exposedOverFC":true}"#).unwrap();
        assert!(lu.exposed_over_fc);
        assert_eq!(lu.key(), "600144f0");
    }

    #[test]
    fn test_nfs_rule_serialization() {
        let json = serde_json::to_value(NfsRule::fqdn("*")).unwrap();
        assert_eq!(json, serde_json::json!({"etype": "fqdn", "entity": "*"}));
        let json = serde_json::to_value(NfsRule::network("10.3.0.0", 16)).unwrap();
        assert_eq!(json["mask"], 16);
    }
}
