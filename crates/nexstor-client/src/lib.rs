//! nexstor client - management API client for storage appliances
//!
//! Wraps the appliance REST API: listing through bounded slices, destroying
//! datasets held by clones, idempotent create/destroy and job polling.
//!
//! ```ignore
//! let client = Client::from_config(&Config::load(Some(path))?)?;
//! client.login().await?;
//! let children = client.filesystems("pool/nfs").await?;
//! client.destroy_filesystem_with_clones("pool/nfs/old", true).await?;
//! ```

pub mod api;
pub mod client;
pub mod ensure;
pub mod error;
pub mod jobs;
pub mod pagination;
pub mod reaper;
pub mod session;
pub mod transport;

pub use api::filesystems::{CreateFilesystemParams, FilesystemOps, UpdateFilesystemParams};
pub use api::nas::{CreateNfsShareParams, CreateSmbShareParams};
pub use api::san::{
    ChapCredentials, CreateIscsiTargetParams, CreateLunMappingParams, LogicalUnitOps,
    LunMappingFilter, LunMappingOps,
};
pub use api::snapshots::CloneSnapshotParams;
pub use api::volumes::{CreateVolumeParams, UpdateVolumeParams, VolumeOps};
pub use client::{Client, Credentials};
pub use ensure::{ensure_created, ensure_destroyed};
pub use error::{Error, Result, classify};
pub use jobs::{JobState, fold_job_status};
pub use pagination::{
    MAX_PAGE_SIZE, PAGE_SIZE, SliceSource, Window, get_all, get_all_with_page_size,
    get_all_with_starting_token,
};
pub use reaper::{DependentResource, DestroyParams, MAX_PROMOTION_ATTEMPTS, destroy_with_promotion};
pub use reqwest::Method;
pub use session::Session;
pub use transport::{HttpTransport, RawResponse, Transport};
