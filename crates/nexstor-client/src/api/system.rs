//! License, pools, HA clusters and node control

use crate::client::Client;
use crate::error::Result;
use crate::transport::build_uri;
use nexstor_common::{License, Pool, RsfCluster};
use reqwest::Method;

impl Client {
    pub async fn license(&self) -> Result<License> {
        self.send_request_with_struct(Method::GET, "settings/license", None)
            .await
    }

    pub async fn pools(&self) -> Result<Vec<Pool>> {
        let uri = build_uri(
            "storage/pools",
            &[("fields", "poolName,health,status".to_string())],
        );
        self.get_list(&uri).await
    }

    /// HA clusters; empty when the appliance is not clustered
    pub async fn rsf_clusters(&self) -> Result<Vec<RsfCluster>> {
        let uri = build_uri(
            "rsf/clusters",
            &[("fields", "clusterName,nodes,services,health".to_string())],
        );
        self.get_list(&uri).await
    }

    pub async fn reboot_node(&self) -> Result<()> {
        self.send_request(Method::POST, "node/reboot", None).await?;
        Ok(())
    }
}
