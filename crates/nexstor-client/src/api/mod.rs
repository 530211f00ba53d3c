//! Resource operations of the management API

pub mod filesystems;
pub mod nas;
pub mod san;
pub mod snapshots;
pub mod system;
pub mod volumes;

use crate::client::Client;
use crate::error::{Error, Result};
use nexstor_common::{ApplianceError, ResourcePath};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Collection response envelope
#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

pub(crate) fn check_path(path: &str) -> Result<ResourcePath> {
    ResourcePath::new(path).map_err(|source| Error::InvalidPath {
        path: path.to_string(),
        source,
    })
}

/// `ENOENT` for a lookup whose listing came back empty
pub(crate) fn not_found(message: String) -> Error {
    Error::Appliance(ApplianceError::not_found(message))
}

pub(crate) fn require(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

impl Client {
    /// GET a collection and unwrap its `data` array
    pub(crate) async fn get_list<T: DeserializeOwned>(&self, uri: &str) -> Result<Vec<T>> {
        let list: DataList<T> = self
            .send_request_with_struct(Method::GET, uri, None)
            .await?;
        Ok(list.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path() {
        assert!(check_path("pool/fs").is_ok());
        let err = check_path("").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_data_list_defaults() {
        let list: DataList<u32> = serde_json::from_str("{}").unwrap();
        assert!(list.data.is_empty());
    }
}
