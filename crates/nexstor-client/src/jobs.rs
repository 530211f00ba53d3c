//! Asynchronous job status

use crate::client::Client;
use crate::error::{Error, Result, classify};
use crate::transport::escape_segment;
use reqwest::Method;
use serde::Deserialize;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Done,
    Running,
}

/// Fold a `jobStatus` response into a job state
///
/// 200 and 201 mean the job finished, 202 means it is still running; any
/// other status is the job's failure.
pub fn fold_job_status(status: u16, body: &[u8]) -> Result<JobState> {
    match status {
        200 | 201 => Ok(JobState::Done),
        202 => Ok(JobState::Running),
        _ => Err(classify("job finished with error", status, body)),
    }
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    rel: String,
    #[serde(default)]
    href: String,
}

/// Job id from the `monitor` link of a `202 Accepted` body
pub(crate) fn monitor_job_id(body: &[u8]) -> Option<String> {
    let links: Links = serde_json::from_slice(body).ok()?;
    links
        .links
        .into_iter()
        .find(|l| l.rel == "monitor")
        .and_then(|l| {
            l.href
                .rsplit_once("jobStatus/")
                .map(|(_, id)| id.trim_matches('/').to_string())
        })
        .filter(|id| !id.is_empty())
}

impl Client {
    /// Query a job once
    pub async fn job_status(&self, job_id: &str) -> Result<JobState> {
        if job_id.is_empty() {
            return Err(Error::invalid_argument("job id must not be empty"));
        }
        let path = format!("jobStatus/{}", escape_segment(job_id));
        let response = self.send_raw(Method::GET, &path, None).await?;
        fold_job_status(response.status, &response.body)
    }

    pub async fn is_job_done(&self, job_id: &str) -> Result<bool> {
        Ok(self.job_status(job_id).await? == JobState::Done)
    }

    /// Poll a job until it finishes, fails or the configured timeout passes
    #[tracing::instrument(skip(self))]
    pub async fn wait_for_job(&self, job_id: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.job_status(job_id).await? == JobState::Done {
                return Ok(());
            }
            if started.elapsed() >= self.job_timeout {
                return Err(Error::JobTimeout {
                    job_id: job_id.to_string(),
                    timeout: self.job_timeout,
                });
            }
            debug!(job_id, "job still running");
            tokio::time::sleep(self.job_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::scripted_client;

    #[test]
    fn test_fold_job_status() {
        assert_eq!(fold_job_status(200, b"").unwrap(), JobState::Done);
        assert_eq!(fold_job_status(201, b"").unwrap(), JobState::Done);
        assert_eq!(fold_job_status(202, b"").unwrap(), JobState::Running);

        let err = fold_job_status(500, br#"{"code":"EBUSY","message":"pool busy"}"#).unwrap_err();
        assert!(err.is_busy());

        let err = fold_job_status(500, b"").unwrap_err();
        assert!(matches!(err, Error::Unclassified { status: 500, .. }));
    }

    #[test]
    fn test_monitor_job_id() {
        let body =
            br#"{"links":[{"rel":"self","href":"/x"},{"rel":"monitor","href":"/jobStatus/abc"}]}"#;
        assert_eq!(monitor_job_id(body), Some("abc".to_string()));
        assert_eq!(monitor_job_id(br#"{"links":[]}"#), None);
        assert_eq!(monitor_job_id(b""), None);
    }

    #[tokio::test]
    async fn test_job_status_queries_endpoint() {
        let (client, transport) = scripted_client();
        transport.reply(202, "");
        transport.reply(200, "");

        assert!(!client.is_job_done("j1").await.unwrap());
        assert!(client.is_job_done("j1").await.unwrap());
        assert_eq!(transport.paths(), vec!["jobStatus/j1", "jobStatus/j1"]);
    }

    #[tokio::test]
    async fn test_job_status_rejects_empty_id() {
        let (client, transport) = scripted_client();
        assert!(client.job_status("").await.unwrap_err().is_validation());
        assert!(transport.paths().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_job_surfaces_failure() {
        let (client, transport) = scripted_client();
        transport.reply(202, "");
        transport.reply(400, r#"{"code":"EINVAL","message":"bad volume size"}"#);

        let err = client.wait_for_job("j2").await.unwrap_err();
        assert_eq!(err.appliance().unwrap().code, "EINVAL");
    }

    #[tokio::test]
    async fn test_wait_for_job_times_out() {
        let (client, transport) = scripted_client();
        let client = client.with_job_timing(
            std::time::Duration::from_millis(5),
            std::time::Duration::ZERO,
        );
        transport.reply(202, "");

        let err = client.wait_for_job("j3").await.unwrap_err();
        assert!(matches!(err, Error::JobTimeout { .. }));
    }
}
