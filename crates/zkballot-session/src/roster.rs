//! Election root lookup

use std::{future::Future, time::Duration};

use serde::Deserialize;
use tracing::{debug, warn};
use zkballot_runtime::{BallotError, ElectionId, ElectionRoot, Result};

use crate::config::RosterConfig;

/// Source of the current eligibility root of an election.
pub trait RosterService: Send + Sync + 'static {
    fn election_root(
        &self,
        election: &ElectionId,
    ) -> impl Future<Output = Result<ElectionRoot>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootResponse {
    election_id: String,
    root: String,
}

/// `GET {roster}/elections/{electionId}/root`
#[derive(Debug, Clone)]
pub struct HttpRosterService {
    client: reqwest::Client,
    base_url: String,
    lookup_timeout: Duration,
}

impl HttpRosterService {
    pub fn new(config: &RosterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            lookup_timeout: config.lookup_timeout(),
        }
    }

    /// The election id is percent-encoded as a single path segment.
    pub fn root_url(&self, election: &ElectionId) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| BallotError::roster_unavailable(format!("bad roster URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BallotError::roster_unavailable("roster URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["elections", election.label(), "root"]);
        Ok(url)
    }

    async fn lookup(&self, election: &ElectionId) -> Result<ElectionRoot> {
        let url = self.root_url(election)?;
        debug!(%url, "looking up election root");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BallotError::roster_unavailable(e.to_string()))?;

        let body: RootResponse = response
            .json()
            .await
            .map_err(|e| BallotError::roster_unavailable(format!("malformed response: {}", e)))?;

        parse_root(election, &body)
    }
}

impl RosterService for HttpRosterService {
    async fn election_root(&self, election: &ElectionId) -> Result<ElectionRoot> {
        match tokio::time::timeout(self.lookup_timeout, self.lookup(election)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(election = %election, "election root lookup timed out");
                Err(BallotError::roster_unavailable(format!(
                    "no answer within {:?}",
                    self.lookup_timeout
                )))
            }
        }
    }
}

fn parse_root(election: &ElectionId, body: &RootResponse) -> Result<ElectionRoot> {
    if body.election_id != election.label() {
        return Err(BallotError::roster_unavailable(format!(
            "asked for election '{}', roster answered for '{}'",
            election, body.election_id
        )));
    }
    ElectionRoot::parse(&body.root)
        .map_err(|e| BallotError::roster_unavailable(format!("unusable election root: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves::pasta::Fp;

    fn service(base: &str) -> HttpRosterService {
        HttpRosterService::new(&RosterConfig { base_url: base.to_string(), lookup_timeout_ms: 10 })
    }

    #[test]
    fn test_root_url_encodes_election_id() {
        let election = ElectionId::parse("general/2026 #1").unwrap();
        let url = service("https://roster.example.org/api/").root_url(&election).unwrap();
        assert_eq!(
            url.as_str(),
            "https://roster.example.org/api/elections/general%2F2026%20%231/root"
        );
    }

    #[test]
    fn test_parse_root() {
        let election = ElectionId::parse("E1").unwrap();
        let body = RootResponse { election_id: "E1".to_string(), root: "0x0f".to_string() };
        assert_eq!(parse_root(&election, &body).unwrap().element(), Fp::from(15));

        let wrong = RootResponse { election_id: "E2".to_string(), root: "0x0f".to_string() };
        assert!(matches!(parse_root(&election, &wrong), Err(BallotError::RosterUnavailable(_))));

        let garbage = RootResponse { election_id: "E1".to_string(), root: "root".to_string() };
        assert!(matches!(parse_root(&election, &garbage), Err(BallotError::RosterUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_roster_is_retryable() {
        // Port 9 (discard) on localhost is not expected to answer HTTP
        let err = service("http://127.0.0.1:9")
            .election_root(&ElectionId::parse("E1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BallotError::RosterUnavailable(_)));
        assert!(err.is_retryable());
    }
}
