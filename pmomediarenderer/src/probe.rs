use std::time::Duration;

use tracing::debug;
use ureq::Agent;
use url::Url;

/// Checks that a media URI can be fetched before it is accepted.
pub trait ReachabilityProbe: Send + Sync {
    fn probe(&self, uri: &Url) -> Result<(), String>;
}

impl<F> ReachabilityProbe for F
where
    F: Fn(&Url) -> Result<(), String> + Send + Sync,
{
    fn probe(&self, uri: &Url) -> Result<(), String> {
        self(uri)
    }
}

/// HTTP probe: `HEAD`, then `GET` for servers that refuse `HEAD`.
///
/// The response body of the fallback `GET` is never read.
pub struct HttpProbe {
    agent: Agent,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl ReachabilityProbe for HttpProbe {
    fn probe(&self, uri: &Url) -> Result<(), String> {
        match self.agent.head(uri.as_str()).call() {
            Ok(response) => {
                debug!(uri = %uri, status = %response.status(), "Media URI reachable");
                Ok(())
            }
            Err(ureq::Error::StatusCode(status)) if status == 405 || status == 501 => {
                debug!(uri = %uri, status, "HEAD refused, retrying with GET");
                self.agent
                    .get(uri.as_str())
                    .call()
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            Err(err) => Err(err.to_string()),
        }
    }
}
