// Client creation with custom user-agent support for kube 2.x
use crate::error::Result as PmResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::{debug, warn};

use super::USER_AGENT_ENV;

/// Resolve the user agent to send: the environment override wins over the caller's choice
#[must_use]
pub fn resolve_user_agent(custom_user_agent: Option<&str>) -> Option<String> {
    std::env::var(USER_AGENT_ENV)
        .ok()
        .filter(|ua| !ua.trim().is_empty())
        .or_else(|| custom_user_agent.map(str::to_string))
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the kube config can not be inferred or the client can not be built
pub async fn new(custom_user_agent: Option<&str>) -> PmResult<Client> {
    let mut config = Config::infer().await?;

    if let Some(user_agent) = resolve_user_agent(custom_user_agent) {
        match HeaderValue::from_str(&user_agent) {
            Ok(header_value) => {
                debug!(user_agent = %user_agent, "using custom user-agent");
                config
                    .headers
                    .push((HeaderName::from_static("user-agent"), header_value));
            }
            // An invalid header value falls back to kube's default user-agent
            Err(e) => warn!("ignoring invalid user-agent {user_agent:?}: {e}"),
        }
    }

    let client = Client::try_from(config)?;

    Ok(client)
}
