pub mod cache;
pub mod client;
pub mod pods;
pub mod source;

/// Default user agent for `PodMirror` - automatically uses the package version
///
/// ## Client Creation Pattern Guidelines:
///
/// All modules should use `client::new(Some(USER_AGENT))` for consistency.
///
/// User-agent can be overridden via `PODMIRROR_USER_AGENT` environment variable.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Environment variable that overrides [`USER_AGENT`]
pub const USER_AGENT_ENV: &str = "PODMIRROR_USER_AGENT";
