//! User-Agent strings shared by the HTTP client and the browser session.
//!
//! The embed host serves reduced markup to unknown agents, so both the
//! static fetches and the automated browser present a desktop Chrome UA.

/// Desktop Chrome User-Agent presented on every request.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for static content requests.
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

/// Launch argument that pins the browser session to the same User-Agent.
#[must_use]
pub(crate) fn browser_user_agent_arg() -> String {
    format!("--user-agent={BROWSER_USER_AGENT}")
}
