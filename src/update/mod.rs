use serde::Deserialize;
use thiserror::Error;

pub const RELEASE_FEED: &str = "https://api.github.com/repos/hexfuzz/fuzzbuster/releases/latest";

#[derive(Clone, Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to query release feed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode release feed: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub enum UpdateStatus {
    UpToDate,
    Available(Release),
}

/// Compares the latest published release against `current` (a `vX.Y.Z` tag).
pub async fn check(feed: &str, current: &str) -> Result<UpdateStatus, UpdateError> {
    let client = reqwest::Client::new();
    let body = client
        .get(feed)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .header(reqwest::header::USER_AGENT, "fuzzbuster")
        .send()
        .await
        .map_err(|source| UpdateError::Request { source })?
        .text()
        .await
        .map_err(|source| UpdateError::Request { source })?;
    let release: Release =
        serde_json::from_str(&body).map_err(|source| UpdateError::Decode { source })?;

    if release.tag_name == current {
        Ok(UpdateStatus::UpToDate)
    } else {
        Ok(UpdateStatus::Available(release))
    }
}

/// Opens a URL with the platform opener; failure to open is not an error.
pub fn open_in_browser(url: &str) {
    let opener = if cfg!(target_os = "windows") {
        "start"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let _ = std::process::Command::new(opener)
        .arg(url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();
}
