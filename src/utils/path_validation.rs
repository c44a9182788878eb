//! Input validation for download requests.
//!
//! Both checks run before any I/O so a bad request never touches the network
//! or the download directory.

use crate::core::UpdateError;
use std::path::{Component, Path};
use url::{Host, Url};

const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const MAX_FILE_NAME_LEN: usize = 255;

/// Validate a destination file name for the download directory.
///
/// The name must be a single normal path component: no separators, no `..`,
/// no characters Windows refuses, no reserved device names. The check is the
/// same on every platform so a name accepted on macOS is also valid for the
/// Windows build.
pub fn validate_file_name(name: &str) -> Result<(), UpdateError> {
    let reject = |reason: &str| UpdateError::InvalidFileName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(reject("file name is empty"));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(reject("file name is too long"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(reject("path separators are not allowed"));
    }
    if name == "." || name == ".." || name.contains("..") {
        return Err(reject("parent directory references are not allowed"));
    }
    if let Some(ch) = name.chars().find(|c| WINDOWS_INVALID_CHARS.contains(c) || c.is_control()) {
        return Err(reject(&format!("character {ch:?} is not allowed")));
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return Err(reject("file name cannot end with a dot or space"));
    }

    let stem = name.split('.').next().unwrap_or(name).to_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return Err(reject("reserved device name"));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(reject("must be a single file name")),
    }
}

/// Validate and parse an installer download URL.
///
/// Only `https` is accepted, except for loopback hosts (`localhost`,
/// `127.0.0.0/8`, `::1`) where plain `http` is allowed for local registries.
pub fn validate_download_url(raw: &str) -> Result<Url, UpdateError> {
    let reject = |reason: &str| UpdateError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw.trim()).map_err(|e| reject(&e.to_string()))?;

    match url.scheme() {
        "https" => {}
        "http" if is_loopback(&url) => {}
        "http" => return Err(reject("only https:// downloads are allowed")),
        other => return Err(reject(&format!("unsupported scheme '{other}'"))),
    }

    if url.host().is_none() {
        return Err(reject("URL has no host"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(reject("credentials in URLs are not allowed"));
    }

    Ok(url)
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Best-effort file name from the last URL path segment.
#[must_use]
pub fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .filter(|s| validate_file_name(s).is_ok())
}
