//! Small URL helpers used by pattern matching and rule drafting.
//!
//! These work directly on string slices; the content script only ever needs
//! the scheme and the hostname, so a full URL parser is not pulled in.

use crate::types::SchemeMask;

// =============================================================================
// Scheme Extraction
// =============================================================================

/// Scheme extraction without URL parsing.
/// Returns the scheme mask or None if the scheme is not one we know.
#[inline]
pub fn extract_scheme(url: &str) -> Option<SchemeMask> {
    let scheme_end = url.find(':')?;
    let scheme = &url[..scheme_end];

    let mask = if scheme.eq_ignore_ascii_case("https") {
        SchemeMask::HTTPS
    } else if scheme.eq_ignore_ascii_case("http") {
        SchemeMask::HTTP
    } else if scheme.eq_ignore_ascii_case("wss") {
        SchemeMask::WSS
    } else if scheme.eq_ignore_ascii_case("ws") {
        SchemeMask::WS
    } else if scheme.eq_ignore_ascii_case("ftp") {
        SchemeMask::FTP
    } else if scheme.eq_ignore_ascii_case("file") {
        SchemeMask::FILE
    } else if scheme.eq_ignore_ascii_case("data") {
        SchemeMask::DATA
    } else {
        return None;
    };

    Some(mask)
}

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    if bytes.len() > colon_pos + 2
        && bytes[colon_pos + 1] == b'/'
        && bytes[colon_pos + 2] == b'/'
    {
        return Some(colon_pos + 3);
    }

    // Data URLs use ":" not "://"
    if colon_pos >= 4 && bytes[..colon_pos].eq_ignore_ascii_case(b"data") {
        return Some(colon_pos + 1);
    }

    None
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
///
/// Userinfo and port are excluded. Bracketed IPv6 literals keep their
/// brackets.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Skip userinfo
    let mut host_start = scheme_end;
    for (i, &b) in bytes.iter().enumerate().skip(scheme_end) {
        if b == b'@' {
            host_start = i + 1;
            break;
        }
        if b == b'/' || b == b'?' || b == b'#' {
            break;
        }
    }

    if bytes.get(host_start) == Some(&b'[') {
        let close = bytes[host_start..].iter().position(|&b| b == b']')?;
        return Some((host_start, host_start + close + 1));
    }

    let mut host_end = bytes.len();
    for (i, &b) in bytes.iter().enumerate().skip(host_start) {
        if b == b'/' || b == b'?' || b == b'#' || b == b':' {
            host_end = i;
            break;
        }
    }

    Some((host_start, host_end))
}

/// Host extraction without allocations.
/// Returns a slice into the original URL, or None when there is no host.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    let host = &url[host_start..host_end];
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Drop one leading `www.` label.
#[inline]
pub fn strip_www(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => &host[4..],
        _ => host,
    }
}

/// Hostname without a leading `www.`, lowercased.
pub fn registrable_host(url: &str) -> Option<String> {
    extract_host(url).map(|host| strip_www(host).to_ascii_lowercase())
}
