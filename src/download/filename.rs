//! Choosing a local name for a downloaded file.

use log::debug;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use std::time::{SystemTime, UNIX_EPOCH};

/// Explicit name, else the `Content-Disposition` name, else a timestamped
/// default.
pub fn resolve_file_name(explicit: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(name) = explicit.and_then(sanitize) {
        return name;
    }

    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
        .and_then(|value| parse_content_disposition(&value));

    match from_header {
        Some(name) => name,
        None => {
            let name = default_file_name();
            debug!("No usable filename in response, using {}", name);
            name
        }
    }
}

/// `download_<unix millis>`
pub fn default_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("download_{}", millis)
}

/// Extracts the filename from a `Content-Disposition` value. The extended
/// `filename*` parameter (RFC 5987) wins over plain `filename`.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => extended = decode_extended(raw.trim()),
            "filename" => plain = Some(unquote(raw.trim())),
            _ => {}
        }
    }

    extended
        .and_then(|name| sanitize(&name))
        .or_else(|| plain.and_then(|name| sanitize(&name)))
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `charset'language'percent-encoded`
fn decode_extended(value: &str) -> Option<String> {
    let value = value.trim_matches('"');
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    if charset.eq_ignore_ascii_case("utf-8") {
        urlencoding::decode(encoded).ok().map(|name| name.into_owned())
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        let bytes = urlencoding::decode_binary(encoded.as_bytes());
        Some(bytes.iter().map(|&b| b as char).collect())
    } else {
        debug!("Unsupported filename charset {:?}", charset);
        None
    }
}

/// Keeps only the final path component so a server cannot write outside the
/// target directory.
fn sanitize(name: &str) -> Option<String> {
    let name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
