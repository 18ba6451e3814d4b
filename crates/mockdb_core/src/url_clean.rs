use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::StoreError;

/// Characters left untouched when re-encoding query keys and values.
///
/// Query delimiters (`&`, `=`, `;`, `+`) are always escaped so a cleaned
/// URL cleans to itself.
const URI_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'$')
    .remove(b',')
    .remove(b'[')
    .remove(b']');

/// A URL with lowercase scheme and host, no fragment and a sorted query.
///
/// The path is kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanUrl {
    scheme: String,
    userinfo: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl CleanUrl {
    /// Host without the brackets of an IPv6 literal.
    pub fn hostname(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|host| host.strip_suffix(']'))
            .unwrap_or(&self.host)
    }
}

impl fmt::Display for CleanUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(userinfo) = &self.userinfo {
            write!(f, "{userinfo}@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Canonicalizes an absolute URL: lowercase scheme and host, drop the
/// fragment and sort query parameters by key.
pub fn clean_url(raw: &str) -> Result<CleanUrl, StoreError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| StoreError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host"))?
        .to_ascii_lowercase();

    let (_, rest) = trimmed
        .split_once(':')
        .ok_or_else(|| invalid("missing scheme"))?;
    let rest = rest
        .strip_prefix("//")
        .ok_or_else(|| invalid("missing authority"))?;
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    let userinfo = authority
        .rsplit_once('@')
        .map(|(userinfo, _)| userinfo.to_string());

    let tail = tail.split('#').next().unwrap_or_default();
    let (path, query) = match tail.split_once('?') {
        Some((path, query)) => (path, Some(sort_query(query))),
        None => (tail, None),
    };

    Ok(CleanUrl {
        scheme: parsed.scheme().to_string(),
        userinfo,
        host,
        port: parsed.port(),
        path: path.to_string(),
        query,
    })
}

fn sort_query(raw: &str) -> String {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in raw.split(['&', ';']) {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (pair, None),
        };
        let values = params.entry(decode_component(key)).or_default();
        if let Some(value) = value {
            values.push(decode_component(value));
        }
    }

    params
        .iter()
        .flat_map(|(key, values)| {
            values.iter().map(move |value| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, URI_ESCAPE),
                    utf8_percent_encode(value, URI_ESCAPE)
                )
            })
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
