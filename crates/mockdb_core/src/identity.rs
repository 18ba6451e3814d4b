use std::fmt::{self, Write as _};
use std::str::FromStr;

use db_logging::db_trace;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::url_clean::{clean_url, CleanUrl};
use crate::value::{is_blank, is_nil, is_truthy, to_float, value_to_string, Record, Value};
use crate::{Clock, StoreError};

/// Fetch type that does not contribute to a page fingerprint.
pub const DEFAULT_FETCH_TYPE: &str = "standard";

const DEFAULT_UA_TYPE: &str = "desktop";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Lowercase hex digest of `seed`.
    pub fn hex_digest(self, seed: &str) -> String {
        match self {
            HashAlgorithm::Md5 => to_hex(&Md5::digest(seed.as_bytes())),
            HashAlgorithm::Sha1 => to_hex(&Sha1::digest(seed.as_bytes())),
            HashAlgorithm::Sha256 => to_hex(&Sha256::digest(seed.as_bytes())),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == s)
            .ok_or_else(|| StoreError::InvalidHashAlgorithm {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn to_hex(digest: &[u8]) -> String {
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Derives record identities with a configured hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdentityGenerator {
    algorithm: HashAlgorithm,
}

impl IdentityGenerator {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hash(&self, seed: &str) -> String {
        self.algorithm.hex_digest(seed)
    }

    /// Hash of the current time plus a random fraction; never reproducible.
    pub fn random_hash(&self, clock: &dyn Clock) -> String {
        let now = clock.now();
        let seconds = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
        let seed = seconds + rand::random::<f64>();
        self.hash(&seed.to_string())
    }

    /// Output identity is random by design, whatever the output contains.
    pub fn output_identity(&self, _data: &Record, clock: &dyn Clock) -> String {
        self.random_hash(clock)
    }

    /// `<hostname>-<hash>` over the request-shaping fields of a page, or an
    /// empty string when the page has no URL.
    pub fn page_fingerprint(&self, page: &Record) -> Result<String, StoreError> {
        match self.page_seed(page)? {
            Some((url, seed)) => Ok(format!("{}-{}", url.hostname(), self.hash(&seed))),
            None => Ok(String::new()),
        }
    }

    /// The `|`-joined token list a page fingerprint hashes.
    pub fn page_seed(&self, page: &Record) -> Result<Option<(CleanUrl, String)>, StoreError> {
        let raw_url = page.get("url");
        if is_blank(raw_url) {
            return Ok(None);
        }
        let raw_url = value_to_string(raw_url);
        let clean = clean_url(&raw_url)?;

        let mut tokens = Vec::with_capacity(12);
        tokens.push(format!(
            "method:{}",
            value_to_string(page.get("method")).to_lowercase()
        ));
        let url = if is_truthy(page.get("no_url_encode")) {
            raw_url.trim_start().to_string()
        } else {
            clean.to_string()
        };
        tokens.push(format!("url:{url}"));
        tokens.push(format!("headers:{}", format_headers(page.get("headers"))));
        tokens.push(format!("body:{}", value_to_string(page.get("body"))));
        tokens.push(format!(
            "no_redirect:{}",
            is_truthy(page.get("no_redirect"))
        ));
        let ua_type = match value_to_string(page.get("ua_type")) {
            ua if ua.is_empty() => DEFAULT_UA_TYPE.to_string(),
            ua => ua,
        };
        tokens.push(format!("ua_type:{ua_type}"));

        if !is_default_fetch_type(page.get("fetch_type")) {
            tokens.push(format!(
                "fetch_type:{}",
                value_to_string(page.get("fetch_type"))
            ));
        }
        if !is_blank(page.get("cookie")) {
            tokens.push(format!(
                "cookie:{}",
                canonical_cookie(&value_to_string(page.get("cookie")))
            ));
        }
        if is_truthy(page.get("http2")) {
            tokens.push("http2:true".to_string());
        }
        let driver = page.get("driver");
        if !is_driver_empty(driver) {
            tokens.push(format!(
                "driverName:{}",
                value_to_string(driver.and_then(|d| d.get("name")))
            ));
        }
        let display = page.get("display");
        if !is_display_empty(display) {
            tokens.push(format!(
                "display:{}x{}",
                value_to_string(display.and_then(|d| d.get("width"))),
                value_to_string(display.and_then(|d| d.get("height")))
            ));
        }
        if let Some(screenshot) = page.get("screenshot") {
            if !is_screenshot_empty(Some(screenshot)) {
                tokens.push(format!("screenshot:{}", self.hash(&screenshot.to_string())));
            }
        }

        let seed = tokens.join("|");
        db_trace!("page seed {seed}");
        Ok(Some((clean, seed)))
    }
}

/// Cookie segments sorted and rejoined with `;`.
fn canonical_cookie(cookie: &str) -> String {
    let mut parts: Vec<&str> = cookie
        .split(';')
        .enumerate()
        .map(|(index, part)| {
            if index == 0 {
                part
            } else {
                part.trim_start_matches([' ', '\t', '\n', '\r', '\x0b', '\x0c'])
            }
        })
        .collect();
    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }
    parts.sort_unstable();
    parts.join(";")
}

/// Order-independent rendering of a header map: `name:value` entries with
/// lowercase names and sorted list values, sorted and joined with `;`.
pub fn format_headers(headers: Option<&Value>) -> String {
    let Some(Value::Object(headers)) = headers else {
        return String::new();
    };
    let mut entries: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::Array(values) => {
                    let mut values: Vec<String> =
                        values.iter().map(|v| value_to_string(Some(v))).collect();
                    values.sort_unstable();
                    values.join(",")
                }
                other => value_to_string(Some(other)),
            };
            format!("{}:{}", name.to_lowercase(), rendered)
        })
        .collect();
    entries.sort_unstable();
    entries.join(";")
}

pub fn is_default_fetch_type(fetch_type: Option<&Value>) -> bool {
    match fetch_type {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s == DEFAULT_FETCH_TYPE,
        Some(_) => false,
    }
}

pub fn is_driver_empty(driver: Option<&Value>) -> bool {
    let Some(Value::Object(driver)) = driver else {
        return true;
    };
    if ["name", "code", "pre_code"]
        .iter()
        .any(|field| !is_blank(driver.get(*field)))
    {
        return false;
    }
    if is_truthy(driver.get("stealth")) || is_truthy(driver.get("enable_images")) {
        return false;
    }
    !matches!(driver.get("goto_options"), Some(Value::Object(options)) if !options.is_empty())
}

pub fn is_display_empty(display: Option<&Value>) -> bool {
    let Some(Value::Object(display)) = display else {
        return true;
    };
    let positive = |field: &str| {
        let value = display.get(field);
        !is_nil(value) && to_float(value).ceil() > 0.0
    };
    !(positive("width") || positive("height"))
}

pub fn is_screenshot_empty(screenshot: Option<&Value>) -> bool {
    let Some(Value::Object(screenshot)) = screenshot else {
        return true;
    };
    if !is_truthy(screenshot.get("take_screenshot")) {
        return true;
    }
    !matches!(
        screenshot.get("options"),
        None | Some(Value::Null) | Some(Value::Object(_))
    )
}

pub fn is_map_empty(map: Option<&Value>) -> bool {
    !matches!(map, Some(Value::Object(map)) if !map.is_empty())
}
