//! Connection string parsing.
//!
//! A DSN has the shape
//! `user[:password]@protocol(address)/dbname[?key=value&...]`. Parsing is
//! anchored on the last `/`, so a time zone containing a slash must be
//! percent-encoded (`loc=Asia%2FShanghai`).

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Result, RtdbError};

pub const DEFAULT_PROTOCOL: &str = "tcp";
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:9000";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_CHARSET: &str = "iso-8859-1";
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(500);

/// Character sets understood by the native client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Unknown,
    Gbk,
    Utf8,
    Ucs2Le,
    Ucs2Be,
    Big5,
    EucJp,
    ShiftJis,
    EucKr,
    Iso8859_1,
    Windows1251,
    Windows1252,
}

impl Charset {
    /// Looks up a charset by name, ignoring case. The empty name is
    /// [`Charset::Unknown`].
    pub fn from_name(name: &str) -> Option<Self> {
        let charset = match name.to_ascii_lowercase().as_str() {
            "" => Charset::Unknown,
            "gbk" => Charset::Gbk,
            "utf-8" => Charset::Utf8,
            "ucs-2le" => Charset::Ucs2Le,
            "ucs-2be" => Charset::Ucs2Be,
            "big-5" => Charset::Big5,
            "euc-jp" => Charset::EucJp,
            "shift-jis" => Charset::ShiftJis,
            "euc-kr" => Charset::EucKr,
            "iso-8859-1" => Charset::Iso8859_1,
            "windows-1251" => Charset::Windows1251,
            "windows-1252" => Charset::Windows1252,
            _ => return None,
        };
        Some(charset)
    }

    /// Canonical lowercase name passed to the native client.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Unknown => "",
            Charset::Gbk => "gbk",
            Charset::Utf8 => "utf-8",
            Charset::Ucs2Le => "ucs-2le",
            Charset::Ucs2Be => "ucs-2be",
            Charset::Big5 => "big-5",
            Charset::EucJp => "euc-jp",
            Charset::ShiftJis => "shift-jis",
            Charset::EucKr => "euc-kr",
            Charset::Iso8859_1 => "iso-8859-1",
            Charset::Windows1251 => "windows-1251",
            Charset::Windows1252 => "windows-1252",
        }
    }
}

/// Time zone used when rendering date/time literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Utc,
    Local,
    Zone(chrono_tz::Tz),
}

impl Location {
    /// Resolves a time zone name. `""` and `UTC` are UTC, `Local` is the
    /// process time zone, anything else must be an IANA zone name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "" | "UTC" => Ok(Location::Utc),
            "Local" => Ok(Location::Local),
            other => other
                .parse::<chrono_tz::Tz>()
                .map(Location::Zone)
                .map_err(|e| RtdbError::malformed(format!("unknown time zone '{}': {}", other, e))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Location::Utc => "UTC",
            Location::Local => "Local",
            Location::Zone(tz) => tz.name(),
        }
    }

    /// Formats an instant in this location.
    pub fn format(&self, instant: &DateTime<Utc>, fmt: &str) -> String {
        match self {
            Location::Utc => instant.format(fmt).to_string(),
            Location::Local => instant.with_timezone(&chrono::Local).format(fmt).to_string(),
            Location::Zone(tz) => instant.with_timezone(tz).format(fmt).to_string(),
        }
    }
}

/// Structured connection configuration parsed from a DSN.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub user: String,
    pub password: String,
    /// Network protocol tag, e.g. `tcp` or `unix`.
    pub protocol: String,
    /// Network address, usually `host:port`.
    pub address: String,
    pub db_name: String,
    pub location: Location,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Lowercase charset name sent with every query.
    pub charset: String,
    /// Every `key=value` pair from the DSN, including recognised ones.
    pub params: BTreeMap<String, String>,
    pub parse_time: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            db_name: String::new(),
            location: Location::Utc,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            charset: DEFAULT_CHARSET.to_string(),
            params: BTreeMap::new(),
            parse_time: false,
        }
    }
}

impl Config {
    /// Splits the address into host and port.
    ///
    /// Anything other than a well-formed `host:port` falls back to
    /// `127.0.0.1:9000`.
    pub fn host_and_port(&self) -> (String, u16) {
        let mut parts = self.address.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) if !host.is_empty() => match port.parse::<u16>() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
            },
            _ => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
        }
    }

    /// Connection string understood by the native `connect` call.
    pub fn native_conn_str(&self) -> String {
        let (host, port) = self.host_and_port();
        format!(
            "user={};passwd={};servers=tcp://{}:{}",
            self.user, self.password, host, port
        )
    }

    /// Rebuilds a DSN from the structured fields. Params are emitted in
    /// sorted key order.
    pub fn to_dsn(&self) -> String {
        let mut dsn = self.user.clone();
        if !self.password.is_empty() {
            dsn.push(':');
            dsn.push_str(&self.password);
        }
        let _ = write!(dsn, "@{}({})/", self.protocol, self.address);
        dsn.push_str(&self.db_name);
        for (i, (key, value)) in self.params.iter().enumerate() {
            dsn.push(if i == 0 { '?' } else { '&' });
            let _ = write!(dsn, "{}={}", key, value);
        }
        dsn
    }

    /// Applies the recognised parameters (`charset`, `loc`, `parseTime`).
    fn apply_params(&mut self) -> Result<()> {
        if let Some(loc) = self.params.get("loc") {
            let decoded = urlencoding::decode(loc)
                .map_err(|e| RtdbError::malformed(format!("invalid loc '{}': {}", loc, e)))?;
            self.location = Location::from_name(&decoded)?;
        }
        if let Some(charset) = self.params.get("charset") {
            let parsed = Charset::from_name(charset).ok_or_else(|| {
                warn!(charset = %charset, "parse charset failed");
                RtdbError::malformed(format!("unknown charset '{}'", charset))
            })?;
            if parsed != Charset::Unknown {
                self.charset = parsed.name().to_string();
            }
        }
        if let Some(parse_time) = self.params.get("parseTime") {
            self.parse_time = match parse_time.as_str() {
                "true" | "t" | "T" | "True" | "1" => true,
                "false" | "f" | "F" | "False" | "0" => false,
                other => {
                    warn!(value = %other, "parse time failed");
                    return Err(RtdbError::malformed(format!("invalid parseTime '{}'", other)));
                }
            };
        }
        Ok(())
    }
}

/// Parses a DSN into a [`Config`].
///
/// An empty DSN yields the default configuration. A non-empty DSN without a
/// `/` is rejected.
pub fn parse_dsn(dsn: &str) -> Result<Config> {
    let mut config = Config::default();
    if dsn.is_empty() {
        return Ok(config);
    }

    let Some(slash) = dsn.rfind('/') else {
        warn!("slash not found in dsn");
        return Err(RtdbError::malformed("dsn is missing the '/' before the database name"));
    };

    if slash > 0 {
        parse_authority(&dsn[..slash], &mut config);
    }

    let tail = &dsn[slash + 1..];
    match tail.split_once('?') {
        Some((db_name, params)) => {
            config.db_name = db_name.to_string();
            config.params = parse_params(params);
        }
        None => config.db_name = tail.to_string(),
    }

    config.apply_params()?;
    Ok(config)
}

/// Parses `user[:password]@protocol(address)` into `config`.
fn parse_authority(authority: &str, config: &mut Config) {
    let credentials = match authority.rfind('@') {
        Some(at) => {
            parse_target(&authority[at + 1..], config);
            &authority[..at]
        }
        None => authority,
    };

    match credentials.split_once(':') {
        Some((user, password)) => {
            config.user = user.to_string();
            config.password = password.to_string();
        }
        None => config.user = credentials.to_string(),
    }
}

/// Parses `protocol(address)` or a bare `protocol`. Empty parts keep the
/// defaults.
fn parse_target(target: &str, config: &mut Config) {
    let (protocol, address) = match (target.find('('), target.rfind(')')) {
        (Some(open), Some(close)) if open < close => (&target[..open], &target[open + 1..close]),
        _ => (target, ""),
    };
    if !protocol.is_empty() {
        config.protocol = protocol.to_string();
    }
    if !address.is_empty() {
        config.address = address.to_string();
    }
}

/// Parses `k=v&k=v`. Pairs without exactly one `=` are skipped.
fn parse_params(params: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for pair in params.split('&').filter(|pair| !pair.is_empty()) {
        let mut parts = pair.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => warn!(pair = %pair, "parse kv pair failed"),
        }
    }
    map
}
