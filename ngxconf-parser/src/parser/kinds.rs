//! Specialized directive kinds
//!
//! Every directive carries a [`DirectiveKind`]. Generic directives use
//! [`DirectiveKind::Generic`]; the registry upgrades recognized ones to a
//! typed variant whose payload holds the fields parsed from the directive's
//! parameters. The generic name, parameters and block stay on the
//! [`Directive`] itself, so generic traversal works on every variant.

use crate::parser::ast::{Config, Directive, Parameter};
use crate::parser::classifier::unquote;
use ngxconf_core::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DirectiveKind {
    #[default]
    Generic,
    Http,
    Server,
    Location(Location),
    Upstream(Upstream),
    UpstreamServer(UpstreamServer),
    Map(Map),
    MapEntry(MapEntry),
    Geo(Geo),
    GeoEntry(GeoEntry),
    SplitClients(SplitClients),
    SplitClientsEntry(SplitClientsEntry),
    Stream,
    StreamServer,
    StreamUpstream(StreamUpstream),
    StreamUpstreamServer(StreamUpstreamServer),
    Include(Include),
    LimitReqZone(LimitReqZone),
    LimitConnZone(LimitConnZone),
    ProxyCachePath(ProxyCachePath),
    /// Block whose body is kept verbatim (`content_by_lua_block` and friends)
    LuaBlock,
}

impl DirectiveKind {
    pub fn is_generic(&self) -> bool {
        matches!(self, DirectiveKind::Generic)
    }

    /// Short label for logs and diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            DirectiveKind::Generic => "generic",
            DirectiveKind::Http => "http",
            DirectiveKind::Server => "server",
            DirectiveKind::Location(_) => "location",
            DirectiveKind::Upstream(_) => "upstream",
            DirectiveKind::UpstreamServer(_) => "upstream server",
            DirectiveKind::Map(_) => "map",
            DirectiveKind::MapEntry(_) => "map entry",
            DirectiveKind::Geo(_) => "geo",
            DirectiveKind::GeoEntry(_) => "geo entry",
            DirectiveKind::SplitClients(_) => "split_clients",
            DirectiveKind::SplitClientsEntry(_) => "split_clients entry",
            DirectiveKind::Stream => "stream",
            DirectiveKind::StreamServer => "stream server",
            DirectiveKind::StreamUpstream(_) => "stream upstream",
            DirectiveKind::StreamUpstreamServer(_) => "stream upstream server",
            DirectiveKind::Include(_) => "include",
            DirectiveKind::LimitReqZone(_) => "limit_req_zone",
            DirectiveKind::LimitConnZone(_) => "limit_conn_zone",
            DirectiveKind::ProxyCachePath(_) => "proxy_cache_path",
            DirectiveKind::LuaBlock => "lua block",
        }
    }
}

fn shape_error(directive: &Directive, message: impl fmt::Display) -> Error {
    Error::validation(format!("'{}' {}", directive.name(), message)).at_line(directive.line)
}

fn expect_params(directive: &Directive, range: std::ops::RangeInclusive<usize>) -> Result<()> {
    let count = directive.parameters.len();
    if range.contains(&count) {
        return Ok(());
    }
    let expected = if range.start() == range.end() {
        format!("{}", range.start())
    } else {
        format!("{} to {}", range.start(), range.end())
    };
    Err(shape_error(
        directive,
        format!("expects {} parameter(s), found {}", expected, count),
    ))
}

fn expect_no_params(directive: &Directive) -> Result<()> {
    expect_params(directive, 0..=0)
}

/// `http { ... }`
pub fn http(directive: &Directive) -> Result<DirectiveKind> {
    expect_no_params(directive)?;
    Ok(DirectiveKind::Http)
}

/// `server { ... }` inside `http`
pub fn server(directive: &Directive) -> Result<DirectiveKind> {
    expect_no_params(directive)?;
    Ok(DirectiveKind::Server)
}

/// `stream { ... }`
pub fn stream(directive: &Directive) -> Result<DirectiveKind> {
    expect_no_params(directive)?;
    Ok(DirectiveKind::Stream)
}

/// `server { ... }` inside `stream`
pub fn stream_server(directive: &Directive) -> Result<DirectiveKind> {
    expect_no_params(directive)?;
    Ok(DirectiveKind::StreamServer)
}

pub fn lua_block(directive: &Directive) -> Result<DirectiveKind> {
    if directive.block().is_some_and(|b| b.is_raw()) {
        Ok(DirectiveKind::LuaBlock)
    } else {
        Err(shape_error(directive, "must be followed by a { ... } body"))
    }
}

// ============================================================
// Location
// ============================================================

/// Location match modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationModifier {
    /// `=`
    Exact,
    /// `^~`
    PreferPrefix,
    /// `~`
    Regex,
    /// `~*`
    RegexCaseless,
}

impl LocationModifier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Exact),
            "^~" => Some(Self::PreferPrefix),
            "~" => Some(Self::Regex),
            "~*" => Some(Self::RegexCaseless),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "=",
            Self::PreferPrefix => "^~",
            Self::Regex => "~",
            Self::RegexCaseless => "~*",
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex | Self::RegexCaseless)
    }
}

impl fmt::Display for LocationModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `location [modifier] pattern { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub modifier: Option<LocationModifier>,
    pub pattern: String,
}

impl Location {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        expect_params(directive, 1..=2)?;
        let first = directive.parameters[0].value();
        if let Some(second) = directive.param(1) {
            let modifier = LocationModifier::parse(first).ok_or_else(|| {
                shape_error(directive, format!("has unknown modifier '{}'", first))
            })?;
            return Ok(Self {
                modifier: Some(modifier),
                pattern: second.to_string(),
            });
        }
        // Modifier written without a space: `location =/favicon.ico`
        for prefix in ["~*", "^~", "~", "="] {
            if let Some(rest) = first.strip_prefix(prefix) {
                if !rest.is_empty() {
                    return Ok(Self {
                        modifier: LocationModifier::parse(prefix),
                        pattern: rest.to_string(),
                    });
                }
            }
        }
        if LocationModifier::parse(first).is_some() {
            return Err(shape_error(directive, "has a modifier but no pattern"));
        }
        Ok(Self {
            modifier: None,
            pattern: first.to_string(),
        })
    }

    /// `location @name`
    pub fn is_named(&self) -> bool {
        self.pattern.starts_with('@')
    }

    pub fn to_directive(&self) -> Directive {
        let mut params = Vec::new();
        if let Some(m) = self.modifier {
            params.push(Parameter::new(m.as_str()));
        }
        params.push(Parameter::new(self.pattern.as_str()));
        Directive::new_block("location", params).with_kind(DirectiveKind::Location(self.clone()))
    }
}

pub fn location(directive: &Directive) -> Result<DirectiveKind> {
    Location::from_directive(directive).map(DirectiveKind::Location)
}

// ============================================================
// Upstream
// ============================================================

/// `upstream name { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub name: String,
}

pub type StreamUpstream = Upstream;

impl Upstream {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        expect_params(directive, 1..=1)?;
        Ok(Self {
            name: unquote(directive.parameters[0].value()),
        })
    }
}

pub fn upstream(directive: &Directive) -> Result<DirectiveKind> {
    Upstream::from_directive(directive).map(DirectiveKind::Upstream)
}

pub fn stream_upstream(directive: &Directive) -> Result<DirectiveKind> {
    Upstream::from_directive(directive).map(DirectiveKind::StreamUpstream)
}

/// `server address [weight=N] [backup] ...;` inside an upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamServer {
    pub address: String,
    /// Bare flags such as `backup`, `down`, `resolve`
    pub flags: Vec<String>,
    /// `key=value` options in source order
    pub options: Vec<(String, String)>,
}

pub type StreamUpstreamServer = UpstreamServer;

impl UpstreamServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            flags: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn from_directive(directive: &Directive) -> Result<Self> {
        if directive.is_block() {
            return Err(shape_error(directive, "inside an upstream cannot have a block"));
        }
        let Some((address, rest)) = directive.parameters.split_first() else {
            return Err(shape_error(directive, "inside an upstream requires an address"));
        };
        let mut server = Self::new(address.value());
        for param in rest {
            match param.value().split_once('=') {
                Some((k, v)) => server.options.push((k.to_string(), v.to_string())),
                None => server.flags.push(param.value().to_string()),
            }
        }
        Ok(server)
    }

    pub fn params(&self) -> Vec<Parameter> {
        let mut params = vec![Parameter::new(self.address.as_str())];
        params.extend(
            self.options
                .iter()
                .map(|(k, v)| Parameter::new(format!("{}={}", k, v))),
        );
        params.extend(self.flags.iter().map(|f| Parameter::new(f.as_str())));
        params
    }

    pub(crate) fn to_directive(&self, kind: DirectiveKind) -> Directive {
        Directive::leaf("server", self.params()).with_kind(kind)
    }
}

pub fn upstream_server(directive: &Directive) -> Result<DirectiveKind> {
    UpstreamServer::from_directive(directive).map(DirectiveKind::UpstreamServer)
}

pub fn stream_upstream_server(directive: &Directive) -> Result<DirectiveKind> {
    UpstreamServer::from_directive(directive).map(DirectiveKind::StreamUpstreamServer)
}

// ============================================================
// Map, geo and split_clients
// ============================================================

/// `map $source $variable { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    pub source: String,
    pub variable: String,
}

impl Map {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        expect_params(directive, 2..=2)?;
        Ok(Self {
            source: directive.parameters[0].value().to_string(),
            variable: directive.parameters[1].value().to_string(),
        })
    }
}

pub fn map(directive: &Directive) -> Result<DirectiveKind> {
    Map::from_directive(directive).map(DirectiveKind::Map)
}

/// Names inside a `map` block that are settings, not entries
pub const MAP_KEYWORDS: [&str; 4] = ["default", "hostnames", "volatile", "include"];

/// `pattern value;` inside a map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub pattern: String,
    pub value: String,
}

impl MapEntry {
    pub fn new(pattern: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            value: value.into(),
        }
    }

    pub fn to_directive(&self) -> Directive {
        Directive::leaf(&self.pattern, [self.value.as_str()])
            .with_kind(DirectiveKind::MapEntry(self.clone()))
    }
}

pub fn map_entry(directive: &Directive) -> Result<DirectiveKind> {
    if MAP_KEYWORDS.contains(&directive.name()) {
        return Ok(DirectiveKind::Generic);
    }
    entry_shape(directive)?;
    Ok(DirectiveKind::MapEntry(MapEntry::new(
        directive.name(),
        directive.parameters[0].value(),
    )))
}

fn entry_shape(directive: &Directive) -> Result<()> {
    if directive.is_block() {
        return Err(shape_error(directive, "entry cannot have a block"));
    }
    expect_params(directive, 1..=1)
}

/// `geo [$source] $variable { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geo {
    /// Address source, `$remote_addr` when omitted
    pub source: String,
    pub variable: String,
}

impl Geo {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        expect_params(directive, 1..=2)?;
        let (source, variable) = match directive.parameters.as_slice() {
            [variable] => ("$remote_addr".to_string(), variable.value().to_string()),
            [source, variable] => (source.value().to_string(), variable.value().to_string()),
            _ => unreachable!("parameter count checked above"),
        };
        Ok(Self { source, variable })
    }
}

pub fn geo(directive: &Directive) -> Result<DirectiveKind> {
    Geo::from_directive(directive).map(DirectiveKind::Geo)
}

/// Names inside a `geo` block that are settings, not entries
pub const GEO_KEYWORDS: [&str; 6] = ["default", "ranges", "delete", "proxy", "proxy_recursive", "include"];

/// `network value;` inside a geo block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoEntry {
    pub network: String,
    pub value: String,
}

impl GeoEntry {
    pub fn new(network: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            value: value.into(),
        }
    }

    pub fn to_directive(&self) -> Directive {
        Directive::leaf(&self.network, [self.value.as_str()])
            .with_kind(DirectiveKind::GeoEntry(self.clone()))
    }
}

pub fn geo_entry(directive: &Directive) -> Result<DirectiveKind> {
    if GEO_KEYWORDS.contains(&directive.name()) {
        return Ok(DirectiveKind::Generic);
    }
    entry_shape(directive)?;
    Ok(DirectiveKind::GeoEntry(GeoEntry::new(
        directive.name(),
        directive.parameters[0].value(),
    )))
}

/// `split_clients "string" $variable { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitClients {
    pub source: String,
    pub variable: String,
}

impl SplitClients {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        expect_params(directive, 2..=2)?;
        Ok(Self {
            source: directive.parameters[0].value().to_string(),
            variable: directive.parameters[1].value().to_string(),
        })
    }
}

pub fn split_clients(directive: &Directive) -> Result<DirectiveKind> {
    SplitClients::from_directive(directive).map(DirectiveKind::SplitClients)
}

/// `percent% value;` or `* value;` inside split_clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitClientsEntry {
    pub percent: String,
    pub value: String,
}

impl SplitClientsEntry {
    pub fn new(percent: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            percent: percent.into(),
            value: value.into(),
        }
    }

    /// Numeric share, `None` for the `*` remainder entry
    pub fn share(&self) -> Option<f64> {
        self.percent.strip_suffix('%').and_then(|p| p.parse().ok())
    }

    pub fn to_directive(&self) -> Directive {
        Directive::leaf(&self.percent, [self.value.as_str()])
            .with_kind(DirectiveKind::SplitClientsEntry(self.clone()))
    }
}

pub fn split_clients_entry(directive: &Directive) -> Result<DirectiveKind> {
    if directive.is("include") {
        return Ok(DirectiveKind::Generic);
    }
    entry_shape(directive)?;
    let entry = SplitClientsEntry::new(directive.name(), directive.parameters[0].value());
    if entry.percent != "*" && entry.share().is_none() {
        return Err(shape_error(directive, "is not a percentage or '*'"));
    }
    Ok(DirectiveKind::SplitClientsEntry(entry))
}

// ============================================================
// Include
// ============================================================

/// `include pattern;`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Include {
    pub pattern: String,
    /// Parsed trees of every matched file, filled only when expanding
    pub configs: Vec<Config>,
}

impl Include {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        if directive.is_block() {
            return Err(shape_error(directive, "cannot have a block"));
        }
        expect_params(directive, 1..=1)?;
        Ok(Self {
            pattern: unquote(directive.parameters[0].value()),
            configs: Vec::new(),
        })
    }

    pub fn is_expanded(&self) -> bool {
        !self.configs.is_empty()
    }
}

pub fn include(directive: &Directive) -> Result<DirectiveKind> {
    Include::from_directive(directive).map(DirectiveKind::Include)
}

// ============================================================
// Zones
// ============================================================

/// `zone=name:size` as used by zone-defining directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub name: String,
    pub size: String,
}

impl Zone {
    fn parse(directive: &Directive, key: &str, value: &str) -> Result<Self> {
        match value.split_once(':') {
            Some((name, size)) if !name.is_empty() && !size.is_empty() => Ok(Self {
                name: name.to_string(),
                size: size.to_string(),
            }),
            _ => Err(shape_error(
                directive,
                format!("{}={} is missing its size (expected {}=name:size)", key, value, key),
            )),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.size)
    }
}

fn option<'a>(directive: &'a Directive, key: &str) -> Option<&'a str> {
    directive.parameters.iter().find_map(|p| {
        p.value()
            .split_once('=')
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
    })
}

fn require_zone(directive: &Directive, key: &str) -> Result<Zone> {
    let value = option(directive, key).ok_or_else(|| {
        shape_error(directive, format!("requires {}=name:size", key))
    })?;
    Zone::parse(directive, key, value)
}

fn leaf_with_key(directive: &Directive) -> Result<String> {
    if directive.is_block() {
        return Err(shape_error(directive, "cannot have a block"));
    }
    match directive.parameters.first() {
        Some(p) if !p.value().contains('=') => Ok(p.value().to_string()),
        _ => Err(shape_error(directive, "requires a key as its first parameter")),
    }
}

/// `limit_req_zone key zone=name:size rate=rate [sync];`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitReqZone {
    pub key: String,
    pub zone: Zone,
    pub rate: String,
    pub sync: bool,
}

impl LimitReqZone {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        let key = leaf_with_key(directive)?;
        let zone = require_zone(directive, "zone")?;
        let rate = option(directive, "rate")
            .filter(|r| is_rate(r))
            .ok_or_else(|| shape_error(directive, "requires rate=N r/s or r/m"))?
            .to_string();
        let sync = directive.parameters.iter().any(|p| p.value() == "sync");
        Ok(Self {
            key,
            zone,
            rate,
            sync,
        })
    }
}

/// `10r/s`, `30r/m`
pub fn is_rate(rate: &str) -> bool {
    rate.strip_suffix("r/s")
        .or_else(|| rate.strip_suffix("r/m"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

pub fn limit_req_zone(directive: &Directive) -> Result<DirectiveKind> {
    LimitReqZone::from_directive(directive).map(DirectiveKind::LimitReqZone)
}

/// `limit_conn_zone key zone=name:size;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitConnZone {
    pub key: String,
    pub zone: Zone,
}

impl LimitConnZone {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        let key = leaf_with_key(directive)?;
        let zone = require_zone(directive, "zone")?;
        Ok(Self { key, zone })
    }
}

pub fn limit_conn_zone(directive: &Directive) -> Result<DirectiveKind> {
    LimitConnZone::from_directive(directive).map(DirectiveKind::LimitConnZone)
}

/// `proxy_cache_path path keys_zone=name:size [levels=..] [inactive=..] ...;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCachePath {
    pub path: String,
    pub keys_zone: Zone,
    pub levels: Option<String>,
    pub inactive: Option<String>,
    pub max_size: Option<String>,
    pub use_temp_path: Option<bool>,
    /// Every other `key=value` parameter in source order
    pub options: Vec<(String, String)>,
}

impl ProxyCachePath {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        let path = leaf_with_key(directive)?;
        let keys_zone = require_zone(directive, "keys_zone")?;
        let mut cache = Self {
            path,
            keys_zone,
            levels: None,
            inactive: None,
            max_size: None,
            use_temp_path: None,
            options: Vec::new(),
        };
        for param in &directive.parameters[1..] {
            let Some((key, value)) = param.value().split_once('=') else {
                return Err(shape_error(
                    directive,
                    format!("has unexpected parameter '{}'", param.value()),
                ));
            };
            match key {
                "keys_zone" => {}
                "levels" => cache.levels = Some(value.to_string()),
                "inactive" => cache.inactive = Some(value.to_string()),
                "max_size" => cache.max_size = Some(value.to_string()),
                "use_temp_path" => cache.use_temp_path = Some(value == "on"),
                _ => cache.options.push((key.to_string(), value.to_string())),
            }
        }
        Ok(cache)
    }
}

pub fn proxy_cache_path(directive: &Directive) -> Result<DirectiveKind> {
    ProxyCachePath::from_directive(directive).map(DirectiveKind::ProxyCachePath)
}
