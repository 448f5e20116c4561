//! Typed views and typed mutation
//!
//! Views borrow a node and read its typed payload together with its
//! children. `*Mut` handles borrow the whole [`Config`] mutably; every
//! change they make goes through the generic arena primitives and updates
//! the typed payload, so both views of a node always agree.

use crate::parser::ast::{Config, Directive, NodeId, NodeRef, Parameter};
use crate::parser::kinds::{
    is_rate, DirectiveKind, Geo, GeoEntry, LimitReqZone, Location, LocationModifier, Map,
    MapEntry, SplitClients, SplitClientsEntry, Upstream, UpstreamServer, GEO_KEYWORDS,
    MAP_KEYWORDS,
};
use ngxconf_core::{Error, Result};

// ============================================================
// Read views
// ============================================================

/// An `http`-context `server` block
#[derive(Debug, Clone, Copy)]
pub struct ServerView<'a> {
    node: NodeRef<'a>,
}

impl<'a> ServerView<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    /// Every name from every `server_name` directive, in order
    pub fn server_names(&self) -> Vec<&'a str> {
        self.node
            .children_named("server_name")
            .flat_map(|d| d.parameters().iter().map(|p| p.value()))
            .collect()
    }

    /// First parameter of every `listen` directive
    pub fn listens(&self) -> Vec<&'a str> {
        self.node
            .children_named("listen")
            .filter_map(|d| d.param(0))
            .collect()
    }

    /// Ports this server listens on; 80 when it has no `listen`
    pub fn ports(&self) -> Vec<u16> {
        let listens = self.listens();
        if listens.is_empty() {
            return vec![80];
        }
        listens.into_iter().filter_map(listen_port).collect()
    }

    /// Direct `location` children
    pub fn locations(&self) -> Vec<LocationView<'a>> {
        self.node.children().filter_map(|c| c.as_location()).collect()
    }
}

/// Port of a `listen` address; `None` for unix sockets
pub fn listen_port(address: &str) -> Option<u16> {
    if address.starts_with("unix:") {
        return None;
    }
    if let Ok(port) = address.parse() {
        return Some(port);
    }
    // `[::1]` has colons but no port
    match address.rsplit_once(':') {
        Some((_, port)) => port.parse().ok().or(Some(80)),
        None => Some(80),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocationView<'a> {
    node: NodeRef<'a>,
    location: &'a Location,
}

impl<'a> LocationView<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn modifier(&self) -> Option<LocationModifier> {
        self.location.modifier
    }

    pub fn pattern(&self) -> &'a str {
        &self.location.pattern
    }

    pub fn is_named(&self) -> bool {
        self.location.is_named()
    }

    /// Nested `location` blocks
    pub fn locations(&self) -> Vec<LocationView<'a>> {
        self.node.children().filter_map(|c| c.as_location()).collect()
    }
}

/// An `upstream` block, in `http` or in `stream`
#[derive(Debug, Clone, Copy)]
pub struct UpstreamView<'a> {
    node: NodeRef<'a>,
    upstream: &'a Upstream,
    stream: bool,
}

impl<'a> UpstreamView<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn name(&self) -> &'a str {
        &self.upstream.name
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Server entries in order, including those pulled in by includes
    pub fn servers(&self) -> Vec<&'a UpstreamServer> {
        self.node
            .descendants()
            .filter_map(|d| match d.kind() {
                DirectiveKind::UpstreamServer(s) | DirectiveKind::StreamUpstreamServer(s) => {
                    Some(s)
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapView<'a> {
    node: NodeRef<'a>,
    map: &'a Map,
}

impl<'a> MapView<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn source(&self) -> &'a str {
        &self.map.source
    }

    pub fn variable(&self) -> &'a str {
        &self.map.variable
    }

    pub fn entries(&self) -> Vec<&'a MapEntry> {
        self.node
            .descendants()
            .filter_map(|d| match d.kind() {
                DirectiveKind::MapEntry(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Value of the entry matching `pattern` exactly
    pub fn get(&self, pattern: &str) -> Option<&'a str> {
        self.entries()
            .into_iter()
            .find(|e| e.pattern == pattern)
            .map(|e| e.value.as_str())
    }

    pub fn default_value(&self) -> Option<&'a str> {
        default_of(self.node)
    }

    pub fn hostnames(&self) -> bool {
        self.node.children_named("hostnames").next().is_some()
    }
}

fn default_of(node: NodeRef<'_>) -> Option<&str> {
    node.children_named("default").find_map(|d| d.param(0))
}

#[derive(Debug, Clone, Copy)]
pub struct GeoView<'a> {
    node: NodeRef<'a>,
    geo: &'a Geo,
}

impl<'a> GeoView<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn source(&self) -> &'a str {
        &self.geo.source
    }

    pub fn variable(&self) -> &'a str {
        &self.geo.variable
    }

    pub fn entries(&self) -> Vec<&'a GeoEntry> {
        self.node
            .descendants()
            .filter_map(|d| match d.kind() {
                DirectiveKind::GeoEntry(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn default_value(&self) -> Option<&'a str> {
        default_of(self.node)
    }

    pub fn is_ranges(&self) -> bool {
        self.node.children_named("ranges").next().is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SplitClientsView<'a> {
    node: NodeRef<'a>,
    split: &'a SplitClients,
}

impl<'a> SplitClientsView<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn source(&self) -> &'a str {
        &self.split.source
    }

    pub fn variable(&self) -> &'a str {
        &self.split.variable
    }

    pub fn entries(&self) -> Vec<&'a SplitClientsEntry> {
        self.node
            .descendants()
            .filter_map(|d| match d.kind() {
                DirectiveKind::SplitClientsEntry(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Sum of the explicit percentages
    pub fn total_share(&self) -> f64 {
        self.entries().iter().filter_map(|e| e.share()).sum()
    }
}

impl<'a> NodeRef<'a> {
    pub fn as_server(&self) -> Option<ServerView<'a>> {
        matches!(self.kind(), DirectiveKind::Server).then_some(ServerView { node: *self })
    }

    pub fn as_location(&self) -> Option<LocationView<'a>> {
        match self.kind() {
            DirectiveKind::Location(location) => Some(LocationView {
                node: *self,
                location,
            }),
            _ => None,
        }
    }

    pub fn as_upstream(&self) -> Option<UpstreamView<'a>> {
        match self.kind() {
            DirectiveKind::Upstream(upstream) => Some(UpstreamView {
                node: *self,
                upstream,
                stream: false,
            }),
            DirectiveKind::StreamUpstream(upstream) => Some(UpstreamView {
                node: *self,
                upstream,
                stream: true,
            }),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<MapView<'a>> {
        match self.kind() {
            DirectiveKind::Map(map) => Some(MapView { node: *self, map }),
            _ => None,
        }
    }

    pub fn as_geo(&self) -> Option<GeoView<'a>> {
        match self.kind() {
            DirectiveKind::Geo(geo) => Some(GeoView { node: *self, geo }),
            _ => None,
        }
    }

    pub fn as_split_clients(&self) -> Option<SplitClientsView<'a>> {
        match self.kind() {
            DirectiveKind::SplitClients(split) => Some(SplitClientsView { node: *self, split }),
            _ => None,
        }
    }
}

// ============================================================
// Typed mutation
// ============================================================

fn kind_mismatch(config: &Config, id: NodeId, expected: &str) -> Error {
    match config.directive(id) {
        Some(d) => Error::validation(format!(
            "'{}' is a {} node, not {}",
            d.name(),
            d.kind().label(),
            expected
        ))
        .at_line(d.line),
        None => Error::validation(format!("node {} no longer exists", id)),
    }
}

fn checked(config: &Config, id: NodeId, expected: &str, ok: fn(&DirectiveKind) -> bool) -> Result<()> {
    match config.directive(id) {
        Some(d) if ok(d.kind()) => Ok(()),
        _ => Err(kind_mismatch(config, id, expected)),
    }
}

fn find_child(config: &Config, id: NodeId, pred: impl Fn(&Directive) -> bool) -> Option<NodeId> {
    config
        .children(Some(id))
        .iter()
        .copied()
        .find(|&c| config.directive(c).is_some_and(&pred))
}

/// Point `default` at `value`, creating it as the first child if missing
fn set_default(config: &mut Config, id: NodeId, value: &str) -> Result<NodeId> {
    match find_child(config, id, |d| d.is("default")) {
        Some(existing) => {
            if let Some(directive) = config.directive_mut(existing) {
                directive.parameters = vec![Parameter::new(value)];
            }
            Ok(existing)
        }
        None => config.insert(Some(id), 0, Directive::leaf("default", [value])),
    }
}

/// `default` is routed to [`set_default`]; other keywords are not entries
fn keyword_entry(
    config: &mut Config,
    id: NodeId,
    keywords: &[&str],
    key: &str,
    value: &str,
) -> Option<Result<NodeId>> {
    match key {
        "default" => Some(set_default(config, id, value)),
        _ if keywords.contains(&key) => Some(Err(Error::validation(format!(
            "'{}' is a keyword, not an entry",
            key
        )))),
        _ => None,
    }
}

/// Replace the value of an existing entry named `key` or append a new one
fn upsert_entry(
    config: &mut Config,
    id: NodeId,
    key: &str,
    value: &str,
    entry: Directive,
    update: impl FnOnce(&mut DirectiveKind),
) -> Result<NodeId> {
    let existing = find_child(config, id, |d| d.is(key) && !d.kind().is_generic());
    match existing {
        Some(existing) => {
            if let Some(directive) = config.directive_mut(existing) {
                directive.parameters = vec![Parameter::new(value)];
                update(directive.kind_mut());
            }
            Ok(existing)
        }
        None => config.append(Some(id), entry),
    }
}

/// Mutable handle on an `upstream` block
pub struct UpstreamMut<'a> {
    config: &'a mut Config,
    id: NodeId,
}

impl UpstreamMut<'_> {
    /// Append a server entry
    pub fn add_server(&mut self, server: UpstreamServer) -> Result<NodeId> {
        let stream = matches!(
            self.config.directive(self.id).map(|d| d.kind()),
            Some(DirectiveKind::StreamUpstream(_))
        );
        let kind = if stream {
            DirectiveKind::StreamUpstreamServer(server.clone())
        } else {
            DirectiveKind::UpstreamServer(server.clone())
        };
        self.config.append(Some(self.id), server.to_directive(kind))
    }

    /// Remove the first server entry with `address`
    pub fn remove_server(&mut self, address: &str) -> bool {
        let found = find_child(self.config, self.id, |d| match d.kind() {
            DirectiveKind::UpstreamServer(s) | DirectiveKind::StreamUpstreamServer(s) => {
                s.address == address
            }
            _ => false,
        });
        found.is_some_and(|id| self.config.remove(id))
    }
}

/// Mutable handle on a `map` block
pub struct MapMut<'a> {
    config: &'a mut Config,
    id: NodeId,
}

impl MapMut<'_> {
    /// Add `pattern value;`, replacing the value if the pattern exists
    pub fn add_entry(&mut self, pattern: &str, value: &str) -> Result<NodeId> {
        if let Some(result) = keyword_entry(self.config, self.id, &MAP_KEYWORDS, pattern, value) {
            return result;
        }
        let entry = MapEntry::new(pattern, value);
        let new_value = value.to_string();
        upsert_entry(self.config, self.id, pattern, value, entry.to_directive(), |kind| {
            if let DirectiveKind::MapEntry(e) = kind {
                e.value = new_value;
            }
        })
    }

    pub fn remove_entry(&mut self, pattern: &str) -> bool {
        let found = find_child(self.config, self.id, |d| {
            matches!(d.kind(), DirectiveKind::MapEntry(e) if e.pattern == pattern)
        });
        found.is_some_and(|id| self.config.remove(id))
    }

    pub fn set_default_value(&mut self, value: &str) -> Result<NodeId> {
        set_default(self.config, self.id, value)
    }
}

/// Mutable handle on a `geo` block
pub struct GeoMut<'a> {
    config: &'a mut Config,
    id: NodeId,
}

impl GeoMut<'_> {
    pub fn add_entry(&mut self, network: &str, value: &str) -> Result<NodeId> {
        if let Some(result) = keyword_entry(self.config, self.id, &GEO_KEYWORDS, network, value) {
            return result;
        }
        let entry = GeoEntry::new(network, value);
        let new_value = value.to_string();
        upsert_entry(self.config, self.id, network, value, entry.to_directive(), |kind| {
            if let DirectiveKind::GeoEntry(e) = kind {
                e.value = new_value;
            }
        })
    }

    pub fn set_default_value(&mut self, value: &str) -> Result<NodeId> {
        set_default(self.config, self.id, value)
    }
}

/// Mutable handle on a `split_clients` block
pub struct SplitClientsMut<'a> {
    config: &'a mut Config,
    id: NodeId,
}

impl SplitClientsMut<'_> {
    /// Append `percent value;`; `percent` is `N%` or `*`
    pub fn add_entry(&mut self, percent: &str, value: &str) -> Result<NodeId> {
        let entry = SplitClientsEntry::new(percent, value);
        if entry.percent != "*" && entry.share().is_none() {
            return Err(Error::validation(format!(
                "split_clients share '{}' is not a percentage or '*'",
                percent
            )));
        }
        self.config.append(Some(self.id), entry.to_directive())
    }
}

/// Mutable handle on an `http`-context `server` block
pub struct ServerMut<'a> {
    config: &'a mut Config,
    id: NodeId,
}

impl ServerMut<'_> {
    /// Append an empty `location` block
    pub fn add_location(&mut self, location: Location) -> Result<NodeId> {
        self.config.append(Some(self.id), location.to_directive())
    }

    /// Append a directive as is; its kind is left as built
    pub fn add_directive(&mut self, directive: Directive) -> Result<NodeId> {
        self.config.append(Some(self.id), directive)
    }
}

/// Mutable handle on a `limit_req_zone` directive
pub struct LimitReqZoneMut<'a> {
    config: &'a mut Config,
    id: NodeId,
}

impl LimitReqZoneMut<'_> {
    pub fn set_rate(&mut self, rate: &str) -> Result<()> {
        if !is_rate(rate) {
            return Err(Error::validation(format!(
                "'{}' is not a request rate such as 10r/s or 30r/m",
                rate
            )));
        }
        let id = self.id;
        let directive = self
            .config
            .directive_mut(id)
            .ok_or_else(|| Error::validation(format!("node {} no longer exists", id)))?;
        let param = Parameter::new(format!("rate={}", rate));
        match directive
            .parameters
            .iter()
            .position(|p| p.value().starts_with("rate="))
        {
            Some(index) => directive.parameters[index] = param,
            None => directive.parameters.push(param),
        }
        if let DirectiveKind::LimitReqZone(LimitReqZone { rate: current, .. }) = directive.kind_mut() {
            *current = rate.to_string();
        }
        Ok(())
    }
}

impl Config {
    pub fn upstream_mut(&mut self, id: NodeId) -> Result<UpstreamMut<'_>> {
        checked(self, id, "an upstream", |k| {
            matches!(k, DirectiveKind::Upstream(_) | DirectiveKind::StreamUpstream(_))
        })?;
        Ok(UpstreamMut { config: self, id })
    }

    pub fn map_mut(&mut self, id: NodeId) -> Result<MapMut<'_>> {
        checked(self, id, "a map", |k| matches!(k, DirectiveKind::Map(_)))?;
        Ok(MapMut { config: self, id })
    }

    pub fn geo_mut(&mut self, id: NodeId) -> Result<GeoMut<'_>> {
        checked(self, id, "a geo", |k| matches!(k, DirectiveKind::Geo(_)))?;
        Ok(GeoMut { config: self, id })
    }

    pub fn split_clients_mut(&mut self, id: NodeId) -> Result<SplitClientsMut<'_>> {
        checked(self, id, "a split_clients", |k| {
            matches!(k, DirectiveKind::SplitClients(_))
        })?;
        Ok(SplitClientsMut { config: self, id })
    }

    pub fn server_mut(&mut self, id: NodeId) -> Result<ServerMut<'_>> {
        checked(self, id, "a server", |k| matches!(k, DirectiveKind::Server))?;
        Ok(ServerMut { config: self, id })
    }

    pub fn limit_req_zone_mut(&mut self, id: NodeId) -> Result<LimitReqZoneMut<'_>> {
        checked(self, id, "a limit_req_zone", |k| {
            matches!(k, DirectiveKind::LimitReqZone(_))
        })?;
        Ok(LimitReqZoneMut { config: self, id })
    }
}
