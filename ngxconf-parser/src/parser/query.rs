//! Typed finders over the generic walk

use crate::parser::ast::{Config, NodeRef};
use crate::parser::kinds::DirectiveKind;
use crate::parser::typed::{GeoView, LocationView, MapView, ServerView, UpstreamView};

impl Config {
    /// Every `upstream` block, in `http` and in `stream`
    pub fn upstreams(&self) -> Vec<UpstreamView<'_>> {
        self.descendants().filter_map(|n| n.as_upstream()).collect()
    }

    /// Every `http` server block
    pub fn servers(&self) -> Vec<ServerView<'_>> {
        self.descendants().filter_map(|n| n.as_server()).collect()
    }

    pub fn find_upstream_by_name(&self, name: &str) -> Option<UpstreamView<'_>> {
        self.descendants()
            .filter_map(|n| n.as_upstream())
            .find(|u| u.name() == name)
    }

    /// Servers listing `name` in one of their `server_name` directives
    pub fn find_servers_by_name(&self, name: &str) -> Vec<ServerView<'_>> {
        self.servers()
            .into_iter()
            .filter(|s| s.server_names().iter().any(|n| *n == name))
            .collect()
    }

    /// Locations whose pattern equals `pattern`, at any depth
    pub fn find_locations_by_pattern(&self, pattern: &str) -> Vec<LocationView<'_>> {
        self.descendants()
            .filter_map(|n| n.as_location())
            .filter(|l| l.pattern() == pattern)
            .collect()
    }

    pub fn find_geo_by_variable(&self, variable: &str) -> Option<GeoView<'_>> {
        self.descendants()
            .filter_map(|n| n.as_geo())
            .find(|g| g.variable() == variable)
    }

    pub fn find_map_by_variable(&self, variable: &str) -> Option<MapView<'_>> {
        self.descendants()
            .filter_map(|n| n.as_map())
            .find(|m| m.variable() == variable)
    }

    /// Every `include` directive, including those inside included files
    pub fn find_includes(&self) -> Vec<NodeRef<'_>> {
        self.descendants()
            .filter(|n| matches!(n.kind(), DirectiveKind::Include(_)))
            .collect()
    }
}
