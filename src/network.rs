// BgpSynth: BGP configuration synthesis written in Rust
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The queryable topology sketch. The [`NetworkGraph`] stores routers and links on a petgraph
//! graph and carries everything the encoder needs to read: AS numbers, BGP sessions, (partially
//! symbolic) OSPF costs and router IDs, advertisements, and the route-maps attached to each BGP
//! session. After solving, the synthesizer writes the concretized route-maps, prefix-lists,
//! community-lists and router IDs back into the same structure.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ipnet::Ipv4Net;
use petgraph::stable_graph::{EdgeIndex, StableUnGraph};

use crate::bgp::Announcement;
use crate::route_map::{CommunityList, IpPrefixList, RouteMap};
use crate::smt::SmtVar;
use crate::types::{AsId, Prefix, RouterId, Sketch};

/// The BGP router-id slot of a router's sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterIdSlot {
    /// The sketch does not allow setting a router ID on this device.
    Unset,
    /// The sketch leaves the router ID symbolic.
    Hole,
    /// The sketch fixes the router ID.
    Concrete(u32),
    /// The slot was lifted into a symbolic variable for the current synthesis run.
    Symbolic(SmtVar),
}

/// Per-router BGP configuration.
#[derive(Debug, Clone)]
struct BgpConfig {
    /// The AS the router belongs to.
    asnum: AsId,
    /// The router-id slot of the sketch.
    router_id: RouterIdSlot,
}

/// A device in the topology: an internal router or an external peer.
#[derive(Debug, Clone)]
struct Device {
    /// Unique name of the device.
    name: String,
    /// Whether the device is an external peer (outside the operated network).
    external: bool,
    /// BGP configuration, if BGP is enabled on the device.
    bgp: Option<BgpConfig>,
    /// Announcements this device injects into the network.
    advertisements: Vec<Announcement>,
    /// Route maps installed on the device, by name.
    route_maps: BTreeMap<String, RouteMap>,
    /// Prefix lists installed on the device, by name.
    prefix_lists: BTreeMap<String, IpPrefixList>,
    /// Community lists installed on the device, by name.
    community_lists: BTreeMap<String, CommunityList>,
    /// Loopback interfaces and their (possibly symbolic) addresses.
    loopbacks: BTreeMap<String, Sketch<Ipv4Net>>,
}

/// A physical link between two devices, carrying the (possibly symbolic) OSPF cost.
#[derive(Debug, Clone, Default)]
struct Link {
    /// OSPF cost of the link. `None` if the sketch says nothing about it.
    ospf_cost: Option<Sketch<u32>>,
}

/// The topology sketch. See the [module documentation](self) for an overview.
#[derive(Debug, Default)]
pub struct NetworkGraph {
    /// The graph holding devices and links.
    graph: StableUnGraph<Device, Link>,
    /// Lookup from device name to its id.
    names: HashMap<String, RouterId>,
    /// Established BGP sessions, stored symmetrically.
    bgp_sessions: BTreeMap<RouterId, BTreeSet<RouterId>>,
    /// Name of the import route-map applied by `.0` on routes learned from `.1`.
    import_maps: HashMap<(RouterId, RouterId), String>,
    /// Name of the export route-map applied by `.0` on routes sent to `.1`.
    export_maps: HashMap<(RouterId, RouterId), String>,
}

impl NetworkGraph {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device to the graph.
    fn add_device(&mut self, name: &str, external: bool) -> RouterId {
        let id = self.graph.add_node(Device {
            name: name.to_string(),
            external,
            bgp: None,
            advertisements: Vec::new(),
            route_maps: BTreeMap::new(),
            prefix_lists: BTreeMap::new(),
            community_lists: BTreeMap::new(),
            loopbacks: BTreeMap::new(),
        });
        self.names.insert(name.to_string(), id);
        id
    }

    /// Add an internal router.
    pub fn add_router(&mut self, name: &str) -> RouterId {
        self.add_device(name, false)
    }

    /// Add an external peer.
    pub fn add_peer(&mut self, name: &str) -> RouterId {
        self.add_device(name, true)
    }

    /// Add a physical link between two devices.
    pub fn add_link(&mut self, a: RouterId, b: RouterId) -> EdgeIndex {
        match self.graph.find_edge(a, b) {
            Some(e) => e,
            None => self.graph.add_edge(a, b, Link::default()),
        }
    }

    /// Set the (possibly symbolic) OSPF cost of a link. The link is created if it is missing.
    pub fn set_edge_ospf_cost(&mut self, a: RouterId, b: RouterId, cost: Sketch<u32>) {
        let e = self.add_link(a, b);
        self.graph[e].ospf_cost = Some(cost);
    }

    /// Read the OSPF cost of a link. Returns `None` if the link is absent or carries no cost.
    pub fn get_edge_ospf_cost(&self, a: RouterId, b: RouterId) -> Option<Sketch<u32>> {
        self.graph
            .find_edge(a, b)
            .and_then(|e| self.graph[e].ospf_cost)
    }

    /// Enable BGP on a device by assigning its AS number.
    pub fn set_bgp_asnum(&mut self, r: RouterId, asnum: impl Into<AsId>) {
        let asnum = asnum.into();
        match &mut self.graph[r].bgp {
            Some(cfg) => cfg.asnum = asnum,
            None => {
                self.graph[r].bgp = Some(BgpConfig {
                    asnum,
                    router_id: RouterIdSlot::Unset,
                })
            }
        }
    }

    /// Returns `true` if BGP is enabled on the device.
    pub fn is_bgp_enabled(&self, r: RouterId) -> bool {
        self.graph[r].bgp.is_some()
    }

    /// The AS number of a BGP-enabled device.
    pub fn get_bgp_asnum(&self, r: RouterId) -> Option<AsId> {
        self.graph[r].bgp.as_ref().map(|cfg| cfg.asnum)
    }

    /// Declare the router-id slot of a device (a hole or a concrete value).
    pub fn set_bgp_router_id_sketch(&mut self, r: RouterId, id: Sketch<u32>) {
        if let Some(cfg) = &mut self.graph[r].bgp {
            cfg.router_id = match id {
                Sketch::Concrete(v) => RouterIdSlot::Concrete(v),
                Sketch::Hole => RouterIdSlot::Hole,
            };
        }
    }

    /// Read the router-id slot of a device.
    pub fn get_bgp_router_id(&self, r: RouterId) -> RouterIdSlot {
        self.graph[r]
            .bgp
            .as_ref()
            .map(|cfg| cfg.router_id)
            .unwrap_or(RouterIdSlot::Unset)
    }

    /// Replace the router-id slot of a device (used to lift it into a variable, and to write the
    /// resolved value back).
    pub fn set_bgp_router_id(&mut self, r: RouterId, slot: RouterIdSlot) {
        if let Some(cfg) = &mut self.graph[r].bgp {
            cfg.router_id = slot;
        }
    }

    /// Establish a BGP session between two devices.
    pub fn add_bgp_session(&mut self, a: RouterId, b: RouterId) {
        self.bgp_sessions.entry(a).or_default().insert(b);
        self.bgp_sessions.entry(b).or_default().insert(a);
    }

    /// All BGP neighbors of a device, in ascending order.
    pub fn get_bgp_neighbors(&self, r: RouterId) -> Vec<RouterId> {
        self.bgp_sessions
            .get(&r)
            .map(|n| n.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the two devices share a BGP session.
    pub fn has_bgp_session(&self, a: RouterId, b: RouterId) -> bool {
        self.bgp_sessions
            .get(&a)
            .map(|n| n.contains(&b))
            .unwrap_or(false)
    }

    /// Returns `true` if the device is an internal router.
    pub fn is_internal(&self, r: RouterId) -> bool {
        !self.graph[r].external
    }

    /// All devices, in ascending index order.
    pub fn routers(&self) -> Vec<RouterId> {
        let mut nodes: Vec<_> = self.graph.node_indices().collect();
        nodes.sort();
        nodes
    }

    /// All internal routers, in ascending index order.
    pub fn internal_routers(&self) -> Vec<RouterId> {
        self.routers()
            .into_iter()
            .filter(|r| self.is_internal(*r))
            .collect()
    }

    /// All physical neighbors of a device, in ascending order.
    pub fn neighbors(&self, r: RouterId) -> Vec<RouterId> {
        let mut n: Vec<_> = self.graph.neighbors(r).collect();
        n.sort();
        n
    }

    /// Returns `true` if the device exists in the topology.
    pub fn has_router(&self, r: RouterId) -> bool {
        self.graph.node_weight(r).is_some()
    }

    /// The name of a device.
    pub fn router_name(&self, r: RouterId) -> &str {
        &self.graph[r].name
    }

    /// Look up a device by name.
    pub fn get_router(&self, name: &str) -> Option<RouterId> {
        self.names.get(name).copied()
    }

    /// Let a device advertise an announcement.
    pub fn add_bgp_advertise(&mut self, r: RouterId, ann: Announcement) {
        self.graph[r].advertisements.push(ann);
    }

    /// All announcements advertised by a device.
    pub fn get_bgp_advertise(&self, r: RouterId) -> &[Announcement] {
        &self.graph[r].advertisements
    }

    /// The announcement a device advertises for a given prefix, if any.
    pub fn get_bgp_advertise_for(&self, r: RouterId, prefix: &Prefix) -> Option<&Announcement> {
        self.graph[r]
            .advertisements
            .iter()
            .find(|a| &a.prefix == prefix)
    }

    /// Install a route map on a device, replacing any route map with the same name.
    pub fn add_route_map(&mut self, r: RouterId, map: RouteMap) {
        self.graph[r].route_maps.insert(map.name.clone(), map);
    }

    /// All route maps installed on a device.
    pub fn get_route_maps(&self, r: RouterId) -> &BTreeMap<String, RouteMap> {
        &self.graph[r].route_maps
    }

    /// Attach an import route-map: `local` applies it on routes learned from `peer`.
    pub fn add_bgp_import_route_map(&mut self, local: RouterId, peer: RouterId, name: &str) {
        self.import_maps.insert((local, peer), name.to_string());
    }

    /// Attach an export route-map: `local` applies it on routes sent to `peer`.
    pub fn add_bgp_export_route_map(&mut self, local: RouterId, peer: RouterId, name: &str) {
        self.export_maps.insert((local, peer), name.to_string());
    }

    /// The name of the import route-map `local` applies on routes learned from `peer`.
    pub fn get_bgp_import_route_map(&self, local: RouterId, peer: RouterId) -> Option<&str> {
        self.import_maps.get(&(local, peer)).map(String::as_str)
    }

    /// The name of the export route-map `local` applies on routes sent to `peer`.
    pub fn get_bgp_export_route_map(&self, local: RouterId, peer: RouterId) -> Option<&str> {
        self.export_maps.get(&(local, peer)).map(String::as_str)
    }

    /// Install a prefix list on a device, replacing any list with the same name.
    pub fn add_ip_prefix_list(&mut self, r: RouterId, list: IpPrefixList) {
        self.graph[r].prefix_lists.insert(list.name.clone(), list);
    }

    /// All prefix lists installed on a device.
    pub fn get_ip_prefix_lists(&self, r: RouterId) -> &BTreeMap<String, IpPrefixList> {
        &self.graph[r].prefix_lists
    }

    /// Install a community list on a device, replacing any list with the same name.
    pub fn add_bgp_community_list(&mut self, r: RouterId, list: CommunityList) {
        self.graph[r]
            .community_lists
            .insert(list.name.clone(), list);
    }

    /// All community lists installed on a device.
    pub fn get_bgp_community_lists(&self, r: RouterId) -> &BTreeMap<String, CommunityList> {
        &self.graph[r].community_lists
    }

    /// Set the (possibly symbolic) address of a loopback interface.
    pub fn set_loopback_addr(&mut self, r: RouterId, iface: &str, addr: Sketch<Ipv4Net>) {
        self.graph[r].loopbacks.insert(iface.to_string(), addr);
    }

    /// Read the address of a loopback interface.
    pub fn get_loopback_addr(&self, r: RouterId, iface: &str) -> Option<Sketch<Ipv4Net>> {
        self.graph[r].loopbacks.get(iface).copied()
    }

    /// The next-hop identifier under which `neighbor` is known on the sessions towards it.
    pub fn next_hop_name(&self, neighbor: RouterId) -> String {
        format!("{}Hop", self.router_name(neighbor))
    }

    /// Precompute the next-hop map: for every established BGP session `(r, n)`, the concrete
    /// next-hop identifier `r` uses for routes learned from `n`.
    pub fn next_hop_map(&self) -> BTreeMap<(RouterId, RouterId), String> {
        self.bgp_sessions
            .iter()
            .flat_map(|(r, neighbors)| {
                neighbors
                    .iter()
                    .map(|n| ((*r, *n), self.next_hop_name(*n)))
            })
            .collect()
    }
}
