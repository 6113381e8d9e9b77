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

//! This module computes the BGP route propagation graphs. Starting from the requirements, it
//! builds one AS-level and one router-level graph per destination prefix, each node annotated
//! with the paths that must be propagated (`paths`), the paths that are reachable but must lose
//! (`block`), and the preference order between alternatives (`order`). The AS-level graphs are
//! checked for orderings BGP cannot express, and their blocked paths are expanded down to router
//! granularity. Finally, all per-prefix graphs are merged into a single propagation graph and
//! partially evaluated into [`PropagatedInfo`] records (see [`partial_eval`]).

mod partial_eval;

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::{debug, info};

use crate::bgp::{PropId, PropagatedInfo};
use crate::formatter::NetworkFormatter;
use crate::network::{NetworkGraph, RouterIdSlot};
use crate::requirements::{Protocol, Req};
use crate::smt::{Sort, SolverContext, Term, Value};
use crate::types::{AsId, Prefix, RouterId, SynthesisError};

/// The annotation sets of one node in a propagation DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSets<N> {
    /// Paths (origin first, this node last) the announcement must be able to follow.
    pub paths: BTreeSet<Vec<N>>,
    /// Paths that are BGP-reachable at this node but must not be selected.
    pub block: BTreeSet<Vec<N>>,
    /// Preference layers: any path of layer `i` must beat any path of layer `i + 1`.
    pub order: Vec<BTreeSet<Vec<N>>>,
}

impl<N> NodeSets<N> {
    /// Create empty annotation sets with the given number of preference layers.
    fn new(layers: usize) -> Self {
        Self {
            paths: BTreeSet::new(),
            block: BTreeSet::new(),
            order: (0..layers).map(|_| BTreeSet::new()).collect(),
        }
    }
}

/// A per-prefix propagation DAG over nodes of type `N` (AS numbers or routers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationDag<N> {
    /// The annotated nodes.
    pub nodes: BTreeMap<N, NodeSets<N>>,
    /// Edges along which the propagation happens (stored with the smaller node first).
    pub edges: BTreeSet<(N, N)>,
}

impl<N: Copy + Ord> PropagationDag<N> {
    /// Create an empty DAG.
    fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeSet::new(),
        }
    }

    /// Access (or create) the annotation sets of a node.
    fn node_mut(&mut self, n: N, layers: usize) -> &mut NodeSets<N> {
        self.nodes.entry(n).or_insert_with(|| NodeSets::new(layers))
    }

    /// Insert an edge, normalizing the direction.
    fn add_edge(&mut self, a: N, b: N) {
        self.edges.insert((a.min(b), a.max(b)));
    }
}

/// Diagnostic describing a preference the requirements ask for that BGP cannot realize: the same
/// AS node would have to rank `preferred` above `over` and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchingOrder {
    /// The destination prefix whose requirements contradict each other.
    pub dst_net: Prefix,
    /// The AS node at which the contradiction appears.
    pub node: AsId,
    /// The AS path requested to be preferred.
    pub preferred: Vec<AsId>,
    /// The AS path it is requested to be preferred over (and also vice versa).
    pub over: Vec<AsId>,
}

/// The merged annotation sets of one router for one destination prefix, after partial evaluation.
#[derive(Debug, Clone, Default)]
pub struct NetAttrs {
    /// Paths the announcement must be able to follow.
    pub paths: BTreeSet<Vec<RouterId>>,
    /// Paths that are BGP-reachable here but must not be selected.
    pub block: BTreeSet<Vec<RouterId>>,
    /// Preference layers over the paths.
    pub order: Vec<BTreeSet<Vec<RouterId>>>,
    /// The [`PropagatedInfo`] records of `paths` (the selected sham of the router).
    pub paths_info: BTreeSet<PropId>,
    /// The [`PropagatedInfo`] records of `block`.
    pub block_info: BTreeSet<PropId>,
    /// Preference layers over the records.
    pub order_info: Vec<BTreeSet<PropId>>,
    /// For every record at this node, the record at the upstream neighbor it derives from.
    pub origins: BTreeMap<PropId, Option<PropId>>,
}

/// The merged propagation graph over all destination prefixes, owning every [`PropagatedInfo`].
#[derive(Debug, Default)]
pub struct PropagationGraph {
    /// Per-router, per-prefix annotation sets.
    pub nodes: BTreeMap<RouterId, BTreeMap<Prefix, NetAttrs>>,
    /// Edges along which any propagation happens.
    pub edges: BTreeSet<(RouterId, RouterId)>,
    /// Arena of all [`PropagatedInfo`] records, indexed by [`PropId`].
    infos: Vec<PropagatedInfo>,
}

impl PropagationGraph {
    /// Read a record.
    pub fn info(&self, id: PropId) -> &PropagatedInfo {
        &self.infos[id.0]
    }

    /// All records, in creation order.
    pub fn infos(&self) -> impl Iterator<Item = (PropId, &PropagatedInfo)> {
        self.infos.iter().enumerate().map(|(i, p)| (PropId(i), p))
    }

    /// Store a new record and return its id.
    fn alloc(&mut self, info: PropagatedInfo) -> PropId {
        let id = PropId(self.infos.len());
        self.infos.push(info);
        id
    }

    /// The annotation sets of a router for a prefix.
    pub fn attrs(&self, node: RouterId, net: &Prefix) -> Option<&NetAttrs> {
        self.nodes.get(&node).and_then(|nets| nets.get(net))
    }

    /// All prefixes known at a router.
    pub fn nets(&self, node: RouterId) -> impl Iterator<Item = (&Prefix, &NetAttrs)> {
        self.nodes.get(&node).into_iter().flatten()
    }

    /// All records a router (possibly) learns. With `unselected`, the blocked records are
    /// included as well. With `from_peer`, only records heard from that BGP neighbor are kept.
    pub fn props(
        &self,
        node: RouterId,
        unselected: bool,
        from_peer: Option<RouterId>,
    ) -> Vec<PropId> {
        let mut all: BTreeSet<PropId> = BTreeSet::new();
        for (_, attrs) in self.nets(node) {
            all.extend(attrs.paths_info.iter().copied());
            if unselected {
                all.extend(attrs.block_info.iter().copied());
            }
        }
        all.into_iter()
            .filter(|id| match from_peer {
                Some(peer) => self.info(*id).peer == Some(peer),
                None => true,
            })
            .collect()
    }
}

/// Result of the propagation computation: the merged graph, the per-prefix views, and everything
/// the encoders read besides the network graph itself.
#[derive(Debug)]
pub struct Propagation {
    /// The merged, partially evaluated propagation graph.
    pub graph: PropagationGraph,
    /// The per-prefix AS-level DAGs.
    pub ebgp_graphs: BTreeMap<Prefix, PropagationDag<AsId>>,
    /// The per-prefix router-level DAGs.
    pub ibgp_graphs: BTreeMap<Prefix, PropagationDag<RouterId>>,
    /// The diagnostics for prefixes whose requested preferences BGP cannot express. Those
    /// prefixes are excluded from the graphs and produce no constraints.
    pub unmatching_orders: Vec<UnmatchingOrder>,
    /// Per-AS sets of routers reachable over iBGP (grown through routers without BGP).
    pub ibgp_zones: BTreeMap<AsId, BTreeSet<RouterId>>,
    /// The concrete next-hop identifier for every established BGP session.
    pub next_hop_map: BTreeMap<(RouterId, RouterId), String>,
    /// All canonical AS paths appearing in any record (the members of the AS-path sort).
    pub as_paths: BTreeSet<Vec<AsId>>,
}

/// Compute the propagation graphs for the given requirements. Only BGP requirements take part;
/// OSPF requirements are handled by the OSPF synthesis and ignored here. This also lifts the
/// router-id slots of the sketch into symbolic variables.
pub fn build(
    graph: &mut NetworkGraph,
    ctx: &mut SolverContext,
    reqs: &[Req],
) -> Result<Propagation, SynthesisError> {
    set_bgp_router_ids(graph, ctx);
    let ibgp_zones = extract_ibgp_zones(graph);

    // group the BGP requirements by traffic class
    let mut net_reqs: BTreeMap<Prefix, Vec<&Req>> = BTreeMap::new();
    for req in reqs.iter().filter(|r| r.protocol() == Protocol::Bgp) {
        net_reqs.entry(req.dst_net().clone()).or_default().push(req);
    }

    let peering_graph = peering_graph(graph);
    let session_graph = session_graph(graph);

    let mut ebgp_graphs = BTreeMap::new();
    let mut ibgp_graphs = BTreeMap::new();
    let mut unmatching_orders = Vec::new();

    for (net, reqs) in net_reqs {
        info!("Compute the propagation graphs for {net}");
        let mut as_layers = Vec::new();
        let mut router_layers = Vec::new();
        extract_reqs(graph, &reqs, &mut as_layers, &mut router_layers)?;

        // first compute the propagation among ASes, then among routers
        let ebgp = compute_propagation(&peering_graph, &as_layers);
        let mut ibgp = compute_propagation(&session_graph, &router_layers);
        for sets in ibgp.nodes.values_mut() {
            sets.order.retain(|layer| !layer.is_empty());
        }

        // reject preferences that BGP cannot implement, and skip the prefix entirely
        if let Some(conflict) = check_order(&net, &ebgp) {
            debug!(
                "Unrealizable order for {net} at {}: {:?} <> {:?}",
                conflict.node, conflict.preferred, conflict.over
            );
            unmatching_orders.push(conflict);
            continue;
        }

        // extend the router-level graph with all realizations of the AS-level paths
        expand_ebgp_graph(graph, &ibgp_zones, &ebgp, &mut ibgp, &router_layers);

        ebgp_graphs.insert(net.clone(), ebgp);
        ibgp_graphs.insert(net, ibgp);
    }

    let mut prop_graph = merge_dags(&ibgp_graphs);
    let as_paths = partial_eval::partial_eval(graph, &mut prop_graph)?;

    for node in prop_graph.nodes.keys() {
        for (net, attrs) in prop_graph.nodes[node].iter() {
            debug!(
                "propagation at {} for {net}: paths={:?} block={:?} order={:?}",
                node.fmt(graph),
                attrs.paths.iter().map(|p| p.fmt(graph)).collect_vec(),
                attrs.block.iter().map(|p| p.fmt(graph)).collect_vec(),
                attrs
                    .order
                    .iter()
                    .map(|l| l.iter().map(|p| p.fmt(graph)).collect_vec())
                    .collect_vec(),
            );
        }
    }

    Ok(Propagation {
        graph: prop_graph,
        ebgp_graphs,
        ibgp_graphs,
        unmatching_orders,
        ibgp_zones,
        next_hop_map: graph.next_hop_map(),
        as_paths,
    })
}

/// Lift every router-id slot of the sketch into an integer variable, constrained to be strictly
/// positive and globally distinct.
fn set_bgp_router_ids(graph: &mut NetworkGraph, ctx: &mut SolverContext) {
    let mut ids = Vec::new();
    for router in graph.routers() {
        if !graph.is_bgp_enabled(router) {
            continue;
        }
        let value = match graph.get_bgp_router_id(router) {
            // the sketch doesn't allow setting a router ID here
            RouterIdSlot::Unset => continue,
            RouterIdSlot::Hole => None,
            RouterIdSlot::Concrete(v) => Some(Value::Int(v as i64)),
            RouterIdSlot::Symbolic(_) => continue,
        };
        let var = ctx.create_var(
            Sort::Int,
            value,
            &format!("{}_router_id_", graph.router_name(router)),
        );
        ctx.register_constraint(Term::gt(var, 0i64), "router_id_larger_than_zero_");
        graph.set_bgp_router_id(router, RouterIdSlot::Symbolic(var));
        ids.push(var);
    }
    if ids.is_empty() {
        // no router IDs used in the sketch
        return;
    }
    ctx.register_constraint(
        Term::distinct(ids.into_iter().map(Term::from)),
        "router_id_unique",
    );
}

/// Extract subgraphs such that each subgraph holds all routers within an AS, grown through
/// routers that do not speak BGP themselves.
fn extract_ibgp_zones(graph: &NetworkGraph) -> BTreeMap<AsId, BTreeSet<RouterId>> {
    let mut zones: BTreeMap<AsId, BTreeSet<RouterId>> = BTreeMap::new();
    for node in graph.routers() {
        if let Some(asnum) = graph.get_bgp_asnum(node) {
            zones.entry(asnum).or_default().insert(node);
        }
    }
    for (asnum, zone) in zones.iter_mut() {
        let mut changed = true;
        while changed {
            changed = false;
            for node in zone.iter().copied().collect_vec() {
                for neighbor in graph.neighbors(node) {
                    let take = match graph.get_bgp_asnum(neighbor) {
                        Some(n_as) => n_as == *asnum,
                        None => true,
                    };
                    if take && zone.insert(neighbor) {
                        changed = true;
                    }
                }
            }
        }
    }
    zones
}

/// The AS-level peering graph: one node per AS, one edge per eBGP session.
fn peering_graph(graph: &NetworkGraph) -> BTreeMap<AsId, BTreeSet<AsId>> {
    let mut adj: BTreeMap<AsId, BTreeSet<AsId>> = BTreeMap::new();
    for node in graph.routers() {
        let Some(node_as) = graph.get_bgp_asnum(node) else {
            continue;
        };
        adj.entry(node_as).or_default();
        for neighbor in graph.get_bgp_neighbors(node) {
            if let Some(n_as) = graph.get_bgp_asnum(neighbor) {
                if n_as != node_as {
                    adj.entry(node_as).or_default().insert(n_as);
                    adj.entry(n_as).or_default().insert(node_as);
                }
            }
        }
    }
    adj
}

/// The router-level session graph: one edge per established BGP session.
fn session_graph(graph: &NetworkGraph) -> BTreeMap<RouterId, BTreeSet<RouterId>> {
    graph
        .routers()
        .into_iter()
        .map(|r| (r, graph.get_bgp_neighbors(r).into_iter().collect()))
        .collect()
}

/// Given a path of routers (in traffic direction), return the AS path in reversed order,
/// contracting consecutive identical AS numbers.
fn get_bgp_path(graph: &NetworkGraph, path: &[RouterId]) -> Vec<AsId> {
    let mut bgp_path: Vec<AsId> = Vec::new();
    for node in path {
        let Some(asnum) = graph.get_bgp_asnum(*node) else {
            continue;
        };
        if bgp_path.last() != Some(&asnum) {
            bgp_path.push(asnum);
        }
    }
    bgp_path.reverse();
    bgp_path
}

/// For each requirement, append one preference layer of AS paths and router paths (both written
/// in propagation direction: origin first). `PathOrderReq` contributes one layer per child;
/// `KConnectedPathsReq` contributes a single layer holding all children.
fn extract_reqs(
    graph: &NetworkGraph,
    reqs: &[&Req],
    as_layers: &mut Vec<BTreeSet<Vec<AsId>>>,
    router_layers: &mut Vec<BTreeSet<Vec<RouterId>>>,
) -> Result<(), SynthesisError> {
    for req in reqs {
        match req {
            Req::PathReq { path, .. } => {
                if let Some(r) = path.iter().find(|r| !graph.has_router(**r)) {
                    return Err(SynthesisError::UnknownRouter(*r));
                }
                let mut router_path = path.clone();
                router_path.reverse();
                as_layers.push([get_bgp_path(graph, path)].into());
                router_layers.push([router_path].into());
            }
            Req::PathOrderReq { paths, .. } => {
                let children: Vec<&Req> = paths.iter().collect();
                extract_reqs(graph, &children, as_layers, router_layers)?;
            }
            Req::KConnectedPathsReq { paths, .. } => {
                let children: Vec<&Req> = paths.iter().collect();
                let mut sub_as = Vec::new();
                let mut sub_router = Vec::new();
                extract_reqs(graph, &children, &mut sub_as, &mut sub_router)?;
                as_layers.push(sub_as.into_iter().flatten().collect());
                router_layers.push(sub_router.into_iter().flatten().collect());
            }
        }
    }
    Ok(())
}

/// Compute the propagation DAG over the given adjacency for one destination prefix. Every prefix
/// of a required path is marked `allowed` at the node it ends at; every one-hop extension of an
/// allowed path towards a neighbor where it is not allowed is marked `block`.
fn compute_propagation<N: Copy + Ord>(
    adjacency: &BTreeMap<N, BTreeSet<N>>,
    layers: &[BTreeSet<Vec<N>>],
) -> PropagationDag<N> {
    let mut dag = PropagationDag::new();

    // trace each required path from the origin outward
    for (index, layer) in layers.iter().enumerate() {
        for path in layer {
            for len in 1..=path.len() {
                let sub = path[..len].to_vec();
                let node = path[len - 1];
                if len >= 2 {
                    dag.add_edge(path[len - 2], node);
                }
                let sets = dag.node_mut(node, layers.len());
                sets.paths.insert(sub.clone());
                sets.order[index].insert(sub);
            }
        }
    }

    // mark every reachable one-hop extension that is not required as blocked
    let marked: Vec<(N, Vec<N>)> = dag
        .nodes
        .iter()
        .flat_map(|(n, sets)| sets.paths.iter().map(|p| (*n, p.clone())))
        .collect();
    for (node, path) in marked {
        for neighbor in adjacency.get(&node).into_iter().flatten() {
            if path.contains(neighbor) {
                continue;
            }
            let mut cand = path.clone();
            cand.push(*neighbor);
            let sets = dag.node_mut(*neighbor, layers.len());
            if !sets.paths.contains(&cand) {
                sets.block.insert(cand);
                dag.add_edge(node, *neighbor);
            }
        }
    }

    dag
}

/// Check that the path preferences are implementable by BGP: no AS node may be required to
/// prefer `a` over `b` and `b` over `a` at the same time. Returns the first conflict found.
fn check_order(net: &Prefix, dag: &PropagationDag<AsId>) -> Option<UnmatchingOrder> {
    for (node, sets) in &dag.nodes {
        let mut prefer: BTreeSet<(&Vec<AsId>, &Vec<AsId>)> = BTreeSet::new();
        for (i, layer) in sets.order.iter().enumerate() {
            for better in layer {
                for worse in sets.order.iter().skip(i + 1).flatten() {
                    if better == worse {
                        continue;
                    }
                    if prefer.contains(&(worse, better)) {
                        return Some(UnmatchingOrder {
                            dst_net: net.clone(),
                            node: *node,
                            preferred: worse.clone(),
                            over: better.clone(),
                        });
                    }
                    prefer.insert((better, worse));
                }
            }
        }
    }
    None
}

/// Given an AS path (origin first), enumerate all router paths realizing it. The expansion
/// starts at the origin routers and alternates across AS boundaries following concrete BGP
/// sessions, optionally taking a single iBGP hop after each crossing.
fn expand_as_path(
    graph: &NetworkGraph,
    zones: &BTreeMap<AsId, BTreeSet<RouterId>>,
    as_path: &[AsId],
    origins: &BTreeSet<RouterId>,
) -> BTreeSet<Vec<RouterId>> {
    let mut paths: Vec<Vec<RouterId>> = origins.iter().map(|o| vec![*o]).collect();
    for index in 0..as_path.len() {
        let is_last = index + 1 == as_path.len();
        if is_last {
            break;
        }
        let next_zone = zones.get(&as_path[index + 1]);
        let mut extended = Vec::new();
        for path in paths {
            let last = *path.last().expect("expansion path is never empty");
            let curr_as = graph.get_bgp_asnum(last);
            for neighbor in graph.get_bgp_neighbors(last) {
                let neighbor_as = graph.get_bgp_asnum(neighbor);
                let crosses = curr_as != neighbor_as;
                let in_zone = next_zone.map(|z| z.contains(&neighbor)).unwrap_or(false);
                if crosses && in_zone && !path.contains(&neighbor) {
                    let mut new_path = path.clone();
                    new_path.push(neighbor);
                    // also take a single hop within the entered AS
                    for nn in graph.get_bgp_neighbors(neighbor) {
                        if graph.get_bgp_asnum(nn) == neighbor_as && !new_path.contains(&nn) {
                            let mut ibgp_path = new_path.clone();
                            ibgp_path.push(nn);
                            extended.push(ibgp_path);
                        }
                    }
                    extended.push(new_path);
                }
            }
        }
        paths = extended;
    }
    paths.into_iter().collect()
}

/// Expand the blocked and allowed AS-level paths down into the router-level graph: every router
/// path realizing one of them that is not already allowed at its final router is blocked there.
fn expand_ebgp_graph(
    graph: &NetworkGraph,
    zones: &BTreeMap<AsId, BTreeSet<RouterId>>,
    ebgp: &PropagationDag<AsId>,
    ibgp: &mut PropagationDag<RouterId>,
    router_layers: &[BTreeSet<Vec<RouterId>>],
) {
    // per origin AS, the routers that may originate the announcement
    let mut origins: BTreeMap<AsId, BTreeSet<RouterId>> = BTreeMap::new();
    for path in router_layers.iter().flatten() {
        if let Some(asnum) = graph.get_bgp_asnum(path[0]) {
            origins.entry(asnum).or_default().insert(path[0]);
        }
    }

    let mut all_paths: BTreeSet<Vec<AsId>> = BTreeSet::new();
    for sets in ebgp.nodes.values() {
        all_paths.extend(sets.paths.iter().cloned());
        all_paths.extend(sets.block.iter().cloned());
    }

    for as_path in all_paths {
        let Some(as_origins) = origins.get(&as_path[0]) else {
            continue;
        };
        for path in expand_as_path(graph, zones, &as_path, as_origins) {
            let node = *path.last().expect("expanded path is never empty");
            if path.len() >= 2 {
                ibgp.add_edge(path[path.len() - 2], node);
            }
            let sets = ibgp.node_mut(node, 0);
            if !sets.paths.contains(&path) {
                sets.block.insert(path);
            }
        }
    }
}

/// Merge the per-prefix router-level DAGs into a single propagation graph keyed by prefix.
fn merge_dags(ibgp_graphs: &BTreeMap<Prefix, PropagationDag<RouterId>>) -> PropagationGraph {
    let mut merged = PropagationGraph::default();
    for (net, dag) in ibgp_graphs {
        for (node, sets) in &dag.nodes {
            let attrs = merged
                .nodes
                .entry(*node)
                .or_default()
                .entry(net.clone())
                .or_default();
            attrs.paths = sets.paths.clone();
            attrs.block = sets.block.clone();
            attrs.order = sets.order.clone();
        }
        merged.edges.extend(dag.edges.iter().copied());
    }
    merged
}
