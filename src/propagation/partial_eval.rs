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

//! Partial evaluation of the merged propagation graph: every path annotation is reduced to a
//! [`PropagatedInfo`] record carrying the already-known BGP attributes (upstream peer, egress,
//! external peer, canonical AS path), and each record is linked to the record at its upstream
//! neighbor it derives from.

use std::collections::{BTreeMap, BTreeSet};

use crate::bgp::{PropId, PropagatedInfo};
use crate::network::NetworkGraph;
use crate::propagation::PropagationGraph;
use crate::types::{AsId, Prefix, RouterId, SynthesisError};

/// The attributes of a propagated path that can be evaluated without the solver.
struct EvaluatedPath {
    /// The neighbor at the last AS crossing on the path.
    external_peer: Option<RouterId>,
    /// The router that first learned the announcement from a foreign AS.
    egress: Option<RouterId>,
    /// The BGP neighbor the owning router heard the announcement from.
    peer: Option<RouterId>,
    /// The canonical AS-level projection of the path, latest AS first.
    as_path: Vec<AsId>,
}

/// Convert a router path (origin first) into its canonical AS-level form and extract the peer,
/// egress, and external peer along the way. Consecutive identical AS numbers are contracted;
/// routers without BGP do not contribute to the AS path.
fn get_as_path(graph: &NetworkGraph, path: &[RouterId]) -> EvaluatedPath {
    let mut external_peer = None;
    let mut egress = None;
    let mut peer = None;
    let mut as_path = vec![graph
        .get_bgp_asnum(path[0])
        .expect("propagation paths start at a BGP-enabled origin")];

    if path.len() > 1 {
        for index in 1..path.len() {
            let node = path[index];
            let prev = path[index - 1];
            let Some(node_as) = graph.get_bgp_asnum(node) else {
                continue;
            };
            if let Some(prev_as) = graph.get_bgp_asnum(prev) {
                peer = Some(prev);
                if node_as != prev_as {
                    external_peer = Some(prev);
                    egress = Some(node);
                }
            }
            if as_path.last() != Some(&node_as) {
                as_path.push(node_as);
            }
        }
    }

    as_path.reverse();
    EvaluatedPath {
        external_peer,
        egress,
        peer,
        as_path,
    }
}

/// Reduce every path annotation of the graph to a [`PropagatedInfo`], populate the `*_info` sets
/// and the `origins` mapping, and return the set of all canonical AS paths (the member universe
/// of the AS-path enum sort).
pub(super) fn partial_eval(
    graph: &NetworkGraph,
    prop: &mut PropagationGraph,
) -> Result<BTreeSet<Vec<AsId>>, SynthesisError> {
    let mut cache: BTreeMap<(Prefix, Vec<RouterId>), PropId> = BTreeMap::new();

    // snapshot the annotation sets; the loop below allocates into the arena
    let snapshot: Vec<(RouterId, Prefix, BTreeSet<Vec<RouterId>>)> = prop
        .nodes
        .iter()
        .flat_map(|(node, nets)| {
            nets.iter().map(|(net, attrs)| {
                (
                    *node,
                    net.clone(),
                    attrs.paths.union(&attrs.block).cloned().collect(),
                )
            })
        })
        .collect();

    for (_, net, paths) in &snapshot {
        for path in paths {
            let key = (net.clone(), path.clone());
            if cache.contains_key(&key) {
                continue;
            }
            let evaluated = get_as_path(graph, path);
            // splice any extra AS-path info carried by the original announcement
            let origin_ann = graph.get_bgp_advertise_for(path[0], net).ok_or_else(|| {
                SynthesisError::MissingOriginAnnouncement(
                    graph.router_name(path[0]).to_string(),
                    net.clone(),
                )
            })?;
            let mut as_path = evaluated.as_path;
            as_path.extend(origin_ann.as_path.iter().copied());
            let as_path_len = as_path.len() - 1;
            let id = prop.alloc(PropagatedInfo {
                ann_name: net.clone(),
                path: path.clone(),
                as_path,
                as_path_len,
                peer: evaluated.peer,
                egress: evaluated.egress,
                external_peer: evaluated.external_peer,
                prev: None,
            });
            cache.insert(key, id);
        }
    }

    // populate the info sets from the cache
    for nets in prop.nodes.values_mut() {
        for (net, attrs) in nets.iter_mut() {
            attrs.order_info = attrs
                .order
                .iter()
                .map(|layer| {
                    layer
                        .iter()
                        .map(|path| cache[&(net.clone(), path.clone())])
                        .collect::<BTreeSet<_>>()
                })
                .collect();
            attrs.paths_info = attrs.order_info.iter().flatten().copied().collect();
            attrs.block_info = attrs
                .block
                .iter()
                .map(|path| cache[&(net.clone(), path.clone())])
                .collect();
        }
    }

    // link each record to the record at its upstream neighbor it derives from
    let mut links: Vec<(RouterId, Prefix, PropId, Option<PropId>)> = Vec::new();
    for (node, nets) in &prop.nodes {
        for (net, attrs) in nets {
            for id in attrs.paths_info.union(&attrs.block_info) {
                let info = prop.info(*id);
                if info.path.len() < 2 {
                    continue;
                }
                links.push((*node, net.clone(), *id, find_prev(prop, net, info)));
            }
        }
    }
    for (node, net, id, prev) in links {
        prop.infos[id.0].prev = prev;
        prop.nodes
            .get_mut(&node)
            .and_then(|nets| nets.get_mut(&net))
            .expect("origins are wired on existing nodes")
            .origins
            .insert(id, prev);
    }

    Ok(prop.infos.iter().map(|i| i.as_path.clone()).collect())
}

/// Find the record at the upstream neighbor whose path is the given record's path without its
/// last hop.
fn find_prev(prop: &PropagationGraph, net: &Prefix, info: &PropagatedInfo) -> Option<PropId> {
    let neighbor = info.peer?;
    let attrs = prop.attrs(neighbor, net)?;
    attrs
        .paths_info
        .union(&attrs.block_info)
        .copied()
        .find(|cand| prop.info(*cand).path == info.path[..info.path.len() - 1])
}
