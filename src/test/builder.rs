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

//! Shared test topologies: an AS with two providers and one customer, where the customer
//! traffic must prefer one provider over the other and the providers must not use the network
//! as transit; and a four-router full mesh used for the IGP and router-id tie-breaks.

use std::collections::BTreeMap;

use crate::bgp::{Announcement, Origin};
use crate::network::NetworkGraph;
use crate::requirements::{Protocol, Req};
use crate::route_map::{Access, RouteMap, RouteMapLine};
use crate::types::{Community, Prefix, RouterId, Sketch};

/// The prefix announced by both providers.
pub const NET1: &str = "128.0.0.0/24";
/// The prefix announced by the customer.
pub const NET2: &str = "128.0.1.0/24";

/// The three known communities of the test sketches.
pub fn communities() -> Vec<Community> {
    (1..4).map(|c| Community(100, c)).collect()
}

/// An announcement with all communities cleared.
fn announcement(prefix: &str, peer: RouterId, as_path: Vec<u32>, next_hop: &str) -> Announcement {
    let as_path_len = as_path.len();
    Announcement {
        prefix: Prefix::from(prefix),
        peer,
        origin: Origin::Incomplete,
        as_path: as_path.into_iter().map(Into::into).collect(),
        as_path_len,
        next_hop: next_hop.to_string(),
        local_pref: 100,
        med: 100,
        communities: communities().into_iter().map(|c| (c, false)).collect(),
        permitted: true,
    }
}

/// Build the two-providers-one-customer network:
///
/// ```text
///    Provider1 (AS400)     Provider2 (AS500)
///        |                     |
///        R2 ------------------ R3
///         \                   /
///          +------- R1 ------+          AS 100
///                   |
///               Customer (AS600)
/// ```
///
/// `Provider1` and `Provider2` announce `128.0.0.0/24`, the customer announces `128.0.1.0/24`.
/// The sketch attaches fully symbolic import/export route-maps towards the external peers, and
/// hole-access export route-maps between `R2` and `R3`. The requirements prefer any exit via
/// `Provider1` over any exit via `Provider2`.
pub fn bgp_peers() -> (NetworkGraph, Vec<Req>) {
    let mut graph = NetworkGraph::new();
    let r1 = graph.add_router("R1");
    let r2 = graph.add_router("R2");
    let r3 = graph.add_router("R3");
    for r in [r1, r2, r3] {
        graph.set_bgp_asnum(r, 100u32);
    }
    for (a, b) in [(r1, r2), (r1, r3), (r2, r3)] {
        graph.add_link(a, b);
        graph.set_edge_ospf_cost(a, b, Sketch::Hole);
        graph.add_bgp_session(a, b);
    }

    let provider1 = graph.add_peer("Provider1");
    let provider2 = graph.add_peer("Provider2");
    let customer = graph.add_peer("Customer");
    graph.set_bgp_asnum(provider1, 400u32);
    graph.set_bgp_asnum(provider2, 500u32);
    graph.set_bgp_asnum(customer, 600u32);
    for (peer, r) in [(provider1, r2), (provider2, r3), (customer, r1)] {
        graph.add_link(peer, r);
        graph.add_bgp_session(peer, r);
    }

    graph.add_bgp_advertise(
        provider1,
        announcement(NET1, provider1, vec![5000], "Provider1Hop"),
    );
    graph.add_bgp_advertise(
        provider2,
        announcement(NET1, provider2, vec![3000, 5000], "0.0.0.0"),
    );
    graph.add_bgp_advertise(customer, announcement(NET2, customer, vec![], "0.0.0.0"));

    // the configuration sketch: symbolic policies towards all external peers
    for (local, peer) in [(r1, customer), (r2, provider1), (r3, provider2)] {
        let (local_n, peer_n) = (
            graph.router_name(local).to_string(),
            graph.router_name(peer).to_string(),
        );
        let imp = RouteMap::generate_symbolic(format!("{local_n}_import_from_{peer_n}"));
        let exp = RouteMap::generate_symbolic(format!("{local_n}_export_to_{peer_n}"));
        graph.add_bgp_import_route_map(local, peer, &imp.name);
        graph.add_bgp_export_route_map(local, peer, &exp.name);
        graph.add_route_map(local, imp);
        graph.add_route_map(local, exp);
    }

    // hole-access export maps between R2 and R3, with the usual deny tail
    for (local, peer) in [(r2, r3), (r3, r2)] {
        let name = format!(
            "{}_export_{}",
            graph.router_name(local),
            graph.router_name(peer)
        );
        let rmap = RouteMap::new(
            name.clone(),
            vec![
                RouteMapLine {
                    lineno: 10,
                    access: Sketch::Hole,
                    matches: vec![],
                    actions: vec![],
                },
                RouteMapLine {
                    lineno: 100,
                    access: Sketch::Concrete(Access::Deny),
                    matches: vec![],
                    actions: vec![],
                },
            ],
        );
        graph.add_route_map(local, rmap);
        graph.add_bgp_export_route_map(local, peer, &name);
    }

    let path = |nodes: &[RouterId]| Req::PathReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        path: nodes.to_vec(),
        strict: false,
    };
    let via_provider1 = Req::KConnectedPathsReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        paths: vec![
            path(&[customer, r1, r2, provider1]),
            path(&[customer, r1, r3, r2, provider1]),
            path(&[r3, r1, r2, provider1]),
        ],
        strict: false,
    };
    let via_provider2 = Req::KConnectedPathsReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        paths: vec![
            path(&[customer, r1, r3, provider2]),
            path(&[customer, r1, r2, r3, provider2]),
            path(&[r2, r1, r3, provider2]),
        ],
        strict: false,
    };
    let reqs = vec![Req::PathOrderReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        paths: vec![via_provider1, via_provider2],
        strict: false,
    }];

    (graph, reqs)
}

/// Build a four-router full mesh in AS 100 with one external peer at `R4` announcing [`NET1`].
/// The requirements rank three paths towards `R1`: via `R2`, then via `R3`, then directly from
/// `R4`. All link costs are holes, so only the IGP and router-id rungs can rank the first two.
/// With `with_router_ids`, the sketch declares a router-id hole on `R2` and fixes `R3` to 5.
pub fn tie_break(with_router_ids: bool) -> (NetworkGraph, Vec<Req>) {
    let mut graph = NetworkGraph::new();
    let routers: BTreeMap<&str, RouterId> = ["R1", "R2", "R3", "R4"]
        .into_iter()
        .map(|n| (n, graph.add_router(n)))
        .collect();
    let (r1, r2, r3, r4) = (routers["R1"], routers["R2"], routers["R3"], routers["R4"]);
    for r in [r1, r2, r3, r4] {
        graph.set_bgp_asnum(r, 100u32);
    }
    for (a, b) in [(r1, r2), (r1, r3), (r1, r4), (r2, r3), (r2, r4), (r3, r4)] {
        graph.add_link(a, b);
        graph.set_edge_ospf_cost(a, b, Sketch::Hole);
        graph.add_bgp_session(a, b);
    }
    if with_router_ids {
        graph.set_bgp_router_id_sketch(r2, Sketch::Hole);
        graph.set_bgp_router_id_sketch(r3, Sketch::Concrete(5));
    }

    let ext = graph.add_peer("Ext");
    graph.set_bgp_asnum(ext, 200u32);
    graph.add_link(ext, r4);
    graph.add_bgp_session(ext, r4);
    graph.add_bgp_advertise(ext, announcement(NET1, ext, vec![7000], "ExtHop"));

    let path = |nodes: &[RouterId]| Req::PathReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        path: nodes.to_vec(),
        strict: false,
    };
    let reqs = vec![Req::PathOrderReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        paths: vec![
            path(&[r1, r2, r4, ext]),
            path(&[r1, r3, r4, ext]),
            path(&[r1, r4, ext]),
        ],
        strict: false,
    }];

    (graph, reqs)
}
