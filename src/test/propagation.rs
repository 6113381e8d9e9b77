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

//! Tests for the propagation builder: DAG computation, blocking, order checking, AS-path
//! expansion and partial evaluation.

use maplit::btreeset;
use pretty_assertions_sorted::assert_eq;
use test_log::test;

use super::builder::{self, NET1, NET2};
use crate::requirements::{Protocol, Req};
use crate::types::{AsId, Prefix, RouterId};
use crate::Synthesizer;

/// Look up a router path by names.
fn path(syn: &Synthesizer, names: &[&str]) -> Vec<RouterId> {
    names
        .iter()
        .map(|n| syn.graph.get_router(n).unwrap())
        .collect()
}

/// Convert a list of AS numbers.
fn as_path(path: &[u32]) -> Vec<AsId> {
    path.iter().map(|a| AsId(*a)).collect()
}

#[test]
fn ebgp_dag() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.compute_dags().unwrap();
    let prop = syn.propagation().unwrap();

    let dag = &prop.ebgp_graphs[&Prefix::from(NET1)];
    let as100 = &dag.nodes[&AsId(100)];
    assert!(as100.paths.contains(&as_path(&[400, 100])));
    assert!(as100.paths.contains(&as_path(&[500, 100])));
    assert!(as100.block.is_empty());

    let as600 = &dag.nodes[&AsId(600)];
    assert!(as600.paths.contains(&as_path(&[400, 100, 600])));
    assert!(as600.paths.contains(&as_path(&[500, 100, 600])));

    // the providers must not use the network as transit
    let as400 = &dag.nodes[&AsId(400)];
    assert!(as400.block.contains(&as_path(&[500, 100, 400])));
    let as500 = &dag.nodes[&AsId(500)];
    assert!(as500.block.contains(&as_path(&[400, 100, 500])));
}

#[test]
fn ibgp_dag_with_expansion() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.compute_dags().unwrap();
    let prop = syn.propagation().unwrap();
    let dag = &prop.ibgp_graphs[&Prefix::from(NET1)];

    let r3 = syn.graph.get_router("R3").unwrap();
    assert!(dag.nodes[&r3]
        .paths
        .contains(&path(&syn, &["Provider1", "R2", "R3"])));
    assert!(dag.nodes[&r3].block.is_empty());

    // every path reaching a provider over the network is blocked there
    let p1 = syn.graph.get_router("Provider1").unwrap();
    assert_eq!(
        dag.nodes[&p1].block,
        btreeset! {
            path(&syn, &["Provider2", "R3", "R2", "Provider1"]),
            path(&syn, &["Provider2", "R3", "R1", "R2", "Provider1"]),
        }
    );
    let p2 = syn.graph.get_router("Provider2").unwrap();
    assert_eq!(
        dag.nodes[&p2].block,
        btreeset! {
            path(&syn, &["Provider1", "R2", "R3", "Provider2"]),
            path(&syn, &["Provider1", "R2", "R1", "R3", "Provider2"]),
        }
    );

    // the customer sees all four required paths, layered by preference
    let cust = syn.graph.get_router("Customer").unwrap();
    assert_eq!(dag.nodes[&cust].paths.len(), 4);
    assert_eq!(dag.nodes[&cust].order.len(), 2);
    assert_eq!(
        dag.nodes[&cust].order[0],
        btreeset! {
            path(&syn, &["Provider1", "R2", "R1", "Customer"]),
            path(&syn, &["Provider1", "R2", "R3", "R1", "Customer"]),
        }
    );
}

#[test]
fn ibgp_zones() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.compute_dags().unwrap();
    let prop = syn.propagation().unwrap();

    let zone100: Vec<RouterId> = prop.ibgp_zones[&AsId(100)].iter().copied().collect();
    assert_eq!(zone100, path(&syn, &["R1", "R2", "R3"]));
    assert_eq!(
        prop.ibgp_zones[&AsId(400)],
        btreeset! {syn.graph.get_router("Provider1").unwrap()}
    );
}

#[test]
fn partial_eval_infos() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.compute_dags().unwrap();
    let prop = syn.propagation().unwrap();

    let cust = syn.graph.get_router("Customer").unwrap();
    let r1 = syn.graph.get_router("R1").unwrap();
    let r2 = syn.graph.get_router("R2").unwrap();

    let attrs = prop.graph.attrs(cust, &Prefix::from(NET1)).unwrap();
    let via_r2 = path(&syn, &["Provider1", "R2", "R1", "Customer"]);
    let id = attrs
        .paths_info
        .iter()
        .copied()
        .find(|id| prop.graph.info(*id).path == via_r2)
        .unwrap();
    let info = prop.graph.info(id);

    // the last hop into AS 600 is the crossing R1 -> Customer
    assert_eq!(info.peer, Some(r1));
    assert_eq!(info.external_peer, Some(r1));
    assert_eq!(info.egress, Some(cust));
    // reversed, contracted, and spliced with the provider's own AS path
    assert_eq!(info.as_path, as_path(&[600, 100, 400, 5000]));
    assert_eq!(info.as_path_len, 3);

    // the prev link points at the record one hop closer to the origin
    let prev = prop.graph.info(info.prev.unwrap());
    assert_eq!(prev.path, path(&syn, &["Provider1", "R2", "R1"]));
    assert_eq!(prev.peer, Some(r2));
    assert_eq!(attrs.origins[&id], info.prev);

    // every record ends at its owning node, and the two info sets are disjoint
    for (_, info) in prop.graph.infos() {
        assert_eq!(info.path.last(), Some(&info.node()));
    }
    for (node, nets) in &prop.graph.nodes {
        for attrs in nets.values() {
            assert!(attrs.paths_info.is_disjoint(&attrs.block_info), "at {node:?}");
        }
    }
}

#[test]
fn self_originated_info() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.compute_dags().unwrap();
    let prop = syn.propagation().unwrap();

    let p1 = syn.graph.get_router("Provider1").unwrap();
    let attrs = prop.graph.attrs(p1, &Prefix::from(NET1)).unwrap();
    let id = attrs
        .paths_info
        .iter()
        .copied()
        .find(|id| prop.graph.info(*id).path == vec![p1])
        .unwrap();
    let info = prop.graph.info(id);
    assert!(info.is_self_originated());
    assert_eq!(info.peer, None);
    assert_eq!(info.egress, None);
    assert_eq!(info.external_peer, None);
    // the origin AS plus the announcement's own AS path
    assert_eq!(info.as_path, as_path(&[400, 5000]));
    assert_eq!(info.as_path_len, 1);
    assert_eq!(info.prev, None);
}

#[test]
fn missing_origin_announcement() {
    let (mut graph, _) = builder::bgp_peers();
    let r1 = graph.get_router("R1").unwrap();
    let r2 = graph.get_router("R2").unwrap();
    // R2 is required to originate a prefix it never advertises
    let reqs = vec![Req::PathReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from("99.0.0.0/8"),
        path: vec![r1, r2],
        strict: false,
    }];
    graph.add_bgp_session(r1, r2);
    let mut syn = Synthesizer::new(graph, reqs);
    assert!(matches!(
        syn.compute_dags(),
        Err(crate::SynthesisError::MissingOriginAnnouncement(r, p))
            if r == "R2" && p == Prefix::from("99.0.0.0/8")
    ));
}

#[test]
fn unrealizable_order() {
    let (graph, _) = builder::bgp_peers();
    let r1 = graph.get_router("R1").unwrap();
    let r2 = graph.get_router("R2").unwrap();
    let r3 = graph.get_router("R3").unwrap();
    let cust = graph.get_router("Customer").unwrap();
    let p1 = graph.get_router("Provider1").unwrap();
    let p2 = graph.get_router("Provider2").unwrap();

    let path = |nodes: &[RouterId]| Req::PathReq {
        protocol: Protocol::Bgp,
        dst_net: Prefix::from(NET1),
        path: nodes.to_vec(),
        strict: false,
    };
    // the two requirements demand opposite orderings for the same prefix
    let reqs = vec![
        Req::PathOrderReq {
            protocol: Protocol::Bgp,
            dst_net: Prefix::from(NET1),
            paths: vec![path(&[cust, r1, r2, p1]), path(&[cust, r1, r3, p2])],
            strict: false,
        },
        Req::PathOrderReq {
            protocol: Protocol::Bgp,
            dst_net: Prefix::from(NET1),
            paths: vec![path(&[cust, r1, r3, p2]), path(&[cust, r1, r2, p1])],
            strict: false,
        },
        // an unrelated prefix stays unaffected
        Req::PathReq {
            protocol: Protocol::Bgp,
            dst_net: Prefix::from(NET2),
            path: vec![r2, r1, cust],
            strict: false,
        },
    ];

    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(false).unwrap();

    let orders = syn.unmatching_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].dst_net, Prefix::from(NET1));
    assert_eq!(orders[0].node, AsId(100));

    // the conflicting prefix is dropped entirely, the other one is kept
    let prop = syn.propagation().unwrap();
    assert!(!prop.ibgp_graphs.contains_key(&Prefix::from(NET1)));
    assert!(prop.ibgp_graphs.contains_key(&Prefix::from(NET2)));
    assert!(!syn
        .ctx
        .constraints()
        .any(|c| c.name.contains(&format!("prefix_{NET1}"))));
}

#[test]
fn single_route_no_selection() {
    let (graph, reqs) = builder::tie_break(false);
    let r2 = graph.get_router("R2").unwrap();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(true).unwrap();

    // R2 only learns one route for the prefix, so no preference function is needed
    assert!(syn.encoder(r2).unwrap().selection_constraints.is_empty());
}

#[test]
fn same_peer_no_selection() {
    let (graph, reqs) = builder::bgp_peers();
    let cust = graph.get_router("Customer").unwrap();
    let r1 = graph.get_router("R1").unwrap();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(false).unwrap();

    // all four routes at the customer are heard from R1, so none can be ranked there
    assert!(syn.encoder(cust).unwrap().selection_constraints.is_empty());
    // R1 ranks the routes, skipping the two same-peer pairs
    assert_eq!(syn.encoder(r1).unwrap().selection_constraints.len(), 2);
}
