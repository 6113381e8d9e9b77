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

//! End-to-end test on the two-providers-one-customer network: the customer traffic must prefer
//! any exit via `Provider1` over any exit via `Provider2`, and the providers must not use the
//! network as transit. The checking solver validates a hand-picked filling of the sketch holes
//! against the full constraint set, and the concretized configuration is written back.

use pretty_assertions_sorted::assert_eq;
use test_log::test;

use super::builder::{self, NET1};
use super::CheckingSolver;
use crate::bgp::{as_path_key, PropId, SymbolicAnnouncement};
use crate::route_map::{Access, IpPrefixList, RouteMapMatch, RouteMapSet};
use crate::smt::{SmtModel, Value};
use crate::types::{AsId, Prefix, Sketch};
use crate::Synthesizer;

/// Find the record at `node` whose propagation path visits the given routers.
fn info_id(syn: &Synthesizer, node: &str, path_names: &[&str]) -> PropId {
    let node = syn.graph.get_router(node).unwrap();
    let path: Vec<_> = path_names
        .iter()
        .map(|n| syn.graph.get_router(n).unwrap())
        .collect();
    let prop = syn.propagation().unwrap();
    let attrs = prop.graph.attrs(node, &Prefix::from(NET1)).unwrap();
    attrs
        .paths_info
        .union(&attrs.block_info)
        .copied()
        .find(|id| prop.graph.info(*id).path == path)
        .unwrap_or_else(|| panic!("no record for {path_names:?} at {node:?}"))
}

/// The symbolic announcement of a record at a router.
fn sham<'a>(syn: &'a Synthesizer, node: &str, id: PropId) -> &'a SymbolicAnnouncement {
    let node = syn.graph.get_router(node).unwrap();
    let ann = syn.encoder(node).unwrap().anns_map[&id];
    syn.announcements().get(ann)
}

/// The hand-picked filling of the sketch holes realizing the requirements: permit and raise the
/// local-pref on announcements entering via `Provider1`, permit with the default local-pref via
/// `Provider2`, allow the routes the customer needs, and keep the iBGP sessions between `R2` and
/// `R3` open.
fn candidate(syn: &Synthesizer) -> SmtModel {
    let mut model = SmtModel::new();
    let ctx = &syn.ctx;
    let assignments: [(&str, Value); 10] = [
        ("R2_import_from_Provider1_line10_access_", true.into()),
        ("R2_import_from_Provider1_line10_match_prefix_0", true.into()),
        ("R2_import_from_Provider1_line10_set_local_pref_", Value::Int(200)),
        ("R3_import_from_Provider2_line10_access_", true.into()),
        ("R3_import_from_Provider2_line10_match_prefix_0", true.into()),
        ("R3_import_from_Provider2_line10_set_local_pref_", Value::Int(100)),
        ("R1_export_to_Customer_line10_access_", true.into()),
        ("R1_export_to_Customer_line10_match_prefix_0", true.into()),
        ("R2_export_R3_line10_access_", true.into()),
        ("R3_export_R2_line10_access_", true.into()),
    ];
    for (name, value) in assignments {
        model.set(super::find_var(ctx, name), value);
    }
    model
}

#[test]
fn prefer_provider1() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(false).unwrap();

    let mut solver = CheckingSolver::new(candidate(&syn));
    let model = syn.solve(&mut solver).unwrap();
    let ctx = &syn.ctx;

    // R1 stores the route via Provider1 with the raised local-pref and selects it
    let best = sham(&syn, "R1", info_id(&syn, "R1", &["Provider1", "R2", "R1"]));
    assert!(model.get_bool(ctx, best.permitted).unwrap());
    assert_eq!(model.get_int(ctx, best.local_pref).unwrap(), 200);
    // ... and its resolved AS path exits via AS 400
    let key = ctx.member_name(model.get_enum(ctx, best.as_path).unwrap());
    assert_eq!(key, as_path_key(&[AsId(100), AsId(400), AsId(5000)]));

    // the iBGP hop preserved the next-hop rewritten at the AS entry
    let nh = ctx.member_name(model.get_enum(ctx, best.next_hop).unwrap());
    assert_eq!(nh, "Provider1Hop");

    // the alternative via Provider2 is permitted as backup, with a lower local-pref
    let backup = sham(&syn, "R1", info_id(&syn, "R1", &["Provider2", "R3", "R1"]));
    assert!(model.get_bool(ctx, backup.permitted).unwrap());
    assert_eq!(model.get_int(ctx, backup.local_pref).unwrap(), 100);

    // at the customer, the eBGP import resets the local-pref and rewrites the next-hop
    let at_cust = sham(
        &syn,
        "Customer",
        info_id(&syn, "Customer", &["Provider1", "R2", "R1", "Customer"]),
    );
    assert_eq!(model.get_int(ctx, at_cust.local_pref).unwrap(), 100);
    let nh = ctx.member_name(model.get_enum(ctx, at_cust.next_hop).unwrap());
    assert_eq!(nh, "R1Hop");
}

#[test]
fn no_transit() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(false).unwrap();

    let mut solver = CheckingSolver::new(candidate(&syn));
    let model = syn.solve(&mut solver).unwrap();
    let ctx = &syn.ctx;

    // the paths crossing the network between the providers exist only as blocked records, and
    // their announcements resolve to permitted = false
    for (node, path) in [
        ("Provider1", ["Provider2", "R3", "R2", "Provider1"].as_slice()),
        ("Provider2", &["Provider1", "R2", "R3", "Provider2"]),
        ("Provider2", &["Provider1", "R2", "R1", "R3", "Provider2"]),
    ] {
        let id = info_id(&syn, node, path);
        let node_id = syn.graph.get_router(node).unwrap();
        let attrs = syn
            .propagation()
            .unwrap()
            .graph
            .attrs(node_id, &Prefix::from(NET1))
            .unwrap();
        assert!(attrs.block_info.contains(&id));
        let ann = sham(&syn, node, id);
        assert!(!model.get_bool(ctx, ann.permitted).unwrap());
    }
}

#[test]
fn materialize_configuration() {
    let (graph, reqs) = builder::bgp_peers();
    let mut syn = Synthesizer::new(graph, reqs.clone());
    syn.encode(false).unwrap();

    let mut solver = CheckingSolver::new(candidate(&syn));
    let model = syn.solve(&mut solver).unwrap();
    syn.update_network_graph(&model).unwrap();

    // no IGP rung ran, so no OSPF requirements were generated
    assert!(syn.generated_ospf_requirements(&model).unwrap().is_empty());

    // the synthesized import policy at R2 raises the local-pref for the provider's prefix
    let r2 = syn.graph.get_router("R2").unwrap();
    let rmap = &syn.graph.get_route_maps(r2)["R2_import_from_Provider1"];
    let line = &rmap.lines[0];
    assert_eq!(line.access, Sketch::Concrete(Access::Permit));
    assert!(matches!(
        &line.matches[0],
        RouteMapMatch::IpPrefixList(IpPrefixList { networks, .. })
            if networks == &Sketch::Concrete(vec![Prefix::from(NET1)])
    ));
    assert_eq!(
        line.actions[0],
        RouteMapSet::LocalPref(Sketch::Concrete(200))
    );
    // the synthesized prefix-list is installed on the router
    assert!(syn
        .graph
        .get_ip_prefix_lists(r2)
        .contains_key("R2_import_from_Provider1_pl_10"));

    // the hole-access line between R2 and R3 resolved to permit
    let line = &syn.graph.get_route_maps(r2)["R2_export_R3"].lines[0];
    assert_eq!(line.access, Sketch::Concrete(Access::Permit));

    // re-encoding the concretized configuration is trivially satisfiable and yields the same
    // propagation graphs
    let dags = syn.propagation().unwrap().ibgp_graphs.clone();
    let graph = std::mem::take(&mut syn.graph);
    let mut again = Synthesizer::new(graph, reqs);
    again.encode(false).unwrap();
    assert_eq!(again.propagation().unwrap().ibgp_graphs, dags);
    let mut solver = CheckingSolver::new(SmtModel::new());
    again.solve(&mut solver).unwrap();
}
