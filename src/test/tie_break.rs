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

//! Tests for the lower rungs of the decision ladder: two routes that tie on local-pref, AS-path
//! length, origin and MED are ranked by the summed in-AS OSPF costs, and, if those are declared
//! equal, by the router IDs of the advertising neighbors.

use pretty_assertions_sorted::assert_eq;
use test_log::test;

use super::builder;
use super::find_var;
use crate::smt::{SmtModel, Term};
use crate::types::RouterId;
use crate::Synthesizer;

/// Look up a router path by names.
fn path(syn: &Synthesizer, names: &[&str]) -> Vec<RouterId> {
    names
        .iter()
        .map(|n| syn.graph.get_router(n).unwrap())
        .collect()
}

/// The selection constraint at `R1` ranking the route via `R2` above the route via `R3`.
fn select_via_r2(syn: &Synthesizer) -> Term {
    let r1 = syn.graph.get_router("R1").unwrap();
    let prop = syn.propagation().unwrap();
    let best_path = path(syn, &["Ext", "R4", "R2", "R1"]);
    let other_path = path(syn, &["Ext", "R4", "R3", "R1"]);
    let (name, _) = syn
        .encoder(r1)
        .unwrap()
        .selection_constraints
        .iter()
        .find(|(_, (best, other))| {
            prop.graph.info(*best).path == best_path && prop.graph.info(*other).path == other_path
        })
        .expect("the pair must produce a selection constraint");
    syn.ctx.constraint(name).unwrap().term.clone()
}

/// Assign both announcements of the pair so that every rung above the IGP comparison ties.
fn tie_upper_rungs(syn: &Synthesizer, model: &mut SmtModel) {
    let r1 = syn.graph.get_router("R1").unwrap();
    let prop = syn.propagation().unwrap();
    let enc = syn.encoder(r1).unwrap();
    for names in [["Ext", "R4", "R2", "R1"], ["Ext", "R4", "R3", "R1"]] {
        let p = path(syn, &names);
        let id = prop
            .graph
            .props(r1, true, None)
            .into_iter()
            .find(|id| prop.graph.info(*id).path == p)
            .unwrap();
        let ann = syn.announcements().get(enc.anns_map[&id]);
        model.set(ann.local_pref, 100u32);
        model.set(ann.med, 100u32);
        model.set(ann.permitted, true);
    }
}

#[test]
fn ospf_tie_break() {
    let (graph, reqs) = builder::tie_break(false);
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(true).unwrap();
    let term = select_via_r2(&syn);

    // the IGP comparison generated an OSPF requirement over the two in-AS sub-paths
    let r1 = syn.graph.get_router("R1").unwrap();
    let reqs = &syn.encoder(r1).unwrap().generated_ospf_reqs;
    let (igp_path_equal, _, _) = reqs
        .iter()
        .find(|(_, first, second)| {
            *first == path(&syn, &["R1", "R2", "R4"]) && *second == path(&syn, &["R1", "R3", "R4"])
        })
        .expect("the IGP rung must record an OSPF requirement");

    let mut model = SmtModel::new();
    tie_upper_rungs(&syn, &mut model);
    model.set(*igp_path_equal, false);
    // the path via R2 costs 2, the path via R3 costs 4
    model.set(find_var(&syn.ctx, "IGP_edge_cost_R1_R2_0"), 1i64);
    model.set(find_var(&syn.ctx, "IGP_edge_cost_R2_R4_0"), 1i64);
    model.set(find_var(&syn.ctx, "IGP_edge_cost_R1_R3_0"), 2i64);
    model.set(find_var(&syn.ctx, "IGP_edge_cost_R3_R4_0"), 2i64);
    assert!(syn.ctx.eval_bool(&term, &model).unwrap());

    // once the costs are declared equal, the IGP rung can no longer rank the pair (and without
    // router IDs, nothing can)
    model.set(*igp_path_equal, true);
    assert!(!syn.ctx.eval_bool(&term, &model).unwrap());
}

#[test]
fn router_id_tie_break() {
    let (graph, reqs) = builder::tie_break(true);
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(true).unwrap();
    let term = select_via_r2(&syn);

    let r1 = syn.graph.get_router("R1").unwrap();
    let igp_path_equal = syn.encoder(r1).unwrap().generated_ospf_reqs[0].0;

    let mut model = SmtModel::new();
    tie_upper_rungs(&syn, &mut model);
    // identical IGP costs; the routes are only distinguished by the router IDs
    model.set(igp_path_equal, true);
    for edge in ["R1_R2", "R2_R4", "R1_R3", "R3_R4"] {
        model.set(find_var(&syn.ctx, &format!("IGP_edge_cost_{edge}_0")), 1i64);
    }

    // R2's synthesized router ID is smaller than R3's fixed one, so R2's route wins
    let r2_id = find_var(&syn.ctx, "R2_router_id_");
    model.set(r2_id, 3i64);
    assert!(syn.ctx.eval_bool(&term, &model).unwrap());

    // with a larger router ID, the pair cannot be ranked anymore
    model.set(r2_id, 7i64);
    assert!(!syn.ctx.eval_bool(&term, &model).unwrap());
}

#[test]
fn router_ids_distinct_and_positive() {
    let (graph, reqs) = builder::tie_break(true);
    let mut syn = Synthesizer::new(graph, reqs);
    syn.compute_dags().unwrap();

    let unique = syn.ctx.constraint("router_id_unique0").unwrap().term.clone();
    let r2_id = find_var(&syn.ctx, "R2_router_id_");

    // R3's router ID is fixed to 5 in the sketch
    let mut model = SmtModel::new();
    model.set(r2_id, 5i64);
    assert!(!syn.ctx.eval_bool(&unique, &model).unwrap());
    model.set(r2_id, 3i64);
    assert!(syn.ctx.eval_bool(&unique, &model).unwrap());

    let positive: Vec<_> = syn
        .ctx
        .constraints()
        .filter(|c| c.name.starts_with("router_id_larger_than_zero_"))
        .collect();
    assert_eq!(positive.len(), 2);
}

#[test]
fn unknown_router_ids_are_pessimistic() {
    // without router-id slots in the sketch, the ladder falls back to a boolean that is fixed to
    // false, so the router-id rung can never fire
    let (graph, reqs) = builder::tie_break(false);
    let mut syn = Synthesizer::new(graph, reqs);
    syn.encode(true).unwrap();

    let var = find_var(&syn.ctx, "SelectRouterID_R1_0");
    assert_eq!(
        syn.ctx.var_value(var),
        Some(crate::smt::Value::Bool(false))
    );
}
