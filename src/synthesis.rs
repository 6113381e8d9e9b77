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

//! The synthesis orchestrator. The [`Synthesizer`] computes the propagation graphs, creates the
//! enum sorts, instantiates one [`BgpEncoder`] per router, wires their imports and exports in
//! two phases, hands the accumulated constraints to the external solver, and materializes the
//! concrete configuration back into the [`NetworkGraph`].

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::bgp::{as_path_key, AnnouncementArena, Origin};
use crate::encoder::BgpEncoder;
use crate::network::NetworkGraph;
use crate::propagation::{self, Propagation, UnmatchingOrder};
use crate::requirements::Req;
use crate::smt::{
    SmtModel, Solver, SolverContext, ASPATH_SORT, BGP_ORIGIN_SORT, NEXT_HOP_SORT, ORIGIN_NEXT_HOP,
    PEER_SORT, PREFIX_SORT,
};
use crate::types::{RouterId, SynthesisError};

/// A generated OSPF requirement: the two router sub-paths must have equal (or unequal) summed
/// OSPF cost, depending on how the solver resolved the corresponding equality variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfRequirement {
    /// Whether the two sub-paths must have equal summed cost.
    pub equal: bool,
    /// The first sub-path (of the preferred route).
    pub first: Vec<RouterId>,
    /// The second sub-path (of the less preferred route).
    pub second: Vec<RouterId>,
}

/// The synthesis orchestrator. See the [module documentation](self) for the overall flow.
#[derive(Debug)]
pub struct Synthesizer {
    /// The topology sketch. Solving writes the concrete configuration back into it.
    pub graph: NetworkGraph,
    /// The solver context accumulating all variables and constraints.
    pub ctx: SolverContext,
    /// The requirements to realize.
    reqs: Vec<Req>,
    /// The computed propagation, once [`Synthesizer::compute_dags`] ran.
    propagation: Option<Propagation>,
    /// The arena of all symbolic announcements.
    anns: AnnouncementArena,
    /// One encoder per router of the propagation graph.
    encoders: BTreeMap<RouterId, BgpEncoder>,
}

impl Synthesizer {
    /// Create a new synthesizer for the given sketch and requirements.
    pub fn new(graph: NetworkGraph, reqs: Vec<Req>) -> Self {
        Self {
            graph,
            ctx: SolverContext::new(),
            reqs,
            propagation: None,
            anns: AnnouncementArena::new(),
            encoders: BTreeMap::new(),
        }
    }

    /// Add a new requirement. Requirements can only be added before the propagation graphs are
    /// computed.
    pub fn add_path_req(&mut self, req: Req) {
        debug_assert!(self.propagation.is_none());
        self.reqs.push(req);
    }

    /// Compute the propagation graphs and create the enum sorts. This is done automatically by
    /// [`Synthesizer::encode`] if it has not happened yet.
    pub fn compute_dags(&mut self) -> Result<(), SynthesisError> {
        if self.propagation.is_some() {
            return Ok(());
        }

        // the community registry is the set of communities of all injected announcements
        for r in self.graph.routers() {
            for ann in self.graph.get_bgp_advertise(r) {
                for c in ann.communities.keys() {
                    self.ctx.add_community(*c);
                }
            }
        }

        let prop = propagation::build(&mut self.graph, &mut self.ctx, &self.reqs)?;
        self.create_sorts(&prop)?;
        self.propagation = Some(prop);
        Ok(())
    }

    /// Create the enum sorts of the announcement attributes. The member universes are read from
    /// the sketch and from the partially evaluated propagation.
    fn create_sorts(&mut self, prop: &Propagation) -> Result<(), SynthesisError> {
        let mut prefixes: BTreeSet<String> = BTreeSet::new();
        let mut next_hops: BTreeSet<String> = BTreeSet::new();
        for r in self.graph.routers() {
            for ann in self.graph.get_bgp_advertise(r) {
                prefixes.insert(ann.prefix.0.clone());
                next_hops.insert(ann.next_hop.clone());
            }
        }
        for nets in prop.graph.nodes.values() {
            prefixes.extend(nets.keys().map(|p| p.0.clone()));
        }
        next_hops.extend(prop.next_hop_map.values().cloned());

        self.ctx.create_enum_sort(PREFIX_SORT, prefixes)?;
        self.ctx.create_enum_sort(
            PEER_SORT,
            self.graph
                .routers()
                .into_iter()
                .map(|r| self.graph.router_name(r).to_string()),
        )?;
        self.ctx.create_enum_sort(
            BGP_ORIGIN_SORT,
            Origin::values().iter().map(|o| o.name().to_string()),
        )?;
        self.ctx.create_enum_sort(
            NEXT_HOP_SORT,
            std::iter::once(ORIGIN_NEXT_HOP.to_string()).chain(next_hops),
        )?;
        self.ctx.create_enum_sort(
            ASPATH_SORT,
            prop.as_paths.iter().map(|p| as_path_key(p)),
        )?;
        Ok(())
    }

    /// Encode the whole synthesis problem. Phase one materializes every router's symbolic
    /// announcements and exports; phase two marks the selected routes, wires the imports to the
    /// neighbors' exports, and emits the selection constraints.
    pub fn encode(&mut self, use_igp: bool) -> Result<(), SynthesisError> {
        self.compute_dags()?;
        let prop = self.propagation.as_ref().expect("computed above");

        info!(
            "encoding {} routers ({} in the network)",
            prop.graph.nodes.len(),
            self.graph.routers().len()
        );

        // phase 1: materialize all symbolic announcements and exported routes
        let nodes: Vec<RouterId> = prop.graph.nodes.keys().copied().collect();
        for node in &nodes {
            let encoder = BgpEncoder::new(*node, &mut self.ctx, &mut self.anns, &self.graph, prop)?;
            self.encoders.insert(*node, encoder);
        }

        // phase 2: all symbols exist, wire the imports and encode the decision process
        for node in &nodes {
            let neighbor_exports: BTreeMap<_, _> = self
                .graph
                .get_bgp_neighbors(*node)
                .into_iter()
                .filter_map(|n| {
                    self.encoders
                        .get(&n)
                        .and_then(|e| e.exported_routes.get(node))
                        .map(|exports| (n, exports.clone()))
                })
                .collect();
            let mut encoder = self.encoders.remove(node).expect("inserted in phase 1");
            encoder.mark_selected(&mut self.ctx, &self.anns, &self.graph, prop);
            encoder.compute_imported_routes(
                &mut self.ctx,
                &mut self.anns,
                &self.graph,
                prop,
                &neighbor_exports,
            )?;
            encoder.encode_selection(&mut self.ctx, &self.anns, &self.graph, prop, use_igp)?;
            self.encoders.insert(*node, encoder);
        }
        Ok(())
    }

    /// Hand the accumulated constraints to the solver.
    pub fn solve(&self, solver: &mut dyn Solver) -> Result<SmtModel, SynthesisError> {
        info!("solving the synthesis problem");
        Ok(solver.solve(&self.ctx)?)
    }

    /// Encode, solve, and materialize the solution into the network graph. Returns the model.
    pub fn synthesize(
        &mut self,
        solver: &mut dyn Solver,
        use_igp: bool,
    ) -> Result<SmtModel, SynthesisError> {
        self.encode(use_igp)?;
        let model = self.solve(solver)?;
        self.update_network_graph(&model)?;
        Ok(model)
    }

    /// Update the network graph with the concrete values of the model: concretized route-maps,
    /// synthesized prefix- and community-lists, and resolved router IDs.
    pub fn update_network_graph(&mut self, model: &SmtModel) -> Result<(), SynthesisError> {
        for encoder in self.encoders.values() {
            encoder.update_network_graph(&self.ctx, model, &mut self.graph)?;
        }
        Ok(())
    }

    /// The OSPF requirements generated by the IGP rungs of the decision ladder, resolved through
    /// the model.
    pub fn generated_ospf_requirements(
        &self,
        model: &SmtModel,
    ) -> Result<Vec<OspfRequirement>, SynthesisError> {
        let mut reqs = Vec::new();
        for encoder in self.encoders.values() {
            for (var, first, second) in &encoder.generated_ospf_reqs {
                reqs.push(OspfRequirement {
                    equal: model.get_bool(&self.ctx, *var)?,
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
        Ok(reqs)
    }

    /// The diagnostics for requirements whose AS-level preferences BGP cannot express.
    pub fn unmatching_orders(&self) -> &[UnmatchingOrder] {
        self.propagation
            .as_ref()
            .map(|p| p.unmatching_orders.as_slice())
            .unwrap_or(&[])
    }

    /// The computed propagation, if [`Synthesizer::compute_dags`] ran.
    pub fn propagation(&self) -> Option<&Propagation> {
        self.propagation.as_ref()
    }

    /// The encoder of a router, if [`Synthesizer::encode`] ran.
    pub fn encoder(&self, node: RouterId) -> Option<&BgpEncoder> {
        self.encoders.get(&node)
    }

    /// The arena of all symbolic announcements.
    pub fn announcements(&self) -> &AnnouncementArena {
        &self.anns
    }
}
