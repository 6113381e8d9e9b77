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

//! The per-router BGP encoder. For the router it owns, a [`BgpEncoder`] creates one symbolic
//! announcement per [`PropagatedInfo`] the router may learn, computes the announcements exported
//! to each neighbor (through the export route-map), wires the announcements imported from each
//! neighbor (next-hop rewrite, import route-map, attribute equalities), and finally encodes the
//! BGP decision process over the ordered requirement sets.
//!
//! Every router's import is another router's export, so the encoders are run in two phases: the
//! constructor materializes all symbolic announcements and exports (no cross-router reads of
//! symbolic state), and only afterwards the imports and selection constraints are wired, when
//! every symbol already exists. Implementations must not attempt recursive resolution.

pub mod route_map;

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::{debug, info, warn};

use crate::bgp::{
    as_path_key, AnnAttr, AnnId, AnnouncementArena, Origin, PropId, SymbolicAnnouncement,
};
use crate::formatter::NetworkFormatter;
use crate::network::{NetworkGraph, RouterIdSlot};
use crate::propagation::Propagation;
use crate::smt::{
    EnumSortId, SmtError, SmtModel, SmtVar, SolverContext, Sort, Term, Value, ASPATH_SORT,
    BGP_ORIGIN_SORT, NEXT_HOP_SORT, PEER_SORT, PREFIX_SORT,
};
use crate::types::{Prefix, RouterId, Sketch, SynthesisError, DEFAULT_LOCAL_PREF};

use route_map::SmtRouteMap;

/// The resolved enum sorts of the announcement attributes.
#[derive(Debug, Clone, Copy)]
pub struct AnnSorts {
    /// The prefix sort.
    pub prefix: EnumSortId,
    /// The peer sort.
    pub peer: EnumSortId,
    /// The origin sort.
    pub origin: EnumSortId,
    /// The AS-path sort.
    pub as_path: EnumSortId,
    /// The next-hop sort.
    pub next_hop: EnumSortId,
}

impl AnnSorts {
    /// Resolve all announcement sorts on the context.
    pub fn resolve(ctx: &SolverContext) -> Result<Self, SmtError> {
        Ok(Self {
            prefix: ctx.enum_sort(PREFIX_SORT)?,
            peer: ctx.enum_sort(PEER_SORT)?,
            origin: ctx.enum_sort(BGP_ORIGIN_SORT)?,
            as_path: ctx.enum_sort(ASPATH_SORT)?,
            next_hop: ctx.enum_sort(NEXT_HOP_SORT)?,
        })
    }
}

/// Create a fully symbolic announcement: one fresh, unconstrained variable per attribute and per
/// registered community.
pub(crate) fn fresh_announcement(
    ctx: &mut SolverContext,
    anns: &mut AnnouncementArena,
    sorts: &AnnSorts,
    name_prefix: &str,
    prev: Option<AnnId>,
) -> AnnId {
    let communities = ctx
        .communities()
        .collect_vec()
        .into_iter()
        .map(|c| {
            let var = ctx.fresh_var(Sort::Bool, &format!("{name_prefix}Comm_{}_", c.var_name()));
            (c, var)
        })
        .collect();
    anns.alloc(SymbolicAnnouncement {
        prefix: ctx.fresh_var(Sort::Enum(sorts.prefix), &format!("{name_prefix}prefix_")),
        peer: ctx.fresh_var(Sort::Enum(sorts.peer), &format!("{name_prefix}peer_")),
        origin: ctx.fresh_var(Sort::Enum(sorts.origin), &format!("{name_prefix}origin_")),
        as_path: ctx.fresh_var(Sort::Enum(sorts.as_path), &format!("{name_prefix}as_path_")),
        as_path_len: ctx.fresh_var(Sort::Int, &format!("{name_prefix}as_path_len_")),
        next_hop: ctx.fresh_var(Sort::Enum(sorts.next_hop), &format!("{name_prefix}next_hop_")),
        local_pref: ctx.fresh_var(Sort::Int, &format!("{name_prefix}local_pref_")),
        med: ctx.fresh_var(Sort::Int, &format!("{name_prefix}med_")),
        permitted: ctx.fresh_var(Sort::Bool, &format!("{name_prefix}permitted_")),
        communities,
        prev_announcement: prev,
    })
}

/// The encoder of one router. See the [module documentation](self) for the overall flow.
#[derive(Debug)]
pub struct BgpEncoder {
    /// The router this encoder owns.
    pub node: RouterId,
    /// The symbolic announcement of every record the router (possibly) learns.
    pub anns_map: BTreeMap<PropId, AnnId>,
    /// The subset of records that the requirements demand be chosen as best.
    pub selected_sham: BTreeSet<PropId>,
    /// Per neighbor, the announcement exported to it for every record the neighbor holds because
    /// of this router. The values are the last links of the export route-map chains.
    pub exported_routes: BTreeMap<RouterId, BTreeMap<PropId, AnnId>>,
    /// The route-maps of this router that were lifted into the solver.
    pub rmaps: BTreeMap<String, SmtRouteMap>,
    /// Generated OSPF requirements: for every IGP comparison of the decision ladder, the
    /// equality variable and the two in-AS sub-paths whose summed costs it compares.
    pub generated_ospf_reqs: Vec<(SmtVar, Vec<RouterId>, Vec<RouterId>)>,
    /// The registered selection constraints, by name.
    pub selection_constraints: BTreeMap<String, (PropId, PropId)>,
    /// The resolved announcement sorts.
    sorts: AnnSorts,
}

impl BgpEncoder {
    /// Phase one: create the encoder for a router, materialize the symbolic announcement of
    /// every record it may learn, and compute the announcements it exports to each neighbor.
    /// This never reads another encoder's symbolic state.
    pub fn new(
        node: RouterId,
        ctx: &mut SolverContext,
        anns: &mut AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
    ) -> Result<Self, SynthesisError> {
        let sorts = AnnSorts::resolve(ctx)?;
        let mut encoder = Self {
            node,
            anns_map: BTreeMap::new(),
            selected_sham: BTreeSet::new(),
            exported_routes: BTreeMap::new(),
            rmaps: BTreeMap::new(),
            generated_ospf_reqs: Vec::new(),
            selection_constraints: BTreeMap::new(),
            sorts,
        };
        encoder.create_symbolic_announcements(ctx, anns, graph, prop)?;
        encoder.selected_sham = prop.graph.props(node, false, None).into_iter().collect();
        encoder.compute_exported_routes(ctx, anns, graph, prop)?;
        Ok(encoder)
    }

    /// Create the symbolic announcement of every record in `paths_info` and `block_info`. The
    /// attributes that partial evaluation already knows (prefix, peer, origin, AS path and its
    /// length) are fixed; for self-originated records, the operator-supplied announcement also
    /// fixes local-pref, MED and the communities, and the next-hop is the origin sentinel.
    fn create_symbolic_announcements(
        &mut self,
        ctx: &mut SolverContext,
        anns: &mut AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
    ) -> Result<(), SynthesisError> {
        for id in prop.graph.props(self.node, true, None) {
            let info = prop.graph.info(id);
            let peer = if info.is_self_originated() {
                self.node
            } else {
                info.peer.unwrap_or(self.node)
            };
            let name_prefix = format!(
                "Sham_{}_{}_from_{}_",
                self.node.fmt(graph),
                info.ann_name,
                peer.fmt(graph)
            );

            let prefix_val = ctx.enum_value(self.sorts.prefix, &info.ann_name.0)?;
            let peer_val = ctx.enum_value(self.sorts.peer, graph.router_name(peer))?;
            let origin_val = ctx.enum_value(self.sorts.origin, Origin::Ebgp.name())?;
            let as_path_val = ctx.enum_value(self.sorts.as_path, &as_path_key(&info.as_path))?;

            let mut next_hop = None;
            let mut local_pref = None;
            let mut med = None;
            let mut fixed_communities: BTreeMap<_, _> = BTreeMap::new();
            if info.is_self_originated() {
                let origin_ann = graph
                    .get_bgp_advertise_for(info.path[0], &info.ann_name)
                    .ok_or_else(|| {
                        SynthesisError::MissingOriginAnnouncement(
                            graph.router_name(info.path[0]).to_string(),
                            info.ann_name.clone(),
                        )
                    })?;
                next_hop = Some(Value::Enum(ctx.origin_next_hop()?));
                local_pref = Some(Value::from(origin_ann.local_pref));
                med = Some(Value::from(origin_ann.med));
                for c in ctx.communities().collect_vec() {
                    // communities absent from the advertisement start out as not set
                    let set = origin_ann.communities.get(&c).copied().unwrap_or(false);
                    fixed_communities.insert(c, set);
                }
            }

            let communities = ctx
                .communities()
                .collect_vec()
                .into_iter()
                .map(|c| {
                    let value = fixed_communities.get(&c).map(|b| Value::Bool(*b));
                    let var = ctx.create_var(
                        Sort::Bool,
                        value,
                        &format!("{name_prefix}Comm_{}_", c.var_name()),
                    );
                    (c, var)
                })
                .collect();

            let ann = SymbolicAnnouncement {
                prefix: ctx.create_var(
                    Sort::Enum(self.sorts.prefix),
                    Some(prefix_val.into()),
                    &format!("{name_prefix}prefix_"),
                ),
                peer: ctx.create_var(
                    Sort::Enum(self.sorts.peer),
                    Some(peer_val.into()),
                    &format!("{name_prefix}peer_"),
                ),
                origin: ctx.create_var(
                    Sort::Enum(self.sorts.origin),
                    Some(origin_val.into()),
                    &format!("{name_prefix}origin_"),
                ),
                as_path: ctx.create_var(
                    Sort::Enum(self.sorts.as_path),
                    Some(as_path_val.into()),
                    &format!("{name_prefix}as_path_"),
                ),
                as_path_len: ctx.create_var(
                    Sort::Int,
                    Some(Value::Int(info.as_path_len as i64)),
                    &format!("{name_prefix}as_path_len_"),
                ),
                next_hop: ctx.create_var(
                    Sort::Enum(self.sorts.next_hop),
                    next_hop,
                    &format!("{name_prefix}next_hop_"),
                ),
                local_pref: ctx.create_var(
                    Sort::Int,
                    local_pref,
                    &format!("{name_prefix}local_pref_"),
                ),
                med: ctx.create_var(Sort::Int, med, &format!("{name_prefix}med_")),
                permitted: ctx.fresh_var(Sort::Bool, &format!("{name_prefix}permitted_")),
                communities,
                prev_announcement: None,
            };
            self.anns_map.insert(id, anns.alloc(ann));
        }
        Ok(())
    }

    /// Compute the announcements exported on each outgoing BGP session: every record a neighbor
    /// holds because of this router is mapped (through the neighbor's `origins`) to this
    /// router's own announcement, and the export route-map (if any) is applied on top.
    fn compute_exported_routes(
        &mut self,
        ctx: &mut SolverContext,
        anns: &mut AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
    ) -> Result<(), SynthesisError> {
        debug!("compute exported routes at {}", self.node.fmt(graph));

        let mut export_anns: BTreeMap<RouterId, BTreeMap<PropId, AnnId>> = BTreeMap::new();
        for neighbor in graph.get_bgp_neighbors(self.node) {
            let mut exports = BTreeMap::new();
            for id in prop.graph.props(neighbor, true, Some(self.node)) {
                let info = prop.graph.info(id);
                let origin = prop
                    .graph
                    .attrs(neighbor, &info.ann_name)
                    .and_then(|attrs| attrs.origins.get(&id).copied())
                    .flatten();
                let Some(origin) = origin else {
                    continue;
                };
                exports.insert(id, self.anns_map[&origin]);
            }
            if !exports.is_empty() {
                export_anns.insert(neighbor, exports);
            }
        }

        // apply any export policies (if any)
        for (neighbor, exports) in export_anns.iter_mut() {
            let Some(rmap_name) = graph.get_bgp_export_route_map(self.node, *neighbor) else {
                continue;
            };
            let rmap = graph
                .get_route_maps(self.node)
                .get(rmap_name)
                .ok_or_else(|| {
                    SynthesisError::UnknownRouteMap(
                        rmap_name.to_string(),
                        self.node.fmt(graph),
                    )
                })?;
            let props = exports.keys().copied().collect_vec();
            let inputs = props.iter().map(|p| exports[p]).collect_vec();
            let mut smt_map = SmtRouteMap::build(ctx, rmap)?;
            smt_map.execute(ctx, anns, inputs)?;
            for (index, p) in props.iter().enumerate() {
                let out = smt_map.outputs[index];
                debug_assert!(anns.derives_from(out, smt_map.inputs[index]));
                exports.insert(*p, out);
            }
            self.rmaps.insert(rmap_name.to_string(), smt_map);
        }

        self.exported_routes = export_anns;
        Ok(())
    }

    /// Assert that exactly the records of the selected sham are permitted: every other learned
    /// announcement must resolve to `permitted = false`.
    pub fn mark_selected(
        &mut self,
        ctx: &mut SolverContext,
        anns: &AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
    ) {
        for (id, ann) in &self.anns_map {
            let info = prop.graph.info(*id);
            let n = format!(
                "_{}_from_{}_path_{}_",
                self.node.fmt(graph),
                info.peer.fmt(graph),
                info.path.fmt(graph)
            );
            let permitted = anns.get(*ann).permitted;
            if self.selected_sham.contains(id) {
                ctx.register_constraint(
                    Term::eq(permitted, true),
                    &format!("Req_Allow{n}"),
                );
            } else {
                ctx.register_constraint(
                    Term::eq(permitted, false),
                    &format!("Req_Block{n}"),
                );
            }
        }
    }

    /// Phase two: read each neighbor's exported announcements destined to this router, rewrite
    /// their next-hop (and local-pref on eBGP sessions), apply the import route-map, and equate
    /// the result attribute-by-attribute with this router's own symbolic announcements.
    pub fn compute_imported_routes(
        &mut self,
        ctx: &mut SolverContext,
        anns: &mut AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
        neighbor_exports: &BTreeMap<RouterId, BTreeMap<PropId, AnnId>>,
    ) -> Result<(), SynthesisError> {
        // the attributes that are read from the neighbor
        let attrs = [
            AnnAttr::Prefix,
            AnnAttr::NextHop,
            AnnAttr::Origin,
            AnnAttr::LocalPref,
            AnnAttr::Med,
            AnnAttr::Permitted,
        ];
        let node_name = self.node.fmt(graph);

        for neighbor in graph.get_bgp_neighbors(self.node) {
            let Some(exported) = neighbor_exports.get(&neighbor) else {
                // the neighbor doesn't export anything to this router
                debug!(
                    "{node_name} imports nothing from {}",
                    neighbor.fmt(graph)
                );
                continue;
            };
            let neighbor_name = neighbor.fmt(graph);
            let is_ebgp_neighbor =
                graph.get_bgp_asnum(self.node) != graph.get_bgp_asnum(neighbor);
            let next_hop = prop.next_hop_map[&(self.node, neighbor)].clone();
            let next_hop_val = ctx.enum_value(self.sorts.next_hop, &next_hop)?;

            let mut imported: BTreeMap<PropId, AnnId> = BTreeMap::new();
            for (id, exported_ann) in exported {
                debug_assert!(self.anns_map.contains_key(id));
                let mut ann = anns.get(*exported_ann).clone();
                ann.prev_announcement = Some(*exported_ann);
                if is_ebgp_neighbor {
                    // an eBGP hop resets the local-pref and rewrites the next-hop
                    ann.local_pref = ctx.create_var(
                        Sort::Int,
                        Some(Value::from(DEFAULT_LOCAL_PREF)),
                        &format!("Imp_{node_name}_from_{neighbor_name}_local_pref_"),
                    );
                    ann.next_hop = ctx.create_var(
                        Sort::Enum(self.sorts.next_hop),
                        Some(next_hop_val.into()),
                        &format!("Imp_{node_name}_from_{neighbor_name}_next_hop_"),
                    );
                } else {
                    // an iBGP hop preserves an already-rewritten next-hop
                    let prev_next_hop = ann.next_hop;
                    let var = ctx.fresh_var(
                        Sort::Enum(self.sorts.next_hop),
                        &format!("Imp_{node_name}_from_{neighbor_name}_next_hop_"),
                    );
                    ann.next_hop = var;
                    ctx.register_constraint(
                        Term::ite(
                            Term::eq(prev_next_hop, ctx.origin_next_hop()?),
                            Term::eq(var, next_hop_val),
                            Term::eq(var, prev_next_hop),
                        ),
                        &format!("Imp_{node_name}_from_{neighbor_name}_next_hop_rewrite_"),
                    );
                }
                imported.insert(*id, anns.alloc(ann));
            }

            // apply the import route map, if any
            if let Some(rmap_name) = graph.get_bgp_import_route_map(self.node, neighbor) {
                let rmap = graph
                    .get_route_maps(self.node)
                    .get(rmap_name)
                    .ok_or_else(|| {
                        SynthesisError::UnknownRouteMap(rmap_name.to_string(), node_name.clone())
                    })?;
                let props = imported.keys().copied().collect_vec();
                let inputs = props.iter().map(|p| imported[p]).collect_vec();
                let mut smt_map = SmtRouteMap::build(ctx, rmap)?;
                smt_map.execute(ctx, anns, inputs)?;
                for (index, p) in props.iter().enumerate() {
                    let out = smt_map.outputs[index];
                    debug_assert!(anns.derives_from(out, smt_map.inputs[index]));
                    imported.insert(*p, out);
                }
                self.rmaps.insert(rmap_name.to_string(), smt_map);
            }

            // equate the imported announcement with the router's own copy
            for (id, imported_ann) in imported {
                let sham = self.anns_map[&id];
                anns.get_mut(sham).prev_announcement = Some(imported_ann);
                for attr in attrs {
                    let cur = anns.get(sham).var(attr);
                    let imp = anns.get(imported_ann).var(attr);
                    ctx.register_constraint(
                        Term::eq(cur, imp),
                        &format!("Imp_{node_name}_from_{neighbor_name}_{}_", attr.name()),
                    );
                }
                for c in ctx.communities().collect_vec() {
                    let cur = anns.get(sham).communities[&c];
                    let imp = anns.get(imported_ann).communities[&c];
                    ctx.register_constraint(
                        Term::eq(cur, imp),
                        &format!(
                            "Imp_{node_name}_from_{neighbor_name}_Comm_{}_",
                            c.var_name()
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    /// Emit the selection constraints: for every pair of consecutive preference layers, every
    /// record of the better layer must beat every record of the worse layer in the BGP decision
    /// process.
    pub fn encode_selection(
        &mut self,
        ctx: &mut SolverContext,
        anns: &AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
        use_igp: bool,
    ) -> Result<(), SynthesisError> {
        info!("synthesizing BGP selection for router {}", self.node.fmt(graph));
        let order: Vec<(Prefix, Vec<BTreeSet<PropId>>)> = prop
            .graph
            .nets(self.node)
            .map(|(net, attrs)| (net.clone(), attrs.order_info.clone()))
            .collect();
        for (_, layers) in order {
            if layers.len() == 1 {
                // this router only learns one route, no need for the preference function
                continue;
            }
            for (best_set, other_set) in layers.iter().tuple_windows() {
                for best in best_set {
                    for other in other_set {
                        self.selector_func(ctx, anns, graph, prop, *best, *other, use_igp)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Encode the decision ladder for one `(best, other)` pair: emit a single constraint whose
    /// disjuncts are the rungs of the BGP decision process, each one adding the previous rungs
    /// as equalities. Pairs learned from the same peer are skipped.
    #[allow(clippy::too_many_arguments)]
    fn selector_func(
        &mut self,
        ctx: &mut SolverContext,
        anns: &AnnouncementArena,
        graph: &NetworkGraph,
        prop: &Propagation,
        best: PropId,
        other: PropId,
        use_igp: bool,
    ) -> Result<(), SynthesisError> {
        let best_info = prop.graph.info(best);
        let other_info = prop.graph.info(other);
        if best_info.peer == other_info.peer {
            // the decision process cannot distinguish routes from the same peer
            return Ok(());
        }
        debug!(
            "select at {}: {} over {}",
            self.node.fmt(graph),
            best_info.fmt(graph),
            other_info.fmt(graph)
        );

        let best_ann = anns.get(self.anns_map[&best]).clone();
        let other_ann = anns.get(self.anns_map[&other]).clone();

        let best_neighbor = best_info
            .path
            .len()
            .checked_sub(2)
            .map(|i| best_info.path[i])
            .unwrap_or(self.node);
        let other_neighbor = other_info
            .path
            .len()
            .checked_sub(2)
            .map(|i| other_info.path[i])
            .unwrap_or(self.node);

        let best_as = graph.get_bgp_asnum(best_info.peer.unwrap_or(self.node));
        let other_as = graph.get_bgp_asnum(other_info.peer.unwrap_or(self.node));
        let node_as = graph.get_bgp_asnum(self.node);

        let igp = ctx.enum_value(self.sorts.origin, Origin::Igp.name())?;
        let ebgp = ctx.enum_value(self.sorts.origin, Origin::Ebgp.name())?;
        let incomplete = ctx.enum_value(self.sorts.origin, Origin::Incomplete.name())?;

        let other_permitted = Term::Var(other_ann.permitted);
        let lp_eq = Term::eq(best_ann.local_pref, other_ann.local_pref);
        let len_eq = Term::eq(best_ann.as_path_len, other_ann.as_path_len);

        // selection based on origin: IGP beats everything, EGP beats incomplete
        let select_origin = Term::or([
            Term::and([
                Term::eq(best_ann.origin, igp),
                Term::not(Term::eq(other_ann.origin, igp)),
            ]),
            Term::and([
                Term::eq(best_ann.origin, ebgp),
                Term::eq(other_ann.origin, incomplete),
            ]),
        ]);

        // prefer eBGP routes over iBGP routes
        let select_ebgp = Term::Lit(Value::Bool(node_as != best_as && node_as == other_as));

        // MED comparison only applies between routes from the same neighboring AS
        let (select_med, not_select_med) = if best_as == other_as {
            (
                Term::lt(best_ann.med, other_ann.med),
                Term::eq(best_ann.med, other_ann.med),
            )
        } else {
            (Term::ff(), Term::tt())
        };

        // IGP costs towards the two next-hops
        let igp_path_equal = ctx.fresh_var(
            Sort::Bool,
            &format!(
                "igp_{}_is_equal_{}_",
                best_info.path.fmt(graph),
                other_info.path.fmt(graph)
            ),
        );
        let (best_igp_cost, other_igp_cost) = if use_igp {
            let (best_cost, best_sub) = self.get_path_cost(ctx, graph, &best_info.path);
            let (other_cost, other_sub) = self.get_path_cost(ctx, graph, &other_info.path);
            if let (Some(best_sub), Some(other_sub)) = (best_sub, other_sub) {
                self.generated_ospf_reqs
                    .push((igp_path_equal, best_sub, other_sub));
            }
            (best_cost, other_cost)
        } else {
            // force the opposite selection, so rungs 7 and 8 can never fire
            (Term::from(15i64), Term::from(10i64))
        };

        // selection based on router IDs
        let select_router_id = match (
            graph.get_bgp_router_id(best_neighbor),
            graph.get_bgp_router_id(other_neighbor),
        ) {
            (RouterIdSlot::Symbolic(b), RouterIdSlot::Symbolic(o)) => Term::lt(b, o),
            (b, o) => {
                if matches!(b, RouterIdSlot::Unset) {
                    warn!("router ID is not set for {}", best_neighbor.fmt(graph));
                }
                if matches!(o, RouterIdSlot::Unset) {
                    warn!("router ID is not set for {}", other_neighbor.fmt(graph));
                }
                // router IDs are not known, assume they are not in our favor
                Term::Var(ctx.create_var(
                    Sort::Bool,
                    Some(Value::Bool(false)),
                    &format!("SelectRouterID_{}_", self.node.fmt(graph)),
                ))
            }
        };

        // the BGP selection process
        let mut rungs = vec![
            // 1) permitted
            Term::eq(other_permitted.clone(), Term::ff()),
            // 2) if permitted, local pref
            Term::and([
                other_permitted.clone(),
                Term::gt(best_ann.local_pref, other_ann.local_pref),
            ]),
            // 3) AS path length
            Term::and([
                other_permitted.clone(),
                lp_eq.clone(),
                Term::lt(best_ann.as_path_len, other_ann.as_path_len),
            ]),
            // 4) origin code: IGP < EGP < incomplete
            Term::and([
                other_permitted.clone(),
                lp_eq.clone(),
                len_eq.clone(),
                select_origin.clone(),
            ]),
            // 5) MED
            Term::and([
                other_permitted.clone(),
                lp_eq.clone(),
                len_eq.clone(),
                Term::not(select_origin.clone()),
                select_med.clone(),
            ]),
            // 6) prefer eBGP over iBGP paths
            Term::and([
                other_permitted.clone(),
                lp_eq.clone(),
                len_eq.clone(),
                Term::not(select_origin.clone()),
                Term::not(select_med.clone()),
                not_select_med.clone(),
                select_ebgp.clone(),
            ]),
        ];
        if use_igp {
            // 7) path with the lowest IGP metric towards the BGP next hop
            rungs.push(Term::and([
                other_permitted.clone(),
                lp_eq.clone(),
                len_eq.clone(),
                Term::not(select_origin.clone()),
                Term::not(select_med.clone()),
                not_select_med.clone(),
                Term::not(select_ebgp.clone()),
                Term::not(Term::Var(igp_path_equal)),
                Term::lt(best_igp_cost.clone(), other_igp_cost.clone()),
            ]));
            // 8) smallest router ID of the advertising neighbor
            rungs.push(Term::and([
                other_permitted,
                lp_eq,
                len_eq,
                Term::not(select_origin),
                Term::not(select_med),
                not_select_med,
                Term::not(select_ebgp),
                Term::eq(best_igp_cost, other_igp_cost),
                Term::Var(igp_path_equal),
                select_router_id,
            ]));
        }

        let name = ctx.register_constraint(
            Term::or(rungs),
            &format!(
                "SELECT_at_{}_prefix_{}_path_{}_",
                self.node.fmt(graph),
                best_info.ann_name,
                best_info.path.fmt(graph)
            ),
        );
        self.selection_constraints.insert(name, (best, other));
        Ok(())
    }

    /// The symbolic IGP cost of a propagation path: the sum of the per-edge OSPF costs of the
    /// path suffix that lies within this router's AS, walked backwards from this router. Edges
    /// whose cost the sketch leaves open become fresh positive integer variables. Returns the
    /// summed cost and the traversed sub-path, or `(0, None)` if no edge lies within the AS.
    fn get_path_cost(
        &mut self,
        ctx: &mut SolverContext,
        graph: &NetworkGraph,
        path: &[RouterId],
    ) -> (Term, Option<Vec<RouterId>>) {
        let current_as = graph.get_bgp_asnum(self.node);
        let inverse = path.iter().rev().copied().collect_vec();
        let mut sub_path = vec![inverse[0]];
        let mut costs = Vec::new();
        for (src, dst) in inverse.iter().copied().tuple_windows() {
            let dst_as = graph.get_bgp_asnum(dst).or(current_as);
            if dst_as != current_as {
                break;
            }
            let cost = match graph.get_edge_ospf_cost(src, dst) {
                Some(Sketch::Concrete(c)) => Term::from(c as i64),
                _ => {
                    let n = format!("_{}_{}_", src.fmt(graph), dst.fmt(graph));
                    let var = ctx.fresh_var(Sort::Int, &format!("IGP_edge_cost{n}"));
                    ctx.register_constraint(
                        Term::gt(var, 0i64),
                        &format!("positive_igp_cost{n}"),
                    );
                    Term::Var(var)
                }
            };
            sub_path.push(dst);
            costs.push(cost);
        }
        if costs.is_empty() {
            (Term::from(0i64), None)
        } else {
            (Term::sum(costs), Some(sub_path))
        }
    }

    /// Walk the lifted route-maps and write their concretized counterparts (and any synthesized
    /// prefix-lists and community-lists) back into the network graph; resolve the router ID.
    pub fn update_network_graph(
        &self,
        ctx: &SolverContext,
        model: &SmtModel,
        graph: &mut NetworkGraph,
    ) -> Result<(), SmtError> {
        for smt_map in self.rmaps.values() {
            let rmap = smt_map.get_config(ctx, model)?;
            for line in &rmap.lines {
                for m in &line.matches {
                    match m {
                        crate::route_map::RouteMapMatch::IpPrefixList(list) => {
                            graph.add_ip_prefix_list(self.node, list.clone());
                        }
                        crate::route_map::RouteMapMatch::CommunityList(list) => {
                            graph.add_bgp_community_list(self.node, list.clone());
                        }
                        crate::route_map::RouteMapMatch::NextHop(_) => {}
                    }
                }
            }
            graph.add_route_map(self.node, rmap);
        }
        if let RouterIdSlot::Symbolic(var) = graph.get_bgp_router_id(self.node) {
            let id = model.get_int(ctx, var)? as u32;
            graph.set_bgp_router_id(self.node, RouterIdSlot::Concrete(id));
        }
        Ok(())
    }
}
