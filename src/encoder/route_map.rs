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

//! The route-map encoder: translates a (partially symbolic) [`RouteMap`] into constraints that
//! relate an input sequence of symbolic announcements to an output sequence of the same length.
//!
//! Lines are encoded in ascending line order with first-match semantics: every line produces a
//! new announcement chained to its input via `prev_announcement`. A line that does not fire
//! copies the announcement unchanged; a firing permit line applies its actions; a firing deny
//! line forces `permitted = false` and leaves the other attributes unconstrained. After the last
//! line an implicit deny applies. Holes (access modes, match lists, action values) become fresh
//! solver variables that are shared by all announcements passing the same line, so a model
//! concretizes every line to a single device-level configuration.

use crate::bgp::{AnnId, AnnouncementArena};
use crate::encoder::{fresh_announcement, AnnSorts};
use crate::route_map::{
    Access, CommunityList, IpPrefixList, RouteMap, RouteMapLine, RouteMapMatch, RouteMapSet,
};
use crate::smt::{EnumValue, SmtError, SmtModel, SmtVar, SolverContext, Sort, Term, Value};
use crate::types::{Community, Prefix, Sketch};

/// The access mode of an encoded line.
#[derive(Debug, Clone)]
enum SmtAccess {
    /// The sketch fixed the access mode.
    Concrete(Access),
    /// The access mode is a hole: the variable is `true` for permit, `false` for deny.
    Hole(SmtVar),
}

/// A (possibly synthesized) selection of list entries.
#[derive(Debug, Clone)]
enum SmtSelect<T> {
    /// The sketch fixed the list.
    Concrete(Vec<T>),
    /// The list is synthesized: entry `T` is in the list iff its selector variable is `true`.
    Selectors(Vec<(T, SmtVar)>),
}

/// A (possibly synthesized) single value.
#[derive(Debug, Clone)]
enum SmtChoice {
    /// The sketch fixed the value.
    Concrete(EnumValue),
    /// The value is synthesized; the variable ranges over the target enum sort.
    Hole(SmtVar),
}

/// An encoded match statement.
#[derive(Debug, Clone)]
enum SmtMatch {
    /// Match if the prefix is one of the selected entries.
    PrefixList {
        /// Name of the (possibly synthesized) prefix list.
        name: String,
        /// Entries of the list.
        entries: SmtSelect<EnumValue>,
    },
    /// Match if the route carries every selected community.
    CommunityList {
        /// Name of the (possibly synthesized) community list.
        name: String,
        /// Entries of the list.
        entries: SmtSelect<Community>,
    },
    /// Match on the next-hop identifier.
    NextHop(SmtChoice),
}

/// A (possibly synthesized) single community.
#[derive(Debug, Clone)]
enum SmtCommunityChoice {
    /// The sketch fixed the community.
    Concrete(Community),
    /// The community is synthesized: the index variable selects one entry of `universe`.
    Hole {
        /// Index variable, constrained to range over `universe`.
        index: SmtVar,
        /// The registered communities, in registry order.
        universe: Vec<Community>,
    },
}

/// An encoded set action.
#[derive(Debug, Clone)]
enum SmtAction {
    /// Overwrite the local preference (the term is the new value).
    LocalPref(Term),
    /// Overwrite the MED attribute.
    Med(Term),
    /// Overwrite the next hop.
    NextHop(SmtChoice),
    /// Attach a community.
    Community(SmtCommunityChoice),
}

/// An encoded route-map line.
#[derive(Debug, Clone)]
struct SmtLine {
    /// Position of the line.
    lineno: u16,
    /// Access mode.
    access: SmtAccess,
    /// Encoded match statements (conjunctive).
    matches: Vec<SmtMatch>,
    /// Encoded actions.
    actions: Vec<SmtAction>,
}

/// A route map lifted into the solver. Executing it on a sequence of announcements produces the
/// transformed sequence and registers the per-line semantics as named constraints.
#[derive(Debug)]
pub struct SmtRouteMap {
    /// Name of the route map.
    pub name: String,
    /// The encoded lines, in ascending line order.
    lines: Vec<SmtLine>,
    /// The resolved announcement sorts.
    sorts: AnnSorts,
    /// The announcements the map was executed on.
    pub inputs: Vec<AnnId>,
    /// The resulting announcements, index-aligned with `inputs`.
    pub outputs: Vec<AnnId>,
}

impl SmtRouteMap {
    /// Lift a route map into the solver: every hole becomes a fresh variable shared by all
    /// announcements that will pass this line.
    pub fn build(ctx: &mut SolverContext, map: &RouteMap) -> Result<Self, SmtError> {
        let sorts = AnnSorts::resolve(ctx)?;
        let prefix_sort = sorts.prefix;
        let next_hop_sort = sorts.next_hop;
        let communities: Vec<Community> = ctx.communities().collect();

        let mut lines = Vec::new();
        for line in &map.lines {
            let n = format!("{}_line{}", map.name, line.lineno);
            let access = match line.access {
                Sketch::Concrete(a) => SmtAccess::Concrete(a),
                Sketch::Hole => {
                    SmtAccess::Hole(ctx.fresh_var(Sort::Bool, &format!("{n}_access_")))
                }
            };

            let mut matches = Vec::new();
            for m in &line.matches {
                matches.push(match m {
                    RouteMapMatch::IpPrefixList(IpPrefixList { name, networks }) => {
                        let entries = match networks {
                            Sketch::Concrete(nets) => SmtSelect::Concrete(
                                nets.iter()
                                    .map(|p| ctx.enum_value(prefix_sort, &p.0))
                                    .collect::<Result<_, _>>()?,
                            ),
                            Sketch::Hole => SmtSelect::Selectors(
                                ctx.enum_members(prefix_sort)
                                    .collect::<Vec<_>>()
                                    .into_iter()
                                    .map(|v| {
                                        let sel = ctx
                                            .fresh_var(Sort::Bool, &format!("{n}_match_prefix_"));
                                        (v, sel)
                                    })
                                    .collect(),
                            ),
                        };
                        SmtMatch::PrefixList {
                            name: name.clone(),
                            entries,
                        }
                    }
                    RouteMapMatch::CommunityList(CommunityList {
                        name,
                        communities: list,
                    }) => {
                        let entries = match list {
                            Sketch::Concrete(comms) => SmtSelect::Concrete(comms.clone()),
                            Sketch::Hole => SmtSelect::Selectors(
                                communities
                                    .iter()
                                    .map(|c| {
                                        let sel = ctx
                                            .fresh_var(Sort::Bool, &format!("{n}_match_comm_"));
                                        (*c, sel)
                                    })
                                    .collect(),
                            ),
                        };
                        SmtMatch::CommunityList {
                            name: name.clone(),
                            entries,
                        }
                    }
                    RouteMapMatch::NextHop(nh) => SmtMatch::NextHop(match nh {
                        Sketch::Concrete(name) => {
                            SmtChoice::Concrete(ctx.enum_value(next_hop_sort, name)?)
                        }
                        Sketch::Hole => SmtChoice::Hole(
                            ctx.fresh_var(Sort::Enum(next_hop_sort), &format!("{n}_match_nh_")),
                        ),
                    }),
                });
            }

            let mut actions = Vec::new();
            for a in &line.actions {
                actions.push(match a {
                    RouteMapSet::LocalPref(v) => SmtAction::LocalPref(match v {
                        Sketch::Concrete(v) => Term::from(*v),
                        Sketch::Hole => {
                            Term::Var(ctx.fresh_var(Sort::Int, &format!("{n}_set_local_pref_")))
                        }
                    }),
                    RouteMapSet::Med(v) => SmtAction::Med(match v {
                        Sketch::Concrete(v) => Term::from(*v),
                        Sketch::Hole => {
                            Term::Var(ctx.fresh_var(Sort::Int, &format!("{n}_set_med_")))
                        }
                    }),
                    RouteMapSet::NextHop(nh) => SmtAction::NextHop(match nh {
                        Sketch::Concrete(name) => {
                            SmtChoice::Concrete(ctx.enum_value(next_hop_sort, name)?)
                        }
                        Sketch::Hole => SmtChoice::Hole(
                            ctx.fresh_var(Sort::Enum(next_hop_sort), &format!("{n}_set_nh_")),
                        ),
                    }),
                    RouteMapSet::Community(c) => SmtAction::Community(match c {
                        Sketch::Concrete(c) => SmtCommunityChoice::Concrete(*c),
                        Sketch::Hole => {
                            // an index variable selects exactly one registered community
                            let index = ctx.fresh_var(Sort::Int, &format!("{n}_set_comm_idx_"));
                            ctx.register_constraint(
                                Term::and([
                                    Term::gt(index, -1i64),
                                    Term::lt(index, communities.len() as i64),
                                ]),
                                &format!("{n}_set_comm_idx_range_"),
                            );
                            SmtCommunityChoice::Hole {
                                index,
                                universe: communities.clone(),
                            }
                        }
                    }),
                });
            }

            lines.push(SmtLine {
                lineno: line.lineno,
                access,
                matches,
                actions,
            });
        }

        Ok(Self {
            name: map.name.clone(),
            lines,
            sorts,
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
    }

    /// Execute the route map on the given announcements: register the per-line constraints and
    /// produce the output announcements, index-aligned with the inputs.
    pub fn execute(
        &mut self,
        ctx: &mut SolverContext,
        anns: &mut AnnouncementArena,
        inputs: Vec<AnnId>,
    ) -> Result<(), SmtError> {
        let mut outputs = Vec::new();
        for input in &inputs {
            let mut matched = Term::ff();
            let mut cur = *input;
            for line in &self.lines {
                let n = format!("{}_line{}", self.name, line.lineno);
                let fires = Term::and(
                    line.matches
                        .iter()
                        .map(|m| match_term(anns, cur, m))
                        .collect::<Vec<_>>(),
                );
                let out = fresh_announcement(ctx, anns, &self.sorts, &format!("{n}_"), Some(cur));
                let pass = Term::and(equal_announcements(anns, cur, out));
                let trans = Term::and(transform_announcement(anns, cur, out, &line.actions));
                let deny = Term::eq(anns.get(out).permitted, false);
                let sem = match &line.access {
                    SmtAccess::Concrete(Access::Permit) => trans,
                    SmtAccess::Concrete(Access::Deny) => deny,
                    SmtAccess::Hole(v) => Term::ite(*v, trans, deny),
                };
                let fire_now = Term::and([Term::not(matched.clone()), fires.clone()]);
                ctx.register_constraint(Term::ite(fire_now, sem, pass), &format!("{n}_"));
                matched = Term::or([matched, fires]);
                cur = out;
            }
            // in Cisco, the last line is a drop by default
            let out = fresh_announcement(
                ctx,
                anns,
                &self.sorts,
                &format!("{}_final_", self.name),
                Some(cur),
            );
            let pass = Term::and(equal_announcements(anns, cur, out));
            let deny = Term::eq(anns.get(out).permitted, false);
            ctx.register_constraint(
                Term::ite(matched, pass, deny),
                &format!("{}_implicit_deny_", self.name),
            );
            outputs.push(out);
        }
        self.inputs = inputs;
        self.outputs = outputs;
        Ok(())
    }

    /// Read the model and rebuild the route map with every hole replaced by its concrete value.
    pub fn get_config(
        &self,
        ctx: &SolverContext,
        model: &SmtModel,
    ) -> Result<RouteMap, SmtError> {
        let mut lines = Vec::new();
        for line in &self.lines {
            let access = match &line.access {
                SmtAccess::Concrete(a) => *a,
                SmtAccess::Hole(v) => {
                    if model.get_bool(ctx, *v)? {
                        Access::Permit
                    } else {
                        Access::Deny
                    }
                }
            };

            let mut matches = Vec::new();
            for m in &line.matches {
                matches.push(match m {
                    SmtMatch::PrefixList { name, entries } => {
                        let networks = match entries {
                            SmtSelect::Concrete(vals) => vals
                                .iter()
                                .map(|v| Prefix::from(ctx.member_name(*v)))
                                .collect(),
                            SmtSelect::Selectors(sels) => {
                                let mut nets = Vec::new();
                                for (v, sel) in sels {
                                    if model.get_bool(ctx, *sel)? {
                                        nets.push(Prefix::from(ctx.member_name(*v)));
                                    }
                                }
                                nets
                            }
                        };
                        RouteMapMatch::IpPrefixList(IpPrefixList {
                            name: name.clone(),
                            networks: Sketch::Concrete(networks),
                        })
                    }
                    SmtMatch::CommunityList { name, entries } => {
                        let comms = match entries {
                            SmtSelect::Concrete(vals) => vals.clone(),
                            SmtSelect::Selectors(sels) => {
                                let mut comms = Vec::new();
                                for (c, sel) in sels {
                                    if model.get_bool(ctx, *sel)? {
                                        comms.push(*c);
                                    }
                                }
                                comms
                            }
                        };
                        RouteMapMatch::CommunityList(CommunityList {
                            name: name.clone(),
                            communities: Sketch::Concrete(comms),
                        })
                    }
                    SmtMatch::NextHop(choice) => {
                        let member = match choice {
                            SmtChoice::Concrete(v) => *v,
                            SmtChoice::Hole(var) => model.get_enum(ctx, *var)?,
                        };
                        RouteMapMatch::NextHop(Sketch::Concrete(
                            ctx.member_name(member).to_string(),
                        ))
                    }
                });
            }

            let mut actions = Vec::new();
            for a in &line.actions {
                actions.push(match a {
                    SmtAction::LocalPref(t) => RouteMapSet::LocalPref(Sketch::Concrete(
                        eval_u32(ctx, model, t)?,
                    )),
                    SmtAction::Med(t) => {
                        RouteMapSet::Med(Sketch::Concrete(eval_u32(ctx, model, t)?))
                    }
                    SmtAction::NextHop(choice) => {
                        let member = match choice {
                            SmtChoice::Concrete(v) => *v,
                            SmtChoice::Hole(var) => model.get_enum(ctx, *var)?,
                        };
                        RouteMapSet::NextHop(Sketch::Concrete(ctx.member_name(member).to_string()))
                    }
                    SmtAction::Community(choice) => RouteMapSet::Community(match choice {
                        SmtCommunityChoice::Concrete(c) => Sketch::Concrete(*c),
                        SmtCommunityChoice::Hole { index, universe } => {
                            let i = model.get_int(ctx, *index)? as usize;
                            Sketch::Concrete(universe[i])
                        }
                    }),
                });
            }

            lines.push(RouteMapLine {
                lineno: line.lineno,
                access: Sketch::Concrete(access),
                matches,
                actions,
            });
        }
        Ok(RouteMap {
            name: self.name.clone(),
            lines,
        })
    }
}

/// Evaluate an action-value term to a `u32`.
fn eval_u32(ctx: &SolverContext, model: &SmtModel, t: &Term) -> Result<u32, SmtError> {
    match ctx.eval(t, model)? {
        Value::Int(i) => Ok(i as u32),
        v => Err(SmtError::IllSorted(format!("expected Int, got {v:?}"))),
    }
}

/// The boolean term deciding whether a match statement holds on an announcement.
fn match_term(anns: &AnnouncementArena, ann: AnnId, m: &SmtMatch) -> Term {
    let ann = anns.get(ann);
    match m {
        SmtMatch::PrefixList { entries, .. } => match entries {
            SmtSelect::Concrete(vals) => Term::or(
                vals.iter()
                    .map(|v| Term::eq(ann.prefix, *v))
                    .collect::<Vec<_>>(),
            ),
            SmtSelect::Selectors(sels) => Term::or(
                sels.iter()
                    .map(|(v, sel)| Term::and([Term::Var(*sel), Term::eq(ann.prefix, *v)]))
                    .collect::<Vec<_>>(),
            ),
        },
        SmtMatch::CommunityList { entries, .. } => match entries {
            SmtSelect::Concrete(vals) => Term::and(
                vals.iter()
                    .filter_map(|c| ann.communities.get(c).map(|v| Term::Var(*v)))
                    .collect::<Vec<_>>(),
            ),
            SmtSelect::Selectors(sels) => Term::and(
                sels.iter()
                    .filter_map(|(c, sel)| {
                        ann.communities
                            .get(c)
                            .map(|v| Term::or([Term::not(*sel), Term::Var(*v)]))
                    })
                    .collect::<Vec<_>>(),
            ),
        },
        SmtMatch::NextHop(choice) => match choice {
            SmtChoice::Concrete(v) => Term::eq(ann.next_hop, *v),
            SmtChoice::Hole(var) => Term::eq(ann.next_hop, *var),
        },
    }
}

/// Equate every attribute (and every community) of two announcements.
fn equal_announcements(anns: &AnnouncementArena, a: AnnId, b: AnnId) -> Vec<Term> {
    let (a, b) = (anns.get(a), anns.get(b));
    let mut eqs = vec![
        Term::eq(a.prefix, b.prefix),
        Term::eq(a.peer, b.peer),
        Term::eq(a.origin, b.origin),
        Term::eq(a.as_path, b.as_path),
        Term::eq(a.as_path_len, b.as_path_len),
        Term::eq(a.next_hop, b.next_hop),
        Term::eq(a.local_pref, b.local_pref),
        Term::eq(a.med, b.med),
        Term::eq(a.permitted, b.permitted),
    ];
    for (c, v) in &a.communities {
        if let Some(w) = b.communities.get(c) {
            eqs.push(Term::eq(*v, *w));
        }
    }
    eqs
}

/// Equate the output announcement with the input transformed by the given actions: overwritten
/// attributes take the action value, everything else is copied.
fn transform_announcement(
    anns: &AnnouncementArena,
    input: AnnId,
    output: AnnId,
    actions: &[SmtAction],
) -> Vec<Term> {
    let (a, b) = (anns.get(input), anns.get(output));

    let mut local_pref: Term = Term::Var(a.local_pref);
    let mut med: Term = Term::Var(a.med);
    let mut next_hop: Term = Term::Var(a.next_hop);
    let mut comms: std::collections::BTreeMap<Community, Term> = a
        .communities
        .iter()
        .map(|(c, v)| (*c, Term::Var(*v)))
        .collect();

    for action in actions {
        match action {
            SmtAction::LocalPref(t) => local_pref = t.clone(),
            SmtAction::Med(t) => med = t.clone(),
            SmtAction::NextHop(choice) => {
                next_hop = match choice {
                    SmtChoice::Concrete(v) => Term::from(*v),
                    SmtChoice::Hole(var) => Term::Var(*var),
                }
            }
            SmtAction::Community(SmtCommunityChoice::Concrete(c)) => {
                comms.insert(*c, Term::tt());
            }
            SmtAction::Community(SmtCommunityChoice::Hole { index, universe }) => {
                for (i, c) in universe.iter().enumerate() {
                    let prev = comms.get(c).cloned().unwrap_or_else(Term::ff);
                    comms.insert(*c, Term::or([prev, Term::eq(*index, i as i64)]));
                }
            }
        }
    }

    let mut eqs = vec![
        Term::eq(a.prefix, b.prefix),
        Term::eq(a.peer, b.peer),
        Term::eq(a.origin, b.origin),
        Term::eq(a.as_path, b.as_path),
        Term::eq(a.as_path_len, b.as_path_len),
        Term::eq(Term::Var(b.next_hop), next_hop),
        Term::eq(Term::Var(b.local_pref), local_pref),
        Term::eq(Term::Var(b.med), med),
        Term::eq(a.permitted, b.permitted),
    ];
    for (c, v) in &b.communities {
        if let Some(t) = comms.remove(c) {
            eqs.push(Term::eq(Term::Var(*v), t));
        }
    }
    eqs
}
