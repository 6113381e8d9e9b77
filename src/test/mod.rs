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

//! Test utilities: a checking solver stub that validates candidate models against the constraint
//! set, and a model completion that propagates known values along equality chains.

mod bgp_peers;
mod builder;
mod propagation;
mod tie_break;

use crate::smt::{SmtError, SmtModel, SmtVar, Solver, SolverContext, Sort, Term, Value};

/// A solver stub for tests: it completes the candidate model by propagating values through the
/// constraint set, fills the remaining free variables with defaults, and accepts iff every
/// registered constraint evaluates to `true`.
#[derive(Debug)]
pub struct CheckingSolver {
    /// The candidate assignment (usually the hand-picked hole values of the test).
    pub candidate: SmtModel,
}

impl CheckingSolver {
    /// Create a solver stub from a candidate assignment.
    pub fn new(candidate: SmtModel) -> Self {
        Self { candidate }
    }
}

impl Solver for CheckingSolver {
    fn solve(&mut self, ctx: &SolverContext) -> Result<SmtModel, SmtError> {
        let mut model = self.candidate.clone();
        complete_model(ctx, &mut model);
        let failed = ctx.failed_constraints(&model)?;
        if failed.is_empty() {
            Ok(model)
        } else {
            Err(SmtError::Unsatisfiable(failed))
        }
    }
}

/// Complete a partial model: saturate it by propagating known values through the constraints,
/// then assign the remaining variables one by one (booleans to `false`, integers to `1`, enums
/// to their first member), saturating after each assignment so equality chains stay consistent.
pub fn complete_model(ctx: &SolverContext, model: &mut SmtModel) {
    saturate(ctx, model);
    loop {
        let next = ctx.vars().find(|v| {
            model.get(*v).is_none()
                && ctx.var_value(*v).is_none()
                && constraint_mentions(ctx, *v)
        });
        let Some(var) = next else { break };
        let default = match ctx.var_sort(var) {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(1),
            Sort::Enum(sort) => Value::Enum(
                ctx.enum_members(sort)
                    .next()
                    .expect("enum sorts are never empty"),
            ),
        };
        model.set(var, default);
        saturate(ctx, model);
    }
}

/// Returns `true` if any registered constraint mentions the variable.
fn constraint_mentions(ctx: &SolverContext, var: SmtVar) -> bool {
    fn mentions(term: &Term, var: SmtVar) -> bool {
        match term {
            Term::Var(v) => *v == var,
            Term::Lit(_) => false,
            Term::Not(t) => mentions(t, var),
            Term::And(ts) | Term::Or(ts) | Term::Add(ts) | Term::Distinct(ts) => {
                ts.iter().any(|t| mentions(t, var))
            }
            Term::Eq(a, b) | Term::Lt(a, b) | Term::Gt(a, b) => {
                mentions(a, var) || mentions(b, var)
            }
            Term::Ite(c, t, e) => mentions(c, var) || mentions(t, var) || mentions(e, var),
        }
    }
    ctx.constraints().any(|c| mentions(&c.term, var))
}

/// Propagate known values through the constraint set until a fixpoint: an equality whose one
/// side evaluates assigns the other side if it is a bare variable, descending through
/// conjunctions and through if-then-else branches whose condition already evaluates.
pub fn saturate(ctx: &SolverContext, model: &mut SmtModel) {
    let terms: Vec<Term> = ctx.constraints().map(|c| c.term.clone()).collect();
    loop {
        let mut changed = false;
        for term in &terms {
            changed |= propagate(ctx, term, model);
        }
        if !changed {
            break;
        }
    }
}

/// Propagate values through a term that is asserted to be `true`. Returns `true` if the model
/// changed.
fn propagate(ctx: &SolverContext, term: &Term, model: &mut SmtModel) -> bool {
    match term {
        Term::And(ts) => {
            let mut changed = false;
            for t in ts {
                changed |= propagate(ctx, t, model);
            }
            changed
        }
        Term::Ite(c, t, e) => match ctx.eval_bool(c, model) {
            Ok(true) => propagate(ctx, t, model),
            Ok(false) => propagate(ctx, e, model),
            Err(_) => false,
        },
        Term::Eq(a, b) => {
            let assign = |var: &Term, other: &Term, model: &mut SmtModel| -> bool {
                if let Term::Var(v) = var {
                    if model.get(*v).is_none() && ctx.var_value(*v).is_none() {
                        if let Ok(value) = ctx.eval(other, model) {
                            model.set(*v, value);
                            return true;
                        }
                    }
                }
                false
            };
            assign(a, b, model) || assign(b, a, model)
        }
        Term::Var(v) => {
            // a bare variable asserted true
            if model.get(*v).is_none() && ctx.var_value(*v).is_none() {
                model.set(*v, Value::Bool(true));
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

/// Find the unique variable whose name starts with the given prefix. Panics if the prefix is
/// ambiguous or matches nothing.
pub fn find_var(ctx: &SolverContext, prefix: &str) -> SmtVar {
    let matches: Vec<SmtVar> = ctx
        .vars()
        .filter(|v| ctx.var_name(*v).starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [v] => *v,
        [] => panic!("no variable starts with {prefix}"),
        _ => panic!("multiple variables start with {prefix}"),
    }
}
