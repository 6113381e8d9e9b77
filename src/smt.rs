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

//! The symbolic layer of the synthesizer. The [`SolverContext`] is an arena for variables, enum
//! sorts and named constraints. It is deliberately independent of any concrete SMT backend: the
//! backend is abstracted behind the [`Solver`] trait and only needs to support integers, booleans,
//! uninterpreted enum sorts, `Distinct`, `If`, conjunction and named assertions.
//!
//! All fresh-variable allocation and constraint registration flows through one context, so the
//! same input sketch always produces the same variable and constraint names (which keeps solver
//! runs reproducible and unsat cores diffable).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::types::Community;

/// Name of the enum sort holding all destination prefixes.
pub const PREFIX_SORT: &str = "PrefixSort";
/// Name of the enum sort holding all BGP peers (one member per router).
pub const PEER_SORT: &str = "PeerSort";
/// Name of the enum sort holding all next-hop identifiers.
pub const NEXT_HOP_SORT: &str = "NextHopSort";
/// Name of the enum sort holding all canonical AS-path keys.
pub const ASPATH_SORT: &str = "ASPathSort";
/// Name of the enum sort holding the BGP origin attribute values.
pub const BGP_ORIGIN_SORT: &str = "BGPOriginSort";
/// Member of [`NEXT_HOP_SORT`] marking an announcement that was learned at its origin and whose
/// next-hop has not been rewritten yet.
pub const ORIGIN_NEXT_HOP: &str = "ORIGIN_NEXT_HOP";

/// Errors produced by the symbolic layer and by solver backends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmtError {
    /// An enum sort was created twice.
    #[error("Enum sort {0} already exists")]
    DuplicateSort(String),
    /// An enum sort was referenced by a name that was never created.
    #[error("Unknown enum sort: {0}")]
    UnknownSort(String),
    /// An enum member was referenced that is not part of the sort.
    #[error("Sort {0} has no member {1}")]
    UnknownMember(String, String),
    /// A term combines values of incompatible sorts.
    #[error("Ill-sorted term: {0}")]
    IllSorted(String),
    /// A term was evaluated under a model that does not assign one of its variables.
    #[error("Model does not assign variable {0}")]
    UnassignedVariable(String),
    /// The backend reported that the constraints are unsatisfiable. Contains the names of the
    /// constraints that participated in the conflict (all registered names if the backend does not
    /// support unsat cores).
    #[error("Unsatisfiable constraints; core: [{}]", .0.iter().join(", "))]
    Unsatisfiable(Vec<String>),
}

/// Identifier of an enum sort inside a [`SolverContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumSortId(usize);

/// A member of an enum sort (a constant enum value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumValue {
    /// The sort this value belongs to.
    pub sort: EnumSortId,
    /// Index of the member within the sort.
    pub index: usize,
}

/// Sort of a symbolic variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Unbounded integer sort.
    Int,
    /// Boolean sort.
    Bool,
    /// An uninterpreted enum sort created on the context.
    Enum(EnumSortId),
}

/// A concrete value of some [`Sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// An integer value.
    Int(i64),
    /// A boolean value.
    Bool(bool),
    /// A member of an enum sort.
    Enum(EnumValue),
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Self::Bool(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Self::Int(x)
    }
}

impl From<u32> for Value {
    fn from(x: u32) -> Self {
        Self::Int(x as i64)
    }
}

impl From<EnumValue> for Value {
    fn from(x: EnumValue) -> Self {
        Self::Enum(x)
    }
}

/// A symbolic variable, indexing into the owning [`SolverContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SmtVar(usize);

/// Data stored per variable.
#[derive(Debug, Clone)]
struct VarData {
    /// Unique name of the variable.
    name: String,
    /// Sort of the variable.
    sort: Sort,
    /// Value the variable is fixed to (`None` for free variables).
    value: Option<Value>,
}

/// A first-order term over the variables of a context. Terms are plain data; only [`Solver`]
/// implementations and [`SolverContext::eval`] interpret them.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A symbolic variable.
    Var(SmtVar),
    /// A constant value.
    Lit(Value),
    /// Boolean negation.
    Not(Box<Term>),
    /// Conjunction of all operands.
    And(Vec<Term>),
    /// Disjunction of all operands.
    Or(Vec<Term>),
    /// Equality of two terms of the same sort.
    Eq(Box<Term>, Box<Term>),
    /// Strictly-less-than over integers.
    Lt(Box<Term>, Box<Term>),
    /// Strictly-greater-than over integers.
    Gt(Box<Term>, Box<Term>),
    /// Sum of all integer operands (the empty sum is `0`).
    Add(Vec<Term>),
    /// If-then-else: the first operand selects between the other two.
    Ite(Box<Term>, Box<Term>, Box<Term>),
    /// All operands evaluate to pairwise distinct values.
    Distinct(Vec<Term>),
}

impl From<SmtVar> for Term {
    fn from(v: SmtVar) -> Self {
        Term::Var(v)
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Lit(v)
    }
}

impl From<bool> for Term {
    fn from(v: bool) -> Self {
        Term::Lit(Value::Bool(v))
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::Lit(Value::Int(v))
    }
}

impl From<u32> for Term {
    fn from(v: u32) -> Self {
        Term::Lit(Value::Int(v as i64))
    }
}

impl From<EnumValue> for Term {
    fn from(v: EnumValue) -> Self {
        Term::Lit(Value::Enum(v))
    }
}

impl Term {
    /// Shorthand for the constant `true`.
    pub fn tt() -> Self {
        Term::Lit(Value::Bool(true))
    }

    /// Shorthand for the constant `false`.
    pub fn ff() -> Self {
        Term::Lit(Value::Bool(false))
    }

    /// Build a negation.
    pub fn not(t: impl Into<Term>) -> Self {
        Term::Not(Box::new(t.into()))
    }

    /// Build a conjunction.
    pub fn and(ts: impl IntoIterator<Item = Term>) -> Self {
        Term::And(ts.into_iter().collect())
    }

    /// Build a disjunction.
    pub fn or(ts: impl IntoIterator<Item = Term>) -> Self {
        Term::Or(ts.into_iter().collect())
    }

    /// Build an equality.
    pub fn eq(a: impl Into<Term>, b: impl Into<Term>) -> Self {
        Term::Eq(Box::new(a.into()), Box::new(b.into()))
    }

    /// Build a strict less-than comparison.
    pub fn lt(a: impl Into<Term>, b: impl Into<Term>) -> Self {
        Term::Lt(Box::new(a.into()), Box::new(b.into()))
    }

    /// Build a strict greater-than comparison.
    pub fn gt(a: impl Into<Term>, b: impl Into<Term>) -> Self {
        Term::Gt(Box::new(a.into()), Box::new(b.into()))
    }

    /// Build a sum.
    pub fn sum(ts: impl IntoIterator<Item = Term>) -> Self {
        Term::Add(ts.into_iter().collect())
    }

    /// Build an if-then-else term.
    pub fn ite(c: impl Into<Term>, t: impl Into<Term>, e: impl Into<Term>) -> Self {
        Term::Ite(Box::new(c.into()), Box::new(t.into()), Box::new(e.into()))
    }

    /// Build a pairwise-distinct constraint.
    pub fn distinct(ts: impl IntoIterator<Item = Term>) -> Self {
        Term::Distinct(ts.into_iter().collect())
    }
}

/// A named constraint registered on the context.
#[derive(Debug, Clone)]
pub struct NamedConstraint {
    /// Unique name of the constraint (prefix plus counter).
    pub name: String,
    /// The asserted term; must evaluate to `true` in every model.
    pub term: Term,
}

/// Arena for symbolic variables, enum sorts, the community registry, and named constraints. One
/// context lives for exactly one synthesis run; everything allocated on it is dropped together.
#[derive(Debug, Default)]
pub struct SolverContext {
    /// All enum sorts, in creation order.
    enums: Vec<(String, Vec<String>)>,
    /// Lookup from sort name to its id.
    enum_lookup: HashMap<String, EnumSortId>,
    /// All variables, in creation order.
    vars: Vec<VarData>,
    /// Per-prefix counters making variable and constraint names unique.
    name_counters: BTreeMap<String, usize>,
    /// All registered constraints, in registration order.
    constraints: Vec<NamedConstraint>,
    /// All communities known to this synthesis run.
    communities: BTreeSet<Community>,
}

impl SolverContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new enum sort with the given members. The member order is the order in which the
    /// members were passed.
    pub fn create_enum_sort(
        &mut self,
        name: &str,
        members: impl IntoIterator<Item = String>,
    ) -> Result<EnumSortId, SmtError> {
        if self.enum_lookup.contains_key(name) {
            return Err(SmtError::DuplicateSort(name.to_string()));
        }
        let id = EnumSortId(self.enums.len());
        self.enums
            .push((name.to_string(), members.into_iter().collect()));
        self.enum_lookup.insert(name.to_string(), id);
        Ok(id)
    }

    /// Look up an enum sort by name.
    pub fn enum_sort(&self, name: &str) -> Result<EnumSortId, SmtError> {
        self.enum_lookup
            .get(name)
            .copied()
            .ok_or_else(|| SmtError::UnknownSort(name.to_string()))
    }

    /// Look up a member of an enum sort by name.
    pub fn enum_value(&self, sort: EnumSortId, member: &str) -> Result<EnumValue, SmtError> {
        let (name, members) = &self.enums[sort.0];
        members
            .iter()
            .position(|m| m == member)
            .map(|index| EnumValue { sort, index })
            .ok_or_else(|| SmtError::UnknownMember(name.clone(), member.to_string()))
    }

    /// All members of an enum sort, in declaration order.
    pub fn enum_members(&self, sort: EnumSortId) -> impl Iterator<Item = EnumValue> + '_ {
        (0..self.enums[sort.0].1.len()).map(move |index| EnumValue { sort, index })
    }

    /// Name of an enum member.
    pub fn member_name(&self, value: EnumValue) -> &str {
        &self.enums[value.sort.0].1[value.index]
    }

    /// The distinguished next-hop value marking not-yet-rewritten announcements.
    pub fn origin_next_hop(&self) -> Result<EnumValue, SmtError> {
        self.enum_value(self.enum_sort(NEXT_HOP_SORT)?, ORIGIN_NEXT_HOP)
    }

    /// Create a new variable. If `value` is given, the variable is *concrete*: models must agree
    /// with it. The final variable name is the prefix with a per-prefix counter appended.
    pub fn create_var(&mut self, sort: Sort, value: Option<Value>, name_prefix: &str) -> SmtVar {
        let name = self.unique_name(name_prefix);
        let var = SmtVar(self.vars.len());
        self.vars.push(VarData { name, sort, value });
        var
    }

    /// Create a fresh, unconstrained variable.
    pub fn fresh_var(&mut self, sort: Sort, name_prefix: &str) -> SmtVar {
        self.create_var(sort, None, name_prefix)
    }

    /// The unique name of a variable.
    pub fn var_name(&self, var: SmtVar) -> &str {
        &self.vars[var.0].name
    }

    /// The sort of a variable.
    pub fn var_sort(&self, var: SmtVar) -> Sort {
        self.vars[var.0].sort
    }

    /// The value a variable is fixed to, if it is concrete.
    pub fn var_value(&self, var: SmtVar) -> Option<Value> {
        self.vars[var.0].value
    }

    /// Returns `true` if the variable is fixed to a concrete value.
    pub fn is_concrete(&self, var: SmtVar) -> bool {
        self.vars[var.0].value.is_some()
    }

    /// Iterate over all variables in creation order.
    pub fn vars(&self) -> impl Iterator<Item = SmtVar> + '_ {
        (0..self.vars.len()).map(SmtVar)
    }

    /// Register a community in the community registry.
    pub fn add_community(&mut self, community: Community) {
        self.communities.insert(community);
    }

    /// All communities known to this synthesis run, in ascending order.
    pub fn communities(&self) -> impl Iterator<Item = Community> + '_ {
        self.communities.iter().copied()
    }

    /// Register a named constraint and return its unique name.
    pub fn register_constraint(&mut self, term: Term, name_prefix: &str) -> String {
        let name = self.unique_name(name_prefix);
        self.constraints.push(NamedConstraint {
            name: name.clone(),
            term,
        });
        name
    }

    /// Iterate over all registered constraints in registration order.
    pub fn constraints(&self) -> impl Iterator<Item = &NamedConstraint> {
        self.constraints.iter()
    }

    /// Find a registered constraint by its unique name.
    pub fn constraint(&self, name: &str) -> Option<&NamedConstraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Make a name unique by appending a per-prefix counter.
    fn unique_name(&mut self, prefix: &str) -> String {
        let counter = self.name_counters.entry(prefix.to_string()).or_default();
        let name = format!("{prefix}{counter}");
        *counter += 1;
        name
    }

    /// Evaluate a term under a model. Concrete variables fall back to their fixed value if the
    /// model does not assign them.
    pub fn eval(&self, term: &Term, model: &SmtModel) -> Result<Value, SmtError> {
        match term {
            Term::Var(v) => model
                .get(*v)
                .or_else(|| self.var_value(*v))
                .ok_or_else(|| SmtError::UnassignedVariable(self.var_name(*v).to_string())),
            Term::Lit(v) => Ok(*v),
            Term::Not(t) => Ok(Value::Bool(!self.eval_bool(t, model)?)),
            Term::And(ts) => {
                for t in ts {
                    if !self.eval_bool(t, model)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Term::Or(ts) => {
                for t in ts {
                    if self.eval_bool(t, model)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Term::Eq(a, b) => {
                let (a, b) = (self.eval(a, model)?, self.eval(b, model)?);
                match (a, b) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a == b)),
                    (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
                    (Value::Enum(a), Value::Enum(b)) if a.sort == b.sort => {
                        Ok(Value::Bool(a.index == b.index))
                    }
                    (a, b) => Err(SmtError::IllSorted(format!("{a:?} == {b:?}"))),
                }
            }
            Term::Lt(a, b) => Ok(Value::Bool(
                self.eval_int(a, model)? < self.eval_int(b, model)?,
            )),
            Term::Gt(a, b) => Ok(Value::Bool(
                self.eval_int(a, model)? > self.eval_int(b, model)?,
            )),
            Term::Add(ts) => {
                let mut sum = 0;
                for t in ts {
                    sum += self.eval_int(t, model)?;
                }
                Ok(Value::Int(sum))
            }
            Term::Ite(c, t, e) => {
                if self.eval_bool(c, model)? {
                    self.eval(t, model)
                } else {
                    self.eval(e, model)
                }
            }
            Term::Distinct(ts) => {
                let vals = ts
                    .iter()
                    .map(|t| self.eval(t, model))
                    .collect::<Result<Vec<_>, _>>()?;
                let unique: BTreeSet<_> = vals.iter().copied().collect();
                Ok(Value::Bool(unique.len() == vals.len()))
            }
        }
    }

    /// Evaluate a term and require a boolean result.
    pub fn eval_bool(&self, term: &Term, model: &SmtModel) -> Result<bool, SmtError> {
        match self.eval(term, model)? {
            Value::Bool(b) => Ok(b),
            v => Err(SmtError::IllSorted(format!("expected Bool, got {v:?}"))),
        }
    }

    /// Evaluate a term and require an integer result.
    fn eval_int(&self, term: &Term, model: &SmtModel) -> Result<i64, SmtError> {
        match self.eval(term, model)? {
            Value::Int(i) => Ok(i),
            v => Err(SmtError::IllSorted(format!("expected Int, got {v:?}"))),
        }
    }

    /// Evaluate every registered constraint under the model and return the names of those that do
    /// not hold. An empty result means the model satisfies the whole constraint set.
    pub fn failed_constraints(&self, model: &SmtModel) -> Result<Vec<String>, SmtError> {
        let mut failed = Vec::new();
        for c in &self.constraints {
            if !self.eval_bool(&c.term, model)? {
                failed.push(c.name.clone());
            }
        }
        Ok(failed)
    }
}

/// A satisfying assignment returned by a [`Solver`]. Models must agree with every concrete
/// variable of the context they were produced for.
#[derive(Debug, Clone, Default)]
pub struct SmtModel {
    /// The assignment itself.
    values: HashMap<SmtVar, Value>,
}

impl SmtModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a variable.
    pub fn set(&mut self, var: SmtVar, value: impl Into<Value>) {
        self.values.insert(var, value.into());
    }

    /// Read the assignment of a variable.
    pub fn get(&self, var: SmtVar) -> Option<Value> {
        self.values.get(&var).copied()
    }

    /// Read a variable, resolving concrete context values, and require a boolean.
    pub fn get_bool(&self, ctx: &SolverContext, var: SmtVar) -> Result<bool, SmtError> {
        ctx.eval_bool(&Term::Var(var), self)
    }

    /// Read a variable, resolving concrete context values, and require an integer.
    pub fn get_int(&self, ctx: &SolverContext, var: SmtVar) -> Result<i64, SmtError> {
        match ctx.eval(&Term::Var(var), self)? {
            Value::Int(i) => Ok(i),
            v => Err(SmtError::IllSorted(format!("expected Int, got {v:?}"))),
        }
    }

    /// Read a variable, resolving concrete context values, and require an enum value.
    pub fn get_enum(&self, ctx: &SolverContext, var: SmtVar) -> Result<EnumValue, SmtError> {
        match ctx.eval(&Term::Var(var), self)? {
            Value::Enum(e) => Ok(e),
            v => Err(SmtError::IllSorted(format!("expected enum, got {v:?}"))),
        }
    }
}

impl fmt::Display for SmtModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model with {} assignments", self.values.len())
    }
}

/// The contract of the external SMT backend. The encoder only builds the constraint set; finding
/// a model is delegated to an implementation of this trait.
pub trait Solver {
    /// Solve the constraint set accumulated on the context. On success the returned model assigns
    /// every variable of the context; on failure the error carries the names of the constraints
    /// that participated in the conflict.
    fn solve(&mut self, ctx: &SolverContext) -> Result<SmtModel, SmtError>;
}
