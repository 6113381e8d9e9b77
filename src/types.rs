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

//! Module containing all basic type definitions.

use std::fmt;
use std::str::FromStr;

use petgraph::prelude::NodeIndex;
use thiserror::Error;

/// Index type of the topology graph.
pub(crate) type IndexType = u32;
/// Router Identification (and index into the topology graph)
pub type RouterId = NodeIndex<IndexType>;

/// AS Number
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AsId(pub u32);

impl fmt::Display for AsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl From<u32> for AsId {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

/// Destination network of a traffic class. Prefixes are treated as opaque identifiers by the
/// encoder (they become members of an enum sort); only the [`crate::network::NetworkGraph`] knows
/// their addressing.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Prefix(pub String);

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Prefix {
    fn from(x: &str) -> Self {
        Self(x.to_string())
    }
}

impl From<String> for Prefix {
    fn from(x: String) -> Self {
        Self(x)
    }
}

/// BGP Community value, written as `AS:VALUE`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Community(pub u32, pub u32);

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

impl Community {
    /// Name of the community used inside variable and constraint names.
    pub fn var_name(&self) -> String {
        format!("{}_{}", self.0, self.1)
    }
}

impl FromStr for Community {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SynthesisError::InvalidCommunity(s.to_string());
        let (asn, val) = s.split_once(':').ok_or_else(err)?;
        Ok(Community(
            asn.parse().map_err(|_| err())?,
            val.parse().map_err(|_| err())?,
        ))
    }
}

/// A sketch parameter: either a concrete value provided by the operator, or a hole that the
/// synthesizer must fill.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Sketch<T> {
    /// The operator fixed this value; the synthesizer must not change it.
    Concrete(T),
    /// The value is left symbolic and will be chosen by the solver.
    Hole,
}

impl<T> Sketch<T> {
    /// Returns `true` if the parameter is a hole.
    pub fn is_hole(&self) -> bool {
        matches!(self, Self::Hole)
    }

    /// Returns the concrete value, if there is one.
    pub fn concrete(&self) -> Option<&T> {
        match self {
            Self::Concrete(x) => Some(x),
            Self::Hole => None,
        }
    }
}

impl<T> From<T> for Sketch<T> {
    fn from(x: T) -> Self {
        Self::Concrete(x)
    }
}

/// Local preference assigned to routes that do not carry one explicitly.
pub const DEFAULT_LOCAL_PREF: u32 = 100;
/// MED assigned to routes that do not carry one explicitly.
pub const DEFAULT_MED: u32 = 100;

/// Error thrown while building the propagation graphs or encoding the sketch.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A router appears as the origin of a required path, but it has no advertisement for the
    /// destination prefix. This is a contradiction in the sketch itself.
    #[error("Router {0} is the origin of a path for {1}, but advertises no such prefix")]
    MissingOriginAnnouncement(String, Prefix),
    /// A route-map is referenced by name on a BGP session but does not exist on the router.
    #[error("Route-map {0} is attached at router {1} but is not defined there")]
    UnknownRouteMap(String, String),
    /// A router of a requirement path does not exist in the topology.
    #[error("Router {0:?} of a requirement does not exist in the topology")]
    UnknownRouter(RouterId),
    /// A requirement path traverses two routers that share no BGP session.
    #[error("Requirement path traverses {0} -> {1}, but they share no BGP session")]
    NoBgpSession(String, String),
    /// A community string could not be parsed.
    #[error("Invalid community value: {0}")]
    InvalidCommunity(String),
    /// Error raised by the SMT layer (unknown sorts, ill-sorted terms, unsatisfiable constraints).
    #[error("SMT error: {0}")]
    Smt(#[from] crate::smt::SmtError),
}
