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

//! # BgpSynth: synthesizing BGP and OSPF configurations from path requirements
//!
//! This crate compiles operator-provided forwarding intent into an SMT problem whose solutions are
//! concrete router configurations. The operator supplies a *sketch*: a network topology where some
//! parameters (OSPF link weights, BGP router IDs, route-map lines) are left symbolic, a set of
//! externally injected BGP announcements, and path requirements per destination prefix. BgpSynth
//! computes how announcements propagate under those requirements, encodes every router's BGP
//! decision process as constraints, and, once a model is found, writes concrete route-maps,
//! prefix-lists, community-lists and router IDs back into the sketch.
//!
//! ## Structure
//!
//! The source code of this crate is structured as follows:
//! - The module [`network`] contains the [`network::NetworkGraph`]: the queryable topology sketch
//!   holding routers, BGP sessions, OSPF costs, advertisements and route-maps.
//! - The module [`requirements`] defines the requirement language ([`requirements::Req`]).
//! - The module [`smt`] contains the [`smt::SolverContext`], an arena for symbolic variables, enum
//!   sorts and named constraints, together with the [`smt::Solver`] trait that abstracts the
//!   external SMT backend.
//! - The module [`propagation`] computes the per-prefix propagation graphs from the requirements
//!   and partially evaluates them into [`bgp::PropagatedInfo`] records.
//! - The module [`encoder`] encodes each router's learned announcements, its import and export
//!   policies, and the BGP decision process.
//! - The module [`synthesis`] (structure [`Synthesizer`]) wires everything together and
//!   materializes the solution.

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::result_large_err)]

pub mod bgp;
pub mod encoder;
mod formatter;
pub mod network;
pub mod propagation;
pub mod requirements;
pub mod route_map;
pub mod smt;
pub mod synthesis;
#[cfg(test)]
mod test;
pub mod types;

pub use formatter::NetworkFormatter;
pub use synthesis::Synthesizer;
pub use types::{RouterId, SynthesisError};
