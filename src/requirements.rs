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

//! Module defining the requirement language: which paths traffic for a destination prefix must
//! (or may) follow, and in which order alternatives are preferred.

use crate::types::{Prefix, RouterId};

/// The protocol a requirement talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Protocol {
    /// The requirement constrains BGP route selection.
    Bgp,
    /// The requirement constrains OSPF shortest paths.
    Ospf,
}

/// A single forwarding requirement. Paths are written in traffic direction: the first router is
/// where traffic enters (or starts), the last router is the origin of the destination prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Req {
    /// Traffic for `dst_net` must follow `path`.
    PathReq {
        /// Protocol this requirement constrains.
        protocol: Protocol,
        /// Destination prefix of the traffic class.
        dst_net: Prefix,
        /// The required router path, in traffic direction.
        path: Vec<RouterId>,
        /// If `true`, no path other than `path` may be used.
        strict: bool,
    },
    /// The nested requirements are alternatives, preferred in the listed order: a higher-ranked
    /// alternative that is realizable must win over every lower-ranked one.
    PathOrderReq {
        /// Protocol this requirement constrains.
        protocol: Protocol,
        /// Destination prefix of the traffic class.
        dst_net: Prefix,
        /// The ordered alternatives, most preferred first.
        paths: Vec<Req>,
        /// If `true`, no path outside the listed alternatives may be used.
        strict: bool,
    },
    /// Any one of the nested requirements may be taken; all of them must be simultaneously
    /// realizable, and they are all equally acceptable.
    KConnectedPathsReq {
        /// Protocol this requirement constrains.
        protocol: Protocol,
        /// Destination prefix of the traffic class.
        dst_net: Prefix,
        /// The equally acceptable alternatives.
        paths: Vec<Req>,
        /// If `true`, no path outside the listed alternatives may be used.
        strict: bool,
    },
}

impl Req {
    /// The destination prefix this requirement talks about.
    pub fn dst_net(&self) -> &Prefix {
        match self {
            Req::PathReq { dst_net, .. }
            | Req::PathOrderReq { dst_net, .. }
            | Req::KConnectedPathsReq { dst_net, .. } => dst_net,
        }
    }

    /// The protocol this requirement talks about.
    pub fn protocol(&self) -> Protocol {
        match self {
            Req::PathReq { protocol, .. }
            | Req::PathOrderReq { protocol, .. }
            | Req::KConnectedPathsReq { protocol, .. } => *protocol,
        }
    }
}
