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

//! Formatting things. Router ids are graph indices; everything that ends up in logs or in
//! constraint names goes through this module so it carries router *names* instead.

use itertools::Itertools;

use crate::bgp::PropagatedInfo;
use crate::network::NetworkGraph;
use crate::types::RouterId;

/// Trait to format things using the name information stored in the network graph.
pub trait NetworkFormatter {
    /// Format `self` using the router names of the given network.
    fn fmt(&self, net: &NetworkGraph) -> String;
}

impl NetworkFormatter for RouterId {
    fn fmt(&self, net: &NetworkGraph) -> String {
        net.router_name(*self).to_string()
    }
}

impl NetworkFormatter for [RouterId] {
    fn fmt(&self, net: &NetworkGraph) -> String {
        self.iter().map(|r| net.router_name(*r)).join("_")
    }
}

impl NetworkFormatter for Vec<RouterId> {
    fn fmt(&self, net: &NetworkGraph) -> String {
        self.as_slice().fmt(net)
    }
}

impl NetworkFormatter for Option<RouterId> {
    fn fmt(&self, net: &NetworkGraph) -> String {
        match self {
            Some(r) => net.router_name(*r).to_string(),
            None => "None".to_string(),
        }
    }
}

impl NetworkFormatter for PropagatedInfo {
    fn fmt(&self, net: &NetworkGraph) -> String {
        format!(
            "PropagatedInfo {{ net: {}, path: [{}], peer: {}, egress: {}, external_peer: {}, as_path: [{}] }}",
            self.ann_name,
            self.path.iter().map(|r| net.router_name(*r)).join(", "),
            self.peer.fmt(net),
            self.egress.fmt(net),
            self.external_peer.fmt(net),
            self.as_path.iter().join(", "),
        )
    }
}
