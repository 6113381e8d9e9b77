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

//! # Route-Maps
//!
//! This module contains the structures to express (partially symbolic) route-maps. A route-map is
//! an ordered list of lines; each line carries an access mode (permit, deny, or a hole), a list
//! of match statements connected in an and, and a list of set actions. The first matching line
//! applies; a route matching no line is denied.
//!
//! Every part of a line can be a [`Sketch`] hole, which the synthesizer fills with a concrete
//! value while preserving the position of the line.

use std::fmt;

use crate::types::{Community, Prefix, Sketch};

/// Access mode of a route map line, which can either be permit or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Access {
    /// Routes matching this line are transformed and allowed.
    Permit,
    /// Routes matching this line are dropped.
    Deny,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Permit => write!(f, "permit"),
            Access::Deny => write!(f, "deny"),
        }
    }
}

/// A named list of prefixes referenced by a route-map match. A hole list is synthesized as a
/// whole: the solver chooses which of the known prefixes it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IpPrefixList {
    /// Name under which the list is installed on the router.
    pub name: String,
    /// The prefixes in the list, or a hole.
    pub networks: Sketch<Vec<Prefix>>,
}

/// A named list of communities referenced by a route-map match. A route matches the list if it
/// carries every community in it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CommunityList {
    /// Name under which the list is installed on the router.
    pub name: String,
    /// The communities in the list, or a hole.
    pub communities: Sketch<Vec<Community>>,
}

/// Match statement of a route map line. All matches of a line are connected in an and.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RouteMapMatch {
    /// Matches if the prefix is contained in the (possibly synthesized) prefix list.
    IpPrefixList(IpPrefixList),
    /// Matches if the route carries every community of the (possibly synthesized) community list.
    CommunityList(CommunityList),
    /// Matches on the next-hop identifier.
    NextHop(Sketch<String>),
}

/// Set action of a route map line, applied if the line matches and permits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RouteMapSet {
    /// Overwrite the local preference.
    LocalPref(Sketch<u32>),
    /// Overwrite the MED attribute.
    Med(Sketch<u32>),
    /// Overwrite the next hop.
    NextHop(Sketch<String>),
    /// Attach a community to the route.
    Community(Sketch<Community>),
}

/// A single line of a route map. Lines are evaluated in ascending `lineno` order; the first line
/// whose matches all hold decides the fate of the route.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RouteMapLine {
    /// Position of the line within the route map.
    pub lineno: u16,
    /// Whether matching routes are permitted or denied; a hole lets the solver decide.
    pub access: Sketch<Access>,
    /// Match statements, connected in an and. An empty list matches any route.
    pub matches: Vec<RouteMapMatch>,
    /// Set actions applied to permitted routes.
    pub actions: Vec<RouteMapSet>,
}

/// # Main RouteMap structure
///
/// An ordered list of [`RouteMapLine`]s with first-match semantics and an implicit deny after the
/// last line, as on Cisco devices.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RouteMap {
    /// Name under which the route map is installed on the router.
    pub name: String,
    /// The lines, sorted by ascending `lineno`.
    pub lines: Vec<RouteMapLine>,
}

impl RouteMap {
    /// Create a new route map. The lines are sorted by their line number.
    pub fn new(name: impl Into<String>, mut lines: Vec<RouteMapLine>) -> Self {
        lines.sort_by_key(|l| l.lineno);
        Self {
            name: name.into(),
            lines,
        }
    }

    /// Generate the canonical fully symbolic route map of the sketch: one line at position 10
    /// where the access mode, a prefix-list match, a community-list match and a local-pref action
    /// are all holes, followed by an explicit deny at position 100.
    pub fn generate_symbolic(name: impl Into<String>) -> Self {
        let name = name.into();
        let lines = vec![
            RouteMapLine {
                lineno: 10,
                access: Sketch::Hole,
                matches: vec![
                    RouteMapMatch::IpPrefixList(IpPrefixList {
                        name: format!("{name}_pl_10"),
                        networks: Sketch::Hole,
                    }),
                    RouteMapMatch::CommunityList(CommunityList {
                        name: format!("{name}_cl_10"),
                        communities: Sketch::Hole,
                    }),
                ],
                actions: vec![RouteMapSet::LocalPref(Sketch::Hole)],
            },
            RouteMapLine {
                lineno: 100,
                access: Sketch::Concrete(Access::Deny),
                matches: vec![],
                actions: vec![],
            },
        ];
        Self { name, lines }
    }
}
