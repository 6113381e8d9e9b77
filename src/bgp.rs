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

//! Module containing the BGP domain types: concrete announcements as injected by the operator,
//! canonical AS-path keys, [`PropagatedInfo`] records, and the arena of symbolic announcements
//! that the encoder derives route-map chains on.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::smt::SmtVar;
use crate::types::{AsId, Community, Prefix, RouterId};

/// The BGP ORIGIN attribute. The decision process prefers `IGP` over `EBGP` over `INCOMPLETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Origin {
    /// The route was originated by an IGP.
    Igp,
    /// The route was learned via EGP.
    Ebgp,
    /// The route's origin is unknown.
    Incomplete,
}

impl Origin {
    /// The member name of this origin inside the origin enum sort.
    pub fn name(&self) -> &'static str {
        match self {
            Origin::Igp => "IGP",
            Origin::Ebgp => "EBGP",
            Origin::Incomplete => "INCOMPLETE",
        }
    }

    /// All origin values in sort-declaration order.
    pub fn values() -> [Origin; 3] {
        [Origin::Igp, Origin::Ebgp, Origin::Incomplete]
    }
}

/// A concrete BGP announcement, as injected into the network by an external peer (or advertised
/// by a router itself).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Announcement {
    /// The announced prefix.
    pub prefix: Prefix,
    /// The peer that injected the announcement.
    pub peer: RouterId,
    /// The ORIGIN attribute.
    pub origin: Origin,
    /// The AS path the announcement already carries when it enters the network.
    pub as_path: Vec<AsId>,
    /// The AS path length the announcement already carries.
    pub as_path_len: usize,
    /// The next-hop identifier.
    pub next_hop: String,
    /// The LOCAL_PREF attribute.
    pub local_pref: u32,
    /// The MED attribute.
    pub med: u32,
    /// Which communities are attached. Communities missing from this map are treated as not set.
    pub communities: BTreeMap<Community, bool>,
    /// Whether the announcement is propagated at all.
    pub permitted: bool,
}

/// Canonical, comparable key of an AS-path tuple. Two AS paths are equal exactly if their keys
/// are equal; the keys are the members of the AS-path enum sort.
pub fn as_path_key(as_path: &[AsId]) -> String {
    format!("AsPath_{}", as_path.iter().map(|a| a.0).join("_"))
}

/// Identifier of a [`PropagatedInfo`] inside the propagation graph that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropId(pub(crate) usize);

/// One reason a router may hold an announcement for a prefix: the announcement entered the
/// network at `path[0]` and traveled along `path` to the owning router `path[last]`. Two records
/// that differ only in `path` are distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagatedInfo {
    /// The destination prefix of the propagated announcement.
    pub ann_name: Prefix,
    /// Routers the announcement traveled through, origin first, owning router last.
    pub path: Vec<RouterId>,
    /// Canonical AS-level projection of `path`, latest AS first, spliced with the AS path carried
    /// by the origin announcement.
    pub as_path: Vec<AsId>,
    /// Length of the AS path as seen by the decision process.
    pub as_path_len: usize,
    /// The BGP neighbor this router heard the announcement from (`None` for self-origination).
    pub peer: Option<RouterId>,
    /// The last router on `path` that first crossed from a foreign AS.
    pub egress: Option<RouterId>,
    /// The neighbor at that AS crossing.
    pub external_peer: Option<RouterId>,
    /// The record one hop closer to the origin (on `path[last - 1]`), assigned once during
    /// partial evaluation.
    pub prev: Option<PropId>,
}

impl PropagatedInfo {
    /// The router holding this record.
    pub fn node(&self) -> RouterId {
        *self.path.last().expect("PropagatedInfo with empty path")
    }

    /// Returns `true` if the owning router originated the announcement itself.
    pub fn is_self_originated(&self) -> bool {
        self.path.len() == 1
    }
}

/// Identifier of a symbolic announcement inside the [`AnnouncementArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnnId(usize);

/// The BGP attributes of a symbolic announcement that are plain variables (communities are kept
/// in a submapping). Used to iterate attribute-wise over announcements, e.g. when equating an
/// imported announcement with the router's own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnAttr {
    /// The announced prefix.
    Prefix,
    /// The neighbor the announcement was heard from.
    Peer,
    /// The ORIGIN attribute.
    Origin,
    /// The canonical AS-path key.
    AsPath,
    /// The AS-path length.
    AsPathLen,
    /// The next-hop identifier.
    NextHop,
    /// The LOCAL_PREF attribute.
    LocalPref,
    /// The MED attribute.
    Med,
    /// Whether the announcement exists at all.
    Permitted,
}

impl AnnAttr {
    /// Attribute name as used inside variable and constraint names.
    pub fn name(&self) -> &'static str {
        match self {
            AnnAttr::Prefix => "prefix",
            AnnAttr::Peer => "peer",
            AnnAttr::Origin => "origin",
            AnnAttr::AsPath => "as_path",
            AnnAttr::AsPathLen => "as_path_len",
            AnnAttr::NextHop => "next_hop",
            AnnAttr::LocalPref => "local_pref",
            AnnAttr::Med => "med",
            AnnAttr::Permitted => "permitted",
        }
    }
}

/// A symbolic announcement: one variable per BGP attribute, plus a community submapping and a
/// back-reference to the announcement it was derived from by the last route-map line.
#[derive(Debug, Clone)]
pub struct SymbolicAnnouncement {
    /// Variable holding the announced prefix.
    pub prefix: SmtVar,
    /// Variable holding the neighbor the announcement was heard from.
    pub peer: SmtVar,
    /// Variable holding the ORIGIN attribute.
    pub origin: SmtVar,
    /// Variable holding the canonical AS-path key.
    pub as_path: SmtVar,
    /// Variable holding the AS-path length.
    pub as_path_len: SmtVar,
    /// Variable holding the next-hop identifier.
    pub next_hop: SmtVar,
    /// Variable holding the LOCAL_PREF attribute.
    pub local_pref: SmtVar,
    /// Variable holding the MED attribute.
    pub med: SmtVar,
    /// Variable that is `true` iff the announcement exists.
    pub permitted: SmtVar,
    /// One boolean variable per registered community.
    pub communities: BTreeMap<Community, SmtVar>,
    /// The announcement this one was derived from, if any. Walking this chain reconstructs the
    /// per-line route-map derivation.
    pub prev_announcement: Option<AnnId>,
}

impl SymbolicAnnouncement {
    /// The variable holding the given attribute.
    pub fn var(&self, attr: AnnAttr) -> SmtVar {
        match attr {
            AnnAttr::Prefix => self.prefix,
            AnnAttr::Peer => self.peer,
            AnnAttr::Origin => self.origin,
            AnnAttr::AsPath => self.as_path,
            AnnAttr::AsPathLen => self.as_path_len,
            AnnAttr::NextHop => self.next_hop,
            AnnAttr::LocalPref => self.local_pref,
            AnnAttr::Med => self.med,
            AnnAttr::Permitted => self.permitted,
        }
    }
}

/// Arena owning every symbolic announcement of a synthesis run. Announcements are never mutated
/// after creation, except for assigning the `prev_announcement` back-reference when a router's
/// own copy is wired to its imported announcement.
#[derive(Debug, Default)]
pub struct AnnouncementArena {
    /// All announcements, in creation order.
    anns: Vec<SymbolicAnnouncement>,
}

impl AnnouncementArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new announcement and return its id.
    pub fn alloc(&mut self, ann: SymbolicAnnouncement) -> AnnId {
        let id = AnnId(self.anns.len());
        self.anns.push(ann);
        id
    }

    /// Read an announcement.
    pub fn get(&self, id: AnnId) -> &SymbolicAnnouncement {
        &self.anns[id.0]
    }

    /// Mutably access an announcement (used to assign `prev_announcement`).
    pub fn get_mut(&mut self, id: AnnId) -> &mut SymbolicAnnouncement {
        &mut self.anns[id.0]
    }

    /// Returns `true` if `old` appears somewhere on the derivation chain of `new` (including
    /// `new` itself).
    pub fn derives_from(&self, new: AnnId, old: AnnId) -> bool {
        let mut cur = Some(new);
        while let Some(id) = cur {
            if id == old {
                return true;
            }
            cur = self.get(id).prev_announcement;
        }
        false
    }

    /// Number of announcements allocated so far.
    pub fn len(&self) -> usize {
        self.anns.len()
    }

    /// Returns `true` if no announcement was allocated yet.
    pub fn is_empty(&self) -> bool {
        self.anns.is_empty()
    }
}
