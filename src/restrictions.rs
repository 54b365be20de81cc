//! Turn-restriction extraction from relations.
//!
//! The parser produces raw (from-way, via, to-way) tuples; the aggregator
//! later resolves them against the node table, and the node-based graph
//! filters out anything whose edges did not survive.

use log::warn;

use crate::ids::{InternalNodeId, NodeId, WayId};
use crate::osm::{MemberKind, OsmRelation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionKind {
    No,
    Only,
}

#[derive(Debug, Clone)]
pub enum RestrictionVia {
    Node(NodeId),
    /// One or more via ways between the from and to legs, in member order.
    Ways(Vec<WayId>),
}

/// A restriction as parsed from a relation, still in source identifiers.
#[derive(Debug, Clone)]
pub struct InputTurnRestriction {
    pub from_way: WayId,
    pub via: RestrictionVia,
    pub to_way: WayId,
    pub kind: RestrictionKind,
    pub condition: Option<String>,
}

/// A restriction resolved to internal node identifiers. The from edge is
/// (from, via[0]); the to edge is (via[last], to).
#[derive(Debug, Clone)]
pub struct NodeRestriction {
    pub from: InternalNodeId,
    pub via: InternalNodeId,
    pub to: InternalNodeId,
    pub kind: RestrictionKind,
    pub condition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WayRestriction {
    pub from: InternalNodeId,
    /// Junction sequence along the via ways, at least two nodes.
    pub via: Vec<InternalNodeId>,
    pub to: InternalNodeId,
    pub kind: RestrictionKind,
    pub condition: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TurnRestriction {
    Node(NodeRestriction),
    Way(WayRestriction),
}

impl TurnRestriction {
    pub fn kind(&self) -> RestrictionKind {
        match self {
            TurnRestriction::Node(r) => r.kind,
            TurnRestriction::Way(r) => r.kind,
        }
    }

    pub fn is_conditional(&self) -> bool {
        match self {
            TurnRestriction::Node(r) => r.condition.is_some(),
            TurnRestriction::Way(r) => r.condition.is_some(),
        }
    }
}

pub struct RestrictionParser {
    use_restrictions: bool,
    parse_conditionals: bool,
    /// Transport modes the profile obeys; used against `restriction:<mode>`
    /// namespaces and `except` lists.
    filters: Vec<String>,
}

impl RestrictionParser {
    pub fn new(use_restrictions: bool, parse_conditionals: bool, filters: Vec<String>) -> Self {
        Self {
            use_restrictions,
            parse_conditionals,
            filters,
        }
    }

    pub fn parse(&self, relation: &OsmRelation) -> Option<InputTurnRestriction> {
        if !self.use_restrictions {
            return None;
        }

        let type_tag = relation.tags.get("type")?;
        if type_tag != "restriction" {
            return None;
        }

        // The restriction does not apply if the profile's modes are on the
        // exception list.
        if let Some(except) = relation.tags.get("except") {
            if except
                .split(';')
                .any(|mode| self.filters.iter().any(|f| f == mode.trim()))
            {
                return None;
            }
        }

        let (value, condition) = self.restriction_value(relation)?;

        let kind = if value.starts_with("no_") {
            RestrictionKind::No
        } else if value.starts_with("only_") {
            RestrictionKind::Only
        } else {
            return None;
        };

        let mut from_way = None;
        let mut to_way = None;
        let mut via_node = None;
        let mut via_ways = Vec::new();

        for member in &relation.members {
            match (member.role.as_str(), member.kind) {
                ("from", MemberKind::Way) => {
                    if from_way.replace(member.id).is_some() {
                        warn!("restriction {} has multiple from members", relation.id);
                        return None;
                    }
                }
                ("to", MemberKind::Way) => {
                    if to_way.replace(member.id).is_some() {
                        warn!("restriction {} has multiple to members", relation.id);
                        return None;
                    }
                }
                ("via", MemberKind::Node) => {
                    via_node = Some(member.id);
                }
                ("via", MemberKind::Way) => {
                    via_ways.push(member.id);
                }
                _ => {}
            }
        }

        let via = match (via_node, via_ways.is_empty()) {
            (Some(node), true) => RestrictionVia::Node(node),
            (None, false) => RestrictionVia::Ways(via_ways),
            _ => {
                warn!("restriction {} has no usable via member", relation.id);
                return None;
            }
        };

        Some(InputTurnRestriction {
            from_way: from_way?,
            via,
            to_way: to_way?,
            kind,
            condition,
        })
    }

    /// Pick the restriction value, honoring mode namespaces and, when
    /// enabled, `restriction:conditional` tags of the form
    /// `no_left_turn @ (Mo-Fr 07:00-19:00)`.
    fn restriction_value(&self, relation: &OsmRelation) -> Option<(String, Option<String>)> {
        if let Some(value) = relation.tags.get("restriction") {
            return Some((value.to_string(), None));
        }
        for filter in &self.filters {
            if let Some(value) = relation.tags.get(&format!("restriction:{filter}")) {
                return Some((value.to_string(), None));
            }
        }
        if self.parse_conditionals {
            if let Some(value) = relation.tags.get("restriction:conditional") {
                let (value, condition) = value.split_once('@')?;
                return Some((
                    value.trim().to_string(),
                    Some(condition.trim().to_string()),
                ));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::{RelationMember, TagMap};

    fn parser() -> RestrictionParser {
        RestrictionParser::new(
            true,
            false,
            vec!["motorcar".to_string(), "vehicle".to_string()],
        )
    }

    fn member(role: &str, kind: MemberKind, id: i64) -> RelationMember {
        RelationMember {
            kind,
            id,
            role: role.to_string(),
        }
    }

    fn restriction_relation(value: &str, extra: &[(&str, &str)]) -> OsmRelation {
        let mut pairs = vec![
            ("type".to_string(), "restriction".to_string()),
            ("restriction".to_string(), value.to_string()),
        ];
        pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        OsmRelation {
            id: 900,
            tags: TagMap::from_pairs(pairs),
            members: vec![
                member("from", MemberKind::Way, 10),
                member("via", MemberKind::Node, 2),
                member("to", MemberKind::Way, 20),
            ],
        }
    }

    #[test]
    fn parses_no_left_turn() {
        let parsed = parser()
            .parse(&restriction_relation("no_left_turn", &[]))
            .unwrap();
        assert_eq!(parsed.from_way, 10);
        assert_eq!(parsed.to_way, 20);
        assert_eq!(parsed.kind, RestrictionKind::No);
        assert!(matches!(parsed.via, RestrictionVia::Node(2)));
    }

    #[test]
    fn parses_only_straight_on() {
        let parsed = parser()
            .parse(&restriction_relation("only_straight_on", &[]))
            .unwrap();
        assert_eq!(parsed.kind, RestrictionKind::Only);
    }

    #[test]
    fn except_for_our_mode_drops_restriction() {
        let relation = restriction_relation("no_left_turn", &[("except", "motorcar")]);
        assert!(parser().parse(&relation).is_none());
    }

    #[test]
    fn except_for_other_mode_keeps_restriction() {
        let relation = restriction_relation("no_left_turn", &[("except", "bicycle")]);
        assert!(parser().parse(&relation).is_some());
    }

    #[test]
    fn via_way_restriction() {
        let relation = OsmRelation {
            id: 901,
            tags: TagMap::from_pairs(vec![
                ("type".to_string(), "restriction".to_string()),
                ("restriction".to_string(), "no_u_turn".to_string()),
            ]),
            members: vec![
                member("from", MemberKind::Way, 10),
                member("via", MemberKind::Way, 15),
                member("to", MemberKind::Way, 20),
            ],
        };
        let parsed = parser().parse(&relation).unwrap();
        match parsed.via {
            RestrictionVia::Ways(ways) => assert_eq!(ways, vec![15]),
            _ => panic!("expected via ways"),
        }
    }

    #[test]
    fn conditional_restrictions_are_opt_in() {
        let relation = OsmRelation {
            id: 902,
            tags: TagMap::from_pairs(vec![
                ("type".to_string(), "restriction".to_string()),
                (
                    "restriction:conditional".to_string(),
                    "no_left_turn @ (Mo-Fr 07:00-19:00)".to_string(),
                ),
            ]),
            members: vec![
                member("from", MemberKind::Way, 10),
                member("via", MemberKind::Node, 2),
                member("to", MemberKind::Way, 20),
            ],
        };

        assert!(parser().parse(&relation).is_none());

        let conditional_parser =
            RestrictionParser::new(true, true, vec!["motorcar".to_string()]);
        let parsed = conditional_parser.parse(&relation).unwrap();
        assert_eq!(parsed.condition.as_deref(), Some("(Mo-Fr 07:00-19:00)"));
        assert_eq!(parsed.kind, RestrictionKind::No);
    }

    #[test]
    fn unsupported_value_is_ignored() {
        assert!(parser()
            .parse(&restriction_relation("give_way", &[]))
            .is_none());
    }
}
