//! Relation indexer: first pass over the input.
//!
//! For every relation whose `type` is declared by the profile, the indexer
//! records the relation's tags and, for each member, which relations
//! reference it under which role. Buffer translation runs on the worker
//! pool; merging into the shared index is serial and in input order, so
//! relation ids assigned here are deterministic.

use crate::ids::RelationId;
use crate::osm::{MemberKind, OsmRelation, TagMap};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct RelationData {
    pub id: RelationId,
    pub tags: TagMap,
}

/// Context handed to the profile when classifying a way or node: every
/// parent relation together with the member's role.
#[derive(Debug, Default)]
pub struct RelationContext<'a> {
    pub entries: Vec<(&'a TagMap, &'a str)>,
}

impl RelationContext<'_> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub struct RelationIndex {
    relations: Vec<RelationData>,
    members: FxHashMap<(MemberKind, i64), Vec<(u32, String)>>,
}

impl RelationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one relation into the index. Caller has already filtered
    /// by the profile's declared relation types.
    pub fn add(&mut self, relation: &OsmRelation) {
        let index = self.relations.len() as u32;
        self.relations.push(RelationData {
            id: relation.id,
            tags: relation.tags.clone(),
        });
        for member in &relation.members {
            self.members
                .entry((member.kind, member.id))
                .or_default()
                .push((index, member.role.clone()));
        }
    }

    /// Serial in-order merge of a per-buffer partial index.
    pub fn merge(&mut self, other: RelationIndex) {
        let base = self.relations.len() as u32;
        self.relations.extend(other.relations);
        for ((kind, id), refs) in other.members {
            let slot = self.members.entry((kind, id)).or_default();
            slot.extend(refs.into_iter().map(|(idx, role)| (base + idx, role)));
        }
    }

    pub fn context_for(&self, kind: MemberKind, id: i64) -> RelationContext<'_> {
        let mut context = RelationContext::default();
        if let Some(refs) = self.members.get(&(kind, id)) {
            for (index, role) in refs {
                context
                    .entries
                    .push((&self.relations[*index as usize].tags, role.as_str()));
            }
        }
        context
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::RelationMember;

    fn route_relation(id: RelationId, way: i64, role: &str) -> OsmRelation {
        OsmRelation {
            id,
            tags: TagMap::from_pairs(vec![
                ("type".into(), "route".into()),
                ("route".into(), "bicycle".into()),
            ]),
            members: vec![RelationMember {
                kind: MemberKind::Way,
                id: way,
                role: role.to_string(),
            }],
        }
    }

    #[test]
    fn member_lookup_returns_tags_and_role() {
        let mut index = RelationIndex::new();
        index.add(&route_relation(5, 100, "forward"));

        let context = index.context_for(MemberKind::Way, 100);
        assert_eq!(context.entries.len(), 1);
        assert_eq!(context.entries[0].0.get("route"), Some("bicycle"));
        assert_eq!(context.entries[0].1, "forward");

        assert!(index.context_for(MemberKind::Way, 999).is_empty());
    }

    #[test]
    fn merge_rebases_relation_indices() {
        let mut left = RelationIndex::new();
        left.add(&route_relation(1, 10, "a"));

        let mut right = RelationIndex::new();
        right.add(&route_relation(2, 20, "b"));
        right.add(&route_relation(3, 10, "c"));

        left.merge(right);

        assert_eq!(left.len(), 3);
        let context = left.context_for(MemberKind::Way, 10);
        let roles: Vec<&str> = context.entries.iter().map(|(_, role)| *role).collect();
        assert_eq!(roles, vec!["a", "c"]);
    }
}
