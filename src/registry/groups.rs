use std::collections::HashMap;

use crate::error::{MapError, Result};
use crate::overlay::{GroupId, OverlayId};

use super::core::random_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub members: Vec<OverlayId>,
}

/// Group membership for one map plus the overlay -> groups back-reference.
///
/// Both directions change together inside every mutating call.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: Vec<Group>,
    bindings: HashMap<OverlayId, Vec<GroupId>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.groups.iter().any(|group| group.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// Detached copy of the member list.
    pub fn members(&self, id: &str) -> Option<Vec<OverlayId>> {
        self.get(id).map(|group| group.members.clone())
    }

    pub fn groups_of(&self, overlay: &str) -> &[GroupId] {
        self.bindings
            .get(overlay)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Start an empty membership record for a freshly created overlay.
    pub fn bind_overlay(&mut self, overlay: &str) {
        self.bindings.insert(overlay.to_string(), Vec::new());
    }

    /// Register a group. Repeated member ids collapse to their first occurrence.
    pub fn insert(&mut self, id: GroupId, members: Vec<OverlayId>) -> Result<()> {
        if self.contains(&id) {
            return Err(MapError::IdAlreadyExists(id));
        }
        let mut unique: Vec<OverlayId> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        for member in &unique {
            self.bindings
                .entry(member.clone())
                .or_default()
                .push(id.clone());
        }
        self.groups.push(Group {
            id,
            members: unique,
        });
        Ok(())
    }

    /// Drop a group and its members' back-references. Members themselves survive.
    pub fn remove(&mut self, id: &str) -> Option<Group> {
        let idx = self.groups.iter().position(|group| group.id == id)?;
        let group = self.groups.remove(idx);
        for member in &group.members {
            if let Some(bound) = self.bindings.get_mut(member) {
                bound.retain(|gid| gid != id);
            }
        }
        Some(group)
    }

    /// Forget an overlay entirely, returning the groups it belonged to.
    pub fn detach_overlay(&mut self, overlay: &str) -> Vec<GroupId> {
        let bound = self.bindings.remove(overlay).unwrap_or_default();
        for gid in &bound {
            if let Some(group) = self.groups.iter_mut().find(|group| &group.id == gid) {
                group.members.retain(|member| member != overlay);
            }
        }
        bound
    }

    pub fn allocate_id(&self) -> GroupId {
        loop {
            let candidate = random_id();
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<OverlayId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn insert_mirrors_back_references() {
        let mut registry = GroupRegistry::new();
        registry.insert("g1".into(), ids(&["a", "b"])).unwrap();
        registry.insert("g2".into(), ids(&["b"])).unwrap();

        assert_eq!(registry.groups_of("a"), ["g1".to_string()]);
        assert_eq!(
            registry.groups_of("b"),
            ["g1".to_string(), "g2".to_string()]
        );
        assert!(registry.groups_of("c").is_empty());
    }

    #[test]
    fn duplicate_group_id_is_rejected() {
        let mut registry = GroupRegistry::new();
        registry.insert("g".into(), ids(&["a"])).unwrap();
        let err = registry.insert("g".into(), ids(&["b"])).unwrap_err();
        assert_eq!(err, MapError::IdAlreadyExists("g".to_string()));
        assert!(registry.groups_of("b").is_empty());
    }

    #[test]
    fn repeated_members_collapse() {
        let mut registry = GroupRegistry::new();
        registry.insert("g".into(), ids(&["a", "a", "b"])).unwrap();
        assert_eq!(registry.members("g").unwrap(), ids(&["a", "b"]));
        assert_eq!(registry.groups_of("a").len(), 1);
    }

    #[test]
    fn remove_keeps_members_but_drops_binding() {
        let mut registry = GroupRegistry::new();
        registry.bind_overlay("a");
        registry.insert("g".into(), ids(&["a"])).unwrap();

        let removed = registry.remove("g").unwrap();
        assert_eq!(removed.members, ids(&["a"]));
        assert!(registry.groups_of("a").is_empty());
        assert!(registry.remove("g").is_none());
    }

    #[test]
    fn detach_overlay_prunes_every_group() {
        let mut registry = GroupRegistry::new();
        registry.insert("g1".into(), ids(&["a", "b"])).unwrap();
        registry.insert("g2".into(), ids(&["a"])).unwrap();

        let bound = registry.detach_overlay("a");
        assert_eq!(bound, ids(&["g1", "g2"]));
        assert_eq!(registry.members("g1").unwrap(), ids(&["b"]));
        assert!(registry.members("g2").unwrap().is_empty());
        assert!(registry.detach_overlay("a").is_empty());
    }
}
