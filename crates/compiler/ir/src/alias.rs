//! # Pointer Alias Identities
//!
//! The alias registry attaches an opaque identity handle to tensors that may
//! share memory. Identities belonging to one overlapping region are linked
//! into an [`AliasSet`] holding its members by weak reference; the registry
//! (whoever created the identities) is expected to outlive every tensor in
//! the function, so a weak reference that fails to upgrade is a fatal error
//! in any pass that walks a group.
//!
//! A tensor with no identity, or whose identity belongs to a singleton
//! group, is treated as alias-free.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::attrs::{attr_keys, AttrValue};
use crate::{ExprId, IrArena};

/// A clique of alias identities referring to potentially overlapping memory
#[derive(Debug, Default)]
pub struct AliasSet {
    members: RefCell<Vec<Weak<TensorAliasIdentity>>>,
}

impl AliasSet {
    /// Creates an empty alias set
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of member identities
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    /// Returns true if the set has no members
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Snapshot of the member identities as weak references
    pub fn members(&self) -> Vec<Weak<TensorAliasIdentity>> {
        self.members.borrow().clone()
    }
}

/// Opaque alias identity handle for one tensor
#[derive(Debug, Default)]
pub struct TensorAliasIdentity {
    set: RefCell<Option<Rc<AliasSet>>>,
}

impl TensorAliasIdentity {
    /// Creates a fresh identity belonging to no group
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Returns true if this identity belongs to no group or to a singleton
    /// group (nothing else can overlap it)
    pub fn has_no_alias(&self) -> bool {
        self.set.borrow().as_ref().map_or(true, |s| s.len() <= 1)
    }

    /// The group this identity belongs to, if any
    pub fn alias_set(&self) -> Option<Rc<AliasSet>> {
        self.set.borrow().clone()
    }

    /// The group's members (including this identity itself), held weakly.
    /// Empty when the identity belongs to no group.
    pub fn peers(&self) -> Vec<Weak<TensorAliasIdentity>> {
        self.set
            .borrow()
            .as_ref()
            .map_or_else(Vec::new, |s| s.members())
    }

    /// Adds `this` identity to `set`, leaving any previous group
    pub fn add_to_set(this: &Rc<Self>, set: &Rc<AliasSet>) {
        set.members.borrow_mut().push(Rc::downgrade(this));
        *this.set.borrow_mut() = Some(Rc::clone(set));
    }
}

/// Links the given identities into one fresh alias group
pub fn make_alias_group(identities: &[&Rc<TensorAliasIdentity>]) -> Rc<AliasSet> {
    let set = AliasSet::new();
    for id in identities {
        TensorAliasIdentity::add_to_set(id, &set);
    }
    set
}

/// Reads the alias identity attached to a tensor, if any
pub fn get_alias_info(arena: &IrArena, tensor: ExprId) -> Option<Rc<TensorAliasIdentity>> {
    arena
        .expr(tensor)
        .attrs
        .get_alias(attr_keys::POINTER_ALIAS)
        .cloned()
}

/// Returns the alias identity attached to a tensor, installing a fresh one
/// if the tensor has none
pub fn get_or_create_alias_info(arena: &mut IrArena, tensor: ExprId) -> Rc<TensorAliasIdentity> {
    if let Some(existing) = get_alias_info(arena, tensor) {
        return existing;
    }
    let id = TensorAliasIdentity::new();
    arena.set_attr(
        tensor,
        attr_keys::POINTER_ALIAS,
        AttrValue::Alias(Rc::clone(&id)),
    );
    id
}

/// Map key comparing alias identities by pointer identity
#[derive(Debug, Clone)]
pub struct AliasIdentityKey(pub Rc<TensorAliasIdentity>);

impl PartialEq for AliasIdentityKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AliasIdentityKey {}

impl std::hash::Hash for AliasIdentityKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_alias_by_default() {
        let id = TensorAliasIdentity::new();
        assert!(id.has_no_alias());
        assert!(id.peers().is_empty());
    }

    #[test]
    fn test_singleton_group_is_alias_free() {
        let id = TensorAliasIdentity::new();
        let set = AliasSet::new();
        TensorAliasIdentity::add_to_set(&id, &set);
        assert!(id.has_no_alias());
        assert_eq!(id.peers().len(), 1);
    }

    #[test]
    fn test_linked_group() {
        let a = TensorAliasIdentity::new();
        let b = TensorAliasIdentity::new();
        let set = make_alias_group(&[&a, &b]);
        assert_eq!(set.len(), 2);
        assert!(!a.has_no_alias());
        assert!(!b.has_no_alias());

        // Both members upgrade to live identities.
        let peers = a.peers();
        assert_eq!(peers.len(), 2);
        assert!(peers.iter().all(|w| w.upgrade().is_some()));
    }

    #[test]
    fn test_dropped_member_fails_upgrade() {
        let a = TensorAliasIdentity::new();
        let set = {
            let b = TensorAliasIdentity::new();
            make_alias_group(&[&a, &b])
        };
        assert_eq!(set.len(), 2);
        let dead = a.peers().iter().filter(|w| w.upgrade().is_none()).count();
        assert_eq!(dead, 1);
    }

    #[test]
    fn test_identity_key_semantics() {
        use rustc_hash::FxHashMap;

        let a = TensorAliasIdentity::new();
        let b = TensorAliasIdentity::new();
        let mut map = FxHashMap::default();
        map.insert(AliasIdentityKey(Rc::clone(&a)), "a");
        map.insert(AliasIdentityKey(Rc::clone(&b)), "b");
        assert_eq!(map[&AliasIdentityKey(a)], "a");
        assert_eq!(map[&AliasIdentityKey(b)], "b");
    }
}
