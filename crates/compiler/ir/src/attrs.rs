//! # Node Attributes
//!
//! A small heterogeneous attribute map attached to every expression node.
//! Attributes are set at construction time through the arena and read-only
//! afterwards; passes communicate through them (e.g. an access opted out of
//! caching, a tensor claimed by another pass, a tensor's alias identity).

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::alias::TensorAliasIdentity;

/// Well-known attribute keys
pub mod attr_keys {
    /// On an `Indexing`: skip this access in the index-to-var rewrite
    pub const NO_INDEX2VAR: &str = "pass.no_index2var";

    /// On a `Tensor`: the tensor is claimed by the tensor-to-var pass and
    /// must not be element-cached
    pub const MUST_TENSOR2VAR: &str = "pass.must_tensor2var";

    /// On a `Tensor`: the tensor's alias identity handle
    pub const POINTER_ALIAS: &str = "pass.pointer_alias";
}

/// An attribute value
#[derive(Debug, Clone)]
pub enum AttrValue {
    Bool(bool),
    Alias(Rc<TensorAliasIdentity>),
}

/// Attribute map for one node. Empty for almost every node, so the storage
/// is boxed behind an `Option`.
#[derive(Debug, Clone, Default)]
pub struct Attrs(Option<Box<FxHashMap<&'static str, AttrValue>>>);

impl Attrs {
    /// Creates an empty attribute map
    pub const fn new() -> Self {
        Self(None)
    }

    /// Returns true if no attributes are set
    pub fn is_empty(&self) -> bool {
        self.0.as_ref().map_or(true, |m| m.is_empty())
    }

    /// Sets an attribute, replacing any previous value under the same key
    pub fn set(&mut self, key: &'static str, value: AttrValue) {
        self.0
            .get_or_insert_with(|| Box::new(FxHashMap::default()))
            .insert(key, value);
    }

    /// Looks up an attribute
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.as_ref().and_then(|m| m.get(key))
    }

    /// Reads a boolean attribute, returning `default` when absent or not a
    /// boolean
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(AttrValue::Bool(v)) => *v,
            _ => default,
        }
    }

    /// Reads an alias identity attribute
    pub fn get_alias(&self, key: &str) -> Option<&Rc<TensorAliasIdentity>> {
        match self.get(key) {
            Some(AttrValue::Alias(id)) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_attrs() {
        let mut attrs = Attrs::new();
        assert!(attrs.is_empty());
        assert!(!attrs.get_bool_or(attr_keys::NO_INDEX2VAR, false));
        assert!(attrs.get_bool_or(attr_keys::NO_INDEX2VAR, true));

        attrs.set(attr_keys::NO_INDEX2VAR, AttrValue::Bool(true));
        assert!(!attrs.is_empty());
        assert!(attrs.get_bool_or(attr_keys::NO_INDEX2VAR, false));
        assert!(attrs.get_alias(attr_keys::NO_INDEX2VAR).is_none());
    }
}
