//! Changesets: ordered batches of pending key writes.
//!
//! A changeset starts out mutable. Once sealed it is frozen and knows the
//! longest common prefix of its keys, which is what lets a backend emit the
//! smallest possible change notification after applying it.
//!
//! ```
//! use confstore_core::Changeset;
//! use confstore_codec::Value;
//!
//! let mut changeset = Changeset::new();
//! changeset.set("/app/window/width", Value::Integer(800)).unwrap();
//! changeset.set("/app/window/height", Value::Integer(600)).unwrap();
//! changeset.reset("/app/theme").unwrap();
//!
//! let description = changeset.describe();
//! assert_eq!(description.prefix, "/app/");
//! assert_eq!(description.items, ["window/width", "window/height", "theme"]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use confstore_codec::Value;

use crate::error::{CoreError, CoreResult};
use crate::types::WriteTree;
use crate::validation::ensure_key;

/// Frozen state computed when a changeset is sealed.
#[derive(Debug, Clone)]
struct Sealed {
    prefix: String,
}

/// An ordered batch of pending writes and resets.
///
/// Keys are unique; writing a key twice keeps its original position and
/// replaces the value. Entries are iterated in insertion order, which also
/// fixes the order of the relative items reported by [`Changeset::describe`].
///
/// Sealing happens through a shared reference so that a changeset held in
/// an `Arc` (for example on a [`crate::ReadOverlay`]) can still be sealed
/// and described.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    entries: Vec<(String, Option<Value>)>,
    index: HashMap<String, usize>,
    sealed: OnceLock<Sealed>,
}

/// The minimal description of a sealed changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description<'a> {
    /// Common prefix of every key. For a single entry this is the key
    /// itself; for several entries it is a path.
    pub prefix: &'a str,
    /// Each key relative to `prefix`, in insertion order.
    pub items: Vec<&'a str>,
}

impl Description<'_> {
    /// Number of entries described.
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }
}

impl Changeset {
    /// Creates an empty, unsealed changeset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unsealed changeset holding one write (or reset, when
    /// `value` is `None`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if `key` is malformed.
    pub fn new_write(key: impl Into<String>, value: Option<Value>) -> CoreResult<Self> {
        let mut changeset = Self::new();
        changeset.insert(key, value)?;
        Ok(changeset)
    }

    /// Builds an unsealed changeset from a flattened write tree.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] for the first malformed key.
    pub fn from_tree(tree: &WriteTree) -> CoreResult<Self> {
        let mut changeset = Self::new();
        for (key, value) in tree {
            changeset.insert(key.as_str(), value.clone())?;
        }
        Ok(changeset)
    }

    /// Builds the changeset that turns `from` into `to`.
    ///
    /// Keys only in `from` become resets; keys that are new or whose value
    /// differs become writes. Unchanged keys are left out.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] for the first malformed key.
    pub fn diff(from: &BTreeMap<String, Value>, to: &BTreeMap<String, Value>) -> CoreResult<Self> {
        let mut changeset = Self::new();
        for key in from.keys() {
            if !to.contains_key(key) {
                changeset.insert(key.as_str(), None)?;
            }
        }
        for (key, value) in to {
            if from.get(key) != Some(value) {
                changeset.insert(key.as_str(), Some(value.clone()))?;
            }
        }
        Ok(changeset)
    }

    /// Records a write, or a reset when `value` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChangesetSealed`] once the changeset has been
    /// sealed, and [`CoreError::InvalidKey`] if `key` is malformed.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<Value>) -> CoreResult<()> {
        self.ensure_unsealed()?;
        let key = key.into();
        ensure_key(&key)?;

        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    /// Records a write of `value` to `key`.
    ///
    /// # Errors
    ///
    /// See [`Changeset::insert`].
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> CoreResult<()> {
        self.insert(key, Some(value))
    }

    /// Records a reset of `key` to its default.
    ///
    /// # Errors
    ///
    /// See [`Changeset::insert`].
    pub fn reset(&mut self, key: impl Into<String>) -> CoreResult<()> {
        self.insert(key, None)
    }

    /// Seals the changeset. Sealing twice is a no-op.
    pub fn seal(&self) {
        self.sealed();
    }

    /// Returns true once the changeset has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    /// Describes the changeset as a common prefix plus relative items.
    ///
    /// Seals the changeset if it is not sealed yet. Concatenating the prefix
    /// with each item reproduces the original keys in insertion order.
    #[must_use]
    pub fn describe(&self) -> Description<'_> {
        let prefix = self.sealed().prefix.as_str();
        let items = self
            .entries
            .iter()
            .map(|(key, _)| &key[prefix.len()..])
            .collect();
        Description { prefix, items }
    }

    /// Looks up `key`.
    ///
    /// Returns `None` if the changeset does not mention the key,
    /// `Some(None)` if it resets the key and `Some(Some(value))` if it writes
    /// a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Option<&Value>> {
        self.index
            .get(key)
            .map(|&pos| self.entries[pos].1.as_ref())
    }

    /// Hands every entry to `sink` in insertion order.
    ///
    /// Stops early and returns false as soon as `sink` returns false.
    pub fn apply_all_to<F>(&self, mut sink: F) -> bool
    where
        F: FnMut(&str, Option<&Value>) -> bool,
    {
        self.entries
            .iter()
            .all(|(key, value)| sink(key, value.as_ref()))
    }

    /// Flattens the changeset into a write tree.
    #[must_use]
    pub fn to_tree(&self) -> WriteTree {
        let mut tree = WriteTree::new();
        self.apply_all_to(|key, value| {
            tree.insert(key.to_string(), value.cloned());
            true
        });
        tree
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the changeset has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sealed(&self) -> &Sealed {
        self.sealed.get_or_init(|| Sealed {
            prefix: common_prefix(&self.entries),
        })
    }

    fn ensure_unsealed(&self) -> CoreResult<()> {
        if self.is_sealed() {
            Err(CoreError::ChangesetSealed)
        } else {
            Ok(())
        }
    }
}

/// Longest common prefix of the entry keys.
///
/// One key is its own prefix. Several keys share the longest common
/// prefix cut back to its last '/', so the result is always a path.
fn common_prefix(entries: &[(String, Option<Value>)]) -> String {
    let Some((first, _)) = entries.first() else {
        return "/".to_string();
    };
    if entries.len() == 1 {
        return first.clone();
    }

    let first_bytes = first.as_bytes();
    let mut len = first_bytes.len();
    for (key, _) in &entries[1..] {
        len = first_bytes[..len]
            .iter()
            .zip(key.as_bytes())
            .take_while(|(a, b)| a == b)
            .count();
    }

    // every key starts with '/', so there is always one to cut back to
    let cut = first_bytes[..len]
        .iter()
        .rposition(|&b| b == b'/')
        .unwrap_or(0);
    first[..=cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_write_describes_as_key() {
        let changeset = Changeset::new_write("/a/b", Some(Value::Integer(1))).unwrap();
        let description = changeset.describe();

        assert_eq!(description.prefix, "/a/b");
        assert_eq!(description.items, [""]);
        assert_eq!(description.count(), 1);
    }

    #[test]
    fn siblings_share_parent_path() {
        let mut changeset = Changeset::new();
        changeset.set("/a/b", Value::Integer(1)).unwrap();
        changeset.set("/a/c", Value::Integer(2)).unwrap();

        let description = changeset.describe();
        assert_eq!(description.prefix, "/a/");
        assert_eq!(description.items, ["b", "c"]);
    }

    #[test]
    fn partial_component_match_cuts_back_to_slash() {
        let mut changeset = Changeset::new();
        changeset.set("/apple", Value::Bool(true)).unwrap();
        changeset.set("/apricot", Value::Bool(false)).unwrap();

        let description = changeset.describe();
        assert_eq!(description.prefix, "/");
        assert_eq!(description.items, ["apple", "apricot"]);
    }

    #[test]
    fn nested_key_under_sibling_key() {
        let mut changeset = Changeset::new();
        changeset.set("/a/b", Value::Integer(1)).unwrap();
        changeset.set("/a/b/c", Value::Integer(2)).unwrap();

        let description = changeset.describe();
        assert_eq!(description.prefix, "/a/");
        assert_eq!(description.items, ["b", "b/c"]);
    }

    #[test]
    fn empty_changeset_describes_nothing() {
        let changeset = Changeset::new();
        let description = changeset.describe();
        assert_eq!(description.prefix, "/");
        assert_eq!(description.count(), 0);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut changeset = Changeset::new();
        changeset.set("/x/one", Value::Integer(1)).unwrap();
        changeset.set("/x/two", Value::Integer(2)).unwrap();
        changeset.set("/x/one", Value::Integer(3)).unwrap();

        assert_eq!(changeset.len(), 2);
        assert_eq!(changeset.describe().items, ["one", "two"]);
        assert_eq!(changeset.get("/x/one"), Some(Some(&Value::Integer(3))));
    }

    #[test]
    fn reset_is_distinguishable_from_missing() {
        let mut changeset = Changeset::new();
        changeset.reset("/a").unwrap();

        assert_eq!(changeset.get("/a"), Some(None));
        assert_eq!(changeset.get("/b"), None);
    }

    #[test]
    fn insert_after_seal_fails() {
        let mut changeset = Changeset::new_write("/a", Some(Value::Bool(true))).unwrap();
        changeset.seal();

        let err = changeset.set("/b", Value::Bool(false)).unwrap_err();
        assert!(matches!(err, CoreError::ChangesetSealed));
        assert_eq!(changeset.len(), 1);
    }

    #[test]
    fn describe_seals_implicitly() {
        let mut changeset = Changeset::new();
        changeset.set("/a", Value::Integer(1)).unwrap();
        assert!(!changeset.is_sealed());

        let _ = changeset.describe();
        assert!(changeset.is_sealed());
        assert!(changeset.reset("/a").is_err());
    }

    #[test]
    fn sealing_is_idempotent() {
        let mut changeset = Changeset::new();
        changeset.set("/a/x", Value::Integer(1)).unwrap();
        changeset.set("/a/y", Value::Integer(2)).unwrap();

        changeset.seal();
        let first = changeset.describe().prefix.to_string();
        changeset.seal();
        assert_eq!(changeset.describe().prefix, first);
    }

    #[test]
    fn invalid_key_rejected() {
        let mut changeset = Changeset::new();
        for bad in ["", "a", "/a/", "/a//b"] {
            assert!(matches!(
                changeset.set(bad, Value::Integer(0)),
                Err(CoreError::InvalidKey { .. })
            ));
        }
        assert!(changeset.is_empty());
    }

    #[test]
    fn apply_all_visits_in_order_and_stops_early() {
        let mut changeset = Changeset::new();
        changeset.set("/c", Value::Integer(1)).unwrap();
        changeset.reset("/a").unwrap();
        changeset.set("/b", Value::Integer(2)).unwrap();

        let mut seen = Vec::new();
        assert!(changeset.apply_all_to(|key, value| {
            seen.push((key.to_string(), value.cloned()));
            true
        }));
        assert_eq!(
            seen,
            vec![
                ("/c".to_string(), Some(Value::Integer(1))),
                ("/a".to_string(), None),
                ("/b".to_string(), Some(Value::Integer(2))),
            ]
        );

        let mut calls = 0;
        assert!(!changeset.apply_all_to(|_, _| {
            calls += 1;
            false
        }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn tree_round_trip() {
        let mut changeset = Changeset::new();
        changeset.set("/b", Value::Integer(2)).unwrap();
        changeset.reset("/a").unwrap();

        let tree = changeset.to_tree();
        assert_eq!(tree.keys().collect::<Vec<_>>(), ["/a", "/b"]);

        let rebuilt = Changeset::from_tree(&tree).unwrap();
        assert_eq!(rebuilt.get("/a"), Some(None));
        assert_eq!(rebuilt.get("/b"), Some(Some(&Value::Integer(2))));
    }

    #[test]
    fn diff_between_snapshots() {
        let mut from = BTreeMap::new();
        from.insert("/keep".to_string(), Value::Integer(1));
        from.insert("/gone".to_string(), Value::Integer(2));
        from.insert("/edit".to_string(), Value::Integer(3));

        let mut to = BTreeMap::new();
        to.insert("/keep".to_string(), Value::Integer(1));
        to.insert("/edit".to_string(), Value::Integer(30));
        to.insert("/new".to_string(), Value::Integer(4));

        let changeset = Changeset::diff(&from, &to).unwrap();
        assert_eq!(changeset.len(), 3);
        assert_eq!(changeset.get("/gone"), Some(None));
        assert_eq!(changeset.get("/edit"), Some(Some(&Value::Integer(30))));
        assert_eq!(changeset.get("/new"), Some(Some(&Value::Integer(4))));
        assert_eq!(changeset.get("/keep"), None);
    }

    mod model {
        use super::*;
        use crate::validation::{is_key, is_path};
        use proptest::prelude::*;

        fn key() -> impl Strategy<Value = String> {
            prop::collection::vec(prop::sample::select(vec!["a", "b", "ab", "c"]), 1..4)
                .prop_map(|parts| format!("/{}", parts.join("/")))
        }

        fn snapshot() -> impl Strategy<Value = BTreeMap<String, Value>> {
            prop::collection::btree_map(key(), (0i64..3).prop_map(Value::Integer), 0..8)
        }

        proptest! {
            #[test]
            fn prefix_and_items_rebuild_keys(keys in prop::collection::vec(key(), 1..10)) {
                let mut changeset = Changeset::new();
                for key in &keys {
                    changeset.set(key.as_str(), Value::Bool(true)).unwrap();
                }
                let description = changeset.describe();

                if changeset.len() == 1 {
                    prop_assert!(is_key(description.prefix));
                } else {
                    prop_assert!(is_path(description.prefix));
                }
                let rebuilt: Vec<String> = description
                    .items
                    .iter()
                    .map(|item| format!("{}{}", description.prefix, item))
                    .collect();
                let stored: Vec<String> = changeset.iter().map(|(key, _)| key.to_string()).collect();
                prop_assert_eq!(rebuilt, stored);
            }

            #[test]
            fn diff_turns_one_snapshot_into_the_other(from in snapshot(), to in snapshot()) {
                let changeset = Changeset::diff(&from, &to).unwrap();

                let mut patched = from.clone();
                changeset.apply_all_to(|key, value| {
                    match value {
                        Some(value) => patched.insert(key.to_string(), value.clone()),
                        None => patched.remove(key),
                    };
                    true
                });
                prop_assert_eq!(patched, to);
            }
        }
    }
}
