//! Immutable type-to-capability registries built once at startup.
//!
//! Registration errors surface from [`RegistryBuilder::build`] as a
//! [`RegistryError`] so a misconfigured process refuses to start instead of
//! failing at request time.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

/// Startup failure while building a registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The same key was registered twice.
    #[error("{registry}: {key} registered twice")]
    Duplicate {
        /// Registry name.
        registry: &'static str,
        /// Offending key.
        key: String,
    },

    /// A constructor produced no capability.
    #[error("{registry}: constructor for {key} produced no executor")]
    Missing {
        /// Registry name.
        registry: &'static str,
        /// Offending key.
        key: String,
    },

    /// Required keys have no registration.
    #[error("{registry}: no executor registered for {}", keys.join(", "))]
    Incomplete {
        /// Registry name.
        registry: &'static str,
        /// Keys without a registration.
        keys: Vec<String>,
    },
}

/// Collects registrations and validates them in [`Self::build`].
pub struct RegistryBuilder<K, V: ?Sized> {
    name: &'static str,
    entries: Vec<(K, Option<Arc<V>>)>,
    required: Vec<K>,
}

impl<K, V> RegistryBuilder<K, V>
where
    K: Eq + Hash + Copy + fmt::Display,
    V: ?Sized,
{
    /// Starts an empty registry called `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Registers `value` for `key`.
    #[must_use]
    pub fn register(mut self, key: K, value: Arc<V>) -> Self {
        self.entries.push((key, Some(value)));
        self
    }

    /// Registers whatever `constructor` produces for `key`; producing
    /// nothing is a startup error.
    #[must_use]
    pub fn register_with(mut self, key: K, constructor: impl FnOnce() -> Option<Arc<V>>) -> Self {
        self.entries.push((key, constructor()));
        self
    }

    /// Requires every key in `keys` to be registered.
    #[must_use]
    pub fn require_all(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.required.extend(keys);
        self
    }

    /// Validates the registrations and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] for a key registered twice,
    /// [`RegistryError::Missing`] for an empty registration, and
    /// [`RegistryError::Incomplete`] when required keys are absent.
    pub fn build(self) -> Result<Registry<K, V>, RegistryError> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            let Some(capability) = value else {
                return Err(RegistryError::Missing {
                    registry: self.name,
                    key: key.to_string(),
                });
            };
            if entries.insert(key, capability).is_some() {
                return Err(RegistryError::Duplicate {
                    registry: self.name,
                    key: key.to_string(),
                });
            }
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| !entries.contains_key(*key))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::Incomplete {
                registry: self.name,
                keys: missing,
            });
        }

        Ok(Registry {
            name: self.name,
            entries,
        })
    }
}

/// Frozen mapping from key to capability.
pub struct Registry<K, V: ?Sized> {
    name: &'static str,
    entries: HashMap<K, Arc<V>>,
}

impl<K, V: ?Sized> Clone for Registry<K, V>
where
    K: Clone,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: ?Sized,
{
    /// Returns the capability registered for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).cloned()
    }

    /// Returns `true` when `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the registry name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::{RegistryBuilder, RegistryError};
    use rstest::rstest;
    use std::sync::Arc;

    type Builder = RegistryBuilder<u8, str>;

    #[rstest]
    fn registered_values_are_returned() {
        let registry = Builder::new("test")
            .register(1, Arc::from("one"))
            .build()
            .expect("registry should build");
        assert_eq!(registry.get(&1).as_deref(), Some("one"));
        assert!(registry.get(&2).is_none());
    }

    #[rstest]
    fn duplicate_registration_fails_the_build() {
        let outcome = Builder::new("test")
            .register(1, Arc::from("one"))
            .register(1, Arc::from("uno"))
            .build();
        assert!(matches!(outcome, Err(RegistryError::Duplicate { .. })));
    }

    #[rstest]
    fn empty_constructor_fails_the_build() {
        let outcome = Builder::new("test").register_with(3, || None).build();
        assert!(matches!(
            outcome,
            Err(RegistryError::Missing { key, .. }) if key == "3"
        ));
    }

    #[rstest]
    fn missing_required_keys_are_listed() {
        let outcome = Builder::new("test")
            .register(1, Arc::from("one"))
            .require_all([1, 2, 3])
            .build();
        assert!(matches!(
            outcome,
            Err(RegistryError::Incomplete { keys, .. }) if keys == ["2", "3"]
        ));
    }
}
