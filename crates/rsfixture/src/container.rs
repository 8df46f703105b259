//! Resolution container. Holds the fixture table shared by every test and the
//! short-lived [`Scope`] that resolves values for a single test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::provider::{Provider, TypeKey, Value};
use crate::Guard;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// FixtureTable
// ============================================================================

/// Registered fixture providers, indexed by the type they produce.
///
/// When two providers produce the same type the later registration shadows
/// the earlier one.
#[derive(Clone, Default)]
pub struct FixtureTable {
    providers: Vec<Arc<dyn Provider>>,
    by_type: HashMap<TypeKey, usize>,
}

impl FixtureTable {
    pub fn new() -> Self {
        FixtureTable::default()
    }

    /// Add a provider. Providers of the test handle type are rejected.
    pub fn insert(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        let result = provider.result_type();
        if result == TypeKey::of::<Handle>() {
            return Err(Error::HandleFixture {
                fixture: provider.name().to_string(),
            });
        }

        if let Some(&previous) = self.by_type.get(&result) {
            tracing::debug!(
                fixture = provider.name(),
                shadowed = self.providers[previous].name(),
                result = result.name(),
                "fixture shadows an earlier provider of the same type"
            );
        }

        self.by_type.insert(result, self.providers.len());
        self.providers.push(provider);
        Ok(())
    }

    /// The provider currently responsible for `key`.
    pub fn get(&self, key: &TypeKey) -> Option<&Arc<dyn Provider>> {
        self.by_type.get(key).map(|&idx| &self.providers[idx])
    }

    /// Every registered provider, shadowed ones included, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Per-test resolution scope.
///
/// Each fixture is instantiated at most once per scope; once-fixtures are
/// memoized by their provider and only copied into the cache here. The test
/// handle is never cached, it is supplied fresh on every request.
pub struct Scope {
    fixtures: Arc<FixtureTable>,
    cache: Mutex<HashMap<TypeKey, Value>>,
    resolving: Mutex<Vec<TypeKey>>,
}

impl Scope {
    pub fn new(fixtures: Arc<FixtureTable>) -> Self {
        Scope {
            fixtures,
            cache: Mutex::new(HashMap::new()),
            resolving: Mutex::new(Vec::new()),
        }
    }

    pub fn fixtures(&self) -> &Arc<FixtureTable> {
        &self.fixtures
    }

    /// Resolve every type in `params`, in order.
    pub fn resolve_all(
        &self,
        params: &[TypeKey],
        handle: &Handle,
        required_by: &str,
    ) -> Result<Vec<Value>> {
        params
            .iter()
            .map(|key| self.resolve(*key, handle, required_by))
            .collect()
    }

    /// Resolve a single type, instantiating fixtures depth-first as needed.
    pub fn resolve(&self, key: TypeKey, handle: &Handle, required_by: &str) -> Result<Value> {
        if key == TypeKey::of::<Handle>() {
            return Ok(Arc::new(handle.clone()));
        }

        if let Some(value) = lock(&self.cache).get(&key) {
            return Ok(value.clone());
        }

        let provider = self
            .fixtures
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::MissingFixture {
                type_name: key.name().to_string(),
                required_by: required_by.to_string(),
            })?;

        if let Some(value) = provider.memoized() {
            lock(&self.cache).insert(key, value.clone());
            return Ok(value);
        }

        {
            let mut resolving = lock(&self.resolving);
            if let Some(start) = resolving.iter().position(|k| *k == key) {
                let mut path: Vec<String> = resolving[start..]
                    .iter()
                    .map(|k| k.name().to_string())
                    .collect();
                path.push(key.name().to_string());
                return Err(Error::DependencyCycle { path });
            }
            resolving.push(key);
        }
        let _pop = Guard::new(|| {
            lock(&self.resolving).pop();
        });

        tracing::trace!(fixture = provider.name(), result = key.name(), "instantiating fixture");
        let args = self.resolve_all(provider.dependencies(), handle, provider.name())?;
        let value = provider.invoke(&args)?;

        lock(&self.cache).insert(key, value.clone());
        Ok(value)
    }

    /// Whether a value for `key` has been instantiated in this scope.
    pub fn is_cached(&self, key: &TypeKey) -> bool {
        lock(&self.cache).contains_key(key)
    }

    /// Drop every cached value.
    pub fn clear(&self) {
        lock(&self.cache).clear();
    }
}
