//! Process-wide dependency registry.
//!
//! Generated wiring code registers every provider singleton and group member
//! here while the process starts up; application code retrieves them
//! afterwards with [`provide`] and [`members`]. Writes only happen inside
//! `#[wirebox::ctor]` initializers, reads only after `main` begins, so the
//! store is effectively frozen once the process is running.
//!
//! The free functions operate on one global [`Registry`]. Tests that need an
//! isolated store can construct their own `Registry` instead.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use thiserror::Error as ThisError;
use tracing::debug;

// Generated initializers are attributed `#[wirebox::ctor]`, so crates that
// consume generated code only ever depend on `wirebox` itself.
pub use ctor::ctor;

/// A registered object, type-erased for storage.
///
/// Callers recover the static type with `downcast_ref::<T>()` and clone the
/// result out; generated code does exactly that.
pub type Object = Arc<dyn Any + Send + Sync>;

///
/// Error
///

#[derive(Debug, ThisError, Eq, PartialEq)]
pub enum Error {
    #[error("object not found: {id}")]
    NotFound { id: String },

    #[error("group not found: {id}")]
    GroupNotFound { id: String },
}

///
/// Registry
/// Singleton store keyed by provider id plus append-only group lists.
///

#[derive(Default)]
pub struct Registry {
    singletons: RwLock<HashMap<String, Object>>,
    groups: RwLock<HashMap<String, Vec<Object>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or overwrites) the singleton registered under `id`.
    pub fn register_singleton<T>(&self, id: impl Into<String>, object: T)
    where
        T: Any + Send + Sync,
    {
        let id = id.into();
        debug!(id = %id, "registered singleton");
        self.singletons
            .write()
            .expect("registry lock poisoned while registering singleton")
            .insert(id, Arc::new(object));
    }

    /// Appends `object` to the group registered under `group_id`, creating
    /// the group on first use.
    pub fn register_member<T>(&self, group_id: impl Into<String>, object: T)
    where
        T: Any + Send + Sync,
    {
        let group_id = group_id.into();
        debug!(group = %group_id, "registered group member");
        self.groups
            .write()
            .expect("registry lock poisoned while registering member")
            .entry(group_id)
            .or_default()
            .push(Arc::new(object));
    }

    /// Returns the singleton registered under `id`.
    pub fn provide(&self, id: &str) -> Result<Object, Error> {
        self.singletons
            .read()
            .expect("registry lock poisoned while providing singleton")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    /// Returns the members of the group registered under `group_id`, in
    /// registration order.
    pub fn members(&self, group_id: &str) -> Result<Vec<Object>, Error> {
        self.groups
            .read()
            .expect("registry lock poisoned while listing members")
            .get(group_id)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound {
                id: group_id.to_string(),
            })
    }
}

///
/// GLOBAL
/// The process-wide instance generated code writes into. Created at first
/// touch, never torn down.
///

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registers a singleton with the global registry. See
/// [`Registry::register_singleton`].
pub fn register_singleton<T>(id: impl Into<String>, object: T)
where
    T: Any + Send + Sync,
{
    REGISTRY.register_singleton(id, object);
}

/// Appends a group member to the global registry. See
/// [`Registry::register_member`].
pub fn register_member<T>(group_id: impl Into<String>, object: T)
where
    T: Any + Send + Sync,
{
    REGISTRY.register_member(group_id, object);
}

/// Returns a singleton from the global registry.
pub fn provide(id: &str) -> Result<Object, Error> {
    REGISTRY.provide(id)
}

/// Returns a group's members from the global registry.
pub fn members(group_id: &str) -> Result<Vec<Object>, Error> {
    REGISTRY.members(group_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Db {
        url: String,
    }

    #[test]
    fn singleton_roundtrip() {
        let registry = Registry::new();
        registry.register_singleton("main.db.url", "mysql:192.168.1.1:3306".to_string());

        let obj = registry.provide("main.db.url").unwrap();
        let url = obj.downcast_ref::<String>().unwrap();
        assert_eq!(url, "mysql:192.168.1.1:3306");
    }

    #[test]
    fn singleton_overwrite_keeps_latest() {
        let registry = Registry::new();
        registry.register_singleton("id", 1_i32);
        registry.register_singleton("id", 2_i32);

        let obj = registry.provide("id").unwrap();
        assert_eq!(*obj.downcast_ref::<i32>().unwrap(), 2);
    }

    #[test]
    fn missing_singleton_errors() {
        let registry = Registry::new();
        let err = registry.provide("nope").err().expect("lookup must fail");
        assert_eq!(
            err,
            Error::NotFound {
                id: "nope".to_string()
            }
        );
        assert_eq!(err.to_string(), "object not found: nope");
    }

    #[test]
    fn members_preserve_registration_order() {
        let registry = Registry::new();
        registry.register_member("strings", "first".to_string());
        registry.register_member("strings", "second".to_string());

        let members = registry.members("strings").unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].downcast_ref::<String>().unwrap(), "first");
        assert_eq!(members[1].downcast_ref::<String>().unwrap(), "second");
    }

    #[test]
    fn missing_group_errors() {
        let registry = Registry::new();
        let err = registry.members("nope").err().expect("lookup must fail");
        assert_eq!(
            err,
            Error::GroupNotFound {
                id: "nope".to_string()
            }
        );
        assert_eq!(err.to_string(), "group not found: nope");
    }

    #[test]
    fn shared_handles_downcast_back() {
        // Providers that hand out shared objects register `Arc<T>` values;
        // consumers recover the same allocation.
        let registry = Registry::new();
        let db = Arc::new(Db {
            url: "mysql:localhost".to_string(),
        });
        registry.register_singleton("main.db", Arc::clone(&db));

        let obj = registry.provide("main.db").unwrap();
        let handle = obj.downcast_ref::<Arc<Db>>().unwrap().clone();
        assert_eq!(handle.url, "mysql:localhost");
        assert!(Arc::ptr_eq(&db, &handle));
    }

    #[test]
    fn global_facade_delegates() {
        register_singleton("tests.facade", 28_i32);
        let obj = provide("tests.facade").unwrap();
        assert_eq!(*obj.downcast_ref::<i32>().unwrap(), 28);
    }
}
