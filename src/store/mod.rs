//! Runtime store tree: locked access, transactions and the structure pass.
//!
//! # Responsibilities
//! - Wrap config objects in [`Store`] handles that form a tree
//! - Give the root the tree's reader-writer lock and change signal
//! - Serialize and deserialize through the cached schema of the stored type
//! - Run `Changed()` once per completed outermost transaction
//!
//! # Design Decisions
//! - Children keep a weak link to their parent and resolve the root by
//!   walking up, so relinking a subtree never touches its descendants
//! - The per-node `RwLock` only guards memory; ordering between threads is
//!   decided by the root lock

mod codec;
mod lock;
mod nested;
mod signal;
mod transaction;

pub use codec::{DeserializeReport, MemberIssue, StructureError};
pub use nested::{InlineConverter, NestedConverter};
pub use signal::{ChangeSignal, SignalHub};
pub use transaction::{ChangeTransaction, RootState};

pub(crate) use codec::{attach_members, deserialize_members, serialize_members};

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::config::{ConfigStore, FormatProvider, ProviderError};
use crate::convert::{ConverterRef, Convertible, Owner};
use crate::schema::{Configurable, Schema, SchemaCache};
use crate::value::Value;

/// Upward link of a store node.
pub trait StoreLink: Send + Sync {
    /// The concurrency state of the tree this node belongs to, if any.
    fn root_state(&self) -> Option<Arc<RootState>>;

    /// Runs the stored object's `Changed()` hook.
    fn notify_changed(&self);
}

enum Link {
    Root {
        state: Arc<RootState>,
        schemas: Arc<SchemaCache>,
    },
    Child {
        parent: Weak<dyn StoreLink>,
        schemas: Arc<SchemaCache>,
    },
    Detached,
}

struct Node<T> {
    data: RwLock<T>,
    link: RwLock<Link>,
}

impl<T> Node<T> {
    fn data(&self) -> RwLockReadGuard<'_, T> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn data_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn link(&self) -> RwLockReadGuard<'_, Link> {
        self.link.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Configurable> StoreLink for Node<T> {
    fn root_state(&self) -> Option<Arc<RootState>> {
        let parent = match &*self.link() {
            Link::Root { state, .. } => return Some(Arc::clone(state)),
            Link::Child { parent, .. } => parent.upgrade(),
            Link::Detached => None,
        };
        parent?.root_state()
    }

    fn notify_changed(&self) {
        self.data().changed();
    }
}

fn fallback_schemas() -> Arc<SchemaCache> {
    static FALLBACK: OnceLock<Arc<SchemaCache>> = OnceLock::new();
    Arc::clone(FALLBACK.get_or_init(|| Arc::new(SchemaCache::default())))
}

/// Handle to a stored config object.
///
/// Clones share the same node. A store is either the root of a tree (created
/// with [`Store::new_root`]), a child linked under another store, or detached.
pub struct Store<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T: Configurable> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Configurable + fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|data| f.debug_tuple("Store").field(data).finish())
    }
}

impl<T: Configurable> Store<T> {
    /// A detached store.
    pub fn new(value: T) -> Self {
        let store = Self::with_link(value, Link::Detached);
        store.attach_children();
        store
    }

    /// The root of a new store tree.
    pub fn new_root(value: T, schemas: Arc<SchemaCache>) -> Self {
        let state = Arc::new(RootState::new());
        let store = Self::with_link(
            value,
            Link::Root {
                state: Arc::clone(&state),
                schemas,
            },
        );
        let weak: Weak<Node<T>> = Arc::downgrade(&store.node);
        state.bind(weak);
        store.attach_children();
        store
    }

    fn with_link(value: T, link: Link) -> Self {
        Self {
            node: Arc::new(Node {
                data: RwLock::new(value),
                link: RwLock::new(link),
            }),
        }
    }

    fn schemas(&self) -> Arc<SchemaCache> {
        match &*self.node.link() {
            Link::Root { schemas, .. } | Link::Child { schemas, .. } => Arc::clone(schemas),
            Link::Detached => fallback_schemas(),
        }
    }

    pub fn schema(&self) -> Arc<Schema<T>> {
        self.schemas().get::<T>()
    }

    /// The owner passed to converters of this store's members.
    fn owner(&self) -> Owner {
        let weak: Weak<Node<T>> = Arc::downgrade(&self.node);
        Owner::new(weak, self.schemas())
    }

    fn root_state(&self) -> Option<Arc<RootState>> {
        self.node.root_state()
    }

    fn attach_children(&self) {
        let schema = self.schema();
        let owner = self.owner();
        let mut data = self.node.data_mut();
        attach_members(&schema, &mut *data, &owner);
    }

    /// Links this store under `owner`'s store. Roots are never relinked.
    pub(crate) fn link_to(&self, owner: &Owner) {
        let self_ptr = Arc::as_ptr(&self.node) as *const ();
        {
            let mut link = self.node.link.write().unwrap_or_else(PoisonError::into_inner);
            if matches!(*link, Link::Root { .. }) {
                tracing::warn!(
                    config_type = std::any::type_name::<T>(),
                    "Root store used as a member of another store, not relinked"
                );
                return;
            }
            *link = match owner.parent() {
                Some(parent) if Weak::as_ptr(parent) as *const () != self_ptr => Link::Child {
                    parent: Weak::clone(parent),
                    schemas: Arc::clone(owner.schemas()),
                },
                _ => Link::Detached,
            };
        }
        self.attach_children();
    }

    /// Runs `f` under the tree's read lock.
    ///
    /// The lock does not upgrade: `f` must not call [`write`](Self::write) or
    /// [`transaction`](Self::transaction) on any store of the same tree.
    ///
    /// # Panics
    /// If `f` opens a transaction on this tree.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let root = self.root_state();
        let _guard = root.as_ref().map(|state| state.lock.read());
        let data = self.node.data();
        f(&data)
    }

    /// Runs `f` inside a change transaction.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let tx = self.transaction();
        let result = {
            let mut data = self.node.data_mut();
            let result = f(&mut data);
            attach_members(&self.schema(), &mut *data, &self.owner());
            result
        };
        drop(tx);
        result
    }

    /// Opens a change transaction on this store's tree.
    pub fn transaction(&self) -> ChangeTransaction {
        ChangeTransaction::begin(self.root_state())
    }

    /// Snapshot of the stored object as a Map in schema order.
    pub fn serialize(&self) -> Value {
        let schema = self.schema();
        let owner = self.owner();
        self.read(|data| serialize_members(&schema, data, &owner))
    }

    /// Merges `value` into the stored object under one transaction.
    pub fn deserialize(&self, value: &Value) -> Result<DeserializeReport, StructureError> {
        let schema = self.schema();
        let owner = self.owner();
        let _tx = self.transaction();
        let mut data = self.node.data_mut();
        let report = deserialize_members(&schema, &mut *data, value, &owner)?;
        attach_members(&schema, &mut *data, &owner);
        Ok(report)
    }

    /// Copies every member of `source` into this store in one transaction.
    pub fn copy_from(&self, source: &T) -> DeserializeReport {
        let schema = self.schema();
        let owner = Owner::detached(self.schemas());
        let snapshot = serialize_members(&schema, source, &owner);
        match self.deserialize(&snapshot) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Copy produced a non-Map document");
                DeserializeReport::default()
            }
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(*self.node.link(), Link::Root { .. })
    }

    /// Whether the store belongs to a tree with a root.
    pub fn is_attached(&self) -> bool {
        self.root_state().is_some()
    }

    /// Times the tree's write lock has been taken.
    pub fn lock_cycles(&self) -> usize {
        self.root_state().map_or(0, |state| state.lock_cycles())
    }

    pub fn change_signal(&self) -> Option<Arc<ChangeSignal>> {
        self.root_state().map(|state| Arc::clone(state.signal()))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    fn reload_hook(&self) {
        self.node.data_mut().on_reload();
    }
}

impl<T: Configurable + Clone> Store<T> {
    /// A clone of the stored object.
    pub fn get(&self) -> T {
        self.read(T::clone)
    }
}

impl<U: Configurable> Convertible for Store<U> {
    const NESTED: bool = true;

    fn default_converter() -> ConverterRef<Self> {
        Arc::new(NestedConverter::<U>::new())
    }

    fn attach(&mut self, owner: &Owner) {
        self.link_to(owner);
    }
}

impl<T: Configurable> ConfigStore for Store<T> {
    fn read_from(&self, provider: &dyn FormatProvider, path: &Path) {
        tracing::debug!(
            config_type = std::any::type_name::<T>(),
            path = %path.display(),
            "Reading config"
        );
        let loaded = provider.load(path);

        let tx = self.transaction();
        if loaded.is_null() {
            tracing::debug!(path = %path.display(), "No document, keeping current values");
        } else {
            match self.deserialize(&loaded) {
                Ok(report) if !report.is_clean() => tracing::debug!(
                    path = %path.display(),
                    applied = report.applied,
                    skipped = report.issues.len(),
                    "Config loaded with skipped members"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Config document ignored"),
            }
        }
        self.reload_hook();

        if self.serialize() == loaded {
            tx.skip_save_signal();
        }
        drop(tx);
    }

    fn write_to(&self, provider: &dyn FormatProvider, path: &Path) -> Result<(), ProviderError> {
        tracing::debug!(
            config_type = std::any::type_name::<T>(),
            path = %path.display(),
            "Writing config"
        );
        let value = self.serialize();
        provider.store(&value, path)
    }

    fn change_signal(&self) -> Option<Arc<ChangeSignal>> {
        Store::change_signal(self)
    }

    fn is_root(&self) -> bool {
        Store::is_root(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
