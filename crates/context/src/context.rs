//! Persistent key/value context
//!
//! A [`Context`] is an immutable chain of bindings. Deriving a child with
//! [`Context::with_value`] pushes one node in front of the parent chain, so
//! creating a child is O(1) and never copies the parent's entries. Lookups
//! walk from the newest binding to the oldest; the first node for a key wins,
//! which is how a child overlays (or, with [`Context::without`], hides) a
//! parent binding.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Typed key under which a value is stored in a [`Context`]
///
/// Keys are identified by their name and value type, so two keys declared
/// with the same name but different types never collide.
///
/// ```
/// use acimem_context::{Context, ContextKey};
///
/// static REQUEST_ID: ContextKey<u64> = ContextKey::new("request_id");
///
/// let ctx = Context::root().with_value(&REQUEST_ID, 7);
/// assert_eq!(ctx.get(&REQUEST_ID), Some(&7));
/// ```
pub struct ContextKey<T: 'static> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ContextKey<T> {
    /// Declare a key
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Name the key was declared with
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn id(&self) -> KeyId {
        KeyId {
            name: self.name,
            type_id: TypeId::of::<T>(),
        }
    }
}

impl<T: 'static> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyId {
    name: &'static str,
    type_id: TypeId,
}

struct Node {
    // None marks a fork, which no key matches
    key: Option<KeyId>,
    // None hides any binding further up the chain
    value: Option<Rc<dyn Any>>,
    parent: Option<Rc<Node>>,
}

/// Immutable, structurally inherited key/value environment
///
/// Cloning a context is cheap (one `Rc` increment). Two clones of the same
/// context compare equal under [`Context::ptr_eq`].
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Rc<Node>>,
}

impl Context {
    /// The empty context every chain starts from
    pub fn root() -> Self {
        Self::default()
    }

    /// Derive a child context binding `key` to `value`
    pub fn with_value<T: 'static>(&self, key: &ContextKey<T>, value: T) -> Context {
        self.push(Some(key.id()), Some(Rc::new(value)))
    }

    /// Derive a child context in which `key` is unset
    pub fn without<T: 'static>(&self, key: &ContextKey<T>) -> Context {
        self.push(Some(key.id()), None)
    }

    /// Derive a child context with no new bindings
    ///
    /// The child is a distinct scope (`ptr_eq` is false) that sees exactly
    /// what its parent sees.
    pub fn fork(&self) -> Context {
        self.push(None, None)
    }

    fn push(&self, key: Option<KeyId>, value: Option<Rc<dyn Any>>) -> Context {
        Context {
            head: Some(Rc::new(Node {
                key,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up `key`, falling through to the parent chain
    pub fn get<T: 'static>(&self, key: &ContextKey<T>) -> Option<&T> {
        let id = Some(key.id());
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if n.key == id {
                return n.value.as_ref().and_then(|v| v.downcast_ref::<T>());
            }
            node = n.parent.as_deref();
        }
        None
    }

    /// True if `key` resolves to a value
    pub fn contains<T: 'static>(&self, key: &ContextKey<T>) -> bool {
        self.get(key).is_some()
    }

    /// True if both handles refer to the same context
    pub fn ptr_eq(&self, other: &Context) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// True for the empty root context
    pub fn is_root(&self) -> bool {
        self.head.is_none()
    }

    /// Number of nodes between this context and the root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            depth += 1;
            node = n.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if let Some(key) = n.key {
                keys.push(key.name);
            }
            node = n.parent.as_deref();
        }
        f.debug_struct("Context")
            .field("depth", &self.depth())
            .field("keys", &keys)
            .finish()
    }
}
