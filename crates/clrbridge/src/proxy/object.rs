//! Local proxies for remote object instances.
//!
//! A proxy starts unbound (handle and class name only). The first member
//! lookup binds it to its class descriptor, fetching the template through the
//! session if no other instance of that class has done so yet. Dropping the
//! last clone, or calling [`RemoteObject::release`], sends exactly one
//! Release for the handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use crate::bridge::protocol::ObjectRef;
use crate::error::{BridgeError, Result};
use crate::proxy::template::{ClassDescriptor, short_name};
use crate::session::Session;
use crate::value::Value;

/// Attribute names that resolve on the proxy itself and never reach the wire.
pub const RESERVED: [&str; 4] = ["objectId", "classname", "session", "cache"];

/// Outcome of resolving a named attribute.
#[derive(Debug, Clone)]
pub enum Attribute {
    Id(i32),
    ClassName(Option<String>),
    Session(Session),
    /// Names of the method callables cached so far.
    Cache(Vec<String>),
    Local(Value),
    Method(BoundMethod),
    Property(Value),
}

#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<ObjectInner>,
}

pub(crate) struct ObjectInner {
    id: i32,
    classname: Option<String>,
    session: Session,
    class: OnceLock<Arc<ClassDescriptor>>,
    methods: Mutex<HashMap<String, BoundMethod>>,
    locals: Mutex<HashMap<String, Value>>,
    released: AtomicBool,
}

impl RemoteObject {
    pub(crate) fn new(session: Session, id: i32, classname: Option<String>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id,
                classname,
                session,
                class: OnceLock::new(),
                methods: Mutex::new(HashMap::new()),
                locals: Mutex::new(HashMap::new()),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectInner> {
        Arc::downgrade(&self.inner)
    }

    /// Live, unreleased proxy behind `weak`, if any.
    pub(crate) fn upgrade(weak: &Weak<ObjectInner>) -> Option<Self> {
        weak.upgrade()
            .filter(|inner| !inner.released.load(Ordering::Acquire))
            .map(|inner| Self { inner })
    }

    /// Remote handle id.
    pub fn id(&self) -> i32 {
        self.inner.id
    }

    /// Class name as reported by the remote side (possibly namespace-qualified).
    pub fn classname(&self) -> Option<&str> {
        self.inner.classname.as_deref()
    }

    /// Class name without namespace.
    pub fn class_name(&self) -> Option<&str> {
        self.classname().map(short_name)
    }

    /// Session that owns the handle.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Whether the handle has been released.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Whether the class template has been bound to this proxy.
    pub fn is_bound(&self) -> bool {
        self.inner.class.get().is_some()
    }

    /// Wire reference for this handle, used when passing it as an argument.
    pub fn handle(&self) -> Result<ObjectRef> {
        self.ensure_live()?;
        Ok(ObjectRef::new(self.inner.id, self.inner.classname.clone()))
    }

    /// Class descriptor, fetched through the session on first use.
    pub fn class(&self) -> Result<Arc<ClassDescriptor>> {
        if let Some(class) = self.inner.class.get() {
            return Ok(class.clone());
        }
        let classname = self
            .inner
            .classname
            .as_deref()
            .ok_or(BridgeError::MissingClassName(self.inner.id))?;
        let class = self.inner.session.class_for(classname)?;
        Ok(self.inner.class.get_or_init(|| class).clone())
    }

    /// Resolve `name`: reserved fields, local state, cached callables,
    /// methods, then properties.
    pub fn attr(&self, name: &str) -> Result<Attribute> {
        self.ensure_live()?;

        match name {
            "objectId" => return Ok(Attribute::Id(self.inner.id)),
            "classname" => return Ok(Attribute::ClassName(self.inner.classname.clone())),
            "session" => return Ok(Attribute::Session(self.inner.session.clone())),
            "cache" => {
                let mut names: Vec<_> = self.inner.lock_methods().keys().cloned().collect();
                names.sort();
                return Ok(Attribute::Cache(names));
            }
            _ => {}
        }

        if let Some(v) = self.inner.lock_locals().get(name) {
            return Ok(Attribute::Local(v.clone()));
        }
        if let Some(m) = self.inner.lock_methods().get(name) {
            return Ok(Attribute::Method(m.clone()));
        }

        let class = self.class()?;
        let template = class.template();
        if template.has_method(name) {
            let method = BoundMethod {
                name: name.to_owned(),
                object_id: self.inner.id,
                target: Arc::downgrade(&self.inner),
            };
            let method = self
                .inner
                .lock_methods()
                .entry(name.to_owned())
                .or_insert(method)
                .clone();
            return Ok(Attribute::Method(method));
        }
        if template.has_property(name) {
            return self
                .inner
                .session
                .get_property(self.inner.id, name)
                .map(Attribute::Property);
        }

        Err(BridgeError::UnknownMember {
            classname: template.classname.clone(),
            member: name.to_owned(),
        })
    }

    /// Callable for instance method `name`.
    pub fn method(&self, name: &str) -> Result<BoundMethod> {
        match self.attr(name)? {
            Attribute::Method(m) => Ok(m),
            _ => Err(self.not(name, true)),
        }
    }

    /// Invoke an instance method.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.method(name)?.call(args)
    }

    /// Read a property (or a reserved/local field).
    pub fn get(&self, name: &str) -> Result<Value> {
        match self.attr(name)? {
            Attribute::Id(id) => Ok(Value::from(id)),
            Attribute::ClassName(name) => Ok(Value::from(name)),
            Attribute::Local(v) | Attribute::Property(v) => Ok(v),
            Attribute::Session(_) | Attribute::Cache(_) | Attribute::Method(_) => {
                Err(self.not(name, false))
            }
        }
    }

    /// Assign a property on the remote object, or local state for any name
    /// the class does not declare as a property.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_live()?;
        if RESERVED.contains(&name) {
            return Err(BridgeError::ReadOnly(name.to_owned()));
        }

        let value = value.into();
        let is_property = match self.class() {
            Ok(class) => class.template().has_property(name),
            Err(BridgeError::MissingClassName(_)) => false,
            Err(e) => return Err(e),
        };
        if is_property {
            return self.inner.session.set_property(self.inner.id, name, &value);
        }

        self.inner.lock_locals().insert(name.to_owned(), value);
        Ok(())
    }

    /// Element `index` of an indexable remote object.
    pub fn get_indexed(&self, index: i32) -> Result<Value> {
        self.ensure_live()?;
        self.inner.session.get_indexed(self.inner.id, index)
    }

    /// Element `index` of an indexed property such as `Item`.
    pub fn get_indexed_property(&self, name: &str, index: i32) -> Result<Value> {
        self.ensure_live()?;
        self.inner
            .session
            .get_indexed_property(self.inner.id, name, index)
    }

    /// Pin the handle on the remote side.
    pub fn protect(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner.session.protect(self.inner.id)
    }

    /// Release the handle now. Other clones of this proxy become unusable.
    pub fn release(self) -> Result<()> {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::Released(self.inner.id));
        }
        self.inner.session.unregister(self.inner.id, &self.inner);
        self.inner.session.release(self.inner.id)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(BridgeError::Released(self.inner.id));
        }
        Ok(())
    }

    fn not(&self, name: &str, want_method: bool) -> BridgeError {
        let classname = self
            .inner
            .classname
            .clone()
            .unwrap_or_else(|| "object".to_owned());
        let member = name.to_owned();
        if want_method {
            BridgeError::NotCallable { classname, member }
        } else {
            BridgeError::NotAProperty { classname, member }
        }
    }
}

impl ObjectInner {
    fn lock_methods(&self) -> MutexGuard<'_, HashMap<String, BoundMethod>> {
        self.methods.lock().unwrap_or_else(|poisoned| {
            tracing::error!(object_id = self.id, "Method cache mutex poisoned");
            poisoned.into_inner()
        })
    }

    fn lock_locals(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.locals.lock().unwrap_or_else(|poisoned| {
            tracing::error!(object_id = self.id, "Local state mutex poisoned");
            poisoned.into_inner()
        })
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.unregister(self.id, self);
        if self.session.is_closed() {
            return;
        }
        if let Err(e) = self.session.release(self.id) {
            tracing::warn!(object_id = self.id, error = %e, "Failed to release remote object");
        }
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id && self.inner.session.same_as(&other.inner.session)
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.inner.id)
            .field("classname", &self.inner.classname)
            .field("released", &self.is_released())
            .finish()
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classname = self.classname().unwrap_or("object");
        write!(f, "<{classname}: {}>", self.inner.id)
    }
}

/// Instance method callable. Holds its target weakly so that cached
/// callables do not keep the proxy alive.
#[derive(Clone)]
pub struct BoundMethod {
    name: String,
    object_id: i32,
    target: Weak<ObjectInner>,
}

impl BoundMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the method on its target, if the proxy is still alive.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let target = self
            .target
            .upgrade()
            .ok_or(BridgeError::Released(self.object_id))?;
        if target.released.load(Ordering::Acquire) {
            return Err(BridgeError::Released(self.object_id));
        }
        target.session.call(target.id, &self.name, args)
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("name", &self.name)
            .field("object_id", &self.object_id)
            .finish()
    }
}
