//! Session: one channel to the bridge server plus the class-template cache.
//!
//! # Architecture
//!
//! - Every request is a blocking exchange (write, flush, read reply) done
//!   under a single per-session lock, so a session may be shared across
//!   threads without interleaving frames.
//! - Arguments are converted to messages before the lock is taken, and replies
//!   are resolved into [`Value`]s after it is released. Dropping a proxy sends
//!   a Release through the same lock, so no proxy may be created or dropped
//!   while it is held.
//! - Each remote handle has at most one live proxy per session. Replies that
//!   carry a handle already proxied return that proxy, because the server
//!   maps one object to one handle and a single Release drops the mapping.
//! - A fatal channel error (corrupt magic, unknown tag, end of stream, I/O)
//!   tears the channel down and marks the session broken. Remote exceptions
//!   leave it usable.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::bridge::protocol::Message;
use crate::channel::Channel;
use crate::config::SessionConfig;
use crate::connect;
use crate::error::{BridgeError, Result};
use crate::launcher::{ProcessLauncher, ServerLauncher};
use crate::proxy::{ClassDescriptor, ClassTemplate, ObjectInner, RemoteObject};
use crate::registry::TypeRegistry;
use crate::value::Value;

/// Static method that evaluates constructor expressions on the creator class.
const CTOR_METHOD: &str = "NewByCtor";

/// Handle to a bridge session. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    config: SessionConfig,
    registry: Arc<TypeRegistry>,
    channel: Mutex<ChannelState>,
    templates: Mutex<HashMap<String, Arc<ClassDescriptor>>>,
    objects: Mutex<HashMap<i32, Weak<ObjectInner>>>,
    peer: Option<SocketAddr>,
    server: Mutex<Option<Child>>,
}

struct ChannelState {
    channel: Option<Channel>,
    fault: Option<String>,
}

impl Session {
    /// Connect using `config`, launching the configured server on first refusal.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        Self::connect_with(config, Arc::new(TypeRegistry::standard()), &ProcessLauncher)
    }

    /// Connect with an explicit registry and server launcher.
    pub fn connect_with(
        config: SessionConfig,
        registry: Arc<TypeRegistry>,
        launcher: &dyn ServerLauncher,
    ) -> Result<Self> {
        let mut launched = None;
        let slot = &mut launched;
        let url = config.service_url();
        let startup = config.server.as_ref().map(move |spec| {
            move || -> Result<()> {
                *slot = Some(launcher.launch(spec, &url)?);
                Ok(())
            }
        });

        let stream = connect::connect(&config.host, config.port, &config.retry, startup)?;
        let channel = Channel::from_tcp(stream)?;
        let session = Self::from_parts(channel, config, registry);
        if let Some(child) = launched {
            *session.inner.lock_server() = Some(child);
        }
        Ok(session)
    }

    /// Session over an already established channel.
    pub fn from_channel(channel: Channel, registry: Arc<TypeRegistry>) -> Self {
        Self::from_parts(channel, SessionConfig::default(), registry)
    }

    /// Session over `channel` with an explicit config and registry.
    pub fn from_parts(channel: Channel, config: SessionConfig, registry: Arc<TypeRegistry>) -> Self {
        let peer = channel.peer();
        Self {
            inner: Arc::new(SessionInner {
                config,
                registry,
                channel: Mutex::new(ChannelState {
                    channel: Some(channel),
                    fault: None,
                }),
                templates: Mutex::new(HashMap::new()),
                objects: Mutex::new(HashMap::new()),
                peer,
                server: Mutex::new(None),
            }),
        }
    }

    /// Configuration this session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Registry used to encode arguments and decode replies.
    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// Remote address, when the channel is a TCP stream.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    /// Process id of the server this session launched, if any.
    pub fn server_pid(&self) -> Option<u32> {
        self.inner.lock_server().as_ref().map(Child::id)
    }

    /// Construct `classname` remotely.
    pub fn create(&self, classname: &str, args: &[Value]) -> Result<Value> {
        let args = self.inner.registry.convert_args(args)?;
        let reply = self.exchange(Message::Create {
            classname: classname.to_owned(),
            args,
        })?;
        self.resolve("Create", reply)
    }

    /// Invoke a static method on `classname`.
    pub fn call_static(&self, classname: &str, method: &str, args: &[Value]) -> Result<Value> {
        let args = self.inner.registry.convert_args(args)?;
        let reply = self.exchange(Message::CallStaticMethod {
            classname: classname.to_owned(),
            method: method.to_owned(),
            args,
        })?;
        self.resolve("CallStaticMethod", reply)
    }

    /// Invoke an instance method on the object behind `object_id`.
    pub fn call(&self, object_id: i32, method: &str, args: &[Value]) -> Result<Value> {
        let args = self.inner.registry.convert_args(args)?;
        let reply = self.exchange(Message::CallMethod {
            object_id,
            method: method.to_owned(),
            args,
        })?;
        self.resolve("CallMethod", reply)
    }

    /// Evaluate a constructor expression such as `"Point(3, 4)"`.
    pub fn ctor(&self, expr: &str) -> Result<Value> {
        self.call_static(
            &self.inner.config.creator_class,
            CTOR_METHOD,
            &[Value::from(expr)],
        )
    }

    /// Read a property of the object behind `object_id`.
    pub fn get_property(&self, object_id: i32, property: &str) -> Result<Value> {
        let reply = self.exchange(Message::GetProperty {
            object_id,
            property: property.to_owned(),
        })?;
        self.resolve("GetProperty", reply)
    }

    /// Assign a property of the object behind `object_id`.
    pub fn set_property(&self, object_id: i32, property: &str, value: &Value) -> Result<()> {
        let value = self.inner.registry.create_by_value(value)?;
        let reply = self.exchange(Message::SetProperty {
            object_id,
            property: property.to_owned(),
            value: Box::new(value),
        })?;
        self.resolve("SetProperty", reply).map(drop)
    }

    /// Element `index` of the indexable object behind `object_id`.
    pub fn get_indexed(&self, object_id: i32, index: i32) -> Result<Value> {
        let reply = self.exchange(Message::GetIndexed { object_id, index })?;
        self.resolve("GetIndexed", reply)
    }

    /// Element `index` of an indexed property such as `Item`.
    pub fn get_indexed_property(&self, object_id: i32, property: &str, index: i32) -> Result<Value> {
        let reply = self.exchange(Message::GetIndexedProperty {
            object_id,
            property: property.to_owned(),
            index,
        })?;
        self.resolve("GetIndexedProperty", reply)
    }

    /// Read a static property of `classname`.
    pub fn get_static_property(&self, classname: &str, property: &str) -> Result<Value> {
        let reply = self.exchange(Message::GetStaticProperty {
            classname: classname.to_owned(),
            property: property.to_owned(),
        })?;
        self.resolve("GetStaticProperty", reply)
    }

    /// Assign a static property of `classname`.
    pub fn set_static_property(&self, classname: &str, property: &str, value: &Value) -> Result<()> {
        let value = self.inner.registry.create_by_value(value)?;
        let reply = self.exchange(Message::SetStaticProperty {
            classname: classname.to_owned(),
            property: property.to_owned(),
            value: Box::new(value),
        })?;
        self.resolve("SetStaticProperty", reply).map(drop)
    }

    /// Pin a handle against remote collection. One-way: no reply is read.
    pub fn protect(&self, object_id: i32) -> Result<()> {
        self.send_only(Message::Protect { object_id })
    }

    /// Release a handle. One-way: no reply is read.
    ///
    /// Prefer dropping (or [`RemoteObject::release`]-ing) the proxy, which
    /// guarantees a single release per handle.
    pub fn release(&self, object_id: i32) -> Result<()> {
        tracing::debug!(object_id, "Releasing remote object");
        self.send_only(Message::Release { object_id })
    }

    /// Class descriptor for `classname`, fetched at most once per session.
    pub fn class_for(&self, classname: &str) -> Result<Arc<ClassDescriptor>> {
        if let Some(class) = self.inner.lock_templates().get(classname) {
            return Ok(class.clone());
        }

        tracing::debug!(classname, "Fetching class template");
        let reply = self.exchange(Message::TemplateReq {
            classname: classname.to_owned(),
        })?;
        let info = match reply {
            Message::TemplateReply(info) => info,
            Message::Exception(text) => return Err(BridgeError::Remote(text)),
            other => {
                return Err(BridgeError::UnexpectedReply {
                    request: "TemplateReq",
                    reply: other.to_string(),
                });
            }
        };

        let class = Arc::new(ClassDescriptor::new(
            ClassTemplate::new(classname, info),
            Arc::downgrade(&self.inner),
        ));
        // Concurrent first fetches are harmless; the first insert wins.
        Ok(self
            .inner
            .lock_templates()
            .entry(classname.to_owned())
            .or_insert(class)
            .clone())
    }

    /// Template for `classname` (see [`Session::class_for`]).
    pub fn template(&self, classname: &str) -> Result<ClassTemplate> {
        Ok(self.class_for(classname)?.template().clone())
    }

    /// Class names whose templates are cached.
    pub fn cached_classes(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.lock_templates().keys().cloned().collect();
        names.sort();
        names
    }

    /// Proxy for a handle the remote side returned. Returns the live proxy
    /// for `object_id` if there is one. The template is fetched lazily on
    /// first member access.
    pub fn object_for(&self, object_id: i32, classname: Option<String>) -> RemoteObject {
        let mut objects = self.inner.lock_objects();
        if let Some(existing) = objects.get(&object_id).and_then(RemoteObject::upgrade) {
            return existing;
        }
        let object = RemoteObject::new(self.clone(), object_id, classname);
        objects.insert(object_id, object.downgrade());
        object
    }

    /// Number of handles with a live proxy.
    pub fn live_objects(&self) -> usize {
        self.inner
            .lock_objects()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Forget `object`'s table entry, unless a newer proxy has replaced it.
    pub(crate) fn unregister(&self, object_id: i32, object: &ObjectInner) {
        let mut objects = self.inner.lock_objects();
        if objects
            .get(&object_id)
            .is_some_and(|w| std::ptr::eq(w.as_ptr(), object))
        {
            objects.remove(&object_id);
        }
    }

    /// Tear down the channel. Later requests fail with [`BridgeError::Closed`]
    /// and proxies dropped afterwards do not try to release.
    pub fn close(&self) {
        let mut state = self.inner.lock_channel();
        if let Some(mut channel) = state.channel.take() {
            tracing::debug!(peer = ?self.inner.peer, "Closing bridge session");
            channel.close();
        }
    }

    /// True once the channel is gone, by `close` or by a fatal fault.
    pub fn is_closed(&self) -> bool {
        self.inner.lock_channel().channel.is_none()
    }

    /// Fatal fault that made the session unusable, if any.
    pub fn fault(&self) -> Option<String> {
        self.inner.lock_channel().fault.clone()
    }

    pub(crate) fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionInner>) -> Result<Session> {
        weak.upgrade()
            .map(|inner| Session { inner })
            .ok_or(BridgeError::Closed)
    }

    fn exchange(&self, request: Message) -> Result<Message> {
        self.with_channel(|channel, registry| {
            channel.send(&request)?;
            channel.receive(registry)
        })
    }

    fn send_only(&self, request: Message) -> Result<()> {
        self.with_channel(|channel, _| channel.send(&request))
    }

    fn with_channel<T>(&self, f: impl FnOnce(&mut Channel, &TypeRegistry) -> Result<T>) -> Result<T> {
        let mut state = self.inner.lock_channel();
        if let Some(fault) = &state.fault {
            return Err(BridgeError::Broken(fault.clone()));
        }
        let channel = state.channel.as_mut().ok_or(BridgeError::Closed)?;

        match f(channel, &self.inner.registry) {
            Err(e) if e.is_fatal() => {
                tracing::warn!(error = %e, peer = ?self.inner.peer, "Fatal channel error, session is unusable");
                state.fault = Some(e.to_string());
                if let Some(mut channel) = state.channel.take() {
                    channel.close();
                }
                Err(e)
            }
            result => result,
        }
    }

    /// Turn a reply into a value. Must not be called with the channel locked.
    fn resolve(&self, request: &'static str, reply: Message) -> Result<Value> {
        Ok(match reply {
            Message::Null => Value::Null,
            Message::Bool(v) => Value::Bool(v),
            Message::Byte(v) => Value::Byte(v),
            Message::Int32(v) => Value::Int(i64::from(v)),
            Message::Int64(v) => Value::Int(v),
            Message::Float64(v) => Value::Float(v),
            Message::String(v) => Value::String(v),
            Message::Object(r) => Value::Object(self.object_for(r.id, r.classname)),
            Message::Vector(v) => Value::Vector(v),
            Message::Matrix(m) => Value::Matrix(m),
            Message::Exception(text) => return Err(BridgeError::Remote(text)),
            Message::BoolArray(v) => Value::BoolArray(v),
            Message::ByteArray(v) => Value::Bytes(v),
            Message::Int32Array(v) => Value::Int32Array(v),
            Message::Int64Array(v) => Value::Int64Array(v),
            Message::Float64Array(v) => Value::Float64Array(v),
            Message::StringArray(v) => Value::StringArray(v),
            Message::ObjectArray(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.resolve(request, item))
                    .collect::<Result<_>>()?,
            ),
            other => {
                return Err(BridgeError::UnexpectedReply {
                    request,
                    reply: other.to_string(),
                });
            }
        })
    }
}

impl SessionInner {
    fn lock_channel(&self) -> MutexGuard<'_, ChannelState> {
        self.channel.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Channel mutex poisoned - session is unusable");
            let mut state = poisoned.into_inner();
            state
                .fault
                .get_or_insert_with(|| "channel mutex poisoned".to_owned());
            state.channel = None;
            state
        })
    }

    fn lock_templates(&self) -> MutexGuard<'_, HashMap<String, Arc<ClassDescriptor>>> {
        self.templates.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Template cache mutex poisoned");
            poisoned.into_inner()
        })
    }

    fn lock_objects(&self) -> MutexGuard<'_, HashMap<i32, Weak<ObjectInner>>> {
        self.objects.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Object table mutex poisoned");
            poisoned.into_inner()
        })
    }

    fn lock_server(&self) -> MutexGuard<'_, Option<Child>> {
        self.server.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("peer", &self.inner.peer)
            .finish_non_exhaustive()
    }
}
