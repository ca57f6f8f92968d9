//! Per-class reflection metadata and the class-level dispatch table built from it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Weak;

use serde::Serialize;

use crate::bridge::protocol::TemplateInfo;
use crate::error::{BridgeError, Result};
use crate::session::{Session, SessionInner};
use crate::value::Value;

/// Member names of one remote class. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassTemplate {
    pub classname: String,
    pub properties: BTreeSet<String>,
    pub methods: BTreeSet<String>,
    pub static_methods: BTreeSet<String>,
}

impl ClassTemplate {
    /// Template for `classname` from the server's member lists.
    pub fn new(classname: impl Into<String>, info: TemplateInfo) -> Self {
        Self {
            classname: classname.into(),
            properties: info.properties.into_iter().collect(),
            methods: info.methods.into_iter().collect(),
            static_methods: info.static_methods.into_iter().collect(),
        }
    }

    /// Whether `name` is a declared instance method.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }

    /// Whether `name` is a declared property.
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    /// Whether `name` is a declared static method.
    pub fn has_static_method(&self, name: &str) -> bool {
        self.static_methods.contains(name)
    }

    /// Class name without its namespace.
    pub fn short_name(&self) -> &str {
        short_name(&self.classname)
    }
}

pub(crate) fn short_name(classname: &str) -> &str {
    classname.rsplit('.').next().unwrap_or(classname)
}

/// A template plus the static-method callables installed when it was fetched.
#[derive(Debug)]
pub struct ClassDescriptor {
    template: ClassTemplate,
    statics: BTreeMap<String, StaticMethod>,
}

impl ClassDescriptor {
    pub(crate) fn new(template: ClassTemplate, session: Weak<SessionInner>) -> Self {
        let statics = template
            .static_methods
            .iter()
            .map(|name| {
                let method = StaticMethod {
                    classname: template.classname.clone(),
                    name: name.clone(),
                    session: session.clone(),
                };
                (name.clone(), method)
            })
            .collect();
        Self { template, statics }
    }

    /// Member sets this descriptor was built from.
    pub fn template(&self) -> &ClassTemplate {
        &self.template
    }

    /// Fully qualified class name.
    pub fn classname(&self) -> &str {
        &self.template.classname
    }

    /// Callable for static method `name`.
    pub fn static_method(&self, name: &str) -> Result<&StaticMethod> {
        if let Some(method) = self.statics.get(name) {
            return Ok(method);
        }
        let err = if self.template.has_method(name) || self.template.has_property(name) {
            BridgeError::NotCallable {
                classname: self.template.classname.clone(),
                member: name.to_owned(),
            }
        } else {
            BridgeError::UnknownMember {
                classname: self.template.classname.clone(),
                member: name.to_owned(),
            }
        };
        Err(err)
    }

    /// All static method callables, ordered by name.
    pub fn static_methods(&self) -> impl Iterator<Item = &StaticMethod> {
        self.statics.values()
    }

    /// Invoke static method `name` with `args`.
    pub fn call_static(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.static_method(name)?.call(args)
    }
}

/// Callable addressing a class rather than an instance.
#[derive(Debug, Clone)]
pub struct StaticMethod {
    classname: String,
    name: String,
    session: Weak<SessionInner>,
}

impl StaticMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    /// Invoke the static method through its session.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        Session::upgrade(&self.session)?.call_static(&self.classname, &self.name, args)
    }
}
