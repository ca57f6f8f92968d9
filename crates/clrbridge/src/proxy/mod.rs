//! Remote-object proxy layer.
//!
//! # Architecture
//!
//! - **template**: Per-class member sets and the static-method table built from them
//! - **object**: Instance proxies with explicit attribute resolution and scoped release
//!
//! A session keeps at most one live proxy per handle; clones share it.
//!
//! Resolution order for an instance attribute: reserved fields, local state,
//! cached method callables, declared methods, declared properties. Anything
//! else is an unknown member.

mod object;
mod template;

pub(crate) use object::ObjectInner;
pub use object::{Attribute, BoundMethod, RESERVED, RemoteObject};
pub use template::{ClassDescriptor, ClassTemplate, StaticMethod};
