//! clrbridge: client bridge to objects living in a remote .NET CLR.
//!
//! A [`Session`] owns one TCP channel to the bridge server. Objects are
//! created remotely and handled locally through [`RemoteObject`] proxies whose
//! methods and properties are resolved against class templates fetched once
//! per session.

mod config;
mod data;
mod error;
mod launcher;
mod registry;
mod session;
mod value;
mod version;

pub mod bridge;
pub mod channel;
pub mod connect;
pub mod proxy;

pub use config::{DEFAULT_CREATOR_CLASS, DEFAULT_HOST, DEFAULT_PORT, ServerSpec, SessionConfig};
pub use connect::RetryPolicy;
pub use data::{Matrix, Vector};
pub use error::{BridgeError, Result};
pub use launcher::{LaunchError, ProcessLauncher, ServerLauncher, command_line};
pub use proxy::{Attribute, BoundMethod, ClassDescriptor, ClassTemplate, RemoteObject, StaticMethod};
pub use registry::{Constructor, Converter, Matcher, TypeRegistry, ValueRule};
pub use session::Session;
pub use value::Value;
pub use version::{BYTE_ORDER, CLRBRIDGE_VERSION, PROTOCOL_REVISION, WireInfo};
