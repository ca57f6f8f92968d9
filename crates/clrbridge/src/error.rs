use std::io;

use thiserror::Error;

use crate::launcher::LaunchError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge channel i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of stream: needed {needed} bytes, {available} buffered")]
    EndOfStream { needed: usize, available: usize },

    #[error("bad magic 0x{found:04x} (expected 0x{expected:04x}), stream is corrupt")]
    BadMagic { found: u16, expected: u16 },

    #[error("unknown message tag {0}, protocol version mismatch")]
    UnknownTag(u8),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("cannot serialize value: {0}")]
    Unserializable(String),

    #[error("{what} length {len} exceeds the wire limit")]
    TooLong { what: &'static str, len: usize },

    /// The remote runtime raised while servicing the request.
    #[error("remote exception: {0}")]
    Remote(String),

    #[error("unknown method or property '{member}' on {classname}")]
    UnknownMember { classname: String, member: String },

    #[error("'{member}' on {classname} is not a method")]
    NotCallable { classname: String, member: String },

    #[error("'{member}' on {classname} is a method, not a property")]
    NotAProperty { classname: String, member: String },

    #[error("cannot assign read-only attribute '{0}'")]
    ReadOnly(String),

    #[error("object {0} has already been released")]
    Released(i32),

    #[error("object {0} carries no class name, members cannot be resolved")]
    MissingClassName(i32),

    #[error("unexpected reply to {request}: {reply}")]
    UnexpectedReply { request: &'static str, reply: String },

    #[error("failed to connect to {addr} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("session is closed")]
    Closed,

    #[error("session is unusable after a fatal channel error: {0}")]
    Broken(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn unserializable(message: impl Into<String>) -> Self {
        Self::Unserializable(message.into())
    }

    /// Whether the channel that produced this error can no longer be trusted.
    ///
    /// Once a read or write fails part-way through a message the stream position
    /// is unknown, so the session must be torn down and reconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::EndOfStream { .. }
                | Self::BadMagic { .. }
                | Self::UnknownTag(_)
                | Self::Malformed(_)
                | Self::Broken(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
