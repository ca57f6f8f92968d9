//! In-process fake bridge server.
//!
//! Accepts a single connection, decodes each request with the crate's own
//! codec, records it, and answers through a scripted handler. The thread
//! exits when the client closes the connection; joining it yields every
//! request received.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clrbridge::bridge::protocol::{Message, ObjectRef, TemplateInfo};
use clrbridge::channel::Channel;
use clrbridge::{RetryPolicy, Session, SessionConfig, TypeRegistry};

pub enum Reply {
    Message(Message),
    /// Bytes written verbatim, bypassing the codec.
    Raw(Vec<u8>),
    /// One-way request; nothing is sent back.
    Nothing,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    handle: JoinHandle<Vec<Message>>,
}

impl FakeServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: FnMut(&Message) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        Self::serve(listener, handler)
    }

    pub fn serve<F>(listener: TcpListener, mut handler: F) -> Self
    where
        F: FnMut(&Message) -> Reply + Send + 'static,
    {
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut channel = Channel::from_tcp(stream).unwrap();
            let registry = TypeRegistry::standard();
            let mut seen = Vec::new();

            while let Ok(request) = channel.receive(&registry) {
                let reply = handler(&request);
                seen.push(request);
                let sent = match reply {
                    Reply::Message(msg) => channel.send(&msg),
                    Reply::Raw(bytes) => {
                        let writer = channel.writer();
                        writer.write_bytes(&bytes, false).and_then(|_| writer.flush())
                    }
                    Reply::Nothing => Ok(()),
                };
                if sent.is_err() {
                    break;
                }
            }
            seen
        });
        Self { addr, handle }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_host(self.addr.ip().to_string())
            .with_port(self.addr.port())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(20)))
    }

    pub fn connect(&self) -> Session {
        Session::connect(self.config()).unwrap()
    }

    /// Wait for the client to disconnect and return every request received.
    pub fn requests(self) -> Vec<Message> {
        self.handle.join().unwrap()
    }
}

pub fn point_template() -> TemplateInfo {
    TemplateInfo {
        properties: vec!["X".into(), "Y".into()],
        methods: vec!["Magnitude".into(), "Scale".into()],
        static_methods: vec!["Origin".into()],
    }
}

/// Handler emulating a server that knows a single `Point` class.
pub fn points() -> impl FnMut(&Message) -> Reply + Send + 'static {
    let mut next_id = 7;
    let mut x = 3.0;
    move |request: &Message| {
        let reply = match request {
            Message::Create { classname, .. } if classname == "Point" => {
                let id = next_id;
                next_id += 1;
                Message::Object(ObjectRef::new(id, Some("Point".into())))
            }
            Message::TemplateReq { classname } if classname == "Point" => {
                Message::TemplateReply(point_template())
            }
            Message::TemplateReq { classname } => {
                Message::Exception(format!("TypeLoadException: {classname}"))
            }
            Message::CallMethod { method, .. } if method == "Magnitude" => Message::Float64(5.0),
            Message::CallMethod { method, args, .. } if method == "Scale" => match args.first() {
                Some(Message::Int32(k)) => Message::Float64(x * f64::from(*k)),
                _ => Message::Exception("ArgumentException: Scale expects an int".into()),
            },
            Message::GetProperty { property, .. } if property == "X" => Message::Float64(x),
            Message::SetProperty { property, value, .. } if property == "X" => match **value {
                Message::Float64(v) => {
                    x = v;
                    Message::Null
                }
                _ => Message::Exception("InvalidCastException".into()),
            },
            Message::CallStaticMethod { method, .. } if method == "Origin" => {
                Message::Object(ObjectRef::new(99, Some("Point".into())))
            }
            Message::Release { .. } | Message::Protect { .. } => return Reply::Nothing,
            other => Message::Exception(format!("NotSupportedException: {other}")),
        };
        Reply::Message(reply)
    }
}

/// Requests that reference `object_id`.
pub fn touching(requests: &[Message], object_id: i32) -> Vec<&Message> {
    requests
        .iter()
        .filter(|m| m.object_id() == Some(object_id))
        .collect()
}
