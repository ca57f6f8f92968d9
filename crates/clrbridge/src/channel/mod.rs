//! Framed channel I/O between the client and the remote runtime.
//!
//! # Architecture
//!
//! - **reader**: buffered blocking reads with on-demand replenishment
//! - **writer**: buffered writes, flushed once per complete message
//!
//! All multi-byte fields are little-endian.

mod reader;
mod writer;

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

pub use reader::{ChannelReader, MAX_CHUNK, MIN_CHUNK};
pub use writer::ChannelWriter;

use crate::bridge::protocol::Message;
use crate::error::Result;
use crate::registry::TypeRegistry;

type BoxedRead = Box<dyn Read + Send>;
type BoxedWrite = Box<dyn Write + Send>;

/// Bidirectional buffered byte stream carrying framed messages.
pub struct Channel {
    reader: ChannelReader<BoxedRead>,
    writer: ChannelWriter<BoxedWrite>,
    socket: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Channel {
    /// Channel over arbitrary read and write halves.
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: ChannelReader::new(Box::new(reader)),
            writer: ChannelWriter::new(Box::new(writer)),
            socket: None,
            peer: None,
        }
    }

    /// Channel over a connected socket, split into two handles.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let read_half = stream.try_clone()?;
        let write_half = stream.try_clone()?;

        let mut channel = Self::new(read_half, write_half);
        channel.socket = Some(stream);
        channel.peer = peer;
        Ok(channel)
    }

    /// Remote address, for TCP channels.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Read half, for raw access.
    pub fn reader(&mut self) -> &mut ChannelReader<BoxedRead> {
        &mut self.reader
    }

    /// Write half, for raw access.
    pub fn writer(&mut self) -> &mut ChannelWriter<BoxedWrite> {
        &mut self.writer
    }

    /// Write one complete message and flush it.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        tracing::debug!(tag = ?msg.tag(), "Sending message");
        if let Err(e) = msg.write(&mut self.writer) {
            // Partial encodings never reach the stream.
            self.writer.close();
            return Err(e);
        }
        self.writer.flush()
    }

    /// Block until the next complete message arrives.
    pub fn receive(&mut self, registry: &TypeRegistry) -> Result<Message> {
        let msg = Message::read(&mut self.reader, registry)?;
        tracing::debug!(tag = ?msg.tag(), "Received message");
        Ok(msg)
    }

    /// Tear down the stream. Unflushed writes are discarded.
    pub fn close(&mut self) {
        self.writer.close();
        if let Some(socket) = self.socket.take()
            && let Err(e) = socket.shutdown(Shutdown::Both)
        {
            tracing::debug!(error = %e, "Socket shutdown failed");
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}
