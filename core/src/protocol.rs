//! Remote console wire format
//!
//! Every frame is a little-endian `i32` length followed by the request id,
//! the packet type, the body and two NUL bytes. The length counts everything
//! after itself, so an empty body gives a length of 10.
//!
//! Servers split long replies into several frames without marking the
//! last one, so [`exchange`] follows every command with a request of an
//! unknown type. Requests are answered in order, so the reply to that
//! second request closes the first reply.
//!
//! Async helpers work on any `tokio` stream; the `*_blocking` variants do
//! the same over `std::io` for callers that own a synchronous socket.

use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Client login packet
pub const TYPE_AUTH: i32 = 3;
/// Server reply to a login packet
pub const TYPE_AUTH_RESPONSE: i32 = 2;
/// Client command packet
pub const TYPE_EXEC_COMMAND: i32 = 2;
/// Server reply to a command packet
pub const TYPE_RESPONSE_VALUE: i32 = 0;

/// Request id the server answers with when the password is wrong
pub const AUTH_FAILED_ID: i32 = -1;

/// Request type servers do not know; used to find the end of a reply
pub const TYPE_END_MARKER: i32 = TYPE_RESPONSE_VALUE;

/// Characters the server puts in one frame; longer replies are split
pub const FRAGMENT_SIZE: usize = 4096;

/// Largest command body servers accept from a client
pub const MAX_COMMAND_LEN: usize = 1446;

const MIN_FRAME_LEN: usize = 10;
// A fragment is counted in UTF-16 units, each at most 3 bytes of UTF-8.
const MAX_FRAME_LEN: usize = FRAGMENT_SIZE * 3 + MIN_FRAME_LEN;

/// One protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            kind: TYPE_AUTH,
            body: password.to_string(),
        }
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self {
            id,
            kind: TYPE_EXEC_COMMAND,
            body: command.to_string(),
        }
    }

    pub fn end_marker(id: i32) -> Self {
        Self {
            id,
            kind: TYPE_END_MARKER,
            body: String::new(),
        }
    }

    /// Serialize including the length prefix
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let body = self.body.as_bytes();
        if self.kind == TYPE_EXEC_COMMAND && body.len() > MAX_COMMAND_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "command is {} bytes, limit is {}",
                    body.len(),
                    MAX_COMMAND_LEN
                ),
            ));
        }

        let len = body.len() + MIN_FRAME_LEN;
        let mut buf = Vec::with_capacity(len + 4);
        buf.extend_from_slice(&(len as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        Ok(buf)
    }

    /// Parse a frame whose length prefix has already been consumed
    pub fn decode(frame: &[u8]) -> io::Result<Self> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(invalid_data(format!("frame of {} bytes is too short", frame.len())));
        }
        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let kind = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let body = &frame[8..frame.len() - 2];
        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn frame_len(prefix: i32) -> io::Result<usize> {
    let len = usize::try_from(prefix)
        .map_err(|_| invalid_data(format!("negative frame length {}", prefix)))?;
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
        return Err(invalid_data(format!("frame length {} out of range", len)));
    }
    Ok(len)
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&packet.encode()?).await?;
    writer.flush().await
}

pub async fn read_packet<R>(reader: &mut R) -> io::Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let len = frame_len(reader.read_i32_le().await?)?;
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Packet::decode(&frame)
}

/// Log in with `password`; `Ok(false)` means the server rejected it
pub async fn authenticate<S>(stream: &mut S, id: i32, password: &str) -> io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_packet(stream, &Packet::auth(id, password)).await?;
    loop {
        // Some servers send an empty value packet ahead of the auth reply.
        let reply = read_packet(stream).await?;
        if reply.kind == TYPE_AUTH_RESPONSE {
            return Ok(reply.id != AUTH_FAILED_ID);
        }
    }
}

/// Id of the end marker sent after command `id`
///
/// Command ids are positive, so the complement is at most -2 and never
/// collides with a command id or with [`AUTH_FAILED_ID`].
pub fn end_marker_id(id: i32) -> i32 {
    !id
}

/// Send one command and collect its (possibly fragmented) reply
pub async fn exchange<S>(stream: &mut S, id: i32, command: &str) -> io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_packet(stream, &Packet::command(id, command)).await?;
    write_packet(stream, &Packet::end_marker(end_marker_id(id))).await?;

    let mut body = String::new();
    loop {
        let reply = read_packet(stream).await?;
        if reply.id == id {
            body.push_str(&reply.body);
        } else if reply.id == end_marker_id(id) {
            return Ok(body);
        }
        // Anything else answers an abandoned earlier request.
    }
}

pub fn write_packet_blocking<W: Write>(writer: &mut W, packet: &Packet) -> io::Result<()> {
    writer.write_all(&packet.encode()?)?;
    writer.flush()
}

pub fn read_packet_blocking<R: Read>(reader: &mut R) -> io::Result<Packet> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = frame_len(i32::from_le_bytes(prefix))?;
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame)?;
    Packet::decode(&frame)
}

/// Blocking counterpart of [`authenticate`]
pub fn authenticate_blocking<S: Read + Write>(
    stream: &mut S,
    id: i32,
    password: &str,
) -> io::Result<bool> {
    write_packet_blocking(stream, &Packet::auth(id, password))?;
    loop {
        let reply = read_packet_blocking(stream)?;
        if reply.kind == TYPE_AUTH_RESPONSE {
            return Ok(reply.id != AUTH_FAILED_ID);
        }
    }
}

/// Blocking counterpart of [`exchange`]
pub fn exchange_blocking<S: Read + Write>(
    stream: &mut S,
    id: i32,
    command: &str,
) -> io::Result<String> {
    write_packet_blocking(stream, &Packet::command(id, command))?;
    write_packet_blocking(stream, &Packet::end_marker(end_marker_id(id)))?;

    let mut body = String::new();
    loop {
        let reply = read_packet_blocking(stream)?;
        if reply.id == id {
            body.push_str(&reply.body);
        } else if reply.id == end_marker_id(id) {
            return Ok(body);
        }
    }
}

/// Whether an I/O error means the peer dropped the connection
pub fn is_connection_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// Whether the stream may still be in the middle of a frame after `err`
///
/// Only a request rejected before anything was written leaves it usable.
pub fn leaves_stream_unsynced(err: &io::Error) -> bool {
    err.kind() != io::ErrorKind::InvalidInput
}
