// src/core/warden/link.rs

//! `InstanceLink`: the reference-counted pair of connections (command +
//! pub/sub) Warden keeps open to a monitored instance, plus the liveness
//! timers the monitor tick (§4.3) and the link-teardown rules (§4.2) read.
//!
//! Sharing is modeled with `Arc<Mutex<InstanceLink>>` rather than a manual
//! refcount: when two peer-sentinel `Instance`s denote the same physical
//! sentinel, they simply hold clones of the same `Arc`. This sidesteps the
//! "rebind pending callbacks to a no-op sink" dance the original C
//! implementation needs, since there is no detached task holding a raw
//! pointer into freed memory to begin with — dropping the last `Arc` closes
//! the sockets as part of `Connection::drop`.

use super::address::Address;
use crate::core::errors::SentinelError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// What a previously-sent command on the command connection expects back,
/// so the monitor can dispatch the reply once it arrives (RESP replies on a
/// single connection are strictly FIFO, so a queue is sufficient — no
/// request ids are needed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReply {
    Ping,
    Info,
    Hello,
    IsMasterDownByAddr,
    Generic,
}

/// One live connection: a raw socket plus an inbound buffer. Kept separate
/// from `tokio_util::codec::Framed` so the monitor can poll it non-blockingly
/// once per tick without needing a dedicated reader task per connection.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    codec: RespFrameCodec,
    pub opened_at: Instant,
}

impl Connection {
    async fn open(addr: std::net::SocketAddr) -> Result<Self, SentinelError> {
        let stream = tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(addr))
            .await
            .map_err(|_| SentinelError::ProtocolError("connect timed out".into()))??;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            codec: RespFrameCodec::new(2),
            opened_at: Instant::now(),
        })
    }

    pub async fn write_frame(&mut self, frame: RespFrame) -> Result<(), SentinelError> {
        let mut buf = BytesMut::new();
        self.codec.encode(frame, &mut buf)?;
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Drains whatever bytes are currently available without blocking,
    /// returning every complete frame they contain. Never waits for more
    /// data than is already buffered by the kernel.
    pub fn try_drain_frames(&mut self) -> Result<Vec<RespFrame>, SentinelError> {
        let mut out = Vec::new();
        loop {
            match self.stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => {
                    return Err(SentinelError::ProtocolError("connection closed by peer".into()));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        while let Some(frame) = self.codec.decode(&mut self.read_buf)? {
            out.push(frame);
        }
        Ok(out)
    }

    /// True once the socket reports readable (data to drain) or closed.
    pub async fn wait_readable(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.stream.ready(Interest::READABLE))
            .await
            .is_ok()
    }
}

pub struct InstanceLink {
    pub cmd: Option<Connection>,
    pub pubsub: Option<PubSubConnection>,
    pub pending: VecDeque<PendingReply>,
    pub disconnected: bool,
    pub last_reconnect_time: Option<Instant>,
    pub last_command_sent_time: Option<Instant>,
    pub last_pong_time: Option<Instant>,
    pub pending_ping_time: Option<Instant>,
    pub last_pubsub_activity_time: Option<Instant>,
    pub pending_commands: u32,
}

/// The pub/sub side: subscribed to the hello channel, delivers published
/// messages as `(channel, payload)` pairs.
pub struct PubSubConnection {
    conn: Connection,
}

impl InstanceLink {
    pub fn new() -> Self {
        Self {
            cmd: None,
            pubsub: None,
            pending: VecDeque::new(),
            disconnected: true,
            last_reconnect_time: None,
            last_command_sent_time: None,
            last_pong_time: None,
            pending_ping_time: None,
            last_pubsub_activity_time: None,
            pending_commands: 0,
        }
    }

    /// §4.2: reconnect if disconnected and the minimum reconnect period has
    /// elapsed. Opens the pub/sub side too for PRIMARY/REPLICA kinds, and
    /// subscribes to the hello channel, issues AUTH if configured, sets the
    /// client name, and fires an immediate PING.
    pub async fn reconnect_if_needed(
        &mut self,
        addr: &Address,
        is_server_kind: bool,
        now: Instant,
        min_reconnect_period: Duration,
        auth: Option<(&str, &str)>,
        my_id: &str,
        hello_channel: &str,
    ) {
        if !self.disconnected {
            return;
        }
        if let Some(last) = self.last_reconnect_time
            && now.duration_since(last) < min_reconnect_period
        {
            return;
        }
        self.last_reconnect_time = Some(now);

        let Ok(sock_addr) = addr.socket_addr() else {
            return;
        };

        if self.cmd.is_none() {
            match Connection::open(sock_addr).await {
                Ok(mut conn) => {
                    if let Some((user, pass)) = auth {
                        let _ = conn
                            .write_frame(auth_frame(user, pass))
                            .await;
                    }
                    let _ = conn
                        .write_frame(client_setname_frame(&format!(
                            "sentinel-{}-cmd",
                            &my_id[..my_id.len().min(8)]
                        )))
                        .await;
                    let _ = conn.write_frame(ping_frame()).await;
                    self.pending.push_back(PendingReply::Ping);
                    self.last_command_sent_time = Some(now);
                    self.pending_ping_time = Some(now);
                    self.pending_commands += 1;
                    self.cmd = Some(conn);
                }
                Err(e) => {
                    debug!("command connection to {addr} failed: {e}");
                }
            }
        }

        if is_server_kind && self.pubsub.is_none() {
            match Connection::open(sock_addr).await {
                Ok(mut conn) => {
                    if let Some((user, pass)) = auth {
                        let _ = conn.write_frame(auth_frame(user, pass)).await;
                    }
                    let _ = conn
                        .write_frame(client_setname_frame(&format!(
                            "sentinel-{}-pubsub",
                            &my_id[..my_id.len().min(8)]
                        )))
                        .await;
                    let _ = conn
                        .write_frame(subscribe_frame(hello_channel))
                        .await;
                    self.last_pubsub_activity_time = Some(now);
                    self.pubsub = Some(PubSubConnection { conn });
                }
                Err(e) => {
                    debug!("pub/sub connection to {addr} failed: {e}");
                }
            }
        }

        self.disconnected = self.cmd.is_none() || (is_server_kind && self.pubsub.is_none());
    }

    pub fn close_command(&mut self) {
        self.cmd = None;
        self.pending.clear();
        self.pending_commands = 0;
        self.pending_ping_time = None;
        if self.pubsub.is_none() {
            self.disconnected = true;
        }
    }

    pub fn close_pubsub(&mut self) {
        self.pubsub = None;
        if self.cmd.is_none() {
            self.disconnected = true;
        }
    }

    /// §4.2 liveness: tear down the command link if a ping has been
    /// outstanding and both the ping and the last pong are stale past half
    /// the down-after period, once the link has been up long enough.
    pub fn command_link_is_stale(&self, now: Instant, down_after: Duration) -> bool {
        let Some(conn) = &self.cmd else { return false };
        if now.duration_since(conn.opened_at) < Duration::from_secs(15) {
            return false;
        }
        let Some(pending_since) = self.pending_ping_time else {
            return false;
        };
        let half = down_after / 2;
        let pong_stale = self
            .last_pong_time
            .is_none_or(|t| now.duration_since(t) > half);
        now.duration_since(pending_since) > half && pong_stale
    }

    /// §4.2 liveness: tear down the pub/sub link once no hello activity has
    /// been observed for three hello periods, past the minimum link age.
    pub fn pubsub_link_is_stale(&self, now: Instant, hello_period: Duration) -> bool {
        let Some(pubsub) = &self.pubsub else {
            return false;
        };
        if now.duration_since(pubsub.conn.opened_at) < Duration::from_secs(15) {
            return false;
        }
        self.last_pubsub_activity_time
            .is_none_or(|t| now.duration_since(t) > hello_period * 3)
    }

    pub async fn send_command(&mut self, frame: RespFrame, expect: PendingReply, now: Instant) {
        if let Some(conn) = &mut self.cmd {
            if conn.write_frame(frame).await.is_ok() {
                self.pending.push_back(expect);
                self.last_command_sent_time = Some(now);
                self.pending_commands += 1;
            } else {
                self.close_command();
            }
        }
    }

    /// Drains the command connection, pairing each decoded frame with the
    /// `PendingReply` it answers (FIFO order).
    pub fn drain_command_replies(&mut self) -> Vec<(PendingReply, RespFrame)> {
        let Some(conn) = &mut self.cmd else {
            return Vec::new();
        };
        let frames = match conn.try_drain_frames() {
            Ok(f) => f,
            Err(_) => {
                self.close_command();
                return Vec::new();
            }
        };
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            let kind = self.pending.pop_front().unwrap_or(PendingReply::Generic);
            self.pending_commands = self.pending_commands.saturating_sub(1);
            out.push((kind, frame));
        }
        out
    }

    /// Drains the pub/sub connection, returning `(channel, payload)` pairs
    /// for every `message` frame received.
    pub fn drain_pubsub_messages(&mut self, now: Instant) -> Vec<(String, String)> {
        let Some(pubsub) = &mut self.pubsub else {
            return Vec::new();
        };
        let frames = match pubsub.conn.try_drain_frames() {
            Ok(f) => f,
            Err(_) => {
                self.close_pubsub();
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        for frame in frames {
            if let RespFrame::Array(parts) = frame
                && parts.len() == 3
                && let (RespFrame::BulkString(kind), RespFrame::BulkString(chan), RespFrame::BulkString(payload)) =
                    (&parts[0], &parts[1], &parts[2])
                && kind.eq_ignore_ascii_case(b"message")
            {
                self.last_pubsub_activity_time = Some(now);
                out.push((
                    String::from_utf8_lossy(chan).to_string(),
                    String::from_utf8_lossy(payload).to_string(),
                ));
            }
        }
        out
    }
}

impl Default for InstanceLink {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ping_frame() -> RespFrame {
    RespFrame::Array(vec![RespFrame::BulkString("PING".into())])
}

pub fn info_frame() -> RespFrame {
    RespFrame::Array(vec![RespFrame::BulkString("INFO".into())])
}

/// Rewrites the command name of a command frame per the monitored primary's
/// `rename-command` directives (§6/§9): some deployments rename dangerous
/// commands on the instances themselves, and Warden has to speak the
/// renamed form to reach them.
pub fn apply_rename(mut frame: RespFrame, renames: &std::collections::HashMap<String, String>) -> RespFrame {
    if renames.is_empty() {
        return frame;
    }
    if let RespFrame::Array(items) = &mut frame
        && let Some(RespFrame::BulkString(name)) = items.first_mut()
        && let Ok(upper) = std::str::from_utf8(name).map(|s| s.to_ascii_uppercase())
        && let Some(renamed) = renames.get(&upper)
    {
        *name = renamed.clone().into();
    }
    frame
}

/// §4.5/§6 wire command sent to a peer sentinel to both ask whether it
/// considers `ip:port` down and solicit its vote for `candidate` (or `"*"`
/// when only soliciting a down-opinion, not a vote) at `epoch`.
pub fn is_master_down_frame(ip: &str, port: u16, epoch: u64, candidate: &str) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString("SENTINEL".into()),
        RespFrame::BulkString("IS-MASTER-DOWN-BY-ADDR".into()),
        RespFrame::BulkString(ip.to_string().into()),
        RespFrame::BulkString(port.to_string().into()),
        RespFrame::BulkString(epoch.to_string().into()),
        RespFrame::BulkString(candidate.to_string().into()),
    ])
}

pub fn publish_frame(channel: &str, payload: &str) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString("PUBLISH".into()),
        RespFrame::BulkString(channel.to_string().into()),
        RespFrame::BulkString(payload.to_string().into()),
    ])
}

fn subscribe_frame(channel: &str) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString("SUBSCRIBE".into()),
        RespFrame::BulkString(channel.to_string().into()),
    ])
}

fn auth_frame(user: &str, pass: &str) -> RespFrame {
    if user.is_empty() {
        RespFrame::Array(vec![
            RespFrame::BulkString("AUTH".into()),
            RespFrame::BulkString(pass.to_string().into()),
        ])
    } else {
        RespFrame::Array(vec![
            RespFrame::BulkString("AUTH".into()),
            RespFrame::BulkString(user.to_string().into()),
            RespFrame::BulkString(pass.to_string().into()),
        ])
    }
}

fn client_setname_frame(name: &str) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString("CLIENT".into()),
        RespFrame::BulkString("SETNAME".into()),
        RespFrame::BulkString(name.to_string().into()),
    ])
}

/// §4.5.2: the safe reconfiguration bundle wrapping a role-change command.
pub fn reconfig_bundle(role_change_cmd: RespFrame) -> Vec<RespFrame> {
    vec![
        RespFrame::Array(vec![RespFrame::BulkString("MULTI".into())]),
        role_change_cmd,
        RespFrame::Array(vec![
            RespFrame::BulkString("CONFIG".into()),
            RespFrame::BulkString("REWRITE".into()),
        ]),
        RespFrame::Array(vec![
            RespFrame::BulkString("CLIENT".into()),
            RespFrame::BulkString("KILL".into()),
            RespFrame::BulkString("TYPE".into()),
            RespFrame::BulkString("normal".into()),
        ]),
        RespFrame::Array(vec![
            RespFrame::BulkString("CLIENT".into()),
            RespFrame::BulkString("KILL".into()),
            RespFrame::BulkString("TYPE".into()),
            RespFrame::BulkString("pubsub".into()),
        ]),
        RespFrame::Array(vec![RespFrame::BulkString("EXEC".into())]),
    ]
}
