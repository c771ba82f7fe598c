//! Router configuration subsections.
//!
//! The `router.*` parameters: bind endpoints, the upstream session timeout,
//! abuse limits, and socket/drain buffer sizing.

use serde::{Deserialize, Serialize};

/// Router configuration (`router.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Public endpoint clients reach (`router.outer_bind_addr`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_bind_addr: Option<String>,

    /// Private-network IP the inner socket binds to, on an ephemeral port
    /// (`router.inner_bind_ip`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_bind_ip: Option<String>,

    /// Upstream session idle timeout in seconds
    /// (`router.session_timeout_secs`). The sweeper adds a 10 s grace on
    /// top so it never races a legitimate session-level keepalive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_secs: Option<u64>,

    /// Abuse limits (`router.limits.*`).
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Buffer sizing (`router.buffers.*`).
    #[serde(default)]
    pub buffers: BuffersConfig,
}

impl RouterConfig {
    /// Outer bind endpoint, or the default.
    pub fn outer_bind_addr(&self) -> &str {
        self.outer_bind_addr.as_deref().unwrap_or("0.0.0.0:4100")
    }

    /// Inner bind IP, or the default.
    pub fn inner_bind_ip(&self) -> &str {
        self.inner_bind_ip.as_deref().unwrap_or("127.0.0.1")
    }

    /// Session timeout in seconds, or the default.
    pub fn session_timeout_secs(&self) -> u64 {
        self.session_timeout_secs.unwrap_or(30)
    }

    /// Idle eviction threshold in milliseconds: session timeout plus the
    /// 10 s keepalive grace.
    pub fn idle_timeout_ms(&self) -> u64 {
        self.session_timeout_secs() * 1000 + 10_000
    }

    /// Merge another router section into this one.
    pub fn merge(&mut self, other: RouterConfig) {
        if other.outer_bind_addr.is_some() {
            self.outer_bind_addr = other.outer_bind_addr;
        }
        if other.inner_bind_ip.is_some() {
            self.inner_bind_ip = other.inner_bind_ip;
        }
        if other.session_timeout_secs.is_some() {
            self.session_timeout_secs = other.session_timeout_secs;
        }
        if other.limits != LimitsConfig::default() {
            self.limits = other.limits;
        }
        if other.buffers != BuffersConfig::default() {
            self.buffers = other.buffers;
        }
    }
}

/// Abuse limits (`router.limits.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-route datagram budget per 1 s window
    /// (`router.limits.packets_per_second`).
    #[serde(default = "LimitsConfig::default_packets_per_second")]
    pub packets_per_second: u32,

    /// Router-level handshake retry bound, RouterSYN / ReconnectSYN
    /// (`router.limits.router_sync_limit`).
    #[serde(default = "LimitsConfig::default_router_sync_limit")]
    pub router_sync_limit: u32,

    /// Client-level handshake retry bound, SYN
    /// (`router.limits.sync_limit`).
    #[serde(default = "LimitsConfig::default_sync_limit")]
    pub sync_limit: u32,

    /// Handshake completion deadline in seconds
    /// (`router.limits.connect_timeout_secs`).
    #[serde(default = "LimitsConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            packets_per_second: 1000,
            router_sync_limit: 40,
            sync_limit: 20,
            connect_timeout_secs: 10,
        }
    }
}

impl LimitsConfig {
    fn default_packets_per_second() -> u32 {
        1000
    }
    fn default_router_sync_limit() -> u32 {
        40
    }
    fn default_sync_limit() -> u32 {
        20
    }
    fn default_connect_timeout_secs() -> u64 {
        10
    }

    /// Handshake completion deadline in milliseconds.
    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_secs * 1000
    }
}

/// Buffer sizing (`router.buffers.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffersConfig {
    /// Kernel send/receive buffer request per socket
    /// (`router.buffers.socket_buffer_bytes`).
    #[serde(default = "BuffersConfig::default_socket_buffer_bytes")]
    pub socket_buffer_bytes: usize,

    /// Per-socket userspace receive buffer; datagrams larger than this
    /// are truncated by the kernel and will fail validation
    /// (`router.buffers.datagram_bytes`).
    #[serde(default = "BuffersConfig::default_datagram_bytes")]
    pub datagram_bytes: usize,

    /// Max datagrams drained per socket per `update` call, bounding tick
    /// stall under flood (`router.buffers.drain_budget`).
    #[serde(default = "BuffersConfig::default_drain_budget")]
    pub drain_budget: usize,
}

impl Default for BuffersConfig {
    fn default() -> Self {
        Self {
            socket_buffer_bytes: 16 * 1024 * 1024,
            datagram_bytes: 2048,
            drain_budget: 4096,
        }
    }
}

impl BuffersConfig {
    fn default_socket_buffer_bytes() -> usize {
        16 * 1024 * 1024
    }
    fn default_datagram_bytes() -> usize {
        2048
    }
    fn default_drain_budget() -> usize {
        4096
    }
}
