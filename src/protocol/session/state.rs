use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

/// Public lifecycle state exposed to API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycleState {
    /// Initial idle state before any connection attempt
    Idle,
    /// Transport connecting
    Connecting,
    /// EIP RegisterSession in flight
    Handshaking,
    /// Session registered and serving requests
    Active,
    /// Graceful closing in progress
    Closing,
    /// Fully closed/disconnected
    Closed,
    /// Failed state after connect or handshake error
    Failed,
}

/// Public session events for observability.
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent {
    /// Lifecycle changed notification
    LifecycleChanged(SessionLifecycleState),
    /// Transport level error occurred (connect/reset/IO)
    TransportError,
    /// A reply arrived whose sender context matched no in-flight request
    UnmatchedReply,
}

/// Session configuration for the EIP transport and runtime behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote device address (host:port, EIP default port 44818)
    pub socket_addr: SocketAddr,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-request timeout (socket deadline for each round-trip)
    pub request_timeout: Duration,
    /// Outbound queue capacity
    pub send_queue_capacity: usize,
    /// Maximum concurrent requests. PCCC is strictly one-in-flight per
    /// session; raising this is reserved for connected-messaging stacks.
    pub max_concurrent_requests: usize,
    /// TCP_NODELAY option, defaults to true for small request/reply PDUs
    pub tcp_nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 44818)),
            connect_timeout: Duration::from_millis(10_000),
            request_timeout: Duration::from_millis(5_000),
            send_queue_capacity: 32,
            max_concurrent_requests: 1,
            tcp_nodelay: true,
        }
    }
}
