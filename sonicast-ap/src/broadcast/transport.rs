//! Listener transport
//!
//! The session layer that knows which listeners are connected and
//! authenticated lives outside this crate; [`ListenerTransport`] is the seam.
//! The engine only needs to enumerate listeners and push one frame to one
//! listener.
//!
//! Two implementations ship with the crate:
//! - [`UdpTransport`]: datagrams `[controller_id][payload...]` to configured peers
//! - [`MemoryTransport`]: in-process recorder for embedding and tests

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Largest encoded payload the transport accepts per frame
pub const MAX_FRAME_LEN: usize = 512;

/// Connection identifier assigned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Snapshot of one connected listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub id: ListenerId,
    /// Only fully authenticated listeners receive audio
    pub authenticated: bool,
    /// Human-readable label (address, player name)
    pub label: String,
}

/// One outbound transport unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFrame<'a> {
    pub controller_id: u8,
    pub payload: &'a [u8],
}

impl TransportFrame<'_> {
    /// Wire form: controller id byte followed by the payload
    pub fn to_datagram(&self) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(1 + self.payload.len());
        datagram.push(self.controller_id);
        datagram.extend_from_slice(self.payload);
        datagram
    }
}

/// Predicate choosing which listeners receive a frame
pub type ReceiveFilter = Arc<dyn Fn(&ListenerInfo) -> bool + Send + Sync>;

/// Connected-listener enumeration plus per-listener send
pub trait ListenerTransport: Send + Sync {
    /// Currently connected listeners
    fn listeners(&self) -> Vec<ListenerInfo>;

    /// Push one frame to one listener
    fn send(&self, listener: ListenerId, frame: TransportFrame<'_>) -> Result<()>;
}

/// Check a frame against the transport preconditions.
///
/// # Errors
/// `InvalidArgument` for an empty frame, a length beyond the buffer, or a
/// length beyond [`MAX_FRAME_LEN`].
pub fn validate_frame(frame: &[u8], frame_len: usize) -> Result<()> {
    if frame.is_empty() || frame_len == 0 {
        return Err(Error::InvalidArgument("empty encoded frame".to_string()));
    }
    if frame_len > frame.len() {
        return Err(Error::InvalidArgument(format!(
            "frame length {} exceeds buffer of {} bytes",
            frame_len,
            frame.len()
        )));
    }
    if frame_len > MAX_FRAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "frame length {} exceeds transport maximum {}",
            frame_len, MAX_FRAME_LEN
        )));
    }
    Ok(())
}

/// Send `payload` tagged with every id in `ids` to every authenticated
/// listener accepted by `filter`. Returns the number of successful sends.
///
/// Per-listener failures are logged and skipped.
pub fn fan_out<I>(
    ids: I,
    payload: &[u8],
    transport: &dyn ListenerTransport,
    filter: Option<&ReceiveFilter>,
) -> usize
where
    I: IntoIterator<Item = u8>,
{
    let targets: Vec<ListenerInfo> = transport
        .listeners()
        .into_iter()
        .filter(|l| l.authenticated)
        .filter(|l| filter.map_or(true, |f| f(l)))
        .collect();
    if targets.is_empty() {
        return 0;
    }

    let mut sent = 0;
    for controller_id in ids {
        let frame = TransportFrame {
            controller_id,
            payload,
        };
        for listener in &targets {
            match transport.send(listener.id, frame) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Send to {} failed: {}", listener.label, e),
            }
        }
    }
    sent
}

// ========================================
// UDP transport
// ========================================

#[derive(Debug, Clone)]
struct UdpPeer {
    id: ListenerId,
    addr: SocketAddr,
    authenticated: bool,
}

/// Non-blocking UDP transport; every registered peer is a listener
pub struct UdpTransport {
    socket: UdpSocket,
    peers: RwLock<Vec<UdpPeer>>,
    next_id: AtomicU32,
}

impl UdpTransport {
    /// Bind a non-blocking socket on `addr`.
    ///
    /// Sends never await, so the tick task can transmit without yielding.
    ///
    /// # Errors
    /// `InvalidState` outside a tokio runtime; `Io` when the bind fails.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map_err(|_| Error::InvalidState("UDP transport needs a tokio runtime".to_string()))?;
        let socket = std::net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;
        info!("UDP transport bound on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            peers: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(1),
        })
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Register a peer; returns its listener id
    pub fn add_peer(&self, addr: SocketAddr, authenticated: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(UdpPeer {
                id,
                addr,
                authenticated,
            });
        debug!("Registered UDP peer {} as {}", addr, id);
        id
    }

    /// Forget a peer; returns whether it was registered
    pub fn remove_peer(&self, id: ListenerId) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        let before = peers.len();
        peers.retain(|p| p.id != id);
        before != peers.len()
    }
}

impl ListenerTransport for UdpTransport {
    fn listeners(&self) -> Vec<ListenerInfo> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| ListenerInfo {
                id: p.id,
                authenticated: p.authenticated,
                label: p.addr.to_string(),
            })
            .collect()
    }

    fn send(&self, listener: ListenerId, frame: TransportFrame<'_>) -> Result<()> {
        let addr = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.id == listener)
            .map(|p| p.addr)
            .ok_or_else(|| Error::NotFound(format!("{}", listener)))?;

        match self.socket.try_send_to(&frame.to_datagram(), addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(Error::Transport(format!("socket buffer full, dropped frame for {}", addr)))
            }
            Err(e) => Err(Error::Transport(format!("send to {} failed: {}", addr, e))),
        }
    }
}

// ========================================
// In-memory transport
// ========================================

/// Frame captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub listener: ListenerId,
    pub controller_id: u8,
    pub payload: Vec<u8>,
}

/// In-process transport recording every frame it is asked to send
#[derive(Debug, Default)]
pub struct MemoryTransport {
    listeners: Mutex<Vec<ListenerInfo>>,
    sent: Mutex<Vec<SentFrame>>,
}

impl MemoryTransport {
    /// Create a transport with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect (or reconnect) a listener
    pub fn connect(&self, id: u32, authenticated: bool) -> ListenerId {
        let id = ListenerId(id);
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.id != id);
        listeners.push(ListenerInfo {
            id,
            authenticated,
            label: id.to_string(),
        });
        id
    }

    /// Disconnect a listener
    pub fn disconnect(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| l.id != id);
    }

    /// Frames sent so far
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of frames sent so far
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Take and clear the recorded frames
    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ListenerTransport for MemoryTransport {
    fn listeners(&self) -> Vec<ListenerInfo> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn send(&self, listener: ListenerId, frame: TransportFrame<'_>) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentFrame {
                listener,
                controller_id: frame.controller_id,
                payload: frame.payload.to_vec(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_frame() {
        let frame = [0u8; 600];
        assert!(validate_frame(&frame, 512).is_ok());
        assert!(matches!(validate_frame(&frame, 513), Err(Error::InvalidArgument(_))));
        assert!(matches!(validate_frame(&frame[..10], 11), Err(Error::InvalidArgument(_))));
        assert!(matches!(validate_frame(&[], 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_datagram_layout() {
        let frame = TransportFrame {
            controller_id: 7,
            payload: &[1, 2, 3],
        };
        assert_eq!(frame.to_datagram(), vec![7, 1, 2, 3]);
    }

    #[test]
    fn test_fan_out_skips_unauthenticated() {
        let transport = MemoryTransport::new();
        transport.connect(1, true);
        transport.connect(2, false);
        transport.connect(3, true);

        let sent = fan_out([4u8, 9], &[0xAA], &transport, None);
        assert_eq!(sent, 4);
        let frames = transport.sent();
        assert!(frames.iter().all(|f| f.listener != ListenerId(2)));
        // Ids are sent in order, each to every listener
        assert_eq!(frames[0].controller_id, 4);
        assert_eq!(frames[3].controller_id, 9);
    }

    #[test]
    fn test_fan_out_applies_filter() {
        let transport = MemoryTransport::new();
        transport.connect(1, true);
        transport.connect(2, true);

        let only_two: ReceiveFilter = Arc::new(|l: &ListenerInfo| l.id == ListenerId(2));
        let sent = fan_out([1u8], &[0], &transport, Some(&only_two));
        assert_eq!(sent, 1);
        assert_eq!(transport.sent()[0].listener, ListenerId(2));
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let peer = transport.add_peer(receiver.local_addr().unwrap(), true);

        transport
            .send(peer, TransportFrame { controller_id: 3, payload: &[10, 20] })
            .unwrap();

        let mut buf = [0u8; 16];
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[3, 10, 20]);

        assert!(transport.remove_peer(peer));
        assert!(transport.listeners().is_empty());
    }

    #[test]
    fn test_udp_bind_needs_runtime() {
        assert!(matches!(
            UdpTransport::bind("127.0.0.1:0".parse().unwrap()),
            Err(Error::InvalidState(_))
        ));
    }
}
