//! Broadcast routing: emitters, groups and the listener transport

pub mod emitter;
pub mod group;
pub mod transport;

pub use emitter::{Emitter, EmitterHost, LoggingEmitterHost};
pub use group::{BroadcastGroup, EmitterMut, EmitterRelease};
pub use transport::{
    fan_out, validate_frame, ListenerId, ListenerInfo, ListenerTransport, MemoryTransport,
    ReceiveFilter, SentFrame, TransportFrame, UdpTransport, MAX_FRAME_LEN,
};
