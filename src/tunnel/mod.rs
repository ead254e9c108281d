pub mod authority;
pub mod bus;
pub mod client;
pub mod envelope;

pub use authority::PeerTokenAuthority;
pub use bus::TunnelBus;
pub use client::TunnelClient;
pub use envelope::TunnelEnvelope;
