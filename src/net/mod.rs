//! Peer networking: pub/sub channels, wire messages and state sync

pub mod bus;
pub mod channel;
pub mod message;
pub mod remote;
pub mod sync;
pub mod ws_client;

pub use bus::{BusEndpoint, LocalBus};
pub use channel::{Channel, ChannelError, Envelope, Subscription};
pub use message::SyncMessage;
pub use remote::{RemotePlayer, RemoteTable, SharedRemoteTable};
pub use sync::{ConnectionState, PeerSync, SyncConfig, SyncError, SyncEvent};
pub use ws_client::WsChannel;
