//! Data channel management
//!
//! One duplex text channel per session plus the append-only message log.
//!
//! - [`DataChannelManager`] - Opens/accepts the single active channel
//! - [`DataChannel`] - Tracked channel with state and statistics
//! - [`MessageLog`] - Ordered record of sent and received messages

mod data_channel;
mod messages;

pub use data_channel::{
    ChannelDirection, DataChannel, DataChannelManager, DataChannelState, DataChannelStats,
};
pub use messages::{Message, MessageLog, Origin};
