//! Wire protocol between a terminal and its backend.

pub mod codec;
pub mod message;

pub use codec::AcsCodec;
pub use message::{
    AuthRecord, Directive, Handshake, Inbound, Outbound, OutboundBody, StatusReport, TextMessage,
    parse_inbound,
};
