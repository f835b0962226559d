//! Tokio codec for newline-delimited JSON records.
//!
//! Every record on the wire is one JSON object followed by `\n`. The decoder
//! yields [`Inbound`] values: well-formed objects become
//! [`Inbound::Record`], anything else becomes [`Inbound::Malformed`] so a bad
//! line never tears down the session. Only a line that outgrows the frame
//! limit is a decode error.
//!
//! ```rust,no_run
//! use acs_protocol::{AcsCodec, Outbound, OutboundBody};
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> acs_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:4000").await?;
//! let mut framed = Framed::new(stream, AcsCodec::new());
//!
//! framed.send(Outbound::new(0, OutboundBody::message("hello"))).await?;
//! if let Some(Ok(inbound)) = framed.next().await {
//!     println!("Received: {:?}", inbound);
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Inbound, Outbound, parse_inbound};
use acs_core::constants::MAX_FRAME_SIZE;
use acs_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct AcsCodec {
    /// Longest accepted line, terminator excluded.
    max_frame_size: usize,
}

impl AcsCodec {
    /// Codec with the default 64 KiB line limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn too_large(&self, size: usize) -> Error {
        Error::FrameTooLarge {
            size,
            max_size: self.max_frame_size,
        }
    }
}

impl Default for AcsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcsCodec {
    type Item = Inbound;
    type Error = Error;

    /// Decode the next non-empty line.
    ///
    /// # Errors
    /// Returns `Error::FrameTooLarge` when a line (complete or still
    /// buffering) exceeds the frame limit.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_frame_size {
                    return Err(self.too_large(src.len()));
                }
                return Ok(None);
            };

            let line = src.split_to(pos + 1);
            let mut body = &line[..pos];
            if let [rest @ .., b'\r'] = body {
                body = rest;
            }
            if body.len() > self.max_frame_size {
                return Err(self.too_large(body.len()));
            }
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(parse_inbound(body)));
        }
    }
}

impl Encoder<Outbound> for AcsCodec {
    type Error = Error;

    /// Serialize `item` as one line.
    ///
    /// # Errors
    /// Returns `Error::FrameTooLarge` if the serialized record exceeds the
    /// frame limit. Nothing is written in that case.
    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)?;
        if json.len() > self.max_frame_size {
            return Err(self.too_large(json.len()));
        }
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
