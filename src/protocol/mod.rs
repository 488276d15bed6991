//! Protocol Module
//!
//! Wire format shared by both connection servers: request decoding and
//! reply encoding for the Redis serialization protocol.

mod codec;
mod frame;

pub use codec::{RespCodec, MAX_BULK_LEN, MAX_INLINE_LEN, MAX_MULTIBULK_LEN};
pub use frame::Frame;
