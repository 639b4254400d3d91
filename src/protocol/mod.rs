//! Wire protocol shared by the chat server and client.
//!
//! Every client message is one frame: a fixed-width header followed by
//! the UTF-8 payload it describes.
//!
//! ## Frame Format
//!
//! ```text
//! +------------------------------+---------------------+
//! | header (header_width bytes)  | payload (N bytes)   |
//! +------------------------------+---------------------+
//!
//! header: N as ASCII decimal, left-aligned, right-padded with spaces
//!
//! Example (header_width = 64):
//! "5" + 63 spaces + "hello"
//! ```
//!
//! ## Replies
//!
//! The server answers each frame with a fixed acknowledgment written as raw
//! UTF-8 bytes, not framed. The client reads it with a single bounded read.
//!
//! ## Disconnect
//!
//! A frame whose payload is the disconnect sentinel (`!Disconnect` by
//! default) ends the session. It is an ordinary frame on the wire.

pub mod codec;
pub mod error;

pub use codec::FrameCodec;
pub use error::FrameError;
