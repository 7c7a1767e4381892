//! Newline-delimited message framing.
//!
//! Every message on the wire is one line of text:
//! - terminated by `\n`
//! - trimmed of surrounding whitespace on receipt
//! - dropped entirely when nothing is left after trimming
//!
//! [`LineFramer`] turns arbitrarily split reads back into whole [`Message`]s and
//! keeps the trailing partial record until the rest of it arrives.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use buffer::{ByteBuffer, DEFAULT_MAX_BUFFER_SIZE, INITIAL_BUFFER_CAPACITY};
pub use codec::{encode_line, trim_line, LineFramer};
pub use error::{FrameError, Result};
pub use message::Message;
pub use reader::LineReader;
pub use writer::LineWriter;
