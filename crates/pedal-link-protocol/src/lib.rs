//! Line framing and response parsing for the pedal wire protocol.
//!
//! The wire format is plain UTF-8 text, one command or response per line,
//! terminated by `\n`. This crate provides:
//! - `LineFramer` - Reassemble complete lines from raw byte chunks
//! - `parse_line` / `parse_switch_action` - Classify response lines

pub mod framer;
pub mod parse;

pub use framer::LineFramer;
pub use parse::{DEVICE_SIGNATURE, INFO_COMMAND, Response, parse_line, parse_switch_action};
