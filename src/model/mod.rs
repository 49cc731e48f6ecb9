//! Wire event shape and the validator that classifies it (C1).

mod event;
mod validator;

pub use event::{value_to_sequence, value_to_string, BookSide, DoneReason, ParsedEvent, RawEvent};
pub use validator::{format_errors, should_process, FormatError};
