use thiserror::Error;

/// Structural failure while decoding a snapshot or state frame.
///
/// Unknown fields are never an error; they are carried as extensions.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad frame magic {found:?}")]
    BadMagic { found: [u8; 4] },

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("malformed body for field {tag}: {reason}")]
    Field { tag: u16, reason: String },

    #[error("field {0} appears more than once")]
    DuplicateTag(u16),

    #[error("slot {slot} appears more than once in field {tag}")]
    DuplicateSlot { tag: u16, slot: String },

    #[error("required field {0} is missing")]
    MissingField(&'static str),
}

impl DecodeError {
    pub(crate) fn field(tag: u16, err: impl std::fmt::Display) -> Self {
        Self::Field {
            tag,
            reason: err.to_string(),
        }
    }
}
