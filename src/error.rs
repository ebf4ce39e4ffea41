//! Typed errors surfaced by the match engine.
//!
//! Protocol errors mirror the OpenFlow error message vocabulary: a 16-bit
//! error type and a 16-bit code. The engine only ever raises the subset a
//! match or flow-mod validation path can produce; the host maps
//! [`OfpError::wire_codes`] straight into an error reply.

use thiserror::Error;

/// `OFPET_BAD_MATCH` codes raised by the decoders and `expand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BadMatchCode {
    /// Unsupported match type or OXM class.
    #[error("unsupported oxm type")]
    BadType,
    /// Length problem in the match.
    #[error("bad oxm length")]
    BadLen,
    /// Unsupported value in a match field.
    #[error("unsupported value in match field")]
    BadValue,
    /// Unsupported field type in the match.
    #[error("unsupported field type in match")]
    BadField,
    /// A field type was duplicated.
    #[error("duplicated field type")]
    DupField,
    /// Unsupported combination of fields masked or omitted.
    #[error("unsupported wildcard combination")]
    BadWildcards,
}

/// `OFPET_BAD_INSTRUCTION` codes raised by the feature-policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BadInstructionCode {
    /// Switch or table does not support the instruction.
    #[error("unsupported instruction")]
    UnsupInst,
    /// Invalid table id in a goto-table instruction.
    #[error("invalid goto table id")]
    BadTableId,
    /// Metadata value unsupported by the datapath.
    #[error("unsupported metadata value")]
    UnsupMetadata,
    /// Metadata mask unsupported by the datapath.
    #[error("unsupported metadata mask")]
    UnsupMetadataMask,
}

/// `OFPET_BAD_ACTION` codes raised by the feature-policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BadActionCode {
    /// Unknown or unsupported action type.
    #[error("unsupported action type")]
    BadType,
}

/// A protocol error, as a typed `(type, code)` pair compatible with
/// OpenFlow error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OfpError {
    #[error("bad match: {0}")]
    BadMatch(BadMatchCode),
    #[error("bad instruction: {0}")]
    BadInstruction(BadInstructionCode),
    #[error("bad action: {0}")]
    BadAction(BadActionCode),
}

impl OfpError {
    /// The `(error type, error code)` pair as numbered on the wire.
    pub fn wire_codes(&self) -> (u16, u16) {
        match *self {
            OfpError::BadMatch(code) => {
                let code = match code {
                    BadMatchCode::BadType => 0,
                    BadMatchCode::BadLen => 1,
                    BadMatchCode::BadWildcards => 5,
                    BadMatchCode::BadField => 6,
                    BadMatchCode::BadValue => 7,
                    BadMatchCode::DupField => 10,
                };
                (4, code)
            }
            OfpError::BadInstruction(code) => {
                let code = match code {
                    BadInstructionCode::UnsupInst => 1,
                    BadInstructionCode::BadTableId => 2,
                    BadInstructionCode::UnsupMetadata => 3,
                    BadInstructionCode::UnsupMetadataMask => 4,
                };
                (3, code)
            }
            OfpError::BadAction(code) => {
                let code = match code {
                    BadActionCode::BadType => 0,
                };
                (2, code)
            }
        }
    }
}

impl From<BadMatchCode> for OfpError {
    fn from(code: BadMatchCode) -> Self {
        OfpError::BadMatch(code)
    }
}

impl From<BadInstructionCode> for OfpError {
    fn from(code: BadInstructionCode) -> Self {
        OfpError::BadInstruction(code)
    }
}

impl From<BadActionCode> for OfpError {
    fn from(code: BadActionCode) -> Self {
        OfpError::BadAction(code)
    }
}

/// An error from the textual rule codec. These identify the failing token
/// for humans and are never translated into protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    /// The label does not name a known field and no registered stringer
    /// claimed the token.
    #[error("parse failed at {0:?}")]
    Unknown(String),
    /// A `/mask` was given for a field that cannot take one.
    #[error("{0} is not maskable")]
    NotMaskable(String),
    /// The value (or mask) half of a token did not parse.
    #[error("bad value {value:?} for {label}")]
    BadValue { label: String, value: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_codes() {
        assert_eq!(OfpError::BadMatch(BadMatchCode::BadValue).wire_codes(), (4, 7));
        assert_eq!(OfpError::BadMatch(BadMatchCode::DupField).wire_codes(), (4, 10));
        assert_eq!(
            OfpError::BadInstruction(BadInstructionCode::UnsupInst).wire_codes(),
            (3, 1)
        );
        assert_eq!(OfpError::BadAction(BadActionCode::BadType).wire_codes(), (2, 0));
    }

    #[test]
    fn display() {
        let err = OfpError::BadMatch(BadMatchCode::BadLen);
        assert_eq!(err.to_string(), "bad match: bad oxm length");
    }
}
