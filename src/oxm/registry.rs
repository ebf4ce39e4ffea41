//! Dispatch for experimenter OXM fields.
//!
//! Experimenter payloads are opaque to the engine; everything it needs to
//! do with them goes through an [`OxmHandler`] the host registers per
//! `(oxm_type, experimenter id)` key. The registry is built once at process
//! start and afterwards only read, shared by reference into every
//! operation.

use std::collections::HashMap;

use super::flow_match::ExperimenterKey;
use super::{OxmHeader, CLASS_EXPERIMENTER};
use crate::error::{BadMatchCode, OfpError, TextError};

/// Host-provided behavior of one experimenter OXM field.
///
/// All methods are pure over their byte-slice arguments. `oxm` / bucket
/// arguments may hold several concatenated TLVs of the same key; errors are
/// reserved for malformed payloads.
pub trait OxmHandler {
    /// True iff the raw frame satisfies the bucket.
    fn matches(&self, frame: &[u8], oxm: &[u8]) -> Result<bool, OfpError>;

    /// Apply the bucket to the frame as a set-field action, returning the
    /// rewritten frame.
    fn set_field(&self, frame: &[u8], oxm: &[u8]) -> Result<Vec<u8>, OfpError>;

    /// True iff every packet matching `narrow` also matches the entries of
    /// the same key inside `wide`, a serialized whole match.
    fn fit(&self, narrow: &[u8], wide: &[u8]) -> Result<bool, OfpError>;

    /// True iff no packet can satisfy both buckets. Used for overlap
    /// checks.
    fn conflict(&self, a: &[u8], b: &[u8]) -> Result<bool, OfpError>;

    /// The identifier emitted for this field in table-features replies.
    /// `field` is the 8-byte experimenter header; the returned id caps the
    /// length advertised for variable-length payloads.
    fn oxm_id(&self, field: &[u8]) -> Result<Vec<u8>, OfpError>;

    /// Return a replacement TLV stream for the bucket with all implied
    /// prerequisite entries added. The stream must echo the bucket's own
    /// TLVs; it may add basic entries and entries of other experimenter
    /// keys.
    fn expand(&self, fields: &[u8]) -> Result<Vec<u8>, OfpError>;
}

/// Textual form of an experimenter field, keyed by experimenter id.
pub trait OxmStringer {
    /// Render one TLV as a `name=value` token.
    fn from_oxm(&self, oxm: &[u8]) -> String;

    /// Try to parse a token this stringer owns, returning the TLV bytes and
    /// how much of `txt` was consumed.
    fn to_oxm(&self, txt: &str) -> Result<(Vec<u8>, usize), TextError>;
}

/// The process-wide table of experimenter handlers and stringers.
///
/// Populate before first use; the engine never mutates it.
#[derive(Default)]
pub struct OxmExtensionRegistry {
    handlers: HashMap<ExperimenterKey, Box<dyn OxmHandler>>,
    stringers: HashMap<u32, Box<dyn OxmStringer>>,
}

impl OxmExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `(oxm_type, experimenter)`. The type's
    /// has-mask and length bits are ignored; its class must be
    /// `EXPERIMENTER`.
    pub fn register(
        &mut self,
        oxm_type: u32,
        experimenter: u32,
        handler: Box<dyn OxmHandler>,
    ) -> Result<(), OfpError> {
        let header = OxmHeader(oxm_type);
        if header.class() != CLASS_EXPERIMENTER {
            return Err(BadMatchCode::BadType.into());
        }
        let key = ExperimenterKey {
            oxm_type: header.oxm_type(),
            experimenter,
        };
        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Register the textual form for an experimenter id.
    pub fn register_stringer(&mut self, experimenter: u32, stringer: Box<dyn OxmStringer>) {
        self.stringers.insert(experimenter, stringer);
    }

    pub fn handler(&self, key: &ExperimenterKey) -> Option<&dyn OxmHandler> {
        self.handlers.get(key).map(|handler| &**handler)
    }

    pub fn stringer(&self, experimenter: u32) -> Option<&dyn OxmStringer> {
        self.stringers.get(&experimenter).map(|stringer| &**stringer)
    }

    /// All registered stringers, for parsing tokens with unknown labels.
    pub fn stringers(&self) -> impl Iterator<Item = &dyn OxmStringer> {
        self.stringers.values().map(|stringer| &**stringer)
    }
}
