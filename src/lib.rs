//! OXM match engine for an OpenFlow 1.3/1.4 software switch.
//!
//! This crate is the packet-classification core of a switch: it parses,
//! normalizes and evaluates OXM (OpenFlow eXtensible Match) expressions
//! against parsed packets or against other match expressions, and checks
//! candidate flow entries against a table's declared feature set.
//!
//! The crate is a pure library: every operation is a deterministic function
//! of its arguments plus an [`OxmExtensionRegistry`] the host populates at
//! startup. There is no I/O, no locking and no internal state.
//!
//! The pieces:
//!
//! - [`oxm`] — the TLV codec, the mask algebra, the [`Match`] entity with
//!   its predicates, the extension registry and the textual
//!   `name=value[/mask]` rule codec.
//! - [`table`] — per-table feature declarations and the admission check for
//!   candidate flow entries.
//!
//! The controller channel, message framing, the flow table itself and the
//! packet parser all live in the host; the engine sees packets only through
//! the [`FrameView`] capability.

pub use error::OfpError;

pub trait Repr
where
    Self: Sized,
{
    /// Parse a buffer and return a high-level representation.
    fn parse(buffer: &[u8]) -> Result<Self, OfpError>;

    /// Return the length of the byte stream that will be emitted from this
    /// high-level representation.
    fn buffer_len(&self) -> usize;

    /// Emit a high-level representation into a buffer.
    fn emit(&self, buffer: &mut [u8]) -> Result<(), OfpError>;
}

pub mod error;
pub mod oxm;
mod port;
pub mod table;

pub use error::{BadActionCode, BadInstructionCode, BadMatchCode, TextError};
pub use oxm::flow_match::{BasicOxm, ExperimenterKey, FrameView, Match};
pub use oxm::registry::{OxmExtensionRegistry, OxmHandler, OxmStringer};
pub use port::PortNumber;
