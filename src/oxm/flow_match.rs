//! The in-memory representation of an OXM set and the predicates over it.
//!
//! A [`Match`] keeps standardized fields as a list of [`BasicOxm`] entries
//! and experimenter fields as opaque per-key TLV buckets. Flow-table
//! administration (overlap, strict delete, stats queries) reduces to the
//! [`fits`](Match::fits) / [`conflicts`](Match::conflicts) /
//! [`equal`](Match::equal) predicates over [`expand`](Match::expand)ed
//! operands; runtime classification uses [`matches`](Match::matches)
//! directly on the user-supplied entries.

use std::collections::HashMap;

use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use super::registry::OxmExtensionRegistry;
use super::{fields, mask, tlv_split, OxmHeader, CLASS_EXPERIMENTER, CLASS_OPEN_FLOW_BASIC, OXM_HEADER_LEN};
use crate::error::{BadMatchCode, OfpError};
use crate::port::PortNumber;
use crate::Repr;

/// The engine's view of a parsed packet.
///
/// The packet parser lives in the host pipeline; predicates only need field
/// lookup plus the raw bytes for experimenter handlers. A field that is not
/// present in the packet (missing header, failed prerequisite) is `None`.
pub trait FrameView {
    /// Canonical payload bytes for a standardized field.
    fn get_value(&self, oxm_type: u32) -> Option<Vec<u8>>;

    /// The raw frame bytes.
    fn raw_bytes(&self) -> &[u8];
}

/// A single `OPENFLOW_BASIC` entry.
///
/// `oxm_type` carries only the class and field bits. A zero mask bit means
/// "don't care"; an absent mask means the field is fully exact. Value bytes
/// outside the mask are not significant for matching but survive
/// round-trips unchanged.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BasicOxm {
    pub oxm_type: u32,
    pub value: Vec<u8>,
    pub mask: Option<Vec<u8>>,
}

impl BasicOxm {
    pub fn new(oxm_type: u32, value: Vec<u8>, mask: Option<Vec<u8>>) -> Self {
        BasicOxm {
            oxm_type,
            value,
            mask,
        }
    }

    pub fn uint8(oxm_type: u32, value: u8) -> Self {
        BasicOxm::new(oxm_type, vec![value], None)
    }

    pub fn uint16(oxm_type: u32, value: u16, mask: Option<u16>) -> Self {
        let mut buf = vec![0; 2];
        NetworkEndian::write_u16(&mut buf, value);
        let mask = mask.map(|mask| {
            let mut buf = vec![0; 2];
            NetworkEndian::write_u16(&mut buf, mask);
            buf
        });
        BasicOxm::new(oxm_type, buf, mask)
    }

    /// 24-bit value packed big-endian, as `pbb_isid` is encoded.
    pub fn uint24(oxm_type: u32, value: u32, mask: Option<u32>) -> Self {
        let pack = |v: u32| vec![(v >> 16) as u8, (v >> 8) as u8, v as u8];
        BasicOxm::new(oxm_type, pack(value), mask.map(pack))
    }

    pub fn uint32(oxm_type: u32, value: u32, mask: Option<u32>) -> Self {
        let mut buf = vec![0; 4];
        NetworkEndian::write_u32(&mut buf, value);
        let mask = mask.map(|mask| {
            let mut buf = vec![0; 4];
            NetworkEndian::write_u32(&mut buf, mask);
            buf
        });
        BasicOxm::new(oxm_type, buf, mask)
    }

    pub fn uint64(oxm_type: u32, value: u64, mask: Option<u64>) -> Self {
        let mut buf = vec![0; 8];
        NetworkEndian::write_u64(&mut buf, value);
        let mask = mask.map(|mask| {
            let mut buf = vec![0; 8];
            NetworkEndian::write_u64(&mut buf, mask);
            buf
        });
        BasicOxm::new(oxm_type, buf, mask)
    }

    pub fn port(oxm_type: u32, value: PortNumber) -> Self {
        BasicOxm::uint32(oxm_type, value.into(), None)
    }

    pub fn ethernet(oxm_type: u32, value: EthernetAddress, mask: Option<EthernetAddress>) -> Self {
        BasicOxm::new(
            oxm_type,
            value.as_bytes().to_vec(),
            mask.map(|mask| mask.as_bytes().to_vec()),
        )
    }

    pub fn ipv4(oxm_type: u32, value: Ipv4Address, mask: Option<Ipv4Address>) -> Self {
        BasicOxm::new(
            oxm_type,
            value.as_bytes().to_vec(),
            mask.map(|mask| mask.as_bytes().to_vec()),
        )
    }

    pub fn ipv6(oxm_type: u32, value: [u8; 16], mask: Option<[u8; 16]>) -> Self {
        BasicOxm::new(oxm_type, value.to_vec(), mask.map(|mask| mask.to_vec()))
    }

    /// True iff a frame carrying `value` for this field satisfies the entry.
    pub fn matches(&self, frame_value: &[u8]) -> bool {
        frame_value.len() == self.value.len()
            && frame_value
                .iter()
                .zip(&self.value)
                .enumerate()
                .all(|(i, (frame, own))| {
                    let m = self.mask.as_ref().map_or(0xff, |mask| mask[i]);
                    frame & m == *own
                })
    }

    /// True iff every value this entry accepts is also accepted by `query`:
    /// the query's constrained bits are all constrained here, and the two
    /// values agree on them.
    pub fn fits_within(&self, query: &BasicOxm) -> bool {
        if self.oxm_type != query.oxm_type {
            return false; // callers pair entries up by type
        }
        mask::covers(self.mask.as_deref(), query.mask.as_deref())
            && mask::masked_eq(&self.value, &query.value, query.mask.as_deref())
    }

    /// True iff no value can satisfy both entries.
    pub fn conflicts(&self, other: &BasicOxm) -> bool {
        if self.oxm_type != other.oxm_type {
            return false; // callers pair entries up by type
        }
        mask::conflict(
            &self.value,
            self.mask.as_deref(),
            &other.value,
            other.mask.as_deref(),
        )
    }
}

impl Repr for BasicOxm {
    fn parse(buffer: &[u8]) -> Result<Self, OfpError> {
        let header = OxmHeader::from_slice(buffer);
        if header.class() != CLASS_OPEN_FLOW_BASIC {
            return Err(BadMatchCode::BadType.into());
        }
        let spec = fields::spec_of(header.oxm_type()).ok_or(OfpError::BadMatch(BadMatchCode::BadField))?;
        let expected = if header.has_mask() {
            spec.payload_len * 2
        } else {
            spec.payload_len
        };
        if header.length() != expected || buffer.len() != OXM_HEADER_LEN + expected {
            return Err(BadMatchCode::BadLen.into());
        }
        let payload = &buffer[OXM_HEADER_LEN..];
        let (value, mask) = if header.has_mask() {
            (
                payload[..spec.payload_len].to_vec(),
                Some(payload[spec.payload_len..].to_vec()),
            )
        } else {
            (payload.to_vec(), None)
        };
        Ok(BasicOxm::new(header.oxm_type(), value, mask))
    }

    fn buffer_len(&self) -> usize {
        let payload_len = match fields::spec_of(self.oxm_type) {
            Some(spec) if spec.maskable && self.mask.is_some() => spec.payload_len * 2,
            Some(spec) => spec.payload_len,
            None => self.value.len(),
        };
        OXM_HEADER_LEN + payload_len
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<(), OfpError> {
        let spec = fields::spec_of(self.oxm_type).ok_or(OfpError::BadMatch(BadMatchCode::BadField))?;
        if self.buffer_len() > buffer.len() {
            return Err(BadMatchCode::BadLen.into());
        }
        let mut header = OxmHeader(self.oxm_type);
        // a mask on a non-maskable field is silently dropped on the wire
        let mask = if spec.maskable { self.mask.as_deref() } else { None };
        header.set_mask(mask.is_some());
        header.set_length(if mask.is_some() {
            spec.payload_len * 2
        } else {
            spec.payload_len
        });
        NetworkEndian::write_u32(&mut buffer[..OXM_HEADER_LEN], header.0);

        let payload = &mut buffer[OXM_HEADER_LEN..];
        for byte in payload[..spec.payload_len].iter_mut() {
            *byte = 0;
        }
        let n = self.value.len().min(spec.payload_len);
        payload[..n].copy_from_slice(&self.value[..n]);
        if let Some(mask_bytes) = mask {
            let target = &mut payload[spec.payload_len..spec.payload_len * 2];
            for byte in target.iter_mut() {
                *byte = 0;
            }
            let n = mask_bytes.len().min(spec.payload_len);
            target[..n].copy_from_slice(&mask_bytes[..n]);
        }
        Ok(())
    }
}

/// Identity of an experimenter bucket: the experimenter-class `oxm_type`
/// plus the 4-byte experimenter id leading its payload.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ExperimenterKey {
    pub oxm_type: u32,
    pub experimenter: u32,
}

/// An OXM set: standardized entries plus experimenter buckets.
///
/// Multiple experimenter TLVs sharing a key concatenate into one bucket;
/// the registered handler decides the bucket's internal structure.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Match {
    pub basic: Vec<BasicOxm>,
    pub exp: HashMap<ExperimenterKey, Vec<u8>>,
}

impl Repr for Match {
    fn parse(buffer: &[u8]) -> Result<Self, OfpError> {
        let mut parsed = Match::default();
        for tlv in tlv_split(buffer) {
            let header = OxmHeader::from_slice(tlv);
            if tlv.len() != OXM_HEADER_LEN + header.length() {
                return Err(BadMatchCode::BadLen.into());
            }
            match header.class() {
                CLASS_OPEN_FLOW_BASIC => parsed.basic.push(BasicOxm::parse(tlv)?),
                CLASS_EXPERIMENTER => {
                    if tlv.len() < 8 {
                        return Err(BadMatchCode::BadLen.into());
                    }
                    let key = ExperimenterKey {
                        oxm_type: header.oxm_type(),
                        experimenter: NetworkEndian::read_u32(&tlv[4..8]),
                    };
                    parsed.exp.entry(key).or_default().extend_from_slice(tlv);
                }
                _ => return Err(BadMatchCode::BadType.into()),
            }
        }
        Ok(parsed)
    }

    fn buffer_len(&self) -> usize {
        self.basic.iter().map(Repr::buffer_len).sum::<usize>()
            + self.exp.values().map(Vec::len).sum::<usize>()
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<(), OfpError> {
        if self.buffer_len() > buffer.len() {
            return Err(BadMatchCode::BadLen.into());
        }
        let mut offset = 0;
        for entry in &self.basic {
            entry.emit(&mut buffer[offset..offset + entry.buffer_len()])?;
            offset += entry.buffer_len();
        }
        for bucket in self.exp.values() {
            buffer[offset..offset + bucket.len()].copy_from_slice(bucket);
            offset += bucket.len();
        }
        Ok(())
    }
}

impl Match {
    pub fn is_empty(&self) -> bool {
        self.basic.is_empty() && self.exp.is_empty()
    }

    /// Serialize into a fresh buffer: basics in their current order, then
    /// the experimenter buckets.
    pub fn to_bytes(&self) -> Result<Vec<u8>, OfpError> {
        let mut buffer = vec![0; self.buffer_len()];
        self.emit(&mut buffer)?;
        Ok(buffer)
    }

    /// Runtime classification: true iff the frame satisfies every basic
    /// entry and every experimenter bucket.
    ///
    /// Tolerates non-canonical operands: an entry whose prerequisite does
    /// not hold simply finds its field absent and fails to match. A bucket
    /// with no registered handler never matches; a handler error is logged
    /// and treated the same way, since classification must not raise.
    pub fn matches<F: FrameView>(&self, frame: &F, registry: &OxmExtensionRegistry) -> bool {
        for entry in &self.basic {
            match frame.get_value(entry.oxm_type) {
                Some(value) if entry.matches(&value) => {}
                _ => return false,
            }
        }
        if !self.exp.is_empty() {
            let raw = frame.raw_bytes();
            for (key, bucket) in &self.exp {
                let Some(handler) = registry.handler(key) else {
                    return false;
                };
                match handler.matches(raw, bucket) {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(err) => {
                        log::warn!("experimenter oxm match failed: {}", err);
                        return false;
                    }
                }
            }
        }
        true
    }

    /// True iff every packet matching `self` (the rule) also matches
    /// `target` (the query). Both operands must be expanded.
    ///
    /// Query entries for types the rule does not carry impose no
    /// constraint.
    pub fn fits(&self, target: &Match, registry: &OxmExtensionRegistry) -> Result<bool, OfpError> {
        for query in &target.basic {
            for rule in &self.basic {
                if rule.oxm_type == query.oxm_type && !rule.fits_within(query) {
                    return Ok(false);
                }
            }
        }
        if !self.exp.is_empty() {
            let serialized = target.to_bytes()?;
            for (key, bucket) in &self.exp {
                let handler = registry
                    .handler(key)
                    .ok_or(OfpError::BadMatch(BadMatchCode::BadType))?;
                if !handler.fit(bucket, &serialized)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// True iff no packet can satisfy both matches. Both operands must be
    /// expanded. Used for `OFPFF_CHECK_OVERLAP`.
    pub fn conflicts(&self, target: &Match, registry: &OxmExtensionRegistry) -> Result<bool, OfpError> {
        for theirs in &target.basic {
            for ours in &self.basic {
                if ours.conflicts(theirs) {
                    return Ok(true);
                }
            }
        }
        for (key, theirs) in &target.exp {
            if let Some(ours) = self.exp.get(key) {
                let handler = registry
                    .handler(key)
                    .ok_or(OfpError::BadMatch(BadMatchCode::BadType))?;
                if handler.conflict(ours, theirs)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Semantic equality: both matches accept exactly the same packets.
    pub fn equal(&self, target: &Match, registry: &OxmExtensionRegistry) -> Result<bool, OfpError> {
        let ours = self.expand(registry)?;
        let theirs = target.expand(registry)?;
        Ok(ours.fits(&theirs, registry)? && theirs.fits(&ours, registry)?)
    }

    /// Produce the canonical form used by the admin-path predicates:
    /// basics deduplicated by type, experimenter buckets rebuilt from their
    /// handlers' `expand` output, implied prerequisites inserted to a
    /// fixpoint, and the basic list sorted by `(type, value, mask)`.
    pub fn expand(&self, registry: &OxmExtensionRegistry) -> Result<Match, OfpError> {
        let mut by_type: HashMap<u32, BasicOxm> = HashMap::new();
        let mut exp_sets: HashMap<ExperimenterKey, Vec<Vec<u8>>> = HashMap::new();

        fn add_basic(by_type: &mut HashMap<u32, BasicOxm>, entry: &BasicOxm) -> Result<(), OfpError> {
            match by_type.get(&entry.oxm_type) {
                None => {
                    by_type.insert(entry.oxm_type, entry.clone());
                    Ok(())
                }
                Some(present) if present == entry => Ok(()),
                Some(_) => Err(BadMatchCode::BadValue.into()),
            }
        }

        for entry in &self.basic {
            add_basic(&mut by_type, entry)?;
        }

        // Each handler returns a replacement TLV stream for its bucket; it
        // must echo its own TLVs along with whatever it infers.
        for (key, bucket) in &self.exp {
            let handler = registry
                .handler(key)
                .ok_or(OfpError::BadMatch(BadMatchCode::BadType))?;
            let stream = handler.expand(bucket)?;
            let full = Match::parse(&stream)?;
            for entry in &full.basic {
                add_basic(&mut by_type, entry)?;
            }
            for (key, tlvs) in &full.exp {
                let set = exp_sets.entry(*key).or_default();
                for tlv in tlv_split(tlvs) {
                    if !set.iter().any(|have| have == tlv) {
                        set.push(tlv.to_vec());
                    }
                }
            }
        }

        let mut queue: Vec<BasicOxm> = by_type.values().cloned().collect();
        while let Some(entry) = queue.pop() {
            let Some(prereq) = fields::prerequisite(&entry) else {
                continue;
            };
            match by_type.get(&prereq.oxm_type) {
                None => {
                    by_type.insert(prereq.oxm_type, prereq.clone());
                    queue.push(prereq);
                }
                Some(present) => {
                    // a present entry must already satisfy the prerequisite
                    let compatible = mask::masked_eq(&present.value, &prereq.value, prereq.mask.as_deref())
                        && mask::covers(present.mask.as_deref(), prereq.mask.as_deref());
                    if !compatible {
                        return Err(BadMatchCode::BadValue.into());
                    }
                }
            }
        }

        let mut basic: Vec<BasicOxm> = by_type.into_values().collect();
        basic.sort_by(|a, b| {
            a.oxm_type
                .cmp(&b.oxm_type)
                .then_with(|| a.value.cmp(&b.value))
                .then_with(|| a.mask.cmp(&b.mask))
        });
        let exp = exp_sets
            .into_iter()
            .map(|(key, tlvs)| (key, tlvs.concat()))
            .collect();
        Ok(Match { basic, exp })
    }

    /// Pairwise union of same-type basic entries: for each pair, a masked
    /// entry covering both, dropping pairs whose only cover is the full
    /// wildcard. Hosts use this to build common cover entries over a set of
    /// flows.
    pub fn union(&self, other: &Match) -> Vec<BasicOxm> {
        let mut entries = Vec::new();
        for ours in &self.basic {
            for theirs in &other.basic {
                if ours.oxm_type != theirs.oxm_type {
                    continue;
                }
                if let Some((value, mask)) = mask::union(
                    &ours.value,
                    ours.mask.as_deref(),
                    &theirs.value,
                    theirs.mask.as_deref(),
                ) {
                    entries.push(BasicOxm::new(ours.oxm_type, value, Some(mask)));
                }
            }
        }
        entries
    }
}
