//! End-to-end tests: the text codec, the predicates and the feature policy
//! driven through a registered experimenter extension and a fake frame.

use std::collections::HashMap;

use ofmatch::oxm::fields::{ETH_TYPE, IN_PORT, IPV4_SRC, IP_PROTO, TCP_SRC};
use ofmatch::oxm::{text, tlv_split, OxmHeader};
use ofmatch::table::{FeaturePolicy, FlowEntry, OxmKey};
use ofmatch::{
    BadMatchCode, BasicOxm, ExperimenterKey, FrameView, Match, OfpError, OxmExtensionRegistry,
    OxmHandler, OxmStringer, Repr, TextError,
};

/// Experimenter id and field type used by the test extension.
const TAG_EXPERIMENTER: u32 = 0x00ca_fe00;
const TAG_TYPE: u32 = 0xffff_0200;

/// Build the test extension's TLV: a one-byte tag the frame must lead with.
fn tag_tlv(tag: u8) -> Vec<u8> {
    let mut tlv = vec![0xff, 0xff, 0x02, 0x05];
    tlv.extend_from_slice(&TAG_EXPERIMENTER.to_be_bytes());
    tlv.push(tag);
    tlv
}

fn tag_key() -> ExperimenterKey {
    ExperimenterKey {
        oxm_type: TAG_TYPE,
        experimenter: TAG_EXPERIMENTER,
    }
}

fn tag_of(bucket: &[u8]) -> Option<u8> {
    tlv_split(bucket).next().and_then(|tlv| tlv.get(8).copied())
}

struct TagExtension;

impl OxmHandler for TagExtension {
    fn matches(&self, frame: &[u8], oxm: &[u8]) -> Result<bool, OfpError> {
        let tag = tag_of(oxm).ok_or(OfpError::BadMatch(BadMatchCode::BadLen))?;
        Ok(frame.first() == Some(&tag))
    }

    fn set_field(&self, frame: &[u8], oxm: &[u8]) -> Result<Vec<u8>, OfpError> {
        let tag = tag_of(oxm).ok_or(OfpError::BadMatch(BadMatchCode::BadLen))?;
        let mut frame = frame.to_vec();
        if let Some(first) = frame.first_mut() {
            *first = tag;
        }
        Ok(frame)
    }

    fn fit(&self, narrow: &[u8], wide: &[u8]) -> Result<bool, OfpError> {
        // the serialized query fits when it carries no tag or the same tag
        let own = tag_of(narrow).ok_or(OfpError::BadMatch(BadMatchCode::BadLen))?;
        for tlv in tlv_split(wide) {
            let header = OxmHeader::from_slice(tlv);
            if header.oxm_type() == TAG_TYPE && tlv.get(8) != Some(&own) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn conflict(&self, a: &[u8], b: &[u8]) -> Result<bool, OfpError> {
        Ok(tag_of(a) != tag_of(b))
    }

    fn oxm_id(&self, field: &[u8]) -> Result<Vec<u8>, OfpError> {
        Ok(field.get(..8).unwrap_or(field).to_vec())
    }

    fn expand(&self, fields: &[u8]) -> Result<Vec<u8>, OfpError> {
        // the tag only exists on IPv4 frames: echo the bucket and add the
        // implied ethertype
        let mut stream = fields.to_vec();
        let eth = BasicOxm::uint16(ETH_TYPE, 0x0800, None);
        let mut tlv = vec![0; eth.buffer_len()];
        eth.emit(&mut tlv)?;
        stream.extend_from_slice(&tlv);
        Ok(stream)
    }
}

struct TagStringer;

impl OxmStringer for TagStringer {
    fn from_oxm(&self, oxm: &[u8]) -> String {
        match tag_of(oxm) {
            Some(tag) => format!("tag={}", tag),
            None => "?".to_string(),
        }
    }

    fn to_oxm(&self, txt: &str) -> Result<(Vec<u8>, usize), TextError> {
        let rest = txt
            .strip_prefix("tag=")
            .ok_or_else(|| TextError::Unknown(txt.to_string()))?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let tag: u8 = digits
            .parse()
            .map_err(|_| TextError::Unknown(txt.to_string()))?;
        Ok((tag_tlv(tag), "tag=".len() + digits.len()))
    }
}

fn registry() -> OxmExtensionRegistry {
    let mut registry = OxmExtensionRegistry::new();
    registry
        .register(TAG_TYPE, TAG_EXPERIMENTER, Box::new(TagExtension))
        .unwrap();
    registry.register_stringer(TAG_EXPERIMENTER, Box::new(TagStringer));
    registry
}

/// A frame made of a field map plus raw bytes.
#[derive(Default)]
struct TestFrame {
    fields: HashMap<u32, Vec<u8>>,
    raw: Vec<u8>,
}

impl TestFrame {
    fn with(mut self, oxm_type: u32, value: &[u8]) -> Self {
        self.fields.insert(oxm_type, value.to_vec());
        self
    }
}

impl FrameView for TestFrame {
    fn get_value(&self, oxm_type: u32) -> Option<Vec<u8>> {
        self.fields.get(&oxm_type).cloned()
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}

fn http_frame() -> TestFrame {
    TestFrame::default()
        .with(IN_PORT, &[0, 0, 0, 1])
        .with(ETH_TYPE, &[0x08, 0x00])
        .with(IP_PROTO, &[6])
        .with(IPV4_SRC, &[10, 1, 2, 3])
        .with(TCP_SRC, &[0x00, 0x50])
}

#[test]
fn classify_from_text_rule() {
    let reg = registry();
    let rule = text::parse("in_port=1,eth_type=0x0800,ipv4_src=10.0.0.0/8", &reg).unwrap();

    assert!(rule.matches(&http_frame(), &reg));

    let elsewhere = http_frame().with(IPV4_SRC, &[192, 168, 0, 1]);
    assert!(!rule.matches(&elsewhere, &reg));

    // a frame without the field cannot match
    let mut no_ip = TestFrame::default().with(IN_PORT, &[0, 0, 0, 1]);
    no_ip.fields.insert(ETH_TYPE, vec![0x08, 0x06]);
    assert!(!rule.matches(&no_ip, &reg));
}

#[test]
fn runtime_match_consults_the_handler() {
    let reg = registry();
    let mut rule = Match::default();
    rule.exp.insert(tag_key(), tag_tlv(0x42));

    let mut frame = TestFrame::default();
    frame.raw = vec![0x42, 0, 0];
    assert!(rule.matches(&frame, &reg));

    frame.raw = vec![0x41, 0, 0];
    assert!(!rule.matches(&frame, &reg));

    // no handler registered: the bucket can never match
    let empty = OxmExtensionRegistry::new();
    frame.raw = vec![0x42, 0, 0];
    assert!(!rule.matches(&frame, &empty));
}

#[test]
fn expand_runs_the_handler() {
    let reg = registry();
    let mut rule = Match::default();
    rule.exp.insert(tag_key(), tag_tlv(7));

    let expanded = rule.expand(&reg).unwrap();
    // the handler declared the IPv4 ethertype as its prerequisite
    assert!(expanded
        .basic
        .iter()
        .any(|entry| entry.oxm_type == ETH_TYPE && entry.value == [0x08, 0x00]));
    assert_eq!(expanded.exp.get(&tag_key()).map(Vec::as_slice), Some(&tag_tlv(7)[..]));

    // without the handler the bucket cannot be expanded
    let empty = OxmExtensionRegistry::new();
    assert_eq!(
        rule.expand(&empty).unwrap_err(),
        OfpError::BadMatch(BadMatchCode::BadType)
    );
}

#[test]
fn admin_predicates_delegate_to_the_handler() {
    let reg = registry();
    let mut red = Match::default();
    red.exp.insert(tag_key(), tag_tlv(1));
    let mut blue = Match::default();
    blue.exp.insert(tag_key(), tag_tlv(2));

    let red = red.expand(&reg).unwrap();
    let blue = blue.expand(&reg).unwrap();

    assert!(red.fits(&red, &reg).unwrap());
    assert!(!red.fits(&blue, &reg).unwrap());
    assert!(red.conflicts(&blue, &reg).unwrap());
    assert!(!red.conflicts(&red, &reg).unwrap());
    assert!(red.equal(&red, &reg).unwrap());
    assert!(!red.equal(&blue, &reg).unwrap());
}

#[test]
fn admin_predicates_require_the_handler() {
    // a rule with a bucket cannot be compared without its handler
    let reg = registry();
    let mut rule = Match::default();
    rule.exp.insert(tag_key(), tag_tlv(1));
    let rule = rule.expand(&reg).unwrap();

    let empty = OxmExtensionRegistry::new();
    assert_eq!(
        rule.fits(&Match::default(), &empty).unwrap_err(),
        OfpError::BadMatch(BadMatchCode::BadType)
    );
}

#[test]
fn text_round_trip_through_the_stringer() {
    let reg = registry();
    let rule = text::parse("tag=5 tcp_src=80", &reg).unwrap();
    assert_eq!(rule.exp.get(&tag_key()).map(Vec::as_slice), Some(&tag_tlv(5)[..]));

    let rendered = text::to_text(&rule, &reg);
    let reparsed = text::parse(&rendered, &reg).unwrap();
    assert_eq!(rule, reparsed);
}

#[test]
fn wire_round_trip_with_experimenter_bucket() {
    let reg = registry();
    let rule = text::parse("tcp_src=80,tag=9", &reg).unwrap();
    let expanded = rule.expand(&reg).unwrap();

    let bytes = expanded.to_bytes().unwrap();
    let reparsed = Match::parse(&bytes).unwrap();
    // prerequisite entries carry explicit all-ones masks in memory but
    // non-maskable fields shed them on the wire, so compare semantically
    assert!(reparsed.equal(&expanded, &reg).unwrap());
    assert_eq!(reparsed.exp, expanded.exp);
}

#[test]
fn subset_query_catches_narrower_flow() {
    let reg = registry();
    let query = text::parse("ipv4_src=10.0.0.0/8", &reg)
        .unwrap()
        .expand(&reg)
        .unwrap();
    let flow = text::parse("ipv4_src=10.1.0.0/255.255.0.0 tcp_src=80", &reg)
        .unwrap()
        .expand(&reg)
        .unwrap();

    // a delete with the query match must catch the narrower flow
    assert!(flow.fits(&query, &reg).unwrap());
    assert!(!query.fits(&flow, &reg).unwrap());

    // every frame the flow matches also satisfies the query
    let frame = http_frame();
    assert!(flow.matches(&frame, &reg));
    assert!(query.matches(&frame, &reg));
}

#[test]
fn feature_policy_admits_expanded_match() {
    let reg = registry();
    let fields = text::parse("tcp_src=80", &reg).unwrap().expand(&reg).unwrap();

    let mut policy = FeaturePolicy::default();
    policy.match_fields = Some(vec![
        OxmKey::Basic(ETH_TYPE),
        OxmKey::Basic(IP_PROTO),
        OxmKey::Basic(TCP_SRC),
        OxmKey::Basic(IN_PORT),
    ]);
    policy.wildcards = Some(vec![OxmKey::Basic(IN_PORT)]);

    let entry = FlowEntry {
        fields,
        instructions: vec![],
    };
    assert!(policy.accepts(&entry, 10).is_ok());

    // dropping the wildcard declaration makes in_port mandatory
    policy.wildcards = None;
    assert_eq!(
        policy.accepts(&entry, 10).unwrap_err(),
        OfpError::BadMatch(BadMatchCode::BadWildcards)
    );
}
