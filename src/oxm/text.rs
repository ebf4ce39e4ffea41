//! The textual rule grammar: `name=value[/mask]` tokens.
//!
//! Tokens are separated by `','` or Unicode whitespace, whichever suits the
//! environment: commas survive unquoted in shell arguments and CSV cells,
//! whitespace reads better in files. Consecutive separators collapse, so
//! empty CSV entries are harmless.
//!
//! Each label maps to a fixed OXM type; the value grammar depends on the
//! field's width (decimal or `0x`-hex for numerics, colon- or hyphen-form
//! MACs, dotted-quad or CIDR IPv4, IPv6 literals). Unknown labels are
//! offered to the registered experimenter stringers, first success wins.

use std::fmt::Write;
use std::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use super::fields::*;
use super::flow_match::{BasicOxm, Match};
use super::registry::OxmExtensionRegistry;
use super::tlv_split;
use crate::error::TextError;
use crate::port::PortNumber;
use crate::Repr;

/// The token separator class.
pub fn is_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

/// Parse a whole rule into a [`Match`].
pub fn parse(txt: &str, registry: &OxmExtensionRegistry) -> Result<Match, TextError> {
    let mut parsed = Match::default();
    let mut rest = txt.trim_matches(is_separator);
    while !rest.is_empty() {
        let (tlv, eaten) = parse_one(rest, registry)?;
        let chunk =
            Match::parse(&tlv).map_err(|_| TextError::Unknown(rest[..eaten].to_string()))?;
        parsed.basic.extend(chunk.basic);
        for (key, bucket) in chunk.exp {
            parsed.exp.entry(key).or_default().extend(bucket);
        }
        rest = rest[eaten..].trim_start_matches(is_separator);
    }
    Ok(parsed)
}

/// Parse one leading token, returning its TLV bytes and the number of
/// bytes of `txt` consumed.
pub fn parse_one(txt: &str, registry: &OxmExtensionRegistry) -> Result<(Vec<u8>, usize), TextError> {
    if let Some(label_end) = txt.find('=') {
        if label_end > 0 {
            let label = &txt[..label_end];
            let args = &txt[label_end + 1..];
            let (value, mask, arg_len) = split_pair(args);
            if let Some(entry) = parse_basic(label, value, mask)? {
                let mut tlv = vec![0; entry.buffer_len()];
                entry.emit(&mut tlv).map_err(|_| bad_value(label, value))?;
                return Ok((tlv, label_end + 1 + arg_len));
            }
        }
    }
    for stringer in registry.stringers() {
        if let Ok(parsed) = stringer.to_oxm(txt) {
            return Ok(parsed);
        }
    }
    Err(TextError::Unknown(txt.to_string()))
}

/// Stringify a match. Masked values render as `value/mask`; fields with no
/// known textual form render as `?`.
pub fn to_text(repr: &Match, registry: &OxmExtensionRegistry) -> String {
    let mut tokens = Vec::new();
    for entry in &repr.basic {
        tokens.push(basic_to_text(entry));
    }
    for (key, bucket) in &repr.exp {
        for tlv in tlv_split(bucket) {
            tokens.push(match registry.stringer(key.experimenter) {
                Some(stringer) => stringer.from_oxm(tlv),
                None => "?".to_string(),
            });
        }
    }
    tokens.join(",")
}

/// Cut the leading token out of `args` and split it at the first `/`.
/// Returns `(value, mask, token length)`.
fn split_pair(args: &str) -> (&str, Option<&str>, usize) {
    let token = match args.find(is_separator) {
        Some(sep) => &args[..sep],
        None => args,
    };
    match token.find('/') {
        Some(split) if split > 0 => (&token[..split], Some(&token[split + 1..]), token.len()),
        _ => (token, None, token.len()),
    }
}

fn bad_value(label: &str, value: &str) -> TextError {
    TextError::BadValue {
        label: label.to_string(),
        value: value.to_string(),
    }
}

fn parse_uint(txt: &str, bits: u32) -> Option<u64> {
    let parsed = if let Some(hex) = txt.strip_prefix("0x").or_else(|| txt.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else {
        txt.parse().ok()?
    };
    if bits < 64 && parsed >> bits != 0 {
        return None;
    }
    Some(parsed)
}

/// Hex with or without a `0x` prefix, as the halves of `packet_type` are
/// written.
fn parse_hex16(txt: &str) -> Option<u16> {
    let digits = txt
        .strip_prefix("0x")
        .or_else(|| txt.strip_prefix("0X"))
        .unwrap_or(txt);
    u16::from_str_radix(digits, 16).ok()
}

fn parse_mac(txt: &str) -> Option<EthernetAddress> {
    let sep = if txt.contains(':') { ':' } else { '-' };
    let mut bytes = [0; 6];
    let mut count = 0;
    for group in txt.split(sep) {
        if count == 6 || group.len() != 2 {
            return None;
        }
        bytes[count] = u8::from_str_radix(group, 16).ok()?;
        count += 1;
    }
    if count != 6 {
        return None;
    }
    Some(EthernetAddress::from_bytes(&bytes))
}

fn parse_ipv4(txt: &str) -> Option<Ipv4Address> {
    let addr: std::net::Ipv4Addr = txt.parse().ok()?;
    Some(Ipv4Address::from_bytes(&addr.octets()))
}

/// A prefix length rendered as a byte mask, CIDR style.
fn prefix_mask(ones: usize, len: usize) -> Vec<u8> {
    let mut mask = vec![0; len];
    for i in 0..ones {
        mask[i / 8] |= 1 << (7 - i % 8);
    }
    mask
}

enum Shape {
    Uint8,
    Uint16 { maskable: bool },
    Uint24,
    Uint32 { maskable: bool },
    Uint64,
    Port,
    PacketType,
    Mac,
    V4,
    V6,
}

fn label_shape(label: &str) -> Option<(u32, Shape)> {
    let (oxm_type, shape) = match label {
        "vlan_pcp" => (VLAN_PCP, Shape::Uint8),
        "ip_dscp" => (IP_DSCP, Shape::Uint8),
        "ip_ecn" => (IP_ECN, Shape::Uint8),
        "ip_proto" => (IP_PROTO, Shape::Uint8),
        "icmpv4_type" => (ICMPV4_TYPE, Shape::Uint8),
        "icmpv4_code" => (ICMPV4_CODE, Shape::Uint8),
        "icmpv6_type" => (ICMPV6_TYPE, Shape::Uint8),
        "icmpv6_code" => (ICMPV6_CODE, Shape::Uint8),
        "mpls_tc" => (MPLS_TC, Shape::Uint8),
        "mpls_bos" => (MPLS_BOS, Shape::Uint8),
        "pbb_uca" => (PBB_UCA, Shape::Uint8),
        "eth_type" => (ETH_TYPE, Shape::Uint16 { maskable: false }),
        "tcp_src" => (TCP_SRC, Shape::Uint16 { maskable: false }),
        "tcp_dst" => (TCP_DST, Shape::Uint16 { maskable: false }),
        "udp_src" => (UDP_SRC, Shape::Uint16 { maskable: false }),
        "udp_dst" => (UDP_DST, Shape::Uint16 { maskable: false }),
        "sctp_src" => (SCTP_SRC, Shape::Uint16 { maskable: false }),
        "sctp_dst" => (SCTP_DST, Shape::Uint16 { maskable: false }),
        "arp_op" => (ARP_OP, Shape::Uint16 { maskable: false }),
        "vlan_vid" => (VLAN_VID, Shape::Uint16 { maskable: true }),
        "ipv6_exthdr" => (IPV6_EXTHDR, Shape::Uint16 { maskable: true }),
        "tcp_flags" => (TCP_FLAGS, Shape::Uint16 { maskable: true }),
        "pbb_isid" => (PBB_ISID, Shape::Uint24),
        "in_port" => (IN_PORT, Shape::Port),
        "in_phy_port" => (IN_PHY_PORT, Shape::Port),
        "actset_output" => (ACTSET_OUTPUT, Shape::Port),
        "ipv6_flabel" => (IPV6_FLABEL, Shape::Uint32 { maskable: true }),
        "mpls_label" => (MPLS_LABEL, Shape::Uint32 { maskable: true }),
        "packet_type" => (PACKET_TYPE, Shape::PacketType),
        "metadata" => (METADATA, Shape::Uint64),
        "tunnel_id" => (TUNNEL_ID, Shape::Uint64),
        "eth_dst" => (ETH_DST, Shape::Mac),
        "eth_src" => (ETH_SRC, Shape::Mac),
        "arp_sha" => (ARP_SHA, Shape::Mac),
        "arp_tha" => (ARP_THA, Shape::Mac),
        "ipv6_nd_sll" => (IPV6_ND_SLL, Shape::Mac),
        "ipv6_nd_tll" => (IPV6_ND_TLL, Shape::Mac),
        "ipv4_src" => (IPV4_SRC, Shape::V4),
        "ipv4_dst" => (IPV4_DST, Shape::V4),
        "arp_spa" => (ARP_SPA, Shape::V4),
        "arp_tpa" => (ARP_TPA, Shape::V4),
        "ipv6_src" => (IPV6_SRC, Shape::V6),
        "ipv6_dst" => (IPV6_DST, Shape::V6),
        "ipv6_nd_target" => (IPV6_ND_TARGET, Shape::V6),
        _ => return None,
    };
    Some((oxm_type, shape))
}

/// Parse one standard token. `Ok(None)` means the label is not a
/// standardized field and should be offered to the experimenter stringers.
fn parse_basic(label: &str, value: &str, mask: Option<&str>) -> Result<Option<BasicOxm>, TextError> {
    let Some((oxm_type, shape)) = label_shape(label) else {
        return Ok(None);
    };
    let entry = match shape {
        Shape::Uint8 => {
            if mask.is_some() {
                return Err(TextError::NotMaskable(label.to_string()));
            }
            let value = parse_uint(value, 8).ok_or_else(|| bad_value(label, value))? as u8;
            BasicOxm::uint8(oxm_type, value)
        }
        Shape::Uint16 { maskable } => {
            if mask.is_some() && !maskable {
                return Err(TextError::NotMaskable(label.to_string()));
            }
            let parsed = parse_uint(value, 16).ok_or_else(|| bad_value(label, value))? as u16;
            let mask = mask
                .map(|mask| parse_uint(mask, 16).ok_or_else(|| bad_value(label, mask)))
                .transpose()?
                .map(|mask| mask as u16);
            BasicOxm::uint16(oxm_type, parsed, mask)
        }
        Shape::Uint24 => {
            let parsed = parse_uint(value, 24).ok_or_else(|| bad_value(label, value))? as u32;
            let mask = mask
                .map(|mask| parse_uint(mask, 24).ok_or_else(|| bad_value(label, mask)))
                .transpose()?
                .map(|mask| mask as u32);
            BasicOxm::uint24(oxm_type, parsed, mask)
        }
        Shape::Uint32 { maskable } => {
            if mask.is_some() && !maskable {
                return Err(TextError::NotMaskable(label.to_string()));
            }
            let parsed = parse_uint(value, 32).ok_or_else(|| bad_value(label, value))? as u32;
            let mask = mask
                .map(|mask| parse_uint(mask, 32).ok_or_else(|| bad_value(label, mask)))
                .transpose()?
                .map(|mask| mask as u32);
            BasicOxm::uint32(oxm_type, parsed, mask)
        }
        Shape::Uint64 => {
            let parsed = parse_uint(value, 64).ok_or_else(|| bad_value(label, value))?;
            let mask = mask
                .map(|mask| parse_uint(mask, 64).ok_or_else(|| bad_value(label, mask)))
                .transpose()?;
            BasicOxm::uint64(oxm_type, parsed, mask)
        }
        Shape::Port => {
            if mask.is_some() {
                return Err(TextError::NotMaskable(label.to_string()));
            }
            let port = match PortNumber::from_name(value) {
                Some(port) => port,
                None => {
                    PortNumber::Regular(parse_uint(value, 32).ok_or_else(|| bad_value(label, value))? as u32)
                }
            };
            BasicOxm::port(oxm_type, port)
        }
        Shape::PacketType => {
            if mask.is_some() {
                return Err(TextError::NotMaskable(label.to_string()));
            }
            let (namespace, ns_type) = value
                .split_once(':')
                .ok_or_else(|| bad_value(label, value))?;
            let namespace = parse_hex16(namespace).ok_or_else(|| bad_value(label, value))?;
            let ns_type = parse_hex16(ns_type).ok_or_else(|| bad_value(label, value))?;
            BasicOxm::uint32(oxm_type, (u32::from(namespace) << 16) | u32::from(ns_type), None)
        }
        Shape::Mac => {
            let parsed = parse_mac(value).ok_or_else(|| bad_value(label, value))?;
            let mask = mask
                .map(|mask| parse_mac(mask).ok_or_else(|| bad_value(label, mask)))
                .transpose()?;
            BasicOxm::ethernet(oxm_type, parsed, mask)
        }
        Shape::V4 => {
            let parsed = parse_ipv4(value).ok_or_else(|| bad_value(label, value))?;
            let mask = match mask {
                None => None,
                Some(mask) => match mask.parse::<usize>() {
                    Ok(ones) if ones <= 32 => {
                        let bytes = prefix_mask(ones, 4);
                        Some(Ipv4Address::from_bytes(&bytes))
                    }
                    _ => Some(parse_ipv4(mask).ok_or_else(|| bad_value(label, mask))?),
                },
            };
            BasicOxm::ipv4(oxm_type, parsed, mask)
        }
        Shape::V6 => {
            let parsed: Ipv6Addr = value.parse().map_err(|_| bad_value(label, value))?;
            let mask = match mask {
                None => None,
                Some(mask) => match mask.parse::<usize>() {
                    Ok(ones) if ones <= 128 => {
                        let mut bytes = [0; 16];
                        bytes.copy_from_slice(&prefix_mask(ones, 16));
                        Some(bytes)
                    }
                    _ => Some(
                        mask.parse::<Ipv6Addr>()
                            .map_err(|_| bad_value(label, mask))?
                            .octets(),
                    ),
                },
            };
            BasicOxm::ipv6(oxm_type, parsed.octets(), mask)
        }
    };
    Ok(Some(entry))
}

fn format_mac(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn format_ipv6(bytes: &[u8]) -> String {
    let mut octets = [0; 16];
    octets.copy_from_slice(bytes);
    Ipv6Addr::from(octets).to_string()
}

fn basic_to_text(entry: &BasicOxm) -> String {
    let Some(spec) = spec_of(entry.oxm_type) else {
        return "?".to_string();
    };
    if entry.value.len() != spec.payload_len
        || entry
            .mask
            .as_ref()
            .is_some_and(|mask| mask.len() != spec.payload_len)
    {
        return "?".to_string();
    }

    let value = entry.value.as_slice();
    let mask = entry.mask.as_deref();
    match entry.oxm_type {
        IN_PORT => format!("in_port={}", PortNumber::from(NetworkEndian::read_u32(value))),
        IN_PHY_PORT => format!("in_phy_port={}", PortNumber::from(NetworkEndian::read_u32(value))),
        ACTSET_OUTPUT => format!("actset_output={}", PortNumber::from(NetworkEndian::read_u32(value))),
        METADATA | TUNNEL_ID => {
            let label = if entry.oxm_type == METADATA { "metadata" } else { "tunnel_id" };
            match mask {
                Some(mask) => format!(
                    "{}=0x{:x}/0x{:x}",
                    label,
                    NetworkEndian::read_u64(value),
                    NetworkEndian::read_u64(mask)
                ),
                None => format!("{}=0x{:x}", label, NetworkEndian::read_u64(value)),
            }
        }
        ETH_DST | ETH_SRC | ARP_SHA | ARP_THA | IPV6_ND_SLL | IPV6_ND_TLL => {
            let label = match entry.oxm_type {
                ETH_DST => "eth_dst",
                ETH_SRC => "eth_src",
                ARP_SHA => "arp_sha",
                ARP_THA => "arp_tha",
                IPV6_ND_SLL => "ipv6_nd_sll",
                _ => "ipv6_nd_tll",
            };
            match mask {
                Some(mask) => format!("{}={}/{}", label, format_mac(value), format_mac(mask)),
                None => format!("{}={}", label, format_mac(value)),
            }
        }
        ETH_TYPE => format!("eth_type=0x{:04x}", NetworkEndian::read_u16(value)),
        VLAN_VID | IPV6_EXTHDR => {
            let label = if entry.oxm_type == VLAN_VID { "vlan_vid" } else { "ipv6_exthdr" };
            match mask {
                Some(mask) => format!(
                    "{}=0x{:x}/0x{:x}",
                    label,
                    NetworkEndian::read_u16(value),
                    NetworkEndian::read_u16(mask)
                ),
                None => format!("{}=0x{:x}", label, NetworkEndian::read_u16(value)),
            }
        }
        TCP_FLAGS => match mask {
            Some(mask) => format!(
                "tcp_flags=0x{:04x}/0x{:04x}",
                NetworkEndian::read_u16(value),
                NetworkEndian::read_u16(mask)
            ),
            None => format!("tcp_flags=0x{:04x}", NetworkEndian::read_u16(value)),
        },
        VLAN_PCP => format!("vlan_pcp={}", value[0]),
        IP_DSCP => format!("ip_dscp=0x{:x}", value[0]),
        IP_ECN => format!("ip_ecn=0x{:x}", value[0]),
        IP_PROTO => format!("ip_proto={}", value[0]),
        ICMPV4_TYPE => format!("icmpv4_type={}", value[0]),
        ICMPV4_CODE => format!("icmpv4_code={}", value[0]),
        ICMPV6_TYPE => format!("icmpv6_type={}", value[0]),
        ICMPV6_CODE => format!("icmpv6_code={}", value[0]),
        MPLS_TC => format!("mpls_tc={}", value[0]),
        MPLS_BOS => format!("mpls_bos={}", value[0]),
        PBB_UCA => format!("pbb_uca={}", value[0]),
        IPV4_SRC | IPV4_DST | ARP_SPA | ARP_TPA => {
            let label = match entry.oxm_type {
                IPV4_SRC => "ipv4_src",
                IPV4_DST => "ipv4_dst",
                ARP_SPA => "arp_spa",
                _ => "arp_tpa",
            };
            match mask {
                Some(mask) => format!(
                    "{}={}/{}",
                    label,
                    Ipv4Address::from_bytes(value),
                    Ipv4Address::from_bytes(mask)
                ),
                None => format!("{}={}", label, Ipv4Address::from_bytes(value)),
            }
        }
        TCP_SRC => format!("tcp_src={}", NetworkEndian::read_u16(value)),
        TCP_DST => format!("tcp_dst={}", NetworkEndian::read_u16(value)),
        UDP_SRC => format!("udp_src={}", NetworkEndian::read_u16(value)),
        UDP_DST => format!("udp_dst={}", NetworkEndian::read_u16(value)),
        SCTP_SRC => format!("sctp_src={}", NetworkEndian::read_u16(value)),
        SCTP_DST => format!("sctp_dst={}", NetworkEndian::read_u16(value)),
        ARP_OP => format!("arp_op={}", NetworkEndian::read_u16(value)),
        IPV6_SRC | IPV6_DST | IPV6_ND_TARGET => {
            let label = match entry.oxm_type {
                IPV6_SRC => "ipv6_src",
                IPV6_DST => "ipv6_dst",
                _ => "ipv6_nd_target",
            };
            match mask {
                Some(mask) => format!("{}={}/{}", label, format_ipv6(value), format_ipv6(mask)),
                None => format!("{}={}", label, format_ipv6(value)),
            }
        }
        IPV6_FLABEL | MPLS_LABEL => {
            let label = if entry.oxm_type == IPV6_FLABEL { "ipv6_flabel" } else { "mpls_label" };
            match mask {
                Some(mask) => format!(
                    "{}=0x{:x}/0x{:x}",
                    label,
                    NetworkEndian::read_u32(value),
                    NetworkEndian::read_u32(mask)
                ),
                None => format!("{}=0x{:x}", label, NetworkEndian::read_u32(value)),
            }
        }
        PBB_ISID => {
            let pack = |bytes: &[u8]| {
                (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
            };
            match mask {
                Some(mask) => format!("pbb_isid=0x{:x}/0x{:x}", pack(value), pack(mask)),
                None => format!("pbb_isid=0x{:x}", pack(value)),
            }
        }
        PACKET_TYPE => format!(
            "packet_type={:04x}:{:04x}",
            NetworkEndian::read_u16(&value[..2]),
            NetworkEndian::read_u16(&value[2..])
        ),
        _ => "?".to_string(),
    }
}
