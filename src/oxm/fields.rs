//! Static metadata for the standardized (`OPENFLOW_BASIC`) match fields.
//!
//! Everything the rest of the engine needs to know about a basic field is
//! keyed by its `oxm_type`: canonical payload size, whether a mask is
//! legal, and the prerequisite entry the field implies, if any.

use super::flow_match::BasicOxm;
use super::CLASS_OPEN_FLOW_BASIC;

const fn basic(field: u8) -> u32 {
    ((CLASS_OPEN_FLOW_BASIC as u32) << 16) | ((field as u32) << 9)
}

/// Switch input port
pub const IN_PORT: u32 = basic(0);
/// Switch physical input port
pub const IN_PHY_PORT: u32 = basic(1);
/// Metadata passed between tables
pub const METADATA: u32 = basic(2);
/// Ethernet destination address
pub const ETH_DST: u32 = basic(3);
/// Ethernet source address
pub const ETH_SRC: u32 = basic(4);
/// Ethernet frame type
pub const ETH_TYPE: u32 = basic(5);
/// VLAN id
pub const VLAN_VID: u32 = basic(6);
/// VLAN priority
pub const VLAN_PCP: u32 = basic(7);
/// IP DSCP (6 bits in ToS field)
pub const IP_DSCP: u32 = basic(8);
/// IP ECN (2 bits in ToS field)
pub const IP_ECN: u32 = basic(9);
/// IP protocol
pub const IP_PROTO: u32 = basic(10);
/// IPv4 source address
pub const IPV4_SRC: u32 = basic(11);
/// IPv4 destination address
pub const IPV4_DST: u32 = basic(12);
/// TCP source port
pub const TCP_SRC: u32 = basic(13);
/// TCP destination port
pub const TCP_DST: u32 = basic(14);
/// UDP source port
pub const UDP_SRC: u32 = basic(15);
/// UDP destination port
pub const UDP_DST: u32 = basic(16);
/// SCTP source port
pub const SCTP_SRC: u32 = basic(17);
/// SCTP destination port
pub const SCTP_DST: u32 = basic(18);
/// ICMP type
pub const ICMPV4_TYPE: u32 = basic(19);
/// ICMP code
pub const ICMPV4_CODE: u32 = basic(20);
/// ARP op code
pub const ARP_OP: u32 = basic(21);
/// ARP source protocol address
pub const ARP_SPA: u32 = basic(22);
/// ARP target protocol address
pub const ARP_TPA: u32 = basic(23);
/// ARP source hardware address
pub const ARP_SHA: u32 = basic(24);
/// ARP target hardware address
pub const ARP_THA: u32 = basic(25);
/// IPv6 source address
pub const IPV6_SRC: u32 = basic(26);
/// IPv6 destination address
pub const IPV6_DST: u32 = basic(27);
/// IPv6 flow label
pub const IPV6_FLABEL: u32 = basic(28);
/// ICMPv6 type
pub const ICMPV6_TYPE: u32 = basic(29);
/// ICMPv6 code
pub const ICMPV6_CODE: u32 = basic(30);
/// Target address for IPv6 ND
pub const IPV6_ND_TARGET: u32 = basic(31);
/// Source link-layer for IPv6 ND
pub const IPV6_ND_SLL: u32 = basic(32);
/// Target link-layer for IPv6 ND
pub const IPV6_ND_TLL: u32 = basic(33);
/// MPLS label
pub const MPLS_LABEL: u32 = basic(34);
/// MPLS TC
pub const MPLS_TC: u32 = basic(35);
/// MPLS BoS bit
pub const MPLS_BOS: u32 = basic(36);
/// PBB I-SID
pub const PBB_ISID: u32 = basic(37);
/// Logical port metadata
pub const TUNNEL_ID: u32 = basic(38);
/// IPv6 extension header pseudo-field
pub const IPV6_EXTHDR: u32 = basic(39);
/// PBB UCA header field
pub const PBB_UCA: u32 = basic(41);
/// TCP flags
pub const TCP_FLAGS: u32 = basic(42);
/// Output port from the action set
pub const ACTSET_OUTPUT: u32 = basic(43);
/// Packet type value
pub const PACKET_TYPE: u32 = basic(44);

/// Every standardized field, in field-number order. Used when a table
/// advertises "all basic fields" in its features.
pub const ALL: [u32; 44] = [
    IN_PORT,
    IN_PHY_PORT,
    METADATA,
    ETH_DST,
    ETH_SRC,
    ETH_TYPE,
    VLAN_VID,
    VLAN_PCP,
    IP_DSCP,
    IP_ECN,
    IP_PROTO,
    IPV4_SRC,
    IPV4_DST,
    TCP_SRC,
    TCP_DST,
    UDP_SRC,
    UDP_DST,
    SCTP_SRC,
    SCTP_DST,
    ICMPV4_TYPE,
    ICMPV4_CODE,
    ARP_OP,
    ARP_SPA,
    ARP_TPA,
    ARP_SHA,
    ARP_THA,
    IPV6_SRC,
    IPV6_DST,
    IPV6_FLABEL,
    ICMPV6_TYPE,
    ICMPV6_CODE,
    IPV6_ND_TARGET,
    IPV6_ND_SLL,
    IPV6_ND_TLL,
    MPLS_LABEL,
    MPLS_TC,
    MPLS_BOS,
    PBB_ISID,
    TUNNEL_ID,
    IPV6_EXTHDR,
    PBB_UCA,
    TCP_FLAGS,
    ACTSET_OUTPUT,
    PACKET_TYPE,
];

/// Wire-level facts about a basic field.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FieldSpec {
    /// Canonical payload size in bytes, mask excluded.
    pub payload_len: usize,
    /// Whether a mask is legal for the field.
    pub maskable: bool,
}

/// Look up the [`FieldSpec`] for a basic `oxm_type`. `None` means the type
/// is not a standardized field.
pub fn spec_of(oxm_type: u32) -> Option<FieldSpec> {
    let (payload_len, maskable) = match oxm_type {
        IN_PORT | IN_PHY_PORT | ACTSET_OUTPUT | PACKET_TYPE => (4, false),
        METADATA | TUNNEL_ID => (8, true),
        ETH_DST | ETH_SRC | ARP_SHA | ARP_THA | IPV6_ND_SLL | IPV6_ND_TLL => (6, true),
        ETH_TYPE | ARP_OP => (2, false),
        VLAN_VID | IPV6_EXTHDR | TCP_FLAGS => (2, true),
        VLAN_PCP | IP_DSCP | IP_ECN | IP_PROTO | MPLS_TC | MPLS_BOS | PBB_UCA => (1, false),
        ICMPV4_TYPE | ICMPV4_CODE | ICMPV6_TYPE | ICMPV6_CODE => (1, false),
        TCP_SRC | TCP_DST | UDP_SRC | UDP_DST | SCTP_SRC | SCTP_DST => (2, false),
        IPV4_SRC | IPV4_DST | ARP_SPA | ARP_TPA => (4, true),
        IPV6_SRC | IPV6_DST | IPV6_ND_TARGET => (16, true),
        IPV6_FLABEL | MPLS_LABEL => (4, true),
        PBB_ISID => (3, true),
        _ => return None,
    };
    Some(FieldSpec {
        payload_len,
        maskable,
    })
}

/// Return the prerequisite entry implied by `entry`, if any.
///
/// Prerequisite chains are finite and acyclic; callers walk them to a
/// fixpoint. The step for `ip_proto` depends on the entry value: 58 pins
/// the IPv6 ethertype, everything else the IPv4 one, which is what makes
/// the transport chains bottom out at `eth_type`.
pub fn prerequisite(entry: &BasicOxm) -> Option<BasicOxm> {
    let (oxm_type, value): (u32, &[u8]) = match entry.oxm_type {
        IPV4_SRC | IPV4_DST => (ETH_TYPE, &[0x08, 0x00]),
        ARP_OP | ARP_SPA | ARP_TPA | ARP_SHA | ARP_THA => (ETH_TYPE, &[0x08, 0x06]),
        IPV6_SRC | IPV6_DST | IPV6_FLABEL | IPV6_EXTHDR => (ETH_TYPE, &[0x86, 0xdd]),
        PBB_ISID | PBB_UCA => (ETH_TYPE, &[0x88, 0xe7]),
        TCP_SRC | TCP_DST | TCP_FLAGS => (IP_PROTO, &[0x06]),
        UDP_SRC | UDP_DST => (IP_PROTO, &[0x11]),
        SCTP_SRC | SCTP_DST => (IP_PROTO, &[0x84]),
        ICMPV4_TYPE | ICMPV4_CODE => (IP_PROTO, &[0x01]),
        ICMPV6_TYPE | ICMPV6_CODE => (IP_PROTO, &[0x3a]),
        IPV6_ND_SLL => (ICMPV6_TYPE, &[135]),
        IPV6_ND_TLL => (ICMPV6_TYPE, &[136]),
        IP_PROTO => {
            if entry.value == [0x3a] {
                (ETH_TYPE, &[0x86, 0xdd])
            } else {
                (ETH_TYPE, &[0x08, 0x00])
            }
        }
        _ => return None,
    };
    Some(BasicOxm {
        oxm_type,
        value: value.to_vec(),
        mask: Some(vec![0xff; value.len()]),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn specs() {
        assert_eq!(
            spec_of(IPV4_SRC),
            Some(FieldSpec {
                payload_len: 4,
                maskable: true
            })
        );
        assert_eq!(
            spec_of(ETH_TYPE),
            Some(FieldSpec {
                payload_len: 2,
                maskable: false
            })
        );
        assert_eq!(
            spec_of(PBB_ISID),
            Some(FieldSpec {
                payload_len: 3,
                maskable: true
            })
        );
        // field 40 was never assigned
        assert_eq!(spec_of(basic(40)), None);
        assert_eq!(spec_of(0xffff_0000), None);
    }

    #[test]
    fn every_field_has_a_spec() {
        for oxm_type in ALL {
            assert!(spec_of(oxm_type).is_some(), "{oxm_type:#x}");
        }
    }

    fn chain(mut entry: BasicOxm) -> Vec<u32> {
        let mut types = vec![entry.oxm_type];
        while let Some(prereq) = prerequisite(&entry) {
            types.push(prereq.oxm_type);
            entry = prereq;
        }
        types
    }

    #[test]
    fn tcp_chain_reaches_ipv4_ethertype() {
        let entry = BasicOxm {
            oxm_type: TCP_SRC,
            value: vec![0x00, 0x50],
            mask: None,
        };
        assert_eq!(chain(entry), vec![TCP_SRC, IP_PROTO, ETH_TYPE]);
    }

    #[test]
    fn nd_sll_chain_reaches_ipv6_ethertype() {
        let entry = BasicOxm {
            oxm_type: IPV6_ND_SLL,
            value: vec![0; 6],
            mask: None,
        };
        assert_eq!(
            chain(entry),
            vec![IPV6_ND_SLL, ICMPV6_TYPE, IP_PROTO, ETH_TYPE]
        );
        // and the ip_proto step picks the v6 ethertype
        let proto = BasicOxm {
            oxm_type: IP_PROTO,
            value: vec![0x3a],
            mask: None,
        };
        let prereq = prerequisite(&proto).unwrap();
        assert_eq!(prereq.value, [0x86, 0xdd]);
    }

    #[test]
    fn no_prerequisite_for_l2_fields() {
        for oxm_type in [IN_PORT, METADATA, ETH_DST, ETH_TYPE, VLAN_VID, TUNNEL_ID] {
            let entry = BasicOxm {
                oxm_type,
                value: vec![0; spec_of(oxm_type).unwrap().payload_len],
                mask: None,
            };
            assert!(prerequisite(&entry).is_none());
        }
    }
}
