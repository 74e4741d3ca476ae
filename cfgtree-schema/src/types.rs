//! Primitive value-type checking.
//!
//! The core consults these through the single [`validate_type`] entry
//! point. Address types go through the std parsers; the rest are regex
//! driven.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use regex::Regex;

use crate::ValueType;

/// Whether `value` satisfies the primitive type `vtype`.
pub fn validate_type(vtype: ValueType, value: &str) -> bool {
    match vtype {
        ValueType::U32 | ValueType::Priority => value.parse::<u32>().is_ok(),
        ValueType::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
        ValueType::Ipv4Net => split_prefix(value, 32)
            .map(|(addr, _)| addr.parse::<Ipv4Addr>().is_ok())
            .unwrap_or(false),
        ValueType::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
        ValueType::Ipv6Net => split_prefix(value, 128)
            .map(|(addr, _)| addr.parse::<Ipv6Addr>().is_ok())
            .unwrap_or(false),
        ValueType::Mac => mac_re().is_match(value),
        ValueType::Domain => domain_re().is_match(value),
        ValueType::Txt => true,
        ValueType::Bool => value == "true" || value == "false",
    }
}

/// Decomposes a value into the unsigned parts used for ordered
/// comparison: octets for addresses (plus the prefix length for network
/// types), colon groups for MAC addresses, the number itself for u32.
/// `None` for types compared as byte strings.
pub fn numeric_parts(vtype: ValueType, value: &str) -> Option<Vec<u64>> {
    match vtype {
        ValueType::U32 | ValueType::Priority => Some(vec![value.parse::<u32>().ok()? as u64]),
        ValueType::Ipv4 => {
            let addr: Ipv4Addr = value.parse().ok()?;
            Some(addr.octets().iter().map(|&o| o as u64).collect())
        }
        ValueType::Ipv4Net => {
            let (addr, prefix) = split_prefix(value, 32)?;
            let addr: Ipv4Addr = addr.parse().ok()?;
            let mut parts: Vec<u64> = addr.octets().iter().map(|&o| o as u64).collect();
            parts.push(prefix as u64);
            Some(parts)
        }
        ValueType::Ipv6 => {
            let addr: Ipv6Addr = value.parse().ok()?;
            Some(addr.segments().iter().map(|&s| s as u64).collect())
        }
        ValueType::Ipv6Net => {
            let (addr, prefix) = split_prefix(value, 128)?;
            let addr: Ipv6Addr = addr.parse().ok()?;
            let mut parts: Vec<u64> = addr.segments().iter().map(|&s| s as u64).collect();
            parts.push(prefix as u64);
            Some(parts)
        }
        ValueType::Mac => {
            let mut parts = Vec::with_capacity(6);
            for group in value.split(':') {
                parts.push(u64::from_str_radix(group, 16).ok()?);
            }
            (parts.len() == 6).then_some(parts)
        }
        ValueType::Domain | ValueType::Txt | ValueType::Bool => None,
    }
}

fn split_prefix(value: &str, max: u32) -> Option<(&str, u32)> {
    let (addr, prefix) = value.split_once('/')?;
    let prefix: u32 = prefix.parse().ok()?;
    (prefix <= max).then_some((addr, prefix))
}

fn mac_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").unwrap())
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
        )
        .unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_values() {
        assert!(validate_type(ValueType::U32, "0"));
        assert!(validate_type(ValueType::U32, "4294967295"));
        assert!(!validate_type(ValueType::U32, "4294967296"));
        assert!(!validate_type(ValueType::U32, "-1"));
        assert!(!validate_type(ValueType::U32, "1.5"));
    }

    #[test]
    fn ipv4_and_net() {
        assert!(validate_type(ValueType::Ipv4, "10.0.0.1"));
        assert!(!validate_type(ValueType::Ipv4, "10.0.0.256"));
        assert!(validate_type(ValueType::Ipv4Net, "10.0.0.0/24"));
        assert!(!validate_type(ValueType::Ipv4Net, "10.0.0.0/33"));
        assert!(!validate_type(ValueType::Ipv4Net, "10.0.0.0"));
    }

    #[test]
    fn ipv6_and_net() {
        assert!(validate_type(ValueType::Ipv6, "2001:db8::1"));
        assert!(validate_type(ValueType::Ipv6Net, "2001:db8::/32"));
        assert!(!validate_type(ValueType::Ipv6, "2001:db8::g"));
    }

    #[test]
    fn mac_and_domain() {
        assert!(validate_type(ValueType::Mac, "00:11:22:aa:bb:cc"));
        assert!(!validate_type(ValueType::Mac, "00:11:22:aa:bb"));
        assert!(validate_type(ValueType::Domain, "router1.example.com"));
        assert!(!validate_type(ValueType::Domain, "-bad.example"));
    }

    #[test]
    fn comparison_parts() {
        assert_eq!(
            numeric_parts(ValueType::Ipv4, "10.0.0.1").unwrap(),
            vec![10, 0, 0, 1]
        );
        assert_eq!(
            numeric_parts(ValueType::Ipv4Net, "10.0.0.0/24").unwrap(),
            vec![10, 0, 0, 0, 24]
        );
        assert_eq!(numeric_parts(ValueType::U32, "42").unwrap(), vec![42]);
        assert_eq!(
            numeric_parts(ValueType::Mac, "00:11:22:aa:bb:cc").unwrap(),
            vec![0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc]
        );
        assert!(numeric_parts(ValueType::Txt, "x").is_none());
    }
}
