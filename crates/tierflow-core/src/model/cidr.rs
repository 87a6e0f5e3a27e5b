//! IPv4 CIDR ブロック

use crate::error::StackError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 アドレス範囲（例: 15.32.0.0/16）
///
/// ホスト部にビットが立っているアドレスは受け付けない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, StackError> {
        if prefix > 32 {
            return Err(StackError::InvalidCidr(format!(
                "{}/{}: プレフィックス長は 0〜32 です",
                network, prefix
            )));
        }
        let cidr = Self { network, prefix };
        if u32::from(network) & !cidr.mask() != 0 {
            return Err(StackError::InvalidCidr(format!(
                "{}/{}: ホスト部が 0 ではありません",
                network, prefix
            )));
        }
        Ok(cidr)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix)
        }
    }

    fn first(&self) -> u32 {
        u32::from(self.network)
    }

    fn last(&self) -> u32 {
        self.first() | !self.mask()
    }

    /// 範囲に含まれるアドレス数
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    /// `other` がこの範囲に完全に含まれるか
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.first() & self.mask() == self.first()
    }

    /// `other` がこの範囲の真部分集合か
    pub fn strictly_contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix > self.prefix && self.contains(other)
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// 0.0.0.0/0
    pub fn any() -> Self {
        Self {
            network: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
        }
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| StackError::InvalidCidr(format!("{}: '/' がありません", s)))?;
        let network = addr
            .parse::<Ipv4Addr>()
            .map_err(|e| StackError::InvalidCidr(format!("{}: {}", s, e)))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| StackError::InvalidCidr(format!("{}: {}", s, e)))?;
        Self::new(network, prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Ipv4Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let c = cidr("15.32.0.0/16");
        assert_eq!(c.network(), Ipv4Addr::new(15, 32, 0, 0));
        assert_eq!(c.prefix(), 16);
        assert_eq!(c.to_string(), "15.32.0.0/16");
        assert_eq!(c.size(), 65536);
    }

    #[test]
    fn test_rejects_host_bits() {
        assert!("15.32.1.1/25".parse::<Ipv4Cidr>().is_err());
        assert!("15.32.1.128/25".parse::<Ipv4Cidr>().is_ok());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("15.32.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("15.32.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("15.32.0/16".parse::<Ipv4Cidr>().is_err());
        assert!("abc/8".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_containment() {
        let vpc = cidr("15.32.0.0/16");
        assert!(vpc.strictly_contains(&cidr("15.32.1.0/25")));
        assert!(vpc.strictly_contains(&cidr("15.32.21.0/25")));
        assert!(vpc.contains(&vpc));
        assert!(!vpc.strictly_contains(&vpc));
        assert!(!vpc.contains(&cidr("15.33.0.0/24")));
        assert!(!vpc.contains(&cidr("15.0.0.0/8")));
    }

    #[test]
    fn test_overlap() {
        let a = cidr("15.32.1.0/25");
        assert!(!a.overlaps(&cidr("15.32.1.128/25")));
        assert!(!a.overlaps(&cidr("15.32.2.0/25")));
        assert!(a.overlaps(&cidr("15.32.1.0/24")));
        assert!(a.overlaps(&cidr("15.32.1.64/26")));
    }

    #[test]
    fn test_any() {
        let any = Ipv4Cidr::any();
        assert_eq!(any.to_string(), "0.0.0.0/0");
        assert!(any.contains(&cidr("15.32.0.0/16")));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&cidr("10.0.0.0/8")).unwrap();
        assert_eq!(json, "\"10.0.0.0/8\"");
        let back: Ipv4Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cidr("10.0.0.0/8"));
    }
}
