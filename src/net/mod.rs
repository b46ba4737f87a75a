//! Subnet value type
//!
//! CIDR parsing and membership checks over `std::net` addresses.
//! Invariants:
//! - Valid address format
//! - Prefix length 0-32 for IPv4, 0-128 for IPv6
//! - Host bits are masked off, so `10.0.0.5/24` denotes `10.0.0.0/24`

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// Subnet parsing error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubnetError {
    #[error("invalid network address: {0}")]
    InvalidAddress(String),

    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),
}

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subnet {
    V4 { network: Ipv4Addr, prefix: u8 },
    V6 { network: Ipv6Addr, prefix: u8 },
}

impl Subnet {
    /// Parse CIDR notation, e.g. `10.0.0.0/24` or `fd00::/64`.
    ///
    /// A bare address is accepted as a host network (/32 or /128).
    pub fn parse(cidr: &str) -> Result<Self, SubnetError> {
        let cidr = cidr.trim();

        let (addr_str, prefix_str) = match cidr.split_once('/') {
            Some(parts) => parts,
            None => {
                let address = IpAddr::from_str(cidr)
                    .map_err(|_| SubnetError::InvalidAddress(cidr.to_string()))?;
                return Ok(match address {
                    IpAddr::V4(a) => Subnet::V4 {
                        network: a,
                        prefix: 32,
                    },
                    IpAddr::V6(a) => Subnet::V6 {
                        network: a,
                        prefix: 128,
                    },
                });
            }
        };

        let address = IpAddr::from_str(addr_str)
            .map_err(|_| SubnetError::InvalidAddress(addr_str.to_string()))?;
        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| SubnetError::InvalidCidr(cidr.to_string()))?;

        match address {
            IpAddr::V4(a) => {
                if prefix > 32 {
                    return Err(SubnetError::InvalidPrefixLength(prefix));
                }
                let masked = u32::from(a) & mask_v4(prefix);
                Ok(Subnet::V4 {
                    network: Ipv4Addr::from(masked),
                    prefix,
                })
            }
            IpAddr::V6(a) => {
                if prefix > 128 {
                    return Err(SubnetError::InvalidPrefixLength(prefix));
                }
                let masked = u128::from(a) & mask_v6(prefix);
                Ok(Subnet::V6 {
                    network: Ipv6Addr::from(masked),
                    prefix,
                })
            }
        }
    }

    /// Whether `addr` belongs to this subnet. Always false across
    /// address families.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self, addr) {
            (Subnet::V4 { network, prefix }, IpAddr::V4(a)) => {
                u32::from(*a) & mask_v4(*prefix) == u32::from(*network)
            }
            (Subnet::V6 { network, prefix }, IpAddr::V6(a)) => {
                u128::from(*a) & mask_v6(*prefix) == u128::from(*network)
            }
            _ => false,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, Subnet::V4 { .. })
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Subnet::V6 { .. })
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subnet::V4 { network, prefix } => write!(f, "{}/{}", network, prefix),
            Subnet::V6 { network, prefix } => write!(f, "{}/{}", network, prefix),
        }
    }
}

impl FromStr for Subnet {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
