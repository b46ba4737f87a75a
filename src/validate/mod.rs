//! Inventory validation
//!
//! Checks the merged inventory against structural and semantic rules.
//! Validation is fail-fast: the first violation, in check order, is the
//! whole result. Validation never mutates what it inspects, so a failed
//! run leaves no trace.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

use crate::document::{Mapping, Record, Value};
use crate::net::Subnet;

/// Keys the global config must carry, present and non-null, after merge.
pub const REQUIRED_GLOBAL_KEYS: &[&str] = &[
    "project_name",
    "stack_root",
    "parent_iface",
    "public_subnet_ipv4",
    "public_subnet_ipv6",
    "tls_enabled",
    "certbot_email",
];

/// Fields every instance must carry, non-empty.
pub const REQUIRED_INSTANCE_FIELDS: &[&str] = &["name", "fqdn", "ipv4", "ipv6"];

/// Which global subnet a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetFamily {
    Ipv4,
    Ipv6,
}

impl fmt::Display for SubnetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetFamily::Ipv4 => write!(f, "IPv4"),
            SubnetFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// First violation found in a merged inventory.
///
/// Instance indexes are 1-based, matching the order instances appear in
/// the merged document.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Violation {
    #[error("global config is missing required keys: {}", keys.join(", "))]
    MissingGlobalKeys { keys: Vec<String> },

    #[error("inventory has no instances")]
    EmptyInventory,

    #[error("invalid global {which} subnet: {reason}")]
    InvalidSubnet { which: SubnetFamily, reason: String },

    #[error("instances[{index}] is missing required field '{field}'")]
    MissingInstanceField { index: usize, field: &'static str },

    #[error("duplicate instance name: {0}")]
    DuplicateName(String),

    #[error("duplicate instance fqdn: {0}")]
    DuplicateFqdn(String),

    #[error("duplicate instance ipv4: {0}")]
    DuplicateIpv4(String),

    #[error("duplicate instance ipv6: {0}")]
    DuplicateIpv6(String),

    #[error("instance '{name}' address {address} is outside subnet {subnet}")]
    AddressOutOfSubnet {
        name: String,
        address: String,
        subnet: String,
    },
}

/// Validate a merged inventory document.
///
/// Check order (first violation wins):
/// 1. required global keys
/// 2. non-empty instance sequence
/// 3. both global subnets parse with the right family
/// 4. per instance, in order: required fields, uniqueness of
///    `name` / `fqdn` (case-insensitive) / `ipv4` / `ipv6`, then
///    subnet membership of both addresses
///
/// Uniqueness operates on the trimmed literal strings, so `::1` and
/// `0:0:0:0:0:0:0:1` are distinct values that must each still parse and
/// belong to the subnet.
pub fn validate(merged: &Value) -> Result<(), Violation> {
    let empty = Mapping::new();
    let global = merged
        .get("global")
        .and_then(Value::as_mapping)
        .unwrap_or(&empty);

    // 1. Required global keys
    let missing: Vec<String> = REQUIRED_GLOBAL_KEYS
        .iter()
        .filter(|key| global.get(**key).map_or(true, Value::is_null))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Violation::MissingGlobalKeys { keys: missing });
    }

    // 2. Non-empty instance sequence
    let instances = match merged.get("instances") {
        Some(Value::Records(records)) if !records.is_empty() => InstanceSeq::Records(records),
        Some(Value::List(items)) if !items.is_empty() => InstanceSeq::Loose(items),
        _ => return Err(Violation::EmptyInventory),
    };

    // 3. Global subnets
    let net4 = parse_subnet(global, "public_subnet_ipv4", SubnetFamily::Ipv4)?;
    let net6 = parse_subnet(global, "public_subnet_ipv6", SubnetFamily::Ipv6)?;

    // 4. Per-instance checks, in sequence order
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut seen_fqdns: HashSet<String> = HashSet::new();
    let mut seen_ipv4: HashSet<String> = HashSet::new();
    let mut seen_ipv6: HashSet<String> = HashSet::new();

    for index in 1..=instances.len() {
        let fields = instances.fields_at(index)?;

        for field in REQUIRED_INSTANCE_FIELDS {
            if !fields.get(*field).map_or(false, Value::is_truthy) {
                return Err(Violation::MissingInstanceField { index, field });
            }
        }

        // Identity must be a string; any sequence with a non-string
        // name fails here, so a valid inventory is always a record list.
        let name = match fields.get("name").and_then(Value::as_str) {
            Some(s) => s.trim().to_string(),
            None => {
                return Err(Violation::MissingInstanceField {
                    index,
                    field: "name",
                })
            }
        };
        let fqdn = scalar_field(fields, index, "fqdn")?.trim().to_lowercase();
        let ipv4 = scalar_field(fields, index, "ipv4")?.trim().to_string();
        let ipv6 = scalar_field(fields, index, "ipv6")?.trim().to_string();

        if !seen_names.insert(name.clone()) {
            return Err(Violation::DuplicateName(name));
        }
        if !seen_fqdns.insert(fqdn.clone()) {
            return Err(Violation::DuplicateFqdn(fqdn));
        }
        if !seen_ipv4.insert(ipv4.clone()) {
            return Err(Violation::DuplicateIpv4(ipv4));
        }
        if !seen_ipv6.insert(ipv6.clone()) {
            return Err(Violation::DuplicateIpv6(ipv6));
        }

        check_membership(&name, &ipv4, &net4)?;
        check_membership(&name, &ipv6, &net6)?;
    }

    Ok(())
}

enum InstanceSeq<'a> {
    Records(&'a [Record]),
    /// Sequence that failed record classification: at least one element
    /// is not a named mapping. Still walked in order so the violation
    /// points at the first offending position.
    Loose(&'a [Value]),
}

impl<'a> InstanceSeq<'a> {
    fn len(&self) -> usize {
        match self {
            InstanceSeq::Records(r) => r.len(),
            InstanceSeq::Loose(l) => l.len(),
        }
    }

    fn fields_at(&self, index: usize) -> Result<&'a Mapping, Violation> {
        match self {
            InstanceSeq::Records(records) => Ok(&records[index - 1].fields),
            InstanceSeq::Loose(items) => match &items[index - 1] {
                Value::Mapping(map) => Ok(map),
                _ => Err(Violation::MissingInstanceField {
                    index,
                    field: "name",
                }),
            },
        }
    }
}

fn parse_subnet(
    global: &Mapping,
    key: &str,
    which: SubnetFamily,
) -> Result<Subnet, Violation> {
    let raw = global
        .get(key)
        .and_then(Value::as_scalar_string)
        .ok_or_else(|| Violation::InvalidSubnet {
            which,
            reason: format!("'{}' is not a CIDR string", key),
        })?;

    let subnet = Subnet::parse(&raw).map_err(|e| Violation::InvalidSubnet {
        which,
        reason: e.to_string(),
    })?;

    let family_ok = match which {
        SubnetFamily::Ipv4 => subnet.is_ipv4(),
        SubnetFamily::Ipv6 => subnet.is_ipv6(),
    };
    if !family_ok {
        return Err(Violation::InvalidSubnet {
            which,
            reason: format!("'{}' is not an {} network", raw, which),
        });
    }

    Ok(subnet)
}

fn scalar_field(
    fields: &Mapping,
    index: usize,
    field: &'static str,
) -> Result<String, Violation> {
    fields
        .get(field)
        .and_then(Value::as_scalar_string)
        .ok_or(Violation::MissingInstanceField { index, field })
}

fn check_membership(name: &str, address: &str, subnet: &Subnet) -> Result<(), Violation> {
    let out_of_subnet = || Violation::AddressOutOfSubnet {
        name: name.to_string(),
        address: address.to_string(),
        subnet: subnet.to_string(),
    };

    let parsed: IpAddr = address.parse().map_err(|_| out_of_subnet())?;
    if !subnet.contains(&parsed) {
        return Err(out_of_subnet());
    }
    Ok(())
}
