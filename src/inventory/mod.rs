//! Typed inventory resolution
//!
//! Turns a merged document that passed validation into typed
//! [`GlobalConfig`] / [`Instance`] values the materializer consumes.
//! Resolution always runs the validator first, so the typed view only
//! ever exists for an inventory that satisfied every invariant.

use crate::document::{Mapping, Value};
use crate::net::Subnet;
use crate::validate::{validate, SubnetFamily, Violation};

/// Fleet-wide settings shared by every instance.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub project_name: String,
    pub stack_root: String,
    pub parent_iface: String,
    pub subnet_ipv4: Subnet,
    pub subnet_ipv6: Subnet,
    pub tls_enabled: bool,
    pub certbot_email: String,

    /// Full global mapping, for template contexts. Keys beyond the
    /// typed ones above flow through to the templates untouched.
    raw: Mapping,
}

impl GlobalConfig {
    pub fn raw(&self) -> &Mapping {
        &self.raw
    }
}

/// A single fleet instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub fqdn: String,
    pub ipv4: String,
    pub ipv6: String,

    /// Full instance mapping as authored, for template contexts.
    fields: Mapping,
}

impl Instance {
    pub fn fields(&self) -> &Mapping {
        &self.fields
    }

    /// Produce a fully-defaulted copy of the instance fields for
    /// rendering: `service.properties_raw` becomes the empty string
    /// when absent. The instance itself is never mutated, so the
    /// validated inventory stays exactly as authored.
    pub fn defaulted_fields(&self) -> Mapping {
        let mut fields = self.fields.clone();
        let service = fields
            .entry("service".to_string())
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if let Value::Mapping(map) = service {
            map.entry("properties_raw".to_string())
                .or_insert_with(|| Value::String(String::new()));
        }
        fields
    }
}

/// A validated inventory: global config plus the ordered instances.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub global: GlobalConfig,
    pub instances: Vec<Instance>,
}

impl Inventory {
    /// Validate a merged document and resolve the typed view.
    pub fn resolve(merged: &Value) -> Result<Self, Violation> {
        validate(merged)?;

        let global_map = merged
            .get("global")
            .and_then(Value::as_mapping)
            .cloned()
            .unwrap_or_default();

        let global = GlobalConfig {
            project_name: global_string(&global_map, "project_name")?,
            stack_root: global_string(&global_map, "stack_root")?,
            parent_iface: global_string(&global_map, "parent_iface")?,
            subnet_ipv4: global_subnet(&global_map, "public_subnet_ipv4", SubnetFamily::Ipv4)?,
            subnet_ipv6: global_subnet(&global_map, "public_subnet_ipv6", SubnetFamily::Ipv6)?,
            tls_enabled: global_map
                .get("tls_enabled")
                .map_or(false, Value::is_truthy),
            certbot_email: global_string(&global_map, "certbot_email")?,
            raw: global_map,
        };

        let records = match merged.get("instances") {
            Some(Value::Records(records)) => records,
            _ => return Err(Violation::EmptyInventory),
        };

        let instances = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let field = |key: &'static str| {
                    record
                        .get(key)
                        .and_then(Value::as_scalar_string)
                        .ok_or(Violation::MissingInstanceField {
                            index: i + 1,
                            field: key,
                        })
                };
                Ok(Instance {
                    name: record.name.clone(),
                    fqdn: field("fqdn")?,
                    ipv4: field("ipv4")?,
                    ipv6: field("ipv6")?,
                    fields: record.fields.clone(),
                })
            })
            .collect::<Result<Vec<_>, Violation>>()?;

        Ok(Inventory { global, instances })
    }

    /// Derive the environment mapping handed to the rendering stage.
    pub fn environment(&self) -> ResolvedEnvironment {
        ResolvedEnvironment::from_global(&self.global)
    }
}

fn global_string(map: &Mapping, key: &'static str) -> Result<String, Violation> {
    map.get(key)
        .and_then(Value::as_scalar_string)
        .ok_or_else(|| Violation::MissingGlobalKeys {
            keys: vec![key.to_string()],
        })
}

fn global_subnet(map: &Mapping, key: &str, which: SubnetFamily) -> Result<Subnet, Violation> {
    let raw = map
        .get(key)
        .and_then(Value::as_scalar_string)
        .unwrap_or_default();
    Subnet::parse(&raw).map_err(|e| Violation::InvalidSubnet {
        which,
        reason: e.to_string(),
    })
}

/// The fixed-key environment mapping derived from the global config.
///
/// Key order is part of the output contract: the generated `.env` file
/// must be byte-identical across runs.
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
    pairs: Vec<(&'static str, String)>,
}

impl ResolvedEnvironment {
    pub fn from_global(global: &GlobalConfig) -> Self {
        ResolvedEnvironment {
            pairs: vec![
                ("COMPOSE_PROJECT_NAME", global.project_name.clone()),
                ("STACK_ROOT", global.stack_root.clone()),
                ("TLS_ENABLED", global.tls_enabled.to_string()),
                ("CERTBOT_EMAIL", global.certbot_email.clone()),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.pairs.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Serialize as `KEY=value` lines.
    pub fn to_env_file(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Environment as a template-context mapping.
    pub fn to_mapping(&self) -> Mapping {
        self.iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }
}
