//! Artifact materialization
//!
//! Consumes a validated [`Inventory`] and produces the full artifact
//! set: the shared environment file, the shared compose document, one
//! reverse-proxy config and one service properties file per instance,
//! and the flat instance index.
//!
//! Rendering is two-phase: every document is rendered to memory first,
//! writes only start once the whole set rendered cleanly. A template
//! error therefore never leaves a partial artifact set behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::document::{Mapping, Record, Value};
use crate::inventory::{Instance, Inventory};
use crate::render::{RenderError, Template};

/// Template file names, resolved against a templates directory.
pub const COMPOSE_TEMPLATE_FILE: &str = "docker-compose.yml.tmpl";
pub const NGINX_TEMPLATE_FILE: &str = "nginx.conf.tmpl";
pub const PROPERTIES_TEMPLATE_FILE: &str = "service.properties.tmpl";

/// Materialization errors
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three templates the materializer renders.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub compose: Template,
    pub nginx: Template,
    pub properties: Template,
}

impl TemplateSet {
    /// Built-in templates, used when no templates directory is given.
    pub fn builtin() -> Self {
        TemplateSet {
            compose: Template::parse(COMPOSE_TEMPLATE_FILE, BUILTIN_COMPOSE)
                .expect("builtin compose template parses"),
            nginx: Template::parse(NGINX_TEMPLATE_FILE, BUILTIN_NGINX)
                .expect("builtin nginx template parses"),
            properties: Template::parse(PROPERTIES_TEMPLATE_FILE, BUILTIN_PROPERTIES)
                .expect("builtin properties template parses"),
        }
    }

    /// Load templates from a directory, falling back to the built-in
    /// template for any file the directory does not provide.
    pub fn load_dir(dir: &Path) -> Result<Self, MaterializeError> {
        let mut set = Self::builtin();
        if let Some(template) = load_template(dir, COMPOSE_TEMPLATE_FILE)? {
            set.compose = template;
        }
        if let Some(template) = load_template(dir, NGINX_TEMPLATE_FILE)? {
            set.nginx = template;
        }
        if let Some(template) = load_template(dir, PROPERTIES_TEMPLATE_FILE)? {
            set.properties = template;
        }
        Ok(set)
    }
}

fn load_template(dir: &Path, name: &str) -> Result<Option<Template>, MaterializeError> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let source = fs::read_to_string(&path)?;
    Ok(Some(Template::parse(name, &source)?))
}

/// What a materialization run wrote.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    /// Output directory root.
    pub out_dir: String,

    /// Files written, relative to `out_dir`, in write order.
    pub files: Vec<String>,

    /// Number of instance directories produced.
    pub instance_count: usize,
}

/// Render and write the full artifact set for a validated inventory.
pub fn materialize(
    inventory: &Inventory,
    templates: &TemplateSet,
    out_dir: &Path,
) -> Result<ArtifactSummary, MaterializeError> {
    // Phase 1: render everything.
    let environment = inventory.environment();
    let env_text = environment.to_env_file();

    let shared = shared_context(inventory);
    let compose_text = templates.compose.render(&shared)?;

    let mut per_instance = Vec::with_capacity(inventory.instances.len());
    for instance in &inventory.instances {
        let nginx_text = templates.nginx.render(&instance_context(inventory, instance))?;
        let properties_text = templates
            .properties
            .render(&properties_context(instance))?;
        per_instance.push((instance.name.clone(), nginx_text, properties_text));
    }

    let mut index_text = String::new();
    for instance in &inventory.instances {
        index_text.push_str(&instance.name);
        index_text.push('\n');
    }

    // Phase 2: write, in input sequence order.
    let config_dir = out_dir.join("config");
    fs::create_dir_all(&config_dir)?;

    let mut files = Vec::new();
    let mut write = |relative: String, content: &str| -> Result<(), MaterializeError> {
        let path = out_dir.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        files.push(relative);
        Ok(())
    };

    write(".env".to_string(), &env_text)?;
    write("docker-compose.yml".to_string(), &compose_text)?;

    for (name, nginx_text, properties_text) in &per_instance {
        write(format!("config/{}/nginx.conf", name), nginx_text)?;
        write(
            format!("config/{}/service.properties", name),
            properties_text,
        )?;
    }

    write("instances.txt".to_string(), &index_text)?;

    Ok(ArtifactSummary {
        out_dir: out_dir.to_string_lossy().to_string(),
        files,
        instance_count: inventory.instances.len(),
    })
}

/// Context for the shared compose document: `global`, `instances`, `env`.
fn shared_context(inventory: &Inventory) -> Mapping {
    let records: Vec<Record> = inventory
        .instances
        .iter()
        .map(|instance| Record {
            name: instance.name.clone(),
            fields: instance.fields().clone(),
        })
        .collect();

    let mut context = Mapping::new();
    context.insert(
        "global".to_string(),
        Value::Mapping(inventory.global.raw().clone()),
    );
    context.insert("instances".to_string(), Value::Records(records));
    context.insert(
        "env".to_string(),
        Value::Mapping(inventory.environment().to_mapping()),
    );
    context
}

/// Context for a per-instance proxy config: `global`, `inst`.
fn instance_context(inventory: &Inventory, instance: &Instance) -> Mapping {
    let mut context = Mapping::new();
    context.insert(
        "global".to_string(),
        Value::Mapping(inventory.global.raw().clone()),
    );
    context.insert(
        "inst".to_string(),
        Value::Mapping(instance.fields().clone()),
    );
    context
}

/// Context for the service properties file: `inst`, default-filled.
fn properties_context(instance: &Instance) -> Mapping {
    let mut context = Mapping::new();
    context.insert(
        "inst".to_string(),
        Value::Mapping(instance.defaulted_fields()),
    );
    context
}

const BUILTIN_COMPOSE: &str = r#"# Generated by fleetgen; do not edit by hand.
name: {{ env.COMPOSE_PROJECT_NAME }}

services:
{% for inst in instances %}
  {{ inst.name }}:
    container_name: {{ inst.name }}
    hostname: {{ inst.fqdn }}
    image: nginx:stable
    restart: unless-stopped
    volumes:
      - {{ global.stack_root }}/config/{{ inst.name }}:/etc/service:ro
    networks:
      public:
        ipv4_address: {{ inst.ipv4 }}
        ipv6_address: {{ inst.ipv6 }}
{% endfor %}

networks:
  public:
    driver: macvlan
    driver_opts:
      parent: {{ global.parent_iface }}
    enable_ipv6: true
    ipam:
      config:
        - subnet: {{ global.public_subnet_ipv4 }}
        - subnet: {{ global.public_subnet_ipv6 }}
"#;

const BUILTIN_NGINX: &str = r#"# Generated by fleetgen; do not edit by hand.
server {
    listen {{ inst.ipv4 }}:80;
    listen [{{ inst.ipv6 }}]:80;
    server_name {{ inst.fqdn }};

    location / {
        proxy_pass http://127.0.0.1:8080;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
    }
}
"#;

const BUILTIN_PROPERTIES: &str = r#"# Generated by fleetgen; do not edit by hand.
instance.name={{ inst.name }}
instance.fqdn={{ inst.fqdn }}
{{ inst.service.properties_raw }}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;
    use tempfile::TempDir;

    fn parse(input: &str) -> Value {
        let yaml: serde_yaml::Value = serde_yaml::from_str(input).unwrap();
        Value::from_yaml(yaml).unwrap()
    }

    fn inventory() -> Inventory {
        Inventory::resolve(&parse(concat!(
            "global:\n",
            "  project_name: fleet\n",
            "  stack_root: /srv/fleet\n",
            "  parent_iface: eth0\n",
            "  public_subnet_ipv4: 10.0.0.0/24\n",
            "  public_subnet_ipv6: fd00:10::/64\n",
            "  tls_enabled: true\n",
            "  certbot_email: ops@example.com\n",
            "instances:\n",
            "  - name: alpha\n",
            "    fqdn: alpha.example.com\n",
            "    ipv4: 10.0.0.10\n",
            "    ipv6: fd00:10::10\n",
            "  - name: beta\n",
            "    fqdn: beta.example.com\n",
            "    ipv4: 10.0.0.11\n",
            "    ipv6: fd00:10::11\n",
        )))
        .unwrap()
    }

    #[test]
    fn test_builtin_templates_parse() {
        TemplateSet::builtin();
    }

    #[test]
    fn test_materialize_produces_full_artifact_set() {
        let dir = TempDir::new().unwrap();
        let summary = materialize(&inventory(), &TemplateSet::builtin(), dir.path()).unwrap();

        assert_eq!(summary.instance_count, 2);
        assert_eq!(
            summary.files,
            vec![
                ".env",
                "docker-compose.yml",
                "config/alpha/nginx.conf",
                "config/alpha/service.properties",
                "config/beta/nginx.conf",
                "config/beta/service.properties",
                "instances.txt",
            ]
        );

        for relative in &summary.files {
            assert!(dir.path().join(relative).exists(), "missing {}", relative);
        }

        let index = std::fs::read_to_string(dir.path().join("instances.txt")).unwrap();
        assert_eq!(index, "alpha\nbeta\n");

        let compose = std::fs::read_to_string(dir.path().join("docker-compose.yml")).unwrap();
        assert!(compose.contains("name: fleet"));
        assert!(compose.contains("ipv4_address: 10.0.0.10"));
        assert!(compose.contains("ipv4_address: 10.0.0.11"));
        assert!(compose.contains("parent: eth0"));

        let nginx = std::fs::read_to_string(dir.path().join("config/alpha/nginx.conf")).unwrap();
        assert!(nginx.contains("server_name alpha.example.com;"));
        assert!(nginx.contains("listen 10.0.0.10:80;"));

        let props =
            std::fs::read_to_string(dir.path().join("config/beta/service.properties")).unwrap();
        assert!(props.contains("instance.name=beta"));
    }

    #[test]
    fn test_render_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("generated");

        let mut templates = TemplateSet::builtin();
        templates.properties =
            Template::parse(PROPERTIES_TEMPLATE_FILE, "{{ inst.nonexistent_key }}").unwrap();

        let result = materialize(&inventory(), &templates, &out);
        assert!(matches!(
            result,
            Err(MaterializeError::Render(RenderError::Undefined { .. }))
        ));
        assert!(!out.exists(), "render failure must not create artifacts");
    }

    #[test]
    fn test_materialize_is_deterministic() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let inv = inventory();
        let templates = TemplateSet::builtin();

        let summary_a = materialize(&inv, &templates, dir_a.path()).unwrap();
        let summary_b = materialize(&inv, &templates, dir_b.path()).unwrap();
        assert_eq!(summary_a.files, summary_b.files);

        for relative in &summary_a.files {
            let a = std::fs::read(dir_a.path().join(relative)).unwrap();
            let b = std::fs::read(dir_b.path().join(relative)).unwrap();
            assert_eq!(a, b, "artifact {} differs between runs", relative);
        }
    }

    #[test]
    fn test_templates_dir_overrides_single_file() {
        let templates_dir = TempDir::new().unwrap();
        std::fs::write(
            templates_dir.path().join(NGINX_TEMPLATE_FILE),
            "custom {{ inst.fqdn }}\n",
        )
        .unwrap();

        let out = TempDir::new().unwrap();
        let templates = TemplateSet::load_dir(templates_dir.path()).unwrap();
        materialize(&inventory(), &templates, out.path()).unwrap();

        let nginx = std::fs::read_to_string(out.path().join("config/alpha/nginx.conf")).unwrap();
        assert_eq!(nginx, "custom alpha.example.com\n");

        // compose still comes from the builtin set
        let compose = std::fs::read_to_string(out.path().join("docker-compose.yml")).unwrap();
        assert!(compose.contains("driver: macvlan"));
    }
}
