//! Closed value model for inventory documents
//!
//! A YAML sequence is classified exactly once, at parse time: if every
//! element is a mapping carrying a non-empty string `name`, the sequence
//! becomes [`Value::Records`] and participates in identity-keyed merge
//! reconciliation; any other sequence is an opaque [`Value::List`] that
//! is replaced wholesale on merge.

use indexmap::IndexMap;

use super::DocumentError;

/// Insertion-ordered string-keyed mapping.
pub type Mapping = IndexMap<String, Value>;

/// A parsed document value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Mapping(Mapping),
    /// Sequence of named records, reconciled by `name` during merge.
    Records(Vec<Record>),
    /// Any other sequence; opaque to the merger (last writer wins).
    List(Vec<Value>),
}

/// A named record inside a [`Value::Records`] sequence.
///
/// `fields` holds the full mapping, `name` included; `name` is lifted
/// out because it is the reconciliation identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: Mapping,
}

impl Value {
    /// Convert a raw YAML value into the closed model.
    ///
    /// Fails on non-string mapping keys; those have no meaning in an
    /// inventory document and would silently collide after merge.
    pub fn from_yaml(yaml: serde_yaml::Value) -> Result<Self, DocumentError> {
        Ok(match yaml {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_yaml::Value::String(s) => Value::String(s),
            serde_yaml::Value::Sequence(seq) => {
                let items: Vec<Value> = seq
                    .into_iter()
                    .map(Value::from_yaml)
                    .collect::<Result<_, _>>()?;
                classify_sequence(items)
            }
            serde_yaml::Value::Mapping(map) => {
                let mut out = Mapping::new();
                for (key, value) in map {
                    let key = match key {
                        serde_yaml::Value::String(s) => s,
                        other => {
                            return Err(DocumentError::NonStringKey(format!("{:?}", other)));
                        }
                    };
                    out.insert(key, Value::from_yaml(value)?);
                }
                Value::Mapping(out)
            }
            serde_yaml::Value::Tagged(tagged) => Value::from_yaml(tagged.value)?,
        })
    }

    /// Look up a key on a mapping value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used for required-field presence checks: null, false,
    /// zero, the empty string, and empty containers are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Mapping(m) => !m.is_empty(),
            Value::Records(r) => !r.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    /// Render a scalar for template substitution. Structured values
    /// return `None`; the renderer reports those as errors.
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value` for report output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Mapping(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Records(records) => serde_json::Value::Array(
                records
                    .iter()
                    .map(|r| Value::Mapping(r.fields.clone()).to_json())
                    .collect(),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl Record {
    /// Promote a mapping to a record if it carries a usable identity.
    fn from_mapping(fields: Mapping) -> Result<Self, Mapping> {
        match fields.get("name") {
            Some(Value::String(name)) if !name.is_empty() => Ok(Record {
                name: name.clone(),
                fields,
            }),
            _ => Err(fields),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Classify a parsed sequence as records or an opaque list.
fn classify_sequence(items: Vec<Value>) -> Value {
    let mut records = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            Value::Mapping(map) => match Record::from_mapping(map.clone()) {
                Ok(record) => records.push(record),
                Err(_) => return Value::List(items),
            },
            _ => return Value::List(items),
        }
    }
    Value::Records(records)
}
