//! Strict template engine
//!
//! Supported syntax:
//! - `{{ path.to.value }}`: scalar substitution, strict lookup
//! - `{% for item in path.to.seq %} ... {% endfor %}`: iteration over
//!   record lists and opaque lists, nestable
//!
//! Block tags swallow surrounding whitespace: leading indentation before
//! a tag and the newline right after it are dropped, so loops do not
//! leave blank lines in the output.

use thiserror::Error;

use crate::document::{Mapping, Value};

/// Errors raised while parsing or rendering a template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template '{template}': {detail}")]
    Syntax { template: String, detail: String },

    #[error("template '{template}': undefined reference '{path}'")]
    Undefined { template: String, path: String },

    #[error("template '{template}': '{path}' is not a scalar")]
    NotScalar { template: String, path: String },

    #[error("template '{template}': '{path}' is not iterable")]
    NotIterable { template: String, path: String },
}

/// A parsed template, ready to render against a context mapping.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var(String),
    For {
        binding: String,
        path: String,
        body: Vec<Node>,
    },
}

impl Template {
    /// Parse template source. The name is carried for error reporting.
    pub fn parse(name: &str, source: &str) -> Result<Self, RenderError> {
        let mut parser = Parser {
            template: name,
            tokens: tokenize(name, source)?,
            position: 0,
        };
        let nodes = parser.parse_nodes(false)?;
        Ok(Template {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render against a context mapping. The context is read-only; all
    /// loop bindings live on an internal scope stack.
    pub fn render(&self, context: &Mapping) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut scopes: Vec<(String, Value)> = Vec::new();
        self.render_nodes(&self.nodes, context, &mut scopes, &mut out)?;
        Ok(out)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        context: &Mapping,
        scopes: &mut Vec<(String, Value)>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var(path) => {
                    let value = self.lookup(path, context, scopes)?;
                    match value.as_scalar_string() {
                        Some(s) => out.push_str(&s),
                        None => {
                            return Err(RenderError::NotScalar {
                                template: self.name.clone(),
                                path: path.clone(),
                            })
                        }
                    }
                }
                Node::For {
                    binding,
                    path,
                    body,
                } => {
                    let items = self.iterable(path, context, scopes)?;
                    for item in items {
                        scopes.push((binding.clone(), item));
                        let result = self.render_nodes(body, context, scopes, out);
                        scopes.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn lookup(
        &self,
        path: &str,
        context: &Mapping,
        scopes: &[(String, Value)],
    ) -> Result<Value, RenderError> {
        let undefined = || RenderError::Undefined {
            template: self.name.clone(),
            path: path.to_string(),
        };

        let mut segments = path.split('.');
        let head = segments.next().ok_or_else(undefined)?;

        // Innermost loop binding shadows outer bindings and the context.
        let mut current: Value = match scopes.iter().rev().find(|(name, _)| name == head) {
            Some((_, value)) => value.clone(),
            None => context.get(head).cloned().ok_or_else(undefined)?,
        };

        for segment in segments {
            let next = match &current {
                Value::Mapping(map) => map.get(segment).cloned(),
                _ => None,
            };
            current = next.ok_or_else(undefined)?;
        }

        Ok(current)
    }

    fn iterable(
        &self,
        path: &str,
        context: &Mapping,
        scopes: &[(String, Value)],
    ) -> Result<Vec<Value>, RenderError> {
        match self.lookup(path, context, scopes)? {
            Value::Records(records) => Ok(records
                .into_iter()
                .map(|r| Value::Mapping(r.fields))
                .collect()),
            Value::List(items) => Ok(items),
            _ => Err(RenderError::NotIterable {
                template: self.name.clone(),
                path: path.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
enum Token {
    Text(String),
    Var(String),
    ForStart { binding: String, path: String },
    ForEnd,
}

struct Parser<'a> {
    template: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    /// Consume tokens until the end of input (or an `endfor` when inside
    /// a block).
    fn parse_nodes(&mut self, inside_for: bool) -> Result<Vec<Node>, RenderError> {
        let mut nodes = Vec::new();

        while self.position < self.tokens.len() {
            let token = std::mem::replace(
                &mut self.tokens[self.position],
                Token::Text(String::new()),
            );
            self.position += 1;

            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Var(path) => nodes.push(Node::Var(path)),
                Token::ForStart { binding, path } => {
                    let body = self.parse_nodes(true)?;
                    nodes.push(Node::For {
                        binding,
                        path,
                        body,
                    });
                }
                Token::ForEnd => {
                    if inside_for {
                        return Ok(nodes);
                    }
                    return Err(self.syntax("'endfor' without matching 'for'"));
                }
            }
        }

        if inside_for {
            return Err(self.syntax("unterminated 'for' block"));
        }
        Ok(nodes)
    }

    fn syntax(&self, detail: &str) -> RenderError {
        RenderError::Syntax {
            template: self.template.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Split template source into text, variable, and block tokens.
fn tokenize(template: &str, source: &str) -> Result<Vec<Token>, RenderError> {
    let syntax = |detail: String| RenderError::Syntax {
        template: template.to_string(),
        detail,
    };

    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = source;

    loop {
        let var_at = rest.find("{{");
        let tag_at = rest.find("{%");

        let (at, is_tag) = match (var_at, tag_at) {
            (None, None) => break,
            (Some(v), None) => (v, false),
            (None, Some(t)) => (t, true),
            (Some(v), Some(t)) => {
                if v < t {
                    (v, false)
                } else {
                    (t, true)
                }
            }
        };

        text.push_str(&rest[..at]);
        rest = &rest[at + 2..];

        let close = if is_tag { "%}" } else { "}}" };
        let end = rest
            .find(close)
            .ok_or_else(|| syntax(format!("unclosed '{}' tag", if is_tag { "{%" } else { "{{" })))?;
        let inner = rest[..end].trim().to_string();
        rest = &rest[end + 2..];

        if is_tag {
            // lstrip: drop indentation preceding the tag on its line.
            let kept = text.trim_end_matches([' ', '\t']);
            if kept.is_empty() || kept.ends_with('\n') {
                text.truncate(kept.len());
            }
            // trim: drop the newline right after the tag.
            if let Some(stripped) = rest.strip_prefix('\n') {
                rest = stripped;
            }

            if !text.is_empty() {
                tokens.push(Token::Text(std::mem::take(&mut text)));
            }

            if inner == "endfor" {
                tokens.push(Token::ForEnd);
            } else {
                let words: Vec<&str> = inner.split_whitespace().collect();
                match words.as_slice() {
                    ["for", binding, "in", path] => tokens.push(Token::ForStart {
                        binding: binding.to_string(),
                        path: path.to_string(),
                    }),
                    _ => return Err(syntax(format!("unsupported tag '{{% {} %}}'", inner))),
                }
            }
        } else {
            if inner.is_empty() {
                return Err(syntax("empty '{{ }}' placeholder".to_string()));
            }
            if !text.is_empty() {
                tokens.push(Token::Text(std::mem::take(&mut text)));
            }
            tokens.push(Token::Var(inner));
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }

    Ok(tokens)
}
