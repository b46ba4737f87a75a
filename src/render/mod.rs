//! Template rendering boundary
//!
//! A deliberately small, strict engine: `{{ dotted.path }}` placeholders
//! and `{% for item in path %}` blocks. Any undefined reference is a
//! hard [`RenderError`], never a silently-empty substitution. A typo in
//! a template must abort the run before anything is written.

mod template;

pub use template::{RenderError, Template};
