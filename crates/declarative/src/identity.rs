//! Composite identifiers such as `{tenant_id}/{distribution_id}`.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// One slash-separated part of an identifier template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSegment {
    Literal(&'static str),
    Var(&'static str),
}

/// A fixed layout of literal and variable segments joined by `/`.
#[derive(Debug, Clone, Copy)]
pub struct IdTemplate {
    segments: &'static [IdSegment],
}

impl IdTemplate {
    pub const fn new(segments: &'static [IdSegment]) -> Self {
        Self { segments }
    }

    /// Names of the variable segments, in order.
    pub fn vars(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.segments.iter().filter_map(|s| match s {
            IdSegment::Var(name) => Some(*name),
            IdSegment::Literal(_) => None,
        })
    }

    /// Build an identifier from variable values.
    pub fn format(&self, values: &[(&str, &str)]) -> Result<String> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in self.segments {
            match segment {
                IdSegment::Literal(text) => parts.push(*text),
                IdSegment::Var(name) => {
                    let value = values
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| *v)
                        .unwrap_or_default();
                    if value.is_empty() || value.contains('/') {
                        return Err(Error::InvalidIdentifier {
                            id: format!("{name}={value:?}"),
                            expected: format!("a non-empty value without `/` for `{name}` in {self}"),
                        });
                    }
                    parts.push(value);
                }
            }
        }
        Ok(parts.join("/"))
    }

    /// Split an identifier into its variable values.
    pub fn parse(&self, id: &str) -> Result<BTreeMap<&'static str, String>> {
        let invalid = || Error::InvalidIdentifier {
            id: id.to_string(),
            expected: self.to_string(),
        };
        let parts: Vec<&str> = id.split('/').collect();
        if parts.len() != self.segments.len() {
            return Err(invalid());
        }
        let mut values = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                IdSegment::Literal(text) if *text == part => {}
                IdSegment::Literal(_) => return Err(invalid()),
                IdSegment::Var(_) if part.is_empty() => return Err(invalid()),
                IdSegment::Var(name) => {
                    values.insert(*name, part.to_string());
                }
            }
        }
        Ok(values)
    }
}

impl fmt::Display for IdTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                IdSegment::Literal(text) => f.write_str(text)?,
                IdSegment::Var(name) => write!(f, "{{{name}}}")?,
            }
        }
        Ok(())
    }
}
