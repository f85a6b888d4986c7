// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node ports.
//!
//! Every XML attribute other than `name` becomes a port. A port holds either
//! a literal (`timeout="500"`) or a blackboard reference (`result="{temp}"`).
//! Literals are parsed when read, in the type the node asks for.

use super::Blackboard;
use crate::error::{Error, Result};
use crate::value::{PvValue, ValueKind};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortValue {
    Literal(String),
    /// Blackboard key, written `{key}` in a tree definition.
    Entry(String),
}

impl PortValue {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Some(key) if !key.trim().is_empty() => PortValue::Entry(key.trim().to_string()),
            _ => PortValue::Literal(raw.to_string()),
        }
    }
}

/// Ports of one node instance.
#[derive(Debug, Clone, Default)]
pub struct Ports {
    node: String,
    values: BTreeMap<String, PortValue>,
}

impl Ports {
    /// Empty port set for the node called `node` (used in error messages).
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, port: &str, raw: &str) {
        self.values.insert(port.to_string(), PortValue::parse(raw));
    }

    #[must_use]
    pub fn with(mut self, port: &str, raw: &str) -> Self {
        self.insert(port, raw);
        self
    }

    #[must_use]
    pub fn contains(&self, port: &str) -> bool {
        self.values.contains_key(port)
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Blackboard key a port names, whether written `key` or `{key}`.
    #[must_use]
    pub fn key(&self, port: &str) -> Option<String> {
        match self.values.get(port)? {
            PortValue::Entry(key) => Some(key.clone()),
            PortValue::Literal(raw) => Some(raw.trim().to_string()).filter(|k| !k.is_empty()),
        }
    }

    fn invalid(&self, port: &str, reason: impl std::fmt::Display) -> Error {
        Error::Config(format!("node '{}': port '{}': {}", self.node, port, reason))
    }

    /// Port as text. Non-text blackboard entries are rendered.
    pub fn get_text(&self, bb: &Blackboard, port: &str) -> Option<String> {
        match self.values.get(port)? {
            PortValue::Literal(s) => Some(s.clone()),
            PortValue::Entry(key) => bb.get(key).map(|v| match v {
                PvValue::Text(s) => s,
                other => other.to_string(),
            }),
        }
    }

    /// Port as a value of `kind`.
    ///
    /// Literals must parse as `kind`. Blackboard text is parsed when it can
    /// be; any other entry is returned as stored and converted by the caller.
    pub fn get_value(
        &self,
        bb: &Blackboard,
        port: &str,
        kind: ValueKind,
    ) -> Result<Option<PvValue>> {
        match self.values.get(port) {
            None => Ok(None),
            Some(PortValue::Literal(s)) => PvValue::parse(kind, s)
                .map(Some)
                .map_err(|e| self.invalid(port, e)),
            Some(PortValue::Entry(key)) => Ok(bb.get(key).map(|v| match v {
                PvValue::Text(s) => PvValue::parse(kind, &s).unwrap_or(PvValue::Text(s)),
                other => other,
            })),
        }
    }

    pub fn get_bool(&self, bb: &Blackboard, port: &str) -> Result<Option<bool>> {
        let value = match self.values.get(port) {
            None => return Ok(None),
            Some(PortValue::Literal(s)) => PvValue::Text(s.clone()),
            Some(PortValue::Entry(key)) => match bb.get(key) {
                Some(v) => v,
                None => return Ok(None),
            },
        };
        match value {
            PvValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(self.invalid(port, format_args!("'{}' is not a boolean", s))),
            },
            other => Ok(other.as_f64().map(|f| f != 0.0)),
        }
    }

    pub fn get_i32(&self, bb: &Blackboard, port: &str) -> Result<Option<i32>> {
        match self.get_value(bb, port, ValueKind::Int32)? {
            None => Ok(None),
            Some(PvValue::Int32(i)) => Ok(Some(i)),
            Some(other) => match crate::value::convert(&other, ValueKind::Int32) {
                Ok(PvValue::Int32(i)) => Ok(Some(i)),
                Ok(_) => Ok(None),
                Err(e) => Err(self.invalid(port, e)),
            },
        }
    }

    /// Non-negative millisecond count as a duration.
    pub fn get_millis(&self, bb: &Blackboard, port: &str) -> Result<Option<Duration>> {
        match self.get_i32(bb, port)? {
            None => Ok(None),
            Some(ms) if ms < 0 => Err(self.invalid(port, format_args!("negative duration {}", ms))),
            Some(ms) => Ok(Some(Duration::from_millis(ms as u64))),
        }
    }

    /// Write `value` to the blackboard entry the port refers to. Returns
    /// `false` when the port is not connected.
    pub fn set_output(&self, bb: &Blackboard, port: &str, value: PvValue) -> Result<bool> {
        match self.values.get(port) {
            None => Ok(false),
            Some(PortValue::Entry(key)) => {
                bb.set(key, value);
                Ok(true)
            }
            Some(PortValue::Literal(raw)) => Err(self.invalid(
                port,
                format_args!("output must be a blackboard reference, got '{}'", raw),
            )),
        }
    }
}
