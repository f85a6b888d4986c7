// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node type registry used by the tree loader.

use super::actions::{AlwaysFailure, AlwaysSuccess, Print, SetBlackboard, Sleep};
use super::control::{Fallback, Inverter, RetryUntilSuccessful, Sequence};
use super::pv_nodes::{PvGetNode, PvPutNode};
use super::{Ports, TreeNode};
use crate::config::BridgeConfig;
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::registry::HandleRegistry;
use crate::task::{ReadTask, WriteTask};
use crate::value::ValueKind;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How many children a node type takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeArity {
    Leaf,
    Decorator,
    Control,
}

impl NodeArity {
    fn accepts(self, children: usize) -> bool {
        match self {
            NodeArity::Leaf => children == 0,
            NodeArity::Decorator => children == 1,
            NodeArity::Control => children >= 1,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            NodeArity::Leaf => "no children",
            NodeArity::Decorator => "exactly one child",
            NodeArity::Control => "at least one child",
        }
    }
}

/// Everything a builder needs to instantiate one node.
pub struct NodeDef {
    pub name: String,
    pub ports: Ports,
    pub children: Vec<Box<dyn TreeNode>>,
}

impl NodeDef {
    pub fn leaf(name: impl Into<String>, ports: Ports) -> Self {
        Self {
            name: name.into(),
            ports,
            children: Vec::new(),
        }
    }

    fn single_child(&mut self) -> Result<Box<dyn TreeNode>> {
        self.children
            .pop()
            .ok_or_else(|| Error::Config(format!("node '{}' needs a child", self.name)))
    }
}

pub type NodeBuilder = Box<dyn Fn(NodeDef) -> Result<Box<dyn TreeNode>> + Send + Sync>;

struct Registration {
    arity: NodeArity,
    build: NodeBuilder,
}

/// Maps XML element names to node builders.
pub struct NodeFactory {
    types: BTreeMap<String, Registration>,
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFactory {
    /// Factory with the built-in control, decorator and action nodes.
    pub fn new() -> Self {
        let mut factory = Self {
            types: BTreeMap::new(),
        };
        factory.register_builtins();
        factory
    }

    /// Register (or replace) a node type.
    pub fn register(
        &mut self,
        id: &str,
        arity: NodeArity,
        build: impl Fn(NodeDef) -> Result<Box<dyn TreeNode>> + Send + Sync + 'static,
    ) {
        if self
            .types
            .insert(
                id.to_string(),
                Registration {
                    arity,
                    build: Box::new(build),
                },
            )
            .is_some()
        {
            log::debug!("[factory] node type '{}' replaced", id);
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    #[must_use]
    pub fn arity(&self, id: &str) -> Option<NodeArity> {
        self.types.get(id).map(|r| r.arity)
    }

    /// Registered type names, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Instantiate a node of type `id`.
    pub fn build(&self, id: &str, def: NodeDef) -> Result<Box<dyn TreeNode>> {
        let Some(reg) = self.types.get(id) else {
            return Err(Error::Config(format!("unknown node type '{}'", id)));
        };
        if !reg.arity.accepts(def.children.len()) {
            return Err(Error::Config(format!(
                "node '{}' ({}) takes {}, got {}",
                def.name,
                id,
                reg.arity.expected(),
                def.children.len()
            )));
        }
        (reg.build)(def)
    }

    fn register_builtins(&mut self) {
        self.register("Sequence", NodeArity::Control, |def| {
            Ok(Box::new(Sequence::new(def.name, def.children)))
        });
        self.register("Fallback", NodeArity::Control, |def| {
            Ok(Box::new(Fallback::new(def.name, def.children)))
        });
        self.register("Inverter", NodeArity::Decorator, |mut def| {
            let child = def.single_child()?;
            Ok(Box::new(Inverter::new(def.name, child)))
        });
        self.register("RetryUntilSuccessful", NodeArity::Decorator, |mut def| {
            let bb = super::Blackboard::new();
            let Some(attempts) = def.ports.get_i32(&bb, "num_attempts")? else {
                return Err(Error::Config(format!(
                    "node '{}': missing required input 'num_attempts'",
                    def.name
                )));
            };
            let child = def.single_child()?;
            Ok(Box::new(RetryUntilSuccessful::new(def.name, child, attempts)))
        });
        self.register("Print", NodeArity::Leaf, |def| {
            Ok(Box::new(Print::new(def.name, def.ports)))
        });
        self.register("Sleep", NodeArity::Leaf, |def| {
            Ok(Box::new(Sleep::new(def.name, def.ports)))
        });
        self.register("AlwaysSuccess", NodeArity::Leaf, |def| {
            Ok(Box::new(AlwaysSuccess::new(def.name)))
        });
        self.register("AlwaysFailure", NodeArity::Leaf, |def| {
            Ok(Box::new(AlwaysFailure::new(def.name)))
        });
        self.register("SetBlackboard", NodeArity::Leaf, |def| {
            Ok(Box::new(SetBlackboard::new(def.name, def.ports)))
        });
    }

    /// Register `PvGet<Kind>` / `PvPut<Kind>` for every value kind, plus the
    /// `CAGet*` / `CAPut*` names, all bound to one context and registry.
    /// `PvGet` and `CAGet` read the channel's native kind.
    pub fn register_pv_nodes(
        &mut self,
        context: &Arc<ContextManager>,
        registry: &Arc<HandleRegistry>,
        config: &BridgeConfig,
    ) {
        let timeout = config.default_timeout();
        for id in ["PvGet", "CAGet"] {
            let context = Arc::clone(context);
            let registry = Arc::clone(registry);
            self.register(id, NodeArity::Leaf, move |def| {
                let task = ReadTask::native(Arc::clone(&context), Arc::clone(&registry))?
                    .with_default_timeout(timeout);
                Ok(Box::new(PvGetNode::new(def.name, def.ports, task)))
            });
        }
        for kind in ValueKind::ALL {
            let suffix = type_suffix(kind);
            let aliases = ca_suffixes(kind);

            let get_names = std::iter::once(format!("PvGet{}", suffix))
                .chain(aliases.iter().map(|a| format!("CAGet{}", a)));
            for id in get_names {
                let context = Arc::clone(context);
                let registry = Arc::clone(registry);
                self.register(&id, NodeArity::Leaf, move |def| {
                    let task = ReadTask::new(Arc::clone(&context), Arc::clone(&registry), kind)?
                        .with_default_timeout(timeout);
                    Ok(Box::new(PvGetNode::new(def.name, def.ports, task)))
                });
            }

            let put_names = std::iter::once(format!("PvPut{}", suffix))
                .chain(aliases.iter().map(|a| format!("CAPut{}", a)));
            for id in put_names {
                let context = Arc::clone(context);
                let registry = Arc::clone(registry);
                self.register(&id, NodeArity::Leaf, move |def| {
                    let task = WriteTask::new(Arc::clone(&context), Arc::clone(&registry), kind)?
                        .with_default_timeout(timeout);
                    Ok(Box::new(PvPutNode::new(def.name, def.ports, task)))
                });
            }
        }
    }
}

fn type_suffix(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int32 => "Int32",
        ValueKind::Float32 => "Float32",
        ValueKind::Float64 => "Float64",
        ValueKind::Enum => "Enum",
        ValueKind::Text => "Text",
    }
}

fn ca_suffixes(kind: ValueKind) -> &'static [&'static str] {
    match kind {
        ValueKind::Int32 => &["Int", "Long"],
        ValueKind::Float32 => &["Float"],
        ValueKind::Float64 => &["Double"],
        ValueKind::Enum => &["Enum"],
        ValueKind::Text => &["String"],
    }
}

impl std::fmt::Debug for NodeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeFactory")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}
