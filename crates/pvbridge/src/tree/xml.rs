// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XML tree definition loader.
//!
//! Accepts the `BTCPP_format="4"` layout:
//!
//! ```text
//! <root BTCPP_format="4" main_tree_to_execute="Main">
//!   <BehaviorTree ID="Main">
//!     <Sequence>
//!       <PvGetFloat64 pv="TEMP:1" result="{temp}"/>
//!       <SubTree ID="Report"/>
//!     </Sequence>
//!   </BehaviorTree>
//!   <BehaviorTree ID="Report">
//!     <Print message="{temp}"/>
//!   </BehaviorTree>
//! </root>
//! ```
//!
//! Element names select the node type in the [`NodeFactory`]; every attribute
//! except `name` becomes a port. `SubTree` elements are replaced by the
//! referenced tree and share the caller's blackboard.

use super::{Blackboard, NodeFactory, NodeDef, Ports, Tree, TreeNode};
use crate::error::{Error, Result};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const SUPPORTED_FORMAT: &str = "4";
const SUBTREE: &str = "SubTree";

fn config_err(msg: impl Into<String>) -> Error {
    Error::Config(msg.into())
}

/// Parse `xml` and build its main tree.
pub fn load_tree(factory: &NodeFactory, xml: &str, blackboard: Arc<Blackboard>) -> Result<Tree> {
    let doc = Document::parse(xml).map_err(|e| config_err(format!("invalid tree XML: {}", e)))?;
    let root = doc.root_element();
    if root.tag_name().name() != "root" {
        return Err(config_err(format!(
            "expected <root>, found <{}>",
            root.tag_name().name()
        )));
    }
    match root.attribute("BTCPP_format") {
        Some(SUPPORTED_FORMAT) => {}
        Some(other) => {
            return Err(config_err(format!(
                "unsupported BTCPP_format '{}' (expected {})",
                other, SUPPORTED_FORMAT
            )))
        }
        None => log::warn!("[xml] <root> has no BTCPP_format, assuming {}", SUPPORTED_FORMAT),
    }

    let mut trees: HashMap<&str, Node<'_, '_>> = HashMap::new();
    let mut order = Vec::new();
    for def in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "BehaviorTree")
    {
        let id = def
            .attribute("ID")
            .ok_or_else(|| config_err("<BehaviorTree> without ID"))?;
        if trees.insert(id, def).is_some() {
            return Err(config_err(format!("duplicate BehaviorTree ID '{}'", id)));
        }
        order.push(id);
    }

    let main = match root.attribute("main_tree_to_execute") {
        Some(id) => id,
        None if order.len() == 1 => order[0],
        None if order.is_empty() => return Err(config_err("no <BehaviorTree> defined")),
        None => {
            return Err(config_err(
                "several trees defined and no main_tree_to_execute",
            ))
        }
    };

    let builder = Builder { factory, trees };
    let root_node = builder.build_tree(main, &mut Vec::new())?;
    log::info!("[xml] loaded tree '{}'", main);
    Ok(Tree::new(main, root_node, blackboard))
}

/// Read and build a tree definition file.
pub fn load_tree_file(
    factory: &NodeFactory,
    path: impl AsRef<Path>,
    blackboard: Arc<Blackboard>,
) -> Result<Tree> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path)
        .map_err(|e| config_err(format!("reading {}: {}", path.display(), e)))?;
    load_tree(factory, &xml, blackboard)
}

struct Builder<'f, 'a, 'input> {
    factory: &'f NodeFactory,
    trees: HashMap<&'a str, Node<'a, 'input>>,
}

impl<'a, 'input> Builder<'_, 'a, 'input> {
    /// Build the single child of `<BehaviorTree ID=id>`. `stack` holds the
    /// tree IDs being expanded, to reject recursive subtrees.
    fn build_tree(&self, id: &'a str, stack: &mut Vec<&'a str>) -> Result<Box<dyn TreeNode>> {
        let def = self
            .trees
            .get(id)
            .ok_or_else(|| config_err(format!("unknown tree ID '{}'", id)))?;
        if stack.contains(&id) {
            return Err(config_err(format!(
                "recursive SubTree: {} -> {}",
                stack.join(" -> "),
                id
            )));
        }

        let mut children = def.children().filter(Node::is_element);
        let (Some(top), None) = (children.next(), children.next()) else {
            return Err(config_err(format!(
                "BehaviorTree '{}' must have exactly one root node",
                id
            )));
        };

        stack.push(id);
        let node = self.build_node(top, stack);
        stack.pop();
        node
    }

    fn build_node(
        &self,
        elem: Node<'a, 'input>,
        stack: &mut Vec<&'a str>,
    ) -> Result<Box<dyn TreeNode>> {
        let kind = elem.tag_name().name();
        if kind == SUBTREE {
            let id = elem
                .attribute("ID")
                .ok_or_else(|| config_err("<SubTree> without ID"))?;
            return self.build_tree(id, stack);
        }

        let name = elem.attribute("name").unwrap_or(kind).to_string();
        let mut ports = Ports::new(name.clone());
        for attr in elem.attributes().filter(|a| a.name() != "name") {
            ports.insert(attr.name(), attr.value());
        }

        let children = elem
            .children()
            .filter(Node::is_element)
            .map(|child| self.build_node(child, stack))
            .collect::<Result<Vec<_>>>()?;

        self.factory.build(
            kind,
            NodeDef {
                name,
                ports,
                children,
            },
        )
    }
}
