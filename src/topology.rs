//! Immutable tree topology (spec.md §3 "Topology").
//!
//! Read-only input configuration: names, roles, parent/child relations,
//! and listen ports. Built once at startup and never mutated afterward —
//! every node task gets a cheap `Arc<Topology>` clone and reads through
//! it without synchronization (spec.md §5 "Shared-resource policy").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// The role a node plays in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Root of the tree; exactly one per topology.
    GrandMaster,
    /// Interior transparent clock; one upstream link, ≥1 downstream link.
    Switch,
    /// Leaf; one upstream link, no downstream links.
    Slave,
}

/// One node's static configuration within the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique name.
    pub name: String,
    /// Role in the tree.
    pub role: Role,
    /// Parent's name; `None` only for the grandmaster.
    #[serde(default)]
    pub parent: Option<String>,
    /// Child names, in the order downstream links should be indexed.
    #[serde(default)]
    pub children: Vec<String>,
    /// TCP listen port; `None` for slaves (they only ever connect out).
    #[serde(default)]
    pub listen_port: Option<u16>,
}

/// The full rooted tree, immutable after [`TopologyBuilder::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    nodes: HashMap<String, NodeSpec>,
    root: String,
}

impl Topology {
    /// Start building a topology by hand.
    #[must_use]
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    /// Parse a topology from its JSON description (spec.md §6
    /// "Configuration" — topology is static input).
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        let topology: Self =
            serde_json::from_str(text).map_err(|e| SimError::InvalidTopology(e.to_string()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// The demo topology from the original implementation this simulator
    /// is based on: `GM → A → {B → {D,E}, C → {F, G → {H,I,J}}}`.
    #[must_use]
    pub fn demo() -> Self {
        Self::builder()
            .grandmaster("GM", 20000)
            .switch("A", "GM", 20001)
            .switch("B", "A", 20002)
            .switch("C", "A", 20003)
            .slave("D", "B")
            .slave("E", "B")
            .slave("F", "C")
            .switch("G", "C", 20004)
            .slave("H", "G")
            .slave("I", "G")
            .slave("J", "G")
            .build()
            .expect("demo topology is well formed")
    }

    /// Look up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// The grandmaster's spec.
    #[must_use]
    pub fn root(&self) -> &NodeSpec {
        &self.nodes[&self.root]
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    /// The TCP listen port registered for `name`, if it has one.
    #[must_use]
    pub fn listen_port(&self, name: &str) -> Option<u16> {
        self.nodes.get(name).and_then(|n| n.listen_port)
    }

    /// Count slave leaves in the subtree rooted at `name` (spec.md §3:
    /// "The GM additionally knows the total number of slaves in its
    /// subtree").
    #[must_use]
    pub fn slave_count_under(&self, name: &str) -> usize {
        let Some(spec) = self.nodes.get(name) else {
            return 0;
        };
        match spec.role {
            Role::Slave => 1,
            Role::GrandMaster | Role::Switch => spec
                .children
                .iter()
                .map(|c| self.slave_count_under(c))
                .sum(),
        }
    }

    /// All slave names in the subtree rooted at `name`, used to build the
    /// preliminary bootstrap announcement (spec.md §6).
    #[must_use]
    pub fn slave_names_under(&self, name: &str) -> Vec<String> {
        let Some(spec) = self.nodes.get(name) else {
            return Vec::new();
        };
        match spec.role {
            Role::Slave => vec![spec.name.clone()],
            Role::GrandMaster | Role::Switch => spec
                .children
                .iter()
                .flat_map(|c| self.slave_names_under(c))
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), SimError> {
        let roots: Vec<&NodeSpec> = self
            .nodes
            .values()
            .filter(|n| n.role == Role::GrandMaster)
            .collect();
        if roots.len() != 1 {
            return Err(SimError::InvalidTopology(format!(
                "expected exactly one grandmaster, found {}",
                roots.len()
            )));
        }
        if roots[0].name != self.root {
            return Err(SimError::InvalidTopology(
                "root pointer does not match the grandmaster node".to_string(),
            ));
        }
        for node in self.nodes.values() {
            match node.role {
                Role::GrandMaster => {
                    if node.parent.is_some() {
                        return Err(SimError::InvalidTopology(format!(
                            "grandmaster {} must not have a parent",
                            node.name
                        )));
                    }
                    if node.listen_port.is_none() {
                        return Err(SimError::InvalidTopology(format!(
                            "grandmaster {} needs a listen port",
                            node.name
                        )));
                    }
                }
                Role::Switch => {
                    if node.parent.is_none() {
                        return Err(SimError::InvalidTopology(format!(
                            "switch {} needs a parent",
                            node.name
                        )));
                    }
                    if node.children.is_empty() {
                        return Err(SimError::InvalidTopology(format!(
                            "switch {} needs at least one child",
                            node.name
                        )));
                    }
                    if node.listen_port.is_none() {
                        return Err(SimError::InvalidTopology(format!(
                            "switch {} needs a listen port",
                            node.name
                        )));
                    }
                }
                Role::Slave => {
                    if node.parent.is_none() {
                        return Err(SimError::InvalidTopology(format!(
                            "slave {} needs a parent",
                            node.name
                        )));
                    }
                    if !node.children.is_empty() {
                        return Err(SimError::InvalidTopology(format!(
                            "slave {} must not have children",
                            node.name
                        )));
                    }
                }
            }
            if let Some(parent) = &node.parent {
                if !self.nodes.contains_key(parent) {
                    return Err(SimError::InvalidTopology(format!(
                        "{} references unknown parent {}",
                        node.name, parent
                    )));
                }
            }
            for child in &node.children {
                if !self.nodes.contains_key(child) {
                    return Err(SimError::InvalidTopology(format!(
                        "{} references unknown child {}",
                        node.name, child
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Fluent builder for hand-assembled topologies (tests, demo binary).
#[derive(Default)]
pub struct TopologyBuilder {
    nodes: HashMap<String, NodeSpec>,
    root: Option<String>,
}

impl TopologyBuilder {
    /// Add the grandmaster. Must be called exactly once.
    #[must_use]
    pub fn grandmaster(mut self, name: &str, listen_port: u16) -> Self {
        self.root = Some(name.to_string());
        self.nodes.insert(
            name.to_string(),
            NodeSpec {
                name: name.to_string(),
                role: Role::GrandMaster,
                parent: None,
                children: Vec::new(),
                listen_port: Some(listen_port),
            },
        );
        self
    }

    /// Add an interior switch, registering it as `parent`'s child.
    #[must_use]
    pub fn switch(mut self, name: &str, parent: &str, listen_port: u16) -> Self {
        self.nodes.insert(
            name.to_string(),
            NodeSpec {
                name: name.to_string(),
                role: Role::Switch,
                parent: Some(parent.to_string()),
                children: Vec::new(),
                listen_port: Some(listen_port),
            },
        );
        self.register_child(parent, name);
        self
    }

    /// Add a leaf slave, registering it as `parent`'s child.
    #[must_use]
    pub fn slave(mut self, name: &str, parent: &str) -> Self {
        self.nodes.insert(
            name.to_string(),
            NodeSpec {
                name: name.to_string(),
                role: Role::Slave,
                parent: Some(parent.to_string()),
                children: Vec::new(),
                listen_port: None,
            },
        );
        self.register_child(parent, name);
        self
    }

    fn register_child(&mut self, parent: &str, child: &str) {
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child.to_string());
        }
    }

    /// Validate and freeze the topology.
    pub fn build(self) -> Result<Topology, SimError> {
        let root = self
            .root
            .ok_or_else(|| SimError::InvalidTopology("no grandmaster added".to_string()))?;
        let topology = Topology {
            nodes: self.nodes,
            root,
        };
        topology.validate()?;
        Ok(topology)
    }
}
