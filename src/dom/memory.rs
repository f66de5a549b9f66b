//! In-memory document
//!
//! A complete [`Document`] used by the headless simulator and the tests.
//! It counts effective mutations: a write that leaves the tree unchanged is
//! not a mutation.

use super::{Document, NodeRef, Selector};
use crate::errors::EmbedError;
use crate::media::MediaHandle;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    style: BTreeMap<String, String>,
    children: Vec<u64>,
    parent: Option<u64>,
    src_object: Option<MediaHandle>,
    autoplay_blocked: bool,
    plays: u32,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<u64, NodeData>,
    next_id: u64,
    mutations: u64,
}

impl Tree {
    fn is_ancestor(&self, ancestor: u64, mut node: u64) -> bool {
        while let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    fn detach(&mut self, id: u64) -> bool {
        let Some(parent) = self.nodes.get_mut(&id).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| *child != id);
        }
        true
    }

    fn node_matches(&self, id: u64, selector: &Selector) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        selector.matches(
            &node.tag,
            |class| node.classes.iter().any(|c| c == class),
            |name| node.attributes.get(name).map(String::as_str),
        )
    }

    fn collect(&self, id: u64, selector: &Selector, out: &mut Vec<NodeRef>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for child in &node.children {
            if self.node_matches(*child, selector) {
                out.push(NodeRef(*child));
            }
            self.collect(*child, selector, out);
        }
    }
}

/// Thread-safe in-memory DOM rooted at a `body` element
#[derive(Debug)]
pub struct MemoryDocument {
    tree: Mutex<Tree>,
    root: NodeRef,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            0,
            NodeData {
                tag: "body".to_string(),
                ..NodeData::default()
            },
        );
        Self {
            tree: Mutex::new(Tree {
                nodes,
                next_id: 1,
                mutations: 0,
            }),
            root: NodeRef(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn body(&self) -> NodeRef {
        self.root
    }

    /// Create an element with classes and attributes and append it to `parent`
    pub fn append_element(
        &self,
        parent: NodeRef,
        tag: &str,
        classes: &[&str],
        attributes: &[(&str, &str)],
    ) -> Result<NodeRef, EmbedError> {
        let node = self.create_element(tag);
        for class in classes {
            self.add_class(node, class);
        }
        for (name, value) in attributes {
            self.set_attribute(node, name, value);
        }
        self.append_child(parent, node)?;
        Ok(node)
    }

    /// Effective mutations applied so far
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }

    pub fn tag_name(&self, node: NodeRef) -> Option<String> {
        self.lock().nodes.get(&node.0).map(|n| n.tag.clone())
    }

    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        self.lock()
            .nodes
            .get(&node.0)
            .map(|n| n.children.iter().copied().map(NodeRef).collect())
            .unwrap_or_default()
    }

    /// Make `play` reject for this video, as a browser autoplay policy would
    pub fn block_autoplay(&self, video: NodeRef, blocked: bool) {
        if let Some(node) = self.lock().nodes.get_mut(&video.0) {
            node.autoplay_blocked = blocked;
        }
    }

    /// Number of `play` calls that were accepted for this video
    pub fn play_count(&self, video: NodeRef) -> u32 {
        self.lock().nodes.get(&video.0).map(|n| n.plays).unwrap_or(0)
    }

    /// Markup-like rendering of a subtree, for diagnostics
    pub fn render(&self, node: NodeRef) -> String {
        let tree = self.lock();
        let mut out = String::new();
        render_node(&tree, node.0, 0, &mut out);
        out
    }
}

fn render_node(tree: &Tree, id: u64, depth: usize, out: &mut String) {
    let Some(node) = tree.nodes.get(&id) else {
        return;
    };
    let _ = write!(out, "{}<{}", "  ".repeat(depth), node.tag);
    if !node.classes.is_empty() {
        let _ = write!(out, " class=\"{}\"", node.classes.join(" "));
    }
    for (name, value) in &node.attributes {
        let _ = write!(out, " {}=\"{}\"", name, value);
    }
    if node.src_object.is_some() {
        out.push_str(" [srcObject]");
    }
    out.push_str(">\n");
    for child in &node.children {
        render_node(tree, *child, depth + 1, out);
    }
}

impl Document for MemoryDocument {
    fn query_all(&self, scope: Option<NodeRef>, selector: &Selector) -> Vec<NodeRef> {
        let tree = self.lock();
        let mut out = Vec::new();
        tree.collect(scope.unwrap_or(self.root).0, selector, &mut out);
        out
    }

    fn matches(&self, node: NodeRef, selector: &Selector) -> bool {
        self.lock().node_matches(node.0, selector)
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.lock()
            .nodes
            .get(&node.0)
            .and_then(|n| n.parent)
            .map(NodeRef)
    }

    fn is_connected(&self, node: NodeRef) -> bool {
        let tree = self.lock();
        node == self.root || tree.is_ancestor(self.root.0, node.0)
    }

    fn attribute(&self, node: NodeRef, name: &str) -> Option<String> {
        self.lock()
            .nodes
            .get(&node.0)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeRef, name: &str, value: &str) {
        let mut tree = self.lock();
        let Some(data) = tree.nodes.get_mut(&node.0) else {
            return;
        };
        if data.attributes.get(name).map(String::as_str) == Some(value) {
            return;
        }
        data.attributes.insert(name.to_string(), value.to_string());
        tree.mutations += 1;
    }

    fn has_class(&self, node: NodeRef, class: &str) -> bool {
        self.lock()
            .nodes
            .get(&node.0)
            .map(|n| n.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    fn add_class(&self, node: NodeRef, class: &str) {
        let mut tree = self.lock();
        let Some(data) = tree.nodes.get_mut(&node.0) else {
            return;
        };
        if data.classes.iter().any(|c| c == class) {
            return;
        }
        data.classes.push(class.to_string());
        tree.mutations += 1;
    }

    fn remove_class(&self, node: NodeRef, class: &str) {
        let mut tree = self.lock();
        let Some(data) = tree.nodes.get_mut(&node.0) else {
            return;
        };
        let before = data.classes.len();
        data.classes.retain(|c| c != class);
        if data.classes.len() != before {
            tree.mutations += 1;
        }
    }

    fn style_property(&self, node: NodeRef, property: &str) -> Option<String> {
        self.lock()
            .nodes
            .get(&node.0)
            .and_then(|n| n.style.get(property).cloned())
    }

    fn set_style_property(&self, node: NodeRef, property: &str, value: &str) {
        let mut tree = self.lock();
        let Some(data) = tree.nodes.get_mut(&node.0) else {
            return;
        };
        if data.style.get(property).map(String::as_str) == Some(value) {
            return;
        }
        data.style.insert(property.to_string(), value.to_string());
        tree.mutations += 1;
    }

    fn create_element(&self, tag: &str) -> NodeRef {
        let mut tree = self.lock();
        let id = tree.next_id;
        tree.next_id += 1;
        tree.nodes.insert(
            id,
            NodeData {
                tag: tag.to_ascii_lowercase(),
                ..NodeData::default()
            },
        );
        NodeRef(id)
    }

    fn append_child(&self, parent: NodeRef, child: NodeRef) -> Result<(), EmbedError> {
        let mut tree = self.lock();
        if !tree.nodes.contains_key(&parent.0) || !tree.nodes.contains_key(&child.0) {
            return Err(EmbedError::Dom(format!(
                "cannot append {} to {}: unknown node",
                child, parent
            )));
        }
        if parent == child || tree.is_ancestor(child.0, parent.0) {
            return Err(EmbedError::Dom(format!(
                "cannot append {} into its own subtree",
                child
            )));
        }

        tree.detach(child.0);
        if let Some(data) = tree.nodes.get_mut(&child.0) {
            data.parent = Some(parent.0);
        }
        if let Some(data) = tree.nodes.get_mut(&parent.0) {
            data.children.push(child.0);
        }
        tree.mutations += 1;
        Ok(())
    }

    fn remove(&self, node: NodeRef) {
        let mut tree = self.lock();
        if tree.detach(node.0) {
            tree.mutations += 1;
        }
    }

    fn src_object(&self, video: NodeRef) -> Option<MediaHandle> {
        self.lock()
            .nodes
            .get(&video.0)
            .and_then(|n| n.src_object.clone())
    }

    fn set_src_object(&self, video: NodeRef, source: Option<&MediaHandle>) {
        let mut tree = self.lock();
        let Some(data) = tree.nodes.get_mut(&video.0) else {
            return;
        };
        if data.src_object.as_ref() == source {
            return;
        }
        data.src_object = source.cloned();
        tree.mutations += 1;
    }

    fn play(&self, video: NodeRef) -> Result<(), EmbedError> {
        let mut tree = self.lock();
        let Some(data) = tree.nodes.get_mut(&video.0) else {
            return Err(EmbedError::Playback(format!("{} does not exist", video)));
        };
        if data.autoplay_blocked {
            return Err(EmbedError::Playback(
                "autoplay blocked until user gesture".to_string(),
            ));
        }
        if data.src_object.is_none() {
            return Err(EmbedError::Playback(format!("{} has no source", video)));
        }
        data.plays += 1;
        Ok(())
    }
}
