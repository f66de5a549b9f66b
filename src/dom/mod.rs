//! Host DOM seam
//!
//! The dock, its tiles and their video surfaces belong to the host. The core
//! reaches them only through [`Document`], holding [`NodeRef`]s as
//! non-owning handles that may go stale at any time.

pub mod memory;

pub use memory::MemoryDocument;

use crate::errors::EmbedError;
use crate::media::MediaHandle;
use std::fmt;

/// Non-owning reference to a node in the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub u64);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attribute condition of a [`Selector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeMatch {
    Present(String),
    Equals(String, String),
}

/// Small selector subset: optional tag, class and attribute condition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub tag: Option<String>,
    pub class: Option<String>,
    pub attribute: Option<AttributeMatch>,
}

impl Selector {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn class(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(AttributeMatch::Present(name.into()));
        self
    }

    pub fn with_attribute_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribute = Some(AttributeMatch::Equals(name.into(), value.into()));
        self
    }

    /// Evaluate the selector against a node's parts
    pub fn matches<'a>(
        &self,
        tag: &str,
        mut has_class: impl FnMut(&str) -> bool,
        mut attribute: impl FnMut(&str) -> Option<&'a str>,
    ) -> bool {
        if let Some(want) = &self.tag {
            if !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(class) = &self.class {
            if !has_class(class) {
                return false;
            }
        }
        match &self.attribute {
            None => true,
            Some(AttributeMatch::Present(name)) => attribute(name).is_some(),
            Some(AttributeMatch::Equals(name, value)) => attribute(name) == Some(value.as_str()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{}", tag)?;
        }
        if let Some(class) = &self.class {
            write!(f, ".{}", class)?;
        }
        match &self.attribute {
            Some(AttributeMatch::Present(name)) => write!(f, "[{}]", name),
            Some(AttributeMatch::Equals(name, value)) => write!(f, "[{}=\"{}\"]", name, value),
            None => Ok(()),
        }
    }
}

/// Access to the host document.
///
/// Writes to stale nodes are ignored. Only `append_child` and `play` can fail.
pub trait Document: Send + Sync {
    /// Descendants of `scope` (or of the whole connected document) in tree order
    fn query_all(&self, scope: Option<NodeRef>, selector: &Selector) -> Vec<NodeRef>;

    fn query(&self, scope: Option<NodeRef>, selector: &Selector) -> Option<NodeRef> {
        self.query_all(scope, selector).into_iter().next()
    }

    fn matches(&self, node: NodeRef, selector: &Selector) -> bool;

    fn parent(&self, node: NodeRef) -> Option<NodeRef>;

    /// Whether the node is still attached to the document root
    fn is_connected(&self, node: NodeRef) -> bool;

    fn attribute(&self, node: NodeRef, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeRef, name: &str, value: &str);

    fn has_class(&self, node: NodeRef, class: &str) -> bool;

    fn add_class(&self, node: NodeRef, class: &str);

    fn remove_class(&self, node: NodeRef, class: &str);

    /// Resolved style value; `None` means the property is at its initial value
    fn style_property(&self, node: NodeRef, property: &str) -> Option<String>;

    fn set_style_property(&self, node: NodeRef, property: &str, value: &str);

    /// New detached element
    fn create_element(&self, tag: &str) -> NodeRef;

    fn append_child(&self, parent: NodeRef, child: NodeRef) -> Result<(), EmbedError>;

    /// Detach the node (and its subtree) from its parent
    fn remove(&self, node: NodeRef);

    fn src_object(&self, video: NodeRef) -> Option<MediaHandle>;

    fn set_src_object(&self, video: NodeRef, source: Option<&MediaHandle>);

    fn play(&self, video: NodeRef) -> Result<(), EmbedError>;
}
