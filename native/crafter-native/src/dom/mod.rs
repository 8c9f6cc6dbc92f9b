//! Document Module for Crafter
//!
//! A live, mutable HTML document backed by `markup5ever_rcdom`. Parsing goes
//! through html5ever so markup written into an element is tokenized the same way a
//! browser would, and new binding elements become discoverable immediately.
//!
//! Besides the tree itself the document owns two side tables a browser keeps on
//! its element objects: script-visible properties (`el.value = ...`) and event
//! listeners.

mod selector;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use tendril::StrTendril;

use crate::error::CrafterError;

pub use selector::Selector;

/// Properties that mirror an attribute until a script assigns them.
const REFLECTED_PROPERTIES: &[&str] = &[
    "value",
    "title",
    "href",
    "src",
    "name",
    "type",
    "placeholder",
    "alt",
    "lang",
];

/// Properties scripts can read but not assign.
const READ_ONLY_PROPERTIES: &[&str] = &["tagName", "localName", "outerHTML"];

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to an element node. Equality and hashing follow node identity.
#[derive(Clone)]
pub struct Element(Handle);

impl Element {
    pub fn from_handle(handle: Handle) -> Option<Self> {
        if matches!(handle.data, NodeData::Element { .. }) {
            Some(Element(handle))
        } else {
            None
        }
    }

    pub fn tag_name(&self) -> String {
        match &self.0.data {
            NodeData::Element { name, .. } => name.local.to_string(),
            _ => String::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match &self.0.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|attr| &*attr.name.local == name)
                .map(|attr| attr.value.to_string()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        match &self.0.data {
            NodeData::Element { attrs, .. } => {
                attrs.borrow().iter().any(|attr| &*attr.name.local == name)
            }
            _ => false,
        }
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &self.0.data {
            let mut attrs = attrs.borrow_mut();
            match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
                Some(attr) => attr.value = StrTendril::from_slice(value),
                None => attrs.push(Attribute {
                    name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                    value: StrTendril::from_slice(value),
                }),
            }
        }
    }

    pub fn remove_attribute(&self, name: &str) {
        if let NodeData::Element { attrs, .. } = &self.0.data {
            attrs.borrow_mut().retain(|attr| &*attr.name.local != name);
        }
    }

    pub fn class_list(&self) -> Vec<String> {
        self.attribute("class")
            .map(|class| class.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn parent_element(&self) -> Option<Element> {
        parent_node(&self.0).and_then(Element::from_handle)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        collect_text(&self.0, &mut text);
        text
    }

    /// Replace all children with a single text node.
    pub fn set_text_content(&self, text: &str) {
        let mut children = Vec::new();
        if !text.is_empty() {
            children.push(Node::new(NodeData::Text {
                contents: RefCell::new(StrTendril::from_slice(text)),
            }));
        }
        self.replace_children(children);
    }

    pub fn inner_html(&self) -> String {
        serialize_node(&self.0, TraversalScope::ChildrenOnly(None))
    }

    pub fn outer_html(&self) -> String {
        serialize_node(&self.0, TraversalScope::IncludeNode)
    }

    /// Replace all children with the nodes parsed from `markup`, using this
    /// element as the fragment parsing context.
    pub fn set_inner_html(&self, markup: &str) {
        let context = match &self.0.data {
            NodeData::Element { name, .. } => name.clone(),
            _ => return,
        };
        let fragment = parse_fragment(RcDom::default(), Default::default(), context, vec![])
            .one(markup);

        // Fragment parsing wraps the result in a synthetic <html> root.
        let root = fragment.document.children.borrow().first().cloned();
        let nodes = root
            .map(|root| std::mem::take(&mut *root.children.borrow_mut()))
            .unwrap_or_default();
        self.replace_children(nodes);
    }

    fn replace_children(&self, nodes: Vec<Handle>) {
        let old = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in &old {
            child.parent.set(None);
        }
        for node in &nodes {
            node.parent.set(Some(Rc::downgrade(&self.0)));
        }
        *self.0.children.borrow_mut() = nodes;
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attribute("id") {
            Some(id) => write!(f, "<{} id=\"{}\">", self.tag_name(), id),
            None => write!(f, "<{}>", self.tag_name()),
        }
    }
}

fn parent_node(handle: &Handle) -> Option<Handle> {
    let parent = handle.parent.take();
    let node = parent.as_ref().and_then(|weak| weak.upgrade());
    handle.parent.set(parent);
    node
}

fn collect_text(handle: &Handle, out: &mut String) {
    for child in handle.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => collect_text(child, out),
            _ => {}
        }
    }
}

fn serialize_node(handle: &Handle, traversal_scope: TraversalScope) -> String {
    let mut bytes = Vec::new();
    let opts = SerializeOpts {
        traversal_scope,
        ..Default::default()
    };
    if let Err(error) = serialize(&mut bytes, &SerializableHandle::from(handle.clone()), opts) {
        tracing::warn!(error = %error, "failed to serialize node");
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Elements under `root` in document order.
fn descendant_elements(root: &Handle) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut stack: Vec<Handle> = root.children.borrow().iter().rev().cloned().collect();
    while let Some(handle) = stack.pop() {
        stack.extend(handle.children.borrow().iter().rev().cloned());
        if let Some(element) = Element::from_handle(handle) {
            elements.push(element);
        }
    }
    elements
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LISTENERS
// ═══════════════════════════════════════════════════════════════════════════════

pub type EventCallback = Rc<dyn Fn(&Element, &str)>;

struct Listener {
    element: Element,
    event: String,
    key: String,
    callback: EventCallback,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Document {
    root: Handle,
    properties: RefCell<HashMap<Element, HashMap<String, String>>>,
    listeners: RefCell<Vec<Listener>>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        Document {
            root: dom.document,
            properties: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> Result<String, CrafterError> {
        let mut bytes = Vec::new();
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        };
        serialize(&mut bytes, &SerializableHandle::from(self.root.clone()), opts)
            .map_err(|e| CrafterError::Serialize(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CrafterError::Serialize(e.to_string()))
    }

    pub fn elements(&self) -> Vec<Element> {
        descendant_elements(&self.root)
    }

    /// First element matching `selector` in document order.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Element>, CrafterError> {
        let selector = Selector::parse(selector)?;
        Ok(self.elements().into_iter().find(|e| selector.matches(e)))
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Element>, CrafterError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .elements()
            .into_iter()
            .filter(|e| selector.matches(e))
            .collect())
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Element> {
        self.elements()
            .into_iter()
            .find(|e| e.attribute("id").as_deref() == Some(id))
    }

    /// Elements carrying `attribute`, in document order.
    pub fn elements_with_attribute(&self, attribute: &str) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|e| e.has_attribute(attribute))
            .collect()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Properties
    // ───────────────────────────────────────────────────────────────────────────

    /// Read a script-visible property. `None` when the element has no such property.
    pub fn property(&self, element: &Element, name: &str) -> Option<String> {
        match name {
            "innerText" | "textContent" => return Some(element.text_content()),
            "innerHTML" => return Some(element.inner_html()),
            "outerHTML" => return Some(element.outer_html()),
            "tagName" => return Some(element.tag_name().to_ascii_uppercase()),
            "localName" => return Some(element.tag_name()),
            "id" => return Some(element.attribute("id").unwrap_or_default()),
            "className" => return Some(element.attribute("class").unwrap_or_default()),
            _ => {}
        }

        if let Some(value) = self
            .properties
            .borrow()
            .get(element)
            .and_then(|props| props.get(name))
        {
            return Some(value.clone());
        }

        if REFLECTED_PROPERTIES.contains(&name) {
            return Some(element.attribute(name).unwrap_or_default());
        }
        None
    }

    pub fn set_property(&self, element: &Element, name: &str, value: &str) {
        self.set_property_value(element, name, value);
        self.prune_detached();
    }

    fn set_property_value(&self, element: &Element, name: &str, value: &str) {
        match name {
            "innerText" | "textContent" => element.set_text_content(value),
            "innerHTML" => element.set_inner_html(value),
            "id" => element.set_attribute("id", value),
            "className" => element.set_attribute("class", value),
            name if READ_ONLY_PROPERTIES.contains(&name) => {
                tracing::debug!(property = name, "ignoring write to read-only property");
            }
            name => {
                self.properties
                    .borrow_mut()
                    .entry(element.clone())
                    .or_default()
                    .insert(name.to_string(), value.to_string());
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Events
    // ───────────────────────────────────────────────────────────────────────────

    /// Register `callback` for `event` on `element`. A second registration with
    /// the same key for the same element and event is ignored; returns whether the
    /// listener was added.
    pub fn add_event_listener(
        &self,
        element: &Element,
        event: &str,
        key: &str,
        callback: EventCallback,
    ) -> bool {
        self.prune_detached();
        let mut listeners = self.listeners.borrow_mut();
        let exists = listeners
            .iter()
            .any(|l| l.element == *element && l.event == event && l.key == key);
        if exists {
            return false;
        }
        listeners.push(Listener {
            element: element.clone(),
            event: event.to_string(),
            key: key.to_string(),
            callback,
        });
        true
    }

    pub fn listener_count(&self, element: &Element, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.element == *element && l.event == event)
            .count()
    }

    /// Listeners across all elements.
    pub fn total_listeners(&self) -> usize {
        self.listeners.borrow().len()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Side-table upkeep
    // ───────────────────────────────────────────────────────────────────────────

    /// Whether `element` is still reachable from the document root.
    pub fn is_connected(&self, element: &Element) -> bool {
        let mut node = element.0.clone();
        while let Some(parent) = parent_node(&node) {
            node = parent;
        }
        Rc::ptr_eq(&node, &self.root)
    }

    /// Drop properties and listeners of elements no longer in the tree, releasing
    /// the detached nodes they kept alive. Returns the number of entries removed.
    pub fn prune_detached(&self) -> usize {
        let mut removed = 0;

        self.properties.borrow_mut().retain(|element, _| {
            let keep = self.is_connected(element);
            removed += usize::from(!keep);
            keep
        });
        self.listeners.borrow_mut().retain(|listener| {
            let keep = self.is_connected(&listener.element);
            removed += usize::from(!keep);
            keep
        });

        if removed > 0 {
            tracing::debug!(removed, "pruned side-table entries of detached elements");
        }
        removed
    }

    /// Fire `event` at `element`, invoking its listeners in registration order.
    /// Returns the number of listeners invoked.
    pub fn dispatch_event(&self, element: &Element, event: &str) -> usize {
        let callbacks: Vec<EventCallback> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.element == *element && l.event == event)
            .map(|l| Rc::clone(&l.callback))
            .collect();

        for callback in &callbacks {
            callback(element, event);
        }
        callbacks.len()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("elements", &self.elements().len())
            .field("listeners", &self.total_listeners())
            .finish()
    }
}
