//! In-process browser backend
//!
//! A small element tree plus a [`PageModel`] that reacts to user events the
//! way a single-page app would. Event handlers run on the page's own turn:
//! a dispatched click is recorded immediately, but its DOM mutations land
//! only after the configured render latency. Anything reading the page
//! therefore has to poll, exactly as against a real browser.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::driver::{BrowserDriver, DriverFactory, ElementHandle, ElementSnapshot};
use crate::error::{E2eError, E2eResult};
use crate::selector::{Compound, Matchable, Selector};

pub type NodeId = usize;

const HANDLE_PREFIX: &str = "mem-";

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hidden: bool,
    size: (u32, u32),
    attached: bool,
}

impl Matchable for Node {
    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Element tree. Removed nodes stay in the arena, detached, so stale
/// handles can be told apart from unknown ones.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document with an empty `body`
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                tag: "body".to_string(),
                attributes: BTreeMap::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
                hidden: false,
                size: (1280, 720),
                attached: true,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn append(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.nodes.len();
        let attached = self.nodes[parent].attached;
        self.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            text: String::new(),
            parent: Some(parent),
            children: Vec::new(),
            hidden: false,
            size: (200, 24),
            attached,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id].text = text.to_string();
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id]
            .attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.attribute(name))
    }

    /// Equivalent of `visibility: hidden` / `display: none` on this node
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        self.nodes[id].hidden = hidden;
    }

    pub fn set_size(&mut self, id: NodeId, width: u32, height: u32) {
        self.nodes[id].size = (width, height);
    }

    /// Detach every child subtree of `id`
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id].children);
        let mut stack = children;
        while let Some(child) = stack.pop() {
            self.nodes[child].attached = false;
            stack.extend(self.nodes[child].children.iter().copied());
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id < self.nodes.len()
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.nodes.get(id).map(|n| n.attached).unwrap_or(false)
    }

    /// Rendered with a non-zero box and no hidden ancestor
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        let (width, height) = self.nodes[id].size;
        if width == 0 || height == 0 {
            return false;
        }
        self.ancestors_inclusive(id).all(|n| !self.nodes[n].hidden)
    }

    fn ancestors_inclusive(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&n| self.nodes[n].parent)
    }

    /// Nearest ancestor-or-self matching a single compound
    pub fn closest(&self, id: NodeId, compound: &Compound) -> Option<NodeId> {
        self.ancestors_inclusive(id)
            .find(|&n| compound.matches(&self.nodes[n]))
    }

    /// Attached descendants of `scope` (or the whole document) matching
    /// `selector`, in document order
    pub fn select(&self, selector: &Selector, scope: Option<NodeId>) -> Vec<NodeId> {
        let start = scope.unwrap_or_else(|| self.root());
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[start].children.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if self.matches_chain(id, selector.compounds()) {
                found.push(id);
            }
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        found
    }

    fn matches_chain(&self, id: NodeId, chain: &[Compound]) -> bool {
        let Some((subject, ancestors)) = chain.split_last() else {
            return true;
        };
        if !subject.matches(&self.nodes[id]) {
            return false;
        }
        if ancestors.is_empty() {
            return true;
        }
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            if self.matches_chain(p, ancestors) {
                return true;
            }
            parent = self.nodes[p].parent;
        }
        false
    }

    fn snapshot(&self, id: NodeId) -> ElementSnapshot {
        let node = &self.nodes[id];
        ElementSnapshot {
            tag: node.tag.clone(),
            attributes: node.attributes.clone(),
        }
    }
}

/// User events a click produces, in browser order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PointerOver,
    MouseOver,
    PointerDown,
    MouseDown,
    Focus,
    PointerUp,
    MouseUp,
    Click,
}

pub const CLICK_SEQUENCE: [EventKind; 8] = [
    EventKind::PointerOver,
    EventKind::MouseOver,
    EventKind::PointerDown,
    EventKind::MouseDown,
    EventKind::Focus,
    EventKind::PointerUp,
    EventKind::MouseUp,
    EventKind::Click,
];

/// Application logic of an in-process page
pub trait PageModel: Send {
    /// Build the DOM right after navigation
    fn render(&mut self, doc: &mut Document);

    /// React to `event` targeted at `target`
    fn on_event(&mut self, doc: &mut Document, event: EventKind, target: NodeId);
}

/// Fault injection for exercising the harness' recovery paths
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    /// The next N clicks fail as if the element had been re-rendered
    pub stale_clicks: u32,
    /// The next N scoped queries fail as if their root had been re-rendered
    pub stale_scopes: u32,
}

struct PendingEvent {
    due: Instant,
    event: EventKind,
    target: NodeId,
}

struct Inner {
    doc: Option<Document>,
    model: Box<dyn PageModel>,
    url: Option<String>,
    pending: VecDeque<PendingEvent>,
    dispatched: Vec<(EventKind, NodeId)>,
    faults: Faults,
    closed: bool,
}

impl Inner {
    /// Run every handler whose turn has come
    fn settle(&mut self) {
        let now = Instant::now();
        while self.pending.front().map(|p| p.due <= now).unwrap_or(false) {
            let Some(pending) = self.pending.pop_front() else {
                break;
            };
            if let Some(doc) = self.doc.as_mut() {
                self.model.on_event(doc, pending.event, pending.target);
            }
        }
    }

    fn loaded(&mut self) -> E2eResult<&Document> {
        if self.closed {
            return Err(E2eError::Driver("session closed".into()));
        }
        self.settle();
        self.doc
            .as_ref()
            .ok_or_else(|| E2eError::Driver("no page loaded".into()))
    }
}

/// One in-process page context
pub struct MemoryBrowser {
    base_url: String,
    latency: Duration,
    inner: Mutex<Inner>,
}

impl MemoryBrowser {
    pub fn new(base_url: impl Into<String>, model: Box<dyn PageModel>, latency: Duration, faults: Faults) -> Self {
        Self {
            base_url: base_url.into(),
            latency,
            inner: Mutex::new(Inner {
                doc: None,
                model,
                url: None,
                pending: VecDeque::new(),
                dispatched: Vec::new(),
                faults,
                closed: false,
            }),
        }
    }

    /// Events delivered so far, oldest first
    pub fn dispatched_events(&self) -> Vec<(EventKind, NodeId)> {
        self.inner.lock().dispatched.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.inner.lock().url.clone()
    }

    fn node_id(doc: &Document, element: &ElementHandle) -> E2eResult<NodeId> {
        let id = element
            .id()
            .strip_prefix(HANDLE_PREFIX)
            .and_then(|raw| raw.parse::<NodeId>().ok())
            .filter(|&id| doc.contains(id))
            .ok_or_else(|| E2eError::Driver(format!("unknown element handle {}", element)))?;
        if !doc.is_attached(id) {
            return Err(E2eError::DetachedElement {
                selector: element.to_string(),
            });
        }
        Ok(id)
    }

    fn handle(id: NodeId) -> ElementHandle {
        ElementHandle::new(format!("{}{}", HANDLE_PREFIX, id))
    }
}

#[async_trait]
impl BrowserDriver for MemoryBrowser {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(E2eError::Driver("session closed".into()));
        }
        if !url.starts_with(&self.base_url) {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }

        let mut doc = Document::new();
        inner.model.render(&mut doc);
        inner.doc = Some(doc);
        inner.pending.clear();
        inner.url = Some(url.to_string());
        debug!("Loaded {} in memory", url);
        Ok(())
    }

    async fn query(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> E2eResult<Vec<ElementHandle>> {
        let mut inner = self.inner.lock();
        if let Some(root) = scope {
            if inner.faults.stale_scopes > 0 {
                inner.faults.stale_scopes -= 1;
                return Err(E2eError::DetachedElement {
                    selector: root.to_string(),
                });
            }
        }
        let doc = inner.loaded()?;
        let scope = scope.map(|s| Self::node_id(doc, s)).transpose()?;
        Ok(doc
            .select(selector, scope)
            .into_iter()
            .map(Self::handle)
            .collect())
    }

    async fn dispatch_click(&self, element: &ElementHandle) -> E2eResult<()> {
        let mut inner = self.inner.lock();
        let doc = inner.loaded()?;
        let target = Self::node_id(doc, element)?;
        if !doc.is_visible(target) {
            return Err(E2eError::NotActionable {
                selector: element.to_string(),
                reason: "element is not visible".to_string(),
            });
        }

        if inner.faults.stale_clicks > 0 {
            inner.faults.stale_clicks -= 1;
            return Err(E2eError::DetachedElement {
                selector: element.to_string(),
            });
        }

        let due = Instant::now() + self.latency;
        for event in CLICK_SEQUENCE {
            inner.dispatched.push((event, target));
            inner.pending.push_back(PendingEvent { due, event, target });
        }
        Ok(())
    }

    async fn is_visible(&self, element: &ElementHandle) -> E2eResult<bool> {
        let mut inner = self.inner.lock();
        let doc = inner.loaded()?;
        let id = Self::node_id(doc, element)?;
        Ok(doc.is_visible(id))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> E2eResult<Option<String>> {
        let mut inner = self.inner.lock();
        let doc = inner.loaded()?;
        let id = Self::node_id(doc, element)?;
        Ok(doc.attribute(id, name).map(str::to_string))
    }

    async fn describe(&self, element: &ElementHandle) -> E2eResult<ElementSnapshot> {
        let mut inner = self.inner.lock();
        let doc = inner.loaded()?;
        let id = Self::node_id(doc, element)?;
        Ok(doc.snapshot(id))
    }

    async fn close(&self) -> E2eResult<()> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.doc = None;
        inner.pending.clear();
        Ok(())
    }
}

type ModelBuilder = dyn Fn() -> Box<dyn PageModel> + Send + Sync;

/// Hands out a freshly rendered page per session
#[derive(Clone)]
pub struct MemoryFactory {
    base_url: String,
    model: Arc<ModelBuilder>,
    latency: Duration,
    faults: Faults,
}

impl MemoryFactory {
    /// Serve pages built by `model` for every URL under `base_url`
    pub fn new<F>(base_url: impl Into<String>, model: F) -> Self
    where
        F: Fn() -> Box<dyn PageModel> + Send + Sync + 'static,
    {
        Self {
            base_url: base_url.into(),
            model: Arc::new(model),
            latency: Duration::from_millis(30),
            faults: Faults::default(),
        }
    }

    /// Delay between an event and its DOM mutations
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn browser(&self) -> MemoryBrowser {
        MemoryBrowser::new(self.base_url.clone(), (self.model)(), self.latency, self.faults)
    }
}

#[async_trait]
impl DriverFactory for MemoryFactory {
    async fn open(&self) -> E2eResult<Box<dyn BrowserDriver>> {
        Ok(Box::new(self.browser()))
    }
}
