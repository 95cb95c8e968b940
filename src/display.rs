//! Display targets.
//!
//! A display target is the single named location the balance is rendered
//! into. `Document` holds named `TextElement`s the way a rendered page
//! holds elements by id; the poller looks its target up once at build
//! time and never creates or removes elements.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum DisplayError {
    #[error("display target not found: #{0}")]
    NotFound(String),
}

/// A sink whose text content is overwritten by each successful refresh.
pub trait DisplayTarget: Send + Sync {
    fn id(&self) -> &str;

    /// Replace the text content unconditionally.
    fn set_text(&self, text: &str);

    /// Current text content.
    fn text(&self) -> String;
}

// ---------------------------------------------------------------------------
// In-memory element
// ---------------------------------------------------------------------------

/// A text element shared between the document and whoever renders it.
/// Clones refer to the same content.
#[derive(Debug, Clone)]
pub struct TextElement {
    id: Arc<str>,
    content: Arc<RwLock<String>>,
}

impl TextElement {
    pub fn new(id: &str, initial: &str) -> Self {
        Self {
            id: Arc::from(id),
            content: Arc::new(RwLock::new(initial.to_string())),
        }
    }
}

impl DisplayTarget for TextElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_text(&self, text: &str) {
        let mut content = self.content.write().unwrap_or_else(|e| e.into_inner());
        content.clear();
        content.push_str(text);
    }

    fn text(&self) -> String {
        self.content.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Elements addressable by id.
#[derive(Debug, Default, Clone)]
pub struct Document {
    elements: HashMap<String, TextElement>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an element with initial text.
    pub fn with_element(mut self, id: &str, initial: &str) -> Self {
        self.elements.insert(id.to_string(), TextElement::new(id, initial));
        self
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<TextElement> {
        self.elements.get(id).cloned()
    }

    /// Like `get_element_by_id`, but a missing element is an error.
    pub fn require(&self, id: &str) -> Result<TextElement, DisplayError> {
        self.get_element_by_id(id)
            .ok_or_else(|| DisplayError::NotFound(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

/// Renders the balance as a line on a writer (stdout by default).
pub struct TerminalDisplay {
    id: String,
    last: Mutex<String>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalDisplay {
    pub fn stdout(id: &str) -> Self {
        Self::with_writer(id, Box::new(std::io::stdout()))
    }

    pub fn with_writer(id: &str, out: Box<dyn Write + Send>) -> Self {
        Self {
            id: id.to_string(),
            last: Mutex::new(String::new()),
            out: Mutex::new(out),
        }
    }
}

impl DisplayTarget for TerminalDisplay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_text(&self, text: &str) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}: {text}", self.id).and_then(|_| out.flush()) {
            debug!(error = %e, "Terminal display write failed");
        }
    }

    fn text(&self) -> String {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
