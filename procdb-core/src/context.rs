//! Hierarchical "current image / tool" context
//!
//! A lookup that misses in a context falls back to its parent, so a
//! plug-in's context only stores what the plug-in changed.

use crate::{Color, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Slot in a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Image,
    Drawable,
    Foreground,
    Background,
    Palette,
    Opacity,
}

#[derive(Debug)]
struct ContextInner {
    name: String,
    parent: Option<Context>,
    values: Mutex<HashMap<ContextKey, Value>>,
}

/// Shared handle to a context node
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Root context with the application defaults
    pub fn root(name: impl Into<String>) -> Self {
        let ctx = Self::detached(name, None);
        ctx.set(ContextKey::Foreground, Value::Color(Color::BLACK));
        ctx.set(ContextKey::Background, Value::Color(Color::WHITE));
        ctx.set(ContextKey::Opacity, Value::Float(100.0));
        ctx
    }

    fn detached(name: impl Into<String>, parent: Option<Context>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name: name.into(),
                parent,
                values: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// New empty context that falls back to `self`
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::detached(name, Some(self.clone()))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    /// Value for `key`, consulting parents when unset here
    pub fn current(&self, key: ContextKey) -> Option<Value> {
        let local = self.inner.values.lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned();
        match local {
            Some(v) => Some(v),
            None => self.inner.parent.as_ref().and_then(|p| p.current(key)),
        }
    }

    pub fn set(&self, key: ContextKey, value: Value) {
        self.inner.values.lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
    }

    pub fn foreground(&self) -> Color {
        self.current(ContextKey::Foreground)
            .and_then(|v| v.as_color())
            .unwrap_or(Color::BLACK)
    }

    /// Same node, not just equal contents
    pub fn same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
