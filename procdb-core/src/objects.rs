//! Live-object table
//!
//! The dispatcher only needs `ObjectResolver::resolve` to check liveness.
//! `ObjectStore` is the in-memory table the session owns; it also keeps the
//! small amount of per-object state the standard procedures read and write.

use crate::{Color, ObjectKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Snapshot of a live object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub id: i32,
    pub kind: ObjectKind,
    /// Owning image for layers, channels and vectors
    pub image: Option<i32>,
    pub name: String,
    pub width: i32,
    pub height: i32,
}

/// Lookup of live objects by kind and id
pub trait ObjectResolver: Send + Sync {
    fn resolve(&self, kind: ObjectKind, id: i32) -> Option<ObjectInfo>;

    fn is_live(&self, kind: ObjectKind, id: i32) -> bool {
        self.resolve(kind, id).is_some()
    }
}

#[derive(Debug, Clone)]
struct Item {
    kind: ObjectKind,
    image: Option<i32>,
    name: String,
    width: i32,
    height: i32,
    opacity: f64,
    color: Color,
    undo_depth: u32,
}

impl Item {
    fn info(&self, id: i32) -> ObjectInfo {
        ObjectInfo {
            id,
            kind: self.kind,
            image: self.image,
            name: self.name.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Named pixel buffer (cut/copy result)
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub width: i32,
    pub height: i32,
}

/// Named palette
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub columns: i32,
    pub colors: Vec<Color>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: i32,
    items: HashMap<i32, Item>,
    buffers: BTreeMap<String, Buffer>,
    palettes: BTreeMap<String, Palette>,
}

/// In-memory live-object table
#[derive(Debug, Default)]
pub struct ObjectStore {
    inner: Mutex<StoreInner>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, item: Item) -> i32 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.insert(id, item);
        id
    }

    // ========== Images and items ==========

    pub fn create_image(&self, width: i32, height: i32) -> i32 {
        self.insert(Item {
            kind: ObjectKind::Image,
            image: None,
            name: "Untitled".to_string(),
            width,
            height,
            opacity: 100.0,
            color: Color::BLACK,
            undo_depth: 0,
        })
    }

    pub fn create_layer(&self, image: i32, width: i32, height: i32, name: &str, opacity: f64) -> Option<i32> {
        self.resolve(ObjectKind::Image, image)?;
        Some(self.insert(Item {
            kind: ObjectKind::Layer,
            image: Some(image),
            name: name.to_string(),
            width,
            height,
            opacity,
            color: Color::BLACK,
            undo_depth: 0,
        }))
    }

    pub fn create_channel(
        &self,
        image: i32,
        width: i32,
        height: i32,
        name: &str,
        opacity: f64,
        color: Color,
    ) -> Option<i32> {
        self.resolve(ObjectKind::Image, image)?;
        Some(self.insert(Item {
            kind: ObjectKind::Channel,
            image: Some(image),
            name: name.to_string(),
            width,
            height,
            opacity,
            color,
            undo_depth: 0,
        }))
    }

    pub fn create_vectors(&self, image: i32, name: &str) -> Option<i32> {
        let info = self.resolve(ObjectKind::Image, image)?;
        Some(self.insert(Item {
            kind: ObjectKind::Vectors,
            image: Some(image),
            name: name.to_string(),
            width: info.width,
            height: info.height,
            opacity: 100.0,
            color: Color::BLACK,
            undo_depth: 0,
        }))
    }

    /// Remove an object; deleting an image removes everything it owns
    pub fn delete(&self, id: i32) -> bool {
        let mut inner = self.lock();
        match inner.items.remove(&id) {
            Some(item) => {
                if item.kind == ObjectKind::Image {
                    inner.items.retain(|_, child| child.image != Some(id));
                }
                true
            }
            None => false,
        }
    }

    pub fn image_ids(&self) -> Vec<i32> {
        let inner = self.lock();
        let mut ids: Vec<i32> = inner.items.iter()
            .filter(|(_, item)| item.kind == ObjectKind::Image)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn color(&self, id: i32) -> Option<Color> {
        self.lock().items.get(&id).map(|item| item.color)
    }

    pub fn set_color(&self, id: i32, color: Color) -> bool {
        match self.lock().items.get_mut(&id) {
            Some(item) => {
                item.color = color;
                true
            }
            None => false,
        }
    }

    pub fn opacity(&self, id: i32) -> Option<f64> {
        self.lock().items.get(&id).map(|item| item.opacity)
    }

    pub fn set_opacity(&self, id: i32, opacity: f64) -> bool {
        match self.lock().items.get_mut(&id) {
            Some(item) => {
                item.opacity = opacity;
                true
            }
            None => false,
        }
    }

    // ========== Undo groups ==========

    /// Open an undo group on an image, returning the new nesting depth
    pub fn undo_group_start(&self, image: i32) -> Option<u32> {
        let mut inner = self.lock();
        let item = inner.items.get_mut(&image).filter(|i| i.kind == ObjectKind::Image)?;
        item.undo_depth += 1;
        Some(item.undo_depth)
    }

    /// Close the innermost undo group; `None` if no group is open
    pub fn undo_group_end(&self, image: i32) -> Option<u32> {
        let mut inner = self.lock();
        let item = inner.items.get_mut(&image).filter(|i| i.kind == ObjectKind::Image)?;
        if item.undo_depth == 0 {
            return None;
        }
        item.undo_depth -= 1;
        Some(item.undo_depth)
    }

    // ========== Buffers ==========

    pub fn add_buffer(&self, name: &str, width: i32, height: i32) {
        self.lock().buffers.insert(name.to_string(), Buffer { width, height });
    }

    pub fn buffer(&self, name: &str) -> Option<Buffer> {
        self.lock().buffers.get(name).cloned()
    }

    pub fn buffer_names(&self) -> Vec<String> {
        self.lock().buffers.keys().cloned().collect()
    }

    /// Rename a buffer, uniquifying the new name; returns the name used
    pub fn rename_buffer(&self, old: &str, new: &str) -> Option<String> {
        let mut inner = self.lock();
        let buffer = inner.buffers.remove(old)?;
        let mut name = new.to_string();
        let mut n = 1;
        while inner.buffers.contains_key(&name) {
            n += 1;
            name = format!("{} #{}", new, n);
        }
        inner.buffers.insert(name.clone(), buffer);
        Some(name)
    }

    pub fn delete_buffer(&self, name: &str) -> bool {
        self.lock().buffers.remove(name).is_some()
    }

    // ========== Palettes ==========

    pub fn add_palette(&self, name: &str) -> bool {
        let mut inner = self.lock();
        if inner.palettes.contains_key(name) {
            return false;
        }
        inner.palettes.insert(name.to_string(), Palette { columns: 0, colors: Vec::new() });
        true
    }

    pub fn palette(&self, name: &str) -> Option<Palette> {
        self.lock().palettes.get(name).cloned()
    }

    pub fn set_palette_columns(&self, name: &str, columns: i32) -> bool {
        match self.lock().palettes.get_mut(name) {
            Some(palette) => {
                palette.columns = columns;
                true
            }
            None => false,
        }
    }
}

impl ObjectResolver for ObjectStore {
    fn resolve(&self, kind: ObjectKind, id: i32) -> Option<ObjectInfo> {
        let inner = self.lock();
        let item = inner.items.get(&id)?;
        if kind.accepts(item.kind) {
            Some(item.info(id))
        } else {
            None
        }
    }
}
