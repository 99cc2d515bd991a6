//! File load/save handler lists
//!
//! File procedures are ordinary procedures. Registering one as a load or
//! save handler only records which filename extensions or prefixes it
//! claims, so `file-load` / `file-save` can forward to it.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHandler {
    pub procedure: String,
    pub extensions: Vec<String>,
    pub prefixes: Vec<String>,
}

impl FileHandler {
    /// Whether this handler claims `filename`
    pub fn matches(&self, filename: &str) -> bool {
        if self.prefixes.iter().any(|p| filename.starts_with(p.as_str())) {
            return true;
        }
        match extension_of(filename) {
            Some(ext) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

fn extension_of(filename: &str) -> Option<&str> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    base.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Default)]
pub struct FileHandlers {
    load: Mutex<Vec<FileHandler>>,
    save: Mutex<Vec<FileHandler>>,
}

fn lock(m: &Mutex<Vec<FileHandler>>) -> MutexGuard<'_, Vec<FileHandler>> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn upsert(list: &Mutex<Vec<FileHandler>>, handler: FileHandler) {
    let mut list = lock(list);
    list.retain(|h| h.procedure != handler.procedure);
    list.push(handler);
}

impl FileHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a load handler, replacing an earlier entry for the same procedure
    pub fn register_load(&self, handler: FileHandler) {
        upsert(&self.load, handler);
    }

    pub fn register_save(&self, handler: FileHandler) {
        upsert(&self.save, handler);
    }

    /// Most recently registered load handler claiming `filename`
    pub fn find_load(&self, filename: &str) -> Option<String> {
        lock(&self.load).iter().rev().find(|h| h.matches(filename)).map(|h| h.procedure.clone())
    }

    pub fn find_save(&self, filename: &str) -> Option<String> {
        lock(&self.save).iter().rev().find(|h| h.matches(filename)).map(|h| h.procedure.clone())
    }

    /// Drop every entry naming `procedure`
    pub fn forget(&self, procedure: &str) {
        lock(&self.load).retain(|h| h.procedure != procedure);
        lock(&self.save).retain(|h| h.procedure != procedure);
    }

    pub fn load_handlers(&self) -> Vec<FileHandler> {
        lock(&self.load).clone()
    }

    pub fn save_handlers(&self) -> Vec<FileHandler> {
        lock(&self.save).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(procedure: &str, extensions: &str, prefixes: &str) -> FileHandler {
        FileHandler {
            procedure: procedure.to_string(),
            extensions: split_list(extensions),
            prefixes: split_list(prefixes),
        }
    }

    #[test]
    fn test_extension_match() {
        let h = handler("file-png-load", "png, .PNG", "");
        assert!(h.matches("/tmp/photo.png"));
        assert!(h.matches("PHOTO.PNG"));
        assert!(!h.matches("photo.jpg"));
        assert!(!h.matches("dir.png/noext"));
    }

    #[test]
    fn test_prefix_and_latest_wins() {
        let handlers = FileHandlers::new();
        handlers.register_load(handler("file-uri-load", "", "http:"));
        handlers.register_load(handler("file-png-load", "png", ""));
        handlers.register_load(handler("file-png-fast-load", "png", ""));

        assert_eq!(handlers.find_load("http://host/x").as_deref(), Some("file-uri-load"));
        assert_eq!(handlers.find_load("a.png").as_deref(), Some("file-png-fast-load"));
        assert_eq!(handlers.find_save("a.png"), None);

        handlers.forget("file-png-fast-load");
        assert_eq!(handlers.find_load("a.png").as_deref(), Some("file-png-load"));
    }
}
