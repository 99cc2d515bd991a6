//! Procedure Registry

use crate::Invoker;
use procdb_core::{PdbError, ProcDef, ProcedureKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// How a registered procedure is run
#[derive(Clone)]
pub enum Handler {
    /// Called inline by the dispatcher
    Internal(Arc<dyn Invoker>),
    /// Routed to the named plug-in process
    Plugin { plug_in: String },
}

/// A registered procedure: signature plus handler
pub struct Procedure {
    pub def: ProcDef,
    pub handler: Handler,
}

impl Procedure {
    pub fn internal<I: Invoker + 'static>(invoker: I) -> Self {
        Self::from_invoker(Arc::new(invoker))
    }

    pub fn from_invoker(invoker: Arc<dyn Invoker>) -> Self {
        let def = invoker.def().with_kind(ProcedureKind::Internal);
        Self { def, handler: Handler::Internal(invoker) }
    }

    pub fn plugin(def: ProcDef, plug_in: &str) -> Self {
        Self { def, handler: Handler::Plugin { plug_in: plug_in.to_string() } }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> ProcedureKind {
        self.def.kind
    }

    /// Owning plug-in for out-of-process procedures
    pub fn plug_in(&self) -> Option<&str> {
        match &self.handler {
            Handler::Plugin { plug_in } => Some(plug_in),
            Handler::Internal(_) => None,
        }
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.def.name)
            .field("kind", &self.def.kind)
            .field("plug_in", &self.plug_in())
            .finish()
    }
}

/// Central procedure registry
///
/// Procedures are shared as `Arc<Procedure>`: unregistering one only
/// removes the name, calls already holding it finish normally.
#[derive(Default)]
pub struct ProcedureRegistry {
    procs: RwLock<HashMap<String, Arc<Procedure>>>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Procedure>>> {
        self.procs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Procedure>>> {
        self.procs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a procedure; fails if the name is taken
    pub fn register(&self, procedure: Procedure) -> Result<Arc<Procedure>, PdbError> {
        let mut procs = self.write();
        if procs.contains_key(procedure.name()) {
            return Err(PdbError::already_registered(procedure.name()));
        }
        let procedure = Arc::new(procedure);
        procs.insert(procedure.name().to_string(), procedure.clone());
        tracing::debug!(procedure = %procedure.name(), kind = %procedure.kind(), "registered");
        Ok(procedure)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Procedure>> {
        self.read().get(name).cloned()
    }

    /// Like `get`, but an unknown name is an error with suggestions
    pub fn lookup(&self, name: &str) -> Result<Arc<Procedure>, PdbError> {
        if let Some(p) = self.get(name) {
            return Ok(p);
        }
        let similar = self.find_similar(name);
        let mut err = PdbError::unknown_procedure(name);
        if !similar.is_empty() {
            let suggestions: Vec<&str> = similar.iter().take(5).map(|s| s.as_str()).collect();
            err = err.with_suggestion(format!("Similar: {}", suggestions.join(", ")));
        }
        Err(err)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Procedure>> {
        let removed = self.write().remove(name);
        if removed.is_some() {
            tracing::debug!(procedure = %name, "unregistered");
        }
        removed
    }

    /// Sorted names of every registered procedure
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted names whose name or blurb matches `pattern`
    pub fn query(&self, pattern: &str) -> Result<Vec<String>, regex::Error> {
        let re = Regex::new(pattern)?;
        let mut names: Vec<String> = self.read().values()
            .filter(|p| re.is_match(&p.def.name) || re.is_match(&p.def.blurb))
            .map(|p| p.def.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Sorted names of the procedures routed to `plug_in`
    pub fn procedures_of(&self, plug_in: &str) -> Vec<String> {
        let mut names: Vec<String> = self.read().values()
            .filter(|p| p.plug_in() == Some(plug_in))
            .map(|p| p.def.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Registered names similar to `name`, best first
    fn find_similar(&self, name: &str) -> Vec<String> {
        let query = name.to_lowercase();
        let mut matches: Vec<(String, usize)> = self.read().keys()
            .filter_map(|candidate| {
                let score = similarity_score(&query, candidate);
                if score > 0 { Some((candidate.clone(), score)) } else { None }
            })
            .collect();

        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        matches.into_iter().map(|(name, _)| name).collect()
    }
}

/// Rough closeness of two names; 0 means unrelated
fn similarity_score(query: &str, candidate: &str) -> usize {
    let mut score = 0;

    if candidate.starts_with(query) {
        score += 100;
    } else if candidate.contains(query) {
        score += 50;
    } else if query.contains(candidate) {
        score += 30;
    }

    // Shared dash-separated words count more than shared letters
    let query_words: HashSet<&str> = query.split('-').filter(|w| !w.is_empty()).collect();
    let common_words = candidate.split('-').filter(|w| query_words.contains(w)).count();
    score += common_words * 20;

    if score > 0 {
        let len_diff = query.len().abs_diff(candidate.len());
        if len_diff < 5 {
            score += 5 - len_diff;
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use procdb_core::{codes, ParamSpec};

    fn plugin_def(name: &str, blurb: &str) -> ProcDef {
        ProcDef::new(name, ProcedureKind::Plugin)
            .blurb(blurb)
            .param(ParamSpec::int32("run-mode", "Run mode"))
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = ProcedureRegistry::new();
        registry.register(Procedure::plugin(plugin_def("plug-in-blur", "first"), "blur")).unwrap();
        let err = registry.register(Procedure::plugin(plugin_def("plug-in-blur", "second"), "other"))
            .unwrap_err();
        assert_eq!(err.code, codes::ALREADY_REGISTERED);

        let found = registry.lookup("plug-in-blur").unwrap();
        assert_eq!(found.def.blurb, "first");
        assert_eq!(found.plug_in(), Some("blur"));
    }

    #[test]
    fn test_unknown_name_suggests() {
        let registry = ProcedureRegistry::new();
        registry.register(Procedure::plugin(plugin_def("plug-in-gauss", ""), "gauss")).unwrap();
        let err = registry.lookup("plug-in-gaus").unwrap_err();
        assert_eq!(err.code, codes::UNKNOWN_PROCEDURE);
        assert!(err.message.contains("plug-in-gaus"));
        assert!(err.suggestion.unwrap().contains("plug-in-gauss"));
    }

    #[test]
    fn test_unregister_keeps_held_handle() {
        let registry = ProcedureRegistry::new();
        let held = registry.register(Procedure::plugin(plugin_def("temp-1", ""), "p")).unwrap();
        assert!(registry.unregister("temp-1").is_some());
        assert!(!registry.contains("temp-1"));
        assert_eq!(held.name(), "temp-1");
        assert!(registry.unregister("temp-1").is_none());
    }

    #[test]
    fn test_query_and_owner() {
        let registry = ProcedureRegistry::new();
        registry.register(Procedure::plugin(plugin_def("file-png-load", "Loads PNG files"), "png")).unwrap();
        registry.register(Procedure::plugin(plugin_def("file-png-save", "Saves PNG files"), "png")).unwrap();
        registry.register(Procedure::plugin(plugin_def("plug-in-emboss", "Emboss"), "emboss")).unwrap();

        assert_eq!(registry.query("^file-").unwrap(), vec!["file-png-load", "file-png-save"]);
        assert_eq!(registry.query("Saves").unwrap(), vec!["file-png-save"]);
        assert!(registry.query("(").is_err());
        assert_eq!(registry.procedures_of("png").len(), 2);
        assert_eq!(registry.names().len(), 3);
    }
}
