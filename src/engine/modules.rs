//! Host module registry.
//!
//! The host owns its modules as `Arc<HostModule>` inside a [`HostCatalog`].
//! An engine only ever sees the subset named by its allow-list, held as weak
//! references in an [`AllowedModuleSet`].

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::dsl::resolve::{HostLookup, ModuleScope};
use crate::dsl::value::Value;

/// Error returned by a host function. Surfaces to scripts as a runtime fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// How many arguments a host function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, argc: usize) -> bool {
        match self {
            Arity::Exact(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;

/// A native function exposed to scripts as `Module.name(...)`.
#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub arity: Arity,
    call: HostFn,
}

impl HostFunction {
    pub fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        (self.call)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A named table of host functions. Names are case-sensitive.
#[derive(Debug, Clone)]
pub struct HostModule {
    name: String,
    functions: IndexMap<String, HostFunction>,
}

impl HostModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    /// Add (or replace) a function. Builder style.
    pub fn with_function<F>(mut self, name: &str, arity: Arity, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.functions.insert(
            name.to_string(),
            HostFunction {
                name: name.to_string(),
                arity,
                call: Arc::new(f),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &HostFunction> {
        self.functions.values()
    }
}

/// The host's loaded modules. Insertion ordered; names are unique.
#[derive(Debug, Clone, Default)]
pub struct HostCatalog {
    modules: Vec<Arc<HostModule>>,
}

impl HostCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a module, replacing any module with the same name.
    pub fn load(&mut self, module: HostModule) -> Arc<HostModule> {
        let module = Arc::new(module);
        if let Some(existing) = self.modules.iter_mut().find(|m| m.name == module.name) {
            *existing = Arc::clone(&module);
        } else {
            self.modules.push(Arc::clone(&module));
        }
        module
    }

    /// Unload a module. Engines holding it see calls fault from now on.
    pub fn unload(&mut self, name: &str) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| m.name != name);
        self.modules.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&Arc<HostModule>> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<HostModule>> {
        self.modules.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// The modules one engine may reference, in allow-list order.
#[derive(Debug, Clone, Default)]
pub struct AllowedModuleSet {
    modules: IndexMap<String, Weak<HostModule>>,
}

impl AllowedModuleSet {
    /// Every module currently in the catalog.
    pub fn all(catalog: &HostCatalog) -> Self {
        Self {
            modules: catalog
                .iter()
                .map(|m| (m.name.clone(), Arc::downgrade(m)))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Weak handle for linking. Dead if the module is not in the set.
    pub fn weak(&self, name: &str) -> Weak<HostModule> {
        self.modules.get(name).cloned().unwrap_or_default()
    }

    /// Upgrade to a live module, if it is allowed and still loaded.
    pub fn get(&self, name: &str) -> Option<Arc<HostModule>> {
        self.modules.get(name).and_then(Weak::upgrade)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Pick the catalog modules named by `allowlist`, in allow-list order.
///
/// Matching is exact and case-sensitive. Unknown names are skipped and
/// duplicates collapse.
pub fn select<S: AsRef<str>>(catalog: &HostCatalog, allowlist: &[S]) -> AllowedModuleSet {
    let mut modules = IndexMap::new();
    for name in allowlist {
        let name = name.as_ref();
        if modules.contains_key(name) {
            continue;
        }
        match catalog.get(name) {
            Some(module) => {
                modules.insert(name.to_string(), Arc::downgrade(module));
            }
            None => log::debug!("allow-list entry '{name}' matches no loaded module"),
        }
    }
    AllowedModuleSet { modules }
}

/// Name lookup for the resolver: the allowed set plus the names of every
/// module that was loaded at registration time.
#[derive(Debug, Clone, Default)]
pub struct ModuleView {
    pub allowed: AllowedModuleSet,
    pub loaded: Vec<String>,
}

impl ModuleView {
    pub fn new(catalog: &HostCatalog, allowed: AllowedModuleSet) -> Self {
        Self {
            allowed,
            loaded: catalog.names(),
        }
    }
}

impl ModuleScope for ModuleView {
    fn lookup(&self, module: &str, function: &str) -> HostLookup {
        if !self.allowed.contains(module) {
            return if self.loaded.iter().any(|m| m == module) {
                HostLookup::NotAllowed
            } else {
                HostLookup::NotAModule
            };
        }
        match self.allowed.get(module) {
            Some(m) => match m.function(function) {
                Some(f) => HostLookup::Found(f.arity),
                None => HostLookup::MissingFunction,
            },
            None => HostLookup::Unloaded,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> HostCatalog {
        let mut catalog = HostCatalog::new();
        for name in ["Console", "Math", "Text", "Secret"] {
            catalog.load(
                HostModule::new(name).with_function("f", Arity::Exact(1), |args| {
                    Ok(args.first().cloned().unwrap_or_default())
                }),
            );
        }
        catalog
    }

    fn names(set: &AllowedModuleSet) -> Vec<&str> {
        set.names().collect()
    }

    #[test]
    fn select_is_intersection_in_allowlist_order() {
        let set = select(&catalog(), &["Text", "Nope", "Console"]);
        assert_eq!(names(&set), vec!["Text", "Console"]);
    }

    #[test]
    fn select_is_case_sensitive() {
        let set = select(&catalog(), &["math", "MATH"]);
        assert!(set.is_empty());
    }

    #[test]
    fn select_collapses_duplicates() {
        let set = select(&catalog(), &["Math", "Math", "Console", "Math"]);
        assert_eq!(names(&set), vec!["Math", "Console"]);
    }

    #[test]
    fn select_is_idempotent() {
        let catalog = catalog();
        let allow = ["Console", "Math"];
        let a = select(&catalog, &allow);
        let b = select(&catalog, &allow);
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn empty_allowlist_is_empty_set() {
        let empty: [&str; 0] = [];
        assert!(select(&catalog(), &empty).is_empty());
    }

    #[test]
    fn all_takes_every_module() {
        let set = AllowedModuleSet::all(&catalog());
        assert_eq!(names(&set), vec!["Console", "Math", "Text", "Secret"]);
    }

    #[test]
    fn dropped_module_no_longer_upgrades() {
        let mut catalog = catalog();
        let set = select(&catalog, &["Math"]);
        assert!(set.get("Math").is_some());
        assert!(catalog.unload("Math"));
        assert!(set.get("Math").is_none());
    }

    #[test]
    fn reload_replaces_by_name() {
        let mut catalog = catalog();
        catalog.load(HostModule::new("Math"));
        assert_eq!(catalog.len(), 4);
        assert!(catalog.get("Math").unwrap().function("f").is_none());
    }

    #[test]
    fn view_distinguishes_unallowed_from_unknown() {
        let catalog = catalog();
        let view = ModuleView::new(&catalog, select(&catalog, &["Math"]));
        assert_eq!(view.lookup("Math", "f"), HostLookup::Found(Arity::Exact(1)));
        assert_eq!(view.lookup("Math", "g"), HostLookup::MissingFunction);
        assert_eq!(view.lookup("Secret", "f"), HostLookup::NotAllowed);
        assert_eq!(view.lookup("Nope", "f"), HostLookup::NotAModule);
    }

    #[test]
    fn host_function_call() {
        let catalog = catalog();
        let f = catalog.get("Console").unwrap().function("f").unwrap().clone();
        assert_eq!(f.call(&[Value::Int(4)]).unwrap(), Value::Int(4));
        assert!(Arity::AtLeast(1).accepts(3));
        assert!(!Arity::Exact(1).accepts(0));
    }
}
