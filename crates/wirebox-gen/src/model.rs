//! In-memory model of the scanned source tree.
//!
//! The model is built once by [`crate::build`], re-prioritized in place by
//! [`crate::graph`], and read-only for [`crate::emit`]. Packages own their
//! files, functions, and injectors; cross-references between functions are
//! `(package, function)` index handles resolved through [`Model`], never
//! stored pointers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Path roots that never resolve through a file's use-table.
pub const LOCAL_QUALIFIERS: &[&str] = &["crate", "self", "super", "std", "core", "alloc"];

/// Replaces the id separators `.` and `/` with `_`, yielding a usable
/// identifier fragment.
#[must_use]
pub fn mangle_id(id: &str) -> String {
    id.replace(['.', '/'], "_")
}

/// Last segment of a `::`-separated import path.
#[must_use]
pub fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

///
/// Model
///

#[derive(Debug, Default)]
pub struct Model {
    pub packages: Vec<Package>,
}

impl Model {
    /// Finds the function providing `id` anywhere in the model.
    #[must_use]
    pub fn find_provider(&self, id: &str) -> Option<FuncHandle> {
        for (package, pkg) in self.packages.iter().enumerate() {
            if let Some(func) = pkg.find_provider(id) {
                return Some(FuncHandle { package, func });
            }
        }
        None
    }

    #[must_use]
    pub fn func(&self, handle: FuncHandle) -> &Func {
        &self.packages[handle.package].funcs[handle.func]
    }

    pub fn func_mut(&mut self, handle: FuncHandle) -> &mut Func {
        &mut self.packages[handle.package].funcs[handle.func]
    }
}

/// Index handle identifying one function inside a [`Model`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FuncHandle {
    pub package: usize,
    pub func: usize,
}

///
/// Package
/// One importable unit: a crate discovered by the loader.
///

#[derive(Debug)]
pub struct Package {
    /// Crate ident (dashes normalized to underscores).
    pub name: String,
    /// Import path other packages use to refer to this one.
    pub path: String,
    /// Directory the generated file is written into.
    pub folder: PathBuf,
    /// DI functions, sorted by descending priority after validation.
    pub funcs: Vec<Func>,
    /// Source files keyed by their src-relative path.
    pub files: BTreeMap<String, SourceFile>,
}

impl Package {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>, folder: PathBuf) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            folder,
            funcs: Vec::new(),
            files: BTreeMap::new(),
        }
    }

    /// Finds the local function providing `id`, if any.
    #[must_use]
    pub fn find_provider(&self, id: &str) -> Option<usize> {
        self.funcs
            .iter()
            .position(|func| func.provider.as_deref() == Some(id))
    }
}

///
/// SourceFile
///

#[derive(Debug, Default)]
pub struct SourceFile {
    /// Src-relative path, e.g. `db/query.rs`.
    pub name: String,
    /// Module path within the crate, e.g. `db::query`; empty for the root
    /// file (`lib.rs` / `main.rs`).
    pub module: String,
    /// Use-table: local name usable in type syntax -> imported path.
    pub imports: BTreeMap<String, Import>,
}

impl SourceFile {
    #[must_use]
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            imports: BTreeMap::new(),
        }
    }
}

/// One `use` entry. `alias` is `None` when the last path segment is the
/// local name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
}

///
/// Func
/// A function carrying DI annotations. At least one of `provider` / `group`
/// is set; functions with neither are discarded during building.
///

#[derive(Debug)]
pub struct Func {
    pub name: String,
    /// Key of the file this function was declared in.
    pub file: String,
    pub provider: Option<String>,
    pub group: Option<String>,
    /// One injector per formal parameter, in declaration order.
    pub injectors: Vec<Injector>,
    /// Dependency weight assigned by the prioritizer; larger runs earlier.
    pub priority: u64,
    /// Declared return type, when it maps to a supported shape.
    pub ret: Option<TypeExpr>,
}

impl Func {
    #[must_use]
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            provider: None,
            group: None,
            injectors: Vec::new(),
            priority: 0,
            ret: None,
        }
    }

    /// Name of the generated registration function for this provider.
    #[must_use]
    pub fn provider_fn_name(&self) -> Option<String> {
        self.provider.as_deref().map(|id| format!("init_{}", mangle_id(id)))
    }

    /// Name of the variable holding the constructed provider object.
    #[must_use]
    pub fn provider_obj_name(&self) -> Option<String> {
        self.provider.as_deref().map(|id| format!("{}_obj", mangle_id(id)))
    }

    /// Name of the generated registration function for a group-only member.
    #[must_use]
    pub fn group_fn_name(&self) -> Option<String> {
        self.group
            .as_deref()
            .map(|id| format!("group_{}_{}", mangle_id(id), self.name))
    }
}

///
/// Injector
/// Binds one formal parameter to the provider that supplies it.
///

#[derive(Clone, Debug)]
pub struct Injector {
    pub param: String,
    pub provider_id: String,
    /// Import path of the package the parameter type lives in; `None` when
    /// the type is local to the declaring package.
    pub pkg: Option<String>,
    /// Local alias the declaring file uses for that package.
    pub alias: Option<String>,
    /// Static type of the parameter as declared.
    pub ty: TypeExpr,
}

impl Injector {
    /// Name of the variable receiving the looked-up object.
    #[must_use]
    pub fn obj_name(&self) -> String {
        format!("{}_obj", self.param)
    }
}

///
/// TypeExpr
/// The supported static type shapes: `T`, `Arc<T>`, `pkg::T`,
/// `Arc<pkg::T>`, with `dyn` trait objects allowed in the path position.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeExpr {
    /// Wrapped in `Arc<...>`.
    pub shared: bool,
    /// The path names a trait object (`dyn ...`).
    pub dyn_trait: bool,
    /// Leading path segment when the type is package-qualified.
    pub qualifier: Option<String>,
    /// Remaining path, e.g. `Mysql` or `sub::Mysql`.
    pub name: String,
}

impl TypeExpr {
    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            shared: false,
            dyn_trait: false,
            qualifier: None,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            shared: false,
            dyn_trait: false,
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    #[must_use]
    pub fn dyn_trait(mut self) -> Self {
        self.dyn_trait = true;
        self
    }

    /// The same shape re-qualified for another package's scope.
    #[must_use]
    pub fn with_qualifier(&self, qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            ..self.clone()
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut inner = match &self.qualifier {
            Some(qualifier) => format!("{qualifier}::{}", self.name),
            None => self.name.clone(),
        };
        if self.dyn_trait {
            inner = format!("dyn {inner}");
        }
        if self.shared {
            write!(f, "Arc<{inner}>")
        } else {
            write!(f, "{inner}")
        }
    }
}

///
/// Chain
/// Transient DFS path held during cycle detection. Appending a function
/// whose provider id is already on the path signals a cycle; the display
/// form joins the ids with arrows for the error message.
///

#[derive(Clone, Debug, Default)]
pub struct Chain {
    links: Vec<ChainLink>,
}

#[derive(Clone, Debug)]
struct ChainLink {
    provider: Option<String>,
    label: String,
}

impl Chain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a function to the path. Returns `false` when its provider id
    /// is already present, i.e. a cycle; the function is still appended so
    /// the display form shows the full loop.
    pub fn insert(&mut self, provider: Option<&str>, name: &str) -> bool {
        let cyclic = provider.is_some()
            && self
                .links
                .iter()
                .any(|link| link.provider.as_deref() == provider);

        self.links.push(ChainLink {
            provider: provider.map(ToString::to_string),
            label: provider.unwrap_or(name).to_string(),
        });
        !cyclic
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.links.iter().map(|link| link.label.as_str()).collect();
        write!(f, "{}", labels.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangle_replaces_both_separators() {
        assert_eq!(mangle_id("provider.id/example/path"), "provider_id_example_path");
        assert_eq!(mangle_id("provider.id/another.path"), "provider_id_another_path");
        assert_eq!(mangle_id("plain"), "plain");
    }

    #[test]
    fn generated_names() {
        let mut func = Func::new("new_db", "lib.rs");
        func.provider = Some("main.db".to_string());
        assert_eq!(func.provider_fn_name().as_deref(), Some("init_main_db"));
        assert_eq!(func.provider_obj_name().as_deref(), Some("main_db_obj"));

        let mut member = Func::new("new_user_controller", "user.rs");
        member.group = Some("group.controllers".to_string());
        assert_eq!(
            member.group_fn_name().as_deref(),
            Some("group_group_controllers_new_user_controller")
        );
    }

    #[test]
    fn injector_obj_name() {
        let injector = Injector {
            param: "db".to_string(),
            provider_id: "main.db".to_string(),
            pkg: None,
            alias: None,
            ty: TypeExpr::local("Db"),
        };
        assert_eq!(injector.obj_name(), "db_obj");
    }

    #[test]
    fn type_expr_display_covers_all_shapes() {
        assert_eq!(TypeExpr::local("Db").to_string(), "Db");
        assert_eq!(TypeExpr::local("Db").shared().to_string(), "Arc<Db>");
        assert_eq!(TypeExpr::qualified("database", "Mysql").to_string(), "database::Mysql");
        assert_eq!(
            TypeExpr::qualified("database", "Mysql").shared().to_string(),
            "Arc<database::Mysql>"
        );
        assert_eq!(
            TypeExpr::qualified("database", "Database")
                .shared()
                .dyn_trait()
                .to_string(),
            "Arc<dyn database::Database>"
        );
    }

    #[test]
    fn chain_detects_repeated_provider() {
        let mut chain = Chain::new();
        assert!(chain.insert(Some("a"), "new_a"));
        assert!(chain.insert(Some("b"), "new_b"));
        assert!(!chain.insert(Some("a"), "new_a"));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.to_string(), "a -> b -> a");
    }

    #[test]
    fn chain_allows_unnamed_roots() {
        // Group-only members have no provider id and cannot collide.
        let mut chain = Chain::new();
        assert!(chain.insert(None, "new_controller"));
        assert!(chain.insert(Some("main.user.name"), "new_user_name"));
        assert_eq!(chain.to_string(), "new_controller -> main.user.name");
    }

    #[test]
    fn siblings_branch_from_a_cloned_prefix() {
        let mut chain = Chain::new();
        assert!(chain.is_empty());
        chain.insert(Some("app"), "new_app");

        let mut left = chain.clone();
        let mut right = chain.clone();
        assert!(left.insert(Some("db"), "new_db"));
        assert!(right.insert(Some("cache"), "new_cache"));
        assert_eq!(left.to_string(), "app -> db");
        assert_eq!(right.to_string(), "app -> cache");
    }

    #[test]
    fn package_finds_local_provider() {
        let mut pkg = Package::new("example", "example", PathBuf::from("/tmp/src"));
        let mut func = Func::new("new_db", "lib.rs");
        func.provider = Some("main.db".to_string());
        pkg.funcs.push(func);

        assert_eq!(pkg.find_provider("main.db"), Some(0));
        assert_eq!(pkg.find_provider("missing"), None);
    }
}
