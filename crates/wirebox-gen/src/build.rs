//! Model builder.
//!
//! Walks every loaded package, decodes the DI annotations on its functions,
//! resolves each injected parameter's static type against the declaring
//! file's use-table, and produces the finalized [`Model`]. Functions without
//! any DI annotation are ignored; annotated functions must have every formal
//! parameter covered by an `@inject`.

use std::collections::BTreeMap;

use syn::{FnArg, Pat, ReturnType};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::load::{LoadedFile, LoadedPackage};
use crate::model::{
    last_path_segment, Func, Import, Injector, Model, Package, SourceFile, TypeExpr,
    LOCAL_QUALIFIERS,
};
use crate::scan::{match_comment, AnnotationKind, GroupAnnotation, InjectAnnotation, ProviderAnnotation};

///
/// BuildError
///

#[derive(Debug, ThisError)]
pub enum BuildError {
    #[error("failed to parse {kind} annotation, wrong json format, {source} in package: {package}, func: {func}")]
    Annotation {
        kind: &'static str,
        package: String,
        func: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate defined provider id: {id} in package: {package}, func: {func}")]
    DuplicateProvider {
        id: String,
        package: String,
        func: String,
    },

    #[error("injected parameter is not found, param: {param} in package: {package}, func: {func}")]
    MissingParameter {
        param: String,
        package: String,
        func: String,
    },

    #[error("injected parameter's package not found, param: {param} in package: {package}, func: {func}")]
    UnresolvedPackage {
        param: String,
        package: String,
        func: String,
    },

    #[error("all parameters of the provider must be injected, param: {param} has not been injected in package: {package}, func: {func}")]
    UncoveredParameter {
        param: String,
        package: String,
        func: String,
    },
}

/// Builds the model for a set of loaded packages. Packages that end up with
/// no DI functions are dropped.
pub fn build_model(loaded: &[LoadedPackage]) -> Result<Model, BuildError> {
    ModelBuilder::default().build(loaded)
}

///
/// ModelBuilder
///

#[derive(Debug, Default)]
struct ModelBuilder {
    packages: Vec<Package>,
}

impl ModelBuilder {
    fn build(mut self, loaded: &[LoadedPackage]) -> Result<Model, BuildError> {
        for source in loaded {
            let package = self.scan_package(source)?;
            if !package.funcs.is_empty() {
                debug!(package = %package.path, funcs = package.funcs.len(), "scanned package");
                self.packages.push(package);
            }
        }
        Ok(Model {
            packages: self.packages,
        })
    }

    fn scan_package(&self, source: &LoadedPackage) -> Result<Package, BuildError> {
        let mut package = Package::new(&source.name, &source.path, source.folder.clone());

        for loaded_file in &source.files {
            let mut file = SourceFile::new(&loaded_file.name, &loaded_file.module);
            file.imports = collect_imports(&loaded_file.ast);

            for item in &loaded_file.ast.items {
                let syn::Item::Fn(item_fn) = item else {
                    continue;
                };
                if let Some(func) = self.scan_function(&package, &file, item_fn)? {
                    package.funcs.push(func);
                }
            }
            package.files.insert(file.name.clone(), file);
        }
        Ok(package)
    }

    /// Scans one function's doc comments. Returns the finished [`Func`] when
    /// the function is a provider or group member, `None` otherwise.
    fn scan_function(
        &self,
        package: &Package,
        file: &SourceFile,
        item: &syn::ItemFn,
    ) -> Result<Option<Func>, BuildError> {
        let mut func = Func::new(item.sig.ident.to_string(), &file.name);

        for line in doc_lines(&item.attrs) {
            let Some((kind, body)) = match_comment(&line) else {
                continue;
            };
            match kind {
                AnnotationKind::Provider => self.apply_provider(package, &mut func, body)?,
                AnnotationKind::Group => apply_group(package, &mut func, body)?,
                AnnotationKind::Inject => apply_inject(package, file, &mut func, &item.sig, body)?,
            }
        }

        // Functions without any DI annotation are not participants and are
        // exempt from the coverage check.
        let annotated =
            func.provider.is_some() || func.group.is_some() || !func.injectors.is_empty();
        if !annotated {
            return Ok(None);
        }

        func.injectors = ordered_injectors(package, &func, &item.sig)?;
        if func.provider.is_none() && func.group.is_none() {
            return Ok(None);
        }

        func.ret = match &item.sig.output {
            ReturnType::Type(_, ty) => resolve_type(ty),
            ReturnType::Default => None,
        };
        Ok(Some(func))
    }

    fn apply_provider(
        &self,
        package: &Package,
        func: &mut Func,
        body: &str,
    ) -> Result<(), BuildError> {
        let annotation: ProviderAnnotation =
            serde_json::from_str(body).map_err(|source| BuildError::Annotation {
                kind: "provider",
                package: package.path.clone(),
                func: func.name.clone(),
                source,
            })?;
        if annotation.id.is_empty() {
            return Ok(());
        }

        let duplicate = package.find_provider(&annotation.id).is_some()
            || self
                .packages
                .iter()
                .any(|pkg| pkg.find_provider(&annotation.id).is_some());
        if duplicate {
            return Err(BuildError::DuplicateProvider {
                id: annotation.id,
                package: package.path.clone(),
                func: func.name.clone(),
            });
        }

        func.provider = Some(annotation.id);
        Ok(())
    }
}

fn apply_group(package: &Package, func: &mut Func, body: &str) -> Result<(), BuildError> {
    let annotation: GroupAnnotation =
        serde_json::from_str(body).map_err(|source| BuildError::Annotation {
            kind: "group",
            package: package.path.clone(),
            func: func.name.clone(),
            source,
        })?;
    if !annotation.id.is_empty() {
        func.group = Some(annotation.id);
    }
    Ok(())
}

fn apply_inject(
    package: &Package,
    file: &SourceFile,
    func: &mut Func,
    sig: &syn::Signature,
    body: &str,
) -> Result<(), BuildError> {
    let annotation: InjectAnnotation =
        serde_json::from_str(body).map_err(|source| BuildError::Annotation {
            kind: "inject",
            package: package.path.clone(),
            func: func.name.clone(),
            source,
        })?;

    let Some(param_ty) = param_type(sig, &annotation.param) else {
        return Err(BuildError::MissingParameter {
            param: annotation.param,
            package: package.path.clone(),
            func: func.name.clone(),
        });
    };
    let Some(ty) = resolve_type(param_ty) else {
        return Err(BuildError::UnresolvedPackage {
            param: annotation.param,
            package: package.path.clone(),
            func: func.name.clone(),
        });
    };

    // An explicit `pkg` on the annotation overrides the use-table lookup.
    // When the declared qualifier differs from the path's last segment, the
    // generated import needs a matching rename.
    let (pkg, alias) = if let Some(explicit) = annotation.pkg.filter(|p| !p.is_empty()) {
        let alias = match &ty.qualifier {
            Some(qualifier) if last_path_segment(&explicit) != qualifier => {
                Some(qualifier.clone())
            }
            _ => None,
        };
        (Some(explicit), alias)
    } else {
        match &ty.qualifier {
            None => (None, None),
            Some(qualifier) if LOCAL_QUALIFIERS.contains(&qualifier.as_str()) => (None, None),
            Some(qualifier) => match file.imports.get(qualifier) {
                Some(import) => (Some(import.path.clone()), import.alias.clone()),
                None => {
                    return Err(BuildError::UnresolvedPackage {
                        param: annotation.param,
                        package: package.path.clone(),
                        func: func.name.clone(),
                    });
                }
            },
        }
    };

    func.injectors.push(Injector {
        param: annotation.param,
        provider_id: annotation.id,
        pkg,
        alias,
        ty,
    });
    Ok(())
}

/// Reorders the scanned injectors into formal parameter order, failing on
/// any parameter without a matching `@inject`.
fn ordered_injectors(
    package: &Package,
    func: &Func,
    sig: &syn::Signature,
) -> Result<Vec<Injector>, BuildError> {
    let mut ordered = Vec::with_capacity(sig.inputs.len());
    for input in &sig.inputs {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let Pat::Ident(pat) = &*pat_type.pat else {
            continue;
        };
        let name = pat.ident.to_string();
        match func.injectors.iter().find(|inj| inj.param == name) {
            Some(injector) => ordered.push(injector.clone()),
            None => {
                return Err(BuildError::UncoveredParameter {
                    param: name,
                    package: package.path.clone(),
                    func: func.name.clone(),
                });
            }
        }
    }
    Ok(ordered)
}

fn param_type<'a>(sig: &'a syn::Signature, param: &str) -> Option<&'a syn::Type> {
    sig.inputs.iter().find_map(|input| {
        let FnArg::Typed(pat_type) = input else {
            return None;
        };
        let Pat::Ident(pat) = &*pat_type.pat else {
            return None;
        };
        (pat.ident == param).then(|| &*pat_type.ty)
    })
}

/// Maps a declared type onto the supported shapes: bare paths, package
/// qualified paths, trait objects, and `Arc` wrappers around any of those.
#[must_use]
pub fn resolve_type(ty: &syn::Type) -> Option<TypeExpr> {
    match ty {
        syn::Type::Path(type_path) if type_path.qself.is_none() => {
            if let Some(inner) = arc_inner(&type_path.path) {
                let expr = resolve_type(inner)?;
                // Nested sharing (`Arc<Arc<T>>`) is not a supported shape.
                if expr.shared {
                    return None;
                }
                return Some(expr.shared());
            }
            path_expr(&type_path.path, false)
        }
        syn::Type::TraitObject(obj) => {
            let mut bounds = obj.bounds.iter();
            let syn::TypeParamBound::Trait(bound) = bounds.next()? else {
                return None;
            };
            if bounds.next().is_some() {
                return None;
            }
            path_expr(&bound.path, true)
        }
        _ => None,
    }
}

/// Recognizes `Arc<T>` (also spelled `sync::Arc<T>` / `std::sync::Arc<T>`)
/// and returns the wrapped type.
fn arc_inner(path: &syn::Path) -> Option<&syn::Type> {
    let last = path.segments.last()?;
    if last.ident != "Arc" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn path_expr(path: &syn::Path, dyn_trait: bool) -> Option<TypeExpr> {
    if path.segments.is_empty()
        || path.segments.iter().any(|seg| !seg.arguments.is_none())
    {
        return None;
    }
    let idents: Vec<String> = path
        .segments
        .iter()
        .map(|seg| seg.ident.to_string())
        .collect();

    let expr = if idents.len() == 1 {
        TypeExpr::local(&idents[0])
    } else {
        TypeExpr::qualified(&idents[0], idents[1..].join("::"))
    };
    Some(if dyn_trait { expr.dyn_trait() } else { expr })
}

/// Doc comment lines of a declaration, in source order, as the raw
/// attribute values (the `///` marker already stripped by syn).
fn doc_lines(attrs: &[syn::Attribute]) -> Vec<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(lit),
                    ..
                }) => Some(lit.value()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Builds a file's use-table. `use a::b;` maps local name `b`; `use a::b as
/// c;` maps `c`; groups recurse; globs contribute nothing.
fn collect_imports(ast: &syn::File) -> BTreeMap<String, Import> {
    let mut imports = BTreeMap::new();
    for item in &ast.items {
        if let syn::Item::Use(item_use) = item {
            collect_use_tree(&item_use.tree, &mut Vec::new(), &mut imports);
        }
    }
    imports
}

fn collect_use_tree(
    tree: &syn::UseTree,
    prefix: &mut Vec<String>,
    imports: &mut BTreeMap<String, Import>,
) {
    match tree {
        syn::UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            collect_use_tree(&path.tree, prefix, imports);
            prefix.pop();
        }
        syn::UseTree::Name(name) => {
            let ident = name.ident.to_string();
            if ident == "self" {
                // `use a::b::{self}` binds `b`.
                if let Some(local) = prefix.last().cloned() {
                    imports.insert(
                        local,
                        Import {
                            path: prefix.join("::"),
                            alias: None,
                        },
                    );
                }
                return;
            }
            let mut segments = prefix.clone();
            segments.push(ident.clone());
            imports.insert(
                ident,
                Import {
                    path: segments.join("::"),
                    alias: None,
                },
            );
        }
        syn::UseTree::Rename(rename) => {
            let mut segments = prefix.clone();
            segments.push(rename.ident.to_string());
            let local = rename.rename.to_string();
            imports.insert(
                local.clone(),
                Import {
                    path: segments.join("::"),
                    alias: Some(local),
                },
            );
        }
        syn::UseTree::Group(group) => {
            for item in &group.items {
                collect_use_tree(item, prefix, imports);
            }
        }
        syn::UseTree::Glob(_) => {}
    }
}
