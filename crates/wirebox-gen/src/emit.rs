//! Emitter.
//!
//! Purely a function of the validated model: for each package it assembles
//! the generated file as a token stream, parses it back into a `syn::File`,
//! renders it with prettyplease, and writes `wirebox_generated.rs` into the
//! package's source folder. The function list is already in registration
//! order, so the emitted initializer just calls straight down the list.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::parse_str;
use thiserror::Error as ThisError;
use tracing::info;

use crate::model::{last_path_segment, Func, Injector, Model, Package, TypeExpr};

/// Name of the generated file, one per package.
pub const GENERATED_FILE: &str = "wirebox_generated.rs";

const BANNER: &str = "\
//! Generated by wirebox. DO NOT EDIT.
//!
//! Every provider and group member of this crate is registered with the
//! process-wide registry when the crate is loaded. Retrieve singletons with
//! `wirebox::provide(id)` and group members with `wirebox::members(id)`.
";

///
/// EmitError
///

#[derive(Debug, ThisError)]
pub enum EmitError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("generated code for package {package} does not parse: {source}")]
    Render {
        package: String,
        #[source]
        source: syn::Error,
    },
}

/// Writes the generated file for every package in the model.
pub fn emit(model: &Model) -> Result<(), EmitError> {
    for package in &model.packages {
        let source = render_package(model, package)?;
        let path = package.folder.join(GENERATED_FILE);
        fs::write(&path, source).map_err(|source| EmitError::Io {
            path: path.clone(),
            source,
        })?;
        info!(package = %package.path, path = %path.display(), "wrote generated wiring");
    }
    Ok(())
}

/// Renders one package's generated file.
pub fn render_package(model: &Model, package: &Package) -> Result<String, EmitError> {
    let tokens = PackageBuilder { model, package }.generate();
    let file: syn::File = syn::parse2(tokens).map_err(|source| EmitError::Render {
        package: package.path.clone(),
        source,
    })?;
    Ok(format!("{BANNER}\n{}", prettyplease::unparse(&file)))
}

///
/// PackageBuilder
///

struct PackageBuilder<'a> {
    model: &'a Model,
    package: &'a Package,
}

impl PackageBuilder<'_> {
    fn generate(&self) -> TokenStream {
        let providers: Vec<&Func> = self
            .package
            .funcs
            .iter()
            .filter(|func| func.provider.is_some())
            .collect();
        let members: Vec<&Func> = self
            .package
            .funcs
            .iter()
            .filter(|func| func.provider.is_none() && func.group.is_some())
            .collect();

        let uses = self.use_block();
        let provider_fns = providers.iter().map(|func| self.provider_fn(func));
        let member_fns = members.iter().map(|func| self.group_fn(func));
        let initializer = initializer(&providers, &members);

        quote! {
            #uses
            #(#provider_fns)*
            #(#member_fns)*
            #initializer
        }
    }

    /// The namespace splice and imports block.
    ///
    /// `use super::*` plus one glob per contributing module merge the
    /// crate's file namespaces into the generated module, so constructors
    /// and their types resolve by the bare names they were declared with.
    fn use_block(&self) -> TokenStream {
        let mut tokens = quote! {
            use super::*;
        };

        let modules: BTreeSet<&str> = self
            .package
            .funcs
            .iter()
            .filter_map(|func| self.package.files.get(&func.file))
            .map(|file| file.module.as_str())
            .filter(|module| !module.is_empty())
            .collect();
        for module in modules {
            let path: syn::Path = parse_str(module)
                .unwrap_or_else(|_| panic!("invalid module path: {module}"));
            tokens.extend(quote! {
                use super::#path::*;
            });
        }

        tokens.extend(quote! {
            use wirebox;
        });
        if self.needs_arc() {
            tokens.extend(quote! {
                use std::sync::Arc;
            });
        }

        let imports: BTreeSet<(String, Option<String>)> = self
            .package
            .funcs
            .iter()
            .flat_map(|func| &func.injectors)
            .filter_map(|injector| {
                injector
                    .pkg
                    .clone()
                    .map(|path| (path, injector.alias.clone()))
            })
            .collect();
        for (path, alias) in imports {
            let path: syn::Path =
                parse_str(&path).unwrap_or_else(|_| panic!("invalid import path: {path}"));
            match alias {
                Some(alias) => {
                    let alias = format_ident!("{alias}");
                    tokens.extend(quote! {
                        use #path as #alias;
                    });
                }
                None => tokens.extend(quote! {
                    use #path;
                }),
            }
        }
        tokens
    }

    fn needs_arc(&self) -> bool {
        self.package
            .funcs
            .iter()
            .flat_map(|func| &func.injectors)
            .any(|injector| self.assert_expr(injector).shared)
    }

    fn provider_fn(&self, func: &Func) -> TokenStream {
        let provider_id = func
            .provider
            .as_deref()
            .expect("provider function requires a provider id");
        let fn_ident = format_ident!(
            "{}",
            func.provider_fn_name()
                .expect("provider function requires a provider id")
        );
        let obj_ident = format_ident!(
            "{}",
            func.provider_obj_name()
                .expect("provider function requires a provider id")
        );
        let ctor = format_ident!("{}", func.name);
        let stmts = func.injectors.iter().map(|injector| self.inject_stmts(injector));
        let args = func
            .injectors
            .iter()
            .map(|injector| format_ident!("{}", injector.param));

        let registrations = match func.group.as_deref() {
            Some(group_id) => quote! {
                wirebox::register_singleton(#provider_id, #obj_ident.clone());
                wirebox::register_member(#group_id, #obj_ident);
            },
            None => quote! {
                wirebox::register_singleton(#provider_id, #obj_ident);
            },
        };

        let summary = format!(" Registers the singleton `{provider_id}` with the process registry.");
        let hint = format!(
            " Retrieve it with `wirebox::provide(\"{provider_id}\")` and downcast the result."
        );
        quote! {
            #[doc = #summary]
            #[doc = #hint]
            fn #fn_ident() {
                #(#stmts)*
                let #obj_ident = #ctor(#(#args),*);
                #registrations
            }
        }
    }

    fn group_fn(&self, func: &Func) -> TokenStream {
        let group_id = func
            .group
            .as_deref()
            .expect("group function requires a group id");
        let fn_ident = format_ident!(
            "{}",
            func.group_fn_name().expect("group function requires a group id")
        );
        let ctor = format_ident!("{}", func.name);
        let stmts = func.injectors.iter().map(|injector| self.inject_stmts(injector));
        let args = func
            .injectors
            .iter()
            .map(|injector| format_ident!("{}", injector.param));

        let summary = format!(" Appends a member to the group `{group_id}`.");
        let hint = format!(
            " Retrieve the members with `wirebox::members(\"{group_id}\")`, in registration order."
        );
        quote! {
            #[doc = #summary]
            #[doc = #hint]
            fn #fn_ident() {
                #(#stmts)*
                let member = #ctor(#(#args),*);
                wirebox::register_member(#group_id, member);
            }
        }
    }

    /// The lookup / downcast / bind statements for one injector.
    fn inject_stmts(&self, injector: &Injector) -> TokenStream {
        let obj_ident = format_ident!("{}", injector.obj_name());
        let param_ident = format_ident!("{}", injector.param);
        let provider_id = injector.provider_id.as_str();
        let assert_ty = self.assert_type(injector);
        let mismatch = format!("provider `{provider_id}`: unexpected type");

        quote! {
            let #obj_ident = wirebox::provide(#provider_id).unwrap_or_else(|err| panic!("{err}"));
            let #param_ident = #obj_ident
                .downcast_ref::<#assert_ty>()
                .unwrap_or_else(|| panic!(#mismatch))
                .clone();
        }
    }

    fn assert_type(&self, injector: &Injector) -> syn::Type {
        let expr = self.assert_expr(injector);
        parse_str(&expr.to_string())
            .unwrap_or_else(|_| panic!("invalid type expression: {expr}"))
    }

    /// The downcast target for one injector: the providing function's
    /// declared return type (the concrete type actually registered), not the
    /// parameter's. When the provider lives in another package its return
    /// type is re-qualified with the name this package imports that package
    /// under, which only makes sense when the parameter's package actually
    /// is the provider's package. Anything else falls back to the
    /// parameter's declared type, the only name guaranteed to resolve here.
    fn assert_expr(&self, injector: &Injector) -> TypeExpr {
        let Some(handle) = self.model.find_provider(&injector.provider_id) else {
            return injector.ty.clone();
        };
        let provider_pkg = &self.model.packages[handle.package];
        let Some(ret) = &self.model.func(handle).ret else {
            return injector.ty.clone();
        };

        if provider_pkg.path == self.package.path {
            return ret.clone();
        }
        match (&ret.qualifier, &injector.pkg) {
            (None, Some(pkg)) if *pkg == provider_pkg.path => {
                let qualifier = injector
                    .alias
                    .clone()
                    .unwrap_or_else(|| last_path_segment(pkg).to_string());
                ret.with_qualifier(qualifier)
            }
            _ => injector.ty.clone(),
        }
    }
}

fn initializer(providers: &[&Func], members: &[&Func]) -> TokenStream {
    let calls = providers
        .iter()
        .filter_map(|func| func.provider_fn_name())
        .chain(members.iter().filter_map(|func| func.group_fn_name()))
        .map(|name| format_ident!("{name}"));

    quote! {
        #[doc = " Registers every provider and group member of this crate, in dependency order."]
        #[wirebox::ctor]
        fn wirebox_init() {
            #(#calls();)*
        }
    }
}
