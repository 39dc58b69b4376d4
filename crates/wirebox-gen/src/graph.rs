//! Dependency graph validation and prioritization.
//!
//! Two passes over the finalized model. The legality pass checks that every
//! injected provider id resolves to a function somewhere in the model. The
//! cycle pass runs a DFS from every function, cloning the chain for each
//! sibling injector; every visit of a dependency bumps its priority, so a
//! provider ends up weighted by how many dependency paths run through it.
//! Each package's function list is then stable-sorted by descending
//! priority, which guarantees that a provider is registered before anything
//! that injects it.

use thiserror::Error as ThisError;
use tracing::{debug, error};

use crate::model::{Chain, FuncHandle, Model};

///
/// GraphError
///

#[derive(Debug, ThisError)]
pub enum GraphError {
    #[error("provider id: {id} not found, used in package: {package}, func: {func}, param: {param}")]
    UnknownProvider {
        id: String,
        package: String,
        func: String,
        param: String,
    },

    #[error("provider circular injection: {chain}")]
    CyclicDependency { chain: String },
}

/// Validates the model and assigns priorities. On success every package's
/// function list is sorted in registration order.
pub fn validate(model: &mut Model) -> Result<(), GraphError> {
    check_injectors(model)?;
    prioritize(model)?;
    Ok(())
}

/// Legality pass: every injector must reference a known provider.
fn check_injectors(model: &Model) -> Result<(), GraphError> {
    for package in &model.packages {
        for func in &package.funcs {
            for injector in &func.injectors {
                if model.find_provider(&injector.provider_id).is_none() {
                    error!(
                        id = %injector.provider_id,
                        package = %package.path,
                        func = %func.name,
                        param = %injector.param,
                        "provider not found"
                    );
                    return Err(GraphError::UnknownProvider {
                        id: injector.provider_id.clone(),
                        package: package.path.clone(),
                        func: func.name.clone(),
                        param: injector.param.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Cycle pass. Walks the dependency relation from every function, bumping
/// each visited provider's priority, then sorts each package.
fn prioritize(model: &mut Model) -> Result<(), GraphError> {
    for package in 0..model.packages.len() {
        for func in 0..model.packages[package].funcs.len() {
            visit(model, Chain::new(), FuncHandle { package, func })?;
        }

        let funcs = &mut model.packages[package].funcs;
        funcs.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!(
            package = %model.packages[package].path,
            order = ?model.packages[package]
                .funcs
                .iter()
                .map(|f| (&f.name, f.priority))
                .collect::<Vec<_>>(),
            "prioritized package"
        );
    }
    Ok(())
}

fn visit(model: &mut Model, mut chain: Chain, handle: FuncHandle) -> Result<(), GraphError> {
    let func = model.func(handle);
    let provider = func.provider.clone();
    let name = func.name.clone();
    if !chain.insert(provider.as_deref(), &name) {
        error!(chain = %chain, "provider circular injection");
        return Err(GraphError::CyclicDependency {
            chain: chain.to_string(),
        });
    }

    let dependency_ids: Vec<String> = model
        .func(handle)
        .injectors
        .iter()
        .map(|injector| injector.provider_id.clone())
        .collect();

    for id in dependency_ids {
        // Siblings branch from the same prefix, so each recursion gets its
        // own copy of the chain.
        if let Some(dependency) = model.find_provider(&id) {
            model.func_mut(dependency).priority += 1;
            visit(model, chain.clone(), dependency)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_model;
    use crate::load::{LoadedFile, LoadedPackage};
    use std::path::PathBuf;

    fn model_from(files: &[(&str, &str)]) -> Model {
        let loaded = LoadedPackage {
            name: "example".to_string(),
            path: "example".to_string(),
            folder: PathBuf::from("/tmp/example/src"),
            files: files
                .iter()
                .map(|(name, source)| LoadedFile {
                    name: (*name).to_string(),
                    module: String::new(),
                    ast: syn::parse_file(source).expect("test source must parse"),
                })
                .collect(),
        };
        build_model(&[loaded]).expect("model must build")
    }

    #[test]
    fn unknown_provider_fails_legality() {
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @provider({"id": "main.app"})
            /// @inject({"param": "db", "id": "main.db"})
            pub fn new_app(db: String) -> String { db }
            "#,
        )]);

        let err = validate(&mut model).unwrap_err();
        match err {
            GraphError::UnknownProvider { id, package, func, param } => {
                assert_eq!(id, "main.db");
                assert_eq!(package, "example");
                assert_eq!(func, "new_app");
                assert_eq!(param, "db");
            }
            other => panic!("expected UnknownProvider, got {other:?}"),
        }
    }

    #[test]
    fn chain_priorities_order_the_registrations() {
        // url <- db <- app: every walk through a dependent bumps its
        // dependencies, so url ends at 2, db at 1, app at 0.
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @provider({"id": "main.app"})
            /// @inject({"param": "db", "id": "main.db"})
            pub fn new_app(db: String) -> String { db }

            /// @provider({"id": "main.db"})
            /// @inject({"param": "url", "id": "main.db.url"})
            pub fn new_db(url: String) -> String { url }

            /// @provider({"id": "main.db.url"})
            pub fn new_db_url() -> String { "mysql:192.168.1.1:3306".to_string() }
            "#,
        )]);

        validate(&mut model).unwrap();

        let funcs = &model.packages[0].funcs;
        let order: Vec<(&str, u64)> = funcs
            .iter()
            .map(|f| (f.provider.as_deref().unwrap(), f.priority))
            .collect();
        assert_eq!(
            order,
            vec![("main.db.url", 2), ("main.db", 1), ("main.app", 0)]
        );
    }

    #[test]
    fn diamond_dependencies_are_not_cycles() {
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @provider({"id": "d"})
            pub fn new_d() -> String { String::new() }

            /// @provider({"id": "b"})
            /// @inject({"param": "d", "id": "d"})
            pub fn new_b(d: String) -> String { d }

            /// @provider({"id": "c"})
            /// @inject({"param": "d", "id": "d"})
            pub fn new_c(d: String) -> String { d }

            /// @provider({"id": "a"})
            /// @inject({"param": "b", "id": "b"})
            /// @inject({"param": "c", "id": "c"})
            pub fn new_a(b: String, c: String) -> String { b + &c }
            "#,
        )]);

        validate(&mut model).unwrap();

        // The shared leaf outweighs both branches, which outweigh the root.
        let funcs = &model.packages[0].funcs;
        assert_eq!(funcs[0].provider.as_deref(), Some("d"));
        assert_eq!(funcs.last().unwrap().provider.as_deref(), Some("a"));
    }

    #[test]
    fn cycles_are_reported_with_the_full_chain() {
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @provider({"id": "a"})
            /// @inject({"param": "b", "id": "b"})
            pub fn new_a(b: String) -> String { b }

            /// @provider({"id": "b"})
            /// @inject({"param": "a", "id": "a"})
            pub fn new_b(a: String) -> String { a }
            "#,
        )]);

        let err = validate(&mut model).unwrap_err();
        match err {
            GraphError::CyclicDependency { chain } => {
                assert_eq!(chain, "a -> b -> a");
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @provider({"id": "a"})
            /// @inject({"param": "a", "id": "a"})
            pub fn new_a(a: String) -> String { a }
            "#,
        )]);

        let err = validate(&mut model).unwrap_err();
        match err {
            GraphError::CyclicDependency { chain } => assert_eq!(chain, "a -> a"),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn group_only_members_weight_their_providers() {
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @group({"id": "group.controllers"})
            /// @inject({"param": "name", "id": "main.user.name"})
            pub fn new_user_controller(name: String) -> String { name }

            /// @provider({"id": "main.user.name"})
            pub fn new_user_name() -> String { "user".to_string() }
            "#,
        )]);

        validate(&mut model).unwrap();

        let funcs = &model.packages[0].funcs;
        assert_eq!(funcs[0].provider.as_deref(), Some("main.user.name"));
        assert_eq!(funcs[0].priority, 1);
        assert_eq!(funcs[1].group.as_deref(), Some("group.controllers"));
        assert_eq!(funcs[1].priority, 0);
    }

    #[test]
    fn equal_priorities_keep_input_order() {
        let mut model = model_from(&[(
            "lib.rs",
            r#"
            /// @provider({"id": "first"})
            pub fn new_first() -> String { String::new() }

            /// @provider({"id": "second"})
            pub fn new_second() -> String { String::new() }

            /// @provider({"id": "third"})
            pub fn new_third() -> String { String::new() }
            "#,
        )]);

        validate(&mut model).unwrap();

        let ids: Vec<&str> = model.packages[0]
            .funcs
            .iter()
            .map(|f| f.provider.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }
}
