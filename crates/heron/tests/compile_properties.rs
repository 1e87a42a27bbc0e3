//! Compile-time behavior of endpoint signatures.
//!
//! Each test compiles handler declarations against a route and a shared
//! dependency graph and checks the resulting signature or compile error.

use heron::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

struct UserRepo;
struct DbSession;

fn context() -> CompileContext {
    let mut container = Container::new();
    container.factory::<UserRepo, _, _>(vec![], |_| async { Ok(UserRepo) });
    container.disposable::<DbSession, _, _, _, _>(
        vec![],
        |_| async { Ok(DbSession) },
        |_| async { Ok(()) },
    );
    CompileContext::new(Arc::new(container))
}

fn user() -> TypeExpr {
    TypeExpr::record(
        RecordType::new("User")
            .field("id", TypeExpr::int())
            .field("name", TypeExpr::str())
            .field("email", TypeExpr::str()),
    )
}

fn handler_params() -> Vec<ParamDecl> {
    vec![
        ParamDecl::new("user_id", TypeExpr::str()),
        ParamDecl::new("user", user()),
        ParamDecl::new("repo", TypeExpr::named::<UserRepo>()),
        ParamDecl::new("x_trace", marks::header(TypeExpr::str())).with_default(json!("")),
        ParamDecl::new("verbose", TypeExpr::bool()).with_default(json!(false)),
    ]
}

#[test]
fn test_compiling_twice_is_identical() {
    let ctx = context();
    let params = handler_params();
    let first = EndpointSignature::compile(&ctx, "/users/{user_id}", &params, None).unwrap();
    let second = EndpointSignature::compile(&ctx, "/users/{user_id}", &params, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.path_params(), second.path_params());
    assert_eq!(first.query_params(), second.query_params());
    assert_eq!(first.header_params(), second.header_params());
    assert_eq!(first.body_param(), second.body_param());
    assert_eq!(first.dependencies(), second.dependencies());
    assert_eq!(first.return_params(), second.return_params());
}

#[test]
fn test_classification_by_source() {
    let signature =
        EndpointSignature::compile(&context(), "/users/{user_id}", &handler_params(), None)
            .unwrap();

    assert!(signature.path_params().contains_key("user_id"));
    assert!(signature.query_params().contains_key("verbose"));
    assert_eq!(signature.header_params()["x_trace"].info.alias, "x-trace");
    assert_eq!(signature.body_param().map(|b| b.info.name.as_str()), Some("user"));
    assert!(signature.dependencies().contains_key("repo"));
}

#[test]
fn test_default_on_path_param_fails() {
    let err = EndpointSignature::compile(
        &context(),
        "/users/{user_id}",
        &[ParamDecl::new("user_id", TypeExpr::str()).with_default(json!("x"))],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::PathParamDefault { ref param, .. } if param == "user_id"));
}

#[test]
fn test_two_body_params_fail() {
    let err = EndpointSignature::compile(
        &context(),
        "/users",
        &[
            ParamDecl::new("a", marks::body(user())),
            ParamDecl::new("b", marks::body(TypeExpr::record(RecordType::new("Y")))),
        ],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::MultipleBodyParams { .. }));
}

#[test]
fn test_unused_placeholder_compiles() {
    let signature = EndpointSignature::compile(
        &context(),
        "/users/{user_id}/{order_id}",
        &[ParamDecl::new("user_id", TypeExpr::str())],
        None,
    )
    .unwrap();

    assert_eq!(signature.unused_placeholders(), ["order_id"]);
    assert!(!signature.path_params().contains_key("order_id"));
    assert!(!signature.query_params().contains_key("order_id"));
    assert!(!signature.header_params().contains_key("order_id"));
    assert!(!signature.cookie_params().contains_key("order_id"));
    assert!(signature.params().all(|p| p.name != "order_id"));
}

#[test]
fn test_unused_placeholder_kept_when_warning_disabled() {
    let mut options = HeronConfig::default().binding_options();
    options.warn_unused_path_keys = false;
    let ctx = context().with_options(options);
    let signature = EndpointSignature::compile(
        &ctx,
        "/users/{user_id}/{order_id}",
        &[ParamDecl::new("user_id", TypeExpr::str())],
        None,
    )
    .unwrap();
    assert_eq!(signature.unused_placeholders(), ["order_id"]);
}

#[test]
fn test_plain_dependency_is_not_scoped() {
    let signature = EndpointSignature::compile(
        &context(),
        "/users",
        &[ParamDecl::new("repo", TypeExpr::named::<UserRepo>())],
        None,
    )
    .unwrap();
    assert!(!signature.scoped());
}

#[test]
fn test_disposable_dependency_is_scoped() {
    let signature = EndpointSignature::compile(
        &context(),
        "/users",
        &[
            ParamDecl::new("repo", TypeExpr::named::<UserRepo>()),
            ParamDecl::new("session", TypeExpr::named::<DbSession>()),
        ],
        None,
    )
    .unwrap();
    assert!(signature.scoped());
}

#[test]
fn test_unknown_plugin_fails() {
    let err = EndpointSignature::compile(
        &context(),
        "/",
        &[ParamDecl::new("tenant", marks::plugin(TypeExpr::str(), "tenant"))],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::UnresolvablePlugin { .. }));
}

#[test]
fn test_endpoint_compile_reports_errors() {
    let handler = Handler::new("bad", |_| async { Ok(HandlerReturn::Value(json!(null))) })
        .param(ParamDecl::new("user_id", TypeExpr::int()).with_default(json!(1)));
    let result = Endpoint::compile(
        &context(),
        "/users/{user_id}",
        handler,
        Arc::new(ErrorRegistry::default()),
    );
    assert!(matches!(result, Err(CompileError::PathParamDefault { .. })));
}

fn scalar() -> impl Strategy<Value = TypeExpr> {
    prop_oneof![
        Just(TypeExpr::str()),
        Just(TypeExpr::int()),
        Just(TypeExpr::float()),
        Just(TypeExpr::bool()),
        Just(TypeExpr::optional(TypeExpr::int())),
        Just(TypeExpr::list(TypeExpr::str())),
    ]
}

fn wrap(ty: TypeExpr, mark: u8) -> TypeExpr {
    match mark {
        0 => marks::query(ty),
        1 => marks::header(ty),
        2 => marks::cookie(ty),
        _ => ty,
    }
}

proptest! {
    #[test]
    fn test_classification_is_deterministic(
        decls in proptest::collection::btree_map("[a-z][a-z_]{0,8}", (scalar(), 0u8..4, any::<bool>()), 1..6)
    ) {
        let params: Vec<ParamDecl> = decls
            .into_iter()
            .map(|(name, (ty, mark, has_default))| {
                let decl = ParamDecl::new(name, wrap(ty, mark));
                if has_default {
                    decl.with_default(json!(null))
                } else {
                    decl
                }
            })
            .collect();
        let ctx = context();
        let first = EndpointSignature::compile(&ctx, "/items", &params, None).unwrap();
        let second = EndpointSignature::compile(&ctx, "/items", &params, None).unwrap();
        prop_assert_eq!(first, second);
    }
}
