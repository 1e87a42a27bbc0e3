//! End-to-end request binding and execution.
//!
//! These tests drive live requests through compiled signatures and
//! endpoints:
//!
//! 1. Text decoding from path and query values
//! 2. Problem collection for query and body inputs
//! 3. Dependency resolution and per-request scopes
//! 4. Options loaded from configuration

use heron::prelude::*;
use http::{Method, StatusCode};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct UserRepo {
    prefix: String,
}

struct DbSession;

fn container(disposed: &Arc<AtomicUsize>) -> Arc<Container> {
    let mut container = Container::new();
    container.factory::<UserRepo, _, _>(vec![], |_| async {
        Ok(UserRepo {
            prefix: "user-".to_string(),
        })
    });
    let counter = Arc::clone(disposed);
    container.disposable::<DbSession, _, _, _, _>(
        vec![],
        |_| async { Ok(DbSession) },
        move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
    );
    Arc::new(container)
}

fn user() -> TypeExpr {
    TypeExpr::record(
        RecordType::new("User")
            .field("id", TypeExpr::int())
            .field("name", TypeExpr::str())
            .field("email", TypeExpr::str()),
    )
}

fn compile(route: &str, params: &[ParamDecl]) -> (EndpointSignature, Arc<dyn Resolver>) {
    let graph = container(&Arc::new(AtomicUsize::new(0)));
    let ctx = CompileContext::new(graph.clone());
    let signature = EndpointSignature::compile(&ctx, route, params, None).unwrap();
    let resolver: Arc<dyn Resolver> = graph;
    (signature, resolver)
}

fn problems(err: BindError) -> Vec<ValidationProblem> {
    match err {
        BindError::Invalid(invalid) => invalid.into_problems(),
        other => panic!("expected invalid request, got {other}"),
    }
}

async fn body_json(response: heron::extract::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_post_user_body_binds() {
    let (signature, resolver) = compile(
        "/users/{user_id}",
        &[
            ParamDecl::new("user_id", TypeExpr::str()),
            ParamDecl::new("user", user()),
        ],
    );
    let request = RequestContext::builder()
        .method(Method::POST)
        .uri("/users/42")
        .path_param("user_id", "42")
        .json(&json!({"id": 1, "name": "a", "email": "b"}))
        .build();

    let result = bind(&signature, &request, &resolver, &BindingOptions::default())
        .await
        .unwrap();
    assert!(result.errors.is_empty());
    assert_eq!(
        result.params.value("user"),
        Some(&json!({"id": 1, "name": "a", "email": "b"}))
    );
}

#[tokio::test]
async fn test_empty_body_is_one_missing_problem() {
    let (signature, resolver) = compile(
        "/users/{user_id}",
        &[
            ParamDecl::new("user_id", TypeExpr::str()),
            ParamDecl::new("user", user()),
        ],
    );
    let request = RequestContext::builder()
        .method(Method::POST)
        .uri("/users/42")
        .path_param("user_id", "42")
        .build();

    let problems = problems(
        bind(&signature, &request, &resolver, &BindingOptions::default())
            .await
            .unwrap_err(),
    );
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].kind, ProblemKind::MissingParam);
    assert_eq!(problems[0].location, Location::Body);
}

#[tokio::test]
async fn test_query_problem_kinds() {
    let (signature, resolver) = compile(
        "/search",
        &[
            ParamDecl::new("page", TypeExpr::int()),
            ParamDecl::new("filter", TypeExpr::map(TypeExpr::str())).with_default(json!({})),
        ],
    );
    let run = |uri: &str| RequestContext::builder().uri(uri).build();
    let options = BindingOptions::default();

    let missing = problems(bind(&signature, &run("/search"), &resolver, &options).await.unwrap_err());
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].kind, ProblemKind::MissingParam);
    assert_eq!(missing[0].location, Location::Query);
    assert_eq!(missing[0].param, "page");

    let invalid = problems(
        bind(&signature, &run("/search?page=abc"), &resolver, &options)
            .await
            .unwrap_err(),
    );
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].kind, ProblemKind::InvalidType);

    let broken = problems(
        bind(&signature, &run("/search?page=1&filter=%7Bnot-json"), &resolver, &options)
            .await
            .unwrap_err(),
    );
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].kind, ProblemKind::InvalidPayload);

    let request = run("/search?page=2&filter=%7B%22a%22%3A%22b%22%7D");
    let ok = bind(&signature, &request, &resolver, &options).await.unwrap();
    assert_eq!(ok.params.value("filter"), Some(&json!({"a": "b"})));
}

#[tokio::test]
async fn test_endpoint_renders_problems_as_422() {
    let graph = container(&Arc::new(AtomicUsize::new(0)));
    let ctx = CompileContext::new(graph);
    let handler = Handler::new("search", |_| async { Ok(HandlerReturn::Value(json!([]))) })
        .param(ParamDecl::new("page", TypeExpr::int()))
        .param(ParamDecl::new("x_token", marks::header(TypeExpr::str())));
    let endpoint =
        Endpoint::compile(&ctx, "/search", handler, Arc::new(ErrorRegistry::default())).unwrap();

    let response = endpoint
        .handle(RequestContext::builder().uri("/search?page=x").build())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    let detail = body["detail"].as_array().unwrap();
    assert_eq!(detail.len(), 2);
    assert_eq!(detail[0]["type"], "invalid_type");
    assert_eq!(detail[0]["location"], "query");
    assert_eq!(detail[1]["type"], "missing_param");
    assert_eq!(detail[1]["param"], "x-token");
}

#[tokio::test]
async fn test_dependency_and_scope_lifecycle() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let ctx = CompileContext::new(container(&disposed));
    let handler = Handler::new("get_user", |args: BoundArgs| async move {
        let repo = args.require::<UserRepo>("repo")?;
        args.require::<DbSession>("session")?;
        let id: i64 = args.parse("user_id")?;
        Ok(HandlerReturn::Value(json!({ "id": format!("{}{id}", repo.prefix) })))
    })
    .param(ParamDecl::new("user_id", TypeExpr::int()))
    .param(ParamDecl::new("repo", TypeExpr::named::<UserRepo>()))
    .param(ParamDecl::new("session", TypeExpr::named::<DbSession>()));
    let endpoint =
        Endpoint::compile(&ctx, "/users/{user_id}", handler, Arc::new(ErrorRegistry::default()))
            .unwrap();
    assert!(endpoint.signature().scoped());

    let response = endpoint
        .handle(
            RequestContext::builder()
                .uri("/users/9")
                .path_param("user_id", "9")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"id": "user-9"}));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_error_solved_by_status() {
    let ctx = CompileContext::new(container(&Arc::new(AtomicUsize::new(0))));
    let mut errors = ErrorRegistry::default();
    errors.on_status_json(StatusCode::NOT_FOUND);
    let handler = Handler::new("missing", |_| async {
        Err(anyhow::Error::new(StatusError::not_found("no such user")))
    });
    let endpoint = Endpoint::compile(&ctx, "/users", handler, Arc::new(errors)).unwrap();

    let response = endpoint
        .handle(RequestContext::builder().uri("/users").build())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"detail": "no such user"}));
}

#[tokio::test]
async fn test_configured_body_limit() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[binding]\nmax_body_size = 16\noffload_sync_handlers = false").unwrap();
    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

    let ctx = CompileContext::new(container(&Arc::new(AtomicUsize::new(0))))
        .with_options(config.binding_options());
    let handler = Handler::blocking("create", |args| {
        Ok(HandlerReturn::Value(args.value("user").cloned().unwrap_or(Value::Null)))
    })
    .param(ParamDecl::new("user", user()));
    let endpoint =
        Endpoint::compile(&ctx, "/users", handler, Arc::new(ErrorRegistry::default())).unwrap();

    let response = endpoint
        .handle(
            RequestContext::builder()
                .method(Method::POST)
                .uri("/users")
                .json(&json!({"id": 1, "name": "a", "email": "b"}))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["detail"][0]["type"], "invalid_payload");
}

proptest! {
    #[test]
    fn test_int_query_round_trip(n in any::<i64>()) {
        let (signature, resolver) = compile("/items", &[ParamDecl::new("n", TypeExpr::int())]);
        let request = RequestContext::builder().uri(&format!("/items?n={n}")).build();
        let result = tokio_test::block_on(bind(&signature, &request, &resolver, &BindingOptions::default()))
            .unwrap();
        prop_assert_eq!(result.params.value("n"), Some(&json!(n)));
    }

    #[test]
    fn test_str_path_round_trip(s in "[A-Za-z0-9_-]{1,16}") {
        let (signature, resolver) = compile("/items/{key}", &[ParamDecl::new("key", TypeExpr::str())]);
        let request = RequestContext::builder()
            .uri(&format!("/items/{s}"))
            .path_param("key", s.clone())
            .build();
        let result = tokio_test::block_on(bind(&signature, &request, &resolver, &BindingOptions::default()))
            .unwrap();
        prop_assert_eq!(result.params.value("key"), Some(&json!(s)));
    }
}
