//! Integration tests covering the executor end-to-end: sequential
//! read/set/write, conditional branching, bounded loop concurrency,
//! parallel fail-fast, `set_context` merge semantics and recursive
//! rendering with a raw-block opt-out.

use recipe_exec::context::Context;
use recipe_exec::executor::Executor;
use recipe_exec::recipe::RecipeInput;
use recipe_exec::registry::Registry;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

fn executor() -> Executor {
    Executor::new(Arc::new(Registry::with_builtin_steps()))
}

/// Sequential read, then set, then write.
#[tokio::test]
async fn sequential_read_set_write() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("in.txt");
    tokio::fs::write(&in_path, "world").await.unwrap();

    let recipe = json!({
        "steps": [
            { "type": "read_files", "config": { "path": in_path.to_string_lossy(), "content_key": "x" } },
            { "type": "set_context", "config": { "key": "y", "value": "hi {{x}}" } },
            {
                "type": "write_files",
                "config": {
                    "files": [ { "path": "out.txt", "content_key": "y" } ],
                    "root": dir.path().to_string_lossy()
                }
            }
        ]
    });

    let mut context = Context::new();
    executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap();

    assert_eq!(context.get("x"), Some(&json!("world")));
    assert_eq!(context.get("y"), Some(&json!("hi world")));

    let out = tokio::fs::read_to_string(dir.path().join("out.txt")).await.unwrap();
    assert_eq!(out, "hi world");
}

/// Conditional branch selection.
#[tokio::test]
async fn conditional_branch_selection() {
    let recipe = json!({
        "steps": [
            { "type": "set_context", "config": { "key": "n", "value": 3 } },
            {
                "type": "conditional",
                "config": {
                    "condition": "{{n}} > 0",
                    "if_true": { "steps": [{ "type": "set_context", "config": { "key": "sign", "value": "pos" } }] },
                    "if_false": { "steps": [{ "type": "set_context", "config": { "key": "sign", "value": "neg" } }] }
                }
            }
        ]
    });

    let mut context = Context::new();
    executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap();

    assert_eq!(context.get("sign"), Some(&json!("pos")));
}

/// Loop over a list with bounded concurrency preserves input order.
#[tokio::test]
async fn loop_preserves_order_under_concurrency() {
    let recipe = json!({
        "steps": [
            {
                "type": "loop",
                "config": {
                    "items": [10, 20, 30],
                    "item_key": "item",
                    "result_key": "doubled",
                    "max_concurrency": 2,
                    "substeps": [
                        { "type": "set_context", "config": { "key": "item", "value": "{{item}}" } }
                    ]
                }
            }
        ]
    });

    let mut context = Context::new();
    executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap();

    // each iteration's item_key ends up as a rendered string ("10", "20",
    // "30"); the point under test is ordering, not the value shape.
    assert_eq!(context.get("doubled"), Some(&json!(["10", "20", "30"])));
}

/// Parallel fail-fast: a fast failure cuts off a slower sibling rather than
/// waiting the full sleep out.
#[tokio::test]
async fn parallel_fail_fast_short_circuits() {
    let recipe = json!({
        "steps": [
            {
                "type": "parallel",
                "config": {
                    "substeps": [
                        { "type": "execute_recipe", "config": { "recipe_path": "/nonexistent.json" } },
                        {
                            "type": "loop",
                            "config": {
                                "items": [1],
                                "item_key": "n",
                                "result_key": "slow_out",
                                "delay": 5,
                                "substeps": [
                                    { "type": "set_context", "config": { "key": "n", "value": "{{n}}" } }
                                ]
                            }
                        }
                    ]
                }
            }
        ]
    });

    let mut context = Context::new();
    let start = Instant::now();
    let result = executor().execute(RecipeInput::Value(recipe), &mut context).await;
    assert!(result.is_err());
    assert!(start.elapsed().as_secs() < 5, "fail-fast should not wait out the slow sibling's delay");
}

/// `set_context` merge semantics across types.
#[tokio::test]
async fn set_context_merge_semantics() {
    let recipe = json!({
        "steps": [
            { "type": "set_context", "config": { "key": "items", "value": [1, 2] } },
            { "type": "set_context", "config": { "key": "items", "value": [3], "if_exists": "merge" } },
            { "type": "set_context", "config": { "key": "m", "value": { "a": 1 } } },
            { "type": "set_context", "config": { "key": "m", "value": { "a": 2, "b": 3 }, "if_exists": "merge" } },
            { "type": "set_context", "config": { "key": "s", "value": "foo" } },
            { "type": "set_context", "config": { "key": "s", "value": "bar", "if_exists": "merge" } }
        ]
    });

    let mut context = Context::new();
    executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap();

    assert_eq!(context.get("items"), Some(&json!([1, 2, 3])));
    assert_eq!(context.get("m"), Some(&json!({"a": 2, "b": 3})));
    assert_eq!(context.get("s"), Some(&json!("foobar")));
}

/// Recursive render honors a raw-block opt-out across passes.
#[tokio::test]
async fn recursive_render_with_raw_block() {
    let recipe = json!({
        "steps": [
            { "type": "set_context", "config": { "key": "x", "value": "{{y}}" } },
            { "type": "set_context", "config": { "key": "y", "value": "Z" } },
            {
                "type": "set_context",
                "config": {
                    "key": "out",
                    "value": "{% raw %}{{y}}{% endraw %} {{x}}",
                    "nested_render": true
                }
            }
        ]
    });

    let mut context = Context::new();
    executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap();

    assert_eq!(context.get("out"), Some(&json!("{{y}} Z")));
}

/// An unregistered step type fails at dispatch, never silently.
#[tokio::test]
async fn unknown_step_fails_at_dispatch() {
    let recipe = json!({ "steps": [{ "type": "does_not_exist", "config": {} }] });
    let mut context = Context::new();
    let err = executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does_not_exist"));
}

/// Writes inside a loop iteration never leak into the live context except
/// via the aggregated result key.
#[tokio::test]
async fn loop_clone_isolation() {
    let recipe = json!({
        "steps": [
            { "type": "set_context", "config": { "key": "shared", "value": "original" } },
            {
                "type": "loop",
                "config": {
                    "items": [1, 2],
                    "item_key": "n",
                    "result_key": "out",
                    "substeps": [
                        { "type": "set_context", "config": { "key": "shared", "value": "mutated" } }
                    ]
                }
            }
        ]
    });

    let mut context = Context::new();
    executor()
        .execute(RecipeInput::Value(recipe), &mut context)
        .await
        .unwrap();

    assert_eq!(context.get("shared"), Some(&json!("original")));
}
