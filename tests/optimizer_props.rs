//! Property-based checks that the optimizer never changes what a program
//! prints or how it fails.

use cinder::run_source;
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

const BINARY_OPS: &[&str] = &[
    "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||",
];

/// Identifier-free integer expressions, fully parenthesized.
fn arb_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i32..20).prop_map(|n| n.to_string()),
        Just("2147483647".to_string()),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(BINARY_OPS), inner.clone())
                .prop_map(|(a, op, b)| format!("({} {} {})", a, op, b)),
            inner.clone().prop_map(|a| format!("(-{})", a)),
            inner.prop_map(|a| format!("(!{})", a)),
        ]
    })
}

/// Like [`arb_expr`] but with string and array leaves, so operators can
/// fail on their operand types.
fn arb_mixed_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i32..5).prop_map(|n| n.to_string()),
        Just("\"s\"".to_string()),
        Just("[1]".to_string()),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(BINARY_OPS), inner.clone())
                .prop_map(|(a, op, b)| format!("({} {} {})", a, op, b)),
            inner.clone().prop_map(|a| format!("(-{})", a)),
            inner.prop_map(|a| format!("(!{})", a)),
        ]
    })
}

/// Printed values, or the error message.
fn outcome(source: &str, optimize: bool) -> Result<Vec<String>, String> {
    run_source(source, optimize)
        .map(|values| values.iter().map(|v| v.to_string()).collect())
        .map_err(|e| e.to_string())
}

// =============================================================================
// Errors the optimizer must not hide
// =============================================================================

fn assert_same_outcome(source: &str) {
    assert_eq!(outcome(source, true), outcome(source, false), "source: {}", source);
}

#[test]
fn test_unused_store_keeps_type_error() {
    let source = "let x = \"a\" - 1; print(2);";
    assert_same_outcome(source);
    assert!(outcome(source, true).unwrap_err().starts_with("Runtime error: "));
}

#[test]
fn test_unused_store_keeps_undefined_name() {
    assert_same_outcome("let x = nope; print(2);");
    assert_same_outcome("let early = late; let late = 1; print(late);");
    assert_eq!(
        outcome("let x = nope; print(2);", true).unwrap_err(),
        "Codegen error: Undefined variable: nope"
    );
}

#[test]
fn test_bare_expression_keeps_error() {
    assert_same_outcome("\"a\" < 1; print(2);");
    assert_same_outcome("fn f(a) { a * 2; return 0; } print(f(\"s\"));");
}

#[test]
fn test_unused_argument_keeps_error() {
    assert_same_outcome("fn k(a) { return 1; } print(k(-\"s\"));");
    assert_same_outcome("fn k(a) { return 1; } print(k(missing));");
}

#[test]
fn test_infallible_dead_stores_still_removed() {
    let source = "let a = 1; let copy = a; let s = \"x\" + \"y\"; \
                  fn k(p) { return 1; } print(k(\"x\" == 1) + a); print(s);";
    assert_same_outcome(source);
    let (_, stats) = cinder::pipeline::compile_source(source, true).unwrap();
    let stats = stats.unwrap();
    assert_eq!(stats.dead_code_removed, 1);
    assert_eq!(stats.calls_inlined, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn optimizing_expression_preserves_result(expr in arb_expr()) {
        let source = format!("print({});", expr);
        prop_assert_eq!(outcome(&source, true), outcome(&source, false), "source: {}", source);
    }

    #[test]
    fn optimizing_through_locals_preserves_result(a in arb_expr(), b in arb_expr()) {
        let source = format!("let x = {}; let y = x + {}; let unused = y * 2; print(y);", a, b);
        prop_assert_eq!(outcome(&source, true), outcome(&source, false), "source: {}", source);
    }

    #[test]
    fn inlining_preserves_result(a in arb_expr(), b in arb_expr()) {
        let source = format!(
            "fn mix(p, q) {{ return p * 3 - q; }} print(mix({}, {}));",
            a, b
        );
        prop_assert_eq!(outcome(&source, true), outcome(&source, false), "source: {}", source);
    }

    #[test]
    fn dead_store_of_mixed_expression_preserves_outcome(expr in arb_mixed_expr()) {
        let source = format!("let unused = {}; {}; print(1);", expr, expr);
        prop_assert_eq!(outcome(&source, true), outcome(&source, false), "source: {}", source);
    }

    #[test]
    fn discarded_argument_preserves_outcome(expr in arb_mixed_expr()) {
        let source = format!("fn first(a, b) {{ return a; }} print(first(7, {}));", expr);
        prop_assert_eq!(outcome(&source, true), outcome(&source, false), "source: {}", source);
    }
}
