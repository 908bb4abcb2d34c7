//! Function inlining.
//!
//! A function is an inline candidate when it takes at most
//! [`MAX_INLINE_PARAMS`] parameters, its body has at most
//! [`MAX_INLINE_NODES`] nodes, and it cannot reach itself through the call
//! graph. Candidates whose body is a single `return expr;` over their own
//! parameters, with no calls, are substituted into call sites whose
//! arguments cannot fail.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::lang::ast::{Expr, FunctionDecl, Program, Stmt};
use crate::lang::visit::{Visitor, VisitorMut, node_count, walk_expr, walk_expr_mut};

pub const MAX_INLINE_PARAMS: usize = 3;
pub const MAX_INLINE_NODES: usize = 20;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InlineOutcome {
    pub candidates: usize,
    pub inlined: usize,
}

pub(crate) fn inline_functions(program: &mut Program) -> InlineOutcome {
    let graph = CallGraph::build(program);

    let mut outcome = InlineOutcome::default();
    let mut templates = FxHashMap::default();
    for func in program.functions() {
        if !is_candidate(func, &graph) {
            continue;
        }
        outcome.candidates += 1;
        if let Some(template) = Template::from_function(func) {
            log::debug!("inlining template for '{}': {}", func.name, template.body);
            templates.insert(func.name.clone(), template);
        }
    }

    if !templates.is_empty() {
        let mut inliner = Inliner {
            templates,
            inlined: 0,
        };
        inliner.visit_program_mut(program);
        outcome.inlined = inliner.inlined;
    }

    outcome
}

pub(crate) fn is_candidate(func: &FunctionDecl, graph: &CallGraph) -> bool {
    func.params.len() <= MAX_INLINE_PARAMS
        && node_count(func) <= MAX_INLINE_NODES
        && !graph.is_recursive(&func.name)
}

/// Caller to callee edges between declared functions.
pub(crate) struct CallGraph {
    edges: FxHashMap<String, FxHashSet<String>>,
}

impl CallGraph {
    pub fn build(program: &Program) -> Self {
        struct Calls(FxHashSet<String>);

        impl Visitor for Calls {
            fn visit_expr(&mut self, expr: &Expr) {
                if let Expr::Call { callee, .. } = expr {
                    self.0.insert(callee.clone());
                }
                walk_expr(self, expr);
            }
        }

        let mut edges = FxHashMap::default();
        for func in program.functions() {
            let mut calls = Calls(FxHashSet::default());
            calls.visit_function(func);
            edges.insert(func.name.clone(), calls.0);
        }
        CallGraph { edges }
    }

    /// True when `name` can reach itself, directly or through other
    /// functions.
    pub fn is_recursive(&self, name: &str) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<&str> = match self.edges.get(name) {
            Some(callees) => callees.iter().map(String::as_str).collect(),
            None => return false,
        };

        while let Some(current) = stack.pop() {
            if current == name {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(callees) = self.edges.get(current) {
                stack.extend(callees.iter().map(String::as_str));
            }
        }
        false
    }
}

/// `fn f(params) { return body; }` ready for substitution.
struct Template {
    params: Vec<String>,
    /// Whether each parameter occurs in `body`.
    used: Vec<bool>,
    body: Expr,
}

impl Template {
    fn from_function(func: &FunctionDecl) -> Option<Template> {
        let [Stmt::Return(Some(body))] = func.body.as_slice() else {
            return None;
        };

        struct Check<'a> {
            params: &'a [String],
            used: Vec<bool>,
            ok: bool,
        }

        impl Visitor for Check<'_> {
            fn visit_expr(&mut self, expr: &Expr) {
                match expr {
                    Expr::Call { .. } => self.ok = false,
                    Expr::Ident(name) => match self.params.iter().position(|p| p == name) {
                        Some(i) => self.used[i] = true,
                        None => self.ok = false,
                    },
                    _ => {}
                }
                walk_expr(self, expr);
            }
        }

        let mut check = Check {
            params: &func.params,
            used: vec![false; func.params.len()],
            ok: true,
        };
        check.visit_expr(body);

        let Check { used, ok, .. } = check;
        ok.then(|| Template {
            params: func.params.clone(),
            used,
            body: body.clone(),
        })
    }

    /// Arguments are evaluated once at a call but zero or more times once
    /// substituted, so each must be unable to fail. An argument whose
    /// parameter is unused disappears entirely and may not even name a
    /// variable: an undeclared one is a compile error at the call.
    fn accepts(&self, args: &[Expr]) -> bool {
        self.params.len() == args.len()
            && args.iter().zip(&self.used).all(|(arg, &used)| {
                if used {
                    arg.infallible_shape(&|_: &str| true).is_some()
                } else {
                    arg.is_pure()
                }
            })
    }

    fn instantiate(&self, args: &[Expr]) -> Expr {
        struct Substitute<'a> {
            params: &'a [String],
            args: &'a [Expr],
        }

        impl VisitorMut for Substitute<'_> {
            fn visit_expr_mut(&mut self, expr: &mut Expr) {
                if let Expr::Ident(name) = expr {
                    if let Some(i) = self.params.iter().position(|p| p == name) {
                        *expr = self.args[i].clone();
                    }
                    return;
                }
                walk_expr_mut(self, expr);
            }
        }

        let mut body = self.body.clone();
        Substitute {
            params: &self.params,
            args,
        }
        .visit_expr_mut(&mut body);
        body
    }
}

struct Inliner {
    templates: FxHashMap<String, Template>,
    inlined: usize,
}

impl VisitorMut for Inliner {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);

        let Expr::Call { callee, args } = expr else {
            return;
        };
        let Some(template) = self.templates.get(callee.as_str()) else {
            return;
        };
        if !template.accepts(args) {
            return;
        }

        let body = template.instantiate(args);
        log::trace!("inlined call to '{}'", callee);
        *expr = body;
        self.inlined += 1;
    }
}
