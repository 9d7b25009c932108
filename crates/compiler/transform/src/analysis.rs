//! # Written-Set and Tensor-Usage Analysis
//!
//! The first of the two collaborating index-to-var passes. One top-down walk
//! computes, for every statement, the set of tensor bases assigned through
//! an indexing left-hand side anywhere in the statement's transitive body,
//! and records per-tensor usage facts the rewrite needs:
//!
//! - whether the tensor is the source of a `broadcast` intrinsic,
//! - the tensor's alias identity, together with a reverse map from identity
//!   back to the tensor expression.
//!
//! Results live in side tables keyed by node id and are read-only for the
//! rewrite. The analysis is purely accumulative; its only failure mode is an
//! indexing whose base is not a tensor, which is a malformed-IR fatal error.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tensora_compiler_ir::{
    get_alias_info, walk_expr, AliasIdentityKey, ExprId, ExprKind, IntrinKind, IrArena, IrError,
    IrResult, IrViewer, StmtId, StmtKind, TensorAliasIdentity,
};

/// Usage facts for one tensor
#[derive(Debug, Default, Clone)]
pub struct TensorUsage {
    /// True if the tensor is read by a `broadcast` intrinsic somewhere in
    /// the function
    pub used_in_broadcast: bool,
    /// Cached alias identity, present when the tensor belongs to a
    /// non-singleton alias group
    pub alias: Option<Rc<TensorAliasIdentity>>,
}

/// Side tables produced by [`WrittenSetAnalysis`]
#[derive(Debug, Default)]
pub struct AnalysisResults {
    written: FxHashMap<StmtId, FxHashSet<ExprId>>,
    usage: FxHashMap<ExprId, TensorUsage>,
    alias_map: FxHashMap<AliasIdentityKey, ExprId>,
}

impl AnalysisResults {
    /// The tensors written under `stmt`; empty for unannotated statements
    pub fn written(&self, stmt: StmtId) -> Option<&FxHashSet<ExprId>> {
        self.written.get(&stmt)
    }

    /// True if `tensor` is written somewhere under `stmt`
    pub fn writes(&self, stmt: StmtId, tensor: ExprId) -> bool {
        self.written.get(&stmt).is_some_and(|w| w.contains(&tensor))
    }

    /// Usage facts for `tensor`, if any were recorded
    pub fn usage(&self, tensor: ExprId) -> Option<&TensorUsage> {
        self.usage.get(&tensor)
    }

    /// Resolves an alias identity back to its tensor expression
    pub fn tensor_for_alias(&self, identity: &Rc<TensorAliasIdentity>) -> Option<ExprId> {
        self.alias_map
            .get(&AliasIdentityKey(Rc::clone(identity)))
            .copied()
    }
}

/// The analysis walker
#[derive(Debug, Default)]
pub struct WrittenSetAnalysis {
    results: AnalysisResults,
    error: Option<IrError>,
}

impl WrittenSetAnalysis {
    /// Runs the analysis over a function body
    pub fn run(arena: &IrArena, body: StmtId) -> IrResult<AnalysisResults> {
        let mut analysis = Self::default();
        analysis.analyze_stmt(arena, body);
        match analysis.error {
            Some(err) => Err(err),
            None => Ok(analysis.results),
        }
    }

    /// Returns the tensor base of an indexing expression, or `None` for any
    /// other expression kind. A non-tensor base is a malformed-IR error.
    fn tensor_of_indexing(&mut self, arena: &IrArena, expr: ExprId) -> Option<ExprId> {
        match &arena.expr(expr).kind {
            ExprKind::Indexing { ptr, .. } => {
                if arena.expr(*ptr).is_tensor() {
                    Some(*ptr)
                } else {
                    self.error.get_or_insert(IrError::IndexingNotOnTensor {
                        found: arena.pretty_expr(*ptr),
                    });
                    None
                }
            }
            _ => None,
        }
    }

    /// Computes and records `written(stmt)`, returning it for the caller to
    /// merge into the enclosing statement's set
    fn analyze_stmt(&mut self, arena: &IrArena, stmt: StmtId) -> FxHashSet<ExprId> {
        let written = match &arena.stmt(stmt).kind {
            StmtKind::Assign { lhs, rhs } => {
                self.view_expr(arena, *lhs);
                self.view_expr(arena, *rhs);
                let mut written = FxHashSet::default();
                if let Some(tensor) = self.tensor_of_indexing(arena, *lhs) {
                    written.insert(tensor);
                }
                written
            }
            StmtKind::VarDef { var, init } => {
                self.view_expr(arena, *var);
                if let Some(init) = init {
                    self.view_expr(arena, *init);
                }
                FxHashSet::default()
            }
            StmtKind::Evaluate { expr } => {
                self.view_expr(arena, *expr);
                FxHashSet::default()
            }
            StmtKind::Stmts { seq } => {
                let mut written = FxHashSet::default();
                for child in seq {
                    written.extend(self.analyze_stmt(arena, *child));
                }
                written
            }
            StmtKind::ForLoop {
                var,
                begin,
                end,
                step,
                body,
            } => {
                self.view_expr(arena, *var);
                self.view_expr(arena, *begin);
                self.view_expr(arena, *end);
                self.view_expr(arena, *step);
                self.analyze_stmt(arena, *body)
            }
            StmtKind::IfElse {
                condition,
                then_case,
                else_case,
            } => {
                self.view_expr(arena, *condition);
                let mut written = self.analyze_stmt(arena, *then_case);
                if let Some(else_case) = else_case {
                    written.extend(self.analyze_stmt(arena, *else_case));
                }
                written
            }
        };
        self.results.written.insert(stmt, written.clone());
        written
    }
}

impl IrViewer for WrittenSetAnalysis {
    fn view_expr(&mut self, arena: &IrArena, expr: ExprId) {
        match &arena.expr(expr).kind {
            ExprKind::Tensor { .. } => {
                let Some(alias) = get_alias_info(arena, expr) else {
                    return;
                };
                if alias.has_no_alias() {
                    return;
                }
                self.results
                    .alias_map
                    .insert(AliasIdentityKey(Rc::clone(&alias)), expr);
                self.results
                    .usage
                    .entry(expr)
                    .or_default()
                    .alias
                    .get_or_insert(alias);
            }
            ExprKind::Intrin { kind, args } => {
                if *kind == IntrinKind::Broadcast {
                    if let Some(&arg) = args.first() {
                        if let Some(tensor) = self.tensor_of_indexing(arena, arg) {
                            self.results.usage.entry(tensor).or_default().used_in_broadcast = true;
                        }
                    }
                }
                walk_expr(self, arena, expr);
            }
            _ => walk_expr(self, arena, expr),
        }
    }
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod tests;
