//! # IR Walkers
//!
//! Two distinct walker abstractions over the tree IR:
//!
//! - [`IrViewer`] observes nodes and returns nothing; analyses that only
//!   produce side tables implement it.
//! - [`IrRewriter`] produces replacement node ids; transformation passes
//!   implement it. The free [`rebuild_expr`]/[`rebuild_stmt`] helpers
//!   reconstruct a node only when some child changed and return the original
//!   id otherwise, so unchanged sub-trees are shared between input and
//!   output.
//!
//! Both traits dispatch children through the trait object's own methods, so
//! an implementation hooks a node kind simply by matching on it before
//! delegating to the default walk.

use crate::expr::ExprKind;
use crate::stmt::StmtKind;
use crate::{ExprId, IrArena, IrResult, StmtId};

/// Observing walker; default methods recurse into children
pub trait IrViewer {
    fn view_expr(&mut self, arena: &IrArena, expr: ExprId) {
        walk_expr(self, arena, expr);
    }

    fn view_stmt(&mut self, arena: &IrArena, stmt: StmtId) {
        walk_stmt(self, arena, stmt);
    }
}

/// Dispatches `viewer` into the children of `expr`
pub fn walk_expr<V: IrViewer + ?Sized>(viewer: &mut V, arena: &IrArena, expr: ExprId) {
    match &arena.expr(expr).kind {
        ExprKind::Const(_) | ExprKind::Var { .. } | ExprKind::Tensor { .. } => {}
        ExprKind::Indexing { ptr, indices, mask } => {
            viewer.view_expr(arena, *ptr);
            for idx in indices {
                viewer.view_expr(arena, *idx);
            }
            if let Some(mask) = mask {
                viewer.view_expr(arena, *mask);
            }
        }
        ExprKind::TensorPtr { base } => viewer.view_expr(arena, *base),
        ExprKind::Call { args, .. } | ExprKind::Intrin { args, .. } => {
            for arg in args {
                viewer.view_expr(arena, *arg);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            viewer.view_expr(arena, *lhs);
            viewer.view_expr(arena, *rhs);
        }
    }
}

/// Dispatches `viewer` into the children of `stmt`
pub fn walk_stmt<V: IrViewer + ?Sized>(viewer: &mut V, arena: &IrArena, stmt: StmtId) {
    match &arena.stmt(stmt).kind {
        StmtKind::Assign { lhs, rhs } => {
            viewer.view_expr(arena, *lhs);
            viewer.view_expr(arena, *rhs);
        }
        StmtKind::VarDef { var, init } => {
            viewer.view_expr(arena, *var);
            if let Some(init) = init {
                viewer.view_expr(arena, *init);
            }
        }
        StmtKind::Evaluate { expr } => viewer.view_expr(arena, *expr),
        StmtKind::Stmts { seq } => {
            for child in seq {
                viewer.view_stmt(arena, *child);
            }
        }
        StmtKind::ForLoop {
            var,
            begin,
            end,
            step,
            body,
        } => {
            viewer.view_expr(arena, *var);
            viewer.view_expr(arena, *begin);
            viewer.view_expr(arena, *end);
            viewer.view_expr(arena, *step);
            viewer.view_stmt(arena, *body);
        }
        StmtKind::IfElse {
            condition,
            then_case,
            else_case,
        } => {
            viewer.view_expr(arena, *condition);
            viewer.view_stmt(arena, *then_case);
            if let Some(else_case) = else_case {
                viewer.view_stmt(arena, *else_case);
            }
        }
    }
}

/// Rebuilding walker; default methods reconstruct nodes whose children
/// changed and otherwise return the original id
pub trait IrRewriter {
    fn rewrite_expr(&mut self, arena: &mut IrArena, expr: ExprId) -> IrResult<ExprId> {
        rebuild_expr(self, arena, expr)
    }

    fn rewrite_stmt(&mut self, arena: &mut IrArena, stmt: StmtId) -> IrResult<StmtId> {
        rebuild_stmt(self, arena, stmt)
    }
}

fn realloc_expr(arena: &mut IrArena, original: ExprId, kind: ExprKind) -> ExprId {
    let ty = arena.expr(original).ty;
    let attrs = arena.expr(original).attrs.clone();
    arena.push_expr_with_attrs(kind, ty, attrs)
}

/// Rewrites the children of `expr` through `rewriter`, reallocating the node
/// only if some child changed
pub fn rebuild_expr<R: IrRewriter + ?Sized>(
    rewriter: &mut R,
    arena: &mut IrArena,
    expr: ExprId,
) -> IrResult<ExprId> {
    if matches!(
        arena.expr(expr).kind,
        ExprKind::Const(_) | ExprKind::Var { .. } | ExprKind::Tensor { .. }
    ) {
        return Ok(expr);
    }
    let kind = arena.expr(expr).kind.clone();
    match kind {
        ExprKind::Const(_) | ExprKind::Var { .. } | ExprKind::Tensor { .. } => Ok(expr),
        ExprKind::Indexing { ptr, indices, mask } => {
            let new_ptr = rewriter.rewrite_expr(arena, ptr)?;
            let mut changed = new_ptr != ptr;
            let mut new_indices = Vec::with_capacity(indices.len());
            for idx in indices {
                let new_idx = rewriter.rewrite_expr(arena, idx)?;
                changed |= new_idx != idx;
                new_indices.push(new_idx);
            }
            let new_mask = match mask {
                Some(mask) => {
                    let new_mask = rewriter.rewrite_expr(arena, mask)?;
                    changed |= new_mask != mask;
                    Some(new_mask)
                }
                None => None,
            };
            if changed {
                Ok(realloc_expr(
                    arena,
                    expr,
                    ExprKind::Indexing {
                        ptr: new_ptr,
                        indices: new_indices,
                        mask: new_mask,
                    },
                ))
            } else {
                Ok(expr)
            }
        }
        ExprKind::TensorPtr { base } => {
            let new_base = rewriter.rewrite_expr(arena, base)?;
            if new_base != base {
                Ok(realloc_expr(arena, expr, ExprKind::TensorPtr { base: new_base }))
            } else {
                Ok(expr)
            }
        }
        ExprKind::Call { name, args } => {
            let mut changed = false;
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                let new_arg = rewriter.rewrite_expr(arena, arg)?;
                changed |= new_arg != arg;
                new_args.push(new_arg);
            }
            if changed {
                Ok(realloc_expr(
                    arena,
                    expr,
                    ExprKind::Call {
                        name,
                        args: new_args,
                    },
                ))
            } else {
                Ok(expr)
            }
        }
        ExprKind::Intrin { kind, args } => {
            let mut changed = false;
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                let new_arg = rewriter.rewrite_expr(arena, arg)?;
                changed |= new_arg != arg;
                new_args.push(new_arg);
            }
            if changed {
                Ok(realloc_expr(
                    arena,
                    expr,
                    ExprKind::Intrin {
                        kind,
                        args: new_args,
                    },
                ))
            } else {
                Ok(expr)
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let new_lhs = rewriter.rewrite_expr(arena, lhs)?;
            let new_rhs = rewriter.rewrite_expr(arena, rhs)?;
            if new_lhs != lhs || new_rhs != rhs {
                Ok(realloc_expr(
                    arena,
                    expr,
                    ExprKind::Binary {
                        op,
                        lhs: new_lhs,
                        rhs: new_rhs,
                    },
                ))
            } else {
                Ok(expr)
            }
        }
    }
}

/// Rewrites the children of `stmt` through `rewriter`, reallocating the node
/// only if some child changed
pub fn rebuild_stmt<R: IrRewriter + ?Sized>(
    rewriter: &mut R,
    arena: &mut IrArena,
    stmt: StmtId,
) -> IrResult<StmtId> {
    let kind = arena.stmt(stmt).kind.clone();
    match kind {
        StmtKind::Assign { lhs, rhs } => {
            let new_lhs = rewriter.rewrite_expr(arena, lhs)?;
            let new_rhs = rewriter.rewrite_expr(arena, rhs)?;
            if new_lhs != lhs || new_rhs != rhs {
                Ok(arena.assign(new_lhs, new_rhs))
            } else {
                Ok(stmt)
            }
        }
        StmtKind::VarDef { var, init } => {
            let new_var = rewriter.rewrite_expr(arena, var)?;
            let new_init = match init {
                Some(init) => Some(rewriter.rewrite_expr(arena, init)?),
                None => None,
            };
            if new_var != var || new_init != init {
                Ok(arena.push_stmt(StmtKind::VarDef {
                    var: new_var,
                    init: new_init,
                }))
            } else {
                Ok(stmt)
            }
        }
        StmtKind::Evaluate { expr } => {
            let new_expr = rewriter.rewrite_expr(arena, expr)?;
            if new_expr != expr {
                Ok(arena.evaluate(new_expr))
            } else {
                Ok(stmt)
            }
        }
        StmtKind::Stmts { seq } => {
            let mut changed = false;
            let mut new_seq = Vec::with_capacity(seq.len());
            for child in seq {
                let new_child = rewriter.rewrite_stmt(arena, child)?;
                changed |= new_child != child;
                new_seq.push(new_child);
            }
            if changed {
                Ok(arena.stmts(new_seq))
            } else {
                Ok(stmt)
            }
        }
        StmtKind::ForLoop {
            var,
            begin,
            end,
            step,
            body,
        } => {
            let new_var = rewriter.rewrite_expr(arena, var)?;
            let new_begin = rewriter.rewrite_expr(arena, begin)?;
            let new_end = rewriter.rewrite_expr(arena, end)?;
            let new_step = rewriter.rewrite_expr(arena, step)?;
            let new_body = rewriter.rewrite_stmt(arena, body)?;
            if new_var != var
                || new_begin != begin
                || new_end != end
                || new_step != step
                || new_body != body
            {
                Ok(arena.push_stmt(StmtKind::ForLoop {
                    var: new_var,
                    begin: new_begin,
                    end: new_end,
                    step: new_step,
                    body: new_body,
                }))
            } else {
                Ok(stmt)
            }
        }
        StmtKind::IfElse {
            condition,
            then_case,
            else_case,
        } => {
            let new_condition = rewriter.rewrite_expr(arena, condition)?;
            let new_then = rewriter.rewrite_stmt(arena, then_case)?;
            let new_else = match else_case {
                Some(else_case) => Some(rewriter.rewrite_stmt(arena, else_case)?),
                None => None,
            };
            if new_condition != condition || new_then != then_case || new_else != else_case {
                Ok(arena.push_stmt(StmtKind::IfElse {
                    condition: new_condition,
                    then_case: new_then,
                    else_case: new_else,
                }))
            } else {
                Ok(stmt)
            }
        }
    }
}
