//! # IR Validation
//!
//! A read-only structural validator for the tree IR, run before and after
//! transformation passes to catch malformed input early and broken
//! invariants immediately. Validation never modifies the tree.

use tensora_compiler_ir::{ExprId, ExprKind, IrArena, IrError, IrResult, StmtId, StmtKind};

use crate::IrPass;

/// Structural validation pass
#[derive(Debug, Default)]
pub struct Validation;

impl Validation {
    /// Creates the pass
    pub const fn new() -> Self {
        Self
    }

    /// Validates a function body, returning the first violation found
    pub fn validate(arena: &IrArena, body: StmtId) -> IrResult<()> {
        Self::check_stmt(arena, body)
    }

    fn check_stmt(arena: &IrArena, stmt: StmtId) -> IrResult<()> {
        match &arena.stmt(stmt).kind {
            StmtKind::Assign { lhs, rhs } => {
                let lhs_expr = arena.expr(*lhs);
                if !lhs_expr.is_var() && !lhs_expr.is_indexing() {
                    log::warn!(
                        "assign into non-location {}",
                        arena.pretty_expr(*lhs)
                    );
                }
                Self::check_expr(arena, *lhs)?;
                Self::check_expr(arena, *rhs)
            }
            StmtKind::VarDef { var, init } => {
                if !arena.expr(*var).is_var() {
                    log::warn!("definition of non-variable {}", arena.pretty_expr(*var));
                }
                if let Some(init) = init {
                    if arena.expr(*init).ty != arena.expr(*var).ty {
                        log::warn!(
                            "initializer type {} differs from variable type {}",
                            arena.expr(*init).ty,
                            arena.expr(*var).ty
                        );
                    }
                    Self::check_expr(arena, *init)?;
                }
                Ok(())
            }
            StmtKind::Evaluate { expr } => Self::check_expr(arena, *expr),
            StmtKind::Stmts { seq } => {
                for child in seq {
                    Self::check_stmt(arena, *child)?;
                }
                Ok(())
            }
            StmtKind::ForLoop {
                begin, end, step, body, ..
            } => {
                Self::check_expr(arena, *begin)?;
                Self::check_expr(arena, *end)?;
                Self::check_expr(arena, *step)?;
                if !arena.stmt(*body).is_stmts() {
                    log::warn!("loop body is not a statement sequence");
                }
                Self::check_stmt(arena, *body)
            }
            StmtKind::IfElse {
                condition,
                then_case,
                else_case,
            } => {
                Self::check_expr(arena, *condition)?;
                Self::check_stmt(arena, *then_case)?;
                if let Some(else_case) = else_case {
                    Self::check_stmt(arena, *else_case)?;
                }
                Ok(())
            }
        }
    }

    fn check_expr(arena: &IrArena, expr: ExprId) -> IrResult<()> {
        match &arena.expr(expr).kind {
            ExprKind::Const(_) | ExprKind::Var { .. } | ExprKind::Tensor { .. } => Ok(()),
            ExprKind::Indexing { ptr, indices, mask } => {
                if !arena.expr(*ptr).is_tensor() {
                    return Err(IrError::IndexingNotOnTensor {
                        found: arena.pretty_expr(*ptr),
                    });
                }
                for idx in indices {
                    Self::check_expr(arena, *idx)?;
                }
                if let Some(mask) = mask {
                    Self::check_expr(arena, *mask)?;
                }
                Ok(())
            }
            ExprKind::TensorPtr { base } => {
                if !arena.expr(*base).is_indexing() {
                    log::warn!(
                        "address-of over non-access {}",
                        arena.pretty_expr(*base)
                    );
                }
                Self::check_expr(arena, *base)
            }
            ExprKind::Call { args, .. } | ExprKind::Intrin { args, .. } => {
                for arg in args {
                    Self::check_expr(arena, *arg)?;
                }
                Ok(())
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                Self::check_expr(arena, *lhs)?;
                Self::check_expr(arena, *rhs)
            }
        }
    }
}

impl IrPass for Validation {
    fn run(&mut self, arena: &mut IrArena, body: StmtId) -> IrResult<StmtId> {
        Self::validate(arena, body)?;
        Ok(body)
    }

    fn name(&self) -> &'static str {
        "Validation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensora_compiler_ir::{BinaryOp, DataType};

    #[test]
    fn test_well_formed_body_passes() {
        let mut arena = IrArena::new();
        let a = arena.tensor("A", DataType::f32());
        let i = arena.var("i", DataType::s32());
        let one = arena.const_int(1);
        let idx = arena.binary(BinaryOp::Add, i, one);
        let load = arena.indexing(a, vec![idx]);
        let x = arena.var("x", DataType::f32());
        let assign = arena.assign(x, load);
        let body = arena.stmts(vec![assign]);

        assert!(Validation::validate(&arena, body).is_ok());
    }

    #[test]
    fn test_indexing_on_non_tensor_is_fatal() {
        let mut arena = IrArena::new();
        let x = arena.var("x", DataType::f32());
        let zero = arena.const_int(0);
        // Deliberately malformed: indexing a scalar variable.
        let load = arena.indexing(x, vec![zero]);
        let y = arena.var("y", DataType::f32());
        let assign = arena.assign(y, load);
        let body = arena.stmts(vec![assign]);

        assert!(matches!(
            Validation::validate(&arena, body),
            Err(IrError::IndexingNotOnTensor { .. })
        ));
    }
}
