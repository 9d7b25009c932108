//! # IR Arena and Node Constructors
//!
//! [`IrArena`] owns every expression and statement node of one function and
//! doubles as the IR builder: each constructor allocates a well-typed node
//! and returns its id. An indexing's value type is always the base tensor's
//! element type widened to the access's lane count, so a scalar temporary
//! introduced for an access can take the access's type verbatim.

use index_vec::IndexVec;

use crate::attrs::{AttrValue, Attrs};
use crate::expr::{BinaryOp, Expr, ExprKind, IntrinKind, Literal};
use crate::stmt::{Stmt, StmtKind};
use crate::types::DataType;
use crate::{ExprId, StmtId};

/// Node storage for one function
#[derive(Debug, Default)]
pub struct IrArena {
    exprs: IndexVec<ExprId, Expr>,
    stmts: IndexVec<StmtId, Stmt>,
}

impl IrArena {
    /// Creates an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows an expression node
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    /// Borrows a statement node
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id]
    }

    /// Number of expression nodes
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// Number of statement nodes
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    /// Allocates an expression node
    pub fn push_expr(&mut self, kind: ExprKind, ty: DataType) -> ExprId {
        self.exprs.push(Expr {
            kind,
            ty,
            attrs: Attrs::new(),
        })
    }

    /// Allocates an expression node carrying attributes
    pub fn push_expr_with_attrs(&mut self, kind: ExprKind, ty: DataType, attrs: Attrs) -> ExprId {
        self.exprs.push(Expr { kind, ty, attrs })
    }

    /// Allocates a statement node
    pub fn push_stmt(&mut self, kind: StmtKind) -> StmtId {
        self.stmts.push(Stmt { kind })
    }

    /// Sets an attribute on an expression node
    pub fn set_attr(&mut self, id: ExprId, key: &'static str, value: AttrValue) {
        self.exprs[id].attrs.set(key, value);
    }

    // --- Expression constructors ---

    /// A named scalar variable
    pub fn var(&mut self, name: &str, ty: DataType) -> ExprId {
        self.push_expr(
            ExprKind::Var {
                name: name.to_string(),
            },
            ty,
        )
    }

    /// A named tensor base; `ty` is the scalar element type
    pub fn tensor(&mut self, name: &str, ty: DataType) -> ExprId {
        self.push_expr(
            ExprKind::Tensor {
                name: name.to_string(),
            },
            ty.with_lanes(1),
        )
    }

    /// An `s32` integer constant
    pub fn const_int(&mut self, value: i64) -> ExprId {
        self.push_expr(ExprKind::Const(Literal::Int(value)), DataType::s32())
    }

    /// An `f32` constant
    pub fn const_f32(&mut self, value: f64) -> ExprId {
        self.push_expr(ExprKind::Const(Literal::Float(value)), DataType::f32())
    }

    /// A boolean constant
    pub fn const_bool(&mut self, value: bool) -> ExprId {
        self.push_expr(ExprKind::Const(Literal::Bool(value)), DataType::bool_())
    }

    /// A binary operation; comparisons yield `bool`, everything else takes
    /// the left operand's type
    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = if op.is_comparison() {
            DataType::bool_().with_lanes(self.expr(lhs).ty.lanes)
        } else {
            self.expr(lhs).ty
        };
        self.push_expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    /// A scalar element access `ptr[indices]`
    pub fn indexing(&mut self, ptr: ExprId, indices: Vec<ExprId>) -> ExprId {
        self.indexing_vector(ptr, indices, 1, None)
    }

    /// An element access with an explicit lane count and optional mask
    pub fn indexing_vector(
        &mut self,
        ptr: ExprId,
        indices: Vec<ExprId>,
        lanes: u32,
        mask: Option<ExprId>,
    ) -> ExprId {
        let ty = self.expr(ptr).ty.with_lanes(lanes);
        self.push_expr(ExprKind::Indexing { ptr, indices, mask }, ty)
    }

    /// Address of an element; `base` must be an `Indexing`
    pub fn tensor_ptr(&mut self, base: ExprId) -> ExprId {
        debug_assert!(self.expr(base).is_indexing());
        let ty = self.expr(base).ty.with_lanes(1);
        self.push_expr(ExprKind::TensorPtr { base }, ty)
    }

    /// An opaque call returning `ret_ty`
    pub fn call(&mut self, name: &str, args: Vec<ExprId>, ret_ty: DataType) -> ExprId {
        self.push_expr(
            ExprKind::Call {
                name: name.to_string(),
                args,
            },
            ret_ty,
        )
    }

    /// An intrinsic call returning `ret_ty`
    pub fn intrin(&mut self, kind: IntrinKind, args: Vec<ExprId>, ret_ty: DataType) -> ExprId {
        self.push_expr(ExprKind::Intrin { kind, args }, ret_ty)
    }

    // --- Statement constructors ---

    /// `lhs = rhs`
    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> StmtId {
        self.push_stmt(StmtKind::Assign { lhs, rhs })
    }

    /// Declaration of `var` without an initializer
    pub fn var_def(&mut self, var: ExprId) -> StmtId {
        self.push_stmt(StmtKind::VarDef { var, init: None })
    }

    /// Declaration of `var` with an initializer
    pub fn var_def_init(&mut self, var: ExprId, init: ExprId) -> StmtId {
        self.push_stmt(StmtKind::VarDef {
            var,
            init: Some(init),
        })
    }

    /// An expression evaluated for effect
    pub fn evaluate(&mut self, expr: ExprId) -> StmtId {
        self.push_stmt(StmtKind::Evaluate { expr })
    }

    /// A statement sequence
    pub fn stmts(&mut self, seq: Vec<StmtId>) -> StmtId {
        self.push_stmt(StmtKind::Stmts { seq })
    }

    /// A counted loop; `body` must be a `Stmts`
    pub fn for_loop(
        &mut self,
        var: ExprId,
        begin: ExprId,
        end: ExprId,
        step: ExprId,
        body: StmtId,
    ) -> StmtId {
        debug_assert!(self.stmt(body).is_stmts());
        self.push_stmt(StmtKind::ForLoop {
            var,
            begin,
            end,
            step,
            body,
        })
    }

    /// A branch; both arms must be `Stmts`
    pub fn if_else(
        &mut self,
        condition: ExprId,
        then_case: StmtId,
        else_case: Option<StmtId>,
    ) -> StmtId {
        debug_assert!(self.stmt(then_case).is_stmts());
        debug_assert!(else_case.map_or(true, |e| self.stmt(e).is_stmts()));
        self.push_stmt(StmtKind::IfElse {
            condition,
            then_case,
            else_case,
        })
    }

    /// Appends a statement to an existing `Stmts` node.
    ///
    /// This is the one sanctioned in-place tree mutation: the index-to-var
    /// rewrite appends writeback stores to the sequence holding an evicted
    /// cache's last write. Does nothing if `stmts` is not a sequence.
    pub fn append_to_stmts(&mut self, stmts: StmtId, child: StmtId) {
        debug_assert!(self.stmt(stmts).is_stmts());
        if let StmtKind::Stmts { seq } = &mut self.stmts[stmts].kind {
            seq.push(child);
        }
    }
}
