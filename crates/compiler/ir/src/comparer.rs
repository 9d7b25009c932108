//! # Structural IR Comparison
//!
//! Structural equality over expressions and statements, across one arena or
//! two. With `ignore_names` set, named scalar variables compare up to a
//! consistent renaming (alpha-equivalence), which lets callers compare two
//! outputs of a pass that generates fresh temporaries. Attributes are not
//! part of the comparison.

use rustc_hash::FxHashMap;

use crate::expr::ExprKind;
use crate::stmt::StmtKind;
use crate::{ExprId, IrArena, StmtId};

/// Structural comparer
#[derive(Debug, Default)]
pub struct IrComparer {
    /// Compare scalar variables up to a consistent renaming instead of by
    /// name
    ignore_names: bool,
    /// Established var correspondence (left id -> right id) when
    /// `ignore_names` is set
    var_map: FxHashMap<ExprId, ExprId>,
    /// Reverse correspondence, keeping the mapping injective
    var_map_rev: FxHashMap<ExprId, ExprId>,
}

impl IrComparer {
    /// Creates a comparer; `ignore_names` selects alpha-equivalence for
    /// scalar variables
    pub fn new(ignore_names: bool) -> Self {
        Self {
            ignore_names,
            var_map: FxHashMap::default(),
            var_map_rev: FxHashMap::default(),
        }
    }

    fn vars_match(&mut self, a: ExprId, b: ExprId, name_a: &str, name_b: &str) -> bool {
        if !self.ignore_names {
            return name_a == name_b;
        }
        match (self.var_map.get(&a), self.var_map_rev.get(&b)) {
            (Some(&mapped), Some(&rev)) => mapped == b && rev == a,
            (None, None) => {
                self.var_map.insert(a, b);
                self.var_map_rev.insert(b, a);
                true
            }
            _ => false,
        }
    }

    /// Structural equality of two expressions
    pub fn compare_expr(
        &mut self,
        arena_a: &IrArena,
        a: ExprId,
        arena_b: &IrArena,
        b: ExprId,
    ) -> bool {
        if std::ptr::eq(arena_a, arena_b) && a == b && !self.ignore_names {
            return true;
        }
        let ea = arena_a.expr(a);
        let eb = arena_b.expr(b);
        if ea.ty != eb.ty {
            return false;
        }
        match (&ea.kind, &eb.kind) {
            (ExprKind::Const(la), ExprKind::Const(lb)) => la == lb,
            (ExprKind::Var { name: na }, ExprKind::Var { name: nb }) => {
                self.vars_match(a, b, na, nb)
            }
            (ExprKind::Tensor { name: na }, ExprKind::Tensor { name: nb }) => na == nb,
            (
                ExprKind::Indexing {
                    ptr: pa,
                    indices: ia,
                    mask: ma,
                },
                ExprKind::Indexing {
                    ptr: pb,
                    indices: ib,
                    mask: mb,
                },
            ) => {
                self.compare_expr(arena_a, *pa, arena_b, *pb)
                    && self.compare_exprs(arena_a, ia, arena_b, ib)
                    && self.compare_opt(arena_a, *ma, arena_b, *mb)
            }
            (ExprKind::TensorPtr { base: ba }, ExprKind::TensorPtr { base: bb }) => {
                self.compare_expr(arena_a, *ba, arena_b, *bb)
            }
            (
                ExprKind::Call {
                    name: na,
                    args: aa,
                },
                ExprKind::Call {
                    name: nb,
                    args: ab,
                },
            ) => na == nb && self.compare_exprs(arena_a, aa, arena_b, ab),
            (
                ExprKind::Intrin {
                    kind: ka,
                    args: aa,
                },
                ExprKind::Intrin {
                    kind: kb,
                    args: ab,
                },
            ) => ka == kb && self.compare_exprs(arena_a, aa, arena_b, ab),
            (
                ExprKind::Binary {
                    op: oa,
                    lhs: la,
                    rhs: ra,
                },
                ExprKind::Binary {
                    op: ob,
                    lhs: lb,
                    rhs: rb,
                },
            ) => {
                oa == ob
                    && self.compare_expr(arena_a, *la, arena_b, *lb)
                    && self.compare_expr(arena_a, *ra, arena_b, *rb)
            }
            _ => false,
        }
    }

    /// Structural equality of two expression slices
    pub fn compare_exprs(
        &mut self,
        arena_a: &IrArena,
        a: &[ExprId],
        arena_b: &IrArena,
        b: &[ExprId],
    ) -> bool {
        a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|(ea, eb)| self.compare_expr(arena_a, *ea, arena_b, *eb))
    }

    fn compare_opt(
        &mut self,
        arena_a: &IrArena,
        a: Option<ExprId>,
        arena_b: &IrArena,
        b: Option<ExprId>,
    ) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.compare_expr(arena_a, a, arena_b, b),
            _ => false,
        }
    }

    /// Structural equality of two statements
    pub fn compare_stmt(
        &mut self,
        arena_a: &IrArena,
        a: StmtId,
        arena_b: &IrArena,
        b: StmtId,
    ) -> bool {
        if std::ptr::eq(arena_a, arena_b) && a == b && !self.ignore_names {
            return true;
        }
        match (&arena_a.stmt(a).kind, &arena_b.stmt(b).kind) {
            (
                StmtKind::Assign { lhs: la, rhs: ra },
                StmtKind::Assign { lhs: lb, rhs: rb },
            ) => {
                self.compare_expr(arena_a, *la, arena_b, *lb)
                    && self.compare_expr(arena_a, *ra, arena_b, *rb)
            }
            (
                StmtKind::VarDef { var: va, init: ia },
                StmtKind::VarDef { var: vb, init: ib },
            ) => {
                self.compare_expr(arena_a, *va, arena_b, *vb)
                    && self.compare_opt(arena_a, *ia, arena_b, *ib)
            }
            (StmtKind::Evaluate { expr: ea }, StmtKind::Evaluate { expr: eb }) => {
                self.compare_expr(arena_a, *ea, arena_b, *eb)
            }
            (StmtKind::Stmts { seq: sa }, StmtKind::Stmts { seq: sb }) => {
                sa.len() == sb.len()
                    && sa
                        .iter()
                        .zip(sb.iter())
                        .all(|(ca, cb)| self.compare_stmt(arena_a, *ca, arena_b, *cb))
            }
            (
                StmtKind::ForLoop {
                    var: va,
                    begin: ba,
                    end: ea,
                    step: pa,
                    body: ya,
                },
                StmtKind::ForLoop {
                    var: vb,
                    begin: bb,
                    end: eb,
                    step: pb,
                    body: yb,
                },
            ) => {
                self.compare_expr(arena_a, *va, arena_b, *vb)
                    && self.compare_expr(arena_a, *ba, arena_b, *bb)
                    && self.compare_expr(arena_a, *ea, arena_b, *eb)
                    && self.compare_expr(arena_a, *pa, arena_b, *pb)
                    && self.compare_stmt(arena_a, *ya, arena_b, *yb)
            }
            (
                StmtKind::IfElse {
                    condition: ca,
                    then_case: ta,
                    else_case: za,
                },
                StmtKind::IfElse {
                    condition: cb,
                    then_case: tb,
                    else_case: zb,
                },
            ) => {
                self.compare_expr(arena_a, *ca, arena_b, *cb)
                    && self.compare_stmt(arena_a, *ta, arena_b, *tb)
                    && match (za, zb) {
                        (None, None) => true,
                        (Some(za), Some(zb)) => self.compare_stmt(arena_a, *za, arena_b, *zb),
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}
