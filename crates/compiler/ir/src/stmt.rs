//! # IR Statements
//!
//! Statement nodes of the kernel IR. A `Stmts` node is both an ordered
//! sequence and a lexical scope boundary; loop bodies and branch arms are
//! always `Stmts` nodes.

use crate::{ExprId, StmtId};

/// A statement node
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
}

/// Statement variants
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `lhs = rhs`; the left-hand side is a scalar variable or an element
    /// access
    Assign { lhs: ExprId, rhs: ExprId },

    /// Declaration of a scalar variable, optionally initialized
    VarDef { var: ExprId, init: Option<ExprId> },

    /// An expression evaluated for effect, e.g. a bare call
    Evaluate { expr: ExprId },

    /// An ordered statement sequence; introduces a lexical scope
    Stmts { seq: Vec<StmtId> },

    /// A counted loop `for var in begin..end step step { body }`; the body
    /// is a `Stmts`
    ForLoop {
        var: ExprId,
        begin: ExprId,
        end: ExprId,
        step: ExprId,
        body: StmtId,
    },

    /// A two-way branch; both arms are `Stmts`
    IfElse {
        condition: ExprId,
        then_case: StmtId,
        else_case: Option<StmtId>,
    },
}

impl Stmt {
    /// Returns true if this is a statement sequence
    pub const fn is_stmts(&self) -> bool {
        matches!(self.kind, StmtKind::Stmts { .. })
    }

    /// Returns the child sequence if this is a `Stmts` node
    pub fn as_seq(&self) -> Option<&[StmtId]> {
        match &self.kind {
            StmtKind::Stmts { seq } => Some(seq),
            _ => None,
        }
    }
}
