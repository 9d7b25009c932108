//! # IR Expressions
//!
//! Expression nodes of the kernel IR. Expressions are stored in the
//! [`IrArena`](crate::IrArena) and referenced by [`ExprId`](crate::ExprId);
//! the id is the node's identity, so two structurally equal expressions with
//! different ids are distinct nodes (use [`IrComparer`](crate::IrComparer)
//! for structural questions).

use crate::attrs::Attrs;
use crate::types::DataType;
use crate::ExprId;

/// An expression node: kind, value type and attached attributes
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: DataType,
    pub attrs: Attrs,
}

/// Expression variants
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A compile-time constant
    Const(Literal),

    /// A named mutable scalar location
    Var { name: String },

    /// A named tensor base address. The node's type is the scalar element
    /// type; the base carries no shape information the passes care about.
    Tensor { name: String },

    /// An element access `T[i1, .., ik]`. The access width is the node
    /// type's lane count; a vector access may carry a predicate mask.
    Indexing {
        ptr: ExprId,
        indices: Vec<ExprId>,
        mask: Option<ExprId>,
    },

    /// Address of a tensor element; `base` must be an `Indexing`
    TensorPtr { base: ExprId },

    /// An opaque call; the callee may mutate memory through any aliasing
    /// tensor argument
    Call { name: String, args: Vec<ExprId> },

    /// An intrinsic call with a known kind tag
    Intrin { kind: IntrinKind, args: Vec<ExprId> },

    /// A binary operation
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
}

impl Expr {
    /// Returns true if this is a `Var` node
    pub const fn is_var(&self) -> bool {
        matches!(self.kind, ExprKind::Var { .. })
    }

    /// Returns true if this is a `Tensor` node
    pub const fn is_tensor(&self) -> bool {
        matches!(self.kind, ExprKind::Tensor { .. })
    }

    /// Returns true if this is an `Indexing` node
    pub const fn is_indexing(&self) -> bool {
        matches!(self.kind, ExprKind::Indexing { .. })
    }

    /// Returns the name of a `Var` or `Tensor` node
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Var { name } | ExprKind::Tensor { name } => Some(name),
            _ => None,
        }
    }
}

/// Literal constant values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    /// Returns the integer value if this is an integer literal
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean value if this is a boolean literal
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Intrinsic kinds.
///
/// Only `Broadcast` is semantically interesting to the optimization passes:
/// its first argument, when it is a scalar element access, pins that access
/// to stay a memory load so the downstream code generator can fuse the
/// load-and-splat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinKind {
    Broadcast,
    Min,
    Max,
}

impl std::fmt::Display for IntrinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// Binary operators supported in the kernel IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // Comparison
    Eq,
    Neq,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Returns true if this operator yields a boolean regardless of its
    /// operand types
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Less | Self::Greater | Self::LessEqual | Self::GreaterEqual
        )
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::Eq => write!(f, "=="),
            Self::Neq => write!(f, "!="),
            Self::Less => write!(f, "<"),
            Self::Greater => write!(f, ">"),
            Self::LessEqual => write!(f, "<="),
            Self::GreaterEqual => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
        }
    }
}
