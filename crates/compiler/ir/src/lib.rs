//! # Tensora Tensor-Kernel IR
//!
//! This crate defines the tree intermediate representation used by the
//! Tensora kernel compiler. A kernel function body is a tree of statements
//! (blocks, loops, branches, assignments) over expressions (scalar variables,
//! tensor element accesses, calls, intrinsics), all stored in a per-function
//! arena and referenced by id.
//!
//! ## Design Principles
//!
//! 1. **Arena storage**: nodes live in `IndexVec` arenas inside [`IrArena`];
//!    an `ExprId`/`StmtId` *is* the node's identity. Sharing a sub-tree means
//!    reusing its id.
//! 2. **Immutable-by-convention trees**: transformation passes build new
//!    nodes and return new root ids; unchanged sub-trees are shared by id.
//!    The single sanctioned in-place mutation is appending to an already
//!    emitted statement sequence (see [`IrArena::append_to_stmts`]), which
//!    the index-to-var rewrite uses to place writebacks.
//! 3. **Two walkers**: an observing walker ([`IrViewer`]) for analyses that
//!    only annotate, and a rebuilding walker ([`IrRewriter`]) for transforms
//!    that produce new IR.
//!
//! ## Vector accesses
//!
//! Element accesses carry a lane count in their [`DataType`]; `lanes > 1`
//! denotes a vector load/store, optionally predicated by a mask expression.

pub use alias::{
    get_alias_info, get_or_create_alias_info, make_alias_group, AliasIdentityKey, AliasSet,
    TensorAliasIdentity,
};
pub use arena::IrArena;
pub use attrs::{attr_keys, AttrValue, Attrs};
pub use comparer::IrComparer;
pub use expr::{BinaryOp, Expr, ExprKind, IntrinKind, Literal};
pub use function::Function;
pub use stmt::{Stmt, StmtKind};
pub use types::{DataType, ElemType};
pub use visitor::{rebuild_expr, rebuild_stmt, walk_expr, walk_stmt, IrRewriter, IrViewer};

pub mod alias;
pub mod arena;
pub mod attrs;
pub mod comparer;
pub mod expr;
pub mod function;
pub mod pretty_print;
pub mod stmt;
pub mod types;
pub mod visitor;

// --- Core Identifiers ---

index_vec::define_index_type! {
    /// Unique identifier for an expression node within an [`IrArena`]
    pub struct ExprId = usize;
}

index_vec::define_index_type! {
    /// Unique identifier for a statement node within an [`IrArena`]
    pub struct StmtId = usize;
}

// --- Error Types ---

/// Fatal IR-integrity errors.
///
/// Both variants indicate a malformed input IR or a broken invariant of a
/// collaborating component; there are no recoverable errors. A pass either
/// completes and returns transformed IR or aborts with one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// An indexing expression whose base is not a tensor
    #[error("indexing must be based on a tensor, found `{found}`")]
    IndexingNotOnTensor {
        /// Pretty-printed offending base expression
        found: String,
    },

    /// An alias-identity weak reference failed to upgrade; the alias registry
    /// is expected to outlive every tensor in the function
    #[error("dangling alias identity in the alias group of tensor `{tensor}`")]
    DanglingAliasIdentity {
        /// Name of the tensor whose group held the dead reference
        tensor: String,
    },
}

/// Result type for IR operations
pub type IrResult<T> = Result<T, IrError>;

/// Helper function to create indentation
pub(crate) fn indent_str(level: usize) -> String {
    "  ".repeat(level)
}
