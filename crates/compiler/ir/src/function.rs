//! # IR Functions
//!
//! A function is a name, a parameter list (tensors and scalar variables) and
//! a body, all referring into one [`IrArena`](crate::IrArena).

use crate::{ExprId, StmtId};

/// One kernel function
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Parameters; each is a `Tensor` or `Var` expression
    pub params: Vec<ExprId>,
    /// The body; a `Stmts` node
    pub body: StmtId,
}

impl Function {
    /// Creates a function
    pub fn new(name: impl Into<String>, params: Vec<ExprId>, body: StmtId) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }

    /// Returns a copy of this function with a different body
    pub fn with_body(&self, body: StmtId) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            body,
        }
    }
}
