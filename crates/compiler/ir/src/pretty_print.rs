//! # Pretty Printing
//!
//! A stable, human-readable rendering of the tree IR, used by diagnostics
//! and tests. Expressions render on one line; statements render with
//! two-space indentation per block level.

use crate::expr::ExprKind;
use crate::function::Function;
use crate::stmt::StmtKind;
use crate::{indent_str, ExprId, IrArena, StmtId};

impl IrArena {
    /// Renders one expression on a single line
    pub fn pretty_expr(&self, expr: ExprId) -> String {
        match &self.expr(expr).kind {
            ExprKind::Const(lit) => lit.to_string(),
            ExprKind::Var { name } | ExprKind::Tensor { name } => name.clone(),
            ExprKind::Indexing { ptr, indices, mask } => {
                let idx = indices
                    .iter()
                    .map(|i| self.pretty_expr(*i))
                    .collect::<Vec<_>>()
                    .join(", ");
                let lanes = self.expr(expr).ty.lanes;
                let mut out = format!("{}[{}", self.pretty_expr(*ptr), idx);
                if lanes > 1 {
                    out.push_str(&format!(" @{lanes}"));
                }
                if let Some(mask) = mask {
                    out.push_str(&format!(" ?{}", self.pretty_expr(*mask)));
                }
                out.push(']');
                out
            }
            ExprKind::TensorPtr { base } => format!("&{}", self.pretty_expr(*base)),
            ExprKind::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.pretty_expr(*a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{name}({args})")
            }
            ExprKind::Intrin { kind, args } => {
                let args = args
                    .iter()
                    .map(|a| self.pretty_expr(*a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{kind}({args})")
            }
            ExprKind::Binary { op, lhs, rhs } => format!(
                "({} {} {})",
                self.pretty_expr(*lhs),
                op,
                self.pretty_expr(*rhs)
            ),
        }
    }

    /// Renders one statement (and its body, for blocks) at the given indent
    /// level
    pub fn pretty_stmt(&self, stmt: StmtId, indent: usize) -> String {
        let pad = indent_str(indent);
        match &self.stmt(stmt).kind {
            StmtKind::Assign { lhs, rhs } => {
                format!(
                    "{pad}{} = {}",
                    self.pretty_expr(*lhs),
                    self.pretty_expr(*rhs)
                )
            }
            StmtKind::VarDef { var, init } => {
                let ty = self.expr(*var).ty;
                let mut out = format!("{pad}var {}: {}", self.pretty_expr(*var), ty);
                if let Some(init) = init {
                    out.push_str(&format!(" = {}", self.pretty_expr(*init)));
                }
                out
            }
            StmtKind::Evaluate { expr } => format!("{pad}{}", self.pretty_expr(*expr)),
            StmtKind::Stmts { seq } => {
                let mut out = format!("{pad}{{\n");
                for child in seq {
                    out.push_str(&self.pretty_stmt(*child, indent + 1));
                    out.push('\n');
                }
                out.push_str(&format!("{pad}}}"));
                out
            }
            StmtKind::ForLoop {
                var,
                begin,
                end,
                step,
                body,
            } => {
                format!(
                    "{pad}for {} in {}..{} step {} {}",
                    self.pretty_expr(*var),
                    self.pretty_expr(*begin),
                    self.pretty_expr(*end),
                    self.pretty_expr(*step),
                    self.pretty_stmt(*body, indent).trim_start()
                )
            }
            StmtKind::IfElse {
                condition,
                then_case,
                else_case,
            } => {
                let mut out = format!(
                    "{pad}if {} {}",
                    self.pretty_expr(*condition),
                    self.pretty_stmt(*then_case, indent).trim_start()
                );
                if let Some(else_case) = else_case {
                    out.push_str(&format!(
                        " else {}",
                        self.pretty_stmt(*else_case, indent).trim_start()
                    ));
                }
                out
            }
        }
    }

    /// Renders a whole function
    pub fn pretty_function(&self, func: &Function) -> String {
        let params = func
            .params
            .iter()
            .map(|p| format!("{}: {}", self.pretty_expr(*p), self.expr(*p).ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "fn {}({}) {}",
            func.name,
            params,
            self.pretty_stmt(func.body, 0)
        )
    }
}
