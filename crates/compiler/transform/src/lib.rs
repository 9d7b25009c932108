//! # Tensora IR Transformation Passes
//!
//! This crate implements the transformation passes that run over the tree IR
//! of one kernel function. The centerpiece is the **index-to-var** rewrite
//! ([`index_to_var`]): it turns repeated accesses to the same tensor element
//! within a block into uses of a scalar temporary, hoisting loads and
//! delaying stores so the downstream code generator can keep hot values in
//! registers.
//!
//! Passes consume a shared-immutable input tree and produce a new root that
//! shares unchanged sub-trees with the input. The contract for every pass is
//! semantic equivalence: executing the output on any initial state yields a
//! final state indistinguishable from executing the input, projected onto
//! the input's tensors.

pub use analysis::{AnalysisResults, TensorUsage, WrittenSetAnalysis};
pub use index_to_var::{index_to_var, index_to_var_body, IndexToVarPass};
pub use validate::Validation;

pub mod analysis;
pub mod index_to_var;
pub mod validate;

use tensora_compiler_ir::{IrArena, IrResult, StmtId};

/// A transformation pass over one function body.
///
/// Unlike an in-place mutation pass, a tree pass returns the id of the
/// (possibly new) root statement; an unchanged tree comes back as the input
/// id.
pub trait IrPass {
    /// Applies this pass to a function body, returning the new root
    fn run(&mut self, arena: &mut IrArena, body: StmtId) -> IrResult<StmtId>;

    /// The name of this pass for diagnostics
    fn name(&self) -> &'static str;
}

/// A pass manager that runs multiple passes in sequence
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn IrPass>>,
}

impl PassManager {
    /// Creates an empty pass manager
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Adds a pass to the manager
    pub fn add_pass<P: IrPass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Runs all passes in order, threading the body through them
    pub fn run(&mut self, arena: &mut IrArena, body: StmtId) -> IrResult<StmtId> {
        let mut current = body;
        for pass in &mut self.passes {
            let next = pass.run(arena, current)?;
            if next != current {
                log::debug!("pass '{}' changed the function body", pass.name());
            }
            current = next;
        }
        Ok(current)
    }

    /// The default optimization pipeline: validate, cache element accesses
    /// in scalars, validate again
    pub fn optimize_pipeline() -> Self {
        Self::new()
            .add_pass(Validation::new())
            .add_pass(IndexToVarPass::new())
            .add_pass(Validation::new())
    }
}
