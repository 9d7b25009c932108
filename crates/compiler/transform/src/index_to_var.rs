//! # Index-to-Var Rewrite
//!
//! The second of the two collaborating passes. Walking the function a second
//! time with the written-set annotations at hand, the rewrite maintains a
//! table of live **caches** (scalar temporaries mirroring one tensor element
//! each) and emits a semantically equivalent function in which
//! matched loads and stores go through those temporaries, with explicit
//! writeback stores appended at eviction points.
//!
//! ## Cache lifecycle
//!
//! A cache is created the first time an access with traceable indices is
//! seen, lives in at most one table slot per tensor, and is evicted when:
//!
//! - the same tensor is accessed with a different index, lane count or mask,
//! - a scalar variable its indices depend on is assigned,
//! - a write occurs through an aliasing tensor, an address of an element is
//!   taken, or an opaque call receives an aliasing tensor argument,
//! - its defining scope ends,
//! - a write hit crosses a scope that writes the tensor (freshness policy).
//!
//! Eviction of a *dirty* cache (one holding a value newer than memory)
//! appends exactly one writeback store to the statement sequence holding the
//! cache's last write, so every load and store in the output observes the
//! value it observed in the input.

use index_vec::IndexVec;
use rustc_hash::{FxHashMap, FxHashSet};
use tensora_compiler_ir::{
    attr_keys, rebuild_expr, rebuild_stmt, walk_expr, ExprId, ExprKind, Function, IrArena,
    IrComparer, IrError, IrRewriter, IrResult, IrViewer, StmtId, StmtKind,
};

use crate::analysis::{AnalysisResults, WrittenSetAnalysis};
use crate::IrPass;

index_vec::define_index_type! {
    /// Identifier of a cache entry within one rewrite invocation
    struct CacheId = usize;
}

/// One scalar temporary mirroring a tensor element.
///
/// Entries are owned by an arena and referenced by id from the cache table,
/// the dependency map and the scope stack; invalidation clears `tensor`, so
/// stale ids held by the dependency map are inert.
#[derive(Debug)]
struct CacheEntry {
    /// The cached tensor; `None` once the entry is invalidated
    tensor: Option<ExprId>,
    /// The index expressions substituted into the emitted IR; the writeback
    /// recomputes the address from exactly these
    indices: Vec<ExprId>,
    /// Access width
    lanes: u32,
    /// Optional access predicate
    mask: Option<ExprId>,
    /// The scalar temporary holding the cached value
    var: ExprId,
    /// Sequence holding the latest store into `var`; `None` while the cache
    /// is clean, in which case eviction emits no writeback
    last_write: Option<StmtId>,
}

impl CacheEntry {
    const fn is_valid(&self) -> bool {
        self.tensor.is_some()
    }
}

/// One lexical scope of the walk
#[derive(Debug)]
struct ScopeFrame {
    /// The original `Stmts` node, for written-set lookups
    written_at: StmtId,
    /// Caches created in this scope, evicted when the scope ends
    created_here: Vec<CacheId>,
}

/// Collects the scalar variables an index vector depends on.
///
/// An indexing or call inside the indices makes the access *untraceable*:
/// its runtime address may change in ways variable tracking cannot see, so
/// no cache may be created for it.
struct VarDependencyFinder<'a> {
    vars: &'a mut FxHashSet<ExprId>,
    traceable: bool,
}

impl VarDependencyFinder<'_> {
    /// Scans `indices`, filling `vars`; returns false if the access is
    /// untraceable
    fn find(arena: &IrArena, indices: &[ExprId], vars: &mut FxHashSet<ExprId>) -> bool {
        let mut finder = VarDependencyFinder {
            vars,
            traceable: true,
        };
        for idx in indices {
            finder.view_expr(arena, *idx);
        }
        finder.traceable
    }
}

impl IrViewer for VarDependencyFinder<'_> {
    fn view_expr(&mut self, arena: &IrArena, expr: ExprId) {
        match &arena.expr(expr).kind {
            ExprKind::Var { .. } => {
                self.vars.insert(expr);
            }
            ExprKind::Call { .. } => {
                log::info!("call in index: {}", arena.pretty_expr(expr));
                self.traceable = false;
            }
            ExprKind::Indexing { .. } => {
                log::info!("indexing in index: {}", arena.pretty_expr(expr));
                self.traceable = false;
            }
            _ => walk_expr(self, arena, expr),
        }
    }
}

/// The rewrite walker; one instance per function
pub struct IndexToVarRewrite<'a> {
    analysis: &'a AnalysisResults,
    caches: IndexVec<CacheId, CacheEntry>,
    /// Tensor identity -> its unique live cache
    cache_table: FxHashMap<ExprId, CacheId>,
    /// Index variable identity -> caches whose indices read it
    dependency_map: FxHashMap<ExprId, Vec<CacheId>>,
    scopes: Vec<ScopeFrame>,
    /// In-progress statement vectors, innermost last; declarations and
    /// priming loads are appended to the innermost one
    seqs: Vec<Vec<StmtId>>,
    for_depth: u32,
    var_count: u32,
}

impl<'a> IndexToVarRewrite<'a> {
    /// Creates a rewrite over the given analysis results
    pub fn new(analysis: &'a AnalysisResults) -> Self {
        Self {
            analysis,
            caches: IndexVec::new(),
            cache_table: FxHashMap::default(),
            dependency_map: FxHashMap::default(),
            scopes: Vec::new(),
            seqs: Vec::new(),
            for_depth: 0,
            var_count: 0,
        }
    }

    /// Evicts a cache: writes the scalar back to memory if the cache is
    /// dirty, then removes the entry from the table and marks it invalid
    fn invalidate(&mut self, arena: &mut IrArena, cache: CacheId) {
        let Some(tensor) = self.caches[cache].tensor else {
            return;
        };
        if let Some(last_write) = self.caches[cache].last_write {
            let indices = self.caches[cache].indices.clone();
            let lanes = self.caches[cache].lanes;
            let mask = self.caches[cache].mask;
            let var = self.caches[cache].var;
            let dst = arena.indexing_vector(tensor, indices, lanes, mask);
            let writeback = arena.assign(dst, var);
            arena.append_to_stmts(last_write, writeback);
            log::info!("write back {}", arena.pretty_expr(dst));
        }
        self.cache_table.remove(&tensor);
        self.caches[cache].tensor = None;
    }

    /// Evicts the live cache of `tensor`, if any; returns true if one
    /// existed
    fn invalidate_if_cached(&mut self, arena: &mut IrArena, tensor: ExprId) -> bool {
        if let Some(&cache) = self.cache_table.get(&tensor) {
            self.invalidate(arena, cache);
            true
        } else {
            false
        }
    }

    /// Evicts the caches of every tensor aliasing `tensor` (and of `tensor`
    /// itself when `invalidate_self`); returns true if anything was evicted
    fn invalidate_alias_group(
        &mut self,
        arena: &mut IrArena,
        tensor: ExprId,
        invalidate_self: bool,
    ) -> IrResult<bool> {
        let mut evicted = false;
        let alias = self.analysis.usage(tensor).and_then(|u| u.alias.clone());
        if let Some(alias) = alias {
            if !alias.has_no_alias() {
                for peer in alias.peers() {
                    let peer = peer.upgrade().ok_or_else(|| IrError::DanglingAliasIdentity {
                        tensor: arena.pretty_expr(tensor),
                    })?;
                    if let Some(other) = self.analysis.tensor_for_alias(&peer) {
                        if other != tensor {
                            evicted |= self.invalidate_if_cached(arena, other);
                        }
                    }
                }
            }
        }
        if invalidate_self {
            evicted |= self.invalidate_if_cached(arena, tensor);
        }
        Ok(evicted)
    }

    /// True if `access` matches `cache` exactly: equal lanes, structurally
    /// equal index expressions, structurally equal masks
    fn entry_matches(&self, arena: &IrArena, cache: CacheId, access: ExprId) -> bool {
        let entry = &self.caches[cache];
        let ExprKind::Indexing {
            ref indices, mask, ..
        } = arena.expr(access).kind
        else {
            return false;
        };
        if entry.lanes != arena.expr(access).ty.lanes || entry.indices.len() != indices.len() {
            return false;
        }
        let mut cmp = IrComparer::new(false);
        if !indices
            .iter()
            .zip(entry.indices.iter())
            .all(|(a, b)| cmp.compare_expr(arena, *a, arena, *b))
        {
            return false;
        }
        match (mask, entry.mask) {
            (None, None) => true,
            (Some(a), Some(b)) => cmp.compare_expr(arena, a, arena, b),
            _ => false,
        }
    }

    /// Creates a cache for `access` (an already rewritten indexing): emits
    /// the temporary's declaration and, for reads, a priming load at the
    /// current insertion point, then registers the entry. Declines and
    /// returns the access unchanged when the indices are untraceable, when a
    /// scalar load would disturb a broadcast pattern, or when there is no
    /// enclosing scope to host the declaration.
    fn make_cache(
        &mut self,
        arena: &mut IrArena,
        access: ExprId,
        is_read: bool,
    ) -> IrResult<(ExprId, Option<CacheId>)> {
        let ExprKind::Indexing {
            ptr,
            ref indices,
            mask,
        } = arena.expr(access).kind
        else {
            return Ok((access, None));
        };
        let indices = indices.clone();

        let mut deps = FxHashSet::default();
        if !VarDependencyFinder::find(arena, &indices, &mut deps) {
            log::info!(
                "decline to cache {}: untraceable indices",
                arena.pretty_expr(access)
            );
            return Ok((access, None));
        }

        let ty = arena.expr(access).ty;
        if is_read
            && ty.is_scalar()
            && self
                .analysis
                .usage(ptr)
                .map_or(false, |u| u.used_in_broadcast)
        {
            log::info!(
                "decline to cache {}: scalar load of a broadcast source",
                arena.pretty_expr(access)
            );
            return Ok((access, None));
        }

        if self.scopes.is_empty() || self.seqs.is_empty() {
            return Ok((access, None));
        }

        let name = format!("__cached_{}", self.var_count);
        self.var_count += 1;
        let var = arena.var(&name, ty);
        let def = arena.var_def(var);
        if let Some(seq) = self.seqs.last_mut() {
            seq.push(def);
        }
        if is_read {
            let prime = arena.assign(var, access);
            if let Some(seq) = self.seqs.last_mut() {
                seq.push(prime);
            }
        }

        let cache = self.caches.push(CacheEntry {
            tensor: Some(ptr),
            indices,
            lanes: ty.lanes,
            mask,
            var,
            last_write: None,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.created_here.push(cache);
        }
        for dep in deps {
            self.dependency_map.entry(dep).or_default().push(cache);
        }
        self.cache_table.insert(ptr, cache);
        log::info!("cache {} in {}", arena.pretty_expr(access), name);
        Ok((var, Some(cache)))
    }

    /// Handles one element access in read or write position: rewrites its
    /// children, applies the freshness policy against the cache table and
    /// either substitutes the cached temporary or installs a new cache
    fn rewrite_access(
        &mut self,
        arena: &mut IrArena,
        access: ExprId,
        is_read: bool,
    ) -> IrResult<(ExprId, Option<CacheId>)> {
        // Rewriting the indices first may itself replace nested loads with
        // cached temporaries, turning an untraceable access traceable.
        let access = rebuild_expr(self, arena, access)?;
        let ExprKind::Indexing { ptr, .. } = arena.expr(access).kind else {
            return Ok((access, None));
        };
        if !arena.expr(ptr).is_tensor() {
            return Err(IrError::IndexingNotOnTensor {
                found: arena.pretty_expr(ptr),
            });
        }
        if arena
            .expr(ptr)
            .attrs
            .get_bool_or(attr_keys::MUST_TENSOR2VAR, false)
        {
            log::info!(
                "skip {}: tensor is claimed by tensor-to-var",
                arena.pretty_expr(access)
            );
            return Ok((access, None));
        }
        if !is_read && self.invalidate_alias_group(arena, ptr, false)? {
            log::info!("alias group flushed for store to {}", arena.pretty_expr(ptr));
        }
        if let Some(&cache) = self.cache_table.get(&ptr) {
            if self.entry_matches(arena, cache, access) {
                let created_here = self
                    .scopes
                    .last()
                    .map_or(false, |s| s.created_here.contains(&cache));
                let written_here = self
                    .scopes
                    .last()
                    .map_or(false, |s| self.analysis.writes(s.written_at, ptr));
                // A matching cache may be substituted when no later loop
                // iteration or sibling scope can have updated the element
                // behind its back: reads outside any loop, hits on a cache
                // born in this very scope, or scopes that never write the
                // tensor at all.
                if (is_read && self.for_depth == 0) || created_here || !written_here {
                    return Ok((self.caches[cache].var, Some(cache)));
                }
                log::info!(
                    "evict {}: cross-scope write to a cached tensor",
                    arena.pretty_expr(access)
                );
            } else {
                log::info!("evict {}: unmatched index", arena.pretty_expr(access));
            }
            self.invalidate(arena, cache);
        }
        self.make_cache(arena, access, is_read)
    }

    fn rewrite_call(&mut self, arena: &mut IrArena, expr: ExprId) -> IrResult<ExprId> {
        let rewritten = rebuild_expr(self, arena, expr)?;
        let tensor_args: Vec<ExprId> = match &arena.expr(rewritten).kind {
            ExprKind::Call { args, .. } => args
                .iter()
                .copied()
                .filter(|arg| arena.expr(*arg).is_tensor())
                .collect(),
            _ => Vec::new(),
        };
        for arg in tensor_args {
            if self.invalidate_alias_group(arena, arg, true)? {
                log::info!("evict due to call: {}", arena.pretty_expr(rewritten));
            }
        }
        Ok(rewritten)
    }

    /// Address-of rewrites the indices of its base access without installing
    /// a cache for it, then flushes the whole alias group: the escaping
    /// pointer exposes the tensor to unknown mutation
    fn rewrite_tensor_ptr(
        &mut self,
        arena: &mut IrArena,
        expr: ExprId,
        base: ExprId,
    ) -> IrResult<ExprId> {
        let new_base = rebuild_expr(self, arena, base)?;
        if let ExprKind::Indexing { ptr, .. } = arena.expr(new_base).kind {
            if !arena.expr(ptr).is_tensor() {
                return Err(IrError::IndexingNotOnTensor {
                    found: arena.pretty_expr(ptr),
                });
            }
            if self.invalidate_alias_group(arena, ptr, true)? {
                log::info!("evict due to address-of: {}", arena.pretty_expr(expr));
            }
        }
        if new_base == base {
            Ok(expr)
        } else {
            let ty = arena.expr(expr).ty;
            let attrs = arena.expr(expr).attrs.clone();
            Ok(arena.push_expr_with_attrs(ExprKind::TensorPtr { base: new_base }, ty, attrs))
        }
    }

    fn rewrite_assign(
        &mut self,
        arena: &mut IrArena,
        stmt: StmtId,
        lhs: ExprId,
        rhs: ExprId,
    ) -> IrResult<StmtId> {
        if arena.expr(lhs).is_indexing() {
            if arena.expr(lhs).attrs.get_bool_or(attr_keys::NO_INDEX2VAR, false) {
                // The store stays untouched, but it may clobber memory that a
                // live cache mirrors; flush the tensor and its alias group.
                if let ExprKind::Indexing { ptr, .. } = arena.expr(lhs).kind {
                    if arena.expr(ptr).is_tensor() && self.invalidate_alias_group(arena, ptr, true)?
                    {
                        log::info!("evict due to opted-out store: {}", arena.pretty_expr(lhs));
                    }
                }
                let new_rhs = self.rewrite_expr(arena, rhs)?;
                return Ok(if new_rhs != rhs {
                    arena.assign(lhs, new_rhs)
                } else {
                    stmt
                });
            }
            let new_rhs = self.rewrite_expr(arena, rhs)?;
            let (new_lhs, cache) = self.rewrite_access(arena, lhs, false)?;
            if let Some(cache) = cache {
                // The store lands in the temporary; its enclosing sequence
                // becomes the cache's writeback point, superseding any prior
                // one while the entry stays live.
                let assign = arena.assign(new_lhs, new_rhs);
                let block = arena.stmts(vec![assign]);
                self.caches[cache].last_write = Some(block);
                Ok(block)
            } else if new_lhs != lhs || new_rhs != rhs {
                Ok(arena.assign(new_lhs, new_rhs))
            } else {
                Ok(stmt)
            }
        } else if arena.expr(lhs).is_var() {
            let new_rhs = self.rewrite_expr(arena, rhs)?;
            // The variable's value changes now: every cache whose indices
            // read it holds a stale address and must be flushed. The RHS was
            // rewritten first, so a cache created inside it is flushed here
            // as well.
            if let Some(deps) = self.dependency_map.remove(&lhs) {
                for cache in deps {
                    if self.caches[cache].is_valid() {
                        log::info!(
                            "evict: index variable {} changes",
                            arena.pretty_expr(lhs)
                        );
                        self.invalidate(arena, cache);
                    }
                }
            }
            Ok(if new_rhs != rhs {
                arena.assign(lhs, new_rhs)
            } else {
                stmt
            })
        } else {
            rebuild_stmt(self, arena, stmt)
        }
    }

    /// Walks one statement sequence: a fresh scope frame and insertion
    /// vector, children in order, then eviction of every cache the scope
    /// created
    fn rewrite_scope(&mut self, arena: &mut IrArena, stmt: StmtId) -> IrResult<StmtId> {
        let seq = match &arena.stmt(stmt).kind {
            StmtKind::Stmts { seq } => seq.clone(),
            _ => return rebuild_stmt(self, arena, stmt),
        };
        self.seqs.push(Vec::with_capacity(seq.len()));
        self.scopes.push(ScopeFrame {
            written_at: stmt,
            created_here: Vec::new(),
        });

        let mut changed = false;
        for child in &seq {
            let new_child = self.rewrite_stmt(arena, *child)?;
            changed |= new_child != *child;
            if let Some(current) = self.seqs.last_mut() {
                current.push(new_child);
            }
        }

        if let Some(frame) = self.scopes.pop() {
            for cache in frame.created_here {
                if self.caches[cache].is_valid() {
                    log::info!("evict at end of scope");
                    self.invalidate(arena, cache);
                }
            }
        }
        let new_seq = self.seqs.pop().unwrap_or_default();
        changed |= new_seq.len() != seq.len();
        Ok(if changed { arena.stmts(new_seq) } else { stmt })
    }
}

impl IrRewriter for IndexToVarRewrite<'_> {
    fn rewrite_expr(&mut self, arena: &mut IrArena, expr: ExprId) -> IrResult<ExprId> {
        if arena.expr(expr).is_indexing() {
            if arena
                .expr(expr)
                .attrs
                .get_bool_or(attr_keys::NO_INDEX2VAR, false)
            {
                log::info!("skip {}: access opted out", arena.pretty_expr(expr));
                return Ok(expr);
            }
            let (rewritten, _) = self.rewrite_access(arena, expr, true)?;
            return Ok(rewritten);
        }
        match arena.expr(expr).kind {
            ExprKind::Call { .. } => self.rewrite_call(arena, expr),
            ExprKind::TensorPtr { base } => self.rewrite_tensor_ptr(arena, expr, base),
            _ => rebuild_expr(self, arena, expr),
        }
    }

    fn rewrite_stmt(&mut self, arena: &mut IrArena, stmt: StmtId) -> IrResult<StmtId> {
        match arena.stmt(stmt).kind {
            StmtKind::Assign { lhs, rhs } => self.rewrite_assign(arena, stmt, lhs, rhs),
            StmtKind::Stmts { .. } => self.rewrite_scope(arena, stmt),
            StmtKind::ForLoop { .. } => {
                self.for_depth += 1;
                let result = rebuild_stmt(self, arena, stmt);
                self.for_depth -= 1;
                result
            }
            _ => rebuild_stmt(self, arena, stmt),
        }
    }
}

/// Runs the index-to-var transform over a function body: a fresh analysis,
/// then the rewrite
pub fn index_to_var_body(arena: &mut IrArena, body: StmtId) -> IrResult<StmtId> {
    let analysis = WrittenSetAnalysis::run(arena, body)?;
    let mut rewrite = IndexToVarRewrite::new(&analysis);
    rewrite.rewrite_stmt(arena, body)
}

/// Runs the index-to-var transform over a whole function
pub fn index_to_var(arena: &mut IrArena, func: &Function) -> IrResult<Function> {
    let body = index_to_var_body(arena, func.body)?;
    Ok(func.with_body(body))
}

/// [`IrPass`] wrapper around [`index_to_var_body`]
#[derive(Debug, Default)]
pub struct IndexToVarPass;

impl IndexToVarPass {
    /// Creates the pass
    pub const fn new() -> Self {
        Self
    }
}

impl IrPass for IndexToVarPass {
    fn run(&mut self, arena: &mut IrArena, body: StmtId) -> IrResult<StmtId> {
        index_to_var_body(arena, body)
    }

    fn name(&self) -> &'static str {
        "IndexToVar"
    }
}

#[cfg(test)]
#[path = "index_to_var_tests.rs"]
mod tests;
