use tensora_compiler_ir::{
    attr_keys, get_or_create_alias_info, make_alias_group, AttrValue, BinaryOp, DataType, ElemType,
    ExprId, IntrinKind, IrArena, IrError, StmtId, StmtKind, TensorAliasIdentity,
};

use super::*;
use crate::PassManager;

fn seq_of(arena: &IrArena, stmt: StmtId) -> Vec<StmtId> {
    arena
        .stmt(stmt)
        .as_seq()
        .expect("expected a statement sequence")
        .to_vec()
}

fn assign_parts(arena: &IrArena, stmt: StmtId) -> (ExprId, ExprId) {
    match arena.stmt(stmt).kind {
        StmtKind::Assign { lhs, rhs } => (lhs, rhs),
        _ => panic!("expected an assignment"),
    }
}

fn defined_var(arena: &IrArena, stmt: StmtId) -> ExprId {
    match arena.stmt(stmt).kind {
        StmtKind::VarDef { var, .. } => var,
        _ => panic!("expected a variable definition"),
    }
}

/// Counts assignments whose left-hand side is an element access (i.e. real
/// stores) in the whole tree under `stmt`.
fn count_stores(arena: &IrArena, stmt: StmtId) -> usize {
    match &arena.stmt(stmt).kind {
        StmtKind::Assign { lhs, .. } => usize::from(arena.expr(*lhs).is_indexing()),
        StmtKind::Stmts { seq } => seq.iter().map(|s| count_stores(arena, *s)).sum(),
        StmtKind::ForLoop { body, .. } => count_stores(arena, *body),
        StmtKind::IfElse {
            then_case,
            else_case,
            ..
        } => {
            count_stores(arena, *then_case)
                + else_case.map_or(0, |e| count_stores(arena, e))
        }
        _ => 0,
    }
}

// --- Scenario 1: straight-line reuse ---

#[test]
fn test_straight_line_reuse() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let i = arena.var("i", DataType::s32());
    let one = arena.const_f32(1.0);
    let two = arena.const_f32(2.0);
    let store1 = {
        let lhs = arena.indexing(a, vec![i]);
        arena.assign(lhs, one)
    };
    let store2 = {
        let lhs = arena.indexing(a, vec![i]);
        let load = arena.indexing(a, vec![i]);
        let rhs = arena.binary(BinaryOp::Add, load, two);
        arena.assign(lhs, rhs)
    };
    let body = arena.stmts(vec![store1, store2]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_ne!(result, body);

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
      }
      {
        __cached_0 = (__cached_0 + 2)
        A[i] = __cached_0
      }
    }
    "###);

    // Two input stores collapse into one writeback at end of block.
    assert_eq!(count_stores(&arena, result), 1);

    let seq = seq_of(&arena, result);
    assert_eq!(seq.len(), 3);
    let cached = defined_var(&arena, seq[0]);
    assert_eq!(arena.expr(cached).ty, DataType::f32());

    let last_block = seq_of(&arena, seq[2]);
    let (wb_lhs, wb_rhs) = assign_parts(&arena, last_block[1]);
    assert!(arena.expr(wb_lhs).is_indexing());
    assert_eq!(wb_rhs, cached);
}

// --- Scenario 2: index change invalidates ---

#[test]
fn test_index_change_invalidates() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let i = arena.var("i", DataType::s32());
    let one = arena.const_f32(1.0);
    let two = arena.const_f32(2.0);
    let step = arena.const_int(1);
    let store1 = {
        let lhs = arena.indexing(a, vec![i]);
        arena.assign(lhs, one)
    };
    let bump = {
        let rhs = arena.binary(BinaryOp::Add, i, step);
        arena.assign(i, rhs)
    };
    let store2 = {
        let lhs = arena.indexing(a, vec![i]);
        arena.assign(lhs, two)
    };
    let body = arena.stmts(vec![store1, bump, store2]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
        A[i] = __cached_0
      }
      i = (i + 1)
      var __cached_1: f32
      {
        __cached_1 = 2
        A[i] = __cached_1
      }
    }
    "###);

    // The first writeback lands before the mutation of `i`, the second at
    // end of block.
    let seq = seq_of(&arena, result);
    assert_eq!(seq.len(), 5);
    let first_block = seq_of(&arena, seq[1]);
    assert_eq!(first_block.len(), 2);
    let (wb_lhs, _) = assign_parts(&arena, first_block[1]);
    assert!(arena.expr(wb_lhs).is_indexing());
    assert_eq!(count_stores(&arena, result), 2);
}

// --- Scenario 3: read-only cache inside a loop ---

#[test]
fn test_loop_read_only_cache() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let k = arena.var("k", DataType::s32());
    let x = arena.var("x", DataType::f32());
    let zero = arena.const_int(0);
    let n = arena.var("n", DataType::s32());
    let one = arena.const_int(1);
    let acc = {
        let load = arena.indexing(a, vec![zero]);
        let rhs = arena.binary(BinaryOp::Add, x, load);
        arena.assign(x, rhs)
    };
    let loop_body = arena.stmts(vec![acc]);
    let loop_ = arena.for_loop(k, zero, n, one, loop_body);
    let body = arena.stmts(vec![loop_]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_ne!(result, body);

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      for k in 0..n step 1 {
        var __cached_0: f32
        __cached_0 = A[0]
        x = (x + __cached_0)
      }
    }
    "###);

    // The load is cached inside the body; no writeback anywhere.
    assert_eq!(count_stores(&arena, result), 0);
}

// --- Scenario 4: loop with a write ---

#[test]
fn test_loop_write_flushes_each_iteration() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::s32());
    let k = arena.var("k", DataType::s32());
    let zero = arena.const_int(0);
    let n = arena.var("n", DataType::s32());
    let one = arena.const_int(1);
    let update = {
        let lhs = arena.indexing(a, vec![zero]);
        let load = arena.indexing(a, vec![zero]);
        let rhs = arena.binary(BinaryOp::Add, load, k);
        arena.assign(lhs, rhs)
    };
    let loop_body = arena.stmts(vec![update]);
    let loop_ = arena.for_loop(k, zero, n, one, loop_body);
    let body = arena.stmts(vec![loop_]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      for k in 0..n step 1 {
        var __cached_0: s32
        __cached_0 = A[0]
        {
          __cached_0 = (__cached_0 + k)
          A[0] = __cached_0
        }
      }
    }
    "###);

    // The cache is created anew each iteration and written back at the end
    // of the body; nothing escapes the loop.
    let root_seq = seq_of(&arena, result);
    assert_eq!(root_seq.len(), 1);
    assert_eq!(count_stores(&arena, result), 1);
}

// --- Scenario 5: branch locality ---

#[test]
fn test_branch_local_caches() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let c = arena.var("c", DataType::bool_());
    let zero = arena.const_int(0);
    let one_i = arena.const_int(1);
    let one = arena.const_f32(1.0);

    let store = {
        let lhs = arena.indexing(a, vec![zero]);
        arena.assign(lhs, one)
    };
    let then_update = {
        let lhs = arena.indexing(a, vec![zero]);
        let load = arena.indexing(a, vec![zero]);
        let rhs = arena.binary(BinaryOp::Add, load, one);
        arena.assign(lhs, rhs)
    };
    let then_case = arena.stmts(vec![then_update]);
    let else_copy = {
        let lhs = arena.indexing(a, vec![one_i]);
        let load = arena.indexing(a, vec![zero]);
        arena.assign(lhs, load)
    };
    let else_case = arena.stmts(vec![else_copy]);
    let branch = arena.if_else(c, then_case, Some(else_case));
    let body = arena.stmts(vec![store, branch]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
        A[0] = __cached_0
      }
      if c {
        var __cached_1: f32
        {
          __cached_1 = (__cached_0 + 1)
          A[0] = __cached_1
        }
      } else {
        var __cached_2: f32
        __cached_2 = A[0]
        var __cached_3: f32
        {
          __cached_3 = __cached_2
          A[1] = __cached_3
        }
      }
    }
    "###);

    // The `A[0] = 1` store is flushed before the branch, so both arms see
    // it; each arm's caches die inside the arm.
    let seq = seq_of(&arena, result);
    assert_eq!(seq.len(), 3);
    let first_block = seq_of(&arena, seq[1]);
    let (wb_lhs, _) = assign_parts(&arena, first_block[1]);
    assert!(arena.expr(wb_lhs).is_indexing());
}

// --- Scenario 6: alias flush ---

#[test]
fn test_alias_group_flush() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let b = arena.tensor("B", DataType::f32());
    let id_a = get_or_create_alias_info(&mut arena, a);
    let id_b = get_or_create_alias_info(&mut arena, b);
    let _group = make_alias_group(&[&id_a, &id_b]);

    let zero = arena.const_int(0);
    let one = arena.const_f32(1.0);
    let two = arena.const_f32(2.0);
    let store_a = {
        let lhs = arena.indexing(a, vec![zero]);
        arena.assign(lhs, one)
    };
    let store_b = {
        let lhs = arena.indexing(b, vec![zero]);
        arena.assign(lhs, two)
    };
    let body = arena.stmts(vec![store_a, store_b]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    // The store to B evicts A's cache, emitting A's writeback first.
    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
        A[0] = __cached_0
      }
      var __cached_1: f32
      {
        __cached_1 = 2
        B[0] = __cached_1
      }
    }
    "###);
}

// --- Boundary behaviors ---

#[test]
fn test_untraceable_indices_left_unchanged() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let i = arena.var("i", DataType::s32());
    let x = arena.var("x", DataType::f32());
    let idx = arena.call("lookup", vec![i], DataType::s32());
    let load = arena.indexing(a, vec![idx]);
    let assign = arena.assign(x, load);
    let body = arena.stmts(vec![assign]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    // A call in the indices makes the access untraceable; the whole tree is
    // shared back unchanged.
    assert_eq!(result, body);
}

#[test]
fn test_nested_indexing_becomes_traceable_through_caching() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let b = arena.tensor("B", DataType::s32());
    let x = arena.var("x", DataType::f32());
    let zero = arena.const_int(0);
    let inner = arena.indexing(b, vec![zero]);
    let load = arena.indexing(a, vec![inner]);
    let assign = arena.assign(x, load);
    let body = arena.stmts(vec![assign]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    // The inner load B[0] is cached first, which turns A's index into a
    // plain variable and lets A[..] be cached as well.
    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: s32
      __cached_0 = B[0]
      var __cached_1: f32
      __cached_1 = A[__cached_0]
      x = __cached_1
    }
    "###);
}

#[test]
fn test_no_index2var_attr_is_honored() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let x = arena.var("x", DataType::f32());
    let zero = arena.const_int(0);
    let load = arena.indexing(a, vec![zero]);
    arena.set_attr(load, attr_keys::NO_INDEX2VAR, AttrValue::Bool(true));
    let assign = arena.assign(x, load);
    let body = arena.stmts(vec![assign]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_eq!(result, body);
}

#[test]
fn test_no_index2var_store_still_flushes_sibling_cache() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let zero = arena.const_int(0);
    let one_i = arena.const_int(1);
    let one = arena.const_f32(1.0);
    let two = arena.const_f32(2.0);
    let store_a0 = {
        let lhs = arena.indexing(a, vec![zero]);
        arena.assign(lhs, one)
    };
    let store_a1 = {
        let lhs = arena.indexing(a, vec![one_i]);
        arena.set_attr(lhs, attr_keys::NO_INDEX2VAR, AttrValue::Bool(true));
        arena.assign(lhs, two)
    };
    let body = arena.stmts(vec![store_a0, store_a1]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    // The opted-out store stays a plain store, but A's live cache is still
    // written back first: the store might hit the cached element.
    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
        A[0] = __cached_0
      }
      A[1] = 2
    }
    "###);
}

#[test]
fn test_must_tensor2var_is_never_cached() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    arena.set_attr(a, attr_keys::MUST_TENSOR2VAR, AttrValue::Bool(true));
    let i = arena.var("i", DataType::s32());
    let one = arena.const_f32(1.0);
    let two = arena.const_f32(2.0);
    let store1 = {
        let lhs = arena.indexing(a, vec![i]);
        arena.assign(lhs, one)
    };
    let store2 = {
        let lhs = arena.indexing(a, vec![i]);
        let load = arena.indexing(a, vec![i]);
        let rhs = arena.binary(BinaryOp::Add, load, two);
        arena.assign(lhs, rhs)
    };
    let body = arena.stmts(vec![store1, store2]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_eq!(result, body);
}

#[test]
fn test_scalar_load_of_broadcast_source_not_cached() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let x = arena.var("x", DataType::f32());
    let y = arena.var("y", DataType::vector(ElemType::F32, 8));
    let zero = arena.const_int(0);
    let load_for_splat = arena.indexing(a, vec![zero]);
    let splat = arena.intrin(
        IntrinKind::Broadcast,
        vec![load_for_splat],
        DataType::vector(ElemType::F32, 8),
    );
    let splat_assign = arena.assign(y, splat);
    let scalar_load = arena.indexing(a, vec![zero]);
    let scalar_assign = arena.assign(x, scalar_load);
    let body = arena.stmts(vec![splat_assign, scalar_assign]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_eq!(result, body);
}

#[test]
fn test_vector_load_of_broadcast_source_is_cached() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let y = arena.var("y", DataType::vector(ElemType::F32, 8));
    let z = arena.var("z", DataType::vector(ElemType::F32, 8));
    let zero = arena.const_int(0);
    let load_for_splat = arena.indexing(a, vec![zero]);
    let splat = arena.intrin(
        IntrinKind::Broadcast,
        vec![load_for_splat],
        DataType::vector(ElemType::F32, 8),
    );
    let splat_assign = arena.assign(y, splat);
    let vload = arena.indexing_vector(a, vec![zero], 8, None);
    let vassign = arena.assign(z, vload);
    let body = arena.stmts(vec![splat_assign, vassign]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_ne!(result, body);

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      y = broadcast(A[0])
      var __cached_0: f32x8
      __cached_0 = A[0 @8]
      z = __cached_0
    }
    "###);
}

// --- Opaque operations ---

#[test]
fn test_call_with_tensor_argument_flushes() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let x = arena.var("x", DataType::f32());
    let zero = arena.const_int(0);
    let one = arena.const_f32(1.0);
    let store = {
        let lhs = arena.indexing(a, vec![zero]);
        arena.assign(lhs, one)
    };
    let call = arena.call("mutate", vec![a], DataType::s32());
    let eval = arena.evaluate(call);
    let reload = {
        let load = arena.indexing(a, vec![zero]);
        arena.assign(x, load)
    };
    let body = arena.stmts(vec![store, eval, reload]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    // The callee may write through A: the dirty cache is flushed before the
    // call and the later load starts a fresh cache.
    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
        A[0] = __cached_0
      }
      mutate(A)
      var __cached_1: f32
      __cached_1 = A[0]
      x = __cached_1
    }
    "###);
}

#[test]
fn test_tensor_ptr_flushes() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let zero = arena.const_int(0);
    let one_i = arena.const_int(1);
    let one = arena.const_f32(1.0);
    let store = {
        let lhs = arena.indexing(a, vec![zero]);
        arena.assign(lhs, one)
    };
    let elem = arena.indexing(a, vec![one_i]);
    let addr = arena.tensor_ptr(elem);
    let call = arena.call("prefetch", vec![addr], DataType::s32());
    let eval = arena.evaluate(call);
    let body = arena.stmts(vec![store, eval]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    // Taking an element's address exposes A to unknown mutation; the dirty
    // cache is written back and no cache is created for the address's base.
    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32
      {
        __cached_0 = 1
        A[0] = __cached_0
      }
      prefetch(&A[1])
    }
    "###);
}

// --- Masked vector accesses ---

#[test]
fn test_masked_vector_store_then_load_reuses_cache() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let i = arena.var("i", DataType::s32());
    let m = arena.var("m", DataType::vector(ElemType::Bool, 8));
    let y = arena.var("y", DataType::vector(ElemType::F32, 8));
    let z = arena.var("z", DataType::vector(ElemType::F32, 8));
    let store = {
        let lhs = arena.indexing_vector(a, vec![i], 8, Some(m));
        arena.assign(lhs, y)
    };
    let reload = {
        let load = arena.indexing_vector(a, vec![i], 8, Some(m));
        arena.assign(z, load)
    };
    let body = arena.stmts(vec![store, reload]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32x8
      {
        __cached_0 = y
        A[i @8 ?m] = __cached_0
      }
      z = __cached_0
    }
    "###);
}

#[test]
fn test_mask_mismatch_evicts() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let i = arena.var("i", DataType::s32());
    let m1 = arena.var("m1", DataType::vector(ElemType::Bool, 8));
    let m2 = arena.var("m2", DataType::vector(ElemType::Bool, 8));
    let y = arena.var("y", DataType::vector(ElemType::F32, 8));
    let z = arena.var("z", DataType::vector(ElemType::F32, 8));
    let store = {
        let lhs = arena.indexing_vector(a, vec![i], 8, Some(m1));
        arena.assign(lhs, y)
    };
    let reload = {
        let load = arena.indexing_vector(a, vec![i], 8, Some(m2));
        arena.assign(z, load)
    };
    let body = arena.stmts(vec![store, reload]);

    let result = index_to_var_body(&mut arena, body).unwrap();

    // Different masks are different accesses: the dirty cache is written
    // back and the load primes a fresh one.
    insta::assert_snapshot!(arena.pretty_stmt(result, 0), @r###"
    {
      var __cached_0: f32x8
      {
        __cached_0 = y
        A[i @8 ?m1] = __cached_0
      }
      var __cached_1: f32x8
      __cached_1 = A[i @8 ?m2]
      z = __cached_1
    }
    "###);
}

// --- Error paths ---

#[test]
fn test_dangling_alias_identity_is_fatal() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let id_a = get_or_create_alias_info(&mut arena, a);
    let _group = {
        let transient = TensorAliasIdentity::new();
        make_alias_group(&[&id_a, &transient])
        // `transient` drops here; its weak reference in the group goes dead.
    };

    let zero = arena.const_int(0);
    let one = arena.const_f32(1.0);
    let store = {
        let lhs = arena.indexing(a, vec![zero]);
        arena.assign(lhs, one)
    };
    let body = arena.stmts(vec![store]);

    assert!(matches!(
        index_to_var_body(&mut arena, body),
        Err(IrError::DanglingAliasIdentity { .. })
    ));
}

// --- Sharing and pipeline ---

#[test]
fn test_tensor_free_body_is_shared_back() {
    let mut arena = IrArena::new();
    let x = arena.var("x", DataType::s32());
    let one = arena.const_int(1);
    let rhs = arena.binary(BinaryOp::Add, x, one);
    let assign = arena.assign(x, rhs);
    let body = arena.stmts(vec![assign]);

    let result = index_to_var_body(&mut arena, body).unwrap();
    assert_eq!(result, body);
}

#[test]
fn test_function_driver_and_pipeline() {
    let mut arena = IrArena::new();
    let a = arena.tensor("A", DataType::f32());
    let i = arena.var("i", DataType::s32());
    let one = arena.const_f32(1.0);
    let two = arena.const_f32(2.0);
    let store1 = {
        let lhs = arena.indexing(a, vec![i]);
        arena.assign(lhs, one)
    };
    let store2 = {
        let lhs = arena.indexing(a, vec![i]);
        let load = arena.indexing(a, vec![i]);
        let rhs = arena.binary(BinaryOp::Add, load, two);
        arena.assign(lhs, rhs)
    };
    let body = arena.stmts(vec![store1, store2]);
    let func = tensora_compiler_ir::Function::new("kernel", vec![a, i], body);

    let rewritten = index_to_var(&mut arena, &func).unwrap();
    assert_eq!(rewritten.name, "kernel");
    assert_ne!(rewritten.body, func.body);

    // The pass manager pipeline reaches the same shape.
    let mut manager = PassManager::optimize_pipeline();
    let piped = manager.run(&mut arena, body).unwrap();
    let mut cmp = tensora_compiler_ir::IrComparer::new(true);
    assert!(cmp.compare_stmt(&arena, rewritten.body, &arena, piped));
}
