use std::hint::black_box;

use divan::{AllocProfiler, Bencher};
use serin_ast::{Ast, NodeId, Repository};
use serin_check::compile;
use serin_check::{ImplIndex, ScopeTree, Unifier};

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

struct World {
    repo: Repository,
    ast: Ast,
    scopes: ScopeTree,
    impls: ImplIndex,
}

fn world() -> World {
    let mut repo = Repository::new();
    let mut ast = Ast::new();
    let mut scopes = ScopeTree::new();
    let int_def = ast.data(&mut repo, "Int", vec![], vec![]);
    let t = ast.param(&mut repo, "Elem");
    let list_def = ast.data(&mut repo, "List", vec![t], vec![]);
    for def in [int_def, list_def] {
        scopes
            .define(&ast, ScopeTree::ROOT, def)
            .expect("bench world definitions are distinct");
    }
    World {
        repo,
        ast,
        scopes,
        impls: ImplIndex::new(),
    }
}

/// `List<List<...<Int>...>>` nested `depth` times.
fn nested_list(w: &mut World, depth: usize) -> NodeId {
    let mut node = w.ast.name("Int");
    for _ in 0..depth {
        let head = w.ast.name("List");
        node = w.ast.apply(head, vec![node]);
    }
    node
}

/// `forall T0..Tn. (T0, .., Tn) -> T0`.
fn generic_fun(w: &mut World, arity: usize) -> NodeId {
    let names: Vec<String> = (0..arity).map(|i| format!("T{i}")).collect();
    let params: Vec<NodeId> = names.iter().map(|n| w.ast.name(n.clone())).collect();
    let ret = w.ast.name(names[0].clone());
    let fun = w.ast.fun(params, ret);
    let binders: Vec<NodeId> = names
        .iter()
        .map(|n| w.ast.param(&mut w.repo, n.clone()))
        .collect();
    w.ast.forall(binders, fun)
}

#[divan::bench(args = [8, 64, 256])]
fn compile_nested_type(bencher: Bencher, depth: usize) {
    let mut w = world();
    let node = nested_list(&mut w, depth);
    bencher.bench_local(|| {
        let code = compile::compile(&w.ast, &mut w.scopes, ScopeTree::ROOT, black_box(node))
            .expect("bench type compiles");
        black_box(code.len())
    });
}

#[divan::bench(args = [8, 64, 256])]
fn decode_nested_type(bencher: Bencher, depth: usize) {
    let mut w = world();
    let node = nested_list(&mut w, depth);
    let code = w
        .scopes
        .normalize(&w.ast, node)
        .expect("bench type normalizes");
    bencher.bench(|| {
        let expr = black_box(&code).decode_all().expect("bench code decodes");
        black_box(expr)
    });
}

#[divan::bench(args = [1, 4, 8])]
fn unify_generic_function(bencher: Bencher, arity: usize) {
    let mut w = world();
    let lhs = generic_fun(&mut w, arity);
    let rhs = generic_fun(&mut w, arity);
    bencher.bench_local(|| {
        let mut unifier = Unifier::new(&w.ast, &mut w.scopes, &w.impls);
        black_box(unifier.unify(black_box(lhs), black_box(rhs)))
    });
}
