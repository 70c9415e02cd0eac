//! SSA construction.
//!
//! Pruned SSA via dominance frontiers: dominators are computed with the
//! Cooper-Harvey-Kennedy iteration over reverse postorder, phis are placed
//! on the iterated dominance frontier of each variable's definitions where
//! that variable is live, and a walk of the dominator tree renames every
//! `load`/`store` into plain values.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::cfg::{Basic, BlockRef, Function, Insn, Module, ValueRef, Var};
use crate::error::CompileError;

/// Rewrites every function of `module` into SSA form.
pub fn construct(module: &mut Module) -> Result<(), CompileError> {
    for function in &mut module.functions {
        construct_function(function)?;
    }
    Ok(())
}

pub fn construct_function(func: &mut Function) -> Result<(), CompileError> {
    let doms = Dominators::compute(func);
    check_definite_assignment(func, &doms)?;

    let live_in = live_variables(func);
    let frontiers = doms.frontiers(func);
    let phis = place_phis(func, &frontiers, &live_in);
    let placed: usize = phis.iter().map(Vec::len).sum();

    rename(func, &doms, &phis)?;
    let removed = remove_trivial_phis(func);

    debug!(
        function = %func.name,
        placed,
        removed,
        "constructed ssa"
    );
    Ok(())
}

/// Immediate dominators of the blocks of one function.
#[derive(Debug, Clone)]
pub struct Dominators {
    rpo: Vec<BlockRef>,
    // position of each block in `rpo`; None for unreachable blocks
    order: Vec<Option<usize>>,
    // the entry is its own idom here
    idom: Vec<Option<BlockRef>>,
}

impl Dominators {
    pub fn compute(func: &Function) -> Self {
        let rpo = reverse_postorder(func);
        let mut order = vec![None; func.blocks.len()];
        for (i, b) in rpo.iter().enumerate() {
            order[b.0] = Some(i);
        }

        let mut idom: Vec<Option<BlockRef>> = vec![None; func.blocks.len()];
        idom[Function::ENTRY.0] = Some(Function::ENTRY);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &p in &func.block(b).preds {
                    if idom[p.0].is_none() {
                        continue;
                    }
                    new_idom = match new_idom {
                        None => Some(p),
                        Some(current) => Some(intersect(&idom, &order, current, p)),
                    };
                }
                if new_idom.is_some() && idom[b.0] != new_idom {
                    idom[b.0] = new_idom;
                    changed = true;
                }
            }
        }

        Dominators { rpo, order, idom }
    }

    /// Reachable blocks in reverse postorder, entry first.
    pub fn reverse_postorder(&self) -> &[BlockRef] {
        &self.rpo
    }

    pub fn is_reachable(&self, b: BlockRef) -> bool {
        self.order[b.0].is_some()
    }

    /// The immediate dominator of `b`; `None` for the entry and for unreachable blocks.
    pub fn idom(&self, b: BlockRef) -> Option<BlockRef> {
        match self.idom[b.0] {
            Some(d) if d != b => Some(d),
            _ => None,
        }
    }

    pub fn dominates(&self, a: BlockRef, b: BlockRef) -> bool {
        if !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(d) => current = d,
                None => return false,
            }
        }
    }

    /// Dominator-tree children of every block, in block order.
    pub fn children(&self) -> Vec<Vec<BlockRef>> {
        let mut children = vec![Vec::new(); self.idom.len()];
        for i in 0..self.idom.len() {
            if let Some(d) = self.idom(BlockRef(i)) {
                children[d.0].push(BlockRef(i));
            }
        }
        children
    }

    /// Dominance frontier of every block.
    pub fn frontiers(&self, func: &Function) -> Vec<BTreeSet<BlockRef>> {
        let mut frontiers = vec![BTreeSet::new(); func.blocks.len()];
        for (i, block) in func.blocks.iter().enumerate() {
            let b = BlockRef(i);
            if block.preds.len() < 2 || !self.is_reachable(b) {
                continue;
            }
            let Some(stop) = self.idom(b) else {
                continue;
            };
            for &p in &block.preds {
                if !self.is_reachable(p) {
                    continue;
                }
                let mut runner = p;
                while runner != stop {
                    frontiers[runner.0].insert(b);
                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        frontiers
    }
}

fn intersect(
    idom: &[Option<BlockRef>],
    order: &[Option<usize>],
    mut b1: BlockRef,
    mut b2: BlockRef,
) -> BlockRef {
    let rank = |b: BlockRef| order[b.0].unwrap_or(usize::MAX);
    while b1 != b2 {
        while rank(b1) > rank(b2) {
            match idom[b1.0] {
                Some(d) => b1 = d,
                None => return b2,
            }
        }
        while rank(b2) > rank(b1) {
            match idom[b2.0] {
                Some(d) => b2 = d,
                None => return b1,
            }
        }
    }
    b1
}

fn reverse_postorder(func: &Function) -> Vec<BlockRef> {
    let mut visited = vec![false; func.blocks.len()];
    let mut postorder = Vec::with_capacity(func.blocks.len());
    let mut stack = vec![(Function::ENTRY, 0usize)];
    visited[Function::ENTRY.0] = true;

    while let Some((b, next)) = stack.pop() {
        let succs = func.block(b).control.successors();
        if let Some(&s) = succs.get(next) {
            stack.push((b, next + 1));
            if !visited[s.0] {
                visited[s.0] = true;
                stack.push((s, 0));
            }
        } else {
            postorder.push(b);
        }
    }

    postorder.reverse();
    postorder
}

/// Rejects any `load` of a variable that is not assigned on every path
/// from the entry to it.
fn check_definite_assignment(func: &Function, doms: &Dominators) -> Result<(), CompileError> {
    // None stands for "every variable" until a block has been visited.
    let mut assigned_out: Vec<Option<BTreeSet<Var>>> = vec![None; func.blocks.len()];

    let assigned_in = |b: BlockRef, out: &[Option<BTreeSet<Var>>]| -> BTreeSet<Var> {
        if b == Function::ENTRY {
            return BTreeSet::new();
        }
        let mut result: Option<BTreeSet<Var>> = None;
        for p in &func.block(b).preds {
            if let Some(set) = &out[p.0] {
                result = Some(match result {
                    None => set.clone(),
                    Some(acc) => acc.intersection(set).copied().collect(),
                });
            }
        }
        result.unwrap_or_default()
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &b in doms.reverse_postorder() {
            let mut set = assigned_in(b, &assigned_out);
            for insn in &func.block(b).insts {
                if let Basic::Store { var, .. } = insn.basic {
                    set.insert(var);
                }
            }
            if assigned_out[b.0].as_ref() != Some(&set) {
                assigned_out[b.0] = Some(set);
                changed = true;
            }
        }
    }

    for &b in doms.reverse_postorder() {
        let mut set = assigned_in(b, &assigned_out);
        for insn in &func.block(b).insts {
            match insn.basic {
                Basic::Store { var, .. } => {
                    set.insert(var);
                }
                Basic::Load { var, .. } if !set.contains(&var) => {
                    return Err(CompileError::UndefinedVariable {
                        pos: insn.pos,
                        name: func.vars[var.0].clone(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Variables live on entry to each block.
fn live_variables(func: &Function) -> Vec<BTreeSet<Var>> {
    let n = func.blocks.len();
    let mut uses = vec![BTreeSet::new(); n];
    let mut defs = vec![BTreeSet::new(); n];
    for (i, block) in func.blocks.iter().enumerate() {
        for insn in &block.insts {
            match insn.basic {
                Basic::Load { var, .. } if !defs[i].contains(&var) => {
                    uses[i].insert(var);
                }
                Basic::Store { var, .. } => {
                    defs[i].insert(var);
                }
                _ => {}
            }
        }
    }

    let mut live_in: Vec<BTreeSet<Var>> = uses.clone();
    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..n).rev() {
            let mut live: BTreeSet<Var> = BTreeSet::new();
            for s in func.blocks[i].control.successors() {
                live.extend(live_in[s.0].iter().copied());
            }
            live.retain(|v| !defs[i].contains(v));
            live.extend(uses[i].iter().copied());
            if live != live_in[i] {
                live_in[i] = live;
                changed = true;
            }
        }
    }
    live_in
}

/// Decides where phis go: for each block, the variables that need one and
/// the value the phi will define. At most one phi per (block, variable).
fn place_phis(
    func: &mut Function,
    frontiers: &[BTreeSet<BlockRef>],
    live_in: &[BTreeSet<Var>],
) -> Vec<Vec<(Var, ValueRef)>> {
    let mut phis: Vec<Vec<(Var, ValueRef)>> = vec![Vec::new(); func.blocks.len()];

    for v in 0..func.vars.len() {
        let var = Var(v);
        let mut worklist: Vec<BlockRef> = func
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                block
                    .insts
                    .iter()
                    .any(|insn| matches!(insn.basic, Basic::Store { var: w, .. } if w == var))
            })
            .map(|(i, _)| BlockRef(i))
            .collect();
        let mut has_phi: BTreeSet<BlockRef> = BTreeSet::new();
        let mut processed: BTreeSet<BlockRef> = BTreeSet::new();

        while let Some(b) = worklist.pop() {
            if !processed.insert(b) {
                continue;
            }
            for &y in &frontiers[b.0] {
                if !live_in[y.0].contains(&var) || !has_phi.insert(y) {
                    continue;
                }
                let dst = func.fresh_value();
                trace!(function = %func.name, block = %y, var = %func.vars[v], %dst, "placed phi");
                phis[y.0].push((var, dst));
                // a phi is itself a definition
                worklist.push(y);
            }
        }
    }

    for block_phis in &mut phis {
        block_phis.sort_by_key(|(var, _)| *var);
    }
    phis
}

enum Visit {
    Enter(BlockRef),
    Exit(Vec<Var>),
}

fn resolve(replaced: &[Option<ValueRef>], mut v: ValueRef) -> ValueRef {
    while let Some(r) = replaced[v.0] {
        v = r;
    }
    v
}

fn rename(
    func: &mut Function,
    doms: &Dominators,
    phis: &[Vec<(Var, ValueRef)>],
) -> Result<(), CompileError> {
    let mut incoming: Vec<Vec<Vec<Option<ValueRef>>>> = phis
        .iter()
        .enumerate()
        .map(|(i, block_phis)| vec![vec![None; func.blocks[i].preds.len()]; block_phis.len()])
        .collect();
    let mut stacks: Vec<Vec<ValueRef>> = vec![Vec::new(); func.vars.len()];
    let mut replaced: Vec<Option<ValueRef>> = vec![None; func.num_values];
    let children = doms.children();

    let mut work = vec![Visit::Enter(Function::ENTRY)];
    while let Some(visit) = work.pop() {
        let b = match visit {
            Visit::Enter(b) => b,
            Visit::Exit(pushed) => {
                for var in pushed {
                    stacks[var.0].pop();
                }
                continue;
            }
        };

        let mut pushed = Vec::new();
        for &(var, dst) in &phis[b.0] {
            stacks[var.0].push(dst);
            pushed.push(var);
        }

        let insts = std::mem::take(&mut func.blocks[b.0].insts);
        let mut kept = Vec::with_capacity(insts.len());
        for mut insn in insts {
            match insn.basic {
                Basic::Load { dst, var } => match stacks[var.0].last() {
                    Some(&value) => replaced[dst.0] = Some(value),
                    None => {
                        return Err(CompileError::UndefinedVariable {
                            pos: insn.pos,
                            name: func.vars[var.0].clone(),
                        })
                    }
                },
                Basic::Store { var, value } => {
                    stacks[var.0].push(resolve(&replaced, value));
                    pushed.push(var);
                }
                _ => {
                    insn.basic.map_operands(|v| resolve(&replaced, v));
                    kept.push(insn);
                }
            }
        }
        func.blocks[b.0].insts = kept;
        func.blocks[b.0]
            .control
            .map_operands(|v| resolve(&replaced, v));

        for succ in func.blocks[b.0].control.successors() {
            for (slot, &pred) in func.blocks[succ.0].preds.iter().enumerate() {
                if pred != b {
                    continue;
                }
                for (i, &(var, _)) in phis[succ.0].iter().enumerate() {
                    match stacks[var.0].last() {
                        Some(&value) => incoming[succ.0][i][slot] = Some(value),
                        None => {
                            return Err(CompileError::UndefinedVariable {
                                pos: func.pos,
                                name: func.vars[var.0].clone(),
                            })
                        }
                    }
                }
            }
        }

        work.push(Visit::Exit(pushed));
        for &child in children[b.0].iter().rev() {
            work.push(Visit::Enter(child));
        }
    }

    for (i, block_phis) in phis.iter().enumerate() {
        if block_phis.is_empty() {
            continue;
        }
        let block = &mut func.blocks[i];
        let mut header = Vec::with_capacity(block_phis.len());
        for (j, &(var, dst)) in block_phis.iter().enumerate() {
            let mut operands = Vec::with_capacity(block.preds.len());
            for (slot, &pred) in block.preds.iter().enumerate() {
                match incoming[i][j][slot] {
                    Some(value) => operands.push((pred, value)),
                    None => {
                        return Err(CompileError::structural(
                            func.pos,
                            format!(
                                "no definition of `{}` flows from {} into {}",
                                func.vars[var.0],
                                pred,
                                BlockRef(i)
                            ),
                        ))
                    }
                }
            }
            header.push(Insn {
                basic: Basic::Phi {
                    dst,
                    incoming: operands,
                },
                pos: func.pos,
            });
        }
        header.append(&mut block.insts);
        block.insts = header;
    }
    Ok(())
}

/// Removes phis whose operands, ignoring the phi itself, are all the same
/// value, and points their uses at that value. Returns how many were removed.
fn remove_trivial_phis(func: &mut Function) -> usize {
    let mut replaced: Vec<Option<ValueRef>> = vec![None; func.num_values];
    let mut removed = 0;

    loop {
        let mut changed = false;
        for block in &mut func.blocks {
            block.insts.retain(|insn| {
                let Basic::Phi { dst, incoming } = &insn.basic else {
                    return true;
                };
                let mut same = None;
                for &(_, v) in incoming {
                    let v = resolve(&replaced, v);
                    if v == *dst || same == Some(v) {
                        continue;
                    }
                    if same.is_some() {
                        return true;
                    }
                    same = Some(v);
                }
                match same {
                    Some(v) => {
                        replaced[dst.0] = Some(v);
                        removed += 1;
                        changed = true;
                        false
                    }
                    None => true,
                }
            });
        }
        if !changed {
            break;
        }
    }

    if removed > 0 {
        for block in &mut func.blocks {
            for insn in &mut block.insts {
                insn.basic.map_operands(|v| resolve(&replaced, v));
            }
            block.control.map_operands(|v| resolve(&replaced, v));
        }
    }
    removed
}

/// Checks the SSA invariants of a constructed function: single definitions,
/// definitions dominating their uses, phis at block starts with one operand
/// per predecessor in predecessor order, and no `load`/`store` left.
pub fn verify(func: &Function) -> Result<(), String> {
    let doms = Dominators::compute(func);
    let mut def_site: Vec<Option<(BlockRef, usize)>> = vec![None; func.num_values];

    if !func.block(Function::ENTRY).preds.is_empty() {
        return Err("the entry block has predecessors".to_string());
    }

    for (i, block) in func.blocks.iter().enumerate() {
        let b = BlockRef(i);
        if !doms.is_reachable(b) {
            return Err(format!("{} is unreachable", b));
        }
        let mut in_header = true;
        for (j, insn) in block.insts.iter().enumerate() {
            match &insn.basic {
                Basic::Load { .. } | Basic::Store { .. } => {
                    return Err(format!("{} still accesses a variable: {:?}", b, insn.basic));
                }
                Basic::Param { .. } if b != Function::ENTRY => {
                    return Err(format!("param outside the entry block in {}", b));
                }
                Basic::Phi { dst, incoming } => {
                    if !in_header {
                        return Err(format!("phi {} follows a non-phi instruction in {}", dst, b));
                    }
                    let blocks: Vec<BlockRef> = incoming.iter().map(|(p, _)| *p).collect();
                    if blocks != block.preds {
                        return Err(format!(
                            "phi {} in {} has operands for {:?} but the predecessors are {:?}",
                            dst, b, blocks, block.preds
                        ));
                    }
                }
                _ => in_header = false,
            }
            if let Some(dst) = insn.basic.dst() {
                if dst.0 >= func.num_values {
                    return Err(format!("{} is out of range", dst));
                }
                if def_site[dst.0].is_some() {
                    return Err(format!("{} is defined more than once", dst));
                }
                def_site[dst.0] = Some((b, j));
            }
        }
    }

    let defined = |v: ValueRef| -> Result<(BlockRef, usize), String> {
        def_site
            .get(v.0)
            .copied()
            .flatten()
            .ok_or_else(|| format!("{} is used but never defined", v))
    };

    for (i, block) in func.blocks.iter().enumerate() {
        let b = BlockRef(i);
        for (j, insn) in block.insts.iter().enumerate() {
            if let Basic::Phi { incoming, .. } = &insn.basic {
                for &(pred, v) in incoming {
                    let (db, _) = defined(v)?;
                    if !doms.dominates(db, pred) {
                        return Err(format!("{} does not reach the edge {} -> {}", v, pred, b));
                    }
                }
                continue;
            }
            for v in insn.basic.operands() {
                let (db, dj) = defined(v)?;
                if !(db == b && dj < j || db != b && doms.dominates(db, b)) {
                    return Err(format!("{} does not dominate its use in {}", v, b));
                }
            }
        }
        for v in block.control.operands() {
            let (db, _) = defined(v)?;
            if !doms.dominates(db, b) {
                return Err(format!("{} does not dominate the terminator of {}", v, b));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{Control, Module};
    use crate::compiler;
    use crate::error::{LineIndex, Position};
    use crate::syntax;

    fn lowered(src: &str) -> Module {
        let lines = LineIndex::new(src);
        let program = syntax::parse(src, &lines).expect("valid syntax");
        compiler::lower(&program, &lines).expect("valid structure")
    }

    fn ssa(src: &str) -> Module {
        let mut module = lowered(src);
        construct(&mut module).expect("ssa construction");
        for f in &module.functions {
            verify(f).unwrap_or_else(|e| panic!("{}\n{}", e, f));
        }
        module
    }

    fn phis_in(func: &Function, b: BlockRef) -> Vec<&Insn> {
        func.block(b).phis().collect()
    }

    #[test]
    fn diamond_dominators_and_frontiers() {
        let module = lowered("if (1 < 2) { x = 1 } else { x = 2 } print(x)");
        let main = module.function(module.main);
        let doms = Dominators::compute(main);

        assert_eq!(doms.idom(BlockRef(0)), None);
        assert_eq!(doms.idom(BlockRef(1)), Some(BlockRef(0)));
        assert_eq!(doms.idom(BlockRef(2)), Some(BlockRef(0)));
        assert_eq!(doms.idom(BlockRef(3)), Some(BlockRef(0)));
        assert!(doms.dominates(BlockRef(0), BlockRef(3)));
        assert!(!doms.dominates(BlockRef(1), BlockRef(3)));

        let df = doms.frontiers(main);
        assert!(df[0].is_empty());
        assert_eq!(df[1], BTreeSet::from([BlockRef(3)]));
        assert_eq!(df[2], BTreeSet::from([BlockRef(3)]));
        assert!(df[3].is_empty());
    }

    #[test]
    fn loop_header_is_in_its_own_frontier() {
        let module = lowered("i = 0 while (i < 3) { i = i + 1 }");
        let main = module.function(module.main);
        let doms = Dominators::compute(main);
        let df = doms.frontiers(main);
        let header = BlockRef(1);
        assert!(df[2].contains(&header));
        assert!(df[header.0].contains(&header));
    }

    #[test]
    fn merge_gets_one_phi_in_predecessor_order() {
        let module = ssa("if (1 < 2) { x = 1 } else { x = 2 } print(x)");
        let main = module.function(module.main);
        let merge = BlockRef(3);
        let phis = phis_in(main, merge);
        assert_eq!(phis.len(), 1);
        let Basic::Phi { incoming, .. } = &phis[0].basic else {
            unreachable!()
        };
        let blocks: Vec<BlockRef> = incoming.iter().map(|(b, _)| *b).collect();
        assert_eq!(blocks, main.block(merge).preds);
        // the operand from each arm is that arm's constant
        for (pred, value) in incoming {
            let defined_in_pred = main.block(*pred).insts.iter().any(|i| {
                matches!(&i.basic, Basic::Const { dst, .. } if dst == value)
            });
            assert!(defined_in_pred);
        }
    }

    #[test]
    fn no_phi_when_the_variable_is_dead_at_the_join() {
        let module = ssa("if (1 < 2) { x = 1 } else { x = 2 } print(0)");
        let main = module.function(module.main);
        assert!(main.blocks.iter().all(|b| b.phis().next().is_none()));
    }

    #[test]
    fn no_phi_when_both_paths_carry_the_same_definition() {
        let module = ssa("x = 5 if (x < 1) { print(1) } else { print(2) } print(x)");
        let main = module.function(module.main);
        assert!(main.blocks.iter().all(|b| b.phis().next().is_none()));
    }

    #[test]
    fn loop_carried_variable_gets_a_header_phi() {
        let module = ssa("i = 0 s = 0 while (i < 3) { s = s + i i = i + 1 } print(s)");
        let main = module.function(module.main);
        let header = BlockRef(1);
        let phis = phis_in(main, header);
        assert_eq!(phis.len(), 2);
        for phi in phis {
            let Basic::Phi { incoming, .. } = &phi.basic else {
                unreachable!()
            };
            assert_eq!(incoming.len(), 2);
            assert_eq!(incoming[0].0, BlockRef(0));
            assert_eq!(incoming[1].0, BlockRef(2));
        }
    }

    #[test]
    fn loads_and_stores_are_gone() {
        let module = ssa("fn f(n) { if (n < 2) { return n } return f(n - 1) + f(n - 2) } print(f(10))");
        for f in &module.functions {
            for block in &f.blocks {
                assert!(block
                    .insts
                    .iter()
                    .all(|i| !matches!(i.basic, Basic::Load { .. } | Basic::Store { .. })));
            }
        }
    }

    #[test]
    fn copies_are_propagated() {
        let module = ssa("x = 1 y = x print(y)");
        let main = module.function(module.main);
        let block = &main.blocks[0];
        let Basic::Const { dst, .. } = block.insts[0].basic else {
            panic!("expected constant first");
        };
        let Basic::Builtin { args, .. } = &block.insts[1].basic else {
            panic!("expected the print call");
        };
        assert_eq!(args, &vec![dst]);
    }

    #[test]
    fn read_before_any_assignment_is_undefined() {
        let mut module = lowered("print(y)");
        let err = construct(&mut module).unwrap_err();
        assert_eq!(
            err,
            CompileError::UndefinedVariable {
                pos: Position::new(1, 7),
                name: "y".to_string()
            }
        );
    }

    #[test]
    fn assignment_on_one_path_only_is_undefined() {
        let mut module = lowered("if (1 < 2) { x = 1 }\nprint(x)");
        let err = construct(&mut module).unwrap_err();
        assert_eq!(
            err,
            CompileError::UndefinedVariable {
                pos: Position::new(2, 7),
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn assignment_later_in_the_loop_body_is_undefined() {
        let mut module = lowered("while (true) { print(x) x = 1 }");
        assert!(matches!(
            construct(&mut module),
            Err(CompileError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn construction_is_idempotent() {
        let mut module = ssa("i = 0 while (i < 3) { if (i == 1) { print(i) } i = i + 1 } print(i)");
        let before = module.clone();
        construct(&mut module).unwrap();
        assert_eq!(module, before);
    }

    #[test]
    fn branch_condition_is_rewritten() {
        let module = ssa("c = 1 < 2 if (c) { print(1) }");
        let main = module.function(module.main);
        let Control::Branch { cond, .. } = main.blocks[0].control else {
            panic!("expected a branch");
        };
        assert!(main.blocks[0]
            .insts
            .iter()
            .any(|i| matches!(i.basic, Basic::Arith { dst, .. } if dst == cond)));
    }

    #[test]
    fn verify_rejects_double_definitions() {
        let mut module = ssa("print(1)");
        let main = &mut module.functions[0];
        let dup = main.blocks[0].insts[0].clone();
        main.blocks[0].insts.push(dup);
        assert!(verify(main).unwrap_err().contains("defined more than once"));
    }
}
