use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{BasicBlock, BlockId, FunctionBody};
use crate::return_compiler_error;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Reachability and predecessor information for one function body.
#[derive(Debug, Clone)]
pub(crate) struct ControlFlow {
    /// Reachable blocks in breadth-first order from the entry
    pub reachable: Vec<BlockId>,
    /// Reachable blocks in reverse postorder, the forward analysis visiting order
    pub reverse_postorder: Vec<BlockId>,
    /// Reachable predecessors, indexed by block
    pub predecessors: Vec<Vec<BlockId>>,
    reachable_set: FxHashSet<BlockId>,
}

impl ControlFlow {
    pub(crate) fn build(body: &FunctionBody) -> Result<Self, CompilerError> {
        for (index, block) in body.blocks.iter().enumerate() {
            if block.id.0 as usize != index {
                return_compiler_error!(
                    "Block '{}' is stored at index {}, block ids must match their position",
                    block.id,
                    index
                );
            }
        }

        block_or_error(body, body.entry)?;

        let mut reachable_set = FxHashSet::default();
        let mut reachable = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(body.entry);

        while let Some(block_id) = queue.pop_front() {
            if !reachable_set.insert(block_id) {
                continue;
            }

            reachable.push(block_id);

            let block = block_or_error(body, block_id)?;
            for next in block.terminator.kind.successors() {
                block_or_error(body, next)?;
                queue.push_back(next);
            }
        }

        let mut predecessors = vec![Vec::new(); body.blocks.len()];
        for block_id in &reachable {
            let block = block_or_error(body, *block_id)?;
            for next in block.terminator.kind.successors() {
                predecessors[next.0 as usize].push(*block_id);
            }
        }

        let reverse_postorder = reverse_postorder(body, body.entry);

        Ok(ControlFlow {
            reachable,
            reverse_postorder,
            predecessors,
            reachable_set,
        })
    }

    pub(crate) fn is_reachable(&self, block: BlockId) -> bool {
        self.reachable_set.contains(&block)
    }

    pub(crate) fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors
            .get(block.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The entry block also has the implicit edge from the caller
    pub(crate) fn has_single_predecessor(&self, block: BlockId, entry: BlockId) -> bool {
        let implicit = usize::from(block == entry);
        self.predecessors(block).len() + implicit == 1
    }
}

pub(crate) fn block_or_error(
    body: &FunctionBody,
    block_id: BlockId,
) -> Result<&BasicBlock, CompilerError> {
    match body.block(block_id) {
        Some(block) => Ok(block),
        None => {
            return_compiler_error!("Terminator targets unknown block '{}'", block_id);
        }
    }
}

fn reverse_postorder(body: &FunctionBody, entry: BlockId) -> Vec<BlockId> {
    let mut visited = FxHashSet::default();
    let mut postorder = Vec::new();

    // Iterative DFS: (block, next successor index to visit)
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);

    while let Some((block_id, next_index)) = stack.pop() {
        let successors = body
            .block(block_id)
            .map(|block| block.terminator.kind.successors())
            .unwrap_or_default();

        if let Some(next) = successors.get(next_index).copied() {
            stack.push((block_id, next_index + 1));
            if visited.insert(next) {
                stack.push((next, 0));
            }
            continue;
        }

        postorder.push(block_id);
    }

    postorder.reverse();
    postorder
}
