//! Call graph of a module.
//!
//! One node per live function, holding the direct callees of its call sites.
//! The graph is a snapshot: it is rebuilt from the module whenever needed and
//! never updated in place.

use rustc_hash::{FxHashMap, FxHashSet};
use squishy_ir::{FunctionId, Module};

/// Call sites of a single function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraphNode {
    /// Callee of every call site, in program order; `None` for calls through
    /// anything other than a direct function reference
    pub callees: Vec<Option<FunctionId>>,
}

impl CallGraphNode {
    /// Distinct direct callees, in first-call order
    pub fn direct_callees(&self) -> Vec<FunctionId> {
        let mut seen = FxHashSet::default();
        self.callees
            .iter()
            .flatten()
            .copied()
            .filter(|callee| seen.insert(*callee))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: FxHashMap<FunctionId, CallGraphNode>,
}

impl CallGraph {
    /// Builds the call graph of every live function in `module`
    pub fn build(module: &Module) -> Self {
        let nodes = module
            .functions()
            .map(|(id, function)| {
                let callees = function
                    .basic_blocks
                    .iter()
                    .flat_map(|block| block.instructions.iter())
                    .filter_map(|instr| instr.callee())
                    .map(|callee| {
                        callee
                            .as_function()
                            .filter(|f| module.get_function(*f).is_some())
                    })
                    .collect();
                (id, CallGraphNode { callees })
            })
            .collect();
        Self { nodes }
    }

    pub fn node(&self, function: FunctionId) -> Option<&CallGraphNode> {
        self.nodes.get(&function)
    }

    /// Distinct direct callees of `function`
    pub fn callees(&self, function: FunctionId) -> Vec<FunctionId> {
        self.node(function)
            .map(CallGraphNode::direct_callees)
            .unwrap_or_default()
    }

    /// Every function reachable from `function` through one or more calls
    ///
    /// `function` itself is included only if it can reach itself.
    pub fn transitive_callees(&self, function: FunctionId) -> FxHashSet<FunctionId> {
        let mut visited = FxHashSet::default();
        let mut worklist = self.callees(function);

        while let Some(callee) = worklist.pop() {
            if visited.insert(callee) {
                worklist.extend(self.callees(callee));
            }
        }

        visited
    }

    /// Finds a call path from `from` back to itself that only passes through
    /// functions accepted by `allowed`
    ///
    /// The returned path starts and ends with `from`.
    pub fn find_cycle(
        &self,
        from: FunctionId,
        allowed: impl Fn(FunctionId) -> bool,
    ) -> Option<Vec<FunctionId>> {
        let mut parent: FxHashMap<FunctionId, FunctionId> = FxHashMap::default();
        let mut worklist = vec![from];
        let mut visited = FxHashSet::default();

        while let Some(current) = worklist.pop() {
            for callee in self.callees(current) {
                if callee == from {
                    let mut path = vec![current];
                    let mut cursor = current;
                    while cursor != from {
                        cursor = parent[&cursor];
                        path.push(cursor);
                    }
                    path.reverse();
                    path.push(from);
                    return Some(path);
                }
                if allowed(callee) && visited.insert(callee) {
                    parent.insert(callee, current);
                    worklist.push(callee);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::{Function, FunctionBuilder, Type, Value};

    /// Builds a module of void functions calling each other along `edges`
    fn module_with_edges(count: usize, edges: &[(usize, usize)]) -> (Module, Vec<FunctionId>) {
        let mut module = Module::new("graph");
        let ids: Vec<FunctionId> = (0..count)
            .map(|i| module.add_function(Function::new(format!("f{i}"), Type::Void)))
            .collect();
        for &(caller, callee) in edges {
            let function = module.get_function_mut(ids[caller]).unwrap();
            FunctionBuilder::new(function).call(Type::Void, Value::function(ids[callee]), vec![]);
        }
        for &id in &ids {
            FunctionBuilder::new(module.get_function_mut(id).unwrap()).ret_void();
        }
        (module, ids)
    }

    #[test]
    fn test_transitive_callees_follow_chains() {
        let (module, f) = module_with_edges(4, &[(0, 1), (1, 2), (1, 2), (3, 0)]);
        let graph = CallGraph::build(&module);

        assert_eq!(graph.callees(f[1]), vec![f[2]]);
        assert_eq!(
            graph.transitive_callees(f[3]),
            [f[0], f[1], f[2]].into_iter().collect::<FxHashSet<_>>()
        );
        assert!(graph.transitive_callees(f[2]).is_empty());
    }

    #[test]
    fn test_cycles_terminate_and_include_self() {
        let (module, f) = module_with_edges(3, &[(0, 1), (1, 2), (2, 0)]);
        let graph = CallGraph::build(&module);

        let reachable = graph.transitive_callees(f[0]);
        assert_eq!(reachable.len(), 3);
        assert!(reachable.contains(&f[0]));
    }

    #[test]
    fn test_indirect_calls_have_no_callee() {
        let (mut module, f) = module_with_edges(1, &[]);
        let function = module.get_function_mut(f[0]).unwrap();
        let entry = function.entry_block;
        function.basic_blocks[entry].instructions.insert(
            0,
            squishy_ir::Instruction::call(None, Type::Void, Value::null(), vec![]),
        );

        let graph = CallGraph::build(&module);
        assert_eq!(graph.node(f[0]).unwrap().callees, vec![None]);
        assert!(graph.callees(f[0]).is_empty());
    }

    #[test]
    fn test_find_cycle_respects_allowed_set() {
        let (module, f) = module_with_edges(3, &[(0, 1), (1, 0), (1, 2), (2, 2)]);
        let graph = CallGraph::build(&module);

        assert_eq!(graph.find_cycle(f[0], |_| true), Some(vec![f[0], f[1], f[0]]));
        assert_eq!(graph.find_cycle(f[0], |id| id != f[1]), None);
        assert_eq!(graph.find_cycle(f[2], |_| true), Some(vec![f[2], f[2]]));
    }
}
