//! Element-wise rewriting of constant aggregate stores.
//!
//! A stored aggregate may contain references to globals that are about to
//! become stack slots, or constant expressions over them. Neither can stay
//! inside a constant once the global is gone, so each such element is stored
//! separately through an explicit address computation:
//!
//! ```text
//! store { i32 1, ptr @x } %cfg
//! ```
//!
//! becomes
//!
//! ```text
//! store { i32 1, ptr undef } %cfg
//! %1 = getelementptr inbounds { i32, ptr }, ptr %cfg, i32 0, i32 1
//! store ptr @x, ptr %1
//! ```

use rustc_hash::FxHashSet;
use squishy_ir::{Constant, Function, GlobalId, Instruction, Type, Value};

/// Walks one stored aggregate, collecting the element stores to emit after it
pub struct Disaggregator<'a> {
    function: &'a mut Function,
    tracked: &'a FxHashSet<GlobalId>,
    /// Type of the whole stored aggregate
    source: Type,
    /// Address the aggregate is stored to
    base: Value,
    /// Indices from the aggregate root to the element being visited
    path: Vec<i64>,
    stores: Vec<Instruction>,
}

impl<'a> Disaggregator<'a> {
    pub fn new(
        function: &'a mut Function,
        tracked: &'a FxHashSet<GlobalId>,
        source: Type,
        base: Value,
    ) -> Self {
        Self {
            function,
            tracked,
            source,
            base,
            path: Vec::new(),
            stores: Vec::new(),
        }
    }

    /// Neutralizes the split elements of `aggregate` in place
    ///
    /// Returns the address computations and stores, in element order, that
    /// must follow the store of the neutralized aggregate.
    pub fn run(mut self, aggregate: &mut Constant) -> Vec<Instruction> {
        if let Constant::Aggregate { elements, .. } = aggregate {
            self.walk(elements);
        }
        self.stores
    }

    fn walk(&mut self, elements: &mut [Constant]) {
        for (index, element) in elements.iter_mut().enumerate() {
            self.path.push(index as i64);
            let split = match element {
                Constant::Aggregate { elements, .. } => {
                    self.walk(elements);
                    false
                }
                Constant::Expr(_) => true,
                Constant::Global(global) => self.tracked.contains(global),
                _ => false,
            };
            if split {
                self.split(element);
            }
            self.path.pop();
        }
    }

    fn split(&mut self, element: &mut Constant) {
        let ty = element.ty();
        let value = std::mem::replace(element, Constant::Undef(ty.clone()));

        let address = self.function.new_value(Type::Ptr);
        let indices = std::iter::once(0)
            .chain(self.path.iter().copied())
            .map(Value::i32)
            .collect();
        self.stores.push(Instruction::element_ptr(
            address,
            self.source.clone(),
            self.base.clone(),
            indices,
        ));
        self.stores.push(Instruction::store(
            Value::Constant(value),
            Value::local(address),
            ty.abi_align(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::{CastOp, InstructionKind};

    #[test]
    fn test_nested_elements_follow_their_path() {
        let x = GlobalId::from_usize(0);
        let untracked = GlobalId::from_usize(1);
        let tracked: FxHashSet<GlobalId> = [x].into_iter().collect();

        let inner_ty = Type::structure(vec![Type::i32(), Type::Ptr]);
        let outer_ty = Type::structure(vec![Type::Ptr, inner_ty.clone(), Type::Ptr]);
        let mut aggregate = Constant::aggregate(
            outer_ty.clone(),
            vec![
                Constant::Global(untracked),
                Constant::aggregate(inner_ty, vec![Constant::i32(5), Constant::Global(x)]),
                Constant::cast(CastOp::Bitcast, Constant::Global(x), Type::Ptr),
            ],
        );

        let mut function = Function::new("main", Type::Void);
        let base = function.new_value(Type::Ptr);
        let stores = Disaggregator::new(&mut function, &tracked, outer_ty.clone(), Value::local(base))
            .run(&mut aggregate);

        assert_eq!(stores.len(), 4);
        let paths: Vec<Vec<Value>> = stores
            .iter()
            .filter_map(|instr| match &instr.kind {
                InstructionKind::ElementPtr { source, indices, .. } => {
                    assert_eq!(source, &outer_ty);
                    Some(indices.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                vec![Value::i32(0), Value::i32(1), Value::i32(1)],
                vec![Value::i32(0), Value::i32(2)],
            ]
        );
        match &stores[1].kind {
            InstructionKind::Store { value, align, .. } => {
                assert_eq!(value, &Value::global(x));
                assert_eq!(*align, 8);
            }
            other => panic!("expected a store, found {other:?}"),
        }

        assert!(!aggregate.references_global(x));
        assert!(aggregate.references_global(untracked));
        assert_eq!(
            aggregate.element(1).and_then(|inner| inner.element(1)),
            Some(&Constant::Undef(Type::Ptr))
        );
        assert_eq!(aggregate.element(2), Some(&Constant::Undef(Type::Ptr)));
    }

    #[test]
    fn test_plain_aggregates_are_left_alone() {
        let tracked = FxHashSet::default();
        let ty = Type::array(Type::i32(), 2);
        let original = Constant::aggregate(ty.clone(), vec![Constant::i32(1), Constant::i32(2)]);
        let mut aggregate = original.clone();

        let mut function = Function::new("main", Type::Void);
        let base = function.new_value(Type::Ptr);
        let stores =
            Disaggregator::new(&mut function, &tracked, ty, Value::local(base)).run(&mut aggregate);

        assert!(stores.is_empty());
        assert_eq!(aggregate, original);
    }
}
