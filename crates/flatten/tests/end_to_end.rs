use squishy_flatten::{flatten, FlattenConfig, FlattenError, GlobalFlattener, Pipeline};
use squishy_ir::{
    verify_module, BasicBlockId, BinaryOp, CastOp, ComparePredicate, Constant, Function,
    FunctionBuilder, FunctionId, GlobalVariable, InstructionKind, Module, Type, Value, ValueId,
    VerifyError,
};

/// Adds the back edge `(value, latch)` to the phi at the top of `header`
fn close_loop(function: &mut Function, header: BasicBlockId, value: ValueId, latch: BasicBlockId) {
    match &mut function.basic_blocks[header].instructions[0].kind {
        InstructionKind::Phi { incoming, .. } => incoming.push((Value::local(value), latch)),
        other => panic!("expected a phi, found {other:?}"),
    }
}

/// `i64 _strlen(ptr s)`
fn build_strlen(module: &mut Module) -> FunctionId {
    let id = module.add_function(Function::new("_strlen", Type::i64()));
    let function = module.get_function_mut(id).unwrap();
    let s = function.add_parameter(Type::Ptr, Some("s".into()));
    let mut builder = FunctionBuilder::new(function);
    let entry = builder.current_block();
    let head = builder.create_block("loop");
    let done = builder.create_block("done");
    builder.jump(head);

    builder.switch_to(head);
    let i = builder.phi(Type::i64(), vec![(Value::int(Type::i64(), 0), entry)]);
    let p = builder.element_ptr(Type::i8(), Value::local(s), vec![Value::local(i)]);
    let c = builder.load(Type::i8(), Value::local(p));
    let is_nul = builder.compare(ComparePredicate::Eq, Value::local(c), Value::int(Type::i8(), 0));
    let next = builder.binary(BinaryOp::Add, Type::i64(), Value::local(i), Value::int(Type::i64(), 1));
    builder.branch(Value::local(is_nul), done, head);

    builder.switch_to(done);
    builder.ret(Value::local(i));

    close_loop(function, head, next, head);
    id
}

/// `ptr _strcpy(ptr dst, ptr src)`
fn build_strcpy(module: &mut Module) -> FunctionId {
    let id = module.add_function(Function::new("_strcpy", Type::Ptr));
    let function = module.get_function_mut(id).unwrap();
    let dst = function.add_parameter(Type::Ptr, Some("dst".into()));
    let src = function.add_parameter(Type::Ptr, Some("src".into()));
    let mut builder = FunctionBuilder::new(function);
    let entry = builder.current_block();
    let head = builder.create_block("loop");
    let done = builder.create_block("done");
    builder.jump(head);

    builder.switch_to(head);
    let i = builder.phi(Type::i64(), vec![(Value::int(Type::i64(), 0), entry)]);
    let from = builder.element_ptr(Type::i8(), Value::local(src), vec![Value::local(i)]);
    let c = builder.load(Type::i8(), Value::local(from));
    let to = builder.element_ptr(Type::i8(), Value::local(dst), vec![Value::local(i)]);
    builder.store(Value::local(c), Value::local(to));
    let is_nul = builder.compare(ComparePredicate::Eq, Value::local(c), Value::int(Type::i8(), 0));
    let next = builder.binary(BinaryOp::Add, Type::i64(), Value::local(i), Value::int(Type::i64(), 1));
    builder.branch(Value::local(is_nul), done, head);

    builder.switch_to(done);
    builder.ret(Value::local(dst));

    close_loop(function, head, next, head);
    id
}

/// `i64 _copier(ptr src)`: copies into a stack buffer and measures it
fn build_copier(module: &mut Module, strcpy: FunctionId, strlen: FunctionId) -> FunctionId {
    let id = module.add_function(Function::new("_copier", Type::i64()));
    let function = module.get_function_mut(id).unwrap();
    let src = function.add_parameter(Type::Ptr, Some("src".into()));
    let mut builder = FunctionBuilder::new(function);
    let buffer = builder.alloca_named(Type::array(Type::i8(), 64), "buffer");
    builder.call(
        Type::Ptr,
        Value::function(strcpy),
        vec![Value::local(buffer), Value::local(src)],
    );
    let len = builder
        .call(Type::i64(), Value::function(strlen), vec![Value::local(buffer)])
        .unwrap();
    builder.ret(Value::local(len));
    id
}

fn copier_program() -> (Module, FunctionId, FunctionId) {
    let mut module = Module::new("copier");
    let printf = module.add_function(Function::declaration("printf", Type::i32(), vec![Type::Ptr], true));
    let strlen = build_strlen(&mut module);
    let strcpy = build_strcpy(&mut module);
    let copier = build_copier(&mut module, strcpy, strlen);

    let message = module.add_global(
        GlobalVariable::new("message", Type::array(Type::i8(), 6))
            .with_initializer(Constant::c_string("hello")),
    );
    let format = module.add_global(
        GlobalVariable::new("format", Type::array(Type::i8(), 5))
            .with_initializer(Constant::c_string("%ld\n")),
    );

    let main = module.add_function(Function::new("main", Type::i32()));
    let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
    let len = builder
        .call(Type::i64(), Value::function(copier), vec![Value::global(message)])
        .unwrap();
    builder.call(
        Type::i32(),
        Value::function(printf),
        vec![Value::global(format), Value::local(len)],
    );
    builder.ret(Value::i32(0));

    (module, main, printf)
}

fn calls_in(module: &Module, function: FunctionId) -> Vec<Value> {
    let function = module.get_function(function).unwrap();
    function
        .basic_blocks
        .iter()
        .flat_map(|block| &block.instructions)
        .filter_map(|instr| instr.callee().cloned())
        .collect()
}

#[test]
fn test_copier_program_flattens_into_main() {
    let (mut module, main, printf) = copier_program();
    assert_eq!(verify_module(&module), Ok(()));

    let report = flatten(&mut module, &FlattenConfig::default()).unwrap();

    assert_eq!(report.root, "main");
    assert_eq!(report.calls_inlined, 3);
    assert_eq!(report.functions_erased.len(), 3);
    for name in ["_copier", "_strcpy", "_strlen"] {
        assert!(report.functions_erased.iter().any(|erased| erased == name));
        assert!(module.lookup_function(name).is_none());
    }
    assert_eq!(report.globals_localized, vec!["message", "format"]);
    assert_eq!(report.dead_calls_swept, 0);

    assert_eq!(module.defined_functions(), vec![main]);
    assert_eq!(module.global_count(), 0);
    assert_eq!(calls_in(&module, main), vec![Value::function(printf)]);
    assert_eq!(verify_module(&module), Ok(()));
}

#[test]
fn test_function_pointer_references_become_poison() {
    let mut module = Module::new("pointers");
    let helper = module.add_function(Function::new("helper", Type::Void));
    FunctionBuilder::new(module.get_function_mut(helper).unwrap()).ret_void();
    let slot = module.add_global(
        GlobalVariable::new("callback", Type::Ptr).with_initializer(Constant::Function(helper)),
    );
    let main = module.add_function(Function::new("main", Type::Void));
    let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
    builder.call(Type::Void, Value::function(helper), vec![]);
    builder.call(Type::Void, Value::function(helper), vec![]);
    let loaded = builder.load(Type::Ptr, Value::global(slot));
    builder.call(Type::Void, Value::local(loaded), vec![]);
    builder.ret_void();

    let report = flatten(&mut module, &FlattenConfig::default()).unwrap();

    assert_eq!(report.calls_inlined, 2);
    assert_eq!(report.functions_erased, vec!["helper"]);
    assert_eq!(report.globals_localized, vec!["callback"]);
    assert_eq!(report.dead_calls_swept, 0);

    // the indirect call survives and now loads the placeholder
    assert_eq!(calls_in(&module, main).len(), 1);
    let function = module.get_function(main).unwrap();
    let entry = &function.basic_blocks[function.entry_block];
    assert!(matches!(
        &entry.instructions[1].kind,
        InstructionKind::Store { value, .. } if *value == Value::poison(Type::Ptr)
    ));
    assert_eq!(verify_module(&module), Ok(()));
}

#[test]
fn test_calls_through_casts_of_erased_functions_are_swept() {
    let mut module = Module::new("casts");
    let helper = module.add_function(Function::new("helper", Type::i32()));
    FunctionBuilder::new(module.get_function_mut(helper).unwrap()).ret(Value::i32(1));
    let main = module.add_function(Function::new("main", Type::i32()));
    let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
    let direct = builder
        .call(Type::i32(), Value::function(helper), vec![])
        .unwrap();
    let through_cast = Constant::cast(CastOp::Bitcast, Constant::Function(helper), Type::Ptr);
    let indirect = builder
        .call(Type::i32(), Value::Constant(through_cast), vec![])
        .unwrap();
    let sum = builder.binary(BinaryOp::Add, Type::i32(), Value::local(direct), Value::local(indirect));
    builder.ret(Value::local(sum));

    let report = flatten(&mut module, &FlattenConfig::default()).unwrap();

    assert_eq!(report.calls_inlined, 1);
    assert_eq!(report.dead_calls_swept, 1);
    assert!(calls_in(&module, main).is_empty());
    assert_eq!(verify_module(&module), Ok(()));
}

#[test]
fn test_nested_aggregate_references_become_stores() {
    let mut module = Module::new("aggregates");
    let leaf_ty = Type::array(Type::i32(), 2);
    let leaf = module.add_global(
        GlobalVariable::new("leaf", leaf_ty.clone()).with_initializer(Constant::aggregate(
            leaf_ty.clone(),
            vec![Constant::i32(3), Constant::i32(4)],
        )),
    );
    let inner_ty = Type::structure(vec![Type::i32(), Type::Ptr]);
    let outer_ty = Type::structure(vec![Type::Ptr, inner_ty.clone()]);
    let outer = module.add_global(
        GlobalVariable::new("outer", outer_ty.clone()).with_initializer(Constant::aggregate(
            outer_ty.clone(),
            vec![
                Constant::Global(leaf),
                Constant::aggregate(
                    inner_ty,
                    vec![
                        Constant::i32(9),
                        Constant::element_ptr(leaf_ty, Constant::Global(leaf), vec![0, 1]),
                    ],
                ),
            ],
        )),
    );

    let reader = module.add_function(Function::new("reader", Type::Ptr));
    {
        let mut builder = FunctionBuilder::new(module.get_function_mut(reader).unwrap());
        let loaded = builder.load(Type::Ptr, Value::global(outer));
        builder.ret(Value::local(loaded));
    }
    let main = module.add_function(Function::new("main", Type::i32()));
    {
        let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
        let pointer = builder
            .call(Type::Ptr, Value::function(reader), vec![])
            .unwrap();
        let value = builder.load(Type::i32(), Value::local(pointer));
        builder.ret(Value::local(value));
    }

    let report = flatten(&mut module, &FlattenConfig::default()).unwrap();
    assert_eq!(report.globals_localized, vec!["leaf", "outer"]);
    assert_eq!(module.global_count(), 0);

    let function = module.get_function(main).unwrap();
    let entry = &function.basic_blocks[function.entry_block];
    let kinds: Vec<&str> = entry
        .instructions
        .iter()
        .take(8)
        .map(|instr| match instr.kind {
            InstructionKind::Alloca { .. } => "alloca",
            InstructionKind::Store { .. } => "store",
            InstructionKind::ElementPtr { .. } => "gep",
            _ => "other",
        })
        .collect();
    // two slots, the leaf initializer, the neutralized outer initializer,
    // then its two element stores in element order
    assert_eq!(
        kinds,
        vec!["alloca", "alloca", "store", "store", "gep", "store", "gep", "gep"]
    );
    let mut remaining_globals = false;
    function.for_each_operand(|operand| {
        if let Value::Constant(constant) = operand {
            remaining_globals |= !constant.referenced_globals().is_empty() || constant.is_expr();
        }
    });
    assert!(!remaining_globals);
    assert_eq!(verify_module(&module), Ok(()));
}

#[test]
fn test_memcpy_definition_is_never_inlined() {
    let mut module = Module::new("memcpy");
    let memcpy = module.add_function(Function::new("memcpy", Type::Ptr));
    {
        let function = module.get_function_mut(memcpy).unwrap();
        let dst = function.add_parameter(Type::Ptr, None);
        function.add_parameter(Type::Ptr, None);
        function.add_parameter(Type::i64(), None);
        FunctionBuilder::new(function).ret(Value::local(dst));
    }
    let main = module.add_function(Function::new("main", Type::Void));
    let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
    builder.call(
        Type::Ptr,
        Value::function(memcpy),
        vec![Value::null(), Value::null(), Value::int(Type::i64(), 8)],
    );
    builder.ret_void();
    let before = module.clone();

    let err = flatten(&mut module, &FlattenConfig::default()).unwrap_err();
    assert!(matches!(err, FlattenError::LibraryRoutine { ref name } if name == "memcpy"));
    assert_eq!(module, before);
}

#[test]
fn test_shared_global_fails_without_inlining() {
    let mut module = Module::new("shared");
    let total = module.add_global(GlobalVariable::new("total", Type::i32()));
    for name in ["main", "report"] {
        let id = module.add_function(Function::new(name, Type::Void));
        let mut builder = FunctionBuilder::new(module.get_function_mut(id).unwrap());
        builder.store(Value::i32(1), Value::global(total));
        builder.ret_void();
    }

    let mut report = squishy_flatten::FlattenReport::default();
    let err = Pipeline::new()
        .add_pass(GlobalFlattener::new())
        .run(&mut module, &mut report)
        .unwrap_err();

    assert!(matches!(err, FlattenError::SharedGlobal { ref owners, .. } if owners.len() == 2));
    assert!(err.to_string().contains("main, report"));
}

#[test]
fn test_missing_main_is_an_error() {
    let mut module = Module::new("empty");
    let start = module.add_function(Function::new("start", Type::Void));
    FunctionBuilder::new(module.get_function_mut(start).unwrap()).ret_void();

    let err = flatten(&mut module, &FlattenConfig::default()).unwrap_err();
    assert!(matches!(err, FlattenError::NoRoot { ref name } if name == "main"));

    let report = flatten(&mut module, &FlattenConfig::default().with_root("start")).unwrap();
    assert_eq!(report.root, "start");
}

#[test]
fn test_malformed_input_is_rejected_before_rewriting() {
    let mut module = Module::new("dangling");
    let helper = module.add_function(Function::new("helper", Type::Void));
    FunctionBuilder::new(module.get_function_mut(helper).unwrap()).ret_void();
    let main = module.add_function(Function::new("main", Type::Void));
    let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
    builder.call(Type::Void, Value::function(helper), vec![]);
    builder.jump(BasicBlockId::from_usize(99));
    let before = module.clone();

    let err = flatten(&mut module, &FlattenConfig::default()).unwrap_err();

    match &err {
        FlattenError::MalformedInput { errors } => {
            assert!(errors
                .iter()
                .any(|e| matches!(e, VerifyError::InvalidTarget { target, .. } if *target == BasicBlockId::from_usize(99))));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("input module is malformed"));
    assert_eq!(module, before);
}
