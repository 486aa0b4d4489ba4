//! Tests for the textual dump of modules.

use crate::{
    BinaryOp, Constant, Function, FunctionBuilder, GlobalVariable, Module, PrettyPrint, Type,
    Value,
};

#[test]
fn test_module_dump() {
    let mut module = Module::new("demo");
    let counter = module.add_global(
        GlobalVariable::new("counter", Type::i32()).with_initializer(Constant::i32(7)),
    );
    let puts = module.add_function(Function::declaration(
        "puts",
        Type::i32(),
        vec![Type::Ptr],
        false,
    ));

    let mut main = Function::new("main", Type::i32());
    let mut builder = FunctionBuilder::new(&mut main);
    let value = builder.load(Type::i32(), Value::global(counter));
    let sum = builder.binary(BinaryOp::Add, Type::i32(), Value::local(value), Value::i32(1));
    builder.call(Type::i32(), Value::function(puts), vec![Value::null()]);
    builder.ret(Value::local(sum));
    let main = module.add_function(main);
    module.set_entry(main);

    let expected = "\
; module demo
; entry @main
@counter = internal global i32 7, align 4 ; g0

; f0
declare i32 @puts(ptr %0)

; f1
define i32 @main() {
bb0: ; entry
  %0 = load i32, ptr @g0, align 4
  %1 = add i32 %0, i32 1
  %2 = call i32 ptr @f0(ptr null)
  ret %1
}
";
    assert_eq!(module.pretty_print(0), expected);
}

#[test]
fn test_function_dump_shows_phis_and_branches() {
    let mut function = Function::new("pick", Type::i32());
    let flag = function.add_parameter(Type::i1(), Some("flag".into()));
    let mut builder = FunctionBuilder::new(&mut function);
    let left = builder.create_block("left");
    let join = builder.create_block("join");
    let entry = builder.current_block();
    builder.branch(Value::local(flag), left, join);
    builder.switch_to(left);
    builder.jump(join);
    builder.switch_to(join);
    let merged = builder.phi(
        Type::i32(),
        vec![(Value::i32(1), entry), (Value::i32(2), left)],
    );
    builder.ret(Value::local(merged));

    let text = function.pretty_print(0);
    assert!(text.starts_with("define i32 @pick(i1 %0) { ; %0 = flag\n"));
    assert!(text.contains("  br %0, bb1, bb2\n"));
    assert!(text.contains("bb2: ; join\n  %1 = phi i32 [ i32 1, bb0 ], [ i32 2, bb1 ]\n"));
}
