//! Scope chain scenarios with a full collection before every allocation
//!
//! Any handle that is reachable only from a Rust local while something
//! allocates is reclaimed here, so these runs catch missing roots.

use jsscope::runtime::{CompiledFunction, LocalDecl, ScopeInfo};
use jsscope::{ContextRef, ContextType, Engine, EngineConfig, Value};
use pretty_assertions::assert_eq;

fn stressed() -> Engine {
    Engine::new(EngineConfig::default().gc_stress(true)).unwrap()
}

#[test]
fn test_function_body_under_stress() {
    // function f(a) { var v; let l; { let b; try {} catch (e) {} } }
    let mut engine = stressed();
    let [a, v, l, b, e, dynamic, leaked] =
        ["a", "v", "l", "b", "e", "dynamic", "leaked"].map(|n| engine.intern(n));
    let id = engine.register_function(CompiledFunction {
        scope: ScopeInfo::new(vec![a], vec![LocalDecl::var(v), LocalDecl::let_(l)]),
        blocks: vec![
            ScopeInfo::block(vec![LocalDecl::let_(b)]),
            ScopeInfo::block(vec![LocalDecl::let_(e)]),
        ],
        ..Default::default()
    });
    let f = engine.new_function(id, engine.global_context()).unwrap();
    engine.push_root(f.to_value());
    let arg = engine.new_object().unwrap();
    engine.push_root(arg.to_value());

    let mut frame = engine.enter_function(f, vec![arg.to_value()]).unwrap();
    let mark = engine.root_frame(&frame);
    let call = frame.context();
    engine.initialize_binding(call, l, Value::int(1)).unwrap();

    let block = engine.new_block_context(&frame, 0).unwrap();
    engine.push_root(block.to_value());
    frame.set_context(block);
    engine.initialize_binding(block, b, Value::int(2)).unwrap();

    engine.create_mutable_binding(block, dynamic, true).unwrap();
    let payload = engine.new_object().unwrap();
    engine.set_property(block, dynamic, payload.to_value()).unwrap();
    engine.set_property(block, leaked, Value::int(3)).unwrap();

    engine.throw(Value::int(4));
    let catch = engine.new_catch_context(&frame, 1, e).unwrap();
    engine.push_root(catch.to_value());
    engine.gc();

    assert_eq!(engine.get_property(catch, e), Ok(Value::int(4)));
    assert_eq!(engine.get_property(catch, b), Ok(Value::int(2)));
    assert_eq!(engine.get_property(catch, l), Ok(Value::int(1)));
    assert_eq!(engine.get_property(catch, v), Ok(Value::undefined()));
    assert_eq!(engine.get_property(catch, a), Ok(arg.to_value()));
    assert_eq!(engine.get_property(catch, dynamic), Ok(payload.to_value()));
    assert_eq!(
        engine.get_property(engine.global_context(), leaked),
        Ok(Value::int(3))
    );

    let heap = engine.heap();
    assert!(heap.is_valid_ref(payload.heap_ref()));
    assert!(heap.is_valid_ref(call.activation(heap).unwrap().heap_ref()));
    assert_eq!(catch.outer(heap), Some(block));
    engine.release_roots(mark);
}

#[test]
fn test_loop_closures_under_stress() {
    // for (let i = 0; i < 40; i++) { closures.push(() => i) }
    let mut engine = stressed();
    let i = engine.intern("i");
    let id = engine.register_function(CompiledFunction {
        blocks: vec![ScopeInfo::block(vec![LocalDecl::let_(i)])],
        ..Default::default()
    });
    let inner_id = engine.register_function(CompiledFunction::default());
    let f = engine.new_function(id, engine.global_context()).unwrap();
    engine.push_root(f.to_value());

    let frame = engine.enter_function(f, vec![]).unwrap();
    let mark = engine.root_frame(&frame);
    let mut block = engine.new_block_context(&frame, 0).unwrap();
    engine.push_root(block.to_value());
    engine.initialize_binding(block, i, Value::int(0)).unwrap();

    let mut closures = Vec::new();
    for n in 0..40 {
        let closure = engine.new_function(inner_id, block).unwrap();
        engine.push_root(closure.to_value());
        closures.push(closure);
        block = engine.clone_block_context(block).unwrap();
        engine.push_root(block.to_value());
        engine.set_property(block, i, Value::int(n + 1)).unwrap();
    }

    for (n, closure) in closures.into_iter().enumerate() {
        let heap = engine.heap();
        let scope = ContextRef::from_value(heap, closure.scope(heap)).unwrap();
        assert_eq!(scope.context_type(heap), ContextType::Block);
        assert_eq!(engine.get_property(scope, i), Ok(Value::int(n as i32)));
    }
    engine.release_roots(mark);
}

#[test]
fn test_object_scopes_under_stress() {
    let mut engine = stressed();
    let [shared, declared] = ["shared", "declared"].map(|n| engine.intern(n));
    let global = engine.global_context();

    let scope_object = engine.new_object().unwrap();
    engine.push_root(scope_object.to_value());
    scope_object.put(&mut engine, shared, Value::int(1)).unwrap();
    let qml = engine.new_qml_context(global, scope_object).unwrap();
    engine.push_root(qml.to_value());
    let with_object = engine.new_object().unwrap();
    let with = engine.new_with_context(qml, with_object).unwrap();
    engine.push_root(with.to_value());

    engine.create_mutable_binding(with, declared, false).unwrap();
    engine.set_property(with, declared, Value::int(2)).unwrap();
    engine.set_property(with, shared, Value::int(3)).unwrap();

    assert_eq!(
        engine.get_property_and_base(with, shared),
        Ok((Value::int(3), Some(scope_object)))
    );
    assert_eq!(scope_object.get(engine.heap(), declared), Some(Value::int(2)));
    assert!(!with_object.has_property(engine.heap(), declared));
    assert!(!engine.delete_property(with, declared));
    assert!(engine.heap().is_valid_ref(with_object.heap_ref()));
}
