//! Identifier resolution along the scope chain
//!
//! Each operation walks `outer` links from the starting context and stops at
//! the first context that binds the name:
//! - Call and Block contexts match their declared locals (and a Call context
//!   its formals) by slot; a Call context that was given an activation
//!   object consults it afterwards
//! - Global, With and QML contexts match properties of their activation
//!
//! The innermost binding always wins. Failures are detected before anything
//! is written, so a failed operation leaves every context unchanged.

use super::layout::ACTIVATION;
use super::{ContextRef, ContextType, InlineScope};
use crate::engine::Engine;
use crate::error::{ContextError, Result};
use crate::runtime::{Atom, BindingKind, ObjectRef, PropertyAttributes};
use crate::value::Value;
use crate::vm::Frame;

/// Where a name is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Inline slot of a Call or Block context
    Slot {
        scope: InlineScope,
        index: usize,
        kind: BindingKind,
    },
    /// Property of a context's activation object
    Property {
        context: ContextRef,
        object: ObjectRef,
    },
}

impl Binding {
    /// Context that holds the binding
    pub fn context(self) -> ContextRef {
        match self {
            Binding::Slot { scope, .. } => scope.context(),
            Binding::Property { context, .. } => context,
        }
    }
}

impl Engine {
    /// Binding of `name` declared directly in `ctx`
    fn find_own_binding(&self, ctx: ContextRef, name: Atom) -> Option<Binding> {
        let heap = &self.heap;
        if let Some(scope) = ctx.as_inline_scope(heap) {
            let info = self.scope_info(scope.scope_id(heap));
            if let Some(index) = info.local_index(name) {
                let kind = info.locals()[index].kind;
                return Some(Binding::Slot { scope, index, kind });
            }
            if let Some(formal) = info.formal_index(name) {
                return Some(Binding::Slot {
                    scope,
                    index: info.n_locals() + formal,
                    kind: BindingKind::Var,
                });
            }
        }
        let object = ctx.activation(heap)?;
        object
            .has_property(heap, name)
            .then_some(Binding::Property {
                context: ctx,
                object,
            })
    }

    /// Walk from `ctx`, returning the innermost binding and its distance
    fn lookup(&self, ctx: ContextRef, name: Atom, skip_qml: bool) -> Option<(Binding, usize)> {
        let mut current = Some(ctx);
        let mut depth = 0;
        while let Some(c) = current {
            let skip = skip_qml && c.context_type(&self.heap) == ContextType::QmlContext;
            if !skip {
                if let Some(binding) = self.find_own_binding(c, name) {
                    tracing::trace!(name = self.atom_name(name), depth, "resolved");
                    return Some((binding, depth));
                }
            }
            current = c.outer(&self.heap);
            depth += 1;
        }
        tracing::trace!(name = self.atom_name(name), depth, "unresolved");
        None
    }

    /// Innermost binding of `name` visible from `ctx`
    pub fn resolve_binding(&self, ctx: ContextRef, name: Atom) -> Option<Binding> {
        self.lookup(ctx, name, false).map(|(binding, _)| binding)
    }

    /// Number of `outer` steps from `ctx` to the context binding `name`
    pub fn resolve_depth(&self, ctx: ContextRef, name: Atom) -> Option<usize> {
        self.lookup(ctx, name, false).map(|(_, depth)| depth)
    }

    fn name_string(&self, name: Atom) -> String {
        self.atom_name(name).to_string()
    }

    fn read_binding(&self, binding: Binding, name: Atom) -> Result<Value> {
        match binding {
            Binding::Slot { scope, index, .. } => {
                let value = scope.slot(&self.heap, index);
                if value.is_empty() {
                    return Err(ContextError::TemporalDeadZone(self.name_string(name)));
                }
                Ok(value)
            }
            Binding::Property { object, .. } => {
                Ok(object.get(&self.heap, name).unwrap_or_default())
            }
        }
    }

    /// Read `name` as seen from `ctx`
    pub fn get_property(&self, ctx: ContextRef, name: Atom) -> Result<Value> {
        match self.lookup(ctx, name, false) {
            Some((binding, _)) => self.read_binding(binding, name),
            None => Err(ContextError::Unresolved(self.name_string(name))),
        }
    }

    /// Read `name` together with the object it was found on
    ///
    /// The base is the activation of a Global, With or QML context; names in
    /// inline slots or in a call context's activation have no base.
    pub fn get_property_and_base(
        &self,
        ctx: ContextRef,
        name: Atom,
    ) -> Result<(Value, Option<ObjectRef>)> {
        let Some((binding, _)) = self.lookup(ctx, name, false) else {
            return Err(ContextError::Unresolved(self.name_string(name)));
        };
        let value = self.read_binding(binding, name)?;
        let base = match binding {
            Binding::Property { context, object }
                if context.context_type(&self.heap) != ContextType::Call =>
            {
                Some(object)
            }
            _ => None,
        };
        Ok((value, base))
    }

    /// Store into an existing binding
    fn write_binding(&mut self, binding: Binding, name: Atom, value: Value) -> Result<()> {
        match binding {
            Binding::Slot {
                kind: BindingKind::Const,
                ..
            } => Err(ContextError::ConstAssignment(self.name_string(name))),
            Binding::Slot { scope, index, .. } => {
                scope.set_slot(&mut self.heap, index, value);
                Ok(())
            }
            Binding::Property { object, .. } => {
                if object.put(self, name, value)? {
                    Ok(())
                } else {
                    Err(ContextError::ReadOnly(self.name_string(name)))
                }
            }
        }
    }

    /// Assign `name` from `ctx` with sloppy-mode semantics
    ///
    /// An unresolved name becomes a property of the global object. Writing a
    /// `let` slot that is still in its dead zone initializes it.
    pub fn set_property(&mut self, ctx: ContextRef, name: Atom, value: Value) -> Result<()> {
        if let Some((binding, _)) = self.lookup(ctx, name, false) {
            return self.write_binding(binding, name, value);
        }
        let global = self.global_object();
        let mark = self.root_mark();
        self.push_root(ctx.to_value());
        let result = global.put(self, name, value);
        self.release_roots(mark);
        if result? {
            tracing::debug!(name = self.atom_name(name), "implicit global created");
            Ok(())
        } else {
            Err(ContextError::ReadOnly(self.name_string(name)))
        }
    }

    /// Assign `name` from `ctx` with strict-mode semantics
    pub fn set_property_strict(&mut self, ctx: ContextRef, name: Atom, value: Value) -> Result<()> {
        match self.lookup(ctx, name, false) {
            Some((binding, _)) => self.write_binding(binding, name, value),
            None => Err(ContextError::Unresolved(self.name_string(name))),
        }
    }

    /// Assign `name` from the frame's current context
    ///
    /// Strict functions use [`set_property_strict`], others [`set_property`].
    ///
    /// [`set_property_strict`]: Engine::set_property_strict
    /// [`set_property`]: Engine::set_property
    pub fn assign(&mut self, frame: &Frame, name: Atom, value: Value) -> Result<()> {
        let ctx = frame.context();
        if self.is_strict(frame.function()) {
            self.set_property_strict(ctx, name, value)
        } else {
            self.set_property(ctx, name, value)
        }
    }

    /// Delete `name` as seen from `ctx`
    ///
    /// Declared bindings and non-configurable properties are not deleted, nor
    /// is an unresolved name. QML scopes are passed over.
    pub fn delete_property(&mut self, ctx: ContextRef, name: Atom) -> bool {
        match self.lookup(ctx, name, true) {
            Some((Binding::Property { object, .. }, _)) => object.delete(&mut self.heap, name),
            Some((Binding::Slot { .. }, _)) | None => false,
        }
    }

    /// Declare a `var`-style binding for code running in `ctx`
    ///
    /// The binding goes to the nearest Call context, QML context or the
    /// global context. A Call context without an activation object gets one.
    /// An existing binding is left as it is; a new one starts `undefined` and
    /// is configurable only if `deletable`.
    pub fn create_mutable_binding(
        &mut self,
        ctx: ContextRef,
        name: Atom,
        deletable: bool,
    ) -> Result<()> {
        let target = std::iter::successors(Some(ctx), |c| c.outer(&self.heap))
            .find(|c| {
                matches!(
                    c.context_type(&self.heap),
                    ContextType::Call | ContextType::QmlContext | ContextType::Global
                )
            })
            .unwrap_or(self.global_context());

        if let Some(Binding::Slot { .. }) = self.find_own_binding(target, name) {
            return Ok(());
        }

        let mark = self.root_mark();
        self.push_root(ctx.to_value());
        self.push_root(target.to_value());
        let result = self.define_in_activation(target, name, deletable);
        self.release_roots(mark);
        result
    }

    fn define_in_activation(
        &mut self,
        target: ContextRef,
        name: Atom,
        deletable: bool,
    ) -> Result<()> {
        let object = match target.activation(&self.heap) {
            Some(object) => object,
            None => {
                let object = self.new_object()?;
                self.heap
                    .write_value(target.heap_ref(), ACTIVATION, object.to_value());
                tracing::debug!("activation object created for call context");
                object
            }
        };
        if object.has_property(&self.heap, name) {
            return Ok(());
        }
        let attrs = PropertyAttributes::data().with_configurable(deletable);
        object.define_own_property(self, name, Value::undefined(), attrs)?;
        Ok(())
    }

    /// Run the initializer of a binding declared directly in `ctx`
    ///
    /// Unlike assignment this may initialize a `const`.
    pub fn initialize_binding(&mut self, ctx: ContextRef, name: Atom, value: Value) -> Result<()> {
        match self.find_own_binding(ctx, name) {
            Some(Binding::Slot { scope, index, .. }) => {
                scope.set_slot(&mut self.heap, index, value);
                Ok(())
            }
            Some(binding @ Binding::Property { .. }) => self.write_binding(binding, name, value),
            None => Err(ContextError::Unresolved(self.name_string(name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::runtime::{CompiledFunction, FunctionRef, LocalDecl, ScopeInfo};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct Names {
        x: Atom,
        y: Atom,
        c: Atom,
        a: Atom,
    }

    /// function f(a) { var x; const c; { let x; let y; } }
    fn setup() -> (Engine, Names, FunctionRef) {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        let names = Names {
            x: engine.intern("x"),
            y: engine.intern("y"),
            c: engine.intern("c"),
            a: engine.intern("a"),
        };
        let id = engine.register_function(CompiledFunction {
            name: None,
            strict: false,
            scope: ScopeInfo::new(
                vec![names.a],
                vec![LocalDecl::var(names.x), LocalDecl::const_(names.c)],
            ),
            blocks: vec![ScopeInfo::block(vec![
                LocalDecl::let_(names.x),
                LocalDecl::let_(names.y),
            ])],
        });
        let global = engine.global_context();
        let function = engine.new_function(id, global).unwrap();
        (engine, names, function)
    }

    fn enter(engine: &mut Engine, function: FunctionRef) -> Frame {
        engine.enter_function(function, vec![Value::int(7)]).unwrap()
    }

    #[test]
    fn test_reads_formals_and_locals() {
        let (mut engine, n, function) = setup();
        let frame = enter(&mut engine, function);
        let ctx = frame.context();

        assert_eq!(engine.get_property(ctx, n.a), Ok(Value::int(7)));
        assert_eq!(engine.get_property(ctx, n.x), Ok(Value::undefined()));
        assert_eq!(
            engine.get_property(ctx, n.c),
            Err(ContextError::TemporalDeadZone("c".into()))
        );
        assert_eq!(
            engine.get_property(ctx, n.y),
            Err(ContextError::Unresolved("y".into()))
        );
    }

    #[test]
    fn test_block_shadows_function_scope() {
        let (mut engine, n, function) = setup();
        let mut frame = enter(&mut engine, function);
        let call = frame.context();
        engine.set_property(call, n.x, Value::int(1)).unwrap();

        let block = engine.new_block_context(&frame, 0).unwrap();
        frame.set_context(block);
        engine.initialize_binding(block, n.x, Value::int(2)).unwrap();

        assert_eq!(engine.get_property(block, n.x), Ok(Value::int(2)));
        assert_eq!(engine.get_property(call, n.x), Ok(Value::int(1)));
        assert_eq!(engine.resolve_depth(block, n.x), Some(0));
        assert_eq!(engine.resolve_depth(block, n.a), Some(1));
        assert_eq!(
            engine.resolve_binding(block, n.a).map(Binding::context),
            Some(call)
        );
    }

    #[test]
    fn test_const_assignment() {
        let (mut engine, n, function) = setup();
        let frame = enter(&mut engine, function);
        let ctx = frame.context();

        engine.initialize_binding(ctx, n.c, Value::int(3)).unwrap();
        assert_eq!(engine.get_property(ctx, n.c), Ok(Value::int(3)));
        assert_eq!(
            engine.set_property(ctx, n.c, Value::int(4)),
            Err(ContextError::ConstAssignment("c".into()))
        );
        assert_eq!(engine.get_property(ctx, n.c), Ok(Value::int(3)));
    }

    #[test]
    fn test_tdz_cleared_by_write() {
        let (mut engine, n, function) = setup();
        let frame = enter(&mut engine, function);
        let block = engine.new_block_context(&frame, 0).unwrap();

        assert!(matches!(
            engine.get_property(block, n.y),
            Err(ContextError::TemporalDeadZone(_))
        ));
        engine.set_property(block, n.y, Value::int(5)).unwrap();
        assert_eq!(engine.get_property(block, n.y), Ok(Value::int(5)));
    }

    #[test]
    fn test_unresolved_assignment() {
        let (mut engine, _, function) = setup();
        let frame = enter(&mut engine, function);
        let ctx = frame.context();
        let fresh = engine.intern("fresh");

        assert_eq!(
            engine.set_property_strict(ctx, fresh, Value::int(1)),
            Err(ContextError::Unresolved("fresh".into()))
        );
        engine.set_property(ctx, fresh, Value::int(1)).unwrap();
        assert_eq!(engine.get_property(ctx, fresh), Ok(Value::int(1)));
        assert_eq!(
            engine.global_object().get(engine.heap(), fresh),
            Some(Value::int(1))
        );
        assert_eq!(ctx.activation(engine.heap()), None);
    }

    #[test]
    fn test_with_base_and_fallthrough() {
        let (mut engine, n, _) = setup();
        let global = engine.global_context();
        let object = engine.new_object().unwrap();
        engine.push_root(object.to_value());
        object.put(&mut engine, n.x, Value::int(10)).unwrap();
        engine.set_property(global, n.y, Value::int(20)).unwrap();
        let with = engine.new_with_context(global, object).unwrap();

        assert_eq!(
            engine.get_property_and_base(with, n.x),
            Ok((Value::int(10), Some(object)))
        );
        assert_eq!(
            engine.get_property_and_base(with, n.y),
            Ok((Value::int(20), Some(engine.global_object())))
        );

        engine.set_property(with, n.x, Value::int(11)).unwrap();
        assert_eq!(object.get(engine.heap(), n.x), Some(Value::int(11)));
        assert!(!engine.global_object().has_property(engine.heap(), n.x));
    }

    #[test]
    fn test_inline_binding_has_no_base() {
        let (mut engine, n, function) = setup();
        let frame = enter(&mut engine, function);
        assert_eq!(
            engine.get_property_and_base(frame.context(), n.a),
            Ok((Value::int(7), None))
        );
    }

    #[rstest]
    #[case::declared_local("x", false)]
    #[case::formal("a", false)]
    #[case::unresolved("nowhere", false)]
    fn test_delete_declared_or_missing(#[case] name: &str, #[case] expected: bool) {
        let (mut engine, _, function) = setup();
        let frame = enter(&mut engine, function);
        let atom = engine.intern(name);
        assert_eq!(engine.delete_property(frame.context(), atom), expected);
    }

    #[test]
    fn test_delete_respects_configurable() {
        let (mut engine, _, _) = setup();
        let global = engine.global_context();
        let keep = engine.intern("keep");
        let drop = engine.intern("drop");
        engine.create_mutable_binding(global, keep, false).unwrap();
        engine.create_mutable_binding(global, drop, true).unwrap();
        engine.set_property(global, keep, Value::int(1)).unwrap();

        assert!(!engine.delete_property(global, keep));
        assert_eq!(engine.get_property(global, keep), Ok(Value::int(1)));
        assert!(engine.delete_property(global, drop));
        assert!(engine.get_property(global, drop).is_err());
    }

    #[test]
    fn test_delete_skips_qml_scope() {
        let (mut engine, _, _) = setup();
        let global = engine.global_context();
        let name = engine.intern("shared");
        let scope_object = engine.new_object().unwrap();
        engine.push_root(scope_object.to_value());
        scope_object.put(&mut engine, name, Value::int(1)).unwrap();
        engine.set_property(global, name, Value::int(2)).unwrap();
        let qml = engine.new_qml_context(global, scope_object).unwrap();

        assert_eq!(engine.get_property(qml, name), Ok(Value::int(1)));
        assert!(engine.delete_property(qml, name));
        assert!(scope_object.has_property(engine.heap(), name));
        assert!(!engine.global_object().has_property(engine.heap(), name));
    }

    #[test]
    fn test_mutable_binding_in_call_context() {
        let (mut engine, _, function) = setup();
        let mut frame = enter(&mut engine, function);
        let call = frame.context();
        let block = engine.new_block_context(&frame, 0).unwrap();
        frame.set_context(block);
        let dynamic = engine.intern("dynamic");

        engine.create_mutable_binding(block, dynamic, true).unwrap();
        assert_eq!(block.activation(engine.heap()), None);
        let activation = call.activation(engine.heap()).unwrap();
        assert!(activation.has_property(engine.heap(), dynamic));
        assert!(!engine.global_object().has_property(engine.heap(), dynamic));

        engine.set_property(block, dynamic, Value::int(9)).unwrap();
        assert_eq!(engine.get_property(call, dynamic), Ok(Value::int(9)));
        assert_eq!(
            engine.get_property_and_base(block, dynamic),
            Ok((Value::int(9), None))
        );
        assert!(engine.delete_property(block, dynamic));
        assert!(engine.get_property(call, dynamic).is_err());
    }

    #[test]
    fn test_mutable_binding_existing_is_kept() {
        let (mut engine, n, function) = setup();
        let frame = enter(&mut engine, function);
        let ctx = frame.context();
        engine.set_property(ctx, n.x, Value::int(4)).unwrap();

        engine.create_mutable_binding(ctx, n.x, true).unwrap();
        assert_eq!(ctx.activation(engine.heap()), None);
        assert_eq!(engine.get_property(ctx, n.x), Ok(Value::int(4)));

        let global = engine.global_context();
        engine.create_mutable_binding(global, n.y, true).unwrap();
        engine.set_property(global, n.y, Value::int(1)).unwrap();
        engine.create_mutable_binding(global, n.y, true).unwrap();
        assert_eq!(engine.get_property(global, n.y), Ok(Value::int(1)));
    }

    #[test]
    fn test_mutable_binding_in_qml_scope() {
        let (mut engine, _, _) = setup();
        let global = engine.global_context();
        let scope_object = engine.new_object().unwrap();
        let qml = engine.new_qml_context(global, scope_object).unwrap();
        engine.push_root(qml.to_value());
        let with_object = engine.new_object().unwrap();
        let with = engine.new_with_context(qml, with_object).unwrap();
        engine.push_root(with.to_value());
        let name = engine.intern("declared");

        engine.create_mutable_binding(with, name, false).unwrap();
        assert!(scope_object.has_property(engine.heap(), name));
        assert!(!with_object.has_property(engine.heap(), name));
        assert!(!engine.global_object().has_property(engine.heap(), name));
    }

    #[test]
    fn test_read_only_activation_property() {
        let (mut engine, _, _) = setup();
        let global = engine.global_context();
        let object = engine.new_object().unwrap();
        let name = engine.intern("fixed");
        object
            .define_own_property(
                &mut engine,
                name,
                Value::int(1),
                PropertyAttributes::data().with_writable(false),
            )
            .unwrap();
        let with = engine.new_with_context(global, object).unwrap();

        assert_eq!(
            engine.set_property(with, name, Value::int(2)),
            Err(ContextError::ReadOnly("fixed".into()))
        );
        assert_eq!(engine.get_property(with, name), Ok(Value::int(1)));
    }

    #[test]
    fn test_assign_follows_function_strictness() {
        let (mut engine, n, sloppy) = setup();
        engine.push_root(sloppy.to_value());
        let global = engine.global_context();
        let name = engine.intern("strictFn");
        let id = engine.register_function(CompiledFunction {
            name: Some(name),
            strict: true,
            scope: ScopeInfo::new(vec![], vec![LocalDecl::var(n.x)]),
            blocks: vec![],
        });
        let strict = engine.new_function(id, global).unwrap();
        engine.push_root(strict.to_value());
        let fresh = engine.intern("fresh");

        assert!(engine.is_strict(strict));
        assert!(!engine.is_strict(sloppy));
        assert_eq!(engine.function_name(strict), Some("strictFn"));
        assert_eq!(engine.function_name(sloppy), None);

        let frame = engine.enter_function(strict, vec![]).unwrap();
        engine.assign(&frame, n.x, Value::int(1)).unwrap();
        assert_eq!(engine.get_property(frame.context(), n.x), Ok(Value::int(1)));
        assert_eq!(
            engine.assign(&frame, fresh, Value::int(2)),
            Err(ContextError::Unresolved("fresh".into()))
        );
        assert!(!engine.global_object().has_property(engine.heap(), fresh));

        let frame = enter(&mut engine, sloppy);
        engine.assign(&frame, fresh, Value::int(3)).unwrap();
        assert_eq!(
            engine.global_object().get(engine.heap(), fresh),
            Some(Value::int(3))
        );
    }

    #[test]
    fn test_initialize_binding_requires_own_declaration() {
        let (mut engine, n, function) = setup();
        let frame = enter(&mut engine, function);
        let block = engine.new_block_context(&frame, 0).unwrap();
        assert_eq!(
            engine.initialize_binding(block, n.c, Value::int(1)),
            Err(ContextError::Unresolved("c".into()))
        );
    }
}
