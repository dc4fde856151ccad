//! Interpreter call frame
//!
//! The part of an activation record the context layer reads: the function
//! being executed, the caller-supplied arguments and the innermost context.
//! Frames live outside the heap, so their values are rooted explicitly
//! whenever an allocation may collect.

use crate::context::ContextRef;
use crate::runtime::FunctionRef;
use crate::value::Value;

/// Largest argument count representable in a context header
pub const MAX_ARGS: usize = (1 << 24) - 1;

/// Call frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Function being executed
    function: FunctionRef,
    /// Innermost context of the running code
    context: ContextRef,
    /// Arguments as supplied at the call site
    args: Vec<Value>,
}

impl Frame {
    /// Create a frame whose current context is `context`
    ///
    /// Any number of arguments is accepted here; building a call context for
    /// more than [`MAX_ARGS`] of them fails.
    pub fn new(function: FunctionRef, context: ContextRef, args: Vec<Value>) -> Self {
        Frame {
            function,
            context,
            args,
        }
    }

    #[inline]
    pub fn function(&self) -> FunctionRef {
        self.function
    }

    #[inline]
    pub fn context(&self) -> ContextRef {
        self.context
    }

    /// Enter or leave a scope
    #[inline]
    pub fn set_context(&mut self, context: ContextRef) {
        self.context = context;
    }

    #[inline]
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).copied().unwrap_or_default()
    }

    /// Values the collector must keep alive while this frame is active
    pub fn roots(&self) -> Vec<Value> {
        let mut roots = Vec::with_capacity(self.args.len() + 2);
        roots.push(self.function.to_value());
        roots.push(self.context.to_value());
        roots.extend(self.args.iter().copied().filter(|v| v.is_ptr()));
        roots
    }
}
