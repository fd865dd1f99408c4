//! Calling managed methods from native code.
//!
//! The calling convention, which must stay width-exact for ABI parity
//! with every backend:
//!
//! | Managed parameter kind | Native argument representation |
//! |---|---|
//! | `bool`/`i8`/`u8`/`i16`/`u16`/`char`/`i32` | promoted to the native int width |
//! | `u32` | promoted to the native unsigned-int width |
//! | `i64`/`u64` | a fixed 64-bit value |
//! | `float`/`double`/native float | passed as `f64` |
//! | typed reference | pointer to a caller-owned temporary |
//! | class types | an object-reference handle |
//! | value types | pointer to a caller-owned temporary copy |
//! | by-ref values | a native pointer |
//!
//! The native boundary takes a typed [`ArgValue`] instead of reading
//! variadic arguments. Insufficient stack headroom, excessive frame depth
//! and failed named lookups all raise managed faults through the
//! pending-exception slot; the operand stack is left at its pre-call
//! depth either way.

use std::sync::Arc;

use crate::engine::stack::{
    read_f64, read_i64, write_bytes, write_f64, write_i64, words_for_size, CallFrame, CvmWord,
    ObjectRef, WORDS_PER_LONG, WORDS_PER_NATIVE_FLOAT, WORDS_PER_TYPED_REF,
};
use crate::engine::thread::{
    EntryKind, ExecOutcome, ExecThread, ExecutionBackend, PendingException, RuntimeFault,
    ThrownException,
};
use crate::layout;
use crate::typesystem::member::Method;
use crate::typesystem::types::{Primitive, TypeDesc};
use crate::typesystem::{ClassRc, Context};

/// A native argument crossing into managed code.
#[derive(Clone, Debug)]
pub enum ArgValue<'a> {
    /// `bool` parameter
    Bool(bool),
    /// Any parameter promoted to the native int width
    I32(i32),
    /// `u32` parameter
    U32(u32),
    /// `i64` parameter
    I64(i64),
    /// `u64` parameter
    U64(u64),
    /// Any float parameter, widened to `f64`
    F64(f64),
    /// An object-reference handle (class types, arrays, strings)
    Obj(ObjectRef),
    /// A native pointer (by-ref parameters, value-type `this`)
    Ptr(usize),
    /// A caller-owned temporary copy of a value type
    Value(&'a [u8]),
    /// A caller-owned temporary typed-reference pair
    TypedRef(&'a [usize; 2]),
}

/// A managed return value crossing back out.
#[derive(Clone, Debug, PartialEq)]
pub enum RetValue {
    /// `void`
    Void,
    /// Anything returned at native int width
    I32(i32),
    /// `u32`
    U32(u32),
    /// `i64`/`u64`
    I64(i64),
    /// Any float, widened to `f64`
    F64(f64),
    /// Object-reference handle
    Obj(ObjectRef),
    /// Native pointer
    Ptr(usize),
    /// Copy of a returned value type
    Value(Vec<u8>),
    /// A returned typed reference
    TypedRef([usize; 2]),
}

impl Default for RetValue {
    fn default() -> Self {
        RetValue::Void
    }
}

/// How many stack cells one parameter occupies.
fn words_for_param(ctx: &Arc<Context>, param: &TypeDesc) -> Result<usize, RuntimeFault> {
    let param = param.enum_underlying();
    match param.as_primitive() {
        Some(
            Primitive::Boolean
            | Primitive::I1
            | Primitive::U1
            | Primitive::I2
            | Primitive::U2
            | Primitive::Char
            | Primitive::I4
            | Primitive::U4
            | Primitive::I
            | Primitive::U,
        ) => Ok(1),
        Some(Primitive::I8 | Primitive::U8) => Ok(WORDS_PER_LONG),
        Some(Primitive::R4 | Primitive::R8 | Primitive::R) => Ok(WORDS_PER_NATIVE_FLOAT),
        Some(Primitive::TypedRef) => Ok(WORDS_PER_TYPED_REF),
        Some(Primitive::Void) => Ok(0),
        _ => match param.strip_prefixes() {
            TypeDesc::Value(_) => {
                let size = layout::size_of_type(ctx, &param)
                    .map_err(|_| RuntimeFault::ArgumentMismatch { index: usize::MAX })?;
                Ok(words_for_size(size))
            }
            _ => Ok(1),
        },
    }
}

/// Copy one native argument into the next stack cell(s). Headroom has
/// already been verified.
fn marshal_arg(
    ctx: &Arc<Context>,
    thread: &mut ExecThread,
    param: &TypeDesc,
    arg: &ArgValue<'_>,
    index: usize,
) -> Result<(), RuntimeFault> {
    let param = param.enum_underlying();
    let mismatch = || RuntimeFault::ArgumentMismatch { index };

    if let Some(prim) = param.as_primitive() {
        match prim {
            Primitive::Void => return Ok(()),
            Primitive::Boolean
            | Primitive::I1
            | Primitive::U1
            | Primitive::I2
            | Primitive::U2
            | Primitive::Char
            | Primitive::I4 => {
                let value = match arg {
                    ArgValue::Bool(value) => i32::from(*value),
                    ArgValue::I32(value) => *value,
                    _ => return Err(mismatch()),
                };
                thread.push_word(CvmWord::from_i32(value));
                return Ok(());
            }
            Primitive::U4 => {
                let ArgValue::U32(value) = arg else {
                    return Err(mismatch());
                };
                thread.push_word(CvmWord::from_u32(*value));
                return Ok(());
            }
            Primitive::I | Primitive::U => {
                let value = match arg {
                    ArgValue::I32(value) => *value as isize as usize,
                    ArgValue::U32(value) => *value as usize,
                    ArgValue::I64(value) => *value as usize,
                    ArgValue::U64(value) => *value as usize,
                    ArgValue::Ptr(value) => *value,
                    _ => return Err(mismatch()),
                };
                thread.push_word(CvmWord::from_ptr(value));
                return Ok(());
            }
            Primitive::I8 | Primitive::U8 => {
                let value = match arg {
                    ArgValue::I64(value) => *value,
                    ArgValue::U64(value) => *value as i64,
                    _ => return Err(mismatch()),
                };
                let cells = thread.push_zeroed(WORDS_PER_LONG);
                write_i64(cells, value);
                return Ok(());
            }
            Primitive::R4 | Primitive::R8 | Primitive::R => {
                let ArgValue::F64(value) = arg else {
                    return Err(mismatch());
                };
                let cells = thread.push_zeroed(WORDS_PER_NATIVE_FLOAT);
                write_f64(cells, *value);
                return Ok(());
            }
            Primitive::TypedRef => {
                // Typed references arrive as a pointer to a caller-owned
                // temporary pair
                let ArgValue::TypedRef(pair) = arg else {
                    return Err(mismatch());
                };
                let cells = thread.push_zeroed(WORDS_PER_TYPED_REF);
                cells[0] = CvmWord::from_ptr(pair[0]);
                cells[1] = CvmWord::from_ptr(pair[1]);
                return Ok(());
            }
            Primitive::String | Primitive::Object | Primitive::Null => {
                let ArgValue::Obj(handle) = arg else {
                    return Err(mismatch());
                };
                thread.push_word(CvmWord::from_ptr(handle.0));
                return Ok(());
            }
        }
    }

    match param.strip_prefixes() {
        TypeDesc::Value(_) => {
            // The caller has put the value into a temporary location and
            // passed a byte view of that temporary
            let ArgValue::Value(bytes) = arg else {
                return Err(mismatch());
            };
            let size = layout::size_of_type(ctx, &param).map_err(|_| mismatch())?;
            if bytes.len() < size as usize {
                return Err(mismatch());
            }
            let cells = thread.push_zeroed(words_for_size(size));
            write_bytes(cells, &bytes[..size as usize]);
            Ok(())
        }
        TypeDesc::ByRef(_) => {
            let ArgValue::Ptr(value) = arg else {
                return Err(mismatch());
            };
            thread.push_word(CvmWord::from_ptr(*value));
            Ok(())
        }
        // Everything else is an object reference
        _ => {
            let ArgValue::Obj(handle) = arg else {
                return Err(mismatch());
            };
            thread.push_word(CvmWord::from_ptr(handle.0));
            Ok(())
        }
    }
}

/// Pop the declared return value off the stack, mirroring the argument
/// table.
fn unmarshal_return(
    ctx: &Arc<Context>,
    thread: &mut ExecThread,
    return_type: &TypeDesc,
) -> RetValue {
    let return_type = return_type.enum_underlying();
    if let Some(prim) = return_type.as_primitive() {
        match prim {
            Primitive::Void => return RetValue::Void,
            Primitive::Boolean
            | Primitive::I1
            | Primitive::U1
            | Primitive::I2
            | Primitive::U2
            | Primitive::Char
            | Primitive::I4 => {
                let word = thread.pop_word().unwrap_or_default();
                return RetValue::I32(word.as_i32());
            }
            Primitive::U4 => {
                let word = thread.pop_word().unwrap_or_default();
                return RetValue::U32(word.as_u32());
            }
            Primitive::I | Primitive::U => {
                let word = thread.pop_word().unwrap_or_default();
                return RetValue::Ptr(word.as_ptr());
            }
            Primitive::I8 | Primitive::U8 => {
                let depth = thread.stack_depth().saturating_sub(WORDS_PER_LONG);
                let value = read_i64(&thread.stack()[depth..]);
                thread.truncate_stack(depth);
                return RetValue::I64(value);
            }
            Primitive::R4 | Primitive::R8 | Primitive::R => {
                let depth = thread.stack_depth().saturating_sub(WORDS_PER_NATIVE_FLOAT);
                let value = read_f64(&thread.stack()[depth..]);
                thread.truncate_stack(depth);
                return RetValue::F64(value);
            }
            Primitive::TypedRef => {
                let depth = thread.stack_depth().saturating_sub(WORDS_PER_TYPED_REF);
                let cells = &thread.stack()[depth..];
                let pair = [
                    cells.first().copied().unwrap_or_default().as_ptr(),
                    cells.get(1).copied().unwrap_or_default().as_ptr(),
                ];
                thread.truncate_stack(depth);
                return RetValue::TypedRef(pair);
            }
            Primitive::String | Primitive::Object | Primitive::Null => {
                let word = thread.pop_word().unwrap_or_default();
                return RetValue::Obj(word.as_obj());
            }
        }
    }

    match return_type.strip_prefixes() {
        TypeDesc::Value(_) => {
            let size = layout::size_of_type(ctx, &return_type).unwrap_or(0);
            let words = words_for_size(size);
            let depth = thread.stack_depth().saturating_sub(words);
            let mut bytes = vec![0u8; size as usize];
            crate::engine::stack::read_bytes(&thread.stack()[depth..], &mut bytes);
            thread.truncate_stack(depth);
            RetValue::Value(bytes)
        }
        TypeDesc::ByRef(_) | TypeDesc::Pointer(_) => {
            let word = thread.pop_word().unwrap_or_default();
            RetValue::Ptr(word.as_ptr())
        }
        _ => {
            let word = thread.pop_word().unwrap_or_default();
            RetValue::Obj(word.as_obj())
        }
    }
}

/// Raise a fault, restore the pre-call stack depth, and report failure.
fn raise(
    thread: &mut ExecThread,
    depth: usize,
    fault: RuntimeFault,
) -> Result<RetValue, PendingException> {
    thread.truncate_stack(depth);
    thread.set_exception(ThrownException::Fault(fault));
    Err(PendingException)
}

/// Call `method`, marshaling `args` per the calling convention and
/// unmarshaling the return value.
///
/// For instance methods `args[0]` is the `this` handle (or managed
/// pointer for value-type owners), followed by the declared parameters.
///
/// On success the result is returned and the pending-exception slot is
/// clear. If the callee throws — or the engine faults on headroom, frame
/// depth or argument shape — the exception lands in the thread's
/// pending-exception slot, the operand stack is restored to its pre-call
/// depth, and `Err(PendingException)` is returned instead of a result.
///
/// # Errors
/// [`PendingException`]; the detail is on the thread.
pub fn call_method(
    thread: &mut ExecThread,
    backend: &dyn ExecutionBackend,
    ctx: &Arc<Context>,
    method: &Arc<Method>,
    args: &[ArgValue<'_>],
) -> Result<RetValue, PendingException> {
    call_with_entry(thread, backend, ctx, method, args, EntryKind::Normal)
}

/// Call a constructor through its allocation-prologue entry point, so
/// that instance allocation precedes the body. No `this` argument is
/// marshaled; the prologue produces it.
///
/// # Errors
/// Same conditions as [`call_method`].
pub fn call_constructor(
    thread: &mut ExecThread,
    backend: &dyn ExecutionBackend,
    ctx: &Arc<Context>,
    method: &Arc<Method>,
    args: &[ArgValue<'_>],
) -> Result<RetValue, PendingException> {
    call_with_entry(
        thread,
        backend,
        ctx,
        method,
        args,
        EntryKind::ConstructorAllocating,
    )
}

/// Call a method with virtual dispatch: when the runtime class of the
/// receiver is known, the target is resolved through that class's vtable
/// slot; otherwise the call falls back to the named method directly.
///
/// # Errors
/// Same conditions as [`call_method`].
pub fn call_virtual_method(
    thread: &mut ExecThread,
    backend: &dyn ExecutionBackend,
    ctx: &Arc<Context>,
    method: &Arc<Method>,
    runtime_class: Option<&ClassRc>,
    args: &[ArgValue<'_>],
) -> Result<RetValue, PendingException> {
    if method.is_virtual() {
        if let Some(class) = runtime_class {
            // Laying out the receiver class assigns every inherited slot
            if let Ok(data) = layout::layout_class(ctx, class) {
                if let Some(target) = method
                    .vtable_index()
                    .and_then(|slot| data.vtable.get(slot as usize))
                {
                    let target = target.clone();
                    return call_method(thread, backend, ctx, &target, args);
                }
            }
        }
    }
    call_method(thread, backend, ctx, method, args)
}

/// Look up `Namespace.Type::method` and call it. A failed lookup raises
/// a missing-method fault through the pending-exception slot rather than
/// crashing the host.
///
/// # Errors
/// [`PendingException`] on lookup failure or any [`call_method`] failure.
pub fn call_named(
    thread: &mut ExecThread,
    backend: &dyn ExecutionBackend,
    ctx: &Arc<Context>,
    type_name: &str,
    method_name: &str,
    args: &[ArgValue<'_>],
) -> Result<RetValue, PendingException> {
    let found = lookup_named(ctx, type_name, method_name);
    let Some(method) = found else {
        // Construct and raise a "missing method" fault; there is a pending
        // exception waiting for the caller
        thread.set_exception(ThrownException::Fault(RuntimeFault::MissingMethod {
            type_name: type_name.to_string(),
            method_name: method_name.to_string(),
        }));
        return Err(PendingException);
    };
    call_method(thread, backend, ctx, &method, args)
}

fn lookup_named(ctx: &Arc<Context>, type_name: &str, method_name: &str) -> Option<Arc<Method>> {
    let (namespace, name) = match type_name.rfind('.') {
        Some(split) => (&type_name[..split], &type_name[split + 1..]),
        None => ("", type_name),
    };
    let class = ctx.lookup_global(namespace, name)?;
    let mut current = Some(class.resolve());
    while let Some(class) = current {
        for (_, method) in class.methods.iter() {
            if method.name == method_name {
                return Some(method.clone());
            }
        }
        current = class.parent();
    }
    None
}

fn call_with_entry(
    thread: &mut ExecThread,
    backend: &dyn ExecutionBackend,
    ctx: &Arc<Context>,
    method: &Arc<Method>,
    args: &[ArgValue<'_>],
    entry: EntryKind,
) -> Result<RetValue, PendingException> {
    let signature = method.signature().clone();
    let saved_depth = thread.stack_depth();
    let mut next_arg = 0usize;

    // Push the "this" argument for instance calls entered normally; a
    // constructor entry allocates its own instance first
    if signature.has_this && !signature.explicit_this && entry == EntryKind::Normal {
        let Some(arg) = args.first() else {
            return raise(thread, saved_depth, RuntimeFault::ArgumentMismatch { index: 0 });
        };
        if thread.stack_headroom() < 1 {
            return raise(thread, saved_depth, RuntimeFault::StackOverflow);
        }
        let value = match arg {
            ArgValue::Obj(handle) => handle.0,
            // A value-type receiver arrives as a managed pointer
            ArgValue::Ptr(value) => *value,
            _ => {
                return raise(thread, saved_depth, RuntimeFault::ArgumentMismatch { index: 0 });
            }
        };
        thread.push_word(CvmWord::from_ptr(value));
        next_arg = 1;
    }

    for (position, param) in signature.params.iter().enumerate() {
        let words = match words_for_param(ctx, param) {
            Ok(words) => words,
            Err(fault) => return raise(thread, saved_depth, fault),
        };
        if thread.stack_headroom() < words {
            return raise(thread, saved_depth, RuntimeFault::StackOverflow);
        }
        let Some(arg) = args.get(next_arg) else {
            return raise(
                thread,
                saved_depth,
                RuntimeFault::ArgumentMismatch { index: position },
            );
        };
        if let Err(fault) = marshal_arg(ctx, thread, param, arg, position) {
            return raise(thread, saved_depth, fault);
        }
        next_arg += 1;
    }

    // Clear the pending exception on entry to the method
    thread.clear_exception();

    // Create a call frame for the method
    if thread.frame_depth() >= thread.max_frames() {
        return raise(thread, saved_depth, RuntimeFault::StackOverflow);
    }
    let save_pc = thread.pc;
    let saved_frames = thread.frame_depth();
    let caller_method = thread.method.clone();
    let caller_frame = thread.frame;
    thread.push_frame(CallFrame {
        method: caller_method,
        pc: u32::MAX,
        frame: caller_frame,
        except: u32::MAX,
    });

    let outcome = backend.execute(thread, method, entry);

    let result = match outcome {
        ExecOutcome::Threw => {
            // Pop the thrown object into the pending-exception slot
            let handle = thread.pop_word().unwrap_or_default().as_obj();
            thread.set_exception(ThrownException::Object(handle));
            Err(PendingException)
        }
        ExecOutcome::Returned => Ok(unmarshal_return(ctx, thread, &signature.return_type)),
    };

    // Restore the caller's saved PC; the callee's return sequence already
    // restored everything else
    thread.pc = save_pc;
    thread.truncate_frames(saved_frames);
    thread.truncate_stack(saved_depth);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::thread::RuntimeFault;
    use crate::typesystem::attrs::{MethodAttributes, TypeAttributes};
    use crate::typesystem::context::testkit::*;
    use crate::typesystem::types::MethodSigDesc;

    fn static_sig(params: Vec<TypeDesc>, ret: TypeDesc) -> MethodSigDesc {
        MethodSigDesc {
            has_this: false,
            explicit_this: false,
            call_conv: 0,
            return_type: ret,
            params,
        }
    }

    fn i4() -> TypeDesc {
        TypeDesc::Primitive(Primitive::I4)
    }

    /// Consumes one i32 argument and returns it plus one.
    struct AddOneBackend;

    impl ExecutionBackend for AddOneBackend {
        fn execute(
            &self,
            thread: &mut ExecThread,
            _method: &Arc<Method>,
            _entry: EntryKind,
        ) -> ExecOutcome {
            thread.pop_frame();
            let argument = thread.pop_word().unwrap_or_default().as_i32();
            thread.push_word(CvmWord::from_i32(argument + 1));
            ExecOutcome::Returned
        }
    }

    /// Consumes its arguments, then throws object 0xBEEF.
    struct ThrowingBackend;

    impl ExecutionBackend for ThrowingBackend {
        fn execute(
            &self,
            thread: &mut ExecThread,
            method: &Arc<Method>,
            _entry: EntryKind,
        ) -> ExecOutcome {
            thread.pop_frame();
            for _ in 0..method.signature().params.len() {
                thread.pop_word();
            }
            thread.push_word(CvmWord::from_ptr(0xBEEF));
            ExecOutcome::Threw
        }
    }

    /// Consumes `this` and reports which method body actually ran by
    /// returning its token.
    struct TokenBackend;

    impl ExecutionBackend for TokenBackend {
        fn execute(
            &self,
            thread: &mut ExecThread,
            method: &Arc<Method>,
            _entry: EntryKind,
        ) -> ExecOutcome {
            thread.pop_frame();
            thread.pop_word();
            thread.push_word(CvmWord::from_u32(method.token.value()));
            ExecOutcome::Returned
        }
    }

    #[test]
    fn invocation_round_trip() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 500, "Math1", "App", TypeAttributes::PUBLIC, Some(&object));
        let method = add_method(
            &class,
            500,
            "AddOne",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![i4()], i4()),
        );

        let mut thread = ExecThread::new(64, 8);
        let result =
            call_method(&mut thread, &AddOneBackend, &ctx, &method, &[ArgValue::I32(41)]).unwrap();
        assert_eq!(result, RetValue::I32(42));
        assert!(!thread.has_exception());
        assert_eq!(thread.stack_depth(), 0);
        assert_eq!(thread.frame_depth(), 0);
    }

    #[test]
    fn thrown_exception_restores_depth_and_sets_slot() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 501, "Math2", "App", TypeAttributes::PUBLIC, Some(&object));
        let method = add_method(
            &class,
            501,
            "Boom",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![i4()], i4()),
        );

        let mut thread = ExecThread::new(64, 8);
        thread.push_word(CvmWord::from_i32(7));
        let pre_depth = thread.stack_depth();

        let outcome =
            call_method(&mut thread, &ThrowingBackend, &ctx, &method, &[ArgValue::I32(1)]);
        assert!(outcome.is_err());
        assert_eq!(thread.stack_depth(), pre_depth);
        assert_eq!(
            thread.exception(),
            Some(&ThrownException::Object(ObjectRef(0xBEEF)))
        );
    }

    #[test]
    fn stack_overflow_is_a_managed_fault() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 502, "Math3", "App", TypeAttributes::PUBLIC, Some(&object));
        let method = add_method(
            &class,
            502,
            "Wide",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![i4(), i4(), i4()], i4()),
        );

        let mut thread = ExecThread::new(2, 8);
        let outcome = call_method(
            &mut thread,
            &AddOneBackend,
            &ctx,
            &method,
            &[ArgValue::I32(1), ArgValue::I32(2), ArgValue::I32(3)],
        );
        assert!(outcome.is_err());
        assert_eq!(thread.stack_depth(), 0);
        assert_eq!(
            thread.exception(),
            Some(&ThrownException::Fault(RuntimeFault::StackOverflow))
        );
    }

    #[test]
    fn frame_overflow_is_a_managed_fault() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 503, "Math4", "App", TypeAttributes::PUBLIC, Some(&object));
        let method = add_method(
            &class,
            503,
            "Deep",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![], i4()),
        );

        let mut thread = ExecThread::new(16, 0);
        let outcome = call_method(&mut thread, &AddOneBackend, &ctx, &method, &[]);
        assert!(outcome.is_err());
        assert_eq!(
            thread.exception(),
            Some(&ThrownException::Fault(RuntimeFault::StackOverflow))
        );
    }

    #[test]
    fn named_lookup_failure_raises_missing_method() {
        let (ctx, _) = system_context();
        let mut thread = ExecThread::new(16, 4);
        let outcome = call_named(
            &mut thread,
            &AddOneBackend,
            &ctx,
            "App.Nowhere",
            "Nothing",
            &[],
        );
        assert!(outcome.is_err());
        match thread.exception() {
            Some(ThrownException::Fault(RuntimeFault::MissingMethod {
                type_name,
                method_name,
            })) => {
                assert_eq!(type_name, "App.Nowhere");
                assert_eq!(method_name, "Nothing");
            }
            other => panic!("expected missing-method fault, got {other:?}"),
        }
    }

    #[test]
    fn named_lookup_success_calls_through() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 504, "Named", "App", TypeAttributes::PUBLIC, Some(&object));
        add_method(
            &class,
            504,
            "Inc",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![i4()], i4()),
        );

        let mut thread = ExecThread::new(16, 4);
        let result = call_named(
            &mut thread,
            &AddOneBackend,
            &ctx,
            "App.Named",
            "Inc",
            &[ArgValue::I32(5)],
        )
        .unwrap();
        assert_eq!(result, RetValue::I32(6));
    }

    #[test]
    fn wide_values_round_trip() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 505, "Wide2", "App", TypeAttributes::PUBLIC, Some(&object));

        struct EchoI64Backend;
        impl ExecutionBackend for EchoI64Backend {
            fn execute(
                &self,
                thread: &mut ExecThread,
                _method: &Arc<Method>,
                _entry: EntryKind,
            ) -> ExecOutcome {
                thread.pop_frame();
                // Argument is already in return position: leave it
                ExecOutcome::Returned
            }
        }

        let echo_long = add_method(
            &class,
            505,
            "EchoLong",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(
                vec![TypeDesc::Primitive(Primitive::I8)],
                TypeDesc::Primitive(Primitive::I8),
            ),
        );
        let mut thread = ExecThread::new(16, 4);
        let result = call_method(
            &mut thread,
            &EchoI64Backend,
            &ctx,
            &echo_long,
            &[ArgValue::I64(-5_000_000_000)],
        )
        .unwrap();
        assert_eq!(result, RetValue::I64(-5_000_000_000));

        let echo_double = add_method(
            &class,
            506,
            "EchoDouble",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(
                vec![TypeDesc::Primitive(Primitive::R4)],
                TypeDesc::Primitive(Primitive::R8),
            ),
        );
        let result = call_method(
            &mut thread,
            &EchoI64Backend,
            &ctx,
            &echo_double,
            &[ArgValue::F64(1.25)],
        )
        .unwrap();
        assert_eq!(result, RetValue::F64(1.25));
        assert_eq!(thread.stack_depth(), 0);
    }

    #[test]
    fn argument_shape_mismatch_faults() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 506, "Shape", "App", TypeAttributes::PUBLIC, Some(&object));
        let method = add_method(
            &class,
            507,
            "TakesInt",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![i4()], i4()),
        );

        let mut thread = ExecThread::new(16, 4);
        let outcome = call_method(&mut thread, &AddOneBackend, &ctx, &method, &[ArgValue::F64(1.0)]);
        assert!(outcome.is_err());
        assert!(matches!(
            thread.exception(),
            Some(ThrownException::Fault(RuntimeFault::ArgumentMismatch { index: 0 }))
        ));
    }

    #[test]
    fn virtual_dispatch_through_the_vtable() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 507, "VB", "App", TypeAttributes::PUBLIC, Some(&object));
        let instance_sig = MethodSigDesc {
            has_this: true,
            explicit_this: false,
            call_conv: 0,
            return_type: i4(),
            params: vec![],
        };
        let base_speak = add_method(
            &base,
            510,
            "Speak",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
            instance_sig.clone(),
        );
        let derived = make_class(&ctx, image, 508, "VD", "App", TypeAttributes::PUBLIC, Some(&base));
        let derived_speak = add_method(
            &derived,
            511,
            "Speak",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
            instance_sig,
        );

        let mut thread = ExecThread::new(16, 4);
        let this = ArgValue::Obj(ObjectRef(0x1000));

        // Dispatching the base method against the derived class runs the
        // override
        let result = call_virtual_method(
            &mut thread,
            &TokenBackend,
            &ctx,
            &base_speak,
            Some(&derived),
            std::slice::from_ref(&this),
        )
        .unwrap();
        assert_eq!(result, RetValue::I32(derived_speak.token.value() as i32));

        // Against the base class the base body runs
        let result = call_virtual_method(
            &mut thread,
            &TokenBackend,
            &ctx,
            &base_speak,
            Some(&base),
            std::slice::from_ref(&this),
        )
        .unwrap();
        assert_eq!(result, RetValue::I32(base_speak.token.value() as i32));
    }
}
