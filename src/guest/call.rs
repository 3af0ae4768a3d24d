//! Method calls, blocks, procs and catch/throw.
//!
//! Every entry here releases the state lock before running a method body or
//! block, so bodies are free to call back into the interpreter.

use std::panic::{self, AssertUnwindSafe};

use super::class::{ancestors_of, class_name_of, lookup_method, lookup_super, obj_classname_of};
use super::convert;
use super::helpers;
use super::jump::{self, Failure, GuestResult, JumpTag, Tag, check};
use super::object::{AttachedBlock, BlockHandler, ClassKind, MethodBody, ObjectBody, ProcBody, ThrowBody};
use super::state::{self, Frame, FrameKind, State, with_state};
use super::value::{Id, Value};

struct Resolved {
    owner: Value,
    body: MethodBody,
    arity: i32,
    targets: Vec<Value>,
}

fn no_method_failure(s: &State, recv: Value, method: Id, is_super: bool) -> Failure {
    let name = s.id_name(method);
    let described = match recv {
        Value::NIL => "nil".to_string(),
        Value::TRUE => "true".to_string(),
        Value::FALSE => "false".to_string(),
        v => match s.class_body(v).map(|b| b.kind) {
            Some(ClassKind::Module) => format!("module {}", class_name_of(s, v)),
            Some(_) => format!("class {}", class_name_of(s, v)),
            None => format!("an instance of {}", obj_classname_of(s, v)),
        },
    };
    let message = if is_super {
        format!("super: no superclass method '{}' for {}", name, described)
    } else {
        format!("undefined method '{}' for {}", name, described)
    };
    Failure::new(s.classes.no_method_error, message)
}

fn resolve(recv: Value, method: Id, super_from: Option<Value>) -> GuestResult<Resolved> {
    with_state(|s| {
        let klass = s.class_of(recv);
        let found = match super_from {
            Some(owner) => lookup_super(s, klass, owner, method),
            None => lookup_method(s, klass, method),
        };
        let Some((owner, def)) = found else {
            return Err(no_method_failure(s, recv, method, super_from.is_some()));
        };
        let targets = match def.body {
            MethodBody::Helper => {
                let chain = ancestors_of(s, klass);
                match super_from {
                    Some(_) => {
                        let start = chain.iter().position(|c| *c == owner).unwrap_or(0);
                        chain[start..].to_vec()
                    }
                    None => chain,
                }
            }
            MethodBody::Builtin(_) => Vec::new(),
        };
        Ok(Resolved {
            owner,
            body: def.body,
            arity: def.arity,
            targets,
        })
    })
}

pub(crate) fn arity_failure(given: usize, min: i32, max: i32) -> Failure {
    let expected = if min == max {
        format!("{}", min)
    } else if max < 0 {
        format!("{}+", min)
    } else {
        format!("{}..{}", min, max)
    };
    with_state(|s| {
        Failure::new(
            s.classes.argument_error,
            format!("wrong number of arguments (given {}, expected {})", given, expected),
        )
    })
}

fn invoke(
    recv: Value,
    method: Id,
    args: &[Value],
    block: Option<AttachedBlock>,
    kw_splat: bool,
    super_from: Option<Value>,
) -> Value {
    let resolved = check(resolve(recv, method, super_from));
    if resolved.arity >= 0 && args.len() != resolved.arity as usize {
        jump::raise_failure(arity_failure(args.len(), resolved.arity, resolved.arity));
    }
    state::push_frame(Frame {
        kind: FrameKind::Method,
        self_value: recv,
        method: Some(method),
        owner: resolved.owner,
        block,
        args: args.to_vec(),
        kw_splat,
        is_super: super_from.is_some(),
    });
    let result = match resolved.body {
        MethodBody::Builtin(func) => func(recv, args),
        MethodBody::Helper => helpers::call_method_helper(method, &resolved.targets, recv, args),
    };
    state::pop_frame();
    result
}

/// Calls `method` on `recv`.
pub fn funcall(recv: Value, method: Id, args: &[Value]) -> Value {
    invoke(recv, method, args, None, false, None)
}

/// Calls `method`, marking the trailing hash argument as keywords when
/// `kw_splat` is set.
pub fn funcall_kw(recv: Value, method: Id, args: &[Value], kw_splat: bool) -> Value {
    invoke(recv, method, args, None, kw_splat, None)
}

/// Calls `method` with `block` (a Proc or `nil`) attached.
pub fn funcall_with_block(recv: Value, method: Id, args: &[Value], block: Value) -> Value {
    let attached = check(proc_block(block));
    invoke(recv, method, args, attached, false, None)
}

/// Calls `method`, handing on the block of the current method.
pub fn funcall_passing_block(recv: Value, method: Id, args: &[Value]) -> Value {
    let (block, kw_splat) = with_state(|s| {
        s.method_frame()
            .map(|f| (f.block, f.kw_splat))
            .unwrap_or((None, false))
    });
    invoke(recv, method, args, block, kw_splat, None)
}

fn proc_block(block: Value) -> GuestResult<Option<AttachedBlock>> {
    if block.is_nil() {
        return Ok(None);
    }
    with_state(|s| match s.obj(block).map(|o| &o.body) {
        Some(ObjectBody::Proc(body)) => Ok(Some(AttachedBlock {
            handler: BlockHandler::Proc(block),
            home: body.block.home,
        })),
        _ => Err(Failure::new(
            s.classes.type_error,
            format!(
                "wrong argument type {} (expected Proc)",
                obj_classname_of(s, block)
            ),
        )),
    })
}

/// Calls the next definition of the current method, passing its block.
pub fn call_super(args: &[Value]) -> Value {
    let frame = with_state(|s| {
        let runtime_error = s.classes.runtime_error;
        match s.method_frame() {
            Some(f) => match f.method {
                Some(method) => Ok((f.self_value, method, f.owner, f.block, f.kw_splat)),
                None => Err(Failure::new(runtime_error, "super called outside of method")),
            },
            None => Err(Failure::new(runtime_error, "super called outside of method")),
        }
    });
    let (recv, method, owner, block, kw_splat) = check(frame);
    invoke(recv, method, args, block, kw_splat, Some(owner))
}

pub fn block_given() -> bool {
    with_state(|s| s.method_frame().is_some_and(|f| f.block.is_some()))
}

/// Whether the current method was called with keyword arguments.
pub fn keyword_given() -> bool {
    with_state(|s| s.method_frame().is_some_and(|f| f.kw_splat))
}

pub fn current_method() -> Option<Id> {
    with_state(|s| s.method_frame().and_then(|f| f.method))
}

pub fn current_self() -> Value {
    with_state(|s| {
        let top_self = s.top_self;
        s.method_frame().map_or(top_self, |f| f.self_value)
    })
}

pub(crate) fn current_block() -> Option<AttachedBlock> {
    with_state(|s| s.method_frame().and_then(|f| f.block))
}

/// Yields `args` to the block of the current method.
pub fn yield_values(args: &[Value]) -> Value {
    match current_block() {
        Some(block) => invoke_block(block, args, Value::NIL),
        None => {
            let class = with_state(|s| s.classes.local_jump_error);
            jump::raise_new(class, "no block given (yield)")
        }
    }
}

pub(crate) fn invoke_block(block: AttachedBlock, args: &[Value], blockarg: Value) -> Value {
    if let BlockHandler::Proc(proc_value) = block.handler {
        let inner = with_state(|s| match s.obj(proc_value).map(|o| &o.body) {
            Some(ObjectBody::Proc(body)) => Some(body.block),
            _ => None,
        });
        return match inner {
            Some(inner) => invoke_block(inner, args, blockarg),
            None => Value::NIL,
        };
    }
    let self_value = current_self();
    state::push_frame(Frame {
        args: args.to_vec(),
        ..Frame::marker(FrameKind::Block { home: block.home }, self_value)
    });
    let result = match block.handler {
        BlockHandler::Pointer(ctx) => helpers::call_block_pvoid(ctx, args, blockarg),
        BlockHandler::Context(ctx) => helpers::call_block_value(ctx, args, blockarg),
        BlockHandler::Proc(_) => Value::NIL,
    };
    state::pop_frame();
    result
}

/// Takes the value carried by a pending jump aimed at `marker`, clearing
/// `errinfo`.
fn take_throw(marker: u64) -> Option<Value> {
    with_state(|s| {
        let errinfo = s.stack().errinfo;
        let value = match s.obj(errinfo).map(|o| &o.body) {
            Some(ObjectBody::ThrowData(throw)) if throw.target == marker => throw.value,
            _ => return None,
        };
        s.stack().errinfo = Value::NIL;
        Some(value)
    })
}

/// Runs `body` inside a catching frame of `kind`, stopping `expected` jumps
/// whose throw data targets `marker`.
fn run_catching(kind: FrameKind, marker: u64, expected: Tag, body: impl FnOnce() -> Value) -> Value {
    let mark = state::stack_mark();
    let self_value = current_self();
    state::push_frame(Frame::marker(kind, self_value));
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => {
            state::restore_stack(mark);
            value
        }
        Err(payload) => match payload.downcast::<JumpTag>() {
            Ok(jump) if jump.0 == expected => match take_throw(marker) {
                Some(value) => {
                    state::restore_stack(mark);
                    value
                }
                None => panic::resume_unwind(jump),
            },
            Ok(jump) => panic::resume_unwind(jump),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Calls `method` with a block whose `break` returns from this call.
pub(crate) fn block_call(
    recv: Value,
    method: Id,
    args: &[Value],
    handler: BlockHandler,
    kw_splat: bool,
) -> Value {
    let marker = with_state(|s| s.next_marker());
    let block = AttachedBlock {
        handler,
        home: marker,
    };
    run_catching(FrameKind::BlockCall { marker }, marker, Tag::Break, || {
        invoke(recv, method, args, Some(block), kw_splat, None)
    })
}

/// Breaks out of the innermost running block with `value`.
pub fn iter_break_value(value: Value) -> ! {
    let target = with_state(|s| -> GuestResult<Value> {
        let home = s.stack().frames.iter().rev().find_map(|f| match f.kind {
            FrameKind::Block { home } => Some(home),
            _ => None,
        });
        match home {
            Some(home) if home != 0 && s.marker_is_live(home) => {
                let klass = s.classes.object;
                Ok(s.alloc(
                    klass,
                    ObjectBody::ThrowData(ThrowBody {
                        tag: Tag::Break,
                        value,
                        target: home,
                        catch_tag: Value::NIL,
                    }),
                ))
            }
            _ => Err(Failure::new(
                s.classes.local_jump_error,
                "break from proc-closure",
            )),
        }
    });
    let throw = check(target);
    jump::set_errinfo(throw);
    jump::jump_tag(Tag::Break)
}

pub fn iter_break() -> ! {
    iter_break_value(Value::NIL)
}

/// A proc whose block is run by the host through `handler`.
pub(crate) fn proc_new(handler: BlockHandler) -> Value {
    with_state(|s| {
        let klass = s.classes.proc_class;
        s.alloc(
            klass,
            ObjectBody::Proc(ProcBody {
                block: AttachedBlock { handler, home: 0 },
            }),
        )
    })
}

/// Converts the block of the current method into a proc.
pub fn block_proc() -> Value {
    let block = current_block();
    check(with_state(|s| match block {
        Some(AttachedBlock {
            handler: BlockHandler::Proc(existing),
            ..
        }) => Ok(existing),
        Some(block) => {
            let klass = s.classes.proc_class;
            Ok(s.alloc(klass, ObjectBody::Proc(ProcBody { block })))
        }
        None => Err(Failure::new(
            s.classes.argument_error,
            "tried to create Proc object without a block",
        )),
    }))
}

/// Calls `proc_value` with `args` and an optional block argument.
pub fn proc_call(proc_value: Value, args: &[Value], blockarg: Value) -> Value {
    let block = check(with_state(|s| match s.obj(proc_value).map(|o| &o.body) {
        Some(ObjectBody::Proc(body)) => Ok(body.block),
        _ => Err(Failure::new(
            s.classes.type_error,
            format!(
                "wrong argument type {} (expected Proc)",
                obj_classname_of(s, proc_value)
            ),
        )),
    }));
    invoke_block(block, args, blockarg)
}

pub fn is_proc(value: Value) -> bool {
    with_state(|s| matches!(s.obj(value).map(|o| &o.body), Some(ObjectBody::Proc(_))))
}

/// Runs the current block with a catch frame for `tag`.
pub(crate) fn catch_with_block(tag: Value) -> Value {
    let marker = with_state(|s| s.next_marker());
    run_catching(FrameKind::Catch { marker, tag }, marker, Tag::Throw, || {
        yield_values(&[tag])
    })
}

/// Throws `value` to the innermost catch frame for `tag`.
pub fn throw(tag: Value, value: Value) -> ! {
    let target = with_state(|s| {
        let marker = s.stack().frames.iter().rev().find_map(|f| match f.kind {
            FrameKind::Catch { marker, tag: t } if t == tag => Some(marker),
            _ => None,
        })?;
        let klass = s.classes.object;
        Some(s.alloc(
            klass,
            ObjectBody::ThrowData(ThrowBody {
                tag: Tag::Throw,
                value,
                target: marker,
                catch_tag: tag,
            }),
        ))
    });
    match target {
        Some(throw) => {
            jump::set_errinfo(throw);
            jump::jump_tag(Tag::Throw)
        }
        None => {
            let shown = convert::inspect_string(tag);
            let class = with_state(|s| s.classes.uncaught_throw_error);
            jump::raise_new(class, &format!("uncaught throw {}", shown))
        }
    }
}

/// Tag and payload of a throw-data marker.
pub fn throw_data_info(value: Value) -> Option<(Tag, Value)> {
    with_state(|s| match s.obj(value).map(|o| &o.body) {
        Some(ObjectBody::ThrowData(throw)) => Some((throw.tag, throw.value)),
        _ => None,
    })
}
