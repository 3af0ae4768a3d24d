mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{as_i64, define_class, int, main_object, on_vm, send, sym};
use rbgate::dispatch::GlobalSetter;
use rbgate::guest::Value;
use rbgate::protect::{self, Job};
use rbgate::{ArgsSpec, BlockRetention, BridgeError, RbObject, Registry};

#[test]
fn host_method_yields_to_the_callers_block() {
    on_vm(|| {
        Registry::register_global_function("dispatch_yield_sum", ArgsSpec::varargs(), |_, args| {
            if !args.block_given {
                return RbObject::from_i64(-1);
            }
            let mut total = 0;
            for arg in args.positional() {
                total += args.yield_block(&[arg.clone()])?.to_i64()?;
            }
            RbObject::from_i64(total)
        })
        .unwrap();

        let main = main_object();
        let summed = main.call_with_block(
            "dispatch_yield_sum",
            &[int(1), int(2), int(3)],
            BlockRetention::None,
            |args, _| RbObject::from_i64(args[0].to_i64()? * 10),
        );
        assert_eq!(as_i64(summed), 60);
        assert_eq!(as_i64(main.call("dispatch_yield_sum", &[int(1)])), -1);
    });
}

#[test]
fn yield_without_a_block_is_a_local_jump_error() {
    on_vm(|| {
        Registry::register_global_function("dispatch_yield_blindly", ArgsSpec::new(), |_, args| {
            args.yield_block(&[])
        })
        .unwrap();
        let err = main_object().call("dispatch_yield_blindly", &[]).unwrap_err();
        assert_eq!(err.exception_class(), Some("LocalJumpError"));
    });
}

#[test]
fn optional_splat_and_trailing_arguments_are_distributed() {
    on_vm(|| {
        let spec = ArgsSpec::fixed(1)
            .optional(Some(int(100)))
            .splatted()
            .trailing(1);
        Registry::register_global_function("dispatch_shape", spec, |_, args| {
            let shape = [
                args.mandatory.len(),
                args.optional.len(),
                args.splat.len(),
                args.trailing.len(),
            ];
            let optional = args.optional[0].to_i64()?;
            let encoded = shape.iter().fold(0, |acc, n| acc * 10 + *n as i64);
            RbObject::from_i64(encoded * 1000 + optional)
        })
        .unwrap();

        let main = main_object();
        assert_eq!(as_i64(main.call("dispatch_shape", &[int(1), int(2)])), 1_101_100);
        assert_eq!(as_i64(main.call("dispatch_shape", &[int(1), int(7), int(2)])), 1_101_007);
        assert_eq!(
            as_i64(main.call("dispatch_shape", &[int(1), int(7), int(8), int(9), int(2)])),
            1_121_007
        );
        let err = main.call("dispatch_shape", &[int(1)]).unwrap_err();
        assert_eq!(err.exception_class(), Some("ArgumentError"));
    });
}

#[test]
fn send_reaches_host_methods() {
    on_vm(|| {
        let class = define_class("DispatchSendTarget", None);
        Registry::register_instance_method(&class, "double", ArgsSpec::fixed(1), |_, args| {
            RbObject::from_i64(args.mandatory[0].to_i64()? * 2)
        })
        .unwrap();
        let instance = send(&class, "new", &[]);
        assert_eq!(as_i64(instance.call("send", &[sym("double"), int(21)])), 42);
        assert!(send(&instance, "respond_to?", &[sym("double")]).is_truthy());
    });
}

#[test]
fn receiver_is_the_calling_object() {
    on_vm(|| {
        let class = define_class("DispatchSelf", None);
        Registry::register_instance_method(&class, "myself", ArgsSpec::new(), |recv, _| Ok(recv.clone())).unwrap();
        let instance = send(&class, "new", &[]);
        assert_eq!(instance.call("myself", &[]).unwrap(), instance);
    });
}

#[test]
fn virtual_globals_route_through_host_accessors() {
    on_vm(|| {
        let counter = Rc::new(Cell::new(5_i64));
        let read = Rc::clone(&counter);
        let write = Rc::clone(&counter);
        let setter: Box<GlobalSetter> = Box::new(move |value: &RbObject| {
            write.set(value.to_i64()?);
            Ok(())
        });
        Registry::register_virtual_global("$dispatch_counter", move || RbObject::from_i64(read.get()), Some(setter))
            .unwrap();

        let current = protect::protect_value(Job::GlobalGet("$dispatch_counter")).unwrap();
        assert_eq!(current, Value::fixnum(5).unwrap());

        protect::protect(Job::GlobalSet {
            name: "$dispatch_counter",
            value: Value::fixnum(9).unwrap(),
        })
        .unwrap();
        assert_eq!(counter.get(), 9);
        let current = protect::protect_value(Job::GlobalGet("$dispatch_counter")).unwrap();
        assert_eq!(current, Value::fixnum(9).unwrap());
    });
}

#[test]
fn globals_without_a_setter_are_read_only() {
    on_vm(|| {
        Registry::register_virtual_global("$dispatch_version", || RbObject::string("1.2"), None).unwrap();
        let version = protect::protect_object(Job::GlobalGet("$dispatch_version")).unwrap();
        assert_eq!(version.try_to_string().unwrap(), "1.2");

        let err = protect::protect(Job::GlobalSet {
            name: "$dispatch_version",
            value: Value::NIL,
        })
        .unwrap_err();
        match err {
            BridgeError::GuestException(exc) => {
                assert_eq!(exc.class_name, "NameError");
                assert_eq!(exc.message, "$dispatch_version is a read-only variable");
            }
            other => panic!("expected NameError, got {:?}", other),
        }
    });
}

#[test]
fn getter_errors_surface_as_exceptions() {
    on_vm(|| {
        Registry::register_virtual_global(
            "$dispatch_broken",
            || Err(BridgeError::MissingCallback("dispatch_broken".to_string())),
            None,
        )
        .unwrap();
        let err = protect::protect(Job::GlobalGet("$dispatch_broken")).unwrap_err();
        assert_eq!(err.exception_class(), Some("NoMethodError"));
    });
}

#[test]
fn reregistering_replaces_the_closure() {
    on_vm(|| {
        let main = main_object();
        Registry::register_global_function("dispatch_version", ArgsSpec::new(), |_, _| RbObject::from_i64(1)).unwrap();
        assert_eq!(as_i64(main.call("dispatch_version", &[])), 1);
        Registry::register_global_function("dispatch_version", ArgsSpec::new(), |_, _| RbObject::from_i64(2)).unwrap();
        assert_eq!(as_i64(main.call("dispatch_version", &[])), 2);
    });
}
