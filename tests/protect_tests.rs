mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{define_class, int, main_object, on_vm, sym};
use rbgate::dispatch::break_out;
use rbgate::guest::{self, Tag, Value};
use rbgate::protect::{self, Job, JobOutput, numeric};
use rbgate::{ArgsSpec, BlockRetention, BridgeError, RbObject, Registry};

#[test]
fn successful_job_returns_its_value() {
    on_vm(|| {
        let plus = guest::intern("+");
        let two = Value::fixnum(2).unwrap();
        let output = protect::protect(Job::Funcall {
            recv: Value::fixnum(1).unwrap(),
            method: plus,
            args: &[two],
            kw_splat: false,
        })
        .unwrap();
        assert_eq!(output, JobOutput::Value(Value::fixnum(3).unwrap()));
        assert!(guest::errinfo().is_nil());
    });
}

#[test]
fn raise_becomes_guest_exception_and_clears_errinfo() {
    on_vm(|| {
        let message = RbObject::string("disk on fire").unwrap();
        let err = main_object().call("raise", &[message]).unwrap_err();
        match err {
            BridgeError::GuestException(exc) => {
                assert_eq!(exc.class_name, "RuntimeError");
                assert_eq!(exc.message, "disk on fire");
                assert_eq!(exc.object.class_name().unwrap(), "RuntimeError");
            }
            other => panic!("expected exception, got {:?}", other),
        }
        assert!(guest::errinfo().is_nil());
    });
}

#[test]
fn break_inside_a_block_is_flow_control_until_handed_back() {
    on_vm(|| {
        let seen = Rc::new(RefCell::new(None));
        let record = Rc::clone(&seen);
        let result = int(5).call_with_block("times", &[], BlockRetention::None, move |args, _| {
            if args[0].to_i64()? < 2 {
                return Ok(RbObject::nil());
            }
            let err = break_out(Some(&int(40)));
            *record.borrow_mut() = Some((
                matches!(err, BridgeError::FlowControl(ref f) if f.tag == Tag::Break),
                guest::errinfo().is_nil(),
            ));
            Err(err)
        });
        assert_eq!(result.unwrap().to_i64().unwrap(), 40);
        assert_eq!(*seen.borrow(), Some((true, true)));
        assert!(guest::errinfo().is_nil());
    });
}

#[test]
fn host_break_returns_from_the_block_call() {
    on_vm(|| {
        let result = int(10).call_with_block("times", &[], BlockRetention::None, |args, _| {
            if args[0].to_i64()? == 3 {
                return Err(BridgeError::Break(Some(RbObject::from_i64(300)?)));
            }
            Ok(RbObject::nil())
        });
        assert_eq!(result.unwrap().to_i64().unwrap(), 300);

        let bare = int(2).call_with_block("times", &[], BlockRetention::None, |_, _| Err(BridgeError::Break(None)));
        assert!(bare.unwrap().is_nil());
    });
}

#[test]
fn break_outside_any_block_is_a_local_jump_error() {
    on_vm(|| {
        let err = break_out(None);
        assert_eq!(err.exception_class(), Some("LocalJumpError"));
    });
}

#[test]
fn throw_through_a_host_block_reaches_catch() {
    on_vm(|| {
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&kinds);
        let caught = main_object().call_with_block(
            "catch",
            &[sym("done")],
            BlockRetention::None,
            move |_, _| {
                let thrown = main_object().call("throw", &[sym("done"), int(42)]);
                if let Err(BridgeError::FlowControl(flow)) = &thrown {
                    record.borrow_mut().push(flow.tag);
                }
                thrown
            },
        );
        assert_eq!(caught.unwrap().to_i64().unwrap(), 42);
        assert_eq!(*kinds.borrow(), vec![Tag::Throw]);
    });
}

#[test]
fn uncaught_throw_is_an_exception() {
    on_vm(|| {
        let err = main_object().call("throw", &[sym("nowhere")]).unwrap_err();
        assert_eq!(err.exception_class(), Some("UncaughtThrowError"));
        assert!(err.to_string().contains("uncaught throw :nowhere"), "{}", err);
    });
}

#[test]
fn unsigned_conversion_rejects_every_kind_of_negative() {
    on_vm(|| {
        let negatives = [
            RbObject::from_i64(-1).unwrap(),
            RbObject::from_f64(-2.5).unwrap(),
            RbObject::from_i64(i64::MIN).unwrap(),
        ];
        for value in &negatives {
            match value.to_u64() {
                Err(BridgeError::GuestException(exc)) => {
                    assert_eq!(exc.class_name, "TypeError");
                    assert_eq!(exc.message, numeric::NEGATIVE_UNSIGNED);
                }
                other => panic!("expected TypeError for {:?}, got {:?}", value, other),
            }
        }
        assert_eq!(int(0).to_u64().unwrap(), 0);
        assert_eq!(RbObject::from_u64(u64::MAX).unwrap().to_u64().unwrap(), u64::MAX);
    });
}

#[test]
fn unsigned_conversion_drills_through_to_int() {
    on_vm(|| {
        let wrapper = define_class("ProtectWrapper", None);
        Registry::register_instance_method(&wrapper, "to_int", ArgsSpec::new(), |_, _| RbObject::from_i64(7))
            .unwrap();
        let outer = define_class("ProtectOuterWrapper", None);
        let inner_class = wrapper.clone();
        Registry::register_instance_method(&outer, "to_int", ArgsSpec::new(), move |_, _| {
            inner_class.call("new", &[])
        })
        .unwrap();
        let value = outer.call("new", &[]).unwrap();
        assert_eq!(value.to_u64().unwrap(), 7);

        let endless = define_class("ProtectEndless", None);
        let again = endless.clone();
        Registry::register_instance_method(&endless, "to_int", ArgsSpec::new(), move |_, _| again.call("new", &[]))
            .unwrap();
        let looping = endless.call("new", &[]).unwrap();
        assert_eq!(looping.to_u64().unwrap_err().exception_class(), Some("TypeError"));
    });
}

#[test]
fn signed_and_float_conversions() {
    on_vm(|| {
        assert_eq!(int(-12).to_i64().unwrap(), -12);
        assert_eq!(RbObject::from_f64(2.75).unwrap().to_i64().unwrap(), 2);
        assert_eq!(int(3).to_f64().unwrap(), 3.0);
        let huge = RbObject::from_u64(u64::MAX).unwrap();
        assert_eq!(huge.to_i64().unwrap_err().exception_class(), Some("RangeError"));
        assert_eq!(main_object().to_f64().unwrap_err().exception_class(), Some("TypeError"));
    });
}

#[test]
fn constants_and_globals() {
    on_vm(|| {
        let missing = RbObject::constant("NoSuchThing").unwrap_err();
        assert_eq!(missing.exception_class(), Some("NameError"));
        assert!(missing.to_string().contains("uninitialized constant NoSuchThing"));

        let object = RbObject::constant("Object").unwrap();
        object.set_const("ProtectAnswer", &int(42)).unwrap();
        assert_eq!(object.get_const("ProtectAnswer").unwrap().to_i64().unwrap(), 42);

        protect::protect(Job::GlobalSet {
            name: "$protect_counter",
            value: Value::fixnum(5).unwrap(),
        })
        .unwrap();
        let read = protect::protect_value(Job::GlobalGet("$protect_counter")).unwrap();
        assert_eq!(read, Value::fixnum(5).unwrap());
        let unset = protect::protect_value(Job::GlobalGet("$protect_never_set")).unwrap();
        assert!(unset.is_nil());
    });
}

#[test]
fn conversion_jobs() {
    on_vm(|| {
        let text = RbObject::string("17").unwrap();
        let parsed = protect::protect_object(Job::Funcall {
            recv: guest::top_self(),
            method: guest::intern("Integer"),
            args: &[text.value()],
            kw_splat: false,
        })
        .unwrap();
        assert_eq!(parsed.to_i64().unwrap(), 17);

        let bad = RbObject::string("abc").unwrap();
        let err = main_object().call("Integer", &[bad]).unwrap_err();
        assert_eq!(err.exception_class(), Some("ArgumentError"));

        let listed = protect::protect_object(Job::ToArray(Value::NIL)).unwrap();
        assert_eq!(listed.inspect().unwrap(), "[]");
        assert_eq!(int(9).try_to_string().unwrap(), "9");
        assert_eq!(sym("name").inspect().unwrap(), ":name");
    });
}

#[test]
fn protect_refuses_threads_without_the_gvl() {
    on_vm(|| ());
    let refused = std::thread::spawn(|| {
        matches!(protect::protect(Job::Intern("elsewhere")), Err(BridgeError::Gvl(_)))
    })
    .join()
    .unwrap();
    assert!(refused);
}
