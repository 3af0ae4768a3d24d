mod common;

use common::{as_i64, int, main_object, on_vm, sym};
use rbgate::guest::{Value, convert};
use rbgate::{ArgsSpec, BridgeError, RbObject, Registry};

fn register_affine(name: &str) {
    let spec = ArgsSpec::fixed(1)
        .keyword("scale", Some(int(1)))
        .unwrap()
        .required_keyword("offset")
        .unwrap();
    Registry::register_global_function(name, spec, |_, args| {
        let x = args.mandatory[0].to_i64()?;
        let scale = args.keyword("scale").map_or(Ok(1), RbObject::to_i64)?;
        let offset = args.keyword("offset").map_or(Ok(0), RbObject::to_i64)?;
        RbObject::from_i64(x * scale + offset)
    })
    .unwrap();
}

#[test]
fn keywords_and_defaults_reach_the_closure() {
    on_vm(|| {
        register_affine("kw_affine");
        let main = main_object();
        let both = main.call_with_keywords("kw_affine", &[int(3)], &[("scale", int(4)), ("offset", int(5))]);
        assert_eq!(as_i64(both), 17);
        let defaulted = main.call_with_keywords("kw_affine", &[int(3)], &[("offset", int(5))]);
        assert_eq!(as_i64(defaulted), 8);
    });
}

#[test]
fn missing_and_unknown_keywords_raise_argument_error() {
    on_vm(|| {
        register_affine("kw_affine_strict");
        let main = main_object();

        let missing = main.call_with_keywords("kw_affine_strict", &[int(3)], &[("scale", int(2))]).unwrap_err();
        match missing {
            BridgeError::GuestException(exc) => {
                assert_eq!(exc.class_name, "ArgumentError");
                assert_eq!(exc.message, "missing keyword: :offset");
            }
            other => panic!("expected ArgumentError, got {:?}", other),
        }

        let unknown = main
            .call_with_keywords("kw_affine_strict", &[int(3)], &[("offset", int(1)), ("shear", int(2))])
            .unwrap_err();
        match unknown {
            BridgeError::GuestException(exc) => {
                assert_eq!(exc.class_name, "ArgumentError");
                assert_eq!(exc.message, "unknown keyword: :shear");
            }
            other => panic!("expected ArgumentError, got {:?}", other),
        }
    });
}

#[test]
fn a_hash_passed_positionally_is_not_taken_as_keywords() {
    on_vm(|| {
        let spec = ArgsSpec::new().optional(None).keyword("flag", None).unwrap();
        Registry::register_global_function("kw_positional_hash", spec, |_, args| {
            let positional_is_hash = convert::check_hash_type(args.optional[0].value()).is_some();
            Ok(RbObject::from_bool(positional_is_hash && args.keyword("flag").is_none()))
        })
        .unwrap();

        let hash = RbObject::from_value(convert::hash_new());
        convert::hash_aset(hash.value(), sym("flag").value(), Value::TRUE);
        let result = main_object().call("kw_positional_hash", &[hash]).unwrap();
        assert!(result.is_truthy());
    });
}

#[test]
fn keywords_to_a_method_without_keywords_stay_positional() {
    on_vm(|| {
        Registry::register_global_function("kw_count_args", ArgsSpec::varargs(), |_, args| {
            RbObject::from_i64(args.len() as i64)
        })
        .unwrap();
        let counted = main_object().call_with_keywords("kw_count_args", &[int(1)], &[("extra", int(2))]);
        assert_eq!(as_i64(counted), 2);
    });
}

#[test]
fn invalid_keyword_names_are_rejected_up_front() {
    on_vm(|| {
        let err = ArgsSpec::new().keyword("Bad", None).unwrap_err();
        assert!(matches!(err, BridgeError::BadIdentifier { .. }));
        let err = ArgsSpec::new()
            .keyword("twice", None)
            .and_then(|spec| spec.required_keyword("twice"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateKeyword(ref name) if name == "twice"));
        let err = main_object()
            .call_with_keywords("kw_anything", &[], &[("not valid", int(1))])
            .unwrap_err();
        assert!(matches!(err, BridgeError::BadIdentifier { .. }));
    });
}
