use crate::error::{ArityRange, BridgeError};
use crate::guest::{self, Value, convert};
use crate::testing::on_vm_thread;
use crate::value::RbObject;

use super::{ArgsSpec, MethodArgs};

fn fix(n: i64) -> Value {
    Value::fixnum(n).unwrap()
}

fn ints(objects: &[RbObject]) -> Vec<i64> {
    objects.iter().map(|o| o.value().fix2long()).collect()
}

/// Rooted, since resolving may collect.
fn keyword_hash(pairs: &[(&str, i64)]) -> RbObject {
    let hash = RbObject::from_value(convert::hash_new());
    for (name, value) in pairs {
        convert::hash_aset(hash.value(), Value::from_id(guest::intern(name)), fix(*value));
    }
    hash
}

#[test]
fn fixed_arity_is_checked_before_anything_runs() {
    on_vm_thread(|| {
        let spec = ArgsSpec::fixed(2);
        for given in [vec![fix(1)], vec![fix(1), fix(2), fix(3)]] {
            match spec.resolve("pair", &given, false, false) {
                Err(BridgeError::Arity {
                    method,
                    given: count,
                    expected,
                }) => {
                    assert_eq!(method, "pair");
                    assert_eq!(count, given.len());
                    assert_eq!(expected, ArityRange::exact(2));
                }
                other => panic!("expected arity error, got {:?}", other),
            }
        }
        assert!(spec.resolve("pair", &[fix(1), fix(2)], false, false).is_ok());
    });
}

#[test]
fn positionals_are_distributed_by_kind() {
    on_vm_thread(|| {
        let spec = ArgsSpec::new()
            .mandatory(1)
            .optional(Some(RbObject::from_value(fix(10))))
            .splatted()
            .trailing(1);
        assert_eq!(spec.arity(), ArityRange { min: 2, max: None });

        let full = spec
            .resolve("m", &[fix(1), fix(2), fix(3), fix(4), fix(5)], false, false)
            .unwrap();
        assert_eq!(ints(&full.mandatory), vec![1]);
        assert_eq!(ints(&full.optional), vec![2]);
        assert_eq!(ints(&full.splat), vec![3, 4]);
        assert_eq!(ints(&full.trailing), vec![5]);

        let short = spec.resolve("m", &[fix(1), fix(5)], false, false).unwrap();
        assert_eq!(ints(&short.optional), vec![10]);
        assert!(short.splat.is_empty());
        assert_eq!(ints(&short.trailing), vec![5]);
    });
}

#[test]
fn missing_optional_without_default_is_nil() {
    on_vm_thread(|| {
        let spec = ArgsSpec::fixed(1).optional(None);
        let args = spec.resolve("m", &[fix(1)], false, false).unwrap();
        assert!(args.optional[0].is_nil());
        assert_eq!(args.len(), 2);
    });
}

#[test]
fn trailing_symbol_hash_becomes_keywords_when_flagged() {
    on_vm_thread(|| {
        let spec = ArgsSpec::fixed(1)
            .keyword("size", Some(RbObject::from_value(fix(3))))
            .unwrap()
            .required_keyword("name")
            .unwrap();
        let hash = keyword_hash(&[("name", 7)]);
        let args = spec.resolve("m", &[fix(1), hash.value()], true, false).unwrap();
        assert_eq!(ints(&args.mandatory), vec![1]);
        assert_eq!(args.keyword("name").map(|v| v.value().fix2long()), Some(7));
        assert_eq!(args.keyword("size").map(|v| v.value().fix2long()), Some(3));
    });
}

#[test]
fn hash_stays_positional_without_keyword_flag() {
    on_vm_thread(|| {
        let spec = ArgsSpec::fixed(1).keyword("size", None).unwrap();
        let hash = keyword_hash(&[("size", 7)]);
        let err = spec.resolve("m", &[fix(1), hash.value()], false, false).unwrap_err();
        assert!(matches!(err, BridgeError::Arity { given: 2, .. }));
    });
}

#[test]
fn hash_with_non_symbol_keys_stays_positional() {
    on_vm_thread(|| {
        let spec = ArgsSpec::fixed(2).keyword("size", None).unwrap();
        let hash = RbObject::from_value(convert::hash_new());
        convert::hash_aset(hash.value(), convert::str_new("size"), fix(1));
        let args = spec.resolve("m", &[fix(1), hash.value()], true, false).unwrap();
        assert_eq!(args.mandatory.len(), 2);
        assert!(args.keywords.is_empty());
    });
}

#[test]
fn keywords_ignored_when_none_declared() {
    on_vm_thread(|| {
        let spec = ArgsSpec::fixed(2);
        let hash = keyword_hash(&[("size", 1)]);
        let args = spec.resolve("m", &[fix(1), hash.value()], true, false).unwrap();
        assert_eq!(args.mandatory[1], hash);
    });
}

#[test]
fn unknown_and_missing_keywords_are_reported() {
    on_vm_thread(|| {
        let spec = ArgsSpec::new().required_keyword("name").unwrap();
        let passed = keyword_hash(&[("name", 1), ("color", 2)]);
        let unknown = spec.resolve("m", &[passed.value()], true, false).unwrap_err();
        assert!(matches!(unknown, BridgeError::UnknownKeyword(ref k) if k == "color"));

        let passed = keyword_hash(&[("size", 1)]);
        let missing = ArgsSpec::new()
            .keyword("size", None)
            .unwrap()
            .required_keyword("name")
            .unwrap()
            .resolve("m", &[passed.value()], true, false)
            .unwrap_err();
        assert!(matches!(missing, BridgeError::MissingKeyword(ref k) if k == "name"));
    });
}

#[test]
fn spec_builders_validate_keywords() {
    let duplicate = ArgsSpec::new().keyword("size", None).unwrap().keyword("size", None);
    assert!(matches!(duplicate, Err(BridgeError::DuplicateKeyword(ref k)) if k == "size"));
    let malformed = ArgsSpec::new().keyword("Size", None);
    assert!(matches!(malformed, Err(BridgeError::BadIdentifier { .. })));
}

#[test]
fn positional_iteration_follows_call_order() {
    let args = MethodArgs {
        mandatory: vec![RbObject::from_value(fix(1))],
        optional: vec![RbObject::from_value(fix(2))],
        splat: vec![RbObject::from_value(fix(3))],
        trailing: vec![RbObject::from_value(fix(4))],
        ..MethodArgs::default()
    };
    let order: Vec<i64> = args.positional().map(|v| v.value().fix2long()).collect();
    assert_eq!(order, vec![1, 2, 3, 4]);
    assert_eq!(args.arg(2).map(|v| v.value().fix2long()), Some(3));
    assert!(args.arg(4).is_none());
}
