use std::cmp::Ordering;

use crate::guest::{self, Value, convert};

/// Longest chain of `Integer()` coercions followed before giving up.
pub const MAX_COERCIONS: usize = 64;

pub const NEGATIVE_UNSIGNED: &str = "Value is negative and cannot be expressed as unsigned.";

/// Unsigned conversion that rejects negatives instead of wrapping.
///
/// Must run inside a protected job: every failure is a guest raise.
pub(super) fn to_unsigned(value: Value) -> u64 {
    let mut current = value;
    for _ in 0..=MAX_COERCIONS {
        if convert::is_integer(current) || convert::is_float(current) {
            if convert::numeric_sign(current) == Some(Ordering::Less) {
                guest::raise_new(guest::core_classes().type_error, NEGATIVE_UNSIGNED);
            }
            return convert::num2ulong(current);
        }
        current = convert::integer(current);
    }
    guest::raise_new(
        guest::core_classes().type_error,
        &format!(
            "can't convert {} to an unsigned integer in {} steps",
            guest::class::obj_classname(value),
            MAX_COERCIONS
        ),
    )
}
