use super::helpers;
use super::jump::{Failure, GuestResult, check};
use super::state::{GlobalEntry, GlobalKind, State, with_state};
use super::value::{Id, Value};

enum Slot {
    Plain(Value),
    Virtual { readonly: bool },
}

fn global_id(s: &mut State, name: &str) -> GuestResult<Id> {
    if name.len() < 2 || !name.starts_with('$') {
        return Err(Failure::new(
            s.classes.name_error,
            format!("'{}' is not allowed as a global variable name", name),
        ));
    }
    Ok(s.intern(name))
}

fn slot(name: &str) -> GuestResult<(Id, Slot)> {
    with_state(|s| {
        let id = global_id(s, name)?;
        let slot = match s.globals.get(&id) {
            Some(GlobalEntry {
                kind: GlobalKind::Virtual { readonly },
                ..
            }) => Slot::Virtual {
                readonly: *readonly,
            },
            Some(entry) => Slot::Plain(entry.value),
            None => Slot::Plain(Value::NIL),
        };
        Ok((id, slot))
    })
}

/// Reads a global variable. Unset globals read as `nil`.
pub fn gv_get(name: &str) -> Value {
    match check(slot(name)) {
        (_, Slot::Plain(value)) => value,
        (id, Slot::Virtual { .. }) => helpers::call_gvar_getter(id),
    }
}

/// Writes a global variable and returns the stored value.
pub fn gv_set(name: &str, value: Value) -> Value {
    match check(slot(name)) {
        (id, Slot::Plain(_)) => {
            with_state(|s| {
                s.globals.insert(
                    id,
                    GlobalEntry {
                        value,
                        kind: GlobalKind::Plain,
                    },
                );
            });
            value
        }
        (_, Slot::Virtual { readonly: true }) => check(with_state(|s| {
            Err(Failure::new(
                s.classes.name_error,
                format!("{} is a read-only variable", name),
            ))
        })),
        (id, Slot::Virtual { readonly: false }) => {
            helpers::call_gvar_setter(id, value);
            value
        }
    }
}

/// Declares `name` as a global backed by the virtual-variable callbacks.
pub(crate) fn define_virtual(name: &str, readonly: bool) {
    check(with_state(|s| {
        let id = global_id(s, name)?;
        s.globals.insert(
            id,
            GlobalEntry {
                value: Value::NIL,
                kind: GlobalKind::Virtual { readonly },
            },
        );
        Ok(())
    }))
}
