use crate::error::BridgeError;
use crate::guest::helpers::ReturnValue;
use crate::guest::{self, Id, Value};
use crate::value::RbObject;

use super::outcome::{catch_host, fill_return};
use super::{GlobalEntry, tables};

fn global_entry(name: Value) -> Result<(Id, GlobalEntry), BridgeError> {
    let id = name
        .symbol_id()
        .ok_or_else(|| BridgeError::bad_type("Symbol", format!("{:?}", name)))?;
    let entry = tables().globals.get(&id).cloned();
    entry
        .map(|entry| (id, entry))
        .ok_or_else(|| BridgeError::MissingCallback(guest::id_name(id)))
}

pub(super) extern "C" fn getter_trampoline(name: Value, rv: *mut ReturnValue) {
    let outcome = catch_host(|| {
        let (_, entry) = global_entry(name)?;
        (entry.0.get()?.getter)()
    });
    fill_return(rv, outcome);
}

pub(super) extern "C" fn setter_trampoline(name: Value, new_value: Value, rv: *mut ReturnValue) {
    let outcome = catch_host(|| {
        let (id, entry) = global_entry(name)?;
        let Some(setter) = &entry.0.get()?.setter else {
            return Err(BridgeError::MissingCallback(format!("{}=", guest::id_name(id))));
        };
        let value = RbObject::from_value(new_value);
        setter(&value)?;
        Ok(value)
    });
    fill_return(rv, outcome);
}
