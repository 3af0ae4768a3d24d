use std::ffi::{c_int, c_long};

use log::{debug, trace};

use crate::error::BridgeError;
use crate::guest::helpers::ReturnValue;
use crate::guest::{self, Id, Value, call};
use crate::value::RbObject;
use crate::vm;

use super::outcome::{catch_host, fill_return, raw_args};
use super::{CallSite, MethodEntry, tables};

/// Finds the entry for `method` along `chain`, nearest first.
///
/// A hit on an ancestor other than the chain head is cached under the head.
/// The cache is dropped whenever the class hierarchy changed since it was
/// filled.
pub(super) fn lookup(chain: &[Value], method: Id) -> Option<MethodEntry> {
    let head = *chain.first()?;
    let serial = guest::class::hierarchy_serial();
    let mut tables = tables();
    if tables.cache_serial != serial {
        tables.cache.clear();
        tables.cache_serial = serial;
    }
    if let Some(&target) = tables.cache.get(&(head, method)) {
        if let Some(entry) = tables.methods.get(&CallSite { target, method }).cloned() {
            tables.stats.cache_hits += 1;
            return Some(entry);
        }
    }
    tables.stats.walks += 1;
    let (target, entry) = chain.iter().find_map(|&target| {
        tables
            .methods
            .get(&CallSite { target, method })
            .map(|entry| (target, entry.clone()))
    })?;
    if target != head {
        tables.cache.insert((head, method), target);
    }
    Some(entry)
}

pub(super) fn dispatch_chain(
    method: Id,
    chain: &[Value],
    receiver: &RbObject,
    args: &[Value],
    kw_given: bool,
    block_given: bool,
) -> Result<RbObject, BridgeError> {
    let Some(entry) = lookup(chain, method) else {
        return Err(BridgeError::MissingCallback(guest::id_name(method)));
    };
    if vm::trace_dispatch() {
        debug!("dispatch {} with {} argument(s)", entry.name, args.len());
    } else {
        trace!("dispatch {} with {} argument(s)", entry.name, args.len());
    }
    let resolved = entry.spec()?.resolve(&entry.name, args, kw_given, block_given)?;
    entry.invoke(receiver, &resolved)
}

pub(super) extern "C" fn method_trampoline(
    symbol: Value,
    target_count: c_long,
    targets: *const Value,
    recv: Value,
    argc: c_int,
    argv: *const Value,
    rv: *mut ReturnValue,
) {
    let outcome = catch_host(|| {
        let method = symbol
            .symbol_id()
            .ok_or_else(|| BridgeError::bad_type("Symbol", format!("{:?}", symbol)))?;
        let count = c_int::try_from(target_count).unwrap_or(0);
        // SAFETY: the helper layer passes its ancestry vector and argument
        // vector with their lengths; both outlive this call.
        let (chain, args) = unsafe { (raw_args(count, targets), raw_args(argc, argv)) };
        let receiver = RbObject::from_value(recv);
        dispatch_chain(
            method,
            chain,
            &receiver,
            args,
            call::keyword_given(),
            call::block_given(),
        )
    });
    fill_return(rv, outcome);
}
