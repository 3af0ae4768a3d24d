//! Argument specs and their resolution against a raw argument vector.

use std::collections::BTreeMap;

use crate::error::{ArityRange, BridgeError};
use crate::guest::{self, Value, convert};
use crate::protect::{self, Job, JobOutput};
use crate::value::RbObject;

use super::names;

#[derive(Debug, Clone)]
struct KeywordSpec {
    name: String,
    required: bool,
    default: Option<RbObject>,
}

/// Calling convention of a host method.
#[derive(Debug, Clone, Default)]
pub struct ArgsSpec {
    mandatory: usize,
    optional: Vec<Option<RbObject>>,
    splat: bool,
    trailing: usize,
    keywords: Vec<KeywordSpec>,
}

impl ArgsSpec {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exactly `n` positional arguments.
    pub fn fixed(n: usize) -> Self {
        Self {
            mandatory: n,
            ..Self::default()
        }
    }

    /// Any number of positional arguments, all collected in the splat.
    pub fn varargs() -> Self {
        Self {
            splat: true,
            ..Self::default()
        }
    }

    pub fn mandatory(mut self, n: usize) -> Self {
        self.mandatory = n;
        self
    }

    /// One more optional positional. `None` defaults to `nil`.
    pub fn optional(mut self, default: Option<RbObject>) -> Self {
        self.optional.push(default);
        self
    }

    pub fn splatted(mut self) -> Self {
        self.splat = true;
        self
    }

    /// Mandatory positionals after the optional and splat ones.
    pub fn trailing(mut self, n: usize) -> Self {
        self.trailing = n;
        self
    }

    /// An optional keyword. Without a default it is absent when not passed.
    pub fn keyword(self, name: &str, default: Option<RbObject>) -> Result<Self, BridgeError> {
        self.with_keyword(name, false, default)
    }

    pub fn required_keyword(self, name: &str) -> Result<Self, BridgeError> {
        self.with_keyword(name, true, None)
    }

    fn with_keyword(mut self, name: &str, required: bool, default: Option<RbObject>) -> Result<Self, BridgeError> {
        names::check_keyword_name(name)?;
        if self.keywords.iter().any(|k| k.name == name) {
            return Err(BridgeError::DuplicateKeyword(name.to_string()));
        }
        self.keywords.push(KeywordSpec {
            name: name.to_string(),
            required,
            default,
        });
        Ok(self)
    }

    pub fn arity(&self) -> ArityRange {
        let min = self.mandatory + self.trailing;
        ArityRange {
            min,
            max: (!self.splat).then_some(min + self.optional.len()),
        }
    }

    pub fn takes_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }

    /// Splits `args` according to this spec.
    ///
    /// A trailing hash is taken as keywords only when keywords are declared,
    /// the caller passed keywords and every key is a Symbol.
    pub fn resolve(
        &self,
        method: &str,
        args: &[Value],
        kw_given: bool,
        block_given: bool,
    ) -> Result<MethodArgs, BridgeError> {
        let mut positional = args;
        let mut passed = Vec::new();
        if self.takes_keywords() && kw_given {
            if let Some((last, rest)) = args.split_last() {
                if let JobOutput::ArgHash {
                    hash,
                    is_hash: true,
                    all_symbols: true,
                } = protect::protect(Job::ScanArgHash(*last))?
                {
                    passed = convert::hash_entries(hash).unwrap_or_default();
                    positional = rest;
                }
            }
        }

        let expected = self.arity();
        if !expected.contains(positional.len()) {
            return Err(BridgeError::Arity {
                method: method.to_string(),
                given: positional.len(),
                expected,
            });
        }

        let boxed: Vec<RbObject> = positional.iter().copied().map(RbObject::from_value).collect();
        let (mandatory, rest) = boxed.split_at(self.mandatory);
        let (middle, trailing) = rest.split_at(rest.len() - self.trailing);
        let optional = self
            .optional
            .iter()
            .enumerate()
            .map(|(i, default)| match middle.get(i) {
                Some(given) => given.clone(),
                None => default.clone().unwrap_or_else(RbObject::nil),
            })
            .collect();
        let splat = if self.splat {
            middle.iter().skip(self.optional.len()).cloned().collect()
        } else {
            Vec::new()
        };

        Ok(MethodArgs {
            mandatory: mandatory.to_vec(),
            optional,
            splat,
            trailing: trailing.to_vec(),
            keywords: self.merge_keywords(passed)?,
            block_given,
        })
    }

    fn merge_keywords(&self, passed: Vec<(Value, Value)>) -> Result<BTreeMap<String, RbObject>, BridgeError> {
        let mut merged = BTreeMap::new();
        for (key, value) in passed {
            let name = key.symbol_id().map(guest::id_name).unwrap_or_default();
            if !self.keywords.iter().any(|k| k.name == name) {
                return Err(BridgeError::UnknownKeyword(name));
            }
            merged.insert(name, RbObject::from_value(value));
        }
        for keyword in &self.keywords {
            if merged.contains_key(&keyword.name) {
                continue;
            }
            if keyword.required {
                return Err(BridgeError::MissingKeyword(keyword.name.clone()));
            }
            if let Some(default) = &keyword.default {
                merged.insert(keyword.name.clone(), default.clone());
            }
        }
        Ok(merged)
    }
}

/// Arguments of one host method call, split by kind.
#[derive(Debug, Clone, Default)]
pub struct MethodArgs {
    pub mandatory: Vec<RbObject>,
    pub optional: Vec<RbObject>,
    pub splat: Vec<RbObject>,
    pub trailing: Vec<RbObject>,
    pub keywords: BTreeMap<String, RbObject>,
    pub block_given: bool,
}

impl MethodArgs {
    /// Positionals in call order.
    pub fn positional(&self) -> impl Iterator<Item = &RbObject> {
        self.mandatory
            .iter()
            .chain(&self.optional)
            .chain(&self.splat)
            .chain(&self.trailing)
    }

    pub fn arg(&self, index: usize) -> Option<&RbObject> {
        self.positional().nth(index)
    }

    pub fn len(&self) -> usize {
        self.mandatory.len() + self.optional.len() + self.splat.len() + self.trailing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keyword(&self, name: &str) -> Option<&RbObject> {
        self.keywords.get(name)
    }

    /// Yields to the block of the running method.
    pub fn yield_block(&self, args: &[RbObject]) -> Result<RbObject, BridgeError> {
        let args = crate::value::values(args);
        protect::protect_object(Job::Yield(&args))
    }
}
