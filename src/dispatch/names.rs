use crate::error::BridgeError;

const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "==", "!=", "<", ">", "<=", ">=", "<=>", "===", "=~", "!", "[]",
    "[]=", "<<", ">>", "&", "|", "^", "~", "+@", "-@",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn bad(name: &str, reason: &'static str) -> BridgeError {
    BridgeError::BadIdentifier {
        name: name.to_string(),
        reason,
    }
}

pub(crate) fn check_method_name(name: &str) -> Result<(), BridgeError> {
    if OPERATORS.contains(&name) {
        return Ok(());
    }
    let body = name.strip_suffix(['?', '!', '=']).unwrap_or(name);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) && chars.all(is_ident_char) => Ok(()),
        _ => Err(bad(name, "method names are identifiers or operators")),
    }
}

pub(crate) fn check_global_name(name: &str) -> Result<(), BridgeError> {
    match name.strip_prefix('$') {
        Some(rest) if !rest.is_empty() && rest.chars().all(is_ident_char) => Ok(()),
        _ => Err(bad(name, "global names start with '$'")),
    }
}

pub(crate) fn check_constant_name(name: &str) -> Result<(), BridgeError> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() && chars.all(is_ident_char) => Ok(()),
        _ => Err(bad(name, "constant names start with an uppercase letter")),
    }
}

pub(crate) fn check_keyword_name(name: &str) -> Result<(), BridgeError> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if (c.is_ascii_lowercase() || c == '_') && chars.all(is_ident_char) => Ok(()),
        _ => Err(bad(name, "keyword names are lowercase identifiers")),
    }
}
