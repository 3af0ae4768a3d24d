/// Static description of one bridge error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: &'static str,
    pub title: &'static str,
    pub hint: Option<&'static str>,
}

pub const SETUP_FAILED: ErrorCode = ErrorCode {
    code: "E2000",
    title: "INTERPRETER SETUP FAILED",
    hint: Some("The interpreter boots once per process and cannot be restarted after cleanup."),
};

pub const GUEST_EXCEPTION: ErrorCode = ErrorCode {
    code: "E2001",
    title: "GUEST EXCEPTION",
    hint: None,
};

pub const FLOW_CONTROL: ErrorCode = ErrorCode {
    code: "E2002",
    title: "FLOW CONTROL JUMP",
    hint: Some("Return this error unchanged from the enclosing callback."),
};

pub const HOST_BREAK: ErrorCode = ErrorCode {
    code: "E2003",
    title: "BREAK FROM BLOCK",
    hint: None,
};

pub const WRONG_ARITY: ErrorCode = ErrorCode {
    code: "E2004",
    title: "WRONG NUMBER OF ARGUMENTS",
    hint: None,
};

pub const BAD_IDENTIFIER: ErrorCode = ErrorCode {
    code: "E2005",
    title: "BAD IDENTIFIER",
    hint: Some("Method names are identifiers or operators, globals start with `$`, constants are capitalized."),
};

pub const BAD_TYPE: ErrorCode = ErrorCode {
    code: "E2006",
    title: "WRONG VALUE TYPE",
    hint: None,
};

pub const DUPLICATE_KEYWORD: ErrorCode = ErrorCode {
    code: "E2007",
    title: "DUPLICATE KEYWORD",
    hint: Some("Each keyword may be declared once per argument spec."),
};

pub const UNKNOWN_KEYWORD: ErrorCode = ErrorCode {
    code: "E2008",
    title: "UNKNOWN KEYWORD",
    hint: None,
};

pub const MISSING_KEYWORD: ErrorCode = ErrorCode {
    code: "E2009",
    title: "MISSING KEYWORD",
    hint: None,
};

pub const MISSING_CALLBACK: ErrorCode = ErrorCode {
    code: "E2010",
    title: "MISSING CALLBACK",
    hint: Some("Register the method before the interpreter calls it."),
};

pub const GVL_VIOLATION: ErrorCode = ErrorCode {
    code: "E2011",
    title: "GVL VIOLATION",
    hint: Some("Only the initializing thread and interpreter-spawned threads may call in."),
};

pub const HOST_PANIC: ErrorCode = ErrorCode {
    code: "E2012",
    title: "HOST PANIC",
    hint: None,
};

pub const ERROR_CODES: &[ErrorCode] = &[
    SETUP_FAILED,
    GUEST_EXCEPTION,
    FLOW_CONTROL,
    HOST_BREAK,
    WRONG_ARITY,
    BAD_IDENTIFIER,
    BAD_TYPE,
    DUPLICATE_KEYWORD,
    UNKNOWN_KEYWORD,
    MISSING_KEYWORD,
    MISSING_CALLBACK,
    GVL_VIOLATION,
    HOST_PANIC,
];

pub fn lookup(code: &str) -> Option<&'static ErrorCode> {
    ERROR_CODES.iter().find(|entry| entry.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_sequential() {
        for (index, entry) in ERROR_CODES.iter().enumerate() {
            assert_eq!(entry.code, format!("E{}", 2000 + index));
        }
    }

    #[test]
    fn lookup_finds_registered_codes() {
        assert_eq!(lookup("E2004"), Some(&WRONG_ARITY));
        assert!(lookup("E1000").is_none());
    }
}
