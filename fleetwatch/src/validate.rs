//! Client-side form checks. Failures come back as field-level values; nothing
//! here returns an error or panics.

use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

use crate::types::ServerForm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"))
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static code regex"))
}

pub fn email(value: &str) -> Vec<FieldError> {
    let v = value.trim();
    if v.is_empty() {
        vec![FieldError::new("email", "email is required")]
    } else if !email_re().is_match(v) {
        vec![FieldError::new("email", "not a valid email address")]
    } else {
        Vec::new()
    }
}

fn valid_host(v: &str) -> bool {
    v.parse::<IpAddr>().is_ok()
        || (!v.is_empty()
            && v.split('.').all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                    && !label.starts_with('-')
                    && !label.ends_with('-')
            }))
}

pub fn server_form(form: &ServerForm) -> Vec<FieldError> {
    let mut errs = Vec::new();

    let code = form.code.trim();
    if code.is_empty() {
        errs.push(FieldError::new("code", "server code is required"));
    } else if !code_re().is_match(code) {
        errs.push(FieldError::new(
            "code",
            "use letters, digits, '-' or '_' only",
        ));
    }

    if form.name.trim().is_empty() {
        errs.push(FieldError::new("name", "server name is required"));
    }

    let ip = form.ip.trim();
    if ip.is_empty() {
        errs.push(FieldError::new("ip", "address is required"));
    } else if !valid_host(ip) {
        errs.push(FieldError::new("ip", "not a valid IP address or host name"));
    }

    match form.port.trim().parse::<u16>() {
        Ok(0) | Err(_) => errs.push(FieldError::new("port", "port must be 1-65535")),
        Ok(_) => {}
    }

    errs
}
