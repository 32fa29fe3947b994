//! UI surface capability.
//!
//! The embedded view is external to this crate; the core only ever talks to
//! it through this trait. Calls are a named function identifier plus string
//! arguments, each escaped for safe embedding before they reach the surface.

/// Outbound capability to the embedded view.
///
/// Implementations must only be invoked from the controller's event pump (the
/// single UI-facing consumer); the core guarantees that by routing every call
/// through [`crate::context::HandlerContext::call_ui`].
pub trait UiSurface: Send + Sync {
    /// Deliver a call to the embedded view. Arguments arrive pre-escaped.
    fn invoke(&self, function: &str, args: &[String]);
}

/// Escape a string for embedding in a single-quoted call argument.
pub fn escape_arg(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render a call as `function('arg1','arg2')` from pre-escaped arguments.
///
/// Useful for surfaces that inject script text into a webview.
pub fn build_call(function: &str, escaped_args: &[String]) -> String {
    let mut out = String::with_capacity(function.len() + 2 + escaped_args.len() * 16);
    out.push_str(function);
    out.push('(');
    for (i, arg) in escaped_args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('\'');
        out.push_str(arg);
        out.push('\'');
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_control_characters() {
        assert_eq!(escape_arg(r#"a'b"c"#), r#"a\'b\"c"#);
        assert_eq!(escape_arg("line1\nline2\t."), "line1\\nline2\\t.");
        assert_eq!(escape_arg(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn builds_call_with_arguments() {
        let args = vec![escape_arg("it's"), escape_arg("fine")];
        assert_eq!(build_call("updateStatus", &args), r"updateStatus('it\'s','fine')");
    }

    #[test]
    fn builds_call_without_arguments() {
        assert_eq!(build_call("clearMessages", &[]), "clearMessages()");
    }
}
