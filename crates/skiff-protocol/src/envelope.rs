//! Inbound UI event envelope.
//!
//! The UI surface delivers every event as a single string of the form
//! `type:content`. The content portion may itself be structured (JSON or
//! whatever the handler expects) and is opaque at this layer.

/// A raw UI event split into its type tag and payload.
///
/// Borrows from the raw event string; nothing is copied during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Type tag used for handler dispatch.
    pub kind: &'a str,
    /// Everything after the first delimiter. Empty when no delimiter is
    /// present.
    pub content: &'a str,
}

impl<'a> Envelope<'a> {
    /// Split a raw event on the first `:`.
    ///
    /// No delimiter means the whole string is the type tag and the content is
    /// empty. An empty type tag is malformed and yields `None`; the caller is
    /// expected to log and drop it rather than propagate an error.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (kind, content) = match raw.split_once(':') {
            Some((kind, content)) => (kind, content),
            None => (raw, ""),
        };
        if kind.is_empty() {
            return None;
        }
        Some(Self { kind, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_delimiter() {
        let env = Envelope::parse("send_message:hello world").unwrap();
        assert_eq!(env.kind, "send_message");
        assert_eq!(env.content, "hello world");
    }

    #[test]
    fn later_delimiters_stay_in_content() {
        let env = Envelope::parse("load_session:id:with:colons").unwrap();
        assert_eq!(env.kind, "load_session");
        assert_eq!(env.content, "id:with:colons");
    }

    #[test]
    fn missing_delimiter_means_empty_content() {
        let env = Envelope::parse("create_new_session").unwrap();
        assert_eq!(env.kind, "create_new_session");
        assert_eq!(env.content, "");
    }

    #[test]
    fn empty_type_is_malformed() {
        assert!(Envelope::parse(":payload").is_none());
        assert!(Envelope::parse("").is_none());
    }

    #[test]
    fn content_may_be_empty_with_delimiter() {
        let env = Envelope::parse("interrupt_session:").unwrap();
        assert_eq!(env.kind, "interrupt_session");
        assert_eq!(env.content, "");
    }
}
