//! Line hooks: transformations applied to every log line before emission

use std::sync::Arc;

/// Transforms a log line before it is emitted
pub trait LineHook: Send + Sync {
    fn process_line(&self, line: &str) -> String;
}

impl<F> LineHook for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn process_line(&self, line: &str) -> String {
        self(line)
    }
}

/// Emits lines unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityHook;

impl LineHook for IdentityHook {
    fn process_line(&self, line: &str) -> String {
        line.to_string()
    }
}

/// Removes ANSI escape sequences (colors, cursor movement, titles)
#[derive(Debug, Default, Clone, Copy)]
pub struct StripAnsiHook;

impl LineHook for StripAnsiHook {
    fn process_line(&self, line: &str) -> String {
        strip_ansi(line)
    }
}

/// Prepends a fixed prefix to every line
#[derive(Debug, Clone)]
pub struct PrefixHook {
    prefix: String,
}

impl PrefixHook {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl LineHook for PrefixHook {
    fn process_line(&self, line: &str) -> String {
        format!("{}{}", self.prefix, line)
    }
}

/// Applies hooks in order
#[derive(Default, Clone)]
pub struct ChainHook {
    hooks: Vec<Arc<dyn LineHook>>,
}

impl ChainHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, hook: impl LineHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl LineHook for ChainHook {
    fn process_line(&self, line: &str) -> String {
        self.hooks
            .iter()
            .fold(line.to_string(), |acc, hook| hook.process_line(&acc))
    }
}

/// Strip CSI, OSC and two-character escape sequences
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }

        match chars.next() {
            // CSI: parameters then a final byte in @..~
            Some('[') => {
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: terminated by BEL or ESC \
            Some(']') => {
                while let Some(c) = chars.next() {
                    if c == '\u{7}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_identity() {
        assert_eq!(IdentityHook.process_line("as is"), "as is");
    }

    #[test]
    fn strips_colors() {
        let line = "\u{1b}[1;32mCompiling\u{1b}[0m corral v0.1.0";
        assert_eq!(StripAnsiHook.process_line(line), "Compiling corral v0.1.0");
    }

    #[test]
    fn strips_titles_and_short_escapes() {
        assert_eq!(strip_ansi("\u{1b}]0;title\u{7}body"), "body");
        assert_eq!(strip_ansi("\u{1b}]8;;url\u{1b}\\link"), "link");
        assert_eq!(strip_ansi("a\u{1b}7b"), "ab");
    }

    #[test]
    fn unterminated_escape_is_dropped() {
        assert_eq!(strip_ansi("tail\u{1b}[31"), "tail");
    }

    #[test]
    fn chain_applies_in_order() {
        let hook = ChainHook::new()
            .then(StripAnsiHook)
            .then(PrefixHook::new("[web] "))
            .then(|line: &str| line.to_uppercase());
        assert!(!hook.is_empty());
        assert_eq!(hook.process_line("\u{1b}[33mready\u{1b}[0m"), "[WEB] READY");
    }

    #[test]
    fn empty_chain_is_identity() {
        assert_eq!(ChainHook::new().process_line("x"), "x");
    }
}
