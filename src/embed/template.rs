//! Template types for typed variable injection.

use std::marker::PhantomData;

/// A set of values for one template's placeholders.
///
/// Implementations escape what they splice in; the template only replaces
/// markers.
pub trait TemplateVars {
    fn apply(&self, content: &str) -> String;
}

/// Replace every `__NAME__` marker `value` knows in a single pass.
///
/// Substituted text is never rescanned, so markers inside values stay
/// literal. Unknown markers are left as they are.
pub fn substitute(content: &str, value: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("__") {
        let after = &rest[start + 2..];
        let replaced = after
            .find("__")
            .and_then(|len| Some((len, value(&after[..len])?)));

        match replaced {
            Some((len, text)) => {
                out.push_str(&rest[..start]);
                out.push_str(&text);
                rest = &after[len + 2..];
            }
            None => {
                out.push_str(&rest[..=start]);
                rest = &rest[start + 1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Template with typed variable injection
#[derive(Debug, Clone, Copy)]
pub struct Template<V> {
    content: &'static str,
    _marker: PhantomData<V>,
}

impl<V> Template<V> {
    pub const fn new(content: &'static str) -> Self {
        Self {
            content,
            _marker: PhantomData,
        }
    }

    pub const fn content(&self) -> &'static str {
        self.content
    }
}

impl<V: TemplateVars> Template<V> {
    pub fn render(&self, vars: &V) -> String {
        vars.apply(self.content)
    }
}
