//! Selector subset used by addresses.
//!
//! Supported: type (`div`, `*`), `#id`, `.class`, `[attr]`, `[attr=value]`,
//! compounds of those, descendant (whitespace) and child (`>`) combinators.
//! Pseudo classes cannot occur because `:` separates the designator.

use crate::dom::Element;
use crate::error::CrafterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCondition {
    Exists(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Each step carries the combinator joining it to the previous step.
    steps: Vec<(Combinator, Compound)>,
}

impl Selector {
    pub fn parse(selector: &str) -> Result<Self, CrafterError> {
        let unsupported = || CrafterError::UnsupportedSelector {
            selector: selector.to_string(),
        };

        let mut steps = Vec::new();
        let mut pending = Combinator::Descendant;
        let mut expect_compound = true;

        for token in tokenize(selector).ok_or_else(unsupported)? {
            if token == ">" {
                if expect_compound {
                    return Err(unsupported());
                }
                pending = Combinator::Child;
                expect_compound = true;
                continue;
            }
            let compound = parse_compound(&token).ok_or_else(unsupported)?;
            steps.push((pending, compound));
            pending = Combinator::Descendant;
            expect_compound = false;
        }

        if steps.is_empty() || expect_compound {
            return Err(unsupported());
        }
        Ok(Selector { steps })
    }

    pub fn matches(&self, element: &Element) -> bool {
        self.matches_step(self.steps.len() - 1, element)
    }

    fn matches_step(&self, index: usize, element: &Element) -> bool {
        let (combinator, compound) = &self.steps[index];
        if !compound.matches(element) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => element
                .parent_element()
                .map_or(false, |parent| self.matches_step(index - 1, &parent)),
            Combinator::Descendant => {
                let mut current = element.parent_element();
                while let Some(ancestor) = current {
                    if self.matches_step(index - 1, &ancestor) {
                        return true;
                    }
                    current = ancestor.parent_element();
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_list = element.class_list();
            if !self.classes.iter().all(|c| class_list.contains(c)) {
                return false;
            }
        }
        self.attrs.iter().all(|condition| match condition {
            AttrCondition::Exists(name) => element.has_attribute(name),
            AttrCondition::Equals(name, value) => {
                element.attribute(name).as_deref() == Some(value.as_str())
            }
        })
    }
}

/// Split on combinators outside of brackets. `None` on unbalanced brackets or
/// combinators outside the supported subset.
fn tokenize(selector: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;

    for ch in selector.chars() {
        match ch {
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth.checked_sub(1)?;
                current.push(ch);
            }
            '>' if bracket_depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(">".to_string());
            }
            '+' | '~' | ',' | '(' | ')' if bracket_depth == 0 => return None,
            ch if ch.is_whitespace() && bracket_depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if bracket_depth != 0 {
        return None;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Some(tokens)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut ident = String::new();
    while let Some(&ch) = chars.peek() {
        if !is_ident_char(ch) {
            break;
        }
        ident.push(ch);
        chars.next();
    }
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

fn parse_compound(token: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut chars = token.chars().peekable();

    match chars.peek() {
        Some('*') => {
            chars.next();
        }
        Some(&ch) if is_ident_char(ch) => compound.tag = read_ident(&mut chars),
        _ => {}
    }

    while let Some(ch) = chars.next() {
        match ch {
            '#' => {
                if compound.id.is_some() {
                    return None;
                }
                compound.id = Some(read_ident(&mut chars)?);
            }
            '.' => compound.classes.push(read_ident(&mut chars)?),
            '[' => {
                let mut inner = String::new();
                loop {
                    match chars.next()? {
                        ']' => break,
                        c => inner.push(c),
                    }
                }
                compound.attrs.push(parse_attr_condition(&inner)?);
            }
            _ => return None,
        }
    }

    Some(compound)
}

fn parse_attr_condition(inner: &str) -> Option<AttrCondition> {
    match inner.split_once('=') {
        None => {
            let name = inner.trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                return None;
            }
            Some(AttrCondition::Exists(name.to_ascii_lowercase()))
        }
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                return None;
            }
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some(AttrCondition::Equals(
                name.to_ascii_lowercase(),
                unquoted.to_string(),
            ))
        }
    }
}
