//! Declarative decoding of the flat `name value...` token stream.
//!
//! Every operation declares its parameters up front. The decoder scans the
//! raw argument vector for those names and converts the tokens that follow
//! each one; anything it does not recognize is skipped, so a newer host can
//! pass arguments an older binary does not know about.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Scalar,
    /// A count token followed by that many element tokens.
    Tuple,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    Str,
    Int,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgDecl {
    pub name: &'static str,
    pub arity: Arity,
    pub element: ElementType,
}

impl ArgDecl {
    pub const fn str(name: &'static str) -> Self {
        ArgDecl {
            name,
            arity: Arity::Scalar,
            element: ElementType::Str,
        }
    }

    pub const fn int(name: &'static str) -> Self {
        ArgDecl {
            name,
            arity: Arity::Scalar,
            element: ElementType::Int,
        }
    }

    pub const fn str_tuple(name: &'static str) -> Self {
        ArgDecl {
            name,
            arity: Arity::Tuple,
            element: ElementType::Str,
        }
    }

    pub const fn int_tuple(name: &'static str) -> Self {
        ArgDecl {
            name,
            arity: Arity::Tuple,
            element: ElementType::Int,
        }
    }

    /// Converts the tokens following this parameter's name.
    ///
    /// `rest` is never empty. Returns how many tokens were consumed and the
    /// decoded value, if any.
    fn convert(&self, rest: &[String]) -> (usize, Option<ArgValue>) {
        match (self.arity, self.element) {
            (Arity::Scalar, ElementType::Str) => (1, Some(ArgValue::Str(rest[0].clone()))),
            (Arity::Scalar, ElementType::Int) => (1, parse_int(&rest[0]).map(ArgValue::Int)),
            (Arity::Tuple, element) => {
                let count = parse_int(&rest[0])
                    .filter(|n| *n >= 0)
                    .map(|n| usize::try_from(n).unwrap_or(usize::MAX));
                let Some(count) = count else {
                    return (1, Some(ArgValue::empty_tuple(element)));
                };
                let take = count.min(rest.len() - 1);
                let items = &rest[1..1 + take];
                let value = match element {
                    ElementType::Str => ArgValue::StrTuple(items.to_vec()),
                    // A bad element ends the tuple; the stream still advances past all of them.
                    ElementType::Int => {
                        ArgValue::IntTuple(items.iter().map_while(|s| parse_int(s)).collect())
                    }
                };
                (1 + take, Some(value))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    StrTuple(Vec<String>),
    IntTuple(Vec<i64>),
}

impl ArgValue {
    fn empty_tuple(element: ElementType) -> Self {
        match element {
            ElementType::Str => ArgValue::StrTuple(Vec::new()),
            ElementType::Int => ArgValue::IntTuple(Vec::new()),
        }
    }
}

fn parse_int(token: &str) -> Option<i64> {
    token.trim().parse::<i64>().ok()
}

/// The decoded parameter vector: one slot per declaration, in declaration order.
#[derive(Clone, Debug)]
pub struct Params<'a> {
    decls: &'a [ArgDecl],
    slots: Vec<Option<ArgValue>>,
}

impl<'a> Params<'a> {
    pub fn slots(&self) -> &[Option<ArgValue>] {
        &self.slots
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        let idx = self.decls.iter().position(|d| d.name == name)?;
        self.slots[idx].as_ref()
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ArgValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ArgValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn str_tuple(&self, name: &str) -> Option<&[String]> {
        match self.get(name)? {
            ArgValue::StrTuple(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn int_tuple(&self, name: &str) -> Option<&[i64]> {
        match self.get(name)? {
            ArgValue::IntTuple(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Binds `tokens` against `decls`.
///
/// A name token that is the last token of the stream has nothing to bind and
/// is dropped. When a name appears more than once the last occurrence wins.
pub fn decode<'a>(tokens: &[String], decls: &'a [ArgDecl]) -> Params<'a> {
    let mut slots: Vec<Option<ArgValue>> = vec![None; decls.len()];
    let mut idx = 0;
    while idx < tokens.len() {
        let cur = tokens[idx].as_str();
        idx += 1;
        if idx >= tokens.len() {
            break;
        }
        if let Some(slot) = decls.iter().position(|d| d.name == cur) {
            let (consumed, value) = decls[slot].convert(&tokens[idx..]);
            idx += consumed;
            slots[slot] = value;
        }
    }
    Params { decls, slots }
}
