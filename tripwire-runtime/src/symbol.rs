use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Symbols predefined by the host with a fixed identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WellKnownSymbol {
    /// `Symbol.toPrimitive`, which customizes coercion of objects to primitives.
    ToPrimitive,
    /// `Symbol.iterator`.
    Iterator,
    /// `Symbol.toStringTag`.
    ToStringTag,
}

impl WellKnownSymbol {
    fn name(self) -> &'static str {
        match self {
            WellKnownSymbol::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbol::Iterator => "Symbol.iterator",
            WellKnownSymbol::ToStringTag => "Symbol.toStringTag",
        }
    }
}

#[derive(Debug)]
struct SymbolData {
    description: Option<String>,
    well_known: Option<WellKnownSymbol>,
}

/// A host symbol.
///
/// Symbols created with [`Symbol::new`] are unique: two symbols are equal only if one is a clone
/// of the other. Well-known symbols are equal to every other instance of the same well-known
/// symbol.
#[derive(Clone)]
pub struct Symbol(Rc<SymbolData>);

impl Symbol {
    /// Creates a new unique symbol.
    pub fn new(description: Option<&str>) -> Self {
        Self(Rc::new(SymbolData {
            description: description.map(str::to_owned),
            well_known: None,
        }))
    }

    /// Returns the given well-known symbol.
    pub fn well_known(symbol: WellKnownSymbol) -> Self {
        Self(Rc::new(SymbolData {
            description: Some(symbol.name().to_owned()),
            well_known: Some(symbol),
        }))
    }

    /// Returns `Symbol.toPrimitive`.
    pub fn to_primitive() -> Self {
        Self::well_known(WellKnownSymbol::ToPrimitive)
    }

    /// Returns the description passed when creating the symbol.
    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    /// Returns the well-known symbol this represents, if any.
    pub fn as_well_known(&self) -> Option<WellKnownSymbol> {
        self.0.well_known
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        match (self.0.well_known, other.0.well_known) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Rc::ptr_eq(&self.0, &other.0),
            _ => false,
        }
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.0.well_known {
            Some(symbol) => symbol.hash(state),
            None => (Rc::as_ptr(&self.0) as usize).hash(state),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or_default())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
