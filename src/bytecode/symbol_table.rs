//! Lexically nested symbol resolution for the bytecode compiler.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The kind of binding slot a name resolves to. Each scope has its own index
/// space and load opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The self-reference of a named function literal.
    Function,
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope's bindings. Enclosed tables form a chain rooted at the
/// global table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Rc<RefCell<SymbolTable>>>,
    store: HashMap<String, Symbol>,
    pub num_definitions: usize,
    /// Captured symbols from enclosing scopes, in first-encounter order.
    /// These are the *original* symbols, so the enclosing compilation can
    /// emit loads in the right scope before `Closure`.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: Rc<RefCell<SymbolTable>>) -> Self {
        Self {
            outer: Some(outer),
            ..Self::default()
        }
    }

    pub fn outer(&self) -> Option<Rc<RefCell<SymbolTable>>> {
        self.outer.clone()
    }

    /// Bind a name in this scope: Global at the root, Local elsewhere.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };

        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Bind a built-in at its registry index.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind the name of the function literal currently being compiled, so its
    /// body can refer to itself via `CurrentClosure`.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolve a name, walking the chain of enclosing tables. A hit in an
    /// enclosing non-global, non-builtin scope is converted into a Free
    /// binding of this table, capturing the original symbol.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.clone()?;
        let symbol = outer.borrow_mut().resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());

        let symbol = Symbol {
            name: original.name,
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}
