use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use bimap::BiMap;
use prettytable::Table;
use string_cache::DefaultAtom;

use crate::bytecode::{Word, UNRESOLVED_ADDRESS};
use crate::error::{AssemblyErrorKind, StackError};
use crate::stack::GrowableStack;

/**
  A label seen by the assembler, either at its definition or at a reference. Until the
  definition is seen its address is `UNRESOLVED_ADDRESS`. As with all names in this codebase,
  `name` is interned.
*/
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Label {
  pub name            : DefaultAtom,
  pub address         : Word,
  /// The source line of the first reference, for reporting labels that are never defined.
  pub first_reference : Option<usize>,
}

impl Label {
  pub fn is_resolved(&self) -> bool {
    self.address != UNRESOLVED_ADDRESS
  }
}

/**
  The assembler's working table of labels. Entries are appended in the order they are first
  seen and are never removed, so the same table can be carried from one pass to the next.
*/
pub struct LabelTable {
  labels : GrowableStack<Label>,
  index  : HashMap<DefaultAtom, usize>,
}

impl LabelTable {

  pub fn new(capacity: usize) -> Result<LabelTable, StackError> {
    Ok(LabelTable {
      labels : GrowableStack::new(capacity)?,
      index  : HashMap::new()
    })
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn find(&self, name: &str) -> Option<&Label> {
    let position = *self.index.get(&DefaultAtom::from(name))?;
    self.labels.get(position).ok()
  }

  /**
    Records the definition of `name` at `address`. A fresh name is appended, a forward
    reference is resolved, and seeing the same definition again (as happens on the second
    pass) is a no-op. Any other redefinition is an error.
  */
  pub fn define(&mut self, name: &str, address: Word) -> Result<(), AssemblyErrorKind> {
    let atom = DefaultAtom::from(name);

    match self.index.get(&atom).copied() {

      Some(position) => {
        let label = self.labels.get_mut(position)?;
        if !label.is_resolved() {
          tracing::trace!(label = name, address, "resolved forward reference");
          label.address = address;
        } else if label.address != address {
          return Err(AssemblyErrorKind::LabelRedefinition {
            name     : name.to_string(),
            previous : label.address,
            current  : address
          });
        }
      }

      None => {
        tracing::trace!(label = name, address, "defined label");
        self.append(Label { name: atom, address, first_reference: None })?;
      }

    }
    Ok(())
  }

  /**
    Looks up `name` for use as an operand. Unknown names are entered with the unresolved
    sentinel, which is also what is returned for them.
  */
  pub fn reference(&mut self, name: &str, line: usize) -> Result<Word, StackError> {
    let atom = DefaultAtom::from(name);

    match self.index.get(&atom).copied() {

      Some(position) => {
        let label = self.labels.get_mut(position)?;
        label.first_reference.get_or_insert(line);
        Ok(label.address)
      }

      None => {
        self.append(Label {
          name            : atom,
          address         : UNRESOLVED_ADDRESS,
          first_reference : Some(line)
        })?;
        Ok(UNRESOLVED_ADDRESS)
      }

    }
  }

  /// The first label, in table order, that is referenced but still undefined.
  pub fn first_unresolved(&self) -> Option<&Label> {
    self.labels.iter().find(|label| !label.is_resolved())
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Label> {
    self.labels.iter()
  }

  /// Exports the resolved labels. The working table itself is dropped.
  pub fn into_symbols(self) -> SymbolTable {
    let mut symbols = SymbolTable::new();
    for label in self.labels.into_vec() {
      if !label.is_resolved() {
        continue;
      }
      if let Err((name, address)) = symbols.insert(label.name, label.address) {
        tracing::warn!(
          label = &*name,
          address,
          "label aliases an address that already has a name"
        );
      }
    }
    symbols
  }

  fn append(&mut self, label: Label) -> Result<(), StackError> {
    self.index.insert(label.name.clone(), self.labels.len());
    self.labels.push(label)
  }
}

impl Display for LabelTable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();
    table.set_titles(row![ubr->"Address", ubl->"Label"]);
    for label in self.labels.iter() {
      let address = match label.is_resolved() {
        true  => format!("{:#06x}", label.address),
        false => "unresolved".to_string()
      };
      table.add_row(row![r->address, label.name]);
    }
    write!(f, "{}", table)
  }
}

/**
  A symbol table is a mapping between label names and the addresses they resolved to. It is a
  by-product of assembly used for listings; it never becomes part of the binary. A symbol
  table is really just a convenience wrapper around a BiMap, so when several labels name the
  same address only the first is kept.
*/
#[derive(Clone, Debug)]
pub struct SymbolTable {
  table: BiMap<DefaultAtom, Word>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable {
      table: BiMap::new()
    }
  }

  pub fn get_symbol(&self, address: Word) -> Option<&DefaultAtom> {
    self.table.get_by_right(&address)
  }

  pub fn get_address(&self, name: &str) -> Option<Word> {
    self.table.get_by_left(&DefaultAtom::from(name)).copied()
  }

  pub fn insert(&mut self, name: DefaultAtom, address: Word)
    -> Result<(), (DefaultAtom, Word)>
  {
    self.table.insert_no_overwrite(name, address)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&DefaultAtom, &Word)> + '_ {
    self.table.iter()
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    SymbolTable::new()
  }
}
