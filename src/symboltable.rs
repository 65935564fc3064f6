use std::collections::HashMap;

use string_cache::DefaultAtom;

use crate::address::Address;

/// The pseudo-label denoting the address the next emitted word will occupy.
pub const RESERVED_LABEL: &str = "HERE";

pub fn is_reserved(name: &str) -> bool {
  name.eq_ignore_ascii_case(RESERVED_LABEL)
}

/// Labels are compared without regard to case, so they are keyed by their upper case spelling.
fn key(name: &str) -> DefaultAtom {
  DefaultAtom::from(name.to_ascii_uppercase())
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Label {
  /// The name as first written in the source.
  pub name    : DefaultAtom,
  pub address : Address
}

/**
  A symbol table mapping label names to the address in program memory where they were defined.
  The first definition of a name wins; later definitions are refused.

  The reserved name `HERE` is never stored. Callers resolve it themselves, since its value is
  the emit position at the time of the lookup.
*/
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
  table: HashMap<DefaultAtom, Label>
}

impl LabelTable {

  pub fn new() -> LabelTable {
    LabelTable::default()
  }

  pub fn get_address(&self, name: &str) -> Option<Address> {
    self.table.get(&key(name)).map(|label| label.address)
  }

  /// Returns the labels defined at `address`, in name order.
  pub fn get_labels(&self, address: Address) -> Vec<&Label> {
    let mut labels: Vec<&Label> =
      self.table
          .values()
          .filter(|label| label.address == address)
          .collect();
    labels.sort_by(|a, b| a.name.cmp(&b.name));
    labels
  }

  /// Records a label. An existing definition is kept and returned as the error.
  pub fn insert(&mut self, name: &str, address: Address) -> Result<(), Label> {
    match self.table.get(&key(name)) {

      Some(existing) => Err(existing.clone()),

      None => {
        self.table.insert(
          key(name),
          Label{ name: DefaultAtom::from(name), address }
        );
        Ok(())
      }

    }
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}


/// A reference to a label whose address is written into `patch_address` once it is known.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ForwardPatch {
  pub name          : DefaultAtom,
  pub patch_address : Address,
  /// Source line of the reference, for diagnostics.
  pub line          : usize
}

/// Unresolved references in the order they were emitted.
#[derive(Clone, Debug, Default)]
pub struct ForwardPatches {
  patches: Vec<ForwardPatch>
}

impl ForwardPatches {

  pub fn new() -> ForwardPatches {
    ForwardPatches::default()
  }

  pub fn record(&mut self, name: &str, patch_address: Address, line: usize) {
    self.patches.push(
      ForwardPatch{ name: DefaultAtom::from(name), patch_address, line }
    );
  }

  pub fn len(&self) -> usize {
    self.patches.len()
  }

  pub fn is_empty(&self) -> bool {
    self.patches.is_empty()
  }

  /// Empties the list, yielding the patches in insertion order.
  pub fn drain(&mut self) -> std::vec::Drain<'_, ForwardPatch> {
    self.patches.drain(..)
  }
}
