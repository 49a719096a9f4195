/*!
  A contiguous, bounds-checked stack with an explicit growth policy. The CPU uses one instance of
  bytes as its addressable data memory and one of words as its call stack; the assembler uses it
  for its label table and output instruction sequence.

  Capacity is tracked separately from the backing `Vec`, which may over-allocate. When a push
  finds the stack full, capacity grows by a factor of 1.5. Capacity never shrinks.
*/

use crate::bytecode::{Word, WORD_SIZE};
use crate::error::StackError;

#[derive(Clone, Debug)]
pub struct GrowableStack<T> {
  buffer   : Vec<T>,
  capacity : usize,
}

impl<T> GrowableStack<T> {

  /// Allocates room for `initial_capacity` elements. The stack starts empty.
  pub fn new(initial_capacity: usize) -> Result<Self, StackError> {
    let mut buffer = Vec::new();
    buffer
      .try_reserve_exact(initial_capacity)
      .map_err(|_| StackError::Allocation { requested: initial_capacity })?;

    Ok(GrowableStack {
      buffer,
      capacity: initial_capacity
    })
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Appends `element`, growing the buffer by half its capacity first if it is full.
  pub fn push(&mut self, element: T) -> Result<(), StackError> {
    self.reserve(1)?;
    self.buffer.push(element);
    Ok(())
  }

  /// Removes and returns the most recently pushed element.
  pub fn pop(&mut self) -> Result<T, StackError> {
    self.buffer.pop().ok_or(StackError::Empty)
  }

  /// The most recently pushed element, if any.
  pub fn top(&self) -> Option<&T> {
    self.buffer.last()
  }

  /// Borrows the element at `index`. The view must not outlive the next mutation, which the
  /// borrow checker enforces for us.
  pub fn get(&self, index: usize) -> Result<&T, StackError> {
    let count = self.buffer.len();
    self.buffer
        .get(index)
        .ok_or(StackError::IndexOutOfRange { index, end: index.saturating_add(1), count })
  }

  pub fn get_mut(&mut self, index: usize) -> Result<&mut T, StackError> {
    let count = self.buffer.len();
    self.buffer
        .get_mut(index)
        .ok_or(StackError::IndexOutOfRange { index, end: index.saturating_add(1), count })
  }

  /// Borrows `len` consecutive elements starting at `index`.
  pub fn get_slice(&self, index: usize, len: usize) -> Result<&[T], StackError> {
    let end = self.checked_range(index, len)?;
    Ok(&self.buffer[index..end])
  }

  /// Overwrites the element at `index` in place.
  pub fn modify(&mut self, index: usize, element: T) -> Result<(), StackError> {
    *self.get_mut(index)? = element;
    Ok(())
  }

  pub fn as_slice(&self) -> &[T] {
    &self.buffer
  }

  pub fn iter(&self) -> std::slice::Iter<'_, T> {
    self.buffer.iter()
  }

  /// Consumes the stack, yielding its elements in push order.
  pub fn into_vec(self) -> Vec<T> {
    self.buffer
  }

  fn checked_range(&self, index: usize, len: usize) -> Result<usize, StackError> {
    let count = self.buffer.len();
    match index.checked_add(len) {
      Some(end) if end <= count => Ok(end),
      _ => Err(StackError::IndexOutOfRange { index, end: index.saturating_add(len), count })
    }
  }

  /// Grows until `additional` more elements fit. Either all the room is made or the stack is
  /// left with its current contents.
  fn reserve(&mut self, additional: usize) -> Result<(), StackError> {
    let needed =
      self.buffer
          .len()
          .checked_add(additional)
          .ok_or(StackError::Allocation { requested: usize::MAX })?;
    while self.capacity < needed {
      self.grow()?;
    }
    Ok(())
  }

  fn grow(&mut self) -> Result<(), StackError> {
    // 1.5x, but always by at least one element so that tiny stacks make progress.
    let requested = std::cmp::max(self.capacity + self.capacity / 2, self.capacity + 1);
    self.buffer
        .try_reserve_exact(requested - self.buffer.len())
        .map_err(|_| StackError::Allocation { requested })?;
    self.capacity = requested;
    Ok(())
  }
}

impl<T: Copy> GrowableStack<T> {

  /// Pushes every element of `elements`, in order. Nothing is pushed unless all of them fit.
  pub fn push_slice(&mut self, elements: &[T]) -> Result<(), StackError> {
    self.reserve(elements.len())?;
    self.buffer.extend_from_slice(elements);
    Ok(())
  }

  /// Overwrites `elements.len()` consecutive elements starting at `index`. Nothing is written
  /// unless the whole range is in bounds.
  pub fn modify_slice(&mut self, index: usize, elements: &[T]) -> Result<(), StackError> {
    let end = self.checked_range(index, elements.len())?;
    self.buffer[index..end].copy_from_slice(elements);
    Ok(())
  }
}

// region Word access for byte stacks

/// Byte stacks double as little-endian word-addressable memory.
impl GrowableStack<u8> {

  /// Reads the word stored at byte offset `index`.
  pub fn read_word(&self, index: usize) -> Result<Word, StackError> {
    let bytes = self.get_slice(index, WORD_SIZE)?;
    let mut word = [0u8; WORD_SIZE];
    word.copy_from_slice(bytes);
    Ok(Word::from_le_bytes(word))
  }

  /// Writes `value` at byte offset `index`. The stack never grows on a write.
  pub fn write_word(&mut self, index: usize, value: Word) -> Result<(), StackError> {
    self.modify_slice(index, &value.to_le_bytes())
  }

  pub fn push_word(&mut self, value: Word) -> Result<(), StackError> {
    self.push_slice(&value.to_le_bytes())
  }

  /// Pops the most recently pushed word. Fails without popping anything if fewer than
  /// `WORD_SIZE` bytes are on the stack.
  pub fn pop_word(&mut self) -> Result<Word, StackError> {
    if self.len() < WORD_SIZE {
      return Err(StackError::Empty);
    }
    let value = self.read_word(self.len() - WORD_SIZE)?;
    self.buffer.truncate(self.len() - WORD_SIZE);
    Ok(value)
  }
}

// endregion


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pushes_then_pops_restore_count(){
    let mut stack: GrowableStack<u32> = GrowableStack::new(2).unwrap();
    stack.push(7).unwrap();
    let before = stack.len();

    for i in 0..100 {
      stack.push(i).unwrap();
    }
    for i in (0..100).rev() {
      assert_eq!(stack.pop(), Ok(i));
    }

    assert_eq!(stack.len(), before);
    assert_eq!(stack.pop(), Ok(7));
    assert_eq!(stack.pop(), Err(StackError::Empty));
  }

  #[test]
  fn capacity_grows_by_half_and_never_shrinks(){
    let mut stack: GrowableStack<u8> = GrowableStack::new(4).unwrap();
    for i in 0..4 {
      stack.push(i).unwrap();
    }
    assert_eq!(stack.capacity(), 4);

    stack.push(4).unwrap();
    assert_eq!(stack.capacity(), 6);

    stack.push(5).unwrap();
    stack.push(6).unwrap();
    assert_eq!(stack.capacity(), 9);

    while stack.pop().is_ok() {}
    assert_eq!(stack.capacity(), 9);
  }

  #[test]
  fn slices_reserve_room_before_copying(){
    let mut stack: GrowableStack<u8> = GrowableStack::new(4).unwrap();
    stack.push(0).unwrap();
    stack.push_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
    // 4 -> 6 -> 9 -> 13, all before the copy.
    assert_eq!(stack.capacity(), 13);
    assert_eq!(stack.len(), 10);
    assert_eq!(stack.top(), Some(&9));
  }

  #[test]
  fn zero_capacity_still_grows(){
    let mut stack: GrowableStack<u8> = GrowableStack::new(0).unwrap();
    stack.push(1).unwrap();
    stack.push(2).unwrap();
    assert_eq!(stack.as_slice(), &[1, 2]);
    assert!(stack.capacity() >= stack.len());
  }

  #[test]
  fn get_and_modify_are_bounds_checked(){
    let mut stack: GrowableStack<char> = GrowableStack::new(1).unwrap();
    stack.push('a').unwrap();
    stack.push('b').unwrap();

    assert_eq!(stack.get(1), Ok(&'b'));
    assert!(matches!(stack.get(2), Err(StackError::IndexOutOfRange { index: 2, .. })));

    stack.modify(0, 'z').unwrap();
    assert_eq!(stack.get(0), Ok(&'z'));
    assert!(stack.modify(5, 'q').is_err());
    assert_eq!(stack.len(), 2);
  }

  #[test]
  fn slices_must_fit_entirely(){
    let mut stack: GrowableStack<u8> = GrowableStack::new(8).unwrap();
    stack.push_slice(&[1, 2, 3]).unwrap();

    assert_eq!(stack.get_slice(1, 2), Ok(&[2u8, 3][..]));
    assert_eq!(
      stack.get_slice(2, 2),
      Err(StackError::IndexOutOfRange { index: 2, end: 4, count: 3 })
    );
    assert!(stack.get_slice(usize::MAX, 2).is_err());

    assert!(stack.modify_slice(2, &[9, 9]).is_err());
    assert_eq!(stack.as_slice(), &[1, 2, 3]);
  }

  #[test]
  fn words_are_little_endian(){
    let mut stack: GrowableStack<u8> = GrowableStack::new(1).unwrap();
    stack.push_word(0x1122_3344).unwrap();
    assert_eq!(stack.as_slice(), &[0x44, 0x33, 0x22, 0x11]);

    stack.write_word(0, 0xdead_beef).unwrap();
    assert_eq!(stack.read_word(0), Ok(0xdead_beef));
    assert!(stack.read_word(1).is_err());
  }

  #[test]
  fn pop_word_underflow_leaves_stack_intact(){
    let mut stack: GrowableStack<u8> = GrowableStack::new(4).unwrap();
    stack.push_word(5).unwrap();
    stack.push_slice(&[1, 2]).unwrap();

    // Pops the last four bytes, which straddle the word and the loose bytes.
    assert_eq!(stack.pop_word(), Ok(u32::from_le_bytes([0, 0, 1, 2])));
    assert_eq!(stack.len(), 2);
    assert_eq!(stack.pop_word(), Err(StackError::Empty));
    assert_eq!(stack.len(), 2);
  }
}
