use std::{cell::RefCell, collections::TryReserveError, fmt, rc::Rc};

use super::Value;

/// The array cannot grow far enough to hold the requested index.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("array cannot grow to hold index {0}")]
pub struct GrowError(pub i64);

/// Growable, zero-filled array shared by reference.
///
/// Cloning copies the reference, never the contents: every binding that
/// received the array (assignment, parameter passing) observes writes made
/// through any other binding.
#[derive(Clone, Default)]
pub struct ValueArray {
    inner: Rc<RefCell<Vec<Value>>>,
}

impl ValueArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(values: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(values)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &ValueArray) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Element at `index`; negative or past-the-end reads yield `None`.
    pub fn get(&self, index: i64) -> Option<Value> {
        let index = usize::try_from(index).ok()?;
        self.inner.borrow().get(index).cloned()
    }

    /// Store `value` at `index`, growing to `index + 1` with zero fill.
    ///
    /// A negative index leaves the array untouched and returns `Ok(false)`.
    /// Growth the allocator refuses is a [`GrowError`], also without mutation.
    pub fn set(&self, index: i64, value: Value) -> Result<bool, GrowError> {
        let Ok(slot) = usize::try_from(index) else {
            return Ok(false);
        };
        let mut values = self.inner.borrow_mut();
        if slot >= values.len() {
            let len = slot.checked_add(1).ok_or(GrowError(index))?;
            zero_fill(&mut values, len).map_err(|_| GrowError(index))?;
        }
        values[slot] = value;
        Ok(true)
    }

    pub fn push(&self, value: Value) {
        self.inner.borrow_mut().push(value);
    }

    pub fn insert(&self, index: i64, value: Value) -> Result<bool, GrowError> {
        let Ok(slot) = usize::try_from(index) else {
            return Ok(false);
        };
        let mut values = self.inner.borrow_mut();
        let len = values.len().max(slot).checked_add(1).ok_or(GrowError(index))?;
        let cur = values.len();
        values.try_reserve(len - cur).map_err(|_| GrowError(index))?;
        if slot > values.len() {
            values.resize(slot, Value::Int(0));
        }
        values.insert(slot, value);
        Ok(true)
    }

    pub fn remove(&self, index: i64) -> Option<Value> {
        let index = usize::try_from(index).ok()?;
        let mut values = self.inner.borrow_mut();
        (index < values.len()).then(|| values.remove(index))
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.borrow().clone()
    }
}

fn zero_fill(values: &mut Vec<Value>, len: usize) -> Result<(), TryReserveError> {
    values.try_reserve(len - values.len())?;
    values.resize(len, Value::Int(0));
    Ok(())
}

impl fmt::Debug for ValueArray {
    // Arrays may contain themselves; print shape only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueArray")
            .field("len", &self.len())
            .field("refs", &Rc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_past_end_zero_fills() {
        let a = ValueArray::new();
        assert_eq!(a.set(9, Value::Int(7)), Ok(true));
        assert_eq!(a.len(), 10);
        for i in 0..9 {
            assert_eq!(a.get(i), Some(Value::Int(0)));
        }
        assert_eq!(a.get(9), Some(Value::Int(7)));
    }

    #[test]
    fn growth_preserves_existing() {
        let a = ValueArray::from_vec(vec![Value::text("x"), Value::Float(1.5)]);
        a.set(4, Value::Int(1)).unwrap();
        assert_eq!(
            a.to_vec(),
            vec![Value::text("x"), Value::Float(1.5), Value::Int(0), Value::Int(0), Value::Int(1)]
        );
    }

    #[test]
    fn negative_index_is_rejected_without_mutation() {
        let a = ValueArray::from_vec(vec![Value::Int(1)]);
        assert_eq!(a.set(-1, Value::Int(5)), Ok(false));
        assert_eq!(a.get(-1), None);
        assert_eq!(a.to_vec(), vec![Value::Int(1)]);
    }

    #[test]
    fn clones_alias() {
        let a = ValueArray::new();
        let b = a.clone();
        b.set(2, Value::Int(3)).unwrap();
        assert_eq!(a.len(), 3);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn insert_and_remove() {
        let a = ValueArray::from_vec(vec![Value::Int(1), Value::Int(3)]);
        a.insert(1, Value::Int(2)).unwrap();
        assert_eq!(a.to_vec(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(a.remove(0), Some(Value::Int(1)));
        assert_eq!(a.remove(5), None);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn unreachable_length_is_refused_without_mutation() {
        let a = ValueArray::from_vec(vec![Value::Int(1)]);
        assert_eq!(a.set(i64::MAX, Value::Int(2)), Err(GrowError(i64::MAX)));
        assert_eq!(a.insert(i64::MAX, Value::Int(2)), Err(GrowError(i64::MAX)));
        assert_eq!(a.set(1 << 60, Value::Int(2)), Err(GrowError(1 << 60)));
        assert_eq!(a.to_vec(), vec![Value::Int(1)]);
    }
}
