use crate::num::{NumError, ScriptNum};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Stack error type.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum StackError {
    #[error("invalid stack operation")]
    InvalidOperation,
    #[error(transparent)]
    Num(#[from] NumError),
}

type Result<T> = std::result::Result<T, StackError>;

/// Main stack of the script interpreter.
pub type Stack = GenericStack<Vec<u8>>;

/// Stack of script elements.
///
/// Indices used by [`GenericStack::top`] and [`GenericStack::remove`] count
/// from the top, `0` being the most recently pushed element.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct GenericStack<T = Vec<u8>> {
    data: Vec<T>,
    require_minimal: bool,
}

impl<T> From<Vec<T>> for GenericStack<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            data,
            require_minimal: false,
        }
    }
}

impl<T> Deref for GenericStack<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T> DerefMut for GenericStack<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<T> GenericStack<T> {
    /// Creates a stack whose numeric reads enforce minimal encoding when
    /// `require_minimal` is set.
    pub fn new(data: Vec<T>, require_minimal: bool) -> Self {
        Self {
            data,
            require_minimal,
        }
    }

    /// Explicitly an empty stack, [].
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            require_minimal: false,
        }
    }

    pub fn set_require_minimal(&mut self, require_minimal: bool) {
        self.require_minimal = require_minimal;
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn require(&self, len: usize) -> Result<()> {
        if self.data.len() < len {
            return Err(StackError::InvalidOperation);
        }
        Ok(())
    }

    #[inline]
    pub fn last(&self) -> Result<&T> {
        self.data.last().ok_or(StackError::InvalidOperation)
    }

    #[inline]
    pub fn pop(&mut self) -> Result<T> {
        self.data.pop().ok_or(StackError::InvalidOperation)
    }

    #[inline]
    pub fn push(&mut self, value: T) -> &mut Self {
        self.data.push(value);
        self
    }

    /// Returns the `i`-th element from the top.
    #[inline]
    pub fn top(&self, i: usize) -> Result<&T> {
        self.require(i + 1)?;
        Ok(&self.data[self.data.len() - 1 - i])
    }

    /// Removes the `i`-th element from the top.
    #[inline]
    pub fn remove(&mut self, i: usize) -> Result<T> {
        self.require(i + 1)?;
        let index = self.data.len() - 1 - i;
        Ok(self.data.remove(index))
    }

    /// Removes the top `n` elements.
    #[inline]
    pub fn drop(&mut self, n: usize) -> Result<()> {
        self.require(n)?;
        let len = self.data.len();
        self.data.truncate(len - n);
        Ok(())
    }

    /// Copies the top `n` elements.
    ///
    /// dup(2): [x1 x2] -> [x1 x2 x1 x2]
    #[inline]
    pub fn dup(&mut self, n: usize) -> Result<()>
    where
        T: Clone,
    {
        self.require(n)?;
        let len = self.data.len();
        self.data.extend_from_within(len - n..);
        Ok(())
    }

    /// Copies the `n` elements sitting below the top `n` elements.
    ///
    /// over(2): [x1 x2 x3 x4] -> [x1 x2 x3 x4 x1 x2]
    #[inline]
    pub fn over(&mut self, n: usize) -> Result<()>
    where
        T: Clone,
    {
        self.require(2 * n)?;
        let start = self.data.len() - 2 * n;
        self.data.extend_from_within(start..start + n);
        Ok(())
    }

    /// Moves the group of `n` elements at depth `2n` to the top.
    ///
    /// rot(2): [x1 x2 x3 x4 x5 x6] -> [x3 x4 x5 x6 x1 x2]
    #[inline]
    pub fn rot(&mut self, n: usize) -> Result<()> {
        self.require(3 * n)?;
        let start = self.data.len() - 3 * n;
        self.data[start..].rotate_left(n);
        Ok(())
    }

    /// Exchanges the top two groups of `n` elements.
    ///
    /// swap(2): [x1 x2 x3 x4] -> [x3 x4 x1 x2]
    #[inline]
    pub fn swap(&mut self, n: usize) -> Result<()> {
        self.require(2 * n)?;
        let start = self.data.len() - 2 * n;
        self.data[start..].rotate_left(n);
        Ok(())
    }

    /// [x1 x2 x3] -> [x1 x3]
    #[inline]
    pub fn nip(&mut self) -> Result<()> {
        self.remove(1).map(|_| ())
    }

    /// [x1 x2] -> [x2 x1 x2]
    #[inline]
    pub fn tuck(&mut self) -> Result<()>
    where
        T: Clone,
    {
        self.require(2)?;
        let len = self.data.len();
        let top = self.data[len - 1].clone();
        self.data.insert(len - 2, top);
        Ok(())
    }
}

impl<T: AsRef<[u8]>> GenericStack<T> {
    /// Pops a 4-byte script number.
    #[inline]
    pub fn pop_num(&mut self) -> Result<ScriptNum> {
        let data = self.pop()?;
        Ok(ScriptNum::from_bytes(
            data.as_ref(),
            self.require_minimal,
            ScriptNum::MAX_NUM_SIZE,
        )?)
    }

    /// Reads the top element as a number of at most `max_size` bytes, leaving it in place.
    #[inline]
    pub fn peek_num(&self, max_size: usize) -> Result<ScriptNum> {
        let data = self.last()?;
        Ok(ScriptNum::from_bytes(
            data.as_ref(),
            self.require_minimal,
            max_size,
        )?)
    }

    #[inline]
    pub fn peek_bool(&self) -> Result<bool> {
        self.last().map(|v| cast_to_bool(v.as_ref()))
    }

    #[inline]
    pub fn pop_bool(&mut self) -> Result<bool> {
        self.pop().map(|v| cast_to_bool(v.as_ref()))
    }
}

impl Stack {
    #[inline]
    pub fn push_num(&mut self, num: impl Into<ScriptNum>) -> &mut Self {
        self.push(num.into().to_bytes())
    }

    #[inline]
    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push(if value { vec![1] } else { Vec::new() })
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if item.is_empty() {
                f.write_str("<>")?;
            } else {
                f.write_str(&hex::encode(item))?;
            }
        }
        f.write_str("]")
    }
}

/// Script truthiness: any non-zero byte other than a trailing sign bit.
pub fn cast_to_bool(data: &[u8]) -> bool {
    match data.split_last() {
        Some((&last, rest)) => rest.iter().any(|&x| x != 0) || (last != 0 && last != 0x80),
        None => false,
    }
}
