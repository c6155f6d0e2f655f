//! Byte and string copies living in pool memory.
//!
//! Returned pointers follow the pool's lifetime rules: valid until the pool
//! is cleared or destroyed.

use core::fmt;
use core::ptr::NonNull;

use super::PoolRef;
use crate::error::{MemoryError, MemoryResult};

impl PoolRef {
    /// Copies `bytes` into the pool.
    pub fn pmemdup(&self, bytes: &[u8]) -> MemoryResult<NonNull<[u8]>> {
        let dst = self.palloc(bytes.len())?;
        // SAFETY: `dst` has room for `bytes.len()` bytes and, being fresh pool
        // memory, cannot overlap `bytes`.
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len()) };
        Ok(NonNull::slice_from_raw_parts(dst, bytes.len()))
    }

    /// Copies `s` into the pool.
    pub fn pstrdup(&self, s: &str) -> MemoryResult<NonNull<str>> {
        self.pmemdup(s.as_bytes()).map(as_str)
    }

    /// Copies at most `n` bytes of `s`, shortened to a char boundary.
    pub fn pstrndup(&self, s: &str, n: usize) -> MemoryResult<NonNull<str>> {
        let mut end = n.min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.pstrdup(&s[..end])
    }

    /// Concatenates `parts` into one pool string with a single allocation.
    pub fn pstrcat(&self, parts: &[&str]) -> MemoryResult<NonNull<str>> {
        let len = parts
            .iter()
            .try_fold(0_usize, |acc, part| acc.checked_add(part.len()))
            .ok_or_else(|| MemoryError::size_overflow("pstrcat"))?;
        let dst = self.palloc(len)?;
        let mut offset = 0;
        for part in parts {
            // SAFETY: the parts sum to `len`, so every copy stays inside `dst`.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    part.as_ptr(),
                    dst.as_ptr().add(offset),
                    part.len(),
                );
            }
            offset += part.len();
        }
        Ok(as_str(NonNull::slice_from_raw_parts(dst, len)))
    }

    /// Formats `args` into the pool.
    ///
    /// ```
    /// use regio_memory::pool::Pool;
    ///
    /// let pool = Pool::new()?;
    /// let s = pool.psprintf(format_args!("{}-{}", "conn", 7))?;
    /// // SAFETY: `pool` is alive and was not cleared.
    /// assert_eq!(unsafe { s.as_ref() }, "conn-7");
    /// # Ok::<(), regio_memory::MemoryError>(())
    /// ```
    pub fn psprintf(&self, args: fmt::Arguments<'_>) -> MemoryResult<NonNull<str>> {
        match args.as_str() {
            Some(literal) => self.pstrdup(literal),
            None => self.pstrdup(&std::fmt::format(args)),
        }
    }
}

fn as_str(bytes: NonNull<[u8]>) -> NonNull<str> {
    // SAFETY: every caller copies from valid UTF-8 (a `&str` or a concatenation
    // of whole `&str`s), so the bytes are UTF-8 and the cast keeps the length.
    unsafe { NonNull::new_unchecked(bytes.as_ptr() as *mut str) }
}
