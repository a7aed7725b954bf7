//! Guest linear memory access
//!
//! The runtime only ever touches guest memory through `LinearMemory`: reads
//! hand back copies (the backing buffer can move when the guest grows its
//! memory), writes are bounds-checked, and allocation goes through the
//! guest's own exported allocator.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::{
    codec::{Header, Value, HEADER_LEN},
    error::{MemoryError, RuntimeError},
};
use std::convert::TryFrom;

/// A guest pointer.  Zero is reserved and never a valid allocation.
pub type Pointer = i32;

/// The null guest pointer, meaning "no value".
pub const NULL_POINTER: Pointer = 0;

////////////////////////////////////////////////////////////////////////////////
// The accessor interface.
////////////////////////////////////////////////////////////////////////////////

pub trait LinearMemory {
    /// Current size of the linear memory in bytes.
    fn memory_size(&mut self) -> Result<usize, MemoryError>;

    /// Copies `size` bytes out of memory starting at `ptr`.
    fn read(&mut self, ptr: Pointer, size: i32) -> Result<Vec<u8>, MemoryError>;

    /// Overwrites memory starting at `ptr` with `bytes`.
    fn write(&mut self, ptr: Pointer, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Reserves `size` bytes through the guest allocator.  A null pointer from
    /// the allocator is an allocation failure.
    fn allocate(&mut self, size: i32) -> Result<Pointer, MemoryError>;
}

/// Checks that `[ptr, ptr + size)` lies within `memory_size` bytes and returns
/// the span as a `usize` range start.
pub fn check_bounds(ptr: i64, size: i64, memory_size: usize) -> Result<usize, MemoryError> {
    let out_of_bounds = MemoryError::OutOfBounds {
        ptr,
        size,
        memory_size,
    };
    if ptr < 0 || size < 0 {
        return Err(out_of_bounds);
    }
    match ptr.checked_add(size) {
        Some(end) if end as u64 <= memory_size as u64 => Ok(ptr as usize),
        _ => Err(out_of_bounds),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Typed values in memory.
////////////////////////////////////////////////////////////////////////////////

/// Reads the value header at `ptr`.
pub fn read_header(memory: &mut dyn LinearMemory, ptr: Pointer) -> Result<Header, RuntimeError> {
    let bytes = memory.read(ptr, HEADER_LEN as i32)?;
    Ok(Header::decode(&bytes)?)
}

/// Reads the whole typed value at `ptr`, returning it with its body length.
pub fn read_value(
    memory: &mut dyn LinearMemory,
    ptr: Pointer,
) -> Result<(Value, usize), RuntimeError> {
    let header = read_header(memory, ptr)?;
    let total = i32::try_from(header.total_len()).map_err(|_| MemoryError::OutOfBounds {
        ptr: ptr as i64,
        size: header.total_len() as i64,
        memory_size: memory.memory_size().unwrap_or(0),
    })?;
    let bytes = memory.read(ptr, total)?;
    Ok((Value::decode(&bytes)?, header.length as usize))
}

/// Encodes `value` into freshly allocated guest memory and returns its
/// pointer.
pub fn write_value(memory: &mut dyn LinearMemory, value: &Value) -> Result<Pointer, RuntimeError> {
    let bytes = value.encode();
    let size = i32::try_from(bytes.len()).map_err(|_| MemoryError::AllocationFailed(i32::MAX))?;
    let ptr = memory.allocate(size)?;
    memory.write(ptr, &bytes)?;
    Ok(ptr)
}

////////////////////////////////////////////////////////////////////////////////
// A buffer-backed memory for exercising the ABI without an engine.
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A flat buffer with a bump allocator starting past the null page.
    pub(crate) struct BufferMemory {
        pub(crate) data: Vec<u8>,
        next: usize,
    }

    impl BufferMemory {
        pub(crate) fn new(size: usize) -> Self {
            Self {
                data: vec![0; size],
                next: 16,
            }
        }
    }

    impl LinearMemory for BufferMemory {
        fn memory_size(&mut self) -> Result<usize, MemoryError> {
            Ok(self.data.len())
        }

        fn read(&mut self, ptr: Pointer, size: i32) -> Result<Vec<u8>, MemoryError> {
            let start = check_bounds(ptr as i64, size as i64, self.data.len())?;
            Ok(self.data[start..start + size as usize].to_vec())
        }

        fn write(&mut self, ptr: Pointer, bytes: &[u8]) -> Result<(), MemoryError> {
            let start = check_bounds(ptr as i64, bytes.len() as i64, self.data.len())?;
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn allocate(&mut self, size: i32) -> Result<Pointer, MemoryError> {
            let ptr = self.next;
            if size < 0 || ptr + size as usize > self.data.len() {
                return Err(MemoryError::AllocationFailed(size));
            }
            self.next += size as usize;
            Ok(ptr as Pointer)
        }
    }
}
