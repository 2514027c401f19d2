use super::{EmuError, ADDRESS_SPACE};

/// A byte-addressable store the CPU reads and writes through.
///
/// Addresses wrap modulo [`size`](Memory::size), so reads and writes never fail.
pub trait Memory {
    /// Number of bytes in the store.
    fn size(&self) -> usize;

    /// Reads the byte at `addr`.
    fn read(&self, addr: usize) -> u8;

    /// Writes `value` to `addr`.
    fn write(&mut self, addr: usize, value: u8);
}

impl<M: Memory + ?Sized> Memory for &mut M {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, addr: usize) -> u8 {
        (**self).read(addr)
    }

    fn write(&mut self, addr: usize, value: u8) {
        (**self).write(addr, value);
    }
}

/// Flat RAM.
#[derive(Debug, Clone)]
pub struct Ram {
    pub memory: Box<[u8]>,
}

impl Ram {
    /// Creates a new [`Ram`] instance covering the whole address space, initialized to zero.
    pub fn new() -> Self {
        Self {
            memory: vec![0u8; ADDRESS_SPACE].into_boxed_slice(),
        }
    }

    /// Creates a zeroed [`Ram`] of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EmuError::AddressOutOfRange`] if `size` is zero.
    pub fn with_size(size: usize) -> Result<Self, EmuError> {
        if size == 0 {
            return Err(EmuError::AddressOutOfRange { size });
        }
        Ok(Self {
            memory: vec![0u8; size].into_boxed_slice(),
        })
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for Ram {
    fn size(&self) -> usize {
        self.memory.len()
    }

    fn read(&self, addr: usize) -> u8 {
        self.memory[addr % self.memory.len()]
    }

    fn write(&mut self, addr: usize, value: u8) {
        let len = self.memory.len();
        self.memory[addr % len] = value;
    }
}
