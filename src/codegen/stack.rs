use super::CodegenError;
use crate::assembly::{Memory, Register};

/// Scratch area below the current frame, used as an operand stack while evaluating expressions.
///
/// `offset` is the next free slot relative to `mp`. Pushing hands out that slot and moves one
/// down; popping moves one up and hands the slot back. Expression code must leave the offset
/// where it found it.
#[derive(Debug)]
pub struct TemporaryAllocator {
    offset: i32,
    base: i32,
    capacity: usize,
}

impl TemporaryAllocator {
    pub const fn new(capacity: usize) -> Self {
        Self {
            offset: 0,
            base: 0,
            capacity,
        }
    }

    /// Start a frame whose first free slot is `base`
    pub fn enter_frame(&mut self, base: i32) {
        self.finalize();
        self.base = base;
        self.offset = base;
    }

    pub const fn offset(&self) -> i32 {
        self.offset
    }

    pub const fn in_use(&self) -> usize {
        (self.base - self.offset) as usize
    }

    pub fn push(&mut self) -> Result<Memory, CodegenError> {
        if self.in_use() >= self.capacity {
            return Err(CodegenError::TemporariesExhausted {
                capacity: self.capacity,
            });
        }
        let slot = Memory::new(Register::Mp, self.offset);
        self.offset -= 1;
        Ok(slot)
    }

    pub fn pop(&mut self) -> Memory {
        assert!(self.offset < self.base, "pop() without a pushed temporary");
        self.offset += 1;
        Memory::new(Register::Mp, self.offset)
    }

    pub fn finalize(&self) {
        assert_eq!(
            self.offset, self.base,
            "finalize() with {} temporaries still in use",
            self.in_use()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_returns_the_same_slot() -> anyhow::Result<()> {
        let mut temporaries = TemporaryAllocator::new(8);
        temporaries.enter_frame(-2);
        let first = temporaries.push()?;
        let second = temporaries.push()?;
        assert_eq!(first, Memory::new(Register::Mp, -2));
        assert_eq!(second, Memory::new(Register::Mp, -3));
        assert_eq!(temporaries.in_use(), 2);
        assert_eq!(temporaries.pop(), second);
        assert_eq!(temporaries.pop(), first);
        temporaries.finalize();
        Ok(())
    }

    #[test]
    fn capacity_is_enforced() {
        let mut temporaries = TemporaryAllocator::new(1);
        assert!(temporaries.push().is_ok());
        assert!(matches!(
            temporaries.push(),
            Err(CodegenError::TemporariesExhausted { capacity: 1 })
        ));
    }

    #[test]
    #[should_panic(expected = "still in use")]
    fn unbalanced_frame_is_caught() {
        let mut temporaries = TemporaryAllocator::new(4);
        temporaries.push().unwrap();
        temporaries.enter_frame(-1);
    }
}
