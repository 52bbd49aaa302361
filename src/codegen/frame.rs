//! Frame layout used by calls, and the name stacks that map frame-relative names to slots.
//!
//! ```text
//!   F+2+k   parameter k         (pushed by the caller, last argument highest)
//!   F+1     caller's mp
//!   F+0     return address      <- mp
//!   F-1-j   local slot j
//!   F-1-L   first temporary
//! ```
use super::CodegenError;

pub const RETURN_ADDRESS: i32 = 0;
pub const SAVED_FRAME: i32 = 1;
pub const FIRST_PARAMETER: i32 = 2;

/// Growable stack of names with a hard capacity. Lookups only see the frame opened last and
/// count from its top.
#[derive(Debug)]
pub struct NameStack {
    kind: &'static str,
    entries: Vec<Option<String>>,
    frame_start: usize,
    capacity: usize,
}

impl NameStack {
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            frame_start: 0,
            capacity,
        }
    }

    /// Open a frame; the returned mark closes it again
    pub fn enter(&mut self) -> usize {
        let previous = self.frame_start;
        self.frame_start = self.entries.len();
        previous
    }

    pub fn leave(&mut self, previous: usize) {
        self.entries.truncate(self.frame_start);
        self.frame_start = previous;
    }

    /// Push a named entry, or an anonymous one (`None`) that only takes up a slot
    pub fn push(&mut self, name: Option<&str>) -> Result<(), CodegenError> {
        if self.entries.len() >= self.capacity {
            return Err(CodegenError::NameStackExhausted {
                stack: self.kind,
                capacity: self.capacity,
            });
        }
        self.entries.push(name.map(str::to_string));
        Ok(())
    }

    /// Distance of the most recent entry called `name` from the top of the current frame
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.entries[self.frame_start..]
            .iter()
            .rev()
            .position(|entry| entry.as_deref() == Some(name))
    }

    /// Entries in the current frame
    pub fn frame_len(&self) -> usize {
        self.entries.len() - self.frame_start
    }
}
