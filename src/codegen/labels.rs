use super::EmitError;
use crate::assembly::Label;

/// Hands out labels for one instruction stream and remembers where each one was bound.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    bindings: Vec<Option<usize>>,
}

impl LabelGenerator {
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }
    pub fn new_label(&mut self) -> Label {
        let current = self.bindings.len();
        self.bindings.push(None);
        Label::new(current)
    }
    pub fn bind(&mut self, label: Label, position: usize) -> Result<(), EmitError> {
        match self.bindings.get_mut(label.index()) {
            Some(Some(previous)) => Err(EmitError::LabelRebound {
                label,
                previous: *previous,
            }),
            Some(binding) => {
                *binding = Some(position);
                Ok(())
            }
            None => Err(EmitError::ForeignLabel(label)),
        }
    }
    pub fn target(&self, label: Label) -> Option<usize> {
        self.bindings.get(label.index()).copied().flatten()
    }
}
