use super::RecordClerk;
use crate::core::{ListError, ObjectId, Result};
use crate::storage::IdentityStore;

impl RecordClerk {
    pub fn can_move_first(&self) -> bool {
        !self.list.is_empty() && self.list.current_index() != Some(0)
    }

    pub fn can_move_previous(&self) -> bool {
        self.list.current_index().is_some_and(|index| index > 0)
    }

    pub fn can_move_next(&self) -> bool {
        self.list
            .current_index()
            .is_some_and(|index| index + 1 < self.list.len())
    }

    pub fn can_move_last(&self) -> bool {
        !self.list.is_empty() && self.list.current_index() != Some(self.list.len() - 1)
    }

    /// Returns `false` when there is nowhere to go
    pub fn first<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<bool> {
        if !self.can_move_first() {
            return Ok(false);
        }
        self.jump_to_index(store, 0)?;
        Ok(true)
    }

    pub fn previous<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<bool> {
        match self.list.current_index() {
            Some(index) if index > 0 => {
                self.jump_to_index(store, index - 1)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn next<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<bool> {
        match self.list.current_index() {
            Some(index) if index + 1 < self.list.len() => {
                self.jump_to_index(store, index + 1)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn last<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<bool> {
        if !self.can_move_last() {
            return Ok(false);
        }
        self.jump_to_index(store, self.list.len() - 1)?;
        Ok(true)
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn jump_to_index<S: IdentityStore + ?Sized>(&mut self, store: &S, index: usize) -> Result<()> {
        self.list.set_current_index(index);
        self.record_navigated(store, false, true)
    }

    pub fn jump_to_object<S: IdentityStore + ?Sized>(&mut self, store: &S, id: ObjectId) -> Result<usize> {
        let index = self.list.index_of(id).ok_or(ListError::ObjectNotInList(id))?;
        self.jump_to_index(store, index)?;
        Ok(index)
    }
}
