use super::RecordList;
use crate::core::Result;
use crate::storage::IdentityStore;
use std::ops::{Deref, DerefMut};
use tracing::debug;

impl RecordList {
    pub fn list_loading_suppressed(&self) -> bool {
        self.suspension.suppressed
    }

    /// Arms or releases suppression. Releasing clears any nesting from
    /// `begin_bulk` and performs exactly one reload if any were requested
    /// in between.
    pub fn set_list_loading_suppressed<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        suppressed: bool,
    ) -> Result<()> {
        if suppressed {
            self.suspension.suppressed = true;
            return Ok(());
        }
        self.suspension.depth = 0;
        self.release(store)
    }

    /// Enters a (possibly nested) bulk edit
    pub fn begin_bulk(&mut self) {
        self.suspension.depth += 1;
        self.suspension.suppressed = true;
    }

    /// Leaves a bulk edit; the outermost exit releases suppression
    pub fn end_bulk<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.suspension.depth = self.suspension.depth.saturating_sub(1);
        if self.suspension.depth > 0 {
            return Ok(());
        }
        self.release(store)
    }

    /// Runs `edit` with loading suppressed, then releases it even if
    /// `edit` failed. The edit's error takes precedence.
    pub fn bulk_update<S, T, F>(&mut self, store: &mut S, edit: F) -> Result<T>
    where
        S: IdentityStore + ?Sized,
        F: FnOnce(&mut S, &mut RecordList) -> Result<T>,
    {
        self.begin_bulk();
        let outcome = edit(store, self);
        let released = self.end_bulk(&*store);
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Suppresses loading until the guard is finished or dropped.
    ///
    /// `finish` reloads right away. Dropping the guard instead leaves the
    /// coalesced reload pending for the next `flush_pending`.
    pub fn bulk_edit(&mut self) -> BulkEditGuard<'_> {
        self.begin_bulk();
        BulkEditGuard {
            list: self,
            finished: false,
        }
    }

    pub(super) fn request_deferred_reload(&mut self) {
        if self.suspension.reload_requested {
            self.stats.coalesced_requests += 1;
        } else {
            debug!(scope = %self.scope, "loading suppressed; reload deferred");
            self.suspension.reload_requested = true;
        }
    }

    fn release<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.suspension.suppressed = false;
        if !std::mem::take(&mut self.suspension.reload_requested) {
            return Ok(());
        }
        debug!(scope = %self.scope, coalesced = self.stats.coalesced_requests, "suppression released");
        self.reload(store)
    }
}

/// Scoped bulk edit over one list
pub struct BulkEditGuard<'a> {
    list: &'a mut RecordList,
    finished: bool,
}

impl BulkEditGuard<'_> {
    pub fn finish<S: IdentityStore + ?Sized>(mut self, store: &S) -> Result<()> {
        self.finished = true;
        self.list.end_bulk(store)
    }
}

impl Deref for BulkEditGuard<'_> {
    type Target = RecordList;

    fn deref(&self) -> &RecordList {
        self.list
    }
}

impl DerefMut for BulkEditGuard<'_> {
    fn deref_mut(&mut self) -> &mut RecordList {
        self.list
    }
}

impl Drop for BulkEditGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let suspension = &mut self.list.suspension;
        suspension.depth = suspension.depth.saturating_sub(1);
        if suspension.depth == 0 {
            suspension.suppressed = false;
            if std::mem::take(&mut suspension.reload_requested) {
                self.list.pending_reload = true;
            }
        }
    }
}
