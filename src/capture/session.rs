//! Target lifecycle management
//!
//! Keeps the recorder listening on every live page-type target for the
//! duration of a capture. Targets can appear and disappear mid-capture; the
//! session attaches a listener to each as it comes and tears it down as it
//! goes. The browser is told to pause newly created targets until attach
//! (auto-attach), closing the race where a new tab's first requests fire
//! before anyone listens.

use crate::capture::recorder::NetworkRecorder;
use crate::error::{Error, Result, SessionError};
use crate::har::{Creator, Entry, Har, Page as HarPage};
use chromiumoxide::cdp::browser_protocol::network::EnableParams;
use chromiumoxide::cdp::browser_protocol::target::{
    EventTargetCreated, EventTargetDestroyed, SetAutoAttachParams, TargetId, TargetInfo,
};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Target-id keyed table of per-target listener cancellation handles.
///
/// Attach and detach are idempotent: a duplicate insert aborts the newcomer
/// and a miss on remove is a no-op.
#[derive(Default)]
pub(crate) struct TargetTable {
    inner: Mutex<HashMap<TargetId, JoinHandle<()>>>,
}

impl TargetTable {
    pub(crate) fn contains(&self, id: &TargetId) -> bool {
        self.inner.lock().contains_key(id)
    }

    /// Record a listener handle for a target. If the target is already
    /// attached the handle is aborted and `false` returned.
    pub(crate) fn try_insert(&self, id: TargetId, handle: JoinHandle<()>) -> bool {
        match self.inner.lock().entry(id) {
            MapEntry::Occupied(_) => {
                handle.abort();
                false
            }
            MapEntry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Cancel and forget a target's listener. Unknown ids are a no-op.
    pub(crate) fn remove(&self, id: &TargetId) -> bool {
        match self.inner.lock().remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every listener and empty the table.
    pub(crate) fn clear(&self) {
        for (_, handle) in self.inner.lock().drain() {
            handle.abort();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

enum TargetLifecycle {
    Created(TargetInfo),
    Destroyed(TargetId),
}

struct SessionInner {
    browser: Arc<Browser>,
    recorder: Arc<NetworkRecorder>,
    targets: TargetTable,
}

impl SessionInner {
    /// Attach the recorder to a target by id.
    async fn attach(&self, target_id: TargetId) {
        if self.targets.contains(&target_id) {
            return;
        }
        let page = match self.browser.get_page(target_id.clone()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(target_id = %target_id.inner(), error = %e, "target resolve failed");
                return;
            }
        };
        self.attach_page(target_id, page).await;
    }

    /// Attach the recorder to a target whose page handle is already in hand.
    ///
    /// Listener registration happens before network tracking is enabled so no
    /// event can slip through between the two. If enabling fails the
    /// half-attached listener is torn down and the target stays unattached;
    /// the session carries on.
    async fn attach_page(&self, target_id: TargetId, page: Page) {
        if self.targets.contains(&target_id) {
            return;
        }

        let handle = match self
            .recorder
            .listen(page.clone(), target_id.inner().clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(target_id = %target_id.inner(), error = %e, "listener attach failed");
                return;
            }
        };

        if let Err(e) = page.execute(EnableParams::default()).await {
            let err = SessionError::NetworkEnable {
                target_id: target_id.inner().clone(),
                message: e.to_string(),
            };
            warn!(error = %err, "target skipped");
            handle.abort();
            return;
        }

        if self.targets.try_insert(target_id.clone(), handle) {
            debug!(target_id = %target_id.inner(), "target attached");
        }
    }

    fn detach(&self, target_id: &TargetId) {
        if self.targets.remove(target_id) {
            debug!(target_id = %target_id.inner(), "target detached");
        }
    }
}

/// A capture session over one browser connection.
///
/// Discovers page targets, wires the shared [`NetworkRecorder`] to each, and
/// follows target creation/destruction for as long as the session runs.
pub struct Session {
    inner: Arc<SessionInner>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session over an established browser connection.
    pub fn new(browser: Arc<Browser>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                browser,
                recorder: Arc::new(NetworkRecorder::new()),
                targets: TargetTable::default(),
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Start capturing.
    ///
    /// Sets the auto-attach directive (fatal on failure), attaches to every
    /// existing page target, and spawns the lifecycle watcher that attaches
    /// new page targets and detaches destroyed ones. Individual targets
    /// failing to attach are logged and skipped.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let auto_attach = SetAutoAttachParams::builder()
            .auto_attach(true)
            .wait_for_debugger_on_start(true)
            .flatten(true)
            .build()
            .map_err(SessionError::AutoAttach)?;
        self.inner
            .browser
            .execute(auto_attach)
            .await
            .map_err(|e| SessionError::AutoAttach(e.to_string()))?;

        let pages = self
            .inner
            .browser
            .pages()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        for page in pages {
            let target_id = page.target_id().clone();
            self.inner.attach_page(target_id, page).await;
        }

        let created = self
            .inner
            .browser
            .event_listener::<EventTargetCreated>()
            .await
            .map_err(|e| SessionError::TargetEvents(e.to_string()))?;
        let destroyed = self
            .inner
            .browser
            .event_listener::<EventTargetDestroyed>()
            .await
            .map_err(|e| SessionError::TargetEvents(e.to_string()))?;

        let inner = Arc::clone(&self.inner);
        let watcher = tokio::spawn(async move {
            let mut events = futures::stream::select_all(vec![
                created
                    .map(|ev| TargetLifecycle::Created(ev.target_info.clone()))
                    .boxed(),
                destroyed
                    .map(|ev| TargetLifecycle::Destroyed(ev.target_id.clone()))
                    .boxed(),
            ]);
            while let Some(event) = events.next().await {
                match event {
                    TargetLifecycle::Created(info) if info.r#type == "page" => {
                        let inner = Arc::clone(&inner);
                        tokio::spawn(async move {
                            inner.attach(info.target_id).await;
                        });
                    }
                    TargetLifecycle::Created(_) => {}
                    TargetLifecycle::Destroyed(target_id) => inner.detach(&target_id),
                }
            }
            debug!("target lifecycle stream closed");
        });
        *self.watcher.lock() = Some(watcher);

        Ok(())
    }

    /// Attach the recorder to a target by id. Already-attached ids are a
    /// no-op; failures are logged, never fatal.
    pub async fn attach(&self, target_id: TargetId) {
        self.inner.attach(target_id).await;
    }

    /// Stop listening to a target. Unknown ids are a no-op.
    pub fn detach(&self, target_id: &TargetId) {
        self.inner.detach(target_id);
    }

    /// Number of currently attached targets
    pub fn attached_count(&self) -> usize {
        self.inner.targets.len()
    }

    /// The shared recorder
    pub fn recorder(&self) -> &Arc<NetworkRecorder> {
        &self.inner.recorder
    }

    /// The underlying browser connection
    pub fn browser(&self) -> &Arc<Browser> {
        &self.inner.browser
    }

    /// Snapshot of finalized entries captured so far
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.recorder.entries()
    }

    /// Snapshot of pages seen so far
    pub fn pages(&self) -> Vec<HarPage> {
        self.inner.recorder.pages()
    }

    /// Build the archive from everything captured so far.
    pub fn archive(&self) -> Har {
        self.inner.recorder.archive(Creator::this_crate())
    }

    /// Stop the lifecycle watcher and cancel every per-target listener.
    pub fn stop(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        self.inner.targets.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TargetId {
        TargetId::new(s)
    }

    #[tokio::test]
    async fn test_table_insert_and_remove() {
        let table = TargetTable::default();
        assert_eq!(table.len(), 0);

        assert!(table.try_insert(id("t1"), tokio::spawn(async {})));
        assert!(table.contains(&id("t1")));
        assert_eq!(table.len(), 1);

        assert!(table.remove(&id("t1")));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_attach_leaves_table_unchanged() {
        let table = TargetTable::default();
        assert!(table.try_insert(id("t1"), tokio::spawn(async {})));
        assert!(!table.try_insert(id("t1"), tokio::spawn(async {})));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_detach_unknown_target_is_noop() {
        let table = TargetTable::default();
        table.try_insert(id("t1"), tokio::spawn(async {}));

        assert!(!table.remove(&id("ghost")));
        assert_eq!(table.len(), 1);

        // Second detach of a removed id is also a no-op
        assert!(table.remove(&id("t1")));
        assert!(!table.remove(&id("t1")));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_clear_cancels_everything() {
        let table = TargetTable::default();
        table.try_insert(id("t1"), tokio::spawn(async {}));
        table.try_insert(id("t2"), tokio::spawn(async {}));
        table.clear();
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_lost_attach_race_keeps_first_listener() {
        let table = TargetTable::default();
        assert!(table.try_insert(id("t1"), tokio::spawn(async {})));

        let loser = tokio::spawn(async {
            std::future::pending::<()>().await;
        });
        assert!(!table.try_insert(id("t1"), loser));
        assert_eq!(table.len(), 1);
        assert!(table.contains(&id("t1")));
    }
}
