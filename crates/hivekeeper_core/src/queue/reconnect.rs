use super::{FlushReport, OfflineQueue, QueueResult};
use crate::gateway::RemoteGateway;
use log::debug;
use std::cell::Cell;

/// Flushes the offline queue when connectivity comes back.
///
/// The first observation counts as a transition when it reports online, so
/// items left over from a previous app run are replayed at startup.
#[derive(Debug, Default)]
pub struct ReconnectFlusher {
    last_online: Cell<Option<bool>>,
}

impl ReconnectFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connectivity observation; flushes on an offline→online edge.
    ///
    /// Returns `None` when no flush was attempted.
    pub fn on_connectivity_change<G: RemoteGateway + ?Sized>(
        &self,
        online: bool,
        queue: &OfflineQueue<'_>,
        gateway: &G,
    ) -> QueueResult<Option<FlushReport>> {
        let previous = self.last_online.replace(Some(online));
        debug!(
            "event=connectivity_change module=queue status=ok online={} previous={:?}",
            online, previous
        );

        let came_back = online && previous != Some(true);
        if !came_back || queue.is_empty()? {
            return Ok(None);
        }

        let report = queue.flush(gateway)?;
        if report.stopped_offline {
            self.last_online.set(Some(false));
        }
        Ok(Some(report))
    }

    pub fn last_known_online(&self) -> Option<bool> {
        self.last_online.get()
    }
}
