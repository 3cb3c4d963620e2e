//! Binds a controller to a consumer
//!
//! The watch registers its listeners on start and removes them when dropped,
//! mirroring a component's mount and unmount.

use super::progress::AnalysisProgress;
use crate::connection::{ConnectionController, ConnectionState};
use crate::dispatch::ListenerHandle;
use analysis_common::{ClientError, ClientResult};
use analysis_protocol::{EventKind, InboundEvent};
use std::sync::Arc;
use tokio::sync::watch;

/// Event kinds folded into [`AnalysisProgress`]: progress events and errors
fn tracked() -> impl Iterator<Item = EventKind> {
    EventKind::ALL
        .into_iter()
        .filter(|kind| kind.is_progress() || *kind == EventKind::Error)
}

pub struct AnalysisWatch {
    controller: ConnectionController,
    handles: Vec<ListenerHandle>,
    receiver: watch::Receiver<AnalysisProgress>,
}

impl AnalysisWatch {
    /// Register listeners and ask the server for this analysis' updates
    ///
    /// # Errors
    /// `Closed` if the controller has been shut down
    pub async fn start(controller: &ConnectionController) -> ClientResult<Self> {
        let analysis_id = controller.analysis_id().to_string();
        let mut initial = AnalysisProgress::new(analysis_id.clone());
        initial.connection = controller.state();

        let (tx, receiver) = watch::channel(initial);
        let tx = Arc::new(tx);
        let dispatcher = controller.dispatcher();
        let mut handles = Vec::new();

        for kind in tracked() {
            let tx = Arc::clone(&tx);
            handles.push(dispatcher.on_event(kind, move |event: &InboundEvent| {
                tx.send_if_modified(|progress| progress.apply(event));
            }));
        }

        let state_tx = Arc::clone(&tx);
        handles.push(dispatcher.on_state_change(Arc::new(move |state: &ConnectionState| {
            state_tx.send_if_modified(|progress| progress.set_connection(*state));
        })));

        handles.push(dispatcher.on_error(Arc::new(move |err: &ClientError| {
            tx.send_modify(|progress| progress.connection_error = Some(err.clone()));
        })));

        let watch = Self {
            controller: controller.clone(),
            handles,
            receiver,
        };
        controller.subscribe_analysis(analysis_id).await?;
        Ok(watch)
    }

    /// Current snapshot
    #[must_use]
    pub fn progress(&self) -> AnalysisProgress {
        self.receiver.borrow().clone()
    }

    /// Another receiver for the same snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AnalysisProgress> {
        self.receiver.clone()
    }

    /// Wait for the next change and return the new snapshot
    ///
    /// # Errors
    /// `Closed` once no listener can publish anymore
    pub async fn changed(&mut self) -> ClientResult<AnalysisProgress> {
        self.receiver
            .changed()
            .await
            .map_err(|_| ClientError::Closed)?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    #[must_use]
    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }
}

impl Drop for AnalysisWatch {
    fn drop(&mut self) {
        let dispatcher = self.controller.dispatcher();
        for handle in &self.handles {
            dispatcher.unsubscribe(handle);
        }
        tracing::debug!(
            analysis_id = %self.controller.analysis_id(),
            listeners = self.handles.len(),
            "Analysis watch detached"
        );
    }
}
