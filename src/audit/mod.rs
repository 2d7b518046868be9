// ABOUTME: Fire-and-forget audit logging through an in-process channel
// ABOUTME: Handlers enqueue entries; a dispatcher forwards them to the audit writer function
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Audit Logging
//!
//! [`AuditLogger::emit`] never blocks and never fails the caller. Entries are
//! queued on an unbounded channel and an [`AuditDispatcher`] forwards each one
//! to the audit writer through a [`TaskInvoker`] on its own task, awaiting
//! each delivery so nothing is still in flight once the channel drains.
//!
//! Delivery is at-most-once attempted: a closed channel or a failed
//! invocation is logged and the entry is dropped. Consumers must tolerate
//! reordering and duplicates.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::external::{InvocationMode, TaskInvoker};
use crate::models::AuditEntry;

/// Receiving end of the audit channel
pub type AuditReceiver = mpsc::UnboundedReceiver<AuditEntry>;

/// Cloneable handle used by handlers to enqueue audit entries
#[derive(Debug, Clone)]
pub struct AuditLogger {
    sender: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditLogger {
    /// Create a logger and the receiver its entries arrive on
    #[must_use]
    pub fn channel() -> (Self, AuditReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueue `entry` without waiting
    pub fn emit(&self, entry: AuditEntry) {
        let target = entry.target.clone();
        let action = entry.action.clone();
        match self.sender.send(entry) {
            Ok(()) => debug!(%target, %action, "Audit entry enqueued"),
            Err(_) => warn!(%target, %action, "Audit channel closed, entry dropped"),
        }
    }
}

/// Drains the audit channel into the audit writer function
pub struct AuditDispatcher {
    receiver: AuditReceiver,
    invoker: Arc<dyn TaskInvoker>,
    function: String,
}

impl AuditDispatcher {
    /// Dispatcher forwarding to `function` through `invoker`
    pub fn new(receiver: AuditReceiver, invoker: Arc<dyn TaskInvoker>, function: impl Into<String>) -> Self {
        Self {
            receiver,
            invoker,
            function: function.into(),
        }
    }

    /// Forward entries until every [`AuditLogger`] handle is dropped.
    ///
    /// Returns the number of entries handed to the writer, delivered or not.
    pub async fn run(mut self) -> u64 {
        let mut forwarded = 0;
        while let Some(entry) = self.receiver.recv().await {
            self.forward(&entry).await;
            forwarded += 1;
        }
        info!(forwarded, "Audit dispatcher stopped");
        forwarded
    }

    /// Run on a background task
    #[must_use]
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    async fn forward(&self, entry: &AuditEntry) {
        let payload = match serde_json::to_value(entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, target = %entry.target, "Audit entry not serializable, dropped");
                return;
            }
        };
        // the dispatcher owns its task, so it waits for delivery
        if let Err(e) = self
            .invoker
            .invoke(&self.function, payload, InvocationMode::WaitForResult)
            .await
        {
            warn!(error = %e, target = %entry.target, "Audit dispatch failed, entry dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::LoggingInvoker;
    use crate::models::AuditDraft;

    #[tokio::test]
    async fn test_emit_enqueues_entries() {
        let (logger, mut receiver) = AuditLogger::channel();
        logger.emit(AuditDraft::new("bus_route:1", "create_route").succeeded(201, None));
        logger.emit(AuditDraft::new("bus_route:1", "delete_route").failed(404));

        assert_eq!(receiver.recv().await.unwrap().action, "create_route");
        assert_eq!(receiver.recv().await.unwrap().status_code, 404);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_after_close_does_not_fail() {
        let (logger, receiver) = AuditLogger::channel();
        drop(receiver);
        logger.emit(AuditDraft::new("app:1", "restore_pages").failed(500));
    }

    #[tokio::test]
    async fn test_dispatcher_drains_until_loggers_drop() {
        let (logger, receiver) = AuditLogger::channel();
        let dispatcher = AuditDispatcher::new(receiver, Arc::new(LoggingInvoker), "write-audit-log");
        let handle = dispatcher.spawn();

        for id in 0..3 {
            logger.emit(AuditDraft::new(format!("event:{id}"), "upload_image").succeeded(200, None));
        }
        drop(logger);

        assert_eq!(handle.await.unwrap(), 3);
    }
}
