use crate::page::PageError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Opaque browser window/tab identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowId(pub String);

/// A new top-level page appeared in the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOpened {
    pub id: WindowId,
    /// True when some other page opened it (`window.open`, `target=_blank`)
    pub has_opener: bool,
}

#[async_trait]
pub trait WindowCloser: Send + Sync {
    async fn close_window(&self, id: &WindowId) -> Result<(), PageError>;
}

/// Background task closing popup windows as they appear
///
/// Only pages with an opener are closed; the primary page and tabs created
/// without an opener are left alone. The walk loop never awaits the guard.
pub struct PopupGuard {
    closed: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl PopupGuard {
    pub fn spawn(
        primary: WindowId,
        mut events: mpsc::Receiver<PageOpened>,
        closer: Arc<dyn WindowCloser>,
        delay: Duration,
    ) -> Self {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);

        let task = tokio::spawn(async move {
            while let Some(opened) = events.recv().await {
                if opened.id == primary || !opened.has_opener {
                    ::log::trace!("Ignoring new page {:?}", opened.id);
                    continue;
                }

                let closer = Arc::clone(&closer);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    match closer.close_window(&opened.id).await {
                        Ok(()) => {
                            counter.fetch_add(1, Ordering::SeqCst);
                            ::log::debug!("Closed popup window {:?}", opened.id);
                        }
                        Err(e) => {
                            ::log::debug!("Failed to close popup window {:?}: {}", opened.id, e);
                        }
                    }
                });
            }
        });

        Self { closed, task }
    }

    /// Number of popup windows closed so far
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop listening for new pages
    pub fn shutdown(self) -> usize {
        self.task.abort();
        self.closed()
    }
}
