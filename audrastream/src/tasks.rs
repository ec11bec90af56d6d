//! Tâches de fond détachées des requêtes

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Lanceur de tâches détachées
///
/// Une tâche continue même si la requête qui l'a lancée est abandonnée par le
/// client. À l'arrêt, [`BackgroundTasks::shutdown`] laisse un délai de grâce
/// aux tâches en cours.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    /// Passe à `true` à l'arrêt ; protège aussi les `close`/`reopen` du tracker
    stopped: Arc<Mutex<bool>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lance une tâche ; son résultat est ignoré
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Nombre de tâches en cours
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Attend que toutes les tâches en cours soient terminées
    ///
    /// De nouvelles tâches peuvent toujours être lancées ensuite. Un
    /// [`BackgroundTasks::shutdown`] concurrent n'est jamais annulé.
    pub async fn wait_idle(&self) {
        {
            let _guard = self.stopped.lock().unwrap_or_else(|e| e.into_inner());
            self.tracker.close();
        }
        self.tracker.wait().await;

        let stopped = self.stopped.lock().unwrap_or_else(|e| e.into_inner());
        if !*stopped {
            self.tracker.reopen();
        }
    }

    /// Vrai une fois [`BackgroundTasks::shutdown`] appelé
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attend les tâches en cours, au plus `grace`
    ///
    /// Retourne `false` si des tâches tournaient encore à l'échéance ; elles
    /// sont alors abandonnées avec le runtime.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        {
            let mut stopped = self.stopped.lock().unwrap_or_else(|e| e.into_inner());
            *stopped = true;
            self.tracker.close();
        }
        let pending = self.tracker.len();
        if pending == 0 {
            return true;
        }

        info!(pending, "Waiting for background tasks");
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.tracker.len(),
                    "Background tasks still running after {:?}", grace
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_wait_idle_then_spawn_again() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tasks.wait_idle().await;
        assert!(done.load(Ordering::SeqCst));

        tasks.spawn(async {});
        tasks.wait_idle().await;
        assert!(tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_gives_up_after_grace() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!tasks.shutdown(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_keeps_tracker_closed_after_shutdown() {
        let tasks = BackgroundTasks::new();
        let waiter = tasks.clone();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        // wait_idle en cours pendant l'arrêt
        let idle = tokio::spawn(async move { waiter.wait_idle().await });
        tokio::task::yield_now().await;
        assert!(tasks.shutdown(Duration::from_secs(5)).await);
        idle.await.unwrap();

        assert!(tasks.is_stopped());
        assert!(tasks.tracker.is_closed());

        tasks.wait_idle().await;
        assert!(tasks.tracker.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_without_tasks() {
        assert!(BackgroundTasks::new().shutdown(Duration::from_secs(1)).await);
    }
}
