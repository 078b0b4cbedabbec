// crates/server/src/watcher.rs
//! Transcript file watcher driving the reconciler.
//!
//! A `notify` watcher over the transcript root feeds modified `.jsonl`
//! paths through a bounded channel into a tokio worker; a periodic poll of
//! every live agent's transcript path catches anything the OS watcher
//! misses. Events for the same path are debounced into one read per flush
//! tick, and per-path cursors are dropped after an inactivity window (the
//! agent itself is untouched — the reaper owns agent lifetime).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use taskdeck_db::agents;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::state::AppState;
use crate::transcript_cursor::TranscriptCursor;

const CHANNEL_CAPACITY: usize = 256;
const DEBOUNCE: Duration = Duration::from_millis(250);
const CURSOR_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directory tree containing transcript logs.
    pub root: PathBuf,
    /// Poll safety-net interval.
    pub poll_interval: Duration,
}

/// Keeps the OS watcher alive; dropping this stops file notifications
/// (the poll loop keeps running until the task handle is aborted).
pub struct WatcherHandle {
    _watcher: Option<RecommendedWatcher>,
    pub task: JoinHandle<()>,
    pub dropped_events: Arc<AtomicU64>,
}

struct CursorSlot {
    cursor: TranscriptCursor,
    last_activity: Instant,
}

/// True for transcript log files inside the watched root.
fn is_transcript_path(root: &Path, path: &Path) -> bool {
    path.extension().map(|ext| ext == "jsonl").unwrap_or(false) && path.starts_with(root)
}

pub fn spawn(state: Arc<AppState>, config: WatcherConfig) -> WatcherHandle {
    let (tx, rx) = mpsc::channel::<PathBuf>(CHANNEL_CAPACITY);
    let dropped_events = Arc::new(AtomicU64::new(0));

    let watcher = match start_os_watcher(&config.root, tx, dropped_events.clone()) {
        Ok(w) => Some(w),
        Err(err) => {
            tracing::warn!(
                root = %config.root.display(),
                error = %err,
                "file watcher unavailable; relying on polling only"
            );
            None
        }
    };

    let task = tokio::spawn(run(state, config, rx));
    WatcherHandle {
        _watcher: watcher,
        task,
        dropped_events,
    }
}

fn start_os_watcher(
    root: &Path,
    tx: mpsc::Sender<PathBuf>,
    dropped: Arc<AtomicU64>,
) -> notify::Result<RecommendedWatcher> {
    let root_for_filter = root.to_path_buf();
    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                for path in event.paths {
                    if !is_transcript_path(&root_for_filter, &path) {
                        continue;
                    }
                    if tx.try_send(path).is_err() {
                        let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if count == 1 || count % 100 == 0 {
                            tracing::warn!(
                                dropped_total = count,
                                "watcher channel full; event dropped (poll will catch up)"
                            );
                        }
                    }
                }
            }
            Err(err) => tracing::error!(error = %err, "file watcher error"),
        })?;

    if root.exists() {
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching transcript root");
    } else {
        tracing::warn!(root = %root.display(), "transcript root missing; watcher idle");
    }
    Ok(watcher)
}

async fn run(state: Arc<AppState>, config: WatcherConfig, mut rx: mpsc::Receiver<PathBuf>) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    let mut cursors: HashMap<PathBuf, CursorSlot> = HashMap::new();
    let mut flush = tokio::time::interval(DEBOUNCE);
    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(path) => { pending.insert(path); }
                    None => break,
                }
            }
            _ = flush.tick() => {
                for path in pending.drain() {
                    process_path(&state, &mut cursors, &path).await;
                }
                cursors.retain(|path, slot| {
                    let keep = slot.last_activity.elapsed() < CURSOR_IDLE_TIMEOUT;
                    if !keep {
                        tracing::debug!(path = %path.display(), "dropping idle transcript cursor");
                    }
                    keep
                });
            }
            _ = poll.tick() => {
                // Safety net: revisit every live agent's transcript even if
                // no OS event arrived.
                match agents::list_live(&state.db).await {
                    Ok(live) => {
                        for agent in live {
                            if let Some(path) = agent.transcript_path {
                                pending.insert(PathBuf::from(path));
                            }
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "poll scan failed"),
                }
            }
        }
    }
}

async fn process_path(
    state: &AppState,
    cursors: &mut HashMap<PathBuf, CursorSlot>,
    path: &Path,
) {
    let path_str = path.to_string_lossy();
    let agent = match agents::get_live_by_transcript_path(&state.db, &path_str).await {
        Ok(Some(agent)) => agent,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "agent lookup failed");
            return;
        }
    };

    let slot = cursors.entry(path.to_path_buf()).or_insert_with(|| CursorSlot {
        cursor: TranscriptCursor::new(path.to_path_buf()),
        last_activity: Instant::now(),
    });
    slot.last_activity = Instant::now();

    let lines = match slot.cursor.read_new_lines().await {
        Ok(lines) => lines,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "transcript read failed");
            return;
        }
    };
    if lines.is_empty() {
        return;
    }

    if let Err(err) = state.reconciler.reconcile_lines(&agent, &lines).await {
        tracing::warn!(
            agent_id = %agent.id,
            path = %path.display(),
            error = %err,
            "reconciliation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::types::{Agent, TaskState};
    use taskdeck_db::{now_millis, projects, tasks, Database};

    #[test]
    fn test_transcript_path_filter() {
        let root = Path::new("/logs");
        assert!(is_transcript_path(root, Path::new("/logs/p1/s1.jsonl")));
        assert!(is_transcript_path(root, Path::new("/logs/s1.jsonl")));
        assert!(!is_transcript_path(root, Path::new("/logs/p1/notes.txt")));
        assert!(!is_transcript_path(root, Path::new("/elsewhere/s1.jsonl")));
        assert!(!is_transcript_path(root, Path::new("/logs/p1/s1")));
    }

    #[tokio::test]
    async fn test_poll_drives_reconciliation() {
        let db = Database::new_in_memory().await.unwrap();
        projects::insert(
            &db,
            &projects::ProjectRow {
                id: "p1".into(),
                name: "app".into(),
                root_path: "/work/app".into(),
                created_at: now_millis(),
            },
        )
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("s1.jsonl");
        std::fs::write(
            &log_path,
            concat!(
                r#"{"type":"user","timestamp":"2026-08-25T10:00:00Z","message":{"content":"add a health route"}}"#,
                "\n"
            ),
        )
        .unwrap();

        let agent = Agent {
            id: "a1".into(),
            project_id: "p1".into(),
            session_id: "s1".into(),
            run_id: None,
            pane_id: None,
            transcript_path: Some(log_path.to_string_lossy().into_owned()),
            created_at: now_millis(),
            last_seen_at: now_millis(),
            ended_at: None,
        };
        taskdeck_db::agents::insert(&db, &agent).await.unwrap();

        let state = AppState::new(db.clone(), None);
        let handle = spawn(
            state,
            WatcherConfig {
                root: dir.path().to_path_buf(),
                poll_interval: Duration::from_millis(100),
            },
        );

        // Let the poll tick and the flush tick both fire.
        tokio::time::sleep(Duration::from_millis(900)).await;
        handle.task.abort();

        let task = tasks::open_for_agent(&db, "a1").await.unwrap().expect("backfilled");
        assert_eq!(task.state, TaskState::Commanded);
        assert_eq!(task.instruction.as_deref(), Some("add a health route"));
    }
}
