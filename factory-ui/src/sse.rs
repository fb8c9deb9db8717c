//! Server-Sent Events stream and event log tailer.
//!
//! The tailer follows the run directory's `events.jsonl`, feeding parsed
//! events into the shared ring buffer and broadcast channel. The SSE
//! handler replays retained history to each new client before live events,
//! so a late subscriber sees a gap-free (possibly truncated-from-the-start)
//! view.

use std::convert::Infallible;
use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use factory::core::types::RunEvent;

use crate::state::AppState;

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (replay, mut rx) = state.subscribe_with_replay();

    let stream = async_stream::stream! {
        // Send initial connected event
        yield Ok(Event::default().event("connected").data("{}"));

        for event in replay {
            if let Ok(json) = serde_json::to_string(&event) {
                yield Ok(Event::default().event("event").data(json));
            }
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event("event").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Start the event log tailer in a background task.
pub fn start_event_tailer(state: AppState) {
    tokio::spawn(async move {
        if let Err(e) = run_event_tailer(state).await {
            warn!(error = %format!("{e:#}"), "event tailer failed");
        }
    });
}

async fn run_event_tailer(state: AppState) -> anyhow::Result<()> {
    // Replay whatever the log already contains before watching for more.
    let mut offset = catch_up(&state, 0)?;

    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);
    let tx_clone = tx.clone();
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx_clone.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    if state.paths.dir.exists() {
        watcher.watch(&state.paths.dir, RecursiveMode::NonRecursive)?;
        info!(path = %state.paths.events_path.display(), "tailing event log");
    } else {
        warn!(dir = %state.paths.dir.display(), "run directory not found, nothing to tail");
        return Ok(());
    }

    while let Some(event) = rx.recv().await {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }
        if !event.paths.iter().any(|p| p.ends_with("events.jsonl")) {
            continue;
        }
        offset = catch_up(&state, offset)?;
    }

    Ok(())
}

/// Publish every complete line appended since `offset`; returns the new
/// offset.
fn catch_up(state: &AppState, offset: u64) -> anyhow::Result<u64> {
    let path = &state.paths.events_path;
    if !path.exists() {
        return Ok(offset);
    }

    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let (events, consumed) = parse_complete_lines(&buf);
    for event in events {
        debug!(kind = %event.kind, "publishing tailed event");
        state.publish(event);
    }
    Ok(offset + consumed as u64)
}

/// Parse the complete (newline-terminated) JSONL lines in `buf`.
///
/// Returns the parsed events and the number of bytes consumed; a trailing
/// partial line is left for the next read. Malformed lines are skipped with
/// a warning so one bad write cannot wedge the tail.
fn parse_complete_lines(buf: &[u8]) -> (Vec<RunEvent>, usize) {
    let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
        return (Vec::new(), 0);
    };
    let complete = &buf[..=last_newline];

    let mut events = Vec::new();
    for line in String::from_utf8_lossy(complete).lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RunEvent>(line) {
            Ok(event) => events.push(event),
            Err(err) => warn!(error = %err, "skipping malformed event line"),
        }
    }
    (events, last_newline + 1)
}
