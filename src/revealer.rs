use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Delay between two revealed segments.
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(160);

const SECTION_MARKER: &str = "<section";

/// Split a payload in front of every `<section` marker.
///
/// The marker stays at the start of the segment it opens, so concatenating the
/// segments gives back the payload unchanged. Empty segments are dropped.
pub fn split_segments(payload: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (index, _) in payload.match_indices(SECTION_MARKER) {
        if index > start {
            segments.push(payload[start..index].to_string());
        }
        start = index;
    }
    if start < payload.len() {
        segments.push(payload[start..].to_string());
    }
    segments.retain(|segment| !segment.is_empty());
    segments
}

/// Progress of one reveal timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealState {
    pub segments: Vec<String>,
    pub revealed: String,
    pub cursor: usize,
    pub active: bool,
    pub payload: String,
    generation: u64,
}

impl RevealState {
    fn idle(generation: u64) -> Self {
        Self {
            generation,
            ..Default::default()
        }
    }

    /// Text to show: the partial reveal while running, the full payload after.
    pub fn visible(&self) -> &str {
        if self.active {
            &self.revealed
        } else {
            &self.payload
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.active && !self.payload.is_empty()
    }
}

/// Reveals a payload segment by segment on a fixed cadence.
///
/// At most one tick task is alive at a time. Each timeline carries a
/// generation number and a tick only writes while its generation is current,
/// so an aborted task can never touch a newer reveal.
pub struct Revealer {
    cadence: Duration,
    state: Arc<watch::Sender<RevealState>>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl Default for Revealer {
    fn default() -> Self {
        Self::new(DEFAULT_CADENCE)
    }
}

impl Revealer {
    pub fn new(cadence: Duration) -> Self {
        let (state, _) = watch::channel(RevealState::default());
        Self {
            cadence,
            state: Arc::new(state),
            task: None,
            generation: 0,
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Start revealing `payload`, abandoning any reveal in progress.
    ///
    /// The first segment is revealed immediately. Outside a tokio runtime
    /// there is nothing to drive the ticks, so the whole payload is shown at
    /// once.
    pub fn begin(&mut self, payload: &str) {
        self.abort_task();
        self.generation += 1;
        let generation = self.generation;

        if payload.trim().is_empty() {
            log::debug!("Empty payload, nothing to reveal");
            self.state.send_replace(RevealState::idle(generation));
            return;
        }

        let segments = split_segments(payload);
        log::info!("Revealing {} segment(s)", segments.len());
        self.state.send_replace(RevealState {
            segments,
            revealed: String::new(),
            cursor: 0,
            active: true,
            payload: payload.to_string(),
            generation,
        });

        let Some(first_delay) = step(&self.state, generation, self.cadence) else {
            return;
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("No async runtime to pace the reveal ({}), showing it whole", e);
                finish(&self.state);
                return;
            }
        };

        let state = Arc::clone(&self.state);
        let cadence = self.cadence;
        self.task = Some(runtime.spawn(async move {
            let mut delay = first_delay;
            loop {
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
                match step(&state, generation, cadence) {
                    Some(next) => delay = next,
                    None => break,
                }
            }
        }));
    }

    /// Stop any reveal and clear the revealed text.
    pub fn cancel(&mut self) {
        let had_task = self.abort_task();
        self.generation += 1;
        self.state.send_replace(RevealState::idle(self.generation));
        if had_task {
            log::debug!("Reveal cancelled");
        }
    }

    pub fn snapshot(&self) -> RevealState {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    pub fn has_pending_tick(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    pub fn subscribe(&self) -> watch::Receiver<RevealState> {
        self.state.subscribe()
    }

    fn abort_task(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Revealer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

/// Advance one tick. Returns the delay before the next tick, or `None` once
/// the timeline is over or superseded.
fn step(state: &watch::Sender<RevealState>, generation: u64, cadence: Duration) -> Option<Duration> {
    let mut next = None;
    state.send_if_modified(|s| {
        if s.generation != generation || !s.active {
            return false;
        }
        if s.cursor >= s.segments.len() {
            s.active = false;
            return true;
        }
        let cursor = s.cursor;
        s.cursor += 1;
        if s.segments[cursor].is_empty() {
            next = Some(Duration::ZERO);
            return false;
        }
        let RevealState { segments, revealed, .. } = s;
        revealed.push_str(&segments[cursor]);
        next = Some(cadence);
        true
    });
    next
}

/// Reveal every remaining segment and end the timeline.
fn finish(state: &watch::Sender<RevealState>) {
    state.send_modify(|s| {
        s.revealed = s.segments.concat();
        s.cursor = s.segments.len();
        s.active = false;
    });
}
