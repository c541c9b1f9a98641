use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Portrait capture preset (width, height).
pub const PORTRAIT_FRAME: TargetFrame = TargetFrame { width: 720, height: 1280 };
/// Landscape capture preset (width, height).
pub const LANDSCAPE_FRAME: TargetFrame = TargetFrame { width: 1280, height: 720 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationMode {
    Portrait,
    Landscape,
}

impl OrientationMode {
    pub fn from_portrait(is_portrait: bool) -> Self {
        if is_portrait {
            OrientationMode::Portrait
        } else {
            OrientationMode::Landscape
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrientationMode::Portrait => "portrait",
            OrientationMode::Landscape => "landscape",
        }
    }

    /// Fixed still-image size for this orientation.
    pub fn target_frame(&self) -> TargetFrame {
        match self {
            OrientationMode::Portrait => PORTRAIT_FRAME,
            OrientationMode::Landscape => LANDSCAPE_FRAME,
        }
    }
}

impl std::fmt::Display for OrientationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFrame {
    pub width: u32,
    pub height: u32,
}

impl TargetFrame {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

pub type ListenerId = u64;
pub type OrientationListener = Arc<dyn Fn(bool) + Send + Sync>;

/// A device orientation query ("is the screen portrait?") with change events.
pub trait OrientationQuery: Send + Sync {
    /// `None` when the platform cannot answer the query at all.
    fn matches_portrait(&self) -> Option<bool>;

    /// Register a change listener. Returns `None` if change events are not
    /// supported.
    fn add_listener(&self, listener: OrientationListener) -> Option<ListenerId>;

    fn remove_listener(&self, id: ListenerId);
}

/// Tracks the current orientation and publishes changes to subscribers.
///
/// The change listener lives exactly as long as the monitor: it is registered
/// in [`OrientationMonitor::attach`] and removed on drop.
pub struct OrientationMonitor {
    query: Arc<dyn OrientationQuery>,
    sender: Arc<watch::Sender<OrientationMode>>,
    listener: Option<ListenerId>,
}

impl OrientationMonitor {
    pub fn attach(query: Arc<dyn OrientationQuery>) -> Self {
        let initial = query.matches_portrait();
        let mode = initial
            .map(OrientationMode::from_portrait)
            .unwrap_or(OrientationMode::Landscape);
        let (sender, _) = watch::channel(mode);
        let sender = Arc::new(sender);

        let listener = match initial {
            Some(_) => {
                let tx = Arc::clone(&sender);
                query.add_listener(Arc::new(move |is_portrait| {
                    let next = OrientationMode::from_portrait(is_portrait);
                    tx.send_if_modified(|current| {
                        if *current == next {
                            return false;
                        }
                        log::info!("Orientation changed to {}", next);
                        *current = next;
                        true
                    });
                }))
            }
            None => {
                log::warn!("Orientation query unavailable, staying in landscape");
                None
            }
        };

        log::debug!("Orientation monitor attached in {} mode", mode);
        Self { query, sender, listener }
    }

    pub fn current_mode(&self) -> OrientationMode {
        *self.sender.borrow()
    }

    pub fn target_frame(&self) -> TargetFrame {
        self.current_mode().target_frame()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrientationMode> {
        self.sender.subscribe()
    }
}

impl Drop for OrientationMonitor {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.query.remove_listener(id);
            log::debug!("Orientation monitor detached");
        }
    }
}

/// Orientation source driven by hand, e.g. from a `rotate` command.
#[derive(Default)]
pub struct ManualOrientation {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    portrait: bool,
    next_id: ListenerId,
    listeners: Vec<(ListenerId, OrientationListener)>,
}

impl ManualOrientation {
    pub fn new(mode: OrientationMode) -> Self {
        Self {
            state: Mutex::new(ManualState {
                portrait: mode == OrientationMode::Portrait,
                ..Default::default()
            }),
        }
    }

    pub fn set_mode(&self, mode: OrientationMode) {
        let portrait = mode == OrientationMode::Portrait;
        let listeners: Vec<OrientationListener> = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.portrait == portrait {
                return;
            }
            state.portrait = portrait;
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        // Listeners run outside the lock so they may query us again
        for listener in listeners {
            listener(portrait);
        }
    }

    pub fn rotate(&self) -> OrientationMode {
        let next = match self.matches_portrait() {
            Some(true) => OrientationMode::Landscape,
            _ => OrientationMode::Portrait,
        };
        self.set_mode(next);
        next
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().map(|s| s.listeners.len()).unwrap_or(0)
    }
}

impl OrientationQuery for ManualOrientation {
    fn matches_portrait(&self) -> Option<bool> {
        self.state.lock().ok().map(|s| s.portrait)
    }

    fn add_listener(&self, listener: OrientationListener) -> Option<ListenerId> {
        let mut state = self.state.lock().ok()?;
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, listener));
        Some(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut state) = self.state.lock() {
            state.listeners.retain(|(existing, _)| *existing != id);
        }
    }
}

/// A platform without an orientation query.
pub struct UnavailableOrientation;

impl OrientationQuery for UnavailableOrientation {
    fn matches_portrait(&self) -> Option<bool> {
        None
    }

    fn add_listener(&self, _listener: OrientationListener) -> Option<ListenerId> {
        None
    }

    fn remove_listener(&self, _id: ListenerId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_follow_mode() {
        assert_eq!(OrientationMode::Portrait.target_frame(), TargetFrame { width: 720, height: 1280 });
        assert_eq!(OrientationMode::Landscape.target_frame(), TargetFrame { width: 1280, height: 720 });
    }

    #[test]
    fn test_initial_mode_is_evaluated_once() {
        let query = Arc::new(ManualOrientation::new(OrientationMode::Portrait));
        let monitor = OrientationMonitor::attach(query.clone());
        assert_eq!(monitor.current_mode(), OrientationMode::Portrait);
        assert_eq!(monitor.target_frame(), PORTRAIT_FRAME);
    }

    #[test]
    fn test_change_notifies_subscribers() {
        let query = Arc::new(ManualOrientation::new(OrientationMode::Landscape));
        let monitor = OrientationMonitor::attach(query.clone());
        let mut rx = monitor.subscribe();
        assert!(!rx.has_changed().unwrap());

        query.set_mode(OrientationMode::Portrait);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), OrientationMode::Portrait);
        assert_eq!(monitor.current_mode(), OrientationMode::Portrait);

        // Same value again is not a change
        query.set_mode(OrientationMode::Portrait);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let query = Arc::new(ManualOrientation::new(OrientationMode::Landscape));
        {
            let _monitor = OrientationMonitor::attach(query.clone());
            assert_eq!(query.listener_count(), 1);
        }
        assert_eq!(query.listener_count(), 0);
    }

    #[test]
    fn test_unavailable_query_defaults_to_landscape() {
        let monitor = OrientationMonitor::attach(Arc::new(UnavailableOrientation));
        assert_eq!(monitor.current_mode(), OrientationMode::Landscape);
        assert_eq!(monitor.target_frame(), LANDSCAPE_FRAME);
    }

    #[test]
    fn test_rotate_toggles() {
        let query = ManualOrientation::new(OrientationMode::Landscape);
        assert_eq!(query.rotate(), OrientationMode::Portrait);
        assert_eq!(query.rotate(), OrientationMode::Landscape);
    }
}
