//! # Song Queue
//!
//! Ordered list of user-submitted entries waiting to be played.
//!
//! The queue never holds two entries for the same song. Mutations commit
//! under the internal lock; registered [`QueueChangeListener`]s are invoked
//! afterwards on the mutating task, so a listener may safely call back into
//! the queue.

use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use parking_lot::{Mutex, RwLock};
use plugin_traits::{QueueEntry, Song};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Observer of queue mutations. All methods default to doing nothing.
pub trait QueueChangeListener: Send + Sync {
    fn on_add(&self, _entry: &QueueEntry) {}

    fn on_remove(&self, _entry: &QueueEntry) {}

    fn on_move(&self, _entry: &QueueEntry, _from: usize, _to: usize) {}
}

/// Compare listeners by the object they point to, ignoring vtables.
fn same_listener(a: &Arc<dyn QueueChangeListener>, b: &Arc<dyn QueueChangeListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

enum Change {
    Added(QueueEntry, usize),
    Removed(QueueEntry),
    Moved(QueueEntry, usize, usize),
}

/// Thread-safe song queue.
#[derive(Default)]
pub struct SongQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    listeners: RwLock<Vec<Arc<dyn QueueChangeListener>>>,
    event_bus: Option<Arc<EventBus>>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set event bus for queue events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Append an entry unless its song is already queued.
    ///
    /// Returns whether the entry was inserted.
    pub fn insert(&self, entry: QueueEntry) -> bool {
        let position = {
            let mut entries = self.entries.lock();
            if entries.iter().any(|queued| queued.song() == entry.song()) {
                None
            } else {
                entries.push_back(entry.clone());
                Some(entries.len() - 1)
            }
        };

        match position {
            Some(position) => {
                debug!(song = %entry.song(), user = %entry.user(), position, "Song enqueued");
                self.notify(Change::Added(entry, position));
                true
            }
            None => {
                trace!(song = %entry.song(), "Song is already queued");
                false
            }
        }
    }

    /// Remove every entry for `song`.
    pub fn remove(&self, song: &Song) {
        let removed: Vec<QueueEntry> = {
            let mut entries = self.entries.lock();
            let mut removed = Vec::new();
            entries.retain(|entry| {
                if entry.song() == song {
                    removed.push(entry.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };

        for entry in removed {
            self.notify(Change::Removed(entry));
        }
    }

    /// Remove and return the head of the queue.
    pub fn pop(&self) -> Option<QueueEntry> {
        let entry = self.entries.lock().pop_front()?;
        self.notify(Change::Removed(entry.clone()));
        Some(entry)
    }

    /// Move the entry for `song` to `index`, clamped to the last position.
    ///
    /// Nothing happens if the song is not queued or already at that index.
    pub fn move_entry(&self, song: &Song, index: usize) {
        let moved = {
            let mut entries = self.entries.lock();
            let Some(from) = entries.iter().position(|entry| entry.song() == song) else {
                return;
            };
            let to = index.min(entries.len() - 1);
            if from == to {
                return;
            }
            match entries.remove(from) {
                Some(entry) => {
                    entries.insert(to, entry.clone());
                    (entry, from, to)
                }
                None => return,
            }
        };

        let (entry, from, to) = moved;
        self.notify(Change::Moved(entry, from, to));
    }

    /// Remove all entries.
    ///
    /// Listeners are not notified about the removed entries.
    pub fn clear(&self) {
        let count = {
            let mut entries = self.entries.lock();
            let count = entries.len();
            entries.clear();
            count
        };

        debug!(count, "Queue cleared");
        self.emit(QueueEvent::Cleared { count });
    }

    /// Snapshot of the queued entries in play order.
    pub fn to_list(&self) -> Vec<QueueEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn peek(&self) -> Option<QueueEntry> {
        self.entries.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Register a listener. Adding the same listener twice has no effect.
    pub fn add_listener(&self, listener: Arc<dyn QueueChangeListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|known| same_listener(known, &listener)) {
            listeners.push(listener);
        }
    }

    /// Unregister a listener. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn QueueChangeListener>) {
        self.listeners
            .write()
            .retain(|known| !same_listener(known, listener));
    }

    fn notify(&self, change: Change) {
        // Snapshot so listeners can (un)register while being notified.
        let listeners = self.listeners.read().clone();

        match &change {
            Change::Added(entry, position) => {
                for listener in &listeners {
                    listener.on_add(entry);
                }
                self.emit(QueueEvent::Added {
                    song_id: entry.song().id().to_string(),
                    provider: entry.song().provider().to_string(),
                    user: entry.user().name().to_string(),
                    position: *position,
                });
            }
            Change::Removed(entry) => {
                for listener in &listeners {
                    listener.on_remove(entry);
                }
                self.emit(QueueEvent::Removed {
                    song_id: entry.song().id().to_string(),
                    provider: entry.song().provider().to_string(),
                });
            }
            Change::Moved(entry, from, to) => {
                for listener in &listeners {
                    listener.on_move(entry, *from, *to);
                }
                self.emit(QueueEvent::Moved {
                    song_id: entry.song().id().to_string(),
                    from: *from,
                    to: *to,
                });
            }
        }
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            let _ = bus.emit(CoreEvent::Queue(event));
        }
    }
}

impl fmt::Debug for SongQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SongQueue")
            .field("len", &self.len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_traits::User;

    #[derive(Default)]
    struct Recorder {
        added: Mutex<Vec<Song>>,
        removed: Mutex<Vec<Song>>,
        moved: Mutex<Vec<(Song, usize, usize)>>,
    }

    impl QueueChangeListener for Recorder {
        fn on_add(&self, entry: &QueueEntry) {
            self.added.lock().push(entry.song().clone());
        }

        fn on_remove(&self, entry: &QueueEntry) {
            self.removed.lock().push(entry.song().clone());
        }

        fn on_move(&self, entry: &QueueEntry, from: usize, to: usize) {
            self.moved.lock().push((entry.song().clone(), from, to));
        }
    }

    fn song(id: &str) -> Song {
        Song::builder(id, "test")
            .title(format!("Song {id}"))
            .description("desc")
            .build()
            .unwrap()
    }

    fn entry(id: &str, user: &str) -> QueueEntry {
        QueueEntry::new(song(id), User::new(user))
    }

    fn queue_with_recorder() -> (SongQueue, Arc<Recorder>) {
        let queue = SongQueue::new();
        let recorder = Arc::new(Recorder::default());
        queue.add_listener(recorder.clone());
        (queue, recorder)
    }

    fn ids(queue: &SongQueue) -> Vec<String> {
        queue
            .to_list()
            .iter()
            .map(|entry| entry.song().id().to_string())
            .collect()
    }

    #[test]
    fn test_insert_rejects_duplicate_songs() {
        let (queue, recorder) = queue_with_recorder();

        assert!(queue.insert(entry("1", "alice")));
        assert!(!queue.insert(entry("1", "bob")));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().user().name(), "alice");
        assert_eq!(*recorder.added.lock(), vec![song("1")]);
    }

    #[test]
    fn test_pop_in_insertion_order() {
        let (queue, recorder) = queue_with_recorder();
        queue.insert(entry("1", "a"));
        queue.insert(entry("2", "a"));

        assert_eq!(queue.pop().unwrap().song(), &song("1"));
        assert_eq!(queue.pop().unwrap().song(), &song("2"));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
        assert_eq!(*recorder.removed.lock(), vec![song("1"), song("2")]);
    }

    #[test]
    fn test_remove_notifies_once_per_entry() {
        let (queue, recorder) = queue_with_recorder();
        queue.insert(entry("1", "a"));
        queue.insert(entry("2", "a"));

        queue.remove(&song("2"));
        queue.remove(&song("missing"));

        assert_eq!(ids(&queue), vec!["1"]);
        assert_eq!(*recorder.removed.lock(), vec![song("2")]);
    }

    #[test]
    fn test_clear_does_not_notify() {
        let (queue, recorder) = queue_with_recorder();
        queue.insert(entry("1", "a"));
        queue.insert(entry("2", "a"));

        queue.clear();

        assert!(queue.is_empty());
        assert!(recorder.removed.lock().is_empty());
    }

    #[test]
    fn test_move_clamps_to_last_position() {
        let (queue, recorder) = queue_with_recorder();
        for id in ["1", "2", "3"] {
            queue.insert(entry(id, "a"));
        }

        queue.move_entry(&song("1"), 10);
        assert_eq!(ids(&queue), vec!["2", "3", "1"]);

        queue.move_entry(&song("1"), 0);
        assert_eq!(ids(&queue), vec!["1", "2", "3"]);

        assert_eq!(
            *recorder.moved.lock(),
            vec![(song("1"), 0, 2), (song("1"), 2, 0)]
        );
    }

    #[test]
    fn test_move_noops() {
        let (queue, recorder) = queue_with_recorder();
        queue.insert(entry("1", "a"));
        queue.insert(entry("2", "a"));

        queue.move_entry(&song("2"), 1);
        queue.move_entry(&song("2"), 5);
        queue.move_entry(&song("missing"), 0);

        assert_eq!(ids(&queue), vec!["1", "2"]);
        assert!(recorder.moved.lock().is_empty());
    }

    #[test]
    fn test_listener_registration_is_idempotent() {
        let queue = SongQueue::new();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn QueueChangeListener> = recorder.clone();

        queue.add_listener(listener.clone());
        queue.add_listener(listener.clone());
        queue.insert(entry("1", "a"));
        assert_eq!(recorder.added.lock().len(), 1);

        queue.remove_listener(&listener);
        queue.remove_listener(&listener);
        queue.insert(entry("2", "a"));
        assert_eq!(recorder.added.lock().len(), 1);
    }

    #[test]
    fn test_listener_can_reenter_queue() {
        struct Reentrant(Arc<SongQueue>);

        impl QueueChangeListener for Reentrant {
            fn on_add(&self, _entry: &QueueEntry) {
                // would deadlock if called under the queue lock
                assert!(!self.0.is_empty());
            }
        }

        let queue = Arc::new(SongQueue::new());
        queue.add_listener(Arc::new(Reentrant(Arc::clone(&queue))));
        assert!(queue.insert(entry("1", "a")));
    }

    #[tokio::test]
    async fn test_queue_events_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();
        let queue = SongQueue::new().with_event_bus(Arc::clone(&bus));

        queue.insert(entry("1", "alice"));
        queue.clear();

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Queue(QueueEvent::Added {
                song_id: "1".to_string(),
                provider: "test".to_string(),
                user: "alice".to_string(),
                position: 0,
            })
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Queue(QueueEvent::Cleared { count: 1 })
        );
    }
}
