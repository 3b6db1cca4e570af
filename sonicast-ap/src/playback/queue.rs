//! Clip queue
//!
//! Tracks which clips are where relative to playback:
//! - Current: clip being decoded
//! - Next: override slot, jumps ahead of everything queued
//! - Pending: FIFO of clips waiting behind the current one

use crate::audio::AudioAsset;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ClipQueue {
    current: Option<Arc<AudioAsset>>,
    next: Option<Arc<AudioAsset>>,
    pending: VecDeque<Arc<AudioAsset>>,
}

impl ClipQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Arc<AudioAsset>> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&Arc<AudioAsset>> {
        self.next.as_ref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Arc<AudioAsset>> {
        self.pending.iter()
    }

    pub fn set_current(&mut self, clip: Option<Arc<AudioAsset>>) {
        self.current = clip;
    }

    /// Fill the override slot; returns the clip it displaced
    pub fn set_next(&mut self, clip: Arc<AudioAsset>) -> Option<Arc<AudioAsset>> {
        self.next.replace(clip)
    }

    /// Append to the back of the pending FIFO
    pub fn enqueue(&mut self, clip: Arc<AudioAsset>) {
        self.pending.push_back(clip);
    }

    /// Pick the clip to play after the current one.
    ///
    /// Priority: the override slot, then the current clip when
    /// `replay_current` is set, then the head of the pending FIFO.
    pub fn resolve_next(&mut self, replay_current: bool) -> Option<Arc<AudioAsset>> {
        if let Some(clip) = self.next.take() {
            return Some(clip);
        }
        if replay_current {
            if let Some(clip) = &self.current {
                return Some(Arc::clone(clip));
            }
        }
        self.pending.pop_front()
    }

    /// Drop the override slot and every pending clip; returns how many
    pub fn clear_upcoming(&mut self) -> usize {
        let count = self.pending.len() + usize::from(self.next.is_some());
        self.next = None;
        self.pending.clear();
        count
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.clear_upcoming();
    }

    /// Clips waiting behind the current one
    pub fn upcoming_len(&self) -> usize {
        self.pending.len() + usize::from(self.next.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.next.is_none() && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FormatRequirements;

    fn clip(id: &str) -> Arc<AudioAsset> {
        Arc::new(AudioAsset::from_bytes(id, vec![0u8], None, FormatRequirements::default()))
    }

    fn resolved_id(queue: &mut ClipQueue, replay: bool) -> Option<String> {
        queue.resolve_next(replay).map(|c| c.id().to_string())
    }

    #[test]
    fn test_pending_is_fifo() {
        let mut queue = ClipQueue::new();
        queue.set_current(Some(clip("a")));
        queue.enqueue(clip("b"));
        queue.enqueue(clip("c"));
        assert_eq!(queue.upcoming_len(), 2);

        assert_eq!(resolved_id(&mut queue, false).as_deref(), Some("b"));
        assert_eq!(resolved_id(&mut queue, false).as_deref(), Some("c"));
        assert_eq!(resolved_id(&mut queue, false), None);
    }

    #[test]
    fn test_override_beats_loop_and_pending() {
        let mut queue = ClipQueue::new();
        queue.set_current(Some(clip("a")));
        queue.enqueue(clip("c"));
        queue.set_next(clip("b"));

        assert_eq!(resolved_id(&mut queue, true).as_deref(), Some("b"));
        // Loop replays current ahead of pending
        assert_eq!(resolved_id(&mut queue, true).as_deref(), Some("a"));
        assert_eq!(resolved_id(&mut queue, false).as_deref(), Some("c"));
    }

    #[test]
    fn test_set_next_replaces_previous_override() {
        let mut queue = ClipQueue::new();
        assert!(queue.set_next(clip("x")).is_none());
        let displaced = queue.set_next(clip("y")).unwrap();
        assert_eq!(displaced.id(), "x");
        assert_eq!(queue.upcoming_len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = ClipQueue::new();
        queue.set_current(Some(clip("a")));
        queue.set_next(clip("b"));
        queue.enqueue(clip("c"));

        assert_eq!(queue.clear_upcoming(), 2);
        assert!(queue.current().is_some());
        queue.clear();
        assert!(queue.is_empty());
    }
}
