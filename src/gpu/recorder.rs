//! Barrier bookkeeping for the one-queue recorded-then-flushed command
//! stream (§4.5 "Command stream", §8 "Barrier sufficiency"). This is pure
//! bookkeeping over abstract buffer handles; the `ash`-backed `Recorder` in
//! `gpu::mod` drives it and turns the returned handles into actual
//! `vkCmdPipelineBarrier` calls.

use std::collections::HashSet;

pub type BufferHandle = usize;

/// Tracks which buffers have a pending (not yet barrier-cleared) write from
/// an already-queued shader in the current, unflushed command stream.
#[derive(Debug, Default)]
pub struct BarrierTracker {
    active_writes: HashSet<BufferHandle>,
}

impl BarrierTracker {
    pub fn new() -> Self {
        BarrierTracker { active_writes: HashSet::new() }
    }

    /// Registers a shader about to be queued. `reads` is every buffer the
    /// shader reads (storage or uniform); `writes` is every buffer it
    /// writes. Returns, in the order `reads` was given, each buffer that
    /// needs a `bufferMemoryBarrier` emitted before this dispatch — i.e.
    /// every read that is still in the active-writes set. Barrier-cleared
    /// buffers are removed from the set; this shader's writes are then
    /// added to it.
    pub fn queue_shader(&mut self, reads: &[BufferHandle], writes: &[BufferHandle]) -> Vec<BufferHandle> {
        let mut needs_barrier = Vec::new();
        for &buffer in reads {
            if self.active_writes.remove(&buffer) {
                needs_barrier.push(buffer);
            }
        }
        for &buffer in writes {
            self.active_writes.insert(buffer);
        }
        needs_barrier
    }

    pub fn active_writes(&self) -> &HashSet<BufferHandle> {
        &self.active_writes
    }

    /// Called by `flushQueue`: a flush imposes a full happens-before, so no
    /// buffer can still have a pending write afterwards.
    pub fn flush(&mut self) {
        self.active_writes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_of_a_pending_write_requires_a_barrier() {
        let mut tracker = BarrierTracker::new();
        assert!(tracker.queue_shader(&[], &[1]).is_empty());
        let barriers = tracker.queue_shader(&[1], &[2]);
        assert_eq!(barriers, vec![1]);
    }

    #[test]
    fn barrier_cleared_buffer_is_not_re_barriered() {
        let mut tracker = BarrierTracker::new();
        tracker.queue_shader(&[], &[1]);
        tracker.queue_shader(&[1], &[]);
        // buffer 1 was cleared by the previous barrier; reading it again
        // with no intervening write needs no new barrier.
        assert!(tracker.queue_shader(&[1], &[]).is_empty());
    }

    #[test]
    fn read_of_a_buffer_nobody_wrote_needs_no_barrier() {
        let mut tracker = BarrierTracker::new();
        assert!(tracker.queue_shader(&[42], &[]).is_empty());
    }

    #[test]
    fn flush_clears_the_active_writes_set() {
        let mut tracker = BarrierTracker::new();
        tracker.queue_shader(&[], &[1, 2, 3]);
        assert_eq!(tracker.active_writes().len(), 3);
        tracker.flush();
        assert!(tracker.active_writes().is_empty());
    }

    #[test]
    fn chain_of_three_shaders_barriers_each_read_after_write_exactly_once() {
        let mut tracker = BarrierTracker::new();
        // S1 writes buffer A.
        assert!(tracker.queue_shader(&[], &[1]).is_empty());
        // S2 reads A, writes B: needs a barrier on A.
        assert_eq!(tracker.queue_shader(&[1], &[2]), vec![1]);
        // S3 reads B (pending from S2) and A (already cleared): only B needs one.
        assert_eq!(tracker.queue_shader(&[2, 1], &[]), vec![2]);
    }
}
