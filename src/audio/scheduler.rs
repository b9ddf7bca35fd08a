//! Gapless fragment scheduling.
//!
//! Each submitted fragment gets a ticket (sequence number + generation) at
//! arrival. Decoding happens on worker threads and may finish in any order;
//! the timeline only schedules ticket `n` once every ticket before it has
//! been scheduled or dropped, so playback order is arrival order.

use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use super::decoder::decode_fragment;
use super::mixer::OutputSink;
use super::{AudioFragment, PcmBuffer, PlaybackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Nothing is playing and nothing is left to schedule: the active set
    /// emptied, or the last outstanding fragments were all dropped.
    Ended,
}

pub type PlaybackListener = Arc<dyn Fn(PlaybackEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    seq: u64,
    generation: u64,
}

/// Timeline cursor, reorder buffer and active playback set.
#[derive(Default)]
struct Timeline {
    next_seq: u64,
    next_to_schedule: u64,
    generation: u64,
    /// Decoded (or failed, `None`) fragments waiting for their turn
    ready: BTreeMap<u64, Option<PcmBuffer>>,
    next_start: f64,
    active: HashSet<PlaybackId>,
}

impl Timeline {
    fn admit(&mut self) -> Ticket {
        let ticket = Ticket {
            seq: self.next_seq,
            generation: self.generation,
        };
        self.next_seq += 1;
        ticket
    }

    /// Record a finished decode and schedule everything now in order.
    /// Returns true when dropped fragments left the timeline drained with
    /// nothing playing, so no voice will ever report the end.
    fn complete(
        &mut self,
        ticket: Ticket,
        buffer: Option<PcmBuffer>,
        sink: &dyn OutputSink,
    ) -> bool {
        if ticket.generation != self.generation || ticket.seq < self.next_to_schedule {
            debug!("Dropping stale fragment #{}", ticket.seq);
            return false;
        }
        self.ready.insert(ticket.seq, buffer);

        let mut dropped = false;
        while let Some(entry) = self.ready.remove(&self.next_to_schedule) {
            self.next_to_schedule += 1;
            let Some(buffer) = entry else {
                dropped = true;
                continue;
            };
            let duration = buffer.duration();
            let (id, started) = sink.start(buffer, self.next_start.max(sink.now()));
            self.next_start = started + duration;
            self.active.insert(id);
        }
        dropped && self.active.is_empty() && self.next_to_schedule == self.next_seq
    }

    /// Returns true when this removal emptied the active set.
    fn finish(&mut self, id: PlaybackId) -> bool {
        self.active.remove(&id) && self.active.is_empty()
    }

    fn reset(&mut self, sink: &dyn OutputSink) {
        self.generation += 1;
        for id in self.active.drain() {
            sink.stop(id);
        }
        self.ready.clear();
        self.next_to_schedule = self.next_seq;
        self.next_start = 0.0;
    }
}

struct DecodeJob {
    ticket: Ticket,
    fragment: AudioFragment,
}

struct Shared {
    timeline: Mutex<Timeline>,
    jobs: Mutex<VecDeque<DecodeJob>>,
    job_signal: Condvar,
    shutdown: AtomicBool,
    sink: Arc<dyn OutputSink>,
    listener: PlaybackListener,
}

impl Shared {
    fn decode_and_complete(&self, job: DecodeJob) {
        let buffer = match decode_fragment(&job.fragment, self.sink.sample_rate()) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                warn!("Dropping fragment #{}: {}", job.ticket.seq, e);
                None
            }
        };
        let drained = self
            .timeline
            .lock()
            .complete(job.ticket, buffer, self.sink.as_ref());
        if drained {
            (self.listener)(PlaybackEvent::Ended);
        }
    }

    fn on_finished(&self, id: PlaybackId) {
        let ended = self.timeline.lock().finish(id);
        if ended {
            (self.listener)(PlaybackEvent::Ended);
        }
    }
}

fn run_decode_worker(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut jobs = shared.jobs.lock();
            while jobs.is_empty() && !shared.shutdown.load(Ordering::SeqCst) {
                shared.job_signal.wait(&mut jobs);
            }
            if shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            match jobs.pop_front() {
                Some(job) => job,
                None => continue,
            }
        };
        shared.decode_and_complete(job);
    }
}

pub struct FragmentScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl FragmentScheduler {
    /// `workers == 0` decodes on the submitting thread.
    pub fn new(sink: Arc<dyn OutputSink>, workers: usize, listener: PlaybackListener) -> Self {
        let shared = Arc::new(Shared {
            timeline: Mutex::new(Timeline::default()),
            jobs: Mutex::new(VecDeque::new()),
            job_signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
            sink: sink.clone(),
            listener,
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        sink.set_finished_listener(Arc::new(move |id: PlaybackId| {
            if let Some(shared) = weak.upgrade() {
                shared.on_finished(id);
            }
        }));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = shared.clone();
            match std::thread::Builder::new()
                .name(format!("orbit-decode-{}", i))
                .spawn(move || run_decode_worker(shared))
            {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to spawn decode worker: {}", e),
            }
        }

        Self {
            shared,
            workers: handles,
        }
    }

    /// Queue a fragment for decode and in-order scheduling.
    pub fn submit(&self, fragment: AudioFragment) {
        let ticket = self.shared.timeline.lock().admit();
        let job = DecodeJob { ticket, fragment };

        if self.workers.is_empty() {
            self.shared.decode_and_complete(job);
            return;
        }
        self.shared.jobs.lock().push_back(job);
        self.shared.job_signal.notify_one();
    }

    /// Halt everything and rewind the timeline. Decodes still in flight are
    /// discarded when they finish. `Ended` is not emitted.
    pub fn stop_all(&self) {
        self.shared.jobs.lock().clear();
        self.shared.timeline.lock().reset(self.shared.sink.as_ref());
    }

    /// Scheduled end of the last scheduled fragment, in sink seconds
    #[cfg(test)]
    pub fn next_start(&self) -> f64 {
        self.shared.timeline.lock().next_start
    }

    pub fn is_playing(&self) -> bool {
        !self.shared.timeline.lock().active.is_empty()
    }

    /// Fragments submitted but not yet scheduled or dropped
    pub fn pending(&self) -> usize {
        let timeline = self.shared.timeline.lock();
        (timeline.next_seq - timeline.next_to_schedule) as usize
    }
}

impl Drop for FragmentScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.job_signal.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::tests::pcm_fragment;
    use crate::audio::mixer::{FinishedListener, Mixer};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// Sink with a fixed clock that records every start
    #[derive(Default)]
    struct RecordingSink {
        clock: Mutex<f64>,
        /// How far past the requested time playback really begins
        lag: Mutex<f64>,
        starts: Mutex<Vec<(usize, f64)>>,
        stopped: Mutex<Vec<PlaybackId>>,
    }

    impl OutputSink for RecordingSink {
        fn sample_rate(&self) -> u32 {
            1000
        }
        fn now(&self) -> f64 {
            *self.clock.lock()
        }
        fn start(&self, buffer: PcmBuffer, at: f64) -> (PlaybackId, f64) {
            let mut starts = self.starts.lock();
            starts.push((buffer.samples.len(), at));
            (starts.len() as PlaybackId - 1, at + *self.lag.lock())
        }
        fn stop(&self, id: PlaybackId) {
            self.stopped.lock().push(id);
        }
        fn set_finished_listener(&self, _listener: FinishedListener) {}
    }

    fn buffer(frames: usize) -> Option<PcmBuffer> {
        Some(PcmBuffer::new(vec![0.1; frames], 1000))
    }

    fn counting_listener() -> (PlaybackListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let listener: PlaybackListener = Arc::new(move |_: PlaybackEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn out_of_order_decodes_schedule_in_arrival_order() {
        let sink = RecordingSink::default();
        let mut timeline = Timeline::default();
        let first = timeline.admit();
        let second = timeline.admit();
        let third = timeline.admit();

        timeline.complete(third, buffer(300), &sink);
        timeline.complete(second, buffer(200), &sink);
        assert!(sink.starts.lock().is_empty());

        timeline.complete(first, buffer(100), &sink);
        let starts = sink.starts.lock().clone();
        assert_eq!(starts.iter().map(|s| s.0).collect::<Vec<_>>(), vec![100, 200, 300]);
        assert!((starts[1].1 - 0.1).abs() < 1e-9);
        assert!((starts[2].1 - 0.3).abs() < 1e-9);
        assert!((timeline.next_start - 0.6).abs() < 1e-9);
    }

    #[test]
    fn failed_decode_neither_advances_nor_stalls() {
        let sink = RecordingSink::default();
        let mut timeline = Timeline::default();
        let broken = timeline.admit();
        let good = timeline.admit();

        assert!(!timeline.complete(good, buffer(500), &sink));
        assert!(!timeline.complete(broken, None, &sink));

        let starts = sink.starts.lock().clone();
        assert_eq!(starts, vec![(500, 0.0)]);
        assert!((timeline.next_start - 0.5).abs() < 1e-9);
    }

    #[test]
    fn late_arrivals_start_at_the_clock_and_cursor_never_decreases() {
        let sink = RecordingSink::default();
        let mut timeline = Timeline::default();

        let t = timeline.admit();
        timeline.complete(t, buffer(100), &sink);
        let before = timeline.next_start;

        *sink.clock.lock() = 2.0;
        let t = timeline.admit();
        timeline.complete(t, buffer(100), &sink);

        assert!(timeline.next_start >= before);
        assert!((sink.starts.lock()[1].1 - 2.0).abs() < 1e-9);
        assert!((timeline.next_start - 2.1).abs() < 1e-9);
    }

    #[test]
    fn cursor_follows_the_time_the_sink_actually_used() {
        let sink = RecordingSink::default();
        *sink.lag.lock() = 0.05;
        let mut timeline = Timeline::default();

        let first = timeline.admit();
        let second = timeline.admit();
        timeline.complete(first, buffer(100), &sink);
        assert!((timeline.next_start - 0.15).abs() < 1e-9);

        timeline.complete(second, buffer(100), &sink);
        assert!((sink.starts.lock()[1].1 - 0.15).abs() < 1e-9);
        assert!((timeline.next_start - 0.3).abs() < 1e-9);
    }

    #[test]
    fn turn_of_undecodable_fragments_still_drains() {
        let sink = RecordingSink::default();
        let mut timeline = Timeline::default();
        let first = timeline.admit();
        let second = timeline.admit();

        assert!(!timeline.complete(first, None, &sink));
        assert!(timeline.complete(second, None, &sink));
        assert!(sink.starts.lock().is_empty());
        assert_eq!(timeline.next_start, 0.0);
    }

    #[test]
    fn undecodable_fragment_reports_ended_when_nothing_plays() {
        let mixer = Arc::new(Mixer::new(10));
        let (listener, ended) = counting_listener();
        let scheduler = FragmentScheduler::new(mixer.clone(), 0, listener);

        scheduler.submit(AudioFragment::new("audio/pcm;rate=24000", "***"));
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.pending(), 0);

        // While something plays, the end comes from the mixer instead
        scheduler.submit(pcm_fragment(5, 10, 1000));
        scheduler.submit(AudioFragment::new("audio/pcm;rate=24000", "***"));
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        let mut out = vec![0.0; 5];
        mixer.render(&mut out, 1);
        assert_eq!(ended.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reset_stops_active_and_discards_old_generation() {
        let sink = RecordingSink::default();
        let mut timeline = Timeline::default();
        let played = timeline.admit();
        let in_flight = timeline.admit();
        timeline.complete(played, buffer(100), &sink);

        timeline.reset(&sink);
        assert_eq!(*sink.stopped.lock(), vec![0]);
        assert!(timeline.active.is_empty());
        assert_eq!(timeline.next_start, 0.0);

        timeline.complete(in_flight, buffer(100), &sink);
        assert_eq!(sink.starts.lock().len(), 1);

        let fresh = timeline.admit();
        timeline.complete(fresh, buffer(100), &sink);
        assert_eq!(sink.starts.lock().len(), 2);
    }

    #[test]
    fn ended_fires_once_after_back_to_back_fragments() {
        let mixer = Arc::new(Mixer::new(10));
        let (listener, ended) = counting_listener();
        let scheduler = FragmentScheduler::new(mixer.clone(), 0, listener);

        scheduler.submit(pcm_fragment(12, 10, 1000));
        scheduler.submit(pcm_fragment(8, 10, 1000));
        assert!((scheduler.next_start() - 2.0).abs() < 1e-9);
        assert!(scheduler.is_playing());

        let mut out = vec![0.0; 12];
        mixer.render(&mut out, 1);
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 1);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_playing());
        assert!((mixer.now() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn stop_all_silences_without_ending() {
        let mixer = Arc::new(Mixer::new(10));
        let (listener, ended) = counting_listener();
        let scheduler = FragmentScheduler::new(mixer.clone(), 0, listener);

        scheduler.submit(pcm_fragment(10, 10, 1000));
        scheduler.stop_all();

        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.next_start(), 0.0);
        assert_eq!(mixer.active_voices(), 0);

        let mut out = vec![1.0; 10];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn worker_pool_spans_the_sum_of_durations() {
        let mixer = Arc::new(Mixer::new(1000));
        let (listener, _) = counting_listener();
        let scheduler = FragmentScheduler::new(mixer.clone(), 3, listener);

        let lengths = [120usize, 35, 480, 7, 250, 90];
        for frames in lengths {
            scheduler.submit(pcm_fragment(frames, 1000, 500));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.pending() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(scheduler.pending(), 0);

        let total: usize = lengths.iter().sum();
        assert!((scheduler.next_start() - total as f64 / 1000.0).abs() < 1e-9);
        assert_eq!(mixer.active_voices(), lengths.len());
    }
}
