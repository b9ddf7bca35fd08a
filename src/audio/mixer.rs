//! Software mixer and the output sink seam.
//!
//! The mixer owns the playback clock. Every buffer started on it is a "voice"
//! pinned to an absolute frame; `render` sums whatever voices overlap the
//! rendered window and reports the ones that have run out.

use parking_lot::Mutex;
use std::sync::Arc;

use super::decoder::resample_linear;
use super::{PcmBuffer, PlaybackId};

pub type FinishedListener = Arc<dyn Fn(PlaybackId) + Send + Sync>;

/// Shared audio destination every scheduled fragment plays into
pub trait OutputSink: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Current playback clock in seconds
    fn now(&self) -> f64;

    /// Begin playing `buffer` at clock time `at`. Returns the handle and the
    /// clock time playback actually starts at, which is never before `now`.
    fn start(&self, buffer: PcmBuffer, at: f64) -> (PlaybackId, f64);

    /// Halt a voice immediately. It is not reported as finished.
    fn stop(&self, id: PlaybackId);

    /// Called for every voice that plays to its end
    fn set_finished_listener(&self, listener: FinishedListener);
}

struct Voice {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Default)]
struct MixerState {
    clock: u64,
    next_id: PlaybackId,
    voices: Vec<Voice>,
    scratch: Vec<f32>,
}

pub struct Mixer {
    sample_rate: u32,
    state: Mutex<MixerState>,
    listener: Mutex<Option<FinishedListener>>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            state: Mutex::new(MixerState::default()),
            listener: Mutex::new(None),
        }
    }

    /// Fill `out` (interleaved, `channels` wide) and advance the clock.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        let finished: Vec<PlaybackId> = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let window_start = state.clock;
            let window_end = window_start + frames as u64;

            state.scratch.clear();
            state.scratch.resize(frames, 0.0);

            for voice in &state.voices {
                let from = voice.start_frame.max(window_start);
                let to = voice.end_frame().min(window_end);
                if from >= to {
                    continue;
                }
                let src = &voice.samples
                    [(from - voice.start_frame) as usize..(to - voice.start_frame) as usize];
                let dst = &mut state.scratch
                    [(from - window_start) as usize..(to - window_start) as usize];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }

            for (frame, sample) in out.chunks_mut(channels).zip(&state.scratch) {
                frame.fill(sample.clamp(-1.0, 1.0));
            }
            // Trailing partial frame, if any
            let tail = frames * channels;
            out[tail..].fill(0.0);

            state.clock = window_end;
            let mut done = Vec::new();
            state.voices.retain(|voice| {
                if voice.end_frame() <= window_end {
                    done.push(voice.id);
                    false
                } else {
                    true
                }
            });
            done
        };

        if finished.is_empty() {
            return;
        }
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            for id in finished {
                listener(id);
            }
        }
    }

    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }
}

impl OutputSink for Mixer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn now(&self) -> f64 {
        self.state.lock().clock as f64 / self.sample_rate as f64
    }

    /// A start time already in the past begins at the current clock.
    fn start(&self, buffer: PcmBuffer, at: f64) -> (PlaybackId, f64) {
        let samples = if buffer.sample_rate == self.sample_rate {
            buffer.samples
        } else {
            resample_linear(&buffer.samples, buffer.sample_rate, self.sample_rate)
        };
        let requested = (at.max(0.0) * self.sample_rate as f64).round() as u64;

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let start_frame = requested.max(state.clock);
        state.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        (id, start_frame as f64 / self.sample_rate as f64)
    }

    fn stop(&self, id: PlaybackId) {
        self.state.lock().voices.retain(|voice| voice.id != id);
    }

    fn set_finished_listener(&self, listener: FinishedListener) {
        *self.listener.lock() = Some(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, value: f32, rate: u32) -> PcmBuffer {
        PcmBuffer::new(vec![value; frames], rate)
    }

    #[test]
    fn voices_play_at_their_scheduled_frame() {
        let mixer = Mixer::new(100);
        mixer.start(tone(10, 0.5, 100), 0.05);

        let mut out = vec![0.0; 20];
        mixer.render(&mut out, 1);
        assert!(out[..5].iter().all(|s| *s == 0.0));
        assert!(out[5..15].iter().all(|s| *s == 0.5));
        assert!(out[15..].iter().all(|s| *s == 0.0));
        assert!((mixer.now() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn overlapping_voices_are_summed_and_copied_to_every_channel() {
        let mixer = Mixer::new(10);
        mixer.start(tone(4, 0.25, 10), 0.0);
        mixer.start(tone(4, 0.25, 10), 0.0);

        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn finished_voices_are_reported_once() {
        let mixer = Mixer::new(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mixer.set_finished_listener(Arc::new(move |id: PlaybackId| sink.lock().push(id)));

        let (first, _) = mixer.start(tone(3, 0.1, 10), 0.0);
        let (second, _) = mixer.start(tone(3, 0.1, 10), 0.3);

        let mut out = vec![0.0; 3];
        mixer.render(&mut out, 1);
        assert_eq!(*seen.lock(), vec![first]);
        mixer.render(&mut out, 1);
        assert_eq!(*seen.lock(), vec![first, second]);
        mixer.render(&mut out, 1);
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn stopped_voices_fall_silent_without_finishing() {
        let mixer = Mixer::new(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mixer.set_finished_listener(Arc::new(move |id: PlaybackId| sink.lock().push(id)));

        let (id, _) = mixer.start(tone(5, 0.9, 10), 0.0);
        mixer.stop(id);

        let mut out = vec![1.0; 5];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn late_start_is_clamped_to_the_clock() {
        let mixer = Mixer::new(10);
        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);

        let (_, started) = mixer.start(tone(2, 0.5, 10), 0.0);
        assert!((started - 1.0).abs() < 1e-9);
        let mut out = vec![0.0; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.5, 0.5]);
    }
}
