//! Real audio output through cpal.
//!
//! `cpal::Stream` is not `Send` on every host, so the stream is built and kept
//! alive on its own thread. Callers only ever see the `Mixer` it drives.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

use super::mixer::Mixer;
use crate::error::{RelayError, RelayResult};

pub struct DeviceOutput {
    mixer: Arc<Mixer>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceOutput {
    /// Open the named output device, or the system default when `device_name`
    /// is empty.
    pub fn open(device_name: &str) -> RelayResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<RelayResult<Arc<Mixer>>>();

        let name = device_name.trim().to_string();
        let stop = shutdown.clone();
        let thread = std::thread::Builder::new()
            .name("orbit-audio".to_string())
            .spawn(move || {
                let (stream, mixer) = match build_stream(&name) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = tx.send(Err(e.into()));
                    return;
                }
                let _ = tx.send(Ok(mixer));

                while !stop.load(Ordering::SeqCst) {
                    std::thread::park();
                }
                drop(stream);
            })?;

        let mixer = rx
            .recv()
            .map_err(|_| RelayError::AudioDevice("audio thread exited".to_string()))??;

        Ok(Self {
            mixer,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn mixer(&self) -> Arc<Mixer> {
        self.mixer.clone()
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

/// Names of every output device on the default host
pub fn list_output_devices() -> RelayResult<Vec<String>> {
    let host = cpal::default_host();
    #[allow(deprecated)]
    let names = host
        .output_devices()?
        .filter_map(|device| device.name().ok())
        .collect();
    Ok(names)
}

fn find_device(host: &cpal::Host, name: &str) -> RelayResult<cpal::Device> {
    if name.is_empty() {
        return host
            .default_output_device()
            .ok_or_else(|| RelayError::AudioDevice("no default output device".to_string()));
    }
    #[allow(deprecated)]
    let found = host
        .output_devices()?
        .find(|device| device.name().map(|n| n == name).unwrap_or(false));
    found.ok_or_else(|| RelayError::AudioDevice(format!("output device '{}' not found", name)))
}

fn build_stream(device_name: &str) -> RelayResult<(cpal::Stream, Arc<Mixer>)> {
    let host = cpal::default_host();
    let device = find_device(&host, device_name)?;
    let config = device.default_output_config()?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;
    let stream_config: cpal::StreamConfig = config.clone().into();
    let mixer = Arc::new(Mixer::new(sample_rate));

    #[allow(deprecated)]
    let label = device.name().unwrap_or_else(|_| "unknown".to_string());
    info!(
        "Audio output: {} ({} Hz, {} ch, {:?})",
        label,
        sample_rate,
        channels,
        config.sample_format()
    );

    let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let mixer = mixer.clone();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer.render(data, channels);
                },
                err_fn,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            let mixer = mixer.clone();
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    mixer.render(&mut scratch, channels);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = (sample * i16::MAX as f32) as i16;
                    }
                },
                err_fn,
                None,
            )?
        }
        other => {
            warn!("Unsupported output sample format {:?}", other);
            return Err(RelayError::AudioDevice(format!(
                "unsupported sample format {:?}",
                other
            )));
        }
    };

    Ok((stream, mixer))
}
