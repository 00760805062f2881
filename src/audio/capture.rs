//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::source::{AudioSource, CloseHandle, FrameBuffer};
use crate::error::{Result, TalkbackError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

/// Seconds of audio the capture buffer holds before discarding the oldest
/// samples. Protects against a consumer that stops reading.
const BUFFER_CAP_SECS: usize = 30;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers when
/// probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2
/// (stderr). Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List available audio input devices.
///
/// Filters out obviously unusable devices (surround channels, HDMI, etc.)
/// and marks preferred backends with "\[recommended\]".
///
/// # Errors
/// Returns `TalkbackError::Capture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| TalkbackError::Capture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{} [recommended]", name));
            } else {
                names.push(name);
            }
        }
    }

    Ok(names)
}

/// Pick the best default input device, preferring PipeWire/PulseAudio so the
/// desktop's device selection is respected.
fn best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| TalkbackError::DeviceUnavailable {
                device: "default".to_string(),
            })
    })
}

/// Find a device by its exact name.
fn device_by_name(name: &str) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| TalkbackError::Capture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

        for device in devices {
            if let Ok(dev_name) = device.name()
                && dev_name == name
            {
                return Ok(device);
            }
        }

        Err(TalkbackError::DeviceUnavailable {
            device: name.to_string(),
        })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by the source and only touched from the
/// thread that currently owns the source; it never crosses thread
/// boundaries while in use.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture source backed by CPAL.
///
/// Captures 16-bit PCM at the configured rate. Tries i16 and f32 at the
/// target rate first; falls back to the device's native config with software
/// channel mixing and resampling. The device is claimed by `open` and
/// released when the source drops (or on `open` failure).
pub struct CpalAudioSource {
    device_name: Option<String>,
    sample_rate: u32,
    frame_size: usize,
    stream: Option<SendableStream>,
    buffer: Arc<FrameBuffer>,
}

impl CpalAudioSource {
    pub fn new(device_name: Option<&str>, sample_rate: u32, frame_size: usize) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            sample_rate,
            frame_size,
            stream: None,
            buffer: FrameBuffer::new(sample_rate as usize * BUFFER_CAP_SECS),
        }
    }

    fn device_label(&self) -> String {
        self.device_name.clone().unwrap_or_else(|| "default".into())
    }

    /// Build a stream at the target rate, mono.
    ///
    /// Tries i16 first (zero-copy path), then f32 for devices that only
    /// expose float formats.
    fn build_preferred_stream(&self, device: &cpal::Device) -> Option<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("talkback: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                buffer.push(data);
            },
            err_callback,
            None,
        ) {
            return Some(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    buffer.push(&converted);
                },
                err_callback,
                None,
            )
            .ok()
    }

    /// Build a stream at the device's native config, converting in software.
    ///
    /// Handles PipeWire-ALSA setups that accept non-native configs but never
    /// fire the data callback.
    fn build_native_stream(&self, device: &cpal::Device) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            device
                .default_input_config()
                .map_err(|e| TalkbackError::UnsupportedFormat {
                    device: self.device_label(),
                    detail: format!("failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        eprintln!(
            "talkback: using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            eprintln!("talkback: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);

        match default_config.sample_format() {
            SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let converted =
                            mix_to_mono_and_resample(data, native_channels, native_rate, target_rate);
                        buffer.push(&converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| TalkbackError::UnsupportedFormat {
                    device: self.device_label(),
                    detail: format!("failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let as_i16: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let converted = mix_to_mono_and_resample(
                            &as_i16,
                            native_channels,
                            native_rate,
                            target_rate,
                        );
                        buffer.push(&converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| TalkbackError::UnsupportedFormat {
                    device: self.device_label(),
                    detail: format!("failed to build native f32 stream: {}", e),
                }),
            fmt => Err(TalkbackError::UnsupportedFormat {
                device: self.device_label(),
                detail: format!("unsupported native sample format {:?}", fmt),
            }),
        }
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn mix_to_mono_and_resample(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    let mono: Vec<i16> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    if source_rate == target_rate {
        mono
    } else {
        crate::audio::wav::resample(&mono, source_rate, target_rate)
    }
}

impl AudioSource for CpalAudioSource {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(()); // Already open
        }

        // Re-opening after a close needs a fresh buffer; old close handles
        // keep pointing at the retired one.
        if self.buffer.is_closed() {
            self.buffer = FrameBuffer::new(self.sample_rate as usize * BUFFER_CAP_SECS);
        }

        let device = match &self.device_name {
            Some(name) => device_by_name(name)?,
            None => best_default_device()?,
        };

        let stream = match self.build_preferred_stream(&device) {
            Some(stream) => stream,
            None => self.build_native_stream(&device)?,
        };

        stream.play().map_err(|e| TalkbackError::DeviceUnavailable {
            device: format!("{} ({})", self.device_label(), e),
        })?;

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<i16>> {
        self.buffer.read_exact(self.frame_size)
    }

    fn close_handle(&self) -> CloseHandle {
        self.buffer.close_handle()
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        self.buffer.close();
        if let Some(stream) = self.stream.take() {
            // Pause errors on teardown are not actionable.
            let _ = stream.0.pause();
        }
    }
}

/// Factory producing [`CpalAudioSource`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalSourceFactory;

impl crate::audio::source::SourceFactory for CpalSourceFactory {
    fn create(
        &self,
        device: Option<&str>,
        sample_rate: u32,
        frame_size: usize,
    ) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(CpalAudioSource::new(device, sample_rate, frame_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_unusable_devices() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn recognizes_preferred_devices() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn mixes_stereo_to_mono() {
        let stereo = vec![100i16, 200, 300, 500];
        let mono = mix_to_mono_and_resample(&stereo, 2, 16000, 16000);
        assert_eq!(mono, vec![150, 400]);
    }

    #[test]
    fn mono_same_rate_is_passthrough() {
        let samples = vec![1i16, 2, 3];
        assert_eq!(mix_to_mono_and_resample(&samples, 1, 16000, 16000), samples);
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn lists_at_least_one_device() {
        let devices = list_devices().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn open_read_close_cycle() {
        let mut source = CpalAudioSource::new(None, 16000, 1024);
        source.open().expect("open failed");
        let frame = source.read_frame().expect("read failed");
        assert_eq!(frame.len(), 1024);
        source.close_handle().close();
        assert!(matches!(
            source.read_frame(),
            Err(TalkbackError::SourceClosed)
        ));
    }

    #[test]
    fn unknown_device_name_fails_unavailable() {
        let mut source = CpalAudioSource::new(Some("NoSuchDevice12345"), 16000, 1024);
        match source.open() {
            Err(TalkbackError::DeviceUnavailable { device }) => {
                assert_eq!(device, "NoSuchDevice12345");
            }
            Err(TalkbackError::Capture { .. }) => {
                // Enumeration itself can fail on machines with no audio stack.
            }
            other => panic!("expected DeviceUnavailable, got {:?}", other.map(|_| ())),
        }
    }
}
