//! WAV file audio source for pipe mode and tests.

use crate::audio::source::{AudioSource, CloseHandle, FrameBuffer};
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, TalkbackError};
use std::io::Read;
use std::sync::Arc;

/// Audio source backed by WAV file data.
///
/// Accepts arbitrary rates and channel counts, normalizing to 16kHz mono.
/// Finite: once the samples run out, `read_frame` fails with `SourceClosed`.
pub struct WavAudioSource {
    samples: Vec<i16>,
    frame_size: usize,
    buffer: Arc<FrameBuffer>,
}

impl WavAudioSource {
    /// Parse WAV data from any reader.
    pub fn from_reader(reader: Box<dyn Read + Send>, frame_size: usize) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| TalkbackError::Capture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels;

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TalkbackError::Capture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let mono_samples = if source_channels == 2 {
            raw_samples
                .chunks_exact(2)
                .map(|pair| {
                    let left = pair[0] as i32;
                    let right = pair[1] as i32;
                    ((left + right) / 2) as i16
                })
                .collect()
        } else {
            raw_samples
        };

        let samples = if source_rate != SAMPLE_RATE {
            resample(&mono_samples, source_rate, SAMPLE_RATE)
        } else {
            mono_samples
        };

        Ok(Self {
            samples,
            frame_size,
            buffer: FrameBuffer::new(usize::MAX),
        })
    }

    /// Parse WAV data from stdin.
    pub fn from_stdin(frame_size: usize) -> Result<Self> {
        use std::io::Cursor;

        // Read all data into memory first (StdinLock is not Send)
        let mut data = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut data)
            .map_err(|e| TalkbackError::Capture {
                message: format!("Failed to read from stdin: {}", e),
            })?;

        Self::from_reader(Box::new(Cursor::new(data)), frame_size)
    }

    /// Consume the source and return all samples as a single buffer.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    /// Total number of normalized samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AudioSource for WavAudioSource {
    fn open(&mut self) -> Result<()> {
        self.buffer.push(&self.samples);
        self.buffer.finish();
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<i16>> {
        self.buffer.read_exact(self.frame_size)
    }

    fn close_handle(&self) -> CloseHandle {
        self.buffer.close_handle()
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn parses_16khz_mono_unchanged() {
        let input = vec![100i16, 200, 300, 400, 500];
        let wav = make_wav_data(16000, 1, &input);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav)), 1024).unwrap();
        assert_eq!(source.into_samples(), input);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let stereo = vec![100i16, 200, 300, 400, 500, 600];
        let wav = make_wav_data(16000, 2, &stereo);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav)), 1024).unwrap();
        assert_eq!(source.into_samples(), vec![150i16, 350, 550]);
    }

    #[test]
    fn resamples_48khz_to_16khz() {
        let input = vec![0i16; 48000]; // 1 second at 48kHz
        let wav = make_wav_data(48000, 1, &input);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav)), 1024).unwrap();
        let len = source.len();
        assert!((15900..=16100).contains(&len), "got {} samples", len);
    }

    #[test]
    fn resamples_44100hz_preserving_levels() {
        let input = vec![1000i16; 44100];
        let wav = make_wav_data(44100, 1, &input);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav)), 1024).unwrap();
        let samples = source.into_samples();
        assert!((15900..=16100).contains(&samples.len()));
        assert!(samples.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    fn reads_frames_until_closed() {
        let input = vec![1i16; 2500];
        let wav = make_wav_data(16000, 1, &input);

        let mut source = WavAudioSource::from_reader(Box::new(Cursor::new(wav)), 1000).unwrap();
        source.open().unwrap();

        assert_eq!(source.read_frame().unwrap().len(), 1000);
        assert_eq!(source.read_frame().unwrap().len(), 1000);
        // 500-sample tail is below a frame: hard cut.
        assert!(matches!(
            source.read_frame(),
            Err(TalkbackError::SourceClosed)
        ));
    }

    #[test]
    fn rejects_garbage_data() {
        let result =
            WavAudioSource::from_reader(Box::new(Cursor::new(vec![0u8; 16])), 1024);
        assert!(result.is_err());
    }

    #[test]
    fn resample_identity_when_rates_match() {
        let samples = vec![5i16, 10, 15];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }
}
