// Metronome - Click track plugin driven by the per-block time snapshot
// Pre-generates its click sounds and schedules them on beat boundaries

use super::time_sync::TimeSnapshot;
use super::TimeSyncPlugin;
use crate::sequencer::timeline::{MusicalPosition, TICKS_PER_BEAT};
use std::f32::consts::PI;

/// Beats closer than this to a boundary count as on it
const BEAT_EPSILON: f64 = 1e-6;

/// Clicks one block can hold
const MAX_CLICKS_PER_BLOCK: usize = 32;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Click on first beat of bar (accent/downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

/// Metronome click sound generator
/// Pre-generates short click samples for low CPU overhead
#[derive(Debug, Clone)]
pub struct MetronomeSound {
    accent_samples: Vec<f32>,
    regular_samples: Vec<f32>,
}

impl MetronomeSound {
    const CLICK_DURATION_MS: f32 = 10.0;

    pub fn new(sample_rate: f32) -> Self {
        let click_samples = ((Self::CLICK_DURATION_MS / 1000.0) * sample_rate) as usize;

        Self {
            accent_samples: Self::generate_click(sample_rate, click_samples, 1200.0, 0.6),
            regular_samples: Self::generate_click(sample_rate, click_samples, 800.0, 0.4),
        }
    }

    /// Sine burst with an exponential decay
    fn generate_click(
        sample_rate: f32,
        num_samples: usize,
        frequency: f32,
        amplitude: f32,
    ) -> Vec<f32> {
        let phase_increment = 2.0 * PI * frequency / sample_rate;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * 8.0).exp();
                (i as f32 * phase_increment).sin() * envelope * amplitude
            })
            .collect()
    }

    pub fn get_click(&self, click_type: ClickType) -> &[f32] {
        match click_type {
            ClickType::Accent => &self.accent_samples,
            ClickType::Regular => &self.regular_samples,
        }
    }

    pub fn click_duration(&self) -> usize {
        self.accent_samples.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct ClickPlayback {
    click_type: ClickType,
    position: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledClick {
    frame: usize,
    click_type: ClickType,
}

/// Metronome as a time-synced plugin
///
/// Everything it knows about time comes from the snapshot it is handed each
/// block; it never reads or writes transport state.
#[derive(Debug, Clone)]
pub struct MetronomePlugin {
    sound: MetronomeSound,
    enabled: bool,
    volume: f32,
    current_click: Option<ClickPlayback>,
    scheduled: [Option<ScheduledClick>; MAX_CLICKS_PER_BLOCK],
    scheduled_len: usize,
}

impl MetronomePlugin {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sound: MetronomeSound::new(sample_rate),
            enabled: true,
            volume: 0.5,
            current_click: None,
            scheduled: [None; MAX_CLICKS_PER_BLOCK],
            scheduled_len: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.current_click = None;
            self.scheduled_len = 0;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set metronome volume (0.0 to 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Clicks scheduled for the current block as (frame, type)
    pub fn scheduled_clicks(&self) -> impl Iterator<Item = (usize, ClickType)> + '_ {
        self.scheduled[..self.scheduled_len]
            .iter()
            .flatten()
            .map(|click| (click.frame, click.click_type))
    }

    fn schedule(&mut self, frame: usize, click_type: ClickType) {
        if self.scheduled_len < MAX_CLICKS_PER_BLOCK {
            self.scheduled[self.scheduled_len] = Some(ScheduledClick { frame, click_type });
            self.scheduled_len += 1;
        }
    }

    /// Schedule the beats falling in frames `[from, to)` of the block
    ///
    /// `start_beats` and `start_musical` describe the timeline at frame `from`.
    fn schedule_segment(
        &mut self,
        from: usize,
        to: usize,
        start_beats: f64,
        start_musical: MusicalPosition,
        samples_per_beat: f64,
        beats_per_bar: u32,
    ) {
        let beats_per_bar = beats_per_bar.max(1) as f64;
        let into_bar =
            start_musical.beat as f64 + start_musical.tick as f64 / TICKS_PER_BEAT as f64;
        let bar_start_beats = start_beats - into_bar;

        let mut beat = (start_beats - BEAT_EPSILON).ceil().max(0.0);
        loop {
            let frame = from + ((beat - start_beats).max(0.0) * samples_per_beat).round() as usize;
            if frame >= to {
                break;
            }
            let beat_in_bar = (beat - bar_start_beats).round().rem_euclid(beats_per_bar);
            let click_type = if beat_in_bar == 0.0 {
                ClickType::Accent
            } else {
                ClickType::Regular
            };
            self.schedule(frame, click_type);
            beat += 1.0;
        }
    }

    fn next_sample(&mut self) -> f32 {
        let Some(playback) = self.current_click.as_mut() else {
            return 0.0;
        };
        let click = self.sound.get_click(playback.click_type);
        if playback.position < click.len() {
            let sample = click[playback.position] * self.volume;
            playback.position += 1;
            sample
        } else {
            self.current_click = None;
            0.0
        }
    }
}

impl TimeSyncPlugin for MetronomePlugin {
    fn name(&self) -> &str {
        "Metronome"
    }

    fn receive_time_snapshot(&mut self, snapshot: &TimeSnapshot) {
        self.scheduled_len = 0;
        if !self.enabled || !snapshot.is_playing() {
            self.current_click = None;
            return;
        }

        let frames = snapshot.block_frames();
        let samples_per_beat = snapshot.samples_per_beat();
        let beats_per_bar = snapshot.time_signature().beats_per_bar as u32;

        match snapshot.loop_back() {
            Some(loop_back) => {
                self.schedule_segment(
                    0,
                    loop_back.frames_before_wrap,
                    snapshot.block_start_beats(),
                    snapshot.block_start_musical(),
                    samples_per_beat,
                    beats_per_bar,
                );
                if let (Some(beats), Some(musical)) =
                    (snapshot.loop_start_beats(), snapshot.loop_start_musical())
                {
                    self.schedule_segment(
                        loop_back.frames_before_wrap,
                        frames,
                        beats,
                        musical,
                        samples_per_beat,
                        beats_per_bar,
                    );
                }
            }
            None => self.schedule_segment(
                0,
                frames,
                snapshot.block_start_beats(),
                snapshot.block_start_musical(),
                samples_per_beat,
                beats_per_bar,
            ),
        }
    }

    fn process_block(&mut self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut next = 0;
        for (frame, samples) in output.chunks_mut(channels).enumerate() {
            while next < self.scheduled_len {
                match self.scheduled[next] {
                    Some(click) if click.frame == frame => {
                        self.current_click = Some(ClickPlayback {
                            click_type: click.click_type,
                            position: 0,
                        });
                        next += 1;
                    }
                    _ => break,
                }
            }

            let sample = self.next_sample();
            for out in samples.iter_mut() {
                *out += sample;
            }
        }
    }

    fn reset(&mut self) {
        self.current_click = None;
        self.scheduled_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::playhead::LoopRegion;
    use crate::sequencer::tempo_map::TempoMap;
    use crate::sequencer::transport::Transport;

    const SAMPLE_RATE: f64 = 48000.0;

    fn transport() -> Transport {
        Transport::new(Box::new(TempoMap::new(SAMPLE_RATE).unwrap()))
    }

    #[test]
    fn test_metronome_sound_generation() {
        let sound = MetronomeSound::new(48000.0);

        // 10ms at 48kHz = 480 samples
        assert_eq!(sound.click_duration(), 480);

        let accent_peak = sound
            .get_click(ClickType::Accent)
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        let regular_peak = sound
            .get_click(ClickType::Regular)
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(accent_peak > regular_peak);
    }

    #[test]
    fn test_clicks_on_beats_inside_block() {
        let mut metronome = MetronomePlugin::new(SAMPLE_RATE as f32);
        let mut transport = transport();
        transport.seek(23_000);
        transport.play();

        // Block 23000..25048 contains beat 1 at sample 24000
        let snapshot = transport.advance(2048);
        metronome.receive_time_snapshot(&snapshot);

        let clicks: Vec<_> = metronome.scheduled_clicks().collect();
        assert_eq!(clicks, vec![(1000, ClickType::Regular)]);
    }

    #[test]
    fn test_downbeat_is_accented() {
        let mut metronome = MetronomePlugin::new(SAMPLE_RATE as f32);
        let mut transport = transport();
        transport.play();

        let snapshot = transport.advance(512);
        metronome.receive_time_snapshot(&snapshot);
        assert_eq!(
            metronome.scheduled_clicks().collect::<Vec<_>>(),
            vec![(0, ClickType::Accent)]
        );
    }

    #[test]
    fn test_no_clicks_while_stopped() {
        let mut metronome = MetronomePlugin::new(SAMPLE_RATE as f32);
        let mut transport = transport();

        let snapshot = transport.advance(48000);
        metronome.receive_time_snapshot(&snapshot);
        assert_eq!(metronome.scheduled_clicks().count(), 0);
    }

    #[test]
    fn test_loop_wrap_restarts_grid() {
        let mut metronome = MetronomePlugin::new(SAMPLE_RATE as f32);
        let mut transport = transport();
        // Loop over bar 0; wrap lands on the downbeat again
        transport.set_loop_region(LoopRegion::new(0, 96_000).unwrap());
        transport.set_loop_enabled(true);
        transport.seek(95_000);
        transport.play();

        let snapshot = transport.advance(2000);
        metronome.receive_time_snapshot(&snapshot);
        assert_eq!(
            metronome.scheduled_clicks().collect::<Vec<_>>(),
            vec![(1000, ClickType::Accent)]
        );
    }

    #[test]
    fn test_process_block_mixes_click_into_all_channels() {
        let mut metronome = MetronomePlugin::new(SAMPLE_RATE as f32);
        metronome.set_volume(1.0);
        let mut transport = transport();
        transport.play();

        let snapshot = transport.advance(64);
        metronome.receive_time_snapshot(&snapshot);

        let mut output = vec![0.0f32; 64 * 2];
        metronome.process_block(&mut output, 2);

        // Frame 1 carries the first non-zero click sample on both channels
        assert_ne!(output[2], 0.0);
        assert_eq!(output[2], output[3]);
    }

    #[test]
    fn test_volume_clamped() {
        let mut metronome = MetronomePlugin::new(SAMPLE_RATE as f32);
        metronome.set_volume(2.0);
        assert_eq!(metronome.volume(), 1.0);
        metronome.set_volume(-1.0);
        assert_eq!(metronome.volume(), 0.0);
    }
}
