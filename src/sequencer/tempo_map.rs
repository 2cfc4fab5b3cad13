// Tempo map - Ordered tempo and time signature changes
//
// The map is edited on the control thread and handed to the audio thread as a
// whole; the audio thread only ever reads it. Every edit rebuilds the cached
// segment starts (beats, ticks, bars) so that lookups stay O(log n).

use super::clock::MusicalClock;
use super::timeline::{SamplePosition, Tempo, TimeSignature};
use super::TimelineError;
use serde::{Deserialize, Serialize};

/// Tempo change taking effect at a sample position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    pub at_sample: SamplePosition,
    pub tempo: Tempo,
}

impl TempoEvent {
    pub fn new(at_sample: SamplePosition, bpm: f64) -> Result<Self, TimelineError> {
        Ok(Self {
            at_sample,
            tempo: Tempo::new(bpm)?,
        })
    }
}

/// Time signature change taking effect at a bar boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignatureEvent {
    pub at_sample: SamplePosition,
    pub time_signature: TimeSignature,
}

/// Either kind of map event, used by merged range queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineEvent {
    Tempo(TempoEvent),
    TimeSignature(TimeSignatureEvent),
}

impl TimelineEvent {
    pub fn at_sample(&self) -> SamplePosition {
        match self {
            TimelineEvent::Tempo(event) => event.at_sample,
            TimelineEvent::TimeSignature(event) => event.at_sample,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TempoSegment {
    pub event: TempoEvent,
    /// Beats elapsed from the origin to `event.at_sample`
    pub start_beats: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MeterSegment {
    pub event: TimeSignatureEvent,
    /// Ticks elapsed from the origin to `event.at_sample`
    pub start_ticks: u64,
    /// Index of the bar that starts at `event.at_sample`
    pub start_bar: u64,
}

/// Tempo and time signature map
///
/// Both lanes always hold an event at sample 0, starting from the values
/// the map was created with. Between events the value is constant; past the
/// last event it extends indefinitely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TempoMapState", into = "TempoMapState")]
pub struct TempoMap {
    sample_rate: f64,
    tempos: Vec<TempoSegment>,
    meters: Vec<MeterSegment>,
    /// Restored when the event at sample 0 is removed
    default_tempo: Tempo,
    default_time_signature: TimeSignature,
}

impl TempoMap {
    /// Create a map with the default 120 BPM, 4/4 at sample 0
    pub fn new(sample_rate: f64) -> Result<Self, TimelineError> {
        Self::with_initial(sample_rate, Tempo::default(), TimeSignature::default())
    }

    /// Create a map with the given tempo and time signature at sample 0
    pub fn with_initial(
        sample_rate: f64,
        tempo: Tempo,
        time_signature: TimeSignature,
    ) -> Result<Self, TimelineError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "sample rate {} must be positive",
                sample_rate
            )));
        }
        if !time_signature.is_valid() {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "invalid time signature {}",
                time_signature
            )));
        }

        Ok(Self {
            sample_rate,
            tempos: vec![TempoSegment {
                event: TempoEvent {
                    at_sample: 0,
                    tempo,
                },
                start_beats: 0.0,
            }],
            meters: vec![MeterSegment {
                event: TimeSignatureEvent {
                    at_sample: 0,
                    time_signature,
                },
                start_ticks: 0,
                start_bar: 0,
            }],
            default_tempo: tempo,
            default_time_signature: time_signature,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Tempo the map was created with
    pub fn default_tempo(&self) -> Tempo {
        self.default_tempo
    }

    /// Time signature the map was created with
    pub fn default_time_signature(&self) -> TimeSignature {
        self.default_time_signature
    }

    /// Musical clock reading this map
    pub fn clock(&self) -> MusicalClock<'_> {
        MusicalClock::new(self)
    }

    /// Tempo in effect at a position
    pub fn tempo_at(&self, position: SamplePosition) -> Tempo {
        self.tempo_segment_at(position).event.tempo
    }

    /// Time signature in effect at a position
    pub fn time_signature_at(&self, position: SamplePosition) -> TimeSignature {
        let index = self
            .meters
            .partition_point(|segment| segment.event.at_sample <= position)
            .saturating_sub(1);
        self.meters[index].event.time_signature
    }

    /// Insert a tempo change, replacing any change at the same sample
    ///
    /// Returns the replaced event, if any.
    pub fn insert_tempo(&mut self, event: TempoEvent) -> Option<TempoEvent> {
        let segment = TempoSegment {
            event,
            start_beats: 0.0,
        };
        let replaced = match self
            .tempos
            .binary_search_by_key(&event.at_sample, |segment| segment.event.at_sample)
        {
            Ok(index) => Some(std::mem::replace(&mut self.tempos[index], segment).event),
            Err(index) => {
                self.tempos.insert(index, segment);
                None
            }
        };
        self.rebuild();
        replaced
    }

    /// Insert a time signature change
    ///
    /// The requested position is snapped forward to the next bar line of the
    /// map as it was before this edit. Returns the event as stored.
    pub fn insert_time_signature(
        &mut self,
        at_sample: SamplePosition,
        time_signature: TimeSignature,
    ) -> Result<TimeSignatureEvent, TimelineError> {
        if !time_signature.is_valid() {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "invalid time signature {}",
                time_signature
            )));
        }

        let snapped = self.clock().next_bar_boundary(at_sample);
        let event = TimeSignatureEvent {
            at_sample: snapped,
            time_signature,
        };
        self.insert_time_signature_at(event);
        Ok(event)
    }

    /// Remove the tempo change at a sample
    ///
    /// Removing the change at sample 0 restores the tempo the map was created
    /// with.
    pub fn remove_tempo(&mut self, at_sample: SamplePosition) -> Option<TempoEvent> {
        let index = self
            .tempos
            .binary_search_by_key(&at_sample, |segment| segment.event.at_sample)
            .ok()?;
        let removed = if index == 0 {
            let previous = self.tempos[0].event;
            self.tempos[0].event.tempo = self.default_tempo;
            previous
        } else {
            self.tempos.remove(index).event
        };
        self.rebuild();
        Some(removed)
    }

    /// Remove the time signature change at a sample
    ///
    /// Removing the change at sample 0 restores the time signature the map
    /// was created with.
    pub fn remove_time_signature(&mut self, at_sample: SamplePosition) -> Option<TimeSignatureEvent> {
        let index = self
            .meters
            .binary_search_by_key(&at_sample, |segment| segment.event.at_sample)
            .ok()?;
        let removed = if index == 0 {
            let previous = self.meters[0].event;
            self.meters[0].event.time_signature = self.default_time_signature;
            previous
        } else {
            self.meters.remove(index).event
        };
        self.rebuild();
        Some(removed)
    }

    /// All tempo events in order
    pub fn tempo_events(&self) -> impl ExactSizeIterator<Item = &TempoEvent> + '_ {
        self.tempos.iter().map(|segment| &segment.event)
    }

    /// All time signature events in order
    pub fn time_signature_events(&self) -> impl ExactSizeIterator<Item = &TimeSignatureEvent> + '_ {
        self.meters.iter().map(|segment| &segment.event)
    }

    /// Tempo events with `start <= at_sample < end`
    pub fn tempo_events_in_range(
        &self,
        start: SamplePosition,
        end: SamplePosition,
    ) -> impl Iterator<Item = &TempoEvent> + '_ {
        let first = self
            .tempos
            .partition_point(|segment| segment.event.at_sample < start);
        let last = self
            .tempos
            .partition_point(|segment| segment.event.at_sample < end)
            .max(first);
        self.tempos[first..last].iter().map(|segment| &segment.event)
    }

    /// Time signature events with `start <= at_sample < end`
    pub fn time_signature_events_in_range(
        &self,
        start: SamplePosition,
        end: SamplePosition,
    ) -> impl Iterator<Item = &TimeSignatureEvent> + '_ {
        let first = self
            .meters
            .partition_point(|segment| segment.event.at_sample < start);
        let last = self
            .meters
            .partition_point(|segment| segment.event.at_sample < end)
            .max(first);
        self.meters[first..last].iter().map(|segment| &segment.event)
    }

    /// Both lanes merged in position order; tempo first on ties
    pub fn events_in_range(&self, start: SamplePosition, end: SamplePosition) -> Vec<TimelineEvent> {
        let mut tempos = self.tempo_events_in_range(start, end).peekable();
        let mut meters = self.time_signature_events_in_range(start, end).peekable();
        let mut events = Vec::new();

        loop {
            let take_tempo = match (tempos.peek(), meters.peek()) {
                (Some(tempo), Some(meter)) => tempo.at_sample <= meter.at_sample,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            if take_tempo {
                if let Some(event) = tempos.next() {
                    events.push(TimelineEvent::Tempo(*event));
                }
            } else if let Some(event) = meters.next() {
                events.push(TimelineEvent::TimeSignature(*event));
            }
        }

        events
    }

    /// Structural check used before the audio thread adopts a map
    pub fn is_consistent(&self) -> bool {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return false;
        }
        if !self.default_tempo.is_valid() || !self.default_time_signature.is_valid() {
            return false;
        }
        let tempos_ok = self.tempos.first().is_some_and(|s| s.event.at_sample == 0)
            && self.tempos.iter().all(|s| s.event.tempo.is_valid() && s.start_beats.is_finite())
            && self.tempos.windows(2).all(|pair| {
                pair[0].event.at_sample < pair[1].event.at_sample
                    && pair[0].start_beats <= pair[1].start_beats
            });
        let meters_ok = self.meters.first().is_some_and(|s| s.event.at_sample == 0)
            && self.meters.iter().all(|s| s.event.time_signature.is_valid())
            && self.meters.windows(2).all(|pair| {
                pair[0].event.at_sample < pair[1].event.at_sample
                    && pair[0].start_ticks <= pair[1].start_ticks
                    && pair[0].start_bar <= pair[1].start_bar
            });
        tempos_ok && meters_ok
    }

    pub(crate) fn tempo_segment_at(&self, position: SamplePosition) -> &TempoSegment {
        let index = self
            .tempos
            .partition_point(|segment| segment.event.at_sample <= position)
            .saturating_sub(1);
        &self.tempos[index]
    }

    pub(crate) fn tempo_segment_at_beats(&self, beats: f64) -> &TempoSegment {
        let index = self
            .tempos
            .partition_point(|segment| segment.start_beats <= beats)
            .saturating_sub(1);
        &self.tempos[index]
    }

    pub(crate) fn meter_segment_at_ticks(&self, ticks: u64) -> &MeterSegment {
        let index = self
            .meters
            .partition_point(|segment| segment.start_ticks <= ticks)
            .saturating_sub(1);
        &self.meters[index]
    }

    pub(crate) fn meter_segment_for_bar(&self, bar: u64) -> &MeterSegment {
        let index = self
            .meters
            .partition_point(|segment| segment.start_bar <= bar)
            .saturating_sub(1);
        &self.meters[index]
    }

    fn insert_time_signature_at(&mut self, event: TimeSignatureEvent) {
        let segment = MeterSegment {
            event,
            start_ticks: 0,
            start_bar: 0,
        };
        match self
            .meters
            .binary_search_by_key(&event.at_sample, |segment| segment.event.at_sample)
        {
            Ok(index) => self.meters[index] = segment,
            Err(index) => self.meters.insert(index, segment),
        }
        self.rebuild();
    }

    /// Recompute cached segment starts from absolute event positions
    fn rebuild(&mut self) {
        let sample_rate = self.sample_rate;
        for index in 1..self.tempos.len() {
            let previous = self.tempos[index - 1];
            let elapsed = (self.tempos[index].event.at_sample - previous.event.at_sample) as f64;
            self.tempos[index].start_beats =
                previous.start_beats + elapsed * previous.event.tempo.beats_per_sample(sample_rate);
        }

        for index in 1..self.meters.len() {
            let previous = self.meters[index - 1];
            let start_ticks = self
                .clock()
                .position_to_ticks(self.meters[index].event.at_sample)
                .max(previous.start_ticks);
            let ticks_per_bar = previous.event.time_signature.ticks_per_bar().max(1);
            // A bar cut short by a later tempo edit still counts as a bar
            let bars = (start_ticks - previous.start_ticks).div_ceil(ticks_per_bar);

            let segment = &mut self.meters[index];
            segment.start_ticks = start_ticks;
            segment.start_bar = previous.start_bar + bars;
        }
    }
}

/// On-disk shape of a tempo map
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TempoMapState {
    sample_rate: f64,
    tempo_events: Vec<TempoEvent>,
    time_signature_events: Vec<TimeSignatureEvent>,
    /// Absent in documents written before the defaults were stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_tempo: Option<Tempo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_time_signature: Option<TimeSignature>,
}

impl TryFrom<TempoMapState> for TempoMap {
    type Error = TimelineError;

    fn try_from(state: TempoMapState) -> Result<Self, Self::Error> {
        let mut map = TempoMap::with_initial(
            state.sample_rate,
            state.default_tempo.unwrap_or_default(),
            state.default_time_signature.unwrap_or_default(),
        )?;
        for event in state.tempo_events {
            map.insert_tempo(event);
        }
        // Stored events were already snapped when they were first inserted
        for event in state.time_signature_events {
            if !event.time_signature.is_valid() {
                return Err(TimelineError::InvalidEventPlacement(format!(
                    "invalid time signature {} at sample {}",
                    event.time_signature, event.at_sample
                )));
            }
            map.insert_time_signature_at(event);
        }
        Ok(map)
    }
}

impl From<TempoMap> for TempoMapState {
    fn from(map: TempoMap) -> Self {
        Self {
            sample_rate: map.sample_rate,
            tempo_events: map.tempo_events().copied().collect(),
            time_signature_events: map.time_signature_events().copied().collect(),
            default_tempo: Some(map.default_tempo),
            default_time_signature: Some(map.default_time_signature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 48000.0;

    #[test]
    fn test_default_map() {
        let map = TempoMap::new(SAMPLE_RATE).unwrap();
        assert_eq!(map.tempo_at(0).bpm(), 120.0);
        assert_eq!(map.tempo_at(u64::MAX / 2).bpm(), 120.0);
        assert_eq!(map.time_signature_at(1_000_000), TimeSignature::four_four());
        assert_eq!(map.tempo_events().len(), 1);
        assert!(map.is_consistent());
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        assert!(TempoMap::new(0.0).is_err());
        assert!(TempoMap::new(-44100.0).is_err());
        assert!(TempoMap::new(f64::NAN).is_err());
    }

    #[test]
    fn test_tempo_value_at() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        map.insert_tempo(TempoEvent::new(96000, 90.0).unwrap());
        map.insert_tempo(TempoEvent::new(192000, 140.0).unwrap());

        assert_eq!(map.tempo_at(95999).bpm(), 120.0);
        assert_eq!(map.tempo_at(96000).bpm(), 90.0);
        assert_eq!(map.tempo_at(150000).bpm(), 90.0);
        assert_eq!(map.tempo_at(192000).bpm(), 140.0);
        assert_eq!(map.tempo_at(10_000_000).bpm(), 140.0);
    }

    #[test]
    fn test_insert_at_same_sample_replaces() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        assert!(map.insert_tempo(TempoEvent::new(1000, 100.0).unwrap()).is_none());
        let replaced = map.insert_tempo(TempoEvent::new(1000, 140.0).unwrap());

        assert_eq!(replaced.map(|e| e.tempo.bpm()), Some(100.0));
        assert_eq!(map.tempo_events().len(), 2);
        assert_eq!(map.tempo_at(1000).bpm(), 140.0);
    }

    #[test]
    fn test_remove_tempo() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        map.insert_tempo(TempoEvent::new(0, 90.0).unwrap());
        map.insert_tempo(TempoEvent::new(5000, 150.0).unwrap());

        assert_eq!(map.remove_tempo(5000).map(|e| e.at_sample), Some(5000));
        assert!(map.remove_tempo(5000).is_none());
        assert_eq!(map.tempo_at(6000).bpm(), 90.0);

        // The origin event falls back to the default instead of disappearing
        assert!(map.remove_tempo(0).is_some());
        assert_eq!(map.tempo_events().len(), 1);
        assert_eq!(map.tempo_at(0).bpm(), 120.0);
    }

    #[test]
    fn test_remove_origin_restores_initial_values() {
        let mut map = TempoMap::with_initial(
            SAMPLE_RATE,
            Tempo::new(90.0).unwrap(),
            TimeSignature::three_four(),
        )
        .unwrap();
        map.insert_tempo(TempoEvent::new(0, 150.0).unwrap());
        map.insert_time_signature(0, TimeSignature::six_eight())
            .unwrap();
        assert_eq!(map.tempo_at(0).bpm(), 150.0);

        map.remove_tempo(0).unwrap();
        map.remove_time_signature(0).unwrap();
        assert_eq!(map.tempo_at(0).bpm(), 90.0);
        assert_eq!(map.time_signature_at(0), TimeSignature::three_four());

        // The creation values survive serialisation
        let ron_text = ron::to_string(&map).unwrap();
        let mut restored: TempoMap = ron::from_str(&ron_text).unwrap();
        assert_eq!(restored, map);
        restored.insert_tempo(TempoEvent::new(0, 170.0).unwrap());
        restored.remove_tempo(0).unwrap();
        assert_eq!(restored.tempo_at(0).bpm(), 90.0);
    }

    #[test]
    fn test_time_signature_snaps_to_next_bar() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();

        // One 4/4 bar at 120 BPM = 96000 samples
        let stored = map
            .insert_time_signature(50_000, TimeSignature::three_four())
            .unwrap();
        assert_eq!(stored.at_sample, 96_000);
        assert_eq!(map.time_signature_at(95_999), TimeSignature::four_four());
        assert_eq!(map.time_signature_at(96_000), TimeSignature::three_four());
    }

    #[test]
    fn test_time_signature_on_bar_line_is_kept() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        let stored = map
            .insert_time_signature(192_000, TimeSignature::six_eight())
            .unwrap();
        assert_eq!(stored.at_sample, 192_000);
    }

    #[test]
    fn test_time_signature_snap_uses_pre_edit_meter() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        map.insert_time_signature(0, TimeSignature::three_four()).unwrap();

        // 3/4 bars are 72000 samples; 100000 lies in bar 1 which ends at 144000
        let stored = map
            .insert_time_signature(100_000, TimeSignature::four_four())
            .unwrap();
        assert_eq!(stored.at_sample, 144_000);
    }

    #[test]
    fn test_invalid_time_signature_leaves_map_unchanged() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        let before = map.clone();
        let bogus = TimeSignature {
            beats_per_bar: 0,
            beat_unit: 4,
        };
        assert!(map.insert_time_signature(1000, bogus).is_err());
        assert_eq!(map, before);
    }

    #[test]
    fn test_events_in_range() {
        let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
        map.insert_tempo(TempoEvent::new(96_000, 100.0).unwrap());
        map.insert_tempo(TempoEvent::new(300_000, 80.0).unwrap());
        map.insert_time_signature(96_000, TimeSignature::three_four()).unwrap();

        let events = map.events_in_range(1, 300_000);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TimelineEvent::Tempo(e) if e.at_sample == 96_000));
        assert!(matches!(events[1], TimelineEvent::TimeSignature(e) if e.at_sample == 96_000));

        let tempos: Vec<_> = map.tempo_events_in_range(0, u64::MAX).collect();
        assert_eq!(tempos.len(), 3);
        assert_eq!(map.tempo_events_in_range(500, 400).count(), 0);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut map = TempoMap::new(44100.0).unwrap();
        map.insert_tempo(TempoEvent::new(44100, 133.5).unwrap());
        map.insert_time_signature(10, TimeSignature::new(7, 8).unwrap()).unwrap();

        let text = ron::to_string(&map).unwrap();
        let restored: TempoMap = ron::from_str(&text).unwrap();
        assert_eq!(restored, map);
    }

    #[test]
    fn test_deserialize_rejects_bad_tempo() {
        let text = "(sample_rate: 48000.0, tempo_events: [(at_sample: 0, tempo: -5.0)], time_signature_events: [])";
        assert!(ron::from_str::<TempoMap>(text).is_err());
    }
}
