//! A logging playback device.
//!
//! The headless player has no audio output; the deck models per-track
//! transport state (position, playing flag) and logs every action so
//! synchronization behavior can be observed from a terminal. Position
//! advances in real time while a track is playing.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use chorus_core::{DeviceError, LocalTrackState, PlaybackDevice, TrackId};

#[derive(Debug, Clone)]
struct Slot {
    /// Position at the last transport action, in seconds.
    position: f64,
    /// Set while the track is nominally playing.
    started_at: Option<Instant>,
}

impl Slot {
    fn new() -> Self {
        Self {
            position: 0.0,
            started_at: None,
        }
    }

    fn current_position(&self) -> f64 {
        match self.started_at {
            Some(started) => self.position + started.elapsed().as_secs_f64(),
            None => self.position,
        }
    }
}

/// Simulated multi-track deck backing the reconciliation engine.
pub struct LogDeck {
    slots: Mutex<BTreeMap<TrackId, Slot>>,
}

impl LogDeck {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replaces the track list from a `filesList` message, keeping
    /// transport state for tracks that survive the refresh.
    pub fn load_tracks(&self, files: Vec<TrackId>) {
        let mut slots = self.slots.lock();
        let mut next = BTreeMap::new();
        for file in files {
            let slot = slots.remove(&file).unwrap_or_else(Slot::new);
            next.insert(file, slot);
        }
        *slots = next;
        log::info!("[Deck] Loaded {} track(s)", slots.len());
    }

    /// Current position of a track, for reporting pause/seek upward.
    pub fn position(&self, track: &TrackId) -> Option<f64> {
        self.slots.lock().get(track).map(Slot::current_position)
    }
}

impl Default for LogDeck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackDevice for LogDeck {
    fn track_ids(&self) -> Vec<TrackId> {
        self.slots.lock().keys().cloned().collect()
    }

    async fn play(&self, track: &TrackId) -> Result<(), DeviceError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(track)
            .ok_or_else(|| DeviceError::UnknownTrack(track.clone()))?;
        if slot.started_at.is_none() {
            slot.started_at = Some(Instant::now());
        }
        log::info!("[Deck] ▶ {} @ {:.1}s", track, slot.position);
        Ok(())
    }

    async fn pause(&self, track: &TrackId) -> Result<(), DeviceError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(track)
            .ok_or_else(|| DeviceError::UnknownTrack(track.clone()))?;
        if slot.started_at.take().is_some() {
            slot.position = slot.current_position();
        }
        log::info!("[Deck] ⏸ {} @ {:.1}s", track, slot.position);
        Ok(())
    }

    async fn seek(&self, track: &TrackId, seconds: f64) -> Result<(), DeviceError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(track)
            .ok_or_else(|| DeviceError::UnknownTrack(track.clone()))?;
        slot.position = seconds;
        if slot.started_at.is_some() {
            slot.started_at = Some(Instant::now());
        }
        log::debug!("[Deck] seek {} -> {:.1}s", track, seconds);
        Ok(())
    }

    async fn active_track(&self) -> Option<LocalTrackState> {
        let slots = self.slots.lock();

        // Prefer the playing track; fall back to the furthest-advanced
        // paused one so paused state can still be handed off.
        let playing = slots
            .iter()
            .find(|(_, slot)| slot.started_at.is_some())
            .map(|(track, slot)| LocalTrackState {
                filename: track.clone(),
                time: slot.current_position(),
                is_playing: true,
            });
        if playing.is_some() {
            return playing;
        }

        slots
            .iter()
            .filter(|(_, slot)| slot.position > 0.0)
            .max_by(|a, b| a.1.position.total_cmp(&b.1.position))
            .map(|(track, slot)| LocalTrackState {
                filename: track.clone(),
                time: slot.position,
                is_playing: false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn play_on_unknown_track_is_refused() {
        let deck = LogDeck::new();
        deck.load_tracks(vec!["a.mp3".into()]);
        assert!(deck.play(&"missing.mp3".into()).await.is_err());
    }

    #[tokio::test]
    async fn pause_freezes_position_after_seek() {
        let deck = LogDeck::new();
        deck.load_tracks(vec!["a.mp3".into()]);
        let track: TrackId = "a.mp3".into();

        deck.seek(&track, 30.0).await.unwrap();
        deck.play(&track).await.unwrap();
        deck.pause(&track).await.unwrap();

        let pos = deck.position(&track).unwrap();
        assert!(pos >= 30.0);
    }

    #[tokio::test]
    async fn active_track_prefers_the_playing_slot() {
        let deck = LogDeck::new();
        deck.load_tracks(vec!["a.mp3".into(), "b.mp3".into()]);

        deck.seek(&"a.mp3".into(), 50.0).await.unwrap();
        deck.play(&"b.mp3".into()).await.unwrap();

        let active = deck.active_track().await.unwrap();
        assert_eq!(active.filename, "b.mp3");
        assert!(active.is_playing);
    }

    #[tokio::test]
    async fn active_track_falls_back_to_paused_progress() {
        let deck = LogDeck::new();
        deck.load_tracks(vec!["a.mp3".into(), "b.mp3".into()]);

        deck.seek(&"a.mp3".into(), 12.0).await.unwrap();

        let active = deck.active_track().await.unwrap();
        assert_eq!(active.filename, "a.mp3");
        assert!(!active.is_playing);
        assert!((active.time - 12.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reload_keeps_surviving_slots() {
        let deck = LogDeck::new();
        deck.load_tracks(vec!["a.mp3".into(), "b.mp3".into()]);
        deck.seek(&"a.mp3".into(), 9.0).await.unwrap();

        deck.load_tracks(vec!["a.mp3".into(), "c.mp3".into()]);
        assert_eq!(deck.position(&"a.mp3".into()), Some(9.0));
        assert_eq!(deck.position(&"b.mp3".into()), None);
    }
}
