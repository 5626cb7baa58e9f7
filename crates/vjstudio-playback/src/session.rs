//! The frame-driven playback session.
//!
//! Ties the store, drag controller, scheduler, sync engine and scene-end
//! machine together. Everything runs on the caller's thread: each call to
//! [`PlaybackSession::frame`] performs, in order,
//!
//! 1. drain inbound messages (modulation, transport, probe results),
//! 2. start a deferred play once its settle delay has passed,
//! 3. advance the scheduler,
//! 4. reconcile media elements,
//! 5. broadcast the tick,
//! 6. handle a scene end,
//! 7. persist the scene if anything changed.
//!
//! Edits made between frames are persisted by the next frame or by
//! [`PlaybackSession::shutdown`].

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vjstudio_core::{
    EventBus, InboundMessage, ModulationTarget, ParamModulation, Result, SceneEndPolicy, Tick,
    TimelineConfig, TimelineEvent, TransportCommand, VjError,
};
use vjstudio_timeline::{
    DragController, DropPayload, EditCommand, EditOutcome, EditProposal, ResizeSide, Selection,
    TrackStorage, TrackStore,
};

use crate::probe::{DurationProbe, ProbeWorker};
use crate::scene_end::{SceneEndAction, SceneEndMachine, SceneNavigator};
use crate::scheduler::{PlaybackScheduler, PlaybackState, StopOutcome};
use crate::sync::MediaSyncEngine;

pub struct PlaybackSession {
    config: TimelineConfig,
    store: TrackStore,
    selection: Selection,
    drag: DragController,
    scheduler: PlaybackScheduler,
    sync: MediaSyncEngine,
    scene_end: SceneEndMachine,
    navigator: Box<dyn SceneNavigator>,
    bus: Arc<EventBus>,
    inbox_tx: Sender<InboundMessage>,
    inbox_rx: Receiver<InboundMessage>,
    prober: Option<ProbeWorker>,
    /// Deferred `play()` after a loop or scene switch.
    pending_play: Option<Instant>,
}

impl PlaybackSession {
    pub fn new(
        config: TimelineConfig,
        storage: impl TrackStorage + 'static,
        sync: MediaSyncEngine,
        navigator: impl SceneNavigator + 'static,
    ) -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        let mut scheduler = PlaybackScheduler::new(config.rewind_window());
        let mut store = TrackStore::new(storage);
        store.set_deferred_persistence(true);
        scheduler.set_duration(store.duration());
        Self {
            drag: DragController::new(&config),
            scene_end: SceneEndMachine::new(config.end_policy),
            config,
            store,
            selection: Selection::new(),
            scheduler,
            sync,
            navigator: Box::new(navigator),
            bus: Arc::new(EventBus::new()),
            inbox_tx,
            inbox_rx,
            prober: None,
            pending_play: None,
        }
    }

    /// Start a background duration probe for dropped audio clips.
    pub fn with_probe(mut self, probe: impl DurationProbe) -> Result<Self> {
        self.prober = Some(ProbeWorker::spawn(probe, self.inbox_tx.clone())?);
        Ok(self)
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Sender for collaborators' inbound messages.
    pub fn inbox(&self) -> Sender<InboundMessage> {
        self.inbox_tx.clone()
    }

    pub fn playback(&self) -> PlaybackState {
        self.scheduler.state()
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn drag_mut(&mut self) -> &mut DragController {
        &mut self.drag
    }

    pub fn sync(&self) -> &MediaSyncEngine {
        &self.sync
    }

    pub fn set_end_policy(&mut self, policy: SceneEndPolicy) {
        self.config.end_policy = policy;
        self.scene_end.set_policy(policy);
    }

    pub fn has_pending_play(&self) -> bool {
        self.pending_play.is_some()
    }

    // ── Scenes ──────────────────────────────────────────────────

    /// Load a scene's tracks and park the playhead at zero.
    pub fn open_scene(&mut self, scene_id: &str) {
        self.drag.cancel();
        self.store.load_scene(scene_id);
        self.selection.clear();
        self.scheduler.set_duration(self.store.duration());
        self.scheduler.set_time(0.0);
        self.bus.publish(TimelineEvent::SceneChanged {
            scene_id: scene_id.to_string(),
        });
        self.bus.publish(TimelineEvent::Tick(self.scheduler.tick()));
    }

    /// Open whatever scene the navigator has selected.
    pub fn open_current_scene(&mut self) -> Result<()> {
        let scene_id = self
            .navigator
            .current_scene_id()
            .ok_or_else(|| VjError::Collaborator("no scene selected".into()))?;
        self.open_scene(&scene_id);
        Ok(())
    }

    // ── Editing ─────────────────────────────────────────────────

    /// Commit an edit through the store and follow up on what it changed.
    pub fn apply_edit(&mut self, command: &EditCommand) -> Result<EditOutcome> {
        let outcome = self.store.apply(command)?;
        self.selection.prune(&outcome.removed);
        self.scheduler.set_duration(self.store.duration());
        Ok(outcome)
    }

    /// Commit a controller proposal: the edit, selection focus, and any
    /// duration probe.
    pub fn commit(&mut self, proposal: EditProposal) -> Result<EditOutcome> {
        let outcome = self.apply_edit(&proposal.command)?;
        if let Some((track_id, clip_id)) = proposal.focus {
            if self.selection.contains(clip_id) {
                self.selection.focus(track_id, clip_id);
            } else {
                self.selection.select(track_id, clip_id);
            }
        }
        self.selection.sync_with(self.store.tracks());
        if let Some(request) = proposal.probe {
            match &self.prober {
                Some(prober) if prober.request(request.clone()) => {
                    debug!("Queued duration probe for clip {}", request.clip_id)
                }
                _ => debug!("No duration probe for clip {}", request.clip_id),
            }
        }
        Ok(outcome)
    }

    pub fn pointer_down(
        &mut self,
        track_id: Uuid,
        clip_id: Uuid,
        x: f64,
        additive: bool,
    ) -> Result<()> {
        self.drag.pointer_down(
            self.store.tracks(),
            &mut self.selection,
            track_id,
            clip_id,
            x,
            additive,
        )
    }

    pub fn pointer_down_edge(
        &mut self,
        track_id: Uuid,
        clip_id: Uuid,
        side: ResizeSide,
    ) -> Result<()> {
        self.drag.pointer_down_edge(
            self.store.tracks(),
            &mut self.selection,
            track_id,
            clip_id,
            side,
        )
    }

    pub fn pointer_move(&mut self, x: f64, target_track: Option<Uuid>, modifier: bool) {
        self.drag
            .pointer_move(self.store.tracks(), x, target_track, modifier);
    }

    /// Finish a gesture. `Ok(None)` means nothing changed; a rejected
    /// placement is returned as an error with the store untouched.
    pub fn pointer_up(
        &mut self,
        x: f64,
        target_track: Option<Uuid>,
        modifier: bool,
    ) -> Result<Option<EditOutcome>> {
        let proposal = self
            .drag
            .pointer_up(self.store.tracks(), x, target_track, modifier)
            .map_err(|e| {
                debug!("Drag rejected: {}", e);
                e
            })?;
        proposal.map(|p| self.commit(p)).transpose()
    }

    pub fn pointer_leave(&mut self) {
        self.drag.cancel();
    }

    /// Handle an `application/json` drop onto a track.
    pub fn drop_json(
        &mut self,
        json: &str,
        track_id: Uuid,
        x: f64,
        modifier: bool,
    ) -> Result<Option<EditOutcome>> {
        let payload = DropPayload::from_json(json)?;
        let proposal = self
            .drag
            .drop_payload(
                self.store.tracks(),
                &mut self.selection,
                &payload,
                track_id,
                x,
                modifier,
            )
            .map_err(|e| {
                debug!("Drop rejected: {}", e);
                e
            })?;
        proposal.map(|p| self.commit(p)).transpose()
    }

    // ── Transport ───────────────────────────────────────────────

    pub fn play(&mut self, now: Instant) -> bool {
        self.pending_play = None;
        let started = self.scheduler.play(now, self.store.earliest_start());
        if started {
            self.scene_end.arm();
            self.bus.publish(TimelineEvent::Play);
        }
        started
    }

    pub fn stop(&mut self, now: Instant) -> StopOutcome {
        self.pending_play = None;
        let outcome = self.scheduler.stop(now);
        match outcome {
            StopOutcome::Halted => {
                self.sync.stop_all();
                self.bus.publish(TimelineEvent::Stop);
            }
            StopOutcome::Rewound => {
                self.bus.publish(TimelineEvent::Tick(self.scheduler.tick()));
            }
            StopOutcome::Armed => {}
        }
        outcome
    }

    pub fn seek(&mut self, time: f64) -> Tick {
        let was_playing = self.scheduler.is_playing();
        self.pending_play = None;
        let tick = self.scheduler.seek(time);
        if was_playing {
            self.sync.stop_all();
            self.bus.publish(TimelineEvent::Stop);
        }
        self.bus.publish(TimelineEvent::Tick(tick));
        tick
    }

    pub fn handle_command(&mut self, command: TransportCommand, now: Instant) {
        debug!("Transport command {:?}", command);
        match command {
            TransportCommand::PlayPause => {
                if self.scheduler.is_playing() {
                    self.stop(now);
                } else {
                    self.play(now);
                }
            }
            TransportCommand::Stop => {
                self.stop(now);
            }
            TransportCommand::SeekToTime(time) => {
                self.seek(time);
            }
            TransportCommand::StepForward => {
                self.seek(self.scheduler.current_time() + self.config.step_seconds);
            }
            TransportCommand::StepBackward => {
                self.seek(self.scheduler.current_time() - self.config.step_seconds);
            }
            TransportCommand::GoToStart => {
                self.seek(0.0);
            }
            TransportCommand::GoToEnd => {
                self.seek(self.scheduler.duration());
            }
            TransportCommand::ClearTimeline => {
                if let Err(e) = self.apply_edit(&EditCommand::ClearTimeline) {
                    warn!("Failed to clear timeline: {}", e);
                }
            }
        }
    }

    // ── Frame loop ──────────────────────────────────────────────

    /// Run one frame. Returns the tick produced while playing.
    pub fn frame(&mut self, now: Instant) -> Option<Tick> {
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle_message(message, now);
        }
        if self.pending_play.is_some_and(|at| now >= at) {
            self.play(now);
        }

        let advance = self.scheduler.frame(now, self.store.earliest_start());

        let snapshot = self.scheduler.state().snapshot();
        self.sync
            .on_tick(self.store.tracks(), snapshot.current_time, snapshot.is_playing);

        if let Some(advance) = advance {
            self.bus.publish(TimelineEvent::Tick(advance.tick));
            if advance.reached_end {
                self.handle_scene_end(now);
            }
        }
        self.store.flush();
        advance.map(|a| a.tick)
    }

    /// Stop everything and release media and worker threads.
    pub fn shutdown(&mut self) {
        self.pending_play = None;
        self.drag.cancel();
        self.scheduler.shutdown();
        self.sync.shutdown();
        self.store.flush();
        if let Some(mut prober) = self.prober.take() {
            prober.shutdown();
        }
        info!("Playback session shut down");
    }

    fn handle_message(&mut self, message: InboundMessage, now: Instant) {
        let command = match message {
            InboundMessage::Command(command) => {
                self.handle_command(command, now);
                return;
            }
            InboundMessage::Modulate(modulation) => match modulation_command(&modulation) {
                Some(command) => command,
                None => {
                    debug!("Modulation for clip {} has no target", modulation.clip_id);
                    return;
                }
            },
            InboundMessage::ModulateBatch { clip_id, params } => EditCommand::Batch(
                params
                    .into_iter()
                    .map(|(name, value)| EditCommand::SetParam {
                        clip_id,
                        name,
                        value,
                    })
                    .collect(),
            ),
            InboundMessage::DurationProbed { clip_id, duration } => {
                EditCommand::SetClipDuration { clip_id, duration }
            }
        };
        if let Err(e) = self.apply_edit(&command) {
            debug!("Inbound {} dropped: {}", command.label(), e);
        }
    }

    fn handle_scene_end(&mut self, now: Instant) {
        let action = self.scene_end.on_end(self.navigator.as_mut());
        let settle = now + self.config.settle_delay();
        match action {
            SceneEndAction::Stop => {
                self.sync.stop_all();
                self.bus.publish(TimelineEvent::Stop);
            }
            SceneEndAction::Loop => {
                self.scheduler.set_time(0.0);
                self.sync.stop_all();
                self.bus.publish(TimelineEvent::StopAll);
                self.pending_play = Some(settle);
            }
            SceneEndAction::SwitchScene(scene_id) => {
                self.sync.stop_all();
                self.bus.publish(TimelineEvent::StopAll);
                info!("Switching to scene {}", scene_id);
                self.open_scene(&scene_id);
                self.pending_play = Some(settle);
            }
            SceneEndAction::Failed(message) => {
                self.sync.stop_all();
                self.bus.publish(TimelineEvent::Stop);
                self.bus.publish(TimelineEvent::Status { message });
            }
            SceneEndAction::Ignored => {}
        }
    }
}

fn modulation_command(modulation: &ParamModulation) -> Option<EditCommand> {
    let clip_id = modulation.clip_id;
    let value = modulation.value;
    Some(match modulation.target()? {
        ModulationTarget::Param(name) => EditCommand::SetParam {
            clip_id,
            name,
            value,
        },
        ModulationTarget::Opacity => EditCommand::SetOpacity { clip_id, value },
    })
}
