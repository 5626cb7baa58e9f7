//! What happens when playback runs off the end of the timeline.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use vjstudio_core::{Result, SceneEndPolicy, VjError};

/// Scene selection, owned by the host application.
pub trait SceneNavigator: Send {
    fn current_scene_id(&self) -> Option<String>;

    /// Select the next scene. Returns its id.
    fn play_next_scene(&mut self) -> Result<String>;

    /// Select a random scene other than the current one. Returns its id.
    fn play_random_scene(&mut self) -> Result<String>;
}

/// Ordered scene list with wrap-around navigation.
pub struct SceneList<R: Rng = StdRng> {
    scenes: Vec<String>,
    current: usize,
    rng: R,
}

impl SceneList<StdRng> {
    pub fn new(scenes: Vec<String>) -> Self {
        Self::with_rng(scenes, StdRng::from_entropy())
    }
}

impl<R: Rng> SceneList<R> {
    pub fn with_rng(scenes: Vec<String>, rng: R) -> Self {
        Self {
            scenes,
            current: 0,
            rng,
        }
    }

    pub fn scenes(&self) -> &[String] {
        &self.scenes
    }

    /// Make `scene_id` current.
    pub fn select(&mut self, scene_id: &str) -> Result<()> {
        self.current = self
            .scenes
            .iter()
            .position(|s| s == scene_id)
            .ok_or_else(|| VjError::NotFound(format!("scene {}", scene_id)))?;
        Ok(())
    }

    fn ensure_not_empty(&self) -> Result<()> {
        if self.scenes.is_empty() {
            return Err(VjError::Collaborator("scene list is empty".into()));
        }
        Ok(())
    }
}

impl<R: Rng + Send> SceneNavigator for SceneList<R> {
    fn current_scene_id(&self) -> Option<String> {
        self.scenes.get(self.current).cloned()
    }

    fn play_next_scene(&mut self) -> Result<String> {
        self.ensure_not_empty()?;
        self.current = (self.current + 1) % self.scenes.len();
        Ok(self.scenes[self.current].clone())
    }

    fn play_random_scene(&mut self) -> Result<String> {
        self.ensure_not_empty()?;
        let len = self.scenes.len();
        if len > 1 {
            // Draw from the other len - 1 scenes.
            let pick = self.rng.gen_range(0..len - 1);
            self.current = if pick >= self.current { pick + 1 } else { pick };
        }
        Ok(self.scenes[self.current].clone())
    }
}

/// Follow-up the session must perform after a scene end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEndAction {
    /// Stay stopped.
    Stop,
    /// Rewind to zero and play again after the settle delay.
    Loop,
    /// Load this scene and play it after the settle delay.
    SwitchScene(String),
    /// The navigator failed; stay stopped and report this status.
    Failed(String),
    /// Already handled for this run.
    Ignored,
}

/// Applies the scene-end policy exactly once per playback run.
#[derive(Debug)]
pub struct SceneEndMachine {
    policy: SceneEndPolicy,
    fired: bool,
}

impl SceneEndMachine {
    pub fn new(policy: SceneEndPolicy) -> Self {
        Self {
            policy,
            fired: false,
        }
    }

    pub fn policy(&self) -> SceneEndPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SceneEndPolicy) {
        self.policy = policy;
    }

    /// A new run started.
    pub fn arm(&mut self) {
        self.fired = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Playback reached the end.
    pub fn on_end(&mut self, navigator: &mut dyn SceneNavigator) -> SceneEndAction {
        if self.fired {
            return SceneEndAction::Ignored;
        }
        self.fired = true;
        info!("Scene end, policy {:?}", self.policy);

        let switched = match self.policy {
            SceneEndPolicy::Stop => return SceneEndAction::Stop,
            SceneEndPolicy::Loop => return SceneEndAction::Loop,
            SceneEndPolicy::PlayNext => navigator.play_next_scene(),
            SceneEndPolicy::Random => navigator.play_random_scene(),
        };
        match switched {
            Ok(scene_id) => SceneEndAction::SwitchScene(scene_id),
            Err(e) => {
                warn!("Scene navigation failed: {}", e);
                SceneEndAction::Failed(format!("Scene navigation failed: {}", e))
            }
        }
    }
}
