//! Test doubles shared by the behaviour tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use linebot_hal::ServoChannel;
use linebot_hal::sim::{SimHandles, SimRig};
use linebot_hal::Rig;
use linebot_kernel::{Pacer, SimClock, StopToken};
use linebot_perception::LineScanner;
use linebot_types::{BotError, ScanResult};

use crate::config::RobotConfig;
use crate::steering::SteeringState;

/// Scanner answering from a queue; `not_found` once the queue is empty.
///
/// Optionally spends virtual time per call and raises a stop token on a
/// given call.
#[derive(Clone, Default)]
pub struct ScriptedScanner {
    answers: Arc<Mutex<VecDeque<Result<ScanResult, BotError>>>>,
    calls: Arc<AtomicUsize>,
    cost: Duration,
    stop_on_call: Option<usize>,
    clear_log_on_stop: Option<SimHandles>,
}

impl ScriptedScanner {
    pub fn never_found() -> Self {
        Self::default()
    }

    pub fn answering(answers: impl IntoIterator<Item = Result<ScanResult, BotError>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Every call takes `cost` of (virtual) time.
    pub fn costing(mut self, cost: Duration) -> Self {
        self.cost = cost;
        self
    }

    /// Raise the stop token during call number `call` (1-based) and wipe
    /// the command log so a test sees only what follows the stop.
    pub fn stopping_on(mut self, call: usize, handles: SimHandles) -> Self {
        self.stop_on_call = Some(call);
        self.clear_log_on_stop = Some(handles);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LineScanner for ScriptedScanner {
    fn scan_for_line(
        &mut self,
        _pan: &mut ServoChannel,
        _candidate_angles: &[f32],
        pacer: &Pacer,
    ) -> Result<ScanResult, BotError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.cost.is_zero() {
            pacer.clock().sleep(self.cost);
        }
        if self.stop_on_call == Some(call) {
            pacer.token().stop();
            if let Some(handles) = &self.clear_log_on_stop {
                handles.log.clear();
            }
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ScanResult::not_found()))
    }
}

/// Simulated rig, virtual clock and default config, ready for a behaviour.
pub struct Bench {
    pub rig: Rig,
    pub handles: SimHandles,
    pub clock: SimClock,
    pub pacer: Pacer,
    pub config: RobotConfig,
    pub steering: SteeringState,
}

impl Bench {
    pub fn new(sim: SimRig) -> Self {
        Self::with_config(sim, RobotConfig::default())
    }

    pub fn with_config(sim: SimRig, config: RobotConfig) -> Self {
        let (rig, handles) = sim.build();
        let clock = SimClock::new();
        let pacer = Pacer::new(Arc::new(clock.clone()), StopToken::new());
        let steering = SteeringState::new(config.steering.center, config.limits.steering);
        Self {
            rig,
            handles,
            clock,
            pacer,
            config,
            steering,
        }
    }
}
