use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::info;

use crate::effect::ChaosEffect;

/// The global armed-effect queue. One queue for the whole relay: a
/// queued effect is consumed by the next qualifying call no matter which
/// service or tool it targets.
#[derive(Default)]
pub struct ChaosQueue {
    effects: Mutex<VecDeque<ChaosEffect>>,
}

impl ChaosQueue {
    pub fn new() -> Self {
        ChaosQueue::default()
    }

    /// Arm an effect at the back of the queue.
    pub fn push(&self, effect: ChaosEffect) {
        info!(effect = effect.label(), "chaos effect armed");
        self.effects.lock().push_back(effect);
    }

    /// Consume the front effect, if any. Exactly-once: after this
    /// returns `Some`, the effect is gone.
    pub fn take_next(&self) -> Option<ChaosEffect> {
        self.effects.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.effects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.lock().is_empty()
    }
}
