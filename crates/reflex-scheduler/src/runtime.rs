use rand::{rngs::StdRng, SeedableRng};
use reflex_types::{
    events::{ActorMessage, ScheduleHandle},
    Result,
};
use tokio::{runtime::Handle, sync::mpsc::UnboundedSender, task::JoinHandle, time::sleep};
use tracing::{debug, info};

use crate::{scheduler_error, ArmedSchedule, DelayPolicy, ScheduleRegistry, StimulusScheduler};

/// Scheduler backed by tokio timers; fires arrive as `ActorMessage::StimulusFired`.
pub struct TokioScheduler {
    registry: ScheduleRegistry,
    policy: DelayPolicy,
    rng: StdRng,
    sink: UnboundedSender<ActorMessage>,
    pending: Option<(ScheduleHandle, JoinHandle<()>)>,
}

impl TokioScheduler {
    pub fn new(policy: DelayPolicy, sink: UnboundedSender<ActorMessage>) -> Self {
        Self::with_rng(policy, sink, StdRng::from_os_rng())
    }

    pub fn with_rng(policy: DelayPolicy, sink: UnboundedSender<ActorMessage>, rng: StdRng) -> Self {
        Self {
            registry: ScheduleRegistry::new(),
            policy,
            rng,
            sink,
            pending: None,
        }
    }
}

impl StimulusScheduler for TokioScheduler {
    fn arm(&mut self) -> Result<ArmedSchedule> {
        let runtime = Handle::try_current()
            .map_err(|err| scheduler_error(format!("no tokio runtime to arm on: {err}")))?;
        let handle = self.registry.open()?;
        let armed = ArmedSchedule {
            handle,
            delay_ms: self.policy.draw(&mut self.rng),
        };

        let sink = self.sink.clone();
        let delay = armed.delay();
        let task = runtime.spawn(async move {
            sleep(delay).await;
            let _ = sink.send(ActorMessage::StimulusFired(handle));
        });
        self.pending = Some((handle, task));
        info!("Stimulus {:?} scheduled in {:.1}ms", handle, armed.delay_ms);
        Ok(armed)
    }

    fn cancel(&mut self, handle: ScheduleHandle) -> bool {
        if !self.registry.cancel(handle) {
            debug!("Cancel of inactive schedule {:?} ignored", handle);
            return false;
        }
        if let Some((pending, task)) = self.pending.take() {
            if pending == handle {
                task.abort();
            }
        }
        debug!("Stimulus {:?} cancelled", handle);
        true
    }

    fn claim(&mut self, handle: ScheduleHandle) -> bool {
        let claimed = self.registry.claim(handle);
        if claimed {
            self.pending = None;
        }
        claimed
    }

    fn live(&self) -> Option<ScheduleHandle> {
        self.registry.live()
    }
}
