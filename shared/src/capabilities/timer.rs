//! One-shot delays, used to give up on HTTP lookups the shell never answers.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

pub struct Timer<E> {
    context: CapabilityContext<TimerOperation, E>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<E> Timer<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, E>) -> Self {
        Self { context }
    }

    /// Sends `callback`'s event once `millis` have passed.
    pub fn after<F>(&self, millis: u64, callback: F)
    where
        F: FnOnce() -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .request_from_shell(TimerOperation::After { millis })
                .await;
            context.update_app(callback());
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOperation {
    After { millis: u64 },
}

impl Operation for TimerOperation {
    type Output = Elapsed;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Elapsed;
