//! Callbacks invoked when an input signal receives a value.

use sm_core::{InstanceId, SignalValue, Timetag};

use crate::signal::SignalProps;

/// Receives every value delivered to an input signal.
///
/// Any `FnMut(&SignalProps, InstanceId, &SignalValue, Timetag) + Send`
/// closure is a handler.
pub trait UpdateHandler: Send {
    fn on_update(
        &mut self,
        signal: &SignalProps,
        instance: InstanceId,
        value: &SignalValue,
        timetag: Timetag,
    );
}

impl<F> UpdateHandler for F
where
    F: FnMut(&SignalProps, InstanceId, &SignalValue, Timetag) + Send,
{
    fn on_update(
        &mut self,
        signal: &SignalProps,
        instance: InstanceId,
        value: &SignalValue,
        timetag: Timetag,
    ) {
        self(signal, instance, value, timetag)
    }
}
