//! Parameter update notification

use crate::registry::ParameterRegistry;

/// Notified once per completed poll of the controller's parameters
///
/// The notification carries no payload; implementations re-read the
/// values they care about through [`ParameterRegistry::get`]. Observers
/// are called from inside the engine tick and must not block.
///
/// Takes `&self` so one observer can be shared between the engine and the
/// code issuing commands; cache state behind a `Cell` or similar.
pub trait ParameterObserver {
    /// Called after the registry has been refreshed from the controller
    fn on_parameter_update(&self, registry: &ParameterRegistry);
}

impl<T: ParameterObserver + ?Sized> ParameterObserver for &T {
    fn on_parameter_update(&self, registry: &ParameterRegistry) {
        (**self).on_parameter_update(registry)
    }
}
