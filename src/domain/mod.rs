// Domain layer: core models and ports (interfaces) shared by sources, sinks and the engine.

pub mod model;
pub mod ports;
