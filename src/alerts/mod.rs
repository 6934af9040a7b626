/// Alert assembly, severity lookup and delivery
pub mod alert_factory;
pub mod severity;
pub mod sink;

pub use alert_factory::{AlertContext, AlertDraft, AlertFactory};
pub use sink::{AlertDispatcher, AlertSink, ChannelSink, IemLogSink, JsonLinesSink};
