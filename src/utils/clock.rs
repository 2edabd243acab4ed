use chrono::{DateTime, Local};

#[cfg(test)]
use mockall::automock;

/// Represents an entity responsible for providing dates across application. This allows the
/// tracking session to be driven with a fake time source in tests.
#[cfg_attr(test, automock)]
pub trait Clock: Send + 'static {
    fn time(&self) -> DateTime<Local>;
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }
}
