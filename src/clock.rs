use chrono::{DateTime, Local, NaiveDate};

/// Source of the current time, injected so that sweeps and expiry can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Mutex, PoisonError};

    use chrono::{DateTime, Local, NaiveDate, TimeDelta};

    use super::Clock;

    /// Clock that only moves when told to.
    pub struct ManualClock(Mutex<DateTime<Local>>);

    impl ManualClock {
        pub fn at(now: DateTime<Local>) -> Self {
            Self(Mutex::new(now))
        }

        /// Noon on the given day, so that the local date is unambiguous.
        pub fn on(date: NaiveDate) -> Self {
            Self::at(date.and_hms_opt(12, 0, 0).unwrap().and_local_timezone(Local).unwrap())
        }

        pub fn advance(&self, delta: TimeDelta) {
            *self.0.lock().unwrap_or_else(PoisonError::into_inner) += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
