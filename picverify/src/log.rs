#[cfg(test)]
pub(crate) use std::{println as error, println as warn};

#[cfg(not(test))]
pub(crate) use log::{error, warn};

/// Types that can log themselves at an appropriate level.
pub trait Log {
    fn log(&self);
}
