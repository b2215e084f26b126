use crate::{error::NotifierError, OccupancyReading};
use std::future::Future;

/// Receives free-slot counts from detect-mode jobs.
///
/// Delivery is best effort: the detect bridge logs a returned error and
/// moves on to the next line.
pub trait Notifier: Send + Sync + 'static {
    fn notify(
        &self,
        reading: &OccupancyReading,
    ) -> impl Future<Output = Result<(), NotifierError>> + Send;
}
